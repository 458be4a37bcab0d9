//! Process-wide address book.
//!
//! An [`Address`] is a non-empty string unique within an [`AddressSpace`]
//! (e.g. `"ClientAgent"`, `"ServerAgent"`, `"SocketServer"`). The empty
//! string denotes the root address of a session and is itself a valid,
//! independently-claimable address like any other.
//!
//! The book is a single process-wide singleton so that uniqueness holds
//! even when multiple copies of this crate end up linked into the same
//! binary (e.g. via differing dependency versions pulled in transitively).

use std::collections::HashSet;
use std::fmt;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// A claimed identifier, unique within its [`AddressSpace`].
///
/// The empty string is a valid address (the session root).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The root address of a session (`""`).
    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A named scope within the global address book, e.g. `"ClientAgent"`.
///
/// Address spaces are interned by name only — there is no registration
/// step, the first claim in a space implicitly creates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AddressSpace(&'static str);

impl AddressSpace {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Well-known address spaces used by the core crates.
pub mod spaces {
    use super::AddressSpace;

    pub const CLIENT_AGENT: AddressSpace = AddressSpace::new("ClientAgent");
    pub const SERVER_AGENT: AddressSpace = AddressSpace::new("ServerAgent");
    pub const SOCKET_SERVER: AddressSpace = AddressSpace::new("SocketServer");
}

#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("address {address} is already claimed in space {space}")]
    UniqueAddressError { space: AddressSpace, address: Address },
}

#[derive(Debug, Default)]
struct Book {
    claimed: std::collections::HashMap<&'static str, HashSet<Address>>,
}

/// The process-wide address book.
///
/// All operations are synchronous and protected by a single mutex; the
/// book is never held across an `.await` point by callers, so lock
/// contention is limited to the brief add/release calls themselves.
#[derive(Debug, Default)]
pub struct AddressBook {
    inner: Mutex<Book>,
}

impl AddressBook {
    const fn new() -> Self {
        Self {
            inner: Mutex::new(Book {
                claimed: std::collections::HashMap::new(),
            }),
        }
    }

    /// Claim `address` within `space`.
    ///
    /// Fails with [`AddressError::UniqueAddressError`] if another live
    /// agent already holds the same address in the same space.
    pub fn add(&self, space: AddressSpace, address: Address) -> Result<(), AddressError> {
        let mut book = self.inner.lock();
        let set = book.claimed.entry(space.name()).or_default();
        if !set.insert(address.clone()) {
            tracing::warn!(%space, %address, "address already claimed");
            return Err(AddressError::UniqueAddressError { space, address });
        }
        tracing::debug!(%space, %address, "address claimed");
        Ok(())
    }

    /// Release `address` within `space`. Idempotent: releasing an address
    /// that is not currently claimed is a no-op.
    pub fn release(&self, space: AddressSpace, address: &Address) {
        let mut book = self.inner.lock();
        if let Some(set) = book.claimed.get_mut(space.name()) {
            set.remove(address);
            tracing::debug!(%space, %address, "address released");
        }
    }

    /// Whether `address` is currently claimed within `space`.
    pub fn contains(&self, space: AddressSpace, address: &Address) -> bool {
        let book = self.inner.lock();
        book.claimed
            .get(space.name())
            .is_some_and(|set| set.contains(address))
    }
}

/// The process-wide singleton. All agent/session code claims and releases
/// addresses through this instance.
pub static ADDRESS_BOOK: Lazy<AddressBook> = Lazy::new(AddressBook::new);
