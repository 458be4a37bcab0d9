//! Transparent RPC over message-passing transports: `expose` a value on one
//! side, `connect` to it from the other, or `listen` for many connecting
//! clients (§1 "Overview", §6 "Public API").
//!
//! This crate is a thin facade: it wires the lower-level crates
//! (`transporter-address`, `transporter-protocol`, `transporter-codec`,
//! `transporter-agent`, `transporter-session`, `transporter-socket`,
//! `transporter-rr`) into the three entry points a caller actually needs,
//! the same way the teacher's top-level `aura` crate composes its
//! layered `aura-*` crates behind a handful of builder functions rather
//! than making callers assemble agents by hand.
//!
//! Concrete transport adapters (window `postMessage`, dedicated/shared/
//! service workers, `MessagePort`, `BroadcastChannel`, a React Native
//! WebView bridge) are host-specific glue outside this crate's scope
//! (§1, §13 "Non-goals"); callers supply one by implementing [`Transport`].

mod connect;
mod error;
mod expose;
mod listen;
mod transport;

pub use connect::{connect, ConnectHandle, ConnectOptions};
pub use error::TransporterError;
pub use expose::{expose, ExposeHandle, ExposeOptions};
pub use listen::{listen, ListenHandle, ListenOptions};
pub use transport::{ChannelTransport, Transport};

pub use transporter_address::Address;
pub use transporter_agent::{Injector, NoopInjector, Proxy, WeakProxy};
pub use transporter_codec::{Decoded, ExposedFn, Payload};
pub use transporter_protocol::Subprotocol;
pub use transporter_socket::{ConnectAttempt, ConnectFilter, SocketOptions};
