//! Recursive payload traversal that substitutes functions/proxies for
//! address references on encode and materializes proxies on decode
//! (§4.2 "Codec").

mod decode;
mod encode;
mod payload;

pub use decode::{decode, Decoded};
pub use encode::{encode, EncodeFailure, EncodeTarget};
pub use payload::{BoxFuture, Callable, ExposedFn, Payload, ProxyHandleRef};
