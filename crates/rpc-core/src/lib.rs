//! rpc-core — shared wire format, payload codec, and function registry.
//! `rpc-server` and `rpc-client` both depend on this crate so that the
//! framing discipline lives in exactly one place.

pub mod config;
pub mod framing;
pub mod payload;
pub mod registry;

pub use payload::{payload_free, Payload, PayloadError, MAX_BLOB_LEN};
pub use registry::{djb2, Handler, RegisterError, RegisteredFunction, Registry};
