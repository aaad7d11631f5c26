//! Transport error types.

pub mod transport_error;

pub use transport_error::TransportError;
