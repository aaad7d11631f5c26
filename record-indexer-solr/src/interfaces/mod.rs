//! Transport trait definitions.

pub mod update_transport;

pub use update_transport::UpdateTransport;
