//! IRemUnknown
//!
//! Remote IUnknown, served once per exporter:
//! - RemQueryInterface asks for more interfaces on an object
//! - RemAddRef / RemRelease move public reference counts

mod client;
mod protocol;
mod server;

pub use client::*;
pub use protocol::*;
pub use server::*;
