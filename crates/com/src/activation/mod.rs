//! Object activation
//!
//! `IRemoteActivation::RemoteActivation` creates an instance of a class and
//! returns one STDOBJREF per requested interface.

mod client;
mod protocol;
mod server;

pub use client::*;
pub use protocol::*;
pub use server::*;
