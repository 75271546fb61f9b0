//! Apartment threading models
//!
//! - MTA: calls run concurrently, objects synchronize themselves
//! - STA: calls are queued and run one at a time, in arrival order

mod apartment;
mod dispatcher;
mod mta;
mod sta;

pub use apartment::*;
pub use dispatcher::*;
pub use mta::*;
pub use sta::*;
