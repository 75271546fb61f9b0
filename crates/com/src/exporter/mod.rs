//! Object exporter
//!
//! Hands out STDOBJREFs for local objects and tracks the public references
//! remote clients hold on each IPID.

mod object_exporter;
mod tables;

pub use object_exporter::*;
pub use tables::*;
