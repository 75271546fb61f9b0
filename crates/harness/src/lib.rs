//! COM client harness
//!
//! Drives COM servers from the client side:
//!
//! 1. [`Harness::resolve_bindings`] reads a type library (`.tlb` or `.idl`)
//!    into [`InterfaceBinding`]s
//! 2. [`Harness::create_object`] activates a class by progid or CLSID and
//!    binds the result to one of them
//! 3. [`ComObjectHandle::invoke`] calls a method by name and returns its
//!    `[out]` parameters
//!
//! The [`proxies`] module wraps the same calls in typed structs generated
//! from the test servers' IDL, and [`scenarios`] runs the end-to-end checks
//! the `comharness` binary reports on.
//!
//! # Example
//!
//! ```ignore
//! use comharness::{proxies::{progid, IPetShop}, Harness, HarnessConfig};
//!
//! let harness = Harness::new(HarnessConfig::default());
//! let bindings = harness.resolve_bindings("crates/servers/idl/Interfaces.idl")?;
//! let shop = harness.create_object(progid::PET_SHOP, bindings.interface("IPetShop")?).await?;
//! let address = IPetShop::from_handle(shop)?.get_address().await?;
//! assert_eq!(address.city, "Oslo");
//! ```

pub mod bindings;
pub mod blocking;
pub mod config;
pub mod proxies;
pub mod scenarios;

mod error;
mod handle;
mod harness;
mod marshal;
mod value;

pub use bindings::{BindingRegistry, BindingSet, InterfaceBinding, MethodBinding, ParamBinding};
pub use config::{HarnessConfig, ServerEntry, DEFAULT_TYPELIB};
pub use error::{HarnessError, Result};
pub use handle::{ComObjectHandle, InvokeResult, LocalObject};
pub use harness::Harness;
pub use value::{StructValue, Value};
