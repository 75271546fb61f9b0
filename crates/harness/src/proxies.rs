//! Typed proxies for the test servers' interfaces
//!
//! Generated at build time from `crates/servers/idl/Interfaces.idl`. Each
//! interface is a struct wrapping a [`ComObjectHandle`] with one async
//! method per IDL method; `Address` is a plain value struct.
//!
//! ```ignore
//! let shop = IPetShop::from_handle(harness.create_object(progid::PET_SHOP, &binding).await?)?;
//! let address = shop.get_address().await?;
//! ```

include!(concat!(env!("OUT_DIR"), "/interfaces.rs"));
