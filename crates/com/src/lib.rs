//! COM runtime over DCE/RPC
//!
//! The pieces a COM server and its clients share:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  DcomClient / InterfaceProxy      DcomServer / ObjectHost    │
//! ├──────────────────────────────────────────────────────────────┤
//! │  IRemoteActivation   │  IRemUnknown     │  ORPC object calls │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Class registry  │  Object exporter (OXID/OID/IPID)  │  MTA/STA │
//! ├──────────────────────────────────────────────────────────────┤
//! │              DCE/RPC over TCP (comharness-rpc)               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - [`types`]: identifiers, OBJREF, ORPC headers, HRESULT
//! - [`apartment`]: `ComObject`, MTA and STA apartments, call dispatch
//! - [`exporter`]: IPID and OID tables with public reference counts
//! - [`registry`]: classes by CLSID and progid
//! - [`activation`]: `RemoteActivation`
//! - [`remunknown`]: `RemQueryInterface`, `RemAddRef`, `RemRelease`

pub mod activation;
pub mod apartment;
pub mod exporter;
pub mod registry;
pub mod remunknown;
pub mod types;

mod client;
mod server;

pub use apartment::{
    Apartment, ApartmentId, ApartmentType, CallDispatcher, CallFuture, CallResult, ComObject,
    MultithreadedApartment, SinglethreadedApartment,
};
pub use client::{DcomClient, DcomClientConfig, InterfaceProxy};
pub use exporter::ObjectExporter;
pub use registry::{ClassEntry, ClassFactory, ClassIdentifier, ClassRegistry, FnClassFactory, ThreadingModel};
pub use server::{DcomServer, DcomServerConfig, ObjectHost, DEFAULT_PORT};
pub use types::{
    hresult, iid, Clsid, ComVersion, DcomError, DualStringArray, HResult, Iid, InterfacePtr, Ipid,
    MInterfacePointer, ObjRef, Oid, OrpcThat, OrpcThis, Oxid, Result, StdObjRef, StringBinding,
};

/// COM protocol version spoken on the wire
pub const DCOM_VERSION: ComVersion = ComVersion::DCOM_5_7;
