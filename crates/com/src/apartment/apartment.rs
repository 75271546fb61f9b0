//! Apartment trait and the object contract

use crate::types::{hresult, DcomError, Iid, Oid, Result};
use bytes::Bytes;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identifier of an apartment within one process
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ApartmentId(pub u64);

impl ApartmentId {
    pub fn generate() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ApartmentId {
    fn default() -> Self {
        Self::generate()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApartmentType {
    /// Multi-threaded apartment, concurrent calls
    Mta,
    /// Single-threaded apartment, serialized calls
    Sta,
}

/// Result of a COM call: the NDR-encoded out-parameters, or the failure.
///
/// A method that returns a failing HRESULT resolves to
/// `Err(DcomError::Failed(hr))`.
pub type CallResult = Result<Bytes>;

pub type CallFuture = Pin<Box<dyn Future<Output = CallResult> + Send>>;

/// A COM object implementation
pub trait ComObject: Send + Sync + 'static {
    fn oid(&self) -> Oid;

    /// IIDs this object answers to, IUnknown excluded
    fn supported_interfaces(&self) -> Vec<Iid>;

    /// Invoke `opnum` of interface `iid`. `args` holds the in-parameters
    /// with the ORPCTHIS header already stripped.
    fn invoke(&self, iid: &Iid, opnum: u16, args: Bytes) -> CallFuture;

    fn as_any(&self) -> &dyn Any;

    fn supports(&self, iid: &Iid) -> bool {
        *iid == crate::types::iid::IUNKNOWN || self.supported_interfaces().contains(iid)
    }
}

pub trait Apartment: Send + Sync {
    fn id(&self) -> ApartmentId;

    fn apartment_type(&self) -> ApartmentType;

    fn register_object(&self, object: Arc<dyn ComObject>) -> Oid;

    fn unregister_object(&self, oid: &Oid) -> Option<Arc<dyn ComObject>>;

    fn get_object(&self, oid: &Oid) -> Option<Arc<dyn ComObject>>;

    /// Dispatch a call. Fails with [`DcomError::ApartmentShutdown`] once
    /// the apartment has been shut down.
    fn dispatch(&self, oid: Oid, iid: Iid, opnum: u16, args: Bytes) -> CallFuture;

    /// Drop every object and reject further calls.
    fn shutdown(&self);

    fn is_running(&self) -> bool;
}

/// Objects registered in one apartment
pub(crate) type ObjectMap = RwLock<HashMap<Oid, Arc<dyn ComObject>>>;

/// Look up `oid` and start the call, or fail without touching the object.
pub(crate) fn start_call(objects: &ObjectMap, oid: Oid, iid: Iid, opnum: u16, args: Bytes) -> CallFuture {
    let object = objects.read().get(&oid).cloned();
    match object {
        Some(object) if object.supports(&iid) => object.invoke(&iid, opnum, args),
        Some(_) => Box::pin(async { Err(DcomError::Failed(hresult::E_NOINTERFACE)) }),
        None => Box::pin(async move { Err(DcomError::UnknownOid(oid)) }),
    }
}

pub(crate) fn rejected() -> CallFuture {
    Box::pin(async { Err(DcomError::ApartmentShutdown) })
}
