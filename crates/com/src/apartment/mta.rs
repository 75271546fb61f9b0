//! Multi-threaded apartment
//!
//! Calls are started on the caller's task and may overlap freely.

use super::apartment::{rejected, start_call, Apartment, ApartmentId, ApartmentType, CallFuture, ComObject, ObjectMap};
use crate::types::{Iid, Oid};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

pub struct MultithreadedApartment {
    id: ApartmentId,
    objects: ObjectMap,
    running: AtomicBool,
}

impl MultithreadedApartment {
    pub fn new() -> Self {
        Self::with_id(ApartmentId::generate())
    }

    pub fn with_id(id: ApartmentId) -> Self {
        Self {
            id,
            objects: ObjectMap::default(),
            running: AtomicBool::new(true),
        }
    }
}

impl Default for MultithreadedApartment {
    fn default() -> Self {
        Self::new()
    }
}

impl Apartment for MultithreadedApartment {
    fn id(&self) -> ApartmentId {
        self.id
    }

    fn apartment_type(&self) -> ApartmentType {
        ApartmentType::Mta
    }

    fn register_object(&self, object: Arc<dyn ComObject>) -> Oid {
        let oid = object.oid();
        self.objects.write().insert(oid, object);
        oid
    }

    fn unregister_object(&self, oid: &Oid) -> Option<Arc<dyn ComObject>> {
        self.objects.write().remove(oid)
    }

    fn get_object(&self, oid: &Oid) -> Option<Arc<dyn ComObject>> {
        self.objects.read().get(oid).cloned()
    }

    fn dispatch(&self, oid: Oid, iid: Iid, opnum: u16, args: Bytes) -> CallFuture {
        if !self.is_running() {
            return rejected();
        }
        start_call(&self.objects, oid, iid, opnum, args)
    }

    fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        let dropped = std::mem::take(&mut *self.objects.write());
        debug!(apartment = self.id.0, objects = dropped.len(), "MTA shut down");
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DcomError;
    use std::any::Any;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use uuid::Uuid;

    const IID_ITEST: Iid = uuid::uuid!("6b0a7e55-1f62-4c55-9d1b-0f9f3c7e2a10");

    struct SlowObject {
        oid: Oid,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl ComObject for SlowObject {
        fn oid(&self) -> Oid {
            self.oid
        }

        fn supported_interfaces(&self) -> Vec<Iid> {
            vec![IID_ITEST]
        }

        fn invoke(&self, _iid: &Iid, _opnum: u16, _args: Bytes) -> CallFuture {
            let active = self.active.clone();
            let peak = self.peak.clone();
            Box::pin(async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(Bytes::new())
            })
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn slow_object() -> Arc<SlowObject> {
        Arc::new(SlowObject {
            oid: Oid::generate(),
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        })
    }

    #[tokio::test]
    async fn test_mta_calls_overlap() {
        let mta = MultithreadedApartment::new();
        let obj = slow_object();
        let oid = mta.register_object(obj.clone());

        let calls: Vec<_> = (0..4).map(|_| mta.dispatch(oid, IID_ITEST, 3, Bytes::new())).collect();
        for result in futures::future::join_all(calls).await {
            result.unwrap();
        }
        assert!(obj.peak.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn test_mta_unknown_interface_and_object() {
        let mta = MultithreadedApartment::new();
        let oid = mta.register_object(slow_object());

        let err = mta.dispatch(oid, Uuid::new_v4(), 3, Bytes::new()).await.unwrap_err();
        assert_eq!(err.hresult(), crate::types::hresult::E_NOINTERFACE);

        let err = mta.dispatch(Oid::generate(), IID_ITEST, 3, Bytes::new()).await.unwrap_err();
        assert!(matches!(err, DcomError::UnknownOid(_)));
    }

    #[tokio::test]
    async fn test_mta_shutdown_rejects_calls() {
        let mta = MultithreadedApartment::new();
        let oid = mta.register_object(slow_object());
        mta.shutdown();

        assert!(!mta.is_running());
        assert!(mta.get_object(&oid).is_none());
        let err = mta.dispatch(oid, IID_ITEST, 3, Bytes::new()).await.unwrap_err();
        assert_eq!(err.hresult(), crate::types::hresult::RPC_E_DISCONNECTED);
    }
}
