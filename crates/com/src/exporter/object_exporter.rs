//! The object exporter of one server
//!
//! A server runs a single exporter with one OXID. Every interface handed to
//! a client gets an IPID carrying [`DEFAULT_PUBLIC_REFS`] public references.
//! Releasing an IPID down to zero forgets it, and the object goes away with
//! its last IPID.

use super::tables::{IpidEntry, IpidTable, OidEntry, OidTable};
use crate::apartment::{Apartment, CallDispatcher, CallFuture, ComObject};
use crate::types::{
    hresult, DcomError, DualStringArray, Iid, Ipid, ObjRef, Oid, Oxid, Result, StdObjRef,
    DEFAULT_PUBLIC_REFS,
};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

#[derive(Default)]
struct ExportTables {
    oids: OidTable,
    ipids: IpidTable,
}

pub struct ObjectExporter {
    oxid: Oxid,
    bindings: DualStringArray,
    remunknown_ipid: Ipid,
    dispatcher: Arc<CallDispatcher>,
    tables: Mutex<ExportTables>,
}

impl ObjectExporter {
    pub fn new(bindings: DualStringArray, dispatcher: Arc<CallDispatcher>) -> Self {
        Self {
            oxid: Oxid::generate(),
            bindings,
            remunknown_ipid: Ipid::generate(),
            dispatcher,
            tables: Mutex::new(ExportTables::default()),
        }
    }

    pub fn oxid(&self) -> Oxid {
        self.oxid
    }

    /// Where clients reach this exporter
    pub fn bindings(&self) -> &DualStringArray {
        &self.bindings
    }

    /// IPID of this exporter's IRemUnknown
    pub fn remunknown_ipid(&self) -> Ipid {
        self.remunknown_ipid
    }

    pub fn dispatcher(&self) -> &Arc<CallDispatcher> {
        &self.dispatcher
    }

    /// Export interface `iid` of `object`, placing the object in
    /// `apartment` the first time it is seen.
    pub fn export(&self, object: Arc<dyn ComObject>, iid: Iid, apartment: &Arc<dyn Apartment>) -> Result<StdObjRef> {
        if !object.supports(&iid) {
            return Err(DcomError::Failed(hresult::E_NOINTERFACE));
        }
        let oid = object.oid();
        let mut tables = self.tables.lock();
        if !tables.oids.contains(&oid) {
            self.dispatcher.place_object(object, apartment);
            tables.oids.register(OidEntry::new(oid, apartment.id()));
        }
        Ok(self.add_interface(&mut tables, oid, iid, DEFAULT_PUBLIC_REFS))
    }

    /// Export and wrap the result in an OBJREF pointing back at this server.
    pub fn marshal(&self, object: Arc<dyn ComObject>, iid: Iid, apartment: &Arc<dyn Apartment>) -> Result<ObjRef> {
        let std = self.export(object, iid, apartment)?;
        Ok(self.objref(iid, std))
    }

    pub fn objref(&self, iid: Iid, std: StdObjRef) -> ObjRef {
        ObjRef::new(iid, std, self.bindings.clone())
    }

    fn add_interface(&self, tables: &mut ExportTables, oid: Oid, iid: Iid, refs: u32) -> StdObjRef {
        let ipid = match tables.ipids.find_by_oid_and_iid(&oid, &iid) {
            Some(ipid) => {
                tables.ipids.add_public_refs(&ipid, refs);
                ipid
            }
            None => {
                let ipid = Ipid::generate();
                let mut entry = IpidEntry::new(ipid, oid, iid);
                entry.public_refs = refs;
                tables.ipids.register(entry);
                tables.oids.add_interface(&oid, ipid);
                if let Some(apartment) = tables.oids.lookup(&oid).map(|e| e.apartment) {
                    self.dispatcher.associate_ipid(ipid, apartment);
                }
                ipid
            }
        };
        debug!(%oid, %ipid, %iid, refs, "exported interface");
        StdObjRef::new(self.oxid, oid, ipid, refs)
    }

    /// Export another interface of the object behind `ipid`.
    pub fn query_interface(&self, ipid: &Ipid, iid: &Iid, refs: u32) -> Result<StdObjRef> {
        let mut tables = self.tables.lock();
        let oid = tables.ipids.lookup(ipid).ok_or(DcomError::UnknownIpid(*ipid))?.oid;
        let object = self
            .dispatcher
            .apartment_for_oid(&oid)
            .get_object(&oid)
            .ok_or(DcomError::UnknownOid(oid))?;
        if !object.supports(iid) {
            return Err(DcomError::Failed(hresult::E_NOINTERFACE));
        }
        Ok(self.add_interface(&mut tables, oid, *iid, refs))
    }

    pub fn add_refs(&self, ipid: &Ipid, refs: u32) -> Result<u32> {
        self.tables
            .lock()
            .ipids
            .add_public_refs(ipid, refs)
            .ok_or(DcomError::UnknownIpid(*ipid))
    }

    /// Drop `refs` public references and return how many remain.
    pub fn release(&self, ipid: &Ipid, refs: u32) -> Result<u32> {
        let released = {
            let mut tables = self.tables.lock();
            let remaining = tables
                .ipids
                .release_public_refs(ipid, refs)
                .ok_or(DcomError::UnknownIpid(*ipid))?;
            if remaining > 0 {
                return Ok(remaining);
            }

            let Some(entry) = tables.ipids.remove(ipid) else {
                return Ok(0);
            };
            self.dispatcher.remove_ipid(ipid);
            debug!(%ipid, oid = %entry.oid, "released interface");

            if tables.oids.remove_interface(&entry.oid, ipid) > 0 {
                return Ok(0);
            }
            tables.oids.remove(&entry.oid);
            self.dispatcher.remove_object(&entry.oid)
        };
        if let Some(object) = released {
            debug!(oid = %object.oid(), "object released");
        }
        Ok(0)
    }

    /// Start a call on the interface named by `ipid`.
    pub fn dispatch(&self, ipid: &Ipid, opnum: u16, args: Bytes) -> Result<CallFuture> {
        let (oid, iid) = {
            let tables = self.tables.lock();
            let entry = tables.ipids.lookup(ipid).ok_or(DcomError::UnknownIpid(*ipid))?;
            (entry.oid, entry.iid)
        };
        Ok(self.dispatcher.dispatch_by_ipid(*ipid, oid, iid, opnum, args))
    }

    pub fn lookup_ipid(&self, ipid: &Ipid) -> Option<IpidEntry> {
        self.tables.lock().ipids.lookup(ipid).cloned()
    }

    pub fn lookup_oid(&self, oid: &Oid) -> Option<OidEntry> {
        self.tables.lock().oids.lookup(oid).cloned()
    }

    /// IIDs with a registered IPID on any object
    pub fn is_exported_iid(&self, iid: &Iid) -> bool {
        self.tables.lock().ipids.contains_iid(iid)
    }

    pub fn object_count(&self) -> usize {
        self.tables.lock().oids.len()
    }

    pub fn interface_count(&self) -> usize {
        self.tables.lock().ipids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apartment::MultithreadedApartment;
    use std::any::Any;
    use uuid::{uuid, Uuid};

    const IID_IA: Iid = uuid!("11111111-2222-4333-8444-555555555501");
    const IID_IB: Iid = uuid!("11111111-2222-4333-8444-555555555502");

    struct TwoFaced {
        oid: Oid,
    }

    impl ComObject for TwoFaced {
        fn oid(&self) -> Oid {
            self.oid
        }

        fn supported_interfaces(&self) -> Vec<Iid> {
            vec![IID_IA, IID_IB]
        }

        fn invoke(&self, iid: &Iid, opnum: u16, _args: Bytes) -> CallFuture {
            let reply = Bytes::from(format!("{iid}:{opnum}"));
            Box::pin(async move { Ok(reply) })
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn exporter() -> (ObjectExporter, Arc<dyn Apartment>) {
        let dispatcher = Arc::new(CallDispatcher::new());
        let mta: Arc<dyn Apartment> = Arc::new(MultithreadedApartment::new());
        (ObjectExporter::new(DualStringArray::with_tcp_binding("127.0.0.1", 4135), dispatcher), mta)
    }

    #[test]
    fn test_export_reuses_ipid() {
        let (exporter, mta) = exporter();
        let obj = Arc::new(TwoFaced { oid: Oid::generate() });

        let first = exporter.export(obj.clone(), IID_IA, &mta).unwrap();
        let second = exporter.export(obj, IID_IA, &mta).unwrap();
        assert_eq!(first.ipid, second.ipid);
        assert_eq!(first.oxid, exporter.oxid());
        assert_eq!(exporter.lookup_ipid(&first.ipid).unwrap().public_refs, 2 * DEFAULT_PUBLIC_REFS);
    }

    #[test]
    fn test_export_rejects_unsupported_iid() {
        let (exporter, mta) = exporter();
        let obj = Arc::new(TwoFaced { oid: Oid::generate() });
        let err = exporter.export(obj, Uuid::new_v4(), &mta).unwrap_err();
        assert_eq!(err.hresult(), hresult::E_NOINTERFACE);
        assert_eq!(exporter.object_count(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_by_ipid() {
        let (exporter, mta) = exporter();
        let obj = Arc::new(TwoFaced { oid: Oid::generate() });
        let std = exporter.export(obj, IID_IB, &mta).unwrap();

        let reply = exporter.dispatch(&std.ipid, 4, Bytes::new()).unwrap().await.unwrap();
        assert_eq!(reply, Bytes::from(format!("{IID_IB}:4")));
        assert!(matches!(
            exporter.dispatch(&Ipid::generate(), 4, Bytes::new()),
            Err(DcomError::UnknownIpid(_))
        ));
    }

    #[test]
    fn test_release_last_ipid_drops_object() {
        let (exporter, mta) = exporter();
        let obj = Arc::new(TwoFaced { oid: Oid::generate() });
        let oid = obj.oid();
        let a = exporter.export(obj, IID_IA, &mta).unwrap();
        let b = exporter.query_interface(&a.ipid, &IID_IB, 1).unwrap();
        assert_ne!(a.ipid, b.ipid);
        assert_eq!(b.oid, oid);

        assert_eq!(exporter.release(&a.ipid, 2).unwrap(), DEFAULT_PUBLIC_REFS - 2);
        assert_eq!(exporter.release(&a.ipid, DEFAULT_PUBLIC_REFS).unwrap(), 0);
        assert!(exporter.lookup_ipid(&a.ipid).is_none());
        assert!(exporter.lookup_oid(&oid).is_some());

        assert_eq!(exporter.release(&b.ipid, 1).unwrap(), 0);
        assert!(exporter.lookup_oid(&oid).is_none());
        assert!(mta.get_object(&oid).is_none());
        assert!(matches!(exporter.release(&b.ipid, 1), Err(DcomError::UnknownIpid(_))));
    }
}
