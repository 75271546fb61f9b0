//! Routes calls to the apartment that owns the target object

use super::apartment::{Apartment, ApartmentId, CallFuture, ComObject};
use super::mta::MultithreadedApartment;
use crate::types::{Iid, Ipid, Oid};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps OIDs and IPIDs to apartments.
///
/// Objects with no recorded apartment are looked up in the default MTA.
pub struct CallDispatcher {
    ipid_to_apartment: RwLock<HashMap<Ipid, ApartmentId>>,
    oid_to_apartment: RwLock<HashMap<Oid, ApartmentId>>,
    apartments: RwLock<HashMap<ApartmentId, Arc<dyn Apartment>>>,
    default_mta: Arc<MultithreadedApartment>,
}

impl CallDispatcher {
    pub fn new() -> Self {
        let default_mta = Arc::new(MultithreadedApartment::new());
        let mut apartments: HashMap<ApartmentId, Arc<dyn Apartment>> = HashMap::new();
        apartments.insert(default_mta.id(), default_mta.clone());

        Self {
            ipid_to_apartment: RwLock::new(HashMap::new()),
            oid_to_apartment: RwLock::new(HashMap::new()),
            apartments: RwLock::new(apartments),
            default_mta,
        }
    }

    pub fn default_mta(&self) -> Arc<MultithreadedApartment> {
        self.default_mta.clone()
    }

    pub fn register_apartment(&self, apartment: Arc<dyn Apartment>) {
        self.apartments.write().insert(apartment.id(), apartment);
    }

    pub fn apartment(&self, id: ApartmentId) -> Option<Arc<dyn Apartment>> {
        self.apartments.read().get(&id).cloned()
    }

    /// Register `object` in `apartment` and remember where it lives.
    pub fn place_object(&self, object: Arc<dyn ComObject>, apartment: &Arc<dyn Apartment>) -> Oid {
        let apartment_id = apartment.id();
        if !self.apartments.read().contains_key(&apartment_id) {
            self.register_apartment(apartment.clone());
        }
        let oid = apartment.register_object(object);
        self.oid_to_apartment.write().insert(oid, apartment_id);
        oid
    }

    pub fn associate_ipid(&self, ipid: Ipid, apartment_id: ApartmentId) {
        self.ipid_to_apartment.write().insert(ipid, apartment_id);
    }

    pub fn associate_oid(&self, oid: Oid, apartment_id: ApartmentId) {
        self.oid_to_apartment.write().insert(oid, apartment_id);
    }

    pub fn apartment_for_ipid(&self, ipid: &Ipid) -> Option<Arc<dyn Apartment>> {
        let apartment_id = *self.ipid_to_apartment.read().get(ipid)?;
        self.apartment(apartment_id)
    }

    pub fn apartment_for_oid(&self, oid: &Oid) -> Arc<dyn Apartment> {
        let apartment_id = self.oid_to_apartment.read().get(oid).copied();
        apartment_id
            .and_then(|id| self.apartment(id))
            .unwrap_or_else(|| self.default_mta.clone())
    }

    pub fn dispatch(&self, oid: Oid, iid: Iid, opnum: u16, args: Bytes) -> CallFuture {
        self.apartment_for_oid(&oid).dispatch(oid, iid, opnum, args)
    }

    /// Dispatch through the apartment recorded for `ipid`, falling back to
    /// the object's apartment.
    pub fn dispatch_by_ipid(&self, ipid: Ipid, oid: Oid, iid: Iid, opnum: u16, args: Bytes) -> CallFuture {
        match self.apartment_for_ipid(&ipid) {
            Some(apartment) => apartment.dispatch(oid, iid, opnum, args),
            None => self.dispatch(oid, iid, opnum, args),
        }
    }

    pub fn remove_ipid(&self, ipid: &Ipid) {
        self.ipid_to_apartment.write().remove(ipid);
    }

    /// Forget `oid` and drop the object from its apartment.
    pub fn remove_object(&self, oid: &Oid) -> Option<Arc<dyn ComObject>> {
        let apartment = self.apartment_for_oid(oid);
        self.oid_to_apartment.write().remove(oid);
        apartment.unregister_object(oid)
    }

    pub fn shutdown(&self) {
        for apartment in self.apartments.read().values() {
            apartment.shutdown();
        }
    }
}

impl Default for CallDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
