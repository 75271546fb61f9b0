//! OID and IPID tables
//!
//! The tables are plain maps. [`ObjectExporter`](super::ObjectExporter)
//! keeps both behind one lock so an IPID never outlives its OID entry.

use crate::apartment::ApartmentId;
use crate::types::{Iid, Ipid, Oid};
use std::collections::HashMap;

#[derive(Clone, Debug)]
pub struct OidEntry {
    pub oid: Oid,
    /// Apartment the object was placed in
    pub apartment: ApartmentId,
    /// Exported interfaces of this object
    pub interfaces: Vec<Ipid>,
}

impl OidEntry {
    pub fn new(oid: Oid, apartment: ApartmentId) -> Self {
        Self { oid, apartment, interfaces: Vec::new() }
    }
}

#[derive(Clone, Debug)]
pub struct IpidEntry {
    pub ipid: Ipid,
    pub oid: Oid,
    pub iid: Iid,
    /// References held by remote clients
    pub public_refs: u32,
}

impl IpidEntry {
    pub fn new(ipid: Ipid, oid: Oid, iid: Iid) -> Self {
        Self { ipid, oid, iid, public_refs: 0 }
    }
}

#[derive(Debug, Default)]
pub struct OidTable {
    entries: HashMap<Oid, OidEntry>,
}

impl OidTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entry: OidEntry) {
        self.entries.insert(entry.oid, entry);
    }

    pub fn lookup(&self, oid: &Oid) -> Option<&OidEntry> {
        self.entries.get(oid)
    }

    pub fn remove(&mut self, oid: &Oid) -> Option<OidEntry> {
        self.entries.remove(oid)
    }

    pub fn contains(&self, oid: &Oid) -> bool {
        self.entries.contains_key(oid)
    }

    pub fn add_interface(&mut self, oid: &Oid, ipid: Ipid) -> bool {
        match self.entries.get_mut(oid) {
            Some(entry) => {
                entry.interfaces.push(ipid);
                true
            }
            None => false,
        }
    }

    /// Detach `ipid` from `oid`. Returns the number of interfaces left.
    pub fn remove_interface(&mut self, oid: &Oid, ipid: &Ipid) -> usize {
        match self.entries.get_mut(oid) {
            Some(entry) => {
                entry.interfaces.retain(|i| i != ipid);
                entry.interfaces.len()
            }
            None => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct IpidTable {
    entries: HashMap<Ipid, IpidEntry>,
}

impl IpidTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entry: IpidEntry) {
        self.entries.insert(entry.ipid, entry);
    }

    pub fn lookup(&self, ipid: &Ipid) -> Option<&IpidEntry> {
        self.entries.get(ipid)
    }

    pub fn remove(&mut self, ipid: &Ipid) -> Option<IpidEntry> {
        self.entries.remove(ipid)
    }

    pub fn add_public_refs(&mut self, ipid: &Ipid, count: u32) -> Option<u32> {
        let entry = self.entries.get_mut(ipid)?;
        entry.public_refs = entry.public_refs.saturating_add(count);
        Some(entry.public_refs)
    }

    pub fn release_public_refs(&mut self, ipid: &Ipid, count: u32) -> Option<u32> {
        let entry = self.entries.get_mut(ipid)?;
        entry.public_refs = entry.public_refs.saturating_sub(count);
        Some(entry.public_refs)
    }

    pub fn find_by_oid_and_iid(&self, oid: &Oid, iid: &Iid) -> Option<Ipid> {
        self.entries
            .values()
            .find(|e| &e.oid == oid && &e.iid == iid)
            .map(|e| e.ipid)
    }

    pub fn contains_iid(&self, iid: &Iid) -> bool {
        self.entries.values().any(|e| &e.iid == iid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
