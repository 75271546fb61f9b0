//! Class registry
//!
//! Maps CLSIDs and progids to class factories, the way the system registry
//! does for a COM server. Progid lookups ignore case.

use crate::apartment::ComObject;
use crate::server::ObjectHost;
use crate::types::{hresult, Clsid, HResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// `ThreadingModel` value of a class registration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ThreadingModel {
    /// Instances live in the server's STA
    Apartment,
    /// Instances live in the MTA
    Free,
    /// Either apartment suits the class; the MTA is used
    Both,
}

impl ThreadingModel {
    pub fn as_str(self) -> &'static str {
        match self {
            ThreadingModel::Apartment => "Apartment",
            ThreadingModel::Free => "Free",
            ThreadingModel::Both => "Both",
        }
    }
}

impl fmt::Display for ThreadingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThreadingModel {
    type Err = HResult;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "apartment" => Ok(ThreadingModel::Apartment),
            "free" => Ok(ThreadingModel::Free),
            "both" => Ok(ThreadingModel::Both),
            _ => Err(hresult::E_INVALIDARG),
        }
    }
}

/// Creates instances of one class
pub trait ClassFactory: Send + Sync {
    /// `outer` is the controlling unknown when the caller asks for
    /// aggregation. None of the hosted classes aggregate.
    fn create_instance(
        &self,
        outer: Option<Arc<dyn ComObject>>,
        host: &Arc<ObjectHost>,
    ) -> Result<Arc<dyn ComObject>, HResult>;
}

/// Factory from a plain constructor, refusing aggregation
pub struct FnClassFactory<F>(pub F);

impl<F> ClassFactory for FnClassFactory<F>
where
    F: Fn(&Arc<ObjectHost>) -> Result<Arc<dyn ComObject>, HResult> + Send + Sync,
{
    fn create_instance(
        &self,
        outer: Option<Arc<dyn ComObject>>,
        host: &Arc<ObjectHost>,
    ) -> Result<Arc<dyn ComObject>, HResult> {
        if outer.is_some() {
            return Err(hresult::CLASS_E_NOAGGREGATION);
        }
        (self.0)(host)
    }
}

#[derive(Clone)]
pub struct ClassEntry {
    pub clsid: Clsid,
    pub progid: Option<String>,
    pub threading: ThreadingModel,
    pub factory: Arc<dyn ClassFactory>,
}

impl ClassEntry {
    pub fn new(clsid: Clsid, threading: ThreadingModel, factory: Arc<dyn ClassFactory>) -> Self {
        Self { clsid, progid: None, threading, factory }
    }

    pub fn with_progid(mut self, progid: impl Into<String>) -> Self {
        self.progid = Some(progid.into());
        self
    }
}

impl fmt::Debug for ClassEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassEntry")
            .field("clsid", &self.clsid)
            .field("progid", &self.progid)
            .field("threading", &self.threading)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Entries {
    by_clsid: HashMap<Clsid, ClassEntry>,
    /// Lowercased progid to CLSID
    by_progid: HashMap<String, Clsid>,
}

#[derive(Default)]
pub struct ClassRegistry {
    entries: RwLock<Entries>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class, replacing any previous registration of its CLSID.
    pub fn register(&self, entry: ClassEntry) {
        debug!(clsid = %entry.clsid, progid = ?entry.progid, threading = %entry.threading, "registering class");
        let mut entries = self.entries.write();
        if let Some(old) = entries.by_clsid.remove(&entry.clsid) {
            if let Some(progid) = old.progid {
                entries.by_progid.remove(&progid.to_ascii_lowercase());
            }
        }
        if let Some(progid) = &entry.progid {
            entries.by_progid.insert(progid.to_ascii_lowercase(), entry.clsid);
        }
        entries.by_clsid.insert(entry.clsid, entry);
    }

    pub fn unregister(&self, clsid: &Clsid) -> Option<ClassEntry> {
        let mut entries = self.entries.write();
        let entry = entries.by_clsid.remove(clsid)?;
        if let Some(progid) = &entry.progid {
            entries.by_progid.remove(&progid.to_ascii_lowercase());
        }
        Some(entry)
    }

    pub fn lookup(&self, clsid: &Clsid) -> Option<ClassEntry> {
        self.entries.read().by_clsid.get(clsid).cloned()
    }

    pub fn lookup_progid(&self, progid: &str) -> Option<ClassEntry> {
        let entries = self.entries.read();
        let clsid = entries.by_progid.get(&progid.to_ascii_lowercase())?;
        entries.by_clsid.get(clsid).cloned()
    }

    /// `CLSIDFromProgID`
    pub fn clsid_from_progid(&self, progid: &str) -> Result<Clsid, HResult> {
        self.lookup_progid(progid)
            .map(|entry| entry.clsid)
            .ok_or(hresult::REGDB_E_CLASSNOTREG)
    }

    pub fn resolve(&self, identifier: &ClassIdentifier) -> Option<ClassEntry> {
        match identifier {
            ClassIdentifier::Clsid(clsid) => self.lookup(clsid),
            ClassIdentifier::ProgId(progid) => self.lookup_progid(progid),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().by_clsid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How a caller names a class
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ClassIdentifier {
    Clsid(Clsid),
    ProgId(String),
}

impl ClassIdentifier {
    /// A braced or bare GUID is a CLSID, anything else a progid.
    pub fn parse(identifier: &str) -> Self {
        let trimmed = identifier.trim();
        let bare = trimmed
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .unwrap_or(trimmed);
        match Uuid::try_parse(bare) {
            Ok(clsid) if bare.len() == 36 => ClassIdentifier::Clsid(clsid),
            _ => ClassIdentifier::ProgId(trimmed.to_string()),
        }
    }
}

impl fmt::Display for ClassIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassIdentifier::Clsid(clsid) => write!(f, "{{{clsid}}}"),
            ClassIdentifier::ProgId(progid) => f.write_str(progid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::uuid;

    const CLSID_HEN: Clsid = uuid!("9eedb943-b267-4f0c-b8b6-59fe3851f239");

    struct NeverFactory;

    impl ClassFactory for NeverFactory {
        fn create_instance(
            &self,
            _outer: Option<Arc<dyn ComObject>>,
            _host: &Arc<ObjectHost>,
        ) -> Result<Arc<dyn ComObject>, HResult> {
            Err(hresult::E_NOTIMPL)
        }
    }

    #[test]
    fn test_parse_identifiers() {
        assert_eq!(
            ClassIdentifier::parse("{9eedb943-b267-4f0c-b8b6-59fe3851f239}"),
            ClassIdentifier::Clsid(CLSID_HEN)
        );
        assert_eq!(
            ClassIdentifier::parse("9EEDB943-B267-4F0C-B8B6-59FE3851F239"),
            ClassIdentifier::Clsid(CLSID_HEN)
        );
        assert_eq!(
            ClassIdentifier::parse("ManagedServer.PetShop.1"),
            ClassIdentifier::ProgId("ManagedServer.PetShop.1".to_string())
        );
        // simple-form GUIDs are not CLSID strings
        assert!(matches!(
            ClassIdentifier::parse("9eedb943b2674f0cb8b659fe3851f239"),
            ClassIdentifier::ProgId(_)
        ));
    }

    #[test]
    fn test_progid_lookup_ignores_case() {
        let registry = ClassRegistry::new();
        registry.register(
            ClassEntry::new(CLSID_HEN, ThreadingModel::Apartment, Arc::new(NeverFactory))
                .with_progid("AtlHenLib.AtlHen.1"),
        );

        let entry = registry.lookup_progid("atlhenlib.atlhen.1").unwrap();
        assert_eq!(entry.clsid, CLSID_HEN);
        assert_eq!(entry.threading, ThreadingModel::Apartment);
        assert_eq!(registry.clsid_from_progid("ATLHENLIB.ATLHEN.1"), Ok(CLSID_HEN));
        assert_eq!(registry.clsid_from_progid("AtlHenLib.Rooster.1"), Err(hresult::REGDB_E_CLASSNOTREG));
    }

    #[test]
    fn test_reregistration_replaces_progid() {
        let registry = ClassRegistry::new();
        let factory: Arc<dyn ClassFactory> = Arc::new(NeverFactory);
        registry.register(ClassEntry::new(CLSID_HEN, ThreadingModel::Free, factory.clone()).with_progid("Old.Hen.1"));
        registry.register(ClassEntry::new(CLSID_HEN, ThreadingModel::Both, factory).with_progid("New.Hen.1"));

        assert_eq!(registry.len(), 1);
        assert!(registry.lookup_progid("Old.Hen.1").is_none());
        assert_eq!(registry.lookup(&CLSID_HEN).unwrap().threading, ThreadingModel::Both);

        assert!(registry.unregister(&CLSID_HEN).is_some());
        assert!(registry.resolve(&ClassIdentifier::ProgId("new.hen.1".into())).is_none());
    }

    #[test]
    fn test_threading_model_names() {
        assert_eq!("apartment".parse::<ThreadingModel>(), Ok(ThreadingModel::Apartment));
        assert_eq!(ThreadingModel::Both.to_string(), "Both");
        assert!("rental".parse::<ThreadingModel>().is_err());
    }
}
