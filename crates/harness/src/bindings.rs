//! Interface bindings
//!
//! A [`BindingSet`] is what the harness knows about one type library: the
//! calling contract of every interface, flattened so inherited methods can
//! be called by name, plus the struct layouts those methods use. The
//! [`BindingRegistry`] resolves each library path once and hands out the
//! same set afterwards.

use crate::error::{HarnessError, Result};
use comharness_com::{Clsid, Iid};
use comharness_typelib::{
    generate_proxies, tlb, CoclassDef, InterfaceDef, ParamDirection, ProxyOptions, StructDef, TypeDesc,
    TypeLibError, TypeLibrary,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

#[derive(Clone, Debug, PartialEq)]
pub struct ParamBinding {
    pub name: String,
    pub ty: TypeDesc,
    pub direction: ParamDirection,
    pub retval: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MethodBinding {
    pub name: String,
    pub opnum: u16,
    pub params: Vec<ParamBinding>,
}

impl MethodBinding {
    pub fn inputs(&self) -> impl Iterator<Item = &ParamBinding> {
        self.params.iter().filter(|p| p.direction.is_in())
    }

    pub fn outputs(&self) -> impl Iterator<Item = &ParamBinding> {
        self.params.iter().filter(|p| p.direction.is_out())
    }
}

/// The calling contract of one interface
pub struct InterfaceBinding {
    pub name: String,
    pub iid: Iid,
    /// Own and inherited methods, by ascending opnum
    pub methods: Vec<MethodBinding>,
    /// Interfaces this one derives from, nearest first
    pub bases: Vec<String>,
    set: Weak<BindingSet>,
}

impl InterfaceBinding {
    fn lower(def: &InterfaceDef, lib: &TypeLibrary, set: Weak<BindingSet>) -> Self {
        let mut chain = vec![def];
        let mut current = def.base.as_deref().and_then(|base| lib.interface(base));
        while let Some(base) = current {
            if chain.iter().any(|seen| seen.name == base.name) {
                break;
            }
            chain.push(base);
            current = base.base.as_deref().and_then(|b| lib.interface(b));
        }

        let mut methods: Vec<MethodBinding> = Vec::new();
        for iface in &chain {
            for method in &iface.methods {
                if methods.iter().any(|m| m.name == method.name) {
                    continue;
                }
                methods.push(MethodBinding {
                    name: method.name.clone(),
                    opnum: method.opnum,
                    params: method
                        .params
                        .iter()
                        .map(|p| ParamBinding {
                            name: p.name.clone(),
                            ty: p.ty.clone(),
                            direction: p.direction,
                            retval: p.retval,
                        })
                        .collect(),
                });
            }
        }
        methods.sort_by_key(|m| m.opnum);

        Self {
            name: def.name.clone(),
            iid: def.iid,
            methods,
            bases: chain[1..].iter().map(|i| i.name.clone()).collect(),
            set,
        }
    }

    pub fn method(&self, name: &str) -> Option<&MethodBinding> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Whether a handle bound to this interface can be used as `interface`.
    pub fn is_a(&self, interface: &str) -> bool {
        self.name == interface || interface == "IUnknown" || self.bases.iter().any(|b| b == interface)
    }

    /// The set this binding was resolved in
    pub fn binding_set(&self) -> Option<Arc<BindingSet>> {
        self.set.upgrade()
    }
}

impl PartialEq for InterfaceBinding {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.iid == other.iid && self.methods == other.methods && self.bases == other.bases
    }
}

impl fmt::Debug for InterfaceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceBinding")
            .field("name", &self.name)
            .field("iid", &self.iid)
            .field("methods", &self.methods)
            .finish()
    }
}

/// Bindings for every interface of one type library
#[derive(Debug, PartialEq)]
pub struct BindingSet {
    source: PathBuf,
    library: TypeLibrary,
    interfaces: Vec<Arc<InterfaceBinding>>,
}

impl BindingSet {
    pub fn new(source: impl Into<PathBuf>, library: TypeLibrary) -> Arc<Self> {
        let source = source.into();
        Arc::new_cyclic(|set| {
            let interfaces = library
                .interfaces
                .iter()
                .map(|def| Arc::new(InterfaceBinding::lower(def, &library, set.clone())))
                .collect();
            Self { source, library, interfaces }
        })
    }

    /// The file the set was resolved from
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn library(&self) -> &TypeLibrary {
        &self.library
    }

    pub fn interfaces(&self) -> &[Arc<InterfaceBinding>] {
        &self.interfaces
    }

    pub fn interface(&self, name: &str) -> Result<&Arc<InterfaceBinding>> {
        self.interfaces
            .iter()
            .find(|i| i.name == name)
            .ok_or_else(|| HarnessError::UnknownInterface(name.to_string()))
    }

    pub fn interface_by_iid(&self, iid: &Iid) -> Option<&Arc<InterfaceBinding>> {
        self.interfaces.iter().find(|i| i.iid == *iid)
    }

    pub fn struct_def(&self, name: &str) -> Option<&StructDef> {
        self.library.struct_def(name)
    }

    /// The coclass registered under `progid`, case-insensitively
    pub fn coclass_by_progid(&self, progid: &str) -> Option<&CoclassDef> {
        self.library
            .coclasses
            .iter()
            .find(|c| c.progid.as_deref().is_some_and(|p| p.eq_ignore_ascii_case(progid)))
    }

    /// File stem the cache writes this library under
    pub fn cache_name(&self) -> String {
        let (major, minor) = self.library.version;
        format!("{}-{major}.{minor}", self.library.name)
    }
}

/// Resolves type libraries and remembers the result per canonical path
#[derive(Debug)]
pub struct BindingRegistry {
    root: PathBuf,
    cache_dir: Option<PathBuf>,
    entries: Mutex<HashMap<PathBuf, Arc<BindingSet>>>,
}

impl BindingRegistry {
    pub fn new(root: impl Into<PathBuf>, cache_dir: Option<PathBuf>) -> Self {
        Self { root: root.into(), cache_dir, entries: Mutex::new(HashMap::new()) }
    }

    /// Resolve the type library at `path`, relative to the registry root.
    ///
    /// `.idl` sources are compiled; anything else is read as a binary type
    /// library. The first resolution of a file is kept for the life of the
    /// registry.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<Arc<BindingSet>> {
        let path = path.as_ref();
        let full = if path.is_absolute() { path.to_path_buf() } else { self.root.join(path) };
        let canonical = full.canonicalize().map_err(|e| HarnessError::BindingResolution {
            path: full.clone(),
            reason: e.to_string(),
        })?;

        let mut entries = self.entries.lock();
        if let Some(set) = entries.get(&canonical) {
            debug!(path = %canonical.display(), "bindings already resolved");
            return Ok(set.clone());
        }

        let library = comharness_typelib::load(&canonical).map_err(|e| resolution_error(&canonical, e))?;
        let set = BindingSet::new(canonical.clone(), library);
        info!(
            path = %canonical.display(),
            library = %set.library(),
            interfaces = set.interfaces().len(),
            "resolved bindings"
        );

        if let Some(dir) = &self.cache_dir {
            if let Err(e) = write_cache(dir, &set) {
                warn!(dir = %dir.display(), error = %e, "failed to cache bindings");
            }
        }

        entries.insert(canonical, set.clone());
        Ok(set)
    }

    /// Clsid of `progid` in any library resolved so far
    pub fn clsid_from_progid(&self, progid: &str) -> Option<Clsid> {
        self.entries
            .lock()
            .values()
            .find_map(|set| set.coclass_by_progid(progid).map(|c| c.clsid))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn resolution_error(path: &Path, e: TypeLibError) -> HarnessError {
    HarnessError::BindingResolution { path: path.to_path_buf(), reason: e.to_string() }
}

/// Write the library and its generated proxies next to each other.
fn write_cache(dir: &Path, set: &BindingSet) -> std::result::Result<(), TypeLibError> {
    std::fs::create_dir_all(dir)?;
    let stem = set.cache_name();
    tlb::write_file(dir.join(format!("{stem}.tlb")), set.library())?;
    let source = generate_proxies(set.library(), &ProxyOptions::default())?;
    std::fs::write(dir.join(format!("{stem}.rs")), source)?;
    debug!(dir = %dir.display(), %stem, "cached bindings");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDL: &str = r#"
        interface IPostman;
        typedef struct Address { BSTR Street; BSTR City; } Address;

        [object, uuid(8a4b7f2e-1c3d-4e5f-9a0b-6c7d8e9f0a13)]
        interface IPostman : IUnknown { HRESULT OnBitten(); };

        [object, uuid(8a4b7f2e-1c3d-4e5f-9a0b-6c7d8e9f0a12)]
        interface IDog : IUnknown {
            HRESULT Sit();
            HRESULT Bite([in] IPostman* postman);
        };

        [object, uuid(8a4b7f2e-1c3d-4e5f-9a0b-6c7d8e9f0a16)]
        interface IGuardDog : IDog { HRESULT GetAddress([out, retval] Address* address); };

        [uuid(7c1e4a52-0d7b-4b5e-9a61-3f2d8c9e1b40), version(2.1)]
        library Kennel {
            [uuid(d162d2f7-cdf4-44bc-8018-6058420bcfdc), progid("Kennel.GuardDog.1")]
            coclass GuardDog { [default] interface IGuardDog; };
        };
    "#;

    fn write_idl(dir: &Path) -> PathBuf {
        let path = dir.join("kennel.idl");
        std::fs::write(&path, IDL).unwrap();
        path
    }

    #[test]
    fn test_inherited_methods_in_opnum_order() {
        let set = BindingSet::new("kennel.idl", comharness_typelib::compile(IDL).unwrap());
        let guard = set.interface("IGuardDog").unwrap();
        let methods: Vec<_> = guard.methods.iter().map(|m| (m.name.as_str(), m.opnum)).collect();
        assert_eq!(methods, vec![("Sit", 3), ("Bite", 4), ("GetAddress", 5)]);
        assert!(guard.is_a("IDog"));
        assert!(guard.is_a("IUnknown"));
        assert!(!guard.is_a("IPostman"));
        assert!(Arc::ptr_eq(&guard.binding_set().unwrap(), &set));
    }

    #[test]
    fn test_unknown_interface() {
        let set = BindingSet::new("kennel.idl", comharness_typelib::compile(IDL).unwrap());
        assert!(matches!(set.interface("ICat"), Err(HarnessError::UnknownInterface(name)) if name == "ICat"));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_idl(dir.path());

        let registry = BindingRegistry::new(dir.path(), None);
        let first = registry.resolve("kennel.idl").unwrap();
        let second = registry.resolve(dir.path().join("kennel.idl")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);

        let other = BindingRegistry::new(dir.path(), None).resolve("kennel.idl").unwrap();
        assert_eq!(*first, *other);
    }

    #[test]
    fn test_resolve_writes_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("cache");
        write_idl(dir.path());

        let registry = BindingRegistry::new(dir.path(), Some(cache.clone()));
        let set = registry.resolve("kennel.idl").unwrap();
        assert_eq!(set.cache_name(), "Kennel-2.1");

        let cached = tlb::read_file(cache.join("Kennel-2.1.tlb")).unwrap();
        assert_eq!(&cached, set.library());
        let source = std::fs::read_to_string(cache.join("Kennel-2.1.rs")).unwrap();
        assert!(source.contains("pub struct IGuardDog"));

        // The cached library resolves to the same contract
        let from_cache = registry.resolve(cache.join("Kennel-2.1.tlb")).unwrap();
        assert_eq!(from_cache.interfaces(), set.interfaces());
    }

    #[test]
    fn test_resolution_failures() {
        let dir = tempfile::tempdir().unwrap();
        let registry = BindingRegistry::new(dir.path(), None);

        let err = registry.resolve("missing.tlb").unwrap_err();
        assert!(err.is_binding_resolution());

        std::fs::write(dir.path().join("junk.tlb"), b"not a type library").unwrap();
        let err = registry.resolve("junk.tlb").unwrap_err();
        assert!(err.to_string().contains("malformed"), "{err}");

        let mut newer = tlb::encode(&comharness_typelib::compile(IDL).unwrap()).to_vec();
        newer[4..6].copy_from_slice(&(tlb::FORMAT_VERSION + 1).to_le_bytes());
        std::fs::write(dir.path().join("newer.tlb"), newer).unwrap();
        let err = registry.resolve("newer.tlb").unwrap_err();
        assert!(err.to_string().contains("newer"), "{err}");

        std::fs::write(dir.path().join("bad.idl"), "interface IBroken : IMissing { };").unwrap();
        assert!(registry.resolve("bad.idl").unwrap_err().is_binding_resolution());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_names_that_are_not_identifiers_fail_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("cache");
        let registry = BindingRegistry::new(dir.path(), Some(cache.clone()));

        let mut library = comharness_typelib::compile(IDL).unwrap();
        library.interfaces[0].name = "I-Postman".into();
        tlb::write_file(dir.path().join("odd.tlb"), &library).unwrap();

        let err = registry.resolve("odd.tlb").unwrap_err();
        assert!(err.is_binding_resolution(), "{err}");
        assert!(err.to_string().contains("not an identifier"), "{err}");
        assert!(registry.is_empty());
        assert!(!cache.exists());
    }

    #[test]
    fn test_progid_lookup() {
        let dir = tempfile::tempdir().unwrap();
        write_idl(dir.path());
        let registry = BindingRegistry::new(dir.path(), None);
        assert_eq!(registry.clsid_from_progid("Kennel.GuardDog.1"), None);
        registry.resolve("kennel.idl").unwrap();
        assert_eq!(
            registry.clsid_from_progid("kennel.guarddog.1").map(|c| c.to_string()),
            Some("d162d2f7-cdf4-44bc-8018-6058420bcfdc".to_string())
        );
    }
}
