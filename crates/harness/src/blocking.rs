//! Blocking harness
//!
//! The same operations as [`crate::Harness`] for callers without a runtime.
//! Each call blocks the calling thread until the server answers. Do not use
//! it from inside an async context.

use crate::bindings::{BindingSet, InterfaceBinding};
use crate::config::HarnessConfig;
use crate::error::Result;
use crate::handle::{ComObjectHandle, InvokeResult, LocalObject};
use crate::value::Value;
use comharness_com::ComObject;
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Runtime;

pub struct Harness {
    inner: crate::Harness,
    runtime: Arc<Runtime>,
}

impl Harness {
    pub fn new(config: HarnessConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
        Ok(Self { inner: crate::Harness::new(config), runtime: Arc::new(runtime) })
    }

    /// The async harness this one drives
    pub fn inner(&self) -> &crate::Harness {
        &self.inner
    }

    pub fn resolve_bindings(&self, path: impl AsRef<Path>) -> Result<Arc<BindingSet>> {
        self.inner.resolve_bindings(path)
    }

    pub fn create_object(&self, identifier: &str, binding: &Arc<InterfaceBinding>) -> Result<ObjectHandle> {
        let handle = self.runtime.block_on(self.inner.create_object(identifier, binding))?;
        Ok(ObjectHandle { handle, runtime: self.runtime.clone() })
    }

    pub fn export_callback(&self, object: Arc<dyn ComObject>) -> Result<LocalObject> {
        self.runtime.block_on(self.inner.export_callback(object))
    }

    pub fn shutdown(&self) {
        self.runtime.block_on(self.inner.shutdown());
    }
}

/// A [`ComObjectHandle`] whose calls block
#[derive(Clone, Debug)]
pub struct ObjectHandle {
    handle: ComObjectHandle,
    runtime: Arc<Runtime>,
}

impl ObjectHandle {
    pub fn handle(&self) -> &ComObjectHandle {
        &self.handle
    }

    pub fn into_handle(self) -> ComObjectHandle {
        self.handle
    }

    pub fn invoke(&self, method: &str, args: Vec<Value>) -> Result<InvokeResult> {
        self.runtime.block_on(self.handle.invoke(method, args))
    }
}
