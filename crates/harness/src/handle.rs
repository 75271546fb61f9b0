//! Object handles
//!
//! A [`ComObjectHandle`] is a remote interface plus the binding that says how
//! to call it. Clones share one proxy; the proxy's references go back to the
//! server when the last clone is dropped. Calls through one proxy share its
//! connection, so concurrent callers each take [`ComObjectHandle::with_own_connection`].

use crate::bindings::{BindingSet, InterfaceBinding};
use crate::error::{HarnessError, Result};
use crate::marshal;
use crate::value::Value;
use comharness_com::{ComObject, DcomClient, DcomError, Iid, InterfaceProxy, Ipid, ObjRef, ObjectHost, Oid, ThreadingModel};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct ComObjectHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    proxy: InterfaceProxy,
    binding: Arc<InterfaceBinding>,
    set: Arc<BindingSet>,
    client: DcomClient,
    /// Handle whose references a borrowed proxy uses
    _owner: Option<Arc<HandleInner>>,
}

impl ComObjectHandle {
    pub(crate) fn new(
        proxy: InterfaceProxy,
        binding: Arc<InterfaceBinding>,
        set: Arc<BindingSet>,
        client: DcomClient,
    ) -> Self {
        Self { inner: Arc::new(HandleInner { proxy, binding, set, client, _owner: None }) }
    }

    /// Another handle on the same interface pointer that dials its own
    /// connection. It holds no references of its own and keeps this handle
    /// alive until it is dropped.
    pub fn with_own_connection(&self) -> Result<ComObjectHandle> {
        let inner = &*self.inner;
        let mut objref = inner.proxy.objref().clone();
        objref.std.public_refs = 0;
        let proxy = inner
            .client
            .proxy(objref)
            .map_err(|e| HarnessError::type_mismatch("reachable OBJREF", e.to_string()))?
            .with_remunknown_ipid(inner.proxy.remunknown_ipid());
        Ok(Self {
            inner: Arc::new(HandleInner {
                proxy,
                binding: inner.binding.clone(),
                set: inner.set.clone(),
                client: inner.client.clone(),
                _owner: Some(self.inner.clone()),
            }),
        })
    }

    pub fn binding(&self) -> &Arc<InterfaceBinding> {
        &self.inner.binding
    }

    pub fn interface_name(&self) -> &str {
        &self.inner.binding.name
    }

    pub fn iid(&self) -> Iid {
        self.inner.proxy.iid()
    }

    pub fn ipid(&self) -> Ipid {
        self.inner.proxy.ipid()
    }

    pub fn objref(&self) -> &ObjRef {
        self.inner.proxy.objref()
    }

    /// Fail unless the handle can be used as `interface`.
    pub fn expect_interface(&self, interface: &str) -> Result<()> {
        if self.inner.binding.is_a(interface) {
            Ok(())
        } else {
            Err(HarnessError::type_mismatch(interface, self.interface_name()))
        }
    }

    /// Call `method` by name.
    ///
    /// The arguments are checked against the bound signature before anything
    /// is sent. Every `[out]` parameter comes back in the result.
    pub async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<InvokeResult> {
        let inner = &*self.inner;
        let binding = inner.binding.method(method).ok_or_else(|| HarnessError::UnknownMethod {
            interface: inner.binding.name.clone(),
            method: method.to_string(),
        })?;
        let stub = marshal::encode_inputs(binding, args, &inner.set)?;

        debug!(interface = %inner.binding.name, method, opnum = binding.opnum, "invoking");
        let reply = inner.proxy.invoke(binding.opnum, stub).await.map_err(|e| {
            debug!(interface = %inner.binding.name, method, error = %e, "call failed");
            HarnessError::RemoteInvocation { method: method.to_string(), status: e.hresult() }
        })?;
        marshal::decode_outputs(binding, &reply, &inner.set, &inner.client)
    }

    /// Ask the object for another interface of the same binding set.
    pub async fn query_interface(&self, interface: &str) -> Result<ComObjectHandle> {
        let binding = self.inner.set.interface(interface)?.clone();
        let proxy = self
            .inner
            .proxy
            .query_interface(binding.iid)
            .await
            .map_err(|e| HarnessError::RemoteInvocation { method: "QueryInterface".to_string(), status: e.hresult() })?;
        Ok(Self::new(proxy, binding, self.inner.set.clone(), self.inner.client.clone()))
    }

    /// Release the server's references now when this is the last clone.
    pub async fn release(self) -> Result<()> {
        match Arc::try_unwrap(self.inner) {
            Ok(inner) => inner
                .proxy
                .release()
                .await
                .map_err(|e| HarnessError::RemoteInvocation { method: "Release".to_string(), status: e.hresult() }),
            Err(_) => Ok(()),
        }
    }
}

impl PartialEq for ComObjectHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ipid() == other.ipid()
    }
}

impl fmt::Debug for ComObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComObjectHandle")
            .field("interface", &self.inner.binding.name)
            .field("proxy", &self.inner.proxy)
            .finish()
    }
}

/// An object the caller hosts and hands to servers as an interface pointer
#[derive(Clone)]
pub struct LocalObject {
    object: Arc<dyn ComObject>,
    host: Arc<ObjectHost>,
}

impl LocalObject {
    pub(crate) fn new(object: Arc<dyn ComObject>, host: Arc<ObjectHost>) -> Self {
        Self { object, host }
    }

    pub fn object(&self) -> &Arc<dyn ComObject> {
        &self.object
    }

    pub fn oid(&self) -> Oid {
        self.object.oid()
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.object.as_any().downcast_ref()
    }

    /// Export `iid` afresh for one call. The callee owns the references it
    /// receives, so the export lasts until the callee releases it.
    pub(crate) fn marshal(&self, iid: Iid) -> std::result::Result<ObjRef, DcomError> {
        self.host.export(self.object.clone(), iid, ThreadingModel::Free)
    }
}

impl PartialEq for LocalObject {
    fn eq(&self, other: &Self) -> bool {
        self.oid() == other.oid()
    }
}

impl fmt::Debug for LocalObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalObject")
            .field("oid", &self.object.oid())
            .field("interfaces", &self.object.supported_interfaces())
            .finish()
    }
}

/// What a call handed back: the `[out, retval]` value and the other `[out]`
/// parameters by name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InvokeResult {
    pub(crate) retval: Option<Value>,
    pub(crate) outs: Vec<(String, Value)>,
}

impl InvokeResult {
    pub fn retval(&self) -> Option<&Value> {
        self.retval.as_ref()
    }

    pub fn out(&self, name: &str) -> Option<&Value> {
        self.outs.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn take_retval(&mut self) -> Result<Value> {
        self.retval.take().ok_or_else(|| HarnessError::MissingValue("retval".to_string()))
    }

    pub fn take_out(&mut self, name: &str) -> Result<Value> {
        let index = self
            .outs
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| HarnessError::MissingValue(name.to_string()))?;
        Ok(self.outs.remove(index).1)
    }

    /// True for methods with no `[out]` parameters
    pub fn is_empty(&self) -> bool {
        self.retval.is_none() && self.outs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoke_result_take() {
        let mut result = InvokeResult {
            retval: Some(Value::from("Oslo")),
            outs: vec![("count".to_string(), Value::U32(2))],
        };
        assert_eq!(result.out("count"), Some(&Value::U32(2)));
        assert_eq!(result.take_out("count").unwrap(), Value::U32(2));
        assert!(result.take_out("count").is_err());
        assert_eq!(result.take_retval().unwrap(), Value::from("Oslo"));
        assert!(matches!(result.take_retval(), Err(HarnessError::MissingValue(_))));
        assert!(result.is_empty());
    }
}
