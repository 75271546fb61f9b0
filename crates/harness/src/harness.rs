//! The harness
//!
//! Ties binding resolution, activation and callbacks together:
//!
//! ```text
//! resolve_bindings(path) ──► BindingSet ──► InterfaceBinding
//!                                                 │
//! create_object(identifier, &binding) ──► ComObjectHandle ──► invoke(...)
//! ```
//!
//! Classes are activated on the embedded server unless the configuration
//! names an endpoint for them. The embedded server and the callback exporter
//! both start on first use.

use crate::bindings::{BindingRegistry, BindingSet, InterfaceBinding};
use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::handle::{ComObjectHandle, LocalObject};
use comharness_com::{
    hresult, ClassIdentifier, ClassRegistry, Clsid, ComObject, DcomClient, DcomClientConfig, DcomError, DcomServer,
    DcomServerConfig, HResult,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

pub struct Harness {
    config: HarnessConfig,
    bindings: BindingRegistry,
    client: DcomClient,
    classes: Arc<ClassRegistry>,
    embedded: Mutex<EmbeddedServer>,
    callbacks: OnceCell<DcomServer>,
}

enum EmbeddedServer {
    NotStarted,
    Running(Arc<DcomServer>),
    Stopped,
}

impl Harness {
    pub fn new(config: HarnessConfig) -> Self {
        let bindings = BindingRegistry::new(config.typelib_root.clone(), config.cache_dir.clone());
        let client = DcomClient::new(DcomClientConfig::default().with_call_timeout(config.call_timeout()));
        Self {
            config,
            bindings,
            client,
            classes: comharness_servers::class_registry(),
            embedded: Mutex::new(EmbeddedServer::NotStarted),
            callbacks: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn bindings(&self) -> &BindingRegistry {
        &self.bindings
    }

    /// Resolve the interface bindings of a type library.
    ///
    /// Relative paths resolve against `typelib_root`. Resolving a file again
    /// returns the bindings of the first resolution.
    pub fn resolve_bindings(&self, path: impl AsRef<Path>) -> Result<Arc<BindingSet>> {
        self.bindings.resolve(path)
    }

    /// Create an instance of the class `identifier` names and bind it to
    /// `binding`.
    ///
    /// `identifier` is a progid or a CLSID, braced or bare.
    pub async fn create_object(&self, identifier: &str, binding: &Arc<InterfaceBinding>) -> Result<ComObjectHandle> {
        let set = binding.binding_set().ok_or_else(|| HarnessError::UnknownInterface(binding.name.clone()))?;
        let creation_error = |status: HResult, reason: String| HarnessError::ObjectCreation {
            identifier: identifier.to_string(),
            status,
            reason,
        };

        let (clsid, endpoint) = self.route(&ClassIdentifier::parse(identifier)).await?;
        debug!(identifier, %clsid, %endpoint, interface = %binding.name, "activating");

        let proxy = self
            .client
            .create_instance(endpoint, clsid, binding.iid)
            .await
            .map_err(|e| match e {
                DcomError::Failed(hr) => creation_error(hr, format!("activation returned {hr}")),
                other => creation_error(hresult::CO_E_SERVER_EXEC_FAILURE, other.to_string()),
            })?;
        info!(identifier, ipid = %proxy.ipid(), interface = %binding.name, "created object");
        Ok(ComObjectHandle::new(proxy, binding.clone(), set, self.client.clone()))
    }

    /// CLSID and server endpoint for a class
    async fn route(&self, identifier: &ClassIdentifier) -> Result<(Clsid, SocketAddr)> {
        let not_registered = || HarnessError::ObjectCreation {
            identifier: identifier.to_string(),
            status: hresult::REGDB_E_CLASSNOTREG,
            reason: "class is not registered".to_string(),
        };

        for entry in &self.config.servers {
            let clsid = match ClassIdentifier::parse(&entry.clsid) {
                ClassIdentifier::Clsid(clsid) => clsid,
                ClassIdentifier::ProgId(_) => {
                    return Err(HarnessError::Config(format!("server entry has an invalid clsid {:?}", entry.clsid)))
                }
            };
            let matches = match identifier {
                ClassIdentifier::Clsid(wanted) => *wanted == clsid,
                ClassIdentifier::ProgId(progid) => {
                    entry.progid.as_deref().is_some_and(|p| p.eq_ignore_ascii_case(progid))
                }
            };
            if matches {
                return Ok((clsid, self.lookup_endpoint(identifier, &entry.endpoint).await?));
            }
        }

        let clsid = match identifier {
            ClassIdentifier::Clsid(clsid) => *clsid,
            ClassIdentifier::ProgId(progid) => self
                .bindings
                .clsid_from_progid(progid)
                .or_else(|| self.classes.clsid_from_progid(progid).ok())
                .ok_or_else(not_registered)?,
        };

        let endpoint = match &self.config.remote_server {
            Some(server) => self.lookup_endpoint(identifier, server).await?,
            None => self.embedded_server().await?.local_addr(),
        };
        Ok((clsid, endpoint))
    }

    async fn lookup_endpoint(&self, identifier: &ClassIdentifier, endpoint: &str) -> Result<SocketAddr> {
        let unreachable = |reason: String| HarnessError::ObjectCreation {
            identifier: identifier.to_string(),
            status: hresult::CO_E_SERVER_EXEC_FAILURE,
            reason,
        };
        tokio::net::lookup_host(endpoint)
            .await
            .map_err(|e| unreachable(format!("{endpoint}: {e}")))?
            .next()
            .ok_or_else(|| unreachable(format!("{endpoint} has no address")))
    }

    /// The in-process server hosting the test classes
    pub async fn embedded_server(&self) -> Result<Arc<DcomServer>> {
        let mut embedded = self.embedded.lock().await;
        match &*embedded {
            EmbeddedServer::Running(server) => return Ok(server.clone()),
            EmbeddedServer::Stopped => {
                return Err(HarnessError::ObjectCreation {
                    identifier: "embedded server".to_string(),
                    status: hresult::CO_E_SERVER_EXEC_FAILURE,
                    reason: "the harness has been shut down".to_string(),
                })
            }
            EmbeddedServer::NotStarted => {}
        }

        let server = self
            .start_server(self.classes.clone())
            .await
            .map_err(|e| HarnessError::ObjectCreation {
                identifier: "embedded server".to_string(),
                status: hresult::CO_E_SERVER_EXEC_FAILURE,
                reason: e.to_string(),
            })?;
        info!(addr = %server.local_addr(), classes = self.classes.len(), "started embedded server");
        let server = Arc::new(server);
        *embedded = EmbeddedServer::Running(server.clone());
        Ok(server)
    }

    async fn start_server(&self, classes: Arc<ClassRegistry>) -> std::result::Result<DcomServer, DcomError> {
        let addr = format!("{}:0", self.config.bind_host)
            .parse()
            .map_err(|_| DcomError::InvalidStringBinding(self.config.bind_host.clone()))?;
        let server = DcomServer::bind(DcomServerConfig::new(addr), classes).await?;
        server.spawn()?;
        Ok(server)
    }

    /// Host `object` in the harness so servers can call it back.
    ///
    /// Pass the result as a `[in]` interface pointer argument.
    pub async fn export_callback(&self, object: Arc<dyn ComObject>) -> Result<LocalObject> {
        let server = self
            .callbacks
            .get_or_try_init(|| async {
                let server = self.start_server(Arc::new(ClassRegistry::new())).await?;
                info!(addr = %server.local_addr(), "started callback exporter");
                Ok::<_, DcomError>(server)
            })
            .await
            .map_err(|e| HarnessError::ObjectCreation {
                identifier: "callback exporter".to_string(),
                status: e.hresult(),
                reason: e.to_string(),
            })?;
        debug!(oid = %object.oid(), "callback object ready");
        Ok(LocalObject::new(object, server.host().clone()))
    }

    /// Stop the embedded server and the callback exporter.
    ///
    /// Handles on the embedded server's objects fail from here on with
    /// `RPC_E_SERVER_DIED_DNE`.
    pub async fn shutdown(&self) {
        let previous = std::mem::replace(&mut *self.embedded.lock().await, EmbeddedServer::Stopped);
        if let EmbeddedServer::Running(server) = previous {
            server.shutdown().await;
            info!(addr = %server.local_addr(), "embedded server stopped");
        }
        if let Some(server) = self.callbacks.get() {
            server.shutdown().await;
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        if let Ok(EmbeddedServer::Running(_)) = self.embedded.try_lock().as_deref() {
            warn!("harness dropped without shutdown");
        }
    }
}
