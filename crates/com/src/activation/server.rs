//! RemoteActivation on the server side

use super::protocol::*;
use crate::server::ObjectHost;
use crate::types::{hresult, DcomError};
use bytes::Bytes;
use comharness_rpc::{Interface, InterfaceBuilder};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ActivationServer {
    host: Arc<ObjectHost>,
}

impl ActivationServer {
    pub fn new(host: Arc<ObjectHost>) -> Self {
        Self { host }
    }

    /// The opnum-dispatched RPC interface to register with the server
    pub fn build_interface(&self) -> Interface {
        let host = self.host.clone();
        InterfaceBuilder::from_syntax(activation_syntax())
            .operation(opnum::REMOTE_ACTIVATION, move |args: Bytes| {
                let host = host.clone();
                async move {
                    let request = RemoteActivationRequest::decode(&args).map_err(DcomError::into_fault)?;
                    remote_activation(&host, &request)
                        .encode()
                        .map_err(DcomError::into_fault)
                }
            })
            .build()
    }
}

/// Create an instance of `request.clsid` and export each requested
/// interface.
///
/// Interfaces the object lacks fail individually with `E_NOINTERFACE`. The
/// activation as a whole fails only when the class is unknown, its factory
/// refuses, or no requested interface could be exported.
pub fn remote_activation(host: &Arc<ObjectHost>, request: &RemoteActivationRequest) -> RemoteActivationResponse {
    let exporter = host.exporter();
    let failure = |hr| RemoteActivationResponse::failure(exporter.oxid(), exporter.bindings().clone(), hr);

    let (object, threading) = match host.instantiate(&request.clsid) {
        Ok(created) => created,
        Err(e) => {
            warn!(clsid = %request.clsid, "activation failed: {}", e);
            return failure(e.hresult());
        }
    };
    let apartment = host.apartment_for(threading);

    let results: Vec<InterfaceResult> = request
        .interfaces
        .iter()
        .map(|iid| match exporter.export(object.clone(), *iid, &apartment) {
            Ok(std) => InterfaceResult::success(std),
            Err(e) => {
                debug!(clsid = %request.clsid, %iid, "interface not exported: {}", e);
                InterfaceResult::failure(e.hresult())
            }
        })
        .collect();

    if !results.iter().any(|r| r.hresult.is_success()) {
        return failure(hresult::E_NOINTERFACE);
    }

    info!(clsid = %request.clsid, oid = %object.oid(), %threading, "activated");
    RemoteActivationResponse::success(
        exporter.oxid(),
        exporter.bindings().clone(),
        exporter.remunknown_ipid(),
        results,
    )
}
