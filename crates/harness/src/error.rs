//! Harness errors

use comharness_com::{hresult, HResult};
use std::path::PathBuf;
use thiserror::Error;

/// Result type for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;

#[derive(Error, Debug)]
pub enum HarnessError {
    /// The type library is missing, malformed or from a newer format
    #[error("cannot resolve bindings from {}: {reason}", path.display())]
    BindingResolution { path: PathBuf, reason: String },

    #[error("cannot create {identifier}: {status} ({reason})")]
    ObjectCreation {
        identifier: String,
        status: HResult,
        reason: String,
    },

    /// The server answered with a failing HRESULT or the call faulted
    #[error("{method} failed: {status}")]
    RemoteInvocation { method: String, status: HResult },

    #[error("{interface} has no method {method}")]
    UnknownMethod { interface: String, method: String },

    #[error("bad arguments for {method}: {reason}")]
    ArgumentMismatch { method: String, reason: String },

    #[error("unknown interface {0}")]
    UnknownInterface(String),

    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("no value named {0}")]
    MissingValue(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("NDR error: {0}")]
    Ndr(#[from] comharness_ndr::NdrError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    pub(crate) fn argument_mismatch(method: &str, reason: impl Into<String>) -> Self {
        Self::ArgumentMismatch { method: method.to_string(), reason: reason.into() }
    }

    pub(crate) fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch { expected: expected.into(), found: found.into() }
    }

    /// The HRESULT a COM caller would have seen, when the error has one.
    pub fn status(&self) -> Option<HResult> {
        match self {
            Self::ObjectCreation { status, .. } | Self::RemoteInvocation { status, .. } => Some(*status),
            Self::UnknownMethod { .. } => Some(hresult::DISP_E_UNKNOWNNAME),
            Self::ArgumentMismatch { .. } | Self::TypeMismatch { .. } => Some(hresult::E_INVALIDARG),
            Self::UnknownInterface(_) => Some(hresult::E_NOINTERFACE),
            Self::BindingResolution { .. } | Self::MissingValue(_) | Self::Config(_) | Self::Ndr(_) | Self::Io(_) => None,
        }
    }

    pub fn is_binding_resolution(&self) -> bool {
        matches!(self, Self::BindingResolution { .. })
    }

    pub fn is_object_creation(&self) -> bool {
        matches!(self, Self::ObjectCreation { .. })
    }

    pub fn is_remote_invocation(&self) -> bool {
        matches!(self, Self::RemoteInvocation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status() {
        let err = HarnessError::RemoteInvocation {
            method: "Cluck".to_string(),
            status: hresult::RPC_E_SERVER_DIED_DNE,
        };
        assert_eq!(err.status(), Some(hresult::RPC_E_SERVER_DIED_DNE));
        assert!(err.is_remote_invocation());

        let err = HarnessError::UnknownMethod { interface: "IHen".into(), method: "Crow".into() };
        assert_eq!(err.status(), Some(hresult::DISP_E_UNKNOWNNAME));
        assert_eq!(err.to_string(), "IHen has no method Crow");

        let err = HarnessError::BindingResolution { path: "missing.tlb".into(), reason: "not found".into() };
        assert_eq!(err.status(), None);
        assert!(err.is_binding_resolution());
    }
}
