//! Core DCOM types
//!
//! - Identifiers: OXID, OID, IPID
//! - Object references: STDOBJREF, OBJREF, MInterfacePointer
//! - String bindings: DUALSTRINGARRAY
//! - ORPC headers: ORPCTHIS, ORPCTHAT
//! - HRESULT status codes

mod error;
pub mod hresult;
mod identifiers;
mod objref;
mod orpc;
mod stdobjref;
mod stringbinding;

pub use error::*;
pub use hresult::HResult;
pub use identifiers::{Clsid, Iid, Ipid, Oid, Oxid};
pub use objref::*;
pub use orpc::*;
pub use stdobjref::*;
pub use stringbinding::*;

/// Well-known interface identifiers
pub mod iid {
    use uuid::{uuid, Uuid};

    pub const IUNKNOWN: Uuid = uuid!("00000000-0000-0000-c000-000000000046");
    pub const ICLASSFACTORY: Uuid = uuid!("00000001-0000-0000-c000-000000000046");
    pub const IREMUNKNOWN: Uuid = uuid!("00000131-0000-0000-c000-000000000046");
    pub const IACTIVATION: Uuid = uuid!("4d9f4ab8-7d1c-11cf-861e-0020af6e7c57");
}
