//! DCOM identifiers
//!
//! - OXID: object exporter, one per server process here
//! - OID: object within an exporter
//! - IPID: one interface on one object
//!
//! CLSIDs and IIDs are plain GUIDs.

use comharness_ndr::{Buf, BufMut, NdrContext, NdrDecode, NdrEncode};
use std::fmt;
use uuid::Uuid;

pub type Clsid = Uuid;
pub type Iid = Uuid;

fn random_u64() -> u64 {
    Uuid::new_v4().as_u64_pair().0
}

macro_rules! ndr_u64_id {
    ($name:ident, $label:literal) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            pub const SIZE: usize = 8;

            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            pub fn generate() -> Self {
                Self(random_u64())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "({:016x})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:016x}", self.0)
            }
        }

        impl NdrEncode for $name {
            fn ndr_encode<B: BufMut>(
                &self,
                buf: &mut B,
                ctx: &NdrContext,
                position: &mut usize,
            ) -> comharness_ndr::Result<()> {
                self.0.ndr_encode(buf, ctx, position)
            }

            fn ndr_align() -> usize {
                8
            }
        }

        impl NdrDecode for $name {
            fn ndr_decode<B: Buf>(
                buf: &mut B,
                ctx: &NdrContext,
                position: &mut usize,
            ) -> comharness_ndr::Result<Self> {
                u64::ndr_decode(buf, ctx, position).map(Self)
            }

            fn ndr_align() -> usize {
                8
            }
        }
    };
}

ndr_u64_id!(Oxid, "OXID");
ndr_u64_id!(Oid, "OID");

/// Interface pointer identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Ipid(pub Uuid);

impl Ipid {
    pub const SIZE: usize = 16;

    pub const fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    pub fn uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Debug for Ipid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IPID({})", self.0)
    }
}

impl fmt::Display for Ipid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl NdrEncode for Ipid {
    fn ndr_encode<B: BufMut>(&self, buf: &mut B, ctx: &NdrContext, position: &mut usize) -> comharness_ndr::Result<()> {
        self.0.ndr_encode(buf, ctx, position)
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for Ipid {
    fn ndr_decode<B: Buf>(buf: &mut B, ctx: &NdrContext, position: &mut usize) -> comharness_ndr::Result<Self> {
        Uuid::ndr_decode(buf, ctx, position).map(Self)
    }

    fn ndr_align() -> usize {
        4
    }
}
