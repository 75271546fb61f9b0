//! `PetShop`, the managed server's class

use crate::callback::unsupported;
use crate::{clsid, iid, opnum};
use bytes::Bytes;
use comharness_com::types::marshal_interface;
use comharness_com::{hresult, CallFuture, ComObject, DcomError, HResult, Iid, ObjectHost, Oid};
use comharness_ndr::{Bstr, NdrWriter};
use std::any::Any;
use std::sync::{Arc, Weak};
use tracing::info;

/// What `IPetShop::GetAddress` answers: street, postal code and city
pub const SHOP_ADDRESS: (&str, &str, &str) = ("Suhms gate", "0363", "Oslo");

pub struct PetShop {
    oid: Oid,
    /// The shop's own server, where the dogs it sells are created
    host: Weak<ObjectHost>,
}

impl PetShop {
    pub fn new(host: &Arc<ObjectHost>) -> Self {
        Self { oid: Oid::generate(), host: Arc::downgrade(host) }
    }

    pub(crate) fn create(host: &Arc<ObjectHost>) -> Result<Arc<dyn ComObject>, HResult> {
        Ok(Arc::new(Self::new(host)))
    }

    fn buy_dog(&self) -> Result<Bytes, DcomError> {
        let host = self
            .host
            .upgrade()
            .ok_or(DcomError::Failed(hresult::CO_E_SERVER_EXEC_FAILURE))?;
        let dog = host.create_instance(&clsid::GUARD_DOG, iid::IDOG)?;
        info!(ipid = %dog.std.ipid, "sold a dog");

        let mut outs = NdrWriter::new();
        outs.write(&marshal_interface(Some(&dog))?)?;
        Ok(outs.into_bytes())
    }

    fn address() -> Result<Bytes, DcomError> {
        let (street, postal_code, city) = SHOP_ADDRESS;
        let mut outs = NdrWriter::new();
        outs.write(&Bstr::new(street))?
            .write(&Bstr::new(postal_code))?
            .write(&Bstr::new(city))?;
        Ok(outs.into_bytes())
    }
}

impl ComObject for PetShop {
    fn oid(&self) -> Oid {
        self.oid
    }

    fn supported_interfaces(&self) -> Vec<Iid> {
        vec![iid::IPETSHOP]
    }

    fn invoke(&self, iid: &Iid, opnum: u16, _args: Bytes) -> CallFuture {
        if *iid != iid::IPETSHOP {
            return unsupported(iid, opnum);
        }
        let result = match opnum {
            opnum::BUY_DOG => self.buy_dog(),
            opnum::GET_ADDRESS => Self::address(),
            _ => return unsupported(iid, opnum),
        };
        Box::pin(async move { result })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
