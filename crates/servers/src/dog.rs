//! `GuardDog`, the free-threaded ATL server's dog

use crate::callback::{call_back, unsupported};
use crate::{iid, opnum};
use bytes::Bytes;
use comharness_com::{CallFuture, ComObject, HResult, Iid, ObjectHost, Oid};
use std::any::Any;
use std::sync::Arc;
use tracing::info;

pub struct GuardDog {
    oid: Oid,
}

impl GuardDog {
    pub fn new() -> Self {
        Self { oid: Oid::generate() }
    }

    pub(crate) fn create(_host: &Arc<ObjectHost>) -> Result<Arc<dyn ComObject>, HResult> {
        Ok(Arc::new(Self::new()))
    }
}

impl Default for GuardDog {
    fn default() -> Self {
        Self::new()
    }
}

impl ComObject for GuardDog {
    fn oid(&self) -> Oid {
        self.oid
    }

    fn supported_interfaces(&self) -> Vec<Iid> {
        vec![iid::IDOG]
    }

    fn invoke(&self, iid: &Iid, opnum: u16, args: Bytes) -> CallFuture {
        if *iid != iid::IDOG {
            return unsupported(iid, opnum);
        }
        match opnum {
            opnum::SIT => Box::pin(async {
                info!("Sitting!");
                Ok(Bytes::new())
            }),
            opnum::BITE => Box::pin(async move {
                info!("biting the postman");
                call_back(args, opnum::ON_BITTEN).await
            }),
            _ => unsupported(iid, opnum),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
