//! Client-side callback objects
//!
//! These live in the caller's process. A server reaches them through the
//! OBJREF the caller marshals into `IHen::CluckAsync` or `IDog::Bite`.

use crate::callback::unsupported;
use crate::{iid, opnum};
use bytes::Bytes;
use comharness_com::{CallFuture, ComObject, Iid, Oid};
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Counts `OnCluck` callbacks
pub struct AtlCluckObserver {
    oid: Oid,
    clucks: AtomicU64,
}

impl AtlCluckObserver {
    pub fn new() -> Self {
        Self { oid: Oid::generate(), clucks: AtomicU64::new(0) }
    }

    pub fn clucks(&self) -> u64 {
        self.clucks.load(Ordering::SeqCst)
    }
}

impl Default for AtlCluckObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ComObject for AtlCluckObserver {
    fn oid(&self) -> Oid {
        self.oid
    }

    fn supported_interfaces(&self) -> Vec<Iid> {
        vec![iid::IASYNC_CLUCK_OBSERVER]
    }

    fn invoke(&self, iid: &Iid, opnum: u16, _args: Bytes) -> CallFuture {
        if *iid != iid::IASYNC_CLUCK_OBSERVER || opnum != opnum::ON_CLUCK {
            return unsupported(iid, opnum);
        }
        self.clucks.fetch_add(1, Ordering::SeqCst);
        Box::pin(async {
            info!("Cluck");
            Ok(Bytes::new())
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Counts `OnBitten` callbacks
pub struct Postman {
    oid: Oid,
    bites: AtomicU64,
}

impl Postman {
    pub fn new() -> Self {
        Self { oid: Oid::generate(), bites: AtomicU64::new(0) }
    }

    pub fn bites(&self) -> u64 {
        self.bites.load(Ordering::SeqCst)
    }
}

impl Default for Postman {
    fn default() -> Self {
        Self::new()
    }
}

impl ComObject for Postman {
    fn oid(&self) -> Oid {
        self.oid
    }

    fn supported_interfaces(&self) -> Vec<Iid> {
        vec![iid::IPOSTMAN]
    }

    fn invoke(&self, iid: &Iid, opnum: u16, _args: Bytes) -> CallFuture {
        if *iid != iid::IPOSTMAN || opnum != opnum::ON_BITTEN {
            return unsupported(iid, opnum);
        }
        self.bites.fetch_add(1, Ordering::SeqCst);
        Box::pin(async {
            info!("Ouch!");
            Ok(Bytes::new())
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_observer_counts_clucks() {
        let observer = AtlCluckObserver::new();
        observer
            .invoke(&iid::IASYNC_CLUCK_OBSERVER, opnum::ON_CLUCK, Bytes::new())
            .await
            .unwrap();
        assert_eq!(observer.clucks(), 1);
        assert!(observer.invoke(&iid::IPOSTMAN, opnum::ON_BITTEN, Bytes::new()).await.is_err());
        assert_eq!(observer.clucks(), 1);
    }

    #[tokio::test]
    async fn test_postman_counts_bites() {
        let postman = Postman::new();
        postman.invoke(&iid::IPOSTMAN, opnum::ON_BITTEN, Bytes::new()).await.unwrap();
        assert_eq!(postman.bites(), 1);
    }
}
