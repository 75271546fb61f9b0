//! The ATL hens
//!
//! `AtlHen` and `FreeThreadedHen` share one implementation. They differ only
//! in their class registration, which decides the apartment an instance is
//! placed in.

use crate::callback::{call_back, unsupported};
use crate::{iid, opnum};
use bytes::Bytes;
use comharness_com::{CallFuture, ComObject, HResult, Iid, ObjectHost, Oid};
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

pub struct Hen {
    oid: Oid,
    clucks: AtomicU64,
}

impl Hen {
    pub fn new() -> Self {
        Self { oid: Oid::generate(), clucks: AtomicU64::new(0) }
    }

    pub(crate) fn create(_host: &Arc<ObjectHost>) -> Result<Arc<dyn ComObject>, HResult> {
        Ok(Arc::new(Self::new()))
    }

    /// Calls to `Cluck` and `CluckAsync` so far
    pub fn clucks(&self) -> u64 {
        self.clucks.load(Ordering::Relaxed)
    }
}

impl Default for Hen {
    fn default() -> Self {
        Self::new()
    }
}

impl ComObject for Hen {
    fn oid(&self) -> Oid {
        self.oid
    }

    fn supported_interfaces(&self) -> Vec<Iid> {
        vec![iid::IHEN]
    }

    fn invoke(&self, iid: &Iid, opnum: u16, args: Bytes) -> CallFuture {
        if *iid != iid::IHEN {
            return unsupported(iid, opnum);
        }
        match opnum {
            opnum::CLUCK => {
                let count = self.clucks.fetch_add(1, Ordering::Relaxed) + 1;
                Box::pin(async move {
                    debug!(clucks = count, "cluck");
                    info!("Cluck!");
                    Ok(Bytes::new())
                })
            }
            opnum::CLUCK_ASYNC => {
                self.clucks.fetch_add(1, Ordering::Relaxed);
                Box::pin(call_back(args, opnum::ON_CLUCK))
            }
            _ => unsupported(iid, opnum),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::AtlCluckObserver;
    use comharness_com::types::marshal_interface;
    use comharness_com::{Apartment, ClassRegistry, DcomServer, DcomServerConfig};
    use comharness_ndr::NdrWriter;

    #[tokio::test]
    async fn test_cluck_counts() {
        let hen = Hen::new();
        hen.invoke(&iid::IHEN, opnum::CLUCK, Bytes::new()).await.unwrap();
        hen.invoke(&iid::IHEN, opnum::CLUCK, Bytes::new()).await.unwrap();
        assert_eq!(hen.clucks(), 2);
    }

    #[tokio::test]
    async fn test_wrong_interface() {
        let hen = Hen::new();
        assert!(hen.invoke(&iid::IDOG, opnum::SIT, Bytes::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_cluck_async_reaches_observer() {
        let server = DcomServer::bind(DcomServerConfig::default(), Arc::new(ClassRegistry::new()))
            .await
            .unwrap();
        server.spawn().unwrap();

        let observer = Arc::new(AtlCluckObserver::new());
        let mta: Arc<dyn Apartment> = server.exporter().dispatcher().default_mta();
        let objref = server
            .exporter()
            .marshal(observer.clone(), iid::IASYNC_CLUCK_OBSERVER, &mta)
            .unwrap();

        let mut args = NdrWriter::new();
        args.write(&marshal_interface(Some(&objref)).unwrap()).unwrap();

        let hen = Hen::new();
        hen.invoke(&iid::IHEN, opnum::CLUCK_ASYNC, args.into_bytes()).await.unwrap();
        assert_eq!(observer.clucks(), 1);

        server.shutdown().await;
    }
}
