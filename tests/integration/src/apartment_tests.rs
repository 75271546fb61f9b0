//! Apartment Tests - Where activated objects live and how their calls run
//!
//! These tests exercise the threading models end to end:
//! - Each hosted class lands in the apartment its registration names
//! - STA objects never see overlapping calls, even from many connections
//! - MTA objects serve callers concurrently

mod common;

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;

use comharness::proxies::{progid, IDog, IHen, IPetShop};
use comharness_com::{
    hresult, Apartment, ApartmentType, CallFuture, ClassEntry, ClassRegistry, Clsid, ComObject, DcomClient,
    DcomClientConfig, DcomServer, DcomServerConfig, FnClassFactory, HResult, Iid, Ipid, ObjectHost, Oid,
    ThreadingModel,
};

use common::*;

const IID_ISLEEPER: Iid = uuid::uuid!("c4a1d3e2-5b6f-4a70-8c9d-0e1f2a3b4c5d");
const CLSID_STA_SLEEPER: Clsid = uuid::uuid!("c4a1d3e2-5b6f-4a70-8c9d-0e1f2a3b4c01");
const CLSID_MTA_SLEEPER: Clsid = uuid::uuid!("c4a1d3e2-5b6f-4a70-8c9d-0e1f2a3b4c02");
const SLEEP: u16 = 3;

const CALLERS: usize = 6;

/// Calls in flight right now and the most seen at once
#[derive(Default)]
struct Concurrency {
    active: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl Concurrency {
    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Sleeps for every call, recording overlap in the shared counters
struct Sleeper {
    oid: Oid,
    concurrency: Arc<Concurrency>,
}

impl ComObject for Sleeper {
    fn oid(&self) -> Oid {
        self.oid
    }

    fn supported_interfaces(&self) -> Vec<Iid> {
        vec![IID_ISLEEPER]
    }

    fn invoke(&self, _iid: &Iid, _opnum: u16, _args: Bytes) -> CallFuture {
        let concurrency = self.concurrency.clone();
        Box::pin(async move {
            let now = concurrency.active.fetch_add(1, Ordering::SeqCst) + 1;
            concurrency.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(40)).await;
            concurrency.active.fetch_sub(1, Ordering::SeqCst);
            concurrency.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::new())
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

async fn sleeper_server(concurrency: &Arc<Concurrency>) -> DcomServer {
    let registry = Arc::new(ClassRegistry::new());
    for (clsid, threading) in [(CLSID_STA_SLEEPER, ThreadingModel::Apartment), (CLSID_MTA_SLEEPER, ThreadingModel::Free)] {
        let concurrency = concurrency.clone();
        let factory = FnClassFactory(move |_: &Arc<ObjectHost>| -> Result<Arc<dyn ComObject>, HResult> {
            Ok(Arc::new(Sleeper { oid: Oid::generate(), concurrency: concurrency.clone() }))
        });
        registry.register(ClassEntry::new(clsid, threading, Arc::new(factory)));
    }

    let server = DcomServer::bind(DcomServerConfig::default(), registry).await.unwrap();
    server.spawn().unwrap();
    server
}

/// Call one object from `CALLERS` connections at once.
async fn call_concurrently(server: &DcomServer, clsid: Clsid) {
    let client = DcomClient::default();
    let proxy = client.create_instance(server.local_addr(), clsid, IID_ISLEEPER).await.unwrap();

    // Borrowed proxies hold no references of their own
    let mut objref = proxy.objref().clone();
    objref.std.public_refs = 0;
    let callers: Vec<_> = (0..CALLERS).map(|_| client.proxy(objref.clone()).unwrap()).collect();

    let results = join_all(callers.iter().map(|p| p.invoke(SLEEP, Bytes::new()))).await;
    for result in results {
        result.unwrap();
    }
    proxy.release().await.unwrap();
}

#[tokio::test]
async fn test_sta_calls_never_overlap() {
    init_tracing();
    let concurrency = Arc::new(Concurrency::default());
    let server = sleeper_server(&concurrency).await;

    call_concurrently(&server, CLSID_STA_SLEEPER).await;
    assert_eq!(concurrency.calls(), CALLERS);
    assert_eq!(concurrency.peak(), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_mta_calls_overlap() {
    init_tracing();
    let concurrency = Arc::new(Concurrency::default());
    let server = sleeper_server(&concurrency).await;

    call_concurrently(&server, CLSID_MTA_SLEEPER).await;
    assert_eq!(concurrency.calls(), CALLERS);
    assert!(concurrency.peak() > 1, "peak concurrency {}", concurrency.peak());

    server.shutdown().await;
}

#[tokio::test]
async fn test_released_object_leaves_the_exporter() {
    init_tracing();
    let concurrency = Arc::new(Concurrency::default());
    let server = sleeper_server(&concurrency).await;

    let proxy = DcomClient::default()
        .create_instance(server.local_addr(), CLSID_STA_SLEEPER, IID_ISLEEPER)
        .await
        .unwrap();
    let ipid = proxy.ipid();
    assert_eq!(server.exporter().object_count(), 1);

    proxy.release().await.unwrap();
    assert!(server.exporter().lookup_ipid(&ipid).is_none());
    assert_eq!(server.exporter().object_count(), 0);

    server.shutdown().await;
}

#[tokio::test]
async fn test_call_timeout_drops_the_connection() {
    init_tracing();
    let concurrency = Arc::new(Concurrency::default());
    let server = sleeper_server(&concurrency).await;

    let client = DcomClient::default();
    let owner = client.create_instance(server.local_addr(), CLSID_MTA_SLEEPER, IID_ISLEEPER).await.unwrap();
    let mut objref = owner.objref().clone();
    objref.std.public_refs = 0;
    let impatient = DcomClient::new(DcomClientConfig::default().with_call_timeout(Some(Duration::from_millis(5))));
    let proxy = impatient.proxy(objref).unwrap();

    let err = proxy.invoke(SLEEP, Bytes::new()).await.unwrap_err();
    assert_eq!(err.hresult(), hresult::RPC_E_TIMEOUT);
    assert!(!proxy.is_connected().await);

    // The next call dials again and is not answered by the late reply
    let err = proxy.invoke(SLEEP, Bytes::new()).await.unwrap_err();
    assert_eq!(err.hresult(), hresult::RPC_E_TIMEOUT);
    assert!(!proxy.is_connected().await);

    // Both requests reached the object
    let calls = concurrency.clone();
    assert!(eventually(|| {
        let calls = calls.clone();
        async move { calls.calls() == 2 }
    })
    .await);

    owner.invoke(SLEEP, Bytes::new()).await.unwrap();
    owner.release().await.unwrap();
    server.shutdown().await;
}

/// Type of the apartment the embedded server placed `ipid`'s object in
async fn apartment_of(harness: &comharness::Harness, ipid: Ipid) -> ApartmentType {
    let server = harness.embedded_server().await.unwrap();
    let exporter = server.exporter();
    let entry = exporter.lookup_ipid(&ipid).expect("exported interface");
    let oid = exporter.lookup_oid(&entry.oid).expect("exported object");
    exporter.dispatcher().apartment(oid.apartment).expect("registered apartment").apartment_type()
}

#[tokio::test]
async fn test_classes_land_in_their_apartments() {
    let (harness, bindings) = harness();

    let cases = [
        (progid::ATL_HEN, IHen::NAME, ApartmentType::Sta),
        (progid::FREE_THREADED_HEN, IHen::NAME, ApartmentType::Mta),
        (progid::GUARD_DOG, IDog::NAME, ApartmentType::Mta),
        (progid::PET_SHOP, IPetShop::NAME, ApartmentType::Mta),
    ];
    for (identifier, interface, expected) in cases {
        let handle = harness.create_object(identifier, bindings.interface(interface).unwrap()).await.unwrap();
        assert_eq!(apartment_of(&harness, handle.ipid()).await, expected, "{identifier}");
    }

    harness.shutdown().await;
}

#[tokio::test]
async fn test_atl_hens_share_one_sta() {
    let (harness, bindings) = harness();
    let binding = bindings.interface(IHen::NAME).unwrap();

    let first = harness.create_object(progid::ATL_HEN, binding).await.unwrap();
    let second = harness.create_object(progid::ATL_HEN, binding).await.unwrap();
    assert_ne!(first.objref().std.oid, second.objref().std.oid);

    let server = harness.embedded_server().await.unwrap();
    let exporter = server.exporter();
    let apartment = |handle: &comharness::ComObjectHandle| {
        let entry = exporter.lookup_ipid(&handle.ipid()).unwrap();
        exporter.lookup_oid(&entry.oid).unwrap().apartment
    };
    assert_eq!(apartment(&first), apartment(&second));
    assert_ne!(apartment(&first), exporter.dispatcher().default_mta().id());

    harness.shutdown().await;
}

#[tokio::test]
async fn test_typed_proxy_refuses_other_interfaces() {
    let (harness, bindings) = harness();
    let shop = harness
        .create_object(progid::PET_SHOP, bindings.interface(IPetShop::NAME).unwrap())
        .await
        .unwrap();

    let err = IHen::from_handle(shop.clone()).unwrap_err();
    assert!(err.to_string().contains("IHen"), "{err}");
    let shop = IPetShop::from_handle(shop).unwrap();
    let dog: IDog = shop.buy_dog().await.unwrap();
    dog.sit().await.unwrap();

    harness.shutdown().await;
}
