//! Callback Tests - Servers calling back into the harness, and object lifetime
//!
//! These tests exercise interface pointers passed as `[in]` arguments:
//! - GuardDog.Bite reaching the harness-hosted postman
//! - AtlHen.CluckAsync reaching the harness-hosted observer
//! - Reference release when handles go away
//! - Calls on handles whose server has stopped

mod common;

use std::sync::Arc;

use comharness::proxies::{progid, IDog, IHen, IPetShop};
use comharness::{HarnessError, Value};
use comharness_com::hresult;
use comharness_servers::{AtlCluckObserver, Postman};

use common::*;

#[tokio::test]
async fn test_guard_dog_calls_postman_back() {
    let (harness, bindings) = harness();
    let dog = IDog::from_handle(
        harness
            .create_object(progid::GUARD_DOG, bindings.interface(IDog::NAME).unwrap())
            .await
            .unwrap(),
    )
    .unwrap();

    let postman = Arc::new(Postman::new());
    let callback = harness.export_callback(postman.clone()).await.unwrap();
    assert_eq!(callback.downcast_ref::<Postman>().map(Postman::bites), Some(0));

    dog.bite(&callback).await.unwrap();
    dog.bite(&callback).await.unwrap();
    assert_eq!(postman.bites(), 2);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_hen_calls_observer_back_by_name() {
    let (harness, bindings) = harness();
    let hen = harness
        .create_object(progid::ATL_HEN, bindings.interface(IHen::NAME).unwrap())
        .await
        .unwrap();

    let observer = Arc::new(AtlCluckObserver::new());
    let callback = harness.export_callback(observer.clone()).await.unwrap();
    let result = hen.invoke("CluckAsync", vec![Value::from(&callback)]).await.unwrap();
    assert!(result.is_empty());
    assert_eq!(observer.clucks(), 1);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_free_threaded_hen_calls_back_concurrently() {
    let (harness, bindings) = harness();
    let hen = IHen::from_handle(
        harness
            .create_object(progid::FREE_THREADED_HEN, bindings.interface(IHen::NAME).unwrap())
            .await
            .unwrap(),
    )
    .unwrap();

    let observer = Arc::new(AtlCluckObserver::new());
    let callback = harness.export_callback(observer.clone()).await.unwrap();
    let hens: Vec<_> = (0..4)
        .map(|_| IHen::from_handle(hen.handle().with_own_connection().unwrap()).unwrap())
        .collect();
    let clucks: Vec<_> = hens.iter().map(|hen| hen.cluck_async(&callback)).collect();
    for result in futures::future::join_all(clucks).await {
        result.unwrap();
    }
    assert_eq!(observer.clucks(), 4);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_remote_object_as_argument() {
    let (harness, bindings) = harness();
    let dog = harness
        .create_object(progid::GUARD_DOG, bindings.interface(IDog::NAME).unwrap())
        .await
        .unwrap();
    let hen = harness
        .create_object(progid::ATL_HEN, bindings.interface(IHen::NAME).unwrap())
        .await
        .unwrap();

    // A hen is no postman
    let err = dog.invoke("Bite", vec![Value::from(&hen)]).await.unwrap_err();
    assert!(matches!(err, HarnessError::ArgumentMismatch { ref method, .. } if method == "Bite"), "{err}");

    // A null postman is for the server to refuse
    let err = dog.invoke("Bite", vec![Value::Empty]).await.unwrap_err();
    assert!(err.is_remote_invocation(), "{err}");
    assert_eq!(err.status(), Some(hresult::E_POINTER));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_dog_from_petshop_is_a_live_object() {
    let (harness, bindings) = harness();
    let shop = IPetShop::from_handle(
        harness
            .create_object(progid::PET_SHOP, bindings.interface(IPetShop::NAME).unwrap())
            .await
            .unwrap(),
    )
    .unwrap();
    let dog = shop.buy_dog().await.unwrap();

    let server = harness.embedded_server().await.unwrap();
    assert!(server.exporter().lookup_ipid(&dog.handle().ipid()).is_some());

    let postman = Arc::new(Postman::new());
    dog.bite(&harness.export_callback(postman.clone()).await.unwrap()).await.unwrap();
    assert_eq!(postman.bites(), 1);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_release_gives_references_back() {
    let (harness, bindings) = harness();
    let hen = harness
        .create_object(progid::ATL_HEN, bindings.interface(IHen::NAME).unwrap())
        .await
        .unwrap();
    let ipid = hen.ipid();
    let server = harness.embedded_server().await.unwrap();

    // Another clone still holds the proxy
    let clone = hen.clone();
    clone.release().await.unwrap();
    assert!(server.exporter().lookup_ipid(&ipid).is_some());
    hen.invoke("Cluck", vec![]).await.unwrap();

    hen.release().await.unwrap();
    assert!(server.exporter().lookup_ipid(&ipid).is_none());

    harness.shutdown().await;
}

#[tokio::test]
async fn test_own_connection_borrows_the_owners_references() {
    let (harness, bindings) = harness();
    let hen = harness
        .create_object(progid::FREE_THREADED_HEN, bindings.interface(IHen::NAME).unwrap())
        .await
        .unwrap();
    let ipid = hen.ipid();
    let server = harness.embedded_server().await.unwrap();

    let borrowed = hen.with_own_connection().unwrap();
    assert_eq!(borrowed, hen);
    assert_eq!(borrowed.objref().std.public_refs, 0);

    // The borrowed handle keeps the owner's references alive
    drop(hen);
    borrowed.invoke("Cluck", vec![]).await.unwrap();
    borrowed.query_interface(IHen::NAME).await.unwrap().release().await.unwrap();
    assert!(server.exporter().lookup_ipid(&ipid).is_some());

    drop(borrowed);
    let exporter = server.exporter().clone();
    let released = eventually(|| {
        let exporter = exporter.clone();
        async move { exporter.lookup_ipid(&ipid).is_none() }
    })
    .await;
    assert!(released, "{ipid} still exported");

    harness.shutdown().await;
}

#[tokio::test]
async fn test_dropping_last_handle_releases() {
    let (harness, bindings) = harness();
    let hen = harness
        .create_object(progid::ATL_HEN, bindings.interface(IHen::NAME).unwrap())
        .await
        .unwrap();
    let ipid = hen.ipid();
    let server = harness.embedded_server().await.unwrap();
    assert!(server.exporter().lookup_ipid(&ipid).is_some());

    drop(hen);
    let exporter = server.exporter().clone();
    let released = eventually(|| {
        let exporter = exporter.clone();
        async move { exporter.lookup_ipid(&ipid).is_none() }
    })
    .await;
    assert!(released, "{ipid} still exported");

    harness.shutdown().await;
}

#[tokio::test]
async fn test_calls_after_shutdown_fail_remotely() {
    let (harness, bindings) = harness();
    let hen = IHen::from_handle(
        harness
            .create_object(progid::ATL_HEN, bindings.interface(IHen::NAME).unwrap())
            .await
            .unwrap(),
    )
    .unwrap();
    hen.cluck().await.unwrap();

    harness.shutdown().await;
    let err = hen.cluck().await.unwrap_err();
    assert!(err.is_remote_invocation(), "{err}");
    assert_eq!(err.status(), Some(hresult::RPC_E_SERVER_DIED_DNE));

    // Shutting down twice is harmless
    harness.shutdown().await;
}
