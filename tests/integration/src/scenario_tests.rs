//! Scenario Tests - End-to-end harness runs
//!
//! These tests drive the harness the way the `comharness` binary does:
//! - Every built-in scenario against the embedded servers
//! - Binding resolution from IDL, compiled type libraries and bad files
//! - Activation by progid and CLSID, and its failures
//! - The blocking facade

mod common;

use std::sync::Arc;

use comharness::proxies::{clsid, progid, Address, IHen, IPetShop};
use comharness::{blocking, scenarios, Harness, HarnessConfig, HarnessError, ServerEntry, Value};
use comharness_com::{hresult, DcomServer, DcomServerConfig};
use comharness_typelib::tlb;

use common::*;

#[tokio::test]
async fn test_every_scenario_passes() {
    let (harness, bindings) = harness();
    let report = scenarios::run(&harness, &bindings, &scenarios::all()).await;
    harness.shutdown().await;

    println!("{report}");
    assert_eq!(report.outcomes.len(), 6);
    assert!(report.is_success(), "{report}");
}

#[tokio::test]
async fn test_scenarios_run_in_any_order() {
    let (harness, bindings) = harness();
    let mut selected = scenarios::all();
    selected.reverse();
    let report = scenarios::run(&harness, &bindings, &selected).await;
    harness.shutdown().await;
    assert!(report.is_success(), "{report}");
}

#[tokio::test]
async fn test_failed_scenarios_are_reported() {
    let (harness, bindings) = harness();
    harness.shutdown().await;

    let hen_cluck = scenarios::find("hen_cluck").unwrap();
    let report = scenarios::run(&harness, &bindings, &[hen_cluck]).await;
    assert_eq!(report.failed(), 1);
    assert!(report.to_string().contains("FAIL hen_cluck"), "{report}");
}

#[tokio::test]
async fn test_resolve_is_idempotent() {
    let (harness, first) = harness();
    let second = harness.resolve_bindings(TYPELIB).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(harness.bindings().len(), 1);
    assert_eq!(first.library().name, "InterfacesLib");
    assert_eq!(first.interfaces().len(), 5);
}

#[tokio::test]
async fn test_relative_path_resolves_against_typelib_root() {
    let root = concat!(env!("CARGO_MANIFEST_DIR"), "/../../crates/servers");
    let harness = Harness::new(HarnessConfig::default().with_typelib_root(root));
    let relative = harness.resolve_bindings("idl/Interfaces.idl").unwrap();
    let absolute = harness.resolve_bindings(TYPELIB).unwrap();
    assert!(Arc::ptr_eq(&relative, &absolute));
}

#[tokio::test]
async fn test_compiled_library_binds_like_idl() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Interfaces.tlb");
    let lib = comharness_typelib::compile_file(TYPELIB).unwrap();
    tlb::write_file(&path, &lib).unwrap();

    let (harness, from_idl) = harness();
    let from_tlb = harness.resolve_bindings(&path).unwrap();
    assert!(!Arc::ptr_eq(&from_idl, &from_tlb));
    assert_eq!(from_tlb.library(), from_idl.library());

    let hen = harness
        .create_object(progid::ATL_HEN, from_tlb.interface(IHen::NAME).unwrap())
        .await
        .unwrap();
    let result = hen.invoke("Cluck", vec![]).await.unwrap();
    assert!(result.is_empty());
    harness.shutdown().await;
}

#[tokio::test]
async fn test_cache_dir_holds_library_and_proxies() {
    let cache = tempfile::tempdir().unwrap();
    let harness = Harness::new(HarnessConfig::default().with_cache_dir(cache.path()));
    let bindings = harness.resolve_bindings(TYPELIB).unwrap();

    let name = bindings.cache_name();
    let cached = tlb::read_file(cache.path().join(format!("{name}.tlb"))).unwrap();
    assert_eq!(&cached, bindings.library());

    let source = std::fs::read_to_string(cache.path().join(format!("{name}.rs"))).unwrap();
    assert!(source.contains("pub struct IPetShop"));
    assert!(source.contains("pub struct Address"));
}

#[tokio::test]
async fn test_missing_library() {
    let (harness, _) = harness();
    let err = harness.resolve_bindings("no/such/Library.tlb").unwrap_err();
    assert!(err.is_binding_resolution(), "{err}");
    assert!(err.to_string().contains("Library.tlb"), "{err}");
}

#[tokio::test]
async fn test_malformed_library() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Broken.tlb");
    std::fs::write(&path, b"CHTL\x01\x00 not a type library").unwrap();

    let (harness, _) = harness();
    let err = harness.resolve_bindings(&path).unwrap_err();
    assert!(err.is_binding_resolution(), "{err}");
    assert!(err.to_string().contains("malformed type library"), "{err}");
}

#[tokio::test]
async fn test_library_from_newer_format() {
    let lib = comharness_typelib::compile_file(TYPELIB).unwrap();
    let mut data = tlb::encode(&lib).to_vec();
    data[4..6].copy_from_slice(&(tlb::FORMAT_VERSION + 1).to_le_bytes());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Future.tlb");
    std::fs::write(&path, data).unwrap();

    let (harness, _) = harness();
    let err = harness.resolve_bindings(&path).unwrap_err();
    assert!(err.is_binding_resolution(), "{err}");
    assert!(err.to_string().contains("newer than supported"), "{err}");
}

#[tokio::test]
async fn test_invalid_idl() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Broken.idl");
    std::fs::write(&path, "interface IHen : IUnknown { HRESULT Cluck(; };").unwrap();

    let (harness, _) = harness();
    let err = harness.resolve_bindings(&path).unwrap_err();
    assert!(matches!(err, HarnessError::BindingResolution { ref path, .. } if path.ends_with("Broken.idl")), "{err}");
}

#[tokio::test]
async fn test_create_by_progid_and_clsid() {
    let (harness, bindings) = harness();
    let binding = bindings.interface(IHen::NAME).unwrap();

    for identifier in [progid::ATL_HEN, clsid::ATL_HEN, "atlhenlib.atlhen.1"] {
        let hen = harness.create_object(identifier, binding).await.unwrap();
        assert_eq!(hen.binding(), binding);
        assert_eq!(hen.iid(), binding.iid);
        hen.invoke("Cluck", vec![]).await.unwrap();
    }
    harness.shutdown().await;
}

#[tokio::test]
async fn test_query_interface_across_bindings() {
    let (harness, bindings) = harness();
    let shop = harness
        .create_object(progid::PET_SHOP, bindings.interface(IPetShop::NAME).unwrap())
        .await
        .unwrap();
    let again = shop.query_interface(IPetShop::NAME).await.unwrap();
    assert_eq!(again.interface_name(), IPetShop::NAME);

    let err = shop.query_interface(IHen::NAME).await.unwrap_err();
    assert_eq!(err.status(), Some(hresult::E_NOINTERFACE));
    harness.shutdown().await;
}

#[tokio::test]
async fn test_wrong_argument_types_never_reach_the_server() {
    let (harness, bindings) = harness();
    let hen = harness
        .create_object(progid::ATL_HEN, bindings.interface(IHen::NAME).unwrap())
        .await
        .unwrap();

    let err = hen.invoke("CluckAsync", vec![Value::from("not an observer")]).await.unwrap_err();
    assert!(matches!(err, HarnessError::ArgumentMismatch { .. }), "{err}");
    assert_eq!(err.status(), Some(hresult::E_INVALIDARG));

    let err = hen.invoke("CluckAsync", vec![]).await.unwrap_err();
    assert!(matches!(err, HarnessError::ArgumentMismatch { .. }), "{err}");
    harness.shutdown().await;
}

#[tokio::test]
async fn test_configured_server_entry() {
    let server = DcomServer::bind(DcomServerConfig::default(), comharness_servers::class_registry())
        .await
        .unwrap();
    server.spawn().unwrap();

    let config = HarnessConfig::default().with_server(ServerEntry {
        clsid: clsid::PET_SHOP.to_string(),
        progid: Some(progid::PET_SHOP.to_string()),
        endpoint: server.local_addr().to_string(),
    });
    let harness = Harness::new(config);
    let bindings = harness.resolve_bindings(TYPELIB).unwrap();
    let shop = IPetShop::from_handle(
        harness
            .create_object(progid::PET_SHOP, bindings.interface(IPetShop::NAME).unwrap())
            .await
            .unwrap(),
    )
    .unwrap();

    let address = shop.get_address().await.unwrap();
    assert_eq!(address.city, "Oslo");
    assert!(server.exporter().lookup_ipid(&shop.handle().ipid()).is_some());

    harness.shutdown().await;
    server.shutdown().await;
}

#[test]
fn test_blocking_harness() {
    init_tracing();
    let harness = blocking::Harness::new(HarnessConfig::default()).unwrap();
    let bindings = harness.resolve_bindings(TYPELIB).unwrap();

    let shop = harness
        .create_object(progid::PET_SHOP, bindings.interface(IPetShop::NAME).unwrap())
        .unwrap();
    let mut result = shop.invoke("GetAddress", vec![]).unwrap();
    let address = Address::from_value(result.take_retval().unwrap()).unwrap();
    assert_eq!(
        address,
        Address {
            street: "Suhms gate".to_string(),
            postal_code: "0363".to_string(),
            city: "Oslo".to_string(),
        }
    );

    let mut result = shop.invoke("BuyDog", vec![]).unwrap();
    let dog = result.take_retval().unwrap().into_object().unwrap();
    assert_eq!(dog.interface_name(), "IDog");

    harness.shutdown();
}
