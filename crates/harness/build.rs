//! Generates the typed proxies for the test servers' interfaces.

use comharness_typelib::{compile_file, generate_proxies, ProxyOptions};
use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    let idl = PathBuf::from("../servers/idl/Interfaces.idl");
    println!("cargo:rerun-if-changed={}", idl.display());

    let lib = match compile_file(&idl) {
        Ok(lib) => lib,
        Err(e) => panic!("failed to compile {}: {e}", idl.display()),
    };
    let source = match generate_proxies(&lib, &ProxyOptions::default().with_crate_path("crate")) {
        Ok(source) => source,
        Err(e) => panic!("failed to generate proxies for {}: {e}", lib.name),
    };

    let out_dir = PathBuf::from(env::var_os("OUT_DIR").unwrap_or_default());
    if let Err(e) = fs::write(out_dir.join("interfaces.rs"), source) {
        panic!("failed to write generated proxies: {e}");
    }
}
