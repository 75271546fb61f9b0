//! COM server host
//!
//! Hosts the PetShop, GuardDog and Hen classes on one DCOM endpoint.
//!
//! USAGE:
//!   comharness-server [OPTIONS]
//!
//! EXAMPLES:
//!   comharness-server                    # 127.0.0.1:4135
//!   comharness-server --port 9000        # Custom port
//!   comharness-server --host 0.0.0.0     # Listen on all interfaces

use anyhow::Context;
use clap::Parser;
use comharness_com::{DcomServer, DcomServerConfig, DEFAULT_PORT};
use comharness_servers::{class_registry, clsid, progid};
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "comharness-server")]
#[command(version)]
#[command(about = "Hosts the COM harness test servers over DCOM")]
struct Args {
    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to listen on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", args.host, args.port))?;

    let server = DcomServer::bind(DcomServerConfig::new(addr), class_registry())
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    println!("========================================================");
    println!("         COM Harness Servers");
    println!("========================================================");
    println!("  Protocol:  DCE RPC / TCP (ncacn_ip_tcp)");
    println!("  Listening: {}", server.local_addr());
    println!("  OXID:      {}", server.oxid());
    println!("========================================================");
    println!("  Classes:");
    println!("    {:<28} {{{}}}", progid::PET_SHOP, clsid::PET_SHOP);
    println!("    {:<28} {{{}}}", progid::GUARD_DOG, clsid::GUARD_DOG);
    println!("    {:<28} {{{}}}", progid::ATL_HEN, clsid::ATL_HEN);
    println!("    {:<28} {{{}}}", progid::FREE_THREADED_HEN, clsid::FREE_THREADED_HEN);
    println!("========================================================");
    println!("  Press Ctrl+C to stop");
    println!("========================================================");
    println!();

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("interrupted");
        })
        .await?;

    info!("server stopped");
    Ok(())
}
