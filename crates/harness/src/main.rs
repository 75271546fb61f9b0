//! COM client harness
//!
//! Runs the harness scenarios against the embedded test servers or a
//! running `comharness-server`, and compiles type libraries.
//!
//! USAGE:
//!   comharness [run] [OPTIONS]
//!   comharness compile <IDL> -o <TLB>
//!   comharness generate <TLB|IDL> -o <RS>
//!
//! EXAMPLES:
//!   comharness                                   # All scenarios, embedded servers
//!   comharness run --scenario hen_cluck          # One scenario
//!   comharness run --server 127.0.0.1:4135       # Against a running server
//!   comharness compile Interfaces.idl -o Interfaces.tlb

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use comharness::{scenarios, Harness, HarnessConfig, DEFAULT_TYPELIB};
use comharness_typelib::{generate_proxies, tlb, ProxyOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "comharness")]
#[command(version)]
#[command(about = "Exercises COM servers from the client side")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the harness scenarios (the default)
    Run(RunArgs),

    /// Compile IDL into a binary type library
    Compile {
        idl: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Write typed proxy source for a type library
    Generate {
        /// `.tlb` or `.idl` input
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Path the generated code reaches the harness crate by
        #[arg(long, default_value = "::comharness")]
        crate_path: String,
    },

    /// List the scenarios
    List,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Type library to resolve bindings from
    #[arg(long)]
    typelib: Option<PathBuf>,

    /// Directory relative type library paths resolve against
    #[arg(long)]
    typelib_root: Option<PathBuf>,

    /// Directory to cache resolved libraries and generated proxies in
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Activate classes on this server instead of the embedded one
    #[arg(long, value_name = "HOST:PORT")]
    server: Option<String>,

    /// Run only these scenarios
    #[arg(long = "scenario", value_name = "NAME")]
    scenarios: Vec<String>,

    /// TOML configuration file, overridden by the other options
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long)]
    log_level: Option<String>,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command.unwrap_or_else(|| Command::Run(RunArgs::default())) {
        Command::Run(args) => run(args).await,
        Command::Compile { idl, output } => {
            init_tracing("info");
            let lib = comharness_typelib::compile_file(&idl).with_context(|| format!("compiling {}", idl.display()))?;
            tlb::write_file(&output, &lib).with_context(|| format!("writing {}", output.display()))?;
            println!("{} -> {} ({lib})", idl.display(), output.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::Generate { input, output, crate_path } => {
            init_tracing("info");
            let lib = comharness_typelib::load(&input).with_context(|| format!("loading {}", input.display()))?;
            let source = generate_proxies(&lib, &ProxyOptions::default().with_crate_path(crate_path))?;
            std::fs::write(&output, source).with_context(|| format!("writing {}", output.display()))?;
            println!("{} -> {}", input.display(), output.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::List => {
            for scenario in scenarios::all() {
                println!("{:<26} {}", scenario.name, scenario.description);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run(args: RunArgs) -> anyhow::Result<ExitCode> {
    let mut config = match &args.config {
        Some(path) => HarnessConfig::load(path)?,
        None => HarnessConfig::default(),
    };
    if let Some(root) = args.typelib_root {
        config = config.with_typelib_root(root);
    }
    if let Some(dir) = args.cache_dir {
        config = config.with_cache_dir(dir);
    }
    if let Some(server) = args.server {
        config = config.with_remote_server(server);
    }
    if let Some(level) = args.log_level {
        config = config.with_log_level(level);
    }
    init_tracing(&config.log_level);

    let selected = if args.scenarios.is_empty() {
        scenarios::all()
    } else {
        let mut selected = Vec::with_capacity(args.scenarios.len());
        for name in &args.scenarios {
            match scenarios::find(name) {
                Some(scenario) => selected.push(scenario),
                None => bail!("unknown scenario {name:?}, see `comharness list`"),
            }
        }
        selected
    };

    let harness = Harness::new(config);
    let typelib = args.typelib.unwrap_or_else(|| PathBuf::from(DEFAULT_TYPELIB));
    let bindings = match harness.resolve_bindings(&typelib) {
        Ok(bindings) => bindings,
        Err(e) => {
            eprintln!("{e}");
            return Ok(ExitCode::FAILURE);
        }
    };
    info!(library = %bindings.library(), scenarios = selected.len(), "running scenarios");

    let report = scenarios::run(&harness, &bindings, &selected).await;
    harness.shutdown().await;

    println!("{report}");
    Ok(if report.is_success() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
