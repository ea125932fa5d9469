//! RDB - Remote Program Debugger
//!
//! A TCP line-protocol server for debugging named statement programs:
//! clients attach to a program, set breakpoints, run and resume execution,
//! and inspect or mutate variables.

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use clap::Parser;
use eyre::Result;
use rdb_engine::{CommandDispatcher, DebugServer, MiniInterpreter, ProgramCatalog};
use tracing::info;

/// Command-line interface for the RDB server
#[derive(Debug, Parser)]
#[command(name = "rdb")]
#[command(about = "Remote Program Debugger - a line-protocol debugging server")]
#[command(version)]
struct Args {
    /// Host address to listen on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "RDB_PORT", default_value = "5000")]
    port: u16,

    /// Directory of program files (*.txt) to load at startup
    #[arg(long, default_value = "programs")]
    programs_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    rdb_common::logging::init_logging("rdb")?;

    let catalog = ProgramCatalog::load_dir(&args.programs_dir)?;
    info!(programs = catalog.names().len(), "Catalog loaded");

    let dispatcher = CommandDispatcher::new(catalog, Arc::new(MiniInterpreter::new()));
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let handle = DebugServer::new(dispatcher).serve(addr).await?;

    info!("RDB listening on {}", handle.addr());

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received, shutting down");
    handle.shutdown()?;

    Ok(())
}
