//! `boxvps-reconcile [config-path]`
//!
//! Regenerates and applies every enabled backend from the stored state.
//! Exits 1 if the engine cannot open or any backend stays inconsistent.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use boxvps_engine::{init_tracing, Engine, GatewayConfig, OperationOutcome, ProcessRunner};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = match GatewayConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load config");
            return ExitCode::FAILURE;
        }
    };

    let engine = match Engine::open(config, Arc::new(ProcessRunner)).await {
        Ok(engine) => engine,
        Err(e) => {
            error!(error = %e, "Failed to open engine");
            return ExitCode::FAILURE;
        }
    };

    match engine.reconcile().await {
        Ok(OperationOutcome::Committed) => {
            info!("All enabled backends consistent");
            println!("committed");
            ExitCode::SUCCESS
        }
        Ok(OperationOutcome::Degraded { failures }) => {
            println!("degraded");
            for failure in &failures {
                println!("  {}", failure);
            }
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "Reconcile failed");
            ExitCode::FAILURE
        }
    }
}
