//! live-poll binary entry point.

use std::process::ExitCode;
use std::sync::Arc;

use live_poll::api::{serve, AppState};
use live_poll::cli::{parse_args, print_help, print_version};
use live_poll::{logging, Config, FileStorage, MemoryStorage, SessionRegistry, SessionStorage};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Try 'live-poll --help' for more information.");
            return ExitCode::from(2);
        }
    };

    if args.help {
        print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        print_version();
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init_with_filter(config.log_filter()) {
        eprintln!("warning: logging already initialized: {}", e);
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "live-poll exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!("live-poll v{}", env!("CARGO_PKG_VERSION"));

    let server_config = config.to_server_config()?;

    let storage: Arc<dyn SessionStorage> = match config.storage.data_dir {
        Some(ref dir) => {
            info!(dir = %dir.display(), "Persisting sessions to disk");
            Arc::new(FileStorage::open(dir.clone()).await?)
        }
        None => {
            info!("Keeping sessions in memory");
            Arc::new(MemoryStorage::new())
        }
    };

    let registry = SessionRegistry::new(storage, config.coordinator_config());
    let restored = registry.recover().await?;
    info!(
        restored,
        ttl_secs = config.poll.session_ttl_secs,
        "Session registry ready"
    );

    serve(server_config, AppState::new(registry)).await?;
    Ok(())
}
