use tracing_subscriber::EnvFilter;

use strider_backend::config::{AgentConfig, Credentials};
use strider_backend::runtime::{forward_interrupt, BackendRuntime};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,strider=debug,strider_backend=debug")),
        )
        .init();

    tracing::info!("Strider starting...");

    let config = AgentConfig::load();
    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    let credentials = match Credentials::from_env() {
        Ok(credentials) => credentials,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    let code = rt.block_on(async move {
        let runtime = match BackendRuntime::bootstrap(config, credentials).await {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!("Startup failed: {:#}", e);
                return 1;
            }
        };

        let (shutdown_tx, shutdown_rx) = flume::bounded(1);
        tokio::spawn(forward_interrupt(tokio::signal::ctrl_c(), shutdown_tx));

        runtime.run(shutdown_rx).await;
        0
    });

    tracing::info!("Strider stopped");
    std::process::exit(code);
}
