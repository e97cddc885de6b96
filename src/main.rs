use std::{error::Error, process::ExitCode, sync::Arc};

use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use branchbook::{
    api::{self, AppState},
    bookkeeper::Bookkeeper,
    config::{CliArgs, Command, Config, LoggingConfig},
    seed, storage,
};

fn main() -> ExitCode {
    let cli = CliArgs::parse();
    let config = Config::load(&cli);
    init_tracing(&config.logging);

    match run(cli.command.unwrap_or(Command::Serve), config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Exiting");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    if logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn run(command: Command, config: Config) -> Result<(), Box<dyn Error>> {
    // The MongoDB driver is synchronous here, so connect before any runtime exists.
    tracing::info!(backend = ?config.storage.backend, "Opening store");
    let store = storage::open(&config.storage)?;
    let book = Arc::new(Bookkeeper::new(store));

    match command {
        Command::Serve => serve(&config, book),
        Command::Seed => {
            let summary = seed::seed(&book)?;
            summary.to_table().printstd();
            println!("Sample data added successfully");
            Ok(())
        }
        Command::Inspect => {
            let reports = seed::inspect(&book)?;
            seed::report_table(&reports).printstd();
            Ok(())
        }
    }
}

fn serve(config: &Config, book: Arc<Bookkeeper>) -> Result<(), Box<dyn Error>> {
    let addr = config.listen_addr()?;
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;

    runtime.block_on(async move {
        let metrics = PrometheusBuilder::new().install_recorder()?;
        let app = api::router(AppState::new(book).with_metrics(metrics));

        tracing::info!(%addr, "Server running");
        axum::Server::try_bind(&addr)?
            .serve(app.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server stopped");
        Ok::<(), Box<dyn Error>>(())
    })
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await
        }
    }
}
