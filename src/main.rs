use clap::Parser;
use poly_updown::cli::{run, Cli, RunOutcome};
use poly_updown::config::Config;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Missing config falls back to defaults; a malformed file is fatal
    let config = match std::fs::metadata(&cli.config) {
        Ok(_) => match Config::load(&cli.config) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Invalid config {}: {e}", cli.config);
                std::process::exit(1);
            }
        },
        Err(_) => Config::default(),
    };

    if let Err(e) = poly_updown::telemetry::init_telemetry(&config.telemetry) {
        eprintln!("Telemetry init failed: {e}");
        std::process::exit(1);
    }

    match run(cli, config).await {
        Ok(RunOutcome::Clean) => {}
        Ok(RunOutcome::Fatal) => {
            tracing::error!("Exited after a runtime fatal");
            std::process::exit(2);
        }
        Err(e) => {
            // Startup failures: credentials, wallet, disk
            tracing::error!(error = %e, "Fatal startup error");
            eprintln!("Fatal: {e}");
            std::process::exit(1);
        }
    }
}
