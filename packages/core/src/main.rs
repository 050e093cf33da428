use clap::Parser;
use dotenvy::dotenv;

use stellar_fee_store::cli::{self, Cli};
use stellar_fee_store::config::Config;
use stellar_fee_store::db;
use stellar_fee_store::error::AppError;
use stellar_fee_store::logging::init_logging;
use stellar_fee_store::repository::FeeRepository;

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();

    let cli = Cli::parse();

    let config = Config::from_env()
        .map_err(AppError::Config)
        .unwrap_or_else(|err| {
            tracing::error!("{}", err);
            std::process::exit(1);
        });
    let config = cli.apply_overrides(config);

    if let Err(err) = run(cli.command, &config).await {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}

async fn run(command: cli::Command, config: &Config) -> Result<(), AppError> {
    let pool = db::connect(config).await?;
    let repository = FeeRepository::new(pool);

    let output = cli::execute(command, &repository).await;
    repository.close().await;

    let rendered = serde_json::to_string_pretty(&output?)
        .map_err(|err| AppError::Unknown(err.to_string()))?;
    println!("{}", rendered);

    Ok(())
}
