use std::process::ExitCode;

use data_api::config::LogConfig;
use data_api::{Config, Server, routes, store, telemetry};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let _guard = match telemetry::init(&LogConfig::from_env()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialise logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), data_api::Error> {
    let config = Config::from_env()?;
    info!(env = %config.env, backend = %config.database.backend(), "starting");

    let store = store::connect(&config.database).await?;
    let app = routes::build(&config, store);

    Server::bind(&config.listen_addr())?.serve(app).await
}
