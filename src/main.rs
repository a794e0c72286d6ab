use clap::Parser;
use tracing::{error, info, Level};

use lp_aggregator::{
    cli::{self, Cli, Commands},
    configuration::{AppState, State},
    error::Error,
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let result = app_main().await;

    if let Err(err) = &result {
        error!("{}", err);
    }

    result
}

async fn app_main() -> Result<(), Error> {
    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_level(true)
        .with_max_level({
            #[cfg(debug_assertions)]
            {
                Level::DEBUG
            }

            #[cfg(not(debug_assertions))]
            {
                Level::INFO
            }
        })
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    match cli.command {
        None | Some(Commands::Serve) => serve().await,
        Some(Commands::Migrate) => cli::run_migrate().await,
        Some(Commands::Refresh { force }) => cli::run_refresh(force).await,
        Some(Commands::Top { limit }) => cli::run_top(limit).await,
        Some(Commands::Positions(args)) => cli::run_positions(args).await,
        Some(Commands::Protocols) => cli::run_protocols().await,
        Some(Commands::Status) => cli::run_status().await,
    }
}

async fn serve() -> Result<(), Error> {
    let config = match cli::init_config() {
        Ok(config) => config,
        Err(e) => return Err(Error::ConfigurationError(e.to_string())),
    };

    let state = State::new(config).await?;
    let app_state = AppState::new(state);

    tokio::select! {
        result = app_state.scheduler.run() => result,
        result = tokio::signal::ctrl_c() => {
            info!("Shutdown requested, stopping scheduler");
            result.map_err(Error::from)
        },
    }
}
