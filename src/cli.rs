//! Command-line interface: the long-running service plus one-shot
//! administrative commands.

use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use crate::{
    configuration::{get_configuration, set_configuration, Config, State},
    dao::{PositionFilter, SortBy, SortOrder, DEFAULT_LIMIT},
    error::Error,
    helpers::parse_list,
    migration,
    model::RiskLevel,
};

/// LP position aggregator
#[derive(Parser)]
#[command(name = "lp-aggregator")]
#[command(about = "DeFi LP and yield position aggregator", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the aggregation scheduler (default if no command specified)
    Serve,

    /// Run database migrations
    Migrate,

    /// Run one aggregation cycle now
    Refresh {
        /// Ignore the cached snapshot and query every source
        #[arg(long)]
        force: bool,
    },

    /// Print the highest-yield positions as JSON
    Top {
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Print positions matching a filter as JSON
    Positions(PositionArgs),

    /// Print known protocols as JSON
    Protocols,

    /// Show the last completed aggregation
    Status,
}

#[derive(Args)]
pub struct PositionArgs {
    /// Chain name or numeric id
    #[arg(long)]
    pub chain: Option<String>,

    /// Protocol name or slug
    #[arg(long)]
    pub protocol: Option<String>,

    #[arg(long)]
    pub min_apy: Option<f64>,

    #[arg(long)]
    pub max_apy: Option<f64>,

    #[arg(long)]
    pub min_tvl: Option<f64>,

    /// Comma separated, e.g. LOW,MEDIUM
    #[arg(long)]
    pub risk: Option<String>,

    #[arg(long)]
    pub stable_only: bool,

    /// Token symbol substring
    #[arg(long)]
    pub asset: Option<String>,

    /// apy, tvl, volume or risk
    #[arg(long, default_value = "apy")]
    pub sort_by: String,

    /// asc or desc
    #[arg(long, default_value = "desc")]
    pub order: String,

    #[arg(long, default_value_t = DEFAULT_LIMIT)]
    pub limit: i64,

    #[arg(long, default_value = "0")]
    pub offset: i64,
}

impl PositionArgs {
    pub fn into_filter(self) -> Result<PositionFilter, Error> {
        let mut risk_levels = vec![];
        if let Some(risk) = &self.risk {
            for item in parse_list(risk) {
                risk_levels.push(item.parse::<RiskLevel>()?);
            }
        }

        Ok(PositionFilter {
            chain: self.chain,
            protocol: self.protocol,
            min_apy: self.min_apy,
            max_apy: self.max_apy,
            min_tvl: self.min_tvl,
            risk_levels,
            stable_only: self.stable_only,
            asset: self.asset,
            sort_by: self.sort_by.parse::<SortBy>()?,
            order: self.order.parse::<SortOrder>()?,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

/// Initialize configuration and return Config
pub fn init_config() -> Result<Config, Error> {
    set_configuration()?;
    get_configuration()
}

pub async fn run_migrate() -> Result<(), Error> {
    let config = init_config()?;

    match &config.database_url {
        Some(database_url) => {
            migration::run_migrations(database_url).await?;
            tracing::info!("Migrations complete");
        },
        None => {
            tracing::warn!("DATABASE_URL is empty, nothing to migrate");
        },
    }

    Ok(())
}

pub async fn run_refresh(force: bool) -> Result<(), Error> {
    let state = State::new(init_config()?).await?;
    let positions = state.scheduler.trigger(force).await?;

    tracing::info!(
        "Refresh finished with {} position(s) from {}",
        positions.len(),
        state.aggregator.source_names().join(", ")
    );

    Ok(())
}

pub async fn run_top(limit: usize) -> Result<(), Error> {
    let state = read_state().await?;
    print_json(&state.query.top_positions(limit).await?)
}

pub async fn run_positions(args: PositionArgs) -> Result<(), Error> {
    let filter = args.into_filter()?;
    let state = read_state().await?;
    print_json(&state.query.positions(&filter).await?)
}

pub async fn run_protocols() -> Result<(), Error> {
    let state = read_state().await?;
    print_json(&state.query.protocols().await?)
}

pub async fn run_status() -> Result<(), Error> {
    let state = read_state().await?;
    let status = state.query.status().await?;

    match status.last_aggregation {
        Some(at) => tracing::info!(
            "Last aggregation at {} across {} protocol(s)",
            at,
            status.protocols
        ),
        None => tracing::info!("No aggregation recorded yet"),
    }

    print_json(&status)
}

/// State for the read commands. These inspect what `serve` or `refresh`
/// persisted, so a process-local memory store has nothing to show.
async fn read_state() -> Result<State, Error> {
    let config = init_config()?;
    require_database(config.database_url.as_deref())?;
    State::new(config).await
}

fn require_database(database_url: Option<&str>) -> Result<(), Error> {
    match database_url {
        Some(_) => Ok(()),
        None => Err(Error::ConfigurationError(String::from(
            "DATABASE_URL is empty, read commands need the shared database",
        ))),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_flags_build_a_filter() {
        let cli = Cli::parse_from([
            "lp-aggregator",
            "positions",
            "--chain",
            "arbitrum",
            "--risk",
            "low,medium",
            "--stable-only",
            "--sort-by",
            "tvl",
            "--order",
            "asc",
            "--limit",
            "5",
        ]);

        let Some(Commands::Positions(args)) = cli.command else {
            panic!("expected the positions command");
        };
        let filter = args.into_filter().unwrap();

        assert_eq!(filter.chain.as_deref(), Some("arbitrum"));
        assert_eq!(filter.risk_levels, vec![RiskLevel::Low, RiskLevel::Medium]);
        assert!(filter.stable_only);
        assert_eq!(filter.sort_by, SortBy::Tvl);
        assert_eq!(filter.order, SortOrder::Asc);
        assert_eq!(filter.limit, 5);
        assert_eq!(filter.offset, 0);
    }

    #[test]
    fn unknown_sort_field_is_rejected() {
        let cli = Cli::parse_from(["lp-aggregator", "positions", "--sort-by", "fees"]);

        let Some(Commands::Positions(args)) = cli.command else {
            panic!("expected the positions command");
        };
        assert!(args.into_filter().is_err());
    }

    #[test]
    fn top_defaults_to_ten() {
        let cli = Cli::parse_from(["lp-aggregator", "top"]);
        assert!(matches!(cli.command, Some(Commands::Top { limit: 10 })));

        let cli = Cli::parse_from(["lp-aggregator"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn read_commands_need_a_database() {
        assert!(matches!(
            require_database(None),
            Err(Error::ConfigurationError(_))
        ));
        assert!(require_database(Some("postgres://localhost/lp")).is_ok());
    }
}
