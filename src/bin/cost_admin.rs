use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use herbax_costing::{
    config,
    db,
    services::cost_rollup::{CostRollup, CostRollupEngine, CostingOptions, EntityKind},
};
use serde::Serialize;
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(cfg.log_level(), cfg.log_json);

    let pool = db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;

    if let Commands::Migrate = cli.command {
        db::run_migrations(&pool)
            .await
            .context("failed to run migrations")?;
        println!("Migrations applied");
        return Ok(());
    }

    let options = CostingOptions::try_from(&cfg).context("invalid costing configuration")?;
    debug!(?options, "costing options");
    let engine = CostRollupEngine::new(Arc::new(pool), options);

    match cli.command {
        Commands::Migrate => {}
        Commands::Recompute(target) => {
            let rollup = engine
                .recompute_cost(target.id, target.kind.into())
                .await
                .with_context(|| format!("failed to recompute {} {}", target.kind, target.id))?;
            render(&[rollup], cli.json)?;
        }
        Commands::Propagate(target) => {
            let rollups = engine
                .recompute_with_dependents(target.id, target.kind.into())
                .await
                .with_context(|| format!("failed to propagate {} {}", target.kind, target.id))?;
            render(&rollups, cli.json)?;
        }
        Commands::RecomputeAll => {
            let rollups = engine
                .recompute_all()
                .await
                .context("failed to recompute cost graph")?;
            render(&rollups, cli.json)?;
        }
    }

    Ok(())
}

#[derive(Parser)]
#[command(
    name = "cost-admin",
    about = "Maintenance commands for the Herbax costing database",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,
    /// Recompute a single formula or product from its direct composition
    Recompute(Target),
    /// Recompute an entity and everything that embeds it
    Propagate(Target),
    /// Recompute every formula and product, leaves first
    RecomputeAll,
}

#[derive(Args)]
struct Target {
    #[arg(long, value_enum)]
    kind: KindArg,
    #[arg(long)]
    id: i32,
}

#[derive(Clone, Copy, ValueEnum, strum::Display)]
#[strum(serialize_all = "lowercase")]
enum KindArg {
    Formula,
    Product,
}

impl From<KindArg> for EntityKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Formula => EntityKind::Formula,
            KindArg::Product => EntityKind::Product,
        }
    }
}

fn render(rollups: &[CostRollup], json: bool) -> Result<()> {
    if json {
        return print_json(&rollups);
    }

    for rollup in rollups {
        println!(
            "{} {}: {} ({} lines)",
            rollup.kind,
            rollup.entity_id,
            rollup.total_cost,
            rollup.lines.len()
        );
        if let Some(breakdown) = &rollup.breakdown {
            println!(
                "  mp {} ({}%)  me {} ({}%)  ms {} ({}%)",
                breakdown.mp,
                breakdown.mp_percentage,
                breakdown.me,
                breakdown.me_percentage,
                breakdown.ms,
                breakdown.ms_percentage
            );
        }
        for missing in &rollup.dangling {
            println!("  warning: {}", missing);
        }
        if !rollup.stale_inputs.is_empty() {
            println!("  stale inputs: {:?}", rollup.stale_inputs);
        }
    }
    println!("{} rollup(s) persisted", rollups.len());
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render JSON")?;
    println!("{}", rendered);
    Ok(())
}
