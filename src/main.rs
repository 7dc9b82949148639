use anyhow::Result;
use clap::{Parser, Subcommand};
use lexigraph::db::{migrate, Db};
use lexigraph::embeddings::OpenAIEmbedder;
use lexigraph::graph::{graph_stats, traverse_graph, OpenAIOracle, RelationType};
use lexigraph::lexicon::{get_sense, SenseId};
use lexigraph::{Config, Pipeline};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "lexigraph")]
#[command(about = "Discover semantic relations between lexicon senses")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh embeddings, then scan eligible senses for relations (default)
    Run {
        /// Scan at most this many senses
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Only bring stale embeddings up to date
    Refresh,
    /// Only scan senses whose embeddings are already fresh
    Discover {
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Print lexicon and graph statistics
    Stats,
    /// Print relations reachable from a sense
    Related {
        sense_id: SenseId,
        #[arg(short, long, default_value_t = 1)]
        depth: usize,
        /// Restrict to these relation types (repeatable)
        #[arg(short, long)]
        relation: Vec<RelationType>,
    },
}

fn build_embedder(config: &Config) -> Result<OpenAIEmbedder> {
    let embedder = OpenAIEmbedder::new(
        config.embeddings_api_key()?,
        config.embeddings.model.clone(),
        &config.embeddings.base_url,
        config.embeddings.timeout(),
    )?
    .with_dimensions(config.embeddings.dimensions);
    log::info!(
        "Embedder configured: model={}, dimensions={}, batch_size={}",
        config.embeddings.model,
        config.embeddings.dimensions,
        config.embeddings.batch_size
    );
    Ok(embedder)
}

fn build_oracle(config: &Config) -> Result<OpenAIOracle> {
    let oracle = OpenAIOracle::new(
        config.discovery_api_key()?,
        config.discovery.model.clone(),
        &config.discovery.base_url,
        config.discovery.timeout(),
    )?;
    log::info!("Oracle configured: model={}", config.discovery.model);
    Ok(oracle)
}

async fn sense_label(db: &Db, sense_id: SenseId) -> Result<String> {
    let sense = get_sense(db, sense_id).await?;
    Ok(format!("{}#{}", sense.lemma, sense.sense_id))
}

/// Set the returned flag on Ctrl-C so the run stops after the current sense.
fn stop_on_ctrl_c() -> Arc<AtomicBool> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, finishing the current sense");
            flag.store(true, Ordering::SeqCst);
        }
    });
    stop
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", config.lexigraph.log_level.as_str())
    ).init();

    log::info!("Configuration loaded, database: {}", config.db_path().display());

    let db = Db::new(config.db_path());
    let migrations_dir = config.migrations_dir().to_path_buf();
    db.with_connection(move |conn| migrate::run_migrations(conn, &migrations_dir))
        .await?;

    match args.command.unwrap_or(Command::Run { limit: None }) {
        Command::Run { limit } => {
            let embedder = build_embedder(&config)?;
            let oracle = build_oracle(&config)?;
            let pipeline = Pipeline::new(&db, &config).with_stop_flag(stop_on_ctrl_c());
            pipeline.run(&embedder, &oracle, limit).await?;
        }
        Command::Refresh => {
            let embedder = build_embedder(&config)?;
            let report = Pipeline::new(&db, &config).refresh(&embedder).await?;
            println!(
                "Refreshed {} of {} stale embeddings ({} unresolved)",
                report.refreshed, report.stale, report.unresolved
            );
        }
        Command::Discover { limit } => {
            let oracle = build_oracle(&config)?;
            let pipeline = Pipeline::new(&db, &config).with_stop_flag(stop_on_ctrl_c());
            let report = pipeline.discover(&oracle, limit).await?;
            println!(
                "Scanned {} senses, {} deferred, {} new edges",
                report.senses_scanned, report.senses_deferred, report.edges_created
            );
        }
        Command::Stats => {
            let stats = graph_stats(&db, &config.embeddings.model, config.embeddings.dimensions).await?;
            println!("Lexigraph statistics");
            println!("====================");
            println!("Senses:            {}", stats.senses);
            println!("Fresh embeddings:  {}", stats.fresh_embeddings);
            println!("Stale embeddings:  {}", stats.stale_embeddings);
            println!("Missing:           {}", stats.missing_embeddings);
            println!("Awaiting scan:     {}", stats.scan_eligible);
            println!();
            println!("Edges: {}", stats.total_edges());
            for (label, counts) in [
                ("by type", &stats.edges_by_type),
                ("by provenance", &stats.edges_by_provenance),
                ("by status", &stats.edges_by_status),
            ] {
                println!("  {}:", label);
                for (key, count) in counts {
                    println!("    {:<14} {}", key, count);
                }
            }
        }
        Command::Related { sense_id, depth, relation } => {
            let filter = if relation.is_empty() { None } else { Some(relation) };
            let edges = traverse_graph(&db, sense_id, filter, depth).await?;
            if edges.is_empty() {
                println!("No relations found for sense {}", sense_id);
            }
            for edge in edges {
                println!(
                    "{} -[{} {}]-> {}  ({}, {})",
                    sense_label(&db, edge.source_sense_id).await?,
                    edge.relation_type,
                    edge.strength,
                    sense_label(&db, edge.target_sense_id).await?,
                    edge.provenance.as_str(),
                    edge.status.as_str()
                );
            }
        }
    }

    Ok(())
}
