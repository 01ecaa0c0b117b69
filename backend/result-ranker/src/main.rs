use anyhow::Context;
use result_ranker::{build_store, Config, MlpRankingModel, Owner, ResultRanker, SearchResult};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// One line of the feedback stream read from stdin
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum FeedbackEvent {
    /// Results shown to the user
    Results { results: Vec<SearchResult> },
    /// The user picked `result` for `query`
    Select { query: String, result: SearchResult },
    /// Print the learned order of `candidates` for `query`
    Rank {
        query: String,
        candidates: Vec<SearchResult>,
    },
}

#[derive(Serialize)]
struct RankingOutput<'a> {
    query: &'a str,
    ranking: Vec<SearchResult>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing (stdout carries rankings)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    // Load config
    let config = Config::from_env().context("Failed to load config")?;

    // Usage: result-ranker <owner> [role...]
    let mut args = std::env::args().skip(1);
    let owner = Owner::new(args.next().unwrap_or_else(|| "anonymous".to_string()));
    let owner = args.fold(owner, |owner, role| owner.with_role(role));

    info!(
        owner = %owner,
        output_units = config.ranker.output_units,
        debounce_ms = config.ranker.debounce_interval_ms,
        "Starting result-ranker"
    );

    let store = build_store(&config).context("Failed to initialize ranking storage")?;
    let ranker = ResultRanker::<MlpRankingModel>::load_or_init(store, owner, &config.ranker)
        .await
        .context("Failed to load ranking state")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted, draining pending snapshot");
                break;
            }
            line = lines.next_line() => match line.context("Failed to read stdin")? {
                Some(line) => handle_line(&ranker, &line)?,
                None => break,
            },
        }
    }

    ranker.shutdown(config.ranker.shutdown_timeout()).await;
    info!("result-ranker stopped");

    Ok(())
}

fn handle_line(ranker: &ResultRanker, line: &str) -> anyhow::Result<()> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(());
    }

    let event: FeedbackEvent = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Skipping malformed event");
            return Ok(());
        }
    };

    match event {
        FeedbackEvent::Results { results } => {
            let added = ranker.add_results(&results);
            debug!(shown = results.len(), added, "Results added");
        }
        FeedbackEvent::Select { query, result } => {
            if ranker.train_ranking(&query, &result).is_some() {
                debug!(query = %query, title = %result.title, "Selection learned");
            }
        }
        FeedbackEvent::Rank { query, candidates } => {
            let ranking = ranker.rank(&query, candidates);
            let output = RankingOutput {
                query: &query,
                ranking,
            };
            println!("{}", serde_json::to_string(&output)?);
        }
    }

    Ok(())
}
