//! # Ragline CLI (`rgl`)
//!
//! The `rgl` binary is the operational surface of the knowledge pipeline:
//! database initialization, document ingestion, retrieval-augmented queries,
//! corpus statistics, expansion metrics, acquisition recommendations, daily
//! reports, and the periodic maintenance loop.
//!
//! ## Usage
//!
//! ```bash
//! rgl --config ./config/ragline.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rgl init` | Create the SQLite database and run schema migrations |
//! | `rgl ingest <file>...` | Ingest extracted-text documents |
//! | `rgl query "<text>"` | Ask the knowledge base a question |
//! | `rgl stats` | Corpus and pipeline health overview |
//! | `rgl metrics` | Expansion metrics (coverage, quality, recency) |
//! | `rgl recommend` | Rank next sources against coverage gaps |
//! | `rgl report` | Generate and store today's intelligence report |
//! | `rgl watch` | Run the periodic refresh/smoke-test loop |

mod chunk;
mod config;
mod db;
mod embedding;
mod error;
mod extract;
mod index;
mod inference;
mod ingest;
mod linker;
mod metrics;
mod migrate;
mod models;
mod normalize;
mod quality;
mod query;
mod recommend;
mod report;
mod scheduler;
mod stats;
mod store;
mod trust;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use crate::ingest::{IngestRequest, Ingestor};
use crate::query::QueryEngine;
use crate::recommend::RecommendationEngine;
use crate::store::{KnowledgeStore, SearchFilter};

/// Ragline — a retrieval-augmented knowledge pipeline.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/ragline.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rgl",
    about = "Ragline — retrieval-augmented knowledge pipeline",
    version,
    long_about = "Ragline ingests documents into an append-only vector store, mines \
    trust-scored concepts and cross-domain insights from them, and answers free-text \
    queries with multi-source synthesized context."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragline.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite file and all tables (source_documents, chunks,
    /// chunk_vectors, knowledge_blocks, concept_relationships,
    /// cross_domain_insights, daily_reports). Idempotent.
    Init,

    /// Ingest one or more extracted-text documents.
    ///
    /// Each file is normalized, chunked, quality-scored, embedded, and
    /// stored. Concepts are extracted and trust-scored when an inference
    /// provider is configured; cross-domain linking runs in the background.
    Ingest {
        /// Paths to plain-text files (pre-extracted document content).
        files: Vec<PathBuf>,

        /// Document title. Defaults to the file stem; with multiple files
        /// each file uses its own stem.
        #[arg(long)]
        title: Option<String>,

        /// Source author (used as the retrieval diversity grouping key).
        #[arg(long)]
        author: Option<String>,

        /// Comma-separated topic tags.
        #[arg(long, value_delimiter = ',')]
        topics: Vec<String>,

        /// Document language.
        #[arg(long, default_value = "en")]
        language: String,

        /// Wait for background insight linking to finish before exiting.
        #[arg(long)]
        wait_for_links: bool,
    },

    /// Ask the knowledge base a question.
    Query {
        /// The question.
        text: String,

        /// Restrict retrieval to chunks tagged with this topic.
        #[arg(long, conflicts_with = "source")]
        topic: Option<String>,

        /// Restrict retrieval to one source.
        #[arg(long)]
        source: Option<String>,
    },

    /// Corpus and pipeline health overview.
    Stats,

    /// Expansion metrics: coverage, quality distribution, recency.
    Metrics,

    /// Rank catalog sources against current coverage gaps.
    Recommend {
        /// Target topics to fill (repeatable or comma-separated).
        #[arg(long, value_delimiter = ',')]
        target: Vec<String>,

        /// How many recommendations to print.
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Generate and store today's intelligence report.
    Report,

    /// Run the periodic refresh / smoke-test loop in the foreground.
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = Arc::new(config::load_config(&cli.config)?);

    let pool = db::connect(&cfg).await?;
    let store = Arc::new(KnowledgeStore::open(pool).await?);

    match cli.command {
        Commands::Init => {
            // KnowledgeStore::open already ran migrations.
            println!("Database initialized successfully.");
        }

        Commands::Ingest {
            files,
            title,
            author,
            topics,
            language,
            wait_for_links,
        } => {
            if files.is_empty() {
                bail!("No input files. Usage: rgl ingest <file>...");
            }

            let embedder = embedding::create_embedder(&cfg.embedding)?;
            let reasoner = if cfg.inference.is_enabled() {
                Some(inference::create_reasoner(&cfg.inference)?)
            } else {
                None
            };
            let ingestor = Ingestor::new(Arc::clone(&cfg), Arc::clone(&store), embedder, reasoner);

            let mut requests = Vec::new();
            for file in &files {
                let text = std::fs::read_to_string(file)?;
                let file_title = title.clone().unwrap_or_else(|| {
                    file.file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_else(|| file.display().to_string())
                });
                requests.push(IngestRequest {
                    title: file_title,
                    author: author.clone(),
                    topics: topics.clone(),
                    language: language.clone(),
                    text,
                });
            }

            let outcomes = ingestor.ingest_batch(requests).await;

            let mut failures = 0usize;
            for outcome in outcomes {
                if outcome.success {
                    println!(
                        "ok    {} — {} chunks ({} skipped, {} superseded, {} concepts)",
                        outcome.title,
                        outcome.chunks_written,
                        outcome.chunks_skipped,
                        outcome.superseded,
                        outcome.concepts_stored
                    );
                } else {
                    failures += 1;
                    println!(
                        "fail  {} — {}",
                        outcome.title,
                        outcome.error.as_deref().unwrap_or("unknown error")
                    );
                }

                if wait_for_links {
                    for task in outcome.link_tasks {
                        if let Ok(count) = task.await {
                            if count > 0 {
                                println!("      +{count} cross-domain insight(s)");
                            }
                        }
                    }
                }
            }

            if failures > 0 {
                bail!("{failures} document(s) failed to ingest");
            }
        }

        Commands::Query {
            text,
            topic,
            source,
        } => {
            if !cfg.inference.is_enabled() {
                bail!("Queries require an inference provider. Set [inference] provider in config.");
            }
            let embedder = embedding::create_embedder(&cfg.embedding)?;
            let reasoner = inference::create_reasoner(&cfg.inference)?;
            let engine = QueryEngine::new(Arc::clone(&cfg), Arc::clone(&store), embedder, reasoner);

            let filter = topic
                .map(SearchFilter::Topic)
                .or(source.map(SearchFilter::Source));
            let outcome = engine.query(&text, filter).await;

            if !outcome.success {
                bail!(
                    "query failed: {}",
                    outcome.error.as_deref().unwrap_or("unknown error")
                );
            }

            if outcome.insufficient_context {
                println!("No relevant knowledge above the similarity threshold.");
                println!("(sources: 0, candidates considered: 0)");
            } else {
                println!("{}", outcome.answer.as_deref().unwrap_or(""));
                println!();
                println!(
                    "-- {} source(s), {} candidate(s) considered",
                    outcome.source_diversity, outcome.candidates_considered
                );
                for usage in &outcome.sources {
                    println!("   {} ({} chunk(s))", usage.source, usage.chunks_used);
                }
            }
        }

        Commands::Stats => {
            stats::run_stats(&cfg, &store).await?;
        }

        Commands::Metrics => {
            let snapshot = metrics::expansion_snapshot(&store, chrono::Utc::now()).await?;
            println!("Expansion metrics");
            println!("  sources:  {}", snapshot.total_sources);
            println!("  chunks:   {}", snapshot.total_chunks);
            println!("  recent:   {} (last 7 days)", snapshot.recent_additions);
            println!(
                "  quality:  {} excellent / {} good / {} average",
                snapshot.quality.excellent, snapshot.quality.good, snapshot.quality.average
            );
            if !snapshot.topic_coverage.is_empty() {
                println!("  topics:");
                for (topic, count) in &snapshot.topic_coverage {
                    println!("    {:<28} {}", topic, count);
                }
            }
        }

        Commands::Recommend { target, limit } => {
            if target.is_empty() {
                bail!("No target topics. Usage: rgl recommend --target <topic>[,<topic>...]");
            }
            let snapshot = metrics::expansion_snapshot(&store, chrono::Utc::now()).await?;
            let engine = RecommendationEngine::new(&cfg.catalog);
            let recommendations = engine.recommend(&snapshot.topic_coverage, &target, limit);

            if recommendations.is_empty() {
                println!("No catalog candidates.");
            }
            for (i, rec) in recommendations.iter().enumerate() {
                println!("{}. [{:>3}] {}", i + 1, rec.score, rec.source);
                println!("       {}", rec.rationale);
            }
        }

        Commands::Report => {
            if !cfg.inference.is_enabled() {
                bail!("Reports require an inference provider. Set [inference] provider in config.");
            }
            let reasoner = inference::create_reasoner(&cfg.inference)?;
            let daily = report::generate_daily_report(
                &store,
                reasoner.as_ref(),
                &cfg.inference.model,
                chrono::Utc::now(),
            )
            .await?;

            println!("Daily report — {}", daily.report_date);
            println!("{}", daily.executive_summary);
            for discovery in &daily.key_discoveries {
                println!("  * {discovery}");
            }
            if daily.degraded {
                println!("(degraded: generative provider unavailable)");
            }
        }

        Commands::Watch => {
            if !cfg.inference.is_enabled() {
                bail!("The maintenance loop requires an inference provider for smoke tests.");
            }
            let embedder = embedding::create_embedder(&cfg.embedding)?;
            let reasoner = inference::create_reasoner(&cfg.inference)?;
            let engine = QueryEngine::new(Arc::clone(&cfg), Arc::clone(&store), embedder, reasoner);
            let scheduler = scheduler::Scheduler::new(Arc::clone(&cfg), Arc::clone(&store), engine);

            println!(
                "Maintenance loop started (every {}s). Ctrl-C to stop.",
                cfg.scheduler.interval_secs
            );
            scheduler.run().await;
        }
    }

    Ok(())
}
