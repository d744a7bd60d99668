//! Subcommand handlers.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use sift_core::import::{read_articles, ImportStats};
use sift_core::{Article, Pipeline, Region, RunContext, SiftConfig, SqliteEmbeddingStore};
use sift_embeddings::EmbedderFactory;

use crate::cli::{Cli, Commands, RunArgs};

pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref(), cli.store)?;

    match cli.command {
        Commands::Process {
            input,
            out_dir,
            run,
            record_history,
            no_embed,
        } => process(config, &input, &out_dir, run, record_history, no_embed).await,
        Commands::Record { input, run } => record(config, &input, run).await,
        Commands::Diff {
            input,
            against,
            run,
            threshold,
            lookback_days,
            output,
        } => {
            let mut config = config;
            if let Some(t) = threshold {
                config.diff.threshold = t;
            }
            if let Some(days) = lookback_days {
                config.diff.lookback_days = days;
            }
            config.validate()?;
            diff(config, &input, &against, run, output.as_deref()).await
        }
        Commands::Prioritize { input, top_n, output } => {
            prioritize(config, &input, top_n, output.as_deref()).await
        }
    }
}

/// File config (if any) with `SIFT_*` variables on top, then CLI flags.
pub fn load_config(path: Option<&Path>, store: Option<PathBuf>) -> Result<SiftConfig> {
    let mut config = match path {
        Some(p) => {
            let mut config = SiftConfig::from_file(p)
                .with_context(|| format!("failed to load config from {}", p.display()))?;
            config.apply_env()?;
            config
        }
        None => SiftConfig::from_env()?,
    };
    if let Some(store) = store {
        config.store.path = store;
    }
    config.validate()?;
    Ok(config)
}

fn run_context(args: RunArgs) -> RunContext {
    RunContext::new(
        args.run_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        args.date.unwrap_or_else(|| Utc::now().date_naive()),
    )
}

fn open_pipeline(config: SiftConfig) -> Result<Pipeline> {
    let store = SqliteEmbeddingStore::new(&config.store.path)
        .with_context(|| format!("failed to open embedding store {}", config.store.path.display()))?;
    Ok(Pipeline::new(config, Arc::new(store)))
}

async fn load_articles(path: &Path) -> Result<Vec<Article>> {
    let (articles, stats): (Vec<Article>, ImportStats) = read_articles(path)
        .await
        .with_context(|| format!("failed to read articles from {}", path.display()))?;
    if !stats.is_success() {
        for e in &stats.errors {
            warn!(file = %path.display(), error = %e, "Skipped input record");
        }
    }
    info!(file = %path.display(), imported = stats.imported, total = stats.total, "Loaded articles");
    Ok(articles)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

fn emit<T: Serialize + ?Sized>(output: Option<&Path>, value: &T) -> Result<()> {
    match output {
        Some(path) => write_json(path, value),
        None => {
            println!("{}", serde_json::to_string_pretty(value)?);
            Ok(())
        }
    }
}

async fn process(
    config: SiftConfig,
    input: &Path,
    out_dir: &Path,
    run: RunArgs,
    record_history: bool,
    no_embed: bool,
) -> Result<()> {
    let run = run_context(run);
    let articles = load_articles(input).await?;

    let needs_embedding = articles.iter().any(|a| !a.has_embedding());
    let mut pipeline = open_pipeline(config.clone())?;
    if needs_embedding && !no_embed {
        let embedder = EmbedderFactory::from_config(&config.embedder).context("failed to create embedder")?;
        pipeline = pipeline.with_embedder(embedder);
    }

    let output = pipeline.process(articles, &run).await?;

    std::fs::create_dir_all(out_dir).with_context(|| format!("failed to create {}", out_dir.display()))?;
    write_json(&out_dir.join("survivors.json"), &output.survivors)?;
    write_json(&out_dir.join("groups.json"), &output.groups)?;
    write_json(&out_dir.join("dedup_log.json"), &output.dedup_log)?;
    write_json(&out_dir.join("errors.json"), &output.errors)?;
    write_json(&out_dir.join("report.json"), &output.report)?;

    if record_history {
        let recorded = pipeline.record_history(&output.survivors, &run)?;
        info!(recorded, run_id = %run.run_id, "Recorded survivors");
    }

    println!(
        "{} {}: {} in, {} dropped, {} excluded, {} survivors in {} groups ({})",
        run.run_id,
        run.date,
        output.report.counts.input,
        output.report.counts.dropped_by_dedup,
        output.report.counts.excluded,
        output.report.counts.survivors,
        output.groups.len(),
        output.report.status,
    );
    Ok(())
}

async fn record(config: SiftConfig, input: &Path, run: RunArgs) -> Result<()> {
    if run.run_id.is_none() {
        bail!("--run-id is required so history can be excluded from the run that produced it");
    }
    let run = run_context(run);
    let articles = load_articles(input).await?;
    let pipeline = open_pipeline(config)?;
    let recorded = pipeline.record_history(&articles, &run)?;
    println!("Recorded {} of {} articles for run {}", recorded, articles.len(), run.run_id);
    Ok(())
}

async fn diff(
    config: SiftConfig,
    input: &Path,
    against: &str,
    run: RunArgs,
    output: Option<&Path>,
) -> Result<()> {
    let run = run_context(run);
    let articles = load_articles(input).await?;
    let region_b = Region::new(against);
    if region_b.is_unset() {
        bail!("--against must name a region");
    }
    let pipeline = open_pipeline(config)?;
    let report = pipeline.diff(&articles, &region_b, &run)?;
    emit(output, &report)
}

async fn prioritize(config: SiftConfig, input: &Path, top_n: Option<usize>, output: Option<&Path>) -> Result<()> {
    let articles = load_articles(input).await?;
    // Scoring never touches history; skip opening the store.
    let ranked = sift_core::PriorityScorer::new(config.priority.clone())
        .top_n(&articles, top_n.unwrap_or(config.priority.top_n));
    emit(output, &ranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_store_override() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sift.toml");
        std::fs::write(&path, "[grouping]\nthreshold = 0.7\n").unwrap();

        let config = load_config(Some(&path), Some(dir.path().join("h.db"))).unwrap();
        assert_eq!(config.grouping.threshold, 0.7);
        assert_eq!(config.store.path, dir.path().join("h.db"));
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(load_config(Some(Path::new("/nonexistent/sift.toml")), None).is_err());
    }

    #[tokio::test]
    async fn test_process_writes_outputs_without_embedder() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("articles.json");
        std::fs::write(
            &input,
            r#"[
                {"id": "a", "title": "Transfer done", "region": "tr", "embedding": [1.0, 0.0]},
                {"id": "b", "title": "Transfer official", "region": "tr", "embedding": [0.99, 0.05]},
                {"id": "c", "title": "Derby tonight", "region": "tr", "embedding": [0.0, 1.0]}
            ]"#,
        )
        .unwrap();
        let out = dir.path().join("out");

        let mut config = SiftConfig::default();
        config.store.path = dir.path().join("h.db");
        config.embedder.config.embedding_dims = 2;
        let run = RunArgs {
            run_id: Some("r1".to_string()),
            date: chrono::NaiveDate::from_ymd_opt(2025, 3, 1),
        };

        process(config.clone(), &input, &out, run, true, true).await.unwrap();

        for name in ["survivors.json", "groups.json", "dedup_log.json", "errors.json", "report.json"] {
            assert!(out.join(name).exists(), "missing {}", name);
        }
        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.join("report.json")).unwrap()).unwrap();
        assert_eq!(report["status"], "success");
        assert_eq!(report["counts"]["survivors"], 3);

        let history = SqliteEmbeddingStore::new(&config.store.path).unwrap();
        use sift_core::EmbeddingStore;
        assert_eq!(history.count().unwrap(), 3);
    }
}
