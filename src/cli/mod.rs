//! stackwise CLI Module
//!
//! Command-line driver over the preset registry: list models, show a build
//! plan, build a model and write its test predictions.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::cache::{ArtifactStore, FileStore, Split};
use crate::config::StackConfig;
use crate::features::{CsvDataset, FeatureProvider};
use crate::metrics::label_scores;
use crate::presets::toxicity_registry;
use crate::resolver::{BuildOrchestrator, BuildStatus, FailurePolicy};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }
fn bad(s: &str) -> ColoredString    { s.truecolor(230, 110, 100) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn status_label(status: &BuildStatus) -> ColoredString {
    match status {
        BuildStatus::Computed => ok("computed"),
        BuildStatus::Cached => accent("cached"),
        BuildStatus::Failed(_) => bad("failed"),
        BuildStatus::Skipped { .. } => muted("skipped"),
    }
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "stackwise")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Multi-level stacking for multi-label text classification")]
#[command(long_about = None)]
pub struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List registered models and their dependencies
    List,

    /// Show the build order of a model
    Plan {
        /// Model name
        model: String,
    },

    /// Build one or more models and write test predictions
    Build {
        /// Model names
        #[arg(required = true)]
        models: Vec<String>,

        /// Directory with train.csv, test.csv and feature-set files
        #[arg(short, long)]
        data_dir: PathBuf,

        /// Directory for cached predictions
        #[arg(long, default_value = "cache")]
        cache_dir: PathBuf,

        /// Write the test predictions of the first model to this CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep building independent models after a failure
        #[arg(long)]
        best_effort: bool,
    },

    /// Drop cached predictions of a model and everything stacked on it
    Invalidate {
        /// Model name
        model: String,

        /// Directory for cached predictions
        #[arg(long, default_value = "cache")]
        cache_dir: PathBuf,
    },
}

/// Configuration from `--config`, or defaults, with environment overrides
pub fn load_config(path: Option<&Path>) -> anyhow::Result<StackConfig> {
    let config = match path {
        Some(path) => StackConfig::from_json_file(path)?,
        None => StackConfig::default(),
    };
    Ok(config.with_env_overrides())
}

pub fn cmd_list() -> anyhow::Result<()> {
    let registry = toxicity_registry();
    section("Models");
    for spec in registry.specs() {
        let deps = if spec.dependencies().is_empty() {
            dim("-").to_string()
        } else {
            spec.dependencies().join(", ")
        };
        println!("  {:<20} {}", spec.name().white().bold(), deps);
        if !spec.feature_sets().is_empty() {
            println!("  {:<20} {} {}", "", muted("features"), spec.feature_sets().join(", "));
        }
    }
    println!();
    Ok(())
}

pub fn cmd_plan(model: &str) -> anyhow::Result<()> {
    let registry = toxicity_registry();
    let order = crate::resolver::graph::topological_order(&registry, &[model.to_string()])?;
    let waves = crate::resolver::graph::waves(&registry, &order)?;

    section(&format!("Plan for {}", model));
    for (i, wave) in waves.iter().enumerate() {
        println!("  {} {}", muted(&format!("wave {}", i)), wave.join(", "));
    }
    println!();
    Ok(())
}

pub fn cmd_build(
    config: StackConfig,
    models: &[String],
    data_dir: &Path,
    cache_dir: &Path,
    output: Option<&Path>,
    best_effort: bool,
) -> anyhow::Result<()> {
    section("Build");

    step_run("Loading data");
    let start = Instant::now();
    let dataset = Arc::new(CsvDataset::open(data_dir, &config.text_column, config.label_schema()?)?);
    step_done(&format!("{:?}", start.elapsed()));

    let store = Arc::new(FileStore::new(cache_dir)?);
    let orchestrator = BuildOrchestrator::new(
        toxicity_registry().into_shared(),
        dataset.clone(),
        store.clone(),
        config,
    )?;

    let policy = if best_effort {
        FailurePolicy::BestEffort
    } else {
        FailurePolicy::FailFast
    };
    let start = Instant::now();
    let report = orchestrator.build_all(models, policy)?;

    println!();
    for outcome in &report.outcomes {
        println!(
            "  {:<20} {:<10} {}",
            outcome.model.white(),
            status_label(&outcome.status),
            dim(&format!("{:.2}s", outcome.elapsed_secs))
        );
        if let BuildStatus::Failed(reason) = &outcome.status {
            println!("  {:<20} {}", "", bad(reason));
        }
    }

    section("Out-of-fold AUC");
    for model in models {
        let Some(train) = store.get(&crate::cache::ArtifactKey::train(model.as_str()))? else {
            continue;
        };
        let scores = label_scores(dataset.labels(), &train.predictions)?;
        let mean = scores
            .mean
            .map(|m| format!("{:.4}", m))
            .unwrap_or_else(|| "n/a".to_string());
        println!("  {:<20} {}", model.white(), mean.bold());
        for (label, score) in &scores.per_label {
            let score = score.map(|s| format!("{:.4}", s)).unwrap_or_else(|| "n/a".to_string());
            println!("    {:<18} {}", muted(label), score);
        }
    }

    if let (Some(path), Some(first)) = (output, models.first()) {
        let test = store
            .get(&crate::cache::ArtifactKey::test(first.as_str()))?
            .ok_or_else(|| anyhow::anyhow!("no test predictions for '{}'", first))?;
        dataset.write_predictions(path, Split::Test, &test.predictions)?;
        println!();
        println!("  {} {}", ok("✓"), format!("wrote {}", path.display()));
    }

    println!();
    println!("  {:<16} {}", muted("Time"), format!("{:.3}s", start.elapsed().as_secs_f64()).white());
    println!();

    if !report.is_success() {
        anyhow::bail!("{} model(s) failed", report.failed().len() + report.skipped().len());
    }
    Ok(())
}

pub fn cmd_invalidate(model: &str, cache_dir: &Path) -> anyhow::Result<()> {
    let registry = toxicity_registry();
    registry.resolve(model)?;
    let store = FileStore::new(cache_dir)?;

    let mut removed = store.invalidate(model)?;
    for dependent in crate::resolver::graph::dependents(&registry, model) {
        removed += store.invalidate(&dependent)?;
    }
    println!("  {} removed {} artifact(s)", ok("✓"), removed);
    Ok(())
}
