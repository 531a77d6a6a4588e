// Specforge - iterative quality refinement for generated specification documents
// Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use specforge::config::{load_config, Config};
use specforge::documents::{DocumentStore, FsDocumentStore, ServiceType, TemplateValidator};
use specforge::providers::create_role_generators;
use specforge::refine::{
    snapshot_log_path, tracker_path, ControllerSettings, CycleSummary, FeedbackTracker,
    IterationController, RefinementExecutor, Reviewers, WorkflowContext,
};

/// Review and refine a set of generated specification documents
#[derive(Parser, Debug)]
#[command(name = "specforge")]
#[command(version)]
#[command(about = "Iterative quality refinement for generated specification documents")]
struct Args {
    /// Config file (default: ~/.specforge/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the generated documents
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Service type, decides whether openapi.json is part of the set
    #[arg(short, long, value_enum)]
    service_type: Option<ServiceType>,

    #[arg(long)]
    max_iterations: Option<usize>,

    /// Quality score below which refinement continues (0-100)
    #[arg(long)]
    quality_threshold: Option<f64>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,

    /// Don't append iteration snapshots to .specforge/iterations.jsonl
    #[arg(long)]
    no_snapshot_log: bool,

    /// Don't load or save .specforge/feedback.json
    #[arg(long)]
    no_persist_tracker: bool,

    /// Print the cycle summary as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        let refinement = &mut config.refinement;
        if let Some(dir) = &self.output_dir {
            refinement.output_dir = dir.clone();
        }
        if let Some(service_type) = self.service_type {
            refinement.service_type = service_type;
        }
        if let Some(n) = self.max_iterations {
            refinement.max_iterations = n;
        }
        if let Some(t) = self.quality_threshold {
            refinement.quality_threshold = t;
        }
        if let Some(level) = &self.log_level {
            refinement.log_level = level.clone();
        }
        if self.no_snapshot_log {
            refinement.snapshot_log = false;
        }
        if self.no_persist_tracker {
            refinement.persist_tracker = false;
        }
    }
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    args.apply(&mut config);
    config
        .validate()
        .context("Invalid command-line settings")?;

    init_tracing(&config.refinement.log_level);

    let refinement = config.refinement.clone();
    let store = Arc::new(FsDocumentStore::open(&refinement.output_dir)?);
    let output_dir = store.output_dir().to_path_buf();
    let order = refinement.service_type.document_order();

    let generators = create_role_generators(&config, &order)?;

    let tracker_file = refinement.persist_tracker.then(|| tracker_path(&output_dir));
    let tracker = match &tracker_file {
        Some(path) => FeedbackTracker::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load feedback tracker, starting fresh: {:#}", e);
            FeedbackTracker::new()
        }),
        None => FeedbackTracker::new(),
    };

    let mut ctx = WorkflowContext::new(&output_dir, refinement.service_type).with_tracker(tracker);

    let executor = RefinementExecutor::new(
        store.clone(),
        Arc::new(TemplateValidator::new()),
        generators.regenerators,
    );
    let controller = IterationController::new(
        store,
        Reviewers {
            quality: generators.quality,
            consistency: generators.consistency,
            coordinator: generators.coordinator,
        },
        executor,
        ControllerSettings {
            max_iterations: refinement.max_iterations,
            quality_threshold: refinement.quality_threshold,
            snapshot_log: refinement.snapshot_log.then(|| snapshot_log_path(&output_dir)),
            tracker_path: tracker_file,
        },
    );

    let summary = controller.run(&mut ctx).await?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?
        );
    } else {
        print_summary(&summary, refinement.consistency_threshold);
    }

    Ok(())
}

fn print_summary(summary: &CycleSummary, consistency_threshold: f64) {
    println!("Refinement {}", summary.termination);
    println!("  Iterations: {}", summary.iterations.len());

    if let Some(last) = summary.iterations.last() {
        match last.quality.overall {
            Some(score) => println!("  Quality:    {:.0}/100", score),
            None => println!("  Quality:    (no score)"),
        }
        let severity = last
            .consistency
            .severity
            .map(|s| format!("{:?}", s).to_lowercase())
            .unwrap_or_else(|| "unrated".to_string());
        println!(
            "  Consistency: {} issue(s), severity {} (threshold {:.0})",
            last.consistency.issues.len(),
            severity,
            consistency_threshold
        );
        println!(
            "  Coordinator: {}",
            if last.coordinator.approved { "approved" } else { "not approved" }
        );
    }

    if summary.updated_files.is_empty() {
        println!("  No documents updated");
    } else {
        println!("  Updated files:");
        for path in &summary.updated_files {
            println!("    {}", path.display());
        }
    }

    let m = &summary.metrics;
    println!(
        "  Calls: {} review, {} regeneration ({} failed, {} rejected by validation)",
        m.review_calls, m.regeneration_calls, m.regeneration_failures, m.validation_failures
    );
}
