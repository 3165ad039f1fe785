use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use brandpulse_common::{Config, Job};
use brandpulse_scout::pipeline::stats::ClassificationSummary;
use brandpulse_scout::store::{JobStore, JsonFileStore};
use brandpulse_scout::workflows::{JobHandle, JobRunner, PipelineDeps, TaskOutcome};

#[derive(Parser)]
#[command(name = "brandpulse", about = "Collect and classify social media posts about a brand")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Collect posts for a brand and generate its category key
    Scrape {
        #[arg(long)]
        brand: String,
        /// First day, YYYY-MM-DD
        #[arg(long)]
        start: String,
        /// Last day, YYYY-MM-DD
        #[arg(long)]
        end: String,
    },
    /// Classify the posts of a scraped job
    Classify { id: Uuid },
    /// Clear a job's classification results
    ResetClassification { id: Uuid },
    /// Show one job
    Status { id: Uuid },
    /// List all jobs
    List,
    /// Delete a job
    Delete { id: Uuid },
    /// Sentiment and category statistics of a classified job
    Summary {
        id: Uuid,
        #[arg(long)]
        json: bool,
    },
    /// Write a narrative markdown report for a classified job
    Report {
        id: Uuid,
        /// Write the report to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("brandpulse=info".parse()?)
                .add_directive("apify_client=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Scrape { brand, start, end } => {
            let runner = build_runner().await?;
            let handle = runner.submit_scrape(&brand, &start, &end).await?;
            finish(&runner, handle).await
        }
        Command::Classify { id } => {
            let runner = build_runner().await?;
            let handle = runner.submit_classification(id).await?;
            finish(&runner, handle).await
        }
        Command::ResetClassification { id } => {
            let runner = build_runner().await?;
            let job = runner.reset_classification(id).await?;
            println!("Cleared classifications for job {}", job.id);
            Ok(())
        }
        Command::Status { id } => {
            let job = open_store().await?.get(id).await?;
            match job {
                Some(job) => print_job(&job),
                None => bail!("job {id} not found"),
            }
            Ok(())
        }
        Command::List => {
            for job in open_store().await?.list().await? {
                println!(
                    "{}  {:<11} {:>5.1}%  {}  ({} to {})",
                    job.id,
                    job.status.to_string(),
                    job.progress * 100.0,
                    job.brand_name,
                    job.start_date,
                    job.end_date
                );
            }
            Ok(())
        }
        Command::Delete { id } => {
            if open_store().await?.delete(id).await? {
                println!("Deleted job {id}");
                Ok(())
            } else {
                bail!("job {id} not found")
            }
        }
        Command::Summary { id, json } => {
            let Some(job) = open_store().await?.get(id).await? else {
                bail!("job {id} not found");
            };
            if !job.has_classification() {
                bail!("job {id} has no classification results");
            }
            let summary = ClassificationSummary::from_classifications(&job.classifications);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("Brand: {}\n{summary}", job.brand_name);
            }
            Ok(())
        }
        Command::Report { id, out } => {
            let runner = build_runner().await?;
            let report = runner.generate_report(id).await?;
            match out {
                Some(path) => {
                    tokio::fs::write(&path, &report.markdown).await?;
                    println!("Report for job {id} written to {}", path.display());
                }
                None => println!("{}", report.markdown),
            }
            Ok(())
        }
    }
}

async fn open_store() -> Result<JsonFileStore> {
    JsonFileStore::open(Config::data_dir_from_env()).await
}

async fn build_runner() -> Result<JobRunner> {
    let config = Config::from_env()?;
    config.log_redacted();
    let store: Arc<dyn JobStore> = Arc::new(JsonFileStore::open(config.data_dir.clone()).await?);
    Ok(JobRunner::new(PipelineDeps::from_config(&config), store, config.job_workers))
}

/// Wait for the job, stopping queued work on Ctrl-C.
async fn finish(runner: &JobRunner, handle: JobHandle) -> Result<()> {
    let job_id = handle.job_id;
    info!(%job_id, "Job queued");

    let wait = handle.wait();
    tokio::pin!(wait);
    let interrupted = tokio::select! {
        outcome = &mut wait => Ok(outcome),
        _ = tokio::signal::ctrl_c() => Err(()),
    };
    let outcome = match interrupted {
        Ok(outcome) => outcome,
        Err(()) => {
            runner.shutdown();
            wait.await
        }
    };

    if let Some(job) = runner.store().get(job_id).await? {
        print_job(&job);
    }
    match outcome {
        TaskOutcome::Completed => Ok(()),
        TaskOutcome::Failed(message) => bail!("job {job_id} failed: {message}"),
        TaskOutcome::Abandoned => bail!("job {job_id} was abandoned"),
    }
}

fn print_job(job: &Job) {
    println!("Job:        {}", job.id);
    println!("Brand:      {}", job.brand_name);
    println!("Dates:      {} to {}", job.start_date, job.end_date);
    println!("Status:     {} ({:.0}%)", job.status, job.progress * 100.0);
    println!("Step:       {}", job.current_step);
    println!("Posts:      {}", job.posts.len());
    if let Some(taxonomy) = &job.taxonomy {
        println!("Aspects:    {}", taxonomy.names().join(", "));
    }
    println!("Classified: {}", job.classifications.len());
    let stale = job.stale_classification_indices();
    if !stale.is_empty() {
        println!("Warning:    {} classification(s) no longer match their post", stale.len());
    }
    if let Some(error) = &job.error_message {
        println!("Error:      {error}");
    }
}
