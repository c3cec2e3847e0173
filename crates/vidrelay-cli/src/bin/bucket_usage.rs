use anyhow::{Context, Result};
use clap::Parser;
use vidrelay_cli::{init_tracing, usage_table};
use vidrelay_core::TransferConfig;
use vidrelay_storage::{create_storage, BucketUsageReporter};

#[derive(Parser, Debug)]
#[command(name = "bucket_usage")]
#[command(about = "Report the total size of every object in the configured bucket")]
struct Args {
    /// Output format: json or table (default: table)
    #[arg(long, default_value = "table")]
    format: String,
}

#[derive(serde::Serialize)]
struct UsageReport {
    bucket: String,
    object_count: u64,
    total_bytes: u64,
    total_mb: String,
    total_gb: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = TransferConfig::from_env().context("Failed to load configuration")?;
    let storage = create_storage(&config)
        .await
        .context("Failed to initialize storage")?;
    let bucket = storage.bucket().to_string();

    let summary = BucketUsageReporter::new(storage, config.list_page_size)
        .summarize()
        .await
        .with_context(|| format!("Failed to list bucket {}", bucket))?;

    match args.format.as_str() {
        "json" => {
            let report = UsageReport {
                bucket,
                object_count: summary.object_count,
                total_bytes: summary.total_bytes,
                total_mb: summary.total_mb_display(),
                total_gb: summary.total_gb_display(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            println!("{}", usage_table(&bucket, &summary));
        }
    }

    Ok(())
}
