//! vidrelay: fetch a video, keep the selected tracks, upload the result.
//!
//! Storage and pipeline settings come from the environment (see `.env`);
//! the flags below override the per-run choices.

use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use vidrelay_cli::{failure_message, init_tracing, render_progress, success_message};
use vidrelay_core::{AudioSelection, ProgressReporter, Topology, TrackSelectionSpec, TransferConfig};
use vidrelay_processing::{Coordinator, TransferRequest};
use vidrelay_storage::create_storage;

#[derive(Parser, Debug)]
#[command(name = "vidrelay", about = "Remux a video and upload it to object storage")]
struct Cli {
    /// HTTP(S) URL or local path of the source video
    source: String,

    /// Object key to write, e.g. videos/lecture-01.mp4
    destination_key: String,

    /// stream, remote-file or download (default: TRANSFER_TOPOLOGY or stream)
    #[arg(long)]
    topology: Option<Topology>,

    /// Keep audio tracks tagged with this ISO 639-2 language
    #[arg(long, default_value = "eng", conflicts_with = "all_audio")]
    language: String,

    /// Keep every audio track
    #[arg(long)]
    all_audio: bool,

    /// Do not mark the kept audio track as default
    #[arg(long)]
    no_default_audio: bool,

    /// Keep subtitle tracks, converted to mov_text
    #[arg(long)]
    subtitles: bool,

    /// Print progress as JSON lines on stdout
    #[arg(long)]
    json_progress: bool,
}

impl Cli {
    fn tracks(&self) -> TrackSelectionSpec {
        let mut tracks = TrackSelectionSpec::language(&self.language)
            .with_default_audio(!self.no_default_audio)
            .with_subtitles(self.subtitles);
        if self.all_audio {
            tracks.audio = AudioSelection::All;
        }
        tracks
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let coordinator = match build_coordinator(&cli).await {
        Ok(coordinator) => coordinator,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let request = match TransferRequest::parse(&cli.source, &cli.destination_key, cli.tracks()) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("{}", failure_message(&e));
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling transfer");
            on_interrupt.cancel();
        }
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let json = cli.json_progress;
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let line = render_progress(&event, json);
            if json {
                println!("{}", line);
            } else {
                eprintln!("{}", line);
            }
        }
    });

    let progress = ProgressReporter::new(tx);
    let result = coordinator.run(&request, &progress, &cancel).await;
    // Closing the channel lets the printer drain and exit
    drop(progress);
    let _ = printer.await;

    match result {
        Ok(outcome) => {
            println!("{}", success_message(&outcome));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", failure_message(&e));
            ExitCode::FAILURE
        }
    }
}

async fn build_coordinator(cli: &Cli) -> anyhow::Result<Coordinator> {
    let mut config = TransferConfig::from_env().context("Failed to load configuration")?;
    if let Some(topology) = cli.topology {
        config.topology = topology;
    }

    let storage = create_storage(&config)
        .await
        .context("Failed to initialize storage")?;
    tracing::info!(
        backend = %storage.backend_type(),
        bucket = %storage.bucket(),
        topology = %config.topology,
        "Storage ready"
    );

    Coordinator::new(&config, storage).context("Failed to build transfer pipeline")
}
