use vidrelay_core::{ProgressEvent, TransferError, UsageSummary};
use vidrelay_infra::{init_telemetry, LogFormat};
use vidrelay_processing::TransferOutcome;

/// Initialize tracing for CLI binaries. Logs go to stderr.
pub fn init_tracing() {
    if let Err(e) = init_telemetry(LogFormat::from_env()) {
        eprintln!("Warning: failed to initialize logging: {}", e);
    }
}

/// One progress line: human-readable, or a JSON object per event.
pub fn render_progress(event: &ProgressEvent, json: bool) -> String {
    if json {
        return serde_json::to_string(event).unwrap_or_default();
    }
    match event.percent {
        Some(percent) => format!(
            "{:<12} {:>14} bytes  {:>5.1}%",
            event.stage, event.bytes_transferred, percent
        ),
        None => format!("{:<12} {:>14} bytes", event.stage, event.bytes_transferred),
    }
}

pub fn success_message(outcome: &TransferOutcome) -> String {
    format!(
        "uploaded {} bytes to {}",
        outcome.bytes_uploaded, outcome.destination_key
    )
}

pub fn failure_message(err: &TransferError) -> String {
    format!("transfer failed during {}: {}", err.component(), err)
}

pub fn usage_table(bucket: &str, summary: &UsageSummary) -> String {
    format!(
        "Bucket:      {}\nObjects:     {}\nTotal Used:  {} bytes ({} MB / {} GB)",
        bucket,
        summary.object_count,
        summary.total_bytes,
        summary.total_mb_display(),
        summary.total_gb_display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use vidrelay_core::{Stage, Topology};

    #[test]
    fn render_progress_text() {
        let event = ProgressEvent {
            bytes_transferred: 2048,
            stage: Stage::Downloading,
            percent: Some(50.0),
        };
        let line = render_progress(&event, false);
        assert!(line.starts_with("downloading"));
        assert!(line.contains("2048 bytes"));
        assert!(line.ends_with("50.0%"));
    }

    #[test]
    fn render_progress_json() {
        let event = ProgressEvent {
            bytes_transferred: 7,
            stage: Stage::Uploading,
            percent: None,
        };
        assert_eq!(
            render_progress(&event, true),
            r#"{"bytes_transferred":7,"stage":"uploading"}"#
        );
    }

    #[test]
    fn terminal_messages() {
        let outcome = TransferOutcome {
            run_id: Uuid::nil(),
            destination_key: "videos/a.mp4".to_string(),
            bytes_uploaded: 1234,
            parts: 1,
            topology: Topology::StreamToStream,
            duration_ms: 10,
        };
        assert_eq!(success_message(&outcome), "uploaded 1234 bytes to videos/a.mp4");

        let err = TransferError::SinkRejected("AccessDenied".to_string());
        assert_eq!(
            failure_message(&err),
            "transfer failed during upload: Upload rejected: AccessDenied"
        );
    }

    #[test]
    fn usage_table_shows_all_units() {
        let mut summary = UsageSummary::default();
        summary.add_object(3 * 1024 * 1024);
        let table = usage_table("media", &summary);
        assert!(table.contains("3145728 bytes"));
        assert!(table.contains("3.00 MB"));
        assert!(table.contains("0.00 GB"));
    }
}
