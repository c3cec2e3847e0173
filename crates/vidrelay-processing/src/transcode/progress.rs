use std::collections::VecDeque;

/// Diagnostic lines kept for failure reports
const TAIL_LINES: usize = 20;

/// One completed `-progress` block.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Output bytes written so far
    pub total_size: u64,
    pub percent: Option<f64>,
    /// `progress=end` was seen
    pub finished: bool,
}

/// Parses the transcoder's stderr.
///
/// Stderr interleaves ordinary log lines with `key=value` progress blocks,
/// each terminated by a `progress=continue|end` line. Log lines are kept in a
/// short ring buffer so a failure can report what the transcoder said last.
#[derive(Debug, Default)]
pub struct ProgressParser {
    duration_us: Option<u64>,
    total_size: u64,
    out_time_us: Option<u64>,
    tail: VecDeque<String>,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one stderr line; returns an update when a progress block ends.
    pub fn feed_line(&mut self, line: &str) -> Option<ProgressUpdate> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if let Some((key, value)) = split_progress_pair(line) {
            match key {
                "total_size" => {
                    if let Ok(size) = value.parse() {
                        self.total_size = size;
                    }
                }
                // out_time_ms is microseconds too, despite the name
                "out_time_us" | "out_time_ms" => {
                    if let Ok(us) = value.parse::<i64>() {
                        self.out_time_us = Some(us.max(0) as u64);
                    }
                }
                "progress" => {
                    return Some(ProgressUpdate {
                        total_size: self.total_size,
                        percent: self.percent(value == "end"),
                        finished: value == "end",
                    });
                }
                _ => {}
            }
            return None;
        }

        if self.duration_us.is_none() {
            if let Some(duration) = parse_duration_header(line) {
                self.duration_us = Some(duration);
            }
        }

        if self.tail.len() == TAIL_LINES {
            self.tail.pop_front();
        }
        self.tail.push_back(line.to_string());
        None
    }

    fn percent(&self, finished: bool) -> Option<f64> {
        if finished {
            return Some(100.0);
        }
        let duration = self.duration_us.filter(|d| *d > 0)?;
        let elapsed = self.out_time_us?;
        Some((elapsed as f64 / duration as f64 * 100.0).min(100.0))
    }

    pub fn duration_us(&self) -> Option<u64> {
        self.duration_us
    }

    /// Last diagnostic lines, oldest first
    pub fn tail(&self) -> String {
        self.tail.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

fn split_progress_pair(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    let is_key = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if is_key && !value.contains(' ') {
        Some((key, value))
    } else {
        None
    }
}

/// `Duration: 01:02:03.45, start: ...` → microseconds. `N/A` gives `None`.
fn parse_duration_header(line: &str) -> Option<u64> {
    let rest = line.strip_prefix("Duration:")?.trim_start();
    let stamp = rest.split(',').next()?.trim();
    let mut fields = stamp.split(':');
    let hours: u64 = fields.next()?.parse().ok()?;
    let minutes: u64 = fields.next()?.parse().ok()?;
    let seconds: f64 = fields.next()?.parse().ok()?;
    if fields.next().is_some() || !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    let whole = (hours * 3600 + minutes * 60) as f64 + seconds;
    Some((whole * 1_000_000.0).round() as u64)
}
