use serde::{Deserialize, Serialize};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Total size of every object in a bucket. Recomputed on each request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub total_bytes: u64,
    pub object_count: u64,
}

impl UsageSummary {
    pub fn add_object(&mut self, size_bytes: u64) {
        self.total_bytes = self.total_bytes.saturating_add(size_bytes);
        self.object_count += 1;
    }

    pub fn total_mb(&self) -> f64 {
        self.total_bytes as f64 / BYTES_PER_MB
    }

    pub fn total_gb(&self) -> f64 {
        self.total_bytes as f64 / BYTES_PER_GB
    }

    /// Two-decimal MB string, as shown in reports
    pub fn total_mb_display(&self) -> String {
        format!("{:.2}", self.total_mb())
    }

    pub fn total_gb_display(&self) -> String {
        format!("{:.2}", self.total_gb())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_summary() {
        let summary = UsageSummary::default();
        assert_eq!(summary.total_bytes, 0);
        assert_eq!(summary.total_mb_display(), "0.00");
        assert_eq!(summary.total_gb_display(), "0.00");
    }

    #[test]
    fn test_derived_units() {
        let mut summary = UsageSummary::default();
        summary.add_object(1024 * 1024 * 1024);
        summary.add_object(512 * 1024 * 1024);

        assert_eq!(summary.object_count, 2);
        assert_eq!(summary.total_mb_display(), "1536.00");
        assert_eq!(summary.total_gb_display(), "1.50");
    }
}
