//! Pass egress - appends finished passes to a file
//!
//! Passes are written in JSONL format (one JSON object per line)
//! to the file specified in config.

use crate::domain::pass::PassRecord;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info};

/// Egress writer for pass records
pub struct Egress {
    file_path: String,
}

impl Egress {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "egress_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Write a pass record to the egress file
    /// Returns true if successful, false otherwise
    pub fn write_pass(&self, record: &PassRecord) -> bool {
        let json = record.to_json();

        match self.append_line(&json) {
            Ok(()) => {
                debug!(id = %record.id, outcome = %record.outcome.as_str(), "pass_egressed");
                true
            }
            Err(e) => {
                error!(id = %record.id, file = %self.file_path, error = %e, "pass_egress_failed");
                false
            }
        }
    }

    /// Append a line to the egress file
    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Measurement, NoiseRejected, SpeedBand};
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_egress_new() {
        let egress = Egress::new("test.jsonl");
        assert_eq!(egress.file_path, "test.jsonl");
    }

    #[test]
    fn test_write_passes_appends_lines() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("nested").join("passes.jsonl");
        let egress = Egress::new(file_path.to_str().unwrap());

        let measured =
            PassRecord::measured(&Measurement::new(Duration::from_millis(30), 0.40), SpeedBand::Normal);
        let noise = PassRecord::noise(
            &NoiseRejected { elapsed: Duration::from_millis(3), min_valid_dt: Duration::from_millis(30) },
            0.40,
        );

        assert!(egress.write_pass(&measured));
        assert!(egress.write_pass(&noise));

        let content = fs::read_to_string(&file_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(content.ends_with('\n'));

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["id"], measured.id);
        assert_eq!(first["band"], "normal");
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["outcome"], "noise_rejected");
    }

    #[test]
    fn test_write_pass_to_directory_fails() {
        let dir = tempdir().unwrap();
        let egress = Egress::new(dir.path().to_str().unwrap());
        let record =
            PassRecord::measured(&Measurement::new(Duration::from_millis(30), 0.40), SpeedBand::Normal);
        assert!(!egress.write_pass(&record));
    }
}
