//! Check-data extraction from program log output.
//!
//! A computation log is mostly noise; the lines that matter for regression
//! comparison carry a marker substring (`CHECKDATA` in production). The
//! extractor filters those lines out of a log and materializes them as a
//! `.check` file next to the log.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read log file '{path}': {source}")]
    ReadLog {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write check file '{path}': {source}")]
    WriteCheck {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Lines of `log_text` containing `marker`, in log order, with trailing
/// whitespace removed. Leading whitespace is preserved so the comparator
/// sees the field exactly as the program printed it.
pub fn extract_check_lines(log_text: &str, marker: &str) -> Vec<String> {
    log_text
        .lines()
        .filter(|line| line.contains(marker))
        .map(|line| line.trim_end().to_string())
        .collect()
}

/// Reads `log_file`, extracts marker lines, and writes them to
/// `check_file` (one per line, trailing newline). An empty extraction
/// still writes an empty file so a missing-output case is distinguishable
/// from a never-ran case.
pub fn write_check_file(
    log_file: &Path,
    check_file: &Path,
    marker: &str,
) -> Result<Vec<String>, ExtractError> {
    let log_text = fs::read_to_string(log_file).map_err(|source| ExtractError::ReadLog {
        path: log_file.to_path_buf(),
        source,
    })?;

    let lines = extract_check_lines(&log_text, marker);
    let mut body = lines.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }

    fs::write(check_file, body).map_err(|source| ExtractError::WriteCheck {
        path: check_file.to_path_buf(),
        source,
    })?;

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::{extract_check_lines, write_check_file};
    use std::fs;

    const LOG: &str = concat!(
        " Entering module scf\n",
        " CHECKDATA:HF:ENERGY    -76.02676213   \n",
        " iteration 12 converged\n",
        "   CHECKDATA:MP2:Ecorr -0.20481593\n",
        " End running module scf\n",
    );

    #[test]
    fn keeps_marker_lines_in_order_and_trims_trailing_whitespace() {
        let lines = extract_check_lines(LOG, "CHECKDATA");
        assert_eq!(
            lines,
            vec![
                " CHECKDATA:HF:ENERGY    -76.02676213".to_string(),
                "   CHECKDATA:MP2:Ecorr -0.20481593".to_string(),
            ]
        );
    }

    #[test]
    fn no_marker_lines_yields_empty_extraction() {
        assert!(extract_check_lines("all quiet\nnothing here\n", "CHECKDATA").is_empty());
    }

    #[test]
    fn writes_check_file_next_to_log() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = dir.path().join("test001.log");
        let check = dir.path().join("test001.check");
        fs::write(&log, LOG).expect("write log");

        let lines = write_check_file(&log, &check, "CHECKDATA").expect("extract");
        assert_eq!(lines.len(), 2);

        let written = fs::read_to_string(&check).expect("read check");
        assert_eq!(
            written,
            " CHECKDATA:HF:ENERGY    -76.02676213\n   CHECKDATA:MP2:Ecorr -0.20481593\n"
        );
    }

    #[test]
    fn empty_extraction_writes_empty_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = dir.path().join("quiet.log");
        let check = dir.path().join("quiet.check");
        fs::write(&log, "nothing to see\n").expect("write log");

        let lines = write_check_file(&log, &check, "CHECKDATA").expect("extract");
        assert!(lines.is_empty());
        assert_eq!(fs::read_to_string(&check).expect("read check"), "");
    }

    #[test]
    fn missing_log_is_a_read_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = write_check_file(
            &dir.path().join("absent.log"),
            &dir.path().join("absent.check"),
            "CHECKDATA",
        )
        .expect_err("missing log must fail");
        assert!(err.to_string().contains("absent.log"));
    }
}
