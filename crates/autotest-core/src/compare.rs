//! Line-by-line check-data comparison with per-field tolerances.
//!
//! Two check files match when they have the same number of lines and every
//! line pair matches: exactly for plain text, within its field tolerance
//! for numeric fields. Whitespace runs are collapsed before comparison so
//! Fortran-style column shifts do not register as regressions. All
//! mismatches are collected; comparison never stops at the first.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::domain::{ComparisonDetails, ComparisonResult};
use crate::tolerance::{ToleranceRule, ToleranceTable};

const FAILURE_HEADER: &str = "CHECKDATA comparison failed:";

#[derive(Debug, Clone, Default)]
pub struct Comparator {
    table: ToleranceTable,
}

impl Comparator {
    pub fn new(table: ToleranceTable) -> Self {
        Self { table }
    }

    /// Compares a generated check file against its reference. A missing or
    /// unreadable file on either side is a comparison failure, not a
    /// harness error: the case produced no verifiable result.
    pub fn compare_check_files(&self, generated: &Path, reference: &Path) -> ComparisonResult {
        let generated_text = match fs::read_to_string(generated) {
            Ok(text) => text,
            Err(err) => {
                return ComparisonResult::fail(
                    format!(
                        "{FAILURE_HEADER}\ncannot read generated check file '{}': {err}",
                        generated.display()
                    ),
                    ComparisonDetails::default(),
                );
            }
        };
        let reference_text = match fs::read_to_string(reference) {
            Ok(text) => text,
            Err(err) => {
                return ComparisonResult::fail(
                    format!(
                        "{FAILURE_HEADER}\ncannot read reference check file '{}': {err}",
                        reference.display()
                    ),
                    ComparisonDetails::default(),
                );
            }
        };

        self.compare_text(&generated_text, &reference_text)
    }

    pub fn compare_text(&self, generated: &str, reference: &str) -> ComparisonResult {
        let generated_lines: Vec<&str> = generated.lines().collect();
        let reference_lines: Vec<&str> = reference.lines().collect();

        let details = ComparisonDetails {
            mismatch_count: 0,
            generated_lines: generated_lines.len(),
            reference_lines: reference_lines.len(),
        };

        if generated_lines.len() != reference_lines.len() {
            let diff = render_unified_diff(
                &reference_lines,
                &generated_lines,
                "reference",
                "generated",
            );
            return ComparisonResult::fail(
                format!(
                    "{FAILURE_HEADER}\nLine count differs between generated ({}) and reference ({})\n{diff}",
                    generated_lines.len(),
                    reference_lines.len()
                ),
                ComparisonDetails {
                    mismatch_count: generated_lines.len().abs_diff(reference_lines.len()),
                    ..details
                },
            );
        }

        let mut mismatches = Vec::new();
        for (index, (gen_raw, ref_raw)) in
            generated_lines.iter().zip(reference_lines.iter()).enumerate()
        {
            let line_no = index + 1;
            let gen_norm = normalize_whitespace(gen_raw);
            let ref_norm = normalize_whitespace(ref_raw);

            if gen_norm.is_empty() && ref_norm.is_empty() {
                continue;
            }
            if ToleranceTable::is_exempt(&gen_norm, &ref_norm) {
                debug!(line = line_no, "skipping exempt check line");
                continue;
            }

            if let Some(mismatch) = self.compare_line(line_no, &gen_norm, &ref_norm) {
                mismatches.push(mismatch);
            }
        }

        if mismatches.is_empty() {
            return ComparisonResult::pass(details);
        }

        let details = ComparisonDetails {
            mismatch_count: mismatches.len(),
            ..details
        };
        let mut report = String::from(FAILURE_HEADER);
        for mismatch in &mismatches {
            report.push('\n');
            report.push_str(mismatch);
        }
        ComparisonResult::fail(report, details)
    }

    /// `None` when the pair matches, otherwise a human-readable mismatch.
    fn compare_line(&self, line_no: usize, generated: &str, reference: &str) -> Option<String> {
        if let Some((prefix, rule)) = self.table.rule_for_pair(generated, reference) {
            match (last_float(generated), last_float(reference)) {
                (Some(gen_value), Some(ref_value)) => {
                    return numeric_mismatch(line_no, prefix, rule, gen_value, ref_value);
                }
                // A tolerance prefix without a parseable number falls back
                // to exact text comparison.
                _ => {}
            }
        }

        if generated == reference {
            None
        } else {
            Some(format!(
                "Line {line_no}: text mismatch\n  generated: {generated}\n  reference: {reference}"
            ))
        }
    }
}

fn numeric_mismatch(
    line_no: usize,
    prefix: &str,
    rule: ToleranceRule,
    gen_value: f64,
    ref_value: f64,
) -> Option<String> {
    let delta = (gen_value - ref_value).abs();
    let (error, tolerance, kind) = match rule {
        ToleranceRule::Absolute(tol) => (delta, tol, "absolute"),
        ToleranceRule::Relative(tol) => {
            // A zero reference admits only a zero generated value.
            let relative = if ref_value == 0.0 {
                if delta == 0.0 { 0.0 } else { f64::INFINITY }
            } else {
                delta / ref_value.abs()
            };
            (relative, tol, "relative")
        }
    };

    if error <= tolerance {
        None
    } else {
        Some(format!(
            "Line {line_no}: {prefix} {kind} error {error:.6e} exceeds tolerance {tolerance:.6e}\n  generated: {gen_value}\n  reference: {ref_value}"
        ))
    }
}

/// Collapses interior whitespace runs to single spaces and trims the ends.
pub fn normalize_whitespace(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Last whitespace-separated token that parses as a float. Check lines put
/// the value at the end; label tokens that happen to look numeric earlier
/// in the line are ignored.
pub fn last_float(line: &str) -> Option<f64> {
    line.split_whitespace()
        .rev()
        .find_map(|token| token.parse::<f64>().ok())
}

/// Minimal unified-style diff: common leading and trailing lines are
/// dropped and the differing middle is shown with `-` (from side) and `+`
/// (to side) prefixes.
pub fn render_unified_diff(
    from: &[&str],
    to: &[&str],
    from_label: &str,
    to_label: &str,
) -> String {
    let common_prefix = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let common_suffix = from[common_prefix..]
        .iter()
        .rev()
        .zip(to[common_prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = format!("--- {from_label}\n+++ {to_label}\n");
    for line in &from[common_prefix..from.len() - common_suffix] {
        out.push('-');
        out.push_str(line);
        out.push('\n');
    }
    for line in &to[common_prefix..to.len() - common_suffix] {
        out.push('+');
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Exact text comparison of two files with no normalization and no
/// tolerances; used for auxiliary outputs that must be reproduced
/// verbatim. Only outer whitespace of the whole file is ignored.
pub fn compare_text_files(file_a: &Path, file_b: &Path) -> ComparisonResult {
    let text_a = match fs::read_to_string(file_a) {
        Ok(text) => text,
        Err(err) => {
            return ComparisonResult::fail(
                format!("cannot read file '{}': {err}", file_a.display()),
                ComparisonDetails::default(),
            );
        }
    };
    let text_b = match fs::read_to_string(file_b) {
        Ok(text) => text,
        Err(err) => {
            return ComparisonResult::fail(
                format!("cannot read file '{}': {err}", file_b.display()),
                ComparisonDetails::default(),
            );
        }
    };

    let lines_a: Vec<&str> = text_a.trim().lines().collect();
    let lines_b: Vec<&str> = text_b.trim().lines().collect();
    let details = ComparisonDetails {
        mismatch_count: 0,
        generated_lines: lines_a.len(),
        reference_lines: lines_b.len(),
    };

    if lines_a == lines_b {
        return ComparisonResult::pass(details);
    }

    let diff = render_unified_diff(
        &lines_a,
        &lines_b,
        &file_a.display().to_string(),
        &file_b.display().to_string(),
    );
    ComparisonResult::fail(
        diff,
        ComparisonDetails {
            mismatch_count: 1,
            ..details
        },
    )
}
