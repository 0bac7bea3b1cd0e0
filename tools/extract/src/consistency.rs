//! Cross-architecture availability check.
//!
//! A name no architecture could resolve is almost always a typo in a
//! definition file. The check is only meaningful when every architecture
//! ran, so callers skip it for explicit `--arch` runs and failed runs.

use std::collections::{BTreeMap, BTreeSet};

use crate::extractor::FileConsts;

/// Names seen resolved or undeclared across all drained files.
#[derive(Debug, Default)]
pub struct Availability {
    supported: BTreeSet<String>,
    /// Undeclared name and the first file it was seen in.
    unsupported: BTreeMap<String, String>,
}

impl Availability {
    /// Record one file's result for one architecture.
    pub fn record(&mut self, file: &str, consts: &FileConsts) {
        self.supported.extend(consts.consts.keys().cloned());
        for name in &consts.undeclared {
            self.unsupported
                .entry(name.clone())
                .or_insert_with(|| file.to_string());
        }
    }

    /// One line per name that is undeclared everywhere, sorted by name.
    pub fn unsupported_everywhere(&self) -> Vec<String> {
        self.unsupported
            .iter()
            .filter(|(name, _)| !self.supported.contains(*name))
            .map(|(name, file)| format!("{file}: {name} is unsupported on all arches (typo?)"))
            .collect()
    }
}
