//! Collecting job results into constant tables.
//!
//! Results are drained in a fixed order, architectures as requested and
//! files sorted by name, so the tables do not depend on which worker
//! finished first.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sysconst_table::ConstTable;

use crate::consistency::Availability;
use crate::job::{ArchHandle, FileOutcome};
use crate::source::table_path;
use crate::verbose::{dprintln, vprintln};

/// Everything drained from the completion signals.
#[derive(Debug, Default)]
pub struct Collected {
    /// Tables keyed by definition file name.
    pub tables: BTreeMap<String, ConstTable>,
    pub availability: Availability,
    /// Some architecture or file job failed.
    pub failed: bool,
}

/// Wait for every job in `handles` and aggregate the results.
///
/// Build directories are released as soon as their architecture is drained.
pub fn drain(handles: Vec<ArchHandle>) -> Collected {
    let mut collected = Collected::default();

    for handle in handles {
        let ArchHandle { spec, done, files, build_dir } = handle;
        dprintln!("generating {}/{}...", spec.os(), spec.arch());

        match done.wait().map_err(anyhow::Error::from).and_then(|r| r) {
            Err(e) => {
                collected.failed = true;
                println!("{e:#}");
            }
            Ok(()) => {
                for file in files {
                    let outcome = file.done.wait().map_err(anyhow::Error::from).and_then(|r| r);
                    if let Err(e) = collected.merge(spec.arch(), &file.name, outcome) {
                        collected.failed = true;
                        println!("{}: {e:#}", file.name);
                    }
                }
            }
        }

        if let Some(dir) = build_dir {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                println!("warning: failed to remove {}: {e}", path.display());
            }
        }
    }

    collected
}

impl Collected {
    fn merge(&mut self, arch: &str, file: &str, outcome: Result<FileOutcome>) -> Result<()> {
        // A failed file leaves any previous table untouched.
        let outcome = outcome?;
        let table = self.tables.entry(file.to_string()).or_default();
        if let FileOutcome::Resolved(consts) = outcome {
            table.add_arch(arch, &consts.consts, &consts.undeclared)?;
            self.availability.record(file, &consts);
        }
        Ok(())
    }
}

/// What [`persist`] did (or, in check mode, would do).
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PersistSummary {
    pub written: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
}

impl PersistSummary {
    /// Tables whose on-disk state differs from the fresh result.
    pub fn stale(&self) -> impl Iterator<Item = &PathBuf> {
        self.written.iter().chain(&self.removed)
    }
}

/// Write every table to `<os_dir>/<file>.const`.
///
/// Empty tables remove a previously written file. Tables whose content is
/// already on disk are left alone. With `check`, the filesystem is not
/// touched.
pub fn persist(tables: &BTreeMap<String, ConstTable>, os_dir: &Path, check: bool) -> Result<PersistSummary> {
    let mut summary = PersistSummary::default();

    for (file, table) in tables {
        let path = table_path(os_dir, file);
        let data = table.serialize();

        if data.is_empty() {
            if path.exists() {
                if !check {
                    std::fs::remove_file(&path)
                        .with_context(|| format!("failed to remove {}", path.display()))?;
                }
                vprintln!("  removed {}", path.display());
                summary.removed.push(path);
            }
            continue;
        }

        let existing = std::fs::read(&path).ok();
        if existing.as_deref() == Some(data.as_bytes()) {
            vprintln!("  unchanged {}", path.display());
            summary.unchanged.push(path);
            continue;
        }
        if !check {
            std::fs::write(&path, &data)
                .with_context(|| format!("failed to write output file {}", path.display()))?;
        }
        vprintln!("  wrote {}", path.display());
        summary.written.push(path);
    }

    Ok(summary)
}

/// Final outcome of a run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Verdict {
    /// Lines to print after the tables are persisted.
    pub report: Vec<String>,
    pub failed: bool,
}

/// Decide the outcome of a run from the drained results.
///
/// The availability check only runs when every registered architecture was
/// extracted and no job failed. `stale` lists out-of-date tables in check
/// mode.
pub fn verdict(collected: &Collected, explicit_arches: bool, stale: &[&PathBuf]) -> Verdict {
    let mut report = Vec::new();
    if !collected.failed && !explicit_arches {
        report.extend(collected.availability.unsupported_everywhere());
    }
    report.extend(stale.iter().map(|path| format!("{} is out of date", path.display())));
    Verdict {
        failed: collected.failed || !report.is_empty(),
        report,
    }
}
