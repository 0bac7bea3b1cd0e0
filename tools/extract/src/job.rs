//! Extraction jobs.
//!
//! Every requested architecture becomes an [`ArchJob`] plus the
//! [`ArchHandle`] the collector keeps, and every (architecture, file) pair a
//! [`FileJob`] plus [`FileHandle`]. File jobs are owned by their
//! architecture job, so they cannot be scheduled before that job has run and
//! attached the constant-reference info they need.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use sysconst_desc::{ConstInfo, FileMeta};
use tempfile::TempDir;

use crate::extractor::FileConsts;
use crate::signal::{self, Observe, Publish};
use crate::target::TargetDescriptor;

/// Immutable per-architecture parameters, shared by the architecture job,
/// its file jobs, and every backend call.
#[derive(Debug)]
pub struct ArchSpec {
    pub target: Arc<TargetDescriptor>,
    /// Kernel source checkout.
    pub source_dir: PathBuf,
    /// Extra include directories from `--includedirs`.
    pub include_dirs: Vec<PathBuf>,
    /// Kernel build directory (a fresh temp dir in build mode).
    pub build_dir: PathBuf,
    /// Regenerate architecture headers before probing.
    pub build: bool,
}

impl ArchSpec {
    pub fn os(&self) -> &str {
        &self.target.os
    }

    pub fn arch(&self) -> &str {
        &self.target.arch
    }
}

/// What a file job produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Resolved(FileConsts),
    /// The file references no constants; the backend was not called.
    Skipped,
}

/// Worker side of an architecture job.
#[derive(Debug)]
pub struct ArchJob {
    pub spec: Arc<ArchSpec>,
    pub files: Vec<FileJob>,
    pub done: Publish<Result<()>>,
}

/// Collector side of an architecture job.
#[derive(Debug)]
pub struct ArchHandle {
    pub spec: Arc<ArchSpec>,
    pub done: Observe<Result<()>>,
    pub files: Vec<FileHandle>,
    /// Build directory created for this architecture in build mode.
    pub build_dir: Option<TempDir>,
}

/// Worker side of a file job.
#[derive(Debug)]
pub struct FileJob {
    pub spec: Arc<ArchSpec>,
    /// Definition file name (`fs.txt`).
    pub name: String,
    /// Path of the definition file, for diagnostics.
    pub input: PathBuf,
    /// Attached by the architecture job before it is enqueued.
    pub info: Option<ConstInfo>,
    pub done: Publish<Result<FileOutcome>>,
}

/// Collector side of a file job.
#[derive(Debug)]
pub struct FileHandle {
    pub name: String,
    pub done: Observe<Result<FileOutcome>>,
}

/// Create the job pair for one architecture.
///
/// `files` must be sorted and free of duplicates; `input_dir` is the
/// directory the definition files live in.
pub fn arch_job(
    spec: Arc<ArchSpec>,
    files: &[String],
    input_dir: &Path,
    build_dir: Option<TempDir>,
) -> (ArchJob, ArchHandle) {
    let (file_jobs, file_handles): (Vec<FileJob>, Vec<FileHandle>) = files
        .iter()
        .map(|name| {
            let (publish, observe) = signal::oneshot();
            let job = FileJob {
                spec: Arc::clone(&spec),
                name: name.clone(),
                input: input_dir.join(name),
                info: None,
                done: publish,
            };
            (job, FileHandle { name: name.clone(), done: observe })
        })
        .unzip();

    let (publish, observe) = signal::oneshot();
    let job = ArchJob {
        spec: Arc::clone(&spec),
        files: file_jobs,
        done: publish,
    };
    let handle = ArchHandle {
        spec,
        done: observe,
        files: file_handles,
        build_dir,
    };
    (job, handle)
}

/// Definition files to extract for `arch`.
///
/// Explicitly requested files are taken as given. Otherwise every file not
/// marked `noextract` and not restricted to other architectures.
pub fn select_files(all: &BTreeMap<String, FileMeta>, requested: &[String], arch: &str) -> Vec<String> {
    let selected: BTreeSet<&String> = if requested.is_empty() {
        all.iter()
            .filter(|(_, meta)| !meta.no_extract && meta.supports_arch(arch))
            .map(|(name, _)| name)
            .collect()
    } else {
        requested.iter().collect()
    };
    selected.into_iter().cloned().collect()
}
