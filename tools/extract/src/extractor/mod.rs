//! Per-OS extraction backends.

mod cc_cmd;
mod freebsd;
mod linux;
mod probe;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use sysconst_desc::ConstInfo;

use crate::job::ArchSpec;

/// Constants of one definition file on one architecture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConsts {
    pub consts: BTreeMap<String, u64>,
    /// Names the headers do not declare on this architecture.
    pub undeclared: BTreeSet<String>,
}

/// Resolves constant values for one OS.
///
/// `prepare` runs once on the main thread before any job. `prepare_arch`
/// and `process_file` run on worker threads, concurrently for different
/// architectures and files.
pub trait Extractor: Sync {
    fn prepare(&self, source_dir: &Path, build: bool, arches: &[Arc<ArchSpec>]) -> Result<()>;
    fn prepare_arch(&self, arch: &ArchSpec) -> Result<()>;
    fn process_file(&self, arch: &ArchSpec, info: &ConstInfo) -> Result<FileConsts>;
}

/// Backends by OS name.
pub struct Extractors {
    backends: BTreeMap<&'static str, Box<dyn Extractor>>,
}

impl Extractors {
    pub fn builtin() -> Self {
        let mut backends: BTreeMap<&'static str, Box<dyn Extractor>> = BTreeMap::new();
        backends.insert("linux", Box::new(linux::Linux));
        backends.insert("freebsd", Box::new(freebsd::FreeBsd));
        Self { backends }
    }

    pub fn get(&self, os: &str) -> Option<&dyn Extractor> {
        self.backends.get(os).map(Box::as_ref)
    }
}
