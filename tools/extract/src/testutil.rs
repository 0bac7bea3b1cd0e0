//! In-memory collaborators for pipeline tests.

use std::collections::{BTreeMap, BTreeSet};
use std::hash::{BuildHasher, RandomState};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, bail};
use sysconst_desc::{ConstInfo, FileMeta};

use crate::extractor::{Extractor, FileConsts};
use crate::job::{self, ArchHandle, ArchJob, ArchSpec};
use crate::source::DefinitionSource;
use crate::target::{TargetDescriptor, TargetRegistry};

/// A built-in target, or a synthetic one for made-up arch names.
pub fn target(os: &str, arch: &str) -> Arc<TargetDescriptor> {
    TargetRegistry::builtin().get(os, arch).unwrap_or_else(|| {
        Arc::new(TargetDescriptor {
            os: os.into(),
            arch: arch.into(),
            kernel_arch: arch.into(),
            cc: "cc".into(),
            cflags: Vec::new(),
            include_dirs: Vec::new(),
            syscall_prefix: "__NR_".into(),
        })
    })
}

fn spec(arch: &str, build_dir: PathBuf, build: bool) -> Arc<ArchSpec> {
    Arc::new(ArchSpec {
        target: target("test", arch),
        source_dir: PathBuf::from("/nonexistent/src"),
        include_dirs: Vec::new(),
        build_dir,
        build,
    })
}

fn names(files: &[&str]) -> Vec<String> {
    files.iter().map(|f| (*f).to_string()).collect()
}

/// Job pairs for `arches`, each covering `files`, with inputs under `sys/test`.
pub fn arch_jobs(arches: &[&str], files: &[&str]) -> (Vec<ArchJob>, Vec<ArchHandle>) {
    arches
        .iter()
        .map(|arch| {
            let spec = spec(arch, PathBuf::from("/nonexistent/src"), false);
            job::arch_job(spec, &names(files), Path::new("sys/test"), None)
        })
        .unzip()
}

/// Like [`arch_jobs`], in build mode: every arch owns a fresh temp dir.
pub fn arch_jobs_with_build_dirs(
    arches: &[&str],
    files: &[&str],
) -> (Vec<ArchJob>, Vec<ArchHandle>, Vec<PathBuf>) {
    let mut jobs = Vec::new();
    let mut handles = Vec::new();
    let mut dirs = Vec::new();
    for arch in arches {
        let dir = tempfile::Builder::new()
            .prefix("sysconst-kernel-build")
            .tempdir()
            .unwrap();
        dirs.push(dir.path().to_path_buf());
        let spec = spec(arch, dir.path().to_path_buf(), true);
        let (job, handle) = job::arch_job(spec, &names(files), Path::new("sys/test"), Some(dir));
        jobs.push(job);
        handles.push(handle);
    }
    (jobs, handles, dirs)
}

/// Definitions held in memory; every file is extractable on every arch.
pub struct MemorySource {
    infos: BTreeMap<String, ConstInfo>,
}

impl MemorySource {
    pub fn new(files: &[(&str, &[&str])]) -> Self {
        let infos = files
            .iter()
            .map(|(file, consts)| {
                let info = ConstInfo {
                    file: (*file).to_string(),
                    consts: consts.iter().map(|c| (*c).to_string()).collect(),
                    ..Default::default()
                };
                ((*file).to_string(), info)
            })
            .collect();
        Self { infos }
    }
}

impl DefinitionSource for MemorySource {
    fn file_list(&self, _os: &str) -> Result<BTreeMap<String, FileMeta>> {
        Ok(self.infos.keys().map(|f| (f.clone(), FileMeta::default())).collect())
    }

    fn const_infos(&self, _target: &TargetDescriptor) -> Result<BTreeMap<String, ConstInfo>> {
        Ok(self.infos.clone())
    }
}

/// Scripted backend: each arch resolves a fixed set of names.
///
/// A file referencing `PANIC` makes the backend panic.
#[derive(Default)]
pub struct Fake {
    values: BTreeMap<String, BTreeMap<String, u64>>,
    fail_arches: BTreeSet<String>,
    fail_files: BTreeSet<(String, String)>,
    jitter: bool,
    prepared: Mutex<BTreeSet<String>>,
    build_dirs: Mutex<BTreeSet<PathBuf>>,
    processed: AtomicUsize,
}

impl Fake {
    pub fn new(arches: &[(&str, &[(&str, u64)])]) -> Self {
        let values = arches
            .iter()
            .map(|(arch, consts)| {
                let consts = consts.iter().map(|(n, v)| ((*n).to_string(), *v)).collect();
                ((*arch).to_string(), consts)
            })
            .collect();
        Self { values, ..Default::default() }
    }

    /// Fail `prepare_arch` for `arch`.
    pub fn fail_arch(mut self, arch: &str) -> Self {
        self.fail_arches.insert(arch.to_string());
        self
    }

    /// Fail `process_file` for `file` on `arch`.
    pub fn fail_file(mut self, arch: &str, file: &str) -> Self {
        self.fail_files.insert((arch.to_string(), file.to_string()));
        self
    }

    /// Sleep a random few milliseconds in every call.
    pub fn jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    pub fn prepared(&self, arch: &str) -> bool {
        self.prepared.lock().unwrap().contains(arch)
    }

    pub fn build_dirs(&self) -> BTreeSet<PathBuf> {
        self.build_dirs.lock().unwrap().clone()
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    fn pause(&self, arch: &str, file: &str) {
        if self.jitter {
            let millis = RandomState::new().hash_one((arch, file)) % 5;
            std::thread::sleep(Duration::from_millis(millis));
        }
    }
}

impl Extractor for Fake {
    fn prepare(&self, _source_dir: &Path, _build: bool, _arches: &[Arc<ArchSpec>]) -> Result<()> {
        Ok(())
    }

    fn prepare_arch(&self, arch: &ArchSpec) -> Result<()> {
        self.pause(arch.arch(), "");
        self.prepared.lock().unwrap().insert(arch.arch().to_string());
        if arch.build {
            self.build_dirs.lock().unwrap().insert(arch.build_dir.clone());
        }
        if self.fail_arches.contains(arch.arch()) {
            bail!("{}: kernel headers unavailable", arch.arch());
        }
        Ok(())
    }

    fn process_file(&self, arch: &ArchSpec, info: &ConstInfo) -> Result<FileConsts> {
        self.pause(arch.arch(), &info.file);
        self.processed.fetch_add(1, Ordering::SeqCst);
        assert!(!info.consts.contains("PANIC"), "backend crashed on {}", info.file);
        if self.fail_files.contains(&(arch.arch().to_string(), info.file.clone())) {
            bail!("probe failed to compile");
        }
        let known = self.values.get(arch.arch()).cloned().unwrap_or_default();
        let (consts, undeclared): (Vec<&String>, Vec<&String>) =
            info.consts.iter().partition(|name| known.contains_key(*name));
        Ok(FileConsts {
            consts: consts.into_iter().map(|n| (n.clone(), known[n])).collect(),
            undeclared: undeclared.into_iter().cloned().collect(),
        })
    }
}
