//! Access to definition files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sysconst_desc::{ConstInfo, FileMeta};

use crate::target::TargetDescriptor;

/// Where the pipeline gets definition metadata and constant references from.
pub trait DefinitionSource: Sync {
    /// Every definition file of `os` with its metadata.
    fn file_list(&self, os: &str) -> Result<BTreeMap<String, FileMeta>>;

    /// Constant references of every definition file, for one target.
    fn const_infos(&self, target: &TargetDescriptor) -> Result<BTreeMap<String, ConstInfo>>;
}

/// Definitions stored as `<root>/<os>/*.txt`.
pub struct SysDir {
    root: PathBuf,
}

impl SysDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the definitions (and tables) of `os`.
    pub fn os_dir(&self, os: &str) -> PathBuf {
        self.root.join(os)
    }

    fn load(&self, os: &str) -> Result<sysconst_desc::Description> {
        let dir = self.os_dir(os);
        sysconst_desc::load_dir(&dir)
            .with_context(|| format!("failed to load definitions from {}", dir.display()))
    }
}

impl DefinitionSource for SysDir {
    fn file_list(&self, os: &str) -> Result<BTreeMap<String, FileMeta>> {
        Ok(self.load(os)?.file_list())
    }

    fn const_infos(&self, target: &TargetDescriptor) -> Result<BTreeMap<String, ConstInfo>> {
        let desc = self.load(&target.os)?;
        Ok(sysconst_desc::extract_consts(&desc, &target.syscall_prefix))
    }
}

/// Output path of the constant table for definition file `file`.
pub fn table_path(os_dir: &Path, file: &str) -> PathBuf {
    os_dir.join(format!("{file}.const"))
}
