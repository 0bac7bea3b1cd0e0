//! Optional `sysconst.toml` configuration.
//!
//! The file is found by walking up from the current directory. Relative
//! paths inside it are resolved against the directory that contains it.
//! Command-line flags take precedence over every value here.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Configuration file name.
pub const CONFIG_FILE: &str = "sysconst.toml";

/// On-disk layout of `sysconst.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct ConfigFile {
    sys_dir: Option<PathBuf>,
    jobs: Option<usize>,
    #[serde(default, rename = "target")]
    targets: Vec<TargetConfig>,
}

/// A `[[target]]` entry: overrides a built-in target or adds a new one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TargetConfig {
    pub os: String,
    pub arch: String,
    pub kernel_arch: Option<String>,
    pub cc: Option<String>,
    pub cflags: Option<Vec<String>>,
    pub include_dirs: Option<Vec<PathBuf>>,
    pub syscall_prefix: Option<String>,
}

/// Resolved configuration.
#[derive(Debug, Default)]
pub struct Config {
    /// The config file this was loaded from, if any.
    pub path: Option<PathBuf>,
    /// Root of the definition tree (`<sys-dir>/<os>/*.txt`).
    pub sys_dir: Option<PathBuf>,
    /// Worker count; 0 means one per available CPU.
    pub jobs: Option<usize>,
    pub targets: Vec<TargetConfig>,
}

impl Config {
    /// Load `sysconst.toml` from the current directory or an ancestor.
    ///
    /// Returns the default configuration when no file exists.
    pub fn discover() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        match find_config(&cwd) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load a specific config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let base = path.parent().unwrap_or(Path::new("."));
        let mut config = Self::parse(&content, base)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse config text, resolving relative paths against `base`.
    pub fn parse(content: &str, base: &Path) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)?;
        let targets = file
            .targets
            .into_iter()
            .map(|mut t| {
                if let Some(dirs) = &mut t.include_dirs {
                    for dir in dirs.iter_mut() {
                        *dir = base.join(&*dir);
                    }
                }
                t
            })
            .collect();
        Ok(Self {
            path: None,
            sys_dir: file.sys_dir.map(|d| base.join(d)),
            jobs: file.jobs,
            targets,
        })
    }
}

/// Walk up from `start` looking for [`CONFIG_FILE`].
fn find_config(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let config = Config::parse(
            r#"
sys-dir = "defs"
jobs = 3

[[target]]
os = "linux"
arch = "amd64"
cc = "clang"
cflags = ["-m64", "-O0"]
include-dirs = ["extra/include", "/abs/include"]

[[target]]
os = "linux"
arch = "loongarch64"
kernel-arch = "loongarch"
syscall-prefix = "__NR_"
"#,
            Path::new("/work"),
        )
        .unwrap();

        assert_eq!(config.sys_dir, Some(PathBuf::from("/work/defs")));
        assert_eq!(config.jobs, Some(3));
        assert_eq!(config.targets.len(), 2);
        assert_eq!(config.targets[0].cc.as_deref(), Some("clang"));
        assert_eq!(
            config.targets[0].include_dirs,
            Some(vec![PathBuf::from("/work/extra/include"), PathBuf::from("/abs/include")])
        );
        assert_eq!(config.targets[1].kernel_arch.as_deref(), Some("loongarch"));
        assert_eq!(config.targets[1].cflags, None);
    }

    #[test]
    fn empty_config_is_default() {
        let config = Config::parse("", Path::new("/work")).unwrap();
        assert!(config.sys_dir.is_none());
        assert!(config.jobs.is_none());
        assert!(config.targets.is_empty());
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(Config::parse("sysdir = \"x\"\n", Path::new("/")).is_err());
        assert!(Config::parse("[[target]]\nos = \"linux\"\narch = \"a\"\nflags = []\n", Path::new("/")).is_err());
    }

    #[test]
    fn config_found_in_ancestor() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.path().join(CONFIG_FILE), "jobs = 2\n").unwrap();

        let found = find_config(&nested).unwrap();
        assert_eq!(found, root.path().join(CONFIG_FILE));

        let config = Config::load(&found).unwrap();
        assert_eq!(config.jobs, Some(2));
        assert_eq!(config.path.as_deref(), Some(found.as_path()));
    }
}
