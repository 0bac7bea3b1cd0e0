//! Command-line interface definitions for sysconst-extract.

use std::path::PathBuf;

use clap::Parser;

/// Extract OS constant values referenced by interface definition files.
#[derive(Parser, Debug)]
#[command(name = "sysconst-extract", version, about)]
pub struct Cli {
    /// Target OS.
    #[arg(long, default_value = std::env::consts::OS)]
    pub os: String,

    /// Comma-separated architectures to generate (all registered ones by default).
    #[arg(long, value_delimiter = ',')]
    pub arch: Vec<String>,

    /// Kernel source checkout.
    #[arg(long)]
    pub sourcedir: Option<PathBuf>,

    /// Comma-separated extra include directories.
    #[arg(long, value_delimiter = ',')]
    pub includedirs: Vec<PathBuf>,

    /// Pre-built kernel build directory.
    #[arg(long)]
    pub builddir: Option<PathBuf>,

    /// Regenerate architecture headers into fresh temporary build directories.
    #[arg(long, conflicts_with = "builddir")]
    pub build: bool,

    /// Root of the definition tree (`<sys-dir>/<os>/*.txt`).
    #[arg(long)]
    pub sys_dir: Option<PathBuf>,

    /// Maximum number of parallel workers (0 = one per CPU).
    #[arg(long, short = 'j')]
    pub jobs: Option<usize>,

    /// Suppress progress output; show only failures.
    #[arg(long, short = 'q', conflicts_with = "verbose")]
    pub quiet: bool,

    /// Show worker counts, probe command lines and timings.
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Fail if any table is out of date instead of writing it.
    #[arg(long)]
    pub check: bool,

    /// Only extract these definition files (e.g. `fs.txt`).
    pub files: Vec<String>,
}

impl Cli {
    /// Architectures named with `--arch`, first occurrence wins.
    ///
    /// Empty items are dropped, so `--arch=` means all architectures.
    pub fn arches(&self) -> Vec<String> {
        let mut arches: Vec<String> = Vec::new();
        for arch in &self.arch {
            if !arch.is_empty() && !arches.contains(arch) {
                arches.push(arch.clone());
            }
        }
        arches
    }
}
