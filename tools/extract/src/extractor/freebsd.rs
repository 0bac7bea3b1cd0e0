//! FreeBSD backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use sysconst_desc::ConstInfo;

use super::cc_cmd::CcCommandBuilder;
use super::{Extractor, FileConsts, probe};
use crate::job::ArchSpec;
use crate::verbose::Timer;

pub struct FreeBsd;

impl Extractor for FreeBsd {
    fn prepare(&self, source_dir: &Path, build: bool, arches: &[Arc<ArchSpec>]) -> Result<()> {
        if !source_dir.is_dir() {
            bail!("kernel source dir {} does not exist", source_dir.display());
        }
        // Without per-arch build dirs every arch would link into the same place.
        if !build && arches.len() > 1 {
            bail!("more than 1 arch is invalid without --build");
        }
        Ok(())
    }

    /// Kernel headers include `<machine/...>` and `<x86/...>`; expose the
    /// architecture's directories under those names in the build directory.
    fn prepare_arch(&self, arch: &ArchSpec) -> Result<()> {
        let sys = arch.source_dir.join("sys");
        let links = [
            ("machine", sys.join(&arch.target.kernel_arch).join("include")),
            ("x86", sys.join("x86/include")),
        ];
        std::fs::create_dir_all(&arch.build_dir)
            .with_context(|| format!("failed to create {}", arch.build_dir.display()))?;
        for (name, target) in links {
            let link = arch.build_dir.join(name);
            if link.symlink_metadata().is_ok() {
                std::fs::remove_file(&link)
                    .with_context(|| format!("failed to remove {}", link.display()))?;
            }
            symlink(&target, &link)?;
        }
        Ok(())
    }

    fn process_file(&self, arch: &ArchSpec, info: &ConstInfo) -> Result<FileConsts> {
        let _t = Timer::start(format!("{}/{} {}", arch.os(), arch.arch(), info.file));
        probe::extract(&arch.target.cc, info, |cmd| configure(cmd, arch, info))
    }
}

fn include_dirs(arch: &ArchSpec, info: &ConstInfo) -> Vec<PathBuf> {
    let src = &arch.source_dir;
    let mut dirs = vec![
        src.join("sys"),
        src.join("sys/sys"),
        src.join("sys").join(&arch.target.kernel_arch),
        arch.build_dir.clone(),
        src.join("include"),
    ];
    dirs.extend(info.incdirs.iter().map(|d| src.join(d)));
    dirs.extend(arch.target.include_dirs.iter().cloned());
    dirs.extend(arch.include_dirs.iter().cloned());
    dirs
}

fn configure(cmd: &mut CcCommandBuilder, arch: &ArchSpec, info: &ConstInfo) {
    cmd.flags(&arch.target.cflags)
        .nostdinc()
        .define("_KERNEL", None)
        .define("__BSD_VISIBLE", Some("1"));
    cmd.include_dirs(include_dirs(arch, info).iter().map(PathBuf::as_path));
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link)
        .with_context(|| format!("failed to link {} to {}", link.display(), target.display()))
}

#[cfg(not(unix))]
fn symlink(_target: &Path, link: &Path) -> Result<()> {
    bail!("cannot create {}: symlinks are unsupported on this host", link.display())
}
