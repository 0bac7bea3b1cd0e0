//! Linux backend.
//!
//! Probes compile against a kernel checkout, optionally after regenerating
//! the architecture headers with an out-of-tree `make defconfig archprepare`.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use sysconst_desc::ConstInfo;

use super::cc_cmd::CcCommandBuilder;
use super::{Extractor, FileConsts, probe};
use crate::job::ArchSpec;
use crate::verbose::{Timer, dprintln, vprintln};

/// Headers some architectures lack; empty stubs are provided for them.
const STUB_HEADERS: &[&str] = &["asm/a.out.h", "asm/prctl.h", "asm/mce.h"];

/// Subdirectory of the build directory holding the stubs.
const STUB_DIR: &str = "sysconst";

pub struct Linux;

impl Extractor for Linux {
    fn prepare(&self, source_dir: &Path, build: bool, arches: &[Arc<ArchSpec>]) -> Result<()> {
        if !source_dir.is_dir() {
            bail!("kernel source dir {} does not exist", source_dir.display());
        }
        if !build {
            if arches.len() > 1 {
                bail!("more than 1 arch is invalid without --build");
            }
            return Ok(());
        }

        // An in-tree configuration breaks out-of-tree builds.
        let mut cleaned = Vec::new();
        for arch in arches {
            let karch = arch.target.kernel_arch.as_str();
            if cleaned.contains(&karch) || !has_in_tree_build(source_dir, karch) {
                continue;
            }
            dprintln!("make mrproper ARCH={karch}");
            run_make(source_dir, &[&format!("ARCH={karch}"), "mrproper"])?;
            cleaned.push(karch);
        }
        Ok(())
    }

    fn prepare_arch(&self, arch: &ArchSpec) -> Result<()> {
        let karch = &arch.target.kernel_arch;
        let uapi = arch.source_dir.join("arch").join(karch).join("include/uapi");
        let stubs = arch.build_dir.join(STUB_DIR);
        for header in STUB_HEADERS {
            if uapi.join(header).exists() {
                continue;
            }
            let stub = stubs.join(header);
            if let Some(parent) = stub.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            std::fs::write(&stub, "")
                .with_context(|| format!("failed to write {}", stub.display()))?;
        }

        if !arch.build {
            return Ok(());
        }
        let _t = Timer::start(format!("{}/{} header generation", arch.os(), arch.arch()));
        let arch_arg = format!("ARCH={karch}");
        let out_arg = format!("O={}", arch.build_dir.display());
        for target in ["defconfig", "archprepare"] {
            vprintln!("  make {arch_arg} {out_arg} {target}");
            run_make(&arch.source_dir, &[&arch_arg, &out_arg, target])?;
        }
        Ok(())
    }

    fn process_file(&self, arch: &ArchSpec, info: &ConstInfo) -> Result<FileConsts> {
        let _t = Timer::start(format!("{}/{} {}", arch.os(), arch.arch(), info.file));
        probe::extract(&arch.target.cc, info, |cmd| configure(cmd, arch, info))
    }
}

/// Header search order for one probe.
fn include_dirs(arch: &ArchSpec, info: &ConstInfo) -> Vec<PathBuf> {
    let src = &arch.source_dir;
    let build = &arch.build_dir;
    let src_arch = src.join("arch").join(&arch.target.kernel_arch);
    let build_arch = build.join("arch").join(&arch.target.kernel_arch);

    let mut dirs = vec![
        build_arch.join("include"),
        build_arch.join("include/generated/uapi"),
        build_arch.join("include/generated"),
        src_arch.join("include"),
        src_arch.join("include/uapi"),
        build.join("include/generated/uapi"),
        src.join("include"),
        src.join("include/uapi"),
        src.to_path_buf(),
        build.join(STUB_DIR),
    ];
    dirs.extend(info.incdirs.iter().map(|d| src.join(d)));
    dirs.extend(arch.target.include_dirs.iter().cloned());
    dirs.extend(arch.include_dirs.iter().cloned());
    dirs
}

fn configure(cmd: &mut CcCommandBuilder, arch: &ArchSpec, info: &ConstInfo) {
    cmd.flags(&arch.target.cflags)
        .define("__KERNEL__", None)
        .define("KBUILD_MODNAME", Some("\"-\""));
    cmd.include_dirs(include_dirs(arch, info).iter().map(PathBuf::as_path));
    let kconfig = arch.source_dir.join("include/linux/kconfig.h");
    if kconfig.exists() {
        cmd.force_include(&kconfig);
    }
}

/// Leftovers of an in-tree build.
fn has_in_tree_build(source_dir: &Path, karch: &str) -> bool {
    [
        PathBuf::from(".config"),
        PathBuf::from("init/main.o"),
        PathBuf::from("include/config"),
        PathBuf::from("include/generated/compile.h"),
        Path::new("arch").join(karch).join("include/generated"),
    ]
    .iter()
    .any(|p| source_dir.join(p).exists())
}

fn run_make(dir: &Path, args: &[&str]) -> Result<()> {
    let jobs = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
    let output = Command::new("make")
        .args(args)
        .arg(format!("-j{jobs}"))
        .current_dir(dir)
        .output()
        .context("failed to run make")?;
    if !output.status.success() {
        bail!(
            "make {} failed ({}):\n{}{}",
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    fn spec(source: &Path, build: bool) -> ArchSpec {
        ArchSpec {
            target: testutil::target("linux", "amd64"),
            source_dir: source.to_path_buf(),
            include_dirs: vec![PathBuf::from("/extra")],
            build_dir: source.to_path_buf(),
            build,
        }
    }

    #[test]
    fn stubs_only_missing_headers() {
        let src = tempfile::tempdir().unwrap();
        let uapi = src.path().join("arch/x86/include/uapi/asm");
        std::fs::create_dir_all(&uapi).unwrap();
        std::fs::write(uapi.join("prctl.h"), "#define ARCH_SET_GS 0x1001\n").unwrap();

        Linux.prepare_arch(&spec(src.path(), false)).unwrap();

        let stubs = src.path().join(STUB_DIR).join("asm");
        assert!(stubs.join("a.out.h").is_file());
        assert!(stubs.join("mce.h").is_file());
        assert!(!stubs.join("prctl.h").exists());
    }

    #[test]
    fn multiple_arches_need_build_mode() {
        let src = tempfile::tempdir().unwrap();
        let arches = vec![Arc::new(spec(src.path(), false)), Arc::new(spec(src.path(), false))];
        let err = Linux.prepare(src.path(), false, &arches).unwrap_err();
        assert!(err.to_string().contains("more than 1 arch"));
        Linux.prepare(src.path(), false, &arches[..1]).unwrap();
    }

    #[test]
    fn missing_source_dir() {
        let src = tempfile::tempdir().unwrap();
        let gone = src.path().join("linux");
        assert!(Linux.prepare(&gone, false, &[]).is_err());
    }

    #[test]
    fn include_order() {
        let arch = spec(Path::new("/k"), false);
        let info = ConstInfo { incdirs: vec!["drivers/net".into()], ..Default::default() };
        let dirs = include_dirs(&arch, &info);
        assert_eq!(dirs[0], PathBuf::from("/k/arch/x86/include"));
        assert!(dirs.contains(&PathBuf::from("/k/sysconst")));
        assert_eq!(dirs[dirs.len() - 2], PathBuf::from("/k/drivers/net"));
        assert_eq!(dirs.last(), Some(&PathBuf::from("/extra")));
    }

    #[test]
    fn clean_tree_detection() {
        let src = tempfile::tempdir().unwrap();
        assert!(!has_in_tree_build(src.path(), "x86"));
        std::fs::write(src.path().join(".config"), "").unwrap();
        assert!(has_in_tree_build(src.path(), "x86"));
    }
}
