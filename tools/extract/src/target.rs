//! Target registry.
//!
//! A target is one (OS, architecture) pair together with what is needed to
//! probe its kernel headers. The registry starts from a built-in table and
//! is then adjusted by `[[target]]` entries from `sysconst.toml`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};

use crate::config::TargetConfig;

/// One (OS, architecture) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    pub os: String,
    pub arch: String,
    /// Architecture directory name inside the kernel tree (`arch/<dir>`).
    pub kernel_arch: String,
    /// C compiler used for probes.
    pub cc: String,
    pub cflags: Vec<String>,
    /// Extra header search paths for every probe of this target.
    pub include_dirs: Vec<PathBuf>,
    /// Prefix of syscall-number constants (`__NR_`, `SYS_`).
    pub syscall_prefix: String,
}

/// `(os, arch, kernel_arch, cflags, syscall_prefix)`
type Builtin = (&'static str, &'static str, &'static str, &'static [&'static str], &'static str);

const BUILTIN: &[Builtin] = &[
    ("linux", "386", "x86", &["-m32"], "__NR_"),
    ("linux", "amd64", "x86", &["-m64"], "__NR_"),
    ("linux", "arm", "arm", &["-D__LINUX_ARM_ARCH__=6"], "__NR_"),
    ("linux", "arm64", "arm64", &[], "__NR_"),
    ("linux", "mips64le", "mips", &["-D_MIPS_SZLONG=64"], "__NR_"),
    ("linux", "ppc64le", "powerpc", &["-D__powerpc64__"], "__NR_"),
    ("linux", "riscv64", "riscv", &[], "__NR_"),
    ("linux", "s390x", "s390", &[], "__NR_"),
    ("freebsd", "386", "i386", &["-m32"], "SYS_"),
    ("freebsd", "amd64", "amd64", &["-m64"], "SYS_"),
];

/// All known targets, keyed by `(os, arch)`.
#[derive(Debug, Default)]
pub struct TargetRegistry {
    targets: BTreeMap<(String, String), Arc<TargetDescriptor>>,
}

impl TargetRegistry {
    /// Registry holding the built-in targets.
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        for &(os, arch, kernel_arch, cflags, prefix) in BUILTIN {
            registry.insert(TargetDescriptor {
                os: os.into(),
                arch: arch.into(),
                kernel_arch: kernel_arch.into(),
                cc: "cc".into(),
                cflags: cflags.iter().map(|f| (*f).to_string()).collect(),
                include_dirs: Vec::new(),
                syscall_prefix: prefix.into(),
            });
        }
        registry
    }

    fn insert(&mut self, target: TargetDescriptor) {
        self.targets
            .insert((target.os.clone(), target.arch.clone()), Arc::new(target));
    }

    /// Apply `[[target]]` overrides in order.
    ///
    /// An entry for a known target replaces only the fields it sets. An entry
    /// for a new target defaults `kernel-arch` to the arch name, `cc` to `cc`,
    /// and `syscall-prefix` to that of another target of the same OS.
    pub fn apply(&mut self, overrides: &[TargetConfig]) -> Result<()> {
        for entry in overrides {
            let mut target = match self.get(&entry.os, &entry.arch) {
                Some(existing) => (*existing).clone(),
                None => {
                    let prefix = match &entry.syscall_prefix {
                        Some(p) => p.clone(),
                        None => match self.os_targets(&entry.os).next() {
                            Some(sibling) => sibling.syscall_prefix.clone(),
                            None => bail!(
                                "target {}/{}: syscall-prefix is required for a new OS",
                                entry.os,
                                entry.arch
                            ),
                        },
                    };
                    TargetDescriptor {
                        os: entry.os.clone(),
                        arch: entry.arch.clone(),
                        kernel_arch: entry.arch.clone(),
                        cc: "cc".into(),
                        cflags: Vec::new(),
                        include_dirs: Vec::new(),
                        syscall_prefix: prefix,
                    }
                }
            };
            if let Some(v) = &entry.kernel_arch {
                target.kernel_arch.clone_from(v);
            }
            if let Some(v) = &entry.cc {
                target.cc.clone_from(v);
            }
            if let Some(v) = &entry.cflags {
                target.cflags.clone_from(v);
            }
            if let Some(v) = &entry.include_dirs {
                target.include_dirs.clone_from(v);
            }
            if let Some(v) = &entry.syscall_prefix {
                target.syscall_prefix.clone_from(v);
            }
            self.insert(target);
        }
        Ok(())
    }

    /// Look up one target.
    pub fn get(&self, os: &str, arch: &str) -> Option<Arc<TargetDescriptor>> {
        self.targets
            .get(&(os.to_string(), arch.to_string()))
            .cloned()
    }

    fn os_targets<'a>(&'a self, os: &'a str) -> impl Iterator<Item = &'a Arc<TargetDescriptor>> {
        self.targets
            .iter()
            .filter(move |((target_os, _), _)| target_os == os)
            .map(|(_, t)| t)
    }

    /// Architectures registered for `os`, sorted.
    pub fn arches(&self, os: &str) -> Vec<String> {
        self.os_targets(os).map(|t| t.arch.clone()).collect()
    }
}
