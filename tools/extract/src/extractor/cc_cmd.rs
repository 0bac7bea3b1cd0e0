//! Typed builder for C compiler invocations.
//!
//! Wraps `std::process::Command` with methods for the handful of flags the
//! probes need. Diagnostics are forced into the C locale so that they can be
//! scraped reliably.

use std::path::Path;
use std::process::{Command, Output};

use anyhow::{Context, Result};

/// A typed builder for constructing compiler invocations.
pub struct CcCommandBuilder {
    cmd: Command,
    binary: String,
}

impl CcCommandBuilder {
    /// Create a new builder using the given compiler binary (e.g. `cc`, `clang`).
    pub fn new(binary: &str) -> Self {
        let mut cmd = Command::new(binary);
        cmd.env("LC_ALL", "C").arg("-fmessage-length=0");
        Self {
            cmd,
            binary: binary.to_string(),
        }
    }

    /// Add a header search path (`-I <dir>`).
    pub fn include_dir(&mut self, dir: &Path) -> &mut Self {
        self.cmd.arg("-I").arg(dir);
        self
    }

    /// Add several header search paths, in order.
    pub fn include_dirs<'a>(&mut self, dirs: impl IntoIterator<Item = &'a Path>) -> &mut Self {
        for dir in dirs {
            self.include_dir(dir);
        }
        self
    }

    /// Include a header before the source (`-include <file>`).
    pub fn force_include(&mut self, file: &Path) -> &mut Self {
        self.cmd.arg("-include").arg(file);
        self
    }

    /// Define a preprocessor macro (`-D<name>` or `-D<name>=<value>`).
    pub fn define(&mut self, name: &str, value: Option<&str>) -> &mut Self {
        match value {
            Some(v) => self.cmd.arg(format!("-D{name}={v}")),
            None => self.cmd.arg(format!("-D{name}")),
        };
        self
    }

    /// Do not search the standard system directories (`-nostdinc`).
    pub fn nostdinc(&mut self) -> &mut Self {
        self.cmd.arg("-nostdinc");
        self
    }

    /// Add raw compiler flags.
    pub fn flags(&mut self, flags: &[String]) -> &mut Self {
        self.cmd.args(flags);
        self
    }

    /// Set the output file (`-o <file>`).
    pub fn output(&mut self, file: &Path) -> &mut Self {
        self.cmd.arg("-o").arg(file);
        self
    }

    /// Set the source file to compile.
    pub fn source(&mut self, file: &Path) -> &mut Self {
        self.cmd.arg(file);
        self
    }

    /// The command line, for diagnostics.
    pub fn describe(&self) -> String {
        let args: Vec<_> = self
            .cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        format!("{} {}", self.binary, args.join(" "))
    }

    /// Execute the command and return the output.
    pub fn run(&mut self) -> Result<Output> {
        self.cmd
            .output()
            .with_context(|| format!("failed to run {}", self.binary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_lists_arguments_in_order() {
        let mut cc = CcCommandBuilder::new("cc");
        cc.flags(&["-m64".to_string()])
            .include_dir(Path::new("/k/include"))
            .define("__KERNEL__", None)
            .define("KBUILD_MODNAME", Some("\"-\""))
            .output(Path::new("/tmp/probe"))
            .source(Path::new("/tmp/probe.c"));
        assert_eq!(
            cc.describe(),
            "cc -fmessage-length=0 -m64 -I /k/include -D__KERNEL__ -DKBUILD_MODNAME=\"-\" -o /tmp/probe /tmp/probe.c"
        );
    }

    #[test]
    fn missing_compiler_is_an_error() {
        let err = CcCommandBuilder::new("sysconst-no-such-cc").run().unwrap_err();
        assert!(err.to_string().contains("sysconst-no-such-cc"));
    }
}
