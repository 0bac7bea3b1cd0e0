//! C probe programs.
//!
//! A probe is a small C program that includes a definition file's headers,
//! applies its local `define`s, and prints the value of every requested
//! constant. Names the compiler reports as undeclared are dropped and the
//! probe is rebuilt until it compiles.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::process::Command;
use std::sync::OnceLock;

use anyhow::{Context, Result, bail};
use regex::Regex;
use sysconst_desc::ConstInfo;

use super::FileConsts;
use super::cc_cmd::CcCommandBuilder;
use crate::verbose::vprintln;

/// Build and run a probe for `info`.
///
/// `configure` adds the target-specific compiler flags; the source and
/// output paths are appended afterwards.
pub fn extract(
    cc: &str,
    info: &ConstInfo,
    configure: impl Fn(&mut CcCommandBuilder),
) -> Result<FileConsts> {
    let dir = tempfile::Builder::new()
        .prefix("sysconst-probe")
        .tempdir()
        .context("failed to create probe directory")?;
    let src = dir.path().join("probe.c");
    let bin = dir.path().join("probe");

    let mut names: Vec<&str> = info.consts.iter().map(String::as_str).collect();
    let mut undeclared = BTreeSet::new();

    loop {
        if names.is_empty() {
            return Ok(FileConsts { consts: BTreeMap::new(), undeclared });
        }

        std::fs::write(&src, render(info, &names))
            .with_context(|| format!("failed to write {}", src.display()))?;
        let mut cmd = CcCommandBuilder::new(cc);
        configure(&mut cmd);
        cmd.output(&bin).source(&src);
        vprintln!("  {}", cmd.describe());

        let output = cmd.run()?;
        if output.status.success() {
            break;
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let missing = attribute_undeclared(&undeclared_identifiers(&stderr), &names, &info.defines);
        if missing.is_empty() {
            bail!("failed to compile probe:\n{}\n{stderr}", cmd.describe());
        }
        names.retain(|n| !missing.contains(*n));
        undeclared.extend(missing);
    }

    let output = Command::new(&bin)
        .output()
        .with_context(|| format!("failed to run {}", bin.display()))?;
    if !output.status.success() {
        bail!(
            "probe exited with {}:\n{}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        );
    }
    let values = parse_values(&String::from_utf8_lossy(&output.stdout), names.len())?;

    Ok(FileConsts {
        consts: names.into_iter().map(str::to_string).zip(values).collect(),
        undeclared,
    })
}

/// Probe source evaluating `names` in order.
fn render(info: &ConstInfo, names: &[&str]) -> String {
    let mut src = String::new();
    for header in &info.includes {
        let _ = writeln!(src, "#include <{header}>");
    }
    for (name, value) in &info.defines {
        let _ = writeln!(src, "#ifndef {name}\n#define {name} {value}\n#endif");
    }
    src.push_str("\nint printf(const char *format, ...);\n\n");
    src.push_str("static unsigned long long vals[] = {\n");
    for name in names {
        let _ = writeln!(src, "\t(unsigned long long)({name}),");
    }
    src.push_str(
        "};\n\n\
         int main(void)\n\
         {\n\
         \tunsigned i;\n\
         \tfor (i = 0; i < sizeof(vals) / sizeof(vals[0]); i++)\n\
         \t\tprintf(\"%s%llu\", i ? \" \" : \"\", vals[i]);\n\
         \tprintf(\"\\n\");\n\
         \treturn 0;\n\
         }\n",
    );
    src
}

fn undeclared_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // gcc: 'X' undeclared; clang: use of undeclared identifier 'X'
        Regex::new(r"(?:undeclared identifier ['‘]([A-Za-z_]\w*)['’])|(?:['‘]([A-Za-z_]\w*)['’] undeclared)")
            .expect("undeclared regex must compile")
    })
}

fn ident_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z_]\w*").expect("identifier regex must compile"))
}

/// Identifiers the compiler reported as undeclared.
fn undeclared_identifiers(stderr: &str) -> BTreeSet<String> {
    undeclared_re()
        .captures_iter(stderr)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Map undeclared identifiers back to requested names.
///
/// An identifier that is not itself requested may appear in the body of a
/// local define, in which case that define is the undeclared name.
fn attribute_undeclared(
    identifiers: &BTreeSet<String>,
    names: &[&str],
    defines: &BTreeMap<String, String>,
) -> BTreeSet<String> {
    let mut missing = BTreeSet::new();
    for ident in identifiers {
        if names.contains(&ident.as_str()) {
            missing.insert(ident.clone());
            continue;
        }
        for (name, value) in defines {
            if names.contains(&name.as_str())
                && ident_re().find_iter(value).any(|m| m.as_str() == ident)
            {
                missing.insert(name.clone());
            }
        }
    }
    missing
}

fn parse_values(stdout: &str, expected: usize) -> Result<Vec<u64>> {
    let values = stdout
        .split_whitespace()
        .map(|v| v.parse::<u64>().with_context(|| format!("bad probe output value '{v}'")))
        .collect::<Result<Vec<_>>>()?;
    if values.len() != expected {
        bail!("probe printed {} values, expected {expected}", values.len());
    }
    Ok(values)
}
