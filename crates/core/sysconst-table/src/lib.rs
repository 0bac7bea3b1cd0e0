//! Constant tables.
//!
//! A [`ConstTable`] aggregates, for one definition file, the values every
//! architecture resolved for the file's constants. It serializes to a small
//! line-oriented text format:
//!
//! ```text
//! # Code generated by sysconst-extract. DO NOT EDIT.
//! arches = amd64, arm64
//! O_RDONLY = 0
//! O_DIRECT = 16384, arm64:65536
//! MAP_32BIT = 64, arm64:???
//! ```
//!
//! Each line carries a default value (the most common one) followed by
//! per-architecture overrides; `???` marks a name the architecture could not
//! resolve. Names no architecture resolved are omitted, and a table with no
//! lines serializes to nothing at all.

mod error;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

pub use error::TableError;

/// First line of every serialized table.
pub const HEADER: &str = "# Code generated by sysconst-extract. DO NOT EDIT.";

/// Marker for a name an architecture could not resolve.
const UNDECLARED: &str = "???";

/// The value of one constant on one architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    /// Resolved to a value.
    Value(u64),
    /// Could not be resolved.
    Undeclared,
}

/// Constants of one definition file across architectures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstTable {
    /// Architectures that contributed at least one name.
    arches: BTreeSet<String>,
    /// Constant name → architecture → entry.
    consts: BTreeMap<String, BTreeMap<String, Entry>>,
}

impl ConstTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one architecture's results.
    ///
    /// An architecture with neither resolved nor undeclared names does not
    /// contribute and is not listed in the table.
    pub fn add_arch(
        &mut self,
        arch: &str,
        consts: &BTreeMap<String, u64>,
        undeclared: &BTreeSet<String>,
    ) -> Result<(), TableError> {
        if self.arches.contains(arch) {
            return Err(TableError::DuplicateArch(arch.to_string()));
        }
        if let Some(name) = undeclared.iter().find(|n| consts.contains_key(*n)) {
            return Err(TableError::Conflict { name: name.clone(), arch: arch.to_string() });
        }
        if consts.is_empty() && undeclared.is_empty() {
            return Ok(());
        }

        self.arches.insert(arch.to_string());
        for (name, &value) in consts {
            self.consts
                .entry(name.clone())
                .or_default()
                .insert(arch.to_string(), Entry::Value(value));
        }
        for name in undeclared {
            self.consts
                .entry(name.clone())
                .or_default()
                .insert(arch.to_string(), Entry::Undeclared);
        }
        Ok(())
    }

    /// Architectures that contributed to this table, sorted.
    pub fn arches(&self) -> impl Iterator<Item = &str> {
        self.arches.iter().map(String::as_str)
    }

    /// Entry for `name` on `arch`, if that architecture reported it.
    pub fn get(&self, name: &str, arch: &str) -> Option<Entry> {
        self.consts.get(name)?.get(arch).copied()
    }

    /// Names resolved on at least one architecture, sorted.
    pub fn resolved_names(&self) -> impl Iterator<Item = &str> {
        self.consts
            .iter()
            .filter(|(_, per_arch)| per_arch.values().any(|e| matches!(e, Entry::Value(_))))
            .map(|(name, _)| name.as_str())
    }

    /// Returns `true` if serialization would produce no output.
    pub fn is_empty(&self) -> bool {
        self.resolved_names().next().is_none()
    }

    /// Serialize the table. Returns an empty string for an empty table.
    pub fn serialize(&self) -> String {
        if self.is_empty() {
            return String::new();
        }

        let mut out = String::new();
        let arches: Vec<&str> = self.arches().collect();
        let _ = writeln!(out, "{HEADER}");
        let _ = writeln!(out, "arches = {}", arches.join(", "));

        for (name, per_arch) in &self.consts {
            let Some(default) = most_common_value(per_arch) else {
                continue;
            };
            let _ = write!(out, "{name} = {default}");
            for arch in &arches {
                match per_arch.get(*arch) {
                    Some(Entry::Value(v)) if *v == default => {}
                    Some(Entry::Value(v)) => {
                        let _ = write!(out, ", {arch}:{v}");
                    }
                    Some(Entry::Undeclared) | None => {
                        let _ = write!(out, ", {arch}:{UNDECLARED}");
                    }
                }
            }
            out.push('\n');
        }
        out
    }

    /// Parse a serialized table.
    ///
    /// Every name is materialized for every listed architecture: explicit
    /// overrides win, the default fills the rest.
    pub fn parse(text: &str) -> Result<Self, TableError> {
        let mut table = Self::new();
        let mut arches: Option<Vec<String>> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let syntax = |message: String| TableError::Syntax { line: line_no, message };
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, rest) = line
                .split_once('=')
                .ok_or_else(|| syntax(format!("expected 'NAME = VALUE', got '{line}'")))?;
            let (key, rest) = (key.trim(), rest.trim());

            if key == "arches" {
                if arches.is_some() {
                    return Err(syntax("duplicate arches line".into()));
                }
                let list: Vec<String> = rest
                    .split(',')
                    .map(|a| a.trim().to_string())
                    .filter(|a| !a.is_empty())
                    .collect();
                table.arches.extend(list.iter().cloned());
                arches = Some(list);
                continue;
            }

            let arch_list = arches
                .as_ref()
                .ok_or_else(|| syntax("constant before arches line".into()))?;
            if table.consts.contains_key(key) {
                return Err(syntax(format!("duplicate constant {key}")));
            }

            let mut parts = rest.split(',').map(str::trim);
            let default = parse_entry(parts.next().unwrap_or_default()).map_err(&syntax)?;
            let mut per_arch = BTreeMap::new();
            for part in parts {
                let (arch, value) = part
                    .split_once(':')
                    .ok_or_else(|| syntax(format!("expected 'arch:value', got '{part}'")))?;
                let arch = arch.trim();
                if !arch_list.iter().any(|a| a == arch) {
                    return Err(syntax(format!("unknown architecture {arch}")));
                }
                per_arch.insert(arch.to_string(), parse_entry(value.trim()).map_err(&syntax)?);
            }
            for arch in arch_list {
                per_arch.entry(arch.clone()).or_insert(default);
            }
            table.consts.insert(key.to_string(), per_arch);
        }

        Ok(table)
    }
}

/// The most frequent resolved value; ties go to the smallest value.
fn most_common_value(per_arch: &BTreeMap<String, Entry>) -> Option<u64> {
    let mut counts: BTreeMap<u64, usize> = BTreeMap::new();
    for entry in per_arch.values() {
        if let Entry::Value(v) = entry {
            *counts.entry(*v).or_default() += 1;
        }
    }
    let max = *counts.values().max()?;
    counts.into_iter().find(|&(_, n)| n == max).map(|(v, _)| v)
}

fn parse_entry(text: &str) -> Result<Entry, String> {
    if text == UNDECLARED {
        return Ok(Entry::Undeclared);
    }
    let value = match text.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse::<u64>(),
    };
    value
        .map(Entry::Value)
        .map_err(|_| format!("invalid value '{text}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consts(pairs: &[(&str, u64)]) -> BTreeMap<String, u64> {
        pairs.iter().map(|(n, v)| (n.to_string(), *v)).collect()
    }

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn uniform_and_divergent_values() {
        let mut table = ConstTable::new();
        table.add_arch("amd64", &consts(&[("X", 1), ("Y", 2)]), &names(&[])).unwrap();
        table.add_arch("arm64", &consts(&[("X", 1)]), &names(&["Y"])).unwrap();

        assert_eq!(
            table.serialize(),
            format!("{HEADER}\narches = amd64, arm64\nX = 1\nY = 2, arm64:???\n")
        );
        assert_eq!(table.get("Y", "arm64"), Some(Entry::Undeclared));
        assert_eq!(table.get("Y", "amd64"), Some(Entry::Value(2)));
    }

    #[test]
    fn default_is_most_common_then_smallest() {
        let mut table = ConstTable::new();
        table.add_arch("386", &consts(&[("A", 7), ("B", 9)]), &names(&[])).unwrap();
        table.add_arch("amd64", &consts(&[("A", 8), ("B", 3)]), &names(&[])).unwrap();
        table.add_arch("arm", &consts(&[("A", 8)]), &names(&[])).unwrap();

        let text = table.serialize();
        assert!(text.contains("\nA = 8, 386:7\n"), "{text}");
        assert!(text.contains("\nB = 3, 386:9, arm:???\n"), "{text}");
    }

    #[test]
    fn undeclared_everywhere_serializes_empty() {
        let mut table = ConstTable::new();
        table.add_arch("amd64", &consts(&[]), &names(&["Z"])).unwrap();
        table.add_arch("arm64", &consts(&[]), &names(&["Z"])).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.serialize(), "");
    }

    #[test]
    fn arch_without_results_does_not_contribute() {
        let mut table = ConstTable::new();
        table.add_arch("amd64", &consts(&[("X", 1)]), &names(&[])).unwrap();
        table.add_arch("arm64", &consts(&[]), &names(&[])).unwrap();
        assert_eq!(table.arches().collect::<Vec<_>>(), vec!["amd64"]);
    }

    #[test]
    fn add_arch_rejects_bad_input() {
        let mut table = ConstTable::new();
        table.add_arch("amd64", &consts(&[("X", 1)]), &names(&[])).unwrap();
        assert_eq!(
            table.add_arch("amd64", &consts(&[("X", 1)]), &names(&[])),
            Err(TableError::DuplicateArch("amd64".into()))
        );
        assert_eq!(
            table.add_arch("arm64", &consts(&[("X", 1)]), &names(&["X"])),
            Err(TableError::Conflict { name: "X".into(), arch: "arm64".into() })
        );
    }

    #[test]
    fn parse_reads_back_serialized_output() {
        let mut table = ConstTable::new();
        table.add_arch("386", &consts(&[("A", 7), ("B", u64::MAX)]), &names(&["C"])).unwrap();
        table.add_arch("amd64", &consts(&[("A", 8), ("B", u64::MAX), ("C", 3)]), &names(&[])).unwrap();

        let text = table.serialize();
        let parsed = ConstTable::parse(&text).unwrap();
        assert_eq!(parsed, table);
        assert_eq!(parsed.serialize(), text);
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(
            ConstTable::parse("X = 1\n"),
            Err(TableError::Syntax { line: 1, .. })
        ));
        assert!(matches!(
            ConstTable::parse("arches = amd64\nX = 1, arm64:2\n"),
            Err(TableError::Syntax { line: 2, .. })
        ));
        assert!(matches!(
            ConstTable::parse("arches = amd64\nX = one\n"),
            Err(TableError::Syntax { line: 2, .. })
        ));
        assert_eq!(ConstTable::parse("").unwrap(), ConstTable::new());
    }
}
