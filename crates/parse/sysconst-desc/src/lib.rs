//! Interface definition files.
//!
//! Parses the `*.txt` definition files of one OS directory into an AST,
//! exposes per-file metadata (`meta noextract`, `meta arches[...]`), and
//! extracts the constant names each file references.
//!
//! # Usage
//!
//! ```ignore
//! let desc = sysconst_desc::load_dir(Path::new("sys/linux"))?;
//! let files = desc.file_list();
//! let infos = sysconst_desc::extract_consts(&desc, "__NR_");
//! ```

pub mod ast;
pub mod consts;
pub mod error;
pub mod lexer;
pub mod parser;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

pub use consts::{ConstInfo, extract_consts};
pub use error::{DescError, ParseError};

use ast::{DescFile, Item, Meta};

/// File extension of definition files.
pub const DESC_EXT: &str = "txt";

/// All definition files of one OS directory, keyed by file name.
#[derive(Debug, Default)]
pub struct Description {
    pub files: BTreeMap<String, DescFile>,
}

/// Extraction-relevant metadata of one definition file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMeta {
    /// The file is never extracted.
    pub no_extract: bool,
    /// Architectures the file is restricted to (`None` = all).
    pub arches: Option<BTreeSet<String>>,
}

impl FileMeta {
    /// Returns `true` if the file should be extracted for `arch`.
    pub fn supports_arch(&self, arch: &str) -> bool {
        self.arches.as_ref().is_none_or(|a| a.contains(arch))
    }
}

impl Description {
    /// Metadata for every file.
    pub fn file_list(&self) -> BTreeMap<String, FileMeta> {
        self.files
            .iter()
            .map(|(name, file)| (name.clone(), file_meta(file)))
            .collect()
    }
}

fn file_meta(file: &DescFile) -> FileMeta {
    let mut meta = FileMeta::default();
    for item in &file.items {
        match item {
            Item::Meta(Meta::NoExtract) => meta.no_extract = true,
            Item::Meta(Meta::Arches(arches)) => {
                meta.arches
                    .get_or_insert_with(BTreeSet::new)
                    .extend(arches.iter().cloned());
            }
            _ => {}
        }
    }
    meta
}

/// Parse a single definition source.
pub fn parse_source(name: &str, source: &str) -> Result<DescFile, ParseError> {
    let tokens = lexer::tokenize(source, PathBuf::from(name))?;
    let file = parser::Parser::new(tokens).parse()?;
    check_defines(&file)?;
    Ok(file)
}

/// Reject a name defined twice in the same file.
fn check_defines(file: &DescFile) -> Result<(), ParseError> {
    let mut seen = BTreeSet::new();
    for item in &file.items {
        if let Item::Define { name, span, .. } = item {
            if !seen.insert(name.as_str()) {
                return Err(ParseError::new(span.clone(), format!("duplicate define '{name}'")));
            }
        }
    }
    Ok(())
}

/// Load and parse every `*.txt` file directly inside `dir`.
///
/// All files are parsed even if some fail, so that every syntax error is
/// reported at once.
pub fn load_dir(dir: &Path) -> Result<Description, DescError> {
    let mut desc = Description::default();
    let mut errors = Vec::new();

    for entry in walkdir::WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| DescError::Io {
            path: dir.to_path_buf(),
            source: e.into(),
        })?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != DESC_EXT) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let source = std::fs::read_to_string(path).map_err(|source| DescError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match parse_source(&name, &source) {
            Ok(file) => {
                desc.files.insert(name, file);
            }
            Err(e) => errors.push(e),
        }
    }

    if !errors.is_empty() {
        return Err(DescError::Parse(errors));
    }
    if desc.files.is_empty() {
        return Err(DescError::Empty(dir.to_path_buf()));
    }
    Ok(desc)
}
