//! Constant-reference extraction.
//!
//! Walks a parsed description and collects, per file, the constant names the
//! file references for a given target, together with the headers, include
//! directories, and defines a probe needs to evaluate them.

use std::collections::{BTreeMap, BTreeSet};

use crate::ast::{DescFile, Item, TypeArg, TypeExpr, Value};
use crate::Description;

/// Everything needed to resolve the constants of one definition file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstInfo {
    /// Definition file name (e.g. `fs.txt`).
    pub file: String,
    /// Referenced constant names.
    pub consts: BTreeSet<String>,
    /// Headers to include, in declaration order.
    pub includes: Vec<String>,
    /// Include directories relative to the kernel source tree.
    pub incdirs: Vec<String>,
    /// Local `#define`s (name to C expression).
    pub defines: BTreeMap<String, String>,
}

/// Integer types whose arguments are values (`int32[0:MAX]`).
const INT_TYPES: &[&str] = &[
    "int8", "int16", "int32", "int64", "intptr", "int16be", "int32be", "int64be",
];

/// Extract constant references from every file of `desc`.
///
/// `syscall_prefix` is prepended to call names to form the syscall-number
/// constant (`__NR_` on Linux, `SYS_` on the BSDs).
pub fn extract_consts(desc: &Description, syscall_prefix: &str) -> BTreeMap<String, ConstInfo> {
    desc.files
        .iter()
        .map(|(name, file)| (name.clone(), extract_file(name, file, syscall_prefix)))
        .collect()
}

fn extract_file(name: &str, file: &DescFile, syscall_prefix: &str) -> ConstInfo {
    let mut info = ConstInfo { file: name.to_string(), ..Default::default() };

    for item in &file.items {
        match item {
            Item::Include(header) => info.includes.push(header.clone()),
            Item::Incdir(dir) => info.incdirs.push(dir.clone()),
            Item::Define { name, value, .. } => {
                info.defines.insert(name.clone(), value.clone());
                info.consts.insert(name.clone());
            }
            Item::Meta(_) => {}
            Item::Resource { base, values, .. } => {
                collect_type(base, &mut info.consts);
                collect_values(values, &mut info.consts);
            }
            Item::Flags { values, .. } => collect_values(values, &mut info.consts),
            Item::Call(call) => {
                info.consts.insert(format!("{syscall_prefix}{}", call.call_name()));
                for arg in &call.args {
                    collect_type(&arg.ty, &mut info.consts);
                }
                if let Some(ret) = &call.ret {
                    collect_type(ret, &mut info.consts);
                }
            }
            Item::Struct(def) => {
                for field in &def.fields {
                    collect_type(&field.ty, &mut info.consts);
                }
            }
        }
    }

    info
}

fn collect_values(values: &[Value], out: &mut BTreeSet<String>) {
    for value in values {
        if let Value::Ident(name) = value {
            out.insert(name.clone());
        }
    }
}

/// Collect constants used in value positions of `ty`, recursing into nested types.
fn collect_type(ty: &TypeExpr, out: &mut BTreeSet<String>) {
    let name = ty.name.as_str();
    for (i, arg) in ty.args.iter().enumerate() {
        let value_position = match name {
            "const" => i == 0,
            "array" => i == 1,
            _ => INT_TYPES.contains(&name),
        };
        if value_position {
            collect_value_arg(arg, out);
        } else if let TypeArg::Type(nested) = arg {
            collect_type(nested, out);
        }
    }
}

fn collect_value_arg(arg: &TypeArg, out: &mut BTreeSet<String>) {
    match arg {
        TypeArg::Range(lo, hi) => {
            collect_value_arg(lo, out);
            collect_value_arg(hi, out);
        }
        other => {
            if let Some(ident) = other.as_ident() {
                out.insert(ident.to_string());
            }
        }
    }
}
