//! AST types for definition files.
//!
//! The AST only keeps what constant extraction needs: headers, defines,
//! file metadata, and the shape of types so that value positions can be
//! told apart from type names.

use crate::lexer::Span;

/// A parsed definition file.
#[derive(Debug, Default)]
pub struct DescFile {
    pub items: Vec<Item>,
}

/// A top-level item.
#[derive(Debug)]
pub enum Item {
    /// `include <header.h>`
    Include(String),
    /// `incdir <dir>`
    Incdir(String),
    /// `define NAME expr`
    Define { name: String, value: String, span: Span },
    /// `meta noextract` / `meta arches["a", "b"]`
    Meta(Meta),
    /// `resource NAME[base]: V, V`
    Resource { name: String, base: TypeExpr, values: Vec<Value> },
    /// `NAME = V, V`
    Flags { name: String, values: Vec<Value> },
    /// `name$variant(arg type, ...) ret`
    Call(Call),
    /// `NAME { ... }` or `NAME [ ... ]`
    Struct(StructDef),
}

/// A `meta` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Meta {
    /// Exclude the file from constant extraction.
    NoExtract,
    /// Restrict the file to the listed architectures.
    Arches(Vec<String>),
}

/// A flag or special value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(u64),
    Ident(String),
    Str(String),
}

/// A syscall declaration.
#[derive(Debug)]
pub struct Call {
    /// Full name including any `$variant` suffix.
    pub name: String,
    pub args: Vec<Field>,
    pub ret: Option<TypeExpr>,
}

impl Call {
    /// The name without its `$variant` suffix.
    pub fn call_name(&self) -> &str {
        self.name.split('$').next().unwrap_or(&self.name)
    }
}

/// A struct (`{}`) or union (`[]`) definition.
#[derive(Debug)]
pub struct StructDef {
    pub name: String,
    pub is_union: bool,
    pub fields: Vec<Field>,
    pub attrs: Vec<TypeExpr>,
}

/// A named, typed argument or field.
#[derive(Debug)]
pub struct Field {
    pub name: String,
    pub ty: TypeExpr,
}

/// A type reference: `name` or `name[args]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeExpr {
    pub name: String,
    pub args: Vec<TypeArg>,
}

/// A type argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeArg {
    /// A nested type, or a bare identifier whose role depends on position.
    Type(TypeExpr),
    Int(u64),
    Str(String),
    /// `A:B`
    Range(Box<TypeArg>, Box<TypeArg>),
}

impl TypeArg {
    /// A bare identifier (a type without arguments), if this is one.
    pub fn as_ident(&self) -> Option<&str> {
        match self {
            TypeArg::Type(t) if t.args.is_empty() => Some(&t.name),
            _ => None,
        }
    }
}
