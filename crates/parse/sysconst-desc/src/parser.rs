//! Recursive descent parser for definition files.
//!
//! Produces a [`DescFile`] from a token stream. One item per line, except
//! struct and union bodies which take one field per line.

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{Token, TokenKind};

type Result<T> = std::result::Result<T, ParseError>;

/// Parser state: a cursor over the token stream.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    /// Create a new parser from a token stream.
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Parse the entire token stream into a [`DescFile`].
    pub fn parse(&mut self) -> Result<DescFile> {
        self.skip_newlines();
        let mut items = Vec::new();
        while !self.at_eof() {
            items.push(self.parse_item()?);
            self.skip_newlines();
        }
        Ok(DescFile { items })
    }

    fn parse_item(&mut self) -> Result<Item> {
        match self.peek_kind() {
            TokenKind::Include => {
                self.advance();
                let path = self.expect_angle()?;
                self.expect_newline()?;
                Ok(Item::Include(path))
            }
            TokenKind::Incdir => {
                self.advance();
                let path = self.expect_angle()?;
                self.expect_newline()?;
                Ok(Item::Incdir(path))
            }
            TokenKind::Define => {
                let span = self.peek().span.clone();
                self.advance();
                let name = self.expect_ident()?;
                let value = self.expect_raw()?;
                self.expect_newline()?;
                Ok(Item::Define { name, value, span })
            }
            TokenKind::Meta => self.parse_meta(),
            TokenKind::Resource => self.parse_resource(),
            TokenKind::Ident(name) => {
                self.advance();
                match self.peek_kind() {
                    TokenKind::LParen => self.parse_call(name),
                    TokenKind::Equals => self.parse_flags(name),
                    TokenKind::LBrace => self.parse_struct(name, false),
                    TokenKind::LBracket => self.parse_struct(name, true),
                    _ => Err(self.error(format!(
                        "expected '(', '=', '{{' or '[' after '{name}'"
                    ))),
                }
            }
            _ => Err(self.unexpected("declaration")),
        }
    }

    /// `meta noextract` or `meta arches["a", "b"]`.
    fn parse_meta(&mut self) -> Result<Item> {
        self.expect(TokenKind::Meta)?;
        let name = self.expect_ident()?;
        let meta = match name.as_str() {
            "noextract" => Meta::NoExtract,
            "arches" => {
                self.expect(TokenKind::LBracket)?;
                let mut arches = Vec::new();
                loop {
                    if self.peek_kind() == TokenKind::RBracket {
                        self.advance();
                        break;
                    }
                    arches.push(self.expect_string()?);
                    if self.peek_kind() == TokenKind::Comma {
                        self.advance();
                    }
                }
                Meta::Arches(arches)
            }
            _ => return Err(self.error(format!("unknown meta '{name}'"))),
        };
        self.expect_newline()?;
        Ok(Item::Meta(meta))
    }

    /// `resource NAME[base]` with optional `: V, V` special values.
    fn parse_resource(&mut self) -> Result<Item> {
        self.expect(TokenKind::Resource)?;
        let name = self.expect_ident()?;
        self.expect(TokenKind::LBracket)?;
        let base = self.parse_type()?;
        self.expect(TokenKind::RBracket)?;
        let values = if self.peek_kind() == TokenKind::Colon {
            self.advance();
            self.parse_value_list()?
        } else {
            Vec::new()
        };
        self.expect_newline()?;
        Ok(Item::Resource { name, base, values })
    }

    fn parse_flags(&mut self, name: String) -> Result<Item> {
        self.expect(TokenKind::Equals)?;
        let values = self.parse_value_list()?;
        self.expect_newline()?;
        Ok(Item::Flags { name, values })
    }

    fn parse_call(&mut self, name: String) -> Result<Item> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        while self.peek_kind() != TokenKind::RParen {
            args.push(self.parse_field()?);
            if self.peek_kind() == TokenKind::Comma {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        let ret = match self.peek_kind() {
            TokenKind::Ident(_) => Some(self.parse_type()?),
            _ => None,
        };
        self.expect_newline()?;
        Ok(Item::Call(Call { name, args, ret }))
    }

    /// Struct (`{` ... `}`) or union (`[` ... `]`) body with optional `[attrs]`.
    fn parse_struct(&mut self, name: String, is_union: bool) -> Result<Item> {
        let close = if is_union { TokenKind::RBracket } else { TokenKind::RBrace };
        self.advance();
        self.expect_newline()?;

        let mut fields = Vec::new();
        loop {
            self.skip_newlines();
            if self.at_eof() {
                return Err(self.error(format!("unterminated definition of '{name}'")));
            }
            if self.peek_kind() == close {
                self.advance();
                break;
            }
            fields.push(self.parse_field()?);
            self.expect_newline()?;
        }

        let mut attrs = Vec::new();
        if self.peek_kind() == TokenKind::LBracket {
            self.advance();
            while self.peek_kind() != TokenKind::RBracket {
                attrs.push(self.parse_type()?);
                if self.peek_kind() == TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
            self.expect(TokenKind::RBracket)?;
        }
        self.expect_newline()?;

        Ok(Item::Struct(StructDef { name, is_union, fields, attrs }))
    }

    fn parse_field(&mut self) -> Result<Field> {
        let name = self.expect_ident()?;
        let ty = self.parse_type()?;
        Ok(Field { name, ty })
    }

    /// `name` or `name[arg, ...]`.
    fn parse_type(&mut self) -> Result<TypeExpr> {
        let name = self.expect_ident()?;
        let mut args = Vec::new();
        if self.peek_kind() == TokenKind::LBracket {
            self.advance();
            while self.peek_kind() != TokenKind::RBracket {
                args.push(self.parse_type_arg()?);
                if self.peek_kind() == TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
            self.expect(TokenKind::RBracket)?;
        }
        Ok(TypeExpr { name, args })
    }

    fn parse_type_arg(&mut self) -> Result<TypeArg> {
        let first = match self.peek_kind() {
            TokenKind::Integer(v) => {
                self.advance();
                TypeArg::Int(v)
            }
            TokenKind::String(s) => {
                self.advance();
                return Ok(TypeArg::Str(s));
            }
            TokenKind::Ident(_) => TypeArg::Type(self.parse_type()?),
            _ => return Err(self.unexpected("type argument")),
        };
        if self.peek_kind() != TokenKind::Colon {
            return Ok(first);
        }
        self.advance();
        let second = match self.peek_kind() {
            TokenKind::Integer(v) => {
                self.advance();
                TypeArg::Int(v)
            }
            TokenKind::Ident(_) => TypeArg::Type(self.parse_type()?),
            _ => return Err(self.unexpected("range end")),
        };
        Ok(TypeArg::Range(Box::new(first), Box::new(second)))
    }

    fn parse_value_list(&mut self) -> Result<Vec<Value>> {
        let mut values = Vec::new();
        loop {
            let value = match self.peek_kind() {
                TokenKind::Integer(v) => Value::Int(v),
                TokenKind::Ident(s) => Value::Ident(s),
                TokenKind::String(s) => Value::Str(s),
                _ => return Err(self.unexpected("value")),
            };
            self.advance();
            values.push(value);
            if self.peek_kind() != TokenKind::Comma {
                break;
            }
            self.advance();
        }
        Ok(values)
    }

    // ---- Helpers ----

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind.clone()
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn at_eof(&self) -> bool {
        self.pos >= self.tokens.len() || self.tokens[self.pos].kind == TokenKind::Eof
    }

    fn skip_newlines(&mut self) {
        while !self.at_eof() && self.peek_kind() == TokenKind::Newline {
            self.advance();
        }
    }

    fn error(&self, message: String) -> ParseError {
        ParseError::new(self.peek().span.clone(), message)
    }

    fn unexpected(&self, what: &str) -> ParseError {
        self.error(format!("expected {what}, got {:?}", self.peek().kind))
    }

    fn expect(&mut self, expected: TokenKind) -> Result<()> {
        if std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(&expected) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&format!("{expected:?}")))
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.peek_kind() {
            TokenKind::Ident(s) => {
                self.advance();
                Ok(s)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn expect_string(&mut self) -> Result<String> {
        match self.peek_kind() {
            TokenKind::String(s) => {
                self.advance();
                Ok(s)
            }
            _ => Err(self.unexpected("string")),
        }
    }

    fn expect_angle(&mut self) -> Result<String> {
        match self.peek_kind() {
            TokenKind::Angle(s) => {
                self.advance();
                Ok(s)
            }
            _ => Err(self.unexpected("<path>")),
        }
    }

    fn expect_raw(&mut self) -> Result<String> {
        match self.peek_kind() {
            TokenKind::Raw(s) => {
                self.advance();
                Ok(s)
            }
            _ => Err(self.unexpected("define value")),
        }
    }

    fn expect_newline(&mut self) -> Result<()> {
        if self.at_eof() {
            return Ok(());
        }
        match self.peek_kind() {
            TokenKind::Newline => {
                self.advance();
                Ok(())
            }
            _ => Err(self.unexpected("end of line")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;
    use std::path::PathBuf;

    fn parse_str(src: &str) -> DescFile {
        let tokens = lexer::tokenize(src, PathBuf::from("test.txt")).unwrap();
        Parser::new(tokens).parse().unwrap()
    }

    fn parse_err(src: &str) -> String {
        let tokens = lexer::tokenize(src, PathBuf::from("test.txt")).unwrap();
        Parser::new(tokens).parse().unwrap_err().to_string()
    }

    #[test]
    fn parse_headers_and_meta() {
        let file = parse_str(
            r#"
include <linux/fcntl.h>
incdir <include/uapi>
meta arches["amd64", "arm64"]
meta noextract
define MY_MASK	O_RDONLY | O_WRONLY
"#,
        );
        assert_eq!(file.items.len(), 5);
        assert!(matches!(&file.items[0], Item::Include(p) if p == "linux/fcntl.h"));
        assert!(matches!(&file.items[1], Item::Incdir(p) if p == "include/uapi"));
        assert!(matches!(
            &file.items[2],
            Item::Meta(Meta::Arches(a)) if a == &["amd64".to_string(), "arm64".to_string()]
        ));
        assert!(matches!(&file.items[3], Item::Meta(Meta::NoExtract)));
        assert!(matches!(
            &file.items[4],
            Item::Define { name, value, .. } if name == "MY_MASK" && value == "O_RDONLY | O_WRONLY"
        ));
    }

    #[test]
    fn parse_call_with_nested_types() {
        let file = parse_str("openat$dir(fd fd_dir[opt], file ptr[in, filename], flags flags[open_flags, int32]) fd\n");
        let Item::Call(call) = &file.items[0] else {
            panic!("expected Call item");
        };
        assert_eq!(call.name, "openat$dir");
        assert_eq!(call.call_name(), "openat");
        assert_eq!(call.args.len(), 3);
        assert_eq!(call.args[2].ty.name, "flags");
        assert_eq!(call.args[2].ty.args[0].as_ident(), Some("open_flags"));
        assert_eq!(call.ret.as_ref().map(|t| t.name.as_str()), Some("fd"));
    }

    #[test]
    fn parse_flags_and_resource() {
        let file = parse_str("open_flags = O_RDONLY, O_WRONLY, 0x8\nresource fd[int32]: -1, AT_FDCWD\n");
        assert!(matches!(
            &file.items[0],
            Item::Flags { name, values } if name == "open_flags"
                && values == &[Value::Ident("O_RDONLY".into()), Value::Ident("O_WRONLY".into()), Value::Int(8)]
        ));
        let Item::Resource { name, base, values } = &file.items[1] else {
            panic!("expected Resource item");
        };
        assert_eq!(name, "fd");
        assert_eq!(base.name, "int32");
        assert_eq!(values, &[Value::Int(u64::MAX), Value::Ident("AT_FDCWD".into())]);
    }

    #[test]
    fn parse_struct_and_union() {
        let file = parse_str(
            r#"
stat {
	mode	int32[0:S_IFMT]
	pad	array[int8, PAD_LEN]
} [packed]

addr [
	in	sockaddr_in
	raw	array[int8]
]
"#,
        );
        let Item::Struct(st) = &file.items[0] else {
            panic!("expected Struct item");
        };
        assert!(!st.is_union);
        assert_eq!(st.fields.len(), 2);
        assert_eq!(
            st.fields[0].ty.args[0],
            TypeArg::Range(
                Box::new(TypeArg::Int(0)),
                Box::new(TypeArg::Type(TypeExpr { name: "S_IFMT".into(), args: vec![] })),
            )
        );
        assert_eq!(st.attrs[0].name, "packed");
        let Item::Struct(un) = &file.items[1] else {
            panic!("expected union");
        };
        assert!(un.is_union);
        assert_eq!(un.fields.len(), 2);
    }

    #[test]
    fn parse_errors_carry_position() {
        assert_eq!(
            parse_err("foo bar\n"),
            "test.txt:1:5: expected '(', '=', '{' or '[' after 'foo'"
        );
        assert!(parse_err("meta sometimes\n").contains("unknown meta 'sometimes'"));
        assert!(parse_err("s {\n  a int32\n").contains("unterminated definition of 's'"));
    }
}
