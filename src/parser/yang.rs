//! YANG compact syntax reader
//!
//! Turns YANG text into a [`Statement`] tree. Only the lexical rules of
//! RFC 7950 section 6 are applied here; keyword validity and argument
//! semantics are left to the compiler.

use crate::error::SchemaError;
use crate::statement::{SourcePos, Statement};

/// Parse a YANG module or submodule from text
pub fn parse_yang(text: &str) -> Result<Statement, SchemaError> {
    let mut reader = YangReader::new(text);
    reader.skip_separators()?;
    let stmt = reader.statement()?;
    reader.skip_separators()?;
    if !reader.at_end() {
        return Err(SchemaError::syntax("Trailing content after the module statement")
            .with_position(reader.pos()));
    }
    if stmt.keyword != "module" && stmt.keyword != "submodule" {
        return Err(SchemaError::syntax(format!(
            "Expected 'module' or 'submodule', found '{}'",
            stmt.keyword
        ))
        .with_position(stmt.position));
    }
    Ok(stmt)
}

struct YangReader<'a> {
    chars: Vec<char>,
    idx: usize,
    line: u32,
    column: u32,
    _src: &'a str,
}

impl<'a> YangReader<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.chars().collect(),
            idx: 0,
            line: 1,
            column: 1,
            _src: src,
        }
    }

    fn pos(&self) -> SourcePos {
        SourcePos::new(self.line, self.column)
    }

    fn at_end(&self) -> bool {
        self.idx >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.idx + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.idx).copied()?;
        self.idx += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Skip white space and comments
    fn skip_separators(&mut self) -> Result<(), SchemaError> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some('/'), Some('*')) => {
                    let start = self.pos();
                    self.bump();
                    self.bump();
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some('*'), Some('/')) => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            (Some(_), _) => {
                                self.bump();
                            }
                            (None, _) => {
                                return Err(SchemaError::syntax("Unterminated block comment")
                                    .with_position(start));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn statement(&mut self) -> Result<Statement, SchemaError> {
        let position = self.pos();
        let keyword = self.keyword()?;
        self.skip_separators()?;

        let argument = match self.peek() {
            Some(';') | Some('{') => None,
            Some(_) => Some(self.argument()?),
            None => {
                return Err(SchemaError::syntax(format!(
                    "Unexpected end of input after '{}'",
                    keyword
                ))
                .with_position(position))
            }
        };
        self.skip_separators()?;

        let mut stmt = Statement {
            keyword,
            argument,
            children: Vec::new(),
            position,
        };

        match self.bump() {
            Some(';') => Ok(stmt),
            Some('{') => {
                loop {
                    self.skip_separators()?;
                    match self.peek() {
                        Some('}') => {
                            self.bump();
                            return Ok(stmt);
                        }
                        Some(_) => stmt.children.push(self.statement()?),
                        None => {
                            return Err(SchemaError::syntax(format!(
                                "Missing '}}' for statement '{}'",
                                stmt.keyword
                            ))
                            .with_position(position))
                        }
                    }
                }
            }
            other => Err(SchemaError::syntax(format!(
                "Expected ';' or '{{' after '{}', found {:?}",
                stmt.keyword, other
            ))
            .with_position(self.pos())),
        }
    }

    fn keyword(&mut self) -> Result<String, SchemaError> {
        let start = self.pos();
        let mut keyword = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':') {
                keyword.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if keyword.is_empty() {
            return Err(SchemaError::syntax(format!(
                "Expected a keyword, found {:?}",
                self.peek()
            ))
            .with_position(start));
        }
        Ok(keyword)
    }

    fn argument(&mut self) -> Result<String, SchemaError> {
        match self.peek() {
            Some('"') | Some('\'') => {
                let mut value = self.quoted()?;
                loop {
                    self.skip_separators()?;
                    if self.peek() != Some('+') {
                        break;
                    }
                    self.bump();
                    self.skip_separators()?;
                    match self.peek() {
                        Some('"') | Some('\'') => value.push_str(&self.quoted()?),
                        _ => {
                            return Err(SchemaError::syntax(
                                "Expected a quoted string after '+'",
                            )
                            .with_position(self.pos()))
                        }
                    }
                }
                Ok(value)
            }
            _ => {
                let mut value = String::new();
                while let Some(c) = self.peek() {
                    if c.is_whitespace() || c == ';' || c == '{' {
                        break;
                    }
                    if c == '/' && matches!(self.peek_at(1), Some('/') | Some('*')) {
                        break;
                    }
                    value.push(c);
                    self.bump();
                }
                Ok(value)
            }
        }
    }

    fn quoted(&mut self) -> Result<String, SchemaError> {
        let start = self.pos();
        let quote = self.bump().unwrap_or('"');
        // Column of the first character after the opening quote, for the
        // indentation stripping of multi-line double-quoted strings.
        let indent = start.column as usize;
        let mut raw = String::new();

        loop {
            match self.bump() {
                None => {
                    return Err(SchemaError::syntax("Unterminated quoted string")
                        .with_position(start))
                }
                Some(c) if c == quote => break,
                Some('\\') if quote == '"' => match self.bump() {
                    Some('n') => raw.push('\n'),
                    Some('t') => raw.push('\t'),
                    Some('"') => raw.push('"'),
                    Some('\\') => raw.push('\\'),
                    Some(other) => {
                        raw.push('\\');
                        raw.push(other);
                    }
                    None => {
                        return Err(SchemaError::syntax("Unterminated quoted string")
                            .with_position(start))
                    }
                },
                Some(c) => raw.push(c),
            }
        }

        if quote == '\'' || !raw.contains('\n') {
            return Ok(raw);
        }

        let mut out = String::new();
        for (i, line) in raw.split('\n').enumerate() {
            if i > 0 {
                out.truncate(out.trim_end_matches([' ', '\t']).len());
                out.push('\n');
                let mut skipped = 0;
                let mut rest = line;
                while skipped < indent {
                    match rest.chars().next() {
                        Some(' ') => {
                            skipped += 1;
                            rest = &rest[1..];
                        }
                        Some('\t') => {
                            skipped += 8;
                            rest = &rest[1..];
                        }
                        _ => break,
                    }
                }
                out.push_str(rest);
            } else {
                out.push_str(line);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_module() {
        let stmt = parse_yang(
            r#"module m {
                namespace "urn:m";
                prefix m;
                // comment
                leaf x { type string; }
            }"#,
        )
        .unwrap();

        assert_eq!(stmt.keyword, "module");
        assert_eq!(stmt.arg(), "m");
        assert_eq!(stmt.find_arg("namespace"), Some("urn:m"));
        let leaf = stmt.find("leaf").unwrap();
        assert_eq!(leaf.find_arg("type"), Some("string"));
        assert_eq!(leaf.position.line, 5);
    }

    #[test]
    fn test_string_concatenation_and_escapes() {
        let stmt = parse_yang(
            r#"module m { description "a\tb" + 'c\n' ; prefix /* x */ m; }"#,
        )
        .unwrap();
        assert_eq!(stmt.find_arg("description"), Some("a\tbc\\n"));
        assert_eq!(stmt.find_arg("prefix"), Some("m"));
    }

    #[test]
    fn test_multiline_indentation_is_stripped() {
        let text = "module m {\n  description\n    \"first\n     second   \n     third\";\n}";
        let stmt = parse_yang(text).unwrap();
        assert_eq!(stmt.find_arg("description"), Some("first\nsecond\nthird"));
    }

    #[test]
    fn test_extension_keyword() {
        let stmt = parse_yang("module m { ex:note \"hi\"; }").unwrap();
        assert!(stmt.children[0].is_extension());
    }

    #[test]
    fn test_missing_brace() {
        let err = parse_yang("module m { leaf x { type string; }").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::SyntaxViolation);
    }

    #[test]
    fn test_wrong_root() {
        assert!(parse_yang("container c;").is_err());
    }
}
