//! Generic statement tree
//!
//! Both YANG and YIN front ends produce the same `(keyword, argument,
//! children, position)` tree which the schema compiler consumes.

use std::fmt;

/// Line/column position of a statement in its source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct SourcePos {
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
}

impl SourcePos {
    /// Create a new position
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// One YANG statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// Keyword, possibly prefixed for extension instances
    pub keyword: String,
    /// Argument, if the statement has one
    pub argument: Option<String>,
    /// Substatements in source order
    pub children: Vec<Statement>,
    /// Source position
    pub position: SourcePos,
}

impl Statement {
    /// Create a statement without argument
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            argument: None,
            children: Vec::new(),
            position: SourcePos::default(),
        }
    }

    /// Create a statement with an argument
    pub fn with_arg(keyword: impl Into<String>, argument: impl Into<String>) -> Self {
        Self {
            argument: Some(argument.into()),
            ..Self::new(keyword)
        }
    }

    /// Builder: append a substatement
    pub fn child(mut self, child: Statement) -> Self {
        self.children.push(child);
        self
    }

    /// Builder: set the position
    pub fn at(mut self, position: SourcePos) -> Self {
        self.position = position;
        self
    }

    /// Argument or empty string
    pub fn arg(&self) -> &str {
        self.argument.as_deref().unwrap_or("")
    }

    /// First substatement with the given keyword
    pub fn find(&self, keyword: &str) -> Option<&Statement> {
        self.children.iter().find(|c| c.keyword == keyword)
    }

    /// Argument of the first substatement with the given keyword
    pub fn find_arg(&self, keyword: &str) -> Option<&str> {
        self.find(keyword).map(|s| s.arg())
    }

    /// All substatements with the given keyword
    pub fn find_all<'a>(&'a self, keyword: &'a str) -> impl Iterator<Item = &'a Statement> + 'a {
        self.children.iter().filter(move |c| c.keyword == keyword)
    }

    /// Whether the keyword is an extension instance (`prefix:name`)
    pub fn is_extension(&self) -> bool {
        self.keyword.contains(':')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_lookup() {
        let stmt = Statement::with_arg("leaf", "x")
            .child(Statement::with_arg("type", "string"))
            .child(Statement::with_arg("must", "a"))
            .child(Statement::with_arg("must", "b"));

        assert_eq!(stmt.arg(), "x");
        assert_eq!(stmt.find_arg("type"), Some("string"));
        assert_eq!(stmt.find_all("must").count(), 2);
        assert!(stmt.find("default").is_none());
    }

    #[test]
    fn test_extension_keyword() {
        assert!(Statement::new("ext:annotation").is_extension());
        assert!(!Statement::new("container").is_extension());
    }
}
