//! XPath parser
//!
//! Tokenizer and recursive-descent parser for the XPath 1.0 subset used by
//! YANG. Prefixes are resolved to module names while parsing so that an
//! unknown prefix is reported at schema compile time.

use std::fmt;

use crate::error::{Error, Result};

use super::NamespaceMap;

/// XPath axis types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// child:: axis (default)
    Child,
    /// descendant:: axis
    Descendant,
    /// descendant-or-self:: axis
    DescendantOrSelf,
    /// self:: axis
    SelfAxis,
    /// parent:: axis
    Parent,
    /// ancestor:: axis
    Ancestor,
    /// ancestor-or-self:: axis
    AncestorOrSelf,
    /// following-sibling:: axis
    FollowingSibling,
    /// preceding-sibling:: axis
    PrecedingSibling,
}

impl Axis {
    /// Parse axis from string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "child" => Some(Self::Child),
            "descendant" => Some(Self::Descendant),
            "descendant-or-self" => Some(Self::DescendantOrSelf),
            "self" => Some(Self::SelfAxis),
            "parent" => Some(Self::Parent),
            "ancestor" => Some(Self::Ancestor),
            "ancestor-or-self" => Some(Self::AncestorOrSelf),
            "following-sibling" => Some(Self::FollowingSibling),
            "preceding-sibling" => Some(Self::PrecedingSibling),
            _ => None,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Child => "child",
            Self::Descendant => "descendant",
            Self::DescendantOrSelf => "descendant-or-self",
            Self::SelfAxis => "self",
            Self::Parent => "parent",
            Self::Ancestor => "ancestor",
            Self::AncestorOrSelf => "ancestor-or-self",
            Self::FollowingSibling => "following-sibling",
            Self::PrecedingSibling => "preceding-sibling",
        };
        write!(f, "{}", s)
    }
}

/// Node test of a step
#[derive(Debug, Clone, PartialEq)]
pub enum NodeTest {
    /// `name` or `prefix:name`; the prefix is already mapped to a module name
    Name {
        /// Module name, `None` for the default namespace
        module: Option<String>,
        /// Local name
        local: String,
    },
    /// `*` or `prefix:*`
    Wildcard {
        /// Module name restriction
        module: Option<String>,
    },
    /// `node()`
    Node,
    /// `text()`
    Text,
}

/// One location step
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Axis
    pub axis: Axis,
    /// Node test
    pub test: NodeTest,
    /// Predicates
    pub predicates: Vec<Expr>,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// or
    Or,
    /// and
    And,
    /// =
    Eq,
    /// !=
    Ne,
    /// <
    Lt,
    /// <=
    Le,
    /// >
    Gt,
    /// >=
    Ge,
    /// +
    Add,
    /// -
    Sub,
    /// *
    Mul,
    /// div
    Div,
    /// mod
    Mod,
    /// |
    Union,
}

/// XPath expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Binary operation
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// Unary minus
    Negate(Box<Expr>),
    /// String literal
    Literal(String),
    /// Number literal
    Number(f64),
    /// Function call
    Function(String, Vec<Expr>),
    /// Location path
    Path {
        /// Starts at the document root
        absolute: bool,
        /// Steps
        steps: Vec<Step>,
    },
    /// Filter expression followed by an optional relative path
    Filter {
        /// Primary expression
        primary: Box<Expr>,
        /// Predicates applied to the primary
        predicates: Vec<Expr>,
        /// Steps after the primary
        steps: Vec<Step>,
    },
}

// =============================================================================
// Tokenizer
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Slash,
    DoubleSlash,
    LBracket,
    RBracket,
    LParen,
    RParen,
    At,
    Comma,
    Dot,
    DotDot,
    Pipe,
    Plus,
    Minus,
    Star,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    ColonColon,
    Literal(String),
    Number(f64),
    Name(String),
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '/' => {
                if chars.get(i + 1) == Some(&'/') {
                    tokens.push(Token::DoubleSlash);
                    i += 2;
                } else {
                    tokens.push(Token::Slash);
                    i += 1;
                }
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '@' => {
                tokens.push(Token::At);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Eq);
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            ':' if chars.get(i + 1) == Some(&':') => {
                tokens.push(Token::ColonColon);
                i += 2;
            }
            '"' | '\'' => {
                let quote = c;
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end] != quote {
                    end += 1;
                }
                if end >= chars.len() {
                    return Err(Error::XPath(format!("Unterminated literal in '{}'", input)));
                }
                tokens.push(Token::Literal(chars[start..end].iter().collect()));
                i = end + 1;
            }
            '.' => {
                if chars.get(i + 1) == Some(&'.') {
                    tokens.push(Token::DotDot);
                    i += 2;
                } else if chars.get(i + 1).map_or(false, |d| d.is_ascii_digit()) {
                    let (number, next) = read_number(&chars, i, input)?;
                    tokens.push(Token::Number(number));
                    i = next;
                } else {
                    tokens.push(Token::Dot);
                    i += 1;
                }
            }
            d if d.is_ascii_digit() => {
                let (number, next) = read_number(&chars, i, input)?;
                tokens.push(Token::Number(number));
                i = next;
            }
            n if is_name_start(n) => {
                let start = i;
                while i < chars.len() && is_name_char(chars[i]) {
                    i += 1;
                }
                // prefix:local or prefix:*, but not the axis separator
                if chars.get(i) == Some(&':') && chars.get(i + 1) != Some(&':') {
                    match chars.get(i + 1) {
                        Some('*') => i += 2,
                        Some(&n) if is_name_start(n) => {
                            i += 1;
                            while i < chars.len() && is_name_char(chars[i]) {
                                i += 1;
                            }
                        }
                        _ => {}
                    }
                }
                tokens.push(Token::Name(chars[start..i].iter().collect()));
            }
            other => {
                return Err(Error::XPath(format!(
                    "Unexpected character '{}' in '{}'",
                    other, input
                )))
            }
        }
    }

    Ok(tokens)
}

fn read_number(chars: &[char], start: usize, input: &str) -> Result<(f64, usize)> {
    let mut end = start;
    while end < chars.len() && (chars[end].is_ascii_digit() || chars[end] == '.') {
        end += 1;
    }
    let text: String = chars[start..end].iter().collect();
    let value = text
        .parse::<f64>()
        .map_err(|_| Error::XPath(format!("Invalid number '{}' in '{}'", text, input)))?;
    Ok((value, end))
}

// =============================================================================
// Parser
// =============================================================================

/// Parse an expression, mapping prefixes through `namespaces`
pub fn parse(input: &str, namespaces: &NamespaceMap) -> Result<Expr> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        input,
        namespaces,
    };
    let expr = parser.parse_or()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error("unexpected trailing tokens"));
    }
    Ok(expr)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    input: &'a str,
    namespaces: &'a NamespaceMap,
}

impl<'a> Parser<'a> {
    fn error(&self, msg: &str) -> Error {
        Error::XPath(format!("{} in '{}' (token {})", msg, self.input, self.pos))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {:?}", token)))
        }
    }

    fn eat_operator_name(&mut self, name: &str) -> bool {
        if matches!(self.peek(), Some(Token::Name(n)) if n == name) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.eat_operator_name("or") {
            let right = self.parse_and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_equality()?;
        while self.eat_operator_name("and") {
            let right = self.parse_equality()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => BinaryOp::Eq,
                Some(Token::Ne) => BinaryOp::Ne,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_relational()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_additive()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Name(n)) if n == "div" => BinaryOp::Div,
                Some(Token::Name(n)) if n == "mod" => BinaryOp::Mod,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.eat(&Token::Minus) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Negate(Box::new(inner)));
        }
        self.parse_union()
    }

    fn parse_union(&mut self) -> Result<Expr> {
        let mut left = self.parse_path_expr()?;
        while self.eat(&Token::Pipe) {
            let right = self.parse_path_expr()?;
            left = Expr::Binary(BinaryOp::Union, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn starts_filter(&self) -> bool {
        match self.peek() {
            Some(Token::Literal(_)) | Some(Token::Number(_)) | Some(Token::LParen) => true,
            Some(Token::Name(n)) => {
                self.peek_at(1) == Some(&Token::LParen) && n != "node" && n != "text"
            }
            _ => false,
        }
    }

    fn parse_path_expr(&mut self) -> Result<Expr> {
        if self.starts_filter() {
            let primary = self.parse_primary()?;
            let predicates = self.parse_predicates()?;
            let mut steps = Vec::new();
            if matches!(self.peek(), Some(Token::Slash) | Some(Token::DoubleSlash)) {
                self.parse_relative_steps(&mut steps)?;
            }
            if predicates.is_empty() && steps.is_empty() {
                return Ok(primary);
            }
            return Ok(Expr::Filter {
                primary: Box::new(primary),
                predicates,
                steps,
            });
        }

        match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                let mut steps = Vec::new();
                if self.starts_step() {
                    steps.push(self.parse_step()?);
                    self.parse_relative_steps(&mut steps)?;
                }
                Ok(Expr::Path {
                    absolute: true,
                    steps,
                })
            }
            Some(Token::DoubleSlash) => {
                let mut steps = Vec::new();
                self.parse_relative_steps(&mut steps)?;
                Ok(Expr::Path {
                    absolute: true,
                    steps,
                })
            }
            _ => {
                let mut steps = vec![self.parse_step()?];
                self.parse_relative_steps(&mut steps)?;
                Ok(Expr::Path {
                    absolute: false,
                    steps,
                })
            }
        }
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Name(_))
                | Some(Token::Star)
                | Some(Token::Dot)
                | Some(Token::DotDot)
                | Some(Token::At)
        )
    }

    fn parse_relative_steps(&mut self, steps: &mut Vec<Step>) -> Result<()> {
        loop {
            match self.peek() {
                Some(Token::Slash) => {
                    self.pos += 1;
                    steps.push(self.parse_step()?);
                }
                Some(Token::DoubleSlash) => {
                    self.pos += 1;
                    steps.push(Step {
                        axis: Axis::DescendantOrSelf,
                        test: NodeTest::Node,
                        predicates: Vec::new(),
                    });
                    steps.push(self.parse_step()?);
                }
                _ => return Ok(()),
            }
        }
    }

    fn parse_step(&mut self) -> Result<Step> {
        if self.eat(&Token::Dot) {
            return Ok(Step {
                axis: Axis::SelfAxis,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }
        if self.eat(&Token::DotDot) {
            return Ok(Step {
                axis: Axis::Parent,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }
        if self.eat(&Token::At) {
            return Err(self.error("attributes are not part of YANG data trees"));
        }

        let mut axis = Axis::Child;
        if let (Some(Token::Name(name)), Some(Token::ColonColon)) = (self.peek(), self.peek_at(1)) {
            axis = Axis::parse(name).ok_or_else(|| self.error("unsupported axis"))?;
            self.pos += 2;
        }

        let test = match self.peek().cloned() {
            Some(Token::Star) => {
                self.pos += 1;
                NodeTest::Wildcard { module: None }
            }
            Some(Token::Name(name)) => {
                self.pos += 1;
                if (name == "node" || name == "text") && self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    self.expect(&Token::RParen)?;
                    if name == "node" {
                        NodeTest::Node
                    } else {
                        NodeTest::Text
                    }
                } else {
                    self.name_test(&name)?
                }
            }
            _ => return Err(self.error("expected a location step")),
        };

        let predicates = self.parse_predicates()?;
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn name_test(&self, name: &str) -> Result<NodeTest> {
        match name.split_once(':') {
            Some((prefix, local)) => {
                let module = self.namespaces.get(prefix).cloned().ok_or_else(|| {
                    Error::XPath(format!("Unknown prefix '{}' in '{}'", prefix, self.input))
                })?;
                if local == "*" {
                    Ok(NodeTest::Wildcard {
                        module: Some(module),
                    })
                } else {
                    Ok(NodeTest::Name {
                        module: Some(module),
                        local: local.to_string(),
                    })
                }
            }
            None => Ok(NodeTest::Name {
                module: None,
                local: name.to_string(),
            }),
        }
    }

    fn parse_predicates(&mut self) -> Result<Vec<Expr>> {
        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.parse_or()?);
            self.expect(&Token::RBracket)?;
        }
        Ok(predicates)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.peek().cloned() {
            Some(Token::Literal(s)) => {
                self.pos += 1;
                Ok(Expr::Literal(s))
            }
            Some(Token::Number(n)) => {
                self.pos += 1;
                Ok(Expr::Number(n))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Name(name)) => {
                self.pos += 1;
                self.expect(&Token::LParen)?;
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.parse_or()?);
                        if self.eat(&Token::RParen) {
                            break;
                        }
                        self.expect(&Token::Comma)?;
                    }
                }
                Ok(Expr::Function(name, args))
            }
            _ => Err(self.error("expected an expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns() -> NamespaceMap {
        let mut ns = NamespaceMap::new();
        ns.insert("t".into(), "test-module".into());
        ns
    }

    #[test]
    fn test_parse_absolute_path() {
        let expr = parse("/t:a/t:b", &ns()).unwrap();
        match expr {
            Expr::Path { absolute, steps } => {
                assert!(absolute);
                assert_eq!(steps.len(), 2);
                assert_eq!(
                    steps[0].test,
                    NodeTest::Name {
                        module: Some("test-module".into()),
                        local: "a".into()
                    }
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_leafref_predicate() {
        let expr = parse("/t:list[t:name = current()/../t:ref]/t:value", &ns()).unwrap();
        let Expr::Path { steps, .. } = expr else {
            panic!("not a path");
        };
        assert_eq!(steps[0].predicates.len(), 1);
        assert!(matches!(steps[0].predicates[0], Expr::Binary(BinaryOp::Eq, _, _)));
    }

    #[test]
    fn test_operator_precedence() {
        let expr = parse("a or b and c", &ns()).unwrap();
        let Expr::Binary(BinaryOp::Or, _, right) = expr else {
            panic!("or must bind loosest");
        };
        assert!(matches!(*right, Expr::Binary(BinaryOp::And, _, _)));
    }

    #[test]
    fn test_operator_names_as_node_names() {
        // a node called "and" is still a valid step
        let expr = parse("../mod", &ns()).unwrap();
        assert!(matches!(expr, Expr::Path { .. }));
    }

    #[test]
    fn test_function_with_path_suffix() {
        let expr = parse("current()/../x", &ns()).unwrap();
        assert!(matches!(expr, Expr::Filter { .. }));
        let expr = parse("count(../x) > 1.5", &ns()).unwrap();
        assert!(matches!(expr, Expr::Binary(BinaryOp::Gt, _, _)));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("a = ", &ns()).is_err());
        assert!(parse("'open", &ns()).is_err());
        assert!(parse("a[b", &ns()).is_err());
        assert!(parse("q:x", &ns()).is_err());
        assert!(parse("@attr", &ns()).is_err());
    }
}
