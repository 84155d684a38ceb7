//! YANG type model
//!
//! This module implements the compiled representation of YANG types:
//! - Built-in types and their value domains
//! - Derived types with restrictions (range, length, pattern, enum, bit)
//! - Typedefs and the derivation chain
//!
//! Compiled [`Type`] objects and their [`Pattern`]s are shared through
//! `Arc`: a typedef's type is referenced, not copied, by every leaf that
//! uses it without further restriction.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use regex::Regex;

use crate::error::SchemaError;
use crate::ids::{IdentityId, ModuleId, NodeId, TypedefId};
use crate::statement::{SourcePos, Statement};
use crate::xpath::CompiledExpr;

use super::node::Status;
use super::Unit;

// =============================================================================
// Built-in types
// =============================================================================

/// YANG built-in type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinKind {
    /// binary
    Binary,
    /// bits
    Bits,
    /// boolean
    Boolean,
    /// decimal64
    Decimal64,
    /// empty
    Empty,
    /// enumeration
    Enumeration,
    /// identityref
    Identityref,
    /// instance-identifier
    InstanceIdentifier,
    /// int8
    Int8,
    /// int16
    Int16,
    /// int32
    Int32,
    /// int64
    Int64,
    /// leafref
    Leafref,
    /// string
    String,
    /// uint8
    Uint8,
    /// uint16
    Uint16,
    /// uint32
    Uint32,
    /// uint64
    Uint64,
    /// union
    Union,
}

impl BuiltinKind {
    /// Look up a built-in type by its YANG name
    pub fn from_name(name: &str) -> Option<Self> {
        use BuiltinKind::*;
        Some(match name {
            "binary" => Binary,
            "bits" => Bits,
            "boolean" => Boolean,
            "decimal64" => Decimal64,
            "empty" => Empty,
            "enumeration" => Enumeration,
            "identityref" => Identityref,
            "instance-identifier" => InstanceIdentifier,
            "int8" => Int8,
            "int16" => Int16,
            "int32" => Int32,
            "int64" => Int64,
            "leafref" => Leafref,
            "string" => String,
            "uint8" => Uint8,
            "uint16" => Uint16,
            "uint32" => Uint32,
            "uint64" => Uint64,
            "union" => Union,
            _ => return None,
        })
    }

    /// YANG name of the built-in type
    pub fn name(&self) -> &'static str {
        use BuiltinKind::*;
        match self {
            Binary => "binary",
            Bits => "bits",
            Boolean => "boolean",
            Decimal64 => "decimal64",
            Empty => "empty",
            Enumeration => "enumeration",
            Identityref => "identityref",
            InstanceIdentifier => "instance-identifier",
            Int8 => "int8",
            Int16 => "int16",
            Int32 => "int32",
            Int64 => "int64",
            Leafref => "leafref",
            String => "string",
            Uint8 => "uint8",
            Uint16 => "uint16",
            Uint32 => "uint32",
            Uint64 => "uint64",
            Union => "union",
        }
    }

    /// Value domain of integer types
    pub fn int_domain(&self) -> Option<(i128, i128)> {
        use BuiltinKind::*;
        Some(match self {
            Int8 => (i8::MIN as i128, i8::MAX as i128),
            Int16 => (i16::MIN as i128, i16::MAX as i128),
            Int32 => (i32::MIN as i128, i32::MAX as i128),
            Int64 => (i64::MIN as i128, i64::MAX as i128),
            Uint8 => (0, u8::MAX as i128),
            Uint16 => (0, u16::MAX as i128),
            Uint32 => (0, u32::MAX as i128),
            Uint64 => (0, u64::MAX as i128),
            _ => return None,
        })
    }

    /// Whether this is one of the integer types
    pub fn is_integer(&self) -> bool {
        self.int_domain().is_some()
    }
}

impl fmt::Display for BuiltinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Domain of `length` restrictions
pub const LENGTH_DOMAIN: (i128, i128) = (0, u64::MAX as i128);

/// Domain of scaled decimal64 values
pub const DECIMAL64_DOMAIN: (i128, i128) = (i64::MIN as i128, i64::MAX as i128);

// =============================================================================
// Restrictions
// =============================================================================

/// One `N..M` part of a range or length restriction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangePart {
    /// Lower bound (inclusive)
    pub min: i128,
    /// Upper bound (inclusive)
    pub max: i128,
}

impl RangePart {
    /// Whether the value lies in this part
    pub fn contains(&self, value: i128) -> bool {
        self.min <= value && value <= self.max
    }
}

/// Compiled `range` or `length` restriction
///
/// Decimal64 bounds are stored scaled by `10^fraction-digits`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restriction {
    /// Ascending, non-overlapping parts
    pub parts: Vec<RangePart>,
    /// Source expression
    pub text: String,
    /// Custom `error-message`
    pub error_message: Option<String>,
    /// Custom `error-app-tag`
    pub error_app_tag: Option<String>,
}

impl Restriction {
    /// A restriction covering a whole domain
    pub fn domain(bounds: (i128, i128)) -> Self {
        Self {
            parts: vec![RangePart {
                min: bounds.0,
                max: bounds.1,
            }],
            text: "min..max".to_string(),
            error_message: None,
            error_app_tag: None,
        }
    }

    /// Whether a value satisfies the restriction
    pub fn contains(&self, value: i128) -> bool {
        self.parts.iter().any(|p| p.contains(value))
    }

    /// Whether every value of `other` satisfies this restriction
    pub fn covers(&self, other: &Restriction) -> bool {
        other
            .parts
            .iter()
            .all(|o| self.parts.iter().any(|p| p.min <= o.min && o.max <= p.max))
    }

    /// Lowest allowed value
    pub fn lowest(&self) -> i128 {
        self.parts.first().map(|p| p.min).unwrap_or(0)
    }

    /// Highest allowed value
    pub fn highest(&self) -> i128 {
        self.parts.last().map(|p| p.max).unwrap_or(0)
    }
}

/// Compiled `pattern` restriction
#[derive(Debug)]
pub struct Pattern {
    /// Pattern as written in the module
    pub text: String,
    /// Anchored regular expression
    pub regex: Regex,
    /// YANG 1.1 `modifier invert-match`
    pub invert: bool,
    /// Custom `error-message`
    pub error_message: Option<String>,
    /// Custom `error-app-tag`
    pub error_app_tag: Option<String>,
}

impl Pattern {
    /// Compile a YANG (XSD flavoured) pattern
    pub fn new(text: &str, invert: bool) -> Result<Self, SchemaError> {
        let translated = translate_xsd_regex(text);
        let regex = Regex::new(&format!("^(?:{})$", translated)).map_err(|e| {
            SchemaError::syntax(format!("Invalid pattern '{}': {}", text, e))
        })?;
        Ok(Self {
            text: text.to_string(),
            regex,
            invert,
            error_message: None,
            error_app_tag: None,
        })
    }

    /// Check a value against the pattern, honouring invert-match
    pub fn matches(&self, value: &str) -> bool {
        self.regex.is_match(value) != self.invert
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text && self.invert == other.invert
    }
}

/// XSD regular expressions treat `^` and `$` as ordinary characters
fn translate_xsd_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut in_class = false;
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push('\\');
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '[' => {
                in_class = true;
                out.push(c);
            }
            ']' => {
                in_class = false;
                out.push(c);
            }
            '^' | '$' if !in_class => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// One `enum` of an enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumItem {
    /// Enum name
    pub name: String,
    /// Assigned value
    pub value: i32,
    /// Status
    pub status: Status,
}

/// One `bit` of a bits type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitItem {
    /// Bit name
    pub name: String,
    /// Assigned position
    pub position: u32,
    /// Status
    pub status: Status,
}

// =============================================================================
// Leafref paths
// =============================================================================

/// A `prefix:name` step of a leafref path, prefix resolved at compile time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathName {
    /// Resolved module; `None` means the namespace of the referring node
    pub module: Option<ModuleId>,
    /// Local name
    pub name: String,
}

/// `[key = current()/../x]` predicate of a leafref path step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPredicate {
    /// Key leaf compared
    pub key: PathName,
    /// Number of `..` after `current()`
    pub up: usize,
    /// Descending steps after the `..`s
    pub steps: Vec<PathName>,
}

/// One step of a leafref path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    /// Node name
    pub node: PathName,
    /// Key predicates
    pub predicates: Vec<PathPredicate>,
}

/// Parsed leafref `path`
#[derive(Debug, Clone, PartialEq)]
pub struct LeafrefPath {
    /// Path as written
    pub text: String,
    /// Absolute path (starts with `/`)
    pub absolute: bool,
    /// Leading `..` count for relative paths
    pub up: usize,
    /// Descending steps
    pub steps: Vec<PathStep>,
    /// The same path compiled for the XPath service
    pub expr: CompiledExpr,
}

// =============================================================================
// Compiled types
// =============================================================================

/// How a type object is named
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeName {
    /// A built-in type used directly
    Builtin,
    /// The type object of a typedef
    Typedef(TypedefId),
    /// An inline restriction of its base
    Anonymous,
}

/// Kind-specific restriction payload
#[derive(Debug, Clone, PartialEq)]
pub enum TypeInfo {
    /// boolean, empty
    Plain,
    /// Integer types
    Int {
        /// Effective range
        range: Option<Restriction>,
    },
    /// decimal64
    Decimal64 {
        /// fraction-digits, 1..=18
        fraction_digits: u8,
        /// Effective range, scaled
        range: Option<Restriction>,
    },
    /// string
    String {
        /// Effective length
        length: Option<Restriction>,
        /// Patterns of this type and all its bases
        patterns: Vec<Arc<Pattern>>,
    },
    /// binary
    Binary {
        /// Effective length in octets
        length: Option<Restriction>,
    },
    /// enumeration
    Enumeration {
        /// Enums in declaration order
        enums: Vec<EnumItem>,
    },
    /// bits
    Bits {
        /// Bits in position order
        bits: Vec<BitItem>,
    },
    /// leafref
    Leafref {
        /// Target path
        path: Arc<LeafrefPath>,
        /// require-instance
        require_instance: bool,
    },
    /// identityref
    Identityref {
        /// Base identities
        bases: Vec<IdentityId>,
    },
    /// instance-identifier
    InstanceIdentifier {
        /// require-instance
        require_instance: bool,
    },
    /// union
    Union {
        /// Member types in order
        members: Vec<Arc<Type>>,
    },
}

/// A compiled type
#[derive(Debug, Clone, PartialEq)]
pub struct Type {
    /// Built-in type at the root of the derivation chain
    pub base: BuiltinKind,
    /// Naming of this type object
    pub name: TypeName,
    /// Immediate base type object, `None` for built-ins
    pub der: Option<Arc<Type>>,
    /// Restriction payload
    pub info: TypeInfo,
}

impl Type {
    /// Unrestricted built-in type
    pub fn builtin(base: BuiltinKind) -> Self {
        let info = match base {
            BuiltinKind::Binary => TypeInfo::Binary { length: None },
            BuiltinKind::String => TypeInfo::String {
                length: None,
                patterns: Vec::new(),
            },
            k if k.is_integer() => TypeInfo::Int { range: None },
            _ => TypeInfo::Plain,
        };
        Self {
            base,
            name: TypeName::Builtin,
            der: None,
            info,
        }
    }

    /// Typedefs along the derivation chain, nearest first
    pub fn typedef_chain(&self) -> Vec<TypedefId> {
        let mut chain = Vec::new();
        let mut current = Some(self);
        while let Some(ty) = current {
            if let TypeName::Typedef(id) = ty.name {
                chain.push(id);
            }
            current = ty.der.as_deref();
        }
        chain
    }

    /// Effective range (integers, decimal64)
    pub fn range(&self) -> Option<&Restriction> {
        match &self.info {
            TypeInfo::Int { range } | TypeInfo::Decimal64 { range, .. } => range.as_ref(),
            _ => None,
        }
    }

    /// Effective length (string, binary)
    pub fn length(&self) -> Option<&Restriction> {
        match &self.info {
            TypeInfo::String { length, .. } | TypeInfo::Binary { length } => length.as_ref(),
            _ => None,
        }
    }

    /// Leafref types contained in this type (itself or union members)
    pub fn leafrefs(&self) -> Vec<(&Arc<LeafrefPath>, bool)> {
        let mut out = Vec::new();
        match &self.info {
            TypeInfo::Leafref {
                path,
                require_instance,
            } => out.push((path, *require_instance)),
            TypeInfo::Union { members } => {
                for m in members {
                    out.extend(m.leafrefs());
                }
            }
            _ => {}
        }
        out
    }

    /// Whether the type or any union member is `empty`
    pub fn contains_empty(&self) -> bool {
        match &self.info {
            TypeInfo::Union { members } => members.iter().any(|m| m.contains_empty()),
            _ => self.base == BuiltinKind::Empty,
        }
    }
}

/// A `typedef` definition
#[derive(Debug, Clone)]
pub struct Typedef {
    /// Typedef name
    pub name: String,
    /// Owning module
    pub module: ModuleId,
    /// Module or submodule where it is written, for prefix resolution
    pub unit: Unit,
    /// Enclosing node for lexically scoped typedefs
    pub scope: Option<NodeId>,
    /// The `typedef` statement
    pub stmt: Statement,
    /// Compiled type, `None` until the type pass reaches it
    pub ty: Option<Arc<Type>>,
    /// Default value
    pub default: Option<String>,
    /// Units
    pub units: Option<String>,
    /// Status
    pub status: Status,
    /// Source position
    pub position: SourcePos,
}

/// Lexical typedef table
pub type TypedefMap = IndexMap<String, TypedefId>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        assert_eq!(BuiltinKind::from_name("int8"), Some(BuiltinKind::Int8));
        assert_eq!(
            BuiltinKind::from_name("instance-identifier"),
            Some(BuiltinKind::InstanceIdentifier)
        );
        assert_eq!(BuiltinKind::from_name("integer"), None);
        assert_eq!(BuiltinKind::Uint64.name(), "uint64");
    }

    #[test]
    fn test_int_domain() {
        assert_eq!(BuiltinKind::Int8.int_domain(), Some((-128, 127)));
        assert_eq!(BuiltinKind::Uint64.int_domain(), Some((0, u64::MAX as i128)));
        assert!(BuiltinKind::String.int_domain().is_none());
    }

    #[test]
    fn test_restriction_covers() {
        let base = Restriction {
            parts: vec![RangePart { min: 1, max: 100 }],
            text: "1..100".into(),
            error_message: None,
            error_app_tag: None,
        };
        let narrow = Restriction {
            parts: vec![RangePart { min: 1, max: 10 }, RangePart { min: 20, max: 30 }],
            text: "1..10|20..30".into(),
            error_message: None,
            error_app_tag: None,
        };
        let wide = Restriction {
            parts: vec![RangePart { min: 1, max: 200 }],
            text: "1..200".into(),
            error_message: None,
            error_app_tag: None,
        };
        assert!(base.covers(&narrow));
        assert!(!base.covers(&wide));
        assert!(narrow.contains(25));
        assert!(!narrow.contains(15));
    }

    #[test]
    fn test_pattern_anchoring_and_invert() {
        let p = Pattern::new("[a-z]+", false).unwrap();
        assert!(p.matches("abc"));
        assert!(!p.matches("abc1"));

        let inv = Pattern::new("x.*", true).unwrap();
        assert!(!inv.matches("xyz"));
        assert!(inv.matches("abc"));
    }

    #[test]
    fn test_pattern_dollar_is_literal() {
        let p = Pattern::new("a$b", false).unwrap();
        assert!(p.matches("a$b"));
        let class = Pattern::new("[$^]+", false).unwrap();
        assert!(class.matches("$^$"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(Pattern::new("(", false).is_err());
    }
}
