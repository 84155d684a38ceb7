//! Type compiler
//!
//! `compile_type` turns a `type` statement into a shared [`Type`] object or
//! reports that a typedef it depends on is not compiled yet. Deferred types
//! are retried by the compiler's type worklist until a fixed point.

use std::sync::Arc;

use crate::error::SchemaError;
use crate::ids::{IdentityId, TypedefId};
use crate::names::split_prefixed;
use crate::statement::Statement;

use super::node::Status;
use super::range::{compile_restriction, parse_integer, BoundKind};
use super::types::{
    BitItem, BuiltinKind, EnumItem, LeafrefPath, PathName, PathPredicate, PathStep, Pattern,
    Restriction, Type, TypeInfo, TypeName, DECIMAL64_DOMAIN, LENGTH_DOMAIN,
};
use super::{Context, NodeId, Unit, YangVersion};

/// Result of compiling a `type` statement
#[derive(Debug, Clone)]
pub(crate) enum TypeOutcome {
    /// Compiled type
    Ready(Arc<Type>),
    /// A typedef on the derivation chain is not compiled yet
    Deferred(TypedefId),
}

/// Where a `type` statement is written
#[derive(Debug, Clone, Copy)]
pub(crate) struct TypeScope {
    pub unit: Unit,
    pub scope: Option<NodeId>,
    pub status: Status,
    pub version: YangVersion,
}

const RESTRICTIONS: &[&str] = &[
    "range",
    "length",
    "pattern",
    "enum",
    "bit",
    "path",
    "base",
    "require-instance",
    "fraction-digits",
    "type",
];

fn allowed_restrictions(kind: BuiltinKind) -> &'static [&'static str] {
    use BuiltinKind::*;
    match kind {
        Int8 | Int16 | Int32 | Int64 | Uint8 | Uint16 | Uint32 | Uint64 => &["range"],
        Decimal64 => &["range", "fraction-digits"],
        String => &["length", "pattern"],
        Binary => &["length"],
        Enumeration => &["enum"],
        Bits => &["bit"],
        Leafref => &["path", "require-instance"],
        Identityref => &["base"],
        InstanceIdentifier => &["require-instance"],
        Union => &["type"],
        Boolean | Empty => &[],
    }
}

fn has_restrictions(stmt: &Statement) -> bool {
    stmt.children
        .iter()
        .any(|c| RESTRICTIONS.contains(&c.keyword.as_str()))
}

fn restriction_with_errors(mut restriction: Restriction, stmt: &Statement) -> Restriction {
    restriction.error_message = stmt.find_arg("error-message").map(str::to_string);
    restriction.error_app_tag = stmt.find_arg("error-app-tag").map(str::to_string);
    restriction
}

pub(crate) fn parse_bool_arg(stmt: &Statement) -> Result<bool, SchemaError> {
    match stmt.arg() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(SchemaError::syntax(format!(
            "Invalid value '{}' of '{}'",
            other, stmt.keyword
        ))
        .with_position(stmt.position)),
    }
}

impl Context {
    /// Compile a `type` statement
    ///
    /// `own` is set when compiling the type of a typedef: the resulting
    /// object is named after the typedef and never shared with its base.
    pub(crate) fn compile_type(
        &self,
        stmt: &Statement,
        sc: &TypeScope,
        own: Option<TypedefId>,
    ) -> Result<TypeOutcome, SchemaError> {
        let name = stmt.arg();
        let (prefix, local) = split_prefixed(name);
        let type_name = own.map(TypeName::Typedef);

        if prefix.is_none() {
            if let Some(kind) = BuiltinKind::from_name(local) {
                let info = match self.restrict(kind, None, stmt, sc)? {
                    Some(info) => info,
                    None => return Ok(TypeOutcome::Deferred(self.first_deferred(stmt, sc)?)),
                };
                return Ok(TypeOutcome::Ready(Arc::new(Type {
                    base: kind,
                    name: type_name.unwrap_or(TypeName::Builtin),
                    der: None,
                    info,
                })));
            }
        }

        let tid = self
            .find_typedef(sc.unit, sc.scope, name)
            .map_err(|e| e.with_position(stmt.position))?
            .ok_or_else(|| {
                SchemaError::unresolved(format!("Type '{}' not found", name))
                    .with_position(stmt.position)
            })?;
        if Some(tid) == own {
            return Err(SchemaError::circular(format!(
                "Typedef '{}' is derived from itself",
                local
            ))
            .with_position(stmt.position));
        }

        let typedef = self.typedef(tid);
        if !sc.status.may_reference(typedef.status) {
            return Err(SchemaError::constraint(format!(
                "A {} definition references {} typedef '{}'",
                sc.status, typedef.status, typedef.name
            ))
            .with_position(stmt.position));
        }
        let Some(base) = typedef.ty.clone() else {
            return Ok(TypeOutcome::Deferred(tid));
        };

        if own.is_none() && !has_restrictions(stmt) {
            return Ok(TypeOutcome::Ready(base));
        }

        let info = match self.restrict(base.base, Some(&base), stmt, sc)? {
            Some(info) => info,
            None => return Ok(TypeOutcome::Deferred(self.first_deferred(stmt, sc)?)),
        };
        Ok(TypeOutcome::Ready(Arc::new(Type {
            base: base.base,
            name: type_name.unwrap_or(TypeName::Anonymous),
            der: Some(base),
            info,
        })))
    }

    fn first_deferred(&self, stmt: &Statement, sc: &TypeScope) -> Result<TypedefId, SchemaError> {
        for member in stmt.find_all("type") {
            if let TypeOutcome::Deferred(id) = self.compile_type(member, sc, None)? {
                return Ok(id);
            }
        }
        Err(SchemaError::unresolved(format!(
            "Type '{}' could not be resolved",
            stmt.arg()
        )))
    }

    /// Typedefs referenced by a `type` statement, union members included
    pub(crate) fn type_dependencies(&self, stmt: &Statement, sc: &TypeScope) -> Vec<TypedefId> {
        let mut out = Vec::new();
        let (prefix, local) = split_prefixed(stmt.arg());
        if prefix.is_some() || BuiltinKind::from_name(local).is_none() {
            if let Ok(Some(id)) = self.find_typedef(sc.unit, sc.scope, stmt.arg()) {
                out.push(id);
            }
        }
        for member in stmt.find_all("type") {
            out.extend(self.type_dependencies(member, sc));
        }
        out
    }

    /// Compile the restriction payload; `None` when a union member is deferred
    fn restrict(
        &self,
        kind: BuiltinKind,
        base: Option<&Type>,
        stmt: &Statement,
        sc: &TypeScope,
    ) -> Result<Option<TypeInfo>, SchemaError> {
        let allowed = allowed_restrictions(kind);
        for child in &stmt.children {
            if RESTRICTIONS.contains(&child.keyword.as_str())
                && !allowed.contains(&child.keyword.as_str())
            {
                return Err(SchemaError::syntax(format!(
                    "Restriction '{}' is not allowed for type '{}'",
                    child.keyword,
                    kind
                ))
                .with_position(child.position));
            }
        }

        use BuiltinKind::*;
        let info = match kind {
            Int8 | Int16 | Int32 | Int64 | Uint8 | Uint16 | Uint32 | Uint64 => {
                let domain = kind.int_domain().unwrap_or(DECIMAL64_DOMAIN);
                let base_range = base.and_then(|b| b.range().cloned());
                let range = self.compile_range(stmt, "range", BoundKind::Integer, base_range, domain)?;
                TypeInfo::Int { range }
            }
            Decimal64 => self.restrict_decimal64(base, stmt)?,
            String => {
                let base_length = base.and_then(|b| b.length().cloned());
                let length =
                    self.compile_range(stmt, "length", BoundKind::Integer, base_length, LENGTH_DOMAIN)?;
                let mut patterns = match base.map(|b| &b.info) {
                    Some(TypeInfo::String { patterns, .. }) => patterns.clone(),
                    _ => Vec::new(),
                };
                for p in stmt.find_all("pattern") {
                    patterns.push(Arc::new(self.compile_pattern(p, sc)?));
                }
                TypeInfo::String { length, patterns }
            }
            Binary => {
                let base_length = base.and_then(|b| b.length().cloned());
                let length =
                    self.compile_range(stmt, "length", BoundKind::Integer, base_length, LENGTH_DOMAIN)?;
                TypeInfo::Binary { length }
            }
            Enumeration => self.restrict_enumeration(base, stmt, sc)?,
            Bits => self.restrict_bits(base, stmt, sc)?,
            Leafref => self.restrict_leafref(base, stmt, sc)?,
            Identityref => self.restrict_identityref(base, stmt, sc)?,
            InstanceIdentifier => {
                let inherited = match base.map(|b| &b.info) {
                    Some(TypeInfo::InstanceIdentifier { require_instance }) => *require_instance,
                    _ => true,
                };
                let require_instance = match stmt.find("require-instance") {
                    Some(r) => parse_bool_arg(r)?,
                    None => inherited,
                };
                TypeInfo::InstanceIdentifier { require_instance }
            }
            Union => match base {
                Some(b) => {
                    if stmt.find("type").is_some() {
                        return Err(SchemaError::syntax(
                            "A derived union cannot add member types",
                        )
                        .with_position(stmt.position));
                    }
                    b.info.clone()
                }
                None => {
                    let mut members = Vec::new();
                    for member in stmt.find_all("type") {
                        match self.compile_type(member, sc, None)? {
                            TypeOutcome::Ready(ty) => {
                                if sc.version == YangVersion::V1_0
                                    && (ty.base == BuiltinKind::Empty
                                        || ty.base == BuiltinKind::Leafref)
                                {
                                    return Err(SchemaError::constraint(format!(
                                        "Union member type '{}' is not allowed in YANG 1.0",
                                        ty.base
                                    ))
                                    .with_position(member.position));
                                }
                                members.push(ty);
                            }
                            TypeOutcome::Deferred(_) => return Ok(None),
                        }
                    }
                    if members.is_empty() {
                        return Err(SchemaError::syntax("Union requires at least one member type")
                            .with_position(stmt.position));
                    }
                    TypeInfo::Union { members }
                }
            },
            Boolean | Empty => TypeInfo::Plain,
        };
        Ok(Some(info))
    }

    fn compile_range(
        &self,
        stmt: &Statement,
        keyword: &str,
        bound: BoundKind,
        base: Option<Restriction>,
        domain: (i128, i128),
    ) -> Result<Option<Restriction>, SchemaError> {
        match stmt.find(keyword) {
            Some(r) => {
                let against = base.clone().unwrap_or_else(|| Restriction::domain(domain));
                let compiled = compile_restriction(r.arg(), bound, &against)
                    .map_err(|e| e.with_position(r.position))?;
                Ok(Some(restriction_with_errors(compiled, r)))
            }
            None => Ok(base),
        }
    }

    fn compile_pattern(&self, stmt: &Statement, sc: &TypeScope) -> Result<Pattern, SchemaError> {
        let invert = match stmt.find("modifier") {
            Some(m) if sc.version == YangVersion::V1_0 => {
                return Err(SchemaError::syntax("'modifier' requires YANG 1.1")
                    .with_position(m.position))
            }
            Some(m) if m.arg() == "invert-match" => true,
            Some(m) => {
                return Err(SchemaError::syntax(format!("Invalid modifier '{}'", m.arg()))
                    .with_position(m.position))
            }
            None => false,
        };
        let mut pattern = Pattern::new(stmt.arg(), invert).map_err(|e| e.with_position(stmt.position))?;
        pattern.error_message = stmt.find_arg("error-message").map(str::to_string);
        pattern.error_app_tag = stmt.find_arg("error-app-tag").map(str::to_string);
        Ok(pattern)
    }

    fn restrict_decimal64(&self, base: Option<&Type>, stmt: &Statement) -> Result<TypeInfo, SchemaError> {
        let fraction_digits = match (base.map(|b| &b.info), stmt.find("fraction-digits")) {
            (None, Some(fd)) => match fd.arg().parse::<u8>() {
                Ok(d) if (1..=18).contains(&d) => d,
                _ => {
                    return Err(SchemaError::syntax(format!(
                        "Invalid fraction-digits '{}', must be 1..18",
                        fd.arg()
                    ))
                    .with_position(fd.position))
                }
            },
            (None, None) => {
                return Err(SchemaError::syntax("Type decimal64 requires 'fraction-digits'")
                    .with_position(stmt.position))
            }
            (Some(_), Some(fd)) => {
                return Err(SchemaError::constraint(
                    "fraction-digits can only be set on a type derived directly from decimal64",
                )
                .with_position(fd.position))
            }
            (Some(TypeInfo::Decimal64 { fraction_digits, .. }), None) => *fraction_digits,
            (Some(_), None) => {
                return Err(SchemaError::constraint("Base type is not decimal64")
                    .with_position(stmt.position))
            }
        };
        let base_range = base.and_then(|b| b.range().cloned());
        let range = self.compile_range(
            stmt,
            "range",
            BoundKind::Decimal(fraction_digits),
            base_range,
            DECIMAL64_DOMAIN,
        )?;
        Ok(TypeInfo::Decimal64 {
            fraction_digits,
            range,
        })
    }

    fn restrict_enumeration(
        &self,
        base: Option<&Type>,
        stmt: &Statement,
        sc: &TypeScope,
    ) -> Result<TypeInfo, SchemaError> {
        let base_enums = match base.map(|b| &b.info) {
            Some(TypeInfo::Enumeration { enums }) => Some(enums),
            _ => None,
        };
        let stmts: Vec<&Statement> = stmt.find_all("enum").collect();

        let Some(base_enums) = base_enums else {
            if stmts.is_empty() {
                return Err(SchemaError::syntax("Type enumeration requires at least one 'enum'")
                    .with_position(stmt.position));
            }
            let mut enums: Vec<EnumItem> = Vec::new();
            let mut highest: Option<i32> = None;
            for e in stmts {
                let name = e.arg();
                if name.is_empty() || name.trim() != name {
                    return Err(SchemaError::syntax(format!("Invalid enum name '{}'", name))
                        .with_position(e.position));
                }
                if enums.iter().any(|x| x.name == name) {
                    return Err(SchemaError::duplicate(format!("Duplicate enum '{}'", name))
                        .with_position(e.position));
                }
                let value = match e.find("value") {
                    Some(v) => parse_integer(v.arg())
                        .and_then(|n| i32::try_from(n).ok())
                        .ok_or_else(|| {
                            SchemaError::syntax(format!("Invalid enum value '{}'", v.arg()))
                                .with_position(v.position)
                        })?,
                    None => match highest {
                        None => 0,
                        Some(i32::MAX) => {
                            return Err(SchemaError::constraint(format!(
                                "Enum '{}' cannot be assigned a value above {}",
                                name,
                                i32::MAX
                            ))
                            .with_position(e.position))
                        }
                        Some(h) => h + 1,
                    },
                };
                if enums.iter().any(|x| x.value == value) {
                    return Err(SchemaError::duplicate(format!(
                        "Duplicate value {} of enum '{}'",
                        value, name
                    ))
                    .with_position(e.position));
                }
                highest = Some(highest.map_or(value, |h| h.max(value)));
                let status = match e.find("status") {
                    Some(s) => Status::from_str(s.arg())?,
                    None => Status::Current,
                };
                enums.push(EnumItem {
                    name: name.to_string(),
                    value,
                    status,
                });
            }
            return Ok(TypeInfo::Enumeration { enums });
        };

        if stmts.is_empty() {
            return Ok(TypeInfo::Enumeration {
                enums: base_enums.clone(),
            });
        }
        if sc.version == YangVersion::V1_0 {
            return Err(SchemaError::constraint(
                "Restricting an enumeration requires YANG 1.1",
            )
            .with_position(stmt.position));
        }
        let mut enums = Vec::new();
        for e in stmts {
            let Some(inherited) = base_enums.iter().find(|x| x.name == e.arg()) else {
                return Err(SchemaError::constraint(format!(
                    "Enum '{}' is not defined in the base type",
                    e.arg()
                ))
                .with_position(e.position));
            };
            if let Some(v) = e.find("value") {
                if parse_integer(v.arg()) != Some(i128::from(inherited.value)) {
                    return Err(SchemaError::constraint(format!(
                        "Enum '{}' must keep value {} of the base type",
                        e.arg(),
                        inherited.value
                    ))
                    .with_position(v.position));
                }
            }
            enums.push(inherited.clone());
        }
        Ok(TypeInfo::Enumeration { enums })
    }

    fn restrict_bits(
        &self,
        base: Option<&Type>,
        stmt: &Statement,
        sc: &TypeScope,
    ) -> Result<TypeInfo, SchemaError> {
        let base_bits = match base.map(|b| &b.info) {
            Some(TypeInfo::Bits { bits }) => Some(bits),
            _ => None,
        };
        let stmts: Vec<&Statement> = stmt.find_all("bit").collect();

        let Some(base_bits) = base_bits else {
            if stmts.is_empty() {
                return Err(SchemaError::syntax("Type bits requires at least one 'bit'")
                    .with_position(stmt.position));
            }
            let mut bits: Vec<BitItem> = Vec::new();
            let mut highest: Option<u32> = None;
            for b in stmts {
                let name = b.arg();
                crate::names::validate_identifier(name).map_err(|e| e.with_position(b.position))?;
                if bits.iter().any(|x| x.name == name) {
                    return Err(SchemaError::duplicate(format!("Duplicate bit '{}'", name))
                        .with_position(b.position));
                }
                let position = match b.find("position") {
                    Some(p) => parse_integer(p.arg())
                        .and_then(|n| u32::try_from(n).ok())
                        .ok_or_else(|| {
                            SchemaError::syntax(format!("Invalid bit position '{}'", p.arg()))
                                .with_position(p.position)
                        })?,
                    None => match highest {
                        None => 0,
                        Some(u32::MAX) => {
                            return Err(SchemaError::constraint(format!(
                                "Bit '{}' cannot be assigned a position above {}",
                                name,
                                u32::MAX
                            ))
                            .with_position(b.position))
                        }
                        Some(h) => h + 1,
                    },
                };
                if bits.iter().any(|x| x.position == position) {
                    return Err(SchemaError::duplicate(format!(
                        "Duplicate position {} of bit '{}'",
                        position, name
                    ))
                    .with_position(b.position));
                }
                highest = Some(highest.map_or(position, |h| h.max(position)));
                let status = match b.find("status") {
                    Some(s) => Status::from_str(s.arg())?,
                    None => Status::Current,
                };
                bits.push(BitItem {
                    name: name.to_string(),
                    position,
                    status,
                });
            }
            bits.sort_by_key(|b| b.position);
            return Ok(TypeInfo::Bits { bits });
        };

        if stmts.is_empty() {
            return Ok(TypeInfo::Bits {
                bits: base_bits.clone(),
            });
        }
        if sc.version == YangVersion::V1_0 {
            return Err(SchemaError::constraint("Restricting bits requires YANG 1.1")
                .with_position(stmt.position));
        }
        let mut bits = Vec::new();
        for b in stmts {
            let Some(inherited) = base_bits.iter().find(|x| x.name == b.arg()) else {
                return Err(SchemaError::constraint(format!(
                    "Bit '{}' is not defined in the base type",
                    b.arg()
                ))
                .with_position(b.position));
            };
            if let Some(p) = b.find("position") {
                if parse_integer(p.arg()) != Some(i128::from(inherited.position)) {
                    return Err(SchemaError::constraint(format!(
                        "Bit '{}' must keep position {} of the base type",
                        b.arg(),
                        inherited.position
                    ))
                    .with_position(p.position));
                }
            }
            bits.push(inherited.clone());
        }
        bits.sort_by_key(|b| b.position);
        Ok(TypeInfo::Bits { bits })
    }

    fn restrict_leafref(
        &self,
        base: Option<&Type>,
        stmt: &Statement,
        sc: &TypeScope,
    ) -> Result<TypeInfo, SchemaError> {
        let require_stmt = stmt.find("require-instance");
        if let Some(r) = require_stmt {
            if sc.version == YangVersion::V1_0 {
                return Err(SchemaError::syntax("'require-instance' on leafref requires YANG 1.1")
                    .with_position(r.position));
            }
        }
        match base.map(|b| &b.info) {
            Some(TypeInfo::Leafref {
                path,
                require_instance,
            }) => {
                if let Some(p) = stmt.find("path") {
                    return Err(SchemaError::syntax(
                        "'path' can only be set on a type derived directly from leafref",
                    )
                    .with_position(p.position));
                }
                let require_instance = match require_stmt {
                    Some(r) => parse_bool_arg(r)?,
                    None => *require_instance,
                };
                Ok(TypeInfo::Leafref {
                    path: path.clone(),
                    require_instance,
                })
            }
            _ => {
                let Some(p) = stmt.find("path") else {
                    return Err(SchemaError::syntax("Type leafref requires 'path'")
                        .with_position(stmt.position));
                };
                let path = self
                    .parse_leafref_path(p.arg(), sc.unit)
                    .map_err(|e| e.with_position(p.position))?;
                let require_instance = match require_stmt {
                    Some(r) => parse_bool_arg(r)?,
                    None => true,
                };
                Ok(TypeInfo::Leafref {
                    path: Arc::new(path),
                    require_instance,
                })
            }
        }
    }

    fn restrict_identityref(
        &self,
        base: Option<&Type>,
        stmt: &Statement,
        sc: &TypeScope,
    ) -> Result<TypeInfo, SchemaError> {
        let base_stmts: Vec<&Statement> = stmt.find_all("base").collect();
        if let Some(TypeInfo::Identityref { bases }) = base.map(|b| &b.info) {
            if let Some(b) = base_stmts.first() {
                return Err(SchemaError::syntax(
                    "'base' can only be set on a type derived directly from identityref",
                )
                .with_position(b.position));
            }
            return Ok(TypeInfo::Identityref {
                bases: bases.clone(),
            });
        }
        if base_stmts.is_empty() {
            return Err(SchemaError::syntax("Type identityref requires 'base'")
                .with_position(stmt.position));
        }
        if base_stmts.len() > 1 && sc.version == YangVersion::V1_0 {
            return Err(SchemaError::syntax("Multiple 'base' statements require YANG 1.1")
                .with_position(base_stmts[1].position));
        }
        let mut bases: Vec<IdentityId> = Vec::new();
        for b in base_stmts {
            let id = self
                .find_identity_ref(sc.unit, b.arg())
                .map_err(|e| e.with_position(b.position))?;
            let identity = self.identity(id);
            if !sc.status.may_reference(identity.status) {
                return Err(SchemaError::constraint(format!(
                    "A {} definition references {} identity '{}'",
                    sc.status, identity.status, identity.name
                ))
                .with_position(b.position));
            }
            bases.push(id);
        }
        Ok(TypeInfo::Identityref { bases })
    }

    // =========================================================================
    // Leafref paths
    // =========================================================================

    /// Parse a leafref `path` argument, resolving prefixes in `unit`
    pub(crate) fn parse_leafref_path(&self, text: &str, unit: Unit) -> Result<LeafrefPath, SchemaError> {
        let mut parser = PathParser {
            ctx: self,
            unit,
            text,
            chars: text.chars().collect(),
            pos: 0,
        };
        let (absolute, up, steps) = parser.parse()?;
        let expr = self
            .xpath()
            .parse(text, &self.namespace_map(unit))
            .map_err(|e| SchemaError::syntax(format!("Invalid leafref path '{}': {}", text, e)))?;
        Ok(LeafrefPath {
            text: text.to_string(),
            absolute,
            up,
            steps,
            expr,
        })
    }
}

struct PathParser<'a> {
    ctx: &'a Context,
    unit: Unit,
    text: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl PathParser<'_> {
    fn error(&self) -> SchemaError {
        SchemaError::syntax(format!(
            "Invalid leafref path '{}' at offset {}",
            self.text, self.pos
        ))
    }

    fn skip_ws(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos].is_whitespace() {
            self.pos += 1;
        }
    }

    fn eat(&mut self, s: &str) -> bool {
        let n = s.chars().count();
        if self.pos + n <= self.chars.len()
            && self.chars[self.pos..self.pos + n].iter().copied().eq(s.chars())
        {
            self.pos += n;
            true
        } else {
            false
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn node_identifier(&mut self) -> Result<PathName, SchemaError> {
        let start = self.pos;
        while self.pos < self.chars.len() {
            let c = self.chars[self.pos];
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        if word.is_empty() || !crate::names::is_valid_prefixed(&word) {
            return Err(self.error());
        }
        let (prefix, local) = split_prefixed(&word);
        let module = match prefix {
            Some(p) => Some(self.ctx.prefix_module(self.unit, Some(p))?),
            None => None,
        };
        Ok(PathName {
            module,
            name: local.to_string(),
        })
    }

    fn predicate(&mut self) -> Result<PathPredicate, SchemaError> {
        self.skip_ws();
        let key = self.node_identifier()?;
        self.skip_ws();
        if !self.eat("=") {
            return Err(self.error());
        }
        self.skip_ws();
        if !self.eat("current") {
            return Err(self.error());
        }
        self.skip_ws();
        if !self.eat("(") {
            return Err(self.error());
        }
        self.skip_ws();
        if !self.eat(")") {
            return Err(self.error());
        }
        self.skip_ws();
        if !self.eat("/") {
            return Err(self.error());
        }
        let mut up = 0;
        loop {
            self.skip_ws();
            if self.eat("..") {
                up += 1;
                self.skip_ws();
                if !self.eat("/") {
                    return Err(self.error());
                }
            } else {
                break;
            }
        }
        if up == 0 {
            return Err(self.error());
        }
        let mut steps = Vec::new();
        loop {
            self.skip_ws();
            steps.push(self.node_identifier()?);
            self.skip_ws();
            if !self.eat("/") {
                break;
            }
        }
        self.skip_ws();
        if !self.eat("]") {
            return Err(self.error());
        }
        Ok(PathPredicate { key, up, steps })
    }

    fn step(&mut self) -> Result<PathStep, SchemaError> {
        let node = self.node_identifier()?;
        let mut predicates = Vec::new();
        while self.eat("[") {
            predicates.push(self.predicate()?);
        }
        Ok(PathStep { node, predicates })
    }

    fn parse(&mut self) -> Result<(bool, usize, Vec<PathStep>), SchemaError> {
        self.skip_ws();
        let mut steps = Vec::new();
        let mut up = 0;
        let absolute = self.chars.get(self.pos) == Some(&'/');
        if absolute {
            while self.eat("/") {
                steps.push(self.step()?);
            }
        } else {
            while self.eat("..") {
                up += 1;
                if !self.eat("/") {
                    return Err(self.error());
                }
            }
            if up == 0 {
                return Err(self.error());
            }
            steps.push(self.step()?);
            while self.eat("/") {
                steps.push(self.step()?);
            }
        }
        self.skip_ws();
        if !self.at_end() || steps.is_empty() {
            return Err(self.error());
        }
        Ok((absolute, up, steps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::ids::ModuleId;

    fn load(text: &str) -> (Context, ModuleId) {
        let mut ctx = Context::new();
        let m = ctx.load_yang_str(text).unwrap();
        (ctx, m)
    }

    fn leaf_type(ctx: &Context, path: &str) -> Arc<Type> {
        let id = ctx.find_path(path).unwrap();
        ctx.node(id).leaf_type().cloned().unwrap()
    }

    fn fails(text: &str) -> ErrorKind {
        let mut ctx = Context::new();
        ctx.load_yang_str(text).unwrap_err().schema_kind().unwrap()
    }

    #[test]
    fn test_enum_values_assigned() {
        let (ctx, _) = load(
            "module m { namespace urn:m; prefix m;
               leaf e { type enumeration { enum a; enum b { value 10; } enum c; } } }",
        );
        let ty = leaf_type(&ctx, "/m:e");
        let TypeInfo::Enumeration { enums } = &ty.info else {
            panic!("expected an enumeration");
        };
        let values: Vec<(&str, i32)> = enums.iter().map(|e| (e.name.as_str(), e.value)).collect();
        assert_eq!(values, vec![("a", 0), ("b", 10), ("c", 11)]);
    }

    #[test]
    fn test_enum_value_overflow() {
        let kind = fails(
            "module m { namespace urn:m; prefix m;
               leaf e { type enumeration { enum a { value 2147483647; } enum b; } } }",
        );
        assert_eq!(kind, ErrorKind::ConstraintViolation);
    }

    #[test]
    fn test_derived_enum_cannot_add() {
        let kind = fails(
            "module m { yang-version 1.1; namespace urn:m; prefix m;
               typedef t { type enumeration { enum a; enum b; } }
               leaf e { type t { enum c; } } }",
        );
        assert_eq!(kind, ErrorKind::ConstraintViolation);
    }

    #[test]
    fn test_bits_sorted_by_position() {
        let (ctx, _) = load(
            "module m { namespace urn:m; prefix m;
               leaf b { type bits { bit x { position 4; } bit y { position 1; } bit z; } } }",
        );
        let ty = leaf_type(&ctx, "/m:b");
        let TypeInfo::Bits { bits } = &ty.info else {
            panic!("expected bits");
        };
        let positions: Vec<(&str, u32)> = bits.iter().map(|b| (b.name.as_str(), b.position)).collect();
        assert_eq!(positions, vec![("y", 1), ("x", 4), ("z", 5)]);
    }

    #[test]
    fn test_decimal64_fraction_digits() {
        let (ctx, _) = load(
            "module m { namespace urn:m; prefix m;
               typedef money { type decimal64 { fraction-digits 2; range \"1.5..2.25\"; } }
               leaf d { type money; } }",
        );
        let ty = leaf_type(&ctx, "/m:d");
        let TypeInfo::Decimal64 { fraction_digits, range } = &ty.info else {
            panic!("expected decimal64");
        };
        assert_eq!(*fraction_digits, 2);
        let range = range.as_ref().unwrap();
        assert!(range.contains(150) && range.contains(225));
        assert!(!range.contains(226));

        assert_eq!(
            fails("module m { namespace urn:m; prefix m; leaf d { type decimal64; } }"),
            ErrorKind::SyntaxViolation
        );
        assert_eq!(
            fails(
                "module m { namespace urn:m; prefix m;
                   typedef t { type decimal64 { fraction-digits 2; } }
                   leaf d { type t { fraction-digits 3; } } }"
            ),
            ErrorKind::ConstraintViolation
        );
    }

    #[test]
    fn test_union_forward_reference() {
        let (ctx, _) = load(
            "module m { namespace urn:m; prefix m;
               typedef u { type union { type later; type int8; } }
               typedef later { type string { length 1..3; } }
               leaf l { type u; } }",
        );
        let ty = leaf_type(&ctx, "/m:l");
        let TypeInfo::Union { members } = &ty.info else {
            panic!("expected a union");
        };
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].base, BuiltinKind::String);
        assert_eq!(members[1].base, BuiltinKind::Int8);
    }

    #[test]
    fn test_union_empty_member_in_yang_1_0() {
        let kind = fails(
            "module m { namespace urn:m; prefix m;
               leaf l { type union { type empty; type int8; } } }",
        );
        assert_eq!(kind, ErrorKind::ConstraintViolation);
    }

    #[test]
    fn test_restriction_not_allowed() {
        let kind = fails(
            "module m { namespace urn:m; prefix m; leaf l { type boolean { range 1..2; } } }",
        );
        assert_eq!(kind, ErrorKind::SyntaxViolation);
    }

    #[test]
    fn test_unknown_type() {
        let kind = fails("module m { namespace urn:m; prefix m; leaf l { type nope; } }");
        assert_eq!(kind, ErrorKind::UnresolvedReference);
    }

    #[test]
    fn test_obsolete_typedef_reference() {
        let text = |status: &str| {
            format!(
                "module m {{ namespace urn:m; prefix m;
                   typedef old {{ type string; status obsolete; }}
                   leaf l {{ type old; status {}; }} }}",
                status
            )
        };
        assert_eq!(fails(&text("current")), ErrorKind::ConstraintViolation);
        assert_eq!(fails(&text("deprecated")), ErrorKind::ConstraintViolation);
        let mut ctx = Context::new();
        assert!(ctx.load_yang_str(&text("obsolete")).is_ok());
    }

    #[test]
    fn test_leafref_requires_path() {
        let kind = fails("module m { namespace urn:m; prefix m; leaf l { type leafref; } }");
        assert_eq!(kind, ErrorKind::SyntaxViolation);
    }
}
