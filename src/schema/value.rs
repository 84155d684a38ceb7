//! Value validation against compiled types
//!
//! [`Context::check_value`] validates a lexical value and returns its
//! canonical form. It is used for schema defaults and for instance data.

use base64::Engine as _;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

use crate::ids::{ModuleId, NodeId};
use crate::names::split_prefixed;
use crate::plugins;
use crate::xpath::NamespaceMap;

use super::range::{parse_integer, parse_scaled_decimal};
use super::types::{BuiltinKind, Restriction, Type, TypeInfo, DECIMAL64_DOMAIN, LENGTH_DOMAIN};
use super::Context;

static QNAME_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_.\-]*):[A-Za-z_*]").unwrap());

/// Environment of a value check
pub struct ValueScope<'a> {
    /// Maps a prefix found in the value to a module
    pub prefixes: &'a dyn Fn(&str) -> Option<ModuleId>,
    /// Module of unprefixed identityref values
    pub default_module: ModuleId,
    /// Resolved leafref targets of the node holding the value
    pub leafref_targets: Option<&'a IndexMap<String, NodeId>>,
    /// Accept schema literal syntax (hexadecimal and octal integers)
    pub schema_literal: bool,
}

impl std::fmt::Debug for ValueScope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueScope")
            .field("default_module", &self.default_module)
            .field("schema_literal", &self.schema_literal)
            .finish()
    }
}

fn restriction_error(restriction: &Restriction, fallback: String) -> String {
    restriction.error_message.clone().unwrap_or(fallback)
}

fn parse_data_integer(value: &str) -> Option<i128> {
    let digits = value.strip_prefix(['-', '+']).unwrap_or(value);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse::<i128>().ok()
}

/// Canonical text of a scaled decimal64 value
pub fn format_decimal64(scaled: i128, fraction_digits: u8) -> String {
    match i64::try_from(scaled) {
        Ok(v) => {
            let d = Decimal::new(v, u32::from(fraction_digits)).normalize();
            if d.scale() == 0 {
                format!("{}.0", d)
            } else {
                d.to_string()
            }
        }
        Err(_) => scaled.to_string(),
    }
}

impl Context {
    /// Validate `value` against `ty`, returning its canonical form
    pub fn check_value(&self, ty: &Type, value: &str, scope: &ValueScope<'_>) -> Result<String, String> {
        let canonical = self.check_builtin(ty, value, scope)?;
        for typedef in ty.typedef_chain() {
            let td = self.typedef(typedef);
            if let Some(validator) = plugins::type_validator(&self.module(td.module).name, &td.name) {
                validator(&canonical)?;
            }
        }
        Ok(canonical)
    }

    fn check_builtin(&self, ty: &Type, value: &str, scope: &ValueScope<'_>) -> Result<String, String> {
        match &ty.info {
            TypeInfo::Int { range } => {
                let parsed = if scope.schema_literal {
                    parse_integer(value)
                } else {
                    parse_data_integer(value)
                };
                let n = parsed.ok_or_else(|| format!("Invalid {} value '{}'", ty.base, value))?;
                let domain = ty.base.int_domain().unwrap_or(DECIMAL64_DOMAIN);
                if n < domain.0 || n > domain.1 {
                    return Err(format!("Value '{}' is out of {} bounds", value, ty.base));
                }
                if let Some(r) = range {
                    if !r.contains(n) {
                        return Err(restriction_error(
                            r,
                            format!("Value '{}' does not satisfy the range '{}'", value, r.text),
                        ));
                    }
                }
                Ok(n.to_string())
            }
            TypeInfo::Decimal64 {
                fraction_digits,
                range,
            } => {
                let n = parse_scaled_decimal(value.trim(), *fraction_digits)
                    .ok_or_else(|| format!("Invalid decimal64 value '{}'", value))?;
                if n < DECIMAL64_DOMAIN.0 || n > DECIMAL64_DOMAIN.1 {
                    return Err(format!("Value '{}' is out of decimal64 bounds", value));
                }
                if let Some(r) = range {
                    if !r.contains(n) {
                        return Err(restriction_error(
                            r,
                            format!("Value '{}' does not satisfy the range '{}'", value, r.text),
                        ));
                    }
                }
                Ok(format_decimal64(n, *fraction_digits))
            }
            TypeInfo::String { length, patterns } => {
                let len = value.chars().count() as i128;
                if let Some(l) = length {
                    if !l.contains(len) {
                        return Err(restriction_error(
                            l,
                            format!("Length of '{}' does not satisfy '{}'", value, l.text),
                        ));
                    }
                }
                for p in patterns {
                    if !p.matches(value) {
                        return Err(p.error_message.clone().unwrap_or_else(|| {
                            format!("Value '{}' does not match pattern '{}'", value, p.text)
                        }));
                    }
                }
                Ok(value.to_string())
            }
            TypeInfo::Binary { length } => {
                let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(compact.as_bytes())
                    .map_err(|_| format!("Invalid base64 value '{}'", value))?;
                let len = bytes.len() as i128;
                let bounds = length.clone().unwrap_or_else(|| Restriction::domain(LENGTH_DOMAIN));
                if !bounds.contains(len) {
                    return Err(restriction_error(
                        &bounds,
                        format!("Binary length {} does not satisfy '{}'", len, bounds.text),
                    ));
                }
                Ok(compact)
            }
            TypeInfo::Enumeration { enums } => enums
                .iter()
                .find(|e| e.name == value)
                .map(|e| e.name.clone())
                .ok_or_else(|| format!("Invalid enumeration value '{}'", value)),
            TypeInfo::Bits { bits } => {
                let mut set: Vec<&super::types::BitItem> = Vec::new();
                for name in value.split_whitespace() {
                    let bit = bits
                        .iter()
                        .find(|b| b.name == name)
                        .ok_or_else(|| format!("Invalid bit '{}'", name))?;
                    if set.iter().any(|b| b.name == name) {
                        return Err(format!("Bit '{}' is set more than once", name));
                    }
                    set.push(bit);
                }
                set.sort_by_key(|b| b.position);
                Ok(set
                    .iter()
                    .map(|b| b.name.as_str())
                    .collect::<Vec<_>>()
                    .join(" "))
            }
            TypeInfo::Plain => match ty.base {
                BuiltinKind::Boolean => match value {
                    "true" | "false" => Ok(value.to_string()),
                    _ => Err(format!("Invalid boolean value '{}'", value)),
                },
                BuiltinKind::Empty => {
                    if value.is_empty() {
                        Ok(String::new())
                    } else {
                        Err(format!("Type empty cannot hold value '{}'", value))
                    }
                }
                _ => Ok(value.to_string()),
            },
            TypeInfo::Identityref { bases } => {
                let (prefix, local) = split_prefixed(value.trim());
                let module = match prefix {
                    Some(p) => (scope.prefixes)(p)
                        .ok_or_else(|| format!("Unknown prefix '{}' in identityref '{}'", p, value))?,
                    None => scope.default_module,
                };
                let id = self
                    .module(module)
                    .identities
                    .get(local)
                    .copied()
                    .ok_or_else(|| format!("Identity '{}' not found", value))?;
                if !bases.iter().any(|b| self.is_derived_from(id, *b)) {
                    return Err(format!(
                        "Identity '{}' is not derived from the required base",
                        value
                    ));
                }
                Ok(self.identity_name(id))
            }
            TypeInfo::InstanceIdentifier { .. } => {
                if !value.starts_with('/') {
                    return Err(format!("Invalid instance-identifier '{}'", value));
                }
                let mut namespaces = NamespaceMap::new();
                for cap in QNAME_PREFIX.captures_iter(value) {
                    let prefix = &cap[1];
                    let module = (scope.prefixes)(prefix).ok_or_else(|| {
                        format!("Unknown prefix '{}' in instance-identifier '{}'", prefix, value)
                    })?;
                    namespaces.insert(prefix.to_string(), self.module(module).name.clone());
                }
                self.xpath()
                    .parse(value, &namespaces)
                    .map_err(|e| format!("Invalid instance-identifier '{}': {}", value, e))?;
                Ok(value.to_string())
            }
            TypeInfo::Leafref { path, .. } => {
                let target = scope
                    .leafref_targets
                    .and_then(|targets| targets.get(&path.text))
                    .and_then(|id| self.node(*id).leaf_type());
                match target {
                    Some(target_ty) => self.check_value(target_ty, value, scope),
                    None => Ok(value.to_string()),
                }
            }
            TypeInfo::Union { members } => {
                let mut errors = Vec::new();
                for member in members {
                    match self.check_value(member, value, scope) {
                        Ok(canonical) => return Ok(canonical),
                        Err(e) => errors.push(e),
                    }
                }
                Err(format!(
                    "Value '{}' does not match any union member ({})",
                    value,
                    errors.join("; ")
                ))
            }
        }
    }
}
