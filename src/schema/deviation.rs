//! Deviation application
//!
//! Deviations rewrite nodes of other modules: `not-supported` removes the
//! target, `add`, `delete` and `replace` edit individual properties.

use std::fmt;

use indexmap::{IndexMap, IndexSet};

use crate::error::SchemaError;
use crate::ids::{ModuleId, NodeId};
use crate::statement::Statement;

use super::node::{NodeKind, UniqueSpec};
use super::typecomp::{parse_bool_arg, TypeOutcome, TypeScope};
use super::{Context, Deviation, NodeTypes, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviateOp {
    Add,
    Delete,
    Replace,
}

impl DeviateOp {
    fn parse(stmt: &Statement) -> Result<Self, SchemaError> {
        match stmt.arg() {
            "add" => Ok(DeviateOp::Add),
            "delete" => Ok(DeviateOp::Delete),
            "replace" => Ok(DeviateOp::Replace),
            other => Err(SchemaError::syntax(format!("Invalid deviate '{}'", other))
                .with_position(stmt.position)),
        }
    }

    fn properties(&self) -> &'static [&'static str] {
        match self {
            DeviateOp::Add => &[
                "units", "must", "unique", "default", "config", "mandatory", "min-elements",
                "max-elements",
            ],
            DeviateOp::Delete => &["units", "must", "unique", "default"],
            DeviateOp::Replace => &[
                "type", "units", "default", "config", "mandatory", "min-elements", "max-elements",
            ],
        }
    }
}

impl fmt::Display for DeviateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviateOp::Add => "add",
            DeviateOp::Delete => "delete",
            DeviateOp::Replace => "replace",
        })
    }
}

/// Node kinds carrying a deviable property
fn property_targets(keyword: &str) -> NodeTypes {
    match keyword {
        "units" | "type" => NodeTypes::LEAF | NodeTypes::LEAF_LIST,
        "must" => {
            NodeTypes::CONTAINER
                | NodeTypes::LEAF
                | NodeTypes::LEAF_LIST
                | NodeTypes::LIST
                | NodeTypes::ANYDATA
                | NodeTypes::INPUT
                | NodeTypes::OUTPUT
                | NodeTypes::NOTIFICATION
        }
        "unique" => NodeTypes::LIST,
        "default" => NodeTypes::LEAF | NodeTypes::LEAF_LIST | NodeTypes::CHOICE,
        "config" => {
            NodeTypes::CONTAINER
                | NodeTypes::LEAF
                | NodeTypes::LEAF_LIST
                | NodeTypes::LIST
                | NodeTypes::CHOICE
                | NodeTypes::ANYDATA
        }
        "mandatory" => NodeTypes::LEAF | NodeTypes::CHOICE | NodeTypes::ANYDATA,
        "min-elements" | "max-elements" => NodeTypes::LIST | NodeTypes::LEAF_LIST,
        _ => NodeTypes::NONE,
    }
}

impl Context {
    /// Apply the deviations of a module
    ///
    /// Returns the modules whose trees were changed.
    pub(crate) fn apply_deviations(&mut self, module: ModuleId) -> Result<IndexSet<ModuleId>, SchemaError> {
        let mut touched = IndexSet::new();
        let deviations = self.module(module).deviations.clone();
        for (index, dev) in deviations.iter().enumerate() {
            if dev.target_node.is_some() {
                continue;
            }
            let position = dev.stmt.position;
            if !dev.target.starts_with('/') {
                return Err(SchemaError::syntax(format!(
                    "Deviation target '{}' must be an absolute path",
                    dev.target
                ))
                .with_position(position));
            }
            let target = self
                .resolve_schema_nodeid(&dev.target, dev.unit, None, true)
                .map_err(|e| e.with_position(position))?;
            let target_module = self.node(target).module;
            if target_module == module {
                return Err(SchemaError::constraint(format!(
                    "Module '{}' cannot deviate its own node '{}'",
                    self.module(module).name,
                    dev.target
                ))
                .with_position(position));
            }
            self.module_mut(module).deviations[index].target_node = Some(target);

            let deviates: Vec<&Statement> = dev.stmt.find_all("deviate").collect();
            if deviates.is_empty() {
                return Err(SchemaError::syntax(format!(
                    "Deviation '{}' has no deviate statement",
                    dev.target
                ))
                .with_position(position));
            }
            let not_supported = deviates.iter().any(|d| d.arg() == "not-supported");
            if not_supported && deviates.len() > 1 {
                return Err(SchemaError::syntax(format!(
                    "deviate not-supported must be the only deviate of '{}'",
                    dev.target
                ))
                .with_position(position));
            }

            let by = self.module(module).name.clone();
            if self.node(target).removed {
                self.warn(format!(
                    "Deviation of '{}' by module '{}' ignored: the node is not supported",
                    dev.target, by
                ));
                continue;
            }
            if not_supported {
                let earlier: Vec<String> = self
                    .node(target)
                    .deviated_by
                    .iter()
                    .filter(|m| **m != module)
                    .map(|m| self.module(*m).name.clone())
                    .collect();
                if !earlier.is_empty() {
                    self.warn(format!(
                        "Node '{}' deviated by '{}' is removed as not-supported by '{}'",
                        dev.target,
                        earlier.join(", "),
                        by
                    ));
                }
                let node = self.node_mut(target);
                node.removed = true;
                node.deviated_by.push(module);
                touched.insert(target_module);
                tracing::debug!(target = %dev.target, module = %by, "node not supported");
                continue;
            }

            for deviate in deviates {
                let op = DeviateOp::parse(deviate)?;
                self.apply_deviate(dev, target, op, deviate)
                    .map_err(|e| e.with_path(self.node_path(target)))?;
            }
            self.node_mut(target).deviated_by.push(module);
            touched.insert(target_module);
            tracing::debug!(target = %dev.target, module = %by, "applied deviation");
        }
        Ok(touched)
    }

    fn apply_deviate(
        &mut self,
        dev: &Deviation,
        target: NodeId,
        op: DeviateOp,
        deviate: &Statement,
    ) -> Result<(), SchemaError> {
        let target_type = self.node(target).node_type();
        let keyword = self.node(target).kind.keyword();
        for prop in &deviate.children {
            if prop.is_extension() {
                continue;
            }
            if !op.properties().contains(&prop.keyword.as_str()) {
                return Err(SchemaError::syntax(format!(
                    "'{}' cannot be used with deviate {}",
                    prop.keyword, op
                ))
                .with_position(prop.position));
            }
            if !property_targets(&prop.keyword).contains(target_type) {
                return Err(SchemaError::incompatible(format!(
                    "Deviate {} of '{}' does not apply to a {}",
                    op, prop.keyword, keyword
                ))
                .with_position(prop.position));
            }
        }

        let mut musts = Vec::new();
        for m in deviate.find_all("must") {
            musts.push(self.compile_condition(dev.unit, m)?);
        }
        let new_type = match deviate.find("type") {
            Some(t) => {
                let scope = TypeScope {
                    unit: dev.unit,
                    scope: None,
                    status: Status::Current,
                    version: self.unit_version(dev.unit),
                };
                match self.compile_type(t, &scope, None)? {
                    TypeOutcome::Ready(ty) => Some(ty),
                    TypeOutcome::Deferred(_) => {
                        return Err(SchemaError::unresolved(format!(
                            "Type '{}' of deviation could not be resolved",
                            t.arg()
                        ))
                        .with_position(t.position))
                    }
                }
            }
            None => None,
        };

        let fail = |msg: String, stmt: &Statement| SchemaError::constraint(msg).with_position(stmt.position);
        let node = self.node_mut(target);
        for prop in &deviate.children {
            let value = prop.arg();
            match prop.keyword.as_str() {
                "units" => {
                    let units = match &mut node.kind {
                        NodeKind::Leaf(info) => &mut info.units,
                        NodeKind::LeafList(info) => &mut info.units,
                        _ => continue,
                    };
                    match op {
                        DeviateOp::Add if units.is_some() => {
                            return Err(fail("units already exists".into(), prop))
                        }
                        DeviateOp::Delete if units.as_deref() != Some(value) => {
                            return Err(fail(format!("units '{}' does not exist", value), prop))
                        }
                        DeviateOp::Replace if units.is_none() => {
                            return Err(fail("units to replace does not exist".into(), prop))
                        }
                        DeviateOp::Delete => *units = None,
                        _ => *units = Some(value.to_string()),
                    }
                }
                "must" => match op {
                    DeviateOp::Add => {
                        if node.musts.iter().any(|m| m.expr.text == value) {
                            return Err(fail(format!("must '{}' already exists", value), prop));
                        }
                    }
                    _ => {
                        let at = node
                            .musts
                            .iter()
                            .position(|m| m.expr.text == value)
                            .ok_or_else(|| fail(format!("must '{}' does not exist", value), prop))?;
                        node.musts.remove(at);
                    }
                },
                "unique" => {
                    let NodeKind::List(info) = &mut node.kind else {
                        continue;
                    };
                    let at = info.uniques.iter().position(|u| u.text == value);
                    match (op, at) {
                        (DeviateOp::Add, Some(_)) => {
                            return Err(fail(format!("unique '{}' already exists", value), prop))
                        }
                        (DeviateOp::Add, None) => info.uniques.push(UniqueSpec {
                            text: value.to_string(),
                            leaves: Vec::new(),
                        }),
                        (_, Some(i)) => {
                            info.uniques.remove(i);
                        }
                        (_, None) => {
                            return Err(fail(format!("unique '{}' does not exist", value), prop))
                        }
                    }
                }
                "default" => match &mut node.kind {
                    NodeKind::Leaf(info) => match op {
                        DeviateOp::Add if info.default.is_some() => {
                            return Err(fail("default already exists".into(), prop))
                        }
                        DeviateOp::Delete if info.default.as_deref() != Some(value) => {
                            return Err(fail(format!("default '{}' does not exist", value), prop))
                        }
                        DeviateOp::Replace if info.default.is_none() => {
                            return Err(fail("default to replace does not exist".into(), prop))
                        }
                        DeviateOp::Delete => info.default = None,
                        _ => info.default = Some(value.to_string()),
                    },
                    NodeKind::LeafList(info) => {
                        let at = info.defaults.iter().position(|d| d == value);
                        match (op, at) {
                            (DeviateOp::Add, Some(_)) => {
                                return Err(fail(format!("default '{}' already exists", value), prop))
                            }
                            (DeviateOp::Add, None) => info.defaults.push(value.to_string()),
                            (DeviateOp::Delete, Some(i)) => {
                                info.defaults.remove(i);
                            }
                            (DeviateOp::Delete, None) => {
                                return Err(fail(format!("default '{}' does not exist", value), prop))
                            }
                            (DeviateOp::Replace, _) if info.defaults.is_empty() => {
                                return Err(fail("default to replace does not exist".into(), prop))
                            }
                            (DeviateOp::Replace, _) => {
                                info.defaults = deviate
                                    .find_all("default")
                                    .map(|d| d.arg().to_string())
                                    .collect();
                            }
                        }
                    }
                    NodeKind::Choice {
                        default,
                        default_case,
                    } => {
                        match op {
                            DeviateOp::Add if default.is_some() => {
                                return Err(fail("default already exists".into(), prop))
                            }
                            DeviateOp::Delete if default.as_deref() != Some(value) => {
                                return Err(fail(format!("default '{}' does not exist", value), prop))
                            }
                            DeviateOp::Replace if default.is_none() => {
                                return Err(fail("default to replace does not exist".into(), prop))
                            }
                            DeviateOp::Delete => *default = None,
                            _ => *default = Some(value.to_string()),
                        }
                        *default_case = None;
                    }
                    _ => {}
                },
                "config" => {
                    match op {
                        DeviateOp::Add if node.flags.config_set => {
                            return Err(fail("config already exists".into(), prop))
                        }
                        DeviateOp::Replace if !node.flags.config_set => {
                            return Err(fail("config to replace does not exist".into(), prop))
                        }
                        _ => {}
                    }
                    node.flags.config_set = true;
                    node.flags.config = parse_bool_arg(prop)?;
                }
                "mandatory" => {
                    match op {
                        DeviateOp::Add if node.flags.mandatory_set => {
                            return Err(fail("mandatory already exists".into(), prop))
                        }
                        DeviateOp::Replace if !node.flags.mandatory_set => {
                            return Err(fail("mandatory to replace does not exist".into(), prop))
                        }
                        _ => {}
                    }
                    node.flags.mandatory_set = true;
                    node.flags.mandatory = parse_bool_arg(prop)?;
                }
                "min-elements" | "max-elements" => {
                    let (min, max) = match &mut node.kind {
                        NodeKind::List(info) => (&mut info.min_elements, &mut info.max_elements),
                        NodeKind::LeafList(info) => (&mut info.min_elements, &mut info.max_elements),
                        _ => continue,
                    };
                    if prop.keyword == "min-elements" {
                        match op {
                            DeviateOp::Add if node.flags.min_set => {
                                return Err(fail("min-elements already exists".into(), prop))
                            }
                            DeviateOp::Replace if !node.flags.min_set => {
                                return Err(fail("min-elements to replace does not exist".into(), prop))
                            }
                            _ => {}
                        }
                        node.flags.min_set = true;
                        *min = value.parse().map_err(|_| {
                            SchemaError::syntax(format!("Invalid min-elements '{}'", value))
                                .with_position(prop.position)
                        })?;
                    } else {
                        match op {
                            DeviateOp::Add if node.flags.max_set => {
                                return Err(fail("max-elements already exists".into(), prop))
                            }
                            DeviateOp::Replace if !node.flags.max_set => {
                                return Err(fail("max-elements to replace does not exist".into(), prop))
                            }
                            _ => {}
                        }
                        node.flags.max_set = true;
                        *max = match value {
                            "unbounded" => None,
                            v => match v.parse::<u32>() {
                                Ok(n) if n > 0 => Some(n),
                                _ => {
                                    return Err(SchemaError::syntax(format!(
                                        "Invalid max-elements '{}'",
                                        value
                                    ))
                                    .with_position(prop.position))
                                }
                            },
                        };
                    }
                }
                "type" => {
                    let ty = new_type.clone();
                    match &mut node.kind {
                        NodeKind::Leaf(info) => {
                            info.ty = ty;
                            info.leafref_targets = IndexMap::new();
                        }
                        NodeKind::LeafList(info) => {
                            info.ty = ty;
                            info.leafref_targets = IndexMap::new();
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
        node.musts.extend(musts.into_iter().filter(|_| op == DeviateOp::Add));
        self.check_node_constraints(target)
            .map_err(|e| e.with_position(deviate.position))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::BuiltinKind;

    const BASE: &str = "module a { namespace urn:a; prefix a;
        leaf x { type string; }
        leaf n { type int32; }
        list l { key k; leaf k { type string; } }
        leaf-list ll { type string; max-elements 5; } }";

    fn setup() -> Context {
        let mut ctx = Context::new();
        ctx.add_source_str(BASE).unwrap();
        ctx
    }

    fn leaf_default(ctx: &Context, path: &str) -> Option<String> {
        let id = ctx.find_path(path).unwrap();
        match &ctx.node(id).kind {
            NodeKind::Leaf(info) => info.default.clone(),
            _ => None,
        }
    }

    #[test]
    fn test_not_supported() {
        let mut ctx = setup();
        ctx.load_yang_str(
            "module d { namespace urn:d; prefix d; import a { prefix a; }
               deviation /a:x { deviate not-supported; } }",
        )
        .unwrap();
        assert!(ctx.find_path("/a:x").is_err());
        let a = ctx.module_by_name("a").unwrap();
        assert_eq!(ctx.top_level_data(a).count(), 3);
    }

    #[test]
    fn test_add_then_delete_restores() {
        let mut ctx = setup();
        ctx.load_yang_str(
            "module d1 { namespace urn:d1; prefix d1; import a { prefix a; }
               deviation /a:x { deviate add { default hello; } } }",
        )
        .unwrap();
        assert_eq!(leaf_default(&ctx, "/a:x").as_deref(), Some("hello"));
        ctx.load_yang_str(
            "module d2 { namespace urn:d2; prefix d2; import a { prefix a; }
               deviation /a:x { deviate delete { default hello; } } }",
        )
        .unwrap();
        assert_eq!(leaf_default(&ctx, "/a:x"), None);
    }

    #[test]
    fn test_add_existing_fails() {
        let mut ctx = setup();
        ctx.load_yang_str(
            "module d1 { namespace urn:d1; prefix d1; import a { prefix a; }
               deviation /a:x { deviate add { default hello; } } }",
        )
        .unwrap();
        let err = ctx
            .load_yang_str(
                "module d2 { namespace urn:d2; prefix d2; import a { prefix a; }
                   deviation /a:x { deviate add { default other; } } }",
            )
            .unwrap_err();
        assert_eq!(err.schema_kind(), Some(ErrorKind::ConstraintViolation));
    }

    #[test]
    fn test_replace_type() {
        let mut ctx = setup();
        ctx.load_yang_str(
            "module d { namespace urn:d; prefix d; import a { prefix a; }
               deviation /a:n { deviate replace { type uint8; } } }",
        )
        .unwrap();
        let n = ctx.find_path("/a:n").unwrap();
        assert_eq!(ctx.node(n).leaf_type().unwrap().base, BuiltinKind::Uint8);
    }

    #[test]
    fn test_invalid_property_and_target() {
        let mut ctx = setup();
        let err = ctx
            .load_yang_str(
                "module d { namespace urn:d; prefix d; import a { prefix a; }
                   deviation /a:x { deviate delete { config false; } } }",
            )
            .unwrap_err();
        assert_eq!(err.schema_kind(), Some(ErrorKind::SyntaxViolation));

        let err = ctx
            .load_yang_str(
                "module d { namespace urn:d; prefix d; import a { prefix a; }
                   deviation /a:x { deviate add { unique k; } } }",
            )
            .unwrap_err();
        assert_eq!(err.schema_kind(), Some(ErrorKind::IncompatibleTarget));
    }

    #[test]
    fn test_own_module_deviation_rejected() {
        let mut ctx = Context::new();
        let err = ctx
            .load_yang_str(
                "module s { namespace urn:s; prefix s; leaf x { type string; }
                   deviation /s:x { deviate not-supported; } }",
            )
            .unwrap_err();
        assert_eq!(err.schema_kind(), Some(ErrorKind::ConstraintViolation));
    }

    #[test]
    fn test_deviation_of_removed_node_warns() {
        let mut ctx = setup();
        ctx.load_yang_str(
            "module d1 { namespace urn:d1; prefix d1; import a { prefix a; }
               deviation /a:x { deviate not-supported; } }",
        )
        .unwrap();
        ctx.load_yang_str(
            "module d2 { namespace urn:d2; prefix d2; import a { prefix a; }
               deviation /a:x { deviate add { default v; } } }",
        )
        .unwrap();
        assert!(ctx.warnings().iter().any(|w| w.contains("not supported")));
    }

    #[test]
    fn test_replace_requires_existing_value() {
        let mut ctx = setup();
        for (target, property) in [
            ("x", "config false"),
            ("x", "mandatory true"),
            ("ll", "min-elements 2"),
            ("l", "max-elements 10"),
        ] {
            let err = ctx
                .load_yang_str(&format!(
                    "module d {{ namespace urn:d; prefix d; import a {{ prefix a; }}
                       deviation /a:{} {{ deviate replace {{ {}; }} }} }}",
                    target, property
                ))
                .unwrap_err();
            assert_eq!(err.schema_kind(), Some(ErrorKind::ConstraintViolation), "{}", property);
        }

        ctx.load_yang_str(
            "module d { namespace urn:d; prefix d; import a { prefix a; }
               deviation /a:ll { deviate replace { max-elements 10; } }
               deviation /a:x { deviate add { mandatory true; } } }",
        )
        .unwrap();
        let ll = ctx.find_path("/a:ll").unwrap();
        assert_eq!(ctx.node(ll).cardinality(), Some((0, Some(10))));
        ctx.load_yang_str(
            "module e { namespace urn:e; prefix e; import a { prefix a; }
               deviation /a:x { deviate replace { mandatory false; } } }",
        )
        .unwrap();
        let x = ctx.find_path("/a:x").unwrap();
        assert!(!ctx.node(x).flags.mandatory);
    }
}
