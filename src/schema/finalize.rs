//! Finalization of a module's compiled tree
//!
//! Runs after uses expansion, and again for every module touched by
//! augments or deviations, so every step here recomputes its results from
//! scratch. Structure (config, keys, choice defaults, sibling names) is
//! settled in a first walk; leafref targets and default values, which may
//! depend on other subtrees, in a second.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::error::SchemaError;
use crate::ids::{ModuleId, NodeId};
use crate::names::split_prefixed;

use super::node::NodeKind;
use super::value::ValueScope;
use super::{BuiltinKind, Context, NodeTypes, YangVersion};

impl Context {
    /// Whether a node makes its parent's data mandatory
    pub(crate) fn is_mandatory_node(&self, id: NodeId) -> bool {
        let node = self.node(id);
        if node.removed {
            return false;
        }
        match &node.kind {
            NodeKind::Leaf(_) | NodeKind::Choice { .. } | NodeKind::AnyData { .. } => node.flags.mandatory,
            NodeKind::List(info) => info.min_elements > 0,
            NodeKind::LeafList(info) => info.min_elements > 0,
            NodeKind::Container { presence: None } | NodeKind::Case { .. } => {
                self.children(id).any(|c| self.is_mandatory_node(c))
            }
            _ => false,
        }
    }

    /// Default values of a leaf or leaf-list, falling back to typedef defaults
    pub fn effective_defaults(&self, id: NodeId) -> Vec<String> {
        let node = self.node(id);
        let (own, ty) = match &node.kind {
            NodeKind::Leaf(info) => (info.default.iter().cloned().collect::<Vec<_>>(), &info.ty),
            NodeKind::LeafList(info) => (info.defaults.clone(), &info.ty),
            _ => return Vec::new(),
        };
        if !own.is_empty() || node.flags.mandatory {
            return own;
        }
        if let NodeKind::LeafList(info) = &node.kind {
            if info.min_elements > 0 {
                return own;
            }
        }
        ty.as_ref()
            .and_then(|t| {
                t.typedef_chain()
                    .into_iter()
                    .find_map(|td| self.typedef(td).default.clone())
            })
            .into_iter()
            .collect()
    }

    /// Property combinations that are invalid on a single node
    pub(crate) fn check_node_constraints(&self, id: NodeId) -> Result<(), SchemaError> {
        let node = self.node(id);
        let name = &node.name;
        match &node.kind {
            NodeKind::Leaf(info) if node.flags.mandatory && info.default.is_some() => {
                Err(SchemaError::constraint(format!(
                    "Leaf '{}' cannot be mandatory and have a default",
                    name
                )))
            }
            NodeKind::Choice {
                default: Some(_), ..
            } if node.flags.mandatory => Err(SchemaError::constraint(format!(
                "Choice '{}' cannot be mandatory and have a default case",
                name
            ))),
            NodeKind::LeafList(info) if info.min_elements > 0 && !info.defaults.is_empty() => {
                Err(SchemaError::constraint(format!(
                    "Leaf-list '{}' with min-elements cannot have defaults",
                    name
                )))
            }
            _ => match node.cardinality() {
                Some((min, Some(max))) if min > max => Err(SchemaError::constraint(format!(
                    "min-elements {} of '{}' exceeds max-elements {}",
                    min, name, max
                ))),
                _ => Ok(()),
            },
        }
    }

    /// Recompute derived properties of a module's tree
    pub(crate) fn finalize_module(&mut self, module: ModuleId) -> Result<(), SchemaError> {
        let data: Vec<NodeId> = self.top_level_data(module).collect();
        let ops: Vec<NodeId> = {
            let m = self.module(module);
            m.rpcs
                .iter()
                .chain(m.notifications.iter())
                .copied()
                .filter(|id| !self.node(*id).removed)
                .collect()
        };
        let mut all = data.clone();
        all.extend(ops.iter().copied());
        self.check_siblings(&all)?;

        for &id in &data {
            self.finalize_structure(id, Some(true))?;
        }
        for &id in &ops {
            self.finalize_structure(id, None)?;
        }
        for &id in &all {
            self.finalize_values(id)?;
        }
        tracing::debug!(module = %self.module(module).name, "module finalized");
        Ok(())
    }

    fn check_siblings(&self, children: &[NodeId]) -> Result<(), SchemaError> {
        fn collect(
            ctx: &Context,
            children: &[NodeId],
            seen: &mut HashSet<(ModuleId, String)>,
        ) -> Result<(), SchemaError> {
            for &child in children {
                let node = ctx.node(child);
                if node.removed || node.is(NodeTypes::USES | NodeTypes::GROUPING | NodeTypes::AUGMENT) {
                    continue;
                }
                if !seen.insert((node.module, node.name.clone())) {
                    return Err(duplicate(ctx, child));
                }
                if node.is(NodeTypes::CHOICE) {
                    let mut cases = HashSet::new();
                    for case in ctx.children(child).collect::<Vec<_>>() {
                        let case_node = ctx.node(case);
                        if !cases.insert((case_node.module, case_node.name.clone())) {
                            return Err(duplicate(ctx, case));
                        }
                        let inner: Vec<NodeId> = ctx.children(case).collect();
                        collect(ctx, &inner, seen)?;
                    }
                }
            }
            Ok(())
        }
        fn duplicate(ctx: &Context, id: NodeId) -> SchemaError {
            let node = ctx.node(id);
            SchemaError::duplicate(format!("Duplicate sibling name '{}'", node.name))
                .with_path(ctx.node_path(id))
                .with_position(node.position)
        }
        let mut seen = HashSet::new();
        collect(self, children, &mut seen)
    }

    fn finalize_structure(&mut self, id: NodeId, parent_config: Option<bool>) -> Result<(), SchemaError> {
        let with_path = |ctx: &Context, e: SchemaError| {
            let position = ctx.node(id).position;
            let e = e.with_path(ctx.node_path(id));
            if e.position.is_none() {
                e.with_position(position)
            } else {
                e
            }
        };

        let node = self.node(id);
        let is_operation = node.is(NodeTypes::RPC | NodeTypes::NOTIFICATION);
        let config = match parent_config {
            _ if is_operation => false,
            None => false,
            Some(parent) if node.flags.config_set => {
                if node.flags.config && !parent {
                    return Err(with_path(
                        self,
                        SchemaError::constraint(format!(
                            "Configuration node '{}' cannot be defined under state data",
                            node.name
                        )),
                    ));
                }
                node.flags.config
            }
            Some(parent) => parent,
        };
        let child_config = if is_operation || parent_config.is_none() {
            None
        } else {
            Some(config)
        };
        self.node_mut(id).flags.config = config;
        self.check_node_constraints(id).map_err(|e| with_path(self, e))?;

        match self.node(id).kind.node_type() {
            NodeTypes::LIST => self.finalize_list(id, child_config.is_some()).map_err(|e| with_path(self, e))?,
            NodeTypes::CHOICE => self.finalize_choice(id).map_err(|e| with_path(self, e))?,
            _ => {}
        }
        if !self.node(id).is(NodeTypes::CHOICE | NodeTypes::CASE) {
            let children: Vec<NodeId> = self.children(id).collect();
            self.check_siblings(&children)?;
        }

        for child in self.children(id).collect::<Vec<_>>() {
            self.finalize_structure(child, child_config)?;
        }
        Ok(())
    }

    fn finalize_list(&mut self, id: NodeId, in_config_tree: bool) -> Result<(), SchemaError> {
        let node = self.node(id);
        let NodeKind::List(info) = &node.kind else {
            return Ok(());
        };
        let list_config = node.flags.config;
        let version = self.module(node.module).version;
        if info.key_names.is_empty() && list_config && in_config_tree {
            return Err(SchemaError::constraint(format!(
                "Configuration list '{}' requires a key",
                node.name
            )));
        }

        let mut keys = Vec::with_capacity(info.key_names.len());
        for key in &info.key_names {
            let (_, local) = split_prefixed(key);
            let leaf = self
                .children(id)
                .find(|c| {
                    let child = self.node(*c);
                    child.name == local && child.is(NodeTypes::LEAF)
                })
                .ok_or_else(|| {
                    SchemaError::unresolved(format!("Key '{}' of list '{}' is not a child leaf", key, node.name))
                })?;
            if keys.contains(&leaf) {
                return Err(SchemaError::duplicate(format!(
                    "Key '{}' appears twice in list '{}'",
                    key, node.name
                )));
            }
            let key_node = self.node(leaf);
            let empty = key_node
                .leaf_type()
                .map_or(false, |t| t.base == BuiltinKind::Empty);
            if empty && version == YangVersion::V1_0 {
                return Err(SchemaError::constraint(format!(
                    "Key '{}' of list '{}' cannot be of type empty",
                    key, node.name
                )));
            }
            if key_node.flags.config_set && key_node.flags.config != list_config {
                return Err(SchemaError::constraint(format!(
                    "Key '{}' must have the same config as list '{}'",
                    key, node.name
                )));
            }
            keys.push(leaf);
        }

        let mut uniques = info.uniques.clone();
        for unique in &mut uniques {
            unique.leaves.clear();
            for part in unique.text.split_whitespace() {
                let mut current = id;
                for step in part.split('/') {
                    let (_, local) = split_prefixed(step);
                    current = self
                        .children(current)
                        .find(|c| self.node(*c).name == local)
                        .ok_or_else(|| {
                            SchemaError::unresolved(format!(
                                "Unique '{}' of list '{}' names an unknown node",
                                unique.text, node.name
                            ))
                        })?;
                }
                if !self.node(current).is(NodeTypes::LEAF) {
                    return Err(SchemaError::constraint(format!(
                        "Unique '{}' of list '{}' must name leaves",
                        unique.text, node.name
                    )));
                }
                unique.leaves.push(current);
            }
        }

        if let NodeKind::List(info) = &mut self.node_mut(id).kind {
            info.keys = keys;
            info.uniques = uniques;
        }
        Ok(())
    }

    fn finalize_choice(&mut self, id: NodeId) -> Result<(), SchemaError> {
        let node = self.node(id);
        let NodeKind::Choice { default, .. } = &node.kind else {
            return Ok(());
        };
        let mut names = HashSet::new();
        for case in self.children(id) {
            let case_node = self.node(case);
            if !names.insert((case_node.module, case_node.name.as_str())) {
                return Err(SchemaError::duplicate(format!(
                    "Duplicate case '{}' in choice '{}'",
                    case_node.name, node.name
                )));
            }
        }
        let default_case = match default {
            Some(name) => {
                let (_, local) = split_prefixed(name);
                let case = self
                    .children(id)
                    .find(|c| self.node(*c).name == local)
                    .ok_or_else(|| {
                        SchemaError::unresolved(format!(
                            "Default case '{}' of choice '{}' not found",
                            name, node.name
                        ))
                    })?;
                if let Some(m) = self.children(case).find(|c| self.is_mandatory_node(*c)) {
                    return Err(SchemaError::constraint(format!(
                        "Default case '{}' of choice '{}' contains mandatory node '{}'",
                        name,
                        node.name,
                        self.node(m).name
                    )));
                }
                Some(case)
            }
            None => None,
        };
        if let NodeKind::Choice { default_case: slot, .. } = &mut self.node_mut(id).kind {
            *slot = default_case;
        }
        Ok(())
    }

    fn finalize_values(&mut self, id: NodeId) -> Result<(), SchemaError> {
        if self.node(id).is(NodeTypes::LEAF | NodeTypes::LEAF_LIST) {
            self.finalize_leaf(id).map_err(|e| {
                let position = self.node(id).position;
                let e = e.with_path(self.node_path(id));
                if e.position.is_none() {
                    e.with_position(position)
                } else {
                    e
                }
            })?;
        }
        for child in self.children(id).collect::<Vec<_>>() {
            self.finalize_values(child)?;
        }
        Ok(())
    }

    fn finalize_leaf(&mut self, id: NodeId) -> Result<(), SchemaError> {
        let node = self.node(id);
        let ty = node
            .leaf_type()
            .cloned()
            .ok_or_else(|| SchemaError::unresolved(format!("Type of '{}' is not resolved", node.name)))?;

        let mut targets = IndexMap::new();
        for (path, require_instance) in ty.leafrefs() {
            let target = self.resolve_leafref(id, path)?;
            let target_node = self.node(target);
            if !node.flags.status.may_reference(target_node.flags.status) {
                return Err(SchemaError::constraint(format!(
                    "A {} leafref refers to {} node '{}'",
                    node.flags.status, target_node.flags.status, target_node.name
                )));
            }
            if require_instance && node.flags.config && !target_node.flags.config {
                return Err(SchemaError::constraint(format!(
                    "Leafref '{}' of configuration data refers to state data '{}'",
                    path.text,
                    self.node_path(target)
                )));
            }
            targets.insert(path.text.clone(), target);
        }

        let defaults = self.effective_defaults(id);
        if !defaults.is_empty() && ty.base == BuiltinKind::Empty {
            return Err(SchemaError::constraint(format!(
                "Leaf '{}' of type empty cannot have a default",
                node.name
            )));
        }
        let module = node.module;
        let prefixes = |p: &str| self.resolve_prefix_any(module, p);
        let scope = ValueScope {
            prefixes: &prefixes,
            default_module: module,
            leafref_targets: Some(&targets),
            schema_literal: true,
        };
        for default in &defaults {
            if let Err(msg) = self.check_value(&ty, default, &scope) {
                return Err(SchemaError::constraint(format!(
                    "Invalid default '{}' of '{}': {}",
                    default, node.name, msg
                )));
            }
        }

        match &mut self.node_mut(id).kind {
            NodeKind::Leaf(info) => info.leafref_targets = targets,
            NodeKind::LeafList(info) => info.leafref_targets = targets,
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn load(text: &str) -> Result<(Context, ModuleId), crate::error::Error> {
        let mut ctx = Context::new();
        let m = ctx.load_yang_str(text)?;
        Ok((ctx, m))
    }

    #[test]
    fn test_config_inheritance() {
        let (ctx, m) = load(
            "module m { namespace urn:m; prefix m;
               container c { config false; leaf a { type string; } }
               rpc r { input { leaf i { type string; } } } }",
        )
        .unwrap();
        let a = ctx.find_path("/m:c/a").unwrap();
        assert!(!ctx.node(a).is_config());
        let i = ctx.find_path("/m:r/input/i").unwrap();
        assert!(!ctx.node(i).is_config());
        assert_eq!(ctx.top_level_data(m).count(), 1);
    }

    #[test]
    fn test_config_true_under_state() {
        let err = load(
            "module m { namespace urn:m; prefix m;
               container c { config false; leaf a { type string; config true; } } }",
        )
        .unwrap_err();
        assert_eq!(err.schema_kind(), Some(ErrorKind::ConstraintViolation));
    }

    #[test]
    fn test_list_keys() {
        let (ctx, _) = load(
            "module m { namespace urn:m; prefix m;
               list l { key \"a b\"; unique c; leaf a { type string; } leaf b { type int8; } leaf c { type string; } } }",
        )
        .unwrap();
        let l = ctx.find_path("/m:l").unwrap();
        let keys: Vec<&str> = ctx.node(l).keys().iter().map(|k| ctx.node(*k).name.as_str()).collect();
        assert_eq!(keys, ["a", "b"]);

        let err = load(
            "module m { namespace urn:m; prefix m; list l { key \"a a\"; leaf a { type string; } } }",
        )
        .unwrap_err();
        assert_eq!(err.schema_kind(), Some(ErrorKind::DuplicateDefinition));

        let err = load("module m { namespace urn:m; prefix m; list l { leaf a { type string; } } }").unwrap_err();
        assert_eq!(err.schema_kind(), Some(ErrorKind::ConstraintViolation));
    }

    #[test]
    fn test_duplicate_sibling_through_choice() {
        let err = load(
            "module m { namespace urn:m; prefix m;
               container c { leaf a { type string; } choice ch { leaf a { type string; } } } }",
        )
        .unwrap_err();
        assert_eq!(err.schema_kind(), Some(ErrorKind::DuplicateDefinition));
    }

    #[test]
    fn test_choice_shares_sibling_names() {
        let err = load(
            "module m { namespace urn:m; prefix m;
               container c { leaf x { type string; } choice x { leaf a { type string; } } } }",
        )
        .unwrap_err();
        assert_eq!(err.schema_kind(), Some(ErrorKind::DuplicateDefinition));

        let err = load(
            "module m { namespace urn:m; prefix m;
               choice ch { case k { leaf a { type string; } } case k { leaf b { type string; } } } }",
        )
        .unwrap_err();
        assert_eq!(err.schema_kind(), Some(ErrorKind::DuplicateDefinition));

        // a shorthand case carries the name of its node
        assert!(load(
            "module m { namespace urn:m; prefix m;
               container c { choice ch { leaf a { type string; } leaf b { type string; } } } }",
        )
        .is_ok());
    }

    #[test]
    fn test_choice_default_case() {
        let (ctx, _) = load(
            "module m { namespace urn:m; prefix m;
               choice ch { default b; leaf a { type string; } leaf b { type string; } } }",
        )
        .unwrap();
        let ch = ctx.find_path("/m:ch").unwrap();
        match &ctx.node(ch).kind {
            NodeKind::Choice { default_case, .. } => {
                assert_eq!(default_case.map(|c| ctx.node(c).name.as_str()), Some("b"))
            }
            _ => panic!("expected choice"),
        }

        let err = load(
            "module m { namespace urn:m; prefix m;
               choice ch { default b; case b { leaf x { type string; mandatory true; } } } }",
        )
        .unwrap_err();
        assert_eq!(err.schema_kind(), Some(ErrorKind::ConstraintViolation));
    }

    #[test]
    fn test_leafref_target_and_config() {
        let (ctx, _) = load(
            "module m { namespace urn:m; prefix m;
               leaf t { type string; }
               leaf r { type leafref { path /t; } } }",
        )
        .unwrap();
        let r = ctx.find_path("/m:r").unwrap();
        let t = ctx.find_path("/m:t").unwrap();
        assert_eq!(ctx.node(r).leafref_targets().unwrap().get("/t"), Some(&t));

        let err = load(
            "module m { namespace urn:m; prefix m;
               leaf t { type string; config false; }
               leaf r { type leafref { path /t; } } }",
        )
        .unwrap_err();
        assert_eq!(err.schema_kind(), Some(ErrorKind::ConstraintViolation));
        assert!(err.to_string().contains("state data"));
    }

    #[test]
    fn test_invalid_default() {
        let err = load(
            "module m { namespace urn:m; prefix m; leaf a { type uint8; default 300; } }",
        )
        .unwrap_err();
        assert_eq!(err.schema_kind(), Some(ErrorKind::ConstraintViolation));
    }

    #[test]
    fn test_typedef_default_inherited() {
        let (ctx, _) = load(
            "module m { namespace urn:m; prefix m;
               typedef port { type uint16; default 80; }
               leaf p { type port; } }",
        )
        .unwrap();
        let p = ctx.find_path("/m:p").unwrap();
        assert_eq!(ctx.effective_defaults(p), ["80"]);
    }
}
