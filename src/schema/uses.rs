//! Grouping expansion
//!
//! Each `uses` node is a placeholder until its grouping is complete, i.e.
//! contains no unexpanded `uses` of its own. Expansion deep-copies the
//! grouping's children next to the placeholder, applies `refine` and the
//! nested `augment` statements, then marks the placeholder removed.

use crate::error::SchemaError;
use crate::ids::NodeId;
use crate::statement::Statement;

use super::compile::{parse_max_elements, parse_min_elements};
use super::node::{NodeKind, UsesInfo};
use super::resolver::trace_cycle;
use super::typecomp::parse_bool_arg;
use super::{Context, NodeTypes, Unit, YangVersion};

/// Node kinds a refine substatement may target
fn refine_mask(keyword: &str, version: YangVersion) -> Option<NodeTypes> {
    let mask = match keyword {
        "default" if version == YangVersion::V1_1 => {
            NodeTypes::LEAF | NodeTypes::LEAF_LIST | NodeTypes::CHOICE
        }
        "default" => NodeTypes::LEAF | NodeTypes::CHOICE,
        "mandatory" => NodeTypes::LEAF | NodeTypes::CHOICE | NodeTypes::ANYDATA,
        "min-elements" | "max-elements" => NodeTypes::LIST | NodeTypes::LEAF_LIST,
        "presence" => NodeTypes::CONTAINER,
        "must" => {
            NodeTypes::CONTAINER
                | NodeTypes::LEAF
                | NodeTypes::LEAF_LIST
                | NodeTypes::LIST
                | NodeTypes::ANYDATA
        }
        "config" | "description" | "reference" => NodeTypes::ALL,
        "if-feature" if version == YangVersion::V1_1 => NodeTypes::ALL,
        k if k.contains(':') => NodeTypes::ALL,
        _ => return None,
    };
    Some(mask)
}

impl Context {
    /// Drain the `uses` worklist to a fixed point
    pub(crate) fn expand_uses(&mut self, pending: Vec<NodeId>) -> Result<(), SchemaError> {
        let mut queue = pending;
        let mut round = 0;
        while !queue.is_empty() {
            round += 1;
            let before = queue.len();
            let mut waiting = Vec::new();
            for uses in queue {
                match self.uses_ready(uses)? {
                    Some(grouping) => self.expand_one(uses, grouping)?,
                    None => waiting.push(uses),
                }
            }
            tracing::debug!(round, remaining = waiting.len(), "uses worklist pass");
            if waiting.len() == before {
                return Err(self.uses_cycle_error(&waiting));
            }
            queue = waiting;
        }
        Ok(())
    }

    fn uses_info(&self, uses: NodeId) -> Option<&UsesInfo> {
        match &self.node(uses).kind {
            NodeKind::Uses(info) => Some(info),
            _ => None,
        }
    }

    fn grouping_of(&self, uses: NodeId) -> Result<NodeId, SchemaError> {
        let node = self.node(uses);
        let info = self.uses_info(uses).ok_or_else(|| {
            SchemaError::syntax(format!("Node '{}' is not a uses", node.name))
        })?;
        let grouping = self
            .find_grouping(info.unit, node.parent, &info.grouping)
            .map_err(|e| e.with_position(node.position))?
            .ok_or_else(|| {
                SchemaError::unresolved(format!("Grouping '{}' not found", info.grouping))
                    .with_position(node.position)
            })?;
        let status = self.node(grouping).flags.status;
        if !node.flags.status.may_reference(status) {
            return Err(SchemaError::constraint(format!(
                "A {} uses references {} grouping '{}'",
                node.flags.status, status, info.grouping
            ))
            .with_position(node.position));
        }
        Ok(grouping)
    }

    /// Unexpanded `uses` nodes in a subtree
    fn pending_uses_in(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            if node.removed {
                continue;
            }
            if let NodeKind::Uses(info) = &node.kind {
                if id != root {
                    out.push(id);
                }
                stack.extend(info.augments.iter().copied());
            }
            stack.extend(node.children.iter().copied());
        }
        out
    }

    fn uses_ready(&self, uses: NodeId) -> Result<Option<NodeId>, SchemaError> {
        let grouping = self.grouping_of(uses)?;
        if !self.pending_uses_in(grouping).is_empty() || !self.pending_uses_in(uses).is_empty() {
            return Ok(None);
        }
        Ok(Some(grouping))
    }

    fn uses_cycle_error(&self, waiting: &[NodeId]) -> SchemaError {
        let neighbors = |grouping: NodeId| -> Vec<NodeId> {
            self.pending_uses_in(grouping)
                .into_iter()
                .filter_map(|u| self.grouping_of(u).ok())
                .collect()
        };
        for &uses in waiting {
            let Ok(start) = self.grouping_of(uses) else {
                continue;
            };
            if let Some(cycle) = trace_cycle(start, neighbors) {
                let chain: Vec<&str> = cycle.iter().map(|g| self.node(*g).name.as_str()).collect();
                return SchemaError::circular(format!(
                    "Grouping '{}' references itself ({})",
                    self.node(start).name,
                    chain.join(" -> ")
                ))
                .with_position(self.node(start).position);
            }
        }
        let first = self.node(waiting[0]);
        SchemaError::unresolved(format!("Uses of '{}' could not be expanded", first.name))
            .with_position(first.position)
    }

    /// Deep copy of a subtree, re-homed under `parent` in `module`
    pub(crate) fn copy_subtree(
        &mut self,
        src: NodeId,
        parent: Option<NodeId>,
        module: crate::ids::ModuleId,
    ) -> Result<NodeId, SchemaError> {
        let mut node = self.node(src).clone();
        let children = std::mem::take(&mut node.children);
        node.parent = parent;
        node.module = module;
        if !node.flags.config_set {
            node.flags.config = true;
        }
        match &mut node.kind {
            NodeKind::List(info) => info.keys.clear(),
            NodeKind::Leaf(info) => info.leafref_targets.clear(),
            NodeKind::LeafList(info) => info.leafref_targets.clear(),
            NodeKind::Choice { default_case, .. } => *default_case = None,
            _ => {}
        }
        let id = self.add_node(node)?;
        for child in children {
            if self.node(child).removed {
                continue;
            }
            let copy = self.copy_subtree(child, Some(id), module)?;
            self.node_mut(id).children.push(copy);
        }
        Ok(id)
    }

    fn expand_one(&mut self, uses: NodeId, grouping: NodeId) -> Result<(), SchemaError> {
        let node = self.node(uses).clone();
        let Some(info) = self.uses_info(uses).cloned() else {
            return Ok(());
        };
        let parent = node.parent;

        let sources: Vec<NodeId> = self.children(grouping).collect();
        let mut copies = Vec::with_capacity(sources.len());
        for src in sources {
            let copy = self.copy_subtree(src, parent, node.module)?;
            let target = self.node_mut(copy);
            for when in &node.when {
                let mut inherited = when.clone();
                inherited.on_parent = true;
                target.when.push(inherited);
            }
            target.if_features.extend(node.if_features.iter().cloned());
            copies.push(copy);
        }

        let siblings = match parent {
            Some(p) => &mut self.node_mut(p).children,
            None => &mut self.module_mut(node.module).data,
        };
        let at = siblings
            .iter()
            .position(|c| *c == uses)
            .map_or(siblings.len(), |i| i + 1);
        siblings.splice(at..at, copies.iter().copied());
        self.node_mut(uses).removed = true;
        tracing::trace!(
            grouping = %self.node(grouping).name,
            copies = copies.len(),
            "expanded uses"
        );

        for refine in &info.refines {
            self.apply_refine(info.unit, parent, refine)?;
        }
        for &aug in &info.augments {
            let text = self.node(aug).name.clone();
            if text.starts_with('/') {
                return Err(SchemaError::syntax(format!(
                    "Augment '{}' inside uses must use a descendant path",
                    text
                ))
                .with_position(self.node(aug).position));
            }
            let target = self
                .resolve_schema_nodeid(&text, info.unit, parent, false)
                .map_err(|e| e.with_position(self.node(aug).position))?;
            self.splice_augment(aug, target)?;
        }
        Ok(())
    }

    fn apply_refine(
        &mut self,
        unit: Unit,
        context: Option<NodeId>,
        refine: &Statement,
    ) -> Result<(), SchemaError> {
        let target = self
            .resolve_schema_nodeid(refine.arg(), unit, context, false)
            .map_err(|e| e.with_position(refine.position))?;
        let version = self.unit_version(unit);
        let target_type = self.node(target).node_type();

        let mut allowed = NodeTypes::ALL;
        for sub in &refine.children {
            let mask = refine_mask(&sub.keyword, version).ok_or_else(|| {
                SchemaError::syntax(format!("'{}' cannot be refined", sub.keyword))
                    .with_position(sub.position)
            })?;
            allowed = allowed & mask;
            if allowed.is_empty() || !allowed.contains(target_type) {
                return Err(SchemaError::incompatible(format!(
                    "Refine of '{}' cannot apply '{}' to a {}",
                    refine.arg(),
                    sub.keyword,
                    self.node(target).kind.keyword()
                ))
                .with_position(sub.position));
            }
        }

        let mut musts = Vec::new();
        for m in refine.find_all("must") {
            musts.push(self.compile_condition(unit, m)?);
        }
        let status = self.node(target).flags.status;
        let if_features = self.compile_if_features(unit, refine, status)?;
        let defaults: Vec<String> = refine.find_all("default").map(|d| d.arg().to_string()).collect();
        let min = match refine.find("min-elements") {
            Some(_) => Some(parse_min_elements(refine)?),
            None => None,
        };
        let max = match refine.find("max-elements") {
            Some(_) => Some(parse_max_elements(refine)?),
            None => None,
        };
        let mandatory = refine.find("mandatory").map(parse_bool_arg).transpose()?;
        let config = refine.find("config").map(parse_bool_arg).transpose()?;

        let node = self.node_mut(target);
        node.musts.extend(musts);
        node.if_features.extend(if_features);
        if let Some(m) = mandatory {
            node.flags.mandatory_set = true;
            node.flags.mandatory = m;
        }
        node.flags.min_set |= min.is_some();
        node.flags.max_set |= max.is_some();
        if let Some(c) = config {
            node.flags.config_set = true;
            node.flags.config = c;
        }
        if let Some(d) = refine.find_arg("description") {
            node.description = Some(d.to_string());
        }
        if let Some(r) = refine.find_arg("reference") {
            node.reference = Some(r.to_string());
        }
        match &mut node.kind {
            NodeKind::Leaf(leaf) => {
                if let Some(d) = defaults.first() {
                    leaf.default = Some(d.clone());
                }
            }
            NodeKind::LeafList(ll) => {
                if !defaults.is_empty() {
                    ll.defaults = defaults;
                }
                if let Some(m) = min {
                    ll.min_elements = m;
                }
                if let Some(m) = max {
                    ll.max_elements = m;
                }
            }
            NodeKind::List(list) => {
                if let Some(m) = min {
                    list.min_elements = m;
                }
                if let Some(m) = max {
                    list.max_elements = m;
                }
            }
            NodeKind::Choice {
                default,
                default_case,
            } => {
                if let Some(d) = defaults.first() {
                    *default = Some(d.clone());
                    *default_case = None;
                }
            }
            NodeKind::Container { presence } => {
                if let Some(p) = refine.find_arg("presence") {
                    *presence = Some(p.to_string());
                }
            }
            _ => {}
        }

        self.check_node_constraints(target)
            .map_err(|e| e.with_position(refine.position))?;
        tracing::trace!(target = refine.arg(), "applied refine");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::TypeInfo;

    #[test]
    fn test_grouping_expansion() {
        let mut ctx = Context::new();
        let m = ctx
            .load_yang_str(
                "module m { namespace urn:m; prefix m;
                   grouping g { leaf a { type string; } }
                   container c { uses g; } }",
            )
            .unwrap();
        let c = ctx.top_level_data(m).next().unwrap();
        let children: Vec<_> = ctx.children(c).collect();
        assert_eq!(children.len(), 1);
        let a = ctx.node(children[0]);
        assert_eq!(a.name, "a");
        assert_eq!(a.parent, Some(c));
        assert_eq!(a.leaf_type().unwrap().base, crate::schema::BuiltinKind::String);
    }

    #[test]
    fn test_grouping_declared_after_use() {
        let mut ctx = Context::new();
        let m = ctx
            .load_yang_str(
                "module m { namespace urn:m; prefix m;
                   container c { uses outer; }
                   grouping outer { uses inner; }
                   grouping inner { leaf x { type int8; } } }",
            )
            .unwrap();
        let c = ctx.top_level_data(m).next().unwrap();
        assert!(ctx.find_data_child(Some(c), m, "x").is_some());
    }

    #[test]
    fn test_grouping_self_reference() {
        let mut ctx = Context::new();
        let err = ctx
            .load_yang_str(
                "module m { namespace urn:m; prefix m;
                   grouping g { container c { uses g; } }
                   container top { uses g; } }",
            )
            .unwrap_err();
        assert_eq!(err.schema_kind(), Some(ErrorKind::CircularReference));
        assert!(err.to_string().contains("g -> g"));
    }

    #[test]
    fn test_refine_properties() {
        let mut ctx = Context::new();
        let m = ctx
            .load_yang_str(
                "module m { namespace urn:m; prefix m;
                   grouping g { leaf a { type string; } list l { key k; leaf k { type string; } } }
                   container c {
                     uses g { refine a { default hello; } refine l { max-elements 3; } }
                   } }",
            )
            .unwrap();
        let c = ctx.top_level_data(m).next().unwrap();
        let a = ctx.find_data_child(Some(c), m, "a").unwrap();
        match &ctx.node(a).kind {
            NodeKind::Leaf(info) => assert_eq!(info.default.as_deref(), Some("hello")),
            _ => panic!("expected leaf"),
        }
        let l = ctx.find_data_child(Some(c), m, "l").unwrap();
        assert_eq!(ctx.node(l).cardinality(), Some((0, Some(3))));
        assert!(matches!(
            ctx.node(a).leaf_type().unwrap().info,
            TypeInfo::String { .. }
        ));
    }

    #[test]
    fn test_refine_incompatible_target() {
        let mut ctx = Context::new();
        let err = ctx
            .load_yang_str(
                "module m { namespace urn:m; prefix m;
                   grouping g { container x; }
                   container c { uses g { refine x { default 1; } } } }",
            )
            .unwrap_err();
        assert_eq!(err.schema_kind(), Some(ErrorKind::IncompatibleTarget));
    }

    #[test]
    fn test_refine_mandatory_with_default() {
        let mut ctx = Context::new();
        let err = ctx
            .load_yang_str(
                "module m { namespace urn:m; prefix m;
                   grouping g { leaf a { type string; default x; } }
                   container c { uses g { refine a { mandatory true; } } } }",
            )
            .unwrap_err();
        assert_eq!(err.schema_kind(), Some(ErrorKind::ConstraintViolation));
    }

    #[test]
    fn test_uses_augment() {
        let mut ctx = Context::new();
        let m = ctx
            .load_yang_str(
                "module m { namespace urn:m; prefix m;
                   grouping g { container inner; }
                   container c { uses g { augment inner { leaf added { type string; } } } } }",
            )
            .unwrap();
        let c = ctx.top_level_data(m).next().unwrap();
        let inner = ctx.find_data_child(Some(c), m, "inner").unwrap();
        let added = ctx.find_data_child(Some(inner), m, "added").unwrap();
        assert_eq!(ctx.node(added).parent, Some(inner));
        assert!(ctx.node(added).augment.is_some());
    }
}
