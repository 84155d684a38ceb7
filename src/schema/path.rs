//! Schema-node-id resolution and schema paths
//!
//! Augment, deviation, refine and unique arguments address schema nodes
//! with schema-node-ids: `/p:a/p:b` (absolute) or `a/b` (descendant).
//! Choice and case nodes are explicit steps of a schema-node-id but are
//! transparent in data paths and leafref paths.

use crate::error::{Error, Result, SchemaError};
use crate::ids::{ModuleId, NodeId};
use crate::names::{is_valid_prefixed, split_prefixed};

use super::types::LeafrefPath;
use super::{Context, NodeTypes, Unit};

/// Node kinds that never appear as schema-node-id steps
const NOT_ADDRESSABLE: NodeTypes = NodeTypes::USES
    .union(NodeTypes::AUGMENT)
    .union(NodeTypes::GROUPING);

fn nodeid_segments(text: &str) -> std::result::Result<(bool, Vec<(Option<&str>, &str)>), SchemaError> {
    let trimmed = text.trim();
    let absolute = trimmed.starts_with('/');
    let body = trimmed.strip_prefix('/').unwrap_or(trimmed);
    let mut segments = Vec::new();
    for segment in body.split('/') {
        let segment = segment.trim();
        if !is_valid_prefixed(segment) {
            return Err(SchemaError::syntax(format!(
                "Invalid schema node identifier '{}'",
                text
            )));
        }
        segments.push(split_prefixed(segment));
    }
    Ok((absolute, segments))
}

impl Context {
    fn raw_children(&self, parent: Option<NodeId>, module: ModuleId) -> Vec<NodeId> {
        match parent {
            Some(p) => self.node(p).children.clone(),
            None => self.module(module).top_level().collect(),
        }
    }

    /// Resolve a schema-node-id written in `unit`
    ///
    /// Descendant ids start from the children of `context`, or from the top
    /// level of the unit's module when `context` is `None`. With
    /// `include_removed` nodes removed by a deviation are matched too.
    pub(crate) fn resolve_schema_nodeid(
        &self,
        text: &str,
        unit: Unit,
        context: Option<NodeId>,
        include_removed: bool,
    ) -> std::result::Result<NodeId, SchemaError> {
        let (absolute, segments) = nodeid_segments(text)?;
        let mut current = if absolute { None } else { context };
        for (prefix, name) in segments {
            let module = self.prefix_module(unit, prefix)?;
            let candidates = self.raw_children(current, module);
            let matching = |live_only: bool| {
                candidates.iter().copied().find(|c| {
                    let node = self.node(*c);
                    node.module == module
                        && node.name == name
                        && !NOT_ADDRESSABLE.contains(node.node_type())
                        && (!live_only || !node.removed)
                })
            };
            let found = match matching(true) {
                Some(id) => Some(id),
                None if include_removed => matching(false),
                None => None,
            };
            current = Some(found.ok_or_else(|| {
                SchemaError::unresolved(format!("Schema node '{}' not found", text))
            })?);
        }
        current.ok_or_else(|| SchemaError::syntax(format!("Empty schema node identifier '{}'", text)))
    }

    /// Find a live schema node by absolute path with module names as prefixes
    ///
    /// A step without a prefix inherits the module of the previous step.
    pub fn find_path(&self, path: &str) -> Result<NodeId> {
        let body = path
            .strip_prefix('/')
            .ok_or_else(|| Error::NotFound(format!("schema path '{}' is not absolute", path)))?;
        let mut module: Option<ModuleId> = None;
        let mut current: Option<NodeId> = None;
        for segment in body.split('/') {
            let (prefix, name) = split_prefixed(segment);
            if let Some(p) = prefix {
                module = Some(
                    self.module_by_name(p)
                        .ok_or_else(|| Error::NotFound(format!("module '{}'", p)))?,
                );
            }
            let m = module.ok_or_else(|| {
                Error::NotFound(format!("first step of '{}' has no module prefix", path))
            })?;
            if current.is_none() && !self.module(m).implemented {
                return Err(Error::NotFound(format!(
                    "module '{}' is not implemented",
                    self.module(m).name
                )));
            }
            let found = self.raw_children(current, m).into_iter().find(|c| {
                let node = self.node(*c);
                !node.removed
                    && node.module == m
                    && node.name == name
                    && !NOT_ADDRESSABLE.contains(node.node_type())
            });
            current = Some(found.ok_or_else(|| Error::NotFound(format!("schema node '{}'", path)))?);
        }
        current.ok_or_else(|| Error::NotFound(format!("schema node '{}'", path)))
    }

    /// Absolute schema path of a node, every step prefixed by its module name
    pub fn node_path(&self, id: NodeId) -> String {
        let mut steps = Vec::new();
        let mut current = Some(id);
        while let Some(n) = current {
            let node = self.node(n);
            steps.push(format!("{}:{}", self.module(node.module).name, node.name));
            current = node.parent;
        }
        steps.reverse();
        format!("/{}", steps.join("/"))
    }

    /// Data path of a node: choice and case steps are omitted
    pub fn data_path(&self, id: NodeId) -> String {
        let mut steps = Vec::new();
        let mut current = Some(id);
        while let Some(n) = current {
            let node = self.node(n);
            steps.push(format!("{}:{}", self.module(node.module).name, node.name));
            current = self.data_parent(n);
        }
        steps.reverse();
        format!("/{}", steps.join("/"))
    }

    /// Find a data-instantiable child by module and name, looking through
    /// choice and case nodes
    ///
    /// `parent` of `None` searches the top-level data nodes of `module`.
    pub fn find_data_child(&self, parent: Option<NodeId>, module: ModuleId, name: &str) -> Option<NodeId> {
        let children: Vec<NodeId> = match parent {
            Some(p) => self.children(p).collect(),
            None => self.top_level_data(module).collect(),
        };
        for child in children {
            let node = self.node(child);
            if node.is(NodeTypes::CHOICE | NodeTypes::CASE) {
                if let Some(found) = self.find_data_child(Some(child), module, name) {
                    return Some(found);
                }
            } else if node.module == module && node.name == name {
                return Some(child);
            }
        }
        None
    }

    /// Data-instantiable children of a node, looking through choice and case
    pub fn data_children(&self, parent: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        for child in self.children(parent) {
            if self.node(child).is(NodeTypes::CHOICE | NodeTypes::CASE) {
                out.extend(self.data_children(child));
            } else {
                out.push(child);
            }
        }
        out
    }

    fn walk_up(&self, from: NodeId, up: usize) -> std::result::Result<Option<NodeId>, SchemaError> {
        let mut current = Some(from);
        for _ in 0..up {
            match current {
                Some(n) => current = self.data_parent(n),
                None => {
                    return Err(SchemaError::unresolved(
                        "Leafref path goes above the root",
                    ))
                }
            }
        }
        Ok(current)
    }

    /// Resolve the target of a leafref path from the node holding it
    pub(crate) fn resolve_leafref(
        &self,
        holder: NodeId,
        path: &LeafrefPath,
    ) -> std::result::Result<NodeId, SchemaError> {
        let default_module = self.node(holder).module;
        let not_found = || {
            SchemaError::unresolved(format!("Leafref target '{}' not found", path.text))
        };
        let mut current = if path.absolute {
            None
        } else {
            self.walk_up(holder, path.up)?
        };
        let mut module = default_module;
        let mut found = None;
        for step in &path.steps {
            module = step.node.module.unwrap_or(module);
            let next = self
                .find_data_child(current, module, &step.node.name)
                .ok_or_else(not_found)?;
            for predicate in &step.predicates {
                let key_module = predicate.key.module.unwrap_or(module);
                if self.find_data_child(Some(next), key_module, &predicate.key.name).is_none() {
                    return Err(SchemaError::unresolved(format!(
                        "Leafref predicate key '{}' not found in '{}'",
                        predicate.key.name, path.text
                    )));
                }
                let mut anchor = self.walk_up(holder, predicate.up)?;
                let mut anchor_module = default_module;
                for name in &predicate.steps {
                    anchor_module = name.module.unwrap_or(anchor_module);
                    anchor = Some(
                        self.find_data_child(anchor, anchor_module, &name.name)
                            .ok_or_else(not_found)?,
                    );
                }
            }
            current = Some(next);
            found = Some(next);
        }
        let target = found.ok_or_else(not_found)?;
        if !self.node(target).is(NodeTypes::LEAF | NodeTypes::LEAF_LIST) {
            return Err(SchemaError::constraint(format!(
                "Leafref target '{}' is not a leaf or leaf-list",
                path.text
            )));
        }
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nodeid_segments() {
        let (absolute, segs) = nodeid_segments("/a:x/y").unwrap();
        assert!(absolute);
        assert_eq!(segs, vec![(Some("a"), "x"), (None, "y")]);
        let (absolute, _) = nodeid_segments("x").unwrap();
        assert!(!absolute);
        assert!(nodeid_segments("/a//b").is_err());
    }

    #[test]
    fn test_find_path_and_node_path() {
        let mut ctx = Context::new();
        let m = ctx
            .load_yang_str(
                "module m { namespace urn:m; prefix m; container c { choice ch { leaf a { type string; } } } }",
            )
            .unwrap();
        let leaf = ctx.find_path("/m:c/ch/a/a").unwrap();
        assert_eq!(ctx.node_path(leaf), "/m:c/m:ch/m:a/m:a");
        assert_eq!(ctx.data_path(leaf), "/m:c/m:a");
        let c = ctx.top_level_data(m).next().unwrap();
        assert_eq!(ctx.find_data_child(Some(c), m, "a"), Some(leaf));
        assert!(ctx.find_path("/m:nope").is_err());
        assert!(ctx.find_path("c").is_err());
    }
}
