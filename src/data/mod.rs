//! Instance data trees
//!
//! A [`DataTree`] is a flat arena of [`DataNode`]s, each bound to the
//! compiled schema node it instantiates. Trees are built programmatically
//! with the `add_*` methods or loaded from JSON (RFC 7951) or XML, then
//! checked with [`validate`].
//!
//! Leaf values are stored as text. Validation replaces them with their
//! canonical form; identityref and instance-identifier values always use
//! module names as prefixes.

mod json;
mod validate;
mod xml;

pub use validate::{validate, ValidateOptions, ValidationReport};

use crate::error::{Error, ErrorKind, Result, ValidationError};
use crate::ids::{DataId, NodeId};
use crate::names::split_prefixed;
use crate::schema::{Context, NodeKind, NodeTypes};

/// Concerns still pending on a data node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Validity(u8);

impl Validity {
    /// Nothing pending
    pub const NONE: Self = Self(0);
    /// Mandatory descendants not yet checked
    pub const MANDATORY: Self = Self(1 << 0);
    /// Sibling uniqueness not yet checked
    pub const UNIQUE: Self = Self(1 << 1);
    /// Leafref or instance-identifier target not yet resolved
    pub const LEAFREF: Self = Self(1 << 2);
    /// `when` condition not yet evaluated
    pub const WHEN: Self = Self(1 << 3);

    /// Whether all bits of `other` are set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no bit is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Set the bits of `other`
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clear the bits of `other`
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for Validity {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One instance data node
#[derive(Debug, Clone, PartialEq)]
pub struct DataNode {
    /// Schema node instantiated
    pub schema: NodeId,
    /// Parent data node, `None` for roots
    pub parent: Option<DataId>,
    /// Children in document order
    pub children: Vec<DataId>,
    /// Value of a leaf or leaf-list entry, text of anydata
    pub value: Option<String>,
    /// Pending validation concerns
    pub validity: Validity,
}

impl DataNode {
    /// Whether every validation concern has been resolved
    pub fn is_validated(&self) -> bool {
        self.validity.is_empty()
    }
}

/// Instance data tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTree {
    nodes: Vec<DataNode>,
    roots: Vec<DataId>,
    removed: Vec<bool>,
}

fn invalid(kind: ErrorKind, message: impl Into<String>) -> Error {
    Error::Validation(ValidationError::new(kind, message))
}

impl DataTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Top-level nodes in document order
    pub fn roots(&self) -> &[DataId] {
        &self.roots
    }

    /// Get a node
    pub fn node(&self, id: DataId) -> &DataNode {
        &self.nodes[id.to_index()]
    }

    pub(crate) fn node_mut(&mut self, id: DataId) -> &mut DataNode {
        &mut self.nodes[id.to_index()]
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.removed.iter().filter(|r| !**r).count()
    }

    /// Whether the tree has no live nodes
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Whether a node has been removed from the tree
    pub fn is_removed(&self, id: DataId) -> bool {
        self.removed[id.to_index()]
    }

    /// Children of a node, or the roots for `None`
    pub fn children_of(&self, parent: Option<DataId>) -> &[DataId] {
        match parent {
            Some(p) => &self.node(p).children,
            None => &self.roots,
        }
    }

    /// Live nodes in document order
    pub fn iter(&self) -> Vec<DataId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<DataId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.node(id).children.iter().rev().copied());
        }
        out
    }

    /// A node and its descendants in document order
    pub fn subtree(&self, id: DataId) -> Vec<DataId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.node(n).children.iter().rev().copied());
        }
        out
    }

    /// Depth of a node, roots have depth 1
    pub fn depth(&self, id: DataId) -> usize {
        let mut depth = 1;
        let mut current = self.node(id).parent;
        while let Some(p) = current {
            depth += 1;
            current = self.node(p).parent;
        }
        depth
    }

    /// Append a node instantiating `schema` under `parent`
    ///
    /// The schema node must be a data node that is a data child of the
    /// parent's schema node (or a top-level data node for roots).
    pub fn add_node(
        &mut self,
        ctx: &Context,
        parent: Option<DataId>,
        schema: NodeId,
        value: Option<String>,
    ) -> Result<DataId> {
        let node = ctx.node(schema);
        if !node.is(NodeTypes::DATA) {
            return Err(invalid(
                ErrorKind::IncompatibleTarget,
                format!("'{}' is a {} and cannot be instantiated", node.name, node.kind.keyword()),
            ));
        }
        let expected_parent = parent.map(|p| self.node(p).schema);
        if ctx.data_parent(schema) != expected_parent {
            return Err(invalid(
                ErrorKind::IncompatibleTarget,
                format!("'{}' is not a child of the parent node", ctx.data_path(schema)),
            ));
        }
        let has_value = node.is(NodeTypes::LEAF | NodeTypes::LEAF_LIST);
        if has_value && value.is_none() {
            return Err(invalid(
                ErrorKind::SyntaxViolation,
                format!("Leaf '{}' requires a value", node.name),
            ));
        }

        let mut validity = Validity::NONE;
        if node.is(NodeTypes::CONTAINER | NodeTypes::LIST) {
            validity.insert(Validity::MANDATORY);
        }
        validity.insert(Validity::UNIQUE);
        if node.leaf_type().map_or(false, |t| {
            !t.leafrefs().is_empty() || t.base == crate::schema::BuiltinKind::InstanceIdentifier
        }) {
            validity.insert(Validity::LEAFREF);
        }
        if ctx.has_when(schema) {
            validity.insert(Validity::WHEN);
        }

        let id = DataId::from_index(self.nodes.len());
        if let Some(p) = parent {
            ctx.limits().check_data_depth(self.depth(p) + 1)?;
        }
        self.nodes.push(DataNode {
            schema,
            parent,
            children: Vec::new(),
            value,
            validity,
        });
        self.removed.push(false);
        match parent {
            Some(p) => self.node_mut(p).children.push(id),
            None => self.roots.push(id),
        }
        Ok(id)
    }

    fn resolve_child(&self, ctx: &Context, parent: Option<DataId>, name: &str) -> Result<NodeId> {
        let (prefix, local) = split_prefixed(name);
        let parent_schema = parent.map(|p| self.node(p).schema);
        let module = match (prefix, parent_schema) {
            (Some(m), _) => ctx
                .module_by_name(m)
                .ok_or_else(|| invalid(ErrorKind::UnresolvedReference, format!("Unknown module '{}'", m)))?,
            (None, Some(s)) => ctx.node(s).module,
            (None, None) => {
                return Err(invalid(
                    ErrorKind::SyntaxViolation,
                    format!("Top-level node '{}' needs a module prefix", name),
                ))
            }
        };
        if parent.is_none() && !ctx.module(module).implemented {
            return Err(invalid(
                ErrorKind::UnresolvedReference,
                format!("Module '{}' is not implemented", ctx.module(module).name),
            ));
        }
        ctx.find_data_child(parent_schema, module, local).ok_or_else(|| {
            invalid(
                ErrorKind::UnresolvedReference,
                format!("No schema node for '{}'", name),
            )
        })
    }

    /// Append a container or list entry named `module:name` (or `name`,
    /// inheriting the parent's module)
    pub fn add_inner(&mut self, ctx: &Context, parent: Option<DataId>, name: &str) -> Result<DataId> {
        let schema = self.resolve_child(ctx, parent, name)?;
        if !ctx.node(schema).is(NodeTypes::CONTAINER | NodeTypes::LIST) {
            return Err(invalid(
                ErrorKind::IncompatibleTarget,
                format!("'{}' is not a container or list", name),
            ));
        }
        self.add_node(ctx, parent, schema, None)
    }

    /// Append a leaf, leaf-list entry or anydata value
    pub fn add_leaf(
        &mut self,
        ctx: &Context,
        parent: Option<DataId>,
        name: &str,
        value: &str,
    ) -> Result<DataId> {
        let schema = self.resolve_child(ctx, parent, name)?;
        if !ctx.node(schema).is(NodeTypes::LEAF | NodeTypes::LEAF_LIST | NodeTypes::ANYDATA) {
            return Err(invalid(
                ErrorKind::IncompatibleTarget,
                format!("'{}' does not take a value", name),
            ));
        }
        self.add_node(ctx, parent, schema, Some(value.to_string()))
    }

    /// Detach a node and its subtree from the tree
    pub fn remove(&mut self, id: DataId) {
        match self.node(id).parent {
            Some(p) => self.node_mut(p).children.retain(|c| *c != id),
            None => self.roots.retain(|c| *c != id),
        }
        for n in self.subtree(id) {
            self.removed[n.to_index()] = true;
        }
    }

    /// Append an unchecked, valueless node used as an XPath context for a
    /// schema node that has no instance
    pub(crate) fn push_placeholder(&mut self, parent: Option<DataId>, schema: NodeId) -> DataId {
        let id = DataId::from_index(self.nodes.len());
        self.nodes.push(DataNode {
            schema,
            parent,
            children: Vec::new(),
            value: None,
            validity: Validity::NONE,
        });
        self.removed.push(false);
        match parent {
            Some(p) => self.node_mut(p).children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    /// Drop a node added by [`DataTree::push_placeholder`]
    pub(crate) fn pop_placeholder(&mut self, id: DataId) {
        match self.node(id).parent {
            Some(p) => self.node_mut(p).children.retain(|c| *c != id),
            None => self.roots.retain(|c| *c != id),
        }
        if id.to_index() + 1 == self.nodes.len() {
            self.nodes.pop();
            self.removed.pop();
        } else {
            self.removed[id.to_index()] = true;
        }
    }

    /// Children of `parent` instantiating `schema`
    pub fn instances(&self, parent: Option<DataId>, schema: NodeId) -> Vec<DataId> {
        self.children_of(parent)
            .iter()
            .copied()
            .filter(|c| self.node(*c).schema == schema)
            .collect()
    }

    /// Find a child by `module:name` (or `name`) under `parent`
    pub fn find_child(&self, ctx: &Context, parent: Option<DataId>, name: &str) -> Option<DataId> {
        let schema = self.resolve_child(ctx, parent, name).ok()?;
        self.instances(parent, schema).into_iter().next()
    }

    /// Data path of a node with module-name prefixes and list key predicates
    pub fn path(&self, ctx: &Context, id: DataId) -> String {
        let mut steps = Vec::new();
        let mut current = Some(id);
        while let Some(n) = current {
            let node = self.node(n);
            let schema = ctx.node(node.schema);
            let parent_module = node.parent.map(|p| ctx.node(self.node(p).schema).module);
            let mut step = if parent_module == Some(schema.module) {
                schema.name.clone()
            } else {
                format!("{}:{}", ctx.module(schema.module).name, schema.name)
            };
            match &schema.kind {
                NodeKind::List(_) => {
                    for key in schema.keys() {
                        let value = node
                            .children
                            .iter()
                            .find(|c| self.node(**c).schema == *key)
                            .and_then(|c| self.node(*c).value.as_deref())
                            .unwrap_or("");
                        step.push_str(&format!("[{}='{}']", ctx.node(*key).name, value));
                    }
                }
                NodeKind::LeafList(_) => {
                    if let Some(v) = &node.value {
                        step.push_str(&format!("[.='{}']", v));
                    }
                }
                _ => {}
            }
            steps.push(step);
            current = node.parent;
        }
        steps.reverse();
        format!("/{}", steps.join("/"))
    }
}

impl Context {
    /// Whether a schema node, or a choice/case between it and its data
    /// parent, carries a `when` condition
    pub fn has_when(&self, schema: NodeId) -> bool {
        self.when_carriers(schema).next().is_some()
    }

    /// The schema node and the choice/case nodes up to its data parent that
    /// carry `when` conditions
    pub(crate) fn when_carriers(&self, schema: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut chain = vec![schema];
        let mut current = self.node(schema).parent;
        while let Some(p) = current {
            if !self.node(p).is(NodeTypes::CHOICE | NodeTypes::CASE) {
                break;
            }
            chain.push(p);
            current = self.node(p).parent;
        }
        chain.into_iter().filter(move |n| !self.node(*n).when.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Context {
        let mut ctx = Context::new();
        ctx.load_yang_str(
            "module m { namespace urn:m; prefix m;
               container c {
                 list l { key k; leaf k { type string; } leaf v { type int8; } }
                 leaf-list tags { type string; }
               } }",
        )
        .unwrap();
        ctx
    }

    #[test]
    fn test_build_and_path() {
        let ctx = schema();
        let mut tree = DataTree::new();
        let c = tree.add_inner(&ctx, None, "m:c").unwrap();
        let l = tree.add_inner(&ctx, Some(c), "l").unwrap();
        tree.add_leaf(&ctx, Some(l), "k", "one").unwrap();
        let v = tree.add_leaf(&ctx, Some(l), "v", "5").unwrap();
        let t = tree.add_leaf(&ctx, Some(c), "tags", "x").unwrap();

        assert_eq!(tree.path(&ctx, v), "/m:c/l[k='one']/v");
        assert_eq!(tree.path(&ctx, t), "/m:c/tags[.='x']");
        assert_eq!(tree.node(v).parent, Some(l));
        assert_eq!(tree.iter().len(), 5);
        assert!(tree.node(l).validity.contains(Validity::MANDATORY));
    }

    #[test]
    fn test_builder_rejects_wrong_nodes() {
        let ctx = schema();
        let mut tree = DataTree::new();
        assert!(tree.add_inner(&ctx, None, "c").is_err());
        assert!(tree.add_inner(&ctx, None, "m:nope").is_err());
        let c = tree.add_inner(&ctx, None, "m:c").unwrap();
        assert!(tree.add_leaf(&ctx, Some(c), "l", "x").is_err());
    }

    #[test]
    fn test_remove_subtree() {
        let ctx = schema();
        let mut tree = DataTree::new();
        let c = tree.add_inner(&ctx, None, "m:c").unwrap();
        let l = tree.add_inner(&ctx, Some(c), "l").unwrap();
        let k = tree.add_leaf(&ctx, Some(l), "k", "one").unwrap();
        tree.remove(l);
        assert!(tree.node(c).children.is_empty());
        assert!(tree.is_removed(k));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_validity_bits() {
        let mut v = Validity::MANDATORY | Validity::WHEN;
        assert!(v.contains(Validity::WHEN));
        v.remove(Validity::WHEN);
        assert!(!v.contains(Validity::WHEN));
        v.remove(Validity::MANDATORY);
        assert!(v.is_empty());
    }
}
