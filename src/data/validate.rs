//! Instance data validation
//!
//! [`validate`] runs the passes below over a [`DataTree`] against the
//! compiled schema, clearing the node [`Validity`] bits as each concern is
//! resolved:
//!
//! 1. structure: schema availability, value canonicalization, list keys,
//!    choice exclusivity, sibling uniqueness and `max-elements`
//! 2. `when`: false conditions prune the node and its subtree, repeated
//!    until no more nodes are removed
//! 3. mandatory nodes and `min-elements`, with choice and case transparent
//! 4. leafref and instance-identifier targets
//! 5. `must` constraints
//!
//! [`ValidateOptions`] relaxes the checks for partial trees.

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use crate::error::{ErrorKind, Result, ValidationError};
use crate::ids::{DataId, NodeId};
use crate::schema::value::ValueScope;
use crate::schema::{BuiltinKind, Context, NodeKind, NodeTypes, Status, TypeInfo};
use crate::xpath::{EvalContext, EvalMode, XNode};

use super::{DataTree, Validity};

/// Validation options
///
/// The default is full validation of a complete configuration and state
/// tree. Partial trees exchanged in edit or get operations relax the
/// checks that only make sense for complete data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidateOptions {
    /// Edit tree: skip mandatory checks and `unique`/leaf-list duplicate
    /// checks, reject state data
    pub edit: bool,
    /// Get reply: skip mandatory checks and list/leaf-list uniqueness
    pub get: bool,
    /// Get-config reply: as `get`, and reject state data
    pub get_config: bool,
    /// Skip every structural check, only resolve `when`, leafrefs and `must`
    pub trusted: bool,
    /// Validate only the first root and its descendants
    pub no_siblings: bool,
}

impl ValidateOptions {
    /// Full validation
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for an edit tree
    pub fn edit() -> Self {
        Self {
            edit: true,
            ..Self::default()
        }
    }

    /// Options for a get reply
    pub fn get() -> Self {
        Self {
            get: true,
            ..Self::default()
        }
    }

    /// Options for a get-config reply
    pub fn get_config() -> Self {
        Self {
            get_config: true,
            ..Self::default()
        }
    }

    /// Options for a tree already known to be structurally valid
    pub fn trusted() -> Self {
        Self {
            trusted: true,
            ..Self::default()
        }
    }

    /// Restrict validation to the first root
    pub fn with_no_siblings(mut self) -> Self {
        self.no_siblings = true;
        self
    }

    /// Whether the tree must be complete
    pub fn full(&self) -> bool {
        !(self.edit || self.get || self.get_config)
    }

    fn result_tree(&self) -> bool {
        self.get || self.get_config
    }

    /// List `unique` and leaf-list duplicate values are not checked
    fn relaxed_uniqueness(&self) -> bool {
        self.result_tree() || self.edit
    }

    fn config_only(&self) -> bool {
        self.edit || self.get_config
    }
}

/// Outcome of a successful validation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Data paths of subtrees removed because their `when` was false
    pub pruned: Vec<String>,
    /// Data paths of leafrefs and instance-identifiers left unresolved
    pub unresolved: Vec<String>,
    /// Recoverable findings
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Whether nothing was pruned or left unresolved
    pub fn is_clean(&self) -> bool {
        self.pruned.is_empty() && self.unresolved.is_empty() && self.warnings.is_empty()
    }
}

/// Validate a data tree, canonicalizing values and pruning nodes whose
/// `when` condition is false
pub fn validate(ctx: &Context, tree: &mut DataTree, options: &ValidateOptions) -> Result<ValidationReport> {
    let mut validator = Validator {
        ctx,
        options,
        report: ValidationReport::default(),
    };
    if !options.trusted {
        validator.check_structure(tree)?;
    }
    validator.resolve_when(tree)?;
    if !options.trusted && options.full() {
        validator.check_mandatory(tree)?;
    }
    validator.resolve_leafrefs(tree)?;
    validator.check_musts(tree)?;
    tracing::debug!(
        nodes = tree.len(),
        pruned = validator.report.pruned.len(),
        unresolved = validator.report.unresolved.len(),
        "validated data tree"
    );
    Ok(validator.report)
}

struct Validator<'a> {
    ctx: &'a Context,
    options: &'a ValidateOptions,
    report: ValidationReport,
}

impl<'a> Validator<'a> {
    /// Nodes covered by this validation, in document order
    fn scope(&self, tree: &DataTree) -> Vec<DataId> {
        if self.options.no_siblings {
            tree.roots()
                .first()
                .map(|r| tree.subtree(*r))
                .unwrap_or_default()
        } else {
            tree.iter()
        }
    }

    fn fail(&self, tree: &DataTree, id: DataId, kind: ErrorKind, message: String) -> ValidationError {
        ValidationError::new(kind, message)
            .with_data_path(tree.path(self.ctx, id))
            .with_schema_path(self.ctx.data_path(tree.node(id).schema))
    }

    fn missing(&self, tree: &DataTree, parent: Option<DataId>, schema: NodeId, message: String) -> ValidationError {
        let data_path = parent.map_or_else(|| "/".to_string(), |p| tree.path(self.ctx, p));
        ValidationError::new(ErrorKind::ConstraintViolation, message)
            .with_data_path(data_path)
            .with_schema_path(self.ctx.data_path(schema))
    }

    // =========================================================================
    // Structure
    // =========================================================================

    fn check_structure(&mut self, tree: &mut DataTree) -> Result<()> {
        let scope = self.scope(tree);
        for &id in &scope {
            if let Some(canonical) = self.check_node(tree, id)? {
                tree.node_mut(id).value = Some(canonical);
            }
        }
        if !self.options.no_siblings {
            self.check_siblings(tree, None)?;
        }
        for &id in &scope {
            if self.ctx.node(tree.node(id).schema).is(NodeTypes::CONTAINER | NodeTypes::LIST) {
                self.check_siblings(tree, Some(id))?;
            }
        }
        Ok(())
    }

    /// Check one node, returning the canonical form of its value
    fn check_node(&self, tree: &DataTree, id: DataId) -> Result<Option<String>> {
        let ctx = self.ctx;
        let schema = tree.node(id).schema;
        let sn = ctx.node(schema);
        if sn.removed {
            return Err(self
                .fail(tree, id, ErrorKind::ConstraintViolation, format!("Node '{}' is not supported", sn.name))
                .into());
        }
        if !ctx.node_enabled(schema) {
            return Err(self
                .fail(
                    tree,
                    id,
                    ErrorKind::ConstraintViolation,
                    format!("Node '{}' is disabled by if-feature", sn.name),
                )
                .into());
        }
        if self.options.config_only() && !sn.is_config() {
            return Err(self
                .fail(
                    tree,
                    id,
                    ErrorKind::ConstraintViolation,
                    format!("State data '{}' is not allowed in a configuration tree", sn.name),
                )
                .into());
        }

        let (Some(ty), Some(value)) = (sn.leaf_type(), tree.node(id).value.as_deref()) else {
            return Ok(None);
        };
        let prefixes = |p: &str| ctx.module_by_name(p);
        let scope = ValueScope {
            prefixes: &prefixes,
            default_module: sn.module,
            leafref_targets: sn.leafref_targets(),
            schema_literal: false,
        };
        let canonical = ctx.check_value(ty, value, &scope).map_err(|e| {
            self.fail(tree, id, ErrorKind::ConstraintViolation, format!("Invalid value of '{}': {}", sn.name, e))
        })?;
        if ty.base == BuiltinKind::Identityref && sn.flags.status != Status::Obsolete {
            let identity = canonical
                .split_once(':')
                .and_then(|(m, name)| ctx.find_identity(m, name));
            if let Some(identity) = identity {
                if ctx.identity(identity).status == Status::Obsolete {
                    return Err(self
                        .fail(
                            tree,
                            id,
                            ErrorKind::ConstraintViolation,
                            format!("Value '{}' of '{}' refers to an obsolete identity", canonical, sn.name),
                        )
                        .into());
                }
            }
        }
        Ok(Some(canonical))
    }

    fn check_siblings(&self, tree: &mut DataTree, parent: Option<DataId>) -> Result<()> {
        let ctx = self.ctx;
        if let Some(p) = parent {
            self.check_keys(tree, p)?;
        }

        let mut groups: IndexMap<NodeId, Vec<DataId>> = IndexMap::new();
        for &child in tree.children_of(parent) {
            groups.entry(tree.node(child).schema).or_default().push(child);
        }

        let mut chosen: IndexMap<NodeId, NodeId> = IndexMap::new();
        for (&schema, instances) in &groups {
            let sn = ctx.node(schema);
            let first = instances[0];

            let mut current = sn.parent;
            let mut below = schema;
            while let Some(p) = current {
                let pn = ctx.node(p);
                if !pn.is(NodeTypes::CHOICE | NodeTypes::CASE) {
                    break;
                }
                if pn.is(NodeTypes::CHOICE) {
                    match chosen.get(&p) {
                        Some(case) if *case != below => {
                            return Err(self
                                .fail(
                                    tree,
                                    first,
                                    ErrorKind::ConstraintViolation,
                                    format!("Data for more than one case of choice '{}'", pn.name),
                                )
                                .into());
                        }
                        _ => {
                            chosen.insert(p, below);
                        }
                    }
                }
                below = p;
                current = pn.parent;
            }

            match &sn.kind {
                NodeKind::List(info) => {
                    if !self.options.result_tree() {
                        self.check_list_instances(tree, schema, instances, &info.keys)?;
                    }
                    if !self.options.relaxed_uniqueness() {
                        for unique in &info.uniques {
                            self.check_unique(tree, schema, instances, &unique.text, &unique.leaves)?;
                        }
                    }
                }
                NodeKind::LeafList(_) => {
                    if !self.options.relaxed_uniqueness() && sn.is_config() {
                        let mut seen = IndexSet::new();
                        for &entry in instances {
                            let value = tree.node(entry).value.clone().unwrap_or_default();
                            if !seen.insert(value.clone()) {
                                return Err(self
                                    .fail(
                                        tree,
                                        entry,
                                        ErrorKind::ConstraintViolation,
                                        format!("Duplicate value '{}' of leaf-list '{}'", value, sn.name),
                                    )
                                    .into());
                            }
                        }
                    }
                }
                _ if instances.len() > 1 => {
                    return Err(self
                        .fail(
                            tree,
                            instances[1],
                            ErrorKind::ConstraintViolation,
                            format!("Duplicate instance of '{}'", sn.name),
                        )
                        .into());
                }
                _ => {}
            }

            if let Some((_, Some(max))) = sn.cardinality() {
                if instances.len() > max as usize {
                    return Err(self
                        .fail(
                            tree,
                            instances[max as usize],
                            ErrorKind::ConstraintViolation,
                            format!(
                                "Too many instances of '{}' ({} > max-elements {})",
                                sn.name,
                                instances.len(),
                                max
                            ),
                        )
                        .with_app_tag("too-many-elements")
                        .into());
                }
            }
        }

        for child in tree.children_of(parent).to_vec() {
            tree.node_mut(child).validity.remove(Validity::UNIQUE);
        }
        Ok(())
    }

    /// Keys must be the first children of a list entry, in key order
    fn check_keys(&self, tree: &DataTree, entry: DataId) -> Result<()> {
        let schema = self.ctx.node(tree.node(entry).schema);
        let children = &tree.node(entry).children;
        for (i, &key) in schema.keys().iter().enumerate() {
            if children.get(i).map(|c| tree.node(*c).schema) == Some(key) {
                continue;
            }
            let key_name = &self.ctx.node(key).name;
            let message = if children.iter().any(|c| tree.node(*c).schema == key) {
                format!("Key '{}' of list '{}' is out of order", key_name, schema.name)
            } else {
                format!("List '{}' is missing key '{}'", schema.name, key_name)
            };
            return Err(self.fail(tree, entry, ErrorKind::ConstraintViolation, message).into());
        }
        Ok(())
    }

    fn key_values(&self, tree: &DataTree, entry: DataId, keys: &[NodeId]) -> Vec<String> {
        keys.iter()
            .map(|k| {
                tree.node(entry)
                    .children
                    .iter()
                    .find(|c| tree.node(**c).schema == *k)
                    .and_then(|c| tree.node(*c).value.clone())
                    .unwrap_or_default()
            })
            .collect()
    }

    fn check_list_instances(&self, tree: &DataTree, schema: NodeId, instances: &[DataId], keys: &[NodeId]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let name = &self.ctx.node(schema).name;
        let mut seen = IndexSet::new();
        for &entry in instances {
            let values = self.key_values(tree, entry, keys);
            if !seen.insert(values.clone()) {
                let predicate: Vec<String> = keys
                    .iter()
                    .zip(&values)
                    .map(|(k, v)| format!("[{}='{}']", self.ctx.node(*k).name, v))
                    .collect();
                return Err(self
                    .fail(
                        tree,
                        entry,
                        ErrorKind::ConstraintViolation,
                        format!("Duplicate instance of list '{}' with key {}", name, predicate.concat()),
                    )
                    .into());
            }
        }
        Ok(())
    }

    /// Find the data node instantiating `leaf` below a list entry
    fn descendant_value(&self, tree: &DataTree, entry: DataId, leaf: NodeId) -> Option<String> {
        let list_schema = tree.node(entry).schema;
        let mut chain = Vec::new();
        let mut current = Some(leaf);
        while let Some(n) = current {
            if n == list_schema {
                break;
            }
            chain.push(n);
            current = self.ctx.data_parent(n);
        }
        let mut node = entry;
        for schema in chain.into_iter().rev() {
            node = tree.instances(Some(node), schema).into_iter().next()?;
        }
        tree.node(node).value.clone()
    }

    fn check_unique(
        &self,
        tree: &DataTree,
        schema: NodeId,
        instances: &[DataId],
        text: &str,
        leaves: &[NodeId],
    ) -> Result<()> {
        let mut seen = IndexSet::new();
        for &entry in instances {
            let values: Option<Vec<String>> = leaves
                .iter()
                .map(|leaf| self.descendant_value(tree, entry, *leaf))
                .collect();
            let Some(values) = values else {
                continue;
            };
            if !seen.insert(values) {
                return Err(self
                    .fail(
                        tree,
                        entry,
                        ErrorKind::ConstraintViolation,
                        format!(
                            "Unique data \"{}\" of list '{}' is not unique",
                            text,
                            self.ctx.node(schema).name
                        ),
                    )
                    .with_app_tag("data-not-unique")
                    .into());
            }
        }
        Ok(())
    }

    // =========================================================================
    // when
    // =========================================================================

    fn resolve_when(&mut self, tree: &mut DataTree) -> Result<()> {
        loop {
            let mut pruned = false;
            for id in self.scope(tree) {
                if tree.is_removed(id) {
                    continue;
                }
                let schema = tree.node(id).schema;
                if !self.when_holds(tree, id, schema)? {
                    let path = tree.path(self.ctx, id);
                    tracing::debug!(path = %path, "pruning node with false when");
                    self.report.pruned.push(path);
                    tree.remove(id);
                    pruned = true;
                } else {
                    tree.node_mut(id).validity.remove(Validity::WHEN);
                }
            }
            if !pruned {
                return Ok(());
            }
        }
    }

    fn when_holds(&self, tree: &DataTree, id: DataId, schema: NodeId) -> Result<bool> {
        for carrier in self.ctx.when_carriers(schema) {
            let node = self.ctx.node(carrier);
            for cond in &node.when {
                let context = if carrier == schema && !cond.on_parent {
                    Some(id)
                } else {
                    tree.node(id).parent
                };
                let ectx = EvalContext {
                    schema: self.ctx,
                    tree,
                    node: context,
                    current: context,
                    default_module: node.module,
                };
                let value = self.ctx.xpath().evaluate(&cond.expr, &ectx, EvalMode::WhenMust)?;
                if !value.is_truthy() {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Evaluate the `when` of a schema node that has no instance under `parent`
    ///
    /// Choices are evaluated on the parent itself, data nodes on a
    /// placeholder instance that is dropped afterwards.
    fn absent_when_holds(&self, tree: &mut DataTree, parent: Option<DataId>, schema: NodeId) -> Result<bool> {
        let node = self.ctx.node(schema);
        if node.is(NodeTypes::CHOICE | NodeTypes::CASE) {
            for carrier in self.ctx.when_carriers(schema) {
                let carrier_node = self.ctx.node(carrier);
                for cond in &carrier_node.when {
                    let ectx = EvalContext {
                        schema: self.ctx,
                        tree: &*tree,
                        node: parent,
                        current: parent,
                        default_module: carrier_node.module,
                    };
                    if !self.ctx.xpath().evaluate(&cond.expr, &ectx, EvalMode::WhenMust)?.is_truthy() {
                        return Ok(false);
                    }
                }
            }
            return Ok(true);
        }
        let placeholder = tree.push_placeholder(parent, schema);
        let holds = self.when_holds(tree, placeholder, schema);
        tree.pop_placeholder(placeholder);
        holds
    }

    // =========================================================================
    // Mandatory nodes
    // =========================================================================

    fn check_mandatory(&self, tree: &mut DataTree) -> Result<()> {
        let ctx = self.ctx;
        if !self.options.no_siblings {
            for (module, m) in ctx.modules() {
                if !m.implemented {
                    continue;
                }
                let top: Vec<NodeId> = ctx.top_level_data(module).collect();
                self.check_children(tree, None, true, &top)?;
            }
        }
        for id in self.scope(tree) {
            let schema = tree.node(id).schema;
            if ctx.node(schema).is(NodeTypes::CONTAINER | NodeTypes::LIST) {
                let children: Vec<NodeId> = ctx.children(schema).collect();
                self.check_children(tree, Some(id), true, &children)?;
            }
            tree.node_mut(id).validity.remove(Validity::MANDATORY);
        }
        Ok(())
    }

    fn count(&self, tree: &DataTree, parent: Option<DataId>, present: bool, schema: NodeId) -> usize {
        if present {
            tree.instances(parent, schema).len()
        } else {
            0
        }
    }

    /// Whether any data child of `parent` instantiates a node below `case`
    fn case_present(&self, tree: &DataTree, parent: Option<DataId>, case: NodeId) -> bool {
        tree.children_of(parent).iter().any(|c| {
            let mut current = self.ctx.node(tree.node(*c).schema).parent;
            while let Some(p) = current {
                if p == case {
                    return true;
                }
                if !self.ctx.node(p).is(NodeTypes::CHOICE | NodeTypes::CASE) {
                    return false;
                }
                current = self.ctx.node(p).parent;
            }
            false
        })
    }

    /// Check the schema children of `parent`; `present` is false while
    /// descending into an absent non-presence container
    fn check_children(&self, tree: &mut DataTree, parent: Option<DataId>, present: bool, children: &[NodeId]) -> Result<()> {
        let ctx = self.ctx;
        for &child in children {
            let sn = ctx.node(child);
            if sn.removed || !ctx.node_enabled(child) {
                continue;
            }
            // conditions of nodes below an absent container have no context
            if !sn.when.is_empty() && (!present || !self.absent_when_holds(tree, parent, child)?) {
                continue;
            }
            match &sn.kind {
                NodeKind::Choice { .. } => {
                    let cases: Vec<NodeId> = ctx.children(child).collect();
                    let active = cases
                        .iter()
                        .copied()
                        .find(|c| present && self.case_present(tree, parent, *c));
                    match active {
                        Some(case) => {
                            let inner: Vec<NodeId> = ctx.children(case).collect();
                            self.check_children(tree, parent, present, &inner)?;
                        }
                        None if sn.flags.mandatory => {
                            return Err(self
                                .missing(tree, parent, child, format!("Missing mandatory choice '{}'", sn.name))
                                .into())
                        }
                        None => {}
                    }
                }
                NodeKind::Leaf(_) | NodeKind::AnyData { .. } => {
                    if sn.flags.mandatory && self.count(tree, parent, present, child) == 0 {
                        return Err(self
                            .missing(tree, parent, child, format!("Missing mandatory node '{}'", sn.name))
                            .into());
                    }
                }
                NodeKind::List(_) | NodeKind::LeafList(_) => {
                    let Some((min, _)) = sn.cardinality() else {
                        continue;
                    };
                    let count = self.count(tree, parent, present, child);
                    if (count as u32) < min {
                        let message =
                            format!("Too few instances of '{}' ({} < min-elements {})", sn.name, count, min);
                        return Err(self
                            .missing(tree, parent, child, message)
                            .with_app_tag("too-few-elements")
                            .into());
                    }
                }
                NodeKind::Container { presence: None } => {
                    if self.count(tree, parent, present, child) == 0 {
                        let inner: Vec<NodeId> = ctx.children(child).collect();
                        self.check_children(tree, parent, false, &inner)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    // =========================================================================
    // Leafref and instance-identifier
    // =========================================================================

    fn resolve_leafrefs(&mut self, tree: &mut DataTree) -> Result<()> {
        let ctx = self.ctx;
        let module_names = ctx.module_name_map();
        for id in self.scope(tree) {
            let schema = tree.node(id).schema;
            let sn = ctx.node(schema);
            let Some(ty) = sn.leaf_type() else {
                continue;
            };
            let Some(value) = tree.node(id).value.clone() else {
                continue;
            };
            let found = match &ty.info {
                TypeInfo::Leafref {
                    path,
                    require_instance: true,
                } => {
                    let ectx = EvalContext {
                        schema: ctx,
                        tree: &*tree,
                        node: Some(id),
                        current: Some(id),
                        default_module: sn.module,
                    };
                    let targets = ctx.xpath().evaluate(&path.expr, &ectx, EvalMode::LeafrefPath)?;
                    targets.as_nodes().unwrap_or_default().iter().any(|n| match n {
                        XNode::Data(d) => tree.node(*d).value.as_deref() == Some(value.as_str()),
                        XNode::Root => false,
                    })
                }
                TypeInfo::InstanceIdentifier { require_instance: true } => {
                    let expr = ctx.xpath().parse(&value, &module_names)?;
                    let ectx = EvalContext {
                        schema: ctx,
                        tree: &*tree,
                        node: None,
                        current: Some(id),
                        default_module: sn.module,
                    };
                    let targets = ctx.xpath().evaluate(&expr, &ectx, EvalMode::LeafrefPath)?;
                    targets
                        .as_nodes()
                        .map_or(false, |nodes| nodes.iter().any(|n| matches!(n, XNode::Data(_))))
                }
                _ => true,
            };
            if found {
                tree.node_mut(id).validity.remove(Validity::LEAFREF);
                continue;
            }
            let message = match ty.base {
                BuiltinKind::Leafref => format!("Invalid leafref value '{}': no existing target instance", value),
                _ => format!("Instance '{}' referenced by '{}' does not exist", value, sn.name),
            };
            if self.options.full() {
                return Err(self
                    .fail(tree, id, ErrorKind::UnresolvedReference, message)
                    .with_app_tag("instance-required")
                    .into());
            }
            let path = tree.path(ctx, id);
            tracing::warn!(path = %path, "{}", message);
            self.report.warnings.push(format!("{} ({})", message, path));
            self.report.unresolved.push(path);
        }
        Ok(())
    }

    // =========================================================================
    // must
    // =========================================================================

    fn check_musts(&self, tree: &DataTree) -> Result<()> {
        for id in self.scope(tree) {
            let sn = self.ctx.node(tree.node(id).schema);
            for cond in &sn.musts {
                let ectx = EvalContext {
                    schema: self.ctx,
                    tree,
                    node: Some(id),
                    current: Some(id),
                    default_module: sn.module,
                };
                if self.ctx.xpath().evaluate(&cond.expr, &ectx, EvalMode::WhenMust)?.is_truthy() {
                    continue;
                }
                let message = cond
                    .error_message
                    .clone()
                    .unwrap_or_else(|| format!("Must condition \"{}\" not satisfied", cond.expr.text));
                let app_tag = cond.error_app_tag.as_deref().unwrap_or("must-violation");
                return Err(self
                    .fail(tree, id, ErrorKind::ConstraintViolation, message)
                    .with_app_tag(app_tag)
                    .into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn load(schema: &str) -> Context {
        let mut ctx = Context::new();
        ctx.load_yang_str(schema).unwrap();
        ctx
    }

    fn validation(err: Error) -> ValidationError {
        match err {
            Error::Validation(e) => e,
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    const LIST: &str = "module m { namespace urn:m; prefix m;
        container c {
          list l { key k; unique v; leaf k { type string; } leaf v { type int8; } }
          leaf-list tags { type string; max-elements 2; }
        } }";

    #[test]
    fn test_duplicate_list_key() {
        let ctx = load(LIST);
        let mut tree =
            DataTree::from_json_str(&ctx, r#"{"m:c": {"l": [{"k": "a"}, {"k": "a"}]}}"#).unwrap();
        let err = validation(validate(&ctx, &mut tree, &ValidateOptions::new()).unwrap_err());
        assert_eq!(err.kind, ErrorKind::ConstraintViolation);
        assert!(err.message.contains("'l'"));

        let mut tree =
            DataTree::from_json_str(&ctx, r#"{"m:c": {"l": [{"k": "a"}, {"k": "a"}]}}"#).unwrap();
        assert!(validate(&ctx, &mut tree, &ValidateOptions::get()).is_ok());
    }

    #[test]
    fn test_unique_and_max_elements() {
        let ctx = load(LIST);
        let mut tree = DataTree::from_json_str(
            &ctx,
            r#"{"m:c": {"l": [{"k": "a", "v": 1}, {"k": "b", "v": 1}]}}"#,
        )
        .unwrap();
        let err = validation(validate(&ctx, &mut tree, &ValidateOptions::new()).unwrap_err());
        assert_eq!(err.app_tag.as_deref(), Some("data-not-unique"));

        let mut tree =
            DataTree::from_json_str(&ctx, r#"{"m:c": {"tags": ["a", "b", "c"]}}"#).unwrap();
        let err = validation(validate(&ctx, &mut tree, &ValidateOptions::new()).unwrap_err());
        assert_eq!(err.app_tag.as_deref(), Some("too-many-elements"));
    }

    #[test]
    fn test_key_order() {
        let ctx = load(LIST);
        let mut tree = DataTree::new();
        let c = tree.add_inner(&ctx, None, "m:c").unwrap();
        let l = tree.add_inner(&ctx, Some(c), "l").unwrap();
        tree.add_leaf(&ctx, Some(l), "v", "1").unwrap();
        tree.add_leaf(&ctx, Some(l), "k", "a").unwrap();
        let err = validation(validate(&ctx, &mut tree, &ValidateOptions::new()).unwrap_err());
        assert!(err.message.contains("out of order"));

        let mut tree = DataTree::new();
        let c = tree.add_inner(&ctx, None, "m:c").unwrap();
        let l = tree.add_inner(&ctx, Some(c), "l").unwrap();
        tree.add_leaf(&ctx, Some(l), "v", "1").unwrap();
        let err = validation(validate(&ctx, &mut tree, &ValidateOptions::new()).unwrap_err());
        assert!(err.message.contains("missing key"));
    }

    #[test]
    fn test_canonical_values() {
        let ctx = load(LIST);
        let mut tree =
            DataTree::from_json_str(&ctx, r#"{"m:c": {"l": [{"k": "a", "v": "+07"}]}}"#).unwrap();
        validate(&ctx, &mut tree, &ValidateOptions::new()).unwrap();
        let c = tree.roots()[0];
        let l = tree.find_child(&ctx, Some(c), "l").unwrap();
        let v = tree.find_child(&ctx, Some(l), "v").unwrap();
        assert_eq!(tree.node(v).value.as_deref(), Some("7"));
        assert!(tree.node(v).is_validated());

        let mut tree =
            DataTree::from_json_str(&ctx, r#"{"m:c": {"l": [{"k": "a", "v": 300}]}}"#).unwrap();
        assert!(validate(&ctx, &mut tree, &ValidateOptions::new()).is_err());
    }

    #[test]
    fn test_mandatory() {
        let ctx = load(
            "module m { namespace urn:m; prefix m;
               container c {
                 container inner { leaf req { type string; mandatory true; } }
                 container opt { presence p; leaf req { type string; mandatory true; } }
                 choice ch { case a { leaf x { type string; mandatory true; } leaf y { type string; } } case b { leaf z { type string; } } }
               } }",
        );
        let mut tree = DataTree::from_json_str(&ctx, r#"{"m:c": {}}"#).unwrap();
        let err = validation(validate(&ctx, &mut tree, &ValidateOptions::new()).unwrap_err());
        assert!(err.message.contains("'req'"));

        let mut tree = DataTree::from_json_str(&ctx, r#"{"m:c": {}}"#).unwrap();
        assert!(validate(&ctx, &mut tree, &ValidateOptions::edit()).is_ok());

        let mut tree =
            DataTree::from_json_str(&ctx, r#"{"m:c": {"inner": {"req": "r"}, "y": "1"}}"#).unwrap();
        let err = validation(validate(&ctx, &mut tree, &ValidateOptions::new()).unwrap_err());
        assert!(err.message.contains("'x'"));

        let mut tree =
            DataTree::from_json_str(&ctx, r#"{"m:c": {"inner": {"req": "r"}, "z": "1"}}"#).unwrap();
        assert!(validate(&ctx, &mut tree, &ValidateOptions::new()).is_ok());
    }

    #[test]
    fn test_two_cases() {
        let ctx = load(
            "module m { namespace urn:m; prefix m;
               container c { choice ch { leaf a { type string; } leaf b { type string; } } } }",
        );
        let mut tree = DataTree::from_json_str(&ctx, r#"{"m:c": {"a": "1", "b": "2"}}"#).unwrap();
        let err = validation(validate(&ctx, &mut tree, &ValidateOptions::new()).unwrap_err());
        assert!(err.message.contains("choice 'ch'"));
    }

    #[test]
    fn test_when_prunes() {
        let ctx = load(
            "module m { namespace urn:m; prefix m;
               container c {
                 leaf mode { type string; }
                 leaf extra { when \"../mode = 'on'\"; type string; mandatory true; }
               } }",
        );
        let mut tree =
            DataTree::from_json_str(&ctx, r#"{"m:c": {"mode": "off", "extra": "x"}}"#).unwrap();
        let report = validate(&ctx, &mut tree, &ValidateOptions::new()).unwrap();
        assert_eq!(report.pruned, vec!["/m:c/extra".to_string()]);
        assert_eq!(tree.len(), 2);

        let mut tree =
            DataTree::from_json_str(&ctx, r#"{"m:c": {"mode": "on", "extra": "x"}}"#).unwrap();
        let report = validate(&ctx, &mut tree, &ValidateOptions::new()).unwrap();
        assert!(report.pruned.is_empty());
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_edit_relaxes_uniqueness() {
        let ctx = load(LIST);
        let text = r#"{"m:c": {"l": [{"k": "a", "v": 1}, {"k": "b", "v": 1}], "tags": ["x", "x"]}}"#;

        let mut tree = DataTree::from_json_str(&ctx, text).unwrap();
        assert!(validate(&ctx, &mut tree, &ValidateOptions::edit()).is_ok());

        let mut tree = DataTree::from_json_str(&ctx, text).unwrap();
        let err = validation(validate(&ctx, &mut tree, &ValidateOptions::new()).unwrap_err());
        assert_eq!(err.app_tag.as_deref(), Some("data-not-unique"));

        // keys still identify entries in an edit
        let mut tree =
            DataTree::from_json_str(&ctx, r#"{"m:c": {"l": [{"k": "a"}, {"k": "a"}]}}"#).unwrap();
        assert!(validate(&ctx, &mut tree, &ValidateOptions::edit()).is_err());
    }

    #[test]
    fn test_duplicate_container_instance() {
        let ctx = load(LIST);
        let mut tree = DataTree::new();
        tree.add_inner(&ctx, None, "m:c").unwrap();
        tree.add_inner(&ctx, None, "m:c").unwrap();
        let err = validation(validate(&ctx, &mut tree, &ValidateOptions::new()).unwrap_err());
        assert_eq!(err.kind, ErrorKind::ConstraintViolation);
        assert!(err.message.contains("Duplicate instance of 'c'"));
    }

    #[test]
    fn test_mandatory_under_true_when() {
        let ctx = load(
            "module m { namespace urn:m; prefix m;
               container c {
                 leaf mode { type string; }
                 leaf extra { when \"../mode = 'on'\"; type string; mandatory true; }
               } }",
        );
        let mut tree = DataTree::from_json_str(&ctx, r#"{"m:c": {"mode": "on"}}"#).unwrap();
        let err = validation(validate(&ctx, &mut tree, &ValidateOptions::new()).unwrap_err());
        assert!(err.message.contains("'extra'"));
        assert_eq!(tree.len(), 2);

        let mut tree = DataTree::from_json_str(&ctx, r#"{"m:c": {"mode": "off"}}"#).unwrap();
        assert!(validate(&ctx, &mut tree, &ValidateOptions::new()).is_ok());
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_mandatory_choice_under_when() {
        let ctx = load(
            "module m { namespace urn:m; prefix m;
               container c {
                 leaf mode { type string; }
                 choice how {
                   when \"mode = 'on'\";
                   mandatory true;
                   leaf fast { type empty; }
                   leaf slow { type empty; }
                 }
               } }",
        );
        let mut tree = DataTree::from_json_str(&ctx, r#"{"m:c": {"mode": "on"}}"#).unwrap();
        let err = validation(validate(&ctx, &mut tree, &ValidateOptions::new()).unwrap_err());
        assert!(err.message.contains("choice 'how'"));

        let mut tree = DataTree::from_json_str(&ctx, r#"{"m:c": {"mode": "off"}}"#).unwrap();
        assert!(validate(&ctx, &mut tree, &ValidateOptions::new()).is_ok());
    }

    #[test]
    fn test_must() {
        let ctx = load(
            "module m { namespace urn:m; prefix m;
               container c {
                 must 'low <= high' { error-message 'low above high'; }
                 leaf low { type int32; }
                 leaf high { type int32; }
               } }",
        );
        let mut tree = DataTree::from_json_str(&ctx, r#"{"m:c": {"low": 5, "high": 1}}"#).unwrap();
        let err = validation(validate(&ctx, &mut tree, &ValidateOptions::new()).unwrap_err());
        assert_eq!(err.message, "low above high");
        assert_eq!(err.app_tag.as_deref(), Some("must-violation"));
        assert_eq!(err.data_path.as_deref(), Some("/m:c"));

        let mut tree = DataTree::from_json_str(&ctx, r#"{"m:c": {"low": 1, "high": 5}}"#).unwrap();
        assert!(validate(&ctx, &mut tree, &ValidateOptions::new()).is_ok());
    }

    #[test]
    fn test_leafref_resolution() {
        let ctx = load(
            "module m { namespace urn:m; prefix m;
               container c {
                 list item { key name; leaf name { type string; } }
                 leaf selected { type leafref { path '../item/name'; } }
               } }",
        );
        let text = r#"{"m:c": {"item": [{"name": "a"}], "selected": "b"}}"#;
        let mut tree = DataTree::from_json_str(&ctx, text).unwrap();
        let err = validation(validate(&ctx, &mut tree, &ValidateOptions::new()).unwrap_err());
        assert_eq!(err.app_tag.as_deref(), Some("instance-required"));

        let mut tree = DataTree::from_json_str(&ctx, text).unwrap();
        let report = validate(&ctx, &mut tree, &ValidateOptions::edit()).unwrap();
        assert_eq!(report.unresolved, vec!["/m:c/selected".to_string()]);

        let mut tree =
            DataTree::from_json_str(&ctx, r#"{"m:c": {"item": [{"name": "a"}], "selected": "a"}}"#).unwrap();
        assert!(validate(&ctx, &mut tree, &ValidateOptions::new()).unwrap().is_clean());
    }

    #[test]
    fn test_state_data_in_config_tree() {
        let ctx = load(
            "module m { namespace urn:m; prefix m;
               container c { leaf s { type string; config false; } } }",
        );
        let mut tree = DataTree::from_json_str(&ctx, r#"{"m:c": {"s": "x"}}"#).unwrap();
        assert!(validate(&ctx, &mut tree, &ValidateOptions::get_config()).is_err());
        let mut tree = DataTree::from_json_str(&ctx, r#"{"m:c": {"s": "x"}}"#).unwrap();
        assert!(validate(&ctx, &mut tree, &ValidateOptions::get()).is_ok());
    }

    #[test]
    fn test_disabled_feature() {
        let mut ctx = Context::new();
        let m = ctx
            .load_yang_str(
                "module m { namespace urn:m; prefix m; feature f;
                   container c { leaf x { if-feature f; type string; } } }",
            )
            .unwrap();
        let text = r#"{"m:c": {"x": "1"}}"#;
        let mut tree = DataTree::from_json_str(&ctx, text).unwrap();
        assert!(validate(&ctx, &mut tree, &ValidateOptions::new()).is_err());
        ctx.enable_feature(m, "f").unwrap();
        let mut tree = DataTree::from_json_str(&ctx, text).unwrap();
        assert!(validate(&ctx, &mut tree, &ValidateOptions::new()).is_ok());
    }

    #[test]
    fn test_trusted_skips_structure() {
        let ctx = load(LIST);
        let mut tree =
            DataTree::from_json_str(&ctx, r#"{"m:c": {"l": [{"k": "a"}, {"k": "a"}]}}"#).unwrap();
        assert!(validate(&ctx, &mut tree, &ValidateOptions::trusted()).is_ok());
    }
}
