//! Module compilation driver
//!
//! [`compile_module`] runs the header, registration, node construction and
//! worklist passes for one module. Imported modules are compiled first as
//! parsed-only; [`implement_module`] applies augments and deviations.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use crate::error::{Error, Result, SchemaError};
use crate::ids::{FeatureId, ModuleId, NodeId, TypedefId};
use crate::names::{self, IDENTIFIER_WARN_LENGTH};
use crate::plugins;
use crate::statement::Statement;

use super::iffeature::{parse_if_feature, Feature, IfFeature};
use super::identity::Identity;
use super::node::{
    AugmentInfo, Condition, ExtensionInstance, LeafInfo, LeafListInfo, ListInfo, NodeKind,
    SchemaNode, Status, UniqueSpec, UsesInfo,
};
use super::resolver::trace_cycle;
use super::typecomp::{parse_bool_arg, TypeOutcome, TypeScope};
use super::types::{BuiltinKind, Type, Typedef};
use super::value::ValueScope;
use super::{
    Context, Deviation, Extension, Import, Module, NodeTypes, Submodule, Unit, YangVersion,
};

/// Statements that define data nodes in a body
const DATA_KEYWORDS: &[&str] = &[
    "container", "leaf", "leaf-list", "list", "choice", "anydata", "anyxml", "uses",
];

/// Statements a choice wraps in an implicit case
const SHORTHAND_KEYWORDS: &[&str] = &[
    "container", "leaf", "leaf-list", "list", "anydata", "anyxml", "choice",
];

fn compile_error(module: &str, err: SchemaError) -> Error {
    let err = if err.module.is_none() {
        err.with_module(module)
    } else {
        err
    };
    Error::Compile {
        module: module.to_string(),
        errors: vec![err],
    }
}

fn required_arg<'a>(stmt: &'a Statement, keyword: &str) -> std::result::Result<&'a str, SchemaError> {
    stmt.find_arg(keyword).ok_or_else(|| {
        SchemaError::syntax(format!(
            "Missing '{}' in {} '{}'",
            keyword,
            stmt.keyword,
            stmt.arg()
        ))
        .with_position(stmt.position)
    })
}

pub(crate) fn parse_status(stmt: &Statement) -> std::result::Result<Status, SchemaError> {
    match stmt.find("status") {
        Some(s) => Status::from_str(s.arg()).map_err(|e| e.with_position(s.position)),
        None => Ok(Status::Current),
    }
}

pub(crate) fn parse_min_elements(stmt: &Statement) -> std::result::Result<u32, SchemaError> {
    match stmt.find("min-elements") {
        Some(m) => m.arg().parse::<u32>().map_err(|_| {
            SchemaError::syntax(format!("Invalid min-elements '{}'", m.arg())).with_position(m.position)
        }),
        None => Ok(0),
    }
}

pub(crate) fn parse_max_elements(stmt: &Statement) -> std::result::Result<Option<u32>, SchemaError> {
    match stmt.find("max-elements") {
        Some(m) if m.arg() == "unbounded" => Ok(None),
        Some(m) => match m.arg().parse::<u32>() {
            Ok(n) if n > 0 => Ok(Some(n)),
            _ => Err(SchemaError::syntax(format!("Invalid max-elements '{}'", m.arg()))
                .with_position(m.position)),
        },
        None => Ok(None),
    }
}

fn parse_revisions(ctx: &mut Context, stmt: &Statement) -> std::result::Result<Vec<String>, SchemaError> {
    let mut revisions: Vec<String> = Vec::new();
    for r in stmt.find_all("revision") {
        names::validate_date(r.arg()).map_err(|e| e.with_position(r.position))?;
        if revisions.iter().any(|x| x == r.arg()) {
            ctx.warn(format!(
                "Duplicate revision '{}' in '{}'",
                r.arg(),
                stmt.arg()
            ));
            continue;
        }
        revisions.push(r.arg().to_string());
    }
    revisions.sort_by(|a, b| b.cmp(a));
    Ok(revisions)
}

fn check_identifier(ctx: &mut Context, name: &str, stmt: &Statement) -> std::result::Result<(), SchemaError> {
    names::validate_identifier(name).map_err(|e| e.with_position(stmt.position))?;
    if name.len() > IDENTIFIER_WARN_LENGTH {
        ctx.warn(format!(
            "Identifier '{}' is longer than {} characters",
            name, IDENTIFIER_WARN_LENGTH
        ));
    }
    Ok(())
}

impl Context {
    /// YANG version of a unit
    pub(crate) fn unit_version(&self, unit: Unit) -> YangVersion {
        let module = self.module(unit.module);
        match unit.submodule {
            Some(i) => module.submodules[i].version,
            None => module.version,
        }
    }

    /// Compile a `when` or `must` statement
    pub(crate) fn compile_condition(
        &self,
        unit: Unit,
        stmt: &Statement,
    ) -> std::result::Result<Condition, SchemaError> {
        let expr = self
            .xpath()
            .parse(stmt.arg(), &self.namespace_map(unit))
            .map_err(|e| {
                SchemaError::syntax(format!("Invalid XPath '{}': {}", stmt.arg(), e))
                    .with_position(stmt.position)
            })?;
        Ok(Condition {
            expr,
            error_message: stmt.find_arg("error-message").map(str::to_string),
            error_app_tag: stmt.find_arg("error-app-tag").map(str::to_string),
            on_parent: false,
        })
    }

    /// Compile the `if-feature` substatements of a definition
    pub(crate) fn compile_if_features(
        &self,
        unit: Unit,
        stmt: &Statement,
        status: Status,
    ) -> std::result::Result<Vec<IfFeature>, SchemaError> {
        let yang_1_1 = self.unit_version(unit) == YangVersion::V1_1;
        let mut out = Vec::new();
        for iff in stmt.find_all("if-feature") {
            let mut resolve = |name: &str| {
                let id = self.find_feature(unit, name)?;
                let feature = self.feature(id);
                if !status.may_reference(feature.status) {
                    return Err(SchemaError::constraint(format!(
                        "A {} definition references {} feature '{}'",
                        status, feature.status, feature.name
                    )));
                }
                Ok(id)
            };
            let expr = parse_if_feature(iff.arg(), yang_1_1, &mut resolve)
                .map_err(|e| e.with_position(iff.position))?;
            out.push(IfFeature {
                text: iff.arg().to_string(),
                expr,
            });
        }
        Ok(out)
    }

    /// Extension instances among the substatements of `stmt`
    pub(crate) fn extension_instances(
        &self,
        unit: Unit,
        stmt: &Statement,
    ) -> std::result::Result<Vec<ExtensionInstance>, SchemaError> {
        let mut out = Vec::new();
        for child in stmt.children.iter().filter(|c| c.is_extension()) {
            let (module, name) = self
                .find_extension(unit, &child.keyword)
                .map_err(|e| e.with_position(child.position))?;
            let handled = plugins::extension(&self.module(module).name, &name).is_some();
            tracing::trace!(extension = %child.keyword, handled, "extension instance");
            out.push(ExtensionInstance {
                module,
                name,
                argument: child.argument.clone(),
                handled,
            });
        }
        Ok(out)
    }

    fn typedef_scope(&self, id: TypedefId) -> (Option<&Statement>, TypeScope) {
        let td = self.typedef(id);
        (
            td.stmt.find("type"),
            TypeScope {
                unit: td.unit,
                scope: td.scope,
                status: td.status,
                version: self.unit_version(td.unit),
            },
        )
    }
}

/// Compile a registered module source
pub(crate) fn compile_module(ctx: &mut Context, name: &str, implement: bool) -> Result<ModuleId> {
    if let Some(id) = ctx.module_by_name(name) {
        if implement && !ctx.module(id).implemented {
            implement_module(ctx, id)?;
        }
        return Ok(id);
    }
    if ctx.loading.iter().any(|m| m == name) {
        let mut chain = ctx.loading.clone();
        chain.push(name.to_string());
        return Err(compile_error(
            name,
            SchemaError::circular(format!("Circular import chain ({})", chain.join(" -> "))),
        ));
    }
    ctx.limits().check_import_depth(ctx.loading.len() + 1)?;
    let stmt = ctx
        .source(name)
        .cloned()
        .ok_or_else(|| Error::NotFound(format!("module '{}'", name)))?;
    if stmt.keyword != "module" {
        return Err(compile_error(
            name,
            SchemaError::syntax(format!("'{}' is a submodule, not a module", name)),
        ));
    }

    tracing::debug!(module = name, implement, "compiling module");
    ctx.loading.push(name.to_string());
    let result = ModuleCompiler::run(ctx, &stmt);
    ctx.loading.pop();
    let id = result?;

    if implement {
        implement_module(ctx, id)?;
    } else {
        ctx.finalize_module(id).map_err(|e| compile_error(name, e))?;
    }
    Ok(id)
}

/// Mark a module implemented and apply its augments and deviations
pub(crate) fn implement_module(ctx: &mut Context, id: ModuleId) -> Result<()> {
    let name = ctx.module(id).name.clone();
    ctx.module_mut(id).implemented = true;

    let mut touched: IndexSet<ModuleId> = IndexSet::new();
    touched.insert(id);
    let augmented = ctx.apply_augments(id).map_err(|e| compile_error(&name, e))?;
    touched.extend(augmented);
    let deviated = ctx.apply_deviations(id).map_err(|e| compile_error(&name, e))?;
    touched.extend(deviated);

    // augmented and deviated modules are implemented too
    for &module in &touched {
        if !ctx.module(module).implemented {
            implement_module(ctx, module)?;
        }
    }
    for module in touched {
        ctx.finalize_module(module).map_err(|e| compile_error(&name, e))?;
    }
    tracing::debug!(module = %name, "module implemented");
    Ok(())
}

// =============================================================================
// Module compiler
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum TypeSlot {
    Typedef(TypedefId),
    Node(NodeId),
}

#[derive(Debug, Clone)]
struct PendingType {
    slot: TypeSlot,
    stmt: Statement,
    scope: TypeScope,
}

struct ModuleCompiler<'c> {
    ctx: &'c mut Context,
    module: ModuleId,
    types: Vec<PendingType>,
    uses: Vec<NodeId>,
}

impl<'c> ModuleCompiler<'c> {
    fn run(ctx: &'c mut Context, stmt: &Statement) -> Result<ModuleId> {
        let name = stmt.arg().to_string();
        let module = create_module(ctx, stmt)?;
        let mut compiler = ModuleCompiler {
            ctx,
            module,
            types: Vec::new(),
            uses: Vec::new(),
        };
        compiler.compile().map_err(|e| compile_error(&name, e))?;
        Ok(module)
    }

    fn bodies(&self) -> Vec<(Unit, Statement)> {
        let module = self.ctx.module(self.module);
        let mut out = vec![(Unit::main(self.module), module.stmt.clone())];
        for (i, sub) in module.submodules.iter().enumerate() {
            out.push((
                Unit {
                    module: self.module,
                    submodule: Some(i),
                },
                sub.stmt.clone(),
            ));
        }
        out
    }

    fn compile(&mut self) -> std::result::Result<(), SchemaError> {
        let bodies = self.bodies();

        for (unit, body) in &bodies {
            self.ctx.extension_instances(*unit, body)?;
            for child in &body.children {
                match child.keyword.as_str() {
                    "feature" => self.register_feature(*unit, child)?,
                    "identity" => self.register_identity(*unit, child)?,
                    "typedef" => self.register_typedef(*unit, None, child)?,
                    "extension" => self.register_extension(child)?,
                    _ => {}
                }
            }
        }
        self.resolve_features()?;
        self.resolve_identities()?;
        tracing::debug!(module = %self.ctx.module(self.module).name, "definitions registered");

        for (unit, body) in &bodies {
            for child in &body.children {
                let kw = child.keyword.as_str();
                if DATA_KEYWORDS.contains(&kw) {
                    let id = self.build_node(child, None, *unit)?;
                    self.ctx.module_mut(self.module).data.push(id);
                } else if kw == "rpc" {
                    let id = self.build_node(child, None, *unit)?;
                    self.ctx.module_mut(self.module).rpcs.push(id);
                } else if kw == "notification" {
                    let id = self.build_node(child, None, *unit)?;
                    self.ctx.module_mut(self.module).notifications.push(id);
                } else if kw == "augment" {
                    let id = self.build_node(child, None, *unit)?;
                    self.ctx.module_mut(self.module).augments.push(id);
                } else if kw == "grouping" {
                    self.build_grouping(child, None, *unit)?;
                } else if kw == "deviation" {
                    self.ctx.module_mut(self.module).deviations.push(Deviation {
                        target: child.arg().to_string(),
                        unit: *unit,
                        stmt: child.clone(),
                        target_node: None,
                    });
                }
            }
        }

        self.resolve_types()?;
        self.check_typedef_defaults()?;
        let uses = std::mem::take(&mut self.uses);
        self.ctx.expand_uses(uses)?;
        Ok(())
    }

    // =========================================================================
    // Registration
    // =========================================================================

    fn register_feature(&mut self, unit: Unit, stmt: &Statement) -> std::result::Result<(), SchemaError> {
        let name = stmt.arg();
        check_identifier(self.ctx, name, stmt)?;
        if self.ctx.module(self.module).features.contains_key(name) {
            return Err(SchemaError::duplicate(format!("Duplicate feature '{}'", name))
                .with_position(stmt.position));
        }
        let id = self.ctx.add_feature(Feature {
            name: name.to_string(),
            module: self.module,
            unit,
            if_features: Vec::new(),
            enabled: false,
            status: parse_status(stmt)?,
            stmt: stmt.clone(),
            position: stmt.position,
        });
        self.ctx
            .module_mut(self.module)
            .features
            .insert(name.to_string(), id);
        Ok(())
    }

    fn register_identity(&mut self, unit: Unit, stmt: &Statement) -> std::result::Result<(), SchemaError> {
        let name = stmt.arg();
        check_identifier(self.ctx, name, stmt)?;
        if self.ctx.module(self.module).identities.contains_key(name) {
            return Err(SchemaError::duplicate(format!("Duplicate identity '{}'", name))
                .with_position(stmt.position));
        }
        let id = self.ctx.add_identity(Identity {
            name: name.to_string(),
            module: self.module,
            unit,
            bases: Vec::new(),
            derived: Vec::new(),
            if_features: Vec::new(),
            status: parse_status(stmt)?,
            stmt: stmt.clone(),
            position: stmt.position,
        });
        self.ctx
            .module_mut(self.module)
            .identities
            .insert(name.to_string(), id);
        Ok(())
    }

    fn register_typedef(
        &mut self,
        unit: Unit,
        scope: Option<NodeId>,
        stmt: &Statement,
    ) -> std::result::Result<(), SchemaError> {
        let name = stmt.arg();
        check_identifier(self.ctx, name, stmt)?;
        if BuiltinKind::from_name(name).is_some() {
            return Err(SchemaError::duplicate(format!(
                "Typedef '{}' conflicts with a built-in type",
                name
            ))
            .with_position(stmt.position));
        }
        if self.ctx.scoped_name_taken(self.module, scope, name, true) {
            return Err(SchemaError::duplicate(format!("Duplicate typedef '{}'", name))
                .with_position(stmt.position));
        }
        let type_stmt = stmt
            .find("type")
            .ok_or_else(|| {
                SchemaError::syntax(format!("Missing 'type' in typedef '{}'", name))
                    .with_position(stmt.position)
            })?
            .clone();
        let status = parse_status(stmt)?;
        let id = self.ctx.add_typedef(Typedef {
            name: name.to_string(),
            module: self.module,
            unit,
            scope,
            stmt: stmt.clone(),
            ty: None,
            default: stmt.find_arg("default").map(str::to_string),
            units: stmt.find_arg("units").map(str::to_string),
            status,
            position: stmt.position,
        });
        match scope {
            Some(node) => {
                self.ctx.node_mut(node).typedefs.insert(name.to_string(), id);
            }
            None => {
                self.ctx
                    .module_mut(self.module)
                    .typedefs
                    .insert(name.to_string(), id);
            }
        }
        self.types.push(PendingType {
            slot: TypeSlot::Typedef(id),
            stmt: type_stmt,
            scope: TypeScope {
                unit,
                scope,
                status,
                version: self.ctx.unit_version(unit),
            },
        });
        Ok(())
    }

    fn register_extension(&mut self, stmt: &Statement) -> std::result::Result<(), SchemaError> {
        let name = stmt.arg();
        check_identifier(self.ctx, name, stmt)?;
        if self.ctx.module(self.module).extensions.contains_key(name) {
            return Err(SchemaError::duplicate(format!("Duplicate extension '{}'", name))
                .with_position(stmt.position));
        }
        let argument = stmt.find("argument");
        let yin_element = match argument.and_then(|a| a.find("yin-element")) {
            Some(y) => parse_bool_arg(y)?,
            None => false,
        };
        let extension = Extension {
            name: name.to_string(),
            module: self.module,
            argument: argument.map(|a| a.arg().to_string()),
            yin_element,
            status: parse_status(stmt)?,
        };
        self.ctx
            .module_mut(self.module)
            .extensions
            .insert(name.to_string(), extension);
        Ok(())
    }

    fn resolve_features(&mut self) -> std::result::Result<(), SchemaError> {
        let ids: Vec<_> = self.ctx.module(self.module).features.values().copied().collect();
        for &id in &ids {
            let feature = self.ctx.feature(id);
            let (unit, stmt, status) = (feature.unit, feature.stmt.clone(), feature.status);
            let if_features = self.ctx.compile_if_features(unit, &stmt, status)?;
            self.ctx.arena.features[id.to_index()].if_features = if_features;
        }
        for &id in &ids {
            let ctx = &*self.ctx;
            let neighbors = |f: FeatureId| {
                ctx.feature(f)
                    .if_features
                    .iter()
                    .flat_map(|i| i.expr.features())
                    .collect()
            };
            if let Some(cycle) = trace_cycle(id, neighbors) {
                let chain: Vec<&str> = cycle.iter().map(|f| ctx.feature(*f).name.as_str()).collect();
                return Err(SchemaError::circular(format!(
                    "Feature '{}' depends on itself ({})",
                    ctx.feature(id).name,
                    chain.join(" -> ")
                ))
                .with_position(ctx.feature(id).position));
            }
        }
        Ok(())
    }

    fn resolve_identities(&mut self) -> std::result::Result<(), SchemaError> {
        let ids: Vec<_> = self.ctx.module(self.module).identities.values().copied().collect();
        for id in ids {
            let identity = self.ctx.identity(id);
            let (unit, stmt, status) = (identity.unit, identity.stmt.clone(), identity.status);
            let if_features = self.ctx.compile_if_features(unit, &stmt, status)?;
            self.ctx.arena.identities[id.to_index()].if_features = if_features;

            let bases: Vec<&Statement> = stmt.find_all("base").collect();
            if bases.len() > 1 && self.ctx.unit_version(unit) == YangVersion::V1_0 {
                return Err(SchemaError::syntax(format!(
                    "Identity '{}' has more than one base, which requires YANG 1.1",
                    stmt.arg()
                ))
                .with_position(stmt.position));
            }
            for b in bases {
                let base = self
                    .ctx
                    .find_identity_ref(unit, b.arg())
                    .map_err(|e| e.with_position(b.position))?;
                let base_status = self.ctx.identity(base).status;
                if !status.may_reference(base_status) {
                    return Err(SchemaError::constraint(format!(
                        "A {} identity '{}' references {} identity '{}'",
                        status,
                        stmt.arg(),
                        base_status,
                        b.arg()
                    ))
                    .with_position(b.position));
                }
                self.ctx.add_identity_base(id, base)?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Node construction
    // =========================================================================

    fn build_grouping(
        &mut self,
        stmt: &Statement,
        parent: Option<NodeId>,
        unit: Unit,
    ) -> std::result::Result<NodeId, SchemaError> {
        let name = stmt.arg();
        if self.ctx.scoped_name_taken(self.module, parent, name, false) {
            return Err(SchemaError::duplicate(format!("Duplicate grouping '{}'", name))
                .with_position(stmt.position));
        }
        let id = self.build_node(stmt, parent, unit)?;
        match parent {
            Some(p) => {
                self.ctx.node_mut(p).groupings.insert(name.to_string(), id);
            }
            None => {
                self.ctx
                    .module_mut(self.module)
                    .groupings
                    .insert(name.to_string(), id);
            }
        }
        Ok(id)
    }

    fn node_kind(&self, stmt: &Statement, unit: Unit) -> std::result::Result<NodeKind, SchemaError> {
        let v11 = self.ctx.unit_version(unit) == YangVersion::V1_1;
        let requires_1_1 = |what: &str| {
            SchemaError::syntax(format!("'{}' requires YANG 1.1", what)).with_position(stmt.position)
        };
        let kind = match stmt.keyword.as_str() {
            "container" => NodeKind::Container {
                presence: stmt.find_arg("presence").map(str::to_string),
            },
            "leaf" => NodeKind::Leaf(LeafInfo {
                ty: None,
                default: stmt.find_arg("default").map(str::to_string),
                units: stmt.find_arg("units").map(str::to_string),
                leafref_targets: IndexMap::new(),
            }),
            "leaf-list" => {
                let defaults: Vec<String> =
                    stmt.find_all("default").map(|d| d.arg().to_string()).collect();
                if !defaults.is_empty() && !v11 {
                    return Err(requires_1_1("leaf-list default"));
                }
                NodeKind::LeafList(LeafListInfo {
                    ty: None,
                    defaults,
                    units: stmt.find_arg("units").map(str::to_string),
                    min_elements: parse_min_elements(stmt)?,
                    max_elements: parse_max_elements(stmt)?,
                    leafref_targets: IndexMap::new(),
                })
            }
            "list" => NodeKind::List(ListInfo {
                key_names: stmt
                    .find_arg("key")
                    .map(|k| k.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_default(),
                keys: Vec::new(),
                uniques: stmt
                    .find_all("unique")
                    .map(|u| UniqueSpec {
                        text: u.arg().to_string(),
                        leaves: Vec::new(),
                    })
                    .collect(),
                min_elements: parse_min_elements(stmt)?,
                max_elements: parse_max_elements(stmt)?,
            }),
            "choice" => NodeKind::Choice {
                default: stmt.find_arg("default").map(str::to_string),
                default_case: None,
            },
            "case" => NodeKind::Case { shorthand: false },
            "anydata" if !v11 => return Err(requires_1_1("anydata")),
            "anydata" => NodeKind::AnyData { anyxml: false },
            "anyxml" => NodeKind::AnyData { anyxml: true },
            "uses" => NodeKind::Uses(UsesInfo {
                grouping: stmt.arg().to_string(),
                unit,
                refines: stmt.find_all("refine").cloned().collect(),
                augments: Vec::new(),
            }),
            "grouping" => NodeKind::Grouping,
            "augment" => NodeKind::Augment(AugmentInfo {
                target: stmt.arg().to_string(),
                unit,
                target_node: None,
            }),
            "rpc" => NodeKind::Rpc { action: false },
            "action" if !v11 => return Err(requires_1_1("action")),
            "action" => NodeKind::Rpc { action: true },
            "input" => NodeKind::Input,
            "output" => NodeKind::Output,
            "notification" => NodeKind::Notification,
            other => {
                return Err(SchemaError::syntax(format!("Unexpected statement '{}'", other))
                    .with_position(stmt.position))
            }
        };
        Ok(kind)
    }

    fn build_node(
        &mut self,
        stmt: &Statement,
        parent: Option<NodeId>,
        unit: Unit,
    ) -> std::result::Result<NodeId, SchemaError> {
        let kind = self.node_kind(stmt, unit)?;
        let name = match &kind {
            NodeKind::Input => "input".to_string(),
            NodeKind::Output => "output".to_string(),
            NodeKind::Augment(_) => stmt.arg().to_string(),
            NodeKind::Uses(_) => {
                names::validate_prefixed(stmt.arg()).map_err(|e| e.with_position(stmt.position))?;
                stmt.arg().to_string()
            }
            _ => {
                check_identifier(self.ctx, stmt.arg(), stmt)?;
                stmt.arg().to_string()
            }
        };
        let is_nested_notification = parent.is_some() && matches!(kind, NodeKind::Notification);
        if is_nested_notification && self.ctx.unit_version(unit) == YangVersion::V1_0 {
            return Err(SchemaError::syntax("Nested 'notification' requires YANG 1.1")
                .with_position(stmt.position));
        }

        let mut node = SchemaNode::new(name, self.module, kind);
        node.parent = parent;
        node.position = stmt.position;
        if let Some(c) = stmt.find("config") {
            node.flags.config_set = true;
            node.flags.config = parse_bool_arg(c)?;
        }
        if let Some(m) = stmt.find("mandatory") {
            node.flags.mandatory_set = true;
            node.flags.mandatory = parse_bool_arg(m)?;
        }
        node.flags.min_set = stmt.find("min-elements").is_some();
        node.flags.max_set = stmt.find("max-elements").is_some();
        node.flags.status = parse_status(stmt)?;
        node.flags.user_ordered = stmt.find_arg("ordered-by") == Some("user");
        node.description = stmt.find_arg("description").map(str::to_string);
        node.reference = stmt.find_arg("reference").map(str::to_string);
        if let Some(w) = stmt.find("when") {
            node.when.push(self.ctx.compile_condition(unit, w)?);
        }
        for m in stmt.find_all("must") {
            node.musts.push(self.ctx.compile_condition(unit, m)?);
        }
        node.if_features = self.ctx.compile_if_features(unit, stmt, node.flags.status)?;
        node.extensions = self.ctx.extension_instances(unit, stmt)?;
        let status = node.flags.status;
        let node_type = node.node_type();
        let id = self.ctx.add_node(node)?;
        tracing::trace!(node = stmt.arg(), keyword = %stmt.keyword, "built schema node");

        for t in stmt.find_all("typedef") {
            self.register_typedef(unit, Some(id), t)?;
        }
        for g in stmt.find_all("grouping") {
            self.build_grouping(g, Some(id), unit)?;
        }

        if (NodeTypes::LEAF | NodeTypes::LEAF_LIST).contains(node_type) {
            let type_stmt = stmt.find("type").ok_or_else(|| {
                SchemaError::syntax(format!("Missing 'type' in {} '{}'", stmt.keyword, stmt.arg()))
                    .with_position(stmt.position)
            })?;
            self.types.push(PendingType {
                slot: TypeSlot::Node(id),
                stmt: type_stmt.clone(),
                scope: TypeScope {
                    unit,
                    scope: Some(id),
                    status,
                    version: self.ctx.unit_version(unit),
                },
            });
            return Ok(id);
        }

        if node_type == NodeTypes::USES {
            self.uses.push(id);
            let mut augments = Vec::new();
            for a in stmt.find_all("augment") {
                augments.push(self.build_node(a, Some(id), unit)?);
            }
            if let NodeKind::Uses(info) = &mut self.ctx.node_mut(id).kind {
                info.augments = augments;
            }
            return Ok(id);
        }

        let v11 = self.ctx.unit_version(unit) == YangVersion::V1_1;
        for child in &stmt.children {
            let kw = child.keyword.as_str();
            let accepted = if node_type == NodeTypes::CHOICE {
                if kw == "case" {
                    true
                } else if SHORTHAND_KEYWORDS.contains(&kw) {
                    if kw == "choice" && !v11 {
                        return Err(SchemaError::syntax("Choice directly in choice requires YANG 1.1")
                            .with_position(child.position));
                    }
                    let case = self.shorthand_case(child, id)?;
                    let inner = self.build_node(child, Some(case), unit)?;
                    self.ctx.node_mut(case).children.push(inner);
                    continue;
                } else {
                    false
                }
            } else if node_type == NodeTypes::RPC {
                kw == "input" || kw == "output"
            } else if (NodeTypes::CONTAINER | NodeTypes::LIST | NodeTypes::GROUPING | NodeTypes::AUGMENT)
                .contains(node_type)
            {
                DATA_KEYWORDS.contains(&kw)
                    || kw == "action"
                    || kw == "notification"
                    || (kw == "case" && node_type == NodeTypes::AUGMENT)
            } else if (NodeTypes::CASE | NodeTypes::INPUT | NodeTypes::OUTPUT | NodeTypes::NOTIFICATION)
                .contains(node_type)
            {
                DATA_KEYWORDS.contains(&kw)
            } else {
                false
            };
            if accepted {
                let child_id = self.build_node(child, Some(id), unit)?;
                self.ctx.node_mut(id).children.push(child_id);
            }
        }
        Ok(id)
    }

    fn shorthand_case(&mut self, stmt: &Statement, choice: NodeId) -> std::result::Result<NodeId, SchemaError> {
        let mut case = SchemaNode::new(stmt.arg(), self.module, NodeKind::Case { shorthand: true });
        case.parent = Some(choice);
        case.position = stmt.position;
        let id = self.ctx.add_node(case)?;
        self.ctx.node_mut(choice).children.push(id);
        Ok(id)
    }

    // =========================================================================
    // Types
    // =========================================================================

    fn assign_type(&mut self, slot: TypeSlot, ty: Arc<Type>) {
        match slot {
            TypeSlot::Typedef(id) => self.ctx.arena.typedefs[id.to_index()].ty = Some(ty),
            TypeSlot::Node(id) => match &mut self.ctx.node_mut(id).kind {
                NodeKind::Leaf(info) => info.ty = Some(ty),
                NodeKind::LeafList(info) => info.ty = Some(ty),
                _ => {}
            },
        }
    }

    fn resolve_types(&mut self) -> std::result::Result<(), SchemaError> {
        let mut queue = std::mem::take(&mut self.types);
        let mut round = 0;
        while !queue.is_empty() {
            round += 1;
            let before = queue.len();
            let mut deferred = Vec::new();
            for item in queue {
                let own = match item.slot {
                    TypeSlot::Typedef(id) => Some(id),
                    TypeSlot::Node(_) => None,
                };
                match self.ctx.compile_type(&item.stmt, &item.scope, own)? {
                    TypeOutcome::Ready(ty) => self.assign_type(item.slot, ty),
                    TypeOutcome::Deferred(_) => deferred.push(item),
                }
            }
            tracing::debug!(round, remaining = deferred.len(), "type worklist pass");
            if deferred.len() == before {
                return Err(self.type_cycle_error(&deferred));
            }
            queue = deferred;
        }
        Ok(())
    }

    fn type_cycle_error(&self, deferred: &[PendingType]) -> SchemaError {
        let ctx = &*self.ctx;
        let pending_deps = |id: TypedefId| -> Vec<TypedefId> {
            let (stmt, scope) = ctx.typedef_scope(id);
            stmt.map(|s| ctx.type_dependencies(s, &scope))
                .unwrap_or_default()
                .into_iter()
                .filter(|t| ctx.typedef(*t).ty.is_none())
                .collect()
        };
        for item in deferred {
            let starts = match item.slot {
                TypeSlot::Typedef(id) => vec![id],
                TypeSlot::Node(_) => ctx
                    .type_dependencies(&item.stmt, &item.scope)
                    .into_iter()
                    .filter(|t| ctx.typedef(*t).ty.is_none())
                    .collect(),
            };
            for start in starts {
                if let Some(cycle) = trace_cycle(start, pending_deps) {
                    let chain: Vec<&str> = cycle.iter().map(|t| ctx.typedef(*t).name.as_str()).collect();
                    return SchemaError::circular(format!(
                        "Typedef '{}' is part of a circular derivation ({})",
                        ctx.typedef(start).name,
                        chain.join(" -> ")
                    ))
                    .with_position(ctx.typedef(start).position);
                }
            }
        }
        let first = &deferred[0];
        SchemaError::unresolved(format!("Type '{}' could not be resolved", first.stmt.arg()))
            .with_position(first.stmt.position)
    }

    fn check_typedef_defaults(&mut self) -> std::result::Result<(), SchemaError> {
        let ctx = &*self.ctx;
        for (i, td) in ctx.arena.typedefs.iter().enumerate() {
            if td.module != self.module {
                continue;
            }
            let (Some(default), Some(ty)) = (&td.default, &td.ty) else {
                continue;
            };
            if ty.base == BuiltinKind::Empty {
                return Err(SchemaError::constraint(format!(
                    "Typedef '{}' of type empty cannot have a default",
                    td.name
                ))
                .with_position(td.position));
            }
            let unit = td.unit;
            let prefixes = |p: &str| ctx.resolve_prefix(unit, Some(p)).ok();
            let scope = ValueScope {
                prefixes: &prefixes,
                default_module: td.module,
                leafref_targets: None,
                schema_literal: true,
            };
            if let Err(msg) = ctx.check_value(ty, default, &scope) {
                return Err(SchemaError::constraint(format!(
                    "Invalid default '{}' of typedef '{}': {}",
                    default, td.name, msg
                ))
                .with_position(td.position));
            }
            tracing::trace!(typedef = %td.name, index = i, "typedef default checked");
        }
        Ok(())
    }
}

// =============================================================================
// Header
// =============================================================================

fn create_module(ctx: &mut Context, stmt: &Statement) -> Result<ModuleId> {
    let name = stmt.arg().to_string();
    let header = |ctx: &mut Context| -> std::result::Result<Module, SchemaError> {
        check_identifier(ctx, &name, stmt)?;
        let version = match stmt.find("yang-version") {
            Some(v) => YangVersion::parse(v.arg()).map_err(|e| e.with_position(v.position))?,
            None => YangVersion::V1_0,
        };
        let namespace = required_arg(stmt, "namespace")?.to_string();
        if let Some(other) = ctx.module_by_namespace(&namespace) {
            return Err(SchemaError::duplicate(format!(
                "Namespace '{}' is already used by module '{}'",
                namespace,
                ctx.module(other).name
            )));
        }
        let prefix = required_arg(stmt, "prefix")?.to_string();
        check_identifier(ctx, &prefix, stmt)?;
        let revisions = parse_revisions(ctx, stmt)?;
        Ok(Module {
            name: name.clone(),
            namespace,
            prefix,
            version,
            revisions,
            organization: stmt.find_arg("organization").map(str::to_string),
            description: stmt.find_arg("description").map(str::to_string),
            imports: Vec::new(),
            submodules: Vec::new(),
            implemented: false,
            typedefs: IndexMap::new(),
            identities: IndexMap::new(),
            features: IndexMap::new(),
            extensions: IndexMap::new(),
            groupings: IndexMap::new(),
            data: Vec::new(),
            rpcs: Vec::new(),
            notifications: Vec::new(),
            augments: Vec::new(),
            deviations: Vec::new(),
            stmt: stmt.clone(),
        })
    };
    let mut module = header(ctx).map_err(|e| compile_error(&name, e))?;
    module.imports = compile_imports(ctx, &name, &module.prefix, stmt)?;

    let mut submodules = Vec::new();
    for inc in stmt.find_all("include") {
        include_submodule(ctx, &module, inc, &mut submodules)?;
    }
    module.submodules = submodules;

    let id = ModuleId::from_index(ctx.arena.modules.len());
    ctx.arena.modules.push(module);
    Ok(id)
}

fn compile_imports(ctx: &mut Context, module: &str, own_prefix: &str, stmt: &Statement) -> Result<Vec<Import>> {
    let mut imports: Vec<Import> = Vec::new();
    for imp in stmt.find_all("import") {
        let target = imp.arg().to_string();
        let check = |imports: &[Import]| -> std::result::Result<(String, Option<String>), SchemaError> {
            names::validate_identifier(&target).map_err(|e| e.with_position(imp.position))?;
            if target == module {
                return Err(SchemaError::circular(format!("Module '{}' imports itself", module))
                    .with_position(imp.position));
            }
            let prefix = required_arg(imp, "prefix")?.to_string();
            if prefix == own_prefix || imports.iter().any(|i| i.prefix == prefix) {
                return Err(SchemaError::duplicate(format!("Duplicate prefix '{}'", prefix))
                    .with_position(imp.position));
            }
            let revision = match imp.find("revision-date") {
                Some(r) => {
                    names::validate_date(r.arg()).map_err(|e| e.with_position(r.position))?;
                    Some(r.arg().to_string())
                }
                None => None,
            };
            Ok((prefix, revision))
        };
        let (prefix, revision) = check(&imports).map_err(|e| compile_error(module, e))?;
        let id = compile_module(ctx, &target, false)?;
        if let Some(rev) = &revision {
            if !ctx.module(id).revisions.iter().any(|r| r == rev) {
                return Err(compile_error(
                    module,
                    SchemaError::unresolved(format!(
                        "Module '{}' revision {} not found",
                        target, rev
                    ))
                    .with_position(imp.position),
                ));
            }
        }
        tracing::trace!(module, import = %target, prefix = %prefix, "resolved import");
        imports.push(Import {
            module: id,
            name: target,
            prefix,
            revision,
        });
    }
    Ok(imports)
}

fn include_submodule(
    ctx: &mut Context,
    module: &Module,
    inc: &Statement,
    out: &mut Vec<Submodule>,
) -> Result<()> {
    let name = inc.arg();
    if out.iter().any(|s| s.name == name) {
        return Ok(());
    }
    let fail = |e: SchemaError| compile_error(&module.name, e.with_position(inc.position));
    let stmt = ctx
        .source(name)
        .cloned()
        .ok_or_else(|| fail(SchemaError::unresolved(format!("Submodule '{}' not found", name))))?;
    if stmt.keyword != "submodule" {
        return Err(fail(SchemaError::syntax(format!("'{}' is not a submodule", name))));
    }
    let belongs = stmt
        .find("belongs-to")
        .ok_or_else(|| fail(SchemaError::syntax(format!("Missing 'belongs-to' in submodule '{}'", name))))?;
    if belongs.arg() != module.name {
        return Err(fail(SchemaError::constraint(format!(
            "Submodule '{}' belongs to '{}', not '{}'",
            name,
            belongs.arg(),
            module.name
        ))));
    }
    let prefix = required_arg(belongs, "prefix").map_err(fail)?.to_string();
    let version = match stmt.find("yang-version") {
        Some(v) => YangVersion::parse(v.arg()).map_err(fail)?,
        None => YangVersion::V1_0,
    };
    if version != module.version {
        return Err(fail(SchemaError::constraint(format!(
            "Submodule '{}' has yang-version {} but module '{}' has {}",
            name, version, module.name, module.version
        ))));
    }
    if let Some(rev) = inc.find("revision-date") {
        names::validate_date(rev.arg()).map_err(fail)?;
    }
    let revisions = parse_revisions(ctx, &stmt).map_err(fail)?;
    let imports = compile_imports(ctx, &module.name, &prefix, &stmt)?;
    tracing::debug!(module = %module.name, submodule = name, "included submodule");
    out.push(Submodule {
        name: name.to_string(),
        prefix,
        version,
        revisions,
        imports,
        stmt: stmt.clone(),
    });
    for nested in stmt.find_all("include") {
        include_submodule(ctx, module, nested, out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn load(ctx: &mut Context, text: &str) -> Result<ModuleId> {
        ctx.load_yang_str(text)
    }

    #[test]
    fn test_import_chain() {
        let mut ctx = Context::new();
        ctx.add_source_str("module a { namespace urn:a; prefix a; typedef t { type string; } }")
            .unwrap();
        let b = load(
            &mut ctx,
            "module b { namespace urn:b; prefix b; import a { prefix x; } leaf l { type x:t; } }",
        )
        .unwrap();
        let a = ctx.module_by_name("a").unwrap();
        assert!(!ctx.module(a).implemented);
        assert!(ctx.module(b).implemented);
        assert_eq!(ctx.module(b).imports[0].prefix, "x");
    }

    #[test]
    fn test_circular_import() {
        let mut ctx = Context::new();
        ctx.add_source_str("module a { namespace urn:a; prefix a; import b { prefix b; } }")
            .unwrap();
        ctx.add_source_str("module b { namespace urn:b; prefix b; import a { prefix a; } }")
            .unwrap();
        let stmt = crate::parser::parse_yang("module c { namespace urn:c; prefix c; import a { prefix a; } }")
            .unwrap();
        let err = ctx.compile(stmt).unwrap_err();
        assert_eq!(err.schema_kind(), Some(ErrorKind::CircularReference));
        assert_eq!(ctx.modules().count(), 0);
    }

    #[test]
    fn test_missing_namespace() {
        let mut ctx = Context::new();
        let err = load(&mut ctx, "module m { prefix m; }").unwrap_err();
        assert_eq!(err.schema_kind(), Some(ErrorKind::SyntaxViolation));
    }

    #[test]
    fn test_revisions_sorted_newest_first() {
        let mut ctx = Context::new();
        let m = load(
            &mut ctx,
            "module m { namespace urn:m; prefix m; revision 2020-01-01; revision 2023-05-06; revision 2020-01-01; }",
        )
        .unwrap();
        assert_eq!(ctx.module(m).revisions, vec!["2023-05-06", "2020-01-01"]);
        assert_eq!(ctx.warnings().len(), 1);
    }

    #[test]
    fn test_submodule_include() {
        let mut ctx = Context::new();
        ctx.add_source_str(
            "submodule s { belongs-to m { prefix sm; } typedef st { type int8; } leaf sl { type st; } }",
        )
        .unwrap();
        let m = load(
            &mut ctx,
            "module m { namespace urn:m; prefix m; include s; leaf l { type st; } }",
        )
        .unwrap();
        assert_eq!(ctx.module(m).submodules.len(), 1);
        assert_eq!(ctx.top_level_data(m).count(), 2);
    }

    #[test]
    fn test_shorthand_case() {
        let mut ctx = Context::new();
        let m = load(
            &mut ctx,
            "module m { namespace urn:m; prefix m; choice ch { leaf a { type string; } case b { leaf b { type string; } } } }",
        )
        .unwrap();
        let choice = ctx.top_level_data(m).next().unwrap();
        let cases: Vec<_> = ctx.children(choice).collect();
        assert_eq!(cases.len(), 2);
        assert!(matches!(ctx.node(cases[0]).kind, NodeKind::Case { shorthand: true }));
        assert!(matches!(ctx.node(cases[1]).kind, NodeKind::Case { shorthand: false }));
    }

    #[test]
    fn test_typedef_cycle() {
        let mut ctx = Context::new();
        let err = load(
            &mut ctx,
            "module m { namespace urn:m; prefix m; typedef a { type b; } typedef b { type a; } }",
        )
        .unwrap_err();
        assert_eq!(err.schema_kind(), Some(ErrorKind::CircularReference));
    }

    #[test]
    fn test_feature_cycle() {
        let mut ctx = Context::new();
        let err = load(
            &mut ctx,
            "module m { yang-version 1.1; namespace urn:m; prefix m; feature a { if-feature b; } feature b { if-feature a; } }",
        )
        .unwrap_err();
        assert_eq!(err.schema_kind(), Some(ErrorKind::CircularReference));
    }

    #[test]
    fn test_unknown_extension() {
        let mut ctx = Context::new();
        let err = load(
            &mut ctx,
            "module m { namespace urn:m; prefix m; container c { m:nope; } }",
        )
        .unwrap_err();
        assert_eq!(err.schema_kind(), Some(ErrorKind::UnresolvedReference));
    }
}
