//! Compiled YANG schema
//!
//! A [`Context`] owns flat arenas of modules, schema nodes, typedefs,
//! identities and features. Every cross reference is a typed handle into one
//! of these arenas, so cycles between definitions never turn into cycles of
//! ownership.
//!
//! ## Compilation
//!
//! [`Context::compile`] runs the passes below for one module (and, first,
//! recursively for every module it imports):
//!
//! 1. header, imports and includes
//! 2. feature, identity, typedef and extension registration
//! 3. if-feature and identity base resolution
//! 4. schema node construction (`uses` left as placeholders)
//! 5. type worklist, drained to a fixed point
//! 6. `uses` worklist, drained to a fixed point
//! 7. augments and deviations (implemented modules only)
//! 8. finalization: effective config, keys, defaults, leafref targets
//!
//! Compilation is transactional: when any pass fails the context is
//! restored to its state before the call.

pub mod identity;
pub mod iffeature;
pub mod node;
pub mod range;
pub mod types;
pub mod value;

mod augment;
mod compile;
mod deviation;
mod finalize;
mod path;
mod printer;
mod resolver;
mod typecomp;
mod uses;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{Error, Result, SchemaError};
use crate::ids::{FeatureId, IdentityId, ModuleId, NodeId, TypedefId};
use crate::limits::Limits;
use crate::parser;
use crate::plugins::PluginHandle;
use crate::statement::{SourcePos, Statement};
use crate::xpath::{PathEngine, XPathService};

pub use identity::Identity;
pub use iffeature::{Feature, IfFeature, IfFeatureExpr};
pub use node::{
    Condition, ExtensionInstance, NodeFlags, NodeKind, NodeTypes, SchemaNode, Status,
};
pub use types::{BuiltinKind, Type, TypeInfo, TypeName, Typedef};

/// Module or submodule a statement was written in
///
/// Prefixes are resolved relative to a unit: its own prefix first, then the
/// submodule's imports, then the main module's imports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Unit {
    /// Main module
    pub module: ModuleId,
    /// Index into [`Module::submodules`], `None` for the main module
    pub submodule: Option<usize>,
}

impl Unit {
    /// The main module itself
    pub fn main(module: ModuleId) -> Self {
        Self {
            module,
            submodule: None,
        }
    }
}

/// YANG language version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum YangVersion {
    /// YANG 1 (RFC 6020)
    #[default]
    V1_0,
    /// YANG 1.1 (RFC 7950)
    V1_1,
}

impl YangVersion {
    /// Parse a `yang-version` argument
    pub fn parse(s: &str) -> std::result::Result<Self, SchemaError> {
        match s {
            "1" | "1.0" => Ok(YangVersion::V1_0),
            "1.1" => Ok(YangVersion::V1_1),
            _ => Err(SchemaError::syntax(format!("Invalid yang-version '{}'", s))),
        }
    }
}

impl fmt::Display for YangVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            YangVersion::V1_0 => f.write_str("1"),
            YangVersion::V1_1 => f.write_str("1.1"),
        }
    }
}

/// A resolved `import`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// Imported module
    pub module: ModuleId,
    /// Imported module name
    pub name: String,
    /// Local prefix
    pub prefix: String,
    /// Requested revision
    pub revision: Option<String>,
}

/// An included submodule
#[derive(Debug, Clone)]
pub struct Submodule {
    /// Submodule name
    pub name: String,
    /// belongs-to prefix
    pub prefix: String,
    /// YANG version
    pub version: YangVersion,
    /// Revisions, newest first
    pub revisions: Vec<String>,
    /// Submodule imports
    pub imports: Vec<Import>,
    /// The `submodule` statement
    pub stmt: Statement,
}

/// An `extension` definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    /// Extension name
    pub name: String,
    /// Owning module
    pub module: ModuleId,
    /// Argument name
    pub argument: Option<String>,
    /// `yin-element true`
    pub yin_element: bool,
    /// Status
    pub status: Status,
}

/// A `deviation` statement waiting to be applied
#[derive(Debug, Clone)]
pub struct Deviation {
    /// Target schema-node-id
    pub target: String,
    /// Unit the statement was written in
    pub unit: Unit,
    /// The `deviation` statement
    pub stmt: Statement,
    /// Resolved target once applied
    pub target_node: Option<NodeId>,
}

/// A compiled module
#[derive(Debug, Clone)]
pub struct Module {
    /// Module name
    pub name: String,
    /// Namespace URI
    pub namespace: String,
    /// Own prefix
    pub prefix: String,
    /// YANG version
    pub version: YangVersion,
    /// Revisions, newest first
    pub revisions: Vec<String>,
    /// organization
    pub organization: Option<String>,
    /// description
    pub description: Option<String>,
    /// Imports of the main module
    pub imports: Vec<Import>,
    /// Included submodules
    pub submodules: Vec<Submodule>,
    /// Implemented (data nodes live, augments and deviations applied)
    pub implemented: bool,
    /// Top-level typedefs, submodules included
    pub typedefs: IndexMap<String, TypedefId>,
    /// Identities, submodules included
    pub identities: IndexMap<String, IdentityId>,
    /// Features, submodules included
    pub features: IndexMap<String, FeatureId>,
    /// Extension definitions
    pub extensions: IndexMap<String, Extension>,
    /// Top-level groupings
    pub groupings: IndexMap<String, NodeId>,
    /// Top-level data nodes
    pub data: Vec<NodeId>,
    /// rpc statements
    pub rpcs: Vec<NodeId>,
    /// Top-level notifications
    pub notifications: Vec<NodeId>,
    /// Top-level augments
    pub augments: Vec<NodeId>,
    /// Deviations
    pub deviations: Vec<Deviation>,
    /// The `module` statement
    pub stmt: Statement,
}

impl Module {
    /// Newest revision
    pub fn revision(&self) -> Option<&str> {
        self.revisions.first().map(String::as_str)
    }

    /// Top-level schema nodes (data, rpcs, notifications) including removed ones
    pub fn top_level(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.data
            .iter()
            .chain(self.rpcs.iter())
            .chain(self.notifications.iter())
            .copied()
    }
}

/// Flat storage of every compiled definition
#[derive(Debug, Clone, Default)]
pub(crate) struct Arena {
    pub modules: Vec<Module>,
    pub nodes: Vec<SchemaNode>,
    pub typedefs: Vec<Typedef>,
    pub identities: Vec<Identity>,
    pub features: Vec<Feature>,
}

/// Schema context
///
/// Holds every compiled module. Mutation (compilation, feature changes)
/// requires `&mut Context`; a finished context can be shared read-only
/// between threads.
#[derive(Debug, Clone)]
pub struct Context {
    pub(crate) arena: Arena,
    sources: IndexMap<String, Statement>,
    xpath: Arc<dyn XPathService>,
    limits: Limits,
    warnings: Vec<String>,
    pub(crate) loading: Vec<String>,
    _plugins: PluginHandle,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Create an empty context using the built-in XPath engine
    pub fn new() -> Self {
        Self::with_xpath(Arc::new(PathEngine::new()))
    }

    /// Create an empty context using the given XPath service
    pub fn with_xpath(xpath: Arc<dyn XPathService>) -> Self {
        Self {
            arena: Arena::default(),
            sources: IndexMap::new(),
            xpath,
            limits: Limits::default(),
            warnings: Vec::new(),
            loading: Vec::new(),
            _plugins: PluginHandle::acquire(),
        }
    }

    /// Builder: set resource limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Resource limits
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// XPath service used for conditions
    pub fn xpath(&self) -> &dyn XPathService {
        self.xpath.as_ref()
    }

    /// Recoverable warnings collected so far
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub(crate) fn warn(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }

    // =========================================================================
    // Sources and compilation
    // =========================================================================

    /// Register a parsed module or submodule so imports and includes find it
    pub fn add_source(&mut self, stmt: Statement) -> Result<()> {
        if stmt.keyword != "module" && stmt.keyword != "submodule" {
            return Err(SchemaError::syntax(format!(
                "Expected 'module' or 'submodule', found '{}'",
                stmt.keyword
            ))
            .into());
        }
        let name = stmt.arg().to_string();
        tracing::trace!(source = %name, "registered source");
        self.sources.insert(name, stmt);
        Ok(())
    }

    /// Parse YANG or YIN text and register it as a source
    pub fn add_source_str(&mut self, text: &str) -> Result<()> {
        let stmt = parser::parse_auto(text)?;
        self.add_source(stmt)
    }

    pub(crate) fn source(&self, name: &str) -> Option<&Statement> {
        self.sources.get(name)
    }

    /// Compile and implement a module
    ///
    /// Modules it imports are compiled as parsed-only. On failure the
    /// context is left exactly as it was.
    pub fn compile(&mut self, stmt: Statement) -> Result<ModuleId> {
        if stmt.keyword != "module" {
            return Err(SchemaError::syntax(format!(
                "Only modules can be compiled directly, found '{}'",
                stmt.keyword
            ))
            .with_position(stmt.position)
            .into());
        }
        let name = stmt.arg().to_string();
        if let Some(id) = self.module_by_name(&name) {
            if !self.module(id).implemented {
                self.implement(id)?;
            }
            return Ok(id);
        }
        self.add_source(stmt)?;
        self.transaction(|ctx| compile::compile_module(ctx, &name, true))
    }

    /// Parse and compile a module written in YANG syntax
    pub fn load_yang_str(&mut self, text: &str) -> Result<ModuleId> {
        let stmt = parser::parse_yang(text)?;
        self.compile(stmt)
    }

    /// Parse and compile a module written in YIN syntax
    pub fn load_yin_str(&mut self, text: &str) -> Result<ModuleId> {
        let stmt = parser::parse_yin(text)?;
        self.compile(stmt)
    }

    /// Load a `.yang` or `.yin` file
    ///
    /// Submodules are registered as sources; modules are compiled.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<Option<ModuleId>> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let is_yin = path.extension().map_or(false, |e| e == "yin");
        let stmt = if is_yin {
            parser::parse_yin(&text)?
        } else {
            parser::parse_auto(&text)?
        };
        tracing::debug!(path = %path.display(), "loaded schema file");
        if stmt.keyword == "submodule" {
            self.add_source(stmt)?;
            Ok(None)
        } else {
            self.compile(stmt).map(Some)
        }
    }

    /// Promote a parsed-only module to implemented
    pub fn implement(&mut self, id: ModuleId) -> Result<()> {
        if self.module(id).implemented {
            return Ok(());
        }
        self.transaction(|ctx| compile::implement_module(ctx, id))
    }

    fn transaction<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let snapshot = self.arena.clone();
        let warnings = self.warnings.len();
        match f(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                tracing::debug!(error = %err, "compilation failed, rolling back");
                self.arena = snapshot;
                self.warnings.truncate(warnings);
                self.loading.clear();
                Err(err)
            }
        }
    }

    // =========================================================================
    // Arena access
    // =========================================================================

    /// Get a module
    pub fn module(&self, id: ModuleId) -> &Module {
        &self.arena.modules[id.to_index()]
    }

    pub(crate) fn module_mut(&mut self, id: ModuleId) -> &mut Module {
        &mut self.arena.modules[id.to_index()]
    }

    /// Find a module by name
    pub fn module_by_name(&self, name: &str) -> Option<ModuleId> {
        self.arena
            .modules
            .iter()
            .position(|m| m.name == name)
            .map(ModuleId::from_index)
    }

    /// Find a module by namespace URI
    pub fn module_by_namespace(&self, namespace: &str) -> Option<ModuleId> {
        self.arena
            .modules
            .iter()
            .position(|m| m.namespace == namespace)
            .map(ModuleId::from_index)
    }

    /// All modules in compilation order
    pub fn modules(&self) -> impl Iterator<Item = (ModuleId, &Module)> {
        self.arena
            .modules
            .iter()
            .enumerate()
            .map(|(i, m)| (ModuleId::from_index(i), m))
    }

    /// Get a schema node
    pub fn node(&self, id: NodeId) -> &SchemaNode {
        &self.arena.nodes[id.to_index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut SchemaNode {
        &mut self.arena.nodes[id.to_index()]
    }

    /// Number of schema nodes in the arena
    pub fn node_count(&self) -> usize {
        self.arena.nodes.len()
    }

    /// Get a typedef
    pub fn typedef(&self, id: TypedefId) -> &Typedef {
        &self.arena.typedefs[id.to_index()]
    }

    /// Get an identity
    pub fn identity(&self, id: IdentityId) -> &Identity {
        &self.arena.identities[id.to_index()]
    }

    /// Get a feature
    pub fn feature(&self, id: FeatureId) -> &Feature {
        &self.arena.features[id.to_index()]
    }

    pub(crate) fn add_node(&mut self, node: SchemaNode) -> std::result::Result<NodeId, SchemaError> {
        if self.limits.check_schema_nodes(self.arena.nodes.len() + 1).is_err() {
            return Err(SchemaError::constraint(format!(
                "Schema node limit of {} exceeded",
                self.limits.max_schema_nodes
            )));
        }
        let id = NodeId::from_index(self.arena.nodes.len());
        self.arena.nodes.push(node);
        Ok(id)
    }

    pub(crate) fn add_typedef(&mut self, typedef: Typedef) -> TypedefId {
        let id = TypedefId::from_index(self.arena.typedefs.len());
        self.arena.typedefs.push(typedef);
        id
    }

    pub(crate) fn add_identity(&mut self, identity: Identity) -> IdentityId {
        let id = IdentityId::from_index(self.arena.identities.len());
        self.arena.identities.push(identity);
        id
    }

    pub(crate) fn add_feature(&mut self, feature: Feature) -> FeatureId {
        let id = FeatureId::from_index(self.arena.features.len());
        self.arena.features.push(feature);
        id
    }

    // =========================================================================
    // Tree navigation
    // =========================================================================

    /// Live children of a schema node
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.node(id)
            .children
            .iter()
            .copied()
            .filter(move |c| !self.node(*c).removed)
    }

    /// Live top-level nodes of a module (data, rpcs, notifications)
    pub fn top_level(&self, module: ModuleId) -> impl Iterator<Item = NodeId> + '_ {
        self.module(module)
            .top_level()
            .filter(move |c| !self.node(*c).removed)
    }

    /// Live top-level data nodes of a module
    pub fn top_level_data(&self, module: ModuleId) -> impl Iterator<Item = NodeId> + '_ {
        self.module(module)
            .data
            .iter()
            .copied()
            .filter(move |c| !self.node(*c).removed)
    }

    /// Children of a node or, for `None`, the top-level data nodes of a module
    pub fn schema_children(&self, parent: Option<NodeId>, module: ModuleId) -> Vec<NodeId> {
        match parent {
            Some(p) => self.children(p).collect(),
            None => self.top_level_data(module).collect(),
        }
    }

    /// Nearest ancestor that is instantiated in data trees
    pub fn data_parent(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.node(id).parent;
        while let Some(p) = current {
            let node = self.node(p);
            if !node.is(NodeTypes::CHOICE | NodeTypes::CASE) {
                return Some(p);
            }
            current = node.parent;
        }
        None
    }

    // =========================================================================
    // Features
    // =========================================================================

    fn find_module_feature(&self, module: ModuleId, name: &str) -> Result<FeatureId> {
        self.module(module)
            .features
            .get(name)
            .copied()
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "feature '{}' in module '{}'",
                    name,
                    self.module(module).name
                ))
            })
    }

    /// Current value of a feature: enabled and all its if-features true
    pub fn feature_enabled(&self, id: FeatureId) -> bool {
        let feature = self.feature(id);
        feature.enabled && feature.if_features.iter().all(|f| self.if_feature_value(f))
    }

    /// Evaluate an if-feature expression against the current feature state
    pub fn if_feature_value(&self, iff: &IfFeature) -> bool {
        iff.expr.eval(&|id| self.feature_enabled(id))
    }

    /// Whether a node and all its ancestors have their if-features satisfied
    pub fn node_enabled(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(n) = current {
            let node = self.node(n);
            if !node.if_features.iter().all(|f| self.if_feature_value(f)) {
                return false;
            }
            current = node.parent;
        }
        true
    }

    /// Query the value of a feature by name
    pub fn feature_value(&self, module: ModuleId, name: &str) -> Result<bool> {
        let id = self.find_module_feature(module, name)?;
        Ok(self.feature_enabled(id))
    }

    fn check_feature_writable(&self, module: ModuleId) -> Result<()> {
        if !self.module(module).implemented {
            return Err(Error::Denied(format!(
                "features of module '{}' are frozen because it is not implemented",
                self.module(module).name
            )));
        }
        Ok(())
    }

    fn blocking_condition(&self, id: FeatureId) -> Option<String> {
        self.feature(id)
            .if_features
            .iter()
            .find(|f| !self.if_feature_value(f))
            .map(|f| f.text.clone())
    }

    /// Enable a feature, or every feature of the module with `"*"`
    ///
    /// Enabling fails with [`Error::Denied`] when an if-feature gating the
    /// feature is false. `"*"` enables features until no more can be
    /// enabled and then reports the first feature still denied; on failure
    /// the previous feature state is restored.
    pub fn enable_feature(&mut self, module: ModuleId, name: &str) -> Result<()> {
        self.check_feature_writable(module)?;

        if name == "*" {
            let ids: Vec<FeatureId> = self.module(module).features.values().copied().collect();
            let saved: Vec<bool> = ids.iter().map(|id| self.feature(*id).enabled).collect();
            loop {
                let mut progress = false;
                for &id in &ids {
                    if !self.feature(id).enabled && self.blocking_condition(id).is_none() {
                        self.arena.features[id.to_index()].enabled = true;
                        progress = true;
                    }
                }
                if !progress {
                    break;
                }
            }
            if let Some(&denied) = ids.iter().find(|id| !self.feature(**id).enabled) {
                let condition = self.blocking_condition(denied).unwrap_or_default();
                let feature_name = self.feature(denied).name.clone();
                for (id, enabled) in ids.iter().zip(saved) {
                    self.arena.features[id.to_index()].enabled = enabled;
                }
                return Err(Error::Denied(format!(
                    "feature '{}' is blocked by if-feature '{}'",
                    feature_name, condition
                )));
            }
            tracing::debug!(module = %self.module(module).name, "enabled all features");
            return Ok(());
        }

        let id = self.find_module_feature(module, name)?;
        if let Some(condition) = self.blocking_condition(id) {
            return Err(Error::Denied(format!(
                "feature '{}' is blocked by if-feature '{}'",
                name, condition
            )));
        }
        self.arena.features[id.to_index()].enabled = true;
        tracing::debug!(module = %self.module(module).name, feature = name, "enabled feature");
        Ok(())
    }

    /// Disable a feature, or every feature of the module with `"*"`
    pub fn disable_feature(&mut self, module: ModuleId, name: &str) -> Result<()> {
        self.check_feature_writable(module)?;
        let ids: Vec<FeatureId> = if name == "*" {
            self.module(module).features.values().copied().collect()
        } else {
            vec![self.find_module_feature(module, name)?]
        };
        for id in ids {
            self.arena.features[id.to_index()].enabled = false;
        }
        tracing::debug!(module = %self.module(module).name, feature = name, "disabled feature");
        Ok(())
    }

    // =========================================================================
    // Identities
    // =========================================================================

    /// Find an identity by module name and identity name
    pub fn find_identity(&self, module: &str, name: &str) -> Option<IdentityId> {
        let module = self.module_by_name(module)?;
        self.module(module).identities.get(name).copied()
    }

    /// Source position of a node, for diagnostics
    pub fn node_position(&self, id: NodeId) -> SourcePos {
        self.node(id).position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yang_version() {
        assert_eq!(YangVersion::parse("1").unwrap(), YangVersion::V1_0);
        assert_eq!(YangVersion::parse("1.1").unwrap(), YangVersion::V1_1);
        assert!(YangVersion::parse("2").is_err());
        assert!(YangVersion::V1_1 > YangVersion::V1_0);
    }

    #[test]
    fn test_context_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Context>();
    }

    #[test]
    fn test_compile_rejects_submodule() {
        let mut ctx = Context::new();
        let stmt = Statement::with_arg("submodule", "s");
        assert!(ctx.compile(stmt).is_err());
    }
}
