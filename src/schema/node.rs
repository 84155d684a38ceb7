//! Compiled schema nodes
//!
//! Schema nodes live in the context arena and refer to each other by
//! [`NodeId`]. The node kind is a closed enum with a kind-specific payload;
//! checks of the form "applies to list or leaf-list" are expressed as
//! [`NodeTypes`] bitset tests.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::SchemaError;
use crate::ids::{ModuleId, NodeId, TypedefId};
use crate::statement::{SourcePos, Statement};
use crate::xpath::CompiledExpr;

use super::iffeature::IfFeature;
use super::types::Type;
use super::Unit;

/// Definition status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Status {
    /// current (default)
    #[default]
    Current,
    /// deprecated
    Deprecated,
    /// obsolete
    Obsolete,
}

impl Status {
    /// Parse from a `status` argument
    pub fn from_str(s: &str) -> Result<Self, SchemaError> {
        match s {
            "current" => Ok(Status::Current),
            "deprecated" => Ok(Status::Deprecated),
            "obsolete" => Ok(Status::Obsolete),
            _ => Err(SchemaError::syntax(format!(
                "Invalid status '{}'. Must be 'current', 'deprecated' or 'obsolete'",
                s
            ))),
        }
    }

    /// Get the status as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Current => "current",
            Status::Deprecated => "deprecated",
            Status::Obsolete => "obsolete",
        }
    }

    /// Whether a definition with this status may reference one with `target`
    pub fn may_reference(&self, target: Status) -> bool {
        target != Status::Obsolete || *self == Status::Obsolete
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-node flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeFlags {
    /// Whether `config` was given explicitly on this node
    pub config_set: bool,
    /// Explicit value until finalization, then the effective value
    pub config: bool,
    /// Definition status
    pub status: Status,
    /// `mandatory true`
    pub mandatory: bool,
    /// Whether `mandatory` was given explicitly
    pub mandatory_set: bool,
    /// Whether `min-elements` was given explicitly
    pub min_set: bool,
    /// Whether `max-elements` was given explicitly
    pub max_set: bool,
    /// `ordered-by user`
    pub user_ordered: bool,
}

impl Default for NodeFlags {
    fn default() -> Self {
        Self {
            config_set: false,
            config: true,
            status: Status::Current,
            mandatory: false,
            mandatory_set: false,
            min_set: false,
            max_set: false,
            user_ordered: false,
        }
    }
}

/// A `when` or `must` condition
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Compiled expression
    pub expr: CompiledExpr,
    /// Custom `error-message`
    pub error_message: Option<String>,
    /// Custom `error-app-tag`
    pub error_app_tag: Option<String>,
    /// Evaluated with the parent as context (`when` inherited from `uses`/`augment`)
    pub on_parent: bool,
}

/// Extension instance recorded on a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionInstance {
    /// Module defining the extension
    pub module: ModuleId,
    /// Extension name
    pub name: String,
    /// Argument
    pub argument: Option<String>,
    /// Whether a registered plugin handles this extension
    pub handled: bool,
}

/// Bitset over node kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NodeTypes(u16);

impl NodeTypes {
    /// No kind
    pub const NONE: Self = Self(0);
    /// container
    pub const CONTAINER: Self = Self(1 << 0);
    /// leaf
    pub const LEAF: Self = Self(1 << 1);
    /// leaf-list
    pub const LEAF_LIST: Self = Self(1 << 2);
    /// list
    pub const LIST: Self = Self(1 << 3);
    /// choice
    pub const CHOICE: Self = Self(1 << 4);
    /// case
    pub const CASE: Self = Self(1 << 5);
    /// anydata / anyxml
    pub const ANYDATA: Self = Self(1 << 6);
    /// uses
    pub const USES: Self = Self(1 << 7);
    /// grouping
    pub const GROUPING: Self = Self(1 << 8);
    /// augment
    pub const AUGMENT: Self = Self(1 << 9);
    /// rpc / action
    pub const RPC: Self = Self(1 << 10);
    /// input
    pub const INPUT: Self = Self(1 << 11);
    /// output
    pub const OUTPUT: Self = Self(1 << 12);
    /// notification
    pub const NOTIFICATION: Self = Self(1 << 13);
    /// Every kind
    pub const ALL: Self = Self((1 << 14) - 1);
    /// Nodes that can be instantiated in a data tree
    pub const DATA: Self = Self(
        Self::CONTAINER.0 | Self::LEAF.0 | Self::LEAF_LIST.0 | Self::LIST.0 | Self::ANYDATA.0,
    );

    /// Union of two sets
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Intersection of two sets
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Whether all kinds of `other` are in the set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the set is empty
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for NodeTypes {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl std::ops::BitAnd for NodeTypes {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        self.intersection(rhs)
    }
}

/// Leaf payload
#[derive(Debug, Clone, PartialEq)]
pub struct LeafInfo {
    /// Compiled type, `None` while deferred
    pub ty: Option<Arc<Type>>,
    /// Own default value
    pub default: Option<String>,
    /// Units
    pub units: Option<String>,
    /// Resolved leafref targets keyed by path text
    pub leafref_targets: IndexMap<String, NodeId>,
}

/// Leaf-list payload
#[derive(Debug, Clone, PartialEq)]
pub struct LeafListInfo {
    /// Compiled type, `None` while deferred
    pub ty: Option<Arc<Type>>,
    /// Default values (YANG 1.1)
    pub defaults: Vec<String>,
    /// Units
    pub units: Option<String>,
    /// min-elements
    pub min_elements: u32,
    /// max-elements, `None` for unbounded
    pub max_elements: Option<u32>,
    /// Resolved leafref targets keyed by path text
    pub leafref_targets: IndexMap<String, NodeId>,
}

/// A `unique` statement of a list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueSpec {
    /// Argument as written
    pub text: String,
    /// Resolved descendant leaves
    pub leaves: Vec<NodeId>,
}

/// List payload
#[derive(Debug, Clone, PartialEq)]
pub struct ListInfo {
    /// Key names as written
    pub key_names: Vec<String>,
    /// Resolved key leaves, in key order
    pub keys: Vec<NodeId>,
    /// unique statements
    pub uniques: Vec<UniqueSpec>,
    /// min-elements
    pub min_elements: u32,
    /// max-elements, `None` for unbounded
    pub max_elements: Option<u32>,
}

/// Uses payload
#[derive(Debug, Clone, PartialEq)]
pub struct UsesInfo {
    /// Grouping name as written
    pub grouping: String,
    /// Unit the statement was written in
    pub unit: Unit,
    /// refine statements, applied after expansion
    pub refines: Vec<Statement>,
    /// augment nodes nested in the uses
    pub augments: Vec<NodeId>,
}

/// Augment payload
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentInfo {
    /// target-node as written
    pub target: String,
    /// Unit the statement was written in
    pub unit: Unit,
    /// Resolved target once applied
    pub target_node: Option<NodeId>,
}

/// Node kind with its payload
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// container
    Container {
        /// presence argument
        presence: Option<String>,
    },
    /// leaf
    Leaf(LeafInfo),
    /// leaf-list
    LeafList(LeafListInfo),
    /// list
    List(ListInfo),
    /// choice
    Choice {
        /// default case name
        default: Option<String>,
        /// Resolved default case
        default_case: Option<NodeId>,
    },
    /// case
    Case {
        /// Implicit case wrapping a shorthand choice member
        shorthand: bool,
    },
    /// anydata or anyxml
    AnyData {
        /// anyxml rather than anydata
        anyxml: bool,
    },
    /// uses (until expanded)
    Uses(UsesInfo),
    /// grouping
    Grouping,
    /// augment
    Augment(AugmentInfo),
    /// rpc or action
    Rpc {
        /// action rather than rpc
        action: bool,
    },
    /// input
    Input,
    /// output
    Output,
    /// notification
    Notification,
}

impl NodeKind {
    /// Kind as a single-bit set
    pub fn node_type(&self) -> NodeTypes {
        match self {
            NodeKind::Container { .. } => NodeTypes::CONTAINER,
            NodeKind::Leaf(_) => NodeTypes::LEAF,
            NodeKind::LeafList(_) => NodeTypes::LEAF_LIST,
            NodeKind::List(_) => NodeTypes::LIST,
            NodeKind::Choice { .. } => NodeTypes::CHOICE,
            NodeKind::Case { .. } => NodeTypes::CASE,
            NodeKind::AnyData { .. } => NodeTypes::ANYDATA,
            NodeKind::Uses(_) => NodeTypes::USES,
            NodeKind::Grouping => NodeTypes::GROUPING,
            NodeKind::Augment(_) => NodeTypes::AUGMENT,
            NodeKind::Rpc { .. } => NodeTypes::RPC,
            NodeKind::Input => NodeTypes::INPUT,
            NodeKind::Output => NodeTypes::OUTPUT,
            NodeKind::Notification => NodeTypes::NOTIFICATION,
        }
    }

    /// YANG keyword of the kind
    pub fn keyword(&self) -> &'static str {
        match self {
            NodeKind::Container { .. } => "container",
            NodeKind::Leaf(_) => "leaf",
            NodeKind::LeafList(_) => "leaf-list",
            NodeKind::List(_) => "list",
            NodeKind::Choice { .. } => "choice",
            NodeKind::Case { .. } => "case",
            NodeKind::AnyData { anyxml: true } => "anyxml",
            NodeKind::AnyData { anyxml: false } => "anydata",
            NodeKind::Uses(_) => "uses",
            NodeKind::Grouping => "grouping",
            NodeKind::Augment(_) => "augment",
            NodeKind::Rpc { action: true } => "action",
            NodeKind::Rpc { action: false } => "rpc",
            NodeKind::Input => "input",
            NodeKind::Output => "output",
            NodeKind::Notification => "notification",
        }
    }
}

/// A compiled schema node
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    /// Node name
    pub name: String,
    /// Namespace module of the node
    pub module: ModuleId,
    /// Kind and payload
    pub kind: NodeKind,
    /// Structural parent, `None` at the top level
    pub parent: Option<NodeId>,
    /// Ordered children
    pub children: Vec<NodeId>,
    /// Flags
    pub flags: NodeFlags,
    /// `when` conditions, own and inherited
    pub when: Vec<Condition>,
    /// `must` conditions
    pub musts: Vec<Condition>,
    /// Gating `if-feature` expressions, own and inherited
    pub if_features: Vec<IfFeature>,
    /// Lexically scoped typedefs
    pub typedefs: IndexMap<String, TypedefId>,
    /// Lexically scoped groupings
    pub groupings: IndexMap<String, NodeId>,
    /// description
    pub description: Option<String>,
    /// reference
    pub reference: Option<String>,
    /// Augment that spliced this node into its parent
    pub augment: Option<NodeId>,
    /// Extension instances
    pub extensions: Vec<ExtensionInstance>,
    /// Modules whose deviations changed this node
    pub deviated_by: Vec<ModuleId>,
    /// Removed by expansion or `deviate not-supported`
    pub removed: bool,
    /// Source position of the defining statement
    pub position: SourcePos,
}

impl SchemaNode {
    /// Create a node with default properties
    pub fn new(name: impl Into<String>, module: ModuleId, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            module,
            kind,
            parent: None,
            children: Vec::new(),
            flags: NodeFlags::default(),
            when: Vec::new(),
            musts: Vec::new(),
            if_features: Vec::new(),
            typedefs: IndexMap::new(),
            groupings: IndexMap::new(),
            description: None,
            reference: None,
            augment: None,
            extensions: Vec::new(),
            deviated_by: Vec::new(),
            removed: false,
            position: SourcePos::default(),
        }
    }

    /// Kind as a single-bit set
    pub fn node_type(&self) -> NodeTypes {
        self.kind.node_type()
    }

    /// Whether the node is of one of the given kinds
    pub fn is(&self, types: NodeTypes) -> bool {
        types.contains(self.node_type())
    }

    /// Effective config value (valid after compilation)
    pub fn is_config(&self) -> bool {
        self.flags.config
    }

    /// Type of a leaf or leaf-list
    pub fn leaf_type(&self) -> Option<&Arc<Type>> {
        match &self.kind {
            NodeKind::Leaf(info) => info.ty.as_ref(),
            NodeKind::LeafList(info) => info.ty.as_ref(),
            _ => None,
        }
    }

    /// Resolved leafref targets of a leaf or leaf-list
    pub fn leafref_targets(&self) -> Option<&IndexMap<String, NodeId>> {
        match &self.kind {
            NodeKind::Leaf(info) => Some(&info.leafref_targets),
            NodeKind::LeafList(info) => Some(&info.leafref_targets),
            _ => None,
        }
    }

    /// min/max-elements of a list or leaf-list
    pub fn cardinality(&self) -> Option<(u32, Option<u32>)> {
        match &self.kind {
            NodeKind::List(info) => Some((info.min_elements, info.max_elements)),
            NodeKind::LeafList(info) => Some((info.min_elements, info.max_elements)),
            _ => None,
        }
    }

    /// Resolved keys of a list
    pub fn keys(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::List(info) => &info.keys,
            _ => &[],
        }
    }

    /// Whether the node is a presence container
    pub fn is_presence(&self) -> bool {
        matches!(&self.kind, NodeKind::Container { presence: Some(_) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_references() {
        assert!(Status::Current.may_reference(Status::Deprecated));
        assert!(!Status::Current.may_reference(Status::Obsolete));
        assert!(!Status::Deprecated.may_reference(Status::Obsolete));
        assert!(Status::Obsolete.may_reference(Status::Obsolete));
        assert!(Status::from_str("bogus").is_err());
    }

    #[test]
    fn test_node_type_bitset() {
        let lists = NodeTypes::LIST | NodeTypes::LEAF_LIST;
        assert!(lists.contains(NodeTypes::LIST));
        assert!(!lists.contains(NodeTypes::LEAF));
        assert!((lists & NodeTypes::CONTAINER).is_empty());
        assert!(NodeTypes::DATA.contains(NodeTypes::ANYDATA));
        assert!(NodeTypes::ALL.contains(NodeTypes::NOTIFICATION));
    }

    #[test]
    fn test_node_kind_keyword() {
        let node = SchemaNode::new("x", ModuleId::from_index(0), NodeKind::AnyData { anyxml: true });
        assert_eq!(node.kind.keyword(), "anyxml");
        assert!(node.is(NodeTypes::DATA));
        assert!(!node.is(NodeTypes::LEAF));
    }
}
