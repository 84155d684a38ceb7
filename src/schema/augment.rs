//! Augment application
//!
//! Top-level augments of an implemented module are applied with a retry
//! worklist: an augment whose target is itself added by another augment
//! waits until that one has been spliced in.

use indexmap::IndexSet;

use crate::error::{ErrorKind, SchemaError};
use crate::ids::{ModuleId, NodeId};

use super::node::NodeKind;
use super::{Context, NodeTypes, SchemaNode};

/// Node kinds an augment may target
const AUGMENTABLE: NodeTypes = NodeTypes::CONTAINER
    .union(NodeTypes::LIST)
    .union(NodeTypes::CHOICE)
    .union(NodeTypes::CASE)
    .union(NodeTypes::INPUT)
    .union(NodeTypes::OUTPUT)
    .union(NodeTypes::NOTIFICATION);

impl Context {
    /// Apply the top-level augments of a module
    ///
    /// Returns the modules whose trees were changed.
    pub(crate) fn apply_augments(&mut self, module: ModuleId) -> Result<IndexSet<ModuleId>, SchemaError> {
        let mut queue: Vec<NodeId> = self
            .module(module)
            .augments
            .iter()
            .copied()
            .filter(|a| match &self.node(*a).kind {
                NodeKind::Augment(info) => info.target_node.is_none(),
                _ => false,
            })
            .collect();
        let mut touched = IndexSet::new();

        while !queue.is_empty() {
            let before = queue.len();
            let mut waiting = Vec::new();
            let mut last_error = None;
            for aug in queue {
                let node = self.node(aug);
                let NodeKind::Augment(info) = &node.kind else {
                    continue;
                };
                if !info.target.starts_with('/') {
                    return Err(SchemaError::syntax(format!(
                        "Top-level augment '{}' must use an absolute path",
                        info.target
                    ))
                    .with_position(node.position));
                }
                let position = node.position;
                match self.resolve_schema_nodeid(&info.target, info.unit, None, false) {
                    Ok(target) => {
                        self.splice_augment(aug, target)?;
                        touched.insert(self.node(target).module);
                    }
                    Err(e) if e.kind == ErrorKind::UnresolvedReference => {
                        last_error = Some(e.with_position(position));
                        waiting.push(aug);
                    }
                    Err(e) => return Err(e.with_position(position)),
                }
            }
            if waiting.len() == before {
                return Err(last_error.unwrap_or_else(|| {
                    SchemaError::unresolved("Augment target could not be resolved")
                }));
            }
            queue = waiting;
        }
        Ok(touched)
    }

    /// Move the children of an augment node under its target
    pub(crate) fn splice_augment(&mut self, aug: NodeId, target: NodeId) -> Result<(), SchemaError> {
        let aug_node = self.node(aug).clone();
        let target_node = self.node(target);
        let target_type = target_node.node_type();
        if !AUGMENTABLE.contains(target_type) {
            return Err(SchemaError::incompatible(format!(
                "Augment target '{}' is a {} and cannot be augmented",
                aug_node.name,
                target_node.kind.keyword()
            ))
            .with_position(aug_node.position));
        }
        let cross_module = aug_node.module != target_node.module;
        let target_name = target_node.name.clone();
        let inherited_when: Vec<_> = aug_node
            .when
            .iter()
            .map(|w| {
                let mut w = w.clone();
                w.on_parent = true;
                w
            })
            .collect();

        for child in aug_node.children.iter().copied() {
            if self.node(child).removed {
                continue;
            }
            let child_type = self.node(child).node_type();
            if child_type == NodeTypes::CASE && target_type != NodeTypes::CHOICE {
                return Err(SchemaError::incompatible(format!(
                    "Case '{}' can only augment a choice, not {} '{}'",
                    self.node(child).name,
                    self.node(target).kind.keyword(),
                    target_name
                ))
                .with_position(self.node(child).position));
            }
            if cross_module && aug_node.when.is_empty() && self.is_mandatory_node(child) {
                return Err(SchemaError::constraint(format!(
                    "Augment '{}' adds mandatory node '{}' to another module without a when condition",
                    aug_node.name,
                    self.node(child).name
                ))
                .with_position(self.node(child).position));
            }

            let spliced = if target_type == NodeTypes::CHOICE && child_type != NodeTypes::CASE {
                let inner = self.node(child);
                let mut case = SchemaNode::new(inner.name.clone(), inner.module, NodeKind::Case { shorthand: true });
                case.position = inner.position;
                case.children.push(child);
                let case = self.add_node(case)?;
                self.node_mut(child).parent = Some(case);
                case
            } else {
                child
            };

            let node = self.node_mut(spliced);
            node.parent = Some(target);
            node.augment = Some(aug);
            node.when.extend(inherited_when.iter().cloned());
            node.if_features.extend(aug_node.if_features.iter().cloned());
            self.node_mut(target).children.push(spliced);
        }

        let node = self.node_mut(aug);
        node.children.clear();
        if let NodeKind::Augment(info) = &mut node.kind {
            info.target_node = Some(target);
        }
        tracing::debug!(augment = %aug_node.name, "applied augment");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "module a { namespace urn:a; prefix a;
        container c { choice ch { leaf x { type string; } } }
        leaf l { type string; } }";

    #[test]
    fn test_augment_container() {
        let mut ctx = Context::new();
        ctx.add_source_str(BASE).unwrap();
        let b = ctx
            .load_yang_str(
                "module b { namespace urn:b; prefix b; import a { prefix a; }
                   augment /a:c { leaf y { type string; } } }",
            )
            .unwrap();
        let y = ctx.find_path("/a:c/b:y").unwrap();
        assert_eq!(ctx.node(y).module, b);
        assert_eq!(ctx.node_path(y), "/a:c/b:y");
        assert!(ctx.node(y).augment.is_some());
    }

    #[test]
    fn test_augment_choice_wraps_case() {
        let mut ctx = Context::new();
        ctx.add_source_str(BASE).unwrap();
        ctx.load_yang_str(
            "module b { namespace urn:b; prefix b; import a { prefix a; }
               augment /a:c/a:ch { leaf z { type string; } } }",
        )
        .unwrap();
        let z = ctx.find_path("/a:c/a:ch/b:z/z").unwrap();
        let case = ctx.node(z).parent.unwrap();
        assert!(matches!(ctx.node(case).kind, NodeKind::Case { shorthand: true }));
    }

    #[test]
    fn test_augment_leaf_is_incompatible() {
        let mut ctx = Context::new();
        ctx.add_source_str(BASE).unwrap();
        let err = ctx
            .load_yang_str(
                "module b { namespace urn:b; prefix b; import a { prefix a; }
                   augment /a:l { leaf y { type string; } } }",
            )
            .unwrap_err();
        assert_eq!(err.schema_kind(), Some(ErrorKind::IncompatibleTarget));
    }

    #[test]
    fn test_augment_mandatory_needs_when() {
        let mut ctx = Context::new();
        ctx.add_source_str(BASE).unwrap();
        let err = ctx
            .load_yang_str(
                "module b { namespace urn:b; prefix b; import a { prefix a; }
                   augment /a:c { leaf y { type string; mandatory true; } } }",
            )
            .unwrap_err();
        assert_eq!(err.schema_kind(), Some(ErrorKind::ConstraintViolation));

        ctx.load_yang_str(
            "module b { namespace urn:b; prefix b; import a { prefix a; }
               augment /a:c { when \"a:l = 'on'\"; leaf y { type string; mandatory true; } } }",
        )
        .unwrap();
        let y = ctx.find_path("/a:c/b:y").unwrap();
        assert!(ctx.node(y).when[0].on_parent);
    }

    #[test]
    fn test_augment_of_augmented_node() {
        let mut ctx = Context::new();
        ctx.add_source_str(BASE).unwrap();
        ctx.load_yang_str(
            "module b { namespace urn:b; prefix b; import a { prefix a; }
               augment /a:c/b:inner { leaf deep { type int8; } }
               augment /a:c { container inner; } }",
        )
        .unwrap();
        assert!(ctx.find_path("/a:c/b:inner/deep").is_ok());
    }
}
