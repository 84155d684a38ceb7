//! Tree rendering of compiled modules
//!
//! Produces the indented `+--rw name?   type` layout familiar from YANG
//! tooling. Only live nodes are printed; nodes disabled by if-features are
//! printed with their condition.

use std::fmt::Write as _;

use crate::ids::{ModuleId, NodeId};

use super::node::NodeKind;
use super::{Context, NodeTypes, TypeName};

impl Context {
    /// Render the compiled tree of a module
    pub fn print_tree(&self, module: ModuleId) -> String {
        let m = self.module(module);
        let mut out = String::new();
        let _ = writeln!(out, "module: {}", m.name);

        let data: Vec<NodeId> = self.top_level_data(module).collect();
        self.print_children(&mut out, &data, "  ", module);

        for &aug in &m.augments {
            let NodeKind::Augment(info) = &self.node(aug).kind else {
                continue;
            };
            let Some(target) = info.target_node else {
                continue;
            };
            let added: Vec<NodeId> = self
                .children(target)
                .filter(|c| self.node(*c).augment == Some(aug))
                .collect();
            if added.is_empty() {
                continue;
            }
            let _ = writeln!(out, "\n  augment {}:", info.target);
            self.print_children(&mut out, &added, "    ", module);
        }

        let rpcs: Vec<NodeId> = m.rpcs.iter().copied().filter(|r| !self.node(*r).removed).collect();
        if !rpcs.is_empty() {
            let _ = writeln!(out, "\n  rpcs:");
            self.print_children(&mut out, &rpcs, "    ", module);
        }
        let notifications: Vec<NodeId> = m
            .notifications
            .iter()
            .copied()
            .filter(|n| !self.node(*n).removed)
            .collect();
        if !notifications.is_empty() {
            let _ = writeln!(out, "\n  notifications:");
            self.print_children(&mut out, &notifications, "    ", module);
        }
        out
    }

    fn print_children(&self, out: &mut String, nodes: &[NodeId], indent: &str, module: ModuleId) {
        for (i, &id) in nodes.iter().enumerate() {
            let last = i + 1 == nodes.len();
            self.print_node(out, id, indent, module);
            let children: Vec<NodeId> = self.children(id).collect();
            if !children.is_empty() {
                let next = format!("{}{}", indent, if last { "   " } else { "|  " });
                self.print_children(out, &children, &next, module);
            }
        }
    }

    fn print_node(&self, out: &mut String, id: NodeId, indent: &str, module: ModuleId) {
        let node = self.node(id);
        let flags = match &node.kind {
            NodeKind::Rpc { .. } => "-x",
            NodeKind::Notification => "-n",
            NodeKind::Input => "-w",
            NodeKind::Output => "ro",
            NodeKind::Case { .. } => "",
            _ if self.in_operation(id) => "-w",
            _ if node.flags.config => "rw",
            _ => "ro",
        };
        let name = if node.module == module {
            node.name.clone()
        } else {
            format!("{}:{}", self.module(node.module).prefix, node.name)
        };
        let label = match &node.kind {
            NodeKind::Choice { .. } => format!("({}){}", name, if node.flags.mandatory { "" } else { "?" }),
            NodeKind::Case { .. } => format!(":({})", name),
            NodeKind::Container { presence: Some(_) } => format!("{}!", name),
            NodeKind::Leaf(_) | NodeKind::AnyData { .. } if !node.flags.mandatory && !self.is_key(id) => {
                format!("{}?", name)
            }
            NodeKind::LeafList(_) => format!("{}*", name),
            NodeKind::List(info) => format!("{}* [{}]", name, info.key_names.join(" ")),
            _ => name,
        };

        let mut line = format!("{}+--{} {}", indent, flags, label);
        if let Some(ty) = node.leaf_type() {
            let type_name = match ty.name {
                TypeName::Typedef(td) => {
                    let typedef = self.typedef(td);
                    if typedef.module == module {
                        typedef.name.clone()
                    } else {
                        format!("{}:{}", self.module(typedef.module).prefix, typedef.name)
                    }
                }
                _ => match ty.leafrefs().first() {
                    Some((path, _)) if ty.base == super::BuiltinKind::Leafref => {
                        format!("-> {}", path.text)
                    }
                    _ => ty.base.name().to_string(),
                },
            };
            let _ = write!(line, "   {}", type_name);
        }
        if !node.if_features.is_empty() {
            let conditions: Vec<&str> = node.if_features.iter().map(|f| f.text.as_str()).collect();
            let _ = write!(line, " {{{}}}?", conditions.join(","));
        }
        let _ = writeln!(out, "{}", line);
    }

    fn is_key(&self, id: NodeId) -> bool {
        self.node(id)
            .parent
            .map_or(false, |p| self.node(p).keys().contains(&id))
    }

    fn in_operation(&self, id: NodeId) -> bool {
        let mut current = self.node(id).parent;
        while let Some(p) = current {
            if self.node(p).is(NodeTypes::INPUT) {
                return true;
            }
            current = self.node(p).parent;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_tree() {
        let mut ctx = Context::new();
        let m = ctx
            .load_yang_str(
                "module m { namespace urn:m; prefix m;
                   container c {
                     list l { key k; leaf k { type string; } leaf v { type int8; } }
                     leaf-list ll { type string; }
                   }
                   leaf s { type string; config false; }
                   rpc ping { input { leaf host { type string; } } } }",
            )
            .unwrap();
        let tree = ctx.print_tree(m);
        assert!(tree.starts_with("module: m\n"));
        assert!(tree.contains("+--rw c\n"));
        assert!(tree.contains("|  +--rw l* [k]"));
        assert!(tree.contains("+--rw k   string"));
        assert!(tree.contains("+--rw v?   int8"));
        assert!(tree.contains("+--ro s?   string"));
        assert!(tree.contains("rpcs:"));
        assert!(tree.contains("+---x ping"));
    }
}
