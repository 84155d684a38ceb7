//! JSON encoding of instance data (RFC 7951)
//!
//! Member names are `module:name` where the module changes and plain
//! `name` otherwise. Lists and leaf-lists are arrays, `empty` leaves are
//! `[null]`, and 64-bit integers and decimal64 may be strings.

use serde_json::{Map, Value};

use crate::error::{ErrorKind, Result};
use crate::ids::{DataId, NodeId};
use crate::schema::{BuiltinKind, Context, NodeKind, NodeTypes};

use super::{invalid, DataTree};

fn scalar(value: &Value, name: &str) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Array(items) if items.len() == 1 && items[0].is_null() => Ok(String::new()),
        _ => Err(invalid(
            ErrorKind::SyntaxViolation,
            format!("Member '{}' must be a scalar value", name),
        )),
    }
}

impl DataTree {
    /// Load an RFC 7951 JSON document
    pub fn from_json_str(ctx: &Context, text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(members) = value else {
            return Err(invalid(
                ErrorKind::SyntaxViolation,
                "JSON instance data must be an object",
            ));
        };
        let mut tree = DataTree::new();
        tree.load_members(ctx, None, &members)?;
        tracing::debug!(nodes = tree.len(), "loaded JSON instance data");
        Ok(tree)
    }

    fn load_members(&mut self, ctx: &Context, parent: Option<DataId>, members: &Map<String, Value>) -> Result<()> {
        for (name, value) in members {
            if name.starts_with('@') {
                continue;
            }
            let schema = self.resolve_child(ctx, parent, name)?;
            match &ctx.node(schema).kind {
                NodeKind::Container { .. } => {
                    let Value::Object(inner) = value else {
                        return Err(invalid(
                            ErrorKind::SyntaxViolation,
                            format!("Container '{}' must be an object", name),
                        ));
                    };
                    let id = self.add_node(ctx, parent, schema, None)?;
                    self.load_members(ctx, Some(id), inner)?;
                }
                NodeKind::List(_) => {
                    let Value::Array(entries) = value else {
                        return Err(invalid(
                            ErrorKind::SyntaxViolation,
                            format!("List '{}' must be an array", name),
                        ));
                    };
                    for entry in entries {
                        let Value::Object(inner) = entry else {
                            return Err(invalid(
                                ErrorKind::SyntaxViolation,
                                format!("Entry of list '{}' must be an object", name),
                            ));
                        };
                        let id = self.add_node(ctx, parent, schema, None)?;
                        self.load_members(ctx, Some(id), inner)?;
                        self.keys_first(ctx, id, schema);
                    }
                }
                NodeKind::LeafList(_) => {
                    let Value::Array(entries) = value else {
                        return Err(invalid(
                            ErrorKind::SyntaxViolation,
                            format!("Leaf-list '{}' must be an array", name),
                        ));
                    };
                    for entry in entries {
                        let text = scalar(entry, name)?;
                        self.add_node(ctx, parent, schema, Some(text))?;
                    }
                }
                NodeKind::Leaf(_) => {
                    let is_empty = ctx
                        .node(schema)
                        .leaf_type()
                        .map_or(false, |t| t.base == BuiltinKind::Empty);
                    if is_empty && !matches!(value, Value::Array(_)) {
                        return Err(invalid(
                            ErrorKind::SyntaxViolation,
                            format!("Empty leaf '{}' must be [null]", name),
                        ));
                    }
                    let text = scalar(value, name)?;
                    self.add_node(ctx, parent, schema, Some(text))?;
                }
                NodeKind::AnyData { .. } => {
                    self.add_node(ctx, parent, schema, Some(value.to_string()))?;
                }
                other => {
                    return Err(invalid(
                        ErrorKind::IncompatibleTarget,
                        format!("'{}' is a {} and cannot appear in data", name, other.keyword()),
                    ))
                }
            }
        }
        Ok(())
    }

    /// JSON objects are unordered: move key leaves to the front in key order
    fn keys_first(&mut self, ctx: &Context, entry: DataId, schema: NodeId) {
        let keys = ctx.node(schema).keys().to_vec();
        let mut children = std::mem::take(&mut self.node_mut(entry).children);
        let mut ordered = Vec::with_capacity(children.len());
        for key in keys {
            if let Some(pos) = children.iter().position(|c| self.node(*c).schema == key) {
                ordered.push(children.remove(pos));
            }
        }
        ordered.extend(children);
        self.node_mut(entry).children = ordered;
    }

    /// Serialize the tree as RFC 7951 JSON
    pub fn to_json(&self, ctx: &Context) -> Value {
        self.members_json(ctx, None)
    }

    fn members_json(&self, ctx: &Context, parent: Option<DataId>) -> Value {
        let parent_module = parent.map(|p| ctx.node(self.node(p).schema).module);
        let mut out = Map::new();
        for &child in self.children_of(parent) {
            let node = self.node(child);
            let schema = ctx.node(node.schema);
            let name = if parent_module == Some(schema.module) {
                schema.name.clone()
            } else {
                format!("{}:{}", ctx.module(schema.module).name, schema.name)
            };
            let value = match &schema.kind {
                NodeKind::Leaf(_) | NodeKind::LeafList(_) => {
                    let text = node.value.clone().unwrap_or_default();
                    match schema.leaf_type().map(|t| t.base) {
                        Some(BuiltinKind::Empty) => Value::Array(vec![Value::Null]),
                        Some(BuiltinKind::Boolean) => Value::Bool(text == "true"),
                        Some(
                            BuiltinKind::Int8
                            | BuiltinKind::Int16
                            | BuiltinKind::Int32
                            | BuiltinKind::Uint8
                            | BuiltinKind::Uint16
                            | BuiltinKind::Uint32,
                        ) => text
                            .parse::<i64>()
                            .map(Value::from)
                            .unwrap_or(Value::String(text)),
                        _ => Value::String(text),
                    }
                }
                NodeKind::AnyData { .. } => node
                    .value
                    .as_deref()
                    .and_then(|v| serde_json::from_str(v).ok())
                    .unwrap_or(Value::Null),
                _ => self.members_json(ctx, Some(child)),
            };
            if schema.is(NodeTypes::LIST | NodeTypes::LEAF_LIST) {
                if let Value::Array(items) = out.entry(name).or_insert_with(|| Value::Array(Vec::new())) {
                    items.push(value);
                }
            } else {
                out.insert(name, value);
            }
        }
        Value::Object(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema() -> Context {
        let mut ctx = Context::new();
        ctx.load_yang_str(
            "module m { namespace urn:m; prefix m;
               container c {
                 list l { key k; leaf k { type string; } leaf v { type int8; } }
                 leaf flag { type empty; }
                 leaf big { type uint64; }
               } }",
        )
        .unwrap();
        ctx
    }

    #[test]
    fn test_load_json() {
        let ctx = schema();
        let tree = DataTree::from_json_str(
            &ctx,
            r#"{"m:c": {"l": [{"v": 3, "k": "a"}], "flag": [null], "big": "18446744073709551615"}}"#,
        )
        .unwrap();
        let c = tree.roots()[0];
        let l = tree.find_child(&ctx, Some(c), "l").unwrap();
        let first = tree.node(l).children[0];
        assert_eq!(ctx.node(tree.node(first).schema).name, "k");
        let big = tree.find_child(&ctx, Some(c), "big").unwrap();
        assert_eq!(tree.node(big).value.as_deref(), Some("18446744073709551615"));
    }

    #[test]
    fn test_json_roundtrip_shape() {
        let ctx = schema();
        let input = json!({"m:c": {"l": [{"k": "a", "v": 3}], "flag": [null]}});
        let tree = DataTree::from_json_str(&ctx, &input.to_string()).unwrap();
        assert_eq!(tree.to_json(&ctx), input);
    }

    #[test]
    fn test_json_errors() {
        let ctx = schema();
        assert!(DataTree::from_json_str(&ctx, "[1]").is_err());
        assert!(DataTree::from_json_str(&ctx, r#"{"c": {}}"#).is_err());
        assert!(DataTree::from_json_str(&ctx, r#"{"m:c": {"flag": true}}"#).is_err());
        assert!(DataTree::from_json_str(&ctx, r#"{"m:c": {"l": {"k": "a"}}}"#).is_err());
    }
}
