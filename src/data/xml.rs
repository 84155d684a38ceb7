//! XML encoding of instance data
//!
//! Elements are matched to schema nodes by namespace URI and local name.
//! A top-level element whose namespace belongs to no module and whose name
//! is `data` or `config` is treated as a transparent wrapper, so NETCONF
//! replies with several top-level nodes load directly.
//!
//! Prefixes inside identityref and instance-identifier values are
//! rewritten to module names while the XML namespace scope is known.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;

use crate::error::{Error, ErrorKind, Result};
use crate::ids::{DataId, ModuleId, NodeId};
use crate::schema::{BuiltinKind, Context, NodeTypes, Type, TypeInfo};

use super::{invalid, DataTree};

static VALUE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_.\-]*):([A-Za-z_])").unwrap());

/// In-scope namespace declarations of one element
#[derive(Debug, Clone, Default)]
struct NamespaceScope {
    prefixes: HashMap<String, String>,
    default_namespace: Option<String>,
}

impl NamespaceScope {
    fn namespace(&self, prefix: Option<&str>) -> Option<&str> {
        match prefix {
            Some(p) => self.prefixes.get(p).map(String::as_str),
            None => self.default_namespace.as_deref(),
        }
    }
}

/// What an open element turned into
#[derive(Debug, Clone, Copy)]
enum Frame {
    /// Transparent wrapper element
    Wrapper,
    /// Container or list entry
    Inner(DataId),
    /// Leaf, leaf-list entry or anydata collecting text
    Value(NodeId),
    /// Markup inside anydata, ignored
    Skipped,
}

struct XmlLoader<'c> {
    ctx: &'c Context,
    tree: DataTree,
    scopes: Vec<NamespaceScope>,
    frames: Vec<Frame>,
    text: String,
}

fn element_name(start: &BytesStart) -> Result<String> {
    std::str::from_utf8(start.name().as_ref())
        .map(str::to_string)
        .map_err(|e| Error::Xml(format!("Invalid element name: {}", e)))
}

fn has_prefixed_values(ty: &Type) -> bool {
    match &ty.info {
        TypeInfo::Union { members } => members.iter().any(|m| has_prefixed_values(m)),
        _ => matches!(ty.base, BuiltinKind::Identityref | BuiltinKind::InstanceIdentifier),
    }
}

impl<'c> XmlLoader<'c> {
    fn scope(&self) -> &NamespaceScope {
        // the document scope is pushed before the first element
        &self.scopes[self.scopes.len() - 1]
    }

    fn push_scope(&mut self, start: &BytesStart) -> Result<()> {
        let mut scope = self.scope().clone();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| Error::Xml(format!("Failed to parse attribute: {}", e)))?;
            let key = std::str::from_utf8(attr.key.as_ref())
                .map_err(|e| Error::Xml(format!("Invalid attribute name: {}", e)))?;
            let value = attr
                .unescape_value()
                .map_err(|e| Error::Xml(format!("Failed to unescape attribute value: {}", e)))?
                .to_string();
            if key == "xmlns" {
                scope.default_namespace = Some(value);
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                scope.prefixes.insert(prefix.to_string(), value);
            }
        }
        self.scopes.push(scope);
        Ok(())
    }

    fn parent_data(&self) -> Option<DataId> {
        self.frames.iter().rev().find_map(|f| match f {
            Frame::Inner(id) => Some(*id),
            _ => None,
        })
    }

    fn module_of(&self, prefix: Option<&str>) -> Option<ModuleId> {
        self.scope()
            .namespace(prefix)
            .and_then(|ns| self.ctx.module_by_namespace(ns))
    }

    fn start(&mut self, start: &BytesStart) -> Result<()> {
        self.push_scope(start)?;
        if matches!(self.frames.last(), Some(Frame::Value(_) | Frame::Skipped)) {
            self.frames.push(Frame::Skipped);
            return Ok(());
        }
        let qname = element_name(start)?;
        let (prefix, local) = match qname.split_once(':') {
            Some((p, l)) => (Some(p), l),
            None => (None, qname.as_str()),
        };
        let module = self.module_of(prefix);
        let at_top = self.frames.iter().all(|f| matches!(f, Frame::Wrapper));
        if at_top && module.is_none() && (local == "data" || local == "config") {
            self.frames.push(Frame::Wrapper);
            return Ok(());
        }
        let module = module.ok_or_else(|| {
            invalid(
                ErrorKind::UnresolvedReference,
                format!("Element '{}' has no module namespace", qname),
            )
        })?;
        let parent = self.parent_data();
        let parent_schema = parent.map(|p| self.tree.node(p).schema);
        if parent.is_none() && !self.ctx.module(module).implemented {
            return Err(invalid(
                ErrorKind::UnresolvedReference,
                format!("Module '{}' is not implemented", self.ctx.module(module).name),
            ));
        }
        let schema = self
            .ctx
            .find_data_child(parent_schema, module, local)
            .ok_or_else(|| invalid(ErrorKind::UnresolvedReference, format!("No schema node for '{}'", qname)))?;
        if self.ctx.node(schema).is(NodeTypes::CONTAINER | NodeTypes::LIST) {
            let id = self.tree.add_node(self.ctx, parent, schema, None)?;
            self.frames.push(Frame::Inner(id));
        } else {
            self.text.clear();
            self.frames.push(Frame::Value(schema));
        }
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| Error::Xml("Unbalanced end tag".to_string()))?;
        if let Frame::Value(schema) = frame {
            let mut value = std::mem::take(&mut self.text);
            let node = self.ctx.node(schema);
            if node.is(NodeTypes::LEAF | NodeTypes::LEAF_LIST) {
                value = value.trim().to_string();
                if node.leaf_type().map_or(false, |t| has_prefixed_values(t)) {
                    value = self.rewrite_prefixes(&value);
                }
            }
            let parent = self.parent_data();
            self.tree.add_node(self.ctx, parent, schema, Some(value))?;
        }
        self.scopes.pop();
        Ok(())
    }

    fn rewrite_prefixes(&self, value: &str) -> String {
        VALUE_PREFIX
            .replace_all(value, |caps: &regex::Captures<'_>| {
                match self.module_of(Some(&caps[1])) {
                    Some(m) => format!("{}:{}", self.ctx.module(m).name, &caps[2]),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

impl DataTree {
    /// Load an XML document
    pub fn from_xml_str(ctx: &Context, text: &str) -> Result<Self> {
        let mut reader = Reader::from_str(text);
        reader.trim_text(false);
        let mut loader = XmlLoader {
            ctx,
            tree: DataTree::new(),
            scopes: vec![NamespaceScope::default()],
            frames: Vec::new(),
            text: String::new(),
        };

        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => loader.start(&e)?,
                Ok(Event::Empty(e)) => {
                    loader.start(&e)?;
                    loader.end()?;
                }
                Ok(Event::End(_)) => loader.end()?,
                Ok(Event::Text(e)) => {
                    if matches!(loader.frames.last(), Some(Frame::Value(_))) {
                        let text = e
                            .unescape()
                            .map_err(|e| Error::Xml(format!("Failed to unescape text: {}", e)))?;
                        loader.text.push_str(&text);
                    }
                }
                Ok(Event::CData(e)) => {
                    if matches!(loader.frames.last(), Some(Frame::Value(_))) {
                        loader.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::Xml(format!(
                        "Error parsing XML at position {}: {}",
                        reader.buffer_position(),
                        e
                    )))
                }
                _ => {}
            }
            buf.clear();
        }
        if !loader.frames.is_empty() {
            return Err(Error::Xml("Unexpected end of document".to_string()));
        }
        tracing::debug!(nodes = loader.tree.len(), "loaded XML instance data");
        Ok(loader.tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Context {
        let mut ctx = Context::new();
        ctx.load_yang_str(
            "module m { yang-version 1.1; namespace urn:m; prefix m;
               identity base; identity derived { base base; }
               container c {
                 leaf kind { type identityref { base base; } }
                 leaf-list tags { type string; }
                 anydata extra;
               } }",
        )
        .unwrap();
        ctx
    }

    #[test]
    fn test_load_xml() {
        let ctx = schema();
        let tree = DataTree::from_xml_str(
            &ctx,
            r#"<c xmlns="urn:m" xmlns:x="urn:m">
                 <kind>x:derived</kind>
                 <tags>a</tags><tags>b</tags>
                 <extra><anything>ignored</anything></extra>
               </c>"#,
        )
        .unwrap();
        let c = tree.roots()[0];
        let kind = tree.find_child(&ctx, Some(c), "kind").unwrap();
        assert_eq!(tree.node(kind).value.as_deref(), Some("m:derived"));
        assert_eq!(tree.node(c).children.len(), 4);
    }

    #[test]
    fn test_netconf_wrapper() {
        let ctx = schema();
        let tree = DataTree::from_xml_str(
            &ctx,
            r#"<data xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><c xmlns="urn:m"/></data>"#,
        )
        .unwrap();
        assert_eq!(tree.roots().len(), 1);
    }

    #[test]
    fn test_unknown_namespace() {
        let ctx = schema();
        assert!(DataTree::from_xml_str(&ctx, r#"<c xmlns="urn:other"/>"#).is_err());
        assert!(DataTree::from_xml_str(&ctx, r#"<c xmlns="urn:m"><nope/></c>"#).is_err());
    }
}
