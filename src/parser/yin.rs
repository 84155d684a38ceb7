//! YIN (XML) syntax reader
//!
//! Each element in the YIN namespace becomes a statement; the statement
//! argument is taken from the attribute or child element defined by the
//! YIN mapping of RFC 7950 section 13.

use crate::error::SchemaError;
use crate::statement::{SourcePos, Statement};

/// YIN namespace URI
pub const YIN_NAMESPACE: &str = "urn:ietf:params:xml:ns:yang:yin:1";

/// How a keyword carries its argument in YIN
enum YinArg {
    None,
    Attribute(&'static str),
    Element(&'static str),
}

fn yin_argument(keyword: &str) -> YinArg {
    use YinArg::*;
    match keyword {
        "input" | "output" => None,
        "contact" | "description" | "organization" | "reference" => Element("text"),
        "error-message" => Element("value"),
        "augment" | "deviation" | "refine" => Attribute("target-node"),
        "belongs-to" | "import" | "include" => Attribute("module"),
        "must" | "when" => Attribute("condition"),
        "namespace" => Attribute("uri"),
        "revision" | "revision-date" => Attribute("date"),
        "unique" => Attribute("tag"),
        "config" | "default" | "deviate" | "error-app-tag" | "fraction-digits" | "key"
        | "length" | "mandatory" | "max-elements" | "min-elements" | "modifier"
        | "ordered-by" | "path" | "pattern" | "position" | "prefix" | "presence" | "range"
        | "require-instance" | "status" | "value" | "yang-version" | "yin-element" => {
            Attribute("value")
        }
        _ => Attribute("name"),
    }
}

/// Parse a YIN module or submodule from XML text
pub fn parse_yin(text: &str) -> Result<Statement, SchemaError> {
    let doc = roxmltree::Document::parse(text)
        .map_err(|e| SchemaError::syntax(format!("Invalid YIN document: {}", e)))?;
    let root = doc.root_element();
    let stmt = element_to_statement(&doc, root)?;
    if stmt.keyword != "module" && stmt.keyword != "submodule" {
        return Err(SchemaError::syntax(format!(
            "Expected 'module' or 'submodule', found '{}'",
            stmt.keyword
        )));
    }
    Ok(stmt)
}

fn position(doc: &roxmltree::Document<'_>, node: roxmltree::Node<'_, '_>) -> SourcePos {
    let pos = doc.text_pos_at(node.range().start);
    SourcePos::new(pos.row, pos.col)
}

fn element_to_statement(
    doc: &roxmltree::Document<'_>,
    elem: roxmltree::Node<'_, '_>,
) -> Result<Statement, SchemaError> {
    let position = position(doc, elem);
    let name = elem.tag_name();
    let in_yin = name.namespace() == Some(YIN_NAMESPACE);

    let keyword = if in_yin {
        name.name().to_string()
    } else {
        let prefix = name
            .namespace()
            .and_then(|ns| elem.lookup_prefix(ns))
            .unwrap_or("");
        format!("{}:{}", prefix, name.name())
    };

    let mut children = Vec::new();
    let mut argument = None;

    if in_yin {
        match yin_argument(&keyword) {
            YinArg::None => {}
            YinArg::Attribute(attr) => {
                argument = elem.attribute(attr).map(str::to_string);
                if argument.is_none() {
                    return Err(SchemaError::syntax(format!(
                        "Missing argument attribute '{}' of '{}'",
                        attr, keyword
                    ))
                    .with_position(position));
                }
            }
            YinArg::Element(child) => {
                let text = elem
                    .children()
                    .find(|c| {
                        c.is_element()
                            && c.tag_name().name() == child
                            && c.tag_name().namespace() == Some(YIN_NAMESPACE)
                    })
                    .map(|c| c.text().unwrap_or("").to_string());
                if text.is_none() {
                    return Err(SchemaError::syntax(format!(
                        "Missing argument element '{}' of '{}'",
                        child, keyword
                    ))
                    .with_position(position));
                }
                argument = text;
            }
        }
    } else {
        argument = elem
            .attributes()
            .next()
            .map(|a| a.value().to_string())
            .or_else(|| elem.text().map(|t| t.trim().to_string()).filter(|t| !t.is_empty()));
    }

    for child in elem.children().filter(|c| c.is_element()) {
        if in_yin {
            if let YinArg::Element(arg_elem) = yin_argument(&keyword) {
                if child.tag_name().name() == arg_elem
                    && child.tag_name().namespace() == Some(YIN_NAMESPACE)
                {
                    continue;
                }
            }
        }
        children.push(element_to_statement(doc, child)?);
    }

    Ok(Statement {
        keyword,
        argument,
        children,
        position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yin_module() {
        let yin = r#"<module name="m" xmlns="urn:ietf:params:xml:ns:yang:yin:1">
  <namespace uri="urn:m"/>
  <prefix value="m"/>
  <description><text>demo</text></description>
  <container name="c">
    <leaf name="x"><type name="string"/></leaf>
  </container>
</module>"#;
        let stmt = parse_yin(yin).unwrap();
        assert_eq!(stmt.keyword, "module");
        assert_eq!(stmt.arg(), "m");
        assert_eq!(stmt.find_arg("namespace"), Some("urn:m"));
        assert_eq!(stmt.find_arg("description"), Some("demo"));
        let c = stmt.find("container").unwrap();
        assert_eq!(c.find("leaf").unwrap().find_arg("type"), Some("string"));
        assert_eq!(c.position.line, 5);
    }

    #[test]
    fn test_missing_argument() {
        let yin = r#"<module name="m" xmlns="urn:ietf:params:xml:ns:yang:yin:1"><prefix/></module>"#;
        assert!(parse_yin(yin).is_err());
    }

    #[test]
    fn test_extension_instance() {
        let yin = r#"<module name="m" xmlns="urn:ietf:params:xml:ns:yang:yin:1" xmlns:e="urn:e">
  <e:note text="hello"/>
</module>"#;
        let stmt = parse_yin(yin).unwrap();
        assert_eq!(stmt.children[0].keyword, "e:note");
        assert_eq!(stmt.children[0].arg(), "hello");
    }
}
