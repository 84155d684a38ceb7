//! Instance data integration tests
//!
//! JSON and XML documents are loaded against compiled modules and run
//! through the validator with the different option sets.

use pretty_assertions::assert_eq;
use serde_json::json;
use yangkit::{validate, Context, DataTree, Error, ErrorKind, ValidateOptions};

const INTERFACES: &str = r#"module if {
    yang-version 1.1;
    namespace "urn:example:if";
    prefix if;

    identity iface-type;
    identity ethernet { base iface-type; }
    identity loopback { base iface-type; }

    container interfaces {
      list interface {
        key name;
        leaf name { type string; }
        leaf type { type identityref { base iface-type; } mandatory true; }
        leaf mtu {
          when "derived-from-or-self(../type, 'if:ethernet')";
          type uint16 { range "68..9000"; }
        }
        leaf enabled { type boolean; default true; }
        container stats {
          config false;
          leaf in-octets { type uint64; }
        }
      }
    }

    container routing {
      leaf default-interface {
        type leafref { path "/interfaces/interface/name"; }
      }
      leaf-list dns { type string; max-elements 3; }
    }
}"#;

fn context() -> Context {
    let mut ctx = Context::new();
    ctx.load_yang_str(INTERFACES).unwrap();
    ctx
}

fn validation_error(err: Error) -> yangkit::ValidationError {
    match err {
        Error::Validation(e) => e,
        other => panic!("expected a validation error, got {:?}", other),
    }
}

#[test]
fn test_valid_json_document() {
    let ctx = context();
    let mut tree = DataTree::from_json_str(
        &ctx,
        r#"{
          "if:interfaces": {
            "interface": [
              {"name": "eth0", "type": "if:ethernet", "mtu": 1500},
              {"name": "lo", "type": "loopback"}
            ]
          },
          "if:routing": {"default-interface": "eth0", "dns": ["10.0.0.1"]}
        }"#,
    )
    .unwrap();
    let report = validate(&ctx, &mut tree, &ValidateOptions::new()).unwrap();
    assert!(report.is_clean());

    // unprefixed identityref values are canonicalized with the module name
    let out = tree.to_json(&ctx);
    assert_eq!(
        out["if:interfaces"]["interface"][1]["type"],
        json!("if:loopback")
    );
    assert_eq!(out["if:interfaces"]["interface"][0]["mtu"], json!(1500));
}

#[test]
fn test_duplicate_list_key_names_the_list() {
    let ctx = context();
    let mut tree = DataTree::from_json_str(
        &ctx,
        r#"{"if:interfaces": {"interface": [
              {"name": "eth0", "type": "ethernet"},
              {"name": "eth0", "type": "loopback"}]}}"#,
    )
    .unwrap();
    let err = validation_error(validate(&ctx, &mut tree, &ValidateOptions::new()).unwrap_err());
    assert_eq!(err.kind, ErrorKind::ConstraintViolation);
    assert!(err.message.contains("'interface'"));
    assert_eq!(
        err.data_path.as_deref(),
        Some("/if:interfaces/interface[name='eth0']")
    );
}

#[test]
fn test_when_false_prunes_node() {
    let ctx = context();
    let mut tree = DataTree::from_json_str(
        &ctx,
        r#"{"if:interfaces": {"interface": [{"name": "lo", "type": "loopback", "mtu": 1500}]}}"#,
    )
    .unwrap();
    let before = tree.len();
    let report = validate(&ctx, &mut tree, &ValidateOptions::new()).unwrap();
    assert_eq!(
        report.pruned,
        vec!["/if:interfaces/interface[name='lo']/mtu".to_string()]
    );
    assert_eq!(tree.len(), before - 1);
}

#[test]
fn test_missing_mandatory_leaf() {
    let ctx = context();
    let text = r#"{"if:interfaces": {"interface": [{"name": "eth0"}]}}"#;

    let mut tree = DataTree::from_json_str(&ctx, text).unwrap();
    let err = validation_error(validate(&ctx, &mut tree, &ValidateOptions::new()).unwrap_err());
    assert!(err.message.contains("'type'"));

    let mut tree = DataTree::from_json_str(&ctx, text).unwrap();
    assert!(validate(&ctx, &mut tree, &ValidateOptions::edit()).is_ok());
}

#[test]
fn test_dangling_leafref() {
    let ctx = context();
    let text = r#"{"if:routing": {"default-interface": "eth9"}}"#;

    let mut tree = DataTree::from_json_str(&ctx, text).unwrap();
    let err = validation_error(validate(&ctx, &mut tree, &ValidateOptions::new()).unwrap_err());
    assert_eq!(err.app_tag.as_deref(), Some("instance-required"));

    let mut tree = DataTree::from_json_str(&ctx, text).unwrap();
    let report = validate(&ctx, &mut tree, &ValidateOptions::get()).unwrap();
    assert_eq!(report.unresolved, vec!["/if:routing/default-interface".to_string()]);
}

#[test]
fn test_state_data_rejected_in_edit() {
    let ctx = context();
    let text = r#"{"if:interfaces": {"interface": [
        {"name": "eth0", "type": "ethernet", "stats": {"in-octets": "10"}}]}}"#;

    let mut tree = DataTree::from_json_str(&ctx, text).unwrap();
    assert!(validate(&ctx, &mut tree, &ValidateOptions::edit()).is_err());

    let mut tree = DataTree::from_json_str(&ctx, text).unwrap();
    assert!(validate(&ctx, &mut tree, &ValidateOptions::new()).is_ok());
}

#[test]
fn test_invalid_identity_value() {
    let ctx = context();
    let mut tree = DataTree::from_json_str(
        &ctx,
        r#"{"if:interfaces": {"interface": [{"name": "eth0", "type": "if:iface-type-x"}]}}"#,
    )
    .unwrap();
    assert!(validate(&ctx, &mut tree, &ValidateOptions::new()).is_err());
}

#[test]
fn test_xml_document() {
    let ctx = context();
    let mut tree = DataTree::from_xml_str(
        &ctx,
        r#"<data xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">
             <interfaces xmlns="urn:example:if" xmlns:x="urn:example:if">
               <interface>
                 <name>eth0</name>
                 <type>x:ethernet</type>
                 <mtu>9000</mtu>
               </interface>
             </interfaces>
             <routing xmlns="urn:example:if">
               <default-interface>eth0</default-interface>
               <dns>10.0.0.1</dns>
               <dns>10.0.0.2</dns>
             </routing>
           </data>"#,
    )
    .unwrap();
    assert_eq!(tree.roots().len(), 2);
    let report = validate(&ctx, &mut tree, &ValidateOptions::new()).unwrap();
    assert!(report.pruned.is_empty());

    let out = tree.to_json(&ctx);
    assert_eq!(out["if:interfaces"]["interface"][0]["type"], json!("if:ethernet"));
    assert_eq!(out["if:routing"]["dns"], json!(["10.0.0.1", "10.0.0.2"]));
}

#[test]
fn test_no_siblings_limits_scope() {
    let ctx = context();
    let mut tree = DataTree::from_json_str(
        &ctx,
        r#"{"if:interfaces": {"interface": [{"name": "eth0", "type": "ethernet"}]},
            "if:routing": {"dns": ["a", "b", "c", "d"]}}"#,
    )
    .unwrap();
    let options = ValidateOptions::new().with_no_siblings();
    assert!(validate(&ctx, &mut tree, &options).is_ok());
    assert!(validate(&ctx, &mut tree, &ValidateOptions::new()).is_err());
}

#[test]
fn test_augmented_data() {
    let mut ctx = context();
    ctx.load_yang_str(
        "module ip { namespace urn:example:ip; prefix ip; import if { prefix if; }
           augment /if:interfaces/if:interface {
             leaf address { type string; }
           } }",
    )
    .unwrap();
    let mut tree = DataTree::from_json_str(
        &ctx,
        r#"{"if:interfaces": {"interface": [
              {"name": "eth0", "type": "ethernet", "ip:address": "192.0.2.1"}]}}"#,
    )
    .unwrap();
    validate(&ctx, &mut tree, &ValidateOptions::new()).unwrap();
    let out = tree.to_json(&ctx);
    assert_eq!(out["if:interfaces"]["interface"][0]["ip:address"], json!("192.0.2.1"));
}
