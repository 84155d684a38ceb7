//! Schema compilation integration tests
//!
//! These tests load small YANG modules end to end and check the compiled
//! tree, the error taxonomy and the context state after failures.

use std::io::Write;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use yangkit::schema::{BuiltinKind, NodeKind, TypeInfo};
use yangkit::{Context, ErrorKind, NodeId};

const PERCENT: &str = "module a { namespace urn:a; prefix a;
    typedef percent { type int8 { range \"1..100\"; } }
    leaf x { type percent; } }";

fn base_context() -> Context {
    let mut ctx = Context::new();
    ctx.add_source_str(PERCENT).unwrap();
    ctx
}

fn child_names(ctx: &Context, id: NodeId) -> Vec<String> {
    ctx.children(id).map(|c| ctx.node(c).name.clone()).collect()
}

// ============================================================================
// Types
// ============================================================================

#[test]
fn test_range_narrowing_across_modules() {
    let mut ctx = base_context();
    ctx.load_yang_str(
        "module b { namespace urn:b; prefix b; import a { prefix a; }
           leaf y { type a:percent { range \"1..10\"; } } }",
    )
    .unwrap();
    let y = ctx.find_path("/b:y").unwrap();
    let ty = ctx.node(y).leaf_type().unwrap();
    assert_eq!(ty.base, BuiltinKind::Int8);
    let TypeInfo::Int { range: Some(range) } = &ty.info else {
        panic!("expected an integer range");
    };
    assert!(range.contains(10));
    assert!(!range.contains(11));
}

#[test]
fn test_range_widening_is_rejected() {
    let mut ctx = base_context();
    let err = ctx
        .load_yang_str(
            "module b { namespace urn:b; prefix b; import a { prefix a; }
               leaf y { type a:percent { range \"1..200\"; } } }",
        )
        .unwrap_err();
    assert_eq!(err.schema_kind(), Some(ErrorKind::ConstraintViolation));
    assert!(ctx.module_by_name("b").is_none());
}

#[test]
fn test_pattern_objects_are_shared() {
    let mut ctx = Context::new();
    ctx.load_yang_str(
        "module p { namespace urn:p; prefix p;
           typedef word { type string { pattern '[a-z]+'; } }
           leaf one { type word; }
           leaf two { type word; }
           leaf short { type word { length 1..4; } } }",
    )
    .unwrap();
    let one = ctx.find_path("/p:one").unwrap();
    let two = ctx.find_path("/p:two").unwrap();
    let short = ctx.find_path("/p:short").unwrap();

    let t1 = ctx.node(one).leaf_type().unwrap();
    let t2 = ctx.node(two).leaf_type().unwrap();
    assert!(Arc::ptr_eq(t1, t2));

    let (TypeInfo::String { patterns: base, .. }, TypeInfo::String { patterns: derived, .. }) =
        (&t1.info, &ctx.node(short).leaf_type().unwrap().info)
    else {
        panic!("expected string types");
    };
    assert_eq!(derived.len(), 1);
    assert!(Arc::ptr_eq(&base[0], &derived[0]));
    assert!(Arc::strong_count(&base[0]) >= 2);
}

// ============================================================================
// Identities and features
// ============================================================================

#[test]
fn test_identity_self_base() {
    let mut ctx = Context::new();
    let err = ctx
        .load_yang_str("module i { namespace urn:i; prefix i; identity i1 { base i1; } }")
        .unwrap_err();
    assert_eq!(err.schema_kind(), Some(ErrorKind::CircularReference));
    assert!(err.schema_errors()[0].message.contains("i1"));
}

#[test]
fn test_identity_derivation_across_modules() {
    let mut ctx = Context::new();
    ctx.add_source_str("module base { namespace urn:base; prefix b; identity transport; }")
        .unwrap();
    ctx.load_yang_str(
        "module tcp { namespace urn:tcp; prefix t; import base { prefix b; }
           identity tcp { base b:transport; } }",
    )
    .unwrap();
    let transport = ctx.find_identity("base", "transport").unwrap();
    let tcp = ctx.find_identity("tcp", "tcp").unwrap();
    assert!(ctx.is_derived_from(tcp, transport));
    assert!(!ctx.is_derived_from(transport, tcp));
}

#[test]
fn test_feature_reevaluation() {
    let mut ctx = Context::new();
    let m = ctx
        .load_yang_str(
            "module f { yang-version 1.1; namespace urn:f; prefix f;
               feature base;
               feature extra { if-feature base; }
               container c { leaf x { if-feature \"base and extra\"; type string; } } }",
        )
        .unwrap();
    let x = ctx.find_path("/f:c/f:x").unwrap();

    assert!(ctx.enable_feature(m, "extra").is_err());
    ctx.enable_feature(m, "base").unwrap();
    ctx.enable_feature(m, "extra").unwrap();
    assert!(ctx.node_enabled(x));

    ctx.disable_feature(m, "base").unwrap();
    assert!(!ctx.feature_value(m, "extra").unwrap());
    assert!(!ctx.node_enabled(x));

    ctx.enable_feature(m, "*").unwrap();
    assert!(ctx.feature_value(m, "extra").unwrap());
    assert!(ctx.node_enabled(x));
}

#[test]
fn test_imported_features_are_frozen() {
    let mut ctx = Context::new();
    ctx.add_source_str("module lib { namespace urn:lib; prefix l; feature f; }")
        .unwrap();
    ctx.load_yang_str("module app { namespace urn:app; prefix a; import lib { prefix l; } }")
        .unwrap();
    let lib = ctx.module_by_name("lib").unwrap();
    assert!(!ctx.module(lib).implemented);
    assert!(matches!(ctx.enable_feature(lib, "f"), Err(yangkit::Error::Denied(_))));
}

// ============================================================================
// Groupings, augments, deviations
// ============================================================================

#[test]
fn test_grouping_instantiation() {
    let mut ctx = Context::new();
    ctx.load_yang_str(
        "module g { namespace urn:g; prefix g;
           grouping g { leaf a { type string; } }
           container c { uses g; } }",
    )
    .unwrap();
    let c = ctx.find_path("/g:c").unwrap();
    assert_eq!(child_names(&ctx, c), vec!["a".to_string()]);
    let a = ctx.find_path("/g:c/g:a").unwrap();
    assert_eq!(ctx.node(a).leaf_type().unwrap().base, BuiltinKind::String);
}

#[test]
fn test_uses_expansion_is_structurally_idempotent() {
    let mut ctx = Context::new();
    ctx.load_yang_str(
        "module g { namespace urn:g; prefix g;
           grouping endpoint {
             leaf host { type string; }
             container port { leaf number { type uint16; default 80; } }
           }
           container src { uses endpoint; }
           container dst { uses endpoint; } }",
    )
    .unwrap();
    let src_host = ctx.find_path("/g:src/g:host").unwrap();
    let dst_host = ctx.find_path("/g:dst/g:host").unwrap();
    assert_ne!(src_host, dst_host);

    let src = ctx.find_path("/g:src").unwrap();
    let dst = ctx.find_path("/g:dst").unwrap();
    assert_eq!(child_names(&ctx, src), child_names(&ctx, dst));

    let src_number = ctx.find_path("/g:src/g:port/g:number").unwrap();
    let dst_number = ctx.find_path("/g:dst/g:port/g:number").unwrap();
    assert_eq!(ctx.effective_defaults(src_number), ctx.effective_defaults(dst_number));
    assert_eq!(ctx.effective_defaults(src_number), vec!["80".to_string()]);
}

#[test]
fn test_cross_module_augment() {
    let mut ctx = Context::new();
    ctx.add_source_str(
        "module base { namespace urn:base; prefix b; container system { leaf name { type string; } } }",
    )
    .unwrap();
    ctx.load_yang_str(
        "module ext { namespace urn:ext; prefix e; import base { prefix b; }
           augment /b:system { leaf location { type string; } } }",
    )
    .unwrap();
    let location = ctx.find_path("/base:system/ext:location").unwrap();
    let system = ctx.find_path("/base:system").unwrap();
    assert_eq!(ctx.node(location).parent, Some(system));
    assert!(ctx.node(location).augment.is_some());
    assert!(ctx.module(ctx.module_by_name("base").unwrap()).implemented);
}

#[test]
fn test_deviation_add_then_delete_restores_node() {
    let mut ctx = Context::new();
    ctx.load_yang_str(PERCENT).unwrap();
    let x = ctx.find_path("/a:x").unwrap();
    let before = ctx.node(x).kind.clone();

    ctx.load_yang_str(
        "module d { namespace urn:d; prefix d; import a { prefix a; }
           deviation /a:x {
             deviate add { default 5; must \". != 7\"; }
             deviate delete { default 5; must \". != 7\"; }
           } }",
    )
    .unwrap();
    assert_eq!(ctx.node(x).kind, before);
    assert!(ctx.node(x).musts.is_empty());
}

// ============================================================================
// Tree consistency and transactions
// ============================================================================

#[test]
fn test_parent_child_consistency() {
    let mut ctx = Context::new();
    let m = ctx
        .load_yang_str(
            "module t { yang-version 1.1; namespace urn:t; prefix t;
               grouping addr { leaf ip { type string; } }
               container c {
                 list l { key k; leaf k { type string; } uses addr; }
                 choice ch { leaf a { type string; } case b { leaf b { type string; } } }
               }
               rpc reset { input { leaf delay { type uint32; } } output { leaf ok { type boolean; } } }
               notification alarm { leaf text { type string; } } }",
        )
        .unwrap();
    let mut stack: Vec<NodeId> = ctx.top_level(m).collect();
    let mut seen = 0;
    while let Some(id) = stack.pop() {
        seen += 1;
        for child in ctx.children(id) {
            assert_eq!(ctx.node(child).parent, Some(id), "parent of {}", ctx.node(child).name);
            stack.push(child);
        }
    }
    assert!(seen >= 14);
    let l = ctx.find_path("/t:c/t:l").unwrap();
    assert!(matches!(ctx.node(l).kind, NodeKind::List(_)));
}

#[test]
fn test_failed_compile_rolls_back() {
    let mut ctx = base_context();
    ctx.load_yang_str("module ok { namespace urn:ok; prefix ok; leaf v { type string; } }")
        .unwrap();
    let modules = ctx.modules().count();
    let nodes = ctx.node_count();

    let err = ctx
        .load_yang_str(
            "module bad { namespace urn:bad; prefix bad; import a { prefix a; }
               augment /a:x { leaf y { type string; } } }",
        )
        .unwrap_err();
    assert_eq!(err.schema_kind(), Some(ErrorKind::IncompatibleTarget));
    assert_eq!(ctx.modules().count(), modules);
    assert_eq!(ctx.node_count(), nodes);
    assert!(ctx.module_by_name("a").is_none());
    assert!(ctx.find_path("/ok:v").is_ok());
}

#[test]
fn test_leafref_config_mismatch() {
    let mut ctx = Context::new();
    let err = ctx
        .load_yang_str(
            "module r { namespace urn:r; prefix r;
               leaf r { type leafref { path \"/t\"; } }
               leaf t { type string; config false; } }",
        )
        .unwrap_err();
    assert_eq!(err.schema_kind(), Some(ErrorKind::ConstraintViolation));
}

#[test]
fn test_load_file_and_yin() {
    let dir = tempfile::tempdir().unwrap();
    let yang = dir.path().join("files.yang");
    let mut file = std::fs::File::create(&yang).unwrap();
    writeln!(file, "module files {{ namespace urn:files; prefix f; leaf name {{ type string; }} }}").unwrap();

    let yin = dir.path().join("yfiles.yin");
    std::fs::write(
        &yin,
        r#"<module name="yfiles" xmlns="urn:ietf:params:xml:ns:yang:yin:1">
             <namespace uri="urn:yfiles"/>
             <prefix value="y"/>
             <leaf name="size"><type name="uint32"/></leaf>
           </module>"#,
    )
    .unwrap();

    let mut ctx = Context::new();
    let files = ctx.load_file(&yang).unwrap().unwrap();
    let yfiles = ctx.load_file(&yin).unwrap().unwrap();
    assert_eq!(ctx.module(files).name, "files");
    let size = ctx.find_path("/yfiles:size").unwrap();
    assert_eq!(ctx.node(size).module, yfiles);
    assert_eq!(ctx.node(size).leaf_type().unwrap().base, BuiltinKind::Uint32);
}

#[test]
fn test_print_tree_shows_augments() {
    let mut ctx = Context::new();
    ctx.add_source_str("module base { namespace urn:base; prefix b; container system; }")
        .unwrap();
    let ext = ctx
        .load_yang_str(
            "module ext { namespace urn:ext; prefix e; import base { prefix b; }
               augment /b:system { leaf location { type string; } } }",
        )
        .unwrap();
    let tree = ctx.print_tree(ext);
    assert!(tree.contains("augment /b:system:"));
    assert!(tree.contains("+--rw e:location?   string") || tree.contains("+--rw location?   string"));
}
