//! Property tests for restriction narrowing and feature re-evaluation

use proptest::prelude::*;
use yangkit::schema::range::{compile_restriction, BoundKind};
use yangkit::schema::types::Restriction;
use yangkit::Context;

/// Build ascending, disjoint parts from (gap, length) steps
fn build_parts(start: i64, steps: &[(i64, i64)]) -> Vec<(i64, i64)> {
    let mut cursor = start;
    let mut parts = Vec::with_capacity(steps.len());
    for &(gap, len) in steps {
        let min = cursor + gap;
        let max = min + len;
        parts.push((min, max));
        cursor = max + 1;
    }
    parts
}

fn render(parts: &[(i64, i64)]) -> String {
    parts
        .iter()
        .map(|(min, max)| {
            if min == max {
                min.to_string()
            } else {
                format!("{}..{}", min, max)
            }
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

fn domain() -> Restriction {
    Restriction::domain((-100_000, 100_000))
}

proptest! {
    #[test]
    fn test_accepted_restrictions_narrow_the_base(
        base_start in -500i64..500,
        base_steps in prop::collection::vec((0i64..40, 0i64..40), 1..5),
        derived_start in -600i64..600,
        derived_steps in prop::collection::vec((0i64..40, 0i64..40), 1..5),
    ) {
        let base_parts = build_parts(base_start, &base_steps);
        let base = compile_restriction(&render(&base_parts), BoundKind::Integer, &domain()).unwrap();

        let derived_parts = build_parts(derived_start, &derived_steps);
        if let Ok(derived) = compile_restriction(&render(&derived_parts), BoundKind::Integer, &base) {
            for &(min, max) in &derived_parts {
                for v in min..=max {
                    prop_assert!(derived.contains(i128::from(v)));
                    prop_assert!(base.contains(i128::from(v)));
                }
            }
        }
    }

    #[test]
    fn test_sub_ranges_are_accepted(
        base_start in -500i64..500,
        base_steps in prop::collection::vec((0i64..40, 0i64..40), 1..5),
        shrink in 0i64..20,
    ) {
        let base_parts = build_parts(base_start, &base_steps);
        let base = compile_restriction(&render(&base_parts), BoundKind::Integer, &domain()).unwrap();

        let narrowed: Vec<(i64, i64)> = base_parts
            .iter()
            .map(|&(min, max)| (min, (min + shrink).min(max)))
            .collect();
        let derived = compile_restriction(&render(&narrowed), BoundKind::Integer, &base);
        prop_assert!(derived.is_ok());
        prop_assert!(base.covers(&derived.unwrap()));
    }

    #[test]
    fn test_feature_values_follow_dependencies(ops in prop::collection::vec((0usize..3, any::<bool>()), 1..24)) {
        let mut ctx = Context::new();
        let m = ctx
            .load_yang_str(
                "module f { yang-version 1.1; namespace urn:f; prefix f;
                   feature a; feature b;
                   feature c { if-feature \"a and b\"; }
                   leaf x { if-feature \"a or c\"; type string; } }",
            )
            .unwrap();
        let x = ctx.find_path("/f:x").unwrap();
        let names = ["a", "b", "c"];
        let mut flags = [false; 3];

        for (which, enable) in ops {
            let name = names[which];
            if enable {
                let allowed = which != 2 || (flags[0] && flags[1]);
                let result = ctx.enable_feature(m, name);
                prop_assert_eq!(result.is_ok(), allowed);
                if allowed {
                    flags[which] = true;
                }
            } else {
                ctx.disable_feature(m, name).unwrap();
                flags[which] = false;
            }

            let c_value = flags[2] && flags[0] && flags[1];
            prop_assert_eq!(ctx.feature_value(m, "a").unwrap(), flags[0]);
            prop_assert_eq!(ctx.feature_value(m, "c").unwrap(), c_value);
            prop_assert_eq!(ctx.node_enabled(x), flags[0] || c_value);
        }
    }
}
