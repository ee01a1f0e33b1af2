// Property-based tests for compiler invariants.
//
// Three categories:
// 1. Type → C lowering: width selection and dimension reversal
// 2. LValue forms: rvalue/assignment shapes for arbitrary index lists
// 3. Loop unrolling: iteration counts and label substitution
//
// Uses proptest with explicit configuration to keep runs fast and stable.

use proptest::prelude::*;
use std::collections::HashMap;

use com2c::ast::{LValue, Type};
use com2c::provider::ArduinoProvider;

fn unrolled_labels(source: &str) -> Vec<String> {
    let parsed = com2c::parser::parse(source);
    assert!(parsed.errors.is_empty(), "parse errors: {:?}", parsed.errors);
    let preprocessed = com2c::preprocess::preprocess(parsed.tree.unwrap());
    assert!(
        preprocessed.diagnostics.is_empty(),
        "preprocess errors: {:?}",
        preprocessed.diagnostics
    );
    let result = com2c::transform::transform(&preprocessed.tree, &HashMap::new());
    assert!(
        result.diagnostics.is_empty(),
        "transform errors: {:?}",
        result.diagnostics
    );
    result.ast.left[0]
        .states
        .iter()
        .map(|s| s.label.clone())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // The packed width is the smallest of {8,16,32,64} covering the first
    // dimension; remaining dimensions appear reversed.
    #[test]
    fn bit_type_width_and_dims(first in 1u32..=64, rest in prop::collection::vec(1u32..=16, 0..3)) {
        let mut dims = vec![first];
        dims.extend(rest.iter().copied());
        let ty = Type::from_parts("bit", dims).unwrap();
        let decl = ty.codegen(&ArduinoProvider, "x");

        let expected_width = [8u32, 16, 32, 64]
            .iter()
            .copied()
            .find(|w| first <= *w)
            .unwrap();
        let expected_prefix = format!("uint{}_t x", expected_width);
        prop_assert!(decl.starts_with(&expected_prefix));

        let expected_dims: String = rest.iter().rev().map(|d| format!("[{d}]")).collect();
        prop_assert_eq!(decl, format!("uint{expected_width}_t x{expected_dims}"));
    }

    // `byte` is sugar for `bit` with a leading dimension of 8.
    #[test]
    fn byte_normalization(rest in prop::collection::vec(1u32..=16, 0..3)) {
        let byte_ty = Type::from_parts("byte", rest.clone()).unwrap();
        let mut bit_dims = vec![8u32];
        bit_dims.extend(rest);
        let bit_ty = Type::from_parts("bit", bit_dims).unwrap();
        prop_assert_eq!(byte_ty, bit_ty);
    }

    // Widths above 64 are rejected no matter the trailing dimensions.
    #[test]
    fn oversized_bit_width_rejected(first in 65u32..=1000, rest in prop::collection::vec(1u32..=16, 0..3)) {
        let mut dims = vec![first];
        dims.extend(rest);
        prop_assert!(Type::from_parts("bit", dims).is_err());
    }

    // Rvalue extraction and assignment target the same bit.
    #[test]
    fn lvalue_round_trip(
        base in "[a-z][a-z0-9_]{0,8}",
        indices in prop::collection::vec(0u32..=63, 1..4),
    ) {
        let index_text: Vec<String> = indices.iter().map(|i| i.to_string()).collect();
        let lv = LValue::new(base.clone(), index_text.clone());

        let mut subscripted = base.clone();
        for idx in &index_text[..index_text.len() - 1] {
            subscripted.push_str(&format!("[{idx}]"));
        }
        let last = index_text.last().unwrap();

        prop_assert_eq!(lv.rvalue(), format!("(({subscripted} >> ({last})) & 1)"));
        prop_assert_eq!(
            lv.codegen_assign("v", false),
            format!("{subscripted} &= ~(1UL << {last});\n{subscripted} |= (!!(v)) << {last};\n")
        );
        prop_assert_eq!(
            lv.codegen_assign("v", true),
            format!("*{subscripted} &= ~(1UL << {last});\n*{subscripted} |= (!!(v)) << {last};\n")
        );
    }

    // An inclusive-bounds loop yields stop - start + 1 states (zero when
    // the range is empty), with the counter substituted into each label.
    #[test]
    fn loop_unrolling_counts(start in 0i64..=6, stop in 0i64..=6) {
        let source = format!(
            "left_functions {{ func f() {{ for i in {start}..{stop} {{ state l_i {{ }} }} }} }}"
        );
        let labels = unrolled_labels(&source);
        let expected: Vec<String> = (start..=stop).map(|k| format!("l_{k}")).collect();
        prop_assert_eq!(labels, expected);
    }
}
