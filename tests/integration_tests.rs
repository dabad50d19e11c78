//! Integration tests for the polyhedral pipeline.

use polygen::prelude::*;
use polygen::{compile, utils::errors::TilingErrorKind};
use std::collections::HashMap;

fn tree(domain: &str, schedule: &str) -> ScheduleTree {
    let domain: UnionSet = domain.parse().expect("Failed to parse domain");
    let map: UnionMap = schedule.parse().expect("Failed to parse schedule");
    ScheduleTree::from_domain(domain)
        .insert_band(&map)
        .expect("Failed to insert band")
}

fn no_params() -> HashMap<String, i64> {
    HashMap::new()
}

fn context() -> Set {
    Set::universe(Space::params(Vec::new()))
}

#[test]
fn test_parametric_loop_pipeline() {
    let code = Pipeline::new("[n] -> { S[i] : 0 <= i < n }")
        .fix_param("n", 5)
        .compile()
        .expect("Failed to compile");
    assert_eq!(code, "for (i = 0; i <= 4; i += 1) {\n  S(i);\n}\n");
}

#[test]
fn test_tiled_matrix_pipeline() {
    let out = Pipeline::new("{ S[i,j] : 0 <= i,j < 100 }")
        .schedule("{ S[i,j] -> [i,j] }")
        .tile(&[32, 32])
        .run()
        .expect("Failed to run pipeline");

    let lines: Vec<&str> = out.ast_text.lines().collect();
    assert_eq!(lines[0], "for (i0 = 0; i0 <= 3; i0 += 1) {");
    assert_eq!(lines[1], "  for (j0 = 0; j0 <= 3; j0 += 1) {");
    assert_eq!(
        lines[2],
        "    for (i1 = max(0, 32*i0); i1 <= min(99, 32*i0 + 31); i1 += 1) {"
    );
    assert_eq!(
        lines[3],
        "      for (j1 = max(0, 32*j0); j1 <= min(99, 32*j0 + 31); j1 += 1) {"
    );
    assert_eq!(lines[4], "        S(i1, j1);");

    let calls = out.ast.calls(&no_params()).expect("Failed to execute");
    assert_eq!(calls.len(), 10000);
    assert!(calls.iter().all(|(name, _)| name == "S"));
}

#[test]
fn test_tiling_without_band() {
    let result = compile("{ S[i] : 0 <= i < 10 }", Some(&[4]));
    assert!(matches!(result, Err(PolyError::NoBandFound(_))));
}

#[test]
fn test_tiling_preserves_instances() {
    let t = tree("{ S[i, j] : 0 <= i, j < 8 }", "{ S[i, j] -> [i, j] }");
    let band = t.first_band().unwrap();
    let tiled = tile_band(&t, &band, &[3, 3]).expect("Failed to tile");

    let mut executed = build_ast(&tiled, &context())
        .unwrap()
        .calls(&no_params())
        .unwrap();
    let mut expected = t.domain().points(&[]).unwrap();
    executed.sort();
    expected.sort();
    assert_eq!(executed, expected);
}

#[test]
fn test_invalid_split_and_tiled_order() {
    let t = tree("{ S[i] : 0 <= i < 6 }", "{ S[i] -> [i] }");
    let band = t.first_band().unwrap();
    let split = split_band(&t, &band, 0);
    assert!(matches!(
        split,
        Err(PolyError::Tiling(ref e)) if e.kind == TilingErrorKind::InvalidSplit
    ));

    let tiled = tile_band(&t, &band, &[4]).unwrap();
    let order: Vec<i64> = build_ast(&tiled, &context())
        .unwrap()
        .calls(&no_params())
        .unwrap()
        .into_iter()
        .map(|(_, args)| args[0])
        .collect();
    assert_eq!(order, vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn test_failed_tiling_leaves_tree_intact() {
    let t = tree("{ S[i, j] : 0 <= i, j < 4 }", "{ S[i, j] -> [i, j] }");
    let before = print_schedule(&t);
    let band = t.first_band().unwrap();

    let result = tile_band(&t, &band, &[2]);
    assert!(matches!(
        result,
        Err(PolyError::Tiling(ref e)) if e.kind == TilingErrorKind::SizeCountMismatch
    ));
    let result = tile_band(&t, &band, &[2, 0]);
    assert!(matches!(
        result,
        Err(PolyError::Tiling(ref e)) if e.kind == TilingErrorKind::NonPositiveSize
    ));

    assert_eq!(print_schedule(&t), before);
    assert_eq!(t.first_band().unwrap().band().unwrap().n_member(), 2);
}

#[test]
fn test_printing_is_stable() {
    let t = tree("{ S[i] : 0 <= i < 10 }", "{ S[i] -> [i] }");
    let band = t.first_band().unwrap();
    let tiled = tile_band(&t, &band, &[4]).unwrap();
    assert_eq!(print_schedule(&tiled), print_schedule(&tiled.clone()));

    let ast = build_ast(&tiled, &context()).unwrap();
    assert_eq!(print_ast(&ast), print_ast(&ast));
}

#[test]
fn test_domain_text_round_trip() {
    let domain: UnionSet = "[n] -> { S[i, j] : 0 <= i < n and 0 <= j <= i; T[k] : 0 <= k < 4 }"
        .parse()
        .unwrap();
    let reparsed: UnionSet = domain.to_string().parse().unwrap();
    assert_eq!(reparsed.to_string(), domain.to_string());
    assert_eq!(reparsed.points(&[3]).unwrap(), domain.points(&[3]).unwrap());

    let json = serde_json::to_string(&domain).unwrap();
    let restored: UnionSet = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, domain);
}

#[test]
fn test_leaves_cover_domain() {
    let t = tree(
        "{ S[i] : 0 <= i < 4; T[i] : 0 <= i < 2 }",
        "{ S[i] -> [i]; T[i] -> [i] }",
    );
    let band = t.first_band().unwrap();
    let fissioned = t
        .insert_sequence(&band, &[vec!["S".to_string()], vec!["T".to_string()]])
        .expect("Failed to insert sequence");

    let leaves = fissioned.leaf_domains();
    assert_eq!(leaves.len(), 2);
    let mut covered = Vec::new();
    for leaf in &leaves {
        covered.extend(leaf.points(&[]).unwrap());
    }
    covered.sort();
    let mut expected = t.domain().points(&[]).unwrap();
    expected.sort();
    assert_eq!(covered, expected);
}

#[test]
fn test_fission_emits_two_loop_nests() {
    let t = tree(
        "{ S[i] : 0 <= i < 4; T[i] : 0 <= i < 2 }",
        "{ S[i] -> [i]; T[i] -> [i] }",
    );
    let band = t.first_band().unwrap();
    let fissioned = t
        .insert_sequence(&band, &[vec!["T".to_string()], vec!["S".to_string()]])
        .unwrap();
    let ast = build_ast(&fissioned, &context()).unwrap();

    let text = print_ast(&ast);
    assert_eq!(text.matches("for (").count(), 2);
    assert!(!text.contains("if ("));

    let names: Vec<String> = ast
        .calls(&no_params())
        .unwrap()
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(names, vec!["T", "T", "S", "S", "S", "S"]);
}

#[test]
fn test_strided_schedule() {
    let code = Pipeline::new("{ S[i] : 0 <= i < 10 }")
        .schedule("{ S[i] -> [2*i] }")
        .compile()
        .unwrap();
    assert!(code.contains("for (i0 = 0; i0 <= 18; i0 += 2) {"));
    assert!(code.contains("S(i0 / 2);"));
    assert!(!code.contains("if ("));
}

#[test]
fn test_split_then_tile_outer_band() {
    let out = Pipeline::new("{ S[i, j] : 0 <= i < 3 and 0 <= j < 10 }")
        .schedule("{ S[i, j] -> [i, j] }")
        .split(1)
        .tile(&[5])
        .run()
        .unwrap();
    assert_eq!(out.applied_transforms, vec!["split", "tiling"]);

    let calls = out.ast.calls(&no_params()).unwrap();
    assert_eq!(calls.len(), 30);
    assert_eq!(calls[0].1, vec![0, 0]);
    assert_eq!(calls[10].1, vec![1, 0]);
}

#[test]
fn test_coincident_members_are_reported() {
    let t = tree("{ S[i, j] : 0 <= i, j < 4 }", "{ S[i, j] -> [i, j] }");
    let band = t.first_band().unwrap();
    let t = t.set_coincident(&band, 1, true).unwrap();
    let candidates = t.vectorization_candidates();
    assert_eq!(candidates.get("S"), Some(&vec![(0, 1)]));

    let band = t.first_band().unwrap();
    let tiled = tile_band(&t, &band, &[2, 2]).unwrap();
    let candidates = tiled.vectorization_candidates();
    assert_eq!(candidates.get("S"), Some(&vec![(0, 1), (1, 1)]));
}

#[test]
fn test_set_queries() {
    let s: Set = "{ S[i, j] : 0 <= i <= 4 and 2 <= j <= 3 and i + j >= 5 }"
        .parse()
        .unwrap();
    assert!(!s.is_empty().unwrap());
    assert_eq!(s.lexmin(&[]).unwrap(), Some(vec![2, 3]));

    let empty: Set = "{ S[i] : 2*i = 1 and 0 <= i <= 4 }".parse().unwrap();
    assert!(empty.is_empty().unwrap());

    let diagonal: Set = "[n] -> { S[i, j] : 0 <= i < n and j = i + 1 }".parse().unwrap();
    let projected = diagonal.project_out("i").unwrap();
    let pts = projected.points(&[3]).unwrap();
    assert_eq!(pts, vec![vec![1], vec![2], vec![3]]);
}

#[test]
fn test_parameter_errors() {
    let result = Pipeline::new("[n] -> { S[i] : 0 <= i < n }")
        .fix_param("m", 2)
        .compile();
    assert!(matches!(result, Err(PolyError::SchemaMismatch(_))));

    let result = compile("[n] -> { S[i] : 0 <= i < n and 2 m }", None);
    assert!(matches!(result, Err(PolyError::Parse(_))));
}

#[test]
fn test_parametric_code_runs_for_several_sizes() {
    let out = Pipeline::new("[n] -> { S[i, j] : 0 <= i < n and 0 <= j <= i }")
        .schedule("{ S[i, j] -> [i, j] }")
        .tile(&[2, 2])
        .run()
        .unwrap();
    for n in [0_i64, 1, 5, 9] {
        let params: HashMap<String, i64> = [("n".to_string(), n)].into_iter().collect();
        let mut executed = out.ast.calls(&params).unwrap();
        let mut expected = out.original.domain().points(&[n]).unwrap();
        executed.sort();
        expected.sort();
        assert_eq!(executed, expected, "n = {}", n);
    }
}

#[test]
fn test_parameter_only_constraints_are_kept() {
    let out = Pipeline::new("[n] -> { S[i] : 0 <= i < 10 and n >= 5 }")
        .schedule("{ S[i] -> [i] }")
        .run()
        .unwrap();
    assert!(out.ast_text.contains("if (n >= 5) {"));
    for n in [0_i64, 4, 5, 12] {
        let params: HashMap<String, i64> = [("n".to_string(), n)].into_iter().collect();
        let mut executed = out.ast.calls(&params).unwrap();
        let mut expected = out.original.domain().points(&[n]).unwrap();
        executed.sort();
        expected.sort();
        assert_eq!(executed, expected, "n = {}", n);
    }

    let assumed = Pipeline::new("[n] -> { S[i] : 0 <= i < 10 and n >= 5 }")
        .param_context("[n] -> { : n >= 5 }")
        .compile()
        .unwrap();
    assert_eq!(assumed, "for (i = 0; i <= 9; i += 1) {\n  S(i);\n}\n");
}

#[test]
fn test_parameter_equality_in_domain_is_guarded() {
    let out = Pipeline::new("[n] -> { S[i] : 0 <= i < n and n = 3 }").run().unwrap();
    for n in [0_i64, 3, 4] {
        let params: HashMap<String, i64> = [("n".to_string(), n)].into_iter().collect();
        let calls = out.ast.calls(&params).unwrap();
        assert_eq!(calls.len(), if n == 3 { 3 } else { 0 }, "n = {}", n);
    }
}

#[test]
fn test_queries_on_sets_empty_after_elimination() {
    let s: Set = "{ S[i, j] : 0 <= i <= 3 and j = 5 and j <= 2 }".parse().unwrap();
    assert!(s.is_empty().unwrap());
    assert_eq!(s.lexmin(&[]).unwrap(), None);
    assert!(s.points(&[]).unwrap().is_empty());

    let domain: UnionSet = "{ S[i, j] : 0 <= i <= 3 and j = 5 and j <= 2; T[k] : 0 <= k < 2 }"
        .parse()
        .unwrap();
    assert_eq!(domain.points(&[]).unwrap().len(), 2);
}
