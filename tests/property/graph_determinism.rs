//! Graph generation is a pure function of its inputs.

use pblsflow::graph::{generate, NodeKind, SubmitFiles};
use pblsflow::types::TargetId;
use proptest::prelude::*;

fn target_id() -> impl Strategy<Value = TargetId> {
    "[A-Za-z][A-Za-z0-9]{0,10}(_[A-Za-z0-9]{1,6})?".prop_map(|s| TargetId::new(s).unwrap())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_same_inputs_same_graph(
        target in target_id(),
        total in 1u32..40,
        snr in 1.0f64..20.0,
        max in 1u32..5,
    ) {
        let a = generate(&target, total, snr, max).unwrap();
        let b = generate(&target, total, snr, max).unwrap();
        prop_assert_eq!(a.fingerprint(), b.fingerprint());
        let files = SubmitFiles::default();
        prop_assert_eq!(a.render(&files), b.render(&files));
    }

    #[test]
    fn test_every_iteration_has_n_searches_and_three_stage_nodes(
        target in target_id(),
        total in 1u32..40,
        max in 1u32..5,
    ) {
        let graph = generate(&target, total, 7.0, max).unwrap();
        prop_assert_eq!(graph.nodes.len() as u32, max * (total + 3));

        for iteration in 0..max {
            let stage = graph.stage(iteration).unwrap();
            prop_assert_eq!(stage.search_nodes().count() as u32, total);
            prop_assert_eq!(
                stage.nodes.iter().filter(|n| n.kind == NodeKind::Mask).count(),
                1
            );
            // A stage is submitted alone: no edge may reach outside it.
            for search in stage.search_nodes() {
                prop_assert!(stage.parents_of(search).is_empty());
            }
        }
        prop_assert!(graph.stage(max).is_err());
    }

    #[test]
    fn test_later_searches_wait_for_previous_mask(
        target in target_id(),
        total in 1u32..20,
        max in 2u32..5,
    ) {
        let graph = generate(&target, total, 7.0, max).unwrap();
        for search in graph.search_nodes().filter(|n| n.iteration > 0) {
            let parents = graph.parents_of(search);
            prop_assert_eq!(parents.len(), 1);
            prop_assert_eq!(parents[0].kind, NodeKind::Mask);
            prop_assert_eq!(parents[0].iteration, search.iteration - 1);
        }
    }
}

#[test]
fn test_different_chunk_counts_fingerprint_differently() {
    let target = TargetId::new("kplr006184894").unwrap();
    let a = generate(&target, 16, 7.0, 3).unwrap();
    let b = generate(&target, 17, 7.0, 3).unwrap();
    assert_ne!(a.fingerprint(), b.fingerprint());
}
