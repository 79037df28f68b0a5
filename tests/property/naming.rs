//! Artifact names identify their run, even with underscores in target ids.

use pblsflow::artifact::{ArtifactId, ArtifactKind, ArtifactPattern, StageId};
use pblsflow::types::{ChunkId, TargetId};
use proptest::prelude::*;

fn target_id() -> impl Strategy<Value = TargetId> {
    "[A-Za-z][A-Za-z0-9]{0,10}(_[A-Za-z0-9]{1,6}){0,2}".prop_map(|s| TargetId::new(s).unwrap())
}

proptest! {
    #[test]
    fn test_chunk_names_parse_back(
        target in target_id(),
        (chunk, total) in (1u32..500).prop_flat_map(|n| (0..n, Just(n))),
        iteration in 0u32..10,
    ) {
        let id = ArtifactId::ChunkOutput(ChunkId::new(target.clone(), iteration, chunk, total).unwrap());
        prop_assert_eq!(ArtifactId::parse(&id.name()).unwrap(), id.clone());

        let log = ArtifactId::ChunkLog(ChunkId::new(target, iteration, chunk, total).unwrap());
        prop_assert_eq!(ArtifactId::parse(&log.name()).unwrap(), log);
    }

    #[test]
    fn test_pattern_never_matches_another_target(
        a in target_id(),
        b in target_id(),
        sequence in 0u32..1000,
    ) {
        prop_assume!(a != b);
        let id = ArtifactId::Recovery { stage: StageId::new(a, 0, 4), sequence };
        let pattern = ArtifactPattern::kind(ArtifactKind::Recovery).target(&b);
        prop_assert!(!pattern.matches(&ArtifactId::parse(&id.name()).unwrap()));
    }
}
