// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! End-to-end hash-join probe tests: build sink feeds the shared artifact,
//! then a probe operator streams chunks through push/pull.

mod common;

use common::*;

use std::sync::Arc;

use basalt::ExecError;
use basalt::exec::node::join::JoinType;
use basalt::exec::operators::hashjoin::{HashJoinProbeFactory, JoinSharedState};
use basalt::exec::pipeline::dependency::DependencyManager;
use basalt::exec::pipeline::distribution::ExchangeKind;
use basalt::exec::pipeline::operator::{Operator, ProcessorOperator};
use basalt::exec::pipeline::operator_factory::OperatorFactory;
use basalt::runtime::runtime_state::RuntimeState;

fn build_basic() -> Vec<basalt::exec::chunk::Chunk> {
    // Keys 1 and 2; key 1 fans out to two rows.
    vec![chunk_of(
        &build_schema(),
        vec![Some(1), Some(1), Some(2), Some(3)],
        vec![Some(10), Some(20), Some(30), Some(40)],
    )]
}

#[test]
fn inner_join_emits_one_row_per_matching_pair() {
    let fixture = JoinFixture::new();
    let node = fixture.node(JoinType::Inner);
    let probe = vec![chunk_of(
        &probe_schema(),
        vec![Some(1), Some(2), Some(4)],
        vec![Some(100), Some(200), Some(400)],
    )];
    let run = run_join(&fixture, &node, build_basic(), probe, 4096);

    // Probe key 1 matches two build rows, key 2 one, key 4 none.
    assert_eq!(run.total_rows(), 3);
    assert_eq!(
        run.column_i64(PROBE_KEY),
        vec![Some(1), Some(1), Some(2)]
    );
    // Fan-out rows are contiguous and in build-table insertion order.
    assert_eq!(
        run.column_i64(BUILD_VALUE),
        vec![Some(10), Some(20), Some(30)]
    );
}

#[test]
fn inner_join_applies_other_conjuncts() {
    let mut fixture = JoinFixture::new();
    let conjunct = fixture.build_value_gt(15);
    let mut node = fixture.node(JoinType::Inner);
    node.other_conjuncts = vec![conjunct];
    let probe = vec![chunk_of(
        &probe_schema(),
        vec![Some(1), Some(2)],
        vec![Some(100), Some(200)],
    )];
    let run = run_join(&fixture, &node, build_basic(), probe, 4096);

    // bv > 15 keeps (1, bv=20) and (2, bv=30); drops (1, bv=10).
    assert_eq!(run.column_i64(BUILD_VALUE), vec![Some(20), Some(30)]);
}

#[test]
fn left_outer_preserves_every_probe_row() {
    let fixture = JoinFixture::new();
    let node = fixture.node(JoinType::LeftOuter);
    let probe = vec![chunk_of(
        &probe_schema(),
        vec![Some(4), Some(1), Some(5)],
        vec![Some(100), Some(200), Some(300)],
    )];
    let run = run_join(&fixture, &node, build_basic(), probe, 4096);

    assert_eq!(run.total_rows(), 4);
    assert_eq!(
        run.column_i64(PROBE_KEY),
        vec![Some(4), Some(1), Some(1), Some(5)]
    );
    assert_eq!(
        run.column_i64(BUILD_VALUE),
        vec![None, Some(10), Some(20), None]
    );
}

#[test]
fn left_outer_conjunct_failure_null_extends_exactly_once() {
    let mut fixture = JoinFixture::new();
    // No build row satisfies bv > 1000, so key equality alone is not a match.
    let conjunct = fixture.build_value_gt(1000);
    let mut node = fixture.node(JoinType::LeftOuter);
    node.other_conjuncts = vec![conjunct];
    let probe = vec![chunk_of(
        &probe_schema(),
        vec![Some(1)],
        vec![Some(100)],
    )];
    let run = run_join(&fixture, &node, build_basic(), probe, 4096);

    assert_eq!(run.total_rows(), 1);
    assert_eq!(run.column_i64(PROBE_KEY), vec![Some(1)]);
    assert_eq!(run.column_i64(BUILD_VALUE), vec![None]);
}

#[test]
fn left_semi_emits_each_probe_row_at_most_once() {
    let fixture = JoinFixture::new();
    let node = fixture.node(JoinType::LeftSemi);
    let probe = vec![chunk_of(
        &probe_schema(),
        vec![Some(1), Some(4), Some(2)],
        vec![Some(100), Some(200), Some(300)],
    )];
    let run = run_join(&fixture, &node, build_basic(), probe, 4096);

    // Key 1 has two build matches but is emitted once.
    assert_eq!(run.column_i64(PROBE_KEY), vec![Some(1), Some(2)]);
}

#[test]
fn left_anti_emits_rows_with_zero_passing_matches() {
    let mut fixture = JoinFixture::new();
    let conjunct = fixture.build_value_gt(15);
    let mut node = fixture.node(JoinType::LeftAnti);
    node.other_conjuncts = vec![conjunct];
    let probe = vec![chunk_of(
        &probe_schema(),
        // Key 1: one of two matches passes bv > 15 -> not anti.
        // Key 4: no key match -> anti.
        // NULL key: no match -> anti (NOT EXISTS semantics, not null-aware).
        vec![Some(1), Some(4), None],
        vec![Some(100), Some(200), Some(300)],
    )];
    let run = run_join(&fixture, &node, build_basic(), probe, 4096);

    assert_eq!(run.column_i64(PROBE_KEY), vec![Some(4), None]);
}

#[test]
fn left_anti_conjunct_must_fail_across_entire_build_side() {
    let mut fixture = JoinFixture::new();
    let conjunct = fixture.build_value_gt(1000);
    let mut node = fixture.node(JoinType::LeftAnti);
    node.other_conjuncts = vec![conjunct];
    let probe = vec![chunk_of(
        &probe_schema(),
        vec![Some(1), Some(2)],
        vec![Some(100), Some(200)],
    )];
    let run = run_join(&fixture, &node, build_basic(), probe, 4096);

    // Every candidate fails the conjunct, so both rows are anti matches.
    assert_eq!(run.column_i64(PROBE_KEY), vec![Some(1), Some(2)]);
}

#[test]
fn null_aware_left_anti_tri_valued_semantics() {
    // Build keys {1, NULL}; probe keys {1, 2, NULL}.
    let fixture = JoinFixture::new();
    let node = fixture.node(JoinType::NullAwareLeftAnti);
    let build = vec![chunk_of(
        &build_schema(),
        vec![Some(1), None],
        vec![Some(10), Some(20)],
    )];
    let probe = vec![chunk_of(
        &probe_schema(),
        vec![Some(1), Some(2), None],
        vec![Some(100), Some(200), Some(300)],
    )];
    let run = run_join(&fixture, &node, build, probe, 4096);

    // Key 1 matched, key 2 unknown (build has null), NULL key unknown.
    assert_eq!(run.total_rows(), 0);
}

#[test]
fn null_aware_left_anti_without_build_nulls() {
    let fixture = JoinFixture::new();
    let node = fixture.node(JoinType::NullAwareLeftAnti);
    let build = vec![chunk_of(&build_schema(), vec![Some(1)], vec![Some(10)])];
    let probe = vec![chunk_of(
        &probe_schema(),
        vec![Some(1), Some(2), None],
        vec![Some(100), Some(200), Some(300)],
    )];
    let run = run_join(&fixture, &node, build, probe, 4096);

    // Key 2 is a confirmed non-match; the NULL probe key stays unknown.
    assert_eq!(run.column_i64(PROBE_KEY), vec![Some(2)]);
}

#[test]
fn null_aware_left_anti_over_empty_build_emits_everything() {
    let fixture = JoinFixture::new();
    let node = fixture.node(JoinType::NullAwareLeftAnti);
    let probe = vec![chunk_of(
        &probe_schema(),
        vec![Some(1), None],
        vec![Some(100), Some(200)],
    )];
    let run = run_join(&fixture, &node, Vec::new(), probe, 4096);

    // NOT IN () is true for every row, null keys included.
    assert_eq!(run.total_rows(), 2);
}

#[test]
fn null_aware_left_semi_requires_explicit_match() {
    let fixture = JoinFixture::new();
    let node = fixture.node(JoinType::NullAwareLeftSemi);
    let build = vec![chunk_of(
        &build_schema(),
        vec![Some(1), None],
        vec![Some(10), Some(20)],
    )];
    let probe = vec![chunk_of(
        &probe_schema(),
        vec![Some(1), Some(2), None],
        vec![Some(100), Some(200), Some(300)],
    )];
    let run = run_join(&fixture, &node, build, probe, 4096);

    // Build-side nulls never promote "unknown" to a semi match.
    assert_eq!(run.column_i64(PROBE_KEY), vec![Some(1)]);
}

#[test]
fn mark_join_emits_one_row_per_probe_row() {
    let fixture = JoinFixture::new();
    let node = fixture.mark_node(JoinType::LeftSemi);
    let build = vec![chunk_of(
        &build_schema(),
        vec![Some(1), Some(2)],
        vec![Some(10), Some(20)],
    )];
    let probe = vec![chunk_of(
        &probe_schema(),
        vec![Some(1), Some(7), None],
        vec![Some(100), Some(200), Some(300)],
    )];
    let run = run_join(&fixture, &node, build, probe, 4096);

    assert_eq!(run.total_rows(), 3);
    // No nulls in the build set: an unmatched non-null key is a definite false;
    // a NULL probe key against a non-empty set is unknown.
    assert_eq!(
        run.column_bool(MARK_SLOT),
        vec![Some(true), Some(false), None]
    );
}

#[test]
fn mark_join_with_build_null_marks_unknown() {
    let fixture = JoinFixture::new();
    let node = fixture.mark_node(JoinType::LeftSemi);
    let build = vec![chunk_of(
        &build_schema(),
        vec![Some(1), None],
        vec![Some(10), Some(20)],
    )];
    let probe = vec![chunk_of(
        &probe_schema(),
        vec![Some(1), Some(7)],
        vec![Some(100), Some(200)],
    )];
    let run = run_join(&fixture, &node, build, probe, 4096);

    assert_eq!(run.column_bool(MARK_SLOT), vec![Some(true), None]);
}

#[test]
fn anti_mark_join_negates_with_null_preserved() {
    let fixture = JoinFixture::new();
    let node = fixture.mark_node(JoinType::NullAwareLeftAnti);
    let build = vec![chunk_of(
        &build_schema(),
        vec![Some(1), None],
        vec![Some(10), Some(20)],
    )];
    let probe = vec![chunk_of(
        &probe_schema(),
        vec![Some(1), Some(7)],
        vec![Some(100), Some(200)],
    )];
    let run = run_join(&fixture, &node, build, probe, 4096);

    // NOT IN: matched -> false, unmatched with build null -> unknown.
    assert_eq!(run.column_bool(MARK_SLOT), vec![Some(false), None]);
}

#[test]
fn right_semi_emits_matched_build_rows_once() {
    let fixture = JoinFixture::new();
    let node = fixture.node(JoinType::RightSemi);
    let probe = vec![chunk_of(
        &probe_schema(),
        // Key 1 probed twice; its build rows must still appear once each.
        vec![Some(1), Some(1), Some(3)],
        vec![Some(100), Some(200), Some(300)],
    )];
    let run = run_join(&fixture, &node, build_basic(), probe, 4096);

    let mut keys = run.column_i64(BUILD_VALUE);
    keys.sort();
    assert_eq!(keys, vec![Some(10), Some(20), Some(40)]);
}

#[test]
fn right_anti_flushes_unmatched_build_rows_at_end() {
    let fixture = JoinFixture::new();
    let node = fixture.node(JoinType::RightAnti);
    let probe = vec![chunk_of(
        &probe_schema(),
        vec![Some(1)],
        vec![Some(100)],
    )];
    let run = run_join(&fixture, &node, build_basic(), probe, 4096);

    // Build keys 2 and 3 were never matched.
    assert_eq!(run.column_i64(BUILD_KEY), vec![Some(2), Some(3)]);
}

#[test]
fn right_outer_null_extends_unmatched_build_rows() {
    let fixture = JoinFixture::new();
    let node = fixture.node(JoinType::RightOuter);
    let probe = vec![chunk_of(
        &probe_schema(),
        vec![Some(2)],
        vec![Some(100)],
    )];
    let run = run_join(&fixture, &node, build_basic(), probe, 4096);

    assert_eq!(run.total_rows(), 4);
    assert_eq!(
        run.column_i64(BUILD_KEY),
        vec![Some(2), Some(1), Some(1), Some(3)]
    );
    assert_eq!(
        run.column_i64(PROBE_KEY),
        vec![Some(2), None, None, None]
    );
}

#[test]
fn full_outer_unions_both_sides() {
    let fixture = JoinFixture::new();
    let node = fixture.node(JoinType::FullOuter);
    let probe = vec![chunk_of(
        &probe_schema(),
        vec![Some(2), Some(9)],
        vec![Some(100), Some(200)],
    )];
    let run = run_join(&fixture, &node, build_basic(), probe, 4096);

    // One match (key 2), one unmatched probe row (key 9), and the three
    // never-matched build rows flushed after the probe side is consumed.
    assert_eq!(run.total_rows(), 5);
    assert_eq!(
        run.column_i64(PROBE_KEY),
        vec![Some(2), Some(9), None, None, None]
    );
    assert_eq!(
        run.column_i64(BUILD_KEY),
        vec![Some(2), None, Some(1), Some(1), Some(3)]
    );
}

#[test]
fn resumability_under_tight_row_budget() {
    let fixture = JoinFixture::new();
    let node = fixture.node(JoinType::Inner);
    // Key 1 fans out to 6 build rows; two probe rows of key 1 -> 12 output rows.
    let build = vec![chunk_of(
        &build_schema(),
        vec![Some(1); 6],
        (0..6).map(|v| Some(v * 10)).collect(),
    )];
    let probe = vec![chunk_of(
        &probe_schema(),
        vec![Some(1), Some(1)],
        vec![Some(100), Some(200)],
    )];

    let reference = run_join(&fixture, &node, build.clone(), probe.clone(), 4096);
    let bounded = run_join(&fixture, &node, build, probe, 3);

    // The tight budget forces multiple pulls, with no row dropped, duplicated,
    // or reordered relative to the single-call drain.
    assert!(bounded.pulls_with_output >= 4);
    assert_eq!(reference.total_rows(), 12);
    assert_eq!(bounded.total_rows(), 12);
    assert_eq!(
        bounded.column_i64(BUILD_VALUE),
        reference.column_i64(BUILD_VALUE)
    );
    assert_eq!(
        bounded.column_i64(PROBE_VALUE),
        reference.column_i64(PROBE_VALUE)
    );
}

#[test]
fn multiple_probe_batches_in_arrival_order() {
    let fixture = JoinFixture::new();
    let node = fixture.node(JoinType::LeftOuter);
    let probe = vec![
        chunk_of(&probe_schema(), vec![Some(1)], vec![Some(100)]),
        chunk_of(&probe_schema(), vec![Some(9)], vec![Some(200)]),
        chunk_of(&probe_schema(), vec![Some(2)], vec![Some(300)]),
    ];
    let run = run_join(&fixture, &node, build_basic(), probe, 4096);

    assert_eq!(
        run.column_i64(PROBE_VALUE),
        vec![Some(100), Some(100), Some(200), Some(300)]
    );
}

#[test]
fn empty_probe_stream_still_flushes_right_join() {
    let fixture = JoinFixture::new();
    let node = fixture.node(JoinType::RightAnti);
    let run = run_join(&fixture, &node, build_basic(), Vec::new(), 4096);

    // No probe rows: every build row is unmatched.
    assert_eq!(run.total_rows(), 4);
}

#[test]
fn push_fails_when_build_is_not_ready() {
    let fixture = JoinFixture::new();
    let node = fixture.node(JoinType::Inner);
    let arena = Arc::new(fixture.arena.clone());
    let dep_manager = DependencyManager::new();
    let shared = Arc::new(JoinSharedState::new(node.node_id, &dep_manager));
    let factory = HashJoinProbeFactory::new(arena, &node, Arc::clone(&shared)).expect("factory");
    let mut op = factory.create(1, 0);
    let op = op.as_processor_mut().expect("processor");

    // The scheduler should have waited on this dependency.
    assert!(op.precondition_dependency().is_some());

    let state = RuntimeState::new();
    let chunk = chunk_of(&probe_schema(), vec![Some(1)], vec![Some(10)]);
    let err = op.push(&state, chunk, false).expect_err("no build yet");
    assert!(matches!(err, ExecError::BuildState(_)), "err={err:?}");
}

#[test]
fn distribution_requirement_decision_table() {
    use basalt::exec::node::join::JoinDistributionMode;

    let fixture = JoinFixture::new();
    let dep_manager = DependencyManager::new();

    // Null-aware anti join pins the stream to a single partition.
    let node = fixture.node(JoinType::NullAwareLeftAnti);
    let shared = Arc::new(JoinSharedState::new(node.node_id, &dep_manager));
    let factory =
        HashJoinProbeFactory::new(Arc::new(fixture.arena.clone()), &node, shared).expect("factory");
    assert_eq!(
        factory.required_data_distribution().kind,
        ExchangeKind::Noop
    );

    // Broadcast joins pass through unchanged.
    let node = fixture.node(JoinType::Inner);
    let shared = Arc::new(JoinSharedState::new(node.node_id, &dep_manager));
    let factory =
        HashJoinProbeFactory::new(Arc::new(fixture.arena.clone()), &node, shared).expect("factory");
    assert_eq!(
        factory.required_data_distribution().kind,
        ExchangeKind::Passthrough
    );
    assert!(factory.is_broadcast_join());
    assert!(!factory.is_shuffled_operator());
    assert!(!factory.require_data_distribution());

    // Bucket-shuffle and colocate modes use the bucket hash shuffle.
    for mode in [
        JoinDistributionMode::BucketShuffle,
        JoinDistributionMode::Colocate,
    ] {
        let mut node = fixture.node(JoinType::Inner);
        node.distribution_mode = mode;
        let shared = Arc::new(JoinSharedState::new(node.node_id, &dep_manager));
        let factory = HashJoinProbeFactory::new(Arc::new(fixture.arena.clone()), &node, shared)
            .expect("factory");
        let dist = factory.required_data_distribution();
        assert_eq!(dist.kind, ExchangeKind::BucketHashShuffle);
        assert!(!dist.partition_exprs.is_empty());
        assert!(factory.require_data_distribution());
    }

    // Everything else hash-shuffles on the partition expressions.
    let mut node = fixture.node(JoinType::Inner);
    node.distribution_mode = JoinDistributionMode::Partitioned;
    let shared = Arc::new(JoinSharedState::new(node.node_id, &dep_manager));
    let factory =
        HashJoinProbeFactory::new(Arc::new(fixture.arena.clone()), &node, shared).expect("factory");
    let dist = factory.required_data_distribution();
    assert_eq!(dist.kind, ExchangeKind::HashShuffle);
    assert!(factory.is_shuffled_operator());
    assert!(factory.require_data_distribution());
}

#[test]
fn lazy_materialization_requires_a_filter_pass() {
    let mut fixture = JoinFixture::new();
    let dep_manager = DependencyManager::new();

    let node = fixture.node(JoinType::Inner);
    let shared = Arc::new(JoinSharedState::new(node.node_id, &dep_manager));
    let factory =
        HashJoinProbeFactory::new(Arc::new(fixture.arena.clone()), &node, shared).expect("factory");
    assert!(!factory.can_do_lazy_materialized());
    assert!(!factory.is_lazy_materialized_slot(PROBE_VALUE));

    // With an other-join conjunct on bv, pv is deferred but bv is eager.
    let conjunct = fixture.build_value_gt(0);
    let mut node = fixture.node(JoinType::Inner);
    node.other_conjuncts = vec![conjunct];
    let shared = Arc::new(JoinSharedState::new(node.node_id, &dep_manager));
    let factory =
        HashJoinProbeFactory::new(Arc::new(fixture.arena.clone()), &node, shared).expect("factory");
    assert!(factory.can_do_lazy_materialized());
    assert!(factory.is_lazy_materialized_slot(PROBE_VALUE));
    assert!(!factory.is_lazy_materialized_slot(BUILD_VALUE));

    let debug = factory.debug_string(1);
    assert!(debug.starts_with("  HASH_JOIN (id=1"), "debug={debug}");
    assert!(debug.contains("join_type=INNER"), "debug={debug}");
}

#[test]
fn conjunct_with_null_result_does_not_match() {
    // pv < bv is NULL when pv is NULL; a NULL conjunct never confirms a match.
    let mut fixture = JoinFixture::new();
    let conjunct = fixture.probe_value_lt_build_value();
    let mut node = fixture.node(JoinType::LeftSemi);
    node.other_conjuncts = vec![conjunct];
    let build = vec![chunk_of(
        &build_schema(),
        vec![Some(1), Some(2)],
        vec![Some(10), Some(20)],
    )];
    let probe = vec![chunk_of(
        &probe_schema(),
        vec![Some(1), Some(1), Some(2)],
        vec![Some(5), None, Some(50)],
    )];
    let run = run_join(&fixture, &node, build, probe, 4096);

    // Row 0: 5 < 10 passes. Row 1: NULL comparison is unknown. Row 2: 50 < 20 fails.
    assert_eq!(run.column_i64(PROBE_VALUE), vec![Some(5)]);
}
