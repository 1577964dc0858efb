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
//! Join-type matching policies for hash-join probing.
//!
//! Responsibilities:
//! - Generates candidate (probe row, build row) pairs from the frozen table
//!   under a row budget, advancing the probe cursor exactly once per pair.
//! - Reconciles conjunct results with per-row match bookkeeping for every join
//!   semantics: outer null extension, semi/anti at-most-once emission,
//!   null-aware tri-valued rules, and mark folds.
//!
//! The family is closed: one [`ProbeMatcher`] variant per join type, selected
//! once at operator construction. Dispatch happens per candidate-generation
//! call, never per row.
//!
//! Key exported interfaces:
//! - Types: `ProbeMatcher`, `CandidateSet`, `RoundEmission`.

use super::probe_state::{PreparedProbeBatch, RowMatchState};
use super::join_hash_table::JoinHashTable;
use crate::exec::node::join::JoinType;

/// Candidate pairs produced by one generation round, plus the probe rows whose
/// candidate stream finished inside the round.
#[derive(Default)]
pub(crate) struct CandidateSet {
    pub probe_indices: Vec<u32>,
    pub build_rows: Vec<u32>,
    /// Probe rows completed this round, in probe-row order.
    pub completed: Vec<u32>,
}

impl CandidateSet {
    pub(crate) fn is_empty(&self) -> bool {
        self.probe_indices.is_empty() && self.completed.is_empty()
    }
}

/// Rows to emit after one round, shaped per join family.
#[derive(Default)]
pub(crate) struct RoundEmission {
    /// Pair-shaped output (inner/outer joins); `None` cells null-extend.
    pub probe_indices: Vec<Option<u32>>,
    pub build_indices: Vec<Option<u32>>,
    /// Probe-preserving output (semi/anti/null-aware/mark joins).
    pub probe_rows: Vec<u32>,
    /// Mark values aligned with `probe_rows` (mark joins only).
    pub marks: Vec<Option<bool>>,
    /// Build-preserving output confirmed this round (right semi).
    pub build_rows: Vec<u32>,
}

/// Closed family of per-join-type matching policies. Holds no state; every
/// call works on the probe batch and bookkeeping passed in.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum ProbeMatcher {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
    LeftSemi,
    RightSemi,
    LeftAnti,
    RightAnti,
    NullAwareLeftAnti,
    NullAwareLeftSemi,
}

impl ProbeMatcher {
    pub(crate) fn new(join_type: JoinType) -> Self {
        match join_type {
            JoinType::Inner => Self::Inner,
            JoinType::LeftOuter => Self::LeftOuter,
            JoinType::RightOuter => Self::RightOuter,
            JoinType::FullOuter => Self::FullOuter,
            JoinType::LeftSemi => Self::LeftSemi,
            JoinType::RightSemi => Self::RightSemi,
            JoinType::LeftAnti => Self::LeftAnti,
            JoinType::RightAnti => Self::RightAnti,
            JoinType::NullAwareLeftAnti => Self::NullAwareLeftAnti,
            JoinType::NullAwareLeftSemi => Self::NullAwareLeftSemi,
        }
    }

    /// Probe-preserving joins emit each probe row at most once; after a row is
    /// confirmed matched its remaining candidates are skipped.
    fn at_most_once_probe(&self) -> bool {
        matches!(
            self,
            Self::LeftSemi | Self::LeftAnti | Self::NullAwareLeftAnti | Self::NullAwareLeftSemi
        )
    }

    /// Whether this join needs candidate pairs materialized at all.
    /// Existence-only joins without conjuncts resolve from the group lookup.
    pub(crate) fn needs_pairs(&self, has_conjuncts: bool) -> bool {
        match self {
            Self::Inner | Self::LeftOuter | Self::RightOuter | Self::FullOuter => true,
            // Build-preserving joins always walk pairs to flag build rows.
            Self::RightSemi | Self::RightAnti => true,
            Self::LeftSemi | Self::LeftAnti | Self::NullAwareLeftAnti | Self::NullAwareLeftSemi => {
                has_conjuncts
            }
        }
    }

    /// Whether the probe batch must carry per-row match state.
    pub(crate) fn tracks_probe_state(&self, is_mark_join: bool) -> bool {
        is_mark_join
            || matches!(
                self,
                Self::LeftOuter
                    | Self::FullOuter
                    | Self::LeftSemi
                    | Self::LeftAnti
                    | Self::NullAwareLeftAnti
                    | Self::NullAwareLeftSemi
            )
    }

    /// Produce up to `budget` candidate pairs (and at most `budget` completed
    /// rows), advancing the cursor so the next call resumes exactly where this
    /// one stopped.
    pub(crate) fn generate(
        &self,
        probe: &mut PreparedProbeBatch,
        table: &JoinHashTable,
        budget: usize,
        needs_pairs: bool,
    ) -> Result<CandidateSet, String> {
        let mut cand = CandidateSet::default();
        let budget = budget.max(1);
        while probe.cursor.probe_row < probe.len() {
            if cand.probe_indices.len() >= budget || cand.completed.len() >= budget {
                break;
            }
            let row = probe.cursor.probe_row;
            let group = probe.group_ids[row];

            if !needs_pairs {
                // Existence resolves straight from the group lookup.
                if group.is_some() && probe.row_state(row) == RowMatchState::Unresolved {
                    probe.mark_row_matched(row);
                }
                cand.completed.push(row as u32);
                probe.cursor.advance_row();
                continue;
            }

            let Some(group_id) = group else {
                cand.completed.push(row as u32);
                probe.cursor.advance_row();
                continue;
            };

            if self.at_most_once_probe() && probe.row_state(row) == RowMatchState::Matched {
                // Row already confirmed; fast-forward past its remaining candidates.
                cand.completed.push(row as u32);
                probe.cursor.advance_row();
                continue;
            }

            let rows = table.group_rows_slice(group_id)?;
            let mut k = probe.cursor.build_match;
            while k < rows.len() && cand.probe_indices.len() < budget {
                cand.probe_indices.push(row as u32);
                cand.build_rows.push(rows[k]);
                k += 1;
            }
            if k >= rows.len() {
                cand.completed.push(row as u32);
                probe.cursor.advance_row();
            } else {
                probe.cursor.build_match = k;
                break;
            }
        }
        Ok(cand)
    }

    /// Reconcile one round's conjunct mask with the match bookkeeping and
    /// produce this round's emissions. `mask` is per candidate pair:
    /// `Some(true)` survivor, `Some(false)` failed, `None` unknown.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn reconcile(
        &self,
        probe: &mut PreparedProbeBatch,
        cand: &CandidateSet,
        mask: &[Option<bool>],
        is_mark_join: bool,
        build_matched: Option<&mut Vec<bool>>,
        build_has_null_key: bool,
        build_row_count: usize,
    ) -> Result<RoundEmission, String> {
        if mask.len() != cand.probe_indices.len() {
            return Err("join conjunct mask length mismatch".to_string());
        }
        let mut emission = RoundEmission::default();

        // Pass 1: fold survivors into probe/build bookkeeping.
        let mut build_flags = build_matched;
        for (i, value) in mask.iter().enumerate() {
            let row = cand.probe_indices[i] as usize;
            match value {
                Some(true) => {
                    probe.mark_row_matched(row);
                    if let Some(flags) = build_flags.as_deref_mut() {
                        let build_row = cand.build_rows[i] as usize;
                        let flag = flags
                            .get_mut(build_row)
                            .ok_or_else(|| "join build row out of bounds".to_string())?;
                        if !*flag {
                            *flag = true;
                            if matches!(self, Self::RightSemi) {
                                emission.build_rows.push(cand.build_rows[i]);
                            }
                        }
                    }
                }
                None => {
                    if is_mark_join {
                        probe.set_mark_saw_null(row);
                    }
                }
                Some(false) => {}
            }
        }

        // Pass 2: emissions, in probe-row order with fan-out rows contiguous.
        match self {
            Self::Inner => {
                for (i, value) in mask.iter().enumerate() {
                    if *value == Some(true) {
                        emission.probe_indices.push(Some(cand.probe_indices[i]));
                        emission.build_indices.push(Some(cand.build_rows[i]));
                    }
                }
            }
            Self::RightOuter => {
                for (i, value) in mask.iter().enumerate() {
                    if *value == Some(true) {
                        emission.probe_indices.push(Some(cand.probe_indices[i]));
                        emission.build_indices.push(Some(cand.build_rows[i]));
                    }
                }
            }
            Self::LeftOuter | Self::FullOuter => {
                // Merge surviving pairs with completed-row null extension so
                // output stays in probe-row order.
                let mut comp_i = 0;
                for (i, value) in mask.iter().enumerate() {
                    if *value != Some(true) {
                        continue;
                    }
                    let row = cand.probe_indices[i];
                    while comp_i < cand.completed.len() && cand.completed[comp_i] < row {
                        self.emit_unmatched_left(probe, cand.completed[comp_i], &mut emission);
                        comp_i += 1;
                    }
                    emission.probe_indices.push(Some(row));
                    emission.build_indices.push(Some(cand.build_rows[i]));
                }
                while comp_i < cand.completed.len() {
                    self.emit_unmatched_left(probe, cand.completed[comp_i], &mut emission);
                    comp_i += 1;
                }
            }
            Self::RightSemi | Self::RightAnti => {
                // Right semi emitted from pass 1; right anti flushes at end of input.
            }
            Self::LeftSemi
            | Self::LeftAnti
            | Self::NullAwareLeftAnti
            | Self::NullAwareLeftSemi => {
                for &row in &cand.completed {
                    if is_mark_join {
                        let mark = self.mark_value(probe, row as usize, build_has_null_key, build_row_count);
                        emission.probe_rows.push(row);
                        emission.marks.push(mark);
                    } else if self.emits_completed_row(
                        probe,
                        row as usize,
                        build_has_null_key,
                        build_row_count,
                    ) {
                        emission.probe_rows.push(row);
                    }
                }
            }
        }

        // Pass 3: completed rows that stayed unresolved are now confirmed no-match.
        for &row in &cand.completed {
            if probe.row_state(row as usize) == RowMatchState::Unresolved {
                probe.set_row_state(row as usize, RowMatchState::NoMatch);
            }
        }

        Ok(emission)
    }

    fn emit_unmatched_left(
        &self,
        probe: &PreparedProbeBatch,
        row: u32,
        emission: &mut RoundEmission,
    ) {
        if probe.row_state(row as usize) != RowMatchState::Matched {
            emission.probe_indices.push(Some(row));
            emission.build_indices.push(None);
        }
    }

    /// Non-mark semi/anti emission rule at row completion.
    fn emits_completed_row(
        &self,
        probe: &PreparedProbeBatch,
        row: usize,
        build_has_null_key: bool,
        build_row_count: usize,
    ) -> bool {
        let matched = probe.row_state(row) == RowMatchState::Matched;
        match self {
            Self::LeftSemi | Self::NullAwareLeftSemi => matched,
            Self::LeftAnti => !matched,
            Self::NullAwareLeftAnti => {
                // NOT IN over an empty build side is true for every probe row,
                // null keys included.
                if build_row_count == 0 {
                    return true;
                }
                // A null probe key or a null build key makes absence unknown.
                !matched && !probe.null_tracking.is_null_key(row) && !build_has_null_key
            }
            _ => false,
        }
    }

    /// Tri-valued mark for a completed probe row: true on a confirmed match,
    /// null when existence is unknown, false otherwise. Anti variants negate.
    fn mark_value(
        &self,
        probe: &PreparedProbeBatch,
        row: usize,
        build_has_null_key: bool,
        build_row_count: usize,
    ) -> Option<bool> {
        let matched = probe.row_state(row) == RowMatchState::Matched;
        let in_result = if matched {
            Some(true)
        } else if build_row_count == 0 {
            Some(false)
        } else if probe.null_tracking.is_null_key(row)
            || build_has_null_key
            || probe.mark_saw_null(row)
        {
            None
        } else {
            Some(false)
        };
        match self {
            Self::LeftAnti | Self::NullAwareLeftAnti => in_result.map(|v| !v),
            _ => in_result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::chunk::{Chunk, field_with_slot_id};
    use crate::exec::expr::{ExprArena, ExprNode};
    use crate::common::ids::SlotId;
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use std::sync::Arc;

    fn probe_batch(
        values: Vec<Option<i64>>,
        table: &JoinHashTable,
        track_state: bool,
        is_mark: bool,
    ) -> PreparedProbeBatch {
        let array = Arc::new(Int64Array::from(values)) as arrow::array::ArrayRef;
        let schema = Arc::new(Schema::new(vec![field_with_slot_id(
            Field::new("k", DataType::Int64, true),
            SlotId::new(1),
        )]));
        let chunk = Chunk::new(RecordBatch::try_new(schema, vec![array]).unwrap());
        let mut arena = ExprArena::default();
        let key = arena.push_typed(ExprNode::SlotId(SlotId::new(1)), DataType::Int64);
        let key_arrays = vec![arena.eval(key, &chunk).expect("key eval")];
        PreparedProbeBatch::prepare(chunk, &key_arrays, table, track_state, is_mark)
            .expect("prepared batch")
    }

    fn build_table(keys: Vec<Option<i64>>) -> JoinHashTable {
        let mut table = JoinHashTable::new(vec![DataType::Int64], vec![false]).expect("table");
        let len = keys.len();
        let array = Arc::new(Int64Array::from(keys)) as arrow::array::ArrayRef;
        table.add_build_batch(&[array], len, 0).expect("insert");
        table.finalize_groups().expect("finalize");
        table
    }

    #[test]
    fn generation_respects_budget_and_resumes() {
        // Build side has three rows with key 1.
        let table = build_table(vec![Some(1), Some(1), Some(1)]);
        let matcher = ProbeMatcher::new(JoinType::Inner);
        let mut probe = probe_batch(vec![Some(1), Some(2)], &table, false, false);

        let cand = matcher.generate(&mut probe, &table, 2, true).expect("round 1");
        assert_eq!(cand.probe_indices, vec![0, 0]);
        assert_eq!(cand.build_rows.len(), 2);
        assert!(cand.completed.is_empty());
        assert!(!probe.is_exhausted());

        let cand = matcher.generate(&mut probe, &table, 16, true).expect("round 2");
        assert_eq!(cand.probe_indices, vec![0]);
        // Row 0 finishes, row 1 has no group and completes too.
        assert_eq!(cand.completed, vec![0, 1]);
        assert!(probe.is_exhausted());
    }

    #[test]
    fn existence_only_semi_resolves_without_pairs() {
        let table = build_table(vec![Some(1), Some(1)]);
        let matcher = ProbeMatcher::new(JoinType::LeftSemi);
        let mut probe = probe_batch(vec![Some(1), Some(2)], &table, true, false);

        let cand = matcher.generate(&mut probe, &table, 16, false).expect("round");
        assert!(cand.probe_indices.is_empty());
        assert_eq!(cand.completed, vec![0, 1]);

        let emission = matcher
            .reconcile(&mut probe, &cand, &[], false, None, false, 2)
            .expect("reconcile");
        assert_eq!(emission.probe_rows, vec![0]);
        assert_eq!(probe.row_state(1), RowMatchState::NoMatch);
    }

    #[test]
    fn left_outer_null_extends_in_probe_order() {
        let table = build_table(vec![Some(1)]);
        let matcher = ProbeMatcher::new(JoinType::LeftOuter);
        let mut probe = probe_batch(vec![Some(2), Some(1), Some(3)], &table, true, false);

        let cand = matcher.generate(&mut probe, &table, 16, true).expect("round");
        // Row 1 produced one candidate; rows 0 and 2 completed unmatched.
        let mask = vec![Some(true); cand.probe_indices.len()];
        let emission = matcher
            .reconcile(&mut probe, &cand, &mask, false, None, false, 1)
            .expect("reconcile");
        assert_eq!(
            emission.probe_indices,
            vec![Some(0), Some(1), Some(2)]
        );
        assert_eq!(emission.build_indices, vec![None, Some(0), None]);
    }

    #[test]
    fn null_aware_anti_excludes_unknowns() {
        // Build {1, NULL}: any unmatched non-null probe key is unknown.
        let table = build_table(vec![Some(1), None]);
        assert!(table.has_null_key());
        let matcher = ProbeMatcher::new(JoinType::NullAwareLeftAnti);
        let mut probe = probe_batch(vec![Some(1), Some(2), None], &table, true, false);

        let cand = matcher.generate(&mut probe, &table, 16, false).expect("round");
        let emission = matcher
            .reconcile(&mut probe, &cand, &[], false, None, true, 2)
            .expect("reconcile");
        assert!(emission.probe_rows.is_empty());
    }

    #[test]
    fn mark_values_cover_true_false_null() {
        let table = build_table(vec![Some(1), Some(2)]);
        let matcher = ProbeMatcher::new(JoinType::LeftSemi);
        let mut probe = probe_batch(vec![Some(1), Some(3), None], &table, true, true);

        let cand = matcher.generate(&mut probe, &table, 16, false).expect("round");
        let emission = matcher
            .reconcile(&mut probe, &cand, &[], true, None, false, 2)
            .expect("reconcile");
        assert_eq!(emission.probe_rows, vec![0, 1, 2]);
        // Matched, no match without nulls, null probe key.
        assert_eq!(emission.marks, vec![Some(true), Some(false), None]);
    }
}
