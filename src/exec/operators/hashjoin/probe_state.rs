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
//! Per-batch resumable probe state.
//!
//! Responsibilities:
//! - Prepares one pushed probe chunk for matching: key evaluation, null
//!   tracking, and batched hash-table group resolution, each done once per
//!   batch and reused across pulls.
//! - Owns the probe cursor and the per-row match bookkeeping that makes
//!   multi-pull resumption exact.
//!
//! Key exported interfaces:
//! - Types: `PreparedProbeBatch`, `ProbeCursor`, `RowMatchState`, `NullTracking`.

use arrow::array::{Array, ArrayRef};

use super::join_hash_table::{JoinHashTable, row_has_forbidden_null};
use crate::exec::chunk::Chunk;

/// Progress marker through (probe row, build match) space.
///
/// `build_match` indexes into the current row's group-rows slice. The cursor
/// only moves forward within a batch; it is reset when a new batch arrives.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct ProbeCursor {
    pub probe_row: usize,
    pub build_match: usize,
}

impl ProbeCursor {
    pub(crate) fn advance_row(&mut self) {
        self.probe_row += 1;
        self.build_match = 0;
    }
}

/// Per-probe-row resolution state.
///
/// Outer/semi/anti bookkeeping is tracked explicitly per row instead of being
/// inferred from cursor position, so a match found in one pull composes with
/// conjunct evaluation finishing in a later pull.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum RowMatchState {
    Unresolved,
    Matched,
    /// Confirmed: every candidate was evaluated and none survived.
    NoMatch,
}

/// Null tracking for the probe-side join keys, computed at most once per batch.
pub(crate) struct NullTracking {
    need_null_map: bool,
    null_map: Option<Vec<bool>>,
}

impl NullTracking {
    pub(crate) fn compute(key_arrays: &[ArrayRef], null_safe_eq: &[bool]) -> Self {
        let need_null_map = key_arrays
            .iter()
            .enumerate()
            .any(|(idx, array)| !null_safe_eq.get(idx).copied().unwrap_or(false) && array.null_count() > 0);
        let null_map = if need_null_map {
            let num_rows = key_arrays.first().map(|a| a.len()).unwrap_or(0);
            let mut map = Vec::with_capacity(num_rows);
            for row in 0..num_rows {
                map.push(row_has_forbidden_null(key_arrays, row, null_safe_eq));
            }
            Some(map)
        } else {
            None
        };
        Self {
            need_null_map,
            null_map,
        }
    }

    pub(crate) fn need_null_map(&self) -> bool {
        self.need_null_map
    }

    /// True when the row's key contains a null in a non-null-safe position.
    pub(crate) fn is_null_key(&self, row: usize) -> bool {
        self.null_map
            .as_ref()
            .map(|map| map.get(row).copied().unwrap_or(false))
            .unwrap_or(false)
    }
}

/// One pushed probe chunk prepared for matching.
///
/// Group resolution happens once here; every pull then walks group slices from
/// the cursor without re-hashing keys.
pub(crate) struct PreparedProbeBatch {
    pub(crate) chunk: Chunk,
    pub(crate) group_ids: Vec<Option<usize>>,
    pub(crate) null_tracking: NullTracking,
    pub(crate) cursor: ProbeCursor,
    /// Allocated only for join types that need per-row resolution.
    pub(crate) match_state: Option<Vec<RowMatchState>>,
    /// Mark joins: a candidate for this row evaluated to NULL.
    pub(crate) mark_saw_null: Option<Vec<bool>>,
}

impl PreparedProbeBatch {
    /// Prepare one pushed chunk against the frozen table. Key arrays are the
    /// probe-key expressions already evaluated by the caller (so expression
    /// failures classify separately from table failures).
    pub(crate) fn prepare(
        chunk: Chunk,
        key_arrays: &[ArrayRef],
        table: &JoinHashTable,
        track_match_state: bool,
        is_mark_join: bool,
    ) -> Result<Self, String> {
        let num_rows = chunk.len();
        let null_tracking = NullTracking::compute(key_arrays, table.null_safe_eq());
        let skip = if null_tracking.need_null_map() {
            (0..num_rows)
                .map(|row| null_tracking.is_null_key(row))
                .collect::<Vec<_>>()
        } else {
            vec![false; num_rows]
        };
        let group_ids = table.lookup_batch(key_arrays, &skip)?;

        let match_state = if track_match_state {
            Some(vec![RowMatchState::Unresolved; num_rows])
        } else {
            None
        };
        let mark_saw_null = if is_mark_join {
            Some(vec![false; num_rows])
        } else {
            None
        };

        Ok(Self {
            chunk,
            group_ids,
            null_tracking,
            cursor: ProbeCursor::default(),
            match_state,
            mark_saw_null,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.chunk.len()
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.cursor.probe_row >= self.len()
    }

    pub(crate) fn row_state(&self, row: usize) -> RowMatchState {
        self.match_state
            .as_ref()
            .and_then(|s| s.get(row).copied())
            .unwrap_or(RowMatchState::Unresolved)
    }

    pub(crate) fn set_row_state(&mut self, row: usize, state: RowMatchState) {
        if let Some(states) = self.match_state.as_mut() {
            if let Some(slot) = states.get_mut(row) {
                *slot = state;
            }
        }
    }

    pub(crate) fn mark_row_matched(&mut self, row: usize) {
        if let Some(states) = self.match_state.as_mut() {
            if let Some(slot) = states.get_mut(row) {
                *slot = RowMatchState::Matched;
            }
        }
    }

    pub(crate) fn set_mark_saw_null(&mut self, row: usize) {
        if let Some(map) = self.mark_saw_null.as_mut() {
            if let Some(slot) = map.get_mut(row) {
                *slot = true;
            }
        }
    }

    pub(crate) fn mark_saw_null(&self, row: usize) -> bool {
        self.mark_saw_null
            .as_ref()
            .map(|m| m.get(row).copied().unwrap_or(false))
            .unwrap_or(false)
    }

    pub(crate) fn matched_groups(&self) -> usize {
        self.group_ids.iter().filter(|g| g.is_some()).count()
    }
}
