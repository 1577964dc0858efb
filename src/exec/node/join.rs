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
use std::collections::HashSet;

use crate::common::ids::SlotId;
use crate::exec::expr::ExprId;
use arrow::datatypes::SchemaRef;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum JoinType {
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

impl JoinType {
    /// Joins whose preserved side is the probe stream only.
    pub fn is_left_semi_anti(self) -> bool {
        matches!(
            self,
            JoinType::LeftSemi
                | JoinType::LeftAnti
                | JoinType::NullAwareLeftAnti
                | JoinType::NullAwareLeftSemi
        )
    }

    /// Joins that need per-build-row matched flags for a deferred flush.
    pub fn tracks_build_matches(self) -> bool {
        matches!(
            self,
            JoinType::RightOuter | JoinType::FullOuter | JoinType::RightSemi | JoinType::RightAnti
        )
    }

    pub fn is_null_aware(self) -> bool {
        matches!(
            self,
            JoinType::NullAwareLeftAnti | JoinType::NullAwareLeftSemi
        )
    }
}

/// Return a stable string label for one join type, used by diagnostics and errors.
pub fn join_type_str(join_type: JoinType) -> &'static str {
    match join_type {
        JoinType::Inner => "INNER",
        JoinType::LeftOuter => "LEFT_OUTER",
        JoinType::RightOuter => "RIGHT_OUTER",
        JoinType::FullOuter => "FULL_OUTER",
        JoinType::LeftSemi => "LEFT_SEMI",
        JoinType::RightSemi => "RIGHT_SEMI",
        JoinType::LeftAnti => "LEFT_ANTI",
        JoinType::RightAnti => "RIGHT_ANTI",
        JoinType::NullAwareLeftAnti => "NULL_AWARE_LEFT_ANTI",
        JoinType::NullAwareLeftSemi => "NULL_AWARE_LEFT_SEMI",
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum JoinDistributionMode {
    None,
    Broadcast,
    Partitioned,
    BucketShuffle,
    Colocate,
}

/// Return a stable string label for one distribution mode.
pub fn distribution_mode_str(mode: JoinDistributionMode) -> &'static str {
    match mode {
        JoinDistributionMode::None => "NONE",
        JoinDistributionMode::Broadcast => "BROADCAST",
        JoinDistributionMode::Partitioned => "PARTITIONED",
        JoinDistributionMode::BucketShuffle => "BUCKET_SHUFFLE",
        JoinDistributionMode::Colocate => "COLOCATE",
    }
}

#[derive(Clone, Debug)]
/// Plan-level configuration of one hash join: key expressions, conjunct lists,
/// mark-join settings, and output layout. Immutable after plan construction.
pub struct HashJoinNode {
    pub node_id: i32,
    pub join_type: JoinType,
    pub distribution_mode: JoinDistributionMode,
    /// Schema of the probe-side input (plan order).
    pub probe_schema: SchemaRef,
    /// Schema of the build-side input (plan order).
    pub build_schema: SchemaRef,
    /// Probe-side join key expressions, pairwise aligned with the build keys
    /// the table was built on.
    pub probe_keys: Vec<ExprId>,
    /// Null-safe flags aligned with join key pairs.
    /// `true` means this key uses null-safe equality (`<=>`).
    pub eq_null_safe: Vec<bool>,
    /// Post-join predicates evaluated per candidate row pair ("other join conjuncts").
    pub other_conjuncts: Vec<ExprId>,
    /// Mark-join predicates, independent of `other_conjuncts`.
    pub mark_conjuncts: Vec<ExprId>,
    /// Mark join: emit one row per probe row with a nullable boolean mark column.
    pub is_mark_join: bool,
    /// Slot id of the mark column in the output schema (mark joins only).
    pub mark_slot_id: Option<SlotId>,
    /// Keys the required shuffle distributes on.
    pub partition_exprs: Vec<ExprId>,
    /// Output slots that must be materialized before conjunct evaluation even
    /// when lazy materialization is enabled.
    pub not_lazy_materialized_slots: HashSet<SlotId>,
}
