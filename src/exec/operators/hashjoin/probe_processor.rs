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
//! Hash-join probe processor.
//!
//! Responsibilities:
//! - `HashJoinProbeFactory` holds the plan-immutable join configuration, the
//!   distribution decision table, and instantiates one operator per lane.
//! - `HashJoinProbeOperator` is the per-lane resumable state: it accepts probe
//!   chunks via `push`, drains joined output via `pull` under the per-pull row
//!   budget, and runs the end-of-input build-side flush for right/full joins.
//!
//! Key exported interfaces:
//! - Types: `HashJoinProbeFactory`, `HashJoinProbeOperator`.

use std::collections::HashSet;
use std::sync::Arc;

use arrow::compute::concat_batches;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};

use super::build_artifact::JoinBuildArtifact;
use super::join_shared_state::JoinSharedState;
use super::output_builder::{
    ColumnSource, build_build_only_chunk, build_pair_chunk, build_probe_only_chunk, concat_schemas,
    eval_conjuncts,
};
use super::probe_matcher::{ProbeMatcher, RoundEmission};
use super::probe_state::PreparedProbeBatch;
use crate::basalt_logging::debug;
use crate::common::error::ExecError;
use crate::common::ids::SlotId;
use crate::exec::chunk::{Chunk, field_slot_id, field_with_slot_id};
use crate::exec::expr::{ExprArena, ExprId};
use crate::exec::node::join::{
    HashJoinNode, JoinDistributionMode, JoinType, distribution_mode_str, join_type_str,
};
use crate::exec::pipeline::dependency::DependencyHandle;
use crate::exec::pipeline::distribution::{DataDistribution, ExchangeKind};
use crate::exec::pipeline::operator::{Operator, ProcessorOperator};
use crate::exec::pipeline::operator_factory::OperatorFactory;
use crate::runtime::profile::{CounterUnit, OperatorProfiles};
use crate::runtime::runtime_state::RuntimeState;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum OutputShape {
    /// probe ++ build columns (inner/outer joins).
    Pair,
    /// probe columns only, plus the mark column for mark joins.
    ProbeOnly,
    /// build columns only (right semi/anti).
    BuildOnly,
}

fn output_shape(join_type: JoinType) -> OutputShape {
    match join_type {
        JoinType::Inner | JoinType::LeftOuter | JoinType::RightOuter | JoinType::FullOuter => {
            OutputShape::Pair
        }
        JoinType::LeftSemi
        | JoinType::LeftAnti
        | JoinType::NullAwareLeftAnti
        | JoinType::NullAwareLeftSemi => OutputShape::ProbeOnly,
        JoinType::RightSemi | JoinType::RightAnti => OutputShape::BuildOnly,
    }
}

/// Narrow construction-time context shared by the factory and every lane
/// operator it creates. Plan-immutable.
pub(crate) struct ProbeContext {
    pub(crate) arena: Arc<ExprArena>,
    pub(crate) join_type: JoinType,
    pub(crate) is_mark_join: bool,
    pub(crate) probe_keys: Vec<ExprId>,
    pub(crate) other_conjuncts: Vec<ExprId>,
    pub(crate) mark_conjuncts: Vec<ExprId>,
    /// `other_conjuncts` plus, for mark joins, the mark conjuncts; the
    /// candidate filter pass folds them together.
    pub(crate) filter_conjuncts: Vec<ExprId>,
    pub(crate) output_schema: SchemaRef,
    pub(crate) output_sources: Vec<ColumnSource>,
    /// Candidate-evaluation schema: only eagerly-materialized columns.
    pub(crate) eager_schema: SchemaRef,
    pub(crate) eager_sources: Vec<ColumnSource>,
    /// Output slots whose materialization is deferred past the filter pass.
    pub(crate) lazy_slots: Vec<SlotId>,
}

impl ProbeContext {
    fn new(arena: Arc<ExprArena>, node: &HashJoinNode) -> Result<Self, String> {
        if node.probe_keys.is_empty() {
            return Err("hash join requires non-empty probe keys".to_string());
        }
        if node.probe_keys.len() != node.eq_null_safe.len() {
            return Err(format!(
                "hash join null-safe flag count mismatch: keys={} flags={}",
                node.probe_keys.len(),
                node.eq_null_safe.len()
            ));
        }
        if node.is_mark_join {
            if !node.join_type.is_left_semi_anti() {
                return Err(format!(
                    "mark join is not supported for {}",
                    join_type_str(node.join_type)
                ));
            }
            if node.mark_slot_id.is_none() {
                return Err("mark join requires a mark output slot".to_string());
            }
        } else if !node.mark_conjuncts.is_empty() {
            return Err("mark conjuncts require a mark join".to_string());
        }

        let shape = output_shape(node.join_type);
        let (output_schema, output_sources) = match shape {
            OutputShape::Pair => {
                let schema = concat_schemas(
                    Arc::clone(&node.probe_schema),
                    Arc::clone(&node.build_schema),
                );
                let mut sources = vec![ColumnSource::Probe; node.probe_schema.fields().len()];
                sources.extend(vec![ColumnSource::Build; node.build_schema.fields().len()]);
                (schema, sources)
            }
            OutputShape::ProbeOnly => {
                let mut fields = node.probe_schema.fields().to_vec();
                if node.is_mark_join {
                    let slot = node.mark_slot_id.expect("mark slot id");
                    fields.push(Arc::new(field_with_slot_id(
                        Field::new("mark", DataType::Boolean, true),
                        slot,
                    )));
                }
                let schema = Arc::new(Schema::new(fields));
                let sources = vec![ColumnSource::Probe; schema.fields().len()];
                (schema, sources)
            }
            OutputShape::BuildOnly => {
                let schema = Arc::clone(&node.build_schema);
                let sources = vec![ColumnSource::Build; schema.fields().len()];
                (schema, sources)
            }
        };

        let mut filter_conjuncts = node.other_conjuncts.clone();
        if node.is_mark_join {
            filter_conjuncts.extend(node.mark_conjuncts.iter().copied());
        }

        // Eager columns: everything a conjunct reads, plus the slots the plan
        // pinned as not-lazy. The rest of the output is deferred until row
        // survival is known.
        let mut referenced: Vec<SlotId> = Vec::new();
        for conjunct in &filter_conjuncts {
            arena.referenced_slots(*conjunct, &mut referenced);
        }
        let probe_slots = schema_slots(&node.probe_schema)?;
        let build_slots = schema_slots(&node.build_schema)?;
        for slot in &referenced {
            if !probe_slots.contains(slot) && !build_slots.contains(slot) {
                return Err(format!(
                    "join conjunct references unknown slot id {}",
                    slot
                ));
            }
        }
        let mut eager: HashSet<SlotId> = referenced.into_iter().collect();
        eager.extend(node.not_lazy_materialized_slots.iter().copied());

        let mut eager_fields = Vec::new();
        let mut eager_sources = Vec::new();
        let mut lazy_slots = Vec::new();
        for field in node.probe_schema.fields() {
            let slot = field_slot_id(field.as_ref())?
                .ok_or_else(|| "probe schema field missing slot id".to_string())?;
            if eager.contains(&slot) {
                eager_fields.push(Arc::clone(field));
                eager_sources.push(ColumnSource::Probe);
            } else {
                lazy_slots.push(slot);
            }
        }
        for field in node.build_schema.fields() {
            let slot = field_slot_id(field.as_ref())?
                .ok_or_else(|| "build schema field missing slot id".to_string())?;
            if eager.contains(&slot) {
                eager_fields.push(Arc::clone(field));
                eager_sources.push(ColumnSource::Build);
            } else {
                lazy_slots.push(slot);
            }
        }
        let eager_schema = Arc::new(Schema::new(eager_fields));

        Ok(Self {
            arena,
            join_type: node.join_type,
            is_mark_join: node.is_mark_join,
            probe_keys: node.probe_keys.clone(),
            other_conjuncts: node.other_conjuncts.clone(),
            mark_conjuncts: node.mark_conjuncts.clone(),
            filter_conjuncts,
            output_schema,
            output_sources,
            eager_schema,
            eager_sources,
            lazy_slots,
        })
    }

    pub(crate) fn has_filter_conjuncts(&self) -> bool {
        !self.filter_conjuncts.is_empty()
    }
}

fn schema_slots(schema: &SchemaRef) -> Result<HashSet<SlotId>, String> {
    let mut slots = HashSet::new();
    for field in schema.fields() {
        if let Some(slot) = field_slot_id(field.as_ref())? {
            slots.insert(slot);
        }
    }
    Ok(slots)
}

/// Factory for hash-join probe operators; doubles as the operator descriptor
/// carrying the plan-level decision methods.
pub struct HashJoinProbeFactory {
    name: String,
    node_id: i32,
    distribution_mode: JoinDistributionMode,
    partition_exprs: Vec<ExprId>,
    ctx: Arc<ProbeContext>,
    state: Arc<JoinSharedState>,
}

impl HashJoinProbeFactory {
    pub fn new(
        arena: Arc<ExprArena>,
        node: &HashJoinNode,
        state: Arc<JoinSharedState>,
    ) -> Result<Self, ExecError> {
        let ctx = ProbeContext::new(arena, node).map_err(ExecError::BuildState)?;
        Ok(Self {
            name: format!("HASH_JOIN (id={})", node.node_id),
            node_id: node.node_id,
            distribution_mode: node.distribution_mode,
            partition_exprs: node.partition_exprs.clone(),
            ctx: Arc::new(ctx),
            state,
        })
    }

    pub fn node_id(&self) -> i32 {
        self.node_id
    }

    pub fn join_type(&self) -> JoinType {
        self.ctx.join_type
    }

    pub fn output_schema(&self) -> SchemaRef {
        Arc::clone(&self.ctx.output_schema)
    }

    /// Pure decision table over the configured join type and distribution mode.
    pub fn required_data_distribution(&self) -> DataDistribution {
        if self.ctx.join_type == JoinType::NullAwareLeftAnti {
            // Null-aware anti join needs a global view of build-side nulls;
            // pre-partitioning the build side would lose it.
            return DataDistribution::keyless(ExchangeKind::Noop);
        }
        if self.is_broadcast_join() {
            DataDistribution::keyless(ExchangeKind::Passthrough)
        } else if matches!(
            self.distribution_mode,
            JoinDistributionMode::BucketShuffle | JoinDistributionMode::Colocate
        ) {
            DataDistribution::new(ExchangeKind::BucketHashShuffle, self.partition_exprs.clone())
        } else {
            DataDistribution::new(ExchangeKind::HashShuffle, self.partition_exprs.clone())
        }
    }

    pub fn is_broadcast_join(&self) -> bool {
        self.distribution_mode == JoinDistributionMode::Broadcast
    }

    pub fn is_shuffled_operator(&self) -> bool {
        self.distribution_mode == JoinDistributionMode::Partitioned
    }

    pub fn require_data_distribution(&self) -> bool {
        self.distribution_mode != JoinDistributionMode::Broadcast
            && self.distribution_mode != JoinDistributionMode::None
    }

    /// Lazy materialization is only sound when a filter pass exists to defer
    /// work across; with unconditional emission there is nothing to skip.
    pub fn can_do_lazy_materialized(&self) -> bool {
        !self.ctx.other_conjuncts.is_empty() || self.ctx.is_mark_join
    }

    pub fn is_lazy_materialized_slot(&self, slot: SlotId) -> bool {
        self.can_do_lazy_materialized() && self.ctx.lazy_slots.contains(&slot)
    }

    pub fn debug_string(&self, indentation_level: usize) -> String {
        let indent = "  ".repeat(indentation_level);
        format!(
            "{}HASH_JOIN (id={} join_type={} distribution={} probe_keys={} other_conjuncts={} mark_join={} lazy_columns={})",
            indent,
            self.node_id,
            join_type_str(self.ctx.join_type),
            distribution_mode_str(self.distribution_mode),
            self.ctx.probe_keys.len(),
            self.ctx.other_conjuncts.len(),
            self.ctx.is_mark_join,
            self.ctx.lazy_slots.len()
        )
    }
}

impl OperatorFactory for HashJoinProbeFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, _dop: i32, driver_id: i32) -> Box<dyn Operator> {
        debug!(
            "HashJoinProbe create: node_id={} driver_id={} join_type={} distribution={} probe_keys={}",
            self.node_id,
            driver_id,
            join_type_str(self.ctx.join_type),
            distribution_mode_str(self.distribution_mode),
            self.ctx.probe_keys.len()
        );
        Box::new(HashJoinProbeOperator {
            name: self.name.clone(),
            node_id: self.node_id,
            driver_id,
            distribution_mode: self.distribution_mode,
            ctx: Arc::clone(&self.ctx),
            state: Arc::clone(&self.state),
            matcher: ProbeMatcher::new(self.ctx.join_type),
            build: None,
            build_matched: None,
            probe: None,
            input_eos: false,
            flush_pos: 0,
            flush_done: false,
            eos: false,
            profiles: None,
            profile_initialized: false,
            stats_logged: false,
            input_rows: 0,
            input_chunks: 0,
            output_rows: 0,
            lookup_hit_rows: 0,
            lookup_miss_rows: 0,
        })
    }
}

/// Per-lane probe operator. Exclusively owned by one pipeline task; the only
/// shared data it touches is the frozen build artifact.
pub struct HashJoinProbeOperator {
    name: String,
    node_id: i32,
    driver_id: i32,
    distribution_mode: JoinDistributionMode,
    ctx: Arc<ProbeContext>,
    state: Arc<JoinSharedState>,
    matcher: ProbeMatcher,
    build: Option<Arc<JoinBuildArtifact>>,
    /// Lane-local matched flags over the build rows (right/full joins).
    build_matched: Option<Vec<bool>>,
    probe: Option<PreparedProbeBatch>,
    input_eos: bool,
    flush_pos: usize,
    flush_done: bool,
    eos: bool,
    profiles: Option<OperatorProfiles>,
    profile_initialized: bool,
    stats_logged: bool,
    input_rows: u64,
    input_chunks: u64,
    output_rows: u64,
    lookup_hit_rows: u64,
    lookup_miss_rows: u64,
}

impl Operator for HashJoinProbeOperator {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_profiles(&mut self, profiles: OperatorProfiles) {
        self.profiles = Some(profiles);
    }

    fn prepare(&mut self) -> Result<(), ExecError> {
        // The build artifact may not be published yet; the scheduler waits on
        // `precondition_dependency` before feeding input.
        if self.build.is_none() {
            if let Some(artifact) = self.state.get_build() {
                self.attach_build(artifact);
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), ExecError> {
        self.log_stats_once();
        // Release the shared build-side reference; the artifact is dropped
        // once every lane has closed.
        self.build = None;
        self.build_matched = None;
        self.probe = None;
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.eos
    }

    fn as_processor_mut(&mut self) -> Option<&mut dyn ProcessorOperator> {
        Some(self)
    }

    fn as_processor_ref(&self) -> Option<&dyn ProcessorOperator> {
        Some(self)
    }
}

impl ProcessorOperator for HashJoinProbeOperator {
    fn need_more_input_data(&self) -> bool {
        if self.eos || self.input_eos {
            return false;
        }
        self.probe
            .as_ref()
            .map(|p| p.is_exhausted())
            .unwrap_or(true)
    }

    fn has_output(&self) -> bool {
        if self.eos {
            return false;
        }
        if let Some(probe) = self.probe.as_ref() {
            if !probe.is_exhausted() {
                return true;
            }
        }
        // Probe side drained: output remains only for the flush/eos transition.
        self.input_eos
    }

    fn push(
        &mut self,
        _state: &RuntimeState,
        chunk: Chunk,
        end_of_input: bool,
    ) -> Result<(), ExecError> {
        if self.eos {
            return Err(ExecError::internal(
                "join probe received input after end of stream",
            ));
        }
        if self.input_eos {
            return Err(ExecError::internal(
                "join probe received input after end_of_input",
            ));
        }
        if let Some(probe) = self.probe.as_ref() {
            if !probe.is_exhausted() {
                return Err(ExecError::internal(
                    "join probe received input while current batch is undrained",
                ));
            }
        }
        self.init_profile_if_needed();
        self.load_build_side()?;
        self.input_eos = end_of_input;

        if chunk.is_empty() {
            self.probe = None;
            return Ok(());
        }
        self.input_rows += chunk.len() as u64;
        self.input_chunks += 1;

        let mut key_arrays = Vec::with_capacity(self.ctx.probe_keys.len());
        for expr in &self.ctx.probe_keys {
            let array = self
                .ctx
                .arena
                .eval(*expr, &chunk)
                .map_err(ExecError::Eval)?;
            key_arrays.push(array);
        }
        let build = self
            .build
            .as_ref()
            .ok_or_else(|| ExecError::build_state("join build not loaded"))?;
        // prepare_for_next: reset cursor and per-row bookkeeping for the new batch.
        let prepared = PreparedProbeBatch::prepare(
            chunk,
            &key_arrays,
            build.build_table(),
            self.matcher.tracks_probe_state(self.ctx.is_mark_join),
            self.ctx.is_mark_join,
        )
        .map_err(ExecError::BuildState)?;
        let hits = prepared.matched_groups() as u64;
        self.lookup_hit_rows += hits;
        self.lookup_miss_rows += prepared.len() as u64 - hits;
        self.probe = Some(prepared);
        Ok(())
    }

    fn pull(
        &mut self,
        state: &RuntimeState,
        end_of_stream: &mut bool,
    ) -> Result<Option<Chunk>, ExecError> {
        if self.eos {
            *end_of_stream = true;
            return Ok(None);
        }
        self.filter_data_and_build_output(state, end_of_stream, true)
    }

    fn precondition_dependency(&self) -> Option<DependencyHandle> {
        if self.build.is_some() || self.state.has_build() {
            None
        } else {
            Some(self.state.dep())
        }
    }
}

impl HashJoinProbeOperator {
    /// The central routine: repeatedly produce candidate pairs through the
    /// matcher, filter them, materialize survivors, and append to the output
    /// until the row budget is reached or the probe batch is exhausted.
    /// Leaves the cursor positioned so the next call resumes exactly here.
    fn filter_data_and_build_output(
        &mut self,
        state: &RuntimeState,
        end_of_stream: &mut bool,
        check_row_budget: bool,
    ) -> Result<Option<Chunk>, ExecError> {
        let budget = if check_row_budget {
            state.chunk_size()
        } else {
            usize::MAX
        };
        let mut outs: Vec<Chunk> = Vec::new();
        let mut out_rows = 0usize;

        loop {
            if out_rows >= budget {
                break;
            }
            let probe_active = self
                .probe
                .as_ref()
                .map(|p| !p.is_exhausted())
                .unwrap_or(false);
            if probe_active {
                if let Some(chunk) = self.process_round(budget - out_rows)? {
                    out_rows += chunk.len();
                    self.output_rows += chunk.len() as u64;
                    if !chunk.is_empty() {
                        outs.push(chunk);
                    }
                }
                continue;
            }

            // Current probe batch fully consumed.
            self.probe = None;
            if !self.input_eos {
                break;
            }
            if !self.flush_done {
                if let Some(chunk) = self.flush_round(budget - out_rows)? {
                    out_rows += chunk.len();
                    self.output_rows += chunk.len() as u64;
                    outs.push(chunk);
                }
                if self.flush_done {
                    continue;
                }
                // Budget exhausted mid-flush; resume on the next pull.
                break;
            }
            self.eos = true;
            *end_of_stream = true;
            self.log_stats_once();
            break;
        }

        if outs.is_empty() {
            return Ok(None);
        }
        if outs.len() == 1 {
            return Ok(Some(outs.remove(0)));
        }
        let batches = outs.iter().map(|c| c.batch.clone()).collect::<Vec<_>>();
        let batch = concat_batches(&self.ctx.output_schema, &batches)
            .map_err(|e| ExecError::resource_exhausted(e.to_string()))?;
        Chunk::try_new(batch)
            .map(Some)
            .map_err(ExecError::Internal)
    }

    /// One generate → filter → reconcile → materialize round.
    fn process_round(&mut self, budget: usize) -> Result<Option<Chunk>, ExecError> {
        let build = Arc::clone(
            self.build
                .as_ref()
                .ok_or_else(|| ExecError::build_state("join build not loaded"))?,
        );
        let probe = self
            .probe
            .as_mut()
            .ok_or_else(|| ExecError::internal("join probe batch missing"))?;
        let needs_pairs = self
            .matcher
            .needs_pairs(self.ctx.has_filter_conjuncts());

        let cand = self
            .matcher
            .generate(probe, build.build_table(), budget, needs_pairs)
            .map_err(ExecError::Internal)?;
        if cand.is_empty() {
            return Ok(None);
        }

        // Candidate filter pass over eagerly-materialized columns only.
        let mask = if self.ctx.has_filter_conjuncts() && !cand.probe_indices.is_empty() {
            let probe_idx: Vec<Option<u32>> =
                cand.probe_indices.iter().map(|v| Some(*v)).collect();
            let build_idx: Vec<Option<u32>> = cand.build_rows.iter().map(|v| Some(*v)).collect();
            let cand_chunk = build_pair_chunk(
                &self.ctx.eager_schema,
                &self.ctx.eager_sources,
                Some(&probe.chunk),
                Some(build.build_chunk()),
                &probe_idx,
                &build_idx,
            )
            .map_err(ExecError::Internal)?;
            eval_conjuncts(&self.ctx.arena, &self.ctx.filter_conjuncts, &cand_chunk)
                .map_err(ExecError::Eval)?
        } else {
            vec![Some(true); cand.probe_indices.len()]
        };

        let emission = self
            .matcher
            .reconcile(
                probe,
                &cand,
                &mask,
                self.ctx.is_mark_join,
                self.build_matched.as_mut(),
                build.build_has_null_key(),
                build.build_row_count(),
            )
            .map_err(ExecError::Internal)?;

        self.materialize_emission(&emission, Some(&build))
    }

    /// Survivor materialization against the full output schema; lazy columns
    /// are first gathered here, after the filter pass decided row survival.
    fn materialize_emission(
        &mut self,
        emission: &RoundEmission,
        build: Option<&Arc<JoinBuildArtifact>>,
    ) -> Result<Option<Chunk>, ExecError> {
        match output_shape(self.ctx.join_type) {
            OutputShape::Pair => {
                if emission.probe_indices.is_empty() {
                    return Ok(None);
                }
                let probe = self.probe.as_ref().map(|p| &p.chunk);
                let build_chunk = build.map(|b| b.build_chunk());
                build_pair_chunk(
                    &self.ctx.output_schema,
                    &self.ctx.output_sources,
                    probe,
                    build_chunk,
                    &emission.probe_indices,
                    &emission.build_indices,
                )
                .map(Some)
                .map_err(ExecError::Internal)
            }
            OutputShape::ProbeOnly => {
                if emission.probe_rows.is_empty() {
                    return Ok(None);
                }
                let probe = self
                    .probe
                    .as_ref()
                    .ok_or_else(|| ExecError::internal("join probe batch missing"))?;
                let marks = if self.ctx.is_mark_join {
                    Some(emission.marks.as_slice())
                } else {
                    None
                };
                build_probe_only_chunk(
                    &self.ctx.output_schema,
                    &probe.chunk,
                    &emission.probe_rows,
                    marks,
                )
                .map(Some)
                .map_err(ExecError::Internal)
            }
            OutputShape::BuildOnly => {
                if emission.build_rows.is_empty() {
                    return Ok(None);
                }
                let build = build.ok_or_else(|| ExecError::build_state("join build missing"))?;
                build_build_only_chunk(
                    &self.ctx.output_schema,
                    build.build_chunk(),
                    &emission.build_rows,
                )
                .map(Some)
                .map_err(ExecError::Internal)
            }
        }
    }

    /// Deferred build-side pass after the probe side is fully consumed:
    /// unmatched build rows for right/full outer and right anti joins.
    /// Budget-bounded; resumes from `flush_pos` across pulls.
    fn flush_round(&mut self, budget: usize) -> Result<Option<Chunk>, ExecError> {
        let Some(build) = self.build.as_ref().map(Arc::clone) else {
            // No input was ever pushed; nothing to flush.
            self.flush_done = true;
            return Ok(None);
        };
        let budget = budget.max(1);
        let total = build.build_row_count();

        match self.ctx.join_type {
            JoinType::RightOuter | JoinType::FullOuter => {
                let flags = self
                    .build_matched
                    .as_ref()
                    .ok_or_else(|| ExecError::internal("join build matched flags missing"))?;
                let mut rows = Vec::new();
                while self.flush_pos < total && rows.len() < budget {
                    if !flags[self.flush_pos] {
                        rows.push(self.flush_pos as u32);
                    }
                    self.flush_pos += 1;
                }
                if self.flush_pos >= total {
                    self.flush_done = true;
                }
                if rows.is_empty() {
                    return Ok(None);
                }
                let build_indices: Vec<Option<u32>> = rows.iter().map(|r| Some(*r)).collect();
                let probe_indices: Vec<Option<u32>> = vec![None; rows.len()];
                build_pair_chunk(
                    &self.ctx.output_schema,
                    &self.ctx.output_sources,
                    None,
                    Some(build.build_chunk()),
                    &probe_indices,
                    &build_indices,
                )
                .map(Some)
                .map_err(ExecError::Internal)
            }
            JoinType::RightAnti => {
                let flags = self
                    .build_matched
                    .as_ref()
                    .ok_or_else(|| ExecError::internal("join build matched flags missing"))?;
                let mut rows = Vec::new();
                while self.flush_pos < total && rows.len() < budget {
                    if !flags[self.flush_pos] {
                        rows.push(self.flush_pos as u32);
                    }
                    self.flush_pos += 1;
                }
                if self.flush_pos >= total {
                    self.flush_done = true;
                }
                if rows.is_empty() {
                    return Ok(None);
                }
                build_build_only_chunk(&self.ctx.output_schema, build.build_chunk(), &rows)
                    .map(Some)
                    .map_err(ExecError::Internal)
            }
            _ => {
                self.flush_done = true;
                Ok(None)
            }
        }
    }

    fn load_build_side(&mut self) -> Result<(), ExecError> {
        if self.build.is_some() {
            return Ok(());
        }
        let Some(artifact) = self.state.get_build() else {
            return Err(ExecError::build_state("join build not ready"));
        };
        self.attach_build(artifact);
        Ok(())
    }

    fn attach_build(&mut self, artifact: Arc<JoinBuildArtifact>) {
        if self.ctx.join_type.tracks_build_matches() {
            self.build_matched = Some(vec![false; artifact.build_row_count()]);
        }
        self.build = Some(artifact);
    }

    fn init_profile_if_needed(&mut self) {
        if self.profile_initialized {
            return;
        }
        self.profile_initialized = true;
        if let Some(profiles) = self.profiles.as_ref() {
            profiles
                .common
                .add_info_string("JoinType", join_type_str(self.ctx.join_type));
            profiles
                .common
                .add_info_string("DistributionMode", distribution_mode_str(self.distribution_mode));
        }
    }

    fn log_stats_once(&mut self) {
        if self.stats_logged {
            return;
        }
        self.stats_logged = true;
        if let Some(profiles) = self.profiles.as_ref() {
            profiles
                .unique
                .counter_set("ProbeRows", CounterUnit::Rows, self.input_rows as i64);
            profiles
                .unique
                .counter_set("OutputRows", CounterUnit::Rows, self.output_rows as i64);
            profiles.unique.counter_set(
                "ProbeMatchedRows",
                CounterUnit::Rows,
                self.lookup_hit_rows as i64,
            );
        }
        debug!(
            "HashJoinProbe finished: dep_key={} node_id={} driver_id={} join_type={} input_rows={} input_chunks={} output_rows={} lookup_hit_rows={} lookup_miss_rows={}",
            self.state.dep_name(),
            self.node_id,
            self.driver_id,
            join_type_str(self.ctx.join_type),
            self.input_rows,
            self.input_chunks,
            self.output_rows,
            self.lookup_hit_rows,
            self.lookup_miss_rows
        );
    }
}
