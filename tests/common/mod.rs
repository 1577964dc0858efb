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
//! Shared helpers for hash-join integration tests.

use std::collections::HashSet;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Int64Array};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;

use basalt::SlotId;
use basalt::exec::chunk::{Chunk, field_with_slot_id};
use basalt::exec::expr::{ExprArena, ExprId, ExprNode};
use basalt::exec::node::join::{HashJoinNode, JoinDistributionMode, JoinType};
use basalt::exec::operators::hashjoin::{
    HashJoinBuildSinkFactory, HashJoinProbeFactory, JoinSharedState,
};
use basalt::exec::pipeline::dependency::DependencyManager;
use basalt::exec::pipeline::operator::{Operator, ProcessorOperator};
use basalt::exec::pipeline::operator_factory::OperatorFactory;
use basalt::runtime::runtime_state::RuntimeState;

/// Probe side: key slot 1 ("pk"), payload slot 2 ("pv").
pub const PROBE_KEY: SlotId = SlotId::new(1);
pub const PROBE_VALUE: SlotId = SlotId::new(2);
/// Build side: key slot 11 ("bk"), payload slot 12 ("bv").
pub const BUILD_KEY: SlotId = SlotId::new(11);
pub const BUILD_VALUE: SlotId = SlotId::new(12);
/// Mark output slot for mark joins.
pub const MARK_SLOT: SlotId = SlotId::new(99);

pub fn probe_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        field_with_slot_id(Field::new("pk", DataType::Int64, true), PROBE_KEY),
        field_with_slot_id(Field::new("pv", DataType::Int64, true), PROBE_VALUE),
    ]))
}

pub fn build_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        field_with_slot_id(Field::new("bk", DataType::Int64, true), BUILD_KEY),
        field_with_slot_id(Field::new("bv", DataType::Int64, true), BUILD_VALUE),
    ]))
}

pub fn chunk_of(schema: &SchemaRef, keys: Vec<Option<i64>>, values: Vec<Option<i64>>) -> Chunk {
    let keys = Arc::new(Int64Array::from(keys)) as ArrayRef;
    let values = Arc::new(Int64Array::from(values)) as ArrayRef;
    let batch = RecordBatch::try_new(Arc::clone(schema), vec![keys, values]).expect("record batch");
    Chunk::new(batch)
}

/// Plan fixture: expression arena plus the slot-ref expression ids the join
/// configuration points at.
pub struct JoinFixture {
    pub arena: ExprArena,
    pub probe_key_expr: ExprId,
    pub build_key_expr: ExprId,
}

impl JoinFixture {
    pub fn new() -> Self {
        let mut arena = ExprArena::default();
        let probe_key_expr = arena.push_typed(ExprNode::SlotId(PROBE_KEY), DataType::Int64);
        let build_key_expr = arena.push_typed(ExprNode::SlotId(BUILD_KEY), DataType::Int64);
        Self {
            arena,
            probe_key_expr,
            build_key_expr,
        }
    }

    /// `bv > threshold` as an other-join conjunct.
    pub fn build_value_gt(&mut self, threshold: i64) -> ExprId {
        let col = self
            .arena
            .push_typed(ExprNode::SlotId(BUILD_VALUE), DataType::Int64);
        let lit = self
            .arena
            .push_typed(ExprNode::Literal(basalt::exec::expr::LiteralValue::Int64(threshold)), DataType::Int64);
        self.arena.push_typed(ExprNode::Gt(col, lit), DataType::Boolean)
    }

    /// `pv < bv` as an other-join conjunct.
    pub fn probe_value_lt_build_value(&mut self) -> ExprId {
        let pv = self
            .arena
            .push_typed(ExprNode::SlotId(PROBE_VALUE), DataType::Int64);
        let bv = self
            .arena
            .push_typed(ExprNode::SlotId(BUILD_VALUE), DataType::Int64);
        self.arena.push_typed(ExprNode::Lt(pv, bv), DataType::Boolean)
    }

    pub fn node(&self, join_type: JoinType) -> HashJoinNode {
        HashJoinNode {
            node_id: 1,
            join_type,
            distribution_mode: JoinDistributionMode::Broadcast,
            probe_schema: probe_schema(),
            build_schema: build_schema(),
            probe_keys: vec![self.probe_key_expr],
            eq_null_safe: vec![false],
            other_conjuncts: Vec::new(),
            mark_conjuncts: Vec::new(),
            is_mark_join: false,
            mark_slot_id: None,
            partition_exprs: vec![self.probe_key_expr],
            not_lazy_materialized_slots: HashSet::new(),
        }
    }

    pub fn mark_node(&self, join_type: JoinType) -> HashJoinNode {
        let mut node = self.node(join_type);
        node.is_mark_join = true;
        node.mark_slot_id = Some(MARK_SLOT);
        node
    }
}

impl Default for JoinFixture {
    fn default() -> Self {
        Self::new()
    }
}

pub struct JoinRun {
    pub chunks: Vec<Chunk>,
    pub pulls_with_output: usize,
}

impl JoinRun {
    pub fn total_rows(&self) -> usize {
        self.chunks.iter().map(|c| c.len()).sum()
    }

    pub fn column_i64(&self, slot: SlotId) -> Vec<Option<i64>> {
        let mut out = Vec::new();
        for chunk in &self.chunks {
            let col = chunk.column_by_slot_id(slot).expect("column");
            let col = col.as_any().downcast_ref::<Int64Array>().expect("i64 column");
            for i in 0..col.len() {
                out.push(if col.is_null(i) { None } else { Some(col.value(i)) });
            }
        }
        out
    }

    pub fn column_bool(&self, slot: SlotId) -> Vec<Option<bool>> {
        let mut out = Vec::new();
        for chunk in &self.chunks {
            let col = chunk.column_by_slot_id(slot).expect("column");
            let col = col
                .as_any()
                .downcast_ref::<BooleanArray>()
                .expect("bool column");
            for i in 0..col.len() {
                out.push(if col.is_null(i) { None } else { Some(col.value(i)) });
            }
        }
        out
    }
}

/// Run a full build + probe cycle: feed the build sink, then stream probe
/// chunks through a probe operator, draining output after every push. Also
/// asserts end-of-stream idempotence before returning.
pub fn run_join(
    fixture: &JoinFixture,
    node: &HashJoinNode,
    build_chunks: Vec<Chunk>,
    probe_chunks: Vec<Chunk>,
    chunk_size: usize,
) -> JoinRun {
    let arena = Arc::new(fixture.arena.clone());
    let dep_manager = DependencyManager::new();
    let shared = Arc::new(JoinSharedState::new(node.node_id, &dep_manager));
    let state = RuntimeState::with_chunk_size(chunk_size);

    // Build phase: the table is frozen before any probe begins.
    let build_factory = HashJoinBuildSinkFactory::new(
        Arc::clone(&arena),
        node.node_id,
        vec![fixture.build_key_expr],
        vec![DataType::Int64],
        node.eq_null_safe.clone(),
        build_schema(),
        Arc::clone(&shared),
    );
    let mut build_op = build_factory.create(1, 0);
    build_op.prepare().expect("build prepare");
    {
        let sink = build_op.as_processor_mut().expect("build sink processor");
        let count = build_chunks.len();
        if count == 0 {
            let empty = Chunk::try_new(RecordBatch::new_empty(build_schema())).expect("empty");
            sink.push(&state, empty, true).expect("build push");
        } else {
            for (i, chunk) in build_chunks.into_iter().enumerate() {
                sink.push(&state, chunk, i + 1 == count).expect("build push");
            }
        }
    }
    assert!(shared.has_build(), "build artifact must be published");

    // Probe phase.
    let probe_factory =
        HashJoinProbeFactory::new(Arc::clone(&arena), node, Arc::clone(&shared)).expect("factory");
    let mut probe_op = probe_factory.create(1, 0);
    probe_op.prepare().expect("probe prepare");
    let op = probe_op.as_processor_mut().expect("probe processor");
    assert!(op.precondition_dependency().is_none());

    let mut run = JoinRun {
        chunks: Vec::new(),
        pulls_with_output: 0,
    };
    let count = probe_chunks.len();
    let mut eos = false;
    let mut push_it = probe_chunks.into_iter().enumerate();
    if count == 0 {
        let empty = Chunk::try_new(RecordBatch::new_empty(probe_schema())).expect("empty");
        op.push(&state, empty, true).expect("probe push");
    }
    loop {
        if op.need_more_input_data() {
            let Some((i, chunk)) = push_it.next() else {
                if count == 0 {
                    // Already pushed the empty terminal chunk above.
                } else {
                    panic!("operator requested input after the final chunk");
                }
                break;
            };
            op.push(&state, chunk, i + 1 == count).expect("probe push");
        }
        let out = op.pull(&state, &mut eos).expect("probe pull");
        if let Some(chunk) = out {
            if chunk_size > 0 {
                assert!(
                    chunk.len() <= chunk_size * 2,
                    "output chunk far exceeds the row budget: {} rows",
                    chunk.len()
                );
            }
            run.pulls_with_output += 1;
            run.chunks.push(chunk);
        }
        if eos {
            break;
        }
    }

    // End-of-stream is idempotent: further pulls succeed with no rows.
    for _ in 0..2 {
        let mut eos_again = false;
        let out = op.pull(&state, &mut eos_again).expect("pull after eos");
        assert!(out.is_none());
        assert!(eos_again);
    }
    probe_op.close().expect("probe close");
    run
}
