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
//! Hash-join build sink for materializing build-side hash structures.
//!
//! Responsibilities:
//! - Consumes build-side chunks and inserts keys/rows into the join hash table.
//! - Publishes the frozen artifact to shared state once build input is exhausted.
//!
//! Key exported interfaces:
//! - Types: `HashJoinBuildSinkFactory`.

use std::sync::Arc;

use arrow::compute::concat_batches;
use arrow::record_batch::RecordBatch;

use super::build_artifact::JoinBuildArtifact;
use super::join_hash_table::JoinHashTable;
use super::join_shared_state::JoinSharedState;
use crate::basalt_logging::debug;
use crate::common::error::ExecError;
use crate::exec::chunk::Chunk;
use crate::exec::expr::{ExprArena, ExprId};
use crate::exec::pipeline::operator::{Operator, ProcessorOperator};
use crate::exec::pipeline::operator_factory::OperatorFactory;
use crate::runtime::mem_tracker::MemTracker;
use crate::runtime::runtime_state::RuntimeState;
use arrow::datatypes::{DataType, SchemaRef};

/// Factory for hash-join build sinks that construct build-side hash structures.
pub struct HashJoinBuildSinkFactory {
    name: String,
    node_id: i32,
    arena: Arc<ExprArena>,
    build_keys: Vec<ExprId>,
    key_types: Vec<DataType>,
    eq_null_safe: Vec<bool>,
    build_schema: SchemaRef,
    state: Arc<JoinSharedState>,
}

impl HashJoinBuildSinkFactory {
    pub fn new(
        arena: Arc<ExprArena>,
        node_id: i32,
        build_keys: Vec<ExprId>,
        key_types: Vec<DataType>,
        eq_null_safe: Vec<bool>,
        build_schema: SchemaRef,
        state: Arc<JoinSharedState>,
    ) -> Self {
        Self {
            name: format!("HASH_JOIN_BUILD (id={})", node_id),
            node_id,
            arena,
            build_keys,
            key_types,
            eq_null_safe,
            build_schema,
            state,
        }
    }
}

impl OperatorFactory for HashJoinBuildSinkFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, _dop: i32, driver_id: i32) -> Box<dyn Operator> {
        debug!(
            "HashJoinBuildSink create: node_id={} driver_id={} build_keys={} null_safe_keys={}",
            self.node_id,
            driver_id,
            self.build_keys.len(),
            self.eq_null_safe.iter().filter(|v| **v).count()
        );
        Box::new(HashJoinBuildSinkOperator {
            name: self.name.clone(),
            node_id: self.node_id,
            driver_id,
            arena: Arc::clone(&self.arena),
            build_keys: self.build_keys.clone(),
            key_types: self.key_types.clone(),
            eq_null_safe: self.eq_null_safe.clone(),
            build_schema: Arc::clone(&self.build_schema),
            state: Arc::clone(&self.state),
            table: None,
            chunks: Vec::new(),
            row_count: 0,
            mem_tracker: None,
            finished: false,
        })
    }

    fn is_sink(&self) -> bool {
        true
    }
}

struct HashJoinBuildSinkOperator {
    name: String,
    node_id: i32,
    driver_id: i32,
    arena: Arc<ExprArena>,
    build_keys: Vec<ExprId>,
    key_types: Vec<DataType>,
    eq_null_safe: Vec<bool>,
    build_schema: SchemaRef,
    state: Arc<JoinSharedState>,
    table: Option<JoinHashTable>,
    chunks: Vec<Chunk>,
    row_count: usize,
    mem_tracker: Option<Arc<MemTracker>>,
    finished: bool,
}

impl Operator for HashJoinBuildSinkOperator {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_mem_tracker(&mut self, tracker: Arc<MemTracker>) {
        if let Some(table) = self.table.as_mut() {
            table.set_mem_tracker(Arc::clone(&tracker));
        }
        self.mem_tracker = Some(tracker);
    }

    fn prepare(&mut self) -> Result<(), ExecError> {
        if self.table.is_some() {
            return Ok(());
        }
        let mut table = JoinHashTable::new(self.key_types.clone(), self.eq_null_safe.clone())
            .map_err(ExecError::BuildState)?;
        if let Some(tracker) = self.mem_tracker.as_ref() {
            table.set_mem_tracker(MemTracker::new_child("JoinHashTable", tracker));
        }
        self.table = Some(table);
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn as_processor_mut(&mut self) -> Option<&mut dyn ProcessorOperator> {
        Some(self)
    }

    fn as_processor_ref(&self) -> Option<&dyn ProcessorOperator> {
        Some(self)
    }
}

impl ProcessorOperator for HashJoinBuildSinkOperator {
    fn need_more_input_data(&self) -> bool {
        !self.finished
    }

    fn has_output(&self) -> bool {
        false
    }

    fn push(
        &mut self,
        _state: &RuntimeState,
        chunk: Chunk,
        end_of_input: bool,
    ) -> Result<(), ExecError> {
        if self.finished {
            return Err(ExecError::internal(
                "join build sink received input after finish",
            ));
        }
        if self.table.is_none() {
            self.prepare()?;
        }

        if !chunk.is_empty() {
            let mut key_arrays = Vec::with_capacity(self.build_keys.len());
            for expr in &self.build_keys {
                let array = self.arena.eval(*expr, &chunk).map_err(ExecError::Eval)?;
                key_arrays.push(array);
            }
            let table = self.table.as_mut().expect("join build table");
            let base_row_id = u32::try_from(self.row_count)
                .map_err(|_| ExecError::resource_exhausted("join build row count overflow"))?;
            table
                .add_build_batch(&key_arrays, chunk.len(), base_row_id)
                .map_err(ExecError::BuildState)?;
            self.row_count += chunk.len();
            self.chunks.push(chunk);
        }

        if end_of_input {
            self.finish()?;
        }
        Ok(())
    }

    fn pull(
        &mut self,
        _state: &RuntimeState,
        end_of_stream: &mut bool,
    ) -> Result<Option<Chunk>, ExecError> {
        // A build sink produces no output stream; it terminates with its input.
        *end_of_stream = self.finished;
        Ok(None)
    }
}

impl HashJoinBuildSinkOperator {
    fn finish(&mut self) -> Result<(), ExecError> {
        let mut table = self
            .table
            .take()
            .ok_or_else(|| ExecError::build_state("join build table missing at finish"))?;
        table.finalize_groups().map_err(ExecError::BuildState)?;

        let batches = self
            .chunks
            .drain(..)
            .map(|c| c.batch)
            .collect::<Vec<RecordBatch>>();
        let batch = if batches.is_empty() {
            RecordBatch::new_empty(Arc::clone(&self.build_schema))
        } else {
            concat_batches(&self.build_schema, &batches)
                .map_err(|e| ExecError::resource_exhausted(e.to_string()))?
        };
        let mut build_chunk = Chunk::try_new(batch).map_err(ExecError::BuildState)?;
        if let Some(tracker) = self.mem_tracker.as_ref() {
            build_chunk.transfer_to(tracker);
        }

        let artifact = JoinBuildArtifact::new(build_chunk, table).map_err(ExecError::BuildState)?;
        debug!(
            "HashJoinBuildSink finished: dep_key={} node_id={} driver_id={} build_rows={} has_null_key={} groups={}",
            self.state.dep_name(),
            self.node_id,
            self.driver_id,
            artifact.build_row_count(),
            artifact.build_has_null_key(),
            artifact.build_table().group_count()
        );
        self.state
            .set_build(Arc::new(artifact))
            .map_err(ExecError::BuildState)?;
        self.finished = true;
        Ok(())
    }
}
