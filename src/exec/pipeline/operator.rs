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
//! Core operator traits and blocking semantics.
//!
//! Responsibilities:
//! - Defines the processor execution contract the pipeline scheduler drives:
//!   push/pull with end-of-input/end-of-stream flags and blocked-reason signaling.
//! - Neither method blocks internally; when input is unavailable the operator
//!   reports `need_more_input_data()` and control returns to the scheduler.
//!
//! Key exported interfaces:
//! - Types: `BlockedReason`, `Operator`, `ProcessorOperator`.

use crate::common::error::ExecError;
use crate::exec::chunk::Chunk;
use crate::exec::pipeline::dependency::DependencyHandle;
use crate::runtime::mem_tracker::MemTracker;
use crate::runtime::profile::OperatorProfiles;
use crate::runtime::runtime_state::RuntimeState;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
/// The execution engine uses cooperative scheduling.
///
/// Operators are driven by a pipeline driver which repeatedly tries to move
/// data from upstream to downstream. When a driver cannot make progress
/// without blocking, it records a [`BlockedReason`] and yields.
pub enum BlockedReason {
    /// Upstream currently has no data available.
    InputEmpty,
    /// Downstream cannot accept more output at the moment.
    OutputFull,
    /// Blocked on a dependency object (e.g. build-side ready).
    Dependency(DependencyHandle),
}

/// Base operator contract implemented by source/processor/sink operator implementations.
pub trait Operator: Send {
    fn name(&self) -> &str;

    fn set_mem_tracker(&mut self, tracker: Arc<MemTracker>) {
        let _ = tracker;
    }

    fn set_profiles(&mut self, profiles: OperatorProfiles) {
        let _ = profiles;
    }

    fn prepare(&mut self) -> Result<(), ExecError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), ExecError> {
        Ok(())
    }

    fn is_finished(&self) -> bool {
        false
    }

    fn as_processor_mut(&mut self) -> Option<&mut dyn ProcessorOperator> {
        None
    }

    fn as_processor_ref(&self) -> Option<&dyn ProcessorOperator> {
        None
    }
}

/// Extended operator contract for processor stages with push/pull semantics.
pub trait ProcessorOperator: Operator {
    /// True exactly when the current input batch has been fully consumed and
    /// end of input has not been signaled; tells the scheduler to supply
    /// another `push`.
    fn need_more_input_data(&self) -> bool;

    fn has_output(&self) -> bool;

    /// Accept the next input chunk. `end_of_input` marks the final chunk of
    /// the stream; a push after that is a contract violation.
    fn push(
        &mut self,
        state: &RuntimeState,
        chunk: Chunk,
        end_of_input: bool,
    ) -> Result<(), ExecError>;

    /// Drain up to one output chunk. Sets `end_of_stream` once the operator
    /// has produced everything it ever will; subsequent calls keep returning
    /// `Ok(None)` with `end_of_stream` set and never an error.
    fn pull(
        &mut self,
        state: &RuntimeState,
        end_of_stream: &mut bool,
    ) -> Result<Option<Chunk>, ExecError>;

    /// Dependency that must be ready before the operator can make progress.
    /// This is used for build-side readiness.
    fn precondition_dependency(&self) -> Option<DependencyHandle> {
        None
    }
}
