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
use std::sync::Arc;
use std::sync::Mutex;

use crate::common::config;
use crate::runtime::mem_tracker::MemTracker;

/// RuntimeState is a per-fragment-instance execution context.
///
/// It provides the frequently used query options (`chunk_size`, the per-pull
/// output row budget) and a shared error slot that records the first failure
/// observed by any operator of the instance.
#[derive(Debug)]
pub struct RuntimeState {
    chunk_size: Option<usize>,
    error_state: Arc<RuntimeErrorState>,
    mem_tracker: Option<Arc<MemTracker>>,
}

#[derive(Debug, Default)]
pub struct RuntimeErrorState {
    error: Mutex<Option<String>>,
}

impl RuntimeErrorState {
    pub fn set_error(&self, err: String) {
        let mut guard = self.error.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            *guard = Some(err);
        }
    }

    pub fn error(&self) -> Option<String> {
        self.error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self {
            chunk_size: None,
            error_state: Arc::new(RuntimeErrorState::default()),
            mem_tracker: None,
        }
    }
}

impl RuntimeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the per-pull output row budget for this instance.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: Some(chunk_size.max(1)),
            ..Self::default()
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size.unwrap_or_else(config::chunk_size).max(1)
    }

    pub fn error_state(&self) -> &Arc<RuntimeErrorState> {
        &self.error_state
    }

    pub fn set_mem_tracker(&mut self, tracker: Arc<MemTracker>) {
        self.mem_tracker = Some(tracker);
    }

    pub fn mem_tracker(&self) -> Option<&Arc<MemTracker>> {
        self.mem_tracker.as_ref()
    }
}
