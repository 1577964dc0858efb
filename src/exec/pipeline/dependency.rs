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
//! Pipeline dependency primitives.
//!
//! Responsibilities:
//! - Defines dependency handles, readiness flags, and dependency-manager
//!   bookkeeping used to publish build-side completion to probe lanes.
//! - Waiters registered before readiness fire exactly once when the
//!   dependency becomes ready; waiters registered after fire immediately.
//!
//! Key exported interfaces:
//! - Types: `DependencyHandle`, `Dependency`, `DependencyManager`.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::basalt_logging::debug;

static NEXT_DEP_MANAGER_ID: AtomicUsize = AtomicUsize::new(1);
static NEXT_DEP_ID: AtomicUsize = AtomicUsize::new(1);

/// Callback invoked when a dependency transitions to ready.
pub type Waiter = Box<dyn Fn() + Send + Sync>;

/// Reference-counted handle to one pipeline dependency object.
pub type DependencyHandle = Arc<Dependency>;

/// Dependency primitive used to model blocked/unblocked execution conditions.
pub struct Dependency {
    id: usize,
    name: String,
    ready: AtomicBool,
    waiters: Mutex<Vec<Waiter>>,
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl PartialEq for Dependency {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Dependency {}

impl Dependency {
    fn new(name: String) -> Self {
        Self {
            id: NEXT_DEP_ID.fetch_add(1, Ordering::Relaxed),
            name,
            ready: AtomicBool::new(false),
            waiters: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn set_ready(&self) {
        let prev = self.ready.swap(true, Ordering::AcqRel);
        if !prev {
            let waiters = {
                let mut guard = self.waiters.lock().unwrap_or_else(|e| e.into_inner());
                std::mem::take(&mut *guard)
            };
            if should_log_dep(&self.name) {
                debug!(
                    "Dependency ready: dep_id={} name={} waiters={}",
                    self.id,
                    self.name,
                    waiters.len()
                );
            }
            for waiter in waiters {
                waiter();
            }
        }
    }

    pub fn add_waiter(&self, waiter: Waiter) {
        if self.is_ready() {
            waiter();
            return;
        }
        {
            let mut guard = self.waiters.lock().unwrap_or_else(|e| e.into_inner());
            guard.push(waiter);
        }
        // A set_ready racing the registration above may have drained before the
        // push; re-check so the late waiter still fires.
        if self.is_ready() {
            let waiters = {
                let mut guard = self.waiters.lock().unwrap_or_else(|e| e.into_inner());
                std::mem::take(&mut *guard)
            };
            for waiter in waiters {
                waiter();
            }
        }
    }
}

#[derive(Clone)]
/// Registry managing dependency objects for one pipeline build/execution context.
pub struct DependencyManager {
    id: usize,
    deps: Arc<Mutex<HashMap<String, DependencyHandle>>>,
}

impl DependencyManager {
    pub fn new() -> Self {
        Self {
            id: NEXT_DEP_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            deps: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn get_or_create(&self, name: impl Into<String>) -> DependencyHandle {
        let name = name.into();
        let mut guard = self.deps.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .entry(name.clone())
            .or_insert_with(|| Arc::new(Dependency::new(name)))
            .clone()
    }

    pub fn mark_ready(&self, name: &str) {
        let dep = self.get_or_create(name.to_string());
        dep.set_ready();
    }
}

fn should_log_dep(name: &str) -> bool {
    name.starts_with("join_build:")
}

impl Default for DependencyManager {
    fn default() -> Self {
        Self::new()
    }
}
