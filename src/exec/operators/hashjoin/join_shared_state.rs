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
//! Shared state for hash-join build/probe coordination.
//!
//! Responsibilities:
//! - Publishes one frozen build artifact to all probe lanes exactly once and
//!   signals readiness through the pipeline dependency primitive.
//! - After publication the artifact is read-only; no lock is held while
//!   probing, only during the publish/get handoff.
//!
//! Key exported interfaces:
//! - Types: `JoinSharedState`.

use std::sync::{Arc, Mutex};

use super::build_artifact::JoinBuildArtifact;
use crate::exec::pipeline::dependency::{DependencyHandle, DependencyManager};

/// Shared state that publishes one join build artifact and coordinates probe readiness.
pub struct JoinSharedState {
    dep: DependencyHandle,
    build: Mutex<Option<Arc<JoinBuildArtifact>>>,
}

impl JoinSharedState {
    pub fn new(node_id: i32, dep_manager: &DependencyManager) -> Self {
        let dep = dep_manager.get_or_create(format!("join_build:{}", node_id));
        Self {
            dep,
            build: Mutex::new(None),
        }
    }

    pub fn dep(&self) -> DependencyHandle {
        self.dep.clone()
    }

    pub fn dep_name(&self) -> &str {
        self.dep.name()
    }

    pub(crate) fn set_build(&self, artifact: Arc<JoinBuildArtifact>) -> Result<(), String> {
        let mut guard = self.build.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_some() {
            return Err("join build already set".to_string());
        }
        *guard = Some(artifact);
        drop(guard);
        self.dep.set_ready();
        Ok(())
    }

    pub(crate) fn get_build(&self) -> Option<Arc<JoinBuildArtifact>> {
        let guard = self.build.lock().unwrap_or_else(|e| e.into_inner());
        guard.clone()
    }

    pub fn has_build(&self) -> bool {
        let guard = self.build.lock().unwrap_or_else(|e| e.into_inner());
        guard.is_some()
    }
}
