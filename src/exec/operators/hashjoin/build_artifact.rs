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
//! Materialized build artifact for hash-join probing.
//!
//! Responsibilities:
//! - Packages the frozen hash table, the concatenated build chunk, and the
//!   null-presence flag for read-only shared access by probe operators.
//! - Separates build-time materialization from probe-time read access.
//!
//! Key exported interfaces:
//! - Types: `JoinBuildArtifact`.

use std::sync::Arc;

use super::join_hash_table::JoinHashTable;
use crate::exec::chunk::Chunk;

/// Frozen build-side package consumed by join probe operators.
///
/// Immutable once published; every probe lane holds an `Arc` reference for the
/// whole probing phase and releases it on close.
pub(crate) struct JoinBuildArtifact {
    build_chunk: Chunk,
    build_table: Arc<JoinHashTable>,
    build_row_count: usize,
    build_has_null_key: bool,
}

impl JoinBuildArtifact {
    pub(crate) fn new(build_chunk: Chunk, build_table: JoinHashTable) -> Result<Self, String> {
        if !build_table.is_finalized() {
            return Err("join build artifact requires a finalized hash table".to_string());
        }
        if build_table.row_count() != build_chunk.len() {
            return Err(format!(
                "join build artifact row count mismatch: table={} chunk={}",
                build_table.row_count(),
                build_chunk.len()
            ));
        }
        let build_row_count = build_chunk.len();
        let build_has_null_key = build_table.has_null_key();
        Ok(Self {
            build_chunk,
            build_table: Arc::new(build_table),
            build_row_count,
            build_has_null_key,
        })
    }

    pub(crate) fn build_chunk(&self) -> &Chunk {
        &self.build_chunk
    }

    pub(crate) fn build_table(&self) -> &JoinHashTable {
        &self.build_table
    }

    pub(crate) fn build_row_count(&self) -> usize {
        self.build_row_count
    }

    pub(crate) fn build_has_null_key(&self) -> bool {
        self.build_has_null_key
    }
}
