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
//! Hash-table primitives for join key indexing.
//!
//! Responsibilities:
//! - Builds hash buckets and row-reference chains from build-side key arrays.
//! - Supports null-sensitive key handling and batched group-id lookup for probing.
//!
//! Key exported interfaces:
//! - Types: `JoinHashTable`.
//! - Functions: `row_has_forbidden_null`.

use std::mem;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef};
use arrow::datatypes::DataType;
use arrow::row::{RowConverter, SortField};
use hashbrown::HashMap;

use crate::runtime::mem_tracker::MemTracker;

const ROW_NONE: u32 = u32::MAX;

/// Check whether the row has null on any key that is not null-safe (`=` semantics).
/// Such a row can never equality-match and is excluded from the table and from
/// probe lookups; null-aware joins treat it as "unknown" instead.
pub(crate) fn row_has_forbidden_null(
    key_arrays: &[ArrayRef],
    row: usize,
    null_safe_eq: &[bool],
) -> bool {
    for (idx, array) in key_arrays.iter().enumerate() {
        if *null_safe_eq.get(idx).unwrap_or(&false) {
            continue;
        }
        if array.is_null(row) {
            return true;
        }
    }
    false
}

/// Hash-table container for join key buckets and build-row reference chains.
///
/// Keys are interned through the Arrow row format, so multi-column and
/// variable-width keys share one code path; byte equality of converted rows is
/// logical key equality (nulls included, which is what null-safe keys need).
/// Build rows are linked into per-group chains and frozen into contiguous
/// group slices by [`finalize_groups`](Self::finalize_groups) before probing.
pub(crate) struct JoinHashTable {
    key_types: Vec<DataType>,
    null_safe_eq: Vec<bool>,
    converter: RowConverter,
    groups: HashMap<Box<[u8]>, usize>,
    group_head: Vec<u32>,
    row_next: Vec<u32>,
    row_count: usize,
    has_null_key: bool,
    group_offsets: Option<Vec<u32>>,
    group_rows: Option<Vec<u32>>,
    mem_tracker: Option<Arc<MemTracker>>,
    accounted_bytes: i64,
}

impl JoinHashTable {
    pub(crate) fn new(key_types: Vec<DataType>, null_safe_eq: Vec<bool>) -> Result<Self, String> {
        if key_types.is_empty() {
            return Err("join hash table requires join keys".to_string());
        }
        if key_types.len() != null_safe_eq.len() {
            return Err(format!(
                "join hash table null-safe key count mismatch: key_types={} flags={}",
                key_types.len(),
                null_safe_eq.len()
            ));
        }
        let fields = key_types
            .iter()
            .map(|dt| SortField::new(dt.clone()))
            .collect::<Vec<_>>();
        let converter = RowConverter::new(fields)
            .map_err(|e| format!("join key row converter init failed: {}", e))?;
        Ok(Self {
            key_types,
            null_safe_eq,
            converter,
            groups: HashMap::new(),
            group_head: Vec::new(),
            row_next: Vec::new(),
            row_count: 0,
            has_null_key: false,
            group_offsets: None,
            group_rows: None,
            mem_tracker: None,
            accounted_bytes: 0,
        })
    }

    pub(crate) fn set_mem_tracker(&mut self, tracker: Arc<MemTracker>) {
        if let Some(current) = self.mem_tracker.as_ref() {
            if Arc::ptr_eq(current, &tracker) {
                return;
            }
            current.release(self.accounted_bytes);
        }
        let bytes = self.tracked_bytes();
        tracker.consume(bytes);
        self.mem_tracker = Some(Arc::clone(&tracker));
        self.accounted_bytes = bytes;
    }

    pub(crate) fn null_safe_eq(&self) -> &[bool] {
        &self.null_safe_eq
    }

    pub(crate) fn group_count(&self) -> usize {
        self.group_head.len()
    }

    /// Indexed build rows. Rows whose key contains a forbidden null are counted
    /// by the build sink, not here.
    pub(crate) fn row_count(&self) -> usize {
        self.row_count
    }

    /// True when any build row carried a null in a non-null-safe key position.
    pub(crate) fn has_null_key(&self) -> bool {
        self.has_null_key
    }

    /// Insert one batch of build-side key columns. Row ids are assigned
    /// sequentially in arrival order and address the concatenated build chunk.
    pub(crate) fn add_build_batch(
        &mut self,
        key_arrays: &[ArrayRef],
        num_rows: usize,
        base_row_id: u32,
    ) -> Result<(), String> {
        if self.group_offsets.is_some() || self.group_rows.is_some() {
            return Err("join hash table already finalized".to_string());
        }
        self.check_key_types(key_arrays)?;
        if num_rows == 0 {
            return Ok(());
        }
        let end_row = (base_row_id as usize)
            .checked_add(num_rows)
            .ok_or_else(|| "join build row count overflow".to_string())?;
        if end_row > u32::MAX as usize {
            return Err("join build row count overflow".to_string());
        }

        let rows = self
            .converter
            .convert_columns(key_arrays)
            .map_err(|e| format!("join key conversion failed: {}", e))?;

        if self.row_next.len() < end_row {
            self.row_next.resize(end_row, ROW_NONE);
        }
        self.row_count = self.row_count.max(end_row);

        for row in 0..num_rows {
            if row_has_forbidden_null(key_arrays, row, &self.null_safe_eq) {
                self.has_null_key = true;
                continue;
            }
            let key = rows.row(row).data();
            let next_group = self.group_head.len();
            let group_id = *self
                .groups
                .entry_ref(key)
                .or_insert(next_group);
            if group_id == next_group {
                self.group_head.push(ROW_NONE);
            }
            self.link_row(group_id, base_row_id + row as u32)?;
        }
        self.refresh_accounting();
        Ok(())
    }

    /// Freeze chains into contiguous per-group row slices. Each slice preserves
    /// build insertion order, which is the table iteration order fan-out rows
    /// are emitted in.
    pub(crate) fn finalize_groups(&mut self) -> Result<(), String> {
        if self.group_offsets.is_some() || self.group_rows.is_some() {
            return Ok(());
        }
        let group_count = self.group_head.len();
        let mut counts = vec![0u32; group_count];
        for group_id in 0..group_count {
            let mut row = self.group_head[group_id];
            while row != ROW_NONE {
                counts[group_id] = counts[group_id]
                    .checked_add(1)
                    .ok_or_else(|| "join group row count overflow".to_string())?;
                row = self.next_row(row)?;
            }
        }

        let mut offsets = Vec::with_capacity(group_count + 1);
        offsets.push(0u32);
        let mut total = 0u32;
        for count in &counts {
            total = total
                .checked_add(*count)
                .ok_or_else(|| "join group rows overflow".to_string())?;
            offsets.push(total);
        }

        // Chains are prepend-linked (newest first); fill each slice backwards
        // so finalized group rows come out in insertion order.
        let mut rows = vec![0u32; total as usize];
        for group_id in 0..group_count {
            let end = offsets[group_id + 1] as usize;
            let start = offsets[group_id] as usize;
            let mut slot = end;
            let mut row = self.group_head[group_id];
            while row != ROW_NONE {
                if slot == start {
                    return Err("join group row index out of bounds".to_string());
                }
                slot -= 1;
                rows[slot] = row;
                row = self.next_row(row)?;
            }
            if slot != start {
                return Err("join group row index out of bounds".to_string());
            }
        }

        self.group_offsets = Some(offsets);
        self.group_rows = Some(rows);
        self.refresh_accounting();
        Ok(())
    }

    pub(crate) fn group_rows_slice(&self, group_id: usize) -> Result<&[u32], String> {
        let offsets = self
            .group_offsets
            .as_ref()
            .ok_or_else(|| "join group offsets missing".to_string())?;
        let rows = self
            .group_rows
            .as_ref()
            .ok_or_else(|| "join group rows missing".to_string())?;
        if group_id + 1 >= offsets.len() {
            return Err("join group id out of bounds".to_string());
        }
        let start = offsets[group_id] as usize;
        let end = offsets[group_id + 1] as usize;
        Ok(&rows[start..end])
    }

    pub(crate) fn is_finalized(&self) -> bool {
        self.group_offsets.is_some() && self.group_rows.is_some()
    }

    /// Resolve the group id for every probe row at once. `skip[i]` marks rows
    /// whose key contains a forbidden null; those resolve to `None` without
    /// touching the table.
    pub(crate) fn lookup_batch(
        &self,
        key_arrays: &[ArrayRef],
        skip: &[bool],
    ) -> Result<Vec<Option<usize>>, String> {
        self.check_key_types(key_arrays)?;
        let num_rows = key_arrays.first().map(|a| a.len()).unwrap_or(0);
        if skip.len() != num_rows {
            return Err("join lookup batch length mismatch".to_string());
        }
        let mut group_ids = vec![None; num_rows];
        if self.groups.is_empty() || num_rows == 0 {
            return Ok(group_ids);
        }
        let rows = self
            .converter
            .convert_columns(key_arrays)
            .map_err(|e| format!("join key conversion failed: {}", e))?;
        for row in 0..num_rows {
            if skip[row] {
                continue;
            }
            group_ids[row] = self.groups.get(rows.row(row).data()).copied();
        }
        Ok(group_ids)
    }

    fn check_key_types(&self, key_arrays: &[ArrayRef]) -> Result<(), String> {
        if key_arrays.len() != self.key_types.len() {
            return Err("join key length mismatch".to_string());
        }
        for (array, expected) in key_arrays.iter().zip(&self.key_types) {
            if array.data_type() != expected {
                return Err(format!(
                    "join key type mismatch: got {:?} expected {:?}",
                    array.data_type(),
                    expected
                ));
            }
        }
        Ok(())
    }

    fn link_row(&mut self, group_id: usize, row_id: u32) -> Result<(), String> {
        let head = self
            .group_head
            .get(group_id)
            .copied()
            .ok_or_else(|| "join group id out of bounds".to_string())?;
        let slot = row_id as usize;
        if slot >= self.row_next.len() {
            return Err("join row id out of bounds".to_string());
        }
        self.row_next[slot] = head;
        self.group_head[group_id] = row_id;
        Ok(())
    }

    fn next_row(&self, row_id: u32) -> Result<u32, String> {
        self.row_next
            .get(row_id as usize)
            .copied()
            .ok_or_else(|| "join row id out of bounds".to_string())
    }

    fn refresh_accounting(&mut self) {
        let Some(tracker) = self.mem_tracker.as_ref() else {
            return;
        };
        let bytes = self.tracked_bytes();
        let delta = bytes - self.accounted_bytes;
        if delta > 0 {
            tracker.consume(delta);
        } else if delta < 0 {
            tracker.release(-delta);
        }
        self.accounted_bytes = bytes;
    }

    fn tracked_bytes(&self) -> i64 {
        fn vec_bytes<T>(v: &Vec<T>) -> i64 {
            let bytes = v.capacity().saturating_mul(mem::size_of::<T>());
            i64::try_from(bytes).unwrap_or(i64::MAX)
        }
        fn opt_vec_bytes<T>(v: &Option<Vec<T>>) -> i64 {
            v.as_ref().map(vec_bytes).unwrap_or(0)
        }

        let key_bytes: usize = self
            .groups
            .keys()
            .map(|k| k.len() + mem::size_of::<usize>())
            .sum();
        vec_bytes(&self.group_head)
            .saturating_add(vec_bytes(&self.row_next))
            .saturating_add(opt_vec_bytes(&self.group_offsets))
            .saturating_add(opt_vec_bytes(&self.group_rows))
            .saturating_add(i64::try_from(key_bytes).unwrap_or(i64::MAX))
    }
}

impl Drop for JoinHashTable {
    fn drop(&mut self) {
        if let Some(tracker) = self.mem_tracker.as_ref() {
            tracker.release(self.accounted_bytes);
        }
    }
}
