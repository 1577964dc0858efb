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
//! Output construction for hash-join probing.
//!
//! Responsibilities:
//! - Builds joined chunks for matched, null-extended, probe-only, and
//!   build-only result cases from row index selections.
//! - Implements the two-phase candidate pipeline: candidate chunks carry only
//!   eagerly-materialized columns for conjunct evaluation; survivor rows are
//!   materialized against the full output schema afterwards, so lazy columns
//!   are never gathered before row survival is known.
//!
//! Key exported interfaces:
//! - Types: `ColumnSource`.
//! - Functions: `build_pair_chunk`, `build_probe_only_chunk`,
//!   `build_build_only_chunk`, `eval_conjuncts`, `concat_schemas`.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, UInt32Array, new_null_array};
use arrow::compute::take;
use arrow::datatypes::{Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};

use crate::exec::chunk::{Chunk, field_slot_id};
use crate::exec::expr::{ExprArena, ExprId};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
/// Which join input a schema field is gathered from.
pub(crate) enum ColumnSource {
    Probe,
    Build,
}

/// Concatenate probe and build schemas into the joined output schema order.
pub(crate) fn concat_schemas(left: SchemaRef, right: SchemaRef) -> SchemaRef {
    let mut fields = left.fields().to_vec();
    fields.extend(right.fields().to_vec());
    Arc::new(Schema::new(fields))
}

fn gather_side(
    chunk: Option<&Chunk>,
    indices: &[Option<u32>],
    field: &arrow::datatypes::Field,
) -> Result<ArrayRef, String> {
    let len = indices.len();
    if indices.iter().all(|idx| idx.is_none()) {
        return Ok(new_null_array(field.data_type(), len));
    }
    let chunk = chunk.ok_or_else(|| "join side chunk missing for gather".to_string())?;
    if chunk.is_empty() {
        return Err("join gather index into empty side".to_string());
    }
    let slot_id = field_slot_id(field)?
        .ok_or_else(|| format!("join output field {} has no slot id", field.name()))?;
    let column = chunk.column_by_slot_id(slot_id)?;
    let idx_array = Arc::new(UInt32Array::from(indices.to_vec())) as ArrayRef;
    take(column.as_ref(), &idx_array, None).map_err(|e| e.to_string())
}

/// Assemble one pair-shaped chunk. `None` indices produce null-filled cells,
/// which is how outer joins extend unmatched rows.
pub(crate) fn build_pair_chunk(
    schema: &SchemaRef,
    sources: &[ColumnSource],
    probe: Option<&Chunk>,
    build: Option<&Chunk>,
    probe_indices: &[Option<u32>],
    build_indices: &[Option<u32>],
) -> Result<Chunk, String> {
    if schema.fields().len() != sources.len() {
        return Err("join output schema/source length mismatch".to_string());
    }
    if probe_indices.len() != build_indices.len() {
        return Err("join output index length mismatch".to_string());
    }
    if schema.fields().is_empty() {
        // Conjuncts referencing no columns still need the row count carried.
        let options = RecordBatchOptions::new().with_row_count(Some(probe_indices.len()));
        let batch = RecordBatch::try_new_with_options(Arc::clone(schema), Vec::new(), &options)
            .map_err(|e| e.to_string())?;
        return Chunk::try_new(batch);
    }
    let mut columns = Vec::with_capacity(schema.fields().len());
    for (field, source) in schema.fields().iter().zip(sources) {
        let column = match source {
            ColumnSource::Probe => gather_side(probe, probe_indices, field)?,
            ColumnSource::Build => gather_side(build, build_indices, field)?,
        };
        columns.push(column);
    }
    let batch = RecordBatch::try_new(Arc::clone(schema), columns).map_err(|e| e.to_string())?;
    Chunk::try_new(batch)
}

/// Assemble a probe-preserving chunk (semi/anti/null-aware output), with the
/// mark column appended as the schema's final field for mark joins.
pub(crate) fn build_probe_only_chunk(
    schema: &SchemaRef,
    probe: &Chunk,
    rows: &[u32],
    marks: Option<&[Option<bool>]>,
) -> Result<Chunk, String> {
    let idx_array = Arc::new(UInt32Array::from(rows.to_vec())) as ArrayRef;
    let expected_fields = probe.batch.num_columns() + marks.map(|_| 1).unwrap_or(0);
    if schema.fields().len() != expected_fields {
        return Err(format!(
            "join probe output field count mismatch: schema={} expected={}",
            schema.fields().len(),
            expected_fields
        ));
    }
    let mut columns = Vec::with_capacity(expected_fields);
    for col in probe.batch.columns() {
        let taken = take(col.as_ref(), &idx_array, None).map_err(|e| e.to_string())?;
        columns.push(taken);
    }
    if let Some(marks) = marks {
        if marks.len() != rows.len() {
            return Err("join mark column length mismatch".to_string());
        }
        columns.push(Arc::new(BooleanArray::from(marks.to_vec())) as ArrayRef);
    }
    let batch = RecordBatch::try_new(Arc::clone(schema), columns).map_err(|e| e.to_string())?;
    Chunk::try_new(batch)
}

/// Assemble a build-preserving chunk (right semi/anti output).
pub(crate) fn build_build_only_chunk(
    schema: &SchemaRef,
    build: &Chunk,
    rows: &[u32],
) -> Result<Chunk, String> {
    let idx_array = Arc::new(UInt32Array::from(rows.to_vec())) as ArrayRef;
    let mut columns = Vec::with_capacity(build.batch.num_columns());
    for col in build.batch.columns() {
        let taken = take(col.as_ref(), &idx_array, None).map_err(|e| e.to_string())?;
        columns.push(taken);
    }
    let batch = RecordBatch::try_new(Arc::clone(schema), columns).map_err(|e| e.to_string())?;
    Chunk::try_new(batch)
}

/// Evaluate a conjunct list against candidate rows under SQL three-valued
/// logic, folding the per-conjunct results with AND. The returned mask is
/// per-row `Some(true)` / `Some(false)` / `None` (unknown).
pub(crate) fn eval_conjuncts(
    arena: &ExprArena,
    conjuncts: &[ExprId],
    chunk: &Chunk,
) -> Result<Vec<Option<bool>>, String> {
    let num_rows = chunk.len();
    let mut mask: Vec<Option<bool>> = vec![Some(true); num_rows];
    for conjunct in conjuncts {
        let result = arena.eval(*conjunct, chunk)?;
        let result = result
            .as_any()
            .downcast_ref::<BooleanArray>()
            .ok_or_else(|| "join conjunct must return boolean array".to_string())?;
        if result.len() != num_rows {
            return Err(format!(
                "join conjunct result length mismatch: got {} expected {}",
                result.len(),
                num_rows
            ));
        }
        for row in 0..num_rows {
            let value = if result.is_null(row) {
                None
            } else {
                Some(result.value(row))
            };
            mask[row] = match (mask[row], value) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), v) => v,
                (None, Some(true)) | (None, None) => None,
            };
        }
    }
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ids::SlotId;
    use crate::exec::chunk::field_with_slot_id;
    use crate::exec::expr::{ExprNode, LiteralValue};
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field};

    fn chunk_i64(slot: u32, values: Vec<Option<i64>>) -> Chunk {
        let array = Arc::new(Int64Array::from(values)) as ArrayRef;
        let schema = Arc::new(Schema::new(vec![field_with_slot_id(
            Field::new("c", DataType::Int64, true),
            SlotId::new(slot),
        )]));
        Chunk::new(RecordBatch::try_new(schema, vec![array]).unwrap())
    }

    #[test]
    fn pair_chunk_null_extends_missing_side() {
        let probe = chunk_i64(1, vec![Some(10), Some(20)]);
        let build = chunk_i64(2, vec![Some(100)]);
        let schema = concat_schemas(probe.schema(), build.schema());
        let sources = vec![ColumnSource::Probe, ColumnSource::Build];

        let chunk = build_pair_chunk(
            &schema,
            &sources,
            Some(&probe),
            Some(&build),
            &[Some(0), Some(1)],
            &[Some(0), None],
        )
        .expect("pair chunk");
        assert_eq!(chunk.len(), 2);
        let build_col = chunk.column_by_slot_id(SlotId::new(2)).expect("col");
        let build_col = build_col.as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(build_col.value(0), 100);
        assert!(build_col.is_null(1));
    }

    #[test]
    fn conjunct_mask_folds_three_valued_and() {
        let mut arena = ExprArena::default();
        let col = arena.push_typed(ExprNode::SlotId(SlotId::new(1)), DataType::Int64);
        let lit = arena.push(ExprNode::Literal(LiteralValue::Int64(15)));
        let pred = arena.push_typed(ExprNode::Gt(col, lit), DataType::Boolean);

        let chunk = chunk_i64(1, vec![Some(20), Some(10), None]);
        let mask = eval_conjuncts(&arena, &[pred], &chunk).expect("mask");
        assert_eq!(mask, vec![Some(true), Some(false), None]);

        // A second, always-true conjunct leaves the fold unchanged.
        let true_lit = arena.push(ExprNode::Literal(LiteralValue::Bool(true)));
        let mask = eval_conjuncts(&arena, &[pred, true_lit], &chunk).expect("mask");
        assert_eq!(mask, vec![Some(true), Some(false), None]);
    }

    #[test]
    fn probe_only_chunk_appends_mark_column() {
        let probe = chunk_i64(1, vec![Some(1), Some(2), Some(3)]);
        let mut fields = probe.schema().fields().to_vec();
        fields.push(Arc::new(field_with_slot_id(
            Field::new("mark", DataType::Boolean, true),
            SlotId::new(9),
        )));
        let schema = Arc::new(Schema::new(fields));

        let marks = vec![Some(true), None];
        let chunk = build_probe_only_chunk(&schema, &probe, &[0, 2], Some(&marks)).expect("chunk");
        assert_eq!(chunk.len(), 2);
        let mark_col = chunk.column_by_slot_id(SlotId::new(9)).expect("mark");
        let mark_col = mark_col.as_any().downcast_ref::<BooleanArray>().unwrap();
        assert!(mark_col.value(0));
        assert!(mark_col.is_null(1));
    }
}
