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
use crate::exec::chunk::Chunk;
use crate::exec::expr::{ExprArena, ExprId};
use arrow::array::{Array, ArrayRef, BooleanArray, BooleanBuilder};
use arrow::compute::cast;
use arrow::compute::kernels::boolean::not;
use arrow::compute::kernels::cmp::{eq, gt, gt_eq, lt, lt_eq, neq};
use arrow::datatypes::DataType;
use std::sync::Arc;

// Helper function to normalize types for comparison
fn normalize_comparison_types(
    left: ArrayRef,
    right: ArrayRef,
) -> Result<(ArrayRef, ArrayRef), String> {
    let left_type = left.data_type();
    let right_type = right.data_type();

    // If types match, no conversion needed
    if left_type == right_type {
        return Ok((left, right));
    }

    // Handle integer type mismatches by casting to Int64.
    let is_int = |dt: &DataType| {
        matches!(
            dt,
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
        )
    };
    let is_float = |dt: &DataType| matches!(dt, DataType::Float32 | DataType::Float64);

    if is_int(left_type) && is_int(right_type) {
        let left_64 = if matches!(left_type, DataType::Int64) {
            left
        } else {
            cast(&left, &DataType::Int64).map_err(|e| e.to_string())?
        };
        let right_64 = if matches!(right_type, DataType::Int64) {
            right
        } else {
            cast(&right, &DataType::Int64).map_err(|e| e.to_string())?
        };
        return Ok((left_64, right_64));
    }

    // Mixed integer/float and float/float comparisons coerce both sides to Float64.
    if (is_int(left_type) || is_float(left_type)) && (is_int(right_type) || is_float(right_type)) {
        let left_64 = if matches!(left_type, DataType::Float64) {
            left
        } else {
            cast(&left, &DataType::Float64).map_err(|e| e.to_string())?
        };
        let right_64 = if matches!(right_type, DataType::Float64) {
            right
        } else {
            cast(&right, &DataType::Float64).map_err(|e| e.to_string())?
        };
        return Ok((left_64, right_64));
    }

    // A typed NULL literal compares against any type; coerce it to the other side.
    if matches!(left_type, DataType::Null) {
        let left_cast = cast(&left, right_type).map_err(|e| e.to_string())?;
        return Ok((left_cast, right));
    }
    if matches!(right_type, DataType::Null) {
        let right_cast = cast(&right, left_type).map_err(|e| e.to_string())?;
        return Ok((left, right_cast));
    }

    Err(format!(
        "Cannot compare incompatible types: {:?} vs {:?}",
        left_type, right_type
    ))
}

pub fn eval_eq(
    arena: &ExprArena,
    left: ExprId,
    right: ExprId,
    chunk: &Chunk,
) -> Result<ArrayRef, String> {
    let l = arena.eval(left, chunk)?;
    let r = arena.eval(right, chunk)?;
    let (l_norm, r_norm) = normalize_comparison_types(l, r)?;
    let result = eq(&l_norm, &r_norm).map_err(|e| e.to_string())?;
    Ok(Arc::new(result))
}

pub fn eval_eq_for_null(
    arena: &ExprArena,
    left: ExprId,
    right: ExprId,
    chunk: &Chunk,
) -> Result<ArrayRef, String> {
    let l = arena.eval(left, chunk)?;
    let r = arena.eval(right, chunk)?;
    let (l_norm, r_norm) = normalize_comparison_types(l, r)?;
    // `<=>` is the eq kernel with nulls folded back in: NULL <=> NULL is true,
    // NULL <=> value is false, and the result itself is never null.
    let equal = eq(&l_norm, &r_norm).map_err(|e| e.to_string())?;
    let mut builder = BooleanBuilder::new();
    for row in 0..equal.len() {
        let l_is_null = l_norm.is_null(row);
        let r_is_null = r_norm.is_null(row);
        if l_is_null || r_is_null {
            builder.append_value(l_is_null && r_is_null);
        } else {
            builder.append_value(equal.value(row));
        }
    }
    Ok(Arc::new(builder.finish()))
}

pub fn eval_ne(
    arena: &ExprArena,
    left: ExprId,
    right: ExprId,
    chunk: &Chunk,
) -> Result<ArrayRef, String> {
    let l = arena.eval(left, chunk)?;
    let r = arena.eval(right, chunk)?;
    let (l_norm, r_norm) = normalize_comparison_types(l, r)?;
    let result = neq(&l_norm, &r_norm).map_err(|e| e.to_string())?;
    Ok(Arc::new(result))
}

pub fn eval_lt(
    arena: &ExprArena,
    left: ExprId,
    right: ExprId,
    chunk: &Chunk,
) -> Result<ArrayRef, String> {
    let l = arena.eval(left, chunk)?;
    let r = arena.eval(right, chunk)?;
    let (l_norm, r_norm) = normalize_comparison_types(l, r)?;
    let result = lt(&l_norm, &r_norm).map_err(|e| e.to_string())?;
    Ok(Arc::new(result))
}

pub fn eval_le(
    arena: &ExprArena,
    left: ExprId,
    right: ExprId,
    chunk: &Chunk,
) -> Result<ArrayRef, String> {
    let l = arena.eval(left, chunk)?;
    let r = arena.eval(right, chunk)?;
    let (l_norm, r_norm) = normalize_comparison_types(l, r)?;
    let result = lt_eq(&l_norm, &r_norm).map_err(|e| e.to_string())?;
    Ok(Arc::new(result))
}

pub fn eval_gt(
    arena: &ExprArena,
    left: ExprId,
    right: ExprId,
    chunk: &Chunk,
) -> Result<ArrayRef, String> {
    let l = arena.eval(left, chunk)?;
    let r = arena.eval(right, chunk)?;
    let (l_norm, r_norm) = normalize_comparison_types(l, r)?;
    let result = gt(&l_norm, &r_norm).map_err(|e| e.to_string())?;
    Ok(Arc::new(result))
}

pub fn eval_ge(
    arena: &ExprArena,
    left: ExprId,
    right: ExprId,
    chunk: &Chunk,
) -> Result<ArrayRef, String> {
    let l = arena.eval(left, chunk)?;
    let r = arena.eval(right, chunk)?;
    let (l_norm, r_norm) = normalize_comparison_types(l, r)?;
    let result = gt_eq(&l_norm, &r_norm).map_err(|e| e.to_string())?;
    Ok(Arc::new(result))
}

pub fn eval_and(
    arena: &ExprArena,
    left: ExprId,
    right: ExprId,
    chunk: &Chunk,
) -> Result<ArrayRef, String> {
    let l = arena.eval(left, chunk)?;
    let r = arena.eval(right, chunk)?;
    let l_bool = l
        .as_any()
        .downcast_ref::<BooleanArray>()
        .ok_or_else(|| "AND left operand must be boolean".to_string())?;
    let r_bool = r
        .as_any()
        .downcast_ref::<BooleanArray>()
        .ok_or_else(|| "AND right operand must be boolean".to_string())?;
    // SQL three-valued logic (3VL):
    //   FALSE AND NULL = FALSE
    //   TRUE  AND NULL = NULL
    //   NULL  AND FALSE = FALSE
    //   NULL  AND TRUE  = NULL
    let mut builder = BooleanBuilder::new();
    for i in 0..l_bool.len() {
        let l_is_null = l_bool.is_null(i);
        let r_is_null = r_bool.is_null(i);
        match (l_is_null, r_is_null) {
            (false, false) => builder.append_value(l_bool.value(i) && r_bool.value(i)),
            // FALSE dominates AND even when the other side is NULL.
            (false, true) => {
                if !l_bool.value(i) {
                    builder.append_value(false);
                } else {
                    builder.append_null();
                }
            }
            (true, false) => {
                if !r_bool.value(i) {
                    builder.append_value(false);
                } else {
                    builder.append_null();
                }
            }
            (true, true) => builder.append_null(),
        }
    }
    Ok(Arc::new(builder.finish()))
}

pub fn eval_or(
    arena: &ExprArena,
    left: ExprId,
    right: ExprId,
    chunk: &Chunk,
) -> Result<ArrayRef, String> {
    let l = arena.eval(left, chunk)?;
    let r = arena.eval(right, chunk)?;
    let l_bool = l
        .as_any()
        .downcast_ref::<BooleanArray>()
        .ok_or_else(|| "OR left operand must be boolean".to_string())?;
    let r_bool = r
        .as_any()
        .downcast_ref::<BooleanArray>()
        .ok_or_else(|| "OR right operand must be boolean".to_string())?;
    // SQL three-valued logic (3VL):
    //   TRUE  OR NULL = TRUE
    //   FALSE OR NULL = NULL
    let mut builder = BooleanBuilder::new();
    for i in 0..l_bool.len() {
        let l_is_null = l_bool.is_null(i);
        let r_is_null = r_bool.is_null(i);
        match (l_is_null, r_is_null) {
            (false, false) => builder.append_value(l_bool.value(i) || r_bool.value(i)),
            // TRUE dominates OR even when the other side is NULL.
            (false, true) => {
                if l_bool.value(i) {
                    builder.append_value(true);
                } else {
                    builder.append_null();
                }
            }
            (true, false) => {
                if r_bool.value(i) {
                    builder.append_value(true);
                } else {
                    builder.append_null();
                }
            }
            (true, true) => builder.append_null(),
        }
    }
    Ok(Arc::new(builder.finish()))
}

pub fn eval_not(arena: &ExprArena, child: ExprId, chunk: &Chunk) -> Result<ArrayRef, String> {
    let v = arena.eval(child, chunk)?;
    let b = v
        .as_any()
        .downcast_ref::<BooleanArray>()
        .ok_or_else(|| "NOT operand must be boolean".to_string())?;
    let result = not(b).map_err(|e| e.to_string())?;
    Ok(Arc::new(result))
}

pub fn eval_is_null(arena: &ExprArena, child: ExprId, chunk: &Chunk) -> Result<ArrayRef, String> {
    let v = arena.eval(child, chunk)?;
    let mut builder = BooleanBuilder::new();
    for i in 0..v.len() {
        builder.append_value(v.is_null(i));
    }
    Ok(Arc::new(builder.finish()))
}

pub fn eval_is_not_null(
    arena: &ExprArena,
    child: ExprId,
    chunk: &Chunk,
) -> Result<ArrayRef, String> {
    let v = arena.eval(child, chunk)?;
    let mut builder = BooleanBuilder::new();
    for i in 0..v.len() {
        builder.append_value(!v.is_null(i));
    }
    Ok(Arc::new(builder.finish()))
}
