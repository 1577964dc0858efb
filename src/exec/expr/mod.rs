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
mod comparison;
mod literal;
mod slot;

use crate::common::ids::SlotId;
use crate::exec::chunk::Chunk;
use arrow::array::{ArrayRef, new_null_array};
use arrow::datatypes::DataType;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ExprId(pub usize);

#[derive(Clone, Debug)]
pub enum LiteralValue {
    Null,
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Bool(bool),
    Utf8(String),
    Date32(i32),
}

#[derive(Clone, Debug)]
pub enum ExprNode {
    Literal(LiteralValue),
    /// Slot reference resolved against the chunk's slot-id column map.
    SlotId(SlotId),
    Eq(ExprId, ExprId),
    /// Null-safe equality (`<=>`): NULL compares equal to NULL, never to a value.
    EqForNull(ExprId, ExprId),
    Ne(ExprId, ExprId),
    Lt(ExprId, ExprId),
    Le(ExprId, ExprId),
    Gt(ExprId, ExprId),
    Ge(ExprId, ExprId),
    And(ExprId, ExprId),
    Or(ExprId, ExprId),
    Not(ExprId),
    IsNull(ExprId),
    IsNotNull(ExprId),
}

/// Arena of expression nodes addressed by [`ExprId`].
///
/// This is the expression-evaluation surface the join operator consumes: probe
/// key expressions, other-join conjuncts, and mark-join conjuncts all evaluate
/// through [`ExprArena::eval`] against one chunk.
#[derive(Clone, Debug, Default)]
pub struct ExprArena {
    nodes: Vec<ExprNode>,
    types: Vec<DataType>,
}

impl ExprArena {
    pub fn push(&mut self, node: ExprNode) -> ExprId {
        self.push_typed(node, DataType::Null)
    }

    pub fn push_typed(&mut self, node: ExprNode, data_type: DataType) -> ExprId {
        let id = ExprId(self.nodes.len());
        self.nodes.push(node);
        self.types.push(data_type);
        id
    }

    pub fn node(&self, id: ExprId) -> Option<&ExprNode> {
        self.nodes.get(id.0)
    }

    pub fn data_type(&self, id: ExprId) -> Option<&DataType> {
        self.types.get(id.0)
    }

    pub fn eval(&self, id: ExprId, chunk: &Chunk) -> Result<ArrayRef, String> {
        let node = self
            .nodes
            .get(id.0)
            .ok_or_else(|| "invalid ExprId".to_string())?;
        match node {
            ExprNode::Literal(v) => {
                if matches!(v, LiteralValue::Null) {
                    let target_type = self.data_type(id).cloned().unwrap_or(DataType::Null);
                    if !matches!(target_type, DataType::Null) {
                        // Plans may materialize a bare NULL into a typed slot; the declared
                        // expr type must be preserved for downstream batch assembly.
                        return Ok(new_null_array(&target_type, chunk.len()));
                    }
                }
                literal::eval(v, chunk.len())
            }
            ExprNode::SlotId(slot_id) => slot::eval_slot_id(*slot_id, chunk),
            ExprNode::Eq(a, b) => comparison::eval_eq(self, *a, *b, chunk),
            ExprNode::EqForNull(a, b) => comparison::eval_eq_for_null(self, *a, *b, chunk),
            ExprNode::Ne(a, b) => comparison::eval_ne(self, *a, *b, chunk),
            ExprNode::Lt(a, b) => comparison::eval_lt(self, *a, *b, chunk),
            ExprNode::Le(a, b) => comparison::eval_le(self, *a, *b, chunk),
            ExprNode::Gt(a, b) => comparison::eval_gt(self, *a, *b, chunk),
            ExprNode::Ge(a, b) => comparison::eval_ge(self, *a, *b, chunk),
            ExprNode::And(a, b) => comparison::eval_and(self, *a, *b, chunk),
            ExprNode::Or(a, b) => comparison::eval_or(self, *a, *b, chunk),
            ExprNode::Not(child) => comparison::eval_not(self, *child, chunk),
            ExprNode::IsNull(child) => comparison::eval_is_null(self, *child, chunk),
            ExprNode::IsNotNull(child) => comparison::eval_is_not_null(self, *child, chunk),
        }
    }

    /// Collect the slot ids an expression tree reads. Used by lazy
    /// materialization to decide which columns a conjunct pass requires.
    pub fn referenced_slots(&self, id: ExprId, out: &mut Vec<SlotId>) {
        let Some(node) = self.nodes.get(id.0) else {
            return;
        };
        match node {
            ExprNode::Literal(_) => {}
            ExprNode::SlotId(slot_id) => {
                if !out.contains(slot_id) {
                    out.push(*slot_id);
                }
            }
            ExprNode::Eq(a, b)
            | ExprNode::EqForNull(a, b)
            | ExprNode::Ne(a, b)
            | ExprNode::Lt(a, b)
            | ExprNode::Le(a, b)
            | ExprNode::Gt(a, b)
            | ExprNode::Ge(a, b)
            | ExprNode::And(a, b)
            | ExprNode::Or(a, b) => {
                self.referenced_slots(*a, out);
                self.referenced_slots(*b, out);
            }
            ExprNode::Not(child) | ExprNode::IsNull(child) | ExprNode::IsNotNull(child) => {
                self.referenced_slots(*child, out);
            }
        }
    }
}
