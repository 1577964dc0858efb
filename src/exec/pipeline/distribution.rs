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
//! Data distribution requirements for pipeline operators.
//!
//! Responsibilities:
//! - Describes the partitioning/shuffle scheme an operator demands of its
//!   input streams, consumed by exchange planning.
//!
//! Key exported interfaces:
//! - Types: `ExchangeKind`, `DataDistribution`.

use crate::exec::expr::ExprId;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
/// Exchange schemes an operator can require of its input stream.
pub enum ExchangeKind {
    /// No redistribution allowed; the stream must stay in a single partition.
    Noop,
    /// Stream passes through unchanged (broadcast inputs are already replicated).
    Passthrough,
    /// Rows are hash-shuffled on the partition expressions.
    HashShuffle,
    /// Rows are shuffled with the table's bucket hash on the partition expressions.
    BucketHashShuffle,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A distribution requirement: exchange scheme plus the keys it shuffles on.
pub struct DataDistribution {
    pub kind: ExchangeKind,
    pub partition_exprs: Vec<ExprId>,
}

impl DataDistribution {
    pub fn new(kind: ExchangeKind, partition_exprs: Vec<ExprId>) -> Self {
        Self {
            kind,
            partition_exprs,
        }
    }

    /// Requirement without shuffle keys (`Noop` / `Passthrough`).
    pub fn keyless(kind: ExchangeKind) -> Self {
        Self {
            kind,
            partition_exprs: Vec::new(),
        }
    }
}
