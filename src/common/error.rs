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
//! Typed execution failures for the operator contract.
//!
//! Responsibilities:
//! - Classifies probe-side failures so callers can distinguish expression
//!   errors from malformed build state and resource exhaustion.
//! - Utility layers keep plain `Result<_, String>` and are wrapped into these
//!   variants at the operator boundary.

use std::error::Error;
use std::fmt;

/// Failure classes surfaced by operator `push`/`pull`/`prepare` calls.
///
/// Failures propagate immediately to the caller; there is no local retry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecError {
    /// Expression evaluation failed (probe keys, other-join or mark conjuncts).
    Eval(String),
    /// The build-side artifact is missing, unpublished, or inconsistent.
    BuildState(String),
    /// Output allocation exceeded what the operator may hold.
    ResourceExhausted(String),
    /// Invariant violation inside the operator itself.
    Internal(String),
}

impl ExecError {
    pub fn eval(msg: impl Into<String>) -> Self {
        Self::Eval(msg.into())
    }

    pub fn build_state(msg: impl Into<String>) -> Self {
        Self::BuildState(msg.into())
    }

    pub fn resource_exhausted(msg: impl Into<String>) -> Self {
        Self::ResourceExhausted(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eval(msg) => write!(f, "expression evaluation failed: {}", msg),
            Self::BuildState(msg) => write!(f, "join build state error: {}", msg),
            Self::ResourceExhausted(msg) => write!(f, "resource exhausted: {}", msg),
            Self::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl Error for ExecError {}
