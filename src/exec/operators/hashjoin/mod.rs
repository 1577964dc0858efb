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
//! Hash-join operator module exports.
//!
//! Responsibilities:
//! - Registers the build sink and probe operators and their shared state.
//! - Exposes the probe/build factories used by pipeline graph construction.

mod build_artifact;
mod build_sink;
mod join_hash_table;
mod join_shared_state;
mod output_builder;
mod probe_matcher;
mod probe_processor;
mod probe_state;

pub use build_sink::HashJoinBuildSinkFactory;
pub use probe_processor::{HashJoinProbeFactory, HashJoinProbeOperator};
pub use join_shared_state::JoinSharedState;
