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
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static CONFIG: OnceLock<BasaltConfig> = OnceLock::new();

fn default_log_level() -> String {
    "info".to_string()
}

fn default_chunk_size() -> usize {
    4096
}

fn default_operator_buffer_chunks() -> usize {
    8
}

pub fn init_from_path(path: impl AsRef<Path>) -> Result<&'static BasaltConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let path = path.as_ref().to_path_buf();
    let cfg = BasaltConfig::load_from_file(&path)?;
    let _ = CONFIG.set(cfg);
    Ok(CONFIG.get().expect("CONFIG set"))
}

pub fn init_from_env_or_default() -> Result<&'static BasaltConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let path = config_path_from_env_or_default()?;
    let cfg = BasaltConfig::load_from_file(&path)?;
    let _ = CONFIG.set(cfg);
    Ok(CONFIG.get().expect("CONFIG set"))
}

pub fn config() -> Result<&'static BasaltConfig> {
    init_from_env_or_default()
}

fn config_path_from_env_or_default() -> Result<PathBuf> {
    if let Ok(p) = std::env::var("BASALT_CONFIG") {
        if !p.trim().is_empty() {
            return Ok(PathBuf::from(p));
        }
    }

    let candidates = [PathBuf::from("basalt.toml")];
    for p in candidates {
        if p.exists() {
            return Ok(p);
        }
    }

    Err(anyhow!(
        "missing config file: set $BASALT_CONFIG or create ./basalt.toml"
    ))
}

#[derive(Clone, Deserialize)]
pub struct BasaltConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional full tracing EnvFilter expression.
    /// If set, this takes precedence over `log_level`.
    /// Example: "basalt=debug"
    #[serde(default)]
    pub log_filter: Option<String>,

    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Target row count of one output chunk produced by a single `pull`.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Probe chunks an operator may buffer while its build side is pending.
    #[serde(default = "default_operator_buffer_chunks")]
    pub operator_buffer_chunks: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            operator_buffer_chunks: default_operator_buffer_chunks(),
        }
    }
}

impl BasaltConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let cfg: BasaltConfig = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn effective_log_filter(&self) -> String {
        match &self.log_filter {
            Some(filter) if !filter.trim().is_empty() => filter.clone(),
            _ => self.log_level.clone(),
        }
    }
}
