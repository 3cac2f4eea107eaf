/*
 * Copyright (C) 2026 Fastly, Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const ENV_PREFIX: &str = "CHUNKWIRE";

const READ_BUFFER_SIZE_DEFAULT: u64 = 4096;
const MAX_BODY_SIZE_DEFAULT: u64 = 1024 * 1024;
const BLOCK_SIZE_DEFAULT: u64 = 8192;
const LOG_LEVEL_DEFAULT: u64 = 2;

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub read_buffer_size: usize,

    // milliseconds. 0 means reads never time out
    pub read_timeout_ms: u64,

    pub max_body_size: usize,

    // bytes of input consumed per chunk when encoding
    pub block_size: usize,

    pub log_level: u8,
}

impl Settings {
    // built-in defaults, overridden by the file if one is given, overridden
    // in turn by CHUNKWIRE_* environment variables
    pub fn new(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::build(config_file, Environment::with_prefix(ENV_PREFIX))
    }

    fn build(config_file: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("read_buffer_size", READ_BUFFER_SIZE_DEFAULT)?
            .set_default("read_timeout_ms", 0)?
            .set_default("max_body_size", MAX_BODY_SIZE_DEFAULT)?
            .set_default("block_size", BLOCK_SIZE_DEFAULT)?
            .set_default("log_level", LOG_LEVEL_DEFAULT)?;

        if let Some(f) = config_file {
            builder = builder.add_source(File::from(f));
        }

        let settings: Self = builder
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()?;

        if settings.block_size == 0 {
            return Err(ConfigError::Message("block_size must be non-zero".into()));
        }

        if settings.read_buffer_size == 0 {
            return Err(ConfigError::Message(
                "read_buffer_size must be non-zero".into(),
            ));
        }

        Ok(settings)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        if self.read_timeout_ms > 0 {
            Some(Duration::from_millis(self.read_timeout_ms))
        } else {
            None
        }
    }
}
