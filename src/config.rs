/*
 * Copyright 2020 Damian Peckett <damian@pecke.tt>
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

use crate::error::*;
use crate::poller::PollPolicy;
use snafu::OptionExt;
use std::env;
use std::time::Duration;

/// Configuration for the environment-resize handler.
#[derive(Clone, Debug)]
pub struct ResizeConfig {
    /// Application whose environments are scanned.
    pub application_name: String,
    /// Tag key requesting an upgrade.
    pub upgrade_tag_key: String,
    /// Instance type applied on upgrade.
    pub upgrade_instance_type: String,
    /// Tag key requesting a downgrade.
    pub degrade_tag_key: String,
    /// Instance type applied on downgrade.
    pub degrade_instance_type: String,
    /// Bucket receiving the run logs.
    pub log_bucket: String,
    /// Key prefix for the run logs.
    pub log_key_prefix: String,
}

impl ResizeConfig {
    /// Read the handler configuration from the process environment.
    pub fn from_env() -> Result<Self, Error> {
        Ok(Self {
            application_name: required_env("APPLICATION_NAME")?,
            upgrade_tag_key: env_or("UPGRADE_TAG_KEY", "auto-upgrade"),
            upgrade_instance_type: env_or("UPGRADE_INSTANCE_TYPE", "r6a.large"),
            degrade_tag_key: env_or("DEGRADE_TAG_KEY", "auto-degrade"),
            degrade_instance_type: env_or("DEGRADE_INSTANCE_TYPE", "t3a.nano"),
            log_bucket: required_env("LOG_BUCKET")?,
            log_key_prefix: env_or("LOG_KEY_PREFIX", "environment-resize-logs"),
        })
    }
}

/// Configuration for the instance-power handler.
#[derive(Clone, Debug)]
pub struct PowerConfig {
    /// Tag key marking instances for the scheduled stop pass.
    pub stop_tag_key: String,
    /// Tag key marking instances for the scheduled start pass.
    pub start_tag_key: String,
    /// UTC hour at which the stop pass runs.
    pub stop_hour_utc: u32,
    /// UTC hour at which the start pass runs.
    pub start_hour_utc: u32,
    /// Bucket receiving the run logs.
    pub log_bucket: String,
    /// Key prefix for the run logs.
    pub log_key_prefix: String,
    /// Convergence poll policy applied after each start/stop call.
    pub poll: PollPolicy,
}

impl PowerConfig {
    /// Read the handler configuration from the process environment.
    pub fn from_env() -> Result<Self, Error> {
        Ok(Self {
            stop_tag_key: env_or("STOP_TAG_KEY", "CNTRL-STOP"),
            start_tag_key: env_or("START_TAG_KEY", "CNTRL-START"),
            stop_hour_utc: env_u32("STOP_HOUR_UTC", 14)?,
            start_hour_utc: env_u32("START_HOUR_UTC", 2)?,
            log_bucket: required_env("LOG_BUCKET")?,
            log_key_prefix: env_or("LOG_KEY_PREFIX", "instance-power-logs"),
            poll: PollPolicy {
                interval: Duration::from_secs(u64::from(env_u32("POLL_INTERVAL_SECONDS", 1)?)),
                max_attempts: env_u32("POLL_MAX_ATTEMPTS", 600)?,
            },
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn required_env(name: &str) -> Result<String, Error> {
    env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .context(MissingEnvSnafu { name })
}

fn env_u32(name: &str, default: u32) -> Result<u32, Error> {
    match env::var(name) {
        Ok(value) => {
            let parsed = value.trim().parse().ok();
            parsed.context(InvalidEnvSnafu { name, value })
        }
        Err(_) => Ok(default),
    }
}
