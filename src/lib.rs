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

//! Tag-driven off-hours capacity scheduling for AWS.
//!
//! Two scheduler-triggered handlers share this crate: `environment-resize`
//! moves Elastic Beanstalk environments between a small and a large instance
//! class based on per-environment tags, and `instance-power` stops and starts
//! EC2 instances on a fixed daily schedule based on per-instance control
//! tags. Every run accumulates an ordered audit log that is uploaded to S3
//! before the handler returns.

use serde::Serialize;

/// Run log accumulation and blob store flushing.
pub mod audit;
/// AWS collaborator traits and clients.
pub mod aws;
/// Handler configuration from the process environment.
pub mod config;
/// Offpeak error types.
pub mod error;
/// Instance state convergence polling.
pub mod poller;
/// The scheduled start/stop handler pipeline.
pub mod power;
/// The tag-gated environment resize handler pipeline.
pub mod resize;
/// Tag scanning for resize candidates.
pub mod scanner;

/// Fixed-shape success payload returned to the invoking platform.
#[derive(Clone, Debug, Serialize)]
pub struct HandlerResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl HandlerResponse {
    /// Bare 200 response.
    pub fn ok() -> Self {
        Self {
            status_code: 200,
            body: None,
        }
    }

    /// 200 response carrying a human-readable body.
    pub fn with_body(body: &str) -> Self {
        Self {
            status_code: 200,
            body: Some(body.to_string()),
        }
    }
}
