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

use crate::error::Error;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;

pub mod environment;
pub mod instance;
pub mod storage;

/// An environment as returned by the listing call, before tags are attached.
#[derive(Clone, Debug)]
pub struct EnvironmentHandle {
    pub name: String,
    pub arn: String,
}

/// A fully described environment retained by the tag scanner.
#[derive(Clone, Debug)]
pub struct EnvironmentDescriptor {
    pub name: String,
    pub arn: String,
    pub tags: HashMap<String, String>,
    /// Currently configured instance type, when it could be fetched.
    pub current_instance_type: Option<String>,
}

impl EnvironmentDescriptor {
    /// Whether the given tag key affirmatively requests an action.
    pub fn tag_enabled(&self, tag_key: &str) -> bool {
        tag_value_is_true(&self.tags, tag_key)
    }
}

/// The literal value "true" (case-insensitive, trimmed) is the only
/// activation signal accepted from a tag.
pub fn tag_value_is_true(tags: &HashMap<String, String>, tag_key: &str) -> bool {
    tags.get(tag_key)
        .map(|value| value.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// An instance as returned by the filtered listing call.
#[derive(Clone, Debug)]
pub struct InstanceSummary {
    pub instance_id: String,
    /// Value of the instance's Name tag, carried for readable logs.
    pub name: Option<String>,
}

impl InstanceSummary {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }
}

/// EC2 instance lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
}

impl InstanceState {
    /// The state name as the compute API spells it.
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::ShuttingDown => "shutting-down",
            InstanceState::Terminated => "terminated",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
        }
    }

    pub fn parse(name: &str) -> Option<InstanceState> {
        match name {
            "pending" => Some(InstanceState::Pending),
            "running" => Some(InstanceState::Running),
            "shutting-down" => Some(InstanceState::ShuttingDown),
            "terminated" => Some(InstanceState::Terminated),
            "stopping" => Some(InstanceState::Stopping),
            "stopped" => Some(InstanceState::Stopped),
            _ => None,
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait EnvironmentApi {
    /// Retrieve every non-deleted environment belonging to the application.
    async fn list_environments(
        &self,
        application_name: &str,
    ) -> Result<Vec<EnvironmentHandle>, Error>;
    /// Retrieve the tag mapping attached to an environment.
    async fn environment_tags(
        &self,
        environment_arn: &str,
    ) -> Result<HashMap<String, String>, Error>;
    /// Retrieve the environment's currently configured instance type.
    async fn current_instance_type(
        &self,
        application_name: &str,
        environment_name: &str,
    ) -> Result<Option<String>, Error>;
    /// Update the environment's configured instance type.
    async fn update_instance_type(
        &self,
        application_name: &str,
        environment_name: &str,
        instance_type: &str,
    ) -> Result<(), Error>;
}

#[async_trait]
pub trait InstanceApi {
    /// Retrieve instances currently in `state` whose `tag_key` tag is true.
    async fn instances_by_state_and_tag(
        &self,
        state: InstanceState,
        tag_key: &str,
    ) -> Result<Vec<InstanceSummary>, Error>;
    /// Freshly query the live state of a single instance.
    async fn instance_state(&self, instance_id: &str) -> Result<InstanceState, Error>;
    /// Request that the instance be started.
    async fn start_instance(&self, instance_id: &str) -> Result<(), Error>;
    /// Request that the instance be stopped.
    async fn stop_instance(&self, instance_id: &str) -> Result<(), Error>;
}

#[async_trait]
pub trait LogStore {
    /// Write a single object to the blob store.
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn test_tag_value_is_true() {
        assert!(tag_value_is_true(&tags(&[("auto-upgrade", "true")]), "auto-upgrade"));
        assert!(tag_value_is_true(&tags(&[("auto-upgrade", "True")]), "auto-upgrade"));
        assert!(tag_value_is_true(&tags(&[("auto-upgrade", " TRUE ")]), "auto-upgrade"));
        assert!(!tag_value_is_true(&tags(&[("auto-upgrade", "false")]), "auto-upgrade"));
        assert!(!tag_value_is_true(&tags(&[("auto-upgrade", "truthy")]), "auto-upgrade"));
        assert!(!tag_value_is_true(&tags(&[("auto-upgrade", "")]), "auto-upgrade"));
        assert!(!tag_value_is_true(&tags(&[]), "auto-upgrade"));
    }

    #[test]
    fn test_instance_state_round_trip() {
        for state in [
            InstanceState::Pending,
            InstanceState::Running,
            InstanceState::ShuttingDown,
            InstanceState::Terminated,
            InstanceState::Stopping,
            InstanceState::Stopped,
        ] {
            assert_eq!(InstanceState::parse(state.as_str()), Some(state));
        }
        assert_eq!(InstanceState::parse("rebooting"), None);
    }
}
