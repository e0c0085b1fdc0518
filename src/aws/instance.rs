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

use crate::aws::{InstanceApi, InstanceState, InstanceSummary};
use crate::error::*;
use async_trait::async_trait;
use aws_sdk_ec2::types::Filter;
use aws_sdk_ec2::Client;
use snafu::{OptionExt, ResultExt};

/// Tag key whose value names an instance in the console and in logs.
const NAME_TAG_KEY: &str = "Name";

/// EC2 instance related functions.
pub struct Ec2InstanceClient {
    client: Client,
}

impl Ec2InstanceClient {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl InstanceApi for Ec2InstanceClient {
    async fn instances_by_state_and_tag(
        &self,
        state: InstanceState,
        tag_key: &str,
    ) -> Result<Vec<InstanceSummary>, Error> {
        // The tag filter accepts both spellings the consoles produce.
        let response = self
            .client
            .describe_instances()
            .filters(
                Filter::builder()
                    .name(format!("tag:{}", tag_key))
                    .values("true")
                    .values("True")
                    .build(),
            )
            .filters(
                Filter::builder()
                    .name("instance-state-name")
                    .values(state.as_str())
                    .build(),
            )
            .send()
            .await
            .map_err(aws_sdk_ec2::Error::from)
            .context(Ec2Snafu)?;

        let mut summaries = Vec::new();
        for reservation in response.reservations() {
            for instance in reservation.instances() {
                let Some(instance_id) = instance.instance_id() else {
                    continue;
                };
                let name = instance
                    .tags()
                    .iter()
                    .find(|tag| tag.key() == Some(NAME_TAG_KEY))
                    .and_then(|tag| tag.value())
                    .map(str::to_string);
                summaries.push(InstanceSummary {
                    instance_id: instance_id.to_string(),
                    name,
                });
            }
        }
        Ok(summaries)
    }

    async fn instance_state(&self, instance_id: &str) -> Result<InstanceState, Error> {
        let response = self
            .client
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(aws_sdk_ec2::Error::from)
            .context(Ec2Snafu)?;

        let instance = response
            .reservations()
            .iter()
            .flat_map(|reservation| reservation.instances())
            .find(|instance| instance.instance_id() == Some(instance_id))
            .context(InstanceNotFoundSnafu { instance_id })?;

        let state_name = instance
            .state()
            .and_then(|state| state.name())
            .map(|name| name.as_str().to_string())
            .unwrap_or_default();
        match InstanceState::parse(&state_name) {
            Some(state) => Ok(state),
            None => UnrecognizedStateSnafu {
                instance_id,
                state: state_name,
            }
            .fail(),
        }
    }

    async fn start_instance(&self, instance_id: &str) -> Result<(), Error> {
        self.client
            .start_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(aws_sdk_ec2::Error::from)
            .context(Ec2Snafu)?;
        Ok(())
    }

    async fn stop_instance(&self, instance_id: &str) -> Result<(), Error> {
        self.client
            .stop_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(aws_sdk_ec2::Error::from)
            .context(Ec2Snafu)?;
        Ok(())
    }
}
