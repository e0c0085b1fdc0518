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

use crate::aws::{EnvironmentApi, EnvironmentHandle};
use crate::error::*;
use async_trait::async_trait;
use aws_sdk_elasticbeanstalk::types::ConfigurationOptionSetting;
use aws_sdk_elasticbeanstalk::Client;
use snafu::ResultExt;
use std::collections::HashMap;

/// Namespace holding the instance type option of an environment's launch
/// configuration.
const LAUNCH_CONFIGURATION_NAMESPACE: &str = "aws:autoscaling:launchconfiguration";
/// Option name of the instance type setting within that namespace.
const INSTANCE_TYPE_OPTION: &str = "InstanceType";

/// Elastic Beanstalk environment related functions.
pub struct BeanstalkEnvironmentClient {
    client: Client,
}

impl BeanstalkEnvironmentClient {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl EnvironmentApi for BeanstalkEnvironmentClient {
    async fn list_environments(
        &self,
        application_name: &str,
    ) -> Result<Vec<EnvironmentHandle>, Error> {
        // Retrieve the list of live environments belonging to the application.
        let response = self
            .client
            .describe_environments()
            .application_name(application_name)
            .include_deleted(false)
            .send()
            .await
            .map_err(aws_sdk_elasticbeanstalk::Error::from)
            .context(BeanstalkSnafu)?;

        let mut handles = Vec::new();
        for environment in response.environments() {
            // An environment without a name or arn cannot be addressed by
            // any later call.
            if let (Some(name), Some(arn)) = (
                environment.environment_name(),
                environment.environment_arn(),
            ) {
                handles.push(EnvironmentHandle {
                    name: name.to_string(),
                    arn: arn.to_string(),
                });
            }
        }
        Ok(handles)
    }

    async fn environment_tags(
        &self,
        environment_arn: &str,
    ) -> Result<HashMap<String, String>, Error> {
        let response = self
            .client
            .list_tags_for_resource()
            .resource_arn(environment_arn)
            .send()
            .await
            .map_err(aws_sdk_elasticbeanstalk::Error::from)
            .context(BeanstalkSnafu)?;

        let mut tags = HashMap::new();
        for tag in response.resource_tags() {
            if let (Some(key), Some(value)) = (tag.key(), tag.value()) {
                tags.insert(key.to_string(), value.to_string());
            }
        }
        Ok(tags)
    }

    async fn current_instance_type(
        &self,
        application_name: &str,
        environment_name: &str,
    ) -> Result<Option<String>, Error> {
        let response = self
            .client
            .describe_configuration_settings()
            .application_name(application_name)
            .environment_name(environment_name)
            .send()
            .await
            .map_err(aws_sdk_elasticbeanstalk::Error::from)
            .context(BeanstalkSnafu)?;

        for settings in response.configuration_settings() {
            for option in settings.option_settings() {
                if option.namespace() == Some(LAUNCH_CONFIGURATION_NAMESPACE)
                    && option.option_name() == Some(INSTANCE_TYPE_OPTION)
                {
                    return Ok(option.value().map(str::to_string));
                }
            }
        }
        Ok(None)
    }

    async fn update_instance_type(
        &self,
        application_name: &str,
        environment_name: &str,
        instance_type: &str,
    ) -> Result<(), Error> {
        let option = ConfigurationOptionSetting::builder()
            .namespace(LAUNCH_CONFIGURATION_NAMESPACE)
            .option_name(INSTANCE_TYPE_OPTION)
            .value(instance_type)
            .build();

        self.client
            .update_environment()
            .application_name(application_name)
            .environment_name(environment_name)
            .option_settings(option)
            .send()
            .await
            .map_err(aws_sdk_elasticbeanstalk::Error::from)
            .context(BeanstalkSnafu)?;
        Ok(())
    }
}
