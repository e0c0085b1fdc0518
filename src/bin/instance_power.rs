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

use aws_config::BehaviorVersion;
use chrono::{Timelike, Utc};
use lambda_runtime::{run, service_fn, LambdaEvent};
use offpeak::aws::instance::Ec2InstanceClient;
use offpeak::aws::storage::S3LogStore;
use offpeak::config::PowerConfig;
use offpeak::{power, HandlerResponse};

/// The trigger payload carries nothing of interest; the handler branches on
/// the current UTC hour instead.
async fn function_handler(
    _event: LambdaEvent<serde_json::Value>,
) -> Result<HandlerResponse, lambda_runtime::Error> {
    let config = PowerConfig::from_env()?;
    let sdk_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let api = Ec2InstanceClient::new(&sdk_config);
    let store = S3LogStore::new(&sdk_config);

    let response = power::handle(&api, &store, &config, Utc::now().hour()).await?;
    Ok(response)
}

#[tokio::main]
async fn main() -> Result<(), lambda_runtime::Error> {
    run(service_fn(function_handler)).await
}
