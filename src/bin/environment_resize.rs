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
use lambda_runtime::{run, service_fn, LambdaEvent};
use offpeak::aws::environment::BeanstalkEnvironmentClient;
use offpeak::aws::storage::S3LogStore;
use offpeak::config::ResizeConfig;
use offpeak::{resize, HandlerResponse};
use serde::Deserialize;

/// Constant input delivered by the scheduler rule.
#[derive(Debug, Default, Deserialize)]
struct ResizeTrigger {
    mode: Option<String>,
}

async fn function_handler(
    event: LambdaEvent<ResizeTrigger>,
) -> Result<HandlerResponse, lambda_runtime::Error> {
    let config = ResizeConfig::from_env()?;
    let sdk_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let api = BeanstalkEnvironmentClient::new(&sdk_config);
    let store = S3LogStore::new(&sdk_config);

    let response = resize::handle(
        &api,
        &store,
        &config,
        event.payload.mode.as_deref(),
        &event.context.request_id,
    )
    .await?;
    Ok(response)
}

#[tokio::main]
async fn main() -> Result<(), lambda_runtime::Error> {
    run(service_fn(function_handler)).await
}
