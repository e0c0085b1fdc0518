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

use crate::aws::{tag_value_is_true, EnvironmentApi, EnvironmentDescriptor};
use slog::{error, info, Logger};

/// Find the application's environments whose tags request a resize.
///
/// Read calls only. Failure of the listing call itself is logged and yields
/// an empty result; per-environment failures are logged and skip that
/// environment alone.
pub async fn find_tagged_environments<A>(
    logger: &Logger,
    api: &A,
    application_name: &str,
    upgrade_tag_key: Option<&str>,
    degrade_tag_key: Option<&str>,
) -> Vec<EnvironmentDescriptor>
where
    A: EnvironmentApi + Sync,
{
    let handles = match api.list_environments(application_name).await {
        Ok(handles) => handles,
        Err(err) => {
            error!(logger, "Failed to list environments";
                "application_name" => application_name,
                "error" => format!("{}", err));
            return Vec::new();
        }
    };

    let mut environments = Vec::new();
    for handle in handles {
        let tags = match api.environment_tags(&handle.arn).await {
            Ok(tags) => tags,
            Err(err) => {
                error!(logger, "Failed to fetch environment tags; skipping environment";
                    "environment_name" => &handle.name,
                    "error" => format!("{}", err));
                continue;
            }
        };

        // At least one of the supplied tag keys must be affirmatively set.
        let upgrade_requested = upgrade_tag_key
            .map(|key| tag_value_is_true(&tags, key))
            .unwrap_or(false);
        let degrade_requested = degrade_tag_key
            .map(|key| tag_value_is_true(&tags, key))
            .unwrap_or(false);
        if !(upgrade_requested || degrade_requested) {
            continue;
        }

        // Best effort: an unknown instance type stays unset and is resolved
        // against the target at decision time.
        let current_instance_type = match api
            .current_instance_type(application_name, &handle.name)
            .await
        {
            Ok(current) => current,
            Err(err) => {
                error!(logger, "Failed to fetch current instance type";
                    "environment_name" => &handle.name,
                    "error" => format!("{}", err));
                None
            }
        };

        environments.push(EnvironmentDescriptor {
            name: handle.name,
            arn: handle.arn,
            tags,
            current_instance_type,
        });
    }

    info!(logger, "Environment scan complete";
        "application_name" => application_name,
        "environments" => environments.len());
    environments
}
