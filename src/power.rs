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

use crate::audit::{commit_power_logs, RunLog};
use crate::aws::{InstanceApi, InstanceState, InstanceSummary, LogStore};
use crate::config::PowerConfig;
use crate::error::Error;
use crate::poller::{await_instance_state, log_observed_state};
use crate::HandlerResponse;
use slog::{crit, error, info, Logger};
use std::time::Instant;

/// One issued stop call paired with whether the API accepted it, so the
/// processing phase cannot drift out of step with the discovery phase.
struct StopAttempt {
    instance: InstanceSummary,
    confirmed: bool,
}

/// Find instances currently in `state` whose control tag is set. Listing
/// failure is logged and yields no candidates.
pub async fn find_instances<A>(
    logger: &Logger,
    api: &A,
    state: InstanceState,
    tag_key: &str,
) -> Vec<InstanceSummary>
where
    A: InstanceApi + Sync,
{
    match api.instances_by_state_and_tag(state, tag_key).await {
        Ok(instances) => {
            info!(logger, "Instance lookup complete";
                "state" => state.as_str(),
                "tag_key" => tag_key,
                "instances" => instances.len());
            instances
        }
        Err(err) => {
            error!(logger, "Failed to list instances";
                "state" => state.as_str(),
                "tag_key" => tag_key,
                "error" => format!("{}", err));
            Vec::new()
        }
    }
}

/// Issue a stop call for one instance. Errors are logged, never raised.
pub async fn stop_instance<A>(logger: &Logger, api: &A, instance: &InstanceSummary) -> bool
where
    A: InstanceApi + Sync,
{
    match api.stop_instance(&instance.instance_id).await {
        Ok(()) => {
            info!(logger, "Attempting stop";
                "instance_id" => &instance.instance_id,
                "instance_name" => instance.display_name());
            true
        }
        Err(err) => {
            error!(logger, "Failed to stop instance";
                "instance_id" => &instance.instance_id,
                "instance_name" => instance.display_name(),
                "error" => format!("{}", err));
            false
        }
    }
}

/// Issue a start call for one instance. Errors are logged, never raised.
pub async fn start_instance<A>(logger: &Logger, api: &A, instance: &InstanceSummary) -> bool
where
    A: InstanceApi + Sync,
{
    match api.start_instance(&instance.instance_id).await {
        Ok(()) => {
            info!(logger, "Attempting start";
                "instance_id" => &instance.instance_id,
                "instance_name" => instance.display_name());
            true
        }
        Err(err) => {
            error!(logger, "Failed to start instance";
                "instance_id" => &instance.instance_id,
                "instance_name" => instance.display_name(),
                "error" => format!("{}", err));
            false
        }
    }
}

/// Re-fetch the instance's live state from a fresh query, log it, then poll
/// until `expected`. Returns whether convergence was observed.
async fn converge<A>(
    logger: &Logger,
    api: &A,
    instance: &InstanceSummary,
    expected: InstanceState,
    config: &PowerConfig,
) -> bool
where
    A: InstanceApi + Sync,
{
    match api.instance_state(&instance.instance_id).await {
        Ok(state) => log_observed_state(logger, instance, state),
        Err(err) => {
            error!(logger, "Failed to query instance state; skipping convergence wait";
                "instance_id" => &instance.instance_id,
                "error" => format!("{}", err));
            return false;
        }
    }

    match await_instance_state(logger, api, instance, expected, &config.poll).await {
        Ok(_) => true,
        Err(err) => {
            error!(logger, "Instance did not converge";
                "instance_id" => &instance.instance_id,
                "error" => format!("{}", err));
            false
        }
    }
}

/// The power pipeline: a stop pass and a start pass, each gated on its
/// scheduled hour. Returns the number of instances operated on.
async fn run_passes<A>(
    logger: &Logger,
    api: &A,
    config: &PowerConfig,
    hour: u32,
) -> Result<u32, Error>
where
    A: InstanceApi + Sync,
{
    let mut operated = 0u32;

    if hour == config.stop_hour_utc {
        info!(logger, "Auto-stop passed the hour check"; "hour_utc" => hour);
        let candidates =
            find_instances(logger, api, InstanceState::Running, &config.stop_tag_key).await;

        let mut attempts = Vec::new();
        for instance in candidates {
            let confirmed = stop_instance(logger, api, &instance).await;
            attempts.push(StopAttempt {
                instance,
                confirmed,
            });
        }

        // Most-recently-enumerated first; the ordering carries no meaning
        // beyond every candidate being handled exactly once.
        while let Some(attempt) = attempts.pop() {
            if !attempt.confirmed {
                crit!(logger, "Stop action denied";
                    "instance_id" => &attempt.instance.instance_id,
                    "instance_name" => attempt.instance.display_name());
                continue;
            }
            info!(logger, "Stopping instance";
                "instance_id" => &attempt.instance.instance_id,
                "instance_name" => attempt.instance.display_name());
            if converge(logger, api, &attempt.instance, InstanceState::Stopped, config).await {
                operated += 1;
            }
        }
    } else {
        info!(logger, "Auto-stop will only be triggered at the scheduled hour";
            "scheduled_hour_utc" => config.stop_hour_utc,
            "hour_utc" => hour);
    }

    if hour == config.start_hour_utc {
        info!(logger, "Auto-start passed the hour check"; "hour_utc" => hour);
        let mut candidates =
            find_instances(logger, api, InstanceState::Stopped, &config.start_tag_key).await;

        for instance in &candidates {
            start_instance(logger, api, instance).await;
        }

        // Each record is re-derived from the listing that produced it, never
        // from state left over by the stop pass.
        while let Some(instance) = candidates.pop() {
            info!(logger, "Started instance";
                "instance_id" => &instance.instance_id,
                "instance_name" => instance.display_name());
            if converge(logger, api, &instance, InstanceState::Running, config).await {
                operated += 1;
            }
        }
    } else {
        info!(logger, "Auto-start will only be triggered at the scheduled hour";
            "scheduled_hour_utc" => config.start_hour_utc,
            "hour_utc" => hour);
    }

    Ok(operated)
}

/// Entry point for one power run: acquires the run log, executes the stop
/// and start passes for the given UTC hour, and always commits the log
/// before any outcome reaches the platform.
pub async fn handle<A, S>(
    api: &A,
    store: &S,
    config: &PowerConfig,
    hour: u32,
) -> Result<HandlerResponse, Error>
where
    A: InstanceApi + Sync,
    S: LogStore + Sync,
{
    let run_log = RunLog::new();
    let logger = run_log.logger("instance-power");
    let started = Instant::now();

    info!(logger, "Power run started"; "hour_utc" => hour);

    let outcome = run_passes(&logger, api, config, hour).await;
    match &outcome {
        Ok(operated) => info!(logger, "Power run completed";
            "instances_operated" => *operated,
            "elapsed_seconds" => started.elapsed().as_secs_f64()),
        Err(err) => error!(logger, "Power run failed"; "error" => format!("{}", err)),
    }

    commit_power_logs(&logger, store, config, &run_log).await;

    outcome?;
    Ok(HandlerResponse::ok())
}
