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
use slog::{crit, info, warn, Logger};
use std::time::Duration;
use tokio::time::sleep;

/// Bounds for the convergence poll that follows every start/stop call.
#[derive(Clone, Debug)]
pub struct PollPolicy {
    /// Fixed delay between consecutive state queries.
    pub interval: Duration,
    /// Fresh state queries issued before giving up.
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 600,
        }
    }
}

/// Log a freshly observed instance state. Transitional states are warnings;
/// `shutting-down` means the instance is being terminated out from under the
/// scheduler and is escalated.
pub(crate) fn log_observed_state(logger: &Logger, instance: &InstanceSummary, state: InstanceState) {
    info!(logger, "Observed instance state";
        "instance_id" => &instance.instance_id,
        "instance_name" => instance.display_name(),
        "state" => state.as_str());
    match state {
        InstanceState::Pending | InstanceState::Stopping => {
            warn!(logger, "Instance is mid-transition; interrupting it by rerunning the handler is not recommended";
                "instance_id" => &instance.instance_id,
                "state" => state.as_str());
        }
        InstanceState::ShuttingDown => {
            crit!(logger, "Instance is being terminated; escalate to the infrastructure admin";
                "instance_id" => &instance.instance_id,
                "state" => state.as_str());
        }
        _ => {}
    }
}

/// Repeatedly re-query the instance's live state until it equals `expected`,
/// sleeping `policy.interval` between queries. Returns the number of queries
/// issued, or `Error::ConvergenceTimeout` once `policy.max_attempts` queries
/// have all observed something else.
pub async fn await_instance_state<A>(
    logger: &Logger,
    api: &A,
    instance: &InstanceSummary,
    expected: InstanceState,
    policy: &PollPolicy,
) -> Result<u32, Error>
where
    A: InstanceApi + Sync,
{
    for attempt in 1..=policy.max_attempts {
        let observed = api.instance_state(&instance.instance_id).await?;
        if observed == expected {
            info!(logger, "Confirmed expected instance state";
                "instance_id" => &instance.instance_id,
                "instance_name" => instance.display_name(),
                "state" => expected.as_str(),
                "attempts" => attempt);
            return Ok(attempt);
        }
        log_observed_state(logger, instance, observed);
        sleep(policy.interval).await;
    }

    ConvergenceTimeoutSnafu {
        instance_id: &instance.instance_id,
        expected,
        attempts: policy.max_attempts,
    }
    .fail()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use async_trait::async_trait;
    use slog::{o, Drain};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedInstanceApi {
        states: Mutex<VecDeque<InstanceState>>,
        queries: Mutex<u32>,
    }

    impl ScriptedInstanceApi {
        fn new(states: &[InstanceState]) -> Self {
            Self {
                states: Mutex::new(states.iter().copied().collect()),
                queries: Mutex::new(0),
            }
        }

        fn queries(&self) -> u32 {
            *self.queries.lock().unwrap()
        }
    }

    #[async_trait]
    impl InstanceApi for ScriptedInstanceApi {
        async fn instances_by_state_and_tag(
            &self,
            _state: InstanceState,
            _tag_key: &str,
        ) -> Result<Vec<InstanceSummary>, Error> {
            Ok(Vec::new())
        }

        async fn instance_state(&self, _instance_id: &str) -> Result<InstanceState, Error> {
            *self.queries.lock().unwrap() += 1;
            // Once the script runs dry the final state repeats.
            let mut states = self.states.lock().unwrap();
            if states.len() > 1 {
                Ok(states.pop_front().unwrap())
            } else {
                Ok(*states.front().unwrap())
            }
        }

        async fn start_instance(&self, _instance_id: &str) -> Result<(), Error> {
            Ok(())
        }

        async fn stop_instance(&self, _instance_id: &str) -> Result<(), Error> {
            Ok(())
        }
    }

    fn test_logger() -> Logger {
        let plain = slog_term::PlainSyncDecorator::new(std::io::stdout());
        Logger::root(slog_term::FullFormat::new(plain).build().fuse(), o!())
    }

    fn test_instance() -> InstanceSummary {
        InstanceSummary {
            instance_id: "i-0123456789abcdef0".to_string(),
            name: Some("worker-1".to_string()),
        }
    }

    fn fast_policy(max_attempts: u32) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(1),
            max_attempts,
        }
    }

    #[tokio::test]
    async fn test_poller_returns_once_state_converges() {
        let api = ScriptedInstanceApi::new(&[
            InstanceState::Pending,
            InstanceState::Pending,
            InstanceState::Stopped,
        ]);

        let attempts = await_instance_state(
            &test_logger(),
            &api,
            &test_instance(),
            InstanceState::Stopped,
            &fast_policy(10),
        )
        .await
        .unwrap();

        assert_eq!(attempts, 3);
        assert_eq!(api.queries(), 3);
    }

    #[tokio::test]
    async fn test_poller_times_out_after_max_attempts() {
        let api = ScriptedInstanceApi::new(&[InstanceState::Stopping]);

        let result = await_instance_state(
            &test_logger(),
            &api,
            &test_instance(),
            InstanceState::Stopped,
            &fast_policy(3),
        )
        .await;

        assert!(matches!(
            result,
            Err(Error::ConvergenceTimeout { attempts: 3, .. })
        ));
        assert_eq!(api.queries(), 3);
    }
}
