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

use crate::audit::{commit_resize_logs, RunLog};
use crate::aws::{EnvironmentApi, EnvironmentDescriptor, LogStore};
use crate::config::ResizeConfig;
use crate::error::Error;
use crate::scanner::find_tagged_environments;
use crate::HandlerResponse;
use slog::{error, info, warn, Logger};

/// Direction discriminator for the resize decision ladder, keeping the two
/// passes apart in the run log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResizeDirection {
    Upgrade,
    Degrade,
}

impl ResizeDirection {
    fn label(&self) -> &'static str {
        match self {
            ResizeDirection::Upgrade => "UPGRADE",
            ResizeDirection::Degrade => "DOWNGRADE",
        }
    }
}

/// Requested run mode from the trigger payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResizeMode {
    Upgrade,
    Downgrade,
}

impl ResizeMode {
    /// Parse the trigger's optional mode string. Anything unrecognized is
    /// logged and treated as absent, which runs both passes.
    pub fn parse(logger: &Logger, raw: Option<&str>) -> Option<ResizeMode> {
        match raw {
            Some("upgrade") => Some(ResizeMode::Upgrade),
            Some("downgrade") => Some(ResizeMode::Downgrade),
            Some(other) => {
                warn!(logger, "Unrecognized trigger mode; running both passes";
                    "mode" => other);
                None
            }
            None => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            ResizeMode::Upgrade => "upgrade",
            ResizeMode::Downgrade => "downgrade",
        }
    }
}

/// Conditionally resize one environment. Returns true iff an update call was
/// issued; every skip and failure exits through its own log line.
pub async fn resize_environment<A>(
    logger: &Logger,
    api: &A,
    environment: &EnvironmentDescriptor,
    application_name: &str,
    direction: ResizeDirection,
    tag_key: &str,
    target_type: &str,
) -> bool
where
    A: EnvironmentApi + Sync,
{
    let label = direction.label();

    if tag_key.is_empty() {
        info!(logger, "No tag key configured; skipping";
            "direction" => label,
            "environment_name" => &environment.name);
        return false;
    }

    // The tag is consulted here, immediately before the mutating call, not
    // from any earlier evaluation.
    if !environment.tag_enabled(tag_key) {
        info!(logger, "Tag not set to true; skipping";
            "direction" => label,
            "environment_name" => &environment.name,
            "tag_key" => tag_key);
        return false;
    }

    if environment.current_instance_type.as_deref() == Some(target_type) {
        info!(logger, "Environment already at target instance type; skipping";
            "direction" => label,
            "environment_name" => &environment.name,
            "instance_type" => target_type);
        return false;
    }

    match api
        .update_instance_type(application_name, &environment.name, target_type)
        .await
    {
        Ok(()) => {
            info!(logger, "Update sent";
                "direction" => label,
                "environment_name" => &environment.name,
                "instance_type" => target_type);
            true
        }
        Err(err) => {
            error!(logger, "Failed to update environment";
                "direction" => label,
                "environment_name" => &environment.name,
                "error" => format!("{}", err));
            false
        }
    }
}

/// The resize pipeline: scan for candidates, then walk the decision ladder
/// for each, honoring the requested mode.
async fn run_passes<A>(
    logger: &Logger,
    api: &A,
    config: &ResizeConfig,
    mode: Option<ResizeMode>,
) -> Result<(), Error>
where
    A: EnvironmentApi + Sync,
{
    match mode {
        Some(ResizeMode::Upgrade) => {
            let environments = find_tagged_environments(
                logger,
                api,
                &config.application_name,
                Some(&config.upgrade_tag_key),
                None,
            )
            .await;
            for environment in &environments {
                resize_environment(
                    logger,
                    api,
                    environment,
                    &config.application_name,
                    ResizeDirection::Upgrade,
                    &config.upgrade_tag_key,
                    &config.upgrade_instance_type,
                )
                .await;
            }
        }
        Some(ResizeMode::Downgrade) => {
            let environments = find_tagged_environments(
                logger,
                api,
                &config.application_name,
                None,
                Some(&config.degrade_tag_key),
            )
            .await;
            for environment in &environments {
                resize_environment(
                    logger,
                    api,
                    environment,
                    &config.application_name,
                    ResizeDirection::Degrade,
                    &config.degrade_tag_key,
                    &config.degrade_instance_type,
                )
                .await;
            }
        }
        None => {
            let environments = find_tagged_environments(
                logger,
                api,
                &config.application_name,
                Some(&config.upgrade_tag_key),
                Some(&config.degrade_tag_key),
            )
            .await;
            for environment in &environments {
                let upgraded = resize_environment(
                    logger,
                    api,
                    environment,
                    &config.application_name,
                    ResizeDirection::Upgrade,
                    &config.upgrade_tag_key,
                    &config.upgrade_instance_type,
                )
                .await;
                // The degrade ladder is only walked when the upgrade pass
                // did not act.
                if !upgraded {
                    resize_environment(
                        logger,
                        api,
                        environment,
                        &config.application_name,
                        ResizeDirection::Degrade,
                        &config.degrade_tag_key,
                        &config.degrade_instance_type,
                    )
                    .await;
                }
            }
        }
    }

    info!(logger, "All applicable update commands have been sent");
    Ok(())
}

/// Entry point for one resize run: acquires the run log, executes the
/// pipeline, and always commits the log before any outcome, success or
/// error, reaches the platform.
pub async fn handle<A, S>(
    api: &A,
    store: &S,
    config: &ResizeConfig,
    raw_mode: Option<&str>,
    request_id: &str,
) -> Result<HandlerResponse, Error>
where
    A: EnvironmentApi + Sync,
    S: LogStore + Sync,
{
    let run_log = RunLog::new();
    let logger = run_log.logger("environment-resize");

    info!(logger, "Starting environment resize run";
        "mode" => raw_mode.unwrap_or("<absent>"),
        "request_id" => request_id);
    let mode = ResizeMode::parse(&logger, raw_mode);
    if let Some(mode) = mode {
        info!(logger, "Running a single pass"; "mode" => mode.as_str());
    }

    let outcome = run_passes(&logger, api, config, mode).await;
    if let Err(err) = &outcome {
        error!(logger, "Resize run failed"; "error" => format!("{}", err));
    }

    commit_resize_logs(&logger, store, config, request_id, &run_log).await;

    outcome?;
    Ok(HandlerResponse::with_body(
        "Commands sent. Check the environment console and the log bucket for details.",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::EnvironmentHandle;
    use async_trait::async_trait;
    use slog::{o, Drain};
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeEnvironmentApi {
        environments: Vec<EnvironmentHandle>,
        tags: HashMap<String, HashMap<String, String>>,
        instance_types: HashMap<String, String>,
        fail_update_for: HashSet<String>,
        updates: Mutex<Vec<(String, String)>>,
    }

    impl FakeEnvironmentApi {
        fn with_environment(
            mut self,
            name: &str,
            tags: &[(&str, &str)],
            instance_type: Option<&str>,
        ) -> Self {
            let arn = format!("arn:aws:elasticbeanstalk:::environment/{}", name);
            self.environments.push(EnvironmentHandle {
                name: name.to_string(),
                arn: arn.clone(),
            });
            self.tags.insert(
                arn,
                tags.iter()
                    .map(|(key, value)| (key.to_string(), value.to_string()))
                    .collect(),
            );
            if let Some(instance_type) = instance_type {
                self.instance_types
                    .insert(name.to_string(), instance_type.to_string());
            }
            self
        }

        fn updates(&self) -> Vec<(String, String)> {
            self.updates.lock().unwrap().clone()
        }

        fn descriptor(&self, name: &str) -> EnvironmentDescriptor {
            let arn = format!("arn:aws:elasticbeanstalk:::environment/{}", name);
            EnvironmentDescriptor {
                name: name.to_string(),
                tags: self.tags.get(&arn).cloned().unwrap_or_default(),
                current_instance_type: self.instance_types.get(name).cloned(),
                arn,
            }
        }
    }

    #[async_trait]
    impl EnvironmentApi for FakeEnvironmentApi {
        async fn list_environments(
            &self,
            _application_name: &str,
        ) -> Result<Vec<EnvironmentHandle>, Error> {
            Ok(self.environments.clone())
        }

        async fn environment_tags(
            &self,
            environment_arn: &str,
        ) -> Result<HashMap<String, String>, Error> {
            Ok(self.tags.get(environment_arn).cloned().unwrap_or_default())
        }

        async fn current_instance_type(
            &self,
            _application_name: &str,
            environment_name: &str,
        ) -> Result<Option<String>, Error> {
            Ok(self.instance_types.get(environment_name).cloned())
        }

        async fn update_instance_type(
            &self,
            _application_name: &str,
            environment_name: &str,
            instance_type: &str,
        ) -> Result<(), Error> {
            if self.fail_update_for.contains(environment_name) {
                snafu::whatever!("simulated update failure");
            }
            self.updates
                .lock()
                .unwrap()
                .push((environment_name.to_string(), instance_type.to_string()));
            Ok(())
        }
    }

    struct FakeLogStore {
        uploads: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl FakeLogStore {
        fn new() -> Self {
            Self {
                uploads: Mutex::new(Vec::new()),
            }
        }

        fn uploads(&self) -> Vec<(String, Vec<u8>)> {
            self.uploads.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LogStore for FakeLogStore {
        async fn put_object(&self, _bucket: &str, key: &str, body: Vec<u8>) -> Result<(), Error> {
            self.uploads.lock().unwrap().push((key.to_string(), body));
            Ok(())
        }
    }

    fn test_logger() -> Logger {
        let plain = slog_term::PlainSyncDecorator::new(std::io::stdout());
        Logger::root(slog_term::FullFormat::new(plain).build().fuse(), o!())
    }

    fn test_config() -> ResizeConfig {
        ResizeConfig {
            application_name: "demo-app".to_string(),
            upgrade_tag_key: "auto-upgrade".to_string(),
            upgrade_instance_type: "r6a.large".to_string(),
            degrade_tag_key: "auto-degrade".to_string(),
            degrade_instance_type: "t3a.nano".to_string(),
            log_bucket: "audit-bucket".to_string(),
            log_key_prefix: "environment-resize-logs".to_string(),
        }
    }

    #[tokio::test]
    async fn test_update_issued_iff_tag_true_and_type_differs() {
        // (tag value, current type, expected update count)
        let cases = [
            (Some("true"), "t3a.nano", 1),
            (Some("true"), "r6a.large", 0),
            (Some("false"), "t3a.nano", 0),
            (None, "t3a.nano", 0),
        ];

        for (tag_value, current, expected_updates) in cases {
            let tags: Vec<(&str, &str)> = tag_value
                .into_iter()
                .map(|value| ("auto-upgrade", value))
                .collect();
            let api =
                FakeEnvironmentApi::default().with_environment("env-a", &tags, Some(current));
            let environment = api.descriptor("env-a");

            let issued = resize_environment(
                &test_logger(),
                &api,
                &environment,
                "demo-app",
                ResizeDirection::Upgrade,
                "auto-upgrade",
                "r6a.large",
            )
            .await;

            assert_eq!(api.updates().len(), expected_updates);
            assert_eq!(issued, expected_updates == 1);
        }
    }

    #[tokio::test]
    async fn test_empty_tag_key_skips() {
        let api = FakeEnvironmentApi::default().with_environment(
            "env-a",
            &[("auto-upgrade", "true")],
            Some("t3a.nano"),
        );
        let environment = api.descriptor("env-a");

        let issued = resize_environment(
            &test_logger(),
            &api,
            &environment,
            "demo-app",
            ResizeDirection::Upgrade,
            "",
            "r6a.large",
        )
        .await;

        assert!(!issued);
        assert!(api.updates().is_empty());
    }

    #[tokio::test]
    async fn test_update_failure_is_contained_and_run_continues() {
        let mut api = FakeEnvironmentApi::default()
            .with_environment("env-broken", &[("auto-upgrade", "true")], Some("t3a.nano"))
            .with_environment("env-ok", &[("auto-upgrade", "true")], Some("t3a.nano"));
        api.fail_update_for.insert("env-broken".to_string());

        let outcome = run_passes(
            &test_logger(),
            &api,
            &test_config(),
            Some(ResizeMode::Upgrade),
        )
        .await;

        assert!(outcome.is_ok());
        assert_eq!(
            api.updates(),
            vec![("env-ok".to_string(), "r6a.large".to_string())]
        );
    }

    #[tokio::test]
    async fn test_upgrade_mode_end_to_end() {
        let api = FakeEnvironmentApi::default().with_environment(
            "env-a",
            &[("auto-upgrade", "true")],
            Some("t3a.nano"),
        );
        let store = FakeLogStore::new();

        let response = handle(&api, &store, &test_config(), Some("upgrade"), "req-42")
            .await
            .unwrap();

        assert_eq!(response.status_code, 200);
        assert_eq!(
            api.updates(),
            vec![("env-a".to_string(), "r6a.large".to_string())]
        );

        let uploads = store.uploads();
        assert_eq!(uploads.len(), 2);
        let (archive_key, archive_body) = &uploads[0];
        let (latest_key, latest_body) = &uploads[1];
        assert!(archive_key.starts_with("environment-resize-logs/archived/"));
        assert!(archive_key.contains("req-42"));
        assert_eq!(
            latest_key,
            "environment-resize-logs/latest/environment-resize-latest.log"
        );
        assert_eq!(archive_body, latest_body);

        let body = String::from_utf8(archive_body.clone()).unwrap();
        assert!(body.contains("Update sent"));
        assert!(body.contains("r6a.large"));
    }

    #[tokio::test]
    async fn test_both_passes_evaluated_when_already_at_target() {
        let api = FakeEnvironmentApi::default().with_environment(
            "env-a",
            &[("auto-upgrade", "true")],
            Some("r6a.large"),
        );
        let store = FakeLogStore::new();

        handle(&api, &store, &test_config(), None, "req-43")
            .await
            .unwrap();

        assert!(api.updates().is_empty());

        let uploads = store.uploads();
        let body = String::from_utf8(uploads[0].1.clone()).unwrap();
        // The upgrade ladder exits on "already at target"...
        assert!(body.contains("already at target instance type; skipping"));
        assert!(body.contains("direction=UPGRADE"));
        // ...and the degrade ladder is still consulted afterwards.
        assert!(body.contains("direction=DOWNGRADE"));
        assert!(body.contains("Tag not set to true; skipping"));
    }

    #[tokio::test]
    async fn test_no_lines_leak_between_sequential_runs() {
        let config = test_config();
        let store = FakeLogStore::new();

        let first_api = FakeEnvironmentApi::default().with_environment(
            "env-first-run",
            &[("auto-upgrade", "true")],
            Some("t3a.nano"),
        );
        handle(&first_api, &store, &config, Some("upgrade"), "req-1")
            .await
            .unwrap();

        let second_api = FakeEnvironmentApi::default().with_environment(
            "env-second-run",
            &[("auto-upgrade", "true")],
            Some("t3a.nano"),
        );
        handle(&second_api, &store, &config, Some("upgrade"), "req-2")
            .await
            .unwrap();

        let uploads = store.uploads();
        assert_eq!(uploads.len(), 4);
        let second_body = String::from_utf8(uploads[3].1.clone()).unwrap();
        assert!(second_body.contains("env-second-run"));
        assert!(!second_body.contains("env-first-run"));
        assert!(!second_body.contains("req-1"));
    }

    #[tokio::test]
    async fn test_unrecognized_mode_runs_both_passes() {
        let api = FakeEnvironmentApi::default().with_environment(
            "env-a",
            &[("auto-degrade", "true")],
            Some("r6a.large"),
        );
        let store = FakeLogStore::new();

        handle(&api, &store, &test_config(), Some("sideways"), "req-44")
            .await
            .unwrap();

        // The degrade pass still ran and acted.
        assert_eq!(
            api.updates(),
            vec![("env-a".to_string(), "t3a.nano".to_string())]
        );
    }
}
