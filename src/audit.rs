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

use crate::aws::LogStore;
use crate::config::{PowerConfig, ResizeConfig};
use chrono::Utc;
use slog::{error, info, o, Drain, Level, Logger, OwnedKVList, Record, KV};
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

/// ctime-style timestamp used in every captured log line.
const LINE_TIMESTAMP_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// In-memory log accumulator for a single handler run.
///
/// Holds the ordered sequence of formatted lines emitted during the run; the
/// lines are joined and uploaded to the blob store at run end and the buffer
/// is cleared on every path. A fresh `RunLog` is acquired per invocation, so
/// a reused execution environment can never leak lines into the next run.
pub struct RunLog {
    lines: Arc<Mutex<Vec<String>>>,
}

impl RunLog {
    pub fn new() -> Self {
        Self {
            lines: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Root logger for the run. Every record is duplicated to a JSON drain
    /// on stdout (collected by the hosting platform) and to this
    /// accumulator.
    pub fn logger(&self, handler: &'static str) -> Logger {
        let stdout = Mutex::new(slog_json::Json::default(std::io::stdout())).ignore_res();
        let drain = slog::Duplicate::new(stdout, self.memory_drain()).ignore_res();
        let drain = slog::LevelFilter::new(drain, Level::Info).ignore_res();
        Logger::root(drain, o!("handler" => handler))
    }

    /// The accumulator half on its own, for composing custom loggers.
    pub fn memory_drain(&self) -> MemoryDrain {
        MemoryDrain {
            lines: Arc::clone(&self.lines),
        }
    }

    /// Copy of the accumulated lines, in append order.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// The joined, newline-separated log body as uploaded to the store.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.lines().join("\n").into_bytes()
    }

    /// Drop all accumulated lines.
    pub fn clear(&self) {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain capturing formatted records into the run's line buffer.
pub struct MemoryDrain {
    lines: Arc<Mutex<Vec<String>>>,
}

impl Drain for MemoryDrain {
    type Ok = ();
    type Err = slog::Never;

    fn log(&self, record: &Record, _values: &OwnedKVList) -> Result<Self::Ok, Self::Err> {
        let mut pairs = PairCollector::default();
        record.kv().serialize(record, &mut pairs).ok();
        let line = format!(
            "{}  [{}] {}{}",
            record.level().as_str(),
            Utc::now().format(LINE_TIMESTAMP_FORMAT),
            record.msg(),
            pairs.rendered,
        );
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(line);
        Ok(())
    }
}

/// Renders record key/value pairs as trailing ` key=value` fragments.
#[derive(Default)]
struct PairCollector {
    rendered: String,
}

impl slog::Serializer for PairCollector {
    fn emit_arguments(&mut self, key: slog::Key, value: &std::fmt::Arguments) -> slog::Result {
        let _ = write!(self.rendered, " {}={}", key, value);
        Ok(())
    }
}

/// Upload the resize run's log twice: an archive copy keyed by date and
/// request id, and a fixed "latest" copy overwritten on every run. The
/// accumulator is cleared afterwards regardless of upload outcome.
pub async fn commit_resize_logs<S>(
    logger: &Logger,
    store: &S,
    config: &ResizeConfig,
    request_id: &str,
    run_log: &RunLog,
) where
    S: LogStore + Sync,
{
    let body = run_log.to_bytes();
    let now = Utc::now();
    let archive_key = format!(
        "{}/archived/{}/environment-resize-{}-{}.log",
        config.log_key_prefix,
        now.format("%Y/%m/%d"),
        now.format("%H-%M-%S"),
        request_id,
    );
    let latest_key = format!(
        "{}/latest/environment-resize-latest.log",
        config.log_key_prefix
    );

    upload(logger, store, &config.log_bucket, &archive_key, body.clone(), "archived log").await;
    upload(logger, store, &config.log_bucket, &latest_key, body, "latest log").await;
    run_log.clear();
}

/// Upload the power run's log as a single timestamped object. The
/// accumulator is cleared afterwards regardless of upload outcome.
pub async fn commit_power_logs<S>(
    logger: &Logger,
    store: &S,
    config: &PowerConfig,
    run_log: &RunLog,
) where
    S: LogStore + Sync,
{
    let body = run_log.to_bytes();
    let key = format!(
        "{}/instance-power-{}.log",
        config.log_key_prefix,
        Utc::now().format("%Y-%m-%d-%H-%M-%S"),
    );

    upload(logger, store, &config.log_bucket, &key, body, "run log").await;
    run_log.clear();
}

/// Upload failures are logged, never raised.
async fn upload<S>(
    logger: &Logger,
    store: &S,
    bucket: &str,
    key: &str,
    body: Vec<u8>,
    description: &str,
) where
    S: LogStore + Sync,
{
    match store.put_object(bucket, key, body).await {
        Ok(()) => info!(logger, "Uploaded run log";
            "description" => description,
            "bucket" => bucket,
            "key" => key),
        Err(err) => error!(logger, "Failed to upload run log";
            "description" => description,
            "bucket" => bucket,
            "key" => key,
            "error" => format!("{}", err)),
    }
}
