use crate::error::{BenchError, PreconditionError};
use crate::model::{CHANGE_SUBSCRIPTION, CREATE_SUBSCRIPTION, PING_SUBSCRIPTION, PushDbModel};
use crate::progress::Progress;
use log::{debug, error, info};
use pushcore::generator::{PushTechnology, auth_token, generate_push_token, random_token};
use pushcore::tuple::{MilliTime, ResultCode};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

pub const DEFAULT_CONCURRENCY: usize = 20;
pub const DEFAULT_TOTAL: usize = 100_000;
pub const DEFAULT_KEY_LEN: usize = 40;
pub const MIN_KEY_LEN: usize = 10;
pub const SUBSCRIPTIONS_PER_DEVICE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Workload {
    Subs,
    Ping,
    Change,
}

impl Workload {
    pub fn label(&self) -> &'static str {
        match self {
            Workload::Subs => "Subs",
            Workload::Ping => "Ping",
            Workload::Change => "Change",
        }
    }

    fn requires_subscriptions(&self) -> bool {
        !matches!(self, Workload::Subs)
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    pub concurrency: usize,
    pub total: usize,
    pub key_len: usize,
    pub silent: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            total: DEFAULT_TOTAL,
            key_len: DEFAULT_KEY_LEN,
            silent: false,
        }
    }
}

impl HarnessConfig {
    pub fn validate(&self) -> Result<(), PreconditionError> {
        let checks = [
            ("concurrency", self.concurrency, 1),
            ("total", self.total, 1),
            ("key length", self.key_len, MIN_KEY_LEN),
        ];
        for (name, value, min) in checks {
            if value < min {
                return Err(PreconditionError::InvalidParameter { name, value, min });
            }
        }
        Ok(())
    }

    /// Requests per worker. The remainder of an uneven split is not run.
    pub fn per_worker(&self) -> usize {
        self.total / self.concurrency.max(1)
    }

    /// Samples every `total / 10` increments, whatever the workload.
    pub fn progress(&self) -> Progress {
        Progress::new(self.total as u64, self.silent)
    }
}

/// Ids generated by a subs run. Subscriptions are stored device-major: the
/// three subscriptions of `devices[d]` sit at `3d..3d + 3`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedIds {
    pub devices: Vec<String>,
    pub subscriptions: Vec<String>,
}

impl GeneratedIds {
    pub fn device_for(&self, subscription_index: usize) -> &str {
        &self.devices[subscription_index / SUBSCRIPTIONS_PER_DEVICE]
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

/// Run-scoped state shared by every workload of one harness.
#[derive(Debug, Default)]
pub struct RunContext {
    ids: Mutex<GeneratedIds>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one worker's devices and their subscriptions in a single
    /// critical section.
    pub fn append(&self, devices: Vec<String>, subscriptions: Vec<String>) {
        let mut ids = self.lock();
        ids.devices.extend(devices);
        ids.subscriptions.extend(subscriptions);
    }

    pub fn snapshot(&self) -> Arc<GeneratedIds> {
        Arc::new(self.lock().clone())
    }

    pub fn device_count(&self) -> usize {
        self.lock().devices.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.lock().subscriptions.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GeneratedIds> {
        self.ids.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub workload: Workload,
    /// Partition iterations completed across all workers.
    pub requests: usize,
    /// Progress increments, i.e. the operations the rate is computed from.
    pub operations: u64,
    pub elapsed: Duration,
    pub ops_per_second: f64,
}

/// What one worker runs.
#[derive(Debug, Clone)]
struct WorkerPlan {
    index: usize,
    requests: usize,
    key_len: usize,
}

/// Drives one workload at a time over a shared model.
pub struct Harness {
    model: PushDbModel,
    config: HarnessConfig,
    context: Arc<RunContext>,
}

impl Harness {
    pub fn new(model: PushDbModel, config: HarnessConfig) -> Self {
        Self {
            model,
            config,
            context: Arc::new(RunContext::new()),
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    pub async fn run(&self, workload: Workload) -> Result<RunReport, BenchError> {
        self.config.validate()?;

        let ids = self.context.snapshot();
        if workload.requires_subscriptions() {
            if ids.is_empty() {
                return Err(PreconditionError::SubsNotRun.into());
            }
            if ids.subscriptions.len() != ids.devices.len() * SUBSCRIPTIONS_PER_DEVICE {
                return Err(PreconditionError::MismatchedLists {
                    devices: ids.devices.len(),
                    subscriptions: ids.subscriptions.len(),
                }
                .into());
            }
        }

        let per_worker = self.config.per_worker();
        info!(
            target: "Harness",
            "{} test, c = {}, n = {}",
            workload, self.config.concurrency, self.config.total
        );
        info!(target: "Harness", "Key length: {}", self.config.key_len);

        let progress = Arc::new(self.config.progress());
        let cancel = Arc::new(AtomicBool::new(false));
        let started = Instant::now();

        let mut workers = JoinSet::new();
        for index in 0..self.config.concurrency {
            let plan = WorkerPlan {
                index,
                requests: per_worker,
                key_len: self.config.key_len,
            };
            let model = self.model.clone();
            let context = self.context.clone();
            let ids = ids.clone();
            let progress = progress.clone();
            let cancel = cancel.clone();

            workers.spawn(async move {
                // Trips the shared flag on any early return or panic.
                let tripwire = scopeguard::guard(cancel.clone(), |flag| {
                    flag.store(true, Ordering::Relaxed);
                });
                let result = match workload {
                    Workload::Subs => run_subs(&model, &context, &plan, &progress, &cancel).await,
                    Workload::Ping => {
                        run_touch(&model, &ids, &plan, &progress, &cancel, false).await
                    }
                    Workload::Change => {
                        run_touch(&model, &ids, &plan, &progress, &cancel, true).await
                    }
                };
                if result.is_ok() {
                    scopeguard::ScopeGuard::into_inner(tripwire);
                }
                result
            });
        }

        let mut requests = 0;
        let mut first_error = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(done)) => requests += done,
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        error!(target: "Harness", "{workload} worker failed: {e}");
                        first_error = Some(e);
                    } else {
                        debug!(target: "Harness", "Further worker failure: {e}");
                    }
                }
                Err(join_error) => {
                    if join_error.is_panic() {
                        std::panic::resume_unwind(join_error.into_panic());
                    }
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let elapsed = started.elapsed();
        let operations = progress.count();
        let ops_per_second = operations as f64 / elapsed.as_secs_f64();
        info!(target: "Harness", "Elapsed time: {elapsed:?}");
        info!(target: "Harness", "Ops per second: {ops_per_second:.2}");

        Ok(RunReport {
            workload,
            requests,
            operations,
            elapsed,
            ops_per_second,
        })
    }
}

fn expect_ok(operation: &'static str, code: ResultCode) -> Result<(), BenchError> {
    if code.is_ok() {
        Ok(())
    } else {
        Err(PreconditionError::UnexpectedResult { operation, code }.into())
    }
}

/// Creates `plan.requests` devices with one subscription each, then adds
/// the remaining subscriptions per device.
async fn run_subs(
    model: &PushDbModel,
    context: &RunContext,
    plan: &WorkerPlan,
    progress: &Progress,
    cancel: &AtomicBool,
) -> Result<usize, BenchError> {
    let mut devices = Vec::with_capacity(plan.requests);
    let mut first_subscriptions = Vec::with_capacity(plan.requests);

    for _ in 0..plan.requests {
        if cancel.load(Ordering::Relaxed) {
            return Ok(devices.len());
        }
        let subscription_id = random_token(plan.key_len);
        let device_id = random_token(plan.key_len);
        let now = MilliTime::now();

        model
            .create_device(
                &device_id,
                &auth_token(),
                &generate_push_token(),
                PushTechnology::Gcm,
                now,
            )
            .await?;
        let code = model
            .create_subscription(&device_id, &subscription_id, now)
            .await?;
        expect_ok(CREATE_SUBSCRIPTION, code)?;
        progress.increment();

        devices.push(device_id);
        first_subscriptions.push(subscription_id);
    }

    let mut subscriptions = Vec::with_capacity(devices.len() * SUBSCRIPTIONS_PER_DEVICE);
    for (device_id, first) in devices.iter().zip(first_subscriptions) {
        subscriptions.push(first);
        for _ in 1..SUBSCRIPTIONS_PER_DEVICE {
            if cancel.load(Ordering::Relaxed) {
                return Ok(devices.len());
            }
            let subscription_id = random_token(plan.key_len);
            let code = model
                .create_subscription(device_id, &subscription_id, MilliTime::now())
                .await?;
            expect_ok(CREATE_SUBSCRIPTION, code)?;
            progress.increment();
            subscriptions.push(subscription_id);
        }
    }

    debug!(
        target: "Harness",
        "Worker {} created {} devices and {} subscriptions",
        plan.index,
        devices.len(),
        subscriptions.len()
    );
    let created = devices.len();
    context.append(devices, subscriptions);
    Ok(created)
}

/// Pings or changes the subscriptions of this worker's slice, wrapping
/// around the list when the slice runs past its end.
async fn run_touch(
    model: &PushDbModel,
    ids: &GeneratedIds,
    plan: &WorkerPlan,
    progress: &Progress,
    cancel: &AtomicBool,
    is_change: bool,
) -> Result<usize, BenchError> {
    let operation = if is_change {
        CHANGE_SUBSCRIPTION
    } else {
        PING_SUBSCRIPTION
    };
    let len = ids.subscriptions.len();
    let start = plan.index * plan.requests;

    for i in 0..plan.requests {
        if cancel.load(Ordering::Relaxed) {
            return Ok(i);
        }
        let index = (start + i) % len;
        let code = model
            .ping_or_change_subscription(
                ids.device_for(index),
                &ids.subscriptions[index],
                is_change,
                MilliTime::now(),
            )
            .await?;
        expect_ok(operation, code)?;
        progress.increment();
    }
    Ok(plan.requests)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_worker_drops_remainder() {
        let config = HarnessConfig {
            concurrency: 3,
            total: 10,
            ..Default::default()
        };
        assert_eq!(config.per_worker(), 3);
    }

    #[test]
    fn test_progress_step_follows_total() {
        let config = HarnessConfig {
            concurrency: 3,
            total: 100,
            ..Default::default()
        };
        assert_eq!(config.progress().step(), 10);

        let single = HarnessConfig {
            concurrency: 1,
            total: 100,
            silent: true,
            ..Default::default()
        };
        let progress = single.progress();
        let sampled: Vec<u64> = (1..=300)
            .filter_map(|n| progress.increment().map(|_| n))
            .collect();
        assert_eq!(sampled.len(), 30);
        assert_eq!(&sampled[..3], &[10, 20, 30]);
    }

    #[test]
    fn test_validate_rejects_short_keys() {
        let config = HarnessConfig {
            key_len: 9,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(PreconditionError::InvalidParameter {
                name: "key length",
                value: 9,
                min: MIN_KEY_LEN
            })
        );
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = HarnessConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_device_for_is_device_major() {
        let ids = GeneratedIds {
            devices: vec!["d0".into(), "d1".into()],
            subscriptions: (0..6).map(|i| format!("s{i}")).collect(),
        };
        assert_eq!(ids.device_for(0), "d0");
        assert_eq!(ids.device_for(2), "d0");
        assert_eq!(ids.device_for(3), "d1");
        assert_eq!(ids.device_for(5), "d1");
    }

    #[test]
    fn test_context_appends_together() {
        let context = RunContext::new();
        context.append(vec!["d".into()], vec!["a".into(), "b".into(), "c".into()]);
        context.append(vec!["e".into()], vec!["f".into(), "g".into(), "h".into()]);
        assert_eq!(context.device_count(), 2);
        assert_eq!(context.subscription_count(), 6);
        let ids = context.snapshot();
        assert_eq!(ids.device_for(4), "e");
    }
}
