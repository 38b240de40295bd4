//! Concurrency verification harness.
//!
//! A fixed pool of workers runs a [`StressTask`] for a number of iterations
//! each. The first failure is kept and stops every worker at its next
//! iteration; the run ends when the latch counts every worker down.
//!
//! `serialized` runs one worker at a time, which separates genuine
//! concurrency faults from plain logic faults.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{ensure, Context};
use async_trait::async_trait;
use kc_model::{Attributes, ResourceLookup, ResourceScope, ResourceType};
use kc_storage::{RealmProvider, ResourceProvider};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::RegistryError;
use crate::registry::ResourceRegistry;

/// Harness parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StressConfig {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Iterations per worker.
    pub iterations: usize,
    /// Run workers one after another instead of concurrently.
    pub serialized: bool,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            iterations: 10,
            serialized: false,
        }
    }
}

/// One unit of work, run once per worker and iteration.
#[async_trait]
pub trait StressTask: Send + Sync + 'static {
    /// Runs iteration `iteration` of worker `worker`.
    async fn run(&self, worker: usize, iteration: usize) -> anyhow::Result<()>;
}

/// Countdown barrier: `wait` returns once the count reaches zero.
#[derive(Debug)]
pub struct CountdownLatch {
    remaining: AtomicUsize,
    notify: Notify,
}

impl CountdownLatch {
    /// Creates a latch expecting `count` count-downs.
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(count),
            notify: Notify::new(),
        }
    }

    /// Decrements the count, releasing waiters when it hits zero.
    pub fn count_down(&self) {
        let previous = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if previous == Ok(1) {
            self.notify.notify_waiters();
        }
    }

    /// Drops the count to zero at once.
    pub fn release_all(&self) {
        if self.remaining.swap(0, Ordering::AcqRel) > 0 {
            self.notify.notify_waiters();
        }
    }

    /// Current count.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Waits until the count reaches zero.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.remaining() == 0 {
                return;
            }
            notified.await;
        }
    }
}

// Counts down even if the worker panics.
struct CountdownOnDrop(Arc<CountdownLatch>);

impl Drop for CountdownOnDrop {
    fn drop(&mut self) {
        self.0.count_down();
    }
}

/// The first failure of a run.
#[derive(Debug, Error)]
#[error("worker {worker} failed: {error:#}")]
pub struct StressFailure {
    /// Worker that failed.
    pub worker: usize,
    /// Iteration that failed, `None` if the worker panicked.
    pub iteration: Option<usize>,
    /// What went wrong.
    pub error: anyhow::Error,
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct StressReport {
    /// Configuration the run used.
    pub config: StressConfig,
    /// Iterations that completed.
    pub completed: usize,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
    /// Per-iteration latencies, in completion order.
    pub latencies: Vec<Duration>,
}

impl StressReport {
    /// Completed iterations per second.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.completed as f64 / secs
    }
}

/// Runs `task` on `config.workers` workers, `config.iterations` times each.
///
/// ## Errors
///
/// Returns the first failure any worker hit. Remaining workers stop at
/// their next iteration and are joined before returning.
pub async fn run_stress<T: StressTask>(
    config: StressConfig,
    task: Arc<T>,
) -> Result<StressReport, StressFailure> {
    let latch = Arc::new(CountdownLatch::new(config.workers));
    let failure: Arc<Mutex<Option<StressFailure>>> = Arc::new(Mutex::new(None));
    let latencies = Arc::new(Mutex::new(Vec::with_capacity(
        config.workers * config.iterations,
    )));
    let serial = Arc::new(tokio::sync::Mutex::new(()));
    let started = Instant::now();

    info!(
        workers = config.workers,
        iterations = config.iterations,
        serialized = config.serialized,
        "stress run starting"
    );

    let mut workers = JoinSet::new();
    let mut worker_ids = HashMap::with_capacity(config.workers);
    for worker in 0..config.workers {
        let task = Arc::clone(&task);
        let countdown = CountdownOnDrop(Arc::clone(&latch));
        let latch = Arc::clone(&latch);
        let failure = Arc::clone(&failure);
        let latencies = Arc::clone(&latencies);
        let serial = Arc::clone(&serial);

        let handle = workers.spawn(async move {
            let _countdown = countdown;
            let _turn = if config.serialized {
                Some(serial.lock_owned().await)
            } else {
                None
            };
            for iteration in 0..config.iterations {
                if failure.lock().is_some() {
                    debug!(worker, iteration, "stopping after failure elsewhere");
                    break;
                }
                let begun = Instant::now();
                match task.run(worker, iteration).await {
                    Ok(()) => latencies.lock().push(begun.elapsed()),
                    Err(e) => {
                        let message = format!("{e:#}");
                        error!(worker, iteration, error = %message, "stress iteration failed");
                        failure.lock().get_or_insert(StressFailure {
                            worker,
                            iteration: Some(iteration),
                            error: e.context(format!("iteration {iteration}")),
                        });
                        latch.release_all();
                        break;
                    }
                }
            }
            worker
        });
        worker_ids.insert(handle.id(), worker);
    }

    latch.wait().await;

    while let Some(joined) = workers.join_next_with_id().await {
        if let Err(e) = joined {
            let Some(&worker) = worker_ids.get(&e.id()) else {
                continue;
            };
            error!(worker, error = %e, "stress worker aborted");
            failure.lock().get_or_insert(StressFailure {
                worker,
                iteration: None,
                error: anyhow::anyhow!("worker {worker} aborted: {e}"),
            });
        }
    }

    if let Some(failure) = failure.lock().take() {
        return Err(failure);
    }

    let latencies = std::mem::take(&mut *latencies.lock());
    let report = StressReport {
        config,
        completed: latencies.len(),
        elapsed: started.elapsed(),
        latencies,
    };
    info!(
        completed = report.completed,
        elapsed = ?report.elapsed,
        "stress run finished"
    );
    Ok(report)
}

/// Creates clients named `c-{worker}-{iteration}` and checks each is
/// retrievable by ID and listed exactly once.
pub struct CreateClientsTask<R, P> {
    registry: Arc<ResourceRegistry<R, P>>,
    scope: ResourceScope,
}

impl<R, P> CreateClientsTask<R, P> {
    /// Creates the task for a realm.
    #[must_use]
    pub const fn new(registry: Arc<ResourceRegistry<R, P>>, realm_id: Uuid) -> Self {
        Self {
            registry,
            scope: ResourceScope::realm(realm_id),
        }
    }
}

#[async_trait]
impl<R, P> StressTask for CreateClientsTask<R, P>
where
    R: RealmProvider + 'static,
    P: ResourceProvider + 'static,
{
    async fn run(&self, worker: usize, iteration: usize) -> anyhow::Result<()> {
        let name = format!("c-{worker}-{iteration}");
        let created = self
            .registry
            .create_resource(self.scope, ResourceType::Client, &name, Attributes::new())
            .await
            .with_context(|| format!("creating client {name}"))?;

        let fetched = self
            .registry
            .get_resource(&self.scope, ResourceType::Client, &created.id.into())
            .await
            .with_context(|| format!("reading back client {name}"))?;
        ensure!(fetched.id == created.id, "client {name} read back with a different id");

        let listed = self
            .registry
            .list_resources(&self.scope, ResourceType::Client)
            .await?;
        let occurrences = listed.iter().filter(|r| r.id == created.id).count();
        ensure!(
            occurrences == 1,
            "client {name} listed {occurrences} times"
        );
        Ok(())
    }
}

/// Creates roles named `r-{worker}-{iteration}` in a scope and checks each
/// is retrievable by name.
pub struct CreateRolesTask<R, P> {
    registry: Arc<ResourceRegistry<R, P>>,
    scope: ResourceScope,
}

impl<R, P> CreateRolesTask<R, P> {
    /// Creates the task for realm roles.
    #[must_use]
    pub const fn realm_roles(registry: Arc<ResourceRegistry<R, P>>, realm_id: Uuid) -> Self {
        Self {
            registry,
            scope: ResourceScope::realm(realm_id),
        }
    }

    /// Creates the task for roles of one client.
    #[must_use]
    pub const fn client_roles(
        registry: Arc<ResourceRegistry<R, P>>,
        realm_id: Uuid,
        client_id: Uuid,
    ) -> Self {
        Self {
            registry,
            scope: ResourceScope::client(realm_id, client_id),
        }
    }
}

#[async_trait]
impl<R, P> StressTask for CreateRolesTask<R, P>
where
    R: RealmProvider + 'static,
    P: ResourceProvider + 'static,
{
    async fn run(&self, worker: usize, iteration: usize) -> anyhow::Result<()> {
        let name = format!("r-{worker}-{iteration}");
        let created = self
            .registry
            .create_resource(self.scope, ResourceType::Role, &name, Attributes::new())
            .await
            .with_context(|| format!("creating role {name} in {}", self.scope))?;

        let fetched = self
            .registry
            .get_resource(
                &self.scope,
                ResourceType::Role,
                &ResourceLookup::Name(name.clone()),
            )
            .await
            .with_context(|| format!("reading back role {name}"))?;
        ensure!(fetched.id == created.id, "role {name} read back with a different id");
        Ok(())
    }
}

/// Every worker creates the same client name per iteration,
/// `{base}-{iteration}`. Exactly one create per iteration may win.
pub struct ContendedCreateTask<R, P> {
    registry: Arc<ResourceRegistry<R, P>>,
    scope: ResourceScope,
    base: String,
    created: AtomicUsize,
    conflicts: AtomicUsize,
}

impl<R, P> ContendedCreateTask<R, P> {
    /// Creates the task for a realm.
    #[must_use]
    pub fn new(registry: Arc<ResourceRegistry<R, P>>, realm_id: Uuid, base: impl Into<String>) -> Self {
        Self {
            registry,
            scope: ResourceScope::realm(realm_id),
            base: base.into(),
            created: AtomicUsize::new(0),
            conflicts: AtomicUsize::new(0),
        }
    }

    /// Creates that succeeded.
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Acquire)
    }

    /// Creates rejected as conflicts.
    #[must_use]
    pub fn conflicts(&self) -> usize {
        self.conflicts.load(Ordering::Acquire)
    }
}

#[async_trait]
impl<R, P> StressTask for ContendedCreateTask<R, P>
where
    R: RealmProvider + 'static,
    P: ResourceProvider + 'static,
{
    async fn run(&self, _worker: usize, iteration: usize) -> anyhow::Result<()> {
        let name = format!("{}-{iteration}", self.base);
        match self
            .registry
            .create_resource(self.scope, ResourceType::Client, &name, Attributes::new())
            .await
        {
            Ok(_) => {
                self.created.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
            Err(RegistryError::Conflict { .. }) => {
                self.conflicts.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("creating contended client {name}")),
        }
    }
}
