use crate::common::config::targets::resolve_targets;
use crate::common::model::config::{ChannelBackend, Config};
use crate::errors::{Error, Result, TaskError};
use crate::queue::{
    BatchPolicy, ConsumerLoop, KafkaConsumerConnector, KafkaProducerConnector, MemoryConnector,
    MemoryQueue, MessageSink, MessageSource, Publisher,
};
use crate::sampler::{Probe, SamplerWorker};
use crate::store::{BulkLoader, RowSink, TimescaleConnector};
use crate::utils::connection::Connector;
use crate::utils::shard::shard_targets;
use crate::utils::shutdown::Shutdown;
use futures::FutureExt;
use log::{error, info, warn};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::sync::broadcast;
use tokio::task::JoinSet;


/// Outcome of a supervised run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Number of workers that were started.
    pub workers: usize,
    /// Names of the workers that ended with an error or a panic.
    pub failed: Vec<String>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Independent worker tasks sharing one shutdown broadcast.
pub struct WorkerSet {
    tasks: JoinSet<(String, Result<()>)>,
    notify: broadcast::Sender<()>,
}

impl Default for WorkerSet {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerSet {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(1);
        Self {
            tasks: JoinSet::new(),
            notify,
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Starts a worker. Its shutdown listener is subscribed before the task runs, so a
    /// signal raised afterwards always reaches it.
    pub fn spawn<W, F>(&mut self, name: impl Into<String>, worker: W)
    where
        W: FnOnce(Shutdown) -> F,
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        let work = worker(Shutdown::new(self.notify.subscribe()));
        let task_name = name.clone();
        self.tasks.spawn(async move {
            let result = match AssertUnwindSafe(work).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(Error::from(TaskError::Panicked(task_name.clone()))),
            };
            (task_name, result)
        });
        info!("Started {}", name);
    }

    /// Waits for every worker. When `signal` completes, all workers are told to stop
    /// and are awaited; if every worker exits first, the signal is no longer awaited.
    pub async fn supervise<S>(mut self, signal: S) -> RunReport
    where
        S: Future<Output = ()>,
    {
        let workers = self.tasks.len();
        let mut failed = Vec::new();
        let mut signalled = false;
        tokio::pin!(signal);

        loop {
            tokio::select! {
                _ = &mut signal, if !signalled => {
                    signalled = true;
                    info!("Shutdown requested, waiting for {} workers", self.tasks.len());
                    let _ = self.notify.send(());
                }
                joined = self.tasks.join_next() => {
                    let Some(joined) = joined else { break };
                    match joined {
                        Ok((name, Ok(()))) => info!("{} finished", name),
                        Ok((name, Err(e))) => {
                            error!("{} failed: {}", name, e);
                            failed.push(name);
                        }
                        Err(e) => {
                            error!("Worker task could not be joined: {}", e);
                            failed.push(format!("task-{}", failed.len()));
                        }
                    }
                }
            }
        }

        if failed.is_empty() {
            info!("All {} workers stopped cleanly", workers);
        } else {
            warn!("{} of {} workers failed: {:?}", failed.len(), workers, failed);
        }
        RunReport { workers, failed }
    }
}

/// Completes on Ctrl-C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
                return;
            }
            Err(e) => warn!("Cannot listen for SIGTERM: {}", e),
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Cannot listen for Ctrl-C, only worker failures will stop the run: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Wires samplers to the publisher and the consumer loop to the bulk loader.
pub struct Orchestrator {
    config: Config,
}

impl Orchestrator {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Starts one sampler per shard of the target list, each publishing through its
    /// own connection from `connector`. Returns the number of samplers.
    pub fn spawn_samplers<C, F>(&self, workers: &mut WorkerSet, connector: F) -> Result<usize>
    where
        C: Connector + 'static,
        C::Conn: MessageSink + 'static,
        F: Fn() -> C,
    {
        let monitor = &self.config.monitor;
        let targets = resolve_targets(monitor)?;
        let probe = Probe::new(monitor.request_timeout(), monitor.pattern.as_deref())?;
        let shards = shard_targets(&targets, monitor.shard_size);
        let count = shards.len();
        info!(
            "Sampling {} targets with {} workers every {:?}",
            targets.len(),
            count,
            monitor.interval()
        );

        for (index, shard) in shards.into_iter().enumerate() {
            let name = format!("sampler-{index}");
            let worker = SamplerWorker::new(
                name.clone(),
                shard,
                probe.clone(),
                monitor.interval(),
                Publisher::new(connector(), self.config.kafka.topic.clone()),
            );
            workers.spawn(name, |shutdown| worker.run(shutdown));
        }
        Ok(count)
    }

    /// Starts the consumer loop reading from `source` and loading into `store`.
    pub fn spawn_consumer<Q, S>(&self, workers: &mut WorkerSet, source: Q, store: S) -> Result<()>
    where
        Q: Connector + 'static,
        Q::Conn: MessageSource + 'static,
        S: Connector + 'static,
        S::Conn: RowSink + 'static,
    {
        let loader = BulkLoader::new(store, self.config.db.table.clone())?;
        let consumer = ConsumerLoop::new(
            source,
            loader,
            self.config.kafka.topic.clone(),
            BatchPolicy::from(&self.config.consumer),
        );
        workers.spawn("consumer", |shutdown| consumer.run(shutdown));
        Ok(())
    }

    fn require_kafka(&self, command: &str) -> Result<()> {
        if self.config.channel.backend == ChannelBackend::Memory {
            return Err(Error::invalid_value(
                "channel.backend",
                format!("the memory backend only works with `run`, not `{command}`"),
            ));
        }
        Ok(())
    }

    /// Samplers only, publishing to Kafka.
    pub async fn run_agent(&self) -> Result<RunReport> {
        self.run_agent_until(shutdown_signal()).await
    }

    pub async fn run_agent_until<S>(&self, signal: S) -> Result<RunReport>
    where
        S: Future<Output = ()>,
    {
        self.require_kafka("agent")?;
        let mut workers = WorkerSet::new();
        let kafka = &self.config.kafka;
        self.spawn_samplers(&mut workers, || KafkaProducerConnector::new(kafka.clone()))?;
        Ok(workers.supervise(signal).await)
    }

    /// Consumer only, from Kafka into the store.
    pub async fn run_sink(&self) -> Result<RunReport> {
        self.run_sink_until(shutdown_signal()).await
    }

    pub async fn run_sink_until<S>(&self, signal: S) -> Result<RunReport>
    where
        S: Future<Output = ()>,
    {
        self.require_kafka("sink")?;
        let store = TimescaleConnector::new(self.config.db.clone())?;
        let mut workers = WorkerSet::new();
        self.spawn_consumer(
            &mut workers,
            KafkaConsumerConnector::new(self.config.kafka.clone()),
            store,
        )?;
        Ok(workers.supervise(signal).await)
    }

    /// Samplers and consumer in one process, over Kafka or the in-memory queue.
    pub async fn run_all(&self) -> Result<RunReport> {
        self.run_all_until(shutdown_signal()).await
    }

    pub async fn run_all_until<S>(&self, signal: S) -> Result<RunReport>
    where
        S: Future<Output = ()>,
    {
        let store = TimescaleConnector::new(self.config.db.clone())?;
        let mut workers = WorkerSet::new();
        match self.config.channel.backend {
            ChannelBackend::Kafka => {
                let kafka = &self.config.kafka;
                self.spawn_consumer(
                    &mut workers,
                    KafkaConsumerConnector::new(kafka.clone()),
                    store,
                )?;
                self.spawn_samplers(&mut workers, || KafkaProducerConnector::new(kafka.clone()))?;
            }
            ChannelBackend::Memory => {
                let queue = MemoryQueue::new(self.config.channel.capacity);
                self.spawn_consumer(&mut workers, MemoryConnector::new(queue.clone()), store)?;
                self.spawn_samplers(&mut workers, || MemoryConnector::new(queue.clone()))?;
            }
        }
        Ok(workers.supervise(signal).await)
    }
}
