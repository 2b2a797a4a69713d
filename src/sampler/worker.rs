use crate::errors::Result;
use crate::queue::{MessageSink, Publisher};
use crate::sampler::Probe;
use crate::utils::connection::Connector;
use crate::utils::shutdown::Shutdown;
use log::{debug, info};
use std::time::Duration;

/// Probes one shard of targets in a loop and publishes every sample.
///
/// A pass probes the URLs sequentially, then the worker sleeps for `interval`. A
/// probe interrupted by shutdown emits nothing; a publish failure ends the worker.
pub struct SamplerWorker<C>
where
    C: Connector,
    C::Conn: MessageSink,
{
    name: String,
    targets: Vec<String>,
    probe: Probe,
    interval: Duration,
    publisher: Publisher<C>,
}

impl<C> SamplerWorker<C>
where
    C: Connector,
    C::Conn: MessageSink,
{
    pub fn new(
        name: impl Into<String>,
        targets: Vec<String>,
        probe: Probe,
        interval: Duration,
        publisher: Publisher<C>,
    ) -> Self {
        Self {
            name: name.into(),
            targets,
            probe,
            interval,
            publisher,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn run(mut self, mut shutdown: Shutdown) -> Result<()> {
        info!(
            "{} started with {} targets, interval {:?}",
            self.name,
            self.targets.len(),
            self.interval
        );
        let result = self.sample(&mut shutdown).await;
        self.publisher.close().await;
        if result.is_ok() {
            info!("{} stopped", self.name);
        }
        result
    }

    async fn sample(&mut self, shutdown: &mut Shutdown) -> Result<()> {
        while !shutdown.is_shutdown() {
            for url in &self.targets {
                let sample = tokio::select! {
                    biased;
                    _ = shutdown.recv() => {
                        debug!("{} interrupted while probing {}", self.name, url);
                        return Ok(());
                    }
                    sample = self.probe.probe(url) => sample,
                };
                self.publisher.publish(&sample).await?;
            }

            tokio::select! {
                _ = shutdown.recv() => return Ok(()),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        Ok(())
    }
}
