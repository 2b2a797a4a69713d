use crate::common::model::sample::Sample;
use crate::errors::Result;
use crate::queue::MessageSink;
use crate::utils::connection::{ConnectionGuard, Connector};
use log::{debug, error};
use metrics::counter;

/// Serializes samples and hands them to the queue, one acknowledged send at a time.
///
/// The connection is established on the first publish and reused afterwards. A failed
/// send drops it so the next publish reconnects; the failure itself is returned to the
/// caller, nothing is retried here.
pub struct Publisher<C>
where
    C: Connector,
    C::Conn: MessageSink,
{
    guard: ConnectionGuard<C>,
    topic: String,
}

impl<C> Publisher<C>
where
    C: Connector,
    C::Conn: MessageSink,
{
    pub fn new(connector: C, topic: impl Into<String>) -> Self {
        Self {
            guard: ConnectionGuard::new(connector),
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn publish(&mut self, sample: &Sample) -> Result<()> {
        let payload = match sample.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Cannot serialize sample {:?}: {}", sample, e);
                counter!("publish_failures_total", "reason" => "serialize").increment(1);
                return Err(e);
            }
        };

        let sink = match self.guard.get().await {
            Ok(sink) => sink,
            Err(e) => {
                error!("Cannot connect to topic {}: {}", self.topic, e);
                counter!("publish_failures_total", "reason" => "connect").increment(1);
                return Err(e);
            }
        };

        match sink.send(&payload).await {
            Ok(()) => {
                debug!("Published sample for {} to {}", sample.url, self.topic);
                counter!("samples_published_total").increment(1);
                Ok(())
            }
            Err(e) => {
                error!(
                    "Publish to topic {} failed: {} (payload: {})",
                    self.topic,
                    e,
                    String::from_utf8_lossy(&payload)
                );
                counter!("publish_failures_total", "reason" => "send").increment(1);
                self.guard.invalidate();
                Err(e)
            }
        }
    }

    pub async fn close(&mut self) {
        self.guard.close().await;
    }
}
