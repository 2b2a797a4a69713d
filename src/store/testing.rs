//! In-memory store used by the unit tests of the loader, the consumer and the engine.

use crate::common::model::sample::Sample;
use crate::errors::{Error, Result};
use crate::store::RowSink;
use crate::utils::connection::Connector;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct Recorded {
    pub connects: AtomicUsize,
    pub fail: AtomicBool,
    pub writes: Mutex<Vec<(String, String)>>,
}

impl Recorded {
    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    /// Rows of every write, in write order.
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.lines().map(str::to_string).collect())
            .collect()
    }
}

pub struct RecordingSink(Arc<Recorded>);

#[async_trait]
impl RowSink for RecordingSink {
    async fn copy_in(&self, statement: &str, payload: Vec<u8>) -> Result<u64> {
        if self.0.fail.load(Ordering::SeqCst) {
            return Err(Error::orm_query("relation does not exist"));
        }
        let text = String::from_utf8(payload).unwrap();
        let rows = text.lines().count() as u64;
        self.0
            .writes
            .lock()
            .unwrap()
            .push((statement.to_string(), text));
        Ok(rows)
    }
}

#[derive(Clone, Default)]
pub struct RecordingConnector(pub Arc<Recorded>);

#[async_trait]
impl Connector for RecordingConnector {
    type Conn = RecordingSink;

    fn name(&self) -> &str {
        "recording store"
    }

    async fn connect(&self) -> Result<RecordingSink> {
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        Ok(RecordingSink(self.0.clone()))
    }
}

pub fn samples(n: usize) -> Vec<Sample> {
    (0..n)
        .map(|i| {
            let mut sample = Sample::pending(format!("http://site{i}.example"));
            sample.http_status = 200;
            sample.response_time_seconds = 0.25;
            sample
        })
        .collect()
}
