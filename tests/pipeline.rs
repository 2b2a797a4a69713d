use async_trait::async_trait;
use pulsewatch::common::config::load_config;
use pulsewatch::engine::{Orchestrator, WorkerSet};
use pulsewatch::errors::Result;
use pulsewatch::queue::{MemoryConnector, MemoryQueue};
use pulsewatch::store::RowSink;
use pulsewatch::utils::connection::Connector;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::NamedTempFile;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Keeps every COPY payload in memory.
#[derive(Clone, Default)]
struct MemoryTable {
    rows: Arc<Mutex<Vec<String>>>,
    loads: Arc<Mutex<usize>>,
}

impl MemoryTable {
    fn rows(&self) -> Vec<Vec<String>> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .map(|row| row.split('\t').map(str::to_string).collect())
            .collect()
    }

    fn row_for(&self, url: &str) -> Vec<String> {
        self.rows()
            .into_iter()
            .find(|row| row[1] == url)
            .unwrap_or_else(|| panic!("no row for {url}"))
    }
}

#[async_trait]
impl RowSink for MemoryTable {
    async fn copy_in(&self, statement: &str, payload: Vec<u8>) -> Result<u64> {
        assert!(statement.starts_with("COPY web_health_metrics "));
        let text = String::from_utf8(payload).unwrap();
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.extend(text.lines().map(str::to_string));
        *self.loads.lock().unwrap() += 1;
        Ok((rows.len() - before) as u64)
    }
}

#[async_trait]
impl Connector for MemoryTable {
    type Conn = MemoryTable;

    fn name(&self) -> &str {
        "memory table"
    }

    async fn connect(&self) -> Result<MemoryTable> {
        Ok(self.clone())
    }
}

async fn endpoints() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/up"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>\nstatus: green\n</p>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/degraded"))
        .respond_with(ResponseTemplate::new(200).set_body_string("status: yellow"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("status: green")
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;
    server
}

fn write_config(targets_file: &NamedTempFile, inline: &str) -> NamedTempFile {
    let mut config = NamedTempFile::new().unwrap();
    write!(
        config,
        r#"
name = "pipeline-test"

[kafka]
brokers = "localhost:9092"
security_protocol = "plaintext"

[channel]
backend = "memory"
capacity = 64

[db]
url = "postgres://localhost/metrics"

[monitor]
targets = ["{inline}"]
targets_path = "{}"
pattern = "^status: green$"
interval_secs = 30
request_timeout_secs = 1
shard_size = 2

[consumer]
batch_size = 10
poll_timeout_ms = 100
"#,
        targets_file.path().display()
    )
    .unwrap();
    config
}

#[tokio::test]
async fn test_samples_reach_the_table_with_their_outcome() {
    let server = endpoints().await;
    let url = |p: &str| format!("{}{}", server.uri(), p);

    let mut targets = NamedTempFile::new().unwrap();
    writeln!(targets, "{}\n\n{}\n{}\n{}", url("/degraded"), url("/down"), url("/slow"), url("/up")).unwrap();
    let config_file = write_config(&targets, &url("/up"));
    let config = load_config(config_file.path().to_str().unwrap()).unwrap();

    let orchestrator = Orchestrator::new(config);
    let queue = MemoryQueue::new(orchestrator.config().channel.capacity);
    let table = MemoryTable::default();
    let mut workers = WorkerSet::new();
    orchestrator
        .spawn_consumer(&mut workers, MemoryConnector::new(queue.clone()), table.clone())
        .unwrap();
    // /up is listed twice and sampled once
    let samplers = orchestrator
        .spawn_samplers(&mut workers, || MemoryConnector::new(queue.clone()))
        .unwrap();
    assert_eq!(samplers, 2);

    let report = workers
        .supervise(tokio::time::sleep(Duration::from_secs(3)))
        .await;
    assert!(report.is_success(), "{report:?}");

    assert_eq!(table.rows().len(), 4);

    let up = table.row_for(&url("/up"));
    assert_eq!(up[2], "200");
    assert_eq!(up[4], "t");
    assert!(up[3].parse::<f64>().unwrap() >= 0.0);

    let degraded = table.row_for(&url("/degraded"));
    assert_eq!(degraded[2], "200");
    assert_eq!(degraded[4], "f");

    let down = table.row_for(&url("/down"));
    assert_eq!(down[2], "500");
    assert_eq!(down[4], "f");

    let slow = table.row_for(&url("/slow"));
    assert_eq!(slow[2], "504");
    assert_eq!(slow[3], "-1");
    assert_eq!(slow[4], "\\N");
}

#[tokio::test]
async fn test_missing_targets_file_is_reported_before_sampling() {
    let targets = NamedTempFile::new().unwrap();
    let config_file = write_config(&targets, "http://localhost/");
    let mut config = load_config(config_file.path().to_str().unwrap()).unwrap();
    config.monitor.targets.clear();
    config.monitor.targets_path = Some("/nonexistent/targets.txt".into());

    let orchestrator = Orchestrator::new(config);
    let mut workers = WorkerSet::new();
    let err = orchestrator
        .spawn_samplers(&mut workers, || MemoryConnector::new(MemoryQueue::new(1)))
        .unwrap_err();
    assert!(err.is_config());
    assert!(workers.is_empty());
}
