//! Stats sink
//!
//! Receives traffic, throughput, and engine-selection events from the
//! supervisor and the generators, renders them as InfluxDB line
//! protocol with nanosecond timestamps, and posts batches to the
//! configured endpoint. Producers never block: the handle drops on a
//! full queue, and the sink drops its oldest pending batch when the
//! endpoint falls behind.

use std::collections::VecDeque;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tagsieve_core::engine;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, warn};

/// Default queue depth for undelivered stats events.
pub const DEFAULT_STATS_QUEUE: usize = 1024;

/// Pending batches kept while the endpoint is unreachable.
const MAX_PENDING_BATCHES: usize = 16;

/// One measurement sample.
#[derive(Clone, Debug, PartialEq)]
pub enum StatsEvent {
    /// Ingress and match counts over one reporting interval
    Traffic { engine_name: String, ingress: u64, matches: u64 },
    /// Search throughput over one reporting interval
    EngineThroughput { engine_name: String, event_per_us: f64 },
    /// The supervisor installed a new serving engine
    SelectedEngine { engine_name: String },
    /// Offline benchmark sample
    Simulation { engine_name: String, event_per_us: f64 },
}

/// Non-blocking producer endpoint. A disabled handle swallows events,
/// which keeps stats optional in tests and tools.
#[derive(Clone)]
pub struct StatsHandle {
    tx: Option<mpsc::Sender<StatsEvent>>,
}

impl StatsHandle {
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Records one event; drops it when the sink is saturated.
    pub fn record(&self, event: StatsEvent) {
        if let Some(tx) = &self.tx {
            if tx.try_send(event).is_err() {
                debug!("stats queue full, dropping event");
            }
        }
    }
}

/// The consuming side; owns the HTTP client and the batch queue.
pub struct StatsSink {
    rx: mpsc::Receiver<StatsEvent>,
    client: reqwest::Client,
    write_url: String,
    flush_interval: Duration,
    points: Vec<String>,
    pending: VecDeque<String>,
}

impl StatsSink {
    /// Creates the sink and its producer handle.
    pub fn new(
        endpoint: &str,
        database: &str,
        flush_interval: Duration,
        queue: usize,
    ) -> (StatsHandle, Self) {
        let (tx, rx) = mpsc::channel(queue.max(1));
        let sink = Self {
            rx,
            client: reqwest::Client::new(),
            write_url: format!(
                "{}/write?db={}&precision=ns",
                endpoint.trim_end_matches('/'),
                database
            ),
            flush_interval,
            points: Vec::new(),
            pending: VecDeque::new(),
        };
        (StatsHandle { tx: Some(tx) }, sink)
    }

    /// Runs until every producer handle is gone, then flushes once.
    pub async fn run(mut self) {
        let mut ticker = interval(self.flush_interval);
        loop {
            tokio::select! {
                event = self.rx.recv() => match event {
                    Some(event) => self.points.push(render_line(&event, now_ns())),
                    None => break,
                },
                _ = ticker.tick() => self.flush().await,
            }
        }
        self.flush().await;
    }

    /// Moves the current points into the pending queue, dropping the
    /// oldest batch on saturation.
    fn enqueue_batch(&mut self) {
        if self.points.is_empty() {
            return;
        }
        if self.pending.len() >= MAX_PENDING_BATCHES {
            warn!("stats endpoint behind, dropping oldest batch");
            self.pending.pop_front();
        }
        let body = self.points.join("\n");
        self.points.clear();
        self.pending.push_back(body);
    }

    async fn flush(&mut self) {
        self.enqueue_batch();
        while let Some(body) = self.pending.front() {
            let result = self.client.post(&self.write_url).body(body.clone()).send().await;
            match result {
                Ok(response) if response.status().is_success() => {
                    self.pending.pop_front();
                }
                Ok(response) => {
                    warn!(status = %response.status(), "stats endpoint rejected batch");
                    break;
                }
                Err(error) => {
                    debug!(%error, "stats endpoint unreachable, retrying next flush");
                    break;
                }
            }
        }
    }
}

fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as i64)
        .unwrap_or_default()
}

/// Renders one event as an InfluxDB line-protocol point.
fn render_line(event: &StatsEvent, timestamp_ns: i64) -> String {
    match event {
        StatsEvent::Traffic { engine_name, ingress, matches } => {
            let mut fields =
                format!("incoming_events={ingress}i,matched_events={matches}i");
            if *ingress > 0 {
                let probability = *matches as f64 / *ingress as f64 * 100.0;
                fields.push_str(&format!(",matching_probability={probability}"));
            }
            format!("traffic,engine={engine_name} {fields} {timestamp_ns}")
        }
        StatsEvent::EngineThroughput { engine_name, event_per_us } => {
            format!(
                "throughput,engine={engine_name} event_per_us={event_per_us} {timestamp_ns}"
            )
        }
        StatsEvent::SelectedEngine { engine_name } => {
            let selected = engine::variant_index(engine_name).unwrap_or(0);
            format!("engine selected={selected}i {timestamp_ns}")
        }
        StatsEvent::Simulation { engine_name, event_per_us } => {
            format!(
                "simulation event_per_us={event_per_us},engine=\"{engine_name}\" {timestamp_ns}"
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traffic_line_with_probability() {
        let line = render_line(
            &StatsEvent::Traffic {
                engine_name: "PatriciaTrie".to_string(),
                ingress: 200,
                matches: 50,
            },
            42,
        );
        assert_eq!(
            line,
            "traffic,engine=PatriciaTrie incoming_events=200i,matched_events=50i,matching_probability=25 42"
        );
    }

    #[test]
    fn test_traffic_line_without_ingress() {
        let line = render_line(
            &StatsEvent::Traffic { engine_name: "List".to_string(), ingress: 0, matches: 0 },
            42,
        );
        assert!(!line.contains("matching_probability"));
    }

    #[test]
    fn test_selected_engine_uses_registry_index() {
        let line = render_line(
            &StatsEvent::SelectedEngine { engine_name: "PatriciaTrie".to_string() },
            7,
        );
        assert_eq!(line, "engine selected=3i 7");
        let line = render_line(
            &StatsEvent::SelectedEngine { engine_name: "Legacy".to_string() },
            7,
        );
        assert_eq!(line, "engine selected=0i 7");
    }

    #[test]
    fn test_simulation_line() {
        let line = render_line(
            &StatsEvent::Simulation { engine_name: "SplayTree".to_string(), event_per_us: 1.5 },
            9,
        );
        assert_eq!(line, "simulation event_per_us=1.5,engine=\"SplayTree\" 9");
    }

    #[test]
    fn test_drop_oldest_batch_on_saturation() {
        let (_handle, mut sink) =
            StatsSink::new("http://localhost:8086", "tagsieve", Duration::from_secs(60), 4);
        for index in 0..MAX_PENDING_BATCHES + 2 {
            sink.points.push(format!("batch {index}"));
            sink.enqueue_batch();
        }
        assert_eq!(sink.pending.len(), MAX_PENDING_BATCHES);
        assert_eq!(sink.pending.front().map(String::as_str), Some("batch 2"));
        assert_eq!(
            sink.pending.back().map(String::as_str),
            Some(&*format!("batch {}", MAX_PENDING_BATCHES + 1))
        );
    }

    #[test]
    fn test_handle_never_blocks_when_full() {
        let (handle, _sink) =
            StatsSink::new("http://localhost:8086", "tagsieve", Duration::from_secs(60), 1);
        for _ in 0..100 {
            handle.record(StatsEvent::SelectedEngine { engine_name: "List".to_string() });
        }
        // Reaching here is the assertion: record is fire-and-forget
    }
}
