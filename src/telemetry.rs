use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde_derive::Serialize;
use tracing::{debug, info, warn};

use crate::counters::ClassCounts;
use crate::error::Error;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum FieldValue {
    Count(u64),
    Text(String),
}

/// One time-series point.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Measurement {
    pub measurement: String,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Measurement {
    fn new<I, K>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, FieldValue)>,
        K: Into<String>,
    {
        Self {
            measurement: name.into(),
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    channels: Vec<Option<ClassCounts>>,
    totals: Option<ClassCounts>,
    near_misses: Vec<u64>,
    collisions: Vec<u64>,
    total_collisions: u64,
    events: VecDeque<String>,
}

impl State {
    fn ensure(&mut self, channel: usize) {
        if self.channels.len() <= channel {
            self.channels.resize(channel + 1, None);
            self.near_misses.resize(channel + 1, 0);
            self.collisions.resize(channel + 1, 0);
        }
    }
}

/// Aggregate the channel sessions push into and the reporter drains.
#[derive(Debug, Default)]
pub struct Telemetry {
    state: Mutex<State>,
}

impl Telemetry {
    pub fn new(channels: usize) -> Self {
        let mut state = State::default();
        if channels > 0 {
            state.ensure(channels - 1);
        }

        Self {
            state: Mutex::new(state),
        }
    }

    pub fn set_channel_counts(&self, channel: usize, counts: ClassCounts) {
        let mut state = self.state.lock();
        state.ensure(channel);
        state.channels[channel] = Some(counts);
    }

    /// Totals only grow; a snapshot older than the stored one is merged away.
    pub fn set_total_counts(&self, totals: ClassCounts) {
        let mut state = self.state.lock();
        let merged = match state.totals {
            Some(prev) => ClassCounts {
                people: prev.people.max(totals.people),
                vehicles: prev.vehicles.max(totals.vehicles),
                bicycles: prev.bicycles.max(totals.bicycles),
            },
            None => totals,
        };

        state.totals = Some(merged);
    }

    pub fn set_near_misses(&self, channel: usize, count: u64) {
        let mut state = self.state.lock();
        state.ensure(channel);
        state.near_misses[channel] = count;
    }

    pub fn set_collisions(&self, channel: usize, count: u64) {
        let mut state = self.state.lock();
        state.ensure(channel);
        state.collisions[channel] = count;
    }

    /// Process-wide collision total, as kept by the global counters.
    pub fn set_total_collisions(&self, total: u64) {
        let mut state = self.state.lock();
        state.total_collisions = state.total_collisions.max(total);
    }

    pub fn push_event(&self, description: impl Into<String>) {
        self.state.lock().events.push_back(description.into());
    }

    /// Current points; queued events are drained, counters are kept.
    pub fn collect(&self) -> Vec<Measurement> {
        let mut state = self.state.lock();
        let mut points = Vec::new();

        for ch in 0..state.channels.len() {
            if let Some(c) = state.channels[ch] {
                points.push(Measurement::new(
                    format!("channel{}", ch),
                    [
                        ("people_count", FieldValue::Count(c.people)),
                        ("car_count", FieldValue::Count(c.vehicles)),
                        ("bicycle_count", FieldValue::Count(c.bicycles)),
                    ],
                ));
            }

            let (near, coll) = (state.near_misses[ch], state.collisions[ch]);
            if near != 0 || coll != 0 {
                points.push(Measurement::new(
                    "collisions_data",
                    [
                        (format!("channel{}near miss", ch), FieldValue::Count(near)),
                        (format!("channel{}collision", ch), FieldValue::Count(coll)),
                    ],
                ));
            }
        }

        if let Some(t) = state.totals {
            points.push(Measurement::new(
                "total_count",
                [
                    ("total_people_count", FieldValue::Count(t.people)),
                    ("total_car_count", FieldValue::Count(t.vehicles)),
                    ("total_bicycle_count", FieldValue::Count(t.bicycles)),
                ],
            ));
        }

        let total_collisions = state.total_collisions;
        if total_collisions != 0 {
            points.push(Measurement::new(
                "total_count",
                [("total_collision_count", FieldValue::Count(total_collisions))],
            ));
        }

        while let Some(event) = state.events.pop_front() {
            points.push(Measurement::new(
                "collisions_event",
                [("details", FieldValue::Text(event))],
            ));
        }

        points
    }
}

/// Destination of periodic telemetry (a time-series database client, a log, ...).
pub trait TelemetrySink: Send {
    fn write_points(&mut self, points: &[Measurement]) -> Result<(), Error>;
}

/// Writes every point to the log as JSON.
#[derive(Debug, Default)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn write_points(&mut self, points: &[Measurement]) -> Result<(), Error> {
        for point in points {
            info!(target: "nmtrack::telemetry", "{}", serde_json::to_string(point)?);
        }

        Ok(())
    }
}

pub struct Reporter;

impl Reporter {
    /// Starts the periodic push loop on its own thread.
    pub fn spawn<S>(telemetry: Arc<Telemetry>, mut sink: S, period: Duration) -> ReporterHandle
    where
        S: TelemetrySink + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let join = std::thread::spawn(move || {
            debug!(?period, "telemetry reporter started");

            loop {
                let stop = match stop_rx.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => false,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
                };

                let points = telemetry.collect();
                if !points.is_empty() {
                    if let Err(err) = sink.write_points(&points) {
                        warn!(%err, dropped = points.len(), "telemetry push failed");
                    }
                }

                if stop {
                    break;
                }
            }

            debug!("telemetry reporter stopped");
        });

        ReporterHandle {
            stop: Some(stop_tx),
            join: Some(join),
        }
    }
}

pub struct ReporterHandle {
    stop: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl ReporterHandle {
    /// Flushes once more and waits for the reporter thread.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }

        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!("telemetry reporter panicked");
            }
        }
    }
}

impl Drop for ReporterHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
