use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use serde_derive::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, CameraConfig, TrackingParams};
use crate::counters::Counters;
use crate::error::Error;
use crate::frame::{Frame, ObjectCounts};
use crate::session::{Event, Session};
use crate::telemetry::Telemetry;
use crate::track::TrackSnapshot;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Per-frame analytics result handed to the frame formatter.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub channel: usize,
    pub camera_id: usize,
    pub location: String,
    pub event: Event,
    pub counts: ObjectCounts,
    pub tracks: Vec<TrackSnapshot>,
}

/// Runs the whole per-frame pipeline of one camera channel.
pub struct ChannelWorker {
    channel: usize,
    camera: CameraConfig,
    params: TrackingParams,
    tracking: bool,
    collision: bool,
    session: Session,
    restarts: u32,
}

impl ChannelWorker {
    pub fn new(
        channel: usize,
        camera: CameraConfig,
        config: &AppConfig,
        counters: Arc<Counters>,
        telemetry: Option<Arc<Telemetry>>,
    ) -> Self {
        let session = Session::new(
            channel,
            camera.address.clone(),
            config.params,
            counters,
            telemetry,
        );

        Self {
            channel,
            camera,
            params: config.params,
            tracking: config.tracking_enabled(),
            collision: config.detect_collision,
            session,
            restarts: 0,
        }
    }

    pub fn process(&mut self, frame: &Frame) -> FrameReport {
        let (targets, counts) = frame.classify(&self.camera, &self.params);
        let mut event = Event::None;
        let mut tracks = Vec::new();

        if self.tracking {
            if !self.session.is_initialized()
                && !self.session.initialize(frame.width, frame.height, &targets)
            {
                debug!(channel = self.channel, "zero-area detection skipped at initialization");
            }

            if !self.session.update(&targets) {
                debug!(channel = self.channel, "zero-area detection skipped");
            }

            match self.session.step() {
                Ok(()) => {
                    if self.collision && self.camera.analytics.has_traffic() {
                        self.session.detect_collisions();
                    }

                    event = self.session.event();
                    tracks = self.session.snapshots();
                }
                Err(err) => {
                    error!(channel = self.channel, %err, "tracking failed, restarting session");
                    self.restart();
                }
            }
        }

        FrameReport {
            channel: self.channel,
            camera_id: self.channel + 1,
            location: self.camera.address.replace(' ', "-"),
            event,
            counts,
            tracks,
        }
    }

    fn restart(&mut self) {
        self.session.reset();
        self.restarts += 1;
    }

    #[inline]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[inline]
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Pulls frames until the input queue hangs up.
    pub fn run(mut self, input: Receiver<Frame>, output: Sender<FrameReport>) -> Result<(), Error> {
        info!(channel = self.channel, address = %self.camera.address, "channel worker started");

        loop {
            let frame = match input.recv_timeout(POLL_INTERVAL) {
                Ok(frame) => frame,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            let report = self.process(&frame);
            if output.send(report).is_err() {
                warn!(channel = self.channel, "report queue closed");
                return Err(Error::ChannelClosed);
            }
        }

        info!(
            channel = self.channel,
            frames = self.session.frames(),
            near_misses = self.session.near_miss_count(),
            collisions = self.session.collision_count(),
            "channel worker stopped"
        );

        Ok(())
    }
}

/// One worker thread per configured camera.
pub struct Pipeline {
    inputs: Vec<Sender<Frame>>,
    reports: Receiver<FrameReport>,
    workers: Vec<JoinHandle<Result<(), Error>>>,
}

impl Pipeline {
    pub fn spawn(
        config: &AppConfig,
        counters: Arc<Counters>,
        telemetry: Option<Arc<Telemetry>>,
    ) -> Self {
        let queue_size = config.frames_queue_size.max(1);
        let (report_tx, reports) = bounded(queue_size * config.cameras.len().max(1));

        let mut inputs = Vec::with_capacity(config.cameras.len());
        let mut workers = Vec::with_capacity(config.cameras.len());

        for (channel, camera) in config.cameras.iter().enumerate() {
            let (tx, rx) = bounded(queue_size);
            let worker = ChannelWorker::new(
                channel,
                camera.clone(),
                config,
                counters.clone(),
                telemetry.clone(),
            );
            let output = report_tx.clone();

            inputs.push(tx);
            workers.push(std::thread::spawn(move || worker.run(rx, output)));
        }

        info!(channels = inputs.len(), "pipeline started");

        Self {
            inputs,
            reports,
            workers,
        }
    }

    /// Queues a frame for its channel, blocking while that channel's queue is full.
    pub fn submit(&self, frame: Frame) -> Result<(), Error> {
        let input = self.inputs.get(frame.channel).ok_or_else(|| {
            Error::Config(format!("no camera configured for channel {}", frame.channel))
        })?;

        input.send(frame).map_err(|_| Error::ChannelClosed)
    }

    #[inline]
    pub fn reports(&self) -> &Receiver<FrameReport> {
        &self.reports
    }

    /// Hangs up every input queue; workers finish what is queued and exit.
    pub fn close(&mut self) {
        self.inputs.clear();
    }

    pub fn join(mut self) -> Result<(), Error> {
        self.close();

        let mut result = Ok(());
        for worker in self.workers.drain(..) {
            match worker.join() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => result = Err(err),
                Err(_) => {
                    error!("channel worker panicked");
                    result = Err(Error::ChannelClosed);
                }
            }
        }

        result
    }
}
