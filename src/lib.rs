pub mod config;
pub mod counters;
pub mod detection;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod kinematics;
pub mod label;
pub mod manager;
pub mod session;
pub mod telemetry;
pub mod track;
pub mod worker;

mod circular_queue;

pub use config::{AppConfig, CameraConfig, TrackingParams};
pub use counters::{ClassCounts, Counters};
pub use detection::{Detection, Target};
pub use error::Error;
pub use frame::{Frame, ObjectCounts};
pub use geometry::{Point, Rect};
pub use label::{Color, ObjectClass};
pub use manager::{TrackManager, Upsert};
pub use session::{Event, Session};
pub use telemetry::{LogSink, Reporter, ReporterHandle, Telemetry, TelemetrySink};
pub use track::{Track, TrackId, TrackSnapshot};
pub use worker::{ChannelWorker, FrameReport, Pipeline};
