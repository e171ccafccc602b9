use crate::track::TrackId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config Error: {0}")]
    Config(String),

    #[error("Track {id} produced a non-finite kinematic state")]
    CorruptTrack { id: TrackId },

    #[error("Telemetry Error: {0}")]
    Telemetry(String),

    #[error("Channel closed")]
    ChannelClosed,
}
