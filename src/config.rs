use crate::error::Error;
use crate::label::ObjectClass;

use serde_derive::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Empirically tuned tracking and collision constants.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct TrackingParams {
    /// Detections below this confidence never reach the tracker.
    pub min_confidence: f32,
    /// Overlap fraction above which a detection is not a new object.
    pub overlap_ratio: f32,
    /// Vehicles smaller than this fraction of the frame area are dropped.
    pub min_vehicle_area_ratio: f32,
    /// Near-miss threshold on the x-axis acceleration deviation (strict).
    pub near_miss_x: f32,
    /// Near-miss threshold on the y-axis acceleration deviation (inclusive).
    pub near_miss_y: f32,
    /// Perspective scale of the acceleration estimate. Lower it when seeing
    /// too many false collisions.
    pub acc_factor: f32,
    /// Unmatched frames after which a slow track becomes eligible for deletion.
    pub stale_frames: u32,
    /// Velocity below this fraction of the track area counts as stationary.
    pub min_velocity_area_ratio: f32,
}

impl Default for TrackingParams {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            overlap_ratio: 0.2,
            min_vehicle_area_ratio: 0.009,
            near_miss_x: 4.0,
            near_miss_y: 3.0,
            acc_factor: 1000.0,
            stale_frames: 10,
            min_velocity_area_ratio: 0.01,
        }
    }
}

impl TrackingParams {
    pub fn validate(&self) -> Result<(), Error> {
        let positive = [
            ("overlap_ratio", self.overlap_ratio),
            ("near_miss_x", self.near_miss_x),
            ("near_miss_y", self.near_miss_y),
            ("acc_factor", self.acc_factor),
        ];

        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::Config(format!("{} must be positive, got {}", name, value)));
            }
        }

        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(Error::Config(format!(
                "min_confidence must be within [0, 1], got {}",
                self.min_confidence
            )));
        }

        if self.min_vehicle_area_ratio < 0.0 || self.min_velocity_area_ratio < 0.0 {
            return Err(Error::Config("area ratios must not be negative".into()));
        }

        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AnalyticsRepr {
    List(Vec<String>),
    Text(String),
}

/// Classes enabled for one camera.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(from = "AnalyticsRepr", into = "Vec<String>")]
pub struct Analytics {
    classes: Vec<ObjectClass>,
}

impl From<AnalyticsRepr> for Analytics {
    fn from(repr: AnalyticsRepr) -> Self {
        let text = match repr {
            AnalyticsRepr::List(items) => items.join(" "),
            AnalyticsRepr::Text(text) => text,
        };

        let classes = ObjectClass::ALL
            .into_iter()
            .filter(|class| text.contains(class.analytic()))
            .collect();

        Self { classes }
    }
}

impl From<Analytics> for Vec<String> {
    fn from(analytics: Analytics) -> Self {
        analytics
            .classes
            .iter()
            .map(|c| c.analytic().to_string())
            .collect()
    }
}

impl Analytics {
    pub fn new(classes: impl IntoIterator<Item = ObjectClass>) -> Self {
        let mut out = Vec::new();
        for class in classes {
            if !out.contains(&class) {
                out.push(class);
            }
        }
        Self { classes: out }
    }

    #[inline]
    pub fn enables(&self, class: ObjectClass) -> bool {
        self.classes.contains(&class)
    }

    /// Collision inference only makes sense when something besides people is tracked.
    #[inline]
    pub fn has_traffic(&self) -> bool {
        self.enables(ObjectClass::Vehicle) || self.enables(ObjectClass::Bicycle)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CameraConfig {
    pub address: String,
    #[serde(default)]
    pub latitude: Option<String>,
    #[serde(default)]
    pub longitude: Option<String>,
    pub analytics: Analytics,
}

impl CameraConfig {
    pub fn new(address: impl Into<String>, analytics: Analytics) -> Self {
        Self {
            address: address.into(),
            latitude: None,
            longitude: None,
            analytics,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub frames_queue_size: usize,
    #[serde(default = "enabled")]
    pub tracking: bool,
    #[serde(default = "enabled")]
    pub detect_collision: bool,
    pub cameras: Vec<CameraConfig>,
    #[serde(default)]
    pub params: TrackingParams,
}

fn enabled() -> bool {
    true
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self, Error> {
        let config: AppConfig = serde_json::from_str(data)?;
        config.validate()?;

        if config.forces_tracking() {
            warn!("collision detection is enabled without tracking, tracking is turned on");
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.frames_queue_size == 0 {
            return Err(Error::Config("frames_queue_size must be non-zero".into()));
        }

        if self.cameras.is_empty() {
            return Err(Error::Config("at least one camera is required".into()));
        }

        self.params.validate()
    }

    /// Collision inference needs tracks, so it implies tracking.
    #[inline]
    pub fn tracking_enabled(&self) -> bool {
        self.tracking || self.detect_collision
    }

    /// Tracking was switched off but collision detection turns it back on.
    #[inline]
    pub fn forces_tracking(&self) -> bool {
        !self.tracking && self.detect_collision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "frames_queue_size": 8,
        "tracking": false,
        "detect_collision": true,
        "cameras": [
            {"address": "Main St & 1st Ave", "latitude": "1.0", "longitude": "2.0",
             "analytics": "pedestrian vehicle"},
            {"address": "Bridge", "analytics": ["bike"]}
        ],
        "params": {"near_miss_x": 5.5}
    }"#;

    #[test]
    fn parses_camera_list_layout() {
        let config = AppConfig::from_json(CONFIG).unwrap();

        assert_eq!(config.cameras.len(), 2);
        assert!(config.tracking_enabled());

        let first = &config.cameras[0].analytics;
        assert!(first.enables(ObjectClass::Person));
        assert!(first.enables(ObjectClass::Vehicle));
        assert!(!first.enables(ObjectClass::Bicycle));

        let second = &config.cameras[1].analytics;
        assert!(second.has_traffic());
        assert!(!second.enables(ObjectClass::Vehicle));
    }

    #[test]
    fn collision_detection_forces_tracking() {
        let forced = AppConfig::from_json(CONFIG).unwrap();
        assert!(forced.forces_tracking());
        assert!(forced.tracking_enabled());

        let plain = AppConfig {
            tracking: true,
            ..forced.clone()
        };
        assert!(!plain.forces_tracking());

        let off = AppConfig {
            tracking: false,
            detect_collision: false,
            ..forced
        };
        assert!(!off.forces_tracking());
        assert!(!off.tracking_enabled());
    }

    #[test]
    fn params_fall_back_to_defaults() {
        let config = AppConfig::from_json(CONFIG).unwrap();

        assert_eq!(config.params.near_miss_x, 5.5);
        assert_eq!(config.params.near_miss_y, 3.0);
        assert_eq!(config.params.min_vehicle_area_ratio, 0.009);
        assert_eq!(config.params.stale_frames, 10);
    }

    #[test]
    fn rejects_empty_camera_list() {
        let err = AppConfig::from_json(r#"{"frames_queue_size": 4, "cameras": []}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn rejects_non_positive_threshold() {
        let params = TrackingParams {
            acc_factor: 0.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn pedestrian_only_camera_has_no_traffic() {
        let analytics = Analytics::new([ObjectClass::Person, ObjectClass::Person]);
        assert!(!analytics.has_traffic());
        assert_eq!(Vec::<String>::from(analytics), vec!["pedestrian".to_string()]);
    }
}
