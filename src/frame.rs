use serde_derive::{Deserialize, Serialize};

use crate::config::{CameraConfig, TrackingParams};
use crate::detection::{Detection, Target};
use crate::label::ObjectClass;

/// One channel's detections for one video frame.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Frame {
    pub channel: usize,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

/// Per-class detection counts of a single frame.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObjectCounts {
    pub car: u32,
    pub ped: u32,
    pub bike: u32,
}

impl ObjectCounts {
    #[inline]
    pub fn add(&mut self, class: ObjectClass) {
        match class {
            ObjectClass::Vehicle => self.car += 1,
            ObjectClass::Person => self.ped += 1,
            ObjectClass::Bicycle => self.bike += 1,
        }
    }
}

impl Frame {
    #[inline]
    pub fn new(channel: usize, width: u32, height: u32, detections: Vec<Detection>) -> Self {
        Self {
            channel,
            width,
            height,
            detections,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Keeps confident detections of classes the camera analyses, in
    /// detector order, and counts them per class.
    pub fn classify(
        &self,
        camera: &CameraConfig,
        params: &TrackingParams,
    ) -> (Vec<Target>, ObjectCounts) {
        let mut counts = ObjectCounts::default();
        let targets = self
            .iter()
            .filter(|det| det.confidence >= params.min_confidence)
            .filter_map(|det| {
                let class = det.class().filter(|c| camera.analytics.enables(*c))?;
                counts.add(class);

                Some(Target::new(det.rect, Some(class)))
            })
            .collect();

        (targets, counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Analytics;
    use crate::geometry::Rect;

    fn det(label_id: i32, confidence: f32) -> Detection {
        Detection::new(Rect::new(0.0, 0.0, 10.0, 10.0), label_id, confidence)
    }

    #[test]
    fn drops_low_confidence_and_disabled_classes() {
        let camera = CameraConfig::new(
            "Main St",
            Analytics::new([ObjectClass::Vehicle, ObjectClass::Person]),
        );
        let frame = Frame::new(
            0,
            640,
            480,
            vec![det(0, 0.9), det(0, 0.49), det(1, 0.5), det(2, 0.99), det(9, 0.99)],
        );

        let (targets, counts) = frame.classify(&camera, &TrackingParams::default());

        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].class, Some(ObjectClass::Vehicle));
        assert_eq!(targets[1].class, Some(ObjectClass::Person));
        assert_eq!(
            counts,
            ObjectCounts {
                car: 1,
                ped: 1,
                bike: 0
            }
        );
    }

    #[test]
    fn deserializes_detector_records() {
        let frame: Frame = serde_json::from_str(
            r#"{"channel": 1, "width": 640, "height": 360,
                "detections": [{"rectangle": {"x": 1, "y": 2, "w": 3, "h": 4},
                                "label": 2, "confidence": 0.75}]}"#,
        )
        .unwrap();

        assert_eq!(frame.len(), 1);
        assert_eq!(frame.detections[0].class(), Some(ObjectClass::Bicycle));
        assert_eq!(frame.detections[0].rect, Rect::new(1.0, 2.0, 3.0, 4.0));
    }
}
