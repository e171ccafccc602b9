use serde_derive::{Deserialize, Serialize};

use crate::geometry::Rect;
use crate::label::ObjectClass;

/// Raw detector output: left-top rectangle, detector label id and score
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    #[serde(rename = "rectangle")]
    pub rect: Rect,
    #[serde(rename = "label")]
    pub label_id: i32,
    pub confidence: f32,
}

impl Detection {
    #[inline]
    pub fn new(rect: Rect, label_id: i32, confidence: f32) -> Self {
        Self {
            rect,
            label_id,
            confidence,
        }
    }

    #[inline]
    pub fn class(&self) -> Option<ObjectClass> {
        ObjectClass::from_label_id(self.label_id)
    }
}

/// A detection accepted for tracking. The class stays optional because a
/// track may be created before its class is known.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Target {
    pub rect: Rect,
    pub class: Option<ObjectClass>,
}

impl Target {
    #[inline]
    pub fn new(rect: Rect, class: Option<ObjectClass>) -> Self {
        Self { rect, class }
    }
}
