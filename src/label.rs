use serde_derive::{Deserialize, Serialize};

/// Object classes the tracker follows, with the detector's raw label ids.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ObjectClass {
    Vehicle,
    Person,
    Bicycle,
}

impl ObjectClass {
    pub const ALL: [ObjectClass; 3] = [Self::Vehicle, Self::Person, Self::Bicycle];

    #[inline]
    pub fn from_label_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(Self::Vehicle),
            1 => Some(Self::Person),
            2 => Some(Self::Bicycle),
            _ => None,
        }
    }

    #[inline]
    pub fn label_id(self) -> i32 {
        match self {
            Self::Vehicle => 0,
            Self::Person => 1,
            Self::Bicycle => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Vehicle => "Vehicle",
            Self::Person => "Person",
            Self::Bicycle => "Bike",
        }
    }

    /// Name used in a camera's `analytics` setting to enable this class.
    pub fn analytic(self) -> &'static str {
        match self {
            Self::Vehicle => "vehicle",
            Self::Person => "pedestrian",
            Self::Bicycle => "bike",
        }
    }
}

/// BGR render color
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color(pub [u8; 3]);

impl Color {
    pub const UNKNOWN: Color = Color([0, 0, 0]);
    pub const VEHICLE: Color = Color([0, 255, 255]);
    pub const PERSON: Color = Color([255, 255, 0]);
    pub const BICYCLE: Color = Color([0, 255, 0]);
    pub const NEAR_MISS: Color = Color([0, 165, 255]);
    pub const COLLISION: Color = Color([0, 0, 225]);

    pub fn of(class: Option<ObjectClass>) -> Color {
        match class {
            Some(ObjectClass::Vehicle) => Self::VEHICLE,
            Some(ObjectClass::Person) => Self::PERSON,
            Some(ObjectClass::Bicycle) => Self::BICYCLE,
            None => Self::UNKNOWN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_ids_map_both_ways() {
        for class in ObjectClass::ALL {
            assert_eq!(ObjectClass::from_label_id(class.label_id()), Some(class));
        }

        assert_eq!(ObjectClass::from_label_id(7), None);
        assert_eq!(ObjectClass::from_label_id(-1), None);
    }

    #[test]
    fn display_and_analytics_names_differ() {
        assert_eq!(ObjectClass::Bicycle.name(), "Bike");
        assert_eq!(ObjectClass::Bicycle.analytic(), "bike");
        assert_eq!(ObjectClass::Person.name(), "Person");
        assert_eq!(ObjectClass::Person.analytic(), "pedestrian");
    }

    #[test]
    fn unlabeled_tracks_render_black() {
        assert_eq!(Color::of(None), Color::UNKNOWN);
        assert_eq!(Color::of(Some(ObjectClass::Bicycle)), Color([0, 255, 0]));
    }
}
