use serde_derive::Serialize;

use crate::circular_queue::CircularQueue;
use crate::config::TrackingParams;
use crate::error::Error;
use crate::geometry::{Point, Rect};
use crate::kinematics::{self, Motion};
use crate::label::{Color, ObjectClass};

pub type TrackId = u64;

const CENTER_WINDOW: usize = 5;
const HISTORY_LEN: usize = 50;

/// Belief state of one object followed across frames of a channel.
#[derive(Debug, Clone)]
pub struct Track {
    pub(crate) id: TrackId,
    pub(crate) class: Option<ObjectClass>,
    pub(crate) color: Color,
    pub(crate) rect: Rect,
    pub(crate) center: Point,

    // raw centers of the last frames, feed the averaged positions
    pub(crate) centers: CircularQueue<Point>,
    pub(crate) positions: CircularQueue<Point>,

    pub(crate) velocity: Motion,
    pub(crate) acceleration: Motion,
    pub(crate) velocities: CircularQueue<Motion>,
    pub(crate) accelerations: CircularQueue<Motion>,

    pub(crate) missed: u32,
    pub(crate) updated: bool,
    pub(crate) near_miss: bool,
    pub(crate) collision: bool,
    pub(crate) to_delete: bool,
    pub(crate) border: u32,

    params: TrackingParams,
}

impl Track {
    pub fn new(
        id: TrackId,
        rect: Rect,
        color: Color,
        class: Option<ObjectClass>,
        params: TrackingParams,
    ) -> Self {
        Self {
            id,
            class,
            color,
            rect,
            center: rect.center(),
            centers: CircularQueue::with_capacity(CENTER_WINDOW),
            positions: CircularQueue::with_capacity(HISTORY_LEN),
            velocity: Motion::default(),
            acceleration: Motion::default(),
            velocities: CircularQueue::with_capacity(HISTORY_LEN),
            accelerations: CircularQueue::with_capacity(HISTORY_LEN),
            missed: 0,
            updated: false,
            near_miss: false,
            collision: false,
            to_delete: false,
            border: 0,
            params,
        }
    }

    /// Takes a matched detection for this frame.
    pub fn observe(&mut self, rect: Rect, class: Option<ObjectClass>, color: Color) {
        self.rect = rect;
        self.center = rect.center();
        self.updated = true;
        self.missed = 0;

        if self.class.is_none() {
            self.class = class;
            self.color = color;
        }
    }

    /// Moves the track one frame forward. Unmatched tracks coast along their
    /// last velocity.
    pub fn advance(&mut self) -> Result<(), Error> {
        if !self.updated {
            self.rect.translate(self.velocity.vector);
        }

        self.updated = false;
        self.center = self.rect.center();
        self.centers.push(self.center);

        self.smooth_position();
        self.estimate_velocity();
        self.estimate_acceleration();

        self.missed += 1;
        self.mark_for_deletion();

        if self.rect.is_finite() && self.velocity.is_finite() && self.acceleration.is_finite() {
            Ok(())
        } else {
            Err(Error::CorruptTrack { id: self.id })
        }
    }

    fn smooth_position(&mut self) {
        if let Some(avg) = kinematics::window_mean(&self.centers) {
            self.positions.push(avg);
        }
    }

    fn estimate_velocity(&mut self) {
        match kinematics::mean_delta(&self.positions) {
            Some(delta) => {
                self.velocity = Motion::new(delta);
                self.velocities.push(self.velocity);
            }
            None => self.velocity = Motion::default(),
        }
    }

    fn estimate_acceleration(&mut self) {
        let delta = kinematics::mean_scaled_delta(
            &self.velocities,
            &self.positions,
            self.params.acc_factor,
        );

        match delta {
            Some(delta) => {
                self.acceleration = Motion::new(delta);
                self.accelerations.push(self.acceleration);
            }
            None => self.acceleration = Motion::default(),
        }
    }

    fn mark_for_deletion(&mut self) {
        let min_vel = self.params.min_velocity_area_ratio * self.rect.area();

        if self.missed >= self.params.stale_frames && self.velocity.magnitude < min_vel {
            self.to_delete = true;
        }
    }

    #[inline]
    pub fn is_in_frame(&self, width: u32, height: u32) -> bool {
        let c = self.center;

        c.x >= 0.0 && c.x < width as f32 && c.y >= 0.0 && c.y < height as f32
    }

    /// Per-axis deviation of the current acceleration from its trailing average.
    #[inline]
    pub fn acceleration_deviation(&self) -> (f32, f32) {
        kinematics::acceleration_deviation(&self.accelerations, &self.velocities, &self.acceleration)
    }

    #[inline]
    pub fn id(&self) -> TrackId {
        self.id
    }

    #[inline]
    pub fn class(&self) -> Option<ObjectClass> {
        self.class
    }

    #[inline]
    pub fn color(&self) -> Color {
        self.color
    }

    #[inline]
    pub fn rect(&self) -> &Rect {
        &self.rect
    }

    #[inline]
    pub fn center(&self) -> Point {
        self.center
    }

    #[inline]
    pub fn velocity(&self) -> &Motion {
        &self.velocity
    }

    #[inline]
    pub fn acceleration(&self) -> &Motion {
        &self.acceleration
    }

    #[inline]
    pub fn missed_updates(&self) -> u32 {
        self.missed
    }

    #[inline]
    pub fn is_near_miss(&self) -> bool {
        self.near_miss
    }

    #[inline]
    pub fn is_collision(&self) -> bool {
        self.collision
    }

    #[inline]
    pub fn is_pending_deletion(&self) -> bool {
        self.to_delete
    }
}

/// What an overlay renderer needs to draw one track.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TrackSnapshot {
    pub id: TrackId,
    pub class: Option<ObjectClass>,
    pub color: Color,
    pub rect: Rect,
    pub center: [f32; 2],
    pub velocity: Option<[f32; 2]>,
    pub acceleration: Option<[f32; 2]>,
    pub trail: Vec<[f32; 2]>,
    pub border: u32,
    pub near_miss: bool,
    pub collision: bool,
}

impl From<&Track> for TrackSnapshot {
    fn from(t: &Track) -> TrackSnapshot {
        // arrows are only drawn once the center window has filled
        let warm = t.centers.is_full();

        TrackSnapshot {
            id: t.id,
            class: t.class,
            color: t.color,
            rect: t.rect,
            center: [t.center.x, t.center.y],
            velocity: warm.then(|| [t.velocity.vector.x, t.velocity.vector.y]),
            acceleration: (warm && t.accelerations.len() > 1)
                .then(|| [t.acceleration.vector.x, t.acceleration.vector.y]),
            trail: t.positions.iter().map(|p| [p.x, p.y]).collect(),
            border: t.border,
            near_miss: t.near_miss,
            collision: t.collision,
        }
    }
}
