use std::collections::HashSet;
use std::sync::Arc;

use rayon::prelude::*;
use serde_derive::Serialize;
use tracing::{debug, info};

use crate::config::TrackingParams;
use crate::counters::{ClassCounts, Counters};
use crate::detection::Target;
use crate::error::Error;
use crate::label::{Color, ObjectClass};
use crate::manager::{TrackManager, Upsert};
use crate::telemetry::Telemetry;
use crate::track::{TrackId, TrackSnapshot};

/// Frame-level event tag.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    #[default]
    None,
    NearMiss,
    Collision,
}

/// Unordered pair of track ids, smaller id first.
pub type Couple = (TrackId, TrackId);

#[inline]
fn couple(a: TrackId, b: TrackId) -> Couple {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Per-channel orchestration of tracking and collision inference.
pub struct Session {
    channel: usize,
    address: String,
    params: TrackingParams,
    manager: TrackManager,
    dims: Option<(u32, u32)>,
    near_misses: u64,
    collisions: u64,
    couples: HashSet<Couple>,
    last_near_miss: Option<Couple>,
    frames: u64,
    counters: Arc<Counters>,
    telemetry: Option<Arc<Telemetry>>,
}

impl Session {
    pub fn new(
        channel: usize,
        address: impl Into<String>,
        params: TrackingParams,
        counters: Arc<Counters>,
        telemetry: Option<Arc<Telemetry>>,
    ) -> Self {
        Self {
            channel,
            address: address.into(),
            params,
            manager: TrackManager::new(channel, params, counters.clone()),
            dims: None,
            near_misses: 0,
            collisions: 0,
            couples: HashSet::new(),
            last_near_miss: None,
            frames: 0,
            counters,
            telemetry,
        }
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.dims.is_some()
    }

    /// Seeds the channel with one track per target, ids in target order.
    /// Only the first call has any effect. `false` when a target had zero area.
    pub fn initialize(&mut self, width: u32, height: u32, targets: &[Target]) -> bool {
        if self.is_initialized() {
            return true;
        }

        self.dims = Some((width, height));
        info!(channel = self.channel, width, height, targets = targets.len(), "session initialized");

        for target in targets {
            if !self.passes_size_filter(target) {
                continue;
            }

            let id = self.manager.next_id();
            let color = Color::of(target.class);

            match self.manager.upsert(target.rect, color, id, target.class, false) {
                Upsert::Created(counts) => self.publish_counts(counts),
                Upsert::Rejected => return false,
                Upsert::Updated | Upsert::Skipped => {}
            }
        }

        true
    }

    /// Associates each target with a track and updates or creates it.
    /// `false` when a target had zero area or the session is not initialized.
    pub fn update(&mut self, targets: &[Target]) -> bool {
        if !self.is_initialized() {
            return false;
        }

        for target in targets {
            if !self.passes_size_filter(target) {
                continue;
            }

            let id = match self.manager.associate(&target.rect, target.class) {
                Some(id) => id,
                None => continue,
            };

            let color = Color::of(target.class);
            match self.manager.upsert(target.rect, color, id, target.class, true) {
                Upsert::Created(counts) => self.publish_counts(counts),
                Upsert::Rejected => return false,
                Upsert::Updated | Upsert::Skipped => {}
            }
        }

        true
    }

    /// Small vehicle detections are most likely spurious.
    fn passes_size_filter(&self, target: &Target) -> bool {
        let (w, h) = match self.dims {
            Some(dims) => dims,
            None => return false,
        };

        let frame_area = w as f32 * h as f32;
        let small = frame_area > 0.0
            && target.rect.area() / frame_area < self.params.min_vehicle_area_ratio;

        !(small && target.class == Some(ObjectClass::Vehicle))
    }

    fn publish_counts(&self, counts: ClassCounts) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.set_channel_counts(self.channel, counts);
            telemetry.set_total_counts(self.manager.total_counts());
        }
    }

    /// Advances every track, then drops tracks that left the frame or went
    /// stale. An error leaves the session in an unusable state.
    pub fn step(&mut self) -> Result<(), Error> {
        let (width, height) = match self.dims {
            Some(dims) => dims,
            None => return Ok(()),
        };

        self.manager
            .tracks_mut()
            .par_iter_mut()
            .try_for_each(|track| track.advance())?;

        let gone: Vec<TrackId> = self
            .manager
            .tracks()
            .iter()
            .filter(|t| !t.is_in_frame(width, height) || t.is_pending_deletion())
            .map(|t| t.id())
            .collect();

        for id in gone {
            self.manager.remove(id);
        }

        Ok(())
    }

    /// Flags near misses from acceleration anomalies and counts collisions
    /// between overlapping flagged tracks. `false` when there are no tracks.
    pub fn detect_collisions(&mut self) -> bool {
        if self.manager.is_empty() {
            return false;
        }

        let manager = &self.manager;
        self.couples
            .retain(|(a, b)| manager.contains(*a) && manager.contains(*b));

        let n = self.manager.len();
        for i in 0..n {
            let tracks = self.manager.tracks_mut();
            if tracks[i].class == Some(ObjectClass::Person) {
                continue;
            }

            let (dev_x, dev_y) = tracks[i].acceleration_deviation();
            if !(dev_x > self.params.near_miss_x || dev_y >= self.params.near_miss_y) {
                continue;
            }

            tracks[i].near_miss = true;

            for j in 0..n {
                let tracks = self.manager.tracks_mut();
                if i == j || tracks[i].rect.intersect(&tracks[j].rect).area() <= 0.0 {
                    continue;
                }

                tracks[i].border = 2;
                tracks[j].border = 2;

                let pair = couple(tracks[i].id, tracks[j].id);
                let escalates = tracks[j].near_miss;

                if escalates {
                    tracks[i].collision = true;
                    tracks[j].collision = true;
                    tracks[i].color = Color::COLLISION;
                    tracks[j].color = Color::COLLISION;
                } else {
                    tracks[i].color = Color::NEAR_MISS;
                    tracks[j].color = Color::NEAR_MISS;
                }

                if escalates && self.couples.insert(pair) {
                    self.record_collision(pair);
                }

                if !escalates && self.last_near_miss != Some(pair) {
                    self.record_near_miss(pair);
                }
            }
        }

        self.frames += 1;
        true
    }

    fn record_collision(&mut self, pair: Couple) {
        self.collisions += 1;
        let total = self.counters.record_collision();

        info!(
            channel = self.channel,
            a = pair.0,
            b = pair.1,
            total,
            "collision detected at {}",
            self.address
        );

        if let Some(telemetry) = &self.telemetry {
            telemetry.set_collisions(self.channel, self.collisions);
            telemetry.set_total_collisions(total);
            telemetry.push_event(format!("Collision detected at - {}", self.address));
        }
    }

    fn record_near_miss(&mut self, pair: Couple) {
        self.near_misses += 1;
        self.last_near_miss = Some(pair);

        debug!(channel = self.channel, a = pair.0, b = pair.1, "near miss");

        if let Some(telemetry) = &self.telemetry {
            telemetry.set_near_misses(self.channel, self.near_misses);
        }
    }

    /// `Collision` if any track collided, else `NearMiss` if any track had a near miss.
    pub fn event(&self) -> Event {
        let tracks = self.manager.tracks();

        if tracks.iter().any(|t| t.is_collision()) {
            Event::Collision
        } else if tracks.iter().any(|t| t.is_near_miss()) {
            Event::NearMiss
        } else {
            Event::None
        }
    }

    pub fn snapshots(&self) -> Vec<TrackSnapshot> {
        self.manager.tracks().iter().map(Into::into).collect()
    }

    /// Drops every track; counters and couples are kept.
    pub fn terminate(&mut self) {
        self.manager.clear();
    }

    /// Starts tracking over after a fatal error. Tracks, couples and frame
    /// dimensions are dropped; the next frame initializes again. Cumulative
    /// counts and the id high-water mark are kept, so published telemetry
    /// never goes backwards.
    pub fn reset(&mut self) {
        self.manager.clear();
        self.couples.clear();
        self.last_near_miss = None;
        self.dims = None;
    }

    #[cfg(test)]
    pub(crate) fn manager_mut(&mut self) -> &mut TrackManager {
        &mut self.manager
    }

    #[inline]
    pub fn channel(&self) -> usize {
        self.channel
    }

    #[inline]
    pub fn manager(&self) -> &TrackManager {
        &self.manager
    }

    #[inline]
    pub fn near_miss_count(&self) -> u64 {
        self.near_misses
    }

    #[inline]
    pub fn collision_count(&self) -> u64 {
        self.collisions
    }

    #[inline]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    #[inline]
    pub fn active_couples(&self) -> &HashSet<Couple> {
        &self.couples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Point, Rect};
    use crate::kinematics::Motion;
    use crate::telemetry::FieldValue;

    fn session() -> Session {
        Session::new(
            0,
            "Main St",
            TrackingParams::default(),
            Arc::new(Counters::new()),
            None,
        )
    }

    fn vehicle(x: f32, y: f32, w: f32, h: f32) -> Target {
        Target::new(Rect::new(x, y, w, h), Some(ObjectClass::Vehicle))
    }

    fn person(x: f32, y: f32, w: f32, h: f32) -> Target {
        Target::new(Rect::new(x, y, w, h), Some(ObjectClass::Person))
    }

    fn insert(s: &mut Session, id: TrackId, rect: Rect) {
        let created = s.manager.upsert(
            rect,
            Color::VEHICLE,
            id,
            Some(ObjectClass::Vehicle),
            false,
        );
        assert!(matches!(created, Upsert::Created(_)));
    }

    fn jolt(s: &mut Session, id: TrackId) {
        if let Some(t) = s.manager.get_mut(id) {
            t.acceleration = Motion::new(Point::new(10.0, 0.0));
        }
    }

    #[test]
    fn initialize_assigns_ids_in_order() {
        let mut s = session();
        let targets = [
            vehicle(0.0, 0.0, 100.0, 100.0),
            person(300.0, 0.0, 20.0, 40.0),
            vehicle(500.0, 300.0, 100.0, 100.0),
        ];

        assert!(s.initialize(640, 480, &targets));

        let ids: Vec<_> = s.manager().tracks().iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(s.manager().next_id(), 3);
    }

    #[test]
    fn initialize_runs_once() {
        let mut s = session();
        assert!(s.initialize(640, 480, &[vehicle(0.0, 0.0, 100.0, 100.0)]));
        assert!(s.initialize(640, 480, &[vehicle(300.0, 300.0, 100.0, 100.0)]));

        assert_eq!(s.manager().len(), 1);
    }

    #[test]
    fn small_vehicles_are_filtered_but_small_people_are_not() {
        let mut s = session();
        // 640x480 frame: 0.9% is ~2765 px^2
        let targets = [vehicle(0.0, 0.0, 50.0, 50.0), person(200.0, 0.0, 10.0, 20.0)];

        assert!(s.initialize(640, 480, &targets));
        assert_eq!(s.manager().len(), 1);
        assert_eq!(s.manager().tracks()[0].class(), Some(ObjectClass::Person));

        assert!(s.update(&[vehicle(400.0, 400.0, 50.0, 50.0)]));
        assert_eq!(s.manager().len(), 1);
    }

    #[test]
    fn zero_area_detection_fails_initialize() {
        let mut s = session();
        assert!(!s.initialize(640, 480, &[person(0.0, 0.0, 0.0, 10.0)]));
    }

    #[test]
    fn update_before_initialize_is_refused() {
        let mut s = session();
        assert!(!s.update(&[vehicle(0.0, 0.0, 100.0, 100.0)]));
        assert!(s.manager().is_empty());
    }

    #[test]
    fn update_matches_and_creates() {
        let mut s = session();
        s.initialize(640, 480, &[vehicle(0.0, 0.0, 100.0, 100.0)]);

        assert!(s.update(&[
            vehicle(4.0, 2.0, 100.0, 100.0),
            vehicle(400.0, 300.0, 100.0, 100.0),
        ]));

        assert_eq!(s.manager().len(), 2);
        assert_eq!(s.manager().get(0).map(|t| t.rect().x), Some(4.0));
        assert!(s.manager().contains(1));
    }

    #[test]
    fn step_removes_tracks_leaving_the_frame() {
        let mut s = session();
        s.initialize(640, 480, &[vehicle(0.0, 100.0, 100.0, 100.0)]);
        insert(&mut s, 1, Rect::new(-60.0, 300.0, 100.0, 100.0));

        s.step().unwrap();

        assert!(s.manager().contains(0));
        assert!(!s.manager().contains(1));

        // a new object at the same place gets a fresh id
        let id = s
            .manager()
            .associate(&Rect::new(-60.0, 300.0, 100.0, 100.0), Some(ObjectClass::Vehicle));
        assert_eq!(id, Some(2));
    }

    #[test]
    fn step_removes_stale_stationary_tracks() {
        let mut s = session();
        s.initialize(640, 480, &[vehicle(100.0, 100.0, 100.0, 100.0)]);

        for _ in 0..9 {
            s.step().unwrap();
        }
        assert_eq!(s.manager().len(), 1);

        s.step().unwrap();
        assert!(s.manager().is_empty());
    }

    #[test]
    fn step_reports_corrupt_tracks() {
        let mut s = session();
        s.initialize(640, 480, &[vehicle(100.0, 100.0, 100.0, 100.0)]);
        if let Some(t) = s.manager.get_mut(0) {
            t.velocity = Motion::new(Point::new(f32::INFINITY, 0.0));
        }

        assert!(matches!(s.step(), Err(Error::CorruptTrack { id: 0 })));
    }

    #[test]
    fn no_tracks_no_collision_pass() {
        let mut s = session();
        assert!(!s.detect_collisions());
        assert!(!s.detect_collisions());
        assert_eq!(s.event(), Event::None);
    }

    #[test]
    fn overlapping_near_misses_escalate_once() {
        let mut s = session();
        s.initialize(640, 480, &[]);
        insert(&mut s, 3, Rect::new(100.0, 100.0, 80.0, 80.0));
        insert(&mut s, 7, Rect::new(150.0, 120.0, 80.0, 80.0));
        jolt(&mut s, 3);
        jolt(&mut s, 7);

        assert!(s.detect_collisions());

        assert_eq!(s.collision_count(), 1);
        assert!(s.active_couples().contains(&(3, 7)));
        for id in [3, 7] {
            let t = s.manager().get(id).unwrap();
            assert!(t.is_collision());
            assert_eq!(t.color(), Color::COLLISION);
        }
        assert_eq!(s.event(), Event::Collision);

        // the same ongoing episode is not counted again
        assert!(s.detect_collisions());
        assert_eq!(s.collision_count(), 1);
        assert_eq!(s.active_couples().len(), 1);
    }

    #[test]
    fn lone_near_miss_counts_once_per_pair() {
        let mut s = session();
        s.initialize(640, 480, &[]);
        insert(&mut s, 0, Rect::new(100.0, 100.0, 80.0, 80.0));
        insert(&mut s, 1, Rect::new(150.0, 120.0, 80.0, 80.0));
        jolt(&mut s, 0);

        s.detect_collisions();
        s.detect_collisions();

        assert_eq!(s.near_miss_count(), 1);
        assert_eq!(s.collision_count(), 0);
        assert_eq!(s.manager().get(1).map(|t| t.color()), Some(Color::NEAR_MISS));
        assert_eq!(s.event(), Event::NearMiss);
    }

    #[test]
    fn people_never_trigger_near_misses() {
        let mut s = session();
        s.initialize(640, 480, &[person(100.0, 100.0, 40.0, 80.0)]);
        jolt(&mut s, 0);

        s.detect_collisions();

        assert!(!s.manager().tracks()[0].is_near_miss());
        assert_eq!(s.event(), Event::None);
    }

    #[test]
    fn couples_are_purged_when_a_member_goes_away() {
        let mut s = session();
        s.initialize(640, 480, &[]);
        insert(&mut s, 3, Rect::new(100.0, 100.0, 80.0, 80.0));
        insert(&mut s, 7, Rect::new(150.0, 120.0, 80.0, 80.0));
        insert(&mut s, 9, Rect::new(400.0, 300.0, 80.0, 80.0));
        jolt(&mut s, 3);
        jolt(&mut s, 7);
        s.detect_collisions();
        assert_eq!(s.active_couples().len(), 1);

        s.manager.remove(7);
        s.detect_collisions();

        assert!(s.active_couples().is_empty());
    }

    #[test]
    fn terminate_drops_tracks() {
        let mut s = session();
        s.initialize(640, 480, &[vehicle(0.0, 0.0, 100.0, 100.0)]);
        s.terminate();

        assert!(s.manager().is_empty());
        assert!(s.is_initialized());
    }

    #[test]
    fn collision_total_follows_global_counters() {
        let counters = Arc::new(Counters::new());
        let telemetry = Arc::new(Telemetry::new(2));
        let mut sessions: Vec<_> = (0..2)
            .map(|ch| {
                Session::new(
                    ch,
                    "Main St",
                    TrackingParams::default(),
                    counters.clone(),
                    Some(telemetry.clone()),
                )
            })
            .collect();

        for s in &mut sessions {
            s.initialize(640, 480, &[]);
            insert(s, 0, Rect::new(100.0, 100.0, 80.0, 80.0));
            insert(s, 1, Rect::new(150.0, 120.0, 80.0, 80.0));
            jolt(s, 0);
            jolt(s, 1);
            s.detect_collisions();
        }
        sessions[0].reset();

        let points = telemetry.collect();
        let total = points
            .iter()
            .find_map(|p| p.fields.get("total_collision_count"))
            .cloned();

        assert_eq!(counters.snapshot().collisions, 2);
        assert_eq!(total, Some(FieldValue::Count(2)));
    }

    #[test]
    fn reset_keeps_counts_and_ids() {
        let mut s = session();
        s.initialize(640, 480, &[]);
        insert(&mut s, 3, Rect::new(100.0, 100.0, 80.0, 80.0));
        insert(&mut s, 7, Rect::new(150.0, 120.0, 80.0, 80.0));
        jolt(&mut s, 3);
        jolt(&mut s, 7);
        s.detect_collisions();

        s.reset();

        assert!(!s.is_initialized());
        assert!(s.manager().is_empty());
        assert!(s.active_couples().is_empty());
        assert_eq!(s.collision_count(), 1);
        assert_eq!(s.manager().counts().vehicles, 2);

        assert!(s.initialize(640, 480, &[vehicle(300.0, 300.0, 100.0, 100.0)]));
        assert_eq!(s.manager().tracks()[0].id(), 8);
        assert_eq!(s.manager().counts().vehicles, 3);
    }

    #[test]
    fn event_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Event::NearMiss).unwrap(), "\"near_miss\"");
        assert_eq!(serde_json::to_string(&Event::None).unwrap(), "\"none\"");
    }
}
