use std::sync::Arc;

use tracing::debug;

use crate::config::TrackingParams;
use crate::counters::{ClassCounts, Counters};
use crate::geometry::Rect;
use crate::label::{Color, ObjectClass};
use crate::track::{Track, TrackId};

/// Outcome of [`TrackManager::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// A new track was created; carries the channel's class counts after it.
    Created(ClassCounts),
    Updated,
    /// The id exists and overwriting was not requested.
    Skipped,
    /// Zero-area rectangle.
    Rejected,
}

/// Live tracks of one channel.
pub struct TrackManager {
    channel: usize,
    tracks: Vec<Track>,
    next_id: TrackId,
    counts: ClassCounts,
    totals: Arc<Counters>,
    params: TrackingParams,
}

impl TrackManager {
    pub fn new(channel: usize, params: TrackingParams, totals: Arc<Counters>) -> Self {
        Self {
            channel,
            tracks: Vec::with_capacity(64),
            next_id: 0,
            counts: ClassCounts::default(),
            totals,
            params,
        }
    }

    /// Id for a detection: the closest existing track of the same class, or
    /// a fresh id when nothing overlaps it. `None` when the detection overlaps
    /// a track without being close enough to any.
    pub fn associate(&self, rect: &Rect, class: Option<ObjectClass>) -> Option<TrackId> {
        let area = rect.area();
        let dist_thresh = area / 2.0;
        let center = rect.center();

        let mut new_object = true;
        let mut best: Option<(TrackId, f32)> = None;

        for track in &self.tracks {
            let inter = track.rect.intersect(rect).area();
            let overlap = ratio(inter, track.rect.area()).max(ratio(inter, area));

            if overlap > self.params.overlap_ratio {
                new_object = false;
            }

            if track.class.is_some() && track.class != class {
                continue;
            }

            let distance = (track.center - center).norm_squared();
            let closer = match best {
                None => distance < dist_thresh,
                Some((_, min)) => distance < min,
            };

            if closer {
                best = Some((track.id, distance));
            }
        }

        match best {
            Some((id, _)) => Some(id),
            None if new_object => Some(self.next_id),
            None => None,
        }
    }

    /// Creates track `id`, or overwrites its observation when `update` is set.
    pub fn upsert(
        &mut self,
        rect: Rect,
        color: Color,
        id: TrackId,
        class: Option<ObjectClass>,
        update: bool,
    ) -> Upsert {
        if rect.area() == 0.0 {
            return Upsert::Rejected;
        }

        if let Some(track) = self.get_mut(id) {
            if !update {
                return Upsert::Skipped;
            }

            track.observe(rect, class, color);
            return Upsert::Updated;
        }

        self.tracks
            .push(Track::new(id, rect, color, class, self.params));
        self.next_id = self.next_id.max(id + 1);

        if let Some(class) = class {
            self.counts.increment(class);
            self.totals.record_track(class);
        }

        debug!(
            channel = self.channel,
            id,
            class = class.map_or("unknown", ObjectClass::name),
            "track created"
        );

        Upsert::Created(self.counts)
    }

    /// Returns `false` when no such track exists.
    pub fn remove(&mut self, id: TrackId) -> bool {
        match self.tracks.iter().position(|t| t.id == id) {
            Some(idx) => {
                self.tracks.remove(idx);
                debug!(channel = self.channel, id, "track removed");
                true
            }
            None => false,
        }
    }

    #[inline]
    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    #[inline]
    pub fn get_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id == id)
    }

    #[inline]
    pub fn contains(&self, id: TrackId) -> bool {
        self.get(id).is_some()
    }

    #[inline]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    #[inline]
    pub(crate) fn tracks_mut(&mut self) -> &mut Vec<Track> {
        &mut self.tracks
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    #[inline]
    pub fn next_id(&self) -> TrackId {
        self.next_id
    }

    #[inline]
    pub fn counts(&self) -> ClassCounts {
        self.counts
    }

    /// Process-wide class totals across all channels.
    #[inline]
    pub fn total_counts(&self) -> ClassCounts {
        self.totals.snapshot().classes
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }
}

#[inline(always)]
fn ratio(part: f32, whole: f32) -> f32 {
    if whole > 0.0 {
        part / whole
    } else {
        0.0
    }
}
