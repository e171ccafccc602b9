use crate::circular_queue::CircularQueue;
use crate::geometry::Point;

/// Number of consecutive samples averaged into one velocity/acceleration estimate.
pub const SAMPLE_SPAN: usize = 5;

/// Trailing window used by the near-miss signal.
const TRAILING_SPAN: usize = 3;

/// A per-frame motion estimate (velocity or acceleration) and its length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    pub vector: Point,
    pub magnitude: f32,
}

impl Default for Motion {
    fn default() -> Self {
        Self::new(Point::zeros())
    }
}

impl Motion {
    #[inline]
    pub fn new(vector: Point) -> Self {
        Self {
            vector,
            magnitude: vector.norm(),
        }
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.vector.x.is_finite() && self.vector.y.is_finite() && self.magnitude.is_finite()
    }
}

/// Three-valued sign: `-1`, `0` or `1`.
#[inline]
pub fn sign(v: f32) -> i8 {
    (v > 0.0) as i8 - (v < 0.0) as i8
}

/// Mean of every entry of a full window, `None` until the window fills.
pub fn window_mean(window: &CircularQueue<Point>) -> Option<Point> {
    if !window.is_full() || window.is_empty() {
        return None;
    }

    let sum = window.iter().fold(Point::zeros(), |acc, p| acc + p);

    Some(sum / window.len() as f32)
}

/// Number of consecutive deltas an estimate is averaged over, for a history of `len` samples.
#[inline]
pub fn span(len: usize) -> usize {
    SAMPLE_SPAN.min(len.saturating_sub(1))
}

/// Average delta between consecutive positions, newest first. Needs at least
/// two deltas, otherwise the motion is degenerate.
pub fn mean_delta(positions: &CircularQueue<Point>) -> Option<Point> {
    let limit = span(positions.len());
    if limit <= 1 {
        return None;
    }

    let sum = positions
        .pairs()
        .take(limit)
        .fold(Point::zeros(), |acc, (newer, older)| acc + (newer - older));

    Some(sum / limit as f32)
}

/// Average change of velocity, each sample scaled by `factor / (y + 10)` of the
/// matching averaged position so that slow far-away motion weighs as much as
/// fast motion close to the camera.
pub fn mean_scaled_delta(
    velocities: &CircularQueue<Motion>,
    positions: &CircularQueue<Point>,
    factor: f32,
) -> Option<Point> {
    let limit = span(velocities.len());
    if limit <= 1 {
        return None;
    }

    let one = Point::new(1.0, 1.0);
    let sum = velocities
        .pairs()
        .zip(positions.iter())
        .take(limit)
        .fold(Point::zeros(), |acc, ((newer, older), pos)| {
            let scale = factor / (pos.y + 10.0);
            acc + ((newer.vector + one) * scale - (older.vector + one) * scale)
        });

    Some(sum / limit as f32)
}

/// Deviation of the current acceleration from its short trailing average,
/// per axis. Acceleration samples that point along the velocity count as
/// positive, against it as negative.
pub fn acceleration_deviation(
    accelerations: &CircularQueue<Motion>,
    velocities: &CircularQueue<Motion>,
    current: &Motion,
) -> (f32, f32) {
    let agreement = |idx: usize| match (accelerations.get(idx), velocities.get(idx)) {
        (Some(a), Some(v)) => (
            directed(sign(a.vector.x) == sign(v.vector.x)),
            directed(sign(a.vector.y) == sign(v.vector.y)),
        ),
        _ => (1.0, 1.0),
    };

    let (sign_x, sign_y) = agreement(0);
    let mut trailing = Point::zeros();

    if accelerations.len() > 1 {
        let lim = accelerations.len().min(TRAILING_SPAN);

        for idx in 1..lim {
            let (sx, sy) = agreement(idx);
            if let Some(a) = accelerations.get(idx) {
                trailing.x += sx * a.vector.x.abs();
                trailing.y += sy * a.vector.y.abs();
            }
        }

        trailing /= lim as f32;
    }

    (
        (sign_x * current.vector.x.abs() - trailing.x).abs(),
        (sign_y * current.vector.y.abs() - trailing.y).abs(),
    )
}

#[inline(always)]
fn directed(same: bool) -> f32 {
    if same {
        1.0
    } else {
        -1.0
    }
}
