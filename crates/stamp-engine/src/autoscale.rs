//! Autoscale bounds for numeric stamps.
//!
//! Numeric samples are colored against a running min/max observed while
//! drawing. Earlier frames in a pass may have been colored with stale
//! bounds when a later frame widens them; the render loop restarts the
//! pass when that happens (bounded, see the image aggregate).

/// Running value bounds for one numeric image.
///
/// Mutated only by the render pass currently holding the image's render
/// lock.
#[derive(Debug, Clone)]
pub struct Autoscale {
    min: f32,
    max: f32,
    seeded: bool,
    hint: Option<(f32, f32)>,
}

impl Autoscale {
    /// Create bounds, optionally seeded from server hints.
    pub fn new(hint: Option<(f32, f32)>) -> Self {
        match hint {
            Some((lo, hi)) => Self {
                min: lo,
                max: hi,
                seeded: true,
                hint,
            },
            None => Self {
                min: f32::INFINITY,
                max: f32::NEG_INFINITY,
                seeded: false,
                hint: None,
            },
        }
    }

    /// Observe a sample. Returns true when the bounds widened, meaning
    /// pixels already colored this pass used stale bounds.
    pub fn observe(&mut self, value: f32) -> bool {
        if value.is_nan() {
            return false;
        }
        if !self.seeded {
            self.min = value;
            self.max = value;
            self.seeded = true;
            return true;
        }
        let mut changed = false;
        if value < self.min {
            self.min = value;
            changed = true;
        }
        if value > self.max {
            self.max = value;
            changed = true;
        }
        changed
    }

    /// Current bounds for color mapping. Unseeded bounds fall back to a
    /// unit range so nothing divides by zero.
    pub fn bounds(&self) -> (f32, f32) {
        if self.seeded {
            (self.min, self.max)
        } else {
            (0.0, 1.0)
        }
    }

    /// Reset to the seed hints, forgetting observed values. Called when
    /// the projection or resolution is invalidated.
    pub fn reset(&mut self) {
        *self = Self::new(self.hint);
    }
}
