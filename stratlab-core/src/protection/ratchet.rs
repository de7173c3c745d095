//! Ratchet invariant enforcement for trailing stops
//!
//! **Core Rule:** Stops may tighten, never loosen.
//!
//! - Long positions: the level can only rise
//! - Short positions: the level can only fall

use crate::domain::PositionSide;

#[derive(Debug, Clone, PartialEq)]
pub struct RatchetState {
    /// Current stop level (high-water mark for longs, low-water mark for shorts)
    current_level: Option<f64>,
    side: PositionSide,
}

impl RatchetState {
    pub fn new(side: PositionSide) -> Self {
        Self {
            current_level: None,
            side,
        }
    }

    /// Apply the ratchet to a proposed level and return the effective one.
    ///
    /// ```
    /// use stratlab_core::domain::PositionSide;
    /// use stratlab_core::protection::RatchetState;
    ///
    /// let mut ratchet = RatchetState::new(PositionSide::Long);
    /// assert_eq!(ratchet.apply(95.0), 95.0);
    /// assert_eq!(ratchet.apply(100.0), 100.0); // tighten
    /// assert_eq!(ratchet.apply(90.0), 100.0); // loosening blocked
    /// ```
    pub fn apply(&mut self, proposed: f64) -> f64 {
        let level = match (self.current_level, self.side) {
            (None, _) | (Some(_), PositionSide::Flat) => proposed,
            (Some(current), PositionSide::Long) => current.max(proposed),
            (Some(current), PositionSide::Short) => current.min(proposed),
        };
        self.current_level = Some(level);
        level
    }

    pub fn current_level(&self) -> Option<f64> {
        self.current_level
    }

    pub fn side(&self) -> PositionSide {
        self.side
    }

    /// Forget the level (position closed or replaced).
    pub fn clear(&mut self) {
        self.current_level = None;
    }
}
