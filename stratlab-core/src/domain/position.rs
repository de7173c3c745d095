use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Volumes at or below this magnitude are treated as zero.
pub const VOLUME_EPSILON: f64 = 1e-9;

/// Direction of the net position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
    Flat,
}

impl PositionSide {
    /// +1 for long, -1 for short, 0 when flat.
    pub fn sign(self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
            Self::Flat => 0.0,
        }
    }
}

/// Single net position for the strategy's primary instrument.
///
/// `signed_volume == 0.0` is the canonical flat state; positive is long,
/// negative is short. Only the position state machine mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub instrument: String,
    pub signed_volume: f64,
    pub average_entry_price: f64,
    pub open_timestamp: Option<DateTime<Utc>>,
}

impl Position {
    pub fn flat(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            signed_volume: 0.0,
            average_entry_price: 0.0,
            open_timestamp: None,
        }
    }

    pub fn side(&self) -> PositionSide {
        if self.signed_volume > VOLUME_EPSILON {
            PositionSide::Long
        } else if self.signed_volume < -VOLUME_EPSILON {
            PositionSide::Short
        } else {
            PositionSide::Flat
        }
    }

    /// Absolute volume held.
    pub fn volume(&self) -> f64 {
        match self.side() {
            PositionSide::Flat => 0.0,
            _ => self.signed_volume.abs(),
        }
    }

    pub fn is_flat(&self) -> bool {
        self.side() == PositionSide::Flat
    }

    pub fn is_long(&self) -> bool {
        self.side() == PositionSide::Long
    }

    pub fn is_short(&self) -> bool {
        self.side() == PositionSide::Short
    }

    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        if self.is_flat() {
            return 0.0;
        }
        self.signed_volume * (current_price - self.average_entry_price)
    }
}
