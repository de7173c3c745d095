//! Trade intents: what a strategy wants done to its position on this bar.
//!
//! Intents are produced fresh every bar by the signal evaluator or the
//! protection layer and are never carried across bars.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::position::{Position, PositionSide};

/// Position-changing request for the current bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "volume", rename_all = "snake_case")]
pub enum TradeIntent {
    /// Hold: nothing to do this bar.
    None,
    /// Open a long position from flat.
    EnterLong(f64),
    /// Open a short position from flat.
    EnterShort(f64),
    /// Close the open position and open the opposite side with the given volume.
    Reverse(f64),
    /// Close the whole position.
    ExitAll,
    /// Reduce the position by the given volume.
    ExitPartial(f64),
    /// Scale into the open position (DCA/averaging strategies).
    AddToPosition(f64),
}

impl TradeIntent {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Volume carried by the intent, if any.
    pub fn volume(&self) -> Option<f64> {
        match *self {
            Self::EnterLong(v)
            | Self::EnterShort(v)
            | Self::Reverse(v)
            | Self::ExitPartial(v)
            | Self::AddToPosition(v) => Some(v),
            Self::None | Self::ExitAll => None,
        }
    }

    /// True for intents that can open or grow exposure.
    pub fn increases_exposure(&self) -> bool {
        matches!(
            self,
            Self::EnterLong(_) | Self::EnterShort(_) | Self::Reverse(_) | Self::AddToPosition(_)
        )
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, Self::ExitAll | Self::ExitPartial(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::EnterLong(_) => "enter_long",
            Self::EnterShort(_) => "enter_short",
            Self::Reverse(_) => "reverse",
            Self::ExitAll => "exit_all",
            Self::ExitPartial(_) => "exit_partial",
            Self::AddToPosition(_) => "add_to_position",
        }
    }
}

impl fmt::Display for TradeIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.volume() {
            Some(v) => write!(f, "{}({v})", self.label()),
            None => f.write_str(self.label()),
        }
    }
}

/// Desired market exposure, independent of what is currently held.
///
/// Evaluators usually decide a bias first and then reconcile it against the
/// current position with [`Bias::toward`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bias {
    Long,
    Short,
    Flat,
}

impl Bias {
    pub fn is_directional(&self) -> bool {
        matches!(self, Bias::Long | Bias::Short)
    }

    /// Get the opposite bias (for position flips).
    pub fn opposite(&self) -> Self {
        match self {
            Bias::Long => Bias::Short,
            Bias::Short => Bias::Long,
            Bias::Flat => Bias::Flat,
        }
    }

    /// Check if the bias requires a position change from the current side.
    pub fn requires_change(&self, side: PositionSide) -> bool {
        match self {
            Bias::Long => side != PositionSide::Long,
            Bias::Short => side != PositionSide::Short,
            Bias::Flat => side != PositionSide::Flat,
        }
    }

    /// Reconcile the bias against the position: open, reverse, close or hold.
    pub fn toward(&self, position: &Position, volume: f64) -> TradeIntent {
        match (self, position.side()) {
            (Bias::Long, PositionSide::Flat) => TradeIntent::EnterLong(volume),
            (Bias::Short, PositionSide::Flat) => TradeIntent::EnterShort(volume),
            (Bias::Long, PositionSide::Short) | (Bias::Short, PositionSide::Long) => {
                TradeIntent::Reverse(volume)
            }
            (Bias::Flat, PositionSide::Long | PositionSide::Short) => TradeIntent::ExitAll,
            _ => TradeIntent::None,
        }
    }
}
