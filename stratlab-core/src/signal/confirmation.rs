//! Multi-timeframe confirmation.
//!
//! Each configured (fast, slow) pair votes long when fast > slow and short
//! when fast < slow. Pairs are typically bound to different sources (a daily
//! and an hourly trend, say). A position is taken when all pairs come into
//! agreement, and reversed when the agreement flips.

use crate::domain::{Bias, Position, TradeIntent};
use crate::pipeline::IndicatorSnapshot;

use super::SignalEvaluator;

#[derive(Debug, Clone)]
pub struct MultiTimeframe {
    pub pairs: Vec<(String, String)>,
    pub volume: f64,
}

impl MultiTimeframe {
    pub fn new(pairs: Vec<(String, String)>, volume: f64) -> Self {
        Self { pairs, volume }
    }

    /// Common bias of all pairs in `snapshot`, `None` without agreement.
    fn agreement(&self, snapshot: &IndicatorSnapshot) -> Option<Bias> {
        let mut votes = self.pairs.iter().map(|(fast, slow)| {
            let (f, s) = (snapshot.get(fast)?, snapshot.get(slow)?);
            if f > s {
                Some(Bias::Long)
            } else if f < s {
                Some(Bias::Short)
            } else {
                None
            }
        });
        let first = votes.next()??;
        votes.try_fold(first, |acc, vote| (vote? == acc).then_some(acc))
    }
}

impl SignalEvaluator for MultiTimeframe {
    fn name(&self) -> &str {
        "multi_timeframe"
    }

    fn evaluate(
        &self,
        current: &IndicatorSnapshot,
        previous: &IndicatorSnapshot,
        position: &Position,
    ) -> TradeIntent {
        match self.agreement(current) {
            Some(now) if self.agreement(previous) != Some(now) => now.toward(position, self.volume),
            _ => TradeIntent::None,
        }
    }
}
