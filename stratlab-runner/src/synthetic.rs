//! Seeded synthetic bars for development and tests.
//!
//! A plain random walk from 100.0; the same key, length and seed always give
//! the same bars. Results produced on synthetic data are tagged as such.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::warn;

use stratlab_core::domain::{RawBar, SourceKey};

use crate::data_loader::SourceData;

/// Synthetic data request, as written in sweep files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticSpec {
    pub bars: usize,
    #[serde(default)]
    pub seed: u64,
}

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Generate `n` bars for `key`, spaced by its timeframe (one day when the
/// timeframe is not recognized).
pub fn synthetic_bars(key: &SourceKey, n: usize, seed: u64) -> SourceData {
    let step = key.bar_duration().unwrap_or_else(|| {
        warn!(source = %key, "unknown timeframe, spacing synthetic bars daily");
        Duration::days(1)
    });

    // Same seed, different sources: different walks.
    let mut seed_bytes = *blake3::hash(key.to_string().as_bytes()).as_bytes();
    for (b, s) in seed_bytes.iter_mut().zip(seed.to_le_bytes()) {
        *b ^= s;
    }
    let mut rng = StdRng::from_seed(seed_bytes);

    let mut price = 100.0_f64;
    let mut open_time = epoch();
    let bars = (0..n)
        .map(|_| {
            let ret: f64 = rng.gen_range(-0.02..0.02);
            let open = price;
            let close = (price * (1.0 + ret)).max(0.01);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
            let volume = rng.gen_range(500.0..5_000.0);
            let bar = RawBar {
                open_time,
                close_time: open_time + step,
                open,
                high,
                low,
                close,
                volume,
                is_final: true,
            };
            price = close;
            open_time += step;
            bar
        })
        .collect();

    SourceData {
        key: key.clone(),
        bars,
        synthetic: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_bars() {
        let key = SourceKey::new("SYN", "1h");
        assert_eq!(synthetic_bars(&key, 50, 7), synthetic_bars(&key, 50, 7));
        assert_ne!(
            synthetic_bars(&key, 50, 7).bars,
            synthetic_bars(&key, 50, 8).bars
        );
    }

    #[test]
    fn bars_are_sane_and_spaced_by_timeframe() {
        let key = SourceKey::new("SYN", "15m");
        let data = synthetic_bars(&key, 100, 1);
        assert!(data.synthetic);
        assert_eq!(data.len(), 100);
        for pair in data.bars.windows(2) {
            assert_eq!(pair[1].open_time - pair[0].open_time, Duration::minutes(15));
            assert_eq!(pair[0].close_time, pair[1].open_time);
        }
        for bar in &data.bars {
            assert!(bar.high >= bar.open.max(bar.close));
            assert!(bar.low <= bar.open.min(bar.close));
            assert!(bar.low > 0.0);
        }
    }
}
