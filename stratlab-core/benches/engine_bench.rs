//! Criterion benchmarks for the per-bar hot path.
//!
//! Benchmarks:
//! 1. Full engine step (pipeline, protection, evaluator, sink)
//! 2. Indicator updates in isolation
//! 3. Protection layer evaluation
//! 4. Multi-source feed merge

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use stratlab_core::domain::{BarEvent, Position, RawBar, SourceKey};
use stratlab_core::engine::{EngineParts, StrategyEngine};
use stratlab_core::feed::{replay, BarFeed, FeedEvent};
use stratlab_core::indicators::{Atr, Ema, Indicator, Rsi, Sma};
use stratlab_core::pipeline::IndicatorPipeline;
use stratlab_core::protection::{PriceSource, ProtectionLayer, ProtectionRule};
use stratlab_core::signal::MaCrossover;

// ── Helpers ──────────────────────────────────────────────────────────

fn make_raw_bars(n: usize, minutes: i64) -> Vec<RawBar> {
    let base = Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            let open = close - 0.3;
            let open_time = base + Duration::minutes(i as i64 * minutes);
            RawBar {
                open_time,
                close_time: open_time + Duration::minutes(minutes),
                open,
                high: close + 1.5,
                low: close - 1.5,
                close,
                volume: 1_000_000.0 + (i % 500) as f64,
                is_final: true,
            }
        })
        .collect()
}

fn make_bars(n: usize) -> Vec<BarEvent> {
    let key = SourceKey::new("BENCH", "1d");
    make_raw_bars(n, 1440)
        .iter()
        .map(|raw| BarEvent::from_raw(key.clone(), raw))
        .collect()
}

fn crossover_engine() -> StrategyEngine {
    let key = SourceKey::new("BENCH", "1d");
    let mut pipeline = IndicatorPipeline::new();
    pipeline
        .register(key.clone(), Box::new(Sma::new(20)), Some("fast".into()))
        .unwrap();
    pipeline
        .register(key.clone(), Box::new(Ema::new(50)), Some("slow".into()))
        .unwrap();
    pipeline
        .register(key.clone(), Box::new(Atr::new(14)), None)
        .unwrap();
    let mut parts = EngineParts::new(key, pipeline, Box::new(MaCrossover::new("fast", "slow", 1.0)));
    parts.protection = ProtectionLayer::new(
        vec![
            ProtectionRule::FixedStop { distance: 5.0 },
            ProtectionRule::TrailingStop {
                distance: 3.0,
                activation: 1.0,
            },
        ],
        PriceSource::Intrabar,
    );
    StrategyEngine::new(parts)
}

// ── 1. Engine Step ───────────────────────────────────────────────────

fn bench_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_step");

    for &bar_count in &[252, 1260, 2520] {
        let bars = make_bars(bar_count);
        group.bench_with_input(
            BenchmarkId::new("ma_crossover", bar_count),
            &bar_count,
            |b, _| {
                b.iter(|| {
                    let mut engine = crossover_engine();
                    engine.run(bars.iter().cloned().map(FeedEvent::Bar));
                    black_box(engine.report().intents.len())
                });
            },
        );
    }

    group.finish();
}

// ── 2. Indicator Updates ─────────────────────────────────────────────

fn bench_indicators(c: &mut Criterion) {
    let mut group = c.benchmark_group("indicator_update");
    let bars = make_bars(2520);

    let makers: Vec<fn() -> Box<dyn Indicator>> = vec![
        || -> Box<dyn Indicator> { Box::new(Sma::new(20)) },
        || -> Box<dyn Indicator> { Box::new(Ema::new(50)) },
        || -> Box<dyn Indicator> { Box::new(Atr::new(14)) },
        || -> Box<dyn Indicator> { Box::new(Rsi::new(14)) },
    ];
    for make in makers {
        let name = make().name().to_string();
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut indicator = make();
                for bar in &bars {
                    black_box(indicator.update(bar));
                }
            });
        });
    }

    group.finish();
}

// ── 3. Protection Layer ──────────────────────────────────────────────

fn bench_protection(c: &mut Criterion) {
    let mut group = c.benchmark_group("protection");
    let bars = make_bars(2520);
    let mut position = Position::flat("BENCH");
    position.signed_volume = 1.0;
    position.average_entry_price = 1.0;
    position.open_timestamp = Some(bars[0].close_time);

    group.bench_function("trailing_2520_bars", |b| {
        b.iter(|| {
            let mut layer = ProtectionLayer::new(
                vec![ProtectionRule::TrailingStop {
                    distance: 50.0,
                    activation: 0.0,
                }],
                PriceSource::Intrabar,
            );
            for bar in &bars {
                black_box(layer.evaluate(bar, &position));
            }
        });
    });

    group.finish();
}

// ── 4. Feed Merge ────────────────────────────────────────────────────

fn bench_feed(c: &mut Criterion) {
    let mut group = c.benchmark_group("feed_merge");
    let fast = make_raw_bars(5000, 5);
    let slow = make_raw_bars(1000, 25);

    group.bench_function("two_sources_6000_bars", |b| {
        b.iter(|| {
            let mut feed = BarFeed::new();
            feed.subscribe(SourceKey::new("BENCH", "5m"), 0, replay(fast.clone()))
                .unwrap();
            feed.subscribe(SourceKey::new("BENCH", "25m"), 1, replay(slow.clone()))
                .unwrap();
            black_box(feed.count())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_engine,
    bench_indicators,
    bench_protection,
    bench_feed,
);
criterion_main!(benches);
