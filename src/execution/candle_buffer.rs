use crate::error::{BotError, BotResult};
use crate::models::{Candle, Timeframe};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// Why an update left the buffer untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Older than the newest candle
    Stale,
    /// Same open time as a candle that is already closed
    Frozen,
}

/// What `ingest` did with an update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// New bar appended; the previous last bar (if any) is now closed
    Appended { evicted: bool },
    /// In-progress bar overwritten in place
    Replaced { closed: bool },
    Ignored(IgnoreReason),
}

#[derive(Debug)]
struct Series {
    candles: VecDeque<Candle>,
    /// Whether the last slot is still accumulating
    last_open: bool,
}

impl Series {
    fn new(capacity: usize) -> Self {
        Self {
            candles: VecDeque::with_capacity(capacity + 1),
            last_open: false,
        }
    }
}

/// Thread-safe in-memory buffer for candle data
///
/// Maintains one bounded rolling window per configured timeframe. Every
/// timeframe has its own guard, held only while mutating or copying.
#[derive(Clone)]
pub struct CandleBuffer {
    series: Arc<HashMap<Timeframe, Mutex<Series>>>,
    max_candles: usize,
}

impl CandleBuffer {
    /// Create a new candle buffer
    ///
    /// # Arguments
    /// * `timeframes` - Timeframes to track; updates for any other timeframe are rejected
    /// * `max_candles` - Maximum number of candles to keep per timeframe
    pub fn new(timeframes: &[Timeframe], max_candles: usize) -> Self {
        let series = timeframes
            .iter()
            .map(|tf| (*tf, Mutex::new(Series::new(max_candles))))
            .collect();

        Self {
            series: Arc::new(series),
            max_candles,
        }
    }

    pub fn capacity(&self) -> usize {
        self.max_candles
    }

    pub fn timeframes(&self) -> Vec<Timeframe> {
        let mut tfs: Vec<Timeframe> = self.series.keys().copied().collect();
        tfs.sort();
        tfs
    }

    fn lock(&self, timeframe: Timeframe) -> BotResult<MutexGuard<'_, Series>> {
        self.series
            .get(&timeframe)
            .ok_or(BotError::UnknownTimeframe(timeframe))?
            .lock()
            .map_err(|_| BotError::LockPoisoned(timeframe))
    }

    /// Bulk-load history for a timeframe, replacing anything already buffered
    ///
    /// Needs at least `max_candles` candles in strictly increasing order. The
    /// newest `max_candles` are kept and the last one is treated as the
    /// in-progress bar.
    pub fn seed(&self, timeframe: Timeframe, candles: Vec<Candle>) -> BotResult<()> {
        if candles.len() < self.max_candles {
            return Err(BotError::InsufficientHistory {
                timeframe,
                have: candles.len(),
                need: self.max_candles,
            });
        }

        if let Some(w) = candles.windows(2).find(|w| w[1].open_time <= w[0].open_time) {
            return Err(BotError::OutOfOrder {
                timeframe,
                open_time: w[1].open_time,
            });
        }

        let skip = candles.len() - self.max_candles;
        let mut series = self.lock(timeframe)?;
        series.candles = candles.into_iter().skip(skip).collect();
        series.last_open = !series.candles.is_empty();

        tracing::info!(
            timeframe = %timeframe,
            candles = series.candles.len(),
            "Seeded candle history"
        );
        Ok(())
    }

    /// Absorb a streamed candle update
    ///
    /// A newer open time appends (evicting the oldest bar over capacity); the
    /// same open time overwrites the in-progress bar, freezing it when
    /// `is_closed`. Updates to closed or older bars are ignored.
    pub fn ingest(
        &self,
        timeframe: Timeframe,
        candle: Candle,
        is_closed: bool,
    ) -> BotResult<IngestOutcome> {
        let mut series = self.lock(timeframe)?;

        let last_time = series.candles.back().map(|c| c.open_time);
        let outcome = match last_time {
            Some(last) if candle.open_time < last => IngestOutcome::Ignored(IgnoreReason::Stale),
            Some(last) if candle.open_time == last => {
                if !series.last_open {
                    IngestOutcome::Ignored(IgnoreReason::Frozen)
                } else {
                    if let Some(slot) = series.candles.back_mut() {
                        *slot = candle;
                    }
                    series.last_open = !is_closed;
                    IngestOutcome::Replaced { closed: is_closed }
                }
            }
            _ => {
                series.candles.push_back(candle);
                series.last_open = !is_closed;

                let mut evicted = false;
                while series.candles.len() > self.max_candles {
                    series.candles.pop_front();
                    evicted = true;
                }
                IngestOutcome::Appended { evicted }
            }
        };

        Ok(outcome)
    }

    /// Copy of the series for a timeframe, safe to use while ingestion continues
    pub fn snapshot(&self, timeframe: Timeframe) -> BotResult<Vec<Candle>> {
        let series = self.lock(timeframe)?;
        Ok(series.candles.iter().cloned().collect())
    }

    /// Get count of candles for a timeframe
    pub fn candle_count(&self, timeframe: Timeframe) -> BotResult<usize> {
        Ok(self.lock(timeframe)?.candles.len())
    }

    pub fn last_open_time(&self, timeframe: Timeframe) -> BotResult<Option<DateTime<Utc>>> {
        Ok(self.lock(timeframe)?.candles.back().map(|c| c.open_time))
    }

    /// Whether the newest bar is still in progress
    pub fn has_open_candle(&self, timeframe: Timeframe) -> BotResult<bool> {
        Ok(self.lock(timeframe)?.last_open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const M1: Timeframe = Timeframe::from_minutes(1);
    const M5: Timeframe = Timeframe::from_minutes(5);

    fn t(i: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(i)
    }

    fn create_test_candle(minute: i64, price: f64) -> Candle {
        Candle {
            open_time: t(minute),
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 1000.0,
        }
    }

    fn history(n: usize) -> Vec<Candle> {
        (0..n as i64)
            .map(|i| create_test_candle(i, 100.0 + i as f64))
            .collect()
    }

    #[test]
    fn test_new_buffer() {
        let buffer = CandleBuffer::new(&[M1, M5], 100);
        assert_eq!(buffer.capacity(), 100);
        assert_eq!(buffer.timeframes(), vec![M1, M5]);
        assert_eq!(buffer.candle_count(M1).unwrap(), 0);
    }

    #[test]
    fn test_unknown_timeframe_rejected() {
        let buffer = CandleBuffer::new(&[M1], 10);
        let result = buffer.ingest(M5, create_test_candle(0, 100.0), true);
        assert!(matches!(result, Err(BotError::UnknownTimeframe(tf)) if tf == M5));
    }

    #[test]
    fn test_seed_requires_full_history() {
        let buffer = CandleBuffer::new(&[M1], 10);
        let result = buffer.seed(M1, history(9));
        assert!(matches!(
            result,
            Err(BotError::InsufficientHistory { have: 9, need: 10, .. })
        ));
        assert_eq!(buffer.candle_count(M1).unwrap(), 0);
    }

    #[test]
    fn test_seed_keeps_newest_and_marks_last_open() {
        let buffer = CandleBuffer::new(&[M1], 10);
        buffer.seed(M1, history(15)).unwrap();

        let candles = buffer.snapshot(M1).unwrap();
        assert_eq!(candles.len(), 10);
        assert_eq!(candles[0].close, 105.0);
        assert_eq!(candles[9].close, 114.0);
        assert!(buffer.has_open_candle(M1).unwrap());

        // Stream update for the in-progress bar replaces it
        let outcome = buffer.ingest(M1, create_test_candle(14, 200.0), false).unwrap();
        assert_eq!(outcome, IngestOutcome::Replaced { closed: false });
        assert_eq!(buffer.snapshot(M1).unwrap()[9].close, 200.0);
    }

    #[test]
    fn test_seed_rejects_unsorted() {
        let buffer = CandleBuffer::new(&[M1], 3);
        let mut candles = history(3);
        candles.swap(1, 2);
        assert!(matches!(
            buffer.seed(M1, candles),
            Err(BotError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn test_open_candle_updates_then_close() {
        let buffer = CandleBuffer::new(&[M1], 10);

        let outcome = buffer.ingest(M1, create_test_candle(0, 100.0), false).unwrap();
        assert_eq!(outcome, IngestOutcome::Appended { evicted: false });

        for price in [101.0, 99.5, 102.0] {
            let outcome = buffer.ingest(M1, create_test_candle(0, price), false).unwrap();
            assert_eq!(outcome, IngestOutcome::Replaced { closed: false });
            assert_eq!(buffer.candle_count(M1).unwrap(), 1);
        }

        let final_bar = Candle {
            open_time: t(0),
            open: 100.0,
            high: 103.0,
            low: 99.0,
            close: 102.5,
            volume: 4200.0,
        };
        let outcome = buffer.ingest(M1, final_bar.clone(), true).unwrap();
        assert_eq!(outcome, IngestOutcome::Replaced { closed: true });

        let candles = buffer.snapshot(M1).unwrap();
        assert_eq!(candles, vec![final_bar]);
        assert!(!buffer.has_open_candle(M1).unwrap());

        // Closed bars are immutable
        let outcome = buffer.ingest(M1, create_test_candle(0, 1.0), false).unwrap();
        assert_eq!(outcome, IngestOutcome::Ignored(IgnoreReason::Frozen));
        assert_eq!(buffer.snapshot(M1).unwrap()[0].close, 102.5);
    }

    #[test]
    fn test_stale_update_ignored() {
        let buffer = CandleBuffer::new(&[M1], 10);
        buffer.ingest(M1, create_test_candle(5, 100.0), false).unwrap();

        let outcome = buffer.ingest(M1, create_test_candle(3, 90.0), true).unwrap();
        assert_eq!(outcome, IngestOutcome::Ignored(IgnoreReason::Stale));
        assert_eq!(buffer.candle_count(M1).unwrap(), 1);
    }

    #[test]
    fn test_max_candles_limit() {
        let buffer = CandleBuffer::new(&[M1], 5);

        for i in 0..10 {
            let outcome = buffer
                .ingest(M1, create_test_candle(i, 100.0 + i as f64), true)
                .unwrap();
            assert_eq!(outcome, IngestOutcome::Appended { evicted: i >= 5 });
        }

        let candles = buffer.snapshot(M1).unwrap();
        assert_eq!(candles.len(), 5); // Should only keep last 5
        assert_eq!(candles[0].close, 105.0);
        assert_eq!(candles[4].close, 109.0);
    }

    #[test]
    fn test_timeframes_are_independent() {
        let buffer = CandleBuffer::new(&[M1, M5], 10);
        buffer.ingest(M1, create_test_candle(0, 100.0), true).unwrap();
        buffer.ingest(M1, create_test_candle(1, 101.0), true).unwrap();
        buffer.ingest(M5, create_test_candle(0, 200.0), false).unwrap();

        assert_eq!(buffer.candle_count(M1).unwrap(), 2);
        assert_eq!(buffer.candle_count(M5).unwrap(), 1);
        assert_eq!(buffer.last_open_time(M1).unwrap(), Some(t(1)));
    }

    #[test]
    fn test_random_sequences_respect_invariants() {
        let mut rng = StdRng::seed_from_u64(7);
        let capacity = 20;
        let buffer = CandleBuffer::new(&[M1], capacity);
        let mut minute = 0i64;

        for _ in 0..2_000 {
            // Mostly in-progress ticks, sometimes a new bar, occasionally a stale one
            let roll: u8 = rng.gen_range(0..10);
            let at = match roll {
                0..=5 => minute,
                6..=8 => {
                    minute += rng.gen_range(1..3);
                    minute
                }
                _ => minute - rng.gen_range(1..5),
            };
            let is_closed = rng.gen_bool(0.2);
            let before = buffer.candle_count(M1).unwrap();
            let outcome = buffer
                .ingest(M1, create_test_candle(at, rng.gen_range(90.0..110.0)), is_closed)
                .unwrap();
            let after = buffer.candle_count(M1).unwrap();

            match outcome {
                IngestOutcome::Replaced { .. } | IngestOutcome::Ignored(_) => {
                    assert_eq!(before, after)
                }
                IngestOutcome::Appended { evicted: false } => assert_eq!(after, before + 1),
                IngestOutcome::Appended { evicted: true } => assert_eq!(after, capacity),
            }
            assert!(after <= capacity);

            let candles = buffer.snapshot(M1).unwrap();
            assert!(candles
                .windows(2)
                .all(|w| w[0].open_time < w[1].open_time));
        }
    }

    #[test]
    fn test_thread_safety() {
        use std::thread;

        let buffer = CandleBuffer::new(&[M1, M5], 100);
        let buffer_clone = buffer.clone();

        let handle = thread::spawn(move || {
            for i in 0..150 {
                buffer_clone
                    .ingest(M1, create_test_candle(i, 100.0 + i as f64), true)
                    .unwrap();
            }
        });

        for i in 0..150 {
            buffer
                .ingest(M5, create_test_candle(i * 5, 100.0 + i as f64), false)
                .unwrap();
            let snapshot = buffer.snapshot(M1).unwrap();
            assert!(snapshot.len() <= 100);
        }

        handle.join().unwrap();

        assert_eq!(buffer.candle_count(M1).unwrap(), 100);
        assert_eq!(buffer.candle_count(M5).unwrap(), 100);
    }
}
