//! Timeframe aggregation: M5 bars in, right-labeled M15/H1 bars out.
//!
//! An M5 bar stamped `t` (its open time) belongs to the bucket
//! `[floor_P(t), floor_P(t) + P)`. The aggregated bar is stamped with the
//! bucket's close time `floor_P(t) + P` and only exists once the bucket has
//! elapsed: either its last constituent M5 bar was pushed, or a bar from a
//! later bucket arrived. A trailing bucket that never completes is dropped.

use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};

use crate::domain::{Bar, Timeframe};

/// Close-time label of the bucket containing `ts`.
pub fn bucket_label(ts: NaiveDateTime, timeframe: Timeframe) -> NaiveDateTime {
    let period = timeframe.minutes();
    let minute_of_day = i64::from(ts.hour()) * 60 + i64::from(ts.minute());
    let floored = minute_of_day - minute_of_day % period;
    ts.date().and_time(NaiveTime::MIN) + Duration::minutes(floored + period)
}

/// Number of bars in `closed` whose close time is `<= t`.
///
/// `closed` must be sorted by timestamp, which the aggregator guarantees.
pub fn closed_count_as_of(closed: &[Bar], t: NaiveDateTime) -> usize {
    closed.partition_point(|b| b.timestamp <= t)
}

/// Number of bars in `closed` whose close time is strictly before `t`.
pub fn closed_before(closed: &[Bar], t: NaiveDateTime) -> usize {
    closed.partition_point(|b| b.timestamp < t)
}

#[derive(Debug, Clone)]
struct Bucket {
    label: NaiveDateTime,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    bid: QuoteMean,
    ask: QuoteMean,
    spread: QuoteMean,
}

#[derive(Debug, Clone, Copy, Default)]
struct QuoteMean {
    sum: f64,
    count: usize,
}

impl QuoteMean {
    fn add(&mut self, value: Option<f64>) {
        if let Some(v) = value.filter(|v| v.is_finite()) {
            self.sum += v;
            self.count += 1;
        }
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

impl Bucket {
    fn start(label: NaiveDateTime, bar: &Bar) -> Self {
        let mut bucket = Self {
            label,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: 0.0,
            bid: QuoteMean::default(),
            ask: QuoteMean::default(),
            spread: QuoteMean::default(),
        };
        bucket.absorb_extras(bar);
        bucket
    }

    fn absorb(&mut self, bar: &Bar) {
        self.high = self.high.max(bar.high);
        self.low = self.low.min(bar.low);
        self.close = bar.close;
        self.absorb_extras(bar);
    }

    fn absorb_extras(&mut self, bar: &Bar) {
        if bar.volume.is_finite() {
            self.volume += bar.volume;
        }
        self.bid.add(bar.bid);
        self.ask.add(bar.ask);
        self.spread.add(bar.spread);
    }

    fn into_bar(self) -> Bar {
        Bar {
            timestamp: self.label,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            bid: self.bid.mean(),
            ask: self.ask.mean(),
            spread: self.spread.mean(),
        }
    }
}

/// Incremental M5 → higher-timeframe aggregator.
#[derive(Debug, Clone)]
pub struct TimeframeAggregator {
    timeframe: Timeframe,
    current: Option<Bucket>,
    closed: Vec<Bar>,
}

impl TimeframeAggregator {
    pub fn new(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            current: None,
            closed: Vec::new(),
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Feed the next M5 bar. Returns the bars that closed because of it
    /// (at most two: a bucket closed by a gap plus a bucket completed by this bar).
    pub fn push(&mut self, bar: &Bar) -> Vec<Bar> {
        let mut newly_closed = Vec::new();
        let label = bucket_label(bar.timestamp, self.timeframe);

        match self.current.as_mut() {
            Some(bucket) if bucket.label == label => bucket.absorb(bar),
            _ => {
                if let Some(stale) = self.current.take() {
                    newly_closed.push(stale.into_bar());
                }
                self.current = Some(Bucket::start(label, bar));
            }
        }

        // Last constituent: the M5 bar that ends exactly at the label.
        if bar.timestamp + Timeframe::M5.duration() >= label {
            if let Some(done) = self.current.take() {
                newly_closed.push(done.into_bar());
            }
        }

        self.closed.extend(newly_closed.iter().cloned());
        newly_closed
    }

    /// All bars closed so far, in order.
    pub fn closed(&self) -> &[Bar] {
        &self.closed
    }

    pub fn into_closed(self) -> Vec<Bar> {
        self.closed
    }

    pub fn closed_count_as_of(&self, t: NaiveDateTime) -> usize {
        closed_count_as_of(&self.closed, t)
    }

    pub fn closed_before(&self, t: NaiveDateTime) -> usize {
        closed_before(&self.closed, t)
    }
}

/// Batch aggregation of a full M5 series.
pub fn aggregate(bars: &[Bar], timeframe: Timeframe) -> Vec<Bar> {
    let mut agg = TimeframeAggregator::new(timeframe);
    for bar in bars {
        agg.push(bar);
    }
    agg.into_closed()
}
