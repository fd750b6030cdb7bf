//! Periodicity scoring for one pair.
//!
//! A clean beacon has a symmetric delta-time distribution (Bowley skew near
//! zero), tight dispersion around its median interval (low MAD), and a
//! connection count that fills its share of the observation window. Each
//! property becomes a component score in [0, 1] and the final score is
//! their average, ceilinged to three decimals so persisted ties sort
//! deterministically downstream.

use crate::input::{InputRecord, ScoringWindow};
use crate::stats;
use crate::update::PairScoreDoc;

/// Dispersion saturates to a zero score at 30 seconds of MAD.
const DISPERSION_CUTOFF_SECS: f64 = 30.0;

/// Connection count saturates once the pair averages one connection per
/// tenth of the observation window.
const CONN_WINDOW_DIVISOR: f64 = 10.0;

/// Scores a non-strobe input against the run window.
///
/// `ts_list` must hold at least two ascending timestamps; the caller
/// enforces that precondition.
pub(crate) fn score_timestamps(
    entry: &InputRecord,
    ts_list: &[i64],
    window: &ScoringWindow,
) -> PairScoreDoc {
    let diff = stats::delta_intervals(ts_list);
    let (q1, q2, q3) = stats::quartiles(&diff);
    let skew = stats::bowley_skew(q1, q2, q3);
    let dispersion = stats::median_absolute_deviation(&diff, q2);
    let range = stats::interval_range(&diff);
    let hist = stats::interval_histogram(&diff);

    // less skew and less dispersion both score higher
    let skew_score = 1.0 - skew.abs();
    let mad_score = (1.0 - dispersion as f64 / DISPERSION_CUTOFF_SECS).max(0.0);

    let conn_div = (window.ts_max - window.ts_min) as f64 / CONN_WINDOW_DIVISOR;
    let conns_score = (entry.connection_count as f64 / conn_div).min(1.0);

    let score = ((skew_score + mad_score + conns_score) / 3.0 * 1000.0).ceil() / 1000.0;

    PairScoreDoc {
        connection_count: entry.connection_count,
        proxy: entry.proxy.clone(),
        src_network_name: entry.hosts.src_network_name.clone(),
        ts_range: range,
        ts_mode: hist.mode,
        ts_mode_count: hist.mode_count,
        ts_intervals: hist.intervals,
        ts_interval_counts: hist.counts,
        ts_dispersion: dispersion,
        ts_skew: skew,
        ts_conns_score: conns_score,
        ts_score: score,
        ts_list: ts_list.to_vec(),
        score,
        cid: window.chunk,
        strobe_fqdn: false,
    }
}
