//! Order-statistics kernel for connection-interval analysis.
//!
//! Everything here is pure and operates on the sorted inter-connection
//! deltas of a timestamp series. Quartile ranks use nearest-rank selection
//! with half-away-from-zero rounding; downstream analytics depend on that
//! exact rounding, so it must not be swapped for banker's rounding.

/// Nearest-rank index for quantile `p` over `m` sorted samples.
///
/// `f64::round` rounds half away from zero, so a tie at .5 selects the
/// larger index.
fn rank(p: f64, m: usize) -> usize {
    (p * (m - 1) as f64).round() as usize
}

/// Adjacent differences of an ascending timestamp list, sorted ascending.
///
/// Callers must supply at least two timestamps.
pub fn delta_intervals(ts_list: &[i64]) -> Vec<i64> {
    let mut diff: Vec<i64> = ts_list.windows(2).map(|w| w[1] - w[0]).collect();
    diff.sort_unstable();
    diff
}

/// Q1/Q2/Q3 of a sorted, non-empty delta slice.
pub fn quartiles(sorted_diff: &[i64]) -> (i64, i64, i64) {
    let m = sorted_diff.len();
    (
        sorted_diff[rank(0.25, m)],
        sorted_diff[rank(0.5, m)],
        sorted_diff[rank(0.75, m)],
    )
}

/// Bowley's quartile measure of skew, bounded in [-1, 1].
///
/// Zero when the denominator vanishes, and also when Q2 touches either
/// outer quartile: the measure is numerically unreliable for distributions
/// degenerate around the median.
pub fn bowley_skew(q1: i64, q2: i64, q3: i64) -> f64 {
    if q3 != q1 && q2 != q1 && q2 != q3 {
        (q1 + q3 - 2 * q2) as f64 / (q3 - q1) as f64
    } else {
        0.0
    }
}

/// Median absolute deviation about `median` over a sorted delta slice.
pub fn median_absolute_deviation(sorted_diff: &[i64], median: i64) -> i64 {
    let mut devs: Vec<i64> = sorted_diff.iter().map(|d| (d - median).abs()).collect();
    devs.sort_unstable();
    devs[rank(0.5, devs.len())]
}

/// Spread between the largest and smallest delta. Kept on the scoring
/// document for human analysis.
pub fn interval_range(sorted_diff: &[i64]) -> i64 {
    sorted_diff[sorted_diff.len() - 1] - sorted_diff[0]
}

/// Distinct delta values in sorted order, their frequencies, and the mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalHistogram {
    pub intervals: Vec<i64>,
    pub counts: Vec<i64>,
    pub mode: i64,
    pub mode_count: i64,
}

/// Builds the interval histogram in a single walk of the pre-sorted,
/// non-empty slice.
///
/// Mode ties resolve to the smallest interval value.
pub fn interval_histogram(sorted_diff: &[i64]) -> IntervalHistogram {
    let mut intervals: Vec<i64> = Vec::with_capacity(sorted_diff.len() / 2 + 1);
    let mut counts: Vec<i64> = Vec::with_capacity(sorted_diff.len() / 2 + 1);

    for &d in sorted_diff {
        match intervals.last() {
            Some(&last) if last == d => {
                if let Some(count) = counts.last_mut() {
                    *count += 1;
                }
            }
            _ => {
                intervals.push(d);
                counts.push(1);
            }
        }
    }

    let mut mode = intervals[0];
    let mut mode_count = counts[0];
    for (interval, &count) in intervals.iter().zip(&counts) {
        if count > mode_count {
            mode = *interval;
            mode_count = count;
        }
    }

    IntervalHistogram {
        intervals,
        counts,
        mode,
        mode_count,
    }
}
