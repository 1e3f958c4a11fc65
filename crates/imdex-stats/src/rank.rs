//! Midranks with tie bookkeeping
//!
//! The Mann-Whitney U normal approximation needs average ranks over the
//! pooled sample and the tie term sum(t^3 - t) for its variance correction.

/// Average (mid) ranks of `values`, 1-based, together with the tie term
/// sum(t^3 - t) over all tie groups.
///
/// Values must not contain NaN; callers screen their input first.
pub fn average_ranks(values: &[f64]) -> (Vec<f64>, f64) {
    let n = values.len();
    if n == 0 {
        return (Vec::new(), 0.0);
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap());

    let mut ranks = vec![0.0; n];
    let mut tie_term = 0.0;

    let mut start = 0;
    while start < n {
        let mut end = start;
        while end + 1 < n && values[order[end + 1]] == values[order[start]] {
            end += 1;
        }
        // Mid rank of the tie group [start, end], 1-based.
        let rank = (start + end) as f64 / 2.0 + 1.0;
        for &idx in &order[start..=end] {
            ranks[idx] = rank;
        }
        let t = (end - start + 1) as f64;
        tie_term += t * t * t - t;
        start = end + 1;
    }

    (ranks, tie_term)
}
