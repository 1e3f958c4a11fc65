//! Multi-test results: a tensor of comparisons per feature.

mod lazy;
mod pairwise;
mod partition;
mod rest;
mod ztest;

pub use lazy::LazyPairwiseTest;
pub use pairwise::PairwiseTest;
pub use partition::PartitionedTest;
pub use rest::VsRestTest;
pub use ztest::ZTest;

use ndarray::{Array1, ArrayD};

use crate::error::{ImdexError, ImdexResult};
use crate::result::TestResult;
use crate::summary::{apply_thresholds, assemble_records, SummaryFilter, SummaryRecord};

/// Upper-triangle group pairs (i < j), row-major.
pub(crate) fn upper_pairs(n: usize) -> Vec<(usize, usize)> {
    let mut pairs = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            pairs.push((i, j));
        }
    }
    pairs
}

/// Evaluate a per-pair computation, in parallel when the `parallel`
/// feature is enabled. Results come back in pair order either way.
#[cfg(feature = "parallel")]
pub(crate) fn map_pairs<F, R>(pairs: &[(usize, usize)], f: F) -> Vec<R>
where
    F: Fn(usize, usize) -> R + Sync,
    R: Send,
{
    use rayon::prelude::*;
    pairs.par_iter().map(|&(i, j)| f(i, j)).collect()
}

#[cfg(not(feature = "parallel"))]
pub(crate) fn map_pairs<F, R>(pairs: &[(usize, usize)], f: F) -> Vec<R>
where
    F: Fn(usize, usize) -> R,
{
    pairs.iter().map(|&(i, j)| f(i, j)).collect()
}

/// Position of a label in a group list kept in construction order.
pub(crate) fn group_position(groups: &[String], label: &str) -> ImdexResult<usize> {
    groups
        .iter()
        .position(|g| g == label)
        .ok_or_else(|| ImdexError::UnknownGroup {
            label: label.to_string(),
        })
}

/// The feature lane of one group pair in a dense `[g0, g1, features]`
/// tensor.
pub(crate) fn slice_pair(tensor: &ArrayD<f64>, i: usize, j: usize) -> Array1<f64> {
    let n_features = tensor.shape()[2];
    Array1::from_iter((0..n_features).map(|g| tensor[[i, j, g]]))
}

/// Summary rows restricted to one group pair.
pub(crate) fn pair_summary<T: TestResult + ?Sized>(
    test: &T,
    i: usize,
    j: usize,
    filter: &SummaryFilter,
) -> ImdexResult<Vec<SummaryRecord>> {
    let pval = slice_pair(test.pval()?, i, j);
    let qval = slice_pair(test.qval()?, i, j);
    let log2fc = slice_pair(&test.log_fold_change(2.0)?, i, j);
    let records = assemble_records(
        test.features(),
        pval.view(),
        qval.view(),
        log2fc.view(),
        test.mean().view(),
    );
    apply_thresholds(records, filter)
}
