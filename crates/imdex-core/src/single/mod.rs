//! Single-test results: one p-value and one fold-change per feature.

mod grouped;
mod lrt;
mod wald;

pub use grouped::{RankTest, TTest, ZeroVariancePolicy};
pub use lrt::LrtTest;
pub use wald::WaldTest;

use ndarray::{Array1, ArrayView2};

/// Per feature, the tested coefficient with the largest magnitude.
///
/// A single row passes through unchanged; several rows collapse to the
/// dominant one, keeping its sign. All-NaN columns stay NaN.
pub(crate) fn dominant_coefficient(rows: ArrayView2<f64>) -> Array1<f64> {
    Array1::from_iter(rows.columns().into_iter().map(|col| {
        let mut best = f64::NAN;
        let mut magnitude = f64::NEG_INFINITY;
        for &v in col.iter() {
            if v.abs() > magnitude {
                magnitude = v.abs();
                best = v;
            }
        }
        best
    }))
}
