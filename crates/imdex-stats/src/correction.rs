//! Multiple testing correction
//!
//! Adjusts a family of p-values for the number of hypotheses tested. NaN
//! entries mark untestable features: they are excluded from the family
//! size and preserved as NaN in the output.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Supported p-value adjustment methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CorrectionMethod {
    /// Benjamini-Hochberg false discovery rate control.
    #[default]
    BenjaminiHochberg,
    /// Benjamini-Yekutieli FDR control under arbitrary dependence.
    BenjaminiYekutieli,
    /// Bonferroni family-wise error rate control.
    Bonferroni,
    /// Holm step-down family-wise error rate control.
    Holm,
}

/// Error returned when parsing an unknown correction method name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized correction method: {0}")]
pub struct UnknownMethodError(pub String);

impl FromStr for CorrectionMethod {
    type Err = UnknownMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fdr_bh" | "bh" | "benjamini-hochberg" => Ok(Self::BenjaminiHochberg),
            "fdr_by" | "by" | "benjamini-yekutieli" => Ok(Self::BenjaminiYekutieli),
            "bonferroni" => Ok(Self::Bonferroni),
            "holm" => Ok(Self::Holm),
            _ => Err(UnknownMethodError(s.to_string())),
        }
    }
}

/// Adjust `pvals` for multiple testing.
///
/// NaN entries are excluded from the family size and returned as NaN.
/// All-NaN input is returned unchanged without invoking the correction
/// routine.
pub fn correct(pvals: &[f64], method: CorrectionMethod) -> Vec<f64> {
    let tested: Vec<usize> = (0..pvals.len()).filter(|&i| !pvals[i].is_nan()).collect();
    let m = tested.len();
    if m == 0 {
        return pvals.to_vec();
    }

    let mut qvals = vec![f64::NAN; pvals.len()];

    match method {
        CorrectionMethod::Bonferroni => {
            for &i in &tested {
                qvals[i] = (pvals[i] * m as f64).min(1.0);
            }
        }
        CorrectionMethod::Holm => {
            let order = sorted_by_pval(&tested, pvals);
            let mut running_max = 0.0f64;
            for (rank, &i) in order.iter().enumerate() {
                let adjusted = (pvals[i] * (m - rank) as f64).min(1.0);
                running_max = running_max.max(adjusted);
                qvals[i] = running_max;
            }
        }
        CorrectionMethod::BenjaminiHochberg => {
            step_up(&mut qvals, &sorted_by_pval(&tested, pvals), pvals, 1.0);
        }
        CorrectionMethod::BenjaminiYekutieli => {
            let harmonic: f64 = (1..=m).map(|i| 1.0 / i as f64).sum();
            step_up(&mut qvals, &sorted_by_pval(&tested, pvals), pvals, harmonic);
        }
    }

    qvals
}

fn sorted_by_pval(tested: &[usize], pvals: &[f64]) -> Vec<usize> {
    let mut order = tested.to_vec();
    order.sort_by(|&a, &b| pvals[a].partial_cmp(&pvals[b]).unwrap());
    order
}

/// Step-up adjustment shared by the Benjamini family: walk the sorted
/// p-values from the largest down, keeping a running minimum of
/// `p * m * scale / rank`.
fn step_up(qvals: &mut [f64], order: &[usize], pvals: &[f64], scale: f64) {
    let m = order.len() as f64;
    let mut running_min = 1.0f64;
    for (rank, &i) in order.iter().enumerate().rev() {
        let adjusted = (pvals[i] * m * scale / (rank + 1) as f64).min(1.0);
        running_min = running_min.min(adjusted);
        qvals[i] = running_min;
    }
}
