//! Observation grouping
//!
//! An immutable mapping from observations to group labels. Labels are
//! deduplicated and sorted at construction; lookups of unknown labels
//! fail loudly.

use ndarray::{Array2, Axis};

use crate::error::{ImdexError, ImdexResult};

/// Immutable observation-to-group assignment.
#[derive(Debug, Clone)]
pub struct Grouping {
    groups: Vec<String>,
    codes: Vec<usize>,
}

impl Grouping {
    /// Build a grouping from one label per observation.
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Self {
        let mut groups: Vec<String> = labels.iter().map(|l| l.as_ref().to_string()).collect();
        groups.sort();
        groups.dedup();

        let codes = labels
            .iter()
            .map(|l| {
                groups
                    .binary_search_by(|g| g.as_str().cmp(l.as_ref()))
                    .expect("label came from the same slice")
            })
            .collect();

        Self { groups, codes }
    }

    /// The distinct group labels, sorted.
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn n_groups(&self) -> usize {
        self.groups.len()
    }

    /// Number of observations.
    pub fn n_observations(&self) -> usize {
        self.codes.len()
    }

    /// Group code of each observation.
    pub fn codes(&self) -> &[usize] {
        &self.codes
    }

    /// Position of a group label; unknown labels are a usage error.
    pub fn position(&self, label: &str) -> ImdexResult<usize> {
        self.groups
            .binary_search_by(|g| g.as_str().cmp(label))
            .map_err(|_| ImdexError::UnknownGroup {
                label: label.to_string(),
            })
    }

    /// Observation indices belonging to one group.
    pub fn indices_of(&self, group: usize) -> Vec<usize> {
        self.codes
            .iter()
            .enumerate()
            .filter_map(|(i, &c)| (c == group).then_some(i))
            .collect()
    }

    /// Split the rows of an observations-by-features matrix into the two
    /// groups of a binary grouping.
    pub fn split_rows(&self, x: &Array2<f64>) -> ImdexResult<(Array2<f64>, Array2<f64>)> {
        if self.n_groups() != 2 {
            return Err(ImdexError::NotTwoGroups {
                count: self.n_groups(),
            });
        }
        if x.nrows() != self.codes.len() {
            return Err(ImdexError::ShapeMismatch {
                message: format!(
                    "matrix has {} rows but grouping covers {} observations",
                    x.nrows(),
                    self.codes.len()
                ),
            });
        }

        let x0 = x.select(Axis(0), &self.indices_of(0));
        let x1 = x.select(Axis(0), &self.indices_of(1));
        Ok((x0, x1))
    }
}
