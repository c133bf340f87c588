use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2};

use crate::observations::DataError;

/// Positions and log posterior values of every walker at every stored step.
#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    n_walkers: usize,
    ndim: usize,
    // step-major: [step][walker][dim]
    positions: Vec<f64>,
    // [step][walker]
    log_probs: Vec<f64>,
}

impl Chain {
    pub fn new(n_walkers: usize, ndim: usize) -> Self {
        Chain {
            n_walkers,
            ndim,
            positions: Vec::new(),
            log_probs: Vec::new(),
        }
    }

    /// Rebuild a chain from a `W×T×ndim` position array and a `W×T` array of
    /// log posterior values.
    pub fn from_arrays(positions: &Array3<f64>, log_probs: &Array2<f64>) -> Result<Self, DataError> {
        let (n_walkers, steps, ndim) = positions.dim();
        if log_probs.dim() != (n_walkers, steps) {
            return Err(DataError::Shape {
                name: "log_probs",
                expected: vec![n_walkers, steps],
                found: log_probs.shape().to_vec(),
            });
        }
        let mut chain = Chain::new(n_walkers, ndim);
        for step in 0..steps {
            for walker in 0..n_walkers {
                chain
                    .positions
                    .extend(positions.slice(ndarray::s![walker, step, ..]).iter());
                chain.log_probs.push(log_probs[[walker, step]]);
            }
        }
        Ok(chain)
    }

    /// Append the ensemble at one step.
    pub fn push(&mut self, positions: ArrayView2<f64>, log_probs: ArrayView1<f64>) {
        assert!(positions.dim() == (self.n_walkers, self.ndim));
        assert!(log_probs.len() == self.n_walkers);
        self.positions.extend(positions.iter());
        self.log_probs.extend(log_probs.iter());
    }

    /// Number of stored steps.
    pub fn len(&self) -> usize {
        self.log_probs.len().checked_div(self.n_walkers).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.log_probs.is_empty()
    }

    pub fn n_walkers(&self) -> usize {
        self.n_walkers
    }

    pub fn ndim(&self) -> usize {
        self.ndim
    }

    pub(crate) fn clear(&mut self) {
        self.positions.clear();
        self.log_probs.clear();
    }

    #[inline]
    fn value(&self, walker: usize, step: usize, dim: usize) -> f64 {
        self.positions[(step * self.n_walkers + walker) * self.ndim + dim]
    }

    /// All positions as a `W×T×ndim` array.
    pub fn positions(&self) -> Array3<f64> {
        Array3::from_shape_fn((self.n_walkers, self.len(), self.ndim), |(w, t, d)| {
            self.value(w, t, d)
        })
    }

    /// All log posterior values as a `W×T` array.
    pub fn log_probs(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.n_walkers, self.len()), |(w, t)| {
            self.log_probs[t * self.n_walkers + w]
        })
    }

    /// Samples of all walkers without the first `discard` steps, walker by
    /// walker, as a `((T - discard)·W)×ndim` array.
    pub fn flat_samples(&self, discard: usize) -> Array2<f64> {
        let keep = self.len().saturating_sub(discard);
        Array2::from_shape_fn((keep * self.n_walkers, self.ndim), |(row, d)| {
            self.value(row / keep, discard + row % keep, d)
        })
    }

    /// Log posterior values matching the rows of [`Chain::flat_samples`].
    pub fn flat_log_probs(&self, discard: usize) -> Array1<f64> {
        let keep = self.len().saturating_sub(discard);
        Array1::from_shape_fn(keep * self.n_walkers, |row| {
            let (walker, step) = (row / keep, discard + row % keep);
            self.log_probs[step * self.n_walkers + walker]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use pretty_assertions::assert_eq;

    fn two_steps() -> Chain {
        let mut chain = Chain::new(2, 3);
        chain.push(
            array![[0., 1., 2.], [10., 11., 12.]].view(),
            array![-1., -2.].view(),
        );
        chain.push(
            array![[3., 4., 5.], [13., 14., 15.]].view(),
            array![-3., -4.].view(),
        );
        chain
    }

    #[test]
    fn shapes() {
        let chain = two_steps();
        assert_eq!(chain.len(), 2);
        assert!(!chain.is_empty());
        let positions = chain.positions();
        assert_eq!(positions.dim(), (2, 2, 3));
        assert_eq!(positions[[1, 0, 2]], 12.);
        assert_eq!(positions[[0, 1, 0]], 3.);
        assert_eq!(chain.log_probs(), array![[-1., -3.], [-2., -4.]]);
    }

    #[test]
    fn flatten() {
        let chain = two_steps();
        assert_eq!(
            chain.flat_samples(0),
            array![[0., 1., 2.], [3., 4., 5.], [10., 11., 12.], [13., 14., 15.]]
        );
        assert_eq!(chain.flat_samples(1), array![[3., 4., 5.], [13., 14., 15.]]);
        assert_eq!(chain.flat_samples(5).dim(), (0, 3));
        assert_eq!(chain.flat_log_probs(1), array![-3., -4.]);
    }

    #[test]
    fn rebuild() {
        let chain = two_steps();
        let rebuilt = Chain::from_arrays(&chain.positions(), &chain.log_probs()).unwrap();
        assert_eq!(rebuilt, chain);
        assert!(Chain::from_arrays(&chain.positions(), &Array2::zeros((2, 3))).is_err());
    }

    #[test]
    fn empty() {
        let mut chain = two_steps();
        chain.clear();
        assert!(chain.is_empty());
        assert_eq!(chain.len(), 0);
        assert_eq!(chain.flat_samples(0).dim(), (0, 3));
        assert_eq!(Chain::new(0, 3).len(), 0);
    }
}
