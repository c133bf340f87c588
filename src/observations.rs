//! Measured satellite kinematics.
//!
//! An [`ObservationSet`] holds one mean velocity, one measurement covariance
//! and optionally one galactocentric distance per object. A
//! [`RealizationSet`] holds the Monte Carlo realizations the observation set
//! is usually summarised from.

use ndarray::{Array1, Array2, Array3, ArrayView2, Axis};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use thiserror::Error;

use crate::{dispersion::DispersionModel, math::{mean_and_covariance, NCOMP}};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("Observation set contains no objects")]
    Empty,
    #[error("Array `{name}` has shape {found:?}, expected {expected:?}")]
    Shape {
        name: &'static str,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("Array `{name}` contains non-finite values")]
    NonFinite { name: &'static str },
    #[error("The {model} model requires galactocentric distances")]
    MissingDistances { model: DispersionModel },
    #[error("The resampling likelihood only supports the fixed-dispersion model")]
    UnsupportedResampleModel,
    #[error("Realization set contains no realizations")]
    NoRealizations,
}

/// Velocities, measurement covariances and distances of `N` objects.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationSet {
    velocities: Array2<f64>,
    covariances: Array3<f64>,
    distances: Option<Array1<f64>>,
}

fn check_shape(name: &'static str, expected: &[usize], found: &[usize]) -> Result<(), DataError> {
    if expected != found {
        return Err(DataError::Shape {
            name,
            expected: expected.to_vec(),
            found: found.to_vec(),
        });
    }
    Ok(())
}

impl ObservationSet {
    /// Create an observation set from an `N×3` velocity array, an `N×3×3`
    /// covariance array and an optional length `N` distance array.
    pub fn new(
        velocities: Array2<f64>,
        covariances: Array3<f64>,
        distances: Option<Array1<f64>>,
    ) -> Result<Self, DataError> {
        let n = velocities.nrows();
        if n == 0 {
            return Err(DataError::Empty);
        }
        check_shape("velocities", &[n, NCOMP], velocities.shape())?;
        check_shape("covariances", &[n, NCOMP, NCOMP], covariances.shape())?;
        if let Some(distances) = &distances {
            check_shape("distances", &[n], distances.shape())?;
            if !distances.iter().all(|d| d.is_finite()) {
                return Err(DataError::NonFinite { name: "distances" });
            }
        }
        if !velocities.iter().all(|v| v.is_finite()) {
            return Err(DataError::NonFinite { name: "velocities" });
        }
        if !covariances.iter().all(|v| v.is_finite()) {
            return Err(DataError::NonFinite {
                name: "covariances",
            });
        }
        Ok(ObservationSet {
            velocities,
            covariances,
            distances,
        })
    }

    /// Summarise Monte Carlo realizations by their sample mean and unbiased
    /// sample covariance per object.
    pub fn from_realizations(
        realizations: &RealizationSet,
        distances: Option<Array1<f64>>,
    ) -> Result<Self, DataError> {
        let n = realizations.len();
        let mut velocities = Array2::zeros((n, NCOMP));
        let mut covariances = Array3::zeros((n, NCOMP, NCOMP));
        for (i, draws) in realizations.samples.outer_iter().enumerate() {
            let (mean, cov) = mean_and_covariance(draws);
            for a in 0..NCOMP {
                velocities[[i, a]] = mean[a];
                for b in 0..NCOMP {
                    covariances[[i, a, b]] = cov[a][b];
                }
            }
        }
        ObservationSet::new(velocities, covariances, distances)
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.velocities.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn velocities(&self) -> &Array2<f64> {
        &self.velocities
    }

    pub fn covariances(&self) -> &Array3<f64> {
        &self.covariances
    }

    pub fn distances(&self) -> Option<&Array1<f64>> {
        self.distances.as_ref()
    }

    /// Velocity of object `i`.
    pub fn velocity(&self, i: usize) -> [f64; NCOMP] {
        let row = self.velocities.row(i);
        [row[0], row[1], row[2]]
    }

    /// Measurement covariance of object `i`.
    pub fn covariance(&self, i: usize) -> ArrayView2<'_, f64> {
        self.covariances.index_axis(Axis(0), i)
    }

    pub fn distance(&self, i: usize) -> Option<f64> {
        self.distances.as_ref().map(|d| d[i])
    }

    /// A copy of the observation set with objects in the order given by
    /// `order`.
    pub fn select(&self, order: &[usize]) -> Result<Self, DataError> {
        ObservationSet::new(
            self.velocities.select(Axis(0), order),
            self.covariances.select(Axis(0), order),
            self.distances.as_ref().map(|d| d.select(Axis(0), order)),
        )
    }

    /// Check that the observations carry everything `model` needs.
    pub fn check_model(&self, model: DispersionModel) -> Result<(), DataError> {
        if model.requires_distances() && self.distances.is_none() {
            return Err(DataError::MissingDistances { model });
        }
        Ok(())
    }
}

/// `M` Monte Carlo realizations of the velocity of `N` objects, stored as an
/// `N×3×M` array.
#[derive(Debug, Clone, PartialEq)]
pub struct RealizationSet {
    samples: Array3<f64>,
}

impl RealizationSet {
    pub fn new(samples: Array3<f64>) -> Result<Self, DataError> {
        let (n, ncomp, m) = samples.dim();
        if n == 0 {
            return Err(DataError::Empty);
        }
        check_shape("realizations", &[n, NCOMP, m], &[n, ncomp, m])?;
        if m == 0 {
            return Err(DataError::NoRealizations);
        }
        if !samples.iter().all(|v| v.is_finite()) {
            return Err(DataError::NonFinite {
                name: "realizations",
            });
        }
        Ok(RealizationSet { samples })
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.samples.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of realizations per object.
    pub fn num_realizations(&self) -> usize {
        self.samples.len_of(Axis(2))
    }

    /// The `N×3` velocities of realization `index`.
    pub fn realization(&self, index: usize) -> ArrayView2<'_, f64> {
        self.samples.index_axis(Axis(2), index)
    }

    pub fn samples(&self) -> &Array3<f64> {
        &self.samples
    }
}

/// Simulate observations from known parameters.
///
/// Object `i` gets a true velocity drawn from the intrinsic distribution of
/// `model` at `distances[i]` (or `r = 0` without distances), and a measured
/// velocity perturbed by isotropic Gaussian noise with standard deviation
/// `noise`. The measurement covariance is `noise² I`.
///
/// Fails if `theta` does not match `model` or if `distances` does not have
/// `count` entries.
pub fn simulate_observations<R: Rng + ?Sized>(
    model: DispersionModel,
    theta: &[f64],
    distances: Option<Array1<f64>>,
    count: usize,
    noise: f64,
    rng: &mut R,
) -> Result<ObservationSet, DataError> {
    if theta.len() != model.ndim() {
        return Err(DataError::Shape {
            name: "theta",
            expected: vec![model.ndim()],
            found: vec![theta.len()],
        });
    }
    if let Some(distances) = distances.as_ref() {
        if distances.len() != count {
            return Err(DataError::Shape {
                name: "distances",
                expected: vec![count],
                found: vec![distances.len()],
            });
        }
    }
    let mean = model.mean_velocity(theta);
    let mut velocities = Array2::zeros((count, NCOMP));
    let mut covariances = Array3::zeros((count, NCOMP, NCOMP));
    for i in 0..count {
        let distance = distances.as_ref().map(|d| d[i]);
        let variances = model.intrinsic_variances(theta, distance);
        for a in 0..NCOMP {
            let intrinsic: f64 = StandardNormal.sample(rng);
            let measurement: f64 = StandardNormal.sample(rng);
            velocities[[i, a]] = mean[a] + variances[a].sqrt() * intrinsic + noise * measurement;
            covariances[[i, a, a]] = noise * noise;
        }
    }
    ObservationSet::new(velocities, covariances, distances)
}
