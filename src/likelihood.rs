//! Gaussian likelihood of the observed velocities.
//!
//! Each object contributes `shiftᵀ C⁻¹ shift + ln det C` where `shift` is the
//! difference between the observed velocity and the population mean velocity
//! and `C` is the sum of measurement and intrinsic covariance. The factor
//! `-1/2` and the `ln 2π` normalisation are dropped, they do not change the
//! shape of the posterior.

use faer::Mat;
use rand::Rng;
use thiserror::Error;

use crate::{
    dispersion::DispersionModel,
    math::{mahalanobis_logdet, ordered_sum, NCOMP},
    observations::{ObservationSet, RealizationSet},
    posterior::LogpError,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LikelihoodError {
    #[error("Total covariance of object {object} is not positive definite")]
    NonPositiveDefiniteCovariance { object: usize },
}

impl LogpError for LikelihoodError {
    fn is_recoverable(&self) -> bool {
        false
    }
}

/// Which likelihood is evaluated during sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LikelihoodMode {
    /// Mean velocities with their measurement covariances.
    #[default]
    Exact,
    /// One randomly chosen Monte Carlo realization per evaluation.
    ///
    /// This is a cheaper approximation: the realization carries no
    /// measurement covariance, and the same intrinsic covariance
    /// `diag(σ²)` is applied to every object regardless of its distance.
    Resample,
}

fn object_terms(
    object: usize,
    observed: [f64; NCOMP],
    mean: &[f64],
    cov: Mat<f64>,
) -> Result<f64, LikelihoodError> {
    let shift = [
        observed[0] - mean[0],
        observed[1] - mean[1],
        observed[2] - mean[2],
    ];
    let (mahalanobis, logdet) = mahalanobis_logdet(&cov, &shift)
        .ok_or(LikelihoodError::NonPositiveDefiniteCovariance { object })?;
    Ok(mahalanobis + logdet)
}

/// Log likelihood of `observations` given the parameters `theta`.
///
/// The intrinsic covariance of every object is evaluated at its own
/// distance. Fails if the total covariance of any object is not
/// positive definite. The result does not depend on the order of the
/// objects, not even in the last bit.
///
/// # Panics
///
/// If `theta` does not have `model.ndim()` entries.
pub fn loglikelihood(
    model: DispersionModel,
    theta: &[f64],
    observations: &ObservationSet,
) -> Result<f64, LikelihoodError> {
    assert!(theta.len() == model.ndim());
    let mean = model.mean_velocity(theta);
    let mut terms = Vec::with_capacity(observations.len());
    for i in 0..observations.len() {
        let intrinsic = model.intrinsic_variances(theta, observations.distance(i));
        let measured = observations.covariance(i);
        let cov = Mat::from_fn(NCOMP, NCOMP, |a, b| {
            let diag = if a == b { intrinsic[a] } else { 0. };
            measured[[a, b]] + diag
        });
        terms.push(object_terms(i, observations.velocity(i), mean, cov)?);
    }
    Ok(-ordered_sum(&mut terms))
}

/// Log likelihood of one Monte Carlo realization, chosen uniformly at random
/// with `rng`, given fixed-dispersion parameters `theta`.
///
/// The intrinsic covariance `diag(σ²)` is shared by all objects and the
/// realization carries no measurement covariance.
///
/// # Panics
///
/// If `theta` does not have the six entries of the fixed model.
pub fn loglikelihood_sample<R: Rng + ?Sized>(
    theta: &[f64],
    realizations: &RealizationSet,
    rng: &mut R,
) -> Result<f64, LikelihoodError> {
    let model = DispersionModel::Fixed;
    assert!(theta.len() == model.ndim());
    let index = rng.random_range(0..realizations.num_realizations());
    realization_loglikelihood(theta, realizations, index)
}

/// Log likelihood of realization `index`, see [`loglikelihood_sample`].
///
/// # Panics
///
/// If `theta` does not have the six entries of the fixed model or `index`
/// is not smaller than the number of realizations.
pub fn realization_loglikelihood(
    theta: &[f64],
    realizations: &RealizationSet,
    index: usize,
) -> Result<f64, LikelihoodError> {
    let model = DispersionModel::Fixed;
    assert!(theta.len() == model.ndim());
    let mean = model.mean_velocity(theta);
    let intrinsic = model.intrinsic_variances(theta, None);
    let sample = realizations.realization(index);
    let mut terms = Vec::with_capacity(sample.nrows());
    for (i, row) in sample.outer_iter().enumerate() {
        let cov = Mat::from_fn(NCOMP, NCOMP, |a, b| if a == b { intrinsic[a] } else { 0. });
        terms.push(object_terms(i, [row[0], row[1], row[2]], mean, cov)?);
    }
    Ok(-ordered_sum(&mut terms))
}
