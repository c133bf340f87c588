use std::fmt::Debug;

use rand::Rng;

use crate::{
    dispersion::DispersionModel,
    likelihood::{loglikelihood, loglikelihood_sample, LikelihoodError, LikelihoodMode},
    observations::{DataError, ObservationSet, RealizationSet},
    prior::{fill_prior_draw, logprior},
};

/// Errors that happen when we evaluate the log density
pub trait LogpError: std::error::Error {
    /// Unrecoverable errors during logp computation stop sampling,
    /// recoverable errors reject the proposal.
    fn is_recoverable(&self) -> bool;
}

/// An unnormalized log density the ensemble sampler can explore.
///
/// Evaluations take `&self` so that the proposals of one half of the
/// ensemble can be evaluated in parallel. Densities that are themselves
/// random draw from the generator they are handed.
pub trait LogDensity: Sync {
    type LogpError: Debug + Send + Sync + LogpError + 'static;

    /// Dimension of the parameter space.
    fn dim(&self) -> usize;

    /// Log density at `position`. Negative infinity marks positions outside
    /// the support.
    fn logp<R: Rng + ?Sized>(&self, position: &[f64], rng: &mut R) -> Result<f64, Self::LogpError>;

    /// Draw a starting position for a walker.
    fn init_position<R: Rng + ?Sized>(&self, rng: &mut R, position: &mut [f64]);
}

/// The data a likelihood is evaluated on, together with the mode it selects.
#[derive(Debug, Clone, Copy)]
pub enum Likelihood<'a> {
    Exact(&'a ObservationSet),
    Resample(&'a RealizationSet),
}

impl Likelihood<'_> {
    pub fn mode(&self) -> LikelihoodMode {
        match self {
            Likelihood::Exact(_) => LikelihoodMode::Exact,
            Likelihood::Resample(_) => LikelihoodMode::Resample,
        }
    }

    pub fn num_objects(&self) -> usize {
        match self {
            Likelihood::Exact(obs) => obs.len(),
            Likelihood::Resample(realizations) => realizations.len(),
        }
    }
}

/// Flat prior times Gaussian likelihood.
#[derive(Debug, Clone, Copy)]
pub struct Posterior<'a> {
    model: DispersionModel,
    likelihood: Likelihood<'a>,
}

impl<'a> Posterior<'a> {
    /// Combine a dispersion model with data.
    ///
    /// Fails if the data cannot be used with the model: the variable
    /// dispersion model needs distances, the resampling likelihood only
    /// supports the fixed model.
    pub fn new(model: DispersionModel, likelihood: Likelihood<'a>) -> Result<Self, DataError> {
        match likelihood {
            Likelihood::Exact(obs) => obs.check_model(model)?,
            Likelihood::Resample(_) => {
                if model != DispersionModel::Fixed {
                    return Err(DataError::UnsupportedResampleModel);
                }
            }
        }
        Ok(Posterior { model, likelihood })
    }

    pub fn model(&self) -> DispersionModel {
        self.model
    }

    pub fn likelihood(&self) -> Likelihood<'a> {
        self.likelihood
    }

    /// Log posterior up to a constant.
    ///
    /// Positions rejected by the prior return negative infinity without
    /// evaluating the likelihood.
    pub fn logposterior<R: Rng + ?Sized>(
        &self,
        theta: &[f64],
        rng: &mut R,
    ) -> Result<f64, LikelihoodError> {
        let lp = logprior(self.model, theta);
        if !lp.is_finite() {
            return Ok(f64::NEG_INFINITY);
        }
        let logl = match self.likelihood {
            Likelihood::Exact(obs) => loglikelihood(self.model, theta, obs)?,
            Likelihood::Resample(realizations) => loglikelihood_sample(theta, realizations, rng)?,
        };
        Ok(lp + logl)
    }
}

impl LogDensity for Posterior<'_> {
    type LogpError = LikelihoodError;

    fn dim(&self) -> usize {
        self.model.ndim()
    }

    fn logp<R: Rng + ?Sized>(&self, position: &[f64], rng: &mut R) -> Result<f64, Self::LogpError> {
        self.logposterior(position, rng)
    }

    fn init_position<R: Rng + ?Sized>(&self, rng: &mut R, position: &mut [f64]) {
        fill_prior_draw(self.model, rng, position);
    }
}
