use std::path::Path;

use anyhow::{Context, Result};
use ndarray::{Array1, Array2, ArrayView1};

use crate::{
    chain::Chain,
    csv_storage::{save_chain, save_samples},
    dispersion::DispersionModel,
    ensemble::{EnsembleOptions, EnsembleSampler},
    likelihood::LikelihoodMode,
    observations::{DataError, ObservationSet, RealizationSet},
    posterior::{Likelihood, Posterior},
    summary::{summarize, ParamSummary},
};

/// Settings for a dispersion inference run
#[derive(Debug, Clone, Copy)]
pub struct Settings {
    /// Number of walkers. Must be even and at least twice the number of
    /// parameters.
    pub n_walkers: usize,
    /// Number of steps before the chain is reset.
    pub num_burnin: usize,
    /// Number of steps that are kept.
    pub num_draws: usize,
    /// Number of production steps dropped when flattening.
    pub discard: usize,
    /// Scale `a` of the stretch move.
    pub stretch_scale: f64,
    /// Evaluate proposals on the rayon thread pool. Does not change results.
    pub parallel: bool,
    pub dispersion: DispersionModel,
    pub likelihood: LikelihoodMode,
    pub seed: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            n_walkers: 100,
            num_burnin: 500,
            num_draws: 500,
            discard: 0,
            stretch_scale: 2.,
            parallel: true,
            dispersion: DispersionModel::Fixed,
            likelihood: LikelihoodMode::Exact,
            seed: 0,
        }
    }
}

impl Settings {
    fn ensemble_options(&self) -> EnsembleOptions {
        EnsembleOptions {
            n_walkers: self.n_walkers,
            stretch_scale: self.stretch_scale,
            parallel: self.parallel,
            seed: self.seed,
        }
    }
}

/// Observed satellites, and optionally the Monte Carlo realizations their
/// velocities were derived from.
#[derive(Debug, Clone)]
pub struct InferenceData {
    pub observations: ObservationSet,
    pub realizations: Option<RealizationSet>,
}

impl InferenceData {
    pub fn new(observations: ObservationSet) -> Self {
        InferenceData {
            observations,
            realizations: None,
        }
    }

    /// Derive the observations from realizations and keep them around for
    /// the resampling likelihood.
    pub fn from_realizations(
        realizations: RealizationSet,
        distances: Option<Array1<f64>>,
    ) -> Result<Self, DataError> {
        let observations = ObservationSet::from_realizations(&realizations, distances)?;
        Ok(InferenceData {
            observations,
            realizations: Some(realizations),
        })
    }
}

/// The result of a run.
#[derive(Debug, Clone)]
pub struct Trace {
    pub model: DispersionModel,
    /// Names of the sampled parameters, in the order of the chain columns.
    pub param_names: Vec<String>,
    /// Production steps of all walkers.
    pub chain: Chain,
    pub discard: usize,
    pub acceptance_fraction: Array1<f64>,
    pub burnin_acceptance_fraction: Array1<f64>,
    pub last_positions: Array2<f64>,
    pub last_log_probs: Array1<f64>,
}

impl Trace {
    /// Production samples of all walkers after discarding the first
    /// `discard` steps.
    pub fn flat_samples(&self) -> Array2<f64> {
        self.chain.flat_samples(self.discard)
    }

    /// Like [`Trace::flat_samples`], with `log10 σ0` converted to `σ0`.
    pub fn physical_samples(&self) -> Array2<f64> {
        let mut samples = self.flat_samples();
        for mut row in samples.outer_iter_mut() {
            let mut draw = row.to_vec();
            self.model.to_physical(&mut draw);
            row.assign(&ArrayView1::from(&draw));
        }
        samples
    }

    pub fn physical_param_names(&self) -> Vec<String> {
        self.model.physical_param_names()
    }

    /// Percentile summary of the physical parameters.
    pub fn summary(&self) -> Vec<ParamSummary> {
        summarize(self.physical_samples().view(), &self.physical_param_names())
    }

    pub fn mean_acceptance_fraction(&self) -> f64 {
        self.acceptance_fraction.mean().unwrap_or(0.)
    }

    /// Write `chain.csv` with the sampled parameters of every walker and
    /// `samples.csv` with the flattened physical samples to `dir`.
    pub fn write_csv<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        save_chain(dir.join("chain.csv"), &self.chain, &self.param_names)?;
        save_samples(
            dir.join("samples.csv"),
            self.physical_samples().view(),
            &self.physical_param_names(),
        )?;
        Ok(())
    }
}

/// Infer the mean velocity and the velocity dispersion of a satellite
/// population.
///
/// Walkers start from draws of the prior, run `num_burnin` steps, forget
/// them and run `num_draws` more steps.
pub fn sample(settings: &Settings, data: &InferenceData) -> Result<Trace> {
    let likelihood = match settings.likelihood {
        LikelihoodMode::Exact => Likelihood::Exact(&data.observations),
        LikelihoodMode::Resample => Likelihood::Resample(
            data.realizations
                .as_ref()
                .ok_or(DataError::NoRealizations)?,
        ),
    };
    let posterior = Posterior::new(settings.dispersion, likelihood)
        .with_context(|| format!("Data can not be used with the {} model", settings.dispersion))?;

    let mut sampler = EnsembleSampler::new(posterior, settings.ensemble_options())
        .context("Invalid sampler settings")?;

    tracing::info!(
        model = %settings.dispersion,
        likelihood = ?settings.likelihood,
        objects = likelihood.num_objects(),
        walkers = settings.n_walkers,
        ndim = settings.dispersion.ndim(),
        burnin = settings.num_burnin,
        draws = settings.num_draws,
        "Starting dispersion inference"
    );

    sampler
        .initialize_from_model()
        .context("Could not initialize walkers")?;

    sampler
        .run(settings.num_burnin)
        .context("Sampling failed during burn-in")?;
    let burnin_acceptance_fraction = sampler.acceptance_fraction();
    tracing::info!(
        mean_acceptance = burnin_acceptance_fraction.mean().unwrap_or(0.),
        "Finished burn-in"
    );
    sampler.reset();

    sampler
        .run(settings.num_draws)
        .context("Sampling failed during production")?;
    let acceptance_fraction = sampler.acceptance_fraction();
    tracing::info!(
        mean_acceptance = acceptance_fraction.mean().unwrap_or(0.),
        "Finished sampling"
    );

    let (last_positions, last_log_probs) = match (sampler.positions(), sampler.log_probs()) {
        (Some(positions), Some(log_probs)) => (positions.to_owned(), log_probs.to_owned()),
        _ => anyhow::bail!("Sampler lost its walkers"),
    };

    Ok(Trace {
        model: settings.dispersion,
        param_names: settings.dispersion.param_names(),
        chain: sampler.chain().clone(),
        discard: settings.discard,
        acceptance_fraction,
        burnin_acceptance_fraction,
        last_positions,
        last_log_probs,
    })
}
