//! Affine-invariant ensemble sampler.
//!
//! Walkers are moved with the stretch move of Goodman & Weare (2010): a
//! walker at `x` proposes `y = c + z (x - c)` where `c` is the position of a
//! walker of the complementary half of the ensemble and `z` is drawn from
//! `g(z) ∝ 1/√z` on `[1/a, a]`. The proposal is accepted with probability
//! `min(1, z^(d-1) p(y) / p(x))`.
//!
//! The ensemble is split in two halves that are updated one after the
//! other, so that the proposals of one half only depend on the other half
//! and can be evaluated in parallel.

use std::ops::Range;

use itertools::izip;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use thiserror::Error;

use crate::{
    chain::Chain,
    posterior::{LogDensity, LogpError},
};

#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("Invalid sampler settings: {0}")]
    InvalidSettings(String),
    #[error("Expected walker positions of shape {expected:?}, got {found:?}")]
    DimensionMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("The ensemble has not been initialized")]
    Uninitialized,
    #[error("Logp function returned unrecoverable error")]
    LogpFailure(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// The stretch move proposal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StretchMove {
    a: f64,
}

impl Default for StretchMove {
    fn default() -> Self {
        StretchMove { a: 2. }
    }
}

impl StretchMove {
    /// A stretch move with scale `a`, which must be larger than one.
    pub fn new(a: f64) -> Result<Self, SamplerError> {
        if !(a > 1.) {
            return Err(SamplerError::InvalidSettings(format!(
                "Stretch scale must be larger than 1, got {a}"
            )));
        }
        Ok(StretchMove { a })
    }

    pub fn scale(&self) -> f64 {
        self.a
    }

    /// Draw `z` from `g(z) ∝ 1/√z` on `[1/a, a]` by inverting its CDF.
    pub fn sample_z<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let u: f64 = rng.random();
        let val = (self.a - 1.) * u + 1.;
        val * val / self.a
    }

    /// Log of the acceptance ratio of a proposal made with stretch factor
    /// `z` in `ndim` dimensions.
    pub fn log_acceptance(&self, z: f64, ndim: usize, log_prob_old: f64, log_prob_new: f64) -> f64 {
        (ndim as f64 - 1.) * z.ln() + log_prob_new - log_prob_old
    }
}

/// Settings for the ensemble sampler
#[derive(Debug, Clone, Copy)]
pub struct EnsembleOptions {
    /// Number of walkers. Must be even and at least twice the dimension.
    pub n_walkers: usize,
    /// Scale `a` of the stretch move.
    pub stretch_scale: f64,
    /// Evaluate the proposals of a half-ensemble on the rayon thread pool.
    pub parallel: bool,
    pub seed: u64,
}

impl Default for EnsembleOptions {
    fn default() -> Self {
        EnsembleOptions {
            n_walkers: 100,
            stretch_scale: 2.,
            parallel: true,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct Walkers {
    positions: Array2<f64>,
    log_probs: Array1<f64>,
}

pub struct EnsembleSampler<F: LogDensity> {
    logp: F,
    options: EnsembleOptions,
    stretch: StretchMove,
    rng: ChaCha8Rng,
    walkers: Option<Walkers>,
    accepted: Vec<u64>,
    proposed: Vec<u64>,
    chain: Chain,
}

impl<F: LogDensity> EnsembleSampler<F> {
    pub fn new(logp: F, options: EnsembleOptions) -> Result<Self, SamplerError> {
        let ndim = logp.dim();
        let n_walkers = options.n_walkers;
        if ndim == 0 {
            return Err(SamplerError::InvalidSettings(
                "The log density has no parameters".to_string(),
            ));
        }
        if n_walkers % 2 != 0 {
            return Err(SamplerError::InvalidSettings(format!(
                "Number of walkers must be even, got {n_walkers}"
            )));
        }
        if n_walkers < 2 * ndim {
            return Err(SamplerError::InvalidSettings(format!(
                "Need at least {} walkers for {ndim} parameters, got {n_walkers}",
                2 * ndim
            )));
        }
        let stretch = StretchMove::new(options.stretch_scale)?;
        Ok(EnsembleSampler {
            logp,
            options,
            stretch,
            rng: ChaCha8Rng::seed_from_u64(options.seed),
            walkers: None,
            accepted: vec![0; n_walkers],
            proposed: vec![0; n_walkers],
            chain: Chain::new(n_walkers, ndim),
        })
    }

    pub fn dim(&self) -> usize {
        self.logp.dim()
    }

    pub fn n_walkers(&self) -> usize {
        self.options.n_walkers
    }

    pub fn options(&self) -> &EnsembleOptions {
        &self.options
    }

    pub fn logp_func(&self) -> &F {
        &self.logp
    }

    /// Place the walkers at `positions` (`n_walkers × ndim`).
    ///
    /// This clears the chain and the acceptance statistics. Fails if the
    /// shape is wrong or the log density returns an unrecoverable error.
    pub fn initialize(&mut self, positions: Array2<f64>) -> Result<(), SamplerError> {
        let expected = (self.n_walkers(), self.dim());
        if positions.dim() != expected {
            return Err(SamplerError::DimensionMismatch {
                expected,
                found: positions.dim(),
            });
        }
        let seeds: Vec<u64> = (0..self.n_walkers()).map(|_| self.rng.random()).collect();
        let rows: Vec<Vec<f64>> = positions.outer_iter().map(|row| row.to_vec()).collect();
        let log_probs = Array1::from(self.evaluate(&rows, &seeds)?);

        let outside = log_probs.iter().filter(|val| !val.is_finite()).count();
        if outside > 0 {
            tracing::warn!(
                walkers = outside,
                "Walkers start at positions with zero posterior density"
            );
        }

        self.walkers = Some(Walkers {
            positions,
            log_probs,
        });
        self.reset();
        Ok(())
    }

    /// Draw the starting positions from [`LogDensity::init_position`].
    pub fn initialize_from_model(&mut self) -> Result<(), SamplerError> {
        let mut positions = Array2::zeros((self.n_walkers(), self.dim()));
        let mut buffer = vec![0f64; self.dim()];
        for mut row in positions.outer_iter_mut() {
            self.logp.init_position(&mut self.rng, &mut buffer);
            row.assign(&ArrayView1::from(&buffer));
        }
        self.initialize(positions)
    }

    /// Forget the stored chain and the acceptance statistics. The walkers
    /// keep their positions.
    pub fn reset(&mut self) {
        self.chain.clear();
        self.accepted.iter_mut().for_each(|val| *val = 0);
        self.proposed.iter_mut().for_each(|val| *val = 0);
    }

    /// Advance the ensemble by `steps` steps, storing every step in the
    /// chain.
    ///
    /// If the log density fails with an unrecoverable error, sampling stops
    /// and the ensemble stays at the last completed step.
    pub fn run(&mut self, steps: usize) -> Result<(), SamplerError> {
        if self.walkers.is_none() {
            return Err(SamplerError::Uninitialized);
        }
        for _ in 0..steps {
            self.step()?;
        }
        let fractions = self.acceptance_fraction();
        let mean = fractions.mean().unwrap_or(0.);
        tracing::debug!(steps, mean_acceptance = mean, "Finished ensemble run");
        if steps > 0 && (mean == 0. || mean == 1.) {
            tracing::warn!(
                mean_acceptance = mean,
                "Degenerate acceptance fraction, the proposals are never or always accepted"
            );
        }
        Ok(())
    }

    fn step(&mut self) -> Result<(), SamplerError> {
        let mut next = self.walkers.clone().ok_or(SamplerError::Uninitialized)?;
        let n_walkers = self.n_walkers();
        let half = n_walkers / 2;
        let mut accepted = vec![false; n_walkers];

        self.update_half(&mut next, 0..half, half..n_walkers, &mut accepted)?;
        self.update_half(&mut next, half..n_walkers, 0..half, &mut accepted)?;

        izip!(&accepted, &mut self.accepted, &mut self.proposed).for_each(
            |(&accepted, count, proposed)| {
                *proposed += 1;
                if accepted {
                    *count += 1;
                }
            },
        );
        self.chain.push(next.positions.view(), next.log_probs.view());
        self.walkers = Some(next);
        Ok(())
    }

    fn update_half(
        &mut self,
        walkers: &mut Walkers,
        active: Range<usize>,
        complement: Range<usize>,
        accepted: &mut [bool],
    ) -> Result<(), SamplerError> {
        let ndim = self.dim();
        let mut proposals = Vec::with_capacity(active.len());
        let mut stretches = Vec::with_capacity(active.len());
        let mut seeds = Vec::with_capacity(active.len());

        for walker in active.clone() {
            let z = self.stretch.sample_z(&mut self.rng);
            let partner = complement.start + self.rng.random_range(0..complement.len());
            let proposal: Vec<f64> = izip!(
                walkers.positions.row(walker),
                walkers.positions.row(partner)
            )
            .map(|(x, c)| c + z * (x - c))
            .collect();
            proposals.push(proposal);
            stretches.push(z);
            seeds.push(self.rng.random::<u64>());
        }

        let new_log_probs = self.evaluate(&proposals, &seeds)?;

        for (walker, proposal, &z, &log_prob_new) in
            izip!(active, &proposals, &stretches, &new_log_probs)
        {
            let log_prob_old = walkers.log_probs[walker];
            let log_accept = self
                .stretch
                .log_acceptance(z, ndim, log_prob_old, log_prob_new);
            let u: f64 = self.rng.random();
            if log_prob_new.is_finite() && u.ln() < log_accept {
                walkers
                    .positions
                    .row_mut(walker)
                    .assign(&ArrayView1::from(proposal));
                walkers.log_probs[walker] = log_prob_new;
                accepted[walker] = true;
            }
        }
        Ok(())
    }

    /// Evaluate the log density at each position, each with its own
    /// generator seeded from `seeds`.
    ///
    /// The result does not depend on whether the evaluation runs in parallel.
    fn evaluate(&self, positions: &[Vec<f64>], seeds: &[u64]) -> Result<Vec<f64>, SamplerError> {
        let logp = &self.logp;
        let eval = |position: &Vec<f64>, seed: u64| -> Result<f64, SamplerError> {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            match logp.logp(position, &mut rng) {
                Ok(val) => Ok(val),
                Err(err) if err.is_recoverable() => Ok(f64::NEG_INFINITY),
                Err(err) => Err(SamplerError::LogpFailure(Box::new(err))),
            }
        };
        if self.options.parallel {
            positions
                .par_iter()
                .zip(seeds.par_iter())
                .map(|(position, &seed)| eval(position, seed))
                .collect()
        } else {
            positions
                .iter()
                .zip(seeds)
                .map(|(position, &seed)| eval(position, seed))
                .collect()
        }
    }

    /// Current positions of the walkers, if initialized.
    pub fn positions(&self) -> Option<ArrayView2<'_, f64>> {
        self.walkers.as_ref().map(|walkers| walkers.positions.view())
    }

    /// Current log posterior values of the walkers, if initialized.
    pub fn log_probs(&self) -> Option<ArrayView1<'_, f64>> {
        self.walkers.as_ref().map(|walkers| walkers.log_probs.view())
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Fraction of accepted proposals of each walker since the last reset.
    pub fn acceptance_fraction(&self) -> Array1<f64> {
        izip!(&self.accepted, &self.proposed)
            .map(|(&accepted, &proposed)| {
                if proposed == 0 {
                    0.
                } else {
                    accepted as f64 / proposed as f64
                }
            })
            .collect()
    }
}
