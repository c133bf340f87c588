//! Bayesian inference of the three-dimensional velocity dispersion of a
//! satellite population with an affine-invariant ensemble sampler.
//!
//! ```no_run
//! use satkin::{sample, simulate_observations, DispersionModel, InferenceData, Settings};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mut rng = StdRng::seed_from_u64(0);
//! let theta = [0., 0., 0., 100., 100., 100.];
//! let observations =
//!     simulate_observations(DispersionModel::Fixed, &theta, None, 40, 10., &mut rng).unwrap();
//! let settings = Settings {
//!     seed: 42,
//!     ..Default::default()
//! };
//! let trace = sample(&settings, &InferenceData::new(observations)).unwrap();
//! for param in trace.summary() {
//!     println!("{}", param);
//! }
//! ```

pub(crate) mod chain;
pub(crate) mod csv_storage;
pub(crate) mod dispersion;
pub(crate) mod ensemble;
pub(crate) mod likelihood;
pub(crate) mod math;
pub(crate) mod observations;
pub(crate) mod posterior;
pub(crate) mod prior;
pub(crate) mod sampler;
pub(crate) mod summary;
pub mod subhalos;

pub use chain::Chain;
pub use csv_storage::{load_chain, load_samples, save_chain, save_samples};
pub use dispersion::{sigma_profile, DispersionModel};
pub use ensemble::{EnsembleOptions, EnsembleSampler, SamplerError, StretchMove};
pub use likelihood::{
    loglikelihood, loglikelihood_sample, realization_loglikelihood, LikelihoodError,
    LikelihoodMode,
};
pub use observations::{simulate_observations, DataError, ObservationSet, RealizationSet};
pub use posterior::{Likelihood, LogDensity, LogpError, Posterior};
pub use prior::{bounds, fill_prior_draw, logprior, sample_prior, Interval};
pub use sampler::{sample, InferenceData, Settings, Trace};
pub use summary::{summarize, ParamSummary};
