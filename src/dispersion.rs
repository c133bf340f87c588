//! Intrinsic velocity dispersion of the satellite population.
//!
//! The intrinsic covariance of every object is diagonal in the spherical
//! frame `(r, θ, φ)`. Its entries are either constant or follow the profile
//! `σ(r) = σ0 (1 + r / r0)^-α` in galactocentric distance `r`.

use std::fmt::Display;

use crate::math::NCOMP;

/// Dispersion profile `σ0 (1 + r / r0)^-α`.
#[inline]
pub fn sigma_profile(r: f64, sigma0: f64, r0: f64, alpha: f64) -> f64 {
    sigma0 * (1. + r / r0).powf(-alpha)
}

/// The parameterisation of the intrinsic dispersion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispersionModel {
    /// `[v_r, v_θ, v_φ, σ_r, σ_θ, σ_φ]`, the same dispersion for every object.
    #[default]
    Fixed,
    /// `[v_r, v_θ, v_φ, log10 σ0 (×3), r0 (×3), α (×3)]`, dispersion varying
    /// with galactocentric distance.
    Variable,
}

const COMPONENTS: [&str; NCOMP] = ["r", "theta", "phi"];

impl DispersionModel {
    /// Length of the parameter vector.
    pub fn ndim(&self) -> usize {
        match self {
            DispersionModel::Fixed => 2 * NCOMP,
            DispersionModel::Variable => 4 * NCOMP,
        }
    }

    /// Whether the model needs the galactocentric distance of each object.
    pub fn requires_distances(&self) -> bool {
        matches!(self, DispersionModel::Variable)
    }

    /// Names of the parameters in the order of the parameter vector.
    pub fn param_names(&self) -> Vec<String> {
        let groups: &[&str] = match self {
            DispersionModel::Fixed => &["v", "sigma"],
            DispersionModel::Variable => &["v", "log10_sigma0", "r0", "alpha"],
        };
        groups
            .iter()
            .flat_map(|group| COMPONENTS.iter().map(move |comp| format!("{group}_{comp}")))
            .collect()
    }

    /// Names of the parameters after [`DispersionModel::to_physical`].
    pub fn physical_param_names(&self) -> Vec<String> {
        let mut names = self.param_names();
        if let DispersionModel::Variable = self {
            for (name, comp) in names[NCOMP..2 * NCOMP].iter_mut().zip(COMPONENTS) {
                *name = format!("sigma0_{comp}");
            }
        }
        names
    }

    /// The mean velocity `(v_r, v_θ, v_φ)` stored in a parameter vector.
    pub fn mean_velocity<'a>(&self, theta: &'a [f64]) -> &'a [f64] {
        &theta[..NCOMP]
    }

    /// Diagonal of the intrinsic covariance matrix of an object at
    /// galactocentric distance `distance`.
    ///
    /// The distance is ignored by the fixed model. The variable model treats
    /// a missing distance as `r = 0`, callers validate that distances are
    /// available before sampling.
    pub fn intrinsic_variances(&self, theta: &[f64], distance: Option<f64>) -> [f64; NCOMP] {
        debug_assert!(theta.len() == self.ndim());
        let mut out = [0f64; NCOMP];
        match self {
            DispersionModel::Fixed => {
                for (out, sigma) in out.iter_mut().zip(&theta[NCOMP..2 * NCOMP]) {
                    *out = sigma * sigma;
                }
            }
            DispersionModel::Variable => {
                let r = distance.unwrap_or(0.);
                for (i, out) in out.iter_mut().enumerate() {
                    let sigma0 = 10f64.powf(theta[NCOMP + i]);
                    let r0 = theta[2 * NCOMP + i];
                    let alpha = theta[3 * NCOMP + i];
                    let sigma = sigma_profile(r, sigma0, r0, alpha);
                    *out = sigma * sigma;
                }
            }
        }
        out
    }

    /// Convert a draw to physical units: `log10 σ0` becomes `σ0`.
    pub fn to_physical(&self, theta: &mut [f64]) {
        if let DispersionModel::Variable = self {
            theta[NCOMP..2 * NCOMP]
                .iter_mut()
                .for_each(|val| *val = 10f64.powf(*val));
        }
    }

    /// Velocity anisotropy `β = 1 - (σ_θ² + σ_φ²) / (2 σ_r²)` implied by the
    /// parameters at distance `r`.
    pub fn anisotropy(&self, theta: &[f64], r: f64) -> f64 {
        let var = self.intrinsic_variances(theta, Some(r));
        1. - (var[1] + var[2]) / (2. * var[0])
    }
}

impl Display for DispersionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispersionModel::Fixed => write!(f, "fixed-dispersion"),
            DispersionModel::Variable => write!(f, "variable-dispersion"),
        }
    }
}
