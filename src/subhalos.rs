//! Host-centric kinematics of simulated subhalos, and selection of subhalo
//! samples whose radial distribution matches an observed satellite
//! population.

use rand::Rng;
use thiserror::Error;

use crate::math::variance;

/// Default outer radius of a satellite population in kpc.
pub const DEFAULT_R_MAX: f64 = 300.;

/// Bin width of the radial histogram used for matching, in kpc.
const HISTOGRAM_BIN_WIDTH: f64 = 0.1;
/// Number of histogram edges, `0, 0.1, ..., 300.9` kpc.
const HISTOGRAM_EDGES: usize = 3010;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("Got {distances} target distances but {errors} distance errors")]
    LengthMismatch { distances: usize, errors: usize },
    #[error("Cannot match {targets} targets with only {candidates} candidates")]
    TooFewCandidates { targets: usize, candidates: usize },
    #[error("No target distance falls into the histogram range")]
    EmptyHistogram,
}

/// A subhalo with cartesian position (kpc) and velocity (km/s).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Subhalo {
    pub id: u64,
    pub position: [f64; 3],
    pub velocity: [f64; 3],
}

/// Spherical position and velocity of a subhalo relative to its host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphericalKinematics {
    pub id: u64,
    pub r: f64,
    /// Polar angle measured from the z axis.
    pub theta: f64,
    pub phi: f64,
    pub v_r: f64,
    pub v_theta: f64,
    pub v_phi: f64,
    /// Tangential speed.
    pub v_t: f64,
}

/// Positions and velocities relative to `host`.
pub fn center_on_host(subhalos: &[Subhalo], host: &Subhalo) -> Vec<Subhalo> {
    subhalos
        .iter()
        .map(|sub| Subhalo {
            id: sub.id,
            position: std::array::from_fn(|i| sub.position[i] - host.position[i]),
            velocity: std::array::from_fn(|i| sub.velocity[i] - host.velocity[i]),
        })
        .collect()
}

/// Spherical coordinates of an already centered subhalo.
///
/// Returns `None` for subhalos on the z axis, where the angular velocity
/// components are undefined.
pub fn to_spherical(subhalo: &Subhalo) -> Option<SphericalKinematics> {
    let [x, y, z] = subhalo.position;
    let [vx, vy, vz] = subhalo.velocity;
    let rho2 = x * x + y * y;
    if !(rho2 > 0.) {
        return None;
    }
    let rho = rho2.sqrt();
    let r = (rho2 + z * z).sqrt();

    let v_r = (x * vx + y * vy + z * vz) / r;
    let v_theta = (z * (x * vx + y * vy) - vz * rho2) / (r * rho);
    let v_phi = (x * vy - y * vx) / rho;
    Some(SphericalKinematics {
        id: subhalo.id,
        r,
        theta: (z / r).acos(),
        phi: y.atan2(x),
        v_r,
        v_theta,
        v_phi,
        v_t: v_theta.hypot(v_phi),
    })
}

/// Kinematics of the subhalos of `host` within `r_max`.
pub fn hostcentric_population(
    subhalos: &[Subhalo],
    host: &Subhalo,
    r_max: f64,
) -> Vec<SphericalKinematics> {
    center_on_host(subhalos, host)
        .iter()
        .filter_map(to_spherical)
        .filter(|kin| kin.r < r_max)
        .collect()
}

/// Velocity anisotropy `β = 1 - (var v_θ + var v_φ) / (2 var v_r)` of a
/// population.
pub fn population_anisotropy(population: &[SphericalKinematics]) -> f64 {
    let v_r: Vec<f64> = population.iter().map(|kin| kin.v_r).collect();
    let v_theta: Vec<f64> = population.iter().map(|kin| kin.v_theta).collect();
    let v_phi: Vec<f64> = population.iter().map(|kin| kin.v_phi).collect();
    1. - (variance(&v_theta) + variance(&v_phi)) / (2. * variance(&v_r))
}

fn closest(remaining: &[SphericalKinematics], r: f64) -> Option<(usize, f64)> {
    remaining
        .iter()
        .enumerate()
        .map(|(idx, kin)| (idx, (kin.r - r).abs()))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

/// Select one candidate per target: targets are visited from the smallest
/// to the largest distance error, and each takes the remaining candidate
/// closest in radius.
pub fn match_radial_number(
    candidates: &[SphericalKinematics],
    target_distances: &[f64],
    target_errors: &[f64],
) -> Result<Vec<SphericalKinematics>, MatchError> {
    if target_distances.len() != target_errors.len() {
        return Err(MatchError::LengthMismatch {
            distances: target_distances.len(),
            errors: target_errors.len(),
        });
    }
    if target_distances.len() > candidates.len() {
        return Err(MatchError::TooFewCandidates {
            targets: target_distances.len(),
            candidates: candidates.len(),
        });
    }

    let mut order: Vec<usize> = (0..target_distances.len()).collect();
    order.sort_by(|&a, &b| target_errors[a].total_cmp(&target_errors[b]));

    let mut remaining = candidates.to_vec();
    let mut selected = Vec::with_capacity(order.len());
    for target in order {
        if let Some((idx, _)) = closest(&remaining, target_distances[target]) {
            selected.push(remaining.remove(idx));
        }
    }
    Ok(selected)
}

/// Histogram of distances with bins of 0.1 kpc between 0 and 300.9 kpc,
/// sampled by inverse transform.
struct RadialHistogram {
    // cumulative[i] is the number of distances in the bins before bin i + 1
    cumulative: Vec<usize>,
}

impl RadialHistogram {
    fn new(distances: &[f64]) -> Result<Self, MatchError> {
        let n_bins = HISTOGRAM_EDGES - 1;
        let upper = (HISTOGRAM_EDGES - 1) as f64 * HISTOGRAM_BIN_WIDTH;
        let mut counts = vec![0usize; n_bins];
        for &r in distances {
            if !(0. ..=upper).contains(&r) {
                continue;
            }
            let bin = ((r / HISTOGRAM_BIN_WIDTH) as usize).min(n_bins - 1);
            counts[bin] += 1;
        }
        let cumulative: Vec<usize> = counts
            .iter()
            .scan(0, |acc, &count| {
                *acc += count;
                Some(*acc)
            })
            .collect();
        if cumulative.last().copied().unwrap_or(0) == 0 {
            return Err(MatchError::EmptyHistogram);
        }
        Ok(RadialHistogram { cumulative })
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let total = self.cumulative[self.cumulative.len() - 1];
        let draw = rng.random_range(0..total);
        let bin = self.cumulative.partition_point(|&count| count <= draw);
        let offset: f64 = rng.random();
        (bin as f64 + offset) * HISTOGRAM_BIN_WIDTH
    }
}

/// Select candidates whose radial distribution follows `target_distances`.
///
/// Radii are drawn from a histogram of the target distances and each draw
/// takes the closest remaining candidate. Selection stops at the first draw
/// with no remaining candidate within `rtol` kpc.
pub fn match_radial_distribution<R: Rng + ?Sized>(
    candidates: &[SphericalKinematics],
    target_distances: &[f64],
    rtol: f64,
    rng: &mut R,
) -> Result<Vec<SphericalKinematics>, MatchError> {
    let histogram = RadialHistogram::new(target_distances)?;
    let mut remaining = candidates.to_vec();
    let mut selected = Vec::new();
    loop {
        let r = histogram.sample(rng);
        match closest(&remaining, r) {
            Some((idx, diff)) if diff < rtol => selected.push(remaining.remove(idx)),
            _ => break,
        }
    }
    tracing::debug!(
        selected = selected.len(),
        candidates = candidates.len(),
        "Matched radial distribution"
    );
    Ok(selected)
}
