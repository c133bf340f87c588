//! Flat priors over a bounded box and the walker initialisation that draws
//! from them.

use ndarray::{Array2, ArrayView1};
use rand::Rng;

use crate::dispersion::DispersionModel;

/// An open interval `(lower, upper)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub lower: f64,
    pub upper: f64,
}

impl Interval {
    const fn new(lower: f64, upper: f64) -> Self {
        Interval { lower, upper }
    }

    /// Strict containment. NaN is never contained.
    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        (value > self.lower) & (value < self.upper)
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

const VELOCITY: Interval = Interval::new(-500., 500.);
const SIGMA: Interval = Interval::new(0., 300.);
const LOG10_SIGMA0: Interval = Interval::new(-3., 3.);
const SCALE_RADIUS: Interval = Interval::new(10., 300.);
const POWER_INDEX: Interval = Interval::new(0., 10.);

const FIXED_BOUNDS: [Interval; 6] = [VELOCITY, VELOCITY, VELOCITY, SIGMA, SIGMA, SIGMA];

const VARIABLE_BOUNDS: [Interval; 12] = [
    VELOCITY,
    VELOCITY,
    VELOCITY,
    LOG10_SIGMA0,
    LOG10_SIGMA0,
    LOG10_SIGMA0,
    SCALE_RADIUS,
    SCALE_RADIUS,
    SCALE_RADIUS,
    POWER_INDEX,
    POWER_INDEX,
    POWER_INDEX,
];

/// Support of the flat prior, one interval per parameter.
///
/// Both [`logprior`] and the walker initialisation read this table.
pub fn bounds(model: DispersionModel) -> &'static [Interval] {
    match model {
        DispersionModel::Fixed => &FIXED_BOUNDS,
        DispersionModel::Variable => &VARIABLE_BOUNDS,
    }
}

/// Log density of the flat prior up to a constant.
///
/// Returns `0.0` if every parameter lies inside its interval and negative
/// infinity otherwise, including for parameter vectors of the wrong length.
pub fn logprior(model: DispersionModel, theta: &[f64]) -> f64 {
    let bounds = bounds(model);
    if theta.len() != bounds.len() {
        return f64::NEG_INFINITY;
    }
    if bounds
        .iter()
        .zip(theta)
        .all(|(interval, &val)| interval.contains(val))
    {
        0.
    } else {
        f64::NEG_INFINITY
    }
}

/// Draw one position uniformly from the prior support.
pub fn fill_prior_draw<R: Rng + ?Sized>(model: DispersionModel, rng: &mut R, position: &mut [f64]) {
    let bounds = bounds(model);
    assert!(position.len() == bounds.len());
    for (out, interval) in position.iter_mut().zip(bounds) {
        // u is in [0, 1), redraw the (unlikely) value on the lower bound
        *out = loop {
            let u: f64 = rng.random();
            let val = interval.lower + u * interval.width();
            if interval.contains(val) {
                break val;
            }
        };
    }
}

/// Draw `n_walkers` starting positions uniformly over the prior support.
///
/// Every row has a log prior of zero.
pub fn sample_prior<R: Rng + ?Sized>(
    model: DispersionModel,
    n_walkers: usize,
    rng: &mut R,
) -> Array2<f64> {
    let mut positions = Array2::zeros((n_walkers, model.ndim()));
    let mut draw = vec![0f64; model.ndim()];
    for mut row in positions.outer_iter_mut() {
        fill_prior_draw(model, rng, &mut draw);
        row.assign(&ArrayView1::from(&draw));
    }
    positions
}
