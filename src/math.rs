use faer::{Mat, Side};
use itertools::izip;
use ndarray::ArrayView2;

/// Number of velocity components per object.
pub(crate) const NCOMP: usize = 3;

/// Pivots of the Cholesky factor must satisfy `l_ii^2 > PIVOT_TOLERANCE * max_i c_ii`.
const PIVOT_TOLERANCE: f64 = 4. * f64::EPSILON;

/// Compute the Mahalanobis term `shift^T cov^-1 shift` and `ln det cov` of a
/// 3×3 covariance matrix.
///
/// Returns `None` if the matrix contains non-finite entries, is not
/// numerically positive definite, or if either term overflows.
pub(crate) fn mahalanobis_logdet(cov: &Mat<f64>, shift: &[f64; NCOMP]) -> Option<(f64, f64)> {
    debug_assert!(cov.nrows() == NCOMP && cov.ncols() == NCOMP);

    let mut scale = 0f64;
    for i in 0..NCOMP {
        for j in 0..NCOMP {
            if !cov[(i, j)].is_finite() {
                return None;
            }
        }
        scale = scale.max(cov[(i, i)]);
    }
    if scale <= 0. {
        return None;
    }

    let llt = cov.llt(Side::Lower).ok()?;
    let l = llt.L();

    // Forward substitution: l y = shift, so that shift^T cov^-1 shift = |y|^2
    let mut y = [0f64; NCOMP];
    let mut logdet = 0f64;
    for i in 0..NCOMP {
        let pivot = l[(i, i)];
        if pivot.is_nan() || pivot * pivot <= PIVOT_TOLERANCE * scale {
            return None;
        }
        let mut acc = shift[i];
        for k in 0..i {
            acc -= l[(i, k)] * y[k];
        }
        y[i] = acc / pivot;
        logdet += 2. * pivot.ln();
    }
    let mahalanobis: f64 = y.iter().map(|v| v * v).sum();
    if !(mahalanobis.is_finite() && logdet.is_finite()) {
        return None;
    }
    Some((mahalanobis, logdet))
}

/// Sum of per-object terms that does not depend on their order.
pub(crate) fn ordered_sum(terms: &mut [f64]) -> f64 {
    terms.sort_unstable_by(f64::total_cmp);
    terms.iter().sum()
}

/// Sample mean and unbiased sample covariance of the columns of a
/// `3 × M` block of draws.
pub(crate) fn mean_and_covariance(
    draws: ArrayView2<f64>,
) -> ([f64; NCOMP], [[f64; NCOMP]; NCOMP]) {
    assert!(draws.nrows() == NCOMP);
    let count = draws.ncols();

    let mut mean = [0f64; NCOMP];
    izip!(mean.iter_mut(), draws.outer_iter()).for_each(|(mean, row)| {
        *mean = row.sum() / count as f64;
    });

    let mut cov = [[0f64; NCOMP]; NCOMP];
    if count < 2 {
        return (mean, cov);
    }
    for i in 0..NCOMP {
        for j in i..NCOMP {
            let sum: f64 = izip!(draws.row(i), draws.row(j))
                .map(|(a, b)| (a - mean[i]) * (b - mean[j]))
                .sum();
            let val = sum / (count - 1) as f64;
            cov[i][j] = val;
            cov[j][i] = val;
        }
    }
    (mean, cov)
}

/// Quantile of already sorted values with linear interpolation between
/// order statistics.
pub(crate) fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q.clamp(0., 1.) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    (sorted[lower] + frac * (sorted[upper] - sorted[lower])).clamp(sorted[lower], sorted[upper])
}

/// Population variance of a sequence of values.
pub(crate) fn variance(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn diag(values: [f64; 3]) -> Mat<f64> {
        Mat::from_fn(3, 3, |i, j| if i == j { values[i] } else { 0. })
    }

    proptest! {
        #[test]
        fn diagonal_terms(
            d in prop::array::uniform3(1e-3f64..1e3),
            s in prop::array::uniform3(-100f64..100f64),
        ) {
            let (mahal, logdet) = mahalanobis_logdet(&diag(d), &s).unwrap();
            let expected_mahal: f64 = izip!(&s, &d).map(|(s, d)| s * s / d).sum();
            let expected_logdet: f64 = d.iter().map(|d| d.ln()).sum();
            prop_assert!((mahal - expected_mahal).abs() < 1e-9 * expected_mahal.max(1.));
            prop_assert!((logdet - expected_logdet).abs() < 1e-10);
        }
    }

    #[test]
    fn correlated_covariance() {
        let cov = Mat::from_fn(3, 3, |i, j| match (i, j) {
            (0, 0) => 4.,
            (1, 1) => 3.,
            (2, 2) => 2.,
            (0, 1) | (1, 0) => 1.,
            _ => 0.,
        });
        // det = 2 * (4 * 3 - 1) = 22
        let (mahal, logdet) = mahalanobis_logdet(&cov, &[1., 0., 0.]).unwrap();
        assert_abs_diff_eq!(logdet, 22f64.ln(), epsilon = 1e-12);
        // (cov^-1)_00 = 3 / 11
        assert_abs_diff_eq!(mahal, 3. / 11., epsilon = 1e-12);
    }

    #[test]
    fn singular_covariance() {
        assert!(mahalanobis_logdet(&diag([0., 0., 0.]), &[0., 0., 0.]).is_none());
        assert!(mahalanobis_logdet(&diag([1., 0., 1.]), &[0., 0., 0.]).is_none());
        assert!(mahalanobis_logdet(&diag([1., f64::NAN, 1.]), &[0., 0., 0.]).is_none());

        let rank_two = Mat::from_fn(3, 3, |i, j| match (i, j) {
            (2, 2) => 1.,
            (2, _) | (_, 2) => 0.,
            _ => 1.,
        });
        assert!(mahalanobis_logdet(&rank_two, &[1., 1., 1.]).is_none());
    }

    #[test]
    fn overflowing_quadratic_form() {
        let small = diag([1e-300, 1e-300, 1e-300]);
        assert!(mahalanobis_logdet(&small, &[1e10, 2e10, 3e10]).is_none());
        assert!(mahalanobis_logdet(&small, &[1., 2., 3.]).is_some());
        assert!(mahalanobis_logdet(&small, &[0., 0., 0.]).is_some());
    }

    #[test]
    fn moments() {
        let draws = array![[1., 2., 3.], [2., 4., 6.], [0., 0., 0.]];
        let (mean, cov) = mean_and_covariance(draws.view());
        assert_eq!(mean, [2., 4., 0.]);
        assert_abs_diff_eq!(cov[0][0], 1.);
        assert_abs_diff_eq!(cov[0][1], 2.);
        assert_abs_diff_eq!(cov[1][0], 2.);
        assert_abs_diff_eq!(cov[1][1], 4.);
        assert_abs_diff_eq!(cov[2][2], 0.);
    }

    #[test]
    fn sum_ignores_order() {
        let mut a = [1e16, 1., -1e16, 3.5, 0.25];
        let mut b = [0.25, -1e16, 3.5, 1., 1e16];
        assert_eq!(ordered_sum(&mut a), ordered_sum(&mut b));
    }

    #[test]
    fn quantiles() {
        let values = [1., 2., 3., 4., 5.];
        assert_eq!(quantile_sorted(&values, 0.5), 3.);
        assert_eq!(quantile_sorted(&values, 0.), 1.);
        assert_eq!(quantile_sorted(&values, 1.), 5.);
        assert_abs_diff_eq!(quantile_sorted(&values, 0.16), 1.64, epsilon = 1e-12);
        assert!(quantile_sorted(&[], 0.5).is_nan());
        assert_abs_diff_eq!(variance(&values), 2.);
    }
}
