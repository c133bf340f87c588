use std::fmt::Display;

use ndarray::ArrayView2;

use crate::math::quantile_sorted;

/// Median and the 68% central interval of one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSummary {
    pub name: String,
    pub p16: f64,
    pub p50: f64,
    pub p84: f64,
}

impl ParamSummary {
    pub fn upper_error(&self) -> f64 {
        self.p84 - self.p50
    }

    pub fn lower_error(&self) -> f64 {
        self.p50 - self.p16
    }
}

impl Display for ParamSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} = {:.2} +{:.2}/-{:.2}",
            self.name,
            self.p50,
            self.upper_error(),
            self.lower_error()
        )
    }
}

/// Summarize each column of `samples` by its 16th, 50th and 84th
/// percentiles.
///
/// NaN values are ignored.
pub fn summarize(samples: ArrayView2<f64>, names: &[String]) -> Vec<ParamSummary> {
    assert!(names.len() == samples.ncols());
    samples
        .columns()
        .into_iter()
        .zip(names)
        .map(|(column, name)| {
            let mut values: Vec<f64> = column.iter().copied().filter(|v| !v.is_nan()).collect();
            values.sort_unstable_by(f64::total_cmp);
            ParamSummary {
                name: name.clone(),
                p16: quantile_sorted(&values, 0.16),
                p50: quantile_sorted(&values, 0.5),
                p84: quantile_sorted(&values, 0.84),
            }
        })
        .collect()
}
