use anyhow::Result;
use ndarray::{Array1, Array3, Axis};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use satkin::{
    load_chain, logprior, sample, sample_prior, simulate_observations, DispersionModel,
    EnsembleOptions, EnsembleSampler, InferenceData, LikelihoodMode, LogDensity, LogpError,
    RealizationSet, Settings,
};
use thiserror::Error;

const THETA_TRUE: [f64; 6] = [10., -20., 40., 30., 25., 20.];

fn recovery_settings() -> Settings {
    Settings {
        n_walkers: 32,
        num_burnin: 600,
        num_draws: 300,
        seed: 42,
        ..Default::default()
    }
}

#[test]
fn initial_walkers_inside_prior() {
    let mut rng = StdRng::seed_from_u64(0);
    for model in [DispersionModel::Fixed, DispersionModel::Variable] {
        let walkers = sample_prior(model, 100, &mut rng);
        assert_eq!(walkers.dim(), (100, model.ndim()));
        for walker in walkers.outer_iter() {
            assert_eq!(logprior(model, walker.as_slice().unwrap()), 0.);
        }
    }
}

#[test]
fn recover_fixed_dispersion() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(1);
    let observations =
        simulate_observations(DispersionModel::Fixed, &THETA_TRUE, None, 80, 2., &mut rng)?;
    let trace = sample(&recovery_settings(), &InferenceData::new(observations))?;

    let summary = trace.summary();
    assert_eq!(summary.len(), 6);
    for (param, &truth) in summary.iter().zip(THETA_TRUE.iter()) {
        let tolerance = if param.name.starts_with("sigma") { 10. } else { 15. };
        assert!(
            (param.p50 - truth).abs() < tolerance,
            "{} is far from the true value {}",
            param,
            truth
        );
        assert!(param.p16 < param.p50 && param.p50 < param.p84);
    }

    let mean_acceptance = trace.mean_acceptance_fraction();
    assert!(mean_acceptance > 0. && mean_acceptance < 1.);
    assert!(trace
        .burnin_acceptance_fraction
        .iter()
        .all(|&val| (0. ..=1.).contains(&val)));
    Ok(())
}

#[test]
fn recover_variable_dispersion() -> Result<()> {
    // log10 sigma0 = (1.7, 1.6, 1.5), r0 = 100, alpha = 1
    let theta = [10., -20., 40., 1.7, 1.6, 1.5, 100., 100., 100., 1., 1., 1.];
    let count = 120;
    let distances: Array1<f64> = (0..count)
        .map(|i| 2. + 248. * i as f64 / (count - 1) as f64)
        .collect();
    let mut rng = StdRng::seed_from_u64(3);
    let observations = simulate_observations(
        DispersionModel::Variable,
        &theta,
        Some(distances),
        count,
        2.,
        &mut rng,
    )?;
    let settings = Settings {
        n_walkers: 48,
        num_burnin: 1500,
        num_draws: 500,
        dispersion: DispersionModel::Variable,
        ..recovery_settings()
    };
    let trace = sample(&settings, &InferenceData::new(observations))?;
    assert_eq!(trace.param_names[3], "log10_sigma0_r");

    let samples = trace.flat_samples();
    let medians: Vec<f64> = samples
        .columns()
        .into_iter()
        .map(|column| {
            let mut values = column.to_vec();
            values.sort_unstable_by(f64::total_cmp);
            values[values.len() / 2]
        })
        .collect();
    for dim in 0..3 {
        assert!(
            (medians[dim] - theta[dim]).abs() < 12.,
            "mean velocity {} is {}, expected {}",
            trace.param_names[dim],
            medians[dim],
            theta[dim]
        );
        assert!(
            (medians[3 + dim] - theta[3 + dim]).abs() < 0.35,
            "{} is {}, expected {}",
            trace.param_names[3 + dim],
            medians[3 + dim],
            theta[3 + dim]
        );
    }

    let mean_acceptance = trace.mean_acceptance_fraction();
    assert!(mean_acceptance > 0. && mean_acceptance < 1.);
    Ok(())
}

#[test]
fn recover_dispersion_from_realizations() -> Result<()> {
    let count = 80;
    let num_realizations = 50;
    let noise = 1.;
    let mut rng = StdRng::seed_from_u64(4);

    // Each object has a true velocity drawn from the population and Monte
    // Carlo realizations scattered around it.
    let mut samples = Array3::zeros((count, 3, num_realizations));
    for object in 0..count {
        for comp in 0..3 {
            let z: f64 = StandardNormal.sample(&mut rng);
            let truth = THETA_TRUE[comp] + THETA_TRUE[3 + comp] * z;
            for draw in 0..num_realizations {
                let err: f64 = StandardNormal.sample(&mut rng);
                samples[[object, comp, draw]] = truth + noise * err;
            }
        }
    }
    let data = InferenceData::from_realizations(RealizationSet::new(samples)?, None)?;
    let settings = Settings {
        likelihood: LikelihoodMode::Resample,
        ..recovery_settings()
    };
    let trace = sample(&settings, &data)?;

    for (param, &truth) in trace.summary().iter().zip(THETA_TRUE.iter()) {
        let tolerance = if param.name.starts_with("sigma") { 10. } else { 15. };
        assert!(
            (param.p50 - truth).abs() < tolerance,
            "{} is far from the true value {}",
            param,
            truth
        );
    }
    let mean_acceptance = trace.mean_acceptance_fraction();
    assert!(mean_acceptance > 0. && mean_acceptance < 1.);
    Ok(())
}

#[test]
fn chain_survives_csv_roundtrip() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(2);
    let observations =
        simulate_observations(DispersionModel::Fixed, &THETA_TRUE, None, 20, 2., &mut rng)?;
    let settings = Settings {
        n_walkers: 12,
        num_burnin: 20,
        num_draws: 15,
        ..recovery_settings()
    };
    let trace = sample(&settings, &InferenceData::new(observations))?;

    let temp_dir = tempfile::tempdir()?;
    trace.write_csv(temp_dir.path())?;
    let (chain, names) = load_chain(temp_dir.path().join("chain.csv"))?;
    assert_eq!(names, trace.param_names);
    assert_eq!(chain.positions().dim(), (12, 15, 6));
    assert_eq!(chain, trace.chain);
    Ok(())
}

struct NormalLogp {
    mu: Vec<f64>,
}

#[derive(Error, Debug)]
enum NormalLogpError {}

impl LogpError for NormalLogpError {
    fn is_recoverable(&self) -> bool {
        true
    }
}

impl LogDensity for NormalLogp {
    type LogpError = NormalLogpError;

    fn dim(&self) -> usize {
        self.mu.len()
    }

    fn logp<R: Rng + ?Sized>(&self, position: &[f64], _rng: &mut R) -> Result<f64, Self::LogpError> {
        Ok(position
            .iter()
            .zip(&self.mu)
            .map(|(&p, &mu)| -(p - mu) * (p - mu) / 2.)
            .sum())
    }

    fn init_position<R: Rng + ?Sized>(&self, rng: &mut R, position: &mut [f64]) {
        position
            .iter_mut()
            .for_each(|x| *x = StandardNormal.sample(rng));
    }
}

#[test]
fn sample_custom_density() -> Result<()> {
    let logp = NormalLogp {
        mu: vec![-2., 0., 5.],
    };
    let options = EnsembleOptions {
        n_walkers: 20,
        seed: 7,
        ..Default::default()
    };
    let mut sampler = EnsembleSampler::new(logp, options)?;
    sampler.initialize_from_model()?;
    sampler.run(500)?;
    sampler.reset();
    sampler.run(500)?;

    let samples = sampler.chain().flat_samples(0);
    let mean: Array1<f64> = samples.mean_axis(Axis(0)).unwrap();
    for (&found, &expected) in mean.iter().zip(&[-2., 0., 5.]) {
        assert!((found - expected).abs() < 0.25);
    }
    let acceptance = sampler.acceptance_fraction().mean().unwrap();
    assert!(acceptance > 0. && acceptance < 1.);
    Ok(())
}
