//! CSV persistence of chains and flattened samples.
//!
//! Chains are written with one row per walker and draw:
//!
//! ```text
//! walker,draw,lp__,v_r,v_theta,...
//! 0,0,-1234.5,12.25,...
//! ```
//!
//! Floats are written in the shortest form that parses back to the same
//! value, non-finite values as `Inf`, `-Inf` and `NA`, so that a saved chain
//! reloads bit for bit.

use std::fs::File;
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use csv::{Reader, ReaderBuilder, Writer};
use ndarray::{Array2, Array3, ArrayView2};

use crate::chain::Chain;

const WALKER_COLUMN: &str = "walker";
const DRAW_COLUMN: &str = "draw";
const LOGP_COLUMN: &str = "lp__";

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NA".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "Inf" } else { "-Inf" }.to_string()
    } else {
        format!("{:?}", value)
    }
}

fn parse_value(field: &str) -> Result<f64> {
    match field {
        "NA" => Ok(f64::NAN),
        "Inf" => Ok(f64::INFINITY),
        "-Inf" => Ok(f64::NEG_INFINITY),
        _ => field
            .parse()
            .with_context(|| format!("Invalid floating point value: {:?}", field)),
    }
}

fn create_writer(path: &Path) -> Result<Writer<File>> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {:?}", dir))?;
    }
    let file =
        File::create(path).with_context(|| format!("Failed to create CSV file: {:?}", path))?;
    Ok(Writer::from_writer(file))
}

fn open_reader(path: &Path) -> Result<Reader<File>> {
    ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file: {:?}", path))
}

/// Read the header and the data rows of a CSV file. Rows with a different
/// number of fields than the header are an error.
fn read_rows(path: &Path) -> Result<(Vec<String>, Vec<csv::StringRecord>)> {
    let mut reader = open_reader(path)?;
    let header: Vec<String> = reader
        .headers()
        .with_context(|| format!("Failed to read the header of {:?}", path))?
        .iter()
        .map(|name| name.to_string())
        .collect();
    ensure!(!header.is_empty(), "CSV file {:?} is empty", path);

    let rows = reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Malformed row in {:?}", path))?;
    Ok((header, rows))
}

/// Save every walker and draw of `chain`.
pub fn save_chain<P: AsRef<Path>>(path: P, chain: &Chain, param_names: &[String]) -> Result<()> {
    let path = path.as_ref();
    ensure!(
        param_names.len() == chain.ndim(),
        "Got {} parameter names for a chain with {} parameters",
        param_names.len(),
        chain.ndim()
    );
    let positions = chain.positions();
    let log_probs = chain.log_probs();

    let mut writer = create_writer(path)?;
    let mut header = vec![
        WALKER_COLUMN.to_string(),
        DRAW_COLUMN.to_string(),
        LOGP_COLUMN.to_string(),
    ];
    header.extend(param_names.iter().cloned());
    writer.write_record(&header)?;

    for walker in 0..chain.n_walkers() {
        for draw in 0..chain.len() {
            let mut row = vec![
                walker.to_string(),
                draw.to_string(),
                format_value(log_probs[[walker, draw]]),
            ];
            row.extend(
                positions
                    .slice(ndarray::s![walker, draw, ..])
                    .iter()
                    .map(|&val| format_value(val)),
            );
            writer.write_record(&row)?;
        }
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write CSV file: {:?}", path))?;
    Ok(())
}

/// Load a chain written by [`save_chain`] together with its parameter names.
pub fn load_chain<P: AsRef<Path>>(path: P) -> Result<(Chain, Vec<String>)> {
    let path = path.as_ref();
    let (header, rows) = read_rows(path)?;
    ensure!(
        header.len() >= 3
            && header[0] == WALKER_COLUMN
            && header[1] == DRAW_COLUMN
            && header[2] == LOGP_COLUMN,
        "CSV file {:?} does not start with the columns walker,draw,lp__",
        path
    );
    let param_names = header[3..].to_vec();
    let ndim = param_names.len();

    let mut entries = Vec::with_capacity(rows.len());
    let mut n_walkers = 0;
    let mut n_draws = 0;
    for row in &rows {
        let walker: usize = row[0]
            .parse()
            .with_context(|| format!("Invalid walker index: {:?}", &row[0]))?;
        let draw: usize = row[1]
            .parse()
            .with_context(|| format!("Invalid draw index: {:?}", &row[1]))?;
        n_walkers = n_walkers.max(walker + 1);
        n_draws = n_draws.max(draw + 1);
        entries.push((walker, draw, row));
    }
    ensure!(
        entries.len() == n_walkers * n_draws,
        "Expected {} rows for {} walkers and {} draws, found {}",
        n_walkers * n_draws,
        n_walkers,
        n_draws,
        entries.len()
    );

    let mut positions = Array3::from_elem((n_walkers, n_draws, ndim), f64::NAN);
    let mut log_probs = Array2::from_elem((n_walkers, n_draws), f64::NAN);
    let mut seen = Array2::from_elem((n_walkers, n_draws), false);
    for (walker, draw, row) in entries {
        if seen[[walker, draw]] {
            bail!("Duplicate row for walker {} and draw {}", walker, draw);
        }
        seen[[walker, draw]] = true;
        log_probs[[walker, draw]] = parse_value(&row[2])?;
        for (dim, field) in row.iter().skip(3).enumerate() {
            positions[[walker, draw, dim]] = parse_value(field)?;
        }
    }

    let chain = Chain::from_arrays(&positions, &log_probs)?;
    Ok((chain, param_names))
}

/// Save flattened samples, one row per sample.
pub fn save_samples<P: AsRef<Path>>(
    path: P,
    samples: ArrayView2<f64>,
    param_names: &[String],
) -> Result<()> {
    let path = path.as_ref();
    ensure!(
        param_names.len() == samples.ncols(),
        "Got {} parameter names for samples with {} columns",
        param_names.len(),
        samples.ncols()
    );
    let mut writer = create_writer(path)?;
    writer.write_record(param_names)?;
    for sample in samples.outer_iter() {
        writer.write_record(sample.iter().map(|&val| format_value(val)))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write CSV file: {:?}", path))?;
    Ok(())
}

/// Load samples written by [`save_samples`].
pub fn load_samples<P: AsRef<Path>>(path: P) -> Result<(Array2<f64>, Vec<String>)> {
    let (header, rows) = read_rows(path.as_ref())?;
    let mut samples = Array2::zeros((rows.len(), header.len()));
    for (mut sample, row) in samples.outer_iter_mut().zip(&rows) {
        for (val, field) in sample.iter_mut().zip(row.iter()) {
            *val = parse_value(field)?;
        }
    }
    Ok((samples, header))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use pretty_assertions::assert_eq;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn read_lines(path: &Path) -> Result<Vec<String>> {
        let content = std::fs::read_to_string(path)?;
        Ok(content.lines().map(|line| line.to_string()).collect())
    }

    #[test]
    fn value_formatting() {
        assert_eq!(format_value(1.0), "1.0");
        assert_eq!(format_value(f64::NAN), "NA");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
        for val in [0.1, 1. / 3., -2.5e-300, 6.02214076e23, f64::MIN_POSITIVE, -0.0] {
            assert_eq!(parse_value(&format_value(val)).unwrap().to_bits(), val.to_bits());
        }
        assert!(parse_value("abc").is_err());
    }

    #[test]
    fn chain_roundtrip() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("out").join("chain.csv");

        let mut chain = Chain::new(2, 2);
        chain.push(
            array![[0.1, 1. / 3.], [f64::NAN, 1e-300]].view(),
            array![-1.5, f64::NEG_INFINITY].view(),
        );
        chain.push(
            array![[2., -7.25], [1e300, 0.]].view(),
            array![-0.125, -3.].view(),
        );
        let param_names = names(&["a", "b"]);
        save_chain(&path, &chain, &param_names)?;

        let lines = read_lines(&path)?;
        assert_eq!(lines[0], "walker,draw,lp__,a,b");
        assert_eq!(lines[1], "0,0,-1.5,0.1,0.3333333333333333");
        assert_eq!(lines[3], "1,0,-Inf,NA,1e-300");
        assert_eq!(lines.len(), 5);

        let (loaded, loaded_names) = load_chain(&path)?;
        assert_eq!(loaded_names, param_names);
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.n_walkers(), 2);
        let (expected, found) = (chain.positions(), loaded.positions());
        assert!(expected
            .iter()
            .zip(found.iter())
            .all(|(a, b)| a.to_bits() == b.to_bits()));
        assert_eq!(loaded.log_probs(), chain.log_probs());
        Ok(())
    }

    #[test]
    fn samples_roundtrip() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("samples.csv");
        let samples = array![[1., 2., 3.], [0.1, 0.2, 0.30000000000000004]];
        let param_names = names(&["x", "y", "z"]);
        save_samples(&path, samples.view(), &param_names)?;
        let (loaded, loaded_names) = load_samples(&path)?;
        assert_eq!(loaded, samples);
        assert_eq!(loaded_names, param_names);
        Ok(())
    }

    #[test]
    fn reads_crlf_files() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("samples.csv");
        std::fs::write(&path, "x,y\r\n1.5,NA\r\n-Inf,2\r\n")?;
        let (samples, names) = load_samples(&path)?;
        assert_eq!(names, vec!["x".to_string(), "y".to_string()]);
        assert_eq!(samples.dim(), (2, 2));
        assert_eq!(samples[[0, 0]], 1.5);
        assert!(samples[[0, 1]].is_nan());
        assert_eq!(samples[[1, 0]], f64::NEG_INFINITY);
        Ok(())
    }

    #[test]
    fn rejects_malformed_files() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("chain.csv");

        std::fs::write(&path, "a,b\n1,2\n")?;
        assert!(load_chain(&path).is_err());

        std::fs::write(&path, "walker,draw,lp__,a\n0,0,1.0,2.0\n0,0,1.0,2.0\n")?;
        assert!(load_chain(&path).is_err());

        std::fs::write(&path, "walker,draw,lp__,a\n0,0,1.0\n")?;
        assert!(load_chain(&path).is_err());

        std::fs::write(&path, "walker,draw,lp__,a\n0,0,1.0,2.0\n1,1,1.0,2.0\n")?;
        assert!(load_chain(&path).is_err());

        assert!(load_chain(temp_dir.path().join("missing.csv")).is_err());

        std::fs::write(&path, "")?;
        assert!(load_samples(&path).is_err());

        let chain = Chain::new(2, 2);
        assert!(save_chain(&path, &chain, &names(&["a"])).is_err());
        Ok(())
    }
}
