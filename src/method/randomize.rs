use ndarray::Array2;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::model::cwm::{weighted_mean_column, CwmMatrix, Provenance};
use crate::model::error::{CwmError, CwmResult};
use crate::model::method::ExecutionMode;
use crate::util::rayon::create_pool;

/// Build one re-draw of a weighted-mean matrix: for each attribute column,
/// shuffle the non-missing attribute values across their own species
/// positions and recompute the weighted mean against the original abundance
/// matrix. Missing positions stay missing, so the per-column species mask is
/// identical to the real computation.
fn redraw(wm: &CwmMatrix, prov: &Provenance, seed: u64) -> CwmMatrix {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n_samples = wm.n_samples();
    let n_attributes = wm.n_attributes();

    let mut matrix = Array2::zeros((n_samples, n_attributes));
    for j in 0..n_attributes {
        let valid = &prov.valid_species[j];
        let mut values = prov.attributes.matrix.column(j).to_vec();

        // Shuffle the non-missing values among the valid positions only
        let mut pool: Vec<f64> = valid.iter().map(|&k| values[k]).collect();
        pool.shuffle(&mut rng);
        for (&k, v) in valid.iter().zip(pool) {
            values[k] = v;
        }

        let column = weighted_mean_column(&prov.abundance, &values, valid);
        for (i, value) in column.into_iter().enumerate() {
            matrix[[i, j]] = value;
        }
    }

    CwmMatrix {
        samples: wm.samples.clone(),
        attributes: wm.attributes.clone(),
        matrix,
        provenance: None,
    }
}

/// Produce `permutations` independent attribute-permutation re-draws of a
/// weighted-mean matrix, applying `reducer` to each and collecting the
/// results.
///
/// Each draw has its own seeded random stream, so results are reproducible
/// for a fixed seed regardless of execution mode, and aggregation order
/// across workers cannot affect anything downstream.
///
/// Fails with `InvalidInput` when `wm` carries no provenance (a matrix of
/// means alone cannot be re-drawn at the species level).
pub fn randomize<R, F>(
    wm: &CwmMatrix,
    permutations: usize,
    reducer: F,
    exec: &ExecutionMode,
    seed: u64,
) -> CwmResult<Vec<R>>
where
    F: Fn(&CwmMatrix) -> R + Sync,
    R: Send,
{
    let prov = wm.provenance.as_ref().ok_or_else(|| {
        CwmError::InvalidInput(
            "randomize requires a weighted-mean object carrying its abundance \
             and attribute matrices"
                .to_string(),
        )
    })?;
    if permutations < 1 {
        return Err(CwmError::InvalidInput(
            "permutation count must be at least 1".to_string(),
        ));
    }

    match exec {
        ExecutionMode::Sequential => {
            let mut out = Vec::with_capacity(permutations);
            for draw in 0..permutations {
                let drawn = redraw(wm, prov, seed.wrapping_add(draw as u64));
                out.push(reducer(&drawn));
            }
            Ok(out)
        }
        ExecutionMode::Parallel { threads } => {
            let pool = create_pool(*threads)?;
            let out = pool.install(|| {
                (0..permutations)
                    .into_par_iter()
                    .map(|draw| {
                        let drawn = redraw(wm, prov, seed.wrapping_add(draw as u64));
                        reducer(&drawn)
                    })
                    .collect()
            });
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::cwm::weighted_mean;
    use crate::model::matrix::{AbundanceMatrix, AttributeMatrix};

    fn example_wm() -> CwmMatrix {
        let samples = (0..6).map(|i| format!("sample{}", i)).collect();
        let species: Vec<String> = (0..4).map(|i| format!("sp{}", i)).collect();
        let matrix = Array2::from_shape_vec(
            (6, 4),
            vec![
                5.0, 1.0, 0.0, 2.0, //
                0.0, 4.0, 3.0, 1.0, //
                2.0, 2.0, 2.0, 2.0, //
                9.0, 0.0, 0.0, 1.0, //
                1.0, 5.0, 2.0, 0.0, //
                3.0, 3.0, 1.0, 4.0,
            ],
        )
        .unwrap();
        let abundance = AbundanceMatrix::new(samples, species.clone(), matrix).unwrap();
        let attrs =
            AttributeMatrix::from_column("trait", species, &[1.0, 4.0, 2.0, f64::NAN]).unwrap();
        weighted_mean(&abundance, &attrs).unwrap()
    }

    #[test]
    fn test_randomize_preserves_shape() {
        let wm = example_wm();
        let shapes = randomize(&wm, 1, |draw| (draw.n_samples(), draw.n_attributes()),
            &ExecutionMode::Sequential, 7).unwrap();
        assert_eq!(shapes, vec![(6, 1)]);
    }

    #[test]
    fn test_randomize_without_provenance_fails() {
        let wm = example_wm();
        let bare = CwmMatrix::from_matrix(
            wm.samples.clone(),
            wm.attributes.clone(),
            wm.matrix.clone(),
        )
        .unwrap();
        assert!(randomize(&bare, 5, |_| 0, &ExecutionMode::Sequential, 7).is_err());
    }

    #[test]
    fn test_randomize_deterministic_for_fixed_seed() {
        let wm = example_wm();
        let first: Vec<Vec<f64>> = randomize(&wm, 5, |draw| draw.column_vec(0),
            &ExecutionMode::Sequential, 99).unwrap();
        let second: Vec<Vec<f64>> = randomize(&wm, 5, |draw| draw.column_vec(0),
            &ExecutionMode::Sequential, 99).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_randomize_parallel_matches_sequential() {
        // Per-draw seeding makes draw d identical in either execution mode
        let wm = example_wm();
        let sequential: Vec<Vec<f64>> = randomize(&wm, 8, |draw| draw.column_vec(0),
            &ExecutionMode::Sequential, 42).unwrap();
        let parallel: Vec<Vec<f64>> = randomize(&wm, 8, |draw| draw.column_vec(0),
            &ExecutionMode::Parallel { threads: 3 }, 42).unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_randomize_draws_stay_within_attribute_range() {
        // A weighted mean of shuffled values is still bounded by the
        // non-missing attribute range
        let wm = example_wm();
        let columns: Vec<Vec<f64>> = randomize(&wm, 20, |draw| draw.column_vec(0),
            &ExecutionMode::Sequential, 3).unwrap();
        for column in columns {
            for value in column {
                assert!(value >= 1.0 && value <= 4.0, "value {} out of range", value);
            }
        }
    }
}
