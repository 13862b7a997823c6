use ndarray::Array2;

use crate::model::error::{CwmError, CwmResult};
use crate::model::matrix::{AbundanceMatrix, AttributeMatrix};

/// Provenance retained by a [`CwmMatrix`]: the inputs it was computed from,
/// plus the per-column mask of species with non-missing attribute values.
/// The mask is computed once and reused for every permutation draw so the
/// same species participate in the real fit and in every re-draw.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub abundance: AbundanceMatrix,
    pub attributes: AttributeMatrix,
    pub valid_species: Vec<Vec<usize>>,
}

/// A samples-by-attributes matrix of community-weighted means.
/// Never mutated after creation; consumed by the permutation test engine
/// and the randomizer.
#[derive(Debug, Clone)]
pub struct CwmMatrix {
    pub samples: Vec<String>,
    pub attributes: Vec<String>,
    pub matrix: Array2<f64>,
    pub provenance: Option<Provenance>,
}

impl CwmMatrix {
    /// Wrap an externally computed matrix of means. The result carries no
    /// provenance, so it supports the standard permutation test only.
    pub fn from_matrix(
        samples: Vec<String>,
        attributes: Vec<String>,
        matrix: Array2<f64>,
    ) -> CwmResult<Self> {
        if matrix.nrows() != samples.len() || matrix.ncols() != attributes.len() {
            return Err(CwmError::DimensionMismatch(format!(
                "weighted-mean matrix is {}x{} but {} samples and {} attributes were named",
                matrix.nrows(),
                matrix.ncols(),
                samples.len(),
                attributes.len()
            )));
        }
        Ok(CwmMatrix {
            samples,
            attributes,
            matrix,
            provenance: None,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn n_attributes(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn column_vec(&self, column: usize) -> Vec<f64> {
        self.matrix.column(column).to_vec()
    }

    /// Case weights for the slope method: total abundance per sample.
    /// Unit weights when the matrix was constructed without provenance.
    pub fn case_weights(&self) -> Vec<f64> {
        match &self.provenance {
            Some(prov) => prov.abundance.row_sums(),
            None => vec![1.0; self.n_samples()],
        }
    }
}

/// Compute one weighted-mean column against the original abundance matrix.
/// Species outside `valid` are excluded from both the numerator and the
/// weight sum; a sample with no contributing weight yields NaN.
pub fn weighted_mean_column(
    abundance: &AbundanceMatrix,
    attr_values: &[f64],
    valid: &[usize],
) -> Vec<f64> {
    let n_samples = abundance.n_samples();
    let mut out = Vec::with_capacity(n_samples);
    for i in 0..n_samples {
        let mut numerator = 0.0;
        let mut weight_sum = 0.0;
        for &k in valid {
            let w = abundance.matrix[[i, k]];
            numerator += w * attr_values[k];
            weight_sum += w;
        }
        if weight_sum > 0.0 {
            out.push(numerator / weight_sum);
        } else {
            out.push(f64::NAN);
        }
    }
    out
}

/// Compute the community-weighted mean of each attribute for each sample.
///
/// For each attribute column, species with a missing value are excluded from
/// both the abundance-weight sum and the numerator. A (sample, attribute)
/// cell where no species contributes is NaN.
pub fn weighted_mean(
    abundance: &AbundanceMatrix,
    attributes: &AttributeMatrix,
) -> CwmResult<CwmMatrix> {
    if abundance.n_species() != attributes.n_species() {
        return Err(CwmError::DimensionMismatch(format!(
            "abundance matrix has {} species but attribute matrix has {}",
            abundance.n_species(),
            attributes.n_species()
        )));
    }

    let n_samples = abundance.n_samples();
    let n_attributes = attributes.n_attributes();

    // Per-column masks of species with non-missing attribute values
    let valid_species: Vec<Vec<usize>> = (0..n_attributes)
        .map(|j| attributes.valid_species(j))
        .collect();

    let mut matrix = Array2::zeros((n_samples, n_attributes));
    for j in 0..n_attributes {
        let attr_values = attributes.matrix.column(j).to_vec();
        let column = weighted_mean_column(abundance, &attr_values, &valid_species[j]);
        for (i, value) in column.into_iter().enumerate() {
            matrix[[i, j]] = value;
        }
    }

    Ok(CwmMatrix {
        samples: abundance.samples.clone(),
        attributes: attributes.attributes.clone(),
        matrix,
        provenance: Some(Provenance {
            abundance: abundance.clone(),
            attributes: attributes.clone(),
            valid_species,
        }),
    })
}

#[cfg(test)]
fn uniform_abundance(n_samples: usize, n_species: usize, cover: f64) -> AbundanceMatrix {
    let samples = (0..n_samples).map(|i| format!("sample{}", i)).collect();
    let species: Vec<String> = (0..n_species).map(|i| format!("species{}", i)).collect();
    let matrix = Array2::from_elem((n_samples, n_species), cover);
    AbundanceMatrix::new(samples, species, matrix).unwrap()
}

#[test]
fn test_weighted_mean_uniform_cover() {
    // 10 samples x 3 species at uniform cover, attribute [1, 2, 3]
    let abundance = uniform_abundance(10, 3, 50.0);
    let attrs = AttributeMatrix::from_column(
        "trait",
        abundance.species.clone(),
        &[1.0, 2.0, 3.0],
    )
    .unwrap();
    let wm = weighted_mean(&abundance, &attrs).unwrap();
    assert_eq!(wm.n_samples(), 10);
    assert_eq!(wm.n_attributes(), 1);
    for i in 0..10 {
        assert!((wm.matrix[[i, 0]] - 2.0).abs() < 1e-12);
    }
}

#[test]
fn test_weighted_mean_excludes_missing_species() {
    // Species 2 has a missing value: both its weight and value drop out
    let abundance = uniform_abundance(10, 3, 50.0);
    let attrs = AttributeMatrix::from_column(
        "trait",
        abundance.species.clone(),
        &[1.0, f64::NAN, 3.0],
    )
    .unwrap();
    let wm = weighted_mean(&abundance, &attrs).unwrap();
    for i in 0..10 {
        assert!((wm.matrix[[i, 0]] - 2.0).abs() < 1e-12);
    }
}

#[test]
fn test_weighted_mean_bounded_by_attribute_range() {
    let samples = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let species: Vec<String> = (0..4).map(|i| format!("sp{}", i)).collect();
    let matrix = Array2::from_shape_vec(
        (3, 4),
        vec![
            5.0, 0.0, 2.0, 1.0, //
            0.0, 3.0, 0.0, 8.0, //
            1.0, 1.0, 1.0, 1.0,
        ],
    )
    .unwrap();
    let abundance = AbundanceMatrix::new(samples, species.clone(), matrix).unwrap();
    let values = [2.5, 7.0, 4.0, 1.5];
    let attrs = AttributeMatrix::from_column("trait", species, &values).unwrap();
    let wm = weighted_mean(&abundance, &attrs).unwrap();
    for i in 0..3 {
        let v = wm.matrix[[i, 0]];
        assert!(v >= 1.5 && v <= 7.0);
    }
}

#[test]
fn test_weighted_mean_all_missing_column_is_nan() {
    let abundance = uniform_abundance(4, 2, 10.0);
    let attrs = AttributeMatrix::from_column(
        "trait",
        abundance.species.clone(),
        &[f64::NAN, f64::NAN],
    )
    .unwrap();
    let wm = weighted_mean(&abundance, &attrs).unwrap();
    for i in 0..4 {
        assert!(wm.matrix[[i, 0]].is_nan());
    }
}
