use ndarray::Array2;

/// Select the given rows of a matrix, preserving their order.
pub fn take_rows(x: &Array2<f64>, rows: &[usize]) -> Array2<f64> {
    let mut out = Array2::zeros((rows.len(), x.ncols()));
    for (i, &row) in rows.iter().enumerate() {
        for j in 0..x.ncols() {
            out[[i, j]] = x[[row, j]];
        }
    }
    out
}

#[test]
fn test_take_rows() {
    let x = Array2::from_shape_vec((3, 2), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    let taken = take_rows(&x, &[2, 0]);
    assert_eq!(taken[[0, 0]], 5.0);
    assert_eq!(taken[[0, 1]], 6.0);
    assert_eq!(taken[[1, 0]], 1.0);
    assert_eq!(taken[[1, 1]], 2.0);
}
