/// Calculate the mean of a slice.
pub fn calc_mean(x: &[f64]) -> f64 {
    let total: f64 = x.iter().sum();
    total / (x.len() as f64)
}

#[test]
fn test_calc_mean() {
    assert_eq!(calc_mean(&[1.0, 2.0, 3.0]), 2.0);
    assert_eq!(calc_mean(&[5.0, 5.0]), 5.0);
    assert_eq!(calc_mean(&[10.0, 20.0]), 15.0);
}

/// Calculate the sample variance (n - 1 denominator) of a slice.
pub fn calc_variance(x: &[f64]) -> f64 {
    let mean = calc_mean(x);
    let total: f64 = x.iter().map(|&x_i| (x_i - mean).powi(2)).sum();
    total / (x.len() as f64 - 1.0)
}

#[test]
fn test_calc_variance() {
    assert_eq!(calc_variance(&[1.0, 2.0, 3.0, 4.0]), 5.0 / 3.0);
    assert_eq!(calc_variance(&[2.0, 4.0]), 2.0);
}

/// Assign 1-based ranks with tied values receiving the average of their
/// would-be ranks, as used by the Spearman and Kruskal-Wallis methods.
pub fn rank_average(x: &[f64]) -> Vec<f64> {
    let n = x.len();
    let mut indexed: Vec<(f64, usize)> = x.iter().copied().enumerate().map(|(i, v)| (v, i)).collect();
    indexed.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        // Find the end of the tie group
        let mut j = i + 1;
        while j < n && indexed[j].0.total_cmp(&indexed[i].0).is_eq() {
            j += 1;
        }
        // Ranks in the group are (i+1)..=j, averaged
        let rank_val = (i + 1..=j).map(|r| r as f64).sum::<f64>() / (j - i) as f64;
        for k in i..j {
            ranks[indexed[k].1] = rank_val;
        }
        i = j;
    }
    ranks
}

#[test]
fn test_rank_average() {
    assert_eq!(rank_average(&[3.0, 1.0, 2.0]), vec![3.0, 1.0, 2.0]);
    assert_eq!(rank_average(&[1.0, 2.0, 2.0, 3.0]), vec![1.0, 2.5, 2.5, 4.0]);
    assert_eq!(rank_average(&[5.0, 5.0, 5.0]), vec![2.0, 2.0, 2.0]);
}

/// Correction factor for ties in rank-based statistics:
/// 1 - sum(t^3 - t) / (n^3 - n) over tie groups of size t.
pub fn tie_correction(x: &[f64]) -> f64 {
    let n = x.len();
    if n < 2 {
        return 1.0;
    }
    let mut sorted = x.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mut tie_sum = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && sorted[j].total_cmp(&sorted[i]).is_eq() {
            j += 1;
        }
        let t = (j - i) as f64;
        tie_sum += t.powi(3) - t;
        i = j;
    }
    let n = n as f64;
    1.0 - tie_sum / (n.powi(3) - n)
}

#[test]
fn test_tie_correction() {
    assert_eq!(tie_correction(&[1.0, 2.0, 3.0]), 1.0);
    // Two tied values among four: 1 - (8 - 2) / (64 - 4)
    assert_eq!(tie_correction(&[1.0, 2.0, 2.0, 3.0]), 1.0 - 6.0 / 60.0);
}
