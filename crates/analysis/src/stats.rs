//! Descriptive statistics and the two nonparametric tests used by `compare`.

use std::cmp::Ordering;

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    v
}

/// Percentile of sorted data with linear interpolation, `q` in `[0, 1]`.
fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

/// Percentile with linear interpolation, `q` in `[0, 1]`. Zero for no data.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    percentile_sorted(&sorted(values), q)
}

/// Inter-quartile range (75th minus 25th percentile). Zero for no data.
pub fn iqr(values: &[f64]) -> f64 {
    let s = sorted(values);
    percentile_sorted(&s, 0.75) - percentile_sorted(&s, 0.25)
}

/// Complementary error function, fractional error below 1.2e-7.
pub fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let ans = t
        * (-z * z - 1.265_512_23
            + t * (1.000_023_68
                + t * (0.374_091_96
                    + t * (0.096_784_18
                        + t * (-0.186_288_06
                            + t * (0.278_868_07
                                + t * (-1.135_203_98
                                    + t * (1.488_515_87
                                        + t * (-0.822_152_23 + t * 0.170_872_77)))))))))
            .exp();
    if x >= 0.0 {
        ans
    } else {
        2.0 - ans
    }
}

/// Standard normal cumulative distribution.
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

/// Two-sided Mann-Whitney U test p-value.
///
/// Normal approximation with tie and continuity correction. Returns 1 when
/// either side is empty or every value is tied.
pub fn mann_whitney_u(a: &[f64], b: &[f64]) -> f64 {
    let (n1, n2) = (a.len(), b.len());
    if n1 == 0 || n2 == 0 {
        return 1.0;
    }

    // (value, from_a)
    let mut all: Vec<(f64, bool)> = a
        .iter()
        .map(|v| (*v, true))
        .chain(b.iter().map(|v| (*v, false)))
        .collect();
    all.sort_by(|x, y| x.0.partial_cmp(&y.0).unwrap_or(Ordering::Equal));

    let n = all.len();
    let mut rank_sum_a = 0.0;
    let mut tie_term = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && all[j + 1].0 == all[i].0 {
            j += 1;
        }
        // ranks i+1 ..= j+1 share their average
        let avg_rank = (i + j + 2) as f64 / 2.0;
        let ties = (j - i + 1) as f64;
        tie_term += ties * ties * ties - ties;
        rank_sum_a += all[i..=j].iter().filter(|(_, from_a)| *from_a).count() as f64 * avg_rank;
        i = j + 1;
    }

    let (n1f, n2f, nf) = (n1 as f64, n2 as f64, n as f64);
    let u = rank_sum_a - n1f * (n1f + 1.0) / 2.0;
    let mean = n1f * n2f / 2.0;
    let variance = n1f * n2f / 12.0 * ((nf + 1.0) - tie_term / (nf * (nf - 1.0)));
    if variance <= 0.0 {
        return 1.0;
    }

    let z = ((u - mean).abs() - 0.5).max(0.0) / variance.sqrt();
    erfc(z / std::f64::consts::SQRT_2).min(1.0)
}

/// Kolmogorov distribution tail `Q_KS(lambda)`.
fn probks(lambda: f64) -> f64 {
    const EPS1: f64 = 0.001;
    const EPS2: f64 = 1.0e-8;

    let a2 = -2.0 * lambda * lambda;
    let mut fac = 2.0;
    let mut sum = 0.0;
    let mut term_before: f64 = 0.0;
    for j in 1..=100 {
        let jf = j as f64;
        let term = fac * (a2 * jf * jf).exp();
        sum += term;
        if term.abs() <= EPS1 * term_before || term.abs() <= EPS2 * sum {
            return sum.clamp(0.0, 1.0);
        }
        fac = -fac;
        term_before = term.abs();
    }
    // no convergence, which only happens for tiny lambda
    1.0
}

/// Two-sample Kolmogorov-Smirnov test p-value. Returns 1 when either side is
/// empty or the empirical distributions coincide.
pub fn kolmogorov_smirnov(a: &[f64], b: &[f64]) -> f64 {
    let (n1, n2) = (a.len(), b.len());
    if n1 == 0 || n2 == 0 {
        return 1.0;
    }
    let (sa, sb) = (sorted(a), sorted(b));

    let mut d: f64 = 0.0;
    let (mut i, mut j) = (0, 0);
    while i < n1 && j < n2 {
        let v = sa[i].min(sb[j]);
        while i < n1 && sa[i] <= v {
            i += 1;
        }
        while j < n2 && sb[j] <= v {
            j += 1;
        }
        let diff = (i as f64 / n1 as f64 - j as f64 / n2 as f64).abs();
        d = d.max(diff);
    }
    if d == 0.0 {
        return 1.0;
    }

    let en = ((n1 * n2) as f64 / (n1 + n2) as f64).sqrt();
    probks((en + 0.12 + 0.11 / en) * d)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn test_percentile_and_iqr() {
        let values = [4.0, 1.0, 3.0, 2.0, 5.0];
        assert_eq!(percentile(&values, 0.5), 3.0);
        assert_eq!(percentile(&values, 0.25), 2.0);
        assert_eq!(iqr(&values), 2.0);
        assert_eq!(iqr(&[1.0, 2.0]), 0.5);
        assert_eq!(iqr(&[7.0]), 0.0);
        assert_eq!(iqr(&[]), 0.0);
    }

    #[test]
    fn test_erfc_reference_points() {
        assert!(close(erfc(0.0), 1.0, 1e-6));
        assert!(close(erfc(1.0), 0.157_299_2, 1e-6));
        assert!(close(erfc(-1.0), 1.842_700_8, 1e-6));
        assert!(close(normal_cdf(1.959_964), 0.975, 1e-5));
    }

    #[test]
    fn test_mann_whitney_identical_and_separated() {
        let ones = vec![1.0; 10];
        let twos = vec![2.0; 10];
        assert_eq!(mann_whitney_u(&ones, &ones), 1.0);
        let p = mann_whitney_u(&ones, &twos);
        assert!(p < 1e-4, "p = {}", p);
        // order of arguments does not matter
        assert!(close(p, mann_whitney_u(&twos, &ones), 1e-12));
    }

    #[test]
    fn test_mann_whitney_interleaved() {
        let a: Vec<f64> = (0..10).map(|i| i as f64 * 2.0).collect();
        let b: Vec<f64> = (0..10).map(|i| i as f64 * 2.0 + 1.0).collect();
        assert!(mann_whitney_u(&a, &b) > 0.5);
    }

    #[test]
    fn test_kolmogorov_smirnov() {
        let ones = vec![1.0; 10];
        let twos = vec![2.0; 10];
        assert_eq!(kolmogorov_smirnov(&ones, &ones), 1.0);
        assert!(kolmogorov_smirnov(&ones, &twos) < 1e-4);
        // ties within one sample do not inflate the statistic
        assert_eq!(kolmogorov_smirnov(&[1.0, 1.0, 1.0], &[1.0]), 1.0);
    }
}
