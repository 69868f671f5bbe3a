//! Utility functions shared by the analysis modules.
use std::cmp::Ordering;

/// Compare two floats which are known not to be NaN.
pub fn cmp_f64(a: &f64, b: &f64) -> Ordering {
    a.partial_cmp(b).unwrap_or(Ordering::Equal)
}

/// Sort a vector of floats (in-place), assuming no NaN values.
pub fn sort_in(z: &mut [f64]) {
    z.sort_by(cmp_f64);
}

/// Returns the mean of the slice z, or zero if it is empty.
pub fn mean(z: &[f64]) -> f64 {
    if z.is_empty() {
        return 0.0;
    }
    z.iter().sum::<f64>() / z.len() as f64
}

/// Returns the position of the largest value, the first one in case of ties.
pub fn argmax(z: &[f64]) -> Option<usize> {
    z.iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &zi)| match best {
            Some((_, max)) if zi <= max => best,
            _ => Some((i, zi)),
        })
        .map(|(i, _)| i)
}

/// Returns the q-th quantile of the data, interpolating linearly between the two nearest order statistics.
/// Returns `None` if the data is empty.
pub fn quantile(data: &[f64], q: f64) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    let mut sorted = data.to_vec();
    sort_in(&mut sorted);

    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + frac * (sorted[hi] - sorted[lo]))
}

/// Returns the slope of the least-squares line y = a x + b.
/// Returns `None` if there are less than two points or if x has no spread.
pub fn linear_fit_slope(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let x_mean = mean(x);
    let y_mean = mean(y);

    let (sxy, sxx) = x
        .iter()
        .zip(y.iter())
        .fold((0.0, 0.0), |(sxy, sxx), (xi, yi)| {
            (
                sxy + (xi - x_mean) * (yi - y_mean),
                sxx + (xi - x_mean) * (xi - x_mean),
            )
        });

    if sxx <= 0.0 {
        return None;
    }
    Some(sxy / sxx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_quantile() {
        assert_eq!(quantile(&[], 0.5), None);
        assert_relative_eq!(quantile(&[3.0], 0.35).unwrap(), 3.0);
        assert_relative_eq!(quantile(&[4.0, 1.0, 3.0, 2.0], 0.0).unwrap(), 1.0);
        assert_relative_eq!(quantile(&[4.0, 1.0, 3.0, 2.0], 1.0).unwrap(), 4.0);
        assert_relative_eq!(quantile(&[4.0, 1.0, 3.0, 2.0], 0.5).unwrap(), 2.5);
        // position 0.35 * 9 = 3.15 between 3.0 and 4.0
        let data: Vec<f64> = (0..10).map(|i| i as f64).collect();
        assert_relative_eq!(quantile(&data, 0.35).unwrap(), 3.15, epsilon = 1e-12);
    }

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(&[1.0, 3.0, 2.0, 3.0]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_linear_fit_slope() {
        let x = vec![0.0, 1.0, 2.0, 3.0];
        let y = vec![1.0, 3.0, 5.0, 7.0];
        assert_relative_eq!(linear_fit_slope(&x, &y).unwrap(), 2.0, epsilon = 1e-12);

        assert_eq!(linear_fit_slope(&[1.0, 1.0], &[2.0, 3.0]), None);
        assert_eq!(linear_fit_slope(&[1.0], &[2.0]), None);
    }
}
