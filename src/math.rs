use ndarray::{Array, Array1, Dimension};

/// Square every element of an array
///
/// Used to turn transformation coefficients and their standard deviations into the
/// weights of a first-order variance propagation.
///
/// # Examples
///
/// ```
/// use parasitemia_correction::math::squared;
/// use ndarray::arr2;
///
/// let matrix = arr2(&[[1., -2.], [0.5, 3.]]);
/// assert_eq!(squared(&matrix), arr2(&[[1., 4.], [0.25, 9.]]));
/// ```
#[must_use]
pub fn squared<D: Dimension>(values: &Array<f64, D>) -> Array<f64, D> {
    values.mapv(|value| value * value)
}

/// Replace every negative element of `values` with zero, in place
///
/// Counts are physical quantities; a linear correction applied to sparse or noisy data can
/// overshoot below zero.
///
/// # Examples
///
/// ```
/// use parasitemia_correction::math::clamp_negative;
/// use ndarray::arr1;
///
/// let mut counts = arr1(&[3., -0.5, 0., 2.]);
/// clamp_negative(&mut counts);
/// assert_eq!(counts, arr1(&[3., 0., 0., 2.]));
/// ```
pub fn clamp_negative(values: &mut Array1<f64>) {
    values.mapv_inplace(|value| if value < 0. { 0. } else { value });
}

/// Sum the elements of `values` at the positions in `ids`
///
/// # Panics
///
/// Panics if any id is out of bounds for `values`. Class groups are validated when a
/// corrector is built, so this only happens on a caller supplied vector of the wrong length.
///
/// # Examples
///
/// ```
/// use parasitemia_correction::math::group_sum;
/// use ndarray::arr1;
///
/// let counts = arr1(&[100., 5., 2., 1., 0., 3., 7.]);
/// assert_eq!(group_sum(&counts, &[1, 2, 3]), 8.);
/// ```
#[must_use]
pub fn group_sum(values: &Array1<f64>, ids: &[usize]) -> f64 {
    ids.iter().map(|&id| values[id]).sum()
}

/// Two-sided interval `[max(0, estimate - bound), estimate + bound]`
///
/// Parasitemia cannot be negative so the lower edge is clamped at zero. The upper edge is
/// left unclamped.
///
/// # Examples
///
/// ```
/// use parasitemia_correction::math::interval;
///
/// assert_eq!(interval(4.0, 1.5), [2.5, 5.5]);
/// assert_eq!(interval(0.5, 1.0), [0.0, 1.5]);
/// ```
#[must_use]
pub fn interval(estimate: f64, bound: f64) -> [f64; 2] {
    [(estimate - bound).max(0.), estimate + bound]
}

#[cfg(test)]
mod tests {
    use super::{clamp_negative, group_sum, interval, squared};

    use itertools::Itertools;
    use ndarray::Array;
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::{rand::Rng, RandomExt};
    use rand_isaac::isaac64::Isaac64Rng;

    #[test]
    fn squared_matrices_are_generated_elementwise() {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let n = usize::from(rng.gen::<u8>() % 16) + 1;
        let matrix = Array::random_using((n, n), Uniform::new(-10., 10.), &mut rng);

        let squared = squared(&matrix);

        for ii in 0..n {
            for jj in 0..n {
                approx::assert_relative_eq!(squared[[ii, jj]], matrix[[ii, jj]].powi(2));
            }
        }
    }

    #[test]
    fn clamping_only_touches_negative_elements() {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let original = Array::random_using(64, Uniform::new(-5., 5.), &mut rng);

        let mut clamped = original.clone();
        clamp_negative(&mut clamped);

        for (before, after) in original.iter().zip(clamped.iter()) {
            if *before < 0. {
                assert_eq!(*after, 0.);
            } else {
                assert_eq!(after, before);
            }
        }
    }

    #[test]
    fn group_sums_add_every_selected_element_once() {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let values = Array::random_using(7, Uniform::new(0., 100.), &mut rng);

        for ids in (0..7).combinations(3) {
            let expected: f64 = ids.iter().map(|&id| values[id]).sum();
            approx::assert_relative_eq!(group_sum(&values, &ids), expected);
        }
        assert_eq!(group_sum(&values, &[]), 0.);
    }

    #[test]
    fn interval_lower_edge_never_drops_below_zero() {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);

        for _ in 0..1000 {
            let estimate = rng.gen_range(0.0..10.0);
            let bound = rng.gen_range(0.0..10.0);
            let [lower, upper] = interval(estimate, bound);

            assert!(lower >= 0.);
            approx::assert_relative_eq!(lower, (estimate - bound).max(0.));
            approx::assert_relative_eq!(upper, estimate + bound);
        }
    }
}
