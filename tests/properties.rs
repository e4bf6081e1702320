use ndarray::{Array1, Array2};
use proptest::prelude::*;

use parasitemia_correction::math::interval;
use parasitemia_correction::{Compensator, Corrector, FitParameters, Taxonomy, Unit};

const RBC_IDS: [usize; 4] = [0, 1, 2, 3];
const PARASITE_IDS: [usize; 3] = [1, 2, 3];

fn corrector(matrix: Vec<f64>, matrix_std: Vec<f64>) -> Corrector {
    Corrector::new(
        Array2::from_shape_vec((7, 7), matrix).unwrap(),
        Array2::from_shape_vec((7, 7), matrix_std).unwrap(),
        RBC_IDS.to_vec(),
        PARASITE_IDS.to_vec(),
    )
    .unwrap()
}

fn counts() -> impl Strategy<Value = Array1<f64>> {
    prop::collection::vec(0.0f64..1e5, 7).prop_map(Array1::from)
}

proptest! {
    #[test]
    fn corrected_counts_are_never_negative(
        matrix in prop::collection::vec(-2.0f64..2.0, 49),
        raw in counts(),
    ) {
        let corrector = corrector(matrix, vec![0.; 49]);
        prop_assert!(corrector.correct(&raw).iter().all(|&count| count >= 0.));
    }

    #[test]
    fn parasitemia_is_zero_without_red_blood_cells(
        parasites in 0.0f64..1e6,
        other in 0.0f64..1e6,
    ) {
        // Parasites that are not counted towards the red blood cell population
        let corrector = Corrector::new(
            Array2::eye(3),
            Array2::zeros((3, 3)),
            vec![0],
            vec![1],
        )
        .unwrap();
        let counts = Array1::from(vec![0., parasites, other]);
        prop_assert_eq!(corrector.parasitemia(&counts), 0.);
    }

    #[test]
    fn intervals_clamp_only_the_lower_edge(estimate in 0.0f64..100.0, bound in 0.0f64..100.0) {
        let [lower, upper] = interval(estimate, bound);
        prop_assert!(lower >= 0.);
        prop_assert_eq!(lower, (estimate - bound).max(0.));
        prop_assert_eq!(upper, estimate + bound);
    }

    #[test]
    fn rule_of_three_is_independent_of_the_error_matrix(
        matrix_std in prop::collection::vec(0.0f64..1.0, 49),
        healthy in 1.0f64..1e5,
        others in prop::collection::vec(0.0f64..1e3, 3),
    ) {
        let corrector = corrector(Array2::<f64>::eye(7).into_raw_vec(), matrix_std);
        let raw = Array1::from(vec![healthy, 0., 0., 0., others[0], others[1], others[2]]);

        let estimate = corrector.estimate(&raw, Unit::Percent);

        prop_assert_eq!(estimate.parasitemia, 0.);
        prop_assert!((estimate.bound - 300. / healthy).abs() <= 1e-12 * estimate.bound);
    }

    #[test]
    fn unit_conversion_is_a_linear_scale(
        matrix_std in prop::collection::vec(0.0f64..0.01, 49),
        raw in counts(),
    ) {
        let corrector = corrector(Array2::<f64>::eye(7).into_raw_vec(), matrix_std);

        let percent = corrector.estimate(&raw, Unit::Percent);
        let density = corrector.estimate(&raw, Unit::PerMicrolitre);

        let tolerance = 1e-12 * percent.parasitemia.abs().max(1e-300);
        prop_assert!(
            (density.parasitemia / Unit::PerMicrolitre.scale() - percent.parasitemia / 100.).abs()
                <= tolerance
        );
    }

    #[test]
    fn aggregate_compensation_round_trips_through_counts(
        slope in 0.5f64..2.0,
        intercept in 0.0f64..1e-3,
        percent in 0.0f64..20.0,
        total_cells in 1e3f64..1e6,
    ) {
        let fit = FitParameters { slope, intercept, slope_std: 0.01, intercept_std: 1e-5 };
        let compensator = Compensator::from_fit(fit, &Taxonomy::yogo()).unwrap();

        let estimate = compensator.bound_and_estimate_from_parasitemia(
            percent,
            total_cells,
            Unit::Percent,
            Unit::Percent,
        );
        let rederived = 100. * compensator.corrector().parasitemia(&estimate.corrected_counts);

        prop_assert!((estimate.parasitemia - rederived).abs() <= 1e-9 * rederived.max(1e-12));
        prop_assert!(estimate.interval()[0] >= 0.);
    }
}
