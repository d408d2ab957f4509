// Counting-process (start, end, status) data: risk-set membership over
// intervals and agreement with the censored layout where the two coincide.

use approx::assert_relative_eq;
use coxboost::{
    compute_sort_order, Bag, ConfigurationError, CoxDataset, CoxError, CoxParams, CoxPh,
    LayoutKind, NodeTable, TieMethod,
};
use ndarray::{array, s, Array1, Array2};

struct Fixture {
    response: Array2<f64>,
    sorted: Array2<usize>,
    strata: Array1<usize>,
}

impl Fixture {
    fn new(response: Array2<f64>, strata: Array1<usize>) -> Self {
        let sorted = compute_sort_order(response.view(), strata.view());
        Fixture {
            response,
            sorted,
            strata,
        }
    }

    fn single_stratum(response: Array2<f64>) -> Self {
        let n = response.nrows();
        Fixture::new(response, Array1::zeros(n))
    }

    fn model(&self, ties: TieMethod) -> CoxPh<'_> {
        CoxPh::create(CoxParams {
            response: self.response.view(),
            sorted: self.sorted.view(),
            strata: self.strata.view(),
            tie_method: Some(ties.as_str()),
            prior_coefficient_variation: 0.0,
        })
        .unwrap()
    }
}

/// Subject A split into (0, 5] censored and (5, 9] with an event, plus
/// subjects observed before, during and after A's follow-up.
fn split_subject_fixture() -> Fixture {
    Fixture::single_stratum(array![
        [0.0, 5.0, 0.0],
        [5.0, 9.0, 1.0],
        [-2.0, -1.0, 1.0],
        [0.0, 3.0, 1.0],
        [0.0, 7.0, 1.0],
        [9.0, 12.0, 1.0]
    ])
}

// ============================================================================
// Risk-set membership
// ============================================================================

#[test]
fn test_split_subject_is_at_risk_once_between_zero_and_nine() {
    let fixture = split_subject_fixture();
    let model = fixture.model(TieMethod::Breslow);
    assert_eq!(model.layout_kind(), LayoutKind::Counting);

    let f = Array1::zeros(6);
    let table = model.risk_table(&CoxDataset::new(6), &Bag::full(6), &f);
    let at_risk: Vec<(f64, usize)> = table.iter().map(|e| (e.time, e.n_at_risk)).collect();
    assert_eq!(
        at_risk,
        vec![(-1.0, 1), (3.0, 3), (7.0, 2), (9.0, 1), (12.0, 1)]
    );
    // Exactly one of A's rows counts toward S0 at t = 3.
    assert_relative_eq!(table[1].risk_set_sum, 3.0, epsilon = 1e-12);
}

#[test]
fn test_split_subject_matches_single_interval() {
    let split = split_subject_fixture();
    let merged = Fixture::single_stratum(array![
        [0.0, 9.0, 1.0],
        [-2.0, -1.0, 1.0],
        [0.0, 3.0, 1.0],
        [0.0, 7.0, 1.0],
        [9.0, 12.0, 1.0]
    ]);
    let f_split = array![0.4, 0.4, -0.3, 1.1, 0.0, -0.8];
    let f_merged = array![0.4, -0.3, 1.1, 0.0, -0.8];

    for ties in [TieMethod::Breslow, TieMethod::Efron] {
        let split_model = split.model(ties);
        let merged_model = merged.model(ties);

        let (data_split, bag_split) = (CoxDataset::new(6), Bag::full(6));
        let (data_merged, bag_merged) = (CoxDataset::new(5), Bag::full(5));

        // Deviance is normalised by row count, so compare log-likelihoods.
        let ll_split = -split_model.deviance(&data_split, &bag_split, &f_split) * 6.0 / 2.0;
        let ll_merged = -merged_model.deviance(&data_merged, &bag_merged, &f_merged) * 5.0 / 2.0;
        assert_relative_eq!(ll_split, ll_merged, epsilon = 1e-12);

        let mut r_split = Array1::zeros(6);
        split_model.compute_working_response(&data_split, &bag_split, &f_split, &mut r_split);
        let mut r_merged = Array1::zeros(5);
        merged_model.compute_working_response(&data_merged, &bag_merged, &f_merged, &mut r_merged);

        assert_relative_eq!(r_split[0] + r_split[1], r_merged[0], epsilon = 1e-12);
        for (a, b) in r_split.slice(s![2..]).iter().zip(r_merged.slice(s![1..]).iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }
}

#[test]
fn test_counting_from_origin_matches_censored() {
    let censored = Fixture::new(
        array![
            [1.0, 1.0],
            [2.0, 1.0],
            [2.0, 1.0],
            [3.0, 0.0],
            [4.0, 1.0],
            [2.0, 1.0],
            [5.0, 0.0]
        ],
        array![0usize, 0, 0, 0, 0, 1, 1],
    );
    let counting = Fixture::new(
        array![
            [0.0, 1.0, 1.0],
            [0.0, 2.0, 1.0],
            [0.0, 2.0, 1.0],
            [0.0, 3.0, 0.0],
            [0.0, 4.0, 1.0],
            [0.0, 2.0, 1.0],
            [0.0, 5.0, 0.0]
        ],
        array![0usize, 0, 0, 0, 0, 1, 1],
    );
    let f = array![0.5, -0.25, 0.0, 1.5, -1.0, 0.3, 0.1];
    let data = CoxDataset::new(7);
    let bag = Bag::full(7);

    for ties in [TieMethod::Breslow, TieMethod::Efron] {
        let a = censored.model(ties);
        let b = counting.model(ties);
        assert_relative_eq!(
            a.deviance(&data, &bag, &f),
            b.deviance(&data, &bag, &f),
            epsilon = 1e-12
        );

        let mut ra = Array1::zeros(7);
        let mut rb = Array1::zeros(7);
        a.compute_working_response(&data, &bag, &f, &mut ra);
        b.compute_working_response(&data, &bag, &f, &mut rb);
        for (x, y) in ra.iter().zip(rb.iter()) {
            assert_relative_eq!(*x, *y, epsilon = 1e-12);
        }

        let mut ta = NodeTable::new(vec![0, 1, 0, 1, 0, 1, 0], 2);
        let mut tb = ta.clone();
        a.fit_best_constant(&data, &bag, &f, 2, &ra, &mut ta);
        b.fit_best_constant(&data, &bag, &f, 2, &rb, &mut tb);
        for (x, y) in ta.predictions().iter().zip(tb.predictions().iter()) {
            assert_relative_eq!(*x, *y, epsilon = 1e-10);
        }
    }
}

#[test]
fn test_row_starting_at_event_time_is_not_at_risk() {
    // Intervals are open on the left: the row on (2, 6] misses the event at 2.
    let fixture =
        Fixture::single_stratum(array![[0.0, 2.0, 1.0], [2.0, 6.0, 0.0], [0.0, 6.0, 0.0]]);
    let model = fixture.model(TieMethod::Efron);
    let (data, bag, f) = (CoxDataset::new(3), Bag::full(3), Array1::zeros(3));
    let table = model.risk_table(&data, &bag, &f);
    assert_eq!(table.len(), 1);
    assert_eq!(table[0].n_at_risk, 2);

    let mut residuals = Array1::zeros(3);
    model.compute_working_response(&data, &bag, &f, &mut residuals);
    assert_relative_eq!(residuals[1], 0.0, epsilon = 1e-12);
    assert_relative_eq!(residuals[2], -0.5, epsilon = 1e-12);
}

// ============================================================================
// Widely spread scores
// ============================================================================

/// A censored row on (4, 5] whose score sits `gap` above two rows on (0, 3],
/// one of them an event. The high row leaves before the event at t = 3, so
/// the whole stratum's centering shift comes from a row outside that risk set.
fn dominant_exit_fixture() -> Fixture {
    Fixture::single_stratum(array![[4.0, 5.0, 0.0], [0.0, 3.0, 1.0], [0.0, 3.0, 0.0]])
}

#[test]
fn test_risk_set_survives_exit_of_dominant_row() {
    let fixture = dominant_exit_fixture();
    let data = CoxDataset::new(3);
    let bag = Bag::full(3);

    for gap in [30.0, 40.0, 300.0] {
        let f = array![gap, 0.0, 0.0];
        for ties in [TieMethod::Breslow, TieMethod::Efron] {
            let model = fixture.model(ties);

            let table = model.risk_table(&data, &bag, &f);
            assert_eq!(table.len(), 1);
            assert_eq!(table[0].n_at_risk, 2);
            assert_relative_eq!(table[0].risk_set_sum, 2.0, max_relative = 1e-12);

            // One event against two equal risks: log PL = -ln 2 over 3 rows.
            let deviance = model.deviance(&data, &bag, &f);
            assert_relative_eq!(deviance, 2.0 * 2.0_f64.ln() / 3.0, max_relative = 1e-9);

            let mut residuals = Array1::zeros(3);
            model.compute_working_response(&data, &bag, &f, &mut residuals);
            assert_relative_eq!(residuals[0], 0.0, epsilon = 1e-12);
            assert_relative_eq!(residuals[1], 0.5, epsilon = 1e-12);
            assert_relative_eq!(residuals[2], -0.5, epsilon = 1e-12);
        }
    }
}

#[test]
fn test_leaf_steps_survive_exit_of_dominant_row() {
    let fixture = dominant_exit_fixture();
    let data = CoxDataset::new(3);
    let bag = Bag::full(3);
    let model = fixture.model(TieMethod::Efron);

    for gap in [30.0, 40.0, 300.0] {
        let f = array![gap, 0.0, 0.0];
        let mut residuals = Array1::zeros(3);
        model.compute_working_response(&data, &bag, &f, &mut residuals);

        // The dominant row shares node 1 with the censored row at risk at t = 3,
        // so node 1's risk must drop to that row's alone once it leaves.
        let mut tree = NodeTable::new(vec![1, 0, 1], 2);
        let report = model.fit_best_constant(&data, &bag, &f, 2, &residuals, &mut tree);
        assert_eq!(report.fitted_nodes, 2);
        assert_relative_eq!(tree.predictions()[0], 2.0, max_relative = 1e-9);
        assert_relative_eq!(tree.predictions()[1], -2.0, max_relative = 1e-9);
    }
}

#[test]
fn test_late_event_after_large_early_hazard() {
    // The early event at t = 3 sees only a low-score row, so its hazard step
    // is huge on the stratum's scale. The late row must not inherit it.
    let fixture = Fixture::single_stratum(array![[4.0, 5.0, 1.0], [0.0, 3.0, 1.0]]);
    let data = CoxDataset::new(2);
    let bag = Bag::full(2);

    for gap in [30.0, 40.0, 300.0] {
        let f = array![gap, 0.0];
        for ties in [TieMethod::Breslow, TieMethod::Efron] {
            let model = fixture.model(ties);
            assert_relative_eq!(model.deviance(&data, &bag, &f), 0.0, epsilon = 1e-9);

            let mut residuals = Array1::zeros(2);
            model.compute_working_response(&data, &bag, &f, &mut residuals);
            assert_relative_eq!(residuals[0], 0.0, epsilon = 1e-12);
            assert_relative_eq!(residuals[1], 0.0, epsilon = 1e-12);
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_start_after_end_is_rejected() {
    let response = array![[0.0, 2.0, 1.0], [4.0, 3.0, 0.0]];
    let strata = Array1::zeros(2);
    let sorted = array![[0usize, 0], [1, 1]];
    let err = CoxPh::create(CoxParams {
        response: response.view(),
        sorted: sorted.view(),
        strata: strata.view(),
        tie_method: Some("breslow"),
        prior_coefficient_variation: 0.0,
    })
    .unwrap_err();
    assert!(matches!(
        err,
        CoxError::InvalidConfiguration(ConfigurationError::StartAfterEnd { row: 1, .. })
    ));
}

#[test]
fn test_start_order_must_be_sorted() {
    let fixture = split_subject_fixture();
    let mut sorted = fixture.sorted.clone();
    let first = sorted[[0, 0]];
    sorted[[0, 0]] = sorted[[5, 0]];
    sorted[[5, 0]] = first;
    let err = CoxPh::create(CoxParams {
        response: fixture.response.view(),
        sorted: sorted.view(),
        strata: fixture.strata.view(),
        tie_method: Some("efron"),
        prior_coefficient_variation: 0.0,
    })
    .unwrap_err();
    assert!(matches!(
        err,
        CoxError::InvalidConfiguration(ConfigurationError::UnsortedOrder { column: "start", .. })
    ));
}
