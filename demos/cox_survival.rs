// Cox Boosting Example
//
// Fits a boosted Cox model to synthetic right-censored data whose hazard
// depends on the first two features, then inspects the loss directly through
// `CoxPh` on a counting-process version of the same kind of data.
//
// Run with: RUST_LOG=info cargo run --example cox_survival

use coxboost::{
    compute_sort_order, Bag, BoostingConfig, CoxBoost, CoxConfig, CoxDataset, CoxParams, CoxPh,
    TieMethod,
};
use ndarray::{array, Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn main() -> coxboost::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("=== Cox Proportional Hazards Boosting Example ===\n");

    let n_samples = 500;
    let n_features = 4;
    let mut rng = StdRng::seed_from_u64(2024);

    let x = Array2::from_shape_fn((n_samples, n_features), |_| rng.random::<f64>());
    let mut response = Array2::zeros((n_samples, 2));
    for i in 0..n_samples {
        // True log hazard: 1.5·x0 − 1.0·x1
        let log_hazard = 1.5 * x[[i, 0]] - 1.0 * x[[i, 1]];
        let u: f64 = rng.random_range(1e-9..1.0);
        let event_time = -u.ln() / log_hazard.exp();
        let censor_time = rng.random_range(0.0..4.0);
        response[[i, 0]] = event_time.min(censor_time);
        response[[i, 1]] = if event_time <= censor_time { 1.0 } else { 0.0 };
    }
    let n_events = response.column(1).sum() as usize;
    println!(
        "Dataset: {} samples, {} features, {} events ({:.1}% censored)\n",
        n_samples,
        n_features,
        n_events,
        100.0 * (n_samples - n_events) as f64 / n_samples as f64
    );

    let mut config = BoostingConfig::new(CoxConfig::new(TieMethod::Efron).with_prior(1.0));
    config.n_trees = 150;
    config.shrinkage = 0.05;
    config.train_fraction = 0.8;
    config.seed = Some(7);
    config.verbose_eval = 25;

    let mut model = CoxBoost::new(config);
    model.fit(&x, &response, None, None)?;

    if let (Some(first), Some(last)) = (model.history.first(), model.history.last()) {
        println!(
            "\nTraining deviance: {:.4} -> {:.4}",
            first.train_deviance, last.train_deviance
        );
    }
    if let Some(best) = model.best_val_loss_itr() {
        println!("Best validation iteration: {}", best);
    }

    let profiles = array![[0.9, 0.1, 0.5, 0.5], [0.5, 0.5, 0.5, 0.5], [0.1, 0.9, 0.5, 0.5]];
    let scores = model.predict(&profiles);
    println!("\nLog relative hazard for high / average / low risk profiles:");
    for (label, score) in ["high", "average", "low"].iter().zip(scores.iter()) {
        println!("  {:>8}: {:+.3}", label, score);
    }

    // ------------------------------------------------------------------
    // Using the loss directly on counting-process data
    // ------------------------------------------------------------------
    println!("\n=== Risk sets for start-stop data ===\n");

    let intervals = array![
        [0.0, 5.0, 0.0],
        [5.0, 9.0, 1.0],
        [0.0, 3.0, 1.0],
        [0.0, 7.0, 1.0],
        [9.0, 12.0, 1.0]
    ];
    let strata = Array1::zeros(intervals.nrows());
    let sorted = compute_sort_order(intervals.view(), strata.view());
    let loss = CoxPh::create(CoxParams {
        response: intervals.view(),
        sorted: sorted.view(),
        strata: strata.view(),
        tie_method: Some("breslow"),
        prior_coefficient_variation: 0.0,
    })?;

    let n = intervals.nrows();
    let data = CoxDataset::new(n);
    let bag = Bag::full(n);
    let f = Array1::zeros(n);
    println!("{:>6} {:>8} {:>7}", "time", "at risk", "events");
    for event in loss.risk_table(&data, &bag, &f) {
        println!("{:>6.1} {:>8} {:>7}", event.time, event.n_at_risk, event.n_events);
    }

    let mut residuals = Array1::zeros(n);
    loss.compute_working_response(&data, &bag, &f, &mut residuals);
    println!("\nMartingale residuals: {:.3}", residuals);
    println!("Deviance at f = 0: {:.4}", loss.deviance(&data, &bag, &f));

    Ok(())
}
