//! Potential quantiles of a simulated interactive regression model
//! =================================================================
//! Estimate the quartiles of the treated potential outcome `Y(1)` with
//! nested cross-fitting, then bootstrap a joint confidence interval for
//! the median. The median of `Y(1)` is 0.5 by construction.
//!
//! ```bash
//! cargo run --release --example potential_quantiles
//! ```

use debiased::datasets::make_irm_data;
use debiased::learner::LogisticRegression;
use debiased::{BootstrapMethod, DoubleMLPQ, PqConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    let mut rng = StdRng::seed_from_u64(3141);
    let data = make_irm_data(0.5, 1000, 20, 0.5, 0.5, &mut rng)?;

    for quantile in [0.25, 0.5, 0.75] {
        let config = PqConfig::default().set_quantile(quantile).set_n_rep(3);
        let mut pq = DoubleMLPQ::new(
            data.clone(),
            LogisticRegression::default(),
            LogisticRegression::default(),
            config,
        )?;
        pq.fit()?;
        println!("Quantile {:.2} of Y(1)", quantile);
        println!("{}\n", pq.summary()?);

        if quantile == 0.5 {
            pq.bootstrap(BootstrapMethod::Normal, 1000, 42)?;
            let (lo, hi) = pq.confint(0.95, true)?;
            println!("Bootstrap 95% interval for the median: [{:.4}, {:.4}]", lo, hi);
        }
    }
    Ok(())
}
