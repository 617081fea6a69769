use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared between a caller and a running scan
/// or search. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Sum of all bins of a histogram.
pub fn histogram_sum(hist: &[f64]) -> f64 {
    hist.iter().sum()
}

/// Sum of squared bin differences `Σ (target - simulated)²`.
pub fn squared_error(target: &[f64], simulated: &[f64]) -> f64 {
    debug_assert_eq!(target.len(), simulated.len());
    target
        .iter()
        .zip(simulated.iter())
        .map(|(&t, &s)| {
            let d = t - s;
            d * d
        })
        .sum()
}

/// Index of the largest bin (first one on ties), `None` for an empty slice.
pub fn argmax(hist: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, &v) in hist.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((idx, v)),
        }
    }
    best.map(|(idx, _)| idx)
}
