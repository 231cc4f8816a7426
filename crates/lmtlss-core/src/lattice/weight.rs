//! Weight Algebra: pure, value-typed arithmetic over a six-dimensional
//! weight vector. Every operation returns a new vector; inputs are never
//! mutated. All components saturate into `[0.0, 1.0]` via `f64::clamp`.

use serde::{Deserialize, Serialize};

/// Default per-hour salience decay rate.
pub const DEFAULT_LAMBDA_SALIENCE: f64 = 0.01;
/// Default per-hour arousal decay rate.
pub const DEFAULT_LAMBDA_AROUSAL: f64 = 0.02;

/// A six-dimensional belief weight, each component clamped to `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    pub salience: f64,
    pub valence: f64,
    pub arousal: f64,
    pub commitment: f64,
    pub uncertainty: f64,
    pub resonance: f64,
}

impl Default for WeightVector {
    fn default() -> Self {
        Self {
            salience: 0.0,
            valence: 0.0,
            arousal: 0.0,
            commitment: 0.0,
            uncertainty: 0.0,
            resonance: 0.0,
        }
    }
}

impl WeightVector {
    /// Construct a vector with every supplied component clamped to
    /// `[0.0, 1.0]`; unsupplied components use the default (0.0).
    #[must_use]
    pub fn new(
        salience: f64,
        valence: f64,
        arousal: f64,
        commitment: f64,
        uncertainty: f64,
        resonance: f64,
    ) -> Self {
        Self {
            salience: salience.clamp(0.0, 1.0),
            valence: valence.clamp(0.0, 1.0),
            arousal: arousal.clamp(0.0, 1.0),
            commitment: commitment.clamp(0.0, 1.0),
            uncertainty: uncertainty.clamp(0.0, 1.0),
            resonance: resonance.clamp(0.0, 1.0),
        }
    }

    /// Clamp every component into `[0.0, 1.0]`.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            salience: self.salience.clamp(0.0, 1.0),
            valence: self.valence.clamp(0.0, 1.0),
            arousal: self.arousal.clamp(0.0, 1.0),
            commitment: self.commitment.clamp(0.0, 1.0),
            uncertainty: self.uncertainty.clamp(0.0, 1.0),
            resonance: self.resonance.clamp(0.0, 1.0),
        }
    }
}

/// `commitment += 0.1`, `salience += 0.1`, `uncertainty -= 0.1`, saturating.
#[must_use]
pub fn reinforce(w: WeightVector) -> WeightVector {
    WeightVector {
        commitment: (w.commitment + 0.1).clamp(0.0, 1.0),
        salience: (w.salience + 0.1).clamp(0.0, 1.0),
        uncertainty: (w.uncertainty - 0.1).clamp(0.0, 1.0),
        ..w
    }
}

/// `commitment -= 0.3`, `salience -= 0.1`, `uncertainty += 0.3`, saturating.
#[must_use]
pub fn contradict(w: WeightVector) -> WeightVector {
    WeightVector {
        commitment: (w.commitment - 0.3).clamp(0.0, 1.0),
        salience: (w.salience - 0.1).clamp(0.0, 1.0),
        uncertainty: (w.uncertainty + 0.3).clamp(0.0, 1.0),
        ..w
    }
}

/// Per-hour multiplicative decay of `salience` and `arousal`; `commitment`
/// and `resonance` are untouched (they are monotone non-increasing only via
/// [`contradict`], never via time).
#[must_use]
pub fn decay(w: WeightVector, dt_hours: f64, lambda_salience: f64, lambda_arousal: f64) -> WeightVector {
    WeightVector {
        salience: (w.salience * (1.0 - lambda_salience * dt_hours)).clamp(0.0, 1.0),
        arousal: (w.arousal * (1.0 - lambda_arousal * dt_hours)).clamp(0.0, 1.0),
        ..w
    }
}

/// Promotion predicate: `commitment ≥ 0.7 ∧ uncertainty ≤ 0.3`.
#[must_use]
pub fn capsule_promotion(w: WeightVector) -> bool {
    w.commitment >= 0.7 && w.uncertainty <= 0.3
}

/// `resonance = min(1, resonance + 0.05 * hits)`.
#[must_use]
pub fn update_resonance(w: WeightVector, hits: u32) -> WeightVector {
    WeightVector {
        resonance: (w.resonance + 0.05 * f64::from(hits)).clamp(0.0, 1.0),
        ..w
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn reinforce_moves_components_as_specified() {
        let w = WeightVector::new(0.5, 0.0, 0.0, 0.5, 0.5, 0.0);
        let r = reinforce(w);
        assert!(approx(r.commitment, 0.6));
        assert!(approx(r.salience, 0.6));
        assert!(approx(r.uncertainty, 0.4));
    }

    #[test]
    fn contradict_moves_components_as_specified() {
        let w = WeightVector::new(0.5, 0.0, 0.0, 0.5, 0.5, 0.0);
        let c = contradict(w);
        assert!(approx(c.commitment, 0.2));
        assert!(approx(c.salience, 0.4));
        assert!(approx(c.uncertainty, 0.8));
    }

    #[test]
    fn saturates_at_upper_bound_under_repeated_reinforce() {
        let mut w = WeightVector::new(0.95, 0.0, 0.0, 0.95, 0.05, 0.0);
        for _ in 0..10 {
            w = reinforce(w);
        }
        assert!(approx(w.commitment, 1.0));
        assert!(approx(w.salience, 1.0));
        assert!(approx(w.uncertainty, 0.0));
    }

    #[test]
    fn saturates_at_lower_bound_under_repeated_contradict() {
        let mut w = WeightVector::new(0.05, 0.0, 0.0, 0.05, 0.95, 0.0);
        for _ in 0..10 {
            w = contradict(w);
        }
        assert!(approx(w.commitment, 0.0));
        assert!(approx(w.salience, 0.0));
        assert!(approx(w.uncertainty, 1.0));
    }

    #[test]
    fn decay_reduces_salience_and_arousal_only() {
        let w = WeightVector::new(1.0, 0.5, 1.0, 0.8, 0.1, 0.5);
        let d = decay(w, 1.0, DEFAULT_LAMBDA_SALIENCE, DEFAULT_LAMBDA_AROUSAL);
        assert!(approx(d.salience, 0.99));
        assert!(approx(d.arousal, 0.98));
        assert!(approx(d.commitment, 0.8));
        assert!(approx(d.resonance, 0.5));
        assert!(approx(d.valence, 0.5));
    }

    #[test]
    fn capsule_promotion_predicate_boundaries() {
        assert!(capsule_promotion(WeightVector::new(0.0, 0.0, 0.0, 0.7, 0.3, 0.0)));
        assert!(!capsule_promotion(WeightVector::new(0.0, 0.0, 0.0, 0.69, 0.3, 0.0)));
        assert!(!capsule_promotion(WeightVector::new(0.0, 0.0, 0.0, 0.7, 0.31, 0.0)));
    }

    #[test]
    fn update_resonance_caps_at_one() {
        let w = WeightVector::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.9);
        let updated = update_resonance(w, 10);
        assert!(approx(updated.resonance, 1.0));
    }

    #[test]
    fn new_clamps_out_of_range_inputs() {
        let w = WeightVector::new(1.5, -0.5, 2.0, -1.0, 0.5, 0.5);
        assert!(approx(w.salience, 1.0));
        assert!(approx(w.valence, 0.0));
        assert!(approx(w.arousal, 1.0));
        assert!(approx(w.commitment, 0.0));
    }

    #[test]
    fn operations_do_not_mutate_input() {
        let w = WeightVector::new(0.5, 0.5, 0.5, 0.5, 0.5, 0.5);
        let _ = reinforce(w);
        assert!(approx(w.commitment, 0.5));
    }

    #[cfg(test)]
    mod proptests {
        use super::super::*;
        use proptest::prelude::*;

        fn any_weight() -> impl Strategy<Value = WeightVector> {
            (0.0f64..=1.0, 0.0f64..=1.0, 0.0f64..=1.0, 0.0f64..=1.0, 0.0f64..=1.0, 0.0f64..=1.0)
                .prop_map(|(s, v, a, c, u, r)| WeightVector::new(s, v, a, c, u, r))
        }

        proptest! {
            #[test]
            fn all_components_stay_in_unit_interval_after_arbitrary_ops(
                w in any_weight(),
                ops in proptest::collection::vec(0u8..4, 0..50),
                dt in 0.0f64..1000.0,
                hits in 0u32..100,
            ) {
                let mut cur = w;
                for op in ops {
                    cur = match op {
                        0 => reinforce(cur),
                        1 => contradict(cur),
                        2 => decay(cur, dt, DEFAULT_LAMBDA_SALIENCE, DEFAULT_LAMBDA_AROUSAL),
                        _ => update_resonance(cur, hits),
                    };
                    for component in [cur.salience, cur.valence, cur.arousal, cur.commitment, cur.uncertainty, cur.resonance] {
                        prop_assert!((0.0..=1.0).contains(&component));
                    }
                }
            }
        }
    }
}
