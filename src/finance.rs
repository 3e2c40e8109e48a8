//! IRR estimation over a cash-value schedule
//!
//! Newton-Raphson with a fixed iteration cap. This is deliberately a
//! best-effort estimator, not a numerically robust solver: there is no
//! divergence or oscillation guard beyond the cap, and the last rate the
//! loop held is returned either way. Callers get a convergence tag so
//! non-converged estimates can carry a caveat.

use crate::models::CashValueEntry;
use serde::{Deserialize, Serialize};

const INITIAL_GUESS: f64 = 0.03;
const MAX_ITERATIONS: usize = 200;
const NPV_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Convergence {
    Converged,
    IterationCapReached,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct IrrEstimate {
    pub rate: f64,
    pub convergence: Convergence,
}

/// Estimate the internal rate of return for a cash-value schedule paid
/// with a fixed annual outflow.
///
/// Every period contributes `-annual_outflow`; the final period
/// additionally receives the last entry's cash value as a one-time
/// inflow. Returns `None` when the schedule is empty or the outflow is
/// not positive — "undetermined", not an error.
pub fn estimate_irr(cash_values: &[CashValueEntry], annual_outflow: f64) -> Option<IrrEstimate> {
    if cash_values.is_empty() || annual_outflow <= 0.0 {
        return None;
    }

    let mut flows = vec![-annual_outflow; cash_values.len()];
    let last = flows.len() - 1;
    flows[last] += cash_values[last].cash_value as f64;

    let mut rate = INITIAL_GUESS;
    let mut convergence = Convergence::IterationCapReached;

    for _ in 0..MAX_ITERATIONS {
        let mut npv = 0.0;
        let mut derivative = 0.0;

        for (t, flow) in flows.iter().enumerate() {
            npv += flow / (1.0 + rate).powi(t as i32);
            if t > 0 {
                derivative -= t as f64 * flow / (1.0 + rate).powi(t as i32 + 1);
            }
        }

        if npv.abs() < NPV_TOLERANCE {
            convergence = Convergence::Converged;
            break;
        }
        // A flat derivative would divide by zero; stop with the cap tag.
        if derivative == 0.0 {
            break;
        }

        rate -= npv / derivative;
    }

    Some(IrrEstimate { rate, convergence })
}
