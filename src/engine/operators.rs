//! Per-condition comparison semantics

use crate::models::strategy::Operator;

/// Absolute tolerance for (in)equality comparisons on indicator values
pub const EQUALITY_EPSILON: f64 = 1e-4;

/// Apply one operator to the current value, the previous value (when the
/// series has one) and the comparison target.
///
/// Crossover operators are true only on the tick where the value
/// transitions across the target; without a previous value they evaluate
/// false, never error.
pub fn compare(operator: Operator, current: f64, previous: Option<f64>, target: f64) -> bool {
    match operator {
        Operator::Equals => (current - target).abs() <= EQUALITY_EPSILON,
        Operator::NotEquals => (current - target).abs() > EQUALITY_EPSILON,
        Operator::GreaterThan => current > target,
        Operator::GreaterThanOrEqual => current >= target,
        Operator::LessThan => current < target,
        Operator::LessThanOrEqual => current <= target,
        Operator::CrossesAbove => match previous {
            Some(prev) => prev <= target && current > target,
            None => false,
        },
        Operator::CrossesBelow => match previous {
            Some(prev) => prev >= target && current < target,
            None => false,
        },
    }
}
