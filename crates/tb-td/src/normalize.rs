//! Quantity/price quantization to exchange step and tick sizes.
//!
//! Precision is derived from the increment as `round(-log10(step))`, and
//! values are floored to that many decimals. A value already sitting on the
//! grid (up to float noise such as `0.3 * 1000 = 299.99999999999994`) is kept
//! as is, which makes the operation idempotent.

const SNAP_EPSILON: f64 = 1e-9;

/// Decimal places implied by an increment: `0.001 → 3`, `1 → 0`, `10 → -1`.
pub fn step_precision(step: f64) -> i32 {
    if step > 0.0 && step.is_finite() {
        (-step.log10()).round() as i32
    } else {
        0
    }
}

/// Floor `value` to the precision implied by `step`.
pub fn floor_to_step(value: f64, step: f64) -> f64 {
    let precision = step_precision(step);
    let factor = 10f64.powi(precision.abs());
    let scaled = if precision >= 0 { value * factor } else { value / factor };
    let nearest = scaled.round();
    let units = if (scaled - nearest).abs() <= SNAP_EPSILON * nearest.abs().max(1.0) {
        nearest
    } else {
        scaled.floor()
    };
    if precision >= 0 { units / factor } else { units * factor }
}

pub fn normalize_quantity(quantity: f64, step_size: f64) -> f64 {
    floor_to_step(quantity, step_size)
}

pub fn normalize_price(price: f64, tick_size: f64) -> f64 {
    floor_to_step(price, tick_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precision_from_step() {
        assert_eq!(step_precision(0.001), 3);
        assert_eq!(step_precision(0.00001), 5);
        assert_eq!(step_precision(1.0), 0);
        assert_eq!(step_precision(10.0), -1);
        assert_eq!(step_precision(0.0), 0);
        assert_eq!(step_precision(-1.0), 0);
    }

    #[test]
    fn floors_to_step() {
        assert_eq!(floor_to_step(1.23456, 0.001), 1.234);
        assert_eq!(floor_to_step(0.0004, 0.001), 0.0);
        assert_eq!(floor_to_step(0.3, 0.001), 0.3);
        assert_eq!(floor_to_step(123.0, 10.0), 120.0);
        assert_eq!(normalize_price(48123.456, 0.01), 48123.45);
    }

    #[test]
    fn never_exceeds_input_is_on_grid_and_idempotent() {
        let steps = [0.1, 0.01, 0.001, 0.00001, 1.0];
        let quantities = [0.123456789, 1.0, 2.5, 0.3, 7.77777, 1234.5678, 0.0001234];
        for &s in &steps {
            for &q in &quantities {
                let n = floor_to_step(q, s);
                assert!(n <= q + 1e-12, "{n} > {q} for step {s}");
                let units = n / s;
                assert!((units - units.round()).abs() < 1e-6, "{n} not a multiple of {s}");
                assert_eq!(floor_to_step(n, s), n, "not idempotent for {q} step {s}");
            }
        }
    }
}
