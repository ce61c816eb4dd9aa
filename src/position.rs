//! Normalized position arithmetic.
//!
//! Time (ticks) and space (canvas coordinates) both fold into a repeating
//! unit before a pattern samples them. `normalized_position` is that fold:
//! a raw counter becomes a value in `[0, modulus)`.

/// Fold a raw tick into `[0, modulus)`.
///
/// `divisions` is the slot count of one cycle, `frequency` scales how fast
/// the position sweeps the unit. Non-positive `divisions` or `modulus`
/// yield 0 rather than NaN.
pub fn normalized_position(tick: f64, divisions: f64, frequency: f64, modulus: f64) -> f64 {
    if divisions <= 0.0 || modulus <= 0.0 {
        return 0.0;
    }
    let pos = (tick / divisions * frequency).rem_euclid(modulus);
    // rem_euclid can land exactly on `modulus` when rounding error bites
    if pos >= modulus {
        0.0
    } else {
        pos
    }
}

/// Cycle index for a tick: `floor(tick / divisions)`.
pub fn cycle(tick: f64, divisions: f64) -> i64 {
    if divisions <= 0.0 {
        return 0;
    }
    (tick / divisions).floor() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_stays_in_unit() {
        for tick in 0..200 {
            let pos = normalized_position(tick as f64, 16.0, 1.0, 1.0);
            assert!((0.0..1.0).contains(&pos), "tick {} gave {}", tick, pos);
        }
    }

    #[test]
    fn position_is_linear_within_a_cycle() {
        assert_eq!(normalized_position(4.0, 16.0, 1.0, 1.0), 0.25);
        assert_eq!(normalized_position(8.0, 16.0, 1.0, 1.0), 0.5);
        assert_eq!(normalized_position(20.0, 16.0, 1.0, 1.0), 0.25);
    }

    #[test]
    fn frequency_scales_the_sweep() {
        assert_eq!(normalized_position(4.0, 16.0, 2.0, 1.0), 0.5);
        assert_eq!(normalized_position(8.0, 16.0, 2.0, 1.0), 0.0);
    }

    #[test]
    fn negative_ticks_wrap_upward() {
        let pos = normalized_position(-1.0, 16.0, 1.0, 1.0);
        assert!((pos - 0.9375).abs() < 1e-12);
    }

    #[test]
    fn modulus_spans_bars() {
        assert_eq!(normalized_position(24.0, 16.0, 1.0, 2.0), 1.5);
    }

    #[test]
    fn degenerate_inputs_fold_to_zero() {
        assert_eq!(normalized_position(5.0, 0.0, 1.0, 1.0), 0.0);
        assert_eq!(normalized_position(5.0, 16.0, 1.0, 0.0), 0.0);
    }

    #[test]
    fn cycle_is_floor_of_tick_over_divisions() {
        assert_eq!(cycle(0.0, 16.0), 0);
        assert_eq!(cycle(15.0, 16.0), 0);
        assert_eq!(cycle(16.0, 16.0), 1);
        assert_eq!(cycle(33.0, 16.0), 2);
        assert_eq!(cycle(-1.0, 16.0), -1);
    }
}
