//! Tests for individual generator and combinator stages.

use magnon::pattern::{Pattern, Value};

const EPS: f64 = 1e-9;

fn num(v: Value) -> f64 {
    v.as_num().expect("expected a scalar value")
}

#[test]
fn range_scales_the_cycle_ramp() {
    let p = Pattern::new("p").range(10.0, 20.0);
    assert!((num(p.get(0.0, 16.0, 120.0)) - 10.0).abs() < EPS);
    assert!((num(p.get(8.0, 16.0, 120.0)) - 15.0).abs() < EPS);
    assert!((num(p.get(12.0, 16.0, 120.0)) - 17.5).abs() < EPS);
}

#[test]
fn sine_hits_its_quarter_points() {
    let p = Pattern::new("p").sine(1.0);
    assert!((num(p.get(0.0, 16.0, 120.0)) - 0.5).abs() < EPS);
    assert!((num(p.get(4.0, 16.0, 120.0)) - 1.0).abs() < EPS);
    assert!((num(p.get(12.0, 16.0, 120.0)) - 0.0).abs() < EPS);
}

#[test]
fn cosine_starts_high() {
    let p = Pattern::new("p").cosine(1.0);
    assert!((num(p.get(0.0, 16.0, 120.0)) - 1.0).abs() < EPS);
    assert!((num(p.get(8.0, 16.0, 120.0)) - 0.0).abs() < EPS);
}

#[test]
fn saw_sweeps_linearly_with_frequency() {
    let p = Pattern::new("p").saw(1.0);
    assert!((num(p.get(8.0, 16.0, 120.0)) - 0.5).abs() < EPS);
    let fast = Pattern::new("f").saw(2.0);
    assert!((num(fast.get(4.0, 16.0, 120.0)) - 0.5).abs() < EPS);
    assert!((num(fast.get(8.0, 16.0, 120.0)) - 0.0).abs() < EPS);
}

#[test]
fn tri_peaks_mid_cycle() {
    let p = Pattern::new("p").tri(1.0);
    assert!((num(p.get(0.0, 16.0, 120.0)) - 0.0).abs() < EPS);
    assert!((num(p.get(8.0, 16.0, 120.0)) - 1.0).abs() < EPS);
    assert!((num(p.get(12.0, 16.0, 120.0)) - 0.5).abs() < EPS);
}

#[test]
fn square_and_pulse_gate_the_cycle() {
    let square = Pattern::new("sq").square(1.0);
    assert_eq!(square.get(0.0, 16.0, 120.0), Value::Num(1.0));
    assert_eq!(square.get(8.0, 16.0, 120.0), Value::Num(0.0));

    let pulse = Pattern::new("pu").pulse(0.25, 1.0);
    assert_eq!(pulse.get(3.0, 16.0, 120.0), Value::Num(1.0));
    assert_eq!(pulse.get(4.0, 16.0, 120.0), Value::Num(0.0));
}

#[test]
fn curve_bends_the_ramp() {
    let p = Pattern::new("p").curve(2.0);
    assert!((num(p.get(8.0, 16.0, 120.0)) - 0.25).abs() < EPS);
}

#[test]
fn seq_steps_through_its_arguments() {
    let p = Pattern::new("p").seq(vec![10.0, 20.0, 30.0, 40.0]);
    assert_eq!(p.get(0.0, 16.0, 120.0), Value::Num(10.0));
    assert_eq!(p.get(4.0, 16.0, 120.0), Value::Num(20.0));
    assert_eq!(p.get(15.0, 16.0, 120.0), Value::Num(40.0));
}

#[test]
fn random_is_deterministic_per_identity_and_tick() {
    let a = Pattern::new("same").random(5.0, 10.0);
    let b = Pattern::new("same").random(5.0, 10.0);
    let mut values = Vec::new();
    for tick in 0..10 {
        let va = num(a.get(tick as f64, 16.0, 120.0));
        let vb = num(b.get(tick as f64, 16.0, 120.0));
        assert_eq!(va, vb);
        assert!((5.0..10.0).contains(&va));
        values.push(va);
    }
    assert!(values.iter().any(|v| (v - values[0]).abs() > EPS));
}

#[test]
fn noise_is_bounded_and_deterministic() {
    let a = Pattern::new("n").noise(1.0);
    let b = Pattern::new("n").noise(1.0);
    for tick in 0..64 {
        let va = num(a.get(tick as f64, 16.0, 120.0));
        assert_eq!(va, num(b.get(tick as f64, 16.0, 120.0)));
        assert!((0.0..=1.0).contains(&va));
    }
}

#[test]
fn bin_walks_the_bits() {
    let p = Pattern::new("p").bin(5.0); // 101
    assert_eq!(p.get(0.0, 3.0, 120.0), Value::Num(1.0));
    assert_eq!(p.get(1.0, 3.0, 120.0), Value::Num(0.0));
    assert_eq!(p.get(2.0, 3.0, 120.0), Value::Num(1.0));
}

#[test]
fn arithmetic_ops() {
    assert_eq!(
        Pattern::new("a").set(10.0).sub(4.0).get(0.0, 16.0, 120.0),
        Value::Num(6.0)
    );
    assert_eq!(
        Pattern::new("b").set(10.0).div(4.0).get(0.0, 16.0, 120.0),
        Value::Num(2.5)
    );
    // division by zero passes through
    assert_eq!(
        Pattern::new("c").set(10.0).div(0.0).get(0.0, 16.0, 120.0),
        Value::Num(10.0)
    );
    // euclidean remainder stays non-negative
    assert_eq!(
        Pattern::new("d").set(-3.0).modulo(4.0).get(0.0, 16.0, 120.0),
        Value::Num(1.0)
    );
}

#[test]
fn comparison_ops_emit_gates() {
    assert_eq!(
        Pattern::new("a").set(5.0).gt(3.0).get(0.0, 16.0, 120.0),
        Value::Num(1.0)
    );
    assert_eq!(
        Pattern::new("b").set(5.0).lt(3.0).get(0.0, 16.0, 120.0),
        Value::Num(0.0)
    );
    assert_eq!(
        Pattern::new("c").set(3.0).gte(3.0).get(0.0, 16.0, 120.0),
        Value::Num(1.0)
    );
    assert_eq!(
        Pattern::new("d").set(3.0).lte(2.0).get(0.0, 16.0, 120.0),
        Value::Num(0.0)
    );
    assert_eq!(
        Pattern::new("e").set(3.0).eq(3.0).get(0.0, 16.0, 120.0),
        Value::Num(1.0)
    );
    assert_eq!(
        Pattern::new("f").set(3.0).neq(3.0).get(0.0, 16.0, 120.0),
        Value::Num(0.0)
    );
}

#[test]
fn logic_ops_work_on_truthiness() {
    assert_eq!(
        Pattern::new("a").set(1.0).and(0.0).get(0.0, 16.0, 120.0),
        Value::Num(0.0)
    );
    assert_eq!(
        Pattern::new("b").set(0.0).or(1.0).get(0.0, 16.0, 120.0),
        Value::Num(1.0)
    );
    assert_eq!(
        Pattern::new("c").set(1.0).xor(1.0).get(0.0, 16.0, 120.0),
        Value::Num(0.0)
    );
    assert_eq!(
        Pattern::new("d").set(0.0).not().get(0.0, 16.0, 120.0),
        Value::Num(1.0)
    );
}

#[test]
fn clamp_orders_its_bounds() {
    assert_eq!(
        Pattern::new("a").set(5.0).clamp(0.0, 1.0).get(0.0, 16.0, 120.0),
        Value::Num(1.0)
    );
    assert_eq!(
        Pattern::new("b").set(5.0).clamp(1.0, 0.0).get(0.0, 16.0, 120.0),
        Value::Num(1.0)
    );
}

#[test]
fn step_quantizes_and_zero_passes_through() {
    assert_eq!(
        Pattern::new("a").set(0.37).step(0.25).get(0.0, 16.0, 120.0),
        Value::Num(0.25)
    );
    assert_eq!(
        Pattern::new("b").set(0.37).step(0.0).get(0.0, 16.0, 120.0),
        Value::Num(0.37)
    );
}

#[test]
fn interpolate_blends_toward_the_target() {
    assert_eq!(
        Pattern::new("a")
            .set(10.0)
            .interpolate(20.0, 0.5)
            .get(0.0, 16.0, 120.0),
        Value::Num(15.0)
    );
}

#[test]
fn layer_builds_polyphony() {
    assert_eq!(
        Pattern::new("a").set(60.0).layer(64.0).get(0.0, 16.0, 120.0),
        Value::List(vec![60.0, 64.0])
    );
    assert_eq!(
        Pattern::new("b")
            .set(60.0)
            .layer(vec![64.0, 67.0])
            .get(0.0, 16.0, 120.0),
        Value::List(vec![60.0, 64.0, 67.0])
    );
}

#[test]
fn at_selects_a_voice_or_yields_empty() {
    assert_eq!(
        Pattern::new("a")
            .set(vec![1.0, 2.0, 3.0])
            .at(1.0)
            .get(0.0, 16.0, 120.0),
        Value::Num(2.0)
    );
    assert_eq!(
        Pattern::new("b")
            .set(vec![1.0, 2.0, 3.0])
            .at(5.0)
            .get(0.0, 16.0, 120.0),
        Value::Empty
    );
    assert_eq!(
        Pattern::new("c").set(9.0).at(0.0).get(0.0, 16.0, 120.0),
        Value::Num(9.0)
    );
}

#[test]
fn empty_propagates_through_later_stages() {
    let p = Pattern::new("p")
        .set(vec![1.0, 2.0])
        .at(9.0)
        .add(5.0)
        .mul(2.0);
    assert_eq!(p.get(0.0, 16.0, 120.0), Value::Empty);
}

#[test]
fn inversion_rotates_the_chord() {
    assert_eq!(
        Pattern::new("a")
            .set(vec![0.0, 4.0, 7.0])
            .inversion(1.0)
            .get(0.0, 16.0, 120.0),
        Value::List(vec![4.0, 7.0, 12.0])
    );
    assert_eq!(
        Pattern::new("b")
            .set(vec![0.0, 4.0, 7.0])
            .inversion(-1.0)
            .get(0.0, 16.0, 120.0),
        Value::List(vec![-5.0, 0.0, 4.0])
    );
}

#[test]
fn tune_converts_midi_to_hertz() {
    assert!((num(Pattern::new("a").set(69.0).tune(0.0).get(0.0, 16.0, 120.0)) - 440.0).abs() < EPS);
    assert!(
        (num(Pattern::new("b").set(57.0).tune(12.0).get(0.0, 16.0, 120.0)) - 440.0).abs() < EPS
    );
    let chord = Pattern::new("c")
        .set(vec![69.0, 81.0])
        .tune(0.0)
        .get(0.0, 16.0, 120.0);
    let voices = chord.nums();
    assert!((voices[0] - 440.0).abs() < EPS);
    assert!((voices[1] - 880.0).abs() < EPS);
}

#[test]
fn scales_walk_degrees_across_the_cycle() {
    let p = Pattern::new("p").scales("major");
    assert_eq!(p.get(0.0, 16.0, 120.0), Value::Num(0.0));
    assert_eq!(p.get(14.0, 16.0, 120.0), Value::Num(11.0));

    let wide = Pattern::new("w").scales_over("major", 2);
    assert_eq!(wide.get(8.0, 16.0, 120.0), Value::Num(12.0));
}

#[test]
fn unknown_scale_yields_empty() {
    let p = Pattern::new("p").scales("klingon");
    assert_eq!(p.get(0.0, 16.0, 120.0), Value::Empty);
}

#[test]
fn chords_emit_interval_lists() {
    assert_eq!(
        Pattern::new("a").chords("min7").get(0.0, 16.0, 120.0),
        Value::List(vec![0.0, 3.0, 7.0, 10.0])
    );
    assert_eq!(
        Pattern::new("b").chords("nope").get(0.0, 16.0, 120.0),
        Value::Empty
    );
}

#[test]
fn chord_pipeline_from_notation_to_hertz() {
    // chord intervals over a root note, tuned to frequencies
    let p = Pattern::new("p").chords("maj").add(60.0).tune(0.0);
    let voices = p.get(0.0, 16.0, 120.0).nums();
    assert_eq!(voices.len(), 3);
    assert!((voices[0] - 261.625_565).abs() < 1e-3);
}

#[test]
fn rounding_and_trig_map_over_voices() {
    assert_eq!(
        Pattern::new("a").set(1.7).floor().get(0.0, 16.0, 120.0),
        Value::Num(1.0)
    );
    assert_eq!(
        Pattern::new("b").set(1.2).ceil().get(0.0, 16.0, 120.0),
        Value::Num(2.0)
    );
    assert_eq!(
        Pattern::new("c").set(-1.5).abs().get(0.0, 16.0, 120.0),
        Value::Num(1.5)
    );
    assert_eq!(
        Pattern::new("d")
            .set(vec![1.4, 2.6])
            .round()
            .get(0.0, 16.0, 120.0),
        Value::List(vec![1.0, 3.0])
    );
    assert!((num(Pattern::new("e").set(0.0).cos().get(0.0, 16.0, 120.0)) - 1.0).abs() < EPS);
    assert!(num(Pattern::new("f").set(0.0).sin().get(0.0, 16.0, 120.0)).abs() < EPS);
}

#[test]
fn if_else_selects_by_truthiness() {
    assert_eq!(
        Pattern::new("a").set(1.0).if_else(10.0, 20.0).get(0.0, 16.0, 120.0),
        Value::Num(10.0)
    );
    assert_eq!(
        Pattern::new("b").set(0.0).if_else(10.0, 20.0).get(0.0, 16.0, 120.0),
        Value::Num(20.0)
    );
}

#[test]
fn every_offset_shifts_the_grid() {
    let p = Pattern::new("p").every_offset(4.0, 1.0);
    for tick in 0..9 {
        let expected = if tick % 4 == 1 { 1.0 } else { 0.0 };
        assert_eq!(p.get(tick as f64, 16.0, 120.0), Value::Num(expected));
    }
}
