//! Tonal tables and operations: scales, chords, tuning, inversion.

use std::collections::HashMap;

use tracing::warn;

use crate::pattern::{Arg, EvalCtx, Op, Pattern, Stage, Value};
use crate::position::normalized_position;

lazy_static::lazy_static! {
    static ref SCALES: HashMap<&'static str, Vec<i32>> = {
        let mut m = HashMap::new();
        m.insert("major", vec![0, 2, 4, 5, 7, 9, 11]);
        m.insert("minor", vec![0, 2, 3, 5, 7, 8, 10]);
        m.insert("harmonic", vec![0, 2, 3, 5, 7, 8, 11]);
        m.insert("melodic", vec![0, 2, 3, 5, 7, 9, 11]);
        m.insert("dorian", vec![0, 2, 3, 5, 7, 9, 10]);
        m.insert("phrygian", vec![0, 1, 3, 5, 7, 8, 10]);
        m.insert("lydian", vec![0, 2, 4, 6, 7, 9, 11]);
        m.insert("mixolydian", vec![0, 2, 4, 5, 7, 9, 10]);
        m.insert("locrian", vec![0, 1, 3, 5, 6, 8, 10]);
        m.insert("pentatonic", vec![0, 2, 4, 7, 9]);
        m.insert("penta", vec![0, 2, 4, 7, 9]);
        m.insert("blues", vec![0, 3, 5, 6, 7, 10]);
        m.insert("chromatic", vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]);
        m.insert("whole", vec![0, 2, 4, 6, 8, 10]);
        m.insert("augmented", vec![0, 3, 4, 7, 8, 11]);
        m.insert("diminished", vec![0, 2, 3, 5, 6, 8, 9, 11]);
        m.insert("hirajoshi", vec![0, 2, 3, 7, 8]);
        m.insert("kumoi", vec![0, 2, 3, 7, 9]);
        m.insert("pelog", vec![0, 1, 3, 7, 8]);
        m.insert("egyptian", vec![0, 2, 5, 7, 10]);
        m
    };

    static ref CHORD_INTERVALS: HashMap<&'static str, Vec<i32>> = {
        let mut m = HashMap::new();
        // triads
        m.insert("major", vec![0, 4, 7]);
        m.insert("maj", vec![0, 4, 7]);
        m.insert("minor", vec![0, 3, 7]);
        m.insert("min", vec![0, 3, 7]);
        m.insert("dim", vec![0, 3, 6]);
        m.insert("aug", vec![0, 4, 8]);
        m.insert("sus2", vec![0, 2, 7]);
        m.insert("sus4", vec![0, 5, 7]);
        // sevenths
        m.insert("maj7", vec![0, 4, 7, 11]);
        m.insert("min7", vec![0, 3, 7, 10]);
        m.insert("dom7", vec![0, 4, 7, 10]);
        m.insert("7", vec![0, 4, 7, 10]);
        m.insert("dim7", vec![0, 3, 6, 9]);
        m.insert("m7b5", vec![0, 3, 6, 10]);
        // extensions
        m.insert("maj9", vec![0, 4, 7, 11, 14]);
        m.insert("min9", vec![0, 3, 7, 10, 14]);
        m.insert("add9", vec![0, 4, 7, 14]);
        m.insert("6", vec![0, 4, 7, 9]);
        m.insert("m6", vec![0, 3, 7, 9]);
        m.insert("5", vec![0, 7]);
        m
    };
}

impl Pattern {
    /// Walk the named scale's degrees across the cycle, as semitone
    /// offsets from the root.
    pub fn scales(&self, name: &str) -> Pattern {
        self.push_stage(Op::Scales, vec![Arg::Sym(name.to_string()), Arg::Num(1.0)])
    }

    /// `scales` spread over several octaves.
    pub fn scales_over(&self, name: &str, octaves: usize) -> Pattern {
        self.push_stage(
            Op::Scales,
            vec![Arg::Sym(name.to_string()), Arg::Num(octaves as f64)],
        )
    }

    /// The named chord's intervals as one polyphonic value.
    pub fn chords(&self, name: &str) -> Pattern {
        self.push_stage(Op::Chords, vec![Arg::Sym(name.to_string())])
    }

    /// MIDI note to frequency in Hz, with a semitone offset against
    /// A4 = 440.
    pub fn tune(&self, offset: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Tune, vec![offset.into()])
    }

    /// Chord inversion: rotate the voices, lifting each wrapped tone an
    /// octave (negative counts rotate downward).
    pub fn inversion(&self, n: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Inversion, vec![n.into()])
    }
}

pub(crate) fn scale_value(stage: &Stage, ctx: &EvalCtx) -> Value {
    let name = stage
        .args
        .first()
        .and_then(|a| a.as_sym())
        .unwrap_or("major");
    let octaves = stage.arg_num(1, ctx, 1.0).max(1.0) as usize;
    let degrees = match SCALES.get(name) {
        Some(d) => d,
        None => {
            warn!("unknown scale '{}'", name);
            return Value::Empty;
        }
    };
    let total = degrees.len() * octaves;
    let pos = normalized_position(ctx.tick, ctx.divisions, 1.0, 1.0);
    let idx = ((pos * total as f64) as usize).min(total - 1);
    let octave = (idx / degrees.len()) as i32;
    Value::Num(f64::from(degrees[idx % degrees.len()] + 12 * octave))
}

pub(crate) fn chord_value(stage: &Stage, _ctx: &EvalCtx) -> Value {
    let name = stage
        .args
        .first()
        .and_then(|a| a.as_sym())
        .unwrap_or("major");
    match CHORD_INTERVALS.get(name) {
        Some(intervals) => Value::from_list(intervals.iter().map(|i| f64::from(*i)).collect()),
        None => {
            warn!("unknown chord '{}'", name);
            Value::Empty
        }
    }
}

pub(crate) fn invert(input: Value, n: i64) -> Value {
    match input {
        Value::List(mut voices) if !voices.is_empty() => {
            if n >= 0 {
                for _ in 0..n {
                    let lowest = voices.remove(0);
                    voices.push(lowest + 12.0);
                }
            } else {
                for _ in 0..(-n) {
                    if let Some(highest) = voices.pop() {
                        voices.insert(0, highest - 12.0);
                    }
                }
            }
            Value::List(voices)
        }
        other => other,
    }
}
