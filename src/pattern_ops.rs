//! Generator and combinator stages for pattern chains.
//!
//! Generators replace the chain; combinators append to it. Every
//! combinator is polyphony-transparent: a list input maps element-wise and
//! a single-element result collapses back to a scalar. The empty sentinel
//! short-circuits through combinators so an unset key stays unset.

use std::f64::consts::TAU;

use rand::{rngs::StdRng, Rng, SeedableRng};
use sha2::{Digest, Sha256};

use crate::pattern::{Arg, EvalCtx, Op, Pattern, Stage, Value};
use crate::pattern_tonal;
use crate::position::normalized_position;

impl Pattern {
    // ============= Generators =============

    /// Constant value: a number, a chord list, another pattern, or a
    /// mini-notation program looked up at the current tick.
    pub fn set(&self, v: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Set, vec![v.into()])
    }

    /// Ramp over the cycle scaled to `[lo, hi)`.
    pub fn range(&self, lo: impl Into<Arg>, hi: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Range, vec![lo.into(), hi.into()])
    }

    /// One slot per argument across the cycle.
    pub fn seq<A: Into<Arg>>(&self, vals: Vec<A>) -> Pattern {
        self.push_stage(Op::Seq, vals.into_iter().map(Into::into).collect())
    }

    /// Unit-range sine of the cycle position.
    pub fn sine(&self, freq: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Sine, vec![freq.into()])
    }

    pub fn cosine(&self, freq: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Cosine, vec![freq.into()])
    }

    pub fn saw(&self, freq: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Saw, vec![freq.into()])
    }

    pub fn tri(&self, freq: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Tri, vec![freq.into()])
    }

    pub fn square(&self, freq: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Square, vec![freq.into()])
    }

    /// High for the first `width` of each period.
    pub fn pulse(&self, width: impl Into<Arg>, freq: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Pulse, vec![width.into(), freq.into()])
    }

    /// Cycle ramp raised to an exponent.
    pub fn curve(&self, exponent: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Curve, vec![exponent.into()])
    }

    /// Deterministic per-tick draw in `[lo, hi)`, seeded from this
    /// pattern's identity and the tick.
    pub fn random(&self, lo: impl Into<Arg>, hi: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Random, vec![lo.into(), hi.into()])
    }

    /// Smooth value noise swept at `freq` cycles per cycle.
    pub fn noise(&self, freq: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Noise, vec![freq.into()])
    }

    /// Bits of an integer, one slot per bit across the cycle.
    pub fn bin(&self, n: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Bin, vec![n.into()])
    }

    // ============= Arithmetic =============

    pub fn add(&self, v: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Add, vec![v.into()])
    }

    pub fn sub(&self, v: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Sub, vec![v.into()])
    }

    pub fn mul(&self, v: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Mul, vec![v.into()])
    }

    /// Divide; division by zero passes the input through unchanged.
    pub fn div(&self, v: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Div, vec![v.into()])
    }

    /// Euclidean remainder; a zero modulus passes the input through.
    pub fn modulo(&self, v: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Mod, vec![v.into()])
    }

    // ============= Logic & comparison =============

    pub fn and(&self, v: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::And, vec![v.into()])
    }

    pub fn or(&self, v: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Or, vec![v.into()])
    }

    pub fn xor(&self, v: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Xor, vec![v.into()])
    }

    pub fn not(&self) -> Pattern {
        self.push_stage(Op::Not, Vec::new())
    }

    pub fn gt(&self, v: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Gt, vec![v.into()])
    }

    pub fn lt(&self, v: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Lt, vec![v.into()])
    }

    pub fn gte(&self, v: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Gte, vec![v.into()])
    }

    pub fn lte(&self, v: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Lte, vec![v.into()])
    }

    pub fn eq(&self, v: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Eq, vec![v.into()])
    }

    pub fn neq(&self, v: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Neq, vec![v.into()])
    }

    // ============= Shaping =============

    pub fn clamp(&self, lo: impl Into<Arg>, hi: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Clamp, vec![lo.into(), hi.into()])
    }

    /// Quantize to multiples of `size`; zero is a pass-through.
    pub fn step(&self, size: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Step, vec![size.into()])
    }

    /// Linear blend toward `target` by `amount`.
    pub fn interpolate(&self, target: impl Into<Arg>, amount: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Interpolate, vec![target.into(), amount.into()])
    }

    /// Push another voice onto the polyphony list.
    pub fn layer(&self, v: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Layer, vec![v.into()])
    }

    /// Select one voice of a list; out of range yields the empty sentinel.
    pub fn at(&self, index: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::At, vec![index.into()])
    }

    pub fn floor(&self) -> Pattern {
        self.push_stage(Op::Floor, Vec::new())
    }

    pub fn ceil(&self) -> Pattern {
        self.push_stage(Op::Ceil, Vec::new())
    }

    pub fn round(&self) -> Pattern {
        self.push_stage(Op::Round, Vec::new())
    }

    pub fn abs(&self) -> Pattern {
        self.push_stage(Op::Abs, Vec::new())
    }

    pub fn sin(&self) -> Pattern {
        self.push_stage(Op::Sin, Vec::new())
    }

    pub fn cos(&self) -> Pattern {
        self.push_stage(Op::Cos, Vec::new())
    }

    // ============= Timing & state =============

    /// 1 on every nth tick, 0 otherwise.
    pub fn every(&self, n: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Every, vec![n.into()])
    }

    /// `every` with a tick offset.
    pub fn every_offset(&self, n: impl Into<Arg>, offset: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::Every, vec![n.into(), offset.into()])
    }

    /// Stateful flip-flop: a truthy input flips the stored state and emits
    /// it, a falsy input emits 0. The state survives across ticks.
    pub fn toggle(&self) -> Pattern {
        self.push_stage(Op::Toggle, Vec::new())
    }

    /// Truthy input selects the first argument, falsy the second.
    pub fn if_else(&self, a: impl Into<Arg>, b: impl Into<Arg>) -> Pattern {
        self.push_stage(Op::IfElse, vec![a.into(), b.into()])
    }
}

impl Stage {
    pub(crate) fn arg_num(&self, i: usize, ctx: &EvalCtx, default: f64) -> f64 {
        self.args
            .get(i)
            .map(|a| a.resolve(ctx))
            .and_then(|v| v.as_num())
            .unwrap_or(default)
    }

    pub(crate) fn arg_val(&self, i: usize, ctx: &EvalCtx) -> Value {
        self.args
            .get(i)
            .map(|a| a.resolve(ctx))
            .unwrap_or(Value::Empty)
    }

    fn arg_val_or(&self, i: usize, ctx: &EvalCtx, default: f64) -> Value {
        let v = self.arg_val(i, ctx);
        if v.is_empty() {
            Value::Num(default)
        } else {
            v
        }
    }

    /// Run one stage: generators compute from the evaluation context,
    /// combinators transform the incoming value.
    pub(crate) fn apply(&self, input: Value, ctx: &EvalCtx, toggle: &mut bool) -> Value {
        match self.op {
            // generators
            Op::Set => self.arg_val(0, ctx),
            Op::Range => {
                let lo = self.arg_num(0, ctx, 0.0);
                let hi = self.arg_num(1, ctx, 1.0);
                Value::Num(lo + cycle_pos(ctx, 1.0) * (hi - lo))
            }
            Op::Seq => {
                if self.args.is_empty() {
                    return Value::Empty;
                }
                let idx = slot_index(cycle_pos(ctx, 1.0), self.args.len());
                self.args[idx].resolve(ctx)
            }
            Op::Sine => {
                let f = self.arg_num(0, ctx, 1.0);
                Value::Num(0.5 + 0.5 * (TAU * cycle_pos(ctx, f)).sin())
            }
            Op::Cosine => {
                let f = self.arg_num(0, ctx, 1.0);
                Value::Num(0.5 + 0.5 * (TAU * cycle_pos(ctx, f)).cos())
            }
            Op::Saw => Value::Num(cycle_pos(ctx, self.arg_num(0, ctx, 1.0))),
            Op::Tri => {
                let p = cycle_pos(ctx, self.arg_num(0, ctx, 1.0));
                Value::Num(1.0 - (2.0 * p - 1.0).abs())
            }
            Op::Square => {
                let p = cycle_pos(ctx, self.arg_num(0, ctx, 1.0));
                Value::Num(if p < 0.5 { 1.0 } else { 0.0 })
            }
            Op::Pulse => {
                let width = self.arg_num(0, ctx, 0.25);
                let p = cycle_pos(ctx, self.arg_num(1, ctx, 1.0));
                Value::Num(if p < width { 1.0 } else { 0.0 })
            }
            Op::Curve => {
                let exponent = self.arg_num(0, ctx, 2.0);
                Value::Num(cycle_pos(ctx, 1.0).powf(exponent))
            }
            Op::Random => {
                let lo = self.arg_num(0, ctx, 0.0);
                let hi = self.arg_num(1, ctx, 1.0);
                let r = seeded_unit(&ctx.id, ctx.tick.floor() as i64);
                Value::Num(lo + r * (hi - lo))
            }
            Op::Noise => {
                let f = self.arg_num(0, ctx, 1.0);
                let t = if ctx.divisions > 0.0 {
                    ctx.tick / ctx.divisions * f
                } else {
                    0.0
                };
                let cell = t.floor();
                let frac = t - cell;
                let smooth = frac * frac * (3.0 - 2.0 * frac);
                let a = seeded_unit(&ctx.id, cell as i64);
                let b = seeded_unit(&ctx.id, cell as i64 + 1);
                Value::Num(a + (b - a) * smooth)
            }
            Op::Bin => {
                let n = self.arg_num(0, ctx, 0.0).abs() as u64;
                let bits = format!("{:b}", n);
                let idx = slot_index(cycle_pos(ctx, 1.0), bits.len());
                Value::Num(if bits.as_bytes()[idx] == b'1' { 1.0 } else { 0.0 })
            }
            Op::Scales => pattern_tonal::scale_value(self, ctx),
            Op::Chords => pattern_tonal::chord_value(self, ctx),

            // combinators
            Op::Add => binary(input, self.arg_val_or(0, ctx, 0.0), |a, b| a + b),
            Op::Sub => binary(input, self.arg_val_or(0, ctx, 0.0), |a, b| a - b),
            Op::Mul => binary(input, self.arg_val_or(0, ctx, 1.0), |a, b| a * b),
            Op::Div => binary(input, self.arg_val_or(0, ctx, 1.0), |a, b| {
                if b == 0.0 {
                    a
                } else {
                    a / b
                }
            }),
            Op::Mod => binary(input, self.arg_val_or(0, ctx, 1.0), |a, b| {
                if b == 0.0 {
                    a
                } else {
                    a.rem_euclid(b)
                }
            }),
            Op::And => binary(input, self.arg_val_or(0, ctx, 0.0), |a, b| {
                bool_num(a > 0.0 && b > 0.0)
            }),
            Op::Or => binary(input, self.arg_val_or(0, ctx, 0.0), |a, b| {
                bool_num(a > 0.0 || b > 0.0)
            }),
            Op::Xor => binary(input, self.arg_val_or(0, ctx, 0.0), |a, b| {
                bool_num((a > 0.0) != (b > 0.0))
            }),
            Op::Not => unary(input, |a| bool_num(a <= 0.0)),
            Op::Gt => binary(input, self.arg_val_or(0, ctx, 0.0), |a, b| bool_num(a > b)),
            Op::Lt => binary(input, self.arg_val_or(0, ctx, 0.0), |a, b| bool_num(a < b)),
            Op::Gte => binary(input, self.arg_val_or(0, ctx, 0.0), |a, b| bool_num(a >= b)),
            Op::Lte => binary(input, self.arg_val_or(0, ctx, 0.0), |a, b| bool_num(a <= b)),
            Op::Eq => binary(input, self.arg_val_or(0, ctx, 0.0), |a, b| bool_num(a == b)),
            Op::Neq => binary(input, self.arg_val_or(0, ctx, 0.0), |a, b| bool_num(a != b)),
            Op::Clamp => {
                let mut lo = self.arg_num(0, ctx, 0.0);
                let mut hi = self.arg_num(1, ctx, 1.0);
                if lo > hi {
                    std::mem::swap(&mut lo, &mut hi);
                }
                unary(input, |a| a.max(lo).min(hi))
            }
            Op::Step => {
                let size = self.arg_num(0, ctx, 1.0);
                if size <= 0.0 {
                    input
                } else {
                    unary(input, |a| (a / size).floor() * size)
                }
            }
            Op::Interpolate => {
                let target = self.arg_num(0, ctx, 0.0);
                let amount = self.arg_num(1, ctx, 0.5);
                unary(input, |a| a + (target - a) * amount)
            }
            Op::Layer => {
                let arg = self.arg_val(0, ctx);
                match input {
                    Value::Empty => arg,
                    other => {
                        let mut voices = other.nums();
                        voices.extend(arg.nums());
                        Value::from_list(voices)
                    }
                }
            }
            Op::At => {
                let index = self.arg_num(0, ctx, 0.0);
                if index < 0.0 {
                    return Value::Empty;
                }
                let idx = index as usize;
                match input {
                    Value::List(v) => v.get(idx).copied().map(Value::Num).unwrap_or(Value::Empty),
                    Value::Num(n) if idx == 0 => Value::Num(n),
                    _ => Value::Empty,
                }
            }
            Op::Inversion => pattern_tonal::invert(input, self.arg_num(0, ctx, 0.0) as i64),
            Op::Tune => {
                let offset = self.arg_num(0, ctx, 0.0);
                unary(input, |midi| 440.0 * ((midi + offset - 69.0) / 12.0).exp2())
            }
            Op::Floor => unary(input, f64::floor),
            Op::Ceil => unary(input, f64::ceil),
            Op::Round => unary(input, f64::round),
            Op::Abs => unary(input, f64::abs),
            Op::Sin => unary(input, f64::sin),
            Op::Cos => unary(input, f64::cos),
            Op::Every => {
                let n = self.arg_num(0, ctx, 1.0).max(1.0);
                let offset = self.arg_num(1, ctx, 0.0);
                let r = (ctx.tick - offset).rem_euclid(n);
                Value::Num(bool_num(r.abs() < 1e-9 || (n - r).abs() < 1e-9))
            }
            Op::Toggle => match input {
                Value::Empty => Value::Empty,
                v => {
                    if v.is_truthy() {
                        *toggle = !*toggle;
                        Value::Num(bool_num(*toggle))
                    } else {
                        Value::Num(0.0)
                    }
                }
            },
            Op::IfElse => match input {
                Value::Empty => Value::Empty,
                v => {
                    if v.is_truthy() {
                        self.arg_val_or(0, ctx, 1.0)
                    } else {
                        self.arg_val_or(1, ctx, 0.0)
                    }
                }
            },
        }
    }
}

/// Cycle position in `[0, 1)` for the current evaluation.
fn cycle_pos(ctx: &EvalCtx, freq: f64) -> f64 {
    normalized_position(ctx.tick, ctx.divisions, freq, 1.0)
}

/// Map a unit position onto one of `len` slots.
fn slot_index(pos: f64, len: usize) -> usize {
    ((pos * len as f64) as usize).min(len.saturating_sub(1))
}

fn bool_num(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Element-wise map over the incoming voices. Empty short-circuits.
fn unary(input: Value, f: impl Fn(f64) -> f64) -> Value {
    match input {
        Value::Empty => Value::Empty,
        Value::Num(a) => Value::Num(f(a)),
        Value::List(v) => Value::from_list(v.into_iter().map(f).collect()),
    }
}

/// Element-wise combine with an argument value. A list argument against a
/// scalar input fans the input out; two lists zip with the argument
/// cycling. An empty argument passes the input through.
fn binary(input: Value, arg: Value, f: impl Fn(f64, f64) -> f64) -> Value {
    if input.is_empty() {
        return Value::Empty;
    }
    if arg.is_empty() {
        return input;
    }
    match (input, arg) {
        (Value::Num(a), Value::Num(b)) => Value::Num(f(a, b)),
        (Value::Num(a), Value::List(bs)) => {
            Value::from_list(bs.into_iter().map(|b| f(a, b)).collect())
        }
        (Value::List(voices), Value::Num(b)) => {
            Value::from_list(voices.into_iter().map(|a| f(a, b)).collect())
        }
        (Value::List(voices), Value::List(bs)) => {
            let n = bs.len();
            Value::from_list(
                voices
                    .into_iter()
                    .enumerate()
                    .map(|(i, a)| f(a, bs[i % n]))
                    .collect(),
            )
        }
        _ => Value::Empty,
    }
}

/// Deterministic unit draw seeded from an identity and an integer key.
fn seeded_unit(id: &str, key: i64) -> f64 {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hasher.update(key.to_le_bytes());
    let digest = hasher.finalize();
    let seed = digest
        .iter()
        .take(8)
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
    StdRng::seed_from_u64(seed).gen::<f64>()
}
