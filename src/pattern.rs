//! Core pattern entity for the live-coding engine.
//!
//! A [`Pattern`] is an ordered list of transform stages, built up by chain
//! calls and reduced left to right against the current tick on every
//! scheduler step. Patterns are shared, interior-mutable handles: streams
//! hand them out, stage arguments may reference them, and spawned
//! sub-patterns keep a non-owning link back to their parent. The engine is
//! single-threaded by construction, so handles are `Rc<RefCell<_>>`.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::warn;

use crate::mini_notation;

/// A computed pattern value: nothing, one voice, or a chord of voices.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Empty,
    Num(f64),
    List(Vec<f64>),
}

impl Value {
    /// Build from a voice list, collapsing the degenerate shapes.
    pub fn from_list(values: Vec<f64>) -> Self {
        match values.len() {
            0 => Value::Empty,
            1 => Value::Num(values[0]),
            _ => Value::List(values),
        }
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            Value::Empty => None,
            Value::Num(n) => Some(*n),
            Value::List(v) => v.first().copied(),
        }
    }

    /// Gate truthiness: a value fires when it is above zero.
    pub fn is_truthy(&self) -> bool {
        self.as_num().map(|n| n > 0.0).unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// All voices as a plain list (empty for the empty sentinel).
    pub fn nums(&self) -> Vec<f64> {
        match self {
            Value::Empty => Vec::new(),
            Value::Num(n) => vec![*n],
            Value::List(v) => v.clone(),
        }
    }
}

/// Stage operations. Generators replace the chain, combinators extend it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    // generators
    Set,
    Range,
    Seq,
    Sine,
    Cosine,
    Saw,
    Tri,
    Square,
    Pulse,
    Curve,
    Random,
    Noise,
    Bin,
    Scales,
    Chords,
    // combinators
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Not,
    Gt,
    Lt,
    Gte,
    Lte,
    Eq,
    Neq,
    Clamp,
    Step,
    Interpolate,
    Layer,
    At,
    Inversion,
    Tune,
    Floor,
    Ceil,
    Round,
    Abs,
    Sin,
    Cos,
    Every,
    Toggle,
    IfElse,
}

impl Op {
    pub fn is_generator(&self) -> bool {
        matches!(
            self,
            Op::Set
                | Op::Range
                | Op::Seq
                | Op::Sine
                | Op::Cosine
                | Op::Saw
                | Op::Tri
                | Op::Square
                | Op::Pulse
                | Op::Curve
                | Op::Random
                | Op::Noise
                | Op::Bin
                | Op::Scales
                | Op::Chords
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Op::Set => "set",
            Op::Range => "range",
            Op::Seq => "seq",
            Op::Sine => "sine",
            Op::Cosine => "cosine",
            Op::Saw => "saw",
            Op::Tri => "tri",
            Op::Square => "square",
            Op::Pulse => "pulse",
            Op::Curve => "curve",
            Op::Random => "random",
            Op::Noise => "noise",
            Op::Bin => "bin",
            Op::Scales => "scales",
            Op::Chords => "chords",
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Mul => "mul",
            Op::Div => "div",
            Op::Mod => "mod",
            Op::And => "and",
            Op::Or => "or",
            Op::Xor => "xor",
            Op::Not => "not",
            Op::Gt => "gt",
            Op::Lt => "lt",
            Op::Gte => "gte",
            Op::Lte => "lte",
            Op::Eq => "eq",
            Op::Neq => "neq",
            Op::Clamp => "clamp",
            Op::Step => "step",
            Op::Interpolate => "interpolate",
            Op::Layer => "layer",
            Op::At => "at",
            Op::Inversion => "inversion",
            Op::Tune => "tune",
            Op::Floor => "floor",
            Op::Ceil => "ceil",
            Op::Round => "round",
            Op::Abs => "abs",
            Op::Sin => "sin",
            Op::Cos => "cos",
            Op::Every => "every",
            Op::Toggle => "toggle",
            Op::IfElse => "if_else",
        }
    }
}

/// One argument slot of a stage.
///
/// Resolution is polymorphic: plain numbers pass through, strings compile
/// through the mini-notation cache at the consuming pattern's current tick
/// and divisions, and pattern references contribute the referenced
/// pattern's most recently cached value (never a fresh evaluation).
#[derive(Debug, Clone)]
pub enum Arg {
    Num(f64),
    List(Vec<f64>),
    /// A mini-notation program.
    Str(String),
    /// A symbolic name (scale or chord), taken verbatim.
    Sym(String),
    /// Another pattern; reads its cached value.
    Pat(Pattern),
}

impl Arg {
    pub(crate) fn resolve(&self, ctx: &EvalCtx) -> Value {
        match self {
            Arg::Num(n) => Value::Num(*n),
            Arg::List(v) => Value::from_list(v.clone()),
            Arg::Sym(_) => Value::Empty,
            Arg::Str(s) => match mini_notation::query(s, ctx.tick, ctx.divisions) {
                Ok(v) => v,
                Err(e) => {
                    warn!("mini-notation argument failed in {}: {}", ctx.id, e);
                    Value::Empty
                }
            },
            Arg::Pat(p) => p.value(),
        }
    }

    pub(crate) fn as_sym(&self) -> Option<&str> {
        match self {
            Arg::Sym(s) | Arg::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for Arg {
    fn from(n: f64) -> Self {
        Arg::Num(n)
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Str(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Str(s)
    }
}

impl From<Vec<f64>> for Arg {
    fn from(v: Vec<f64>) -> Self {
        Arg::List(v)
    }
}

impl From<&Pattern> for Arg {
    fn from(p: &Pattern) -> Self {
        Arg::Pat(p.clone())
    }
}

impl From<Pattern> for Arg {
    fn from(p: Pattern) -> Self {
        Arg::Pat(p)
    }
}

/// One stage of a chain: the operation plus its argument slots.
#[derive(Debug, Clone)]
pub struct Stage {
    pub(crate) op: Op,
    pub(crate) args: Vec<Arg>,
}

impl Stage {
    pub(crate) fn new(op: Op, args: Vec<Arg>) -> Self {
        Self { op, args }
    }
}

/// Evaluation inputs for one reduction pass.
pub(crate) struct EvalCtx {
    pub tick: f64,
    pub divisions: f64,
    pub id: String,
}

struct PatternState {
    id: String,
    stages: Vec<Stage>,
    spawns: Vec<(Op, Pattern)>,
    parent: Option<Weak<RefCell<PatternState>>>,
    cached: Value,
    toggle: bool,
    tick: f64,
    divisions: f64,
    bpm: f64,
    spawn_count: usize,
}

/// Cloneable handle to a pattern entity.
#[derive(Clone)]
pub struct Pattern {
    inner: Rc<RefCell<PatternState>>,
}

impl std::fmt::Debug for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.try_borrow() {
            Ok(st) => f
                .debug_struct("Pattern")
                .field("id", &st.id)
                .field("stages", &st.stages.len())
                .field("spawns", &st.spawns.len())
                .finish(),
            Err(_) => f.write_str("Pattern(<in evaluation>)"),
        }
    }
}

impl Pattern {
    pub fn new(id: impl Into<String>) -> Self {
        Pattern {
            inner: Rc::new(RefCell::new(PatternState {
                id: id.into(),
                stages: Vec::new(),
                spawns: Vec::new(),
                parent: None,
                cached: Value::Empty,
                toggle: false,
                tick: 0.0,
                divisions: 0.0,
                bpm: 0.0,
                spawn_count: 0,
            })),
        }
    }

    pub fn id(&self) -> String {
        self.inner.borrow().id.clone()
    }

    /// Whether any stage or spawned sub-pattern is present.
    pub fn has(&self) -> bool {
        let st = self.inner.borrow();
        !st.stages.is_empty() || !st.spawns.is_empty()
    }

    /// Most recently computed value; never re-evaluates.
    pub fn value(&self) -> Value {
        self.inner
            .try_borrow()
            .map(|st| st.cached.clone())
            .unwrap_or(Value::Empty)
    }

    /// The `(tick, divisions, bpm)` stored by the last `get` call.
    pub fn inputs(&self) -> (f64, f64, f64) {
        let st = self.inner.borrow();
        (st.tick, st.divisions, st.bpm)
    }

    /// Empty the chain without destroying the entity. Identity and the
    /// parent link survive; stages, spawns, the cached value and the
    /// toggle flip-flop do not.
    pub fn reset(&self) {
        let mut st = self.inner.borrow_mut();
        st.stages.clear();
        st.spawns.clear();
        st.cached = Value::Empty;
        st.toggle = false;
        st.spawn_count = 0;
    }

    /// Spawn a child pattern that will feed the given combinator when this
    /// pattern evaluates. Children run first, in registration order, and
    /// each result is applied as if it had been a literal argument to the
    /// named operation. Returns the child for further chaining.
    pub fn spawn(&self, op: Op) -> Pattern {
        let mut st = self.inner.borrow_mut();
        st.spawn_count += 1;
        let child = Pattern::new(format!("{}${}{}", st.id, op.name(), st.spawn_count));
        child.inner.borrow_mut().parent = Some(Rc::downgrade(&self.inner));
        st.spawns.push((op, child.clone()));
        child
    }

    /// Pop back to the owning pattern. A pattern with no owner is its own
    /// parent, which keeps flat chains total.
    pub fn parent(&self) -> Pattern {
        let up = self.inner.borrow().parent.as_ref().and_then(|w| w.upgrade());
        match up {
            Some(inner) => Pattern { inner },
            None => self.clone(),
        }
    }

    /// Whether two handles point at the same entity.
    pub fn ptr_eq(&self, other: &Pattern) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn push_stage(&self, op: Op, args: Vec<Arg>) -> Pattern {
        {
            let mut st = self.inner.borrow_mut();
            if op.is_generator() {
                st.stages.clear();
            }
            st.stages.push(Stage::new(op, args));
        }
        self.clone()
    }

    /// Evaluate the chain against a tick.
    ///
    /// Stores the inputs, runs spawned children first, extends the stage
    /// list with their results for this reduction only, then reduces the
    /// stages left to right from the raw tick. The result is cached (and
    /// readable by other patterns through [`Pattern::value`]) until the
    /// next evaluation. An empty chain yields [`Value::Empty`].
    pub fn get(&self, tick: f64, divisions: f64, bpm: f64) -> Value {
        let spawns: Vec<(Op, Pattern)> = self.inner.borrow().spawns.clone();
        let mut fed: Vec<(Op, Value)> = Vec::with_capacity(spawns.len());
        for (op, child) in &spawns {
            let v = child.get(tick, divisions, bpm);
            if !v.is_empty() {
                fed.push((*op, v));
            }
        }

        let mut st = self.inner.borrow_mut();
        st.tick = tick;
        st.divisions = divisions;
        st.bpm = bpm;

        if st.stages.is_empty() && fed.is_empty() {
            st.cached = Value::Empty;
            return Value::Empty;
        }

        let base_len = st.stages.len();
        for (op, v) in fed {
            let arg = match v {
                Value::Num(n) => Arg::Num(n),
                Value::List(l) => Arg::List(l),
                Value::Empty => continue,
            };
            st.stages.push(Stage::new(op, vec![arg]));
        }

        let ctx = EvalCtx {
            tick,
            divisions,
            id: st.id.clone(),
        };
        let mut toggle = st.toggle;
        let mut value = Value::Num(tick);
        for stage in &st.stages {
            value = stage.apply(value, &ctx, &mut toggle);
        }
        st.stages.truncate(base_len);
        st.toggle = toggle;
        st.cached = value.clone();
        value
    }
}
