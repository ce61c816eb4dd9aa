//! Streams: named bundles of parameter patterns and control gates.
//!
//! A stream owns four open-ended parameter groups (`p`, `px`, `py`, `pz`),
//! fixed control patterns (`t`, `x`, `y`, `z`, `xyz`, `e`, `m`, `mute`,
//! `solo`), and a user remap table. Each tick the scheduler resolves the
//! stream's gates and, only when gated, compiles the groups into a flat
//! parameter object split into event and mutation halves.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::Serialize;
use tracing::debug;

use crate::pattern::{Pattern, Value};

/// A compiled parameter value: one number or a chord of numbers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Num(f64),
    List(Vec<f64>),
}

impl ParamValue {
    fn from_value(v: Value) -> Option<ParamValue> {
        match v {
            Value::Empty => None,
            Value::Num(n) => Some(ParamValue::Num(n)),
            Value::List(l) => Some(ParamValue::List(l)),
        }
    }

    pub fn as_num(&self) -> f64 {
        match self {
            ParamValue::Num(n) => *n,
            ParamValue::List(l) => l.first().copied().unwrap_or(0.0),
        }
    }
}

lazy_static::lazy_static! {
    /// Short live-coding names to canonical parameter names.
    static ref ALIASES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("vol", "gain");
        m.insert("spd", "speed");
        m.insert("cut", "cutoff");
        m.insert("res", "resonance");
        m.insert("att", "attack");
        m.insert("rel", "release");
        m.insert("dly", "delay");
        m.insert("rev", "reverb");
        m.insert("dist", "distortion");
        m
    };
}

/// Leading key character marking a parameter as mutation-eligible.
const MUTATION_MARKER: char = '_';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Group {
    P,
    Px,
    Py,
    Pz,
}

impl Group {
    fn name(self) -> &'static str {
        match self {
            Group::P => "p",
            Group::Px => "px",
            Group::Py => "py",
            Group::Pz => "pz",
        }
    }
}

struct StreamState {
    id: String,
    p: HashMap<String, Pattern>,
    px: HashMap<String, Pattern>,
    py: HashMap<String, Pattern>,
    pz: HashMap<String, Pattern>,
    t: Pattern,
    x: Pattern,
    y: Pattern,
    z: Pattern,
    xyz: Pattern,
    e: Pattern,
    m: Pattern,
    mute: Pattern,
    solo: Pattern,
    remap: HashMap<String, String>,
    // tick-local state, valid from get_e until the end of the tick
    time: f64,
    e_gate: bool,
    m_gate: bool,
    muted: bool,
    solo_gate: bool,
}

/// Cloneable handle to a stream entity.
#[derive(Clone)]
pub struct Stream {
    inner: Rc<RefCell<StreamState>>,
}

/// One stream's compiled output for a tick.
#[derive(Debug, Clone)]
pub struct StreamOutput {
    pub id: String,
    pub e: bool,
    pub m: bool,
    pub solo: bool,
    pub eparams: HashMap<String, ParamValue>,
    pub mparams: HashMap<String, ParamValue>,
}

impl Stream {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let fixed = |suffix: &str| Pattern::new(format!("{}.{}", id, suffix));
        let t = fixed("t");
        let x = fixed("x");
        let y = fixed("y");
        let z = fixed("z");
        let xyz = fixed("xyz");
        let e = fixed("e");
        let m = fixed("m");
        let mute = fixed("mute");
        let solo = fixed("solo");
        Stream {
            inner: Rc::new(RefCell::new(StreamState {
                t,
                x,
                y,
                z,
                xyz,
                e,
                m,
                mute,
                solo,
                id,
                p: HashMap::new(),
                px: HashMap::new(),
                py: HashMap::new(),
                pz: HashMap::new(),
                remap: HashMap::new(),
                time: 0.0,
                e_gate: false,
                m_gate: false,
                muted: false,
                solo_gate: false,
            })),
        }
    }

    pub fn id(&self) -> String {
        self.inner.borrow().id.clone()
    }

    // ============= Parameter groups (get-or-create) =============

    pub fn p(&self, key: &str) -> Pattern {
        self.group_pattern(Group::P, key)
    }

    pub fn px(&self, key: &str) -> Pattern {
        self.group_pattern(Group::Px, key)
    }

    pub fn py(&self, key: &str) -> Pattern {
        self.group_pattern(Group::Py, key)
    }

    pub fn pz(&self, key: &str) -> Pattern {
        self.group_pattern(Group::Pz, key)
    }

    fn group_pattern(&self, group: Group, key: &str) -> Pattern {
        let mut st = self.inner.borrow_mut();
        let id = format!("{}.{}.{}", st.id, group.name(), key);
        let map = match group {
            Group::P => &mut st.p,
            Group::Px => &mut st.px,
            Group::Py => &mut st.py,
            Group::Pz => &mut st.pz,
        };
        map.entry(key.to_string())
            .or_insert_with(|| Pattern::new(id))
            .clone()
    }

    // ============= Fixed control patterns =============

    pub fn t(&self) -> Pattern {
        self.inner.borrow().t.clone()
    }

    pub fn x(&self) -> Pattern {
        self.inner.borrow().x.clone()
    }

    pub fn y(&self) -> Pattern {
        self.inner.borrow().y.clone()
    }

    pub fn z(&self) -> Pattern {
        self.inner.borrow().z.clone()
    }

    pub fn xyz(&self) -> Pattern {
        self.inner.borrow().xyz.clone()
    }

    pub fn e(&self) -> Pattern {
        self.inner.borrow().e.clone()
    }

    pub fn m(&self) -> Pattern {
        self.inner.borrow().m.clone()
    }

    pub fn mute(&self) -> Pattern {
        self.inner.borrow().mute.clone()
    }

    pub fn solo(&self) -> Pattern {
        self.inner.borrow().solo.clone()
    }

    /// Rename an outgoing parameter key for this stream.
    pub fn remap(&self, from: &str, to: &str) {
        self.inner
            .borrow_mut()
            .remap
            .insert(from.to_string(), to.to_string());
    }

    /// Reset every owned pattern and the remap table. Entities survive;
    /// their chains do not.
    pub fn reset(&self) {
        {
            let st = self.inner.borrow();
            for pat in st
                .p
                .values()
                .chain(st.px.values())
                .chain(st.py.values())
                .chain(st.pz.values())
            {
                pat.reset();
            }
            for pat in [
                &st.t, &st.x, &st.y, &st.z, &st.xyz, &st.e, &st.m, &st.mute, &st.solo,
            ] {
                pat.reset();
            }
        }
        let mut st = self.inner.borrow_mut();
        st.remap.clear();
        st.time = 0.0;
        st.e_gate = false;
        st.m_gate = false;
        st.muted = false;
        st.solo_gate = false;
    }

    // ============= Per-tick resolution =============

    /// Resolve the stream's time and its event gate. The time is the
    /// stream's own `t` chain when declared, else the global time. The
    /// gate is `e` ANDed with NOT `mute`. All four results are stored as
    /// tick-local state.
    pub fn get_e(&self, global_tick: f64, global_time: f64, divisions: f64, bpm: f64) -> bool {
        let (t, mute, solo, e) = {
            let st = self.inner.borrow();
            (
                st.t.clone(),
                st.mute.clone(),
                st.solo.clone(),
                st.e.clone(),
            )
        };
        let time = if t.has() {
            t.get(global_tick, divisions, bpm)
                .as_num()
                .unwrap_or(global_time)
        } else {
            global_time
        };
        let muted = mute.get(time, divisions, bpm).is_truthy();
        let solo_gate = solo.get(time, divisions, bpm).is_truthy();
        let e_gate = e.get(time, divisions, bpm).is_truthy() && !muted;

        let mut st = self.inner.borrow_mut();
        st.time = time;
        st.muted = muted;
        st.solo_gate = solo_gate;
        st.e_gate = e_gate;
        e_gate
    }

    /// Mutation gate at the time already resolved by `get_e`.
    pub fn get_m(&self, divisions: f64, bpm: f64) -> bool {
        let (m, time, muted) = {
            let st = self.inner.borrow();
            (st.m.clone(), st.time, st.muted)
        };
        let m_gate = m.get(time, divisions, bpm).is_truthy() && !muted;
        self.inner.borrow_mut().m_gate = m_gate;
        m_gate
    }

    /// Compile this tick's parameter object.
    ///
    /// Skipped entirely when neither gate is up. Otherwise the groups
    /// merge in fixed precedence (later overrides earlier): global `p` at
    /// the global time, global `px`/`py`/`pz` at this stream's wrapped
    /// coordinates, then the stream's own groups the same way, then `bpm`
    /// and `divisions` as literal fields. Keys carrying the mutation
    /// marker land in both halves, stripped; `mparams` additionally
    /// resolves `lag`.
    pub fn get(
        &self,
        global_time: f64,
        divisions: f64,
        space: f64,
        bpm: f64,
        globals: &Stream,
    ) -> StreamOutput {
        let (id, time, e, m, solo) = {
            let st = self.inner.borrow();
            (st.id.clone(), st.time, st.e_gate, st.m_gate, st.solo_gate)
        };
        let (xyz, xp, yp, zp) = {
            let st = self.inner.borrow();
            (st.xyz.clone(), st.x.clone(), st.y.clone(), st.z.clone())
        };

        // list-valued xyz wins component-wise over the individual patterns
        let xyz_v: Vec<f64> = if xyz.has() {
            xyz.get(time, divisions, bpm).nums()
        } else {
            Vec::new()
        };
        let coord = |i: usize, pat: &Pattern| -> f64 {
            if let Some(c) = xyz_v.get(i) {
                *c
            } else if pat.has() {
                pat.get(time, divisions, bpm).as_num().unwrap_or(0.0)
            } else {
                0.0
            }
        };
        let x = wrap(coord(0, &xp), space);
        let y = wrap(coord(1, &yp), space);
        let z = wrap(coord(2, &zp), space);

        if !e && !m {
            return StreamOutput {
                id,
                e,
                m,
                solo,
                eparams: HashMap::new(),
                mparams: HashMap::new(),
            };
        }

        let mut merged: HashMap<String, ParamValue> = HashMap::new();
        globals.collect_group(Group::P, global_time, divisions, bpm, &mut merged);
        globals.collect_group(Group::Px, x, space, bpm, &mut merged);
        globals.collect_group(Group::Py, y, space, bpm, &mut merged);
        globals.collect_group(Group::Pz, z, space, bpm, &mut merged);
        self.collect_group(Group::P, time, divisions, bpm, &mut merged);
        self.collect_group(Group::Px, x, space, bpm, &mut merged);
        self.collect_group(Group::Py, y, space, bpm, &mut merged);
        self.collect_group(Group::Pz, z, space, bpm, &mut merged);
        merged.insert("bpm".to_string(), ParamValue::Num(bpm));
        merged.insert("divisions".to_string(), ParamValue::Num(divisions));

        let mut eparams = HashMap::new();
        let mut mparams = HashMap::new();
        let mut lag: Option<f64> = None;
        for (key, value) in merged {
            if let Some(stripped) = key.strip_prefix(MUTATION_MARKER) {
                if stripped == "lag" {
                    lag = Some(value.as_num());
                }
                eparams.insert(stripped.to_string(), value.clone());
                mparams.insert(stripped.to_string(), value);
            } else {
                if key == "lag" {
                    lag = Some(value.as_num());
                }
                eparams.insert(key, value);
            }
        }
        // one division's duration in ms, assuming a four-beat cycle
        let default_lag = if bpm > 0.0 && divisions > 0.0 {
            240_000.0 / bpm / divisions
        } else {
            0.0
        };
        mparams.insert("lag".to_string(), ParamValue::Num(lag.unwrap_or(default_lag)));

        let remap = self.inner.borrow().remap.clone();
        StreamOutput {
            id,
            e,
            m,
            solo,
            eparams: apply_remap(eparams, &remap),
            mparams: apply_remap(mparams, &remap),
        }
    }

    pub(crate) fn collect_group(
        &self,
        group: Group,
        tick: f64,
        divisions: f64,
        bpm: f64,
        out: &mut HashMap<String, ParamValue>,
    ) {
        let patterns: Vec<(String, Pattern)> = {
            let st = self.inner.borrow();
            let map = match group {
                Group::P => &st.p,
                Group::Px => &st.px,
                Group::Py => &st.py,
                Group::Pz => &st.pz,
            };
            map.iter().map(|(k, p)| (k.clone(), p.clone())).collect()
        };
        for (key, pat) in patterns {
            if !pat.has() {
                continue;
            }
            if let Some(v) = ParamValue::from_value(pat.get(tick, divisions, bpm)) {
                out.insert(key, v);
            }
        }
    }
}

fn wrap(v: f64, space: f64) -> f64 {
    if space > 0.0 {
        v.rem_euclid(space)
    } else {
        0.0
    }
}

/// The static alias table first, then the stream's own remap.
fn apply_remap(
    params: HashMap<String, ParamValue>,
    user: &HashMap<String, String>,
) -> HashMap<String, ParamValue> {
    let mut out = HashMap::with_capacity(params.len());
    for (key, value) in params {
        let aliased = ALIASES
            .get(key.as_str())
            .map(|s| (*s).to_string())
            .unwrap_or(key);
        let renamed = user.get(&aliased).cloned().unwrap_or(aliased);
        if out.contains_key(&renamed) {
            debug!("parameter remap collision on '{}'", renamed);
        }
        out.insert(renamed, value);
    }
    out
}
