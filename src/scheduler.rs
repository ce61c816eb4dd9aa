//! The per-tick driver: clock, stream pool, batch assembly, broadcast.
//!
//! One scheduler owns the global clock, a globals stream carrying the
//! global time override and global parameter groups, and a fixed pool of
//! instrument and effect streams. Each tick it resolves the clock,
//! evaluates every stream, applies the solo override, partitions the
//! results into events and mutations and emits exactly one batch. A code
//! submission resets the whole pool atomically between ticks.

use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender};

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use crate::stream::{ParamValue, Stream, StreamOutput};

/// Global clock state.
#[derive(Debug, Clone)]
pub struct Clock {
    pub tick: u64,
    pub divisions: u32,
    pub space: u32,
    pub bpm: f64,
}

impl Clock {
    pub fn cycle(&self) -> u64 {
        self.tick / u64::from(self.divisions.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub divisions: u32,
    pub space: u32,
    pub bpm: f64,
    pub instrument_streams: usize,
    pub fx_streams: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            divisions: 16,
            space: 16,
            bpm: 120.0,
            instrument_streams: 8,
            fx_streams: 4,
        }
    }
}

/// Opaque collaborator payloads carried through each batch untouched.
#[derive(Debug, Clone, Default)]
pub struct CollaboratorPayload {
    pub gates: JsonValue,
    pub measurements: JsonValue,
    pub feedback: JsonValue,
    pub inputs: JsonValue,
    pub v: JsonValue,
    pub grid: JsonValue,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventOut {
    pub id: String,
    pub eparams: HashMap<String, ParamValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MutationOut {
    pub id: String,
    pub mparams: HashMap<String, ParamValue>,
}

/// One tick's emitted batch.
#[derive(Debug, Clone, Serialize)]
pub struct Batch {
    pub time: f64,
    pub delta: f64,
    pub t: u64,
    pub c: u64,
    pub q: u32,
    pub s: u32,
    pub events: Vec<EventOut>,
    pub mutations: Vec<MutationOut>,
    pub gates: JsonValue,
    pub measurements: JsonValue,
    pub feedback: JsonValue,
    pub inputs: JsonValue,
    pub v: JsonValue,
    pub grid: JsonValue,
}

pub struct Scheduler {
    clock: Clock,
    state: SchedulerState,
    globals: Stream,
    streams: Vec<Stream>,
    fx: Vec<Stream>,
    subscribers: Vec<Sender<Batch>>,
    payload: CollaboratorPayload,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let streams = (0..config.instrument_streams)
            .map(|i| Stream::new(format!("s{}", i)))
            .collect();
        let fx = (0..config.fx_streams)
            .map(|i| Stream::new(format!("fx{}", i)))
            .collect();
        Scheduler {
            clock: Clock {
                tick: 0,
                divisions: config.divisions.max(1),
                space: config.space.max(1),
                bpm: if config.bpm > 0.0 { config.bpm } else { 120.0 },
            },
            state: SchedulerState::Idle,
            globals: Stream::new("global"),
            streams,
            fx,
            subscribers: Vec::new(),
            payload: CollaboratorPayload::default(),
        }
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SchedulerState::Running
    }

    pub fn start(&mut self) {
        self.state = SchedulerState::Running;
        info!("scheduler running");
    }

    pub fn stop(&mut self) {
        self.state = SchedulerState::Idle;
        info!("scheduler idle");
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        if bpm > 0.0 {
            self.clock.bpm = bpm;
        }
    }

    pub fn set_divisions(&mut self, divisions: u32) {
        self.clock.divisions = divisions.max(1);
    }

    pub fn set_space(&mut self, space: u32) {
        self.clock.space = space.max(1);
    }

    pub fn set_payload(&mut self, payload: CollaboratorPayload) {
        self.payload = payload;
    }

    /// Hand out a receiver for the per-tick batch broadcast. Dead
    /// receivers are pruned as they are discovered.
    pub fn subscribe(&mut self) -> Receiver<Batch> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    /// Apply a new code submission: reset every stream, the global
    /// controls and the clock origin, then run the builder against a
    /// fresh namespace.
    pub fn submit(&mut self, build: impl FnOnce(&mut Context)) {
        self.submit_inner(build, true);
    }

    /// Resubmit without rewinding the clock.
    pub fn submit_keeping_time(&mut self, build: impl FnOnce(&mut Context)) {
        self.submit_inner(build, false);
    }

    fn submit_inner(&mut self, build: impl FnOnce(&mut Context), rewind: bool) {
        self.globals.reset();
        for stream in self.streams.iter().chain(self.fx.iter()) {
            stream.reset();
        }
        if rewind {
            self.clock.tick = 0;
        }
        let mut ctx = Context { scheduler: self };
        build(&mut ctx);
        info!(
            "code submission applied ({} streams, rewind: {})",
            self.streams.len() + self.fx.len(),
            rewind
        );
    }

    /// Run one tick: resolve the clock, evaluate every stream, apply the
    /// solo override, partition into events and mutations, advance the
    /// counter and emit one batch. Returns `None` while idle.
    pub fn tick(&mut self, now_ms: f64, delta_ms: f64) -> Option<Batch> {
        if self.state != SchedulerState::Running {
            return None;
        }
        let raw = self.clock.tick as f64;
        let divisions = f64::from(self.clock.divisions);
        let space = f64::from(self.clock.space);
        let bpm = self.clock.bpm;

        let global_t = self.globals.t();
        let global_time = if global_t.has() {
            global_t.get(raw, divisions, bpm).as_num().unwrap_or(raw)
        } else {
            raw
        };

        let mut records: Vec<StreamOutput> =
            Vec::with_capacity(self.streams.len() + self.fx.len());
        for stream in self.streams.iter().chain(self.fx.iter()) {
            stream.get_e(raw, global_time, divisions, bpm);
            stream.get_m(divisions, bpm);
            records.push(stream.get(global_time, divisions, space, bpm, &self.globals));
        }

        if records.iter().any(|r| r.solo) {
            records.retain(|r| r.solo);
        }

        let mut events = Vec::new();
        let mut mutations = Vec::new();
        for record in records {
            if record.e {
                events.push(EventOut {
                    id: record.id.clone(),
                    eparams: record.eparams,
                });
            }
            if record.m {
                mutations.push(MutationOut {
                    id: record.id,
                    mparams: record.mparams,
                });
            }
        }

        let batch = Batch {
            time: now_ms,
            delta: delta_ms,
            t: self.clock.tick,
            c: self.clock.cycle(),
            q: self.clock.divisions,
            s: self.clock.space,
            events,
            mutations,
            gates: self.payload.gates.clone(),
            measurements: self.payload.measurements.clone(),
            feedback: self.payload.feedback.clone(),
            inputs: self.payload.inputs.clone(),
            v: self.payload.v.clone(),
            grid: self.payload.grid.clone(),
        };
        debug!(
            "tick {}: {} events, {} mutations",
            self.clock.tick,
            batch.events.len(),
            batch.mutations.len()
        );
        self.subscribers.retain(|tx| tx.send(batch.clone()).is_ok());
        self.clock.tick += 1;
        Some(batch)
    }
}

/// The namespace handed to a code submission: stream lookup plus the
/// clock controls live code is allowed to touch.
pub struct Context<'a> {
    scheduler: &'a mut Scheduler,
}

impl Context<'_> {
    /// Instrument stream by pool index.
    pub fn s(&self, index: usize) -> Option<Stream> {
        self.scheduler.streams.get(index).cloned()
    }

    /// Effect stream by pool index.
    pub fn fx(&self, index: usize) -> Option<Stream> {
        self.scheduler.fx.get(index).cloned()
    }

    /// Any stream by identity (`s0`, `fx1`, ...).
    pub fn stream(&self, name: &str) -> Option<Stream> {
        self.scheduler
            .streams
            .iter()
            .chain(self.scheduler.fx.iter())
            .find(|s| s.id() == name)
            .cloned()
    }

    /// The globals stream: global time override and global parameter
    /// groups.
    pub fn globals(&self) -> Stream {
        self.scheduler.globals.clone()
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        self.scheduler.set_bpm(bpm);
    }

    pub fn set_divisions(&mut self, divisions: u32) {
        self.scheduler.set_divisions(divisions);
    }

    pub fn set_space(&mut self, space: u32) {
        self.scheduler.set_space(space);
    }
}
