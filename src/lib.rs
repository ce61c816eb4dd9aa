//! # Magnon - Tick-Synchronous Pattern Engine for Live Coding
//!
//! Magnon is the pattern-evaluation core of a live-coding system for
//! generative music. User code builds, per musical stream, chains of
//! value generators that are re-evaluated on every timing tick to decide
//! whether to fire a musical event or mutate an in-flight one. The crate
//! is the interpreter: it knows nothing about synthesis, MIDI or OSC -
//! it emits one batch of compiled parameters per tick and independent
//! collaborators consume it.
//!
//! ## Core pieces
//!
//! - [`position`] - folding ticks and coordinates into `[0, modulus)`
//! - [`mini_notation`] - the textual sub-language, compiled to bars of
//!   slots and cached per source string
//! - [`pattern`] - chainable value generators reduced per tick
//! - [`stream`] - named parameter bundles with event/mutation gates
//! - [`scheduler`] - the per-tick driver emitting batches
//!
//! ## Quick start
//!
//! ```rust
//! use magnon::scheduler::{Scheduler, SchedulerConfig};
//!
//! let mut scheduler = Scheduler::new(SchedulerConfig::default());
//! scheduler.submit(|ctx| {
//!     if let Some(s0) = ctx.s(0) {
//!         s0.e().every(4.0);
//!         s0.p("note").set("60 63 67 | 58 62 65").tune(0.0);
//!         s0.p("gain").sine(1.0).mul(0.8);
//!     }
//! });
//! scheduler.start();
//!
//! let batch = scheduler.tick(0.0, 0.0).unwrap();
//! assert_eq!(batch.events.len(), 1);
//! assert!(batch.events[0].eparams.contains_key("note"));
//! ```
//!
//! ## Mini-notation
//!
//! - **`1 2 3`** - one slot per value
//! - **`1*4`**, **`2--`** - repeat / hold
//! - **`^1011`** - binary digits, one slot each
//! - **`3:8`** - 3 pulses distributed over 8 slots
//! - **`0..3`** - integer range
//! - **`1?0*16`** - per-slot random choice
//! - **`0,3,7*6`** - alternation by slot index
//! - **`(1 2)*2`** - group repeated as a whole
//! - **`[60 64 67]`** - chord: one list-valued slot
//! - **`a | b`** - bar separator
//!
//! ## Evaluation model
//!
//! Each tick runs to completion before the next begins; there is no
//! concurrent tick execution, so patterns carry state (toggle flip-flops,
//! cached values) across ticks by design. A pattern's cached value from
//! tick N is readable by any other pattern during tick N, provided global
//! groups evaluate before stream-local ones - the scheduler guarantees
//! that order.

pub mod mini_notation;
pub mod pattern;
pub mod pattern_ops;
pub mod pattern_tonal;
pub mod position;
pub mod scheduler;
pub mod stream;

pub use pattern::{Arg, Op, Pattern, Value};
pub use scheduler::{
    Batch, Clock, CollaboratorPayload, Context, EventOut, MutationOut, Scheduler, SchedulerConfig,
    SchedulerState,
};
pub use stream::{ParamValue, Stream, StreamOutput};
