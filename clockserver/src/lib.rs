//! A cycle-granular clock scheduling engine for microarchitectural
//! performance simulators.
//!
//! This crate is the orchestration backbone of a cycle-accurate hardware
//! model: it owns time, ordering and concurrency for the whole simulated
//! machine. Simulated blocks implement the
//! [`Clockable`](clockable::Clockable) capability and register with the
//! [`ClockServer`](server::ClockServer), which then advances every block one
//! logical clock edge at a time, across independently-clocked domains with
//! arbitrary frequency ratios and intra-domain phase skews. The work can
//! optionally be distributed over a fixed pool of worker threads with a
//! cycle-granular barrier, and the per-cycle invocation order can be
//! randomized for concurrency-bug hunting while remaining
//! seed-deterministic.
//!
//! # Concepts
//!
//! * A **clock domain** is a named group of modules sharing one working
//!   frequency, selectable at run time from a fixed allowed set.
//! * A **skew** is a phase offset, expressed as a percentage of one
//!   reference cycle, distinguishing modules of the same domain that must
//!   not fire at identical sub-cycle instants.
//! * A **clock registry** is the engine's unit of dispatch: all callbacks
//!   registered with the same (domain, skew, edge) fire together and share
//!   one local cycle counter.
//! * The **base frequency** is the least common multiple of every allowed
//!   frequency of every domain; it defines the engine's common time unit,
//!   the *base cycle*. A registry in a domain clocked at frequency `f`
//!   fires every `base / f` base cycles.
//! * A **rate matcher** is a buffering adapter reconciling differing
//!   frequencies between a producer and consumer module; see the
//!   [`matcher`] module.
//!
//! # A worked example
//!
//! A bus clocked at half the core frequency:
//!
//! ```
//! use std::sync::{Arc, Mutex};
//!
//! use clockserver::clockable::{Clockable, ClockableHandle, Cycle};
//! use clockserver::server::ClockServer;
//!
//! struct Counter {
//!     name: &'static str,
//!     fired: u64,
//! }
//!
//! impl Clockable for Counter {
//!     fn name(&self) -> &str {
//!         self.name
//!     }
//!
//!     fn clock(&mut self, _cycle: Cycle) {
//!         self.fired += 1;
//!     }
//! }
//!
//! let core = Arc::new(Mutex::new(Counter { name: "core0", fired: 0 }));
//! let bus = Arc::new(Mutex::new(Counter { name: "bus", fired: 0 }));
//! let core_handle: ClockableHandle = core.clone();
//! let bus_handle: ClockableHandle = bus.clone();
//!
//! let mut server = ClockServer::new();
//! server.new_domain("core", &[200], None).unwrap();
//! server.new_domain("bus", &[100], None).unwrap();
//! server.register_clock(&core_handle, "core", 0, None, None).unwrap();
//! server.register_clock(&bus_handle, "bus", 0, None, None).unwrap();
//! server.init().unwrap();
//!
//! // 100 and 200 normalized units give a base frequency of 200.
//! assert_eq!(server.base_frequency(), 200);
//!
//! // Advance four base cycles; the core ticks twice as often as the bus.
//! let mut elapsed = 0;
//! while elapsed < 4 {
//!     elapsed += server.clock();
//! }
//! assert_eq!(core.lock().unwrap().fired, 5); // base cycles 0, 1, 2, 3, 4
//! assert_eq!(bus.lock().unwrap().fired, 3); // base cycles 0, 2, 4
//! ```
//!
//! # Ordering and determinism
//!
//! The engine is deterministic in every mode. Within one registry, modules
//! fire in registration order or, under randomized clocking, in a
//! permutation drawn from a private seeded generator, so two runs with the
//! same seed and the same registration sequence are bit-identical.
//! Registries due at the same base-cycle time are dispatched in the fixed
//! FIFO order of the queue, never in an order chosen by the runtime. A
//! registry's rate-matcher flushes always run strictly after its own module
//! callbacks for the tick.
//!
//! # Threaded clocking
//!
//! With [`set_threaded_clocking()`](server::ClockServer::set_threaded_clocking)
//! enabled, each module's callback runs on the worker thread it was
//! statically assigned to at registration time. The server distributes the
//! tick's callbacks, wakes every worker with pending tasks, then joins them
//! all before touching rate matchers or advancing time, so no callback of
//! cycle N+1 can start before every callback of cycle N has completed.

#![warn(missing_docs, missing_debug_implementations, unreachable_pub)]

pub mod clockable;
pub mod matcher;
pub mod server;
pub mod stats;
pub(crate) mod util;
pub(crate) mod worker;
