//! Clock registries and callbacks.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::clockable::{ClockEdge, ClockableHandle, Cycle};
use crate::matcher::MatcherEndpoint;
use crate::worker::WorkerId;

use super::domain::DomainId;

pub(crate) type RegistryId = usize;

/// Which callback flavor a registration bound.
#[derive(Copy, Clone, Debug)]
pub(crate) enum CallbackKind {
    /// `Clockable::clock`, fired once per cycle.
    Unphased,
    /// `Clockable::clock_on_edge`, fired with the given edge.
    Phased(ClockEdge),
}

/// A bound reference to one module's clock-handling method.
pub(crate) struct Callback {
    pub(crate) module: ClockableHandle,
    pub(crate) name: String,
    pub(crate) kind: CallbackKind,
    /// Static worker assignment, fixed at registration time.
    pub(crate) worker: WorkerId,
    pub(crate) profile: SharedProfile,
}

pub(crate) type SharedProfile = Arc<Mutex<CallbackProfile>>;

impl Callback {
    /// Fires the callback inline.
    pub(crate) fn invoke(&self, cycle: Cycle, profiling: bool) {
        run_callback(
            &self.module,
            self.kind,
            cycle,
            profiling.then_some(&self.profile),
        );
    }

    /// Packages the callback as a task for its assigned worker.
    pub(crate) fn task(&self, cycle: Cycle, profiling: bool) -> ClockTask {
        ClockTask {
            module: self.module.clone(),
            kind: self.kind,
            cycle,
            profile: profiling.then(|| self.profile.clone()),
        }
    }
}

/// One deferred callback invocation, executed by a worker thread.
pub(crate) struct ClockTask {
    module: ClockableHandle,
    kind: CallbackKind,
    cycle: Cycle,
    profile: Option<SharedProfile>,
}

impl ClockTask {
    pub(crate) fn run(self) {
        run_callback(&self.module, self.kind, self.cycle, self.profile.as_ref());
    }
}

fn run_callback(
    module: &ClockableHandle,
    kind: CallbackKind,
    cycle: Cycle,
    profile: Option<&SharedProfile>,
) {
    match profile {
        None => fire(module, kind, cycle),
        Some(profile) => {
            let start = Instant::now();
            fire(module, kind, cycle);
            let elapsed = start.elapsed().as_nanos() as u64;
            profile.lock().unwrap().record(elapsed);
        }
    }
}

fn fire(module: &ClockableHandle, kind: CallbackKind, cycle: Cycle) {
    let mut module = module.lock().unwrap();
    match kind {
        CallbackKind::Unphased => module.clock(cycle),
        CallbackKind::Phased(edge) => module.clock_on_edge(cycle, edge),
    }
}

/// Accumulated per-callback profiling counters.
///
/// Times are wall-clock nanoseconds. The total is kept wraparound-adjusted:
/// [`wraparounds()`](CallbackProfile::wraparounds) reports how many times
/// the 32-bit image of the accumulator wrapped.
#[derive(Debug, Default)]
pub(crate) struct CallbackProfile {
    pub(crate) invocations: u64,
    pub(crate) total_ns: u64,
    pub(crate) min_ns: u64,
    pub(crate) max_ns: u64,
}

impl CallbackProfile {
    pub(crate) fn record(&mut self, elapsed_ns: u64) {
        if self.invocations == 0 || elapsed_ns < self.min_ns {
            self.min_ns = elapsed_ns;
        }
        if elapsed_ns > self.max_ns {
            self.max_ns = elapsed_ns;
        }
        self.invocations += 1;
        self.total_ns = self.total_ns.wrapping_add(elapsed_ns);
    }

    pub(crate) fn wraparounds(&self) -> u32 {
        (self.total_ns >> 32) as u32
    }
}

/// The atomic unit of scheduling: all callbacks sharing the same
/// (domain, skew, edge) fire together.
pub(crate) struct ClockRegistry {
    pub(crate) domain: DomainId,
    pub(crate) skew: u8,
    pub(crate) edge: ClockEdge,
    /// Base-cycles between successive firings.
    pub(crate) step: u64,
    /// Absolute base-cycle time of the next firing; non-decreasing.
    pub(crate) next_due: u64,
    /// Local cycle counter, passed to the callbacks.
    pub(crate) cycle: Cycle,
    pub(crate) callbacks: Vec<Callback>,
    /// Rate-matcher flushes, fired strictly after the module callbacks.
    pub(crate) writers: Vec<Box<dyn MatcherEndpoint>>,
}

impl ClockRegistry {
    pub(crate) fn new(domain: DomainId, skew: u8, edge: ClockEdge) -> Self {
        Self {
            domain,
            skew,
            edge,
            step: 0,
            next_due: 0,
            cycle: 0,
            callbacks: Vec::new(),
            writers: Vec::new(),
        }
    }

    /// Derives the step from the base frequency and schedules the first
    /// firing, offset by the skew and, for falling-edge registries, by half
    /// a period.
    pub(crate) fn reset_schedule(&mut self, base_frequency: u64, frequency: u64) {
        self.step = base_frequency / frequency;
        self.next_due = self.step * u64::from(self.skew) / 100;
        if self.edge == ClockEdge::Falling {
            self.next_due += self.step / 2;
        }
    }

    /// Applies a new working frequency.
    ///
    /// The already-scheduled `next_due` is deliberately left untouched: the
    /// interval committed under the old step completes, and the new step
    /// applies from the following firing on.
    pub(crate) fn retune(&mut self, base_frequency: u64, frequency: u64) {
        self.step = base_frequency / frequency;
    }
}
