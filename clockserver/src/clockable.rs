//! The clockable capability.
//!
//! # The `Clockable` trait
//!
//! Every simulated hardware block that wants to be advanced by the clock
//! server implements [`Clockable`]. The contract is deliberately small: a
//! module exposes a diagnostic name and a [`clock()`](Clockable::clock)
//! method invoked once per firing with the local cycle counter of the clock
//! registry the module resolved to. Modules that need to act on a specific
//! clock edge additionally implement
//! [`clock_on_edge()`](Clockable::clock_on_edge) and report the capability
//! through [`has_phased_clock()`](Clockable::has_phased_clock); registering
//! with an explicit edge is a configuration error otherwise.
//!
//! Modules are shared with the server (and, in threaded mode, with the
//! worker thread they are statically assigned to) through a
//! [`ClockableHandle`], i.e. an `Arc<Mutex<dyn Clockable>>`:
//!
//! ```
//! use std::sync::{Arc, Mutex};
//!
//! use clockserver::clockable::{Clockable, ClockableHandle, Cycle};
//!
//! struct Core {
//!     retired: u64,
//! }
//!
//! impl Clockable for Core {
//!     fn name(&self) -> &str {
//!         "core0"
//!     }
//!
//!     fn clock(&mut self, _cycle: Cycle) {
//!         self.retired += 1;
//!     }
//! }
//!
//! let core: ClockableHandle = Arc::new(Mutex::new(Core { retired: 0 }));
//! ```
//!
//! # Clock bindings
//!
//! A successful registration returns a [`ClockBinding`]: the immutable,
//! resolved outcome of the registration (domain, skew, edge and the worker
//! the module was mapped to). A module typically stores its binding so it
//! can later query its own clocking parameters. A child module that never
//! registers on its own is not schedulable; it may instead keep a clone of
//! its parent's binding and delegate all clock-info queries to it.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::worker::WorkerId;

/// A local cycle count, as seen by one clock registry.
pub type Cycle = u64;

/// The clock edge a phased callback fires on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ClockEdge {
    /// The rising edge, at the start of the cycle.
    Rising,
    /// The falling edge, half a cycle after the rising edge.
    Falling,
}

impl fmt::Display for ClockEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rising => f.write_str("rising"),
            Self::Falling => f.write_str("falling"),
        }
    }
}

/// The capability a module implements to become schedulable.
///
/// The scheduler observes none of the module's state directly; the side
/// effects of a firing are entirely the module's own.
pub trait Clockable: Send {
    /// Diagnostic name of the module, used in profiling reports and error
    /// messages.
    fn name(&self) -> &str;

    /// Advances the module by one cycle.
    ///
    /// `cycle` is the local cycle counter of the registry this module
    /// resolved to; it starts at 0 and increments by 1 at every firing.
    fn clock(&mut self, cycle: Cycle);

    /// Advances the module by one clock phase.
    ///
    /// Only invoked for registrations made with an explicit edge; such
    /// registrations require [`has_phased_clock()`](Self::has_phased_clock)
    /// to return `true`. The default implementation ignores the edge and
    /// forwards to [`clock()`](Self::clock).
    fn clock_on_edge(&mut self, cycle: Cycle, edge: ClockEdge) {
        let _ = edge;
        self.clock(cycle);
    }

    /// Whether this module supplies a phased callback.
    fn has_phased_clock(&self) -> bool {
        false
    }
}

/// A shared, lockable handle to a schedulable module.
pub type ClockableHandle = Arc<Mutex<dyn Clockable>>;

/// The resolved, immutable outcome of a successful clock registration.
///
/// Bindings are cheap to clone; a child module without a registration of its
/// own can hold a clone of its parent's binding.
#[derive(Clone, Debug)]
pub struct ClockBinding {
    inner: Arc<BindingInner>,
}

#[derive(Debug)]
struct BindingInner {
    domain: String,
    skew: u8,
    edge: ClockEdge,
    worker: WorkerId,
}

impl ClockBinding {
    pub(crate) fn new(domain: String, skew: u8, edge: ClockEdge, worker: WorkerId) -> Self {
        Self {
            inner: Arc::new(BindingInner {
                domain,
                skew,
                edge,
                worker,
            }),
        }
    }

    /// Name of the clock domain the module is clocked in.
    pub fn domain(&self) -> &str {
        &self.inner.domain
    }

    /// Skew of the registration, as a percentage of one reference cycle.
    pub fn skew(&self) -> u8 {
        self.inner.skew
    }

    /// Edge the registration resolved to.
    ///
    /// Registrations made without an explicit edge resolve to
    /// [`ClockEdge::Rising`].
    pub fn edge(&self) -> ClockEdge {
        self.inner.edge
    }

    /// The worker thread the module was statically assigned to.
    ///
    /// The mapping is meaningful even when threaded clocking is disabled; in
    /// that case the worker is never spawned and the callbacks run inline.
    pub fn worker(&self) -> WorkerId {
        self.inner.worker
    }
}
