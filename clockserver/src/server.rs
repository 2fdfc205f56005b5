//! The clock server.
//!
//! The [`ClockServer`] owns simulated time, ordering and concurrency for an
//! entire simulated machine. Its lifecycle has two phases:
//!
//! 1. **Configuration**: clock domains are created with
//!    [`new_domain()`](ClockServer::new_domain), modules and rate matchers
//!    are registered, and the clocking modes (threaded, randomized,
//!    unique-domain optimization, profiling) are selected. Configuration
//!    errors are reported synchronously as [`ClockError`]s.
//! 2. **Simulation**: after [`init()`](ClockServer::init) has computed the
//!    shared base frequency and seeded the dispatch queue, the external
//!    simulation driver calls [`clock()`](ClockServer::clock) in a loop.
//!    Each call advances simulated time by the smallest increment needed to
//!    fire at least one clock registry and returns the number of elapsed
//!    base cycles.
//!
//! All callbacks that registered with the same (domain, skew, edge) triple
//! belong to one clock registry and fire together. Within a registry,
//! callbacks fire in registration order, or in a seed-deterministic random
//! permutation when randomized clocking is enabled. Registries due at the
//! same base-cycle time are dispatched in the FIFO order the queue pops
//! them, so a whole run is reproducible in every mode.

pub(crate) mod domain;
mod profile;
pub(crate) mod registry;

use std::collections::VecDeque;
use std::error::Error;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use slab::Slab;
use tracing::{debug, info};

use crate::clockable::{ClockBinding, ClockEdge, ClockableHandle, Cycle};
use crate::matcher::{MatcherEndpoint, RateMatcher};
use crate::stats::StateSink;
use crate::util::priority_queue::PriorityQueue;
use crate::util::rng::Rng;
use crate::worker::Worker;

pub use crate::worker::WorkerId;

use domain::{ClockDomain, DomainId};
use registry::{Callback, CallbackKind, ClockRegistry, RegistryId};

/// An error raised while configuring the clock server.
///
/// Configuration is validated synchronously, at registration or at
/// [`init()`](ClockServer::init) time, so a simulation never starts from an
/// inconsistent time base.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ClockError {
    /// A clock domain with this name already exists.
    DuplicateDomain(String),
    /// No clock domain with this name exists.
    UnknownDomain(String),
    /// The requested skew is not below 100%.
    SkewOutOfRange {
        /// Domain the registration named.
        domain: String,
        /// Requested skew.
        skew: u8,
    },
    /// A domain was created with an empty allowed-frequency set.
    EmptyFrequencySet(String),
    /// A domain was created with a zero frequency in its allowed set.
    ZeroFrequency(String),
    /// The requested frequency is not in the domain's allowed set.
    FrequencyNotAllowed {
        /// Domain the request named.
        domain: String,
        /// Requested frequency.
        frequency: u64,
    },
    /// A registration requested an explicit edge, but the module supplies no
    /// phased callback.
    PhasedClockRequired {
        /// Name of the module.
        module: String,
    },
    /// The worker used as a placement hint was never mapped.
    UnknownWorker(WorkerId),
    /// A rate matcher reached init with no connected reader.
    UnconnectedRateMatcher {
        /// Identity of the matcher.
        matcher: String,
    },
    /// A rate-matcher reader is bound to a different domain or skew than the
    /// one the matcher was registered to.
    MismatchedRateMatcherPeer {
        /// Identity of the matcher.
        matcher: String,
        /// Domain the matcher was registered to.
        domain: String,
        /// Skew the matcher was registered to.
        skew: u8,
        /// Domain the offending reader is bound to.
        peer_domain: String,
        /// Skew the offending reader is bound to.
        peer_skew: u8,
    },
    /// Threaded and randomized clocking were both requested.
    IncompatibleClockingModes,
    /// The least common multiple of the registered frequencies overflows 64
    /// bits.
    BaseFrequencyOverflow,
    /// Init was requested with no registered module or rate matcher.
    NothingClocked,
    /// The operation is only legal before [`init()`](ClockServer::init).
    AlreadyInitialized,
}

impl fmt::Display for ClockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateDomain(name) => {
                write!(f, "a clock domain named `{name}` already exists")
            }
            Self::UnknownDomain(name) => write!(f, "no clock domain named `{name}` exists"),
            Self::SkewOutOfRange { domain, skew } => write!(
                f,
                "skew {skew}% is out of range for domain `{domain}` (skews must be below 100%)"
            ),
            Self::EmptyFrequencySet(name) => {
                write!(f, "domain `{name}` was given an empty frequency set")
            }
            Self::ZeroFrequency(name) => {
                write!(f, "domain `{name}` was given a zero frequency")
            }
            Self::FrequencyNotAllowed { domain, frequency } => write!(
                f,
                "frequency {frequency} is not in the allowed set of domain `{domain}`"
            ),
            Self::PhasedClockRequired { module } => write!(
                f,
                "module `{module}` was registered with an explicit edge but supplies no phased callback"
            ),
            Self::UnknownWorker(worker) => {
                write!(f, "worker {} was never mapped", worker.index())
            }
            Self::UnconnectedRateMatcher { matcher } => {
                write!(f, "rate matcher `{matcher}` has no connected reader")
            }
            Self::MismatchedRateMatcherPeer {
                matcher,
                domain,
                skew,
                peer_domain,
                peer_skew,
            } => write!(
                f,
                "rate matcher `{matcher}` is registered to domain `{domain}` at skew {skew}% \
                 but a reader is bound to domain `{peer_domain}` at skew {peer_skew}%"
            ),
            Self::IncompatibleClockingModes => {
                write!(f, "threaded and randomized clocking cannot be combined")
            }
            Self::BaseFrequencyOverflow => {
                write!(f, "the base frequency overflows 64 bits")
            }
            Self::NothingClocked => {
                write!(f, "no module or rate matcher was registered")
            }
            Self::AlreadyInitialized => {
                write!(f, "the clock server is already initialized")
            }
        }
    }
}

impl Error for ClockError {}

/// The time-ordered dispatch queue.
///
/// The rotation variant is the single-domain specialization: with one
/// domain, every registry shares the same step, so once the entries are
/// sorted by due time their relative order never changes and reinsertion
/// reduces to pushing at the back of a ring.
enum DispatchQueue {
    Ordered(PriorityQueue<u64, RegistryId>),
    Rotation(VecDeque<RegistryId>),
}

/// The clock scheduling engine.
///
/// See the [module documentation](self) for an overview and the
/// [crate documentation](crate) for a worked example.
pub struct ClockServer {
    domains: Vec<ClockDomain>,
    registries: Slab<ClockRegistry>,
    queue: DispatchQueue,
    workers: Vec<Worker>,
    /// Least common multiple of every allowed frequency of every domain.
    base_frequency: u64,
    /// Base-cycle time of the last dispatched tick.
    last_tick: u64,
    threaded: bool,
    random: Option<Rng>,
    unique_domain_opt: bool,
    profiling: bool,
    initialized: bool,
}

impl Default for ClockServer {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockServer {
    /// Creates a clock server with no domains and no registrations.
    pub fn new() -> Self {
        Self {
            domains: Vec::new(),
            registries: Slab::new(),
            queue: DispatchQueue::Ordered(PriorityQueue::new()),
            workers: Vec::new(),
            base_frequency: 0,
            last_tick: 0,
            threaded: false,
            random: None,
            unique_domain_opt: false,
            profiling: false,
            initialized: false,
        }
    }

    /// Maps a new worker.
    ///
    /// Workers map simulation modules to OS threads when threaded clocking
    /// is enabled; the returned identifier can be passed as a placement hint
    /// to [`register_clock()`](ClockServer::register_clock) or
    /// [`new_domain()`](ClockServer::new_domain).
    pub fn new_worker(&mut self) -> WorkerId {
        let id = WorkerId(self.workers.len());
        self.workers.push(Worker::new(id));
        id
    }

    /// Creates a clock domain with the given unique name and ordered set of
    /// allowed frequencies.
    ///
    /// The domain's initial working frequency is the first entry of the
    /// allowed set. Modules registered in this domain without a placement
    /// hint are assigned to `worker`, or to a freshly mapped worker if none
    /// is supplied.
    pub fn new_domain(
        &mut self,
        name: &str,
        frequencies: &[u64],
        worker: Option<WorkerId>,
    ) -> Result<(), ClockError> {
        if self.initialized {
            return Err(ClockError::AlreadyInitialized);
        }
        if frequencies.is_empty() {
            return Err(ClockError::EmptyFrequencySet(name.to_string()));
        }
        if frequencies.contains(&0) {
            return Err(ClockError::ZeroFrequency(name.to_string()));
        }
        if self.domains.iter().any(|domain| domain.name == name) {
            return Err(ClockError::DuplicateDomain(name.to_string()));
        }
        let worker = match worker {
            Some(worker) => self.checked_worker(worker)?,
            None => self.new_worker(),
        };

        debug!(domain = name, ?frequencies, "clock domain created");
        self.domains
            .push(ClockDomain::new(name.to_string(), frequencies.to_vec(), worker));

        Ok(())
    }

    /// Selects a domain's working frequency from its allowed set.
    ///
    /// When issued after init, the step of every registry of the domain is
    /// recomputed, but already-scheduled due times are never shifted: the
    /// interval committed under the old step completes, and the new step
    /// applies from the following firing on.
    pub fn set_domain_frequency(&mut self, name: &str, frequency: u64) -> Result<(), ClockError> {
        let did = self.domain_id(name)?;
        if !self.domains[did].allows(frequency) {
            return Err(ClockError::FrequencyNotAllowed {
                domain: name.to_string(),
                frequency,
            });
        }
        self.domains[did].frequency = frequency;

        if self.initialized {
            let base = self.base_frequency;
            for i in 0..self.domains[did].registries.len() {
                let rid = self.domains[did].registries[i];
                self.registries[rid].retune(base, frequency);
            }
            // The rotation specialization relies on a uniform step; fall
            // back to the general queue for the remainder of the run.
            if matches!(self.queue, DispatchQueue::Rotation(_)) {
                self.rebuild_ordered_queue();
            }
        }

        debug!(domain = name, frequency, "domain frequency set");
        Ok(())
    }

    /// Enables or disables threaded clocking.
    ///
    /// When enabled, callbacks are executed by the fixed worker pool with a
    /// cycle-granular barrier instead of running inline.
    pub fn set_threaded_clocking(&mut self, enabled: bool) -> Result<(), ClockError> {
        if self.initialized {
            return Err(ClockError::AlreadyInitialized);
        }
        self.threaded = enabled;
        Ok(())
    }

    /// Enables randomized clocking with the given seed.
    ///
    /// In this mode the invocation order within each registry is a random
    /// permutation drawn from a generator private to the server; two runs
    /// with the same seed and the same registration sequence produce
    /// identical orders.
    pub fn set_random_clocking_seed(&mut self, seed: u64) -> Result<(), ClockError> {
        if self.initialized {
            return Err(ClockError::AlreadyInitialized);
        }
        self.random = Some(Rng::new(seed));
        Ok(())
    }

    /// Enables the single-domain dispatch specialization.
    ///
    /// Observable behavior is identical to the general path; the
    /// specialization only engages when it is applicable.
    pub fn set_unique_domain_optimization(&mut self, enabled: bool) -> Result<(), ClockError> {
        if self.initialized {
            return Err(ClockError::AlreadyInitialized);
        }
        self.unique_domain_opt = enabled;
        Ok(())
    }

    /// Enables or disables per-callback profiling.
    pub fn set_profiling(&mut self, enabled: bool) {
        self.profiling = enabled;
    }

    /// Binds a module's clock method into the registry resolved from
    /// `(domain, skew, edge)`, creating the registry if the triple is new.
    ///
    /// Passing an explicit edge requires the module to supply a phased
    /// callback. The module is statically assigned to `worker`, or to the
    /// domain's default worker if no hint is given; the returned binding is
    /// immutable for the lifetime of the registration.
    ///
    /// # Panics
    ///
    /// Re-registering a module already bound to the same (domain, skew,
    /// edge) is a lifecycle violation and panics.
    pub fn register_clock(
        &mut self,
        module: &ClockableHandle,
        domain: &str,
        skew: u8,
        edge: Option<ClockEdge>,
        worker: Option<WorkerId>,
    ) -> Result<ClockBinding, ClockError> {
        if self.initialized {
            return Err(ClockError::AlreadyInitialized);
        }
        let did = self.domain_id(domain)?;
        if skew >= 100 {
            return Err(ClockError::SkewOutOfRange {
                domain: domain.to_string(),
                skew,
            });
        }

        let name = {
            let guard = module.lock().unwrap();
            if edge.is_some() && !guard.has_phased_clock() {
                return Err(ClockError::PhasedClockRequired {
                    module: guard.name().to_string(),
                });
            }
            guard.name().to_string()
        };

        let kind = match edge {
            None => CallbackKind::Unphased,
            Some(edge) => CallbackKind::Phased(edge),
        };
        let resolved_edge = edge.unwrap_or(ClockEdge::Rising);
        let worker = match worker {
            Some(worker) => self.checked_worker(worker)?,
            None => self.domains[did].worker,
        };

        let rid = self.resolve_registry(did, skew, resolved_edge);
        let registry = &mut self.registries[rid];
        assert!(
            !registry
                .callbacks
                .iter()
                .any(|callback| Arc::ptr_eq(&callback.module, module)),
            "module `{name}` is already bound to domain `{domain}` at skew {skew}% ({resolved_edge} edge)"
        );
        registry.callbacks.push(Callback {
            module: module.clone(),
            name,
            kind,
            worker,
            profile: Default::default(),
        });

        Ok(ClockBinding::new(
            domain.to_string(),
            skew,
            resolved_edge,
            worker,
        ))
    }

    /// Registers a rate matcher's flush on the consumer side.
    ///
    /// The flush fires as a writer callback of the `(domain, skew)` registry,
    /// strictly after that registry's module callbacks. At init time, the
    /// matcher must have at least one connected reader and every reader must
    /// be bound to this same domain and skew.
    ///
    /// # Panics
    ///
    /// Registering the same matcher twice is a lifecycle violation and
    /// panics.
    pub fn register_rate_matcher<T: Send + 'static>(
        &mut self,
        matcher: &RateMatcher<T>,
        domain: &str,
        skew: u8,
    ) -> Result<(), ClockError> {
        if self.initialized {
            return Err(ClockError::AlreadyInitialized);
        }
        let did = self.domain_id(domain)?;
        if skew >= 100 {
            return Err(ClockError::SkewOutOfRange {
                domain: domain.to_string(),
                skew,
            });
        }

        let channel_id = MatcherEndpoint::channel_id(matcher);
        for (_, registry) in self.registries.iter() {
            for writer in &registry.writers {
                assert!(
                    writer.channel_id() != channel_id,
                    "rate matcher `{}` is already registered",
                    matcher.name()
                );
            }
        }

        let rid = self.resolve_registry(did, skew, ClockEdge::Rising);
        self.registries[rid].writers.push(Box::new(matcher.clone()));

        Ok(())
    }

    /// Computes the shared base frequency, derives every registry's step and
    /// seeds the dispatch queue.
    ///
    /// Must be called exactly once, after all registrations and before the
    /// first [`clock()`](ClockServer::clock). The base frequency is the
    /// least common multiple of every allowed frequency of every domain, so
    /// any legal frequency change keeps all steps integral. When threaded
    /// clocking is enabled, the worker threads are spawned here.
    pub fn init(&mut self) -> Result<(), ClockError> {
        if self.initialized {
            return Err(ClockError::AlreadyInitialized);
        }
        if self.registries.is_empty() {
            return Err(ClockError::NothingClocked);
        }
        if self.threaded && self.random.is_some() {
            return Err(ClockError::IncompatibleClockingModes);
        }

        for (_, registry) in self.registries.iter() {
            let domain = &self.domains[registry.domain];
            for writer in &registry.writers {
                writer.validate(&domain.name, registry.skew)?;
            }
        }

        let mut base: u64 = 1;
        for domain in &self.domains {
            for &frequency in &domain.frequencies {
                base = lcm(base, frequency).ok_or(ClockError::BaseFrequencyOverflow)?;
            }
        }
        self.base_frequency = base;

        for (_, registry) in self.registries.iter_mut() {
            let frequency = self.domains[registry.domain].frequency;
            registry.reset_schedule(base, frequency);
        }

        self.queue = self.build_queue();
        if self.threaded {
            for worker in &mut self.workers {
                worker.spawn();
            }
        }
        self.last_tick = 0;
        self.initialized = true;

        info!(
            base_frequency = base,
            domains = self.domains.len(),
            registries = self.registries.len(),
            threaded = self.threaded,
            "clock server initialized"
        );
        Ok(())
    }

    /// Advances simulated time to the next due tick, fires every due
    /// registry and returns the number of elapsed base cycles.
    ///
    /// For each due registry the module callbacks fire first (in
    /// registration order, or in a seeded permutation under randomized
    /// clocking, or distributed to the worker pool under threaded clocking),
    /// then the registry's rate-matcher flushes, and only then is the
    /// registry's local cycle counter incremented and its next due time
    /// rescheduled.
    ///
    /// # Panics
    ///
    /// Panics if called before [`init()`](ClockServer::init).
    pub fn clock(&mut self) -> u64 {
        assert!(
            self.initialized,
            "ClockServer::clock() called before init()"
        );

        let (tick, due) = match &mut self.queue {
            DispatchQueue::Ordered(queue) => {
                let tick = *queue.peek_key().expect("the dispatch queue is empty");
                let mut due = Vec::new();
                while queue.peek_key() == Some(&tick) {
                    due.push(queue.pull().unwrap().1);
                }
                (tick, due)
            }
            DispatchQueue::Rotation(ring) => {
                let front = *ring.front().expect("the dispatch queue is empty");
                let tick = self.registries[front].next_due;
                let mut due = Vec::new();
                while let Some(&rid) = ring.front() {
                    if self.registries[rid].next_due != tick {
                        break;
                    }
                    due.push(rid);
                    ring.pop_front();
                }
                (tick, due)
            }
        };

        if self.threaded {
            self.fire_threaded(&due);
        } else if self.random.is_some() {
            self.fire_randomized(&due);
        } else {
            self.fire_inline(&due);
        }

        match &mut self.queue {
            DispatchQueue::Ordered(queue) => {
                for &rid in &due {
                    let registry = &mut self.registries[rid];
                    registry.cycle += 1;
                    registry.next_due = tick + registry.step;
                    queue.insert(registry.next_due, rid);
                }
            }
            DispatchQueue::Rotation(ring) => {
                for &rid in &due {
                    let registry = &mut self.registries[rid];
                    registry.cycle += 1;
                    registry.next_due = tick + registry.step;
                    ring.push_back(rid);
                }
            }
        }

        let elapsed = tick - self.last_tick;
        self.last_tick = tick;
        elapsed
    }

    /// The shared base frequency computed at init.
    ///
    /// # Panics
    ///
    /// Panics if called before [`init()`](ClockServer::init).
    pub fn base_frequency(&self) -> u64 {
        assert!(self.initialized, "the base frequency is computed at init()");
        self.base_frequency
    }

    /// Current working frequency of the named domain.
    pub fn domain_frequency(&self, name: &str) -> Result<u64, ClockError> {
        Ok(self.domains[self.domain_id(name)?].frequency)
    }

    /// Simulated cycle count of the named domain, i.e. the largest local
    /// cycle counter across its registries.
    pub fn domain_cycles(&self, name: &str) -> Result<Cycle, ClockError> {
        let domain = &self.domains[self.domain_id(name)?];
        Ok(domain
            .registries
            .iter()
            .map(|&rid| self.registries[rid].cycle)
            .max()
            .unwrap_or(0))
    }

    /// Hands the engine's scalar statistics to an external state sink.
    ///
    /// Exported keys: `<domain>.cycles` and `<domain>.frequency` for every
    /// domain, plus `reference-domain` (the first domain created).
    pub fn export_state(&self, sink: &mut dyn StateSink) {
        for domain in &self.domains {
            let cycles = domain
                .registries
                .iter()
                .map(|&rid| self.registries[rid].cycle)
                .max()
                .unwrap_or(0);
            sink.scalar(&format!("{}.cycles", domain.name), cycles);
            sink.scalar(&format!("{}.frequency", domain.name), domain.frequency);
        }
        if let Some(reference) = self.domains.first() {
            sink.text("reference-domain", &reference.name);
        }
    }

    /// Writes the profiling report to the given writer.
    ///
    /// Writes nothing unless profiling was enabled with
    /// [`set_profiling()`](ClockServer::set_profiling).
    pub fn write_profile(&self, w: &mut dyn Write) -> io::Result<()> {
        if !self.profiling {
            return Ok(());
        }
        profile::write_report(w, &self.domains, &self.registries)
    }

    /// Emits the profiling report as `clockserver.profile` in the given
    /// directory.
    ///
    /// Does nothing unless profiling was enabled.
    pub fn dump_profile(&self, dir: &Path) -> io::Result<()> {
        if !self.profiling {
            return Ok(());
        }
        let mut file = BufWriter::new(File::create(dir.join(profile::PROFILE_FILE_NAME))?);
        profile::write_report(&mut file, &self.domains, &self.registries)?;
        file.flush()
    }

    fn domain_id(&self, name: &str) -> Result<DomainId, ClockError> {
        self.domains
            .iter()
            .position(|domain| domain.name == name)
            .ok_or_else(|| ClockError::UnknownDomain(name.to_string()))
    }

    fn checked_worker(&self, worker: WorkerId) -> Result<WorkerId, ClockError> {
        if worker.index() >= self.workers.len() {
            return Err(ClockError::UnknownWorker(worker));
        }
        Ok(worker)
    }

    /// Returns the registry for `(domain, skew, edge)`, creating it if the
    /// triple is new.
    fn resolve_registry(&mut self, did: DomainId, skew: u8, edge: ClockEdge) -> RegistryId {
        let found = self.domains[did].registries.iter().copied().find(|&rid| {
            let registry = &self.registries[rid];
            registry.skew == skew && registry.edge == edge
        });
        match found {
            Some(rid) => rid,
            None => {
                let rid = self.registries.insert(ClockRegistry::new(did, skew, edge));
                self.domains[did].registries.push(rid);
                rid
            }
        }
    }

    fn build_queue(&self) -> DispatchQueue {
        // The rotation specialization additionally requires every initial
        // offset to lie within one step, otherwise the ring would not stay
        // sorted across reinsertions.
        let rotation_safe = self.unique_domain_opt
            && self.domains.len() == 1
            && self
                .registries
                .iter()
                .all(|(_, registry)| registry.next_due < registry.step);

        if rotation_safe {
            let mut entries: Vec<RegistryId> = self.registries.iter().map(|(rid, _)| rid).collect();
            entries.sort_by_key(|&rid| self.registries[rid].next_due);
            DispatchQueue::Rotation(entries.into())
        } else {
            let mut queue = PriorityQueue::with_capacity(self.registries.len());
            for (rid, registry) in self.registries.iter() {
                queue.insert(registry.next_due, rid);
            }
            DispatchQueue::Ordered(queue)
        }
    }

    fn rebuild_ordered_queue(&mut self) {
        let DispatchQueue::Rotation(ring) = &mut self.queue else {
            return;
        };
        let mut queue = PriorityQueue::with_capacity(ring.len());
        for &rid in ring.iter() {
            queue.insert(self.registries[rid].next_due, rid);
        }
        self.queue = DispatchQueue::Ordered(queue);
    }

    fn fire_inline(&self, due: &[RegistryId]) {
        for &rid in due {
            let registry = &self.registries[rid];
            for callback in &registry.callbacks {
                callback.invoke(registry.cycle, self.profiling);
            }
            for writer in &registry.writers {
                writer.flush();
            }
        }
    }

    fn fire_randomized(&mut self, due: &[RegistryId]) {
        let profiling = self.profiling;
        let rng = self.random.as_mut().unwrap();
        for &rid in due {
            let registry = &mut self.registries[rid];
            let cycle = registry.cycle;

            // Draw a uniform index over the unfired callbacks, fire it, then
            // swap it out of the remaining range.
            let mut remaining = registry.callbacks.len();
            while remaining > 0 {
                let index = rng.gen_bounded(remaining as u64) as usize;
                registry.callbacks[index].invoke(cycle, profiling);
                registry.callbacks.swap(index, remaining - 1);
                remaining -= 1;
            }

            for writer in &registry.writers {
                writer.flush();
            }
        }
    }

    fn fire_threaded(&self, due: &[RegistryId]) {
        // Distribute every due callback to its statically assigned worker.
        let mut busy = Vec::new();
        for &rid in due {
            let registry = &self.registries[rid];
            for callback in &registry.callbacks {
                let worker = callback.worker.index();
                self.workers[worker].push_task(callback.task(registry.cycle, self.profiling));
                if !busy.contains(&worker) {
                    busy.push(worker);
                }
            }
        }

        // Fan-out: wake every worker that received tasks.
        for &worker in &busy {
            self.workers[worker].begin_batch();
        }
        // Fan-in: join each worker in turn until every task list is drained.
        for &worker in &busy {
            self.workers[worker].wait_finished();
        }

        // Rate-matcher flushes run on the dispatch thread, once the barrier
        // guarantees all module callbacks of the tick have completed.
        for &rid in due {
            let registry = &self.registries[rid];
            for writer in &registry.writers {
                writer.flush();
            }
        }
    }
}

impl fmt::Debug for ClockServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClockServer")
            .field("domains", &self.domains.len())
            .field("registries", &self.registries.len())
            .field("workers", &self.workers.len())
            .field("threaded", &self.threaded)
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

fn lcm(a: u64, b: u64) -> Option<u64> {
    (a / gcd(a, b)).checked_mul(b)
}
