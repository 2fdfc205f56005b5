//! Dispatch-loop properties: base frequency, frequency ratios, skews and
//! the single-domain specialization.

use std::sync::{Arc, Mutex};

use clockserver::clockable::{Clockable, ClockableHandle, Cycle};
use clockserver::server::ClockServer;

/// Records every local cycle count it is clocked with.
struct Recorder {
    name: &'static str,
    cycles: Vec<Cycle>,
}

impl Recorder {
    fn new(name: &'static str) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self {
            name,
            cycles: Vec::new(),
        }))
    }
}

impl Clockable for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    fn clock(&mut self, cycle: Cycle) {
        self.cycles.push(cycle);
    }
}

/// Appends its name to a shared event log at every firing.
struct Logger {
    name: &'static str,
    log: Arc<Mutex<Vec<(&'static str, Cycle)>>>,
}

impl Clockable for Logger {
    fn name(&self) -> &str {
        self.name
    }

    fn clock(&mut self, cycle: Cycle) {
        self.log.lock().unwrap().push((self.name, cycle));
    }
}

fn handle<T: Clockable + 'static>(module: &Arc<Mutex<T>>) -> ClockableHandle {
    let handle: ClockableHandle = module.clone();
    handle
}

#[test]
fn two_domain_scenario() {
    let ma = Recorder::new("ma");
    let mb = Recorder::new("mb");

    let mut server = ClockServer::new();
    server.new_domain("a", &[100], None).unwrap();
    server.new_domain("b", &[200], None).unwrap();
    server.register_clock(&handle(&ma), "a", 0, None, None).unwrap();
    server.register_clock(&handle(&mb), "b", 0, None, None).unwrap();
    server.init().unwrap();

    assert_eq!(server.base_frequency(), 200);

    // Tick 0 fires both modules.
    assert_eq!(server.clock(), 0);
    assert_eq!(ma.lock().unwrap().cycles, vec![0]);
    assert_eq!(mb.lock().unwrap().cycles, vec![0]);

    // Base-time 1 fires only Mb.
    assert_eq!(server.clock(), 1);
    assert_eq!(ma.lock().unwrap().cycles, vec![0]);
    assert_eq!(mb.lock().unwrap().cycles, vec![0, 1]);

    // Base-time 2 fires both again: over 2 base-time units Ma fired once
    // and Mb twice.
    assert_eq!(server.clock(), 1);
    assert_eq!(ma.lock().unwrap().cycles, vec![0, 1]);
    assert_eq!(mb.lock().unwrap().cycles, vec![0, 1, 2]);
}

#[test]
fn base_frequency_divides_all_domains() {
    let ma = Recorder::new("ma");
    let mb = Recorder::new("mb");

    let mut server = ClockServer::new();
    server.new_domain("a", &[100], None).unwrap();
    server.new_domain("b", &[150], None).unwrap();
    server.register_clock(&handle(&ma), "a", 0, None, None).unwrap();
    server.register_clock(&handle(&mb), "b", 0, None, None).unwrap();
    server.init().unwrap();

    // Normalized frequencies 100 and 150 give a base frequency of 300,
    // hence steps of 3 and 2 base cycles.
    assert_eq!(server.base_frequency(), 300);

    // Advance exactly one common period.
    let mut elapsed = 0;
    while elapsed < 300 {
        elapsed += server.clock();
    }
    assert_eq!(elapsed, 300);

    // Firings at 0, 3, ..., 300 and 0, 2, ..., 300.
    assert_eq!(ma.lock().unwrap().cycles.len(), 101);
    assert_eq!(mb.lock().unwrap().cycles.len(), 151);
}

#[test]
fn frequency_ratio_converges_exactly() {
    let fast = Recorder::new("fast");
    let slow = Recorder::new("slow");

    let mut server = ClockServer::new();
    server.new_domain("fast", &[300], None).unwrap();
    server.new_domain("slow", &[200], None).unwrap();
    server.register_clock(&handle(&fast), "fast", 0, None, None).unwrap();
    server.register_clock(&handle(&slow), "slow", 0, None, None).unwrap();
    server.init().unwrap();

    assert_eq!(server.base_frequency(), 600);

    // Two full common periods.
    let mut elapsed = 0;
    while elapsed < 1200 {
        elapsed += server.clock();
    }

    let fast_count = fast.lock().unwrap().cycles.len() as u64;
    let slow_count = slow.lock().unwrap().cycles.len() as u64;
    assert_eq!(fast_count, 601);
    assert_eq!(slow_count, 401);
    // Exactly the 300:200 frequency ratio, no drift.
    assert_eq!((fast_count - 1) * 2, (slow_count - 1) * 3);
}

#[test]
fn ticks_are_monotonic_and_cycles_sequential() {
    let m7 = Recorder::new("m7");
    let m11 = Recorder::new("m11");
    let m13 = Recorder::new("m13");

    let mut server = ClockServer::new();
    server.new_domain("d7", &[7], None).unwrap();
    server.new_domain("d11", &[11], None).unwrap();
    server.new_domain("d13", &[13], None).unwrap();
    server.register_clock(&handle(&m7), "d7", 0, None, None).unwrap();
    server.register_clock(&handle(&m11), "d11", 0, None, None).unwrap();
    server.register_clock(&handle(&m13), "d13", 0, None, None).unwrap();
    server.init().unwrap();

    assert_eq!(server.base_frequency(), 1001);

    let mut elapsed = Vec::new();
    for _ in 0..200 {
        elapsed.push(server.clock());
    }

    // The first call dispatches tick 0; every later call advances time.
    assert_eq!(elapsed[0], 0);
    assert!(elapsed[1..].iter().all(|&dt| dt >= 1));

    // Each registry observed a dense sequence of local cycle counts.
    for recorder in [&m7, &m11, &m13] {
        let cycles = &recorder.lock().unwrap().cycles;
        let expected: Vec<Cycle> = (0..cycles.len() as u64).collect();
        assert_eq!(cycles, &expected);
    }
}

#[test]
fn skews_offset_firings_within_a_cycle() {
    let s0 = Recorder::new("s0");
    let s25 = Recorder::new("s25");
    let s99 = Recorder::new("s99");

    let mut server = ClockServer::new();
    server.new_domain("x", &[100], None).unwrap();
    // An empty helper domain widens the base frequency so one x-cycle spans
    // 100 base cycles and skews resolve to distinct instants.
    server.new_domain("pad", &[10_000], None).unwrap();
    server.register_clock(&handle(&s0), "x", 0, None, None).unwrap();
    server.register_clock(&handle(&s25), "x", 25, None, None).unwrap();
    server.register_clock(&handle(&s99), "x", 99, None, None).unwrap();
    server.init().unwrap();

    assert_eq!(server.base_frequency(), 10_000);

    // Firings at 0, 25, 99, then 100, 125, 199, ...
    let elapsed: Vec<u64> = (0..7).map(|_| server.clock()).collect();
    assert_eq!(elapsed, vec![0, 25, 74, 1, 25, 74, 1]);

    assert_eq!(s0.lock().unwrap().cycles, vec![0, 1, 2]);
    assert_eq!(s25.lock().unwrap().cycles, vec![0, 1]);
    assert_eq!(s99.lock().unwrap().cycles, vec![0, 1]);
}

fn single_domain_run(optimized: bool) -> (Vec<(&'static str, Cycle)>, Vec<u64>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut server = ClockServer::new();
    server.set_unique_domain_optimization(optimized).unwrap();
    // The allowed set {1, 100} stretches one cycle of the working frequency
    // (1) over 100 base cycles, giving the skews sub-cycle resolution.
    server.new_domain("only", &[1, 100], None).unwrap();
    for (name, skew) in [("m0", 0u8), ("m25", 25), ("m50", 50)] {
        let module = Arc::new(Mutex::new(Logger {
            name,
            log: log.clone(),
        }));
        server
            .register_clock(&handle(&module), "only", skew, None, None)
            .unwrap();
    }
    server.init().unwrap();

    let elapsed: Vec<u64> = (0..12).map(|_| server.clock()).collect();
    let log = log.lock().unwrap().clone();
    (log, elapsed)
}

#[test]
fn unique_domain_optimization_is_behavior_preserving() {
    let (log_opt, elapsed_opt) = single_domain_run(true);
    let (log_gen, elapsed_gen) = single_domain_run(false);

    assert_eq!(log_opt, log_gen);
    assert_eq!(elapsed_opt, elapsed_gen);
    assert_eq!(elapsed_opt[..4], [0, 25, 25, 50]);
}

#[test]
fn frequency_change_degrades_rotation_gracefully() {
    let m = Recorder::new("m");

    let mut server = ClockServer::new();
    server.set_unique_domain_optimization(true).unwrap();
    server.new_domain("only", &[1, 2], None).unwrap();
    server.register_clock(&handle(&m), "only", 0, None, None).unwrap();
    server.init().unwrap();

    // Base frequency 2, working frequency 1: step 2.
    assert_eq!(server.clock(), 0);
    server.set_domain_frequency("only", 2).unwrap();

    // The interval committed under the old step completes, then the new
    // step of 1 applies.
    assert_eq!(server.clock(), 2);
    assert_eq!(server.clock(), 1);
    assert_eq!(server.clock(), 1);
    assert_eq!(m.lock().unwrap().cycles, vec![0, 1, 2, 3]);
}
