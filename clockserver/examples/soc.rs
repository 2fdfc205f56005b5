//! Example: a two-domain system-on-chip bench.
//!
//! This example demonstrates in particular:
//!
//! * clock domains with different normalized frequencies,
//! * a rate matcher carrying requests from the fast core domain to the slow
//!   memory domain,
//! * profiling and statistics export.
//!
//! ```text
//!  core domain (200)          memory domain (100)
//! ┌──────────────────┐        ┌─────────────────┐
//! │                  │ reqs   │                 │
//! │      Core        ├───────►│    MemoryCtl    │
//! │                  │ (rate  │                 │
//! └──────────────────┘ match) └─────────────────┘
//! ```

use std::io;
use std::sync::{Arc, Mutex};

use clockserver::clockable::{Clockable, ClockableHandle, Cycle};
use clockserver::matcher::{RateMatcher, RateReader};
use clockserver::server::ClockServer;
use clockserver::stats::StateSink;

/// A core issuing one memory request every fourth cycle.
struct Core {
    requests: RateMatcher<u64>,
    issued: u64,
}

impl Clockable for Core {
    fn name(&self) -> &str {
        "core0"
    }

    fn clock(&mut self, cycle: Cycle) {
        if cycle % 4 == 0 {
            self.requests.write(cycle);
            self.issued += 1;
        }
    }
}

/// A memory controller draining the request channel at its own pace.
struct MemoryCtl {
    requests: Option<RateReader<u64>>,
    served: u64,
}

impl Clockable for MemoryCtl {
    fn name(&self) -> &str {
        "memctl"
    }

    fn clock(&mut self, _cycle: Cycle) {
        if let Some(requests) = &self.requests {
            while let Some(issue_cycle) = requests.read() {
                self.served += 1;
                tracing::debug!(issue_cycle, "request served");
            }
        }
    }
}

/// Prints every exported scalar to standard output.
struct StdoutSink;

impl StateSink for StdoutSink {
    fn scalar(&mut self, key: &str, value: u64) {
        println!("{key} = {value}");
    }

    fn text(&mut self, key: &str, value: &str) {
        println!("{key} = {value}");
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let mut server = ClockServer::new();
    server.set_profiling(true);
    server.new_domain("core", &[200], None).unwrap();
    server.new_domain("memory", &[100], None).unwrap();

    // The memory controller registers first so its binding can be handed to
    // the rate matcher's reader side.
    let memctl = Arc::new(Mutex::new(MemoryCtl {
        requests: None,
        served: 0,
    }));
    let memctl_handle: ClockableHandle = memctl.clone();
    let binding = server
        .register_clock(&memctl_handle, "memory", 0, None, None)
        .unwrap();

    let requests = RateMatcher::new("core-to-memory", 8);
    memctl.lock().unwrap().requests = Some(requests.connect(&binding));
    server.register_rate_matcher(&requests, "memory", 0).unwrap();

    let core = Arc::new(Mutex::new(Core {
        requests: requests.clone(),
        issued: 0,
    }));
    let core_handle: ClockableHandle = core.clone();
    server.register_clock(&core_handle, "core", 0, None, None).unwrap();

    server.init().unwrap();
    println!("base frequency: {}", server.base_frequency());

    // Advance 100 base cycles.
    let mut elapsed = 0;
    while elapsed < 100 {
        elapsed += server.clock();
    }

    println!(
        "issued {} requests, served {}",
        core.lock().unwrap().issued,
        memctl.lock().unwrap().served
    );

    server.export_state(&mut StdoutSink);
    server
        .write_profile(&mut io::stdout().lock())
        .expect("failed to write the profiling report");
}
