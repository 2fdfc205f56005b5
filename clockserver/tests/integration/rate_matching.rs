//! Rate-matcher protocol: FIFO flushes, peer validation and capacity.

use std::sync::{Arc, Mutex};

use clockserver::clockable::{Clockable, ClockableHandle, Cycle};
use clockserver::matcher::{RateMatcher, RateReader};
use clockserver::server::{ClockError, ClockServer};

/// Writes a burst of values through a rate matcher at every firing.
struct Producer {
    name: &'static str,
    matcher: RateMatcher<u64>,
    burst: u64,
}

impl Clockable for Producer {
    fn name(&self) -> &str {
        self.name
    }

    fn clock(&mut self, cycle: Cycle) {
        for lane in 0..self.burst {
            self.matcher.write(cycle * 10 + lane);
        }
    }
}

/// Drains its reader at every firing, recording (cycle, value) pairs.
struct Consumer {
    name: &'static str,
    reader: Option<RateReader<u64>>,
    seen: Vec<(Cycle, u64)>,
}

impl Clockable for Consumer {
    fn name(&self) -> &str {
        self.name
    }

    fn clock(&mut self, cycle: Cycle) {
        if let Some(reader) = &self.reader {
            while let Some(value) = reader.read() {
                self.seen.push((cycle, value));
            }
        }
    }
}

fn handle<T: Clockable + 'static>(module: &Arc<Mutex<T>>) -> ClockableHandle {
    let handle: ClockableHandle = module.clone();
    handle
}

#[test]
fn flushes_are_fifo_across_domains() {
    let mut server = ClockServer::new();
    server.new_domain("producer", &[100], None).unwrap();
    server.new_domain("consumer", &[200], None).unwrap();

    let consumer = Arc::new(Mutex::new(Consumer {
        name: "consumer",
        reader: None,
        seen: Vec::new(),
    }));
    let binding = server
        .register_clock(&handle(&consumer), "consumer", 0, None, None)
        .unwrap();

    let matcher = RateMatcher::new("producer-to-consumer", 4);
    consumer.lock().unwrap().reader = Some(matcher.connect(&binding));
    server.register_rate_matcher(&matcher, "consumer", 0).unwrap();

    let producer = Arc::new(Mutex::new(Producer {
        name: "producer",
        matcher: matcher.clone(),
        burst: 3,
    }));
    server.register_clock(&handle(&producer), "producer", 0, None, None).unwrap();
    server.init().unwrap();

    // Base 200: the producer fires every 2 base cycles, the consumer every
    // base cycle. A burst is flushed at the consumer edge that follows the
    // write and read at the consumer's next firing. At base-time 0 the
    // consumer's registry is dispatched first, so the first burst is only
    // flushed at base-time 1; from then on the producer's queue entry is the
    // older one and its bursts are flushed the same base-time they are
    // written.
    let mut elapsed = 0;
    while elapsed < 6 {
        elapsed += server.clock();
    }

    // Each burst arrives in write order.
    assert_eq!(
        consumer.lock().unwrap().seen,
        vec![
            (2, 0),
            (2, 1),
            (2, 2),
            (3, 10),
            (3, 11),
            (3, 12),
            (5, 20),
            (5, 21),
            (5, 22),
        ]
    );
}

#[test]
fn flush_runs_strictly_after_the_registry_modules() {
    // Producer and consumer share one registry. If the flush ran before the
    // producer's callback, a value written at cycle k would only become
    // readable at cycle k + 2; running strictly after the modules makes it
    // readable at cycle k + 1.
    let mut server = ClockServer::new();
    server.new_domain("core", &[100], None).unwrap();

    let consumer = Arc::new(Mutex::new(Consumer {
        name: "consumer",
        reader: None,
        seen: Vec::new(),
    }));
    let binding = server.register_clock(&handle(&consumer), "core", 0, None, None).unwrap();

    let matcher = RateMatcher::new("loopback", 1);
    consumer.lock().unwrap().reader = Some(matcher.connect(&binding));
    server.register_rate_matcher(&matcher, "core", 0).unwrap();

    let producer = Arc::new(Mutex::new(Producer {
        name: "producer",
        matcher: matcher.clone(),
        burst: 1,
    }));
    server.register_clock(&handle(&producer), "core", 0, None, None).unwrap();
    server.init().unwrap();

    for _ in 0..4 {
        server.clock();
    }
    assert_eq!(
        consumer.lock().unwrap().seen,
        vec![(1, 0), (2, 10), (3, 20)]
    );
}

#[test]
fn unconnected_matcher_fails_init() {
    let mut server = ClockServer::new();
    server.new_domain("consumer", &[100], None).unwrap();

    let matcher = RateMatcher::<u64>::new("orphan", 2);
    server.register_rate_matcher(&matcher, "consumer", 0).unwrap();

    assert_eq!(
        server.init(),
        Err(ClockError::UnconnectedRateMatcher {
            matcher: "orphan".to_string(),
        })
    );
}

#[test]
fn mismatched_peer_skew_fails_init() {
    let mut server = ClockServer::new();
    server.new_domain("consumer", &[100], None).unwrap();

    let consumer = Arc::new(Mutex::new(Consumer {
        name: "consumer",
        reader: None,
        seen: Vec::new(),
    }));
    // The reader is bound at skew 10, but the matcher registers at skew 0.
    let binding = server
        .register_clock(&handle(&consumer), "consumer", 10, None, None)
        .unwrap();

    let matcher = RateMatcher::new("skewed", 2);
    consumer.lock().unwrap().reader = Some(matcher.connect(&binding));
    server.register_rate_matcher(&matcher, "consumer", 0).unwrap();

    assert_eq!(
        server.init(),
        Err(ClockError::MismatchedRateMatcherPeer {
            matcher: "skewed".to_string(),
            domain: "consumer".to_string(),
            skew: 0,
            peer_domain: "consumer".to_string(),
            peer_skew: 10,
        })
    );
}

#[test]
fn mismatched_peer_domain_fails_init() {
    let mut server = ClockServer::new();
    server.new_domain("north", &[100], None).unwrap();
    server.new_domain("south", &[100], None).unwrap();

    let consumer = Arc::new(Mutex::new(Consumer {
        name: "consumer",
        reader: None,
        seen: Vec::new(),
    }));
    let binding = server.register_clock(&handle(&consumer), "south", 0, None, None).unwrap();

    let matcher = RateMatcher::new("misrouted", 2);
    consumer.lock().unwrap().reader = Some(matcher.connect(&binding));
    server.register_rate_matcher(&matcher, "north", 0).unwrap();

    assert!(matches!(
        server.init(),
        Err(ClockError::MismatchedRateMatcherPeer { .. })
    ));
}

#[test]
#[should_panic(expected = "already registered")]
fn reregistering_a_matcher_panics() {
    let mut server = ClockServer::new();
    server.new_domain("consumer", &[100], None).unwrap();

    let matcher = RateMatcher::<u64>::new("twice", 2);
    server.register_rate_matcher(&matcher, "consumer", 0).unwrap();
    let _ = server.register_rate_matcher(&matcher, "consumer", 50);
}

#[test]
#[should_panic(expected = "exceeded its bandwidth")]
fn oversized_burst_is_fatal() {
    let mut server = ClockServer::new();
    server.new_domain("producer", &[100], None).unwrap();
    server.new_domain("consumer", &[100], None).unwrap();

    let consumer = Arc::new(Mutex::new(Consumer {
        name: "consumer",
        reader: None,
        seen: Vec::new(),
    }));
    let binding = server
        .register_clock(&handle(&consumer), "consumer", 0, None, None)
        .unwrap();

    // Bandwidth 2, but the producer stages 3 values per firing.
    let matcher = RateMatcher::new("undersized", 2);
    consumer.lock().unwrap().reader = Some(matcher.connect(&binding));
    server.register_rate_matcher(&matcher, "consumer", 0).unwrap();

    let producer = Arc::new(Mutex::new(Producer {
        name: "producer",
        matcher: matcher.clone(),
        burst: 3,
    }));
    server.register_clock(&handle(&producer), "producer", 0, None, None).unwrap();
    server.init().unwrap();

    server.clock();
}
