//! Cross-domain rate matching.
//!
//! A [`RateMatcher`] is a buffering adapter sitting between a producer
//! module in one clock domain and one or more consumer modules in another
//! domain or skew. The producer writes up to `bandwidth` values while its
//! own callback fires; at the consumer's clock edge the staged values are
//! flushed, first-in-first-out, into the channel the consumer endpoints
//! read from. Both sides share a single mutex, held only for the duration
//! of a write, a flush or a read.
//!
//! The matcher is registered with the clock server on the *consumer* side
//! (one domain and skew); the flush then fires as a writer callback of the
//! consumer's clock registry, strictly after that registry's own modules.
//! Every connected reader must be bound to the registered domain and skew;
//! mismatches, as well as a matcher with no connected reader at all, are
//! configuration errors reported when the server is initialized.
//!
//! Exceeding the staging capacity is not a retryable condition: the
//! simulated model's buffering is undersized, and silently dropping values
//! would corrupt simulated architectural state, so the write panics.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::clockable::ClockBinding;
use crate::server::ClockError;

/// The producer-side endpoint of a rate-matching channel.
///
/// Cloning a `RateMatcher` yields another handle to the same channel.
pub struct RateMatcher<T> {
    inner: Arc<MatcherInner<T>>,
}

struct MatcherInner<T> {
    name: String,
    bandwidth: usize,
    /// The one mutex shared by the producer, the flush callback and every
    /// reader endpoint.
    shared: Mutex<MatcherState<T>>,
}

struct MatcherState<T> {
    /// Values staged by the producer since the last flush.
    staged: Vec<T>,
    /// The inter-domain channel the readers consume from.
    channel: VecDeque<T>,
    /// Consumer bindings recorded at connection time, checked at init.
    peers: Vec<PeerBinding>,
}

struct PeerBinding {
    domain: String,
    skew: u8,
}

impl<T> RateMatcher<T> {
    /// Creates a rate matcher with the given identity and staging capacity.
    ///
    /// # Panics
    ///
    /// Panics if `bandwidth` is zero.
    pub fn new(name: impl Into<String>, bandwidth: usize) -> Self {
        let name = name.into();
        assert!(
            bandwidth > 0,
            "rate matcher `{name}` must have a nonzero bandwidth"
        );

        Self {
            inner: Arc::new(MatcherInner {
                name,
                bandwidth,
                shared: Mutex::new(MatcherState {
                    staged: Vec::with_capacity(bandwidth),
                    channel: VecDeque::new(),
                    peers: Vec::new(),
                }),
            }),
        }
    }

    /// Identity of this matcher.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Stages a value for the next flush.
    ///
    /// # Panics
    ///
    /// Panics if the staging buffer already holds `bandwidth` values: the
    /// simulated model produced more than the matcher was sized for.
    pub fn write(&self, value: T) {
        let mut shared = self.inner.shared.lock().unwrap();
        assert!(
            shared.staged.len() < self.inner.bandwidth,
            "rate matcher `{}` exceeded its bandwidth of {}",
            self.inner.name,
            self.inner.bandwidth
        );
        shared.staged.push(value);
    }

    /// Connects a consumer endpoint.
    ///
    /// The consumer's binding is recorded so the server can verify at init
    /// time that every reader shares the domain and skew the matcher was
    /// registered to.
    pub fn connect(&self, consumer: &ClockBinding) -> RateReader<T> {
        let mut shared = self.inner.shared.lock().unwrap();
        shared.peers.push(PeerBinding {
            domain: consumer.domain().to_string(),
            skew: consumer.skew(),
        });

        RateReader {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Clone for RateMatcher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for RateMatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateMatcher")
            .field("name", &self.inner.name)
            .field("bandwidth", &self.inner.bandwidth)
            .finish_non_exhaustive()
    }
}

/// A consumer-side endpoint of a rate-matching channel.
pub struct RateReader<T> {
    inner: Arc<MatcherInner<T>>,
}

impl<T> RateReader<T> {
    /// Takes the oldest flushed value, if any.
    pub fn read(&self) -> Option<T> {
        self.inner.shared.lock().unwrap().channel.pop_front()
    }

    /// Number of flushed values currently available.
    pub fn len(&self) -> usize {
        self.inner.shared.lock().unwrap().channel.len()
    }

    /// Whether no flushed value is currently available.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Clone for RateReader<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for RateReader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateReader")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

/// Type-erased matcher surface the clock server stores in a registry's
/// writer-callback list.
pub(crate) trait MatcherEndpoint: Send {
    /// Identity of the matcher.
    fn name(&self) -> &str;

    /// Stable identity of the underlying channel, used to reject double
    /// registration.
    fn channel_id(&self) -> usize;

    /// Moves every staged value into the consumer channel, in write order.
    fn flush(&self);

    /// Checks the connected peers against the registered domain and skew.
    fn validate(&self, domain: &str, skew: u8) -> Result<(), ClockError>;
}

impl<T: Send + 'static> MatcherEndpoint for RateMatcher<T> {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn channel_id(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    fn flush(&self) {
        let mut shared = self.inner.shared.lock().unwrap();
        let MatcherState {
            staged, channel, ..
        } = &mut *shared;
        channel.extend(staged.drain(..));
    }

    fn validate(&self, domain: &str, skew: u8) -> Result<(), ClockError> {
        let shared = self.inner.shared.lock().unwrap();
        if shared.peers.is_empty() {
            return Err(ClockError::UnconnectedRateMatcher {
                matcher: self.inner.name.clone(),
            });
        }
        for peer in &shared.peers {
            if peer.domain != domain || peer.skew != skew {
                return Err(ClockError::MismatchedRateMatcherPeer {
                    matcher: self.inner.name.clone(),
                    domain: domain.to_string(),
                    skew,
                    peer_domain: peer.domain.clone(),
                    peer_skew: peer.skew,
                });
            }
        }

        Ok(())
    }
}
