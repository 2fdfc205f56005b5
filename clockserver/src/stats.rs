//! Statistics export.
//!
//! The engine does not own an output format; it hands scalar key/value
//! pairs to an externally-supplied [`StateSink`]. See
//! [`ClockServer::export_state`](crate::server::ClockServer::export_state)
//! for the exported keys.

/// An external sink for scalar simulation-state values.
pub trait StateSink {
    /// Records a numeric scalar.
    fn scalar(&mut self, key: &str, value: u64);

    /// Records a textual scalar.
    fn text(&mut self, key: &str, value: &str);
}
