//! Profiling report emission.

use std::io::{self, Write};

use slab::Slab;

use super::domain::ClockDomain;
use super::registry::ClockRegistry;

/// File name of the profiling report emitted next to the simulation output.
pub(crate) const PROFILE_FILE_NAME: &str = "clockserver.profile";

/// Writes the line-oriented profiling report: one block per registered
/// callback, times in nanoseconds.
pub(crate) fn write_report(
    w: &mut dyn Write,
    domains: &[ClockDomain],
    registries: &Slab<ClockRegistry>,
) -> io::Result<()> {
    writeln!(w, "# {PROFILE_FILE_NAME}")?;
    writeln!(w, "# per-callback profiling report, times in nanoseconds")?;

    for (_, registry) in registries.iter() {
        let domain = &domains[registry.domain];
        for callback in &registry.callbacks {
            let profile = callback.profile.lock().unwrap();
            writeln!(w)?;
            writeln!(
                w,
                "module {} ({}, skew {}%, {} edge)",
                callback.name, domain.name, registry.skew, registry.edge
            )?;
            writeln!(w, "invocations {}", profile.invocations)?;
            writeln!(w, "time-total  {}", profile.total_ns)?;
            writeln!(w, "time-min    {}", profile.min_ns)?;
            writeln!(w, "time-max    {}", profile.max_ns)?;
            writeln!(w, "wraparounds {}", profile.wraparounds())?;
        }
    }

    Ok(())
}
