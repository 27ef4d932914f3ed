/*
 * SPDX-FileCopyrightText: 2024 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Severity-tagged diagnostics shared by the codec reader, the generator
//! and the compiler.
//!
//! Subsystems report non-fatal anomalies (duplicate definitions, oversized
//! vectors, excess records) through a [`Reporter`] capability passed in by
//! the caller, instead of logging directly; fatal conditions are returned
//! as errors. [`LogReporter`] bridges to the [`log`] crate, which is what
//! the command-line tools use.

/// Severity of a reported diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl core::fmt::Display for Severity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A sink for diagnostics.
///
/// `location` identifies the reporting subsystem or record (for example
/// `"reader"` or `"node 12"`); `message` is human-readable detail.
pub trait Reporter {
    fn report(&mut self, severity: Severity, location: &str, message: &str);
}

/// Forwards diagnostics to the [`log`] crate at the matching level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&mut self, severity: Severity, location: &str, message: &str) {
        match severity {
            Severity::Info => log::info!("{}: {}", location, message),
            Severity::Warning => log::warn!("{}: {}", location, message),
            Severity::Error => log::error!("{}: {}", location, message),
        }
    }
}

/// Discards all diagnostics.
#[derive(Clone, Copy, Debug, Default)]
pub struct NopReporter;

impl Reporter for NopReporter {
    fn report(&mut self, _severity: Severity, _location: &str, _message: &str) {}
}

/// Adapts a closure into a [`Reporter`].
#[derive(Clone, Copy, Debug)]
pub struct FnReporter<F>(pub F);

impl<F: FnMut(Severity, &str, &str)> Reporter for FnReporter<F> {
    fn report(&mut self, severity: Severity, location: &str, message: &str) {
        (self.0)(severity, location, message)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_closure_reporter() {
        let mut seen = Vec::new();
        {
            let mut reporter = FnReporter(|severity: Severity, location: &str, message: &str| {
                seen.push((severity, location.to_owned(), message.to_owned()));
            });
            let r: &mut dyn Reporter = &mut reporter;
            r.report(Severity::Warning, "reader", "duplicate node 3");
        }
        assert_eq!(
            seen,
            vec![(
                Severity::Warning,
                "reader".to_owned(),
                "duplicate node 3".to_owned()
            )]
        );
    }
}
