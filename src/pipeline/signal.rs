//! SIGINT/SIGTERM handling.
//!
//! The first SIGINT or SIGTERM asks the capture loop to stop after the
//! current frame. Each signal is latched on its own: delivering the same
//! signal again runs its default action and kills the process, while the
//! other signal still only requests a stop.

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;
use signal_hook::iterator::Signals;
use std::ffi::c_int;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Signals that request a graceful stop.
pub const HANDLED_SIGNALS: [c_int; 2] = [SIGINT, SIGTERM];

/// Shared stop request, written by the signal thread and read by the loop.
#[derive(Debug, Clone, Default)]
pub struct ExitFlag(Arc<AtomicBool>);

impl ExitFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once a stop was requested.
    #[inline]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Requests a stop. Returns true only for the call that set the flag.
    pub fn set(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }
}

/// Outcome of a delivered signal, as seen by the capture loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First stop request: the loop finishes its iteration and shuts down.
    Stop,
    /// A stop was already requested by another signal.
    AlreadyStopping,
}

/// Records a delivered signal on `flag`.
pub fn on_signal(flag: &ExitFlag) -> SignalAction {
    if flag.set() {
        SignalAction::Stop
    } else {
        SignalAction::AlreadyStopping
    }
}

/// Name used in log lines.
pub fn signal_name(signal: c_int) -> &'static str {
    match signal {
        SIGINT => "SIGINT",
        SIGTERM => "SIGTERM",
        _ => "signal",
    }
}

/// Per-signal delivery latches. A latched signal gets its default
/// action on the next delivery.
#[derive(Debug, Clone)]
pub struct SignalLatches {
    latches: Vec<(c_int, Arc<AtomicBool>)>,
}

impl SignalLatches {
    /// True once `signal` has been delivered.
    pub fn is_latched(&self, signal: c_int) -> bool {
        self.latches
            .iter()
            .any(|(s, latch)| *s == signal && latch.load(Ordering::Acquire))
    }
}

/// Installs the process-wide SIGINT/SIGTERM handlers and the thread that
/// logs each delivery and sets `exit`. Call once per process.
pub fn install(exit: ExitFlag) -> io::Result<SignalLatches> {
    let mut latches = Vec::with_capacity(HANDLED_SIGNALS.len());
    for signal in HANDLED_SIGNALS {
        let latch = Arc::new(AtomicBool::new(false));
        // Registered first so it sees the latch before this delivery sets it.
        flag::register_conditional_default(signal, Arc::clone(&latch))?;
        flag::register(signal, Arc::clone(&latch))?;
        latches.push((signal, latch));
    }

    let mut signals = Signals::new(HANDLED_SIGNALS)?;
    std::thread::Builder::new()
        .name("signals".to_owned())
        .spawn(move || {
            for signal in signals.forever() {
                let name = signal_name(signal);
                match on_signal(&exit) {
                    SignalAction::Stop => tracing::warn!("Caught {name}, stopping capture"),
                    SignalAction::AlreadyStopping => {
                        tracing::warn!("Caught {name}, capture already stopping")
                    }
                }
            }
        })?;

    Ok(SignalLatches { latches })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_starts_clear() {
        assert!(!ExitFlag::new().is_set());
    }

    #[test]
    fn test_second_signal_keeps_stopping() {
        let flag = ExitFlag::new();
        assert_eq!(on_signal(&flag), SignalAction::Stop);
        assert!(flag.is_set());
        assert_eq!(on_signal(&flag), SignalAction::AlreadyStopping);
        assert!(flag.is_set());
    }

    #[test]
    fn test_signal_names() {
        assert_eq!(signal_name(SIGINT), "SIGINT");
        assert_eq!(signal_name(SIGTERM), "SIGTERM");
        assert_eq!(signal_name(0), "signal");
    }

    #[test]
    fn test_latches_are_per_signal() {
        let term = Arc::new(AtomicBool::new(true));
        let latches = SignalLatches {
            latches: vec![
                (SIGINT, Arc::new(AtomicBool::new(false))),
                (SIGTERM, term),
            ],
        };
        assert!(latches.is_latched(SIGTERM));
        assert!(!latches.is_latched(SIGINT));
    }

    #[test]
    fn test_flag_set_exactly_once_across_clones() {
        let flag = ExitFlag::new();
        let handler_side = flag.clone();

        let firsts = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let flag = handler_side.clone();
                    s.spawn(move || flag.set())
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|&first| first)
                .count()
        });

        assert_eq!(firsts, 1);
        assert!(flag.is_set());
    }
}
