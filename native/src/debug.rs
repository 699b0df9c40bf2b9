// debug.rs - Environment-gated diagnostics for the aggregation engine

use std::env;
use std::time::Instant;

use once_cell::sync::Lazy;

/// Global debug flag, evaluated once at startup
pub static DEBUG_ENABLED: Lazy<bool> = Lazy::new(|| {
    env::var("ANCESTOR_AGG_DEBUG")
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false)
});

/// Macro for conditional debug printing
#[macro_export]
macro_rules! debug_println {
    ($($arg:tt)*) => {
        if *$crate::debug::DEBUG_ENABLED {
            eprintln!($($arg)*);
        }
    };
}

/// Logs the wall-clock duration of an engine phase when dropped.
pub struct PhaseTimer {
    label: &'static str,
    started: Instant,
}

impl PhaseTimer {
    pub fn start(label: &'static str) -> Self {
        Self {
            label,
            started: Instant::now(),
        }
    }
}

impl Drop for PhaseTimer {
    fn drop(&mut self) {
        crate::debug_println!("⏱️ PHASE: {} took {:?}", self.label, self.started.elapsed());
    }
}
