use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};
use sysinfo::{System, SystemExt};

/// Cached, low-overhead memory watcher.
/// - Refreshes at most every `REFRESH_EVERY`.
/// - Reports available/total RAM in bytes.
struct MemState {
    sys: System,
    last_check: Instant,
    total: u64,
    available: u64,
}

static STATE: OnceLock<Mutex<MemState>> = OnceLock::new();
const REFRESH_EVERY: Duration = Duration::from_millis(500);

/// Share of the available memory used when a job does not configure a budget.
pub const DEFAULT_BUDGET_FRACTION: f64 = 0.5;

fn with_state<F, T>(f: F) -> T
where
    F: FnOnce(&mut MemState) -> T,
{
    let m = STATE.get_or_init(|| {
        let mut s = System::new();
        s.refresh_memory();
        let total = s.total_memory();
        let available = s.available_memory();
        Mutex::new(MemState {
            sys: s,
            last_check: Instant::now(),
            total,
            available,
        })
    });
    let mut guard = match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };
    f(&mut guard)
}

fn refreshed(st: &mut MemState) {
    let now = Instant::now();
    if now.duration_since(st.last_check) >= REFRESH_EVERY {
        st.sys.refresh_memory();
        st.total = st.sys.total_memory();
        st.available = st.sys.available_memory();
        st.last_check = now;
    }
}

/// Recent estimate of available memory in bytes.
pub fn available_memory_bytes() -> u64 {
    with_state(|st| {
        refreshed(st);
        st.available
    })
}

/// Returns a recent estimate of available memory fraction (0.0..1.0).
pub fn available_memory_fraction() -> f64 {
    with_state(|st| {
        refreshed(st);
        if st.total > 0 {
            (st.available as f64 / st.total as f64).clamp(0.0, 1.0)
        } else {
            1.0
        }
    })
}

/// Memory budget for a job that did not configure one.
/// Falls back to 1 GiB when the platform reports no memory figures.
pub fn default_memory_budget() -> u64 {
    let avail = available_memory_bytes();
    if avail == 0 {
        return 1 << 30;
    }
    ((avail as f64) * DEFAULT_BUDGET_FRACTION) as u64
}
