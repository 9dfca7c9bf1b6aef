//! Auto-lock (C11): a process-wide inactivity timer that clears in-memory
//! key material after a period of no activity.
//!
//! Held as a single `state::Storage` singleton the way `native/src/state.rs`
//! holds `NODE`/`SEED`, since there is at most one auto-lock timer per
//! running app (spec.md §4.11).

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use state::Storage;
use tokio::task::JoinHandle;

const TICK_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_LIMIT_MS: i64 = 15 * 60 * 1000;

struct Inner {
    enabled: AtomicBool,
    ticking: AtomicBool,
    limit_ms: AtomicI64,
    last_activity_ms: AtomicI64,
    /// `(Instant::now(), last_activity_ms)` as of the last activity reset,
    /// so the spawned tick task can extrapolate a real current timestamp
    /// from actual elapsed wall-clock time instead of a host epoch it has
    /// no way to independently advance.
    activity_anchor: Mutex<(Instant, i64)>,
    /// Set once `onLock` has fired for the current inactivity period;
    /// cleared by [`reset_inactivity_timer`] so it can fire again next time.
    locked: AtomicBool,
    on_lock: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
}

static AUTO_LOCK: Storage<Inner> = Storage::new();
static TICK_TASK: Mutex<Option<JoinHandle<()>>> = Mutex::new(None);

fn inner() -> &'static Inner {
    if AUTO_LOCK.try_get().is_none() {
        AUTO_LOCK.set(Inner {
            enabled: AtomicBool::new(false),
            ticking: AtomicBool::new(false),
            limit_ms: AtomicI64::new(DEFAULT_LIMIT_MS),
            last_activity_ms: AtomicI64::new(0),
            activity_anchor: Mutex::new((Instant::now(), 0)),
            locked: AtomicBool::new(false),
            on_lock: Mutex::new(None),
        });
    }
    AUTO_LOCK.get()
}

/// `init(onLock, limit?)` from spec.md §4.11. `now_ms` seeds the initial
/// activity timestamp; callers pass the wall clock explicitly since this
/// module doesn't read it itself.
pub fn init(on_lock: impl Fn() + Send + Sync + 'static, limit_ms: Option<i64>, now_ms: i64) {
    let state = inner();
    state.enabled.store(true, Ordering::SeqCst);
    state.locked.store(false, Ordering::SeqCst);
    state.limit_ms.store(limit_ms.unwrap_or(DEFAULT_LIMIT_MS), Ordering::SeqCst);
    state.last_activity_ms.store(now_ms, Ordering::SeqCst);
    *state.activity_anchor.lock() = (Instant::now(), now_ms);
    *state.on_lock.lock() = Some(Arc::new(on_lock));

    start_ticking();
}

fn start_ticking() {
    let state = inner();
    state.ticking.store(true, Ordering::SeqCst);

    let mut task_slot = TICK_TASK.lock();
    if task_slot.is_some() {
        return;
    }

    // `init` is called from plain unit tests too, outside any tokio
    // runtime; the host application always runs one, so only spawn the
    // real ticking task when a runtime is actually reachable.
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        return;
    };

    let task = handle.spawn(async {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        loop {
            interval.tick().await;
            tick(current_now_ms());
        }
    });
    *task_slot = Some(task);
}

/// Extrapolates a current host-epoch timestamp from real elapsed time since
/// the last activity reset, since the tick task has no host-supplied clock
/// of its own to advance. Tests bypass this entirely by driving [`tick`]
/// directly with synthetic timestamps.
fn current_now_ms() -> i64 {
    let (anchor_instant, anchor_epoch_ms) = *inner().activity_anchor.lock();
    anchor_epoch_ms + anchor_instant.elapsed().as_millis() as i64
}

/// `cleanup()` — stops the tick task and clears the callback.
pub fn cleanup() {
    if let Some(handle) = TICK_TASK.lock().take() {
        handle.abort();
    }
    if let Some(state) = AUTO_LOCK.try_get() {
        state.enabled.store(false, Ordering::SeqCst);
        state.ticking.store(false, Ordering::SeqCst);
        *state.on_lock.lock() = None;
    }
}

/// `resetInactivityTimer()` — called on any user activity.
pub fn reset_inactivity_timer(now_ms: i64) {
    let state = inner();
    state.last_activity_ms.store(now_ms, Ordering::SeqCst);
    *state.activity_anchor.lock() = (Instant::now(), now_ms);
    state.locked.store(false, Ordering::SeqCst);
}

/// `pause()` — stops the tick without altering `limitMs` or the stored
/// activity timestamp.
pub fn pause() {
    inner().ticking.store(false, Ordering::SeqCst);
}

/// `resume()` — restarts ticking.
pub fn resume() {
    inner().ticking.store(true, Ordering::SeqCst);
}

/// Exposed directly so tests (and the real tick task) can drive the check
/// with an explicit timestamp instead of waiting on the wall clock.
pub fn tick(now_ms: i64) {
    let state = inner();
    if !state.enabled.load(Ordering::SeqCst) || !state.ticking.load(Ordering::SeqCst) {
        return;
    }
    if state.locked.load(Ordering::SeqCst) {
        return;
    }

    let limit = state.limit_ms.load(Ordering::SeqCst);
    let last_activity = state.last_activity_ms.load(Ordering::SeqCst);
    if now_ms - last_activity >= limit {
        state.locked.store(true, Ordering::SeqCst);
        if let Some(on_lock) = state.on_lock.lock().as_ref() {
            tracing::info!("auto-lock inactivity limit exceeded");
            on_lock();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// `AUTO_LOCK` is a process-wide singleton; serialise the tests that
    /// touch it so they don't observe each other's `init`/`cleanup` calls.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn tick_fires_on_lock_exactly_once_past_the_limit() {
        let _guard = TEST_LOCK.lock();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        init(move || { fired_clone.fetch_add(1, Ordering::SeqCst); }, Some(1_000), 0);

        tick(500);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tick(1_000);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        tick(2_000);
        assert_eq!(fired.load(Ordering::SeqCst), 1, "must not fire twice without a reset");

        cleanup();
    }

    #[test]
    fn reset_inactivity_timer_allows_it_to_fire_again() {
        let _guard = TEST_LOCK.lock();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        init(move || { fired_clone.fetch_add(1, Ordering::SeqCst); }, Some(1_000), 0);

        tick(1_000);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        reset_inactivity_timer(1_000);
        tick(1_500);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        tick(2_000);
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        cleanup();
    }

    #[test]
    fn pause_prevents_firing_until_resumed() {
        let _guard = TEST_LOCK.lock();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        init(move || { fired_clone.fetch_add(1, Ordering::SeqCst); }, Some(1_000), 0);

        pause();
        tick(5_000);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        resume();
        tick(5_000);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        cleanup();
    }

    #[test]
    fn current_now_ms_advances_with_real_elapsed_time() {
        let _guard = TEST_LOCK.lock();
        init(|| {}, Some(1_000), 0);

        let first = current_now_ms();
        std::thread::sleep(Duration::from_millis(20));
        let second = current_now_ms();

        assert!(second > first, "current_now_ms must reflect actual elapsed time, not a fixed offset");

        cleanup();
    }
}
