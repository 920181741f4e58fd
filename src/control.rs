// Control module - Process-wide animation flags shared by every task
//
// These four flags are the only synchronization contract in the engine:
// pulse tasks poll `kill`, the wave runner polls `button_active`, the
// ambient selector respects `block`, and `sequence_active` enforces the
// one-wave-at-a-time rule.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// How long a preemption waits after raising `kill` so that every in-flight
/// pulse task observes it before new tasks start.
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

pub struct AnimationControl {
    /// Abort every in-flight pulse task.
    kill: AtomicBool,
    /// Suppress ambient sequence selection while a wave or button owns the grid.
    block: AtomicBool,
    /// A user button press is in progress; wins over any running wave.
    button_active: AtomicBool,
    /// At most one wave/ambient sequence runs at a time.
    sequence_active: AtomicBool,
    /// No new ambient sequence may start before this instant.
    next_ambient: Mutex<Instant>,
}

impl AnimationControl {
    pub fn new() -> Self {
        AnimationControl {
            kill: AtomicBool::new(false),
            block: AtomicBool::new(false),
            button_active: AtomicBool::new(false),
            sequence_active: AtomicBool::new(false),
            next_ambient: Mutex::new(Instant::now()),
        }
    }

    pub fn kill_requested(&self) -> bool {
        self.kill.load(Ordering::SeqCst)
    }

    pub fn set_kill(&self, value: bool) {
        self.kill.store(value, Ordering::SeqCst);
    }

    pub fn blocked(&self) -> bool {
        self.block.load(Ordering::SeqCst)
    }

    pub fn set_block(&self, value: bool) {
        self.block.store(value, Ordering::SeqCst);
    }

    pub fn button_active(&self) -> bool {
        self.button_active.load(Ordering::SeqCst)
    }

    pub fn set_button_active(&self, value: bool) {
        self.button_active.store(value, Ordering::SeqCst);
    }

    pub fn sequence_active(&self) -> bool {
        self.sequence_active.load(Ordering::SeqCst)
    }

    /// Claim the single sequence slot. Returns false if a sequence already
    /// owns the grid, in which case the caller must do nothing.
    pub fn try_begin_sequence(&self) -> bool {
        self.sequence_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn end_sequence(&self) {
        self.sequence_active.store(false, Ordering::SeqCst);
    }

    /// Hard preemption preamble: raise `kill` and `block`, give running
    /// tasks one settle delay to exit, then drop `kill` again.
    pub async fn preempt(&self) {
        self.set_kill(true);
        self.set_block(true);
        tokio::time::sleep(SETTLE_DELAY).await;
        self.set_kill(false);
    }

    pub fn next_ambient_time(&self) -> Instant {
        *self.next_ambient.lock().unwrap()
    }

    pub fn set_next_ambient_time(&self, when: Instant) {
        *self.next_ambient.lock().unwrap() = when;
    }
}

impl Default for AnimationControl {
    fn default() -> Self {
        Self::new()
    }
}
