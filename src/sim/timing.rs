//! Frame clock, fixed-step accounting and deferred actions
//!
//! One controller is owned by the host and shared by every simulation
//! instance. Each frame the host records the frame delta, asks how many
//! fixed steps are owed, clamps that to [`MAX_STEPS`](crate::consts::MAX_STEPS)
//! and commits the unclamped count with [`TimingController::step`]. Dropping
//! the excess trades a visible slowdown during stalls for a hard ceiling on
//! physics work per frame.

use std::collections::VecDeque;
use std::time::Instant;

use crate::consts::LOAD_WINDOW;

/// Identity of a simulation instance, used to scope timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u64);

/// Deferred auto-control actions. Each one re-validates its trigger when fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// Pick an upgrade if the offer for `level` is still pending
    AutoPickUpgrade { level: u32 },
    /// Continue after game over if the continue counter still matches
    AutoContinue { continues: u32 },
    /// Enter endless mode if the win prompt for `level` is still pending
    AutoEndless { level: u32 },
}

impl TimerAction {
    fn same_kind(&self, other: &TimerAction) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Receiver of fired timers
pub trait TimerTarget {
    fn on_timer(&mut self, action: TimerAction);
}

#[derive(Debug, Clone)]
struct Timer {
    owner: InstanceId,
    action: TimerAction,
    fire_at: f64,
}

#[derive(Debug)]
pub struct TimingController {
    /// Total elapsed frame time (ms)
    elapsed: f64,
    /// Watermark of committed fixed steps (ms)
    last_step: f64,
    /// Most recent frame delta (ms)
    delta: f64,
    intervals_total: VecDeque<f64>,
    intervals_work: VecDeque<f64>,
    prev_work: f64,
    work_start: Option<Instant>,
    timers: Vec<Timer>,
}

impl Default for TimingController {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingController {
    pub fn new() -> Self {
        Self {
            elapsed: 0.0,
            last_step: 0.0,
            delta: 0.0,
            intervals_total: VecDeque::with_capacity(LOAD_WINDOW + 1),
            intervals_work: VecDeque::with_capacity(LOAD_WINDOW + 1),
            prev_work: 0.0,
            work_start: None,
            timers: Vec::new(),
        }
    }

    /// Record the start of a frame that took `delta_ms` since the previous one
    pub fn begin_frame(&mut self, delta_ms: f64) {
        let delta_ms = delta_ms.max(0.0);
        self.delta = delta_ms;
        self.intervals_total.push_back(delta_ms);
        self.intervals_work.push_back(self.prev_work);
        if self.intervals_total.len() > LOAD_WINDOW {
            self.intervals_total.pop_front();
            self.intervals_work.pop_front();
        }
        self.elapsed += delta_ms;
    }

    pub fn begin_work(&mut self) {
        self.work_start = Some(Instant::now());
    }

    pub fn end_work(&mut self) {
        if let Some(start) = self.work_start.take() {
            self.prev_work = start.elapsed().as_secs_f64() * 1000.0;
        }
    }

    /// Record the work duration directly (hosts that measure their own frames)
    pub fn record_work(&mut self, work_ms: f64) {
        self.prev_work = work_ms.max(0.0);
    }

    /// Fraction of frame time spent working, over the rolling window
    pub fn load(&self) -> f64 {
        let total: f64 = self.intervals_total.iter().sum();
        if total <= 0.0 {
            return 0.0;
        }
        self.intervals_work.iter().sum::<f64>() / total
    }

    /// Most recent frame delta (ms)
    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Total elapsed time (ms)
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Whole fixed steps owed since the last commit
    pub fn get_steps(&self, step_ms: f64) -> u32 {
        if step_ms <= 0.0 {
            return 0;
        }
        let owed = ((self.elapsed - self.last_step) / step_ms).floor();
        if owed <= 0.0 { 0 } else { owed as u32 }
    }

    /// Commit `steps` fixed steps. Call once per frame, after stepping.
    pub fn step(&mut self, steps: u32, step_ms: f64) {
        self.last_step += steps as f64 * step_ms;
    }

    /// Schedule `action` for `owner` after `duration_ms`. Replaces a pending
    /// timer of the same kind for the same owner.
    pub fn create_timer(&mut self, owner: InstanceId, action: TimerAction, duration_ms: f64) {
        self.timers
            .retain(|t| !(t.owner == owner && t.action.same_kind(&action)));
        self.timers.push(Timer {
            owner,
            action,
            fire_at: self.elapsed + duration_ms,
        });
    }

    /// Fire every due timer belonging to `owner`, in creation order
    pub fn run_timers<T: TimerTarget + ?Sized>(&mut self, owner: InstanceId, target: &mut T) {
        let now = self.elapsed;
        let mut fired = Vec::new();
        self.timers.retain(|t| {
            if t.owner == owner && now >= t.fire_at {
                fired.push(t.action);
                false
            } else {
                true
            }
        });
        for action in fired {
            log::debug!("Timer fired for {:?}: {:?}", owner, action);
            target.on_timer(action);
        }
    }

    /// Drop every pending timer (mode transitions)
    pub fn clear_timers(&mut self) {
        self.timers.clear();
    }

    /// Drop the pending timers of one instance (instance teardown)
    pub fn clear_timers_for(&mut self, owner: InstanceId) {
        self.timers.retain(|t| t.owner != owner);
    }

    pub fn pending_timers(&self, owner: InstanceId) -> usize {
        self.timers.iter().filter(|t| t.owner == owner).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        fired: Vec<TimerAction>,
    }

    impl TimerTarget for Recorder {
        fn on_timer(&mut self, action: TimerAction) {
            self.fired.push(action);
        }
    }

    #[test]
    fn test_steps_are_fully_committed() {
        let mut timing = TimingController::new();
        timing.begin_frame(35.0);
        let steps = timing.get_steps(10.0);
        assert_eq!(steps, 3);
        timing.step(steps, 10.0);
        assert_eq!(timing.get_steps(10.0), 0);

        // Remainder carries into the next frame
        timing.begin_frame(5.0);
        assert_eq!(timing.get_steps(10.0), 1);
    }

    #[test]
    fn test_clamped_stall_drops_owed_time() {
        let mut timing = TimingController::new();
        timing.begin_frame(1000.0);
        let steps = timing.get_steps(10.0);
        assert_eq!(steps, 100);
        let run = steps.min(crate::consts::MAX_STEPS);
        assert_eq!(run, crate::consts::MAX_STEPS);
        timing.step(steps, 10.0);
        assert_eq!(timing.get_steps(10.0), 0);
    }

    #[test]
    fn test_load_window() {
        let mut timing = TimingController::new();
        assert_eq!(timing.load(), 0.0);
        for _ in 0..LOAD_WINDOW {
            timing.record_work(5.0);
            timing.begin_frame(10.0);
        }
        assert!((timing.load() - 0.5).abs() < 1e-9);

        // Old samples fall out of the window
        for _ in 0..LOAD_WINDOW {
            timing.record_work(0.0);
            timing.begin_frame(10.0);
        }
        assert!(timing.load() < 0.06);
    }

    #[test]
    fn test_timer_fires_once_after_duration() {
        let owner = InstanceId(1);
        let mut timing = TimingController::new();
        let mut target = Recorder::default();
        timing.create_timer(owner, TimerAction::AutoContinue { continues: 1 }, 100.0);

        timing.begin_frame(60.0);
        timing.run_timers(owner, &mut target);
        assert!(target.fired.is_empty());

        timing.begin_frame(60.0);
        timing.run_timers(owner, &mut target);
        assert_eq!(target.fired, vec![TimerAction::AutoContinue { continues: 1 }]);

        timing.begin_frame(500.0);
        timing.run_timers(owner, &mut target);
        assert_eq!(target.fired.len(), 1);
    }

    #[test]
    fn test_timers_scoped_by_owner() {
        let game = InstanceId(1);
        let preview = InstanceId(2);
        let mut timing = TimingController::new();
        let mut target = Recorder::default();
        timing.create_timer(game, TimerAction::AutoEndless { level: 3 }, 10.0);
        timing.create_timer(preview, TimerAction::AutoPickUpgrade { level: 2 }, 10.0);

        timing.begin_frame(20.0);
        timing.run_timers(preview, &mut target);
        assert_eq!(target.fired, vec![TimerAction::AutoPickUpgrade { level: 2 }]);
        assert_eq!(timing.pending_timers(game), 1);

        timing.clear_timers_for(game);
        assert_eq!(timing.pending_timers(game), 0);
    }

    #[test]
    fn test_same_kind_replaces_and_clear_discards() {
        let owner = InstanceId(7);
        let mut timing = TimingController::new();
        timing.create_timer(owner, TimerAction::AutoPickUpgrade { level: 2 }, 10.0);
        timing.create_timer(owner, TimerAction::AutoPickUpgrade { level: 3 }, 10.0);
        timing.create_timer(owner, TimerAction::AutoContinue { continues: 1 }, 10.0);
        assert_eq!(timing.pending_timers(owner), 2);

        timing.clear_timers();
        let mut target = Recorder::default();
        timing.begin_frame(100.0);
        timing.run_timers(owner, &mut target);
        assert!(target.fired.is_empty());
    }
}
