//! Stage clock - a single countdown per session.
//!
//! The clock never mutates itself from a background task. A spawned ticker only
//! posts [`ClockTick`]s into the orchestration loop, which applies them with
//! [`StageClock::on_tick`]. Every `start`/`cancel` bumps the generation, so ticks
//! already queued by a replaced timer are dropped on arrival and can never
//! produce a second expiry.

use crate::session::SessionId;
use crate::stage::Stage;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

/// Countdown state. `remaining_secs` stays within `0..=duration_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimerState {
    remaining_secs: u32,
    duration_secs: u32,
    running: bool,
}

impl TimerState {
    /// Stopped timer showing a full `duration_secs` (pre-call display).
    pub fn idle(duration_secs: u32) -> Self {
        Self {
            remaining_secs: duration_secs,
            duration_secs,
            running: false,
        }
    }

    fn arm(&mut self, duration_secs: u32) {
        self.duration_secs = duration_secs;
        self.remaining_secs = duration_secs;
        self.running = duration_secs > 0;
    }

    fn stop(&mut self) {
        self.running = false;
    }

    /// One second elapsed. Returns true exactly when this tick reached zero.
    fn tick(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        if self.remaining_secs == 0 {
            self.running = false;
            return true;
        }
        false
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

/// Posted by the ticker task once per period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTick {
    pub session_id: SessionId,
    pub generation: u64,
}

/// What applying a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOutcome {
    /// Stale or foreign tick; nothing changed.
    Ignored,
    Ticked { remaining_secs: u32 },
    /// The countdown for `stage` reached zero. Emitted once per `start`.
    Expired { stage: Stage },
}

/// Owns the one countdown timer of a session.
pub struct StageClock {
    session_id: SessionId,
    period: Duration,
    tick_tx: mpsc::UnboundedSender<ClockTick>,
    state: TimerState,
    stage: Option<Stage>,
    generation: u64,
    ticker: Option<JoinHandle<()>>,
    arm_count: u32,
}

impl StageClock {
    pub fn new(
        session_id: SessionId,
        period: Duration,
        tick_tx: mpsc::UnboundedSender<ClockTick>,
    ) -> Self {
        Self {
            session_id,
            period,
            tick_tx,
            state: TimerState::default(),
            stage: None,
            generation: 0,
            ticker: None,
            arm_count: 0,
        }
    }

    /// Cancel whatever is running, then arm a fresh countdown for `stage`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, stage: Stage, duration_secs: u32) {
        self.cancel();
        self.state.arm(duration_secs);
        self.stage = Some(stage);
        self.arm_count += 1;
        if !self.state.is_running() {
            return;
        }

        let tick = ClockTick {
            session_id: self.session_id,
            generation: self.generation,
        };
        let period = self.period;
        let tx = self.tick_tx.clone();
        self.ticker = Some(tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tx.send(tick).is_err() {
                    break;
                }
            }
        }));
        debug!(
            session_id = %self.session_id,
            stage = %stage,
            duration_secs,
            generation = self.generation,
            "stage clock armed"
        );
    }

    /// Stop the countdown without an expiry. Queued ticks become stale.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
        self.state.stop();
        self.generation += 1;
    }

    /// Apply one tick from the ticker task.
    pub fn on_tick(&mut self, tick: ClockTick) -> ClockOutcome {
        if tick.session_id != self.session_id || tick.generation != self.generation {
            return ClockOutcome::Ignored;
        }
        if !self.state.is_running() {
            return ClockOutcome::Ignored;
        }
        if self.state.tick() {
            if let Some(handle) = self.ticker.take() {
                handle.abort();
            }
            // Expiry is consumed; any tick still in flight must not count again.
            self.generation += 1;
            return match self.stage {
                Some(stage) => ClockOutcome::Expired { stage },
                None => ClockOutcome::Ignored,
            };
        }
        ClockOutcome::Ticked {
            remaining_secs: self.state.remaining_secs(),
        }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    /// How many times `start` armed this clock.
    pub fn arm_count(&self) -> u32 {
        self.arm_count
    }
}

impl Drop for StageClock {
    fn drop(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }
}
