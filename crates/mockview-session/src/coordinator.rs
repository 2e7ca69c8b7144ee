//! Stage coordinator - the interview state machine.
//!
//! Two independent sources request stage changes: the local clock (expiry) and
//! the remote agent (data-channel signals). Both are reduced here by one pure
//! transition function; the driver only executes the returned [`Effect`]s.
//! A request for the stage that is already active is a no-op, so a local expiry
//! and a remote `stage_changed` for the same target arm the timer once.
//!
//! | Current | Event | Next | Effects |
//! |---|---|---|---|
//! | Intro | clock expired (Intro) | Experience | restart clock |
//! | Intro | stage_changed(experience) | Experience | restart clock |
//! | Experience | clock expired | Experience | none, hold at zero |
//! | Intro / Experience | interview_complete | Completed | cancel clock, teardown |
//! | Experience | stage_changed(experience) | Experience | none |
//! | Completed | anything | Completed | none |

use crate::signal::RemoteSignal;
use crate::stage::Stage;
use tracing::debug;

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    /// The countdown armed for `stage` reached zero.
    ClockExpired { stage: Stage },
    Remote(RemoteSignal),
}

/// Side effects the driver must run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Cancel the running countdown and arm a fresh one with this stage's duration.
    RestartClock(Stage),
    CancelClock,
    /// Run session teardown (completion path).
    Teardown,
}

/// Result of one transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: Stage,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn stay(stage: Stage) -> Self {
        Self {
            next: stage,
            effects: Vec::new(),
        }
    }

    pub fn changed_from(&self, previous: Stage) -> bool {
        self.next != previous
    }
}

/// `(current, event) -> (next, effects)`. Pure; no clock or network.
pub fn transition(current: Stage, event: &CoordinatorEvent) -> Transition {
    match (current, event) {
        (Stage::Completed, _) => Transition::stay(Stage::Completed),

        (_, CoordinatorEvent::Remote(RemoteSignal::InterviewComplete)) => Transition {
            next: Stage::Completed,
            effects: vec![Effect::CancelClock, Effect::Teardown],
        },

        (_, CoordinatorEvent::Remote(RemoteSignal::StageChanged { target })) => {
            enter(current, *target)
        }

        (_, CoordinatorEvent::Remote(RemoteSignal::Unrecognized)) => Transition::stay(current),

        (Stage::Intro, CoordinatorEvent::ClockExpired { stage: Stage::Intro }) => {
            enter(current, Stage::Experience)
        }

        // Experience holds at zero until the agent signals completion. Expiries
        // tagged for another stage are leftovers from a replaced timer.
        (_, CoordinatorEvent::ClockExpired { .. }) => Transition::stay(current),
    }
}

/// Forward-only entry into a timed stage; re-entering or going back is a no-op.
fn enter(current: Stage, target: Stage) -> Transition {
    if target <= current || target.is_terminal() {
        return Transition::stay(current);
    }
    Transition {
        next: target,
        effects: vec![Effect::RestartClock(target)],
    }
}

/// Holds the current stage and folds events through [`transition`].
#[derive(Debug, Clone, Default)]
pub struct StageCoordinator {
    stage: Stage,
}

impl StageCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Apply an event and return the effects to execute.
    pub fn apply(&mut self, event: &CoordinatorEvent) -> Vec<Effect> {
        let previous = self.stage;
        let t = transition(previous, event);
        if t.changed_from(previous) {
            debug!(from = %previous, to = %t.next, ?event, "stage transition");
        } else if t.effects.is_empty() {
            debug!(stage = %previous, ?event, "no-op stage event");
        }
        self.stage = t.next;
        t.effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expired(stage: Stage) -> CoordinatorEvent {
        CoordinatorEvent::ClockExpired { stage }
    }

    fn changed(target: Stage) -> CoordinatorEvent {
        CoordinatorEvent::Remote(RemoteSignal::StageChanged { target })
    }

    fn complete() -> CoordinatorEvent {
        CoordinatorEvent::Remote(RemoteSignal::InterviewComplete)
    }

    fn restarts(effects: &[Effect], stage: Stage) -> usize {
        effects
            .iter()
            .filter(|e| **e == Effect::RestartClock(stage))
            .count()
    }

    #[test]
    fn transition_table() {
        use Stage::{Completed, Experience, Intro};
        let restart = || vec![Effect::RestartClock(Experience)];
        let finish = || vec![Effect::CancelClock, Effect::Teardown];
        let rows = [
            (Intro, expired(Intro), Experience, restart()),
            (Intro, changed(Experience), Experience, restart()),
            (Experience, expired(Experience), Experience, vec![]),
            (Intro, complete(), Completed, finish()),
            (Experience, complete(), Completed, finish()),
            (Experience, changed(Experience), Experience, vec![]),
            (Completed, complete(), Completed, vec![]),
            (Completed, expired(Experience), Completed, vec![]),
            (Completed, changed(Experience), Completed, vec![]),
        ];
        for (current, event, next, effects) in rows {
            let t = transition(current, &event);
            assert_eq!(t.next, next, "{current:?} + {event:?}");
            assert_eq!(t.effects, effects, "{current:?} + {event:?}");
        }
    }

    #[test]
    fn never_moves_backwards() {
        assert_eq!(transition(Stage::Experience, &changed(Stage::Intro)).next, Stage::Experience);
        assert!(transition(Stage::Intro, &changed(Stage::Intro)).effects.is_empty());
        assert_eq!(transition(Stage::Experience, &expired(Stage::Intro)).next, Stage::Experience);
    }

    #[test]
    fn unrecognized_is_ignored_everywhere() {
        for stage in [Stage::Intro, Stage::Experience, Stage::Completed] {
            let t = transition(stage, &CoordinatorEvent::Remote(RemoteSignal::Unrecognized));
            assert_eq!(t.next, stage);
            assert!(t.effects.is_empty());
        }
    }

    #[test]
    fn expiry_and_remote_signal_race_in_either_order() {
        let orders = [
            [expired(Stage::Intro), changed(Stage::Experience)],
            [changed(Stage::Experience), expired(Stage::Intro)],
        ];
        for order in orders {
            let mut c = StageCoordinator::new();
            let mut effects = Vec::new();
            let mut entries = 0;
            for event in &order {
                let before = c.stage();
                effects.extend(c.apply(event));
                if before != Stage::Experience && c.stage() == Stage::Experience {
                    entries += 1;
                }
            }
            assert_eq!(c.stage(), Stage::Experience);
            assert_eq!(entries, 1);
            assert_eq!(restarts(&effects, Stage::Experience), 1);
        }
    }

    #[test]
    fn repeated_stage_changed_is_idempotent() {
        let mut c = StageCoordinator::new();
        assert_eq!(c.apply(&changed(Stage::Experience)).len(), 1);
        assert!(c.apply(&changed(Stage::Experience)).is_empty());
        assert!(c.apply(&changed(Stage::Experience)).is_empty());
    }

    #[test]
    fn completion_tears_down_exactly_once() {
        for start in [Stage::Intro, Stage::Experience] {
            let mut c = StageCoordinator { stage: start };
            let mut effects = c.apply(&complete());
            effects.extend(c.apply(&complete()));
            effects.extend(c.apply(&expired(start)));
            assert_eq!(c.stage(), Stage::Completed);
            assert_eq!(effects.iter().filter(|e| **e == Effect::Teardown).count(), 1);
        }
    }
}
