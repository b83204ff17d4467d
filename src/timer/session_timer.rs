// Session timer state machine
//
// Elapsed time is always accumulated + (now - anchor). The anchor is set when
// the timer starts running and folded into `accumulated` when it pauses or
// finishes, so ticks only observe time and never count it. A late or missed
// tick therefore cannot skew the result.

use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// How long a session should run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionGoal {
    Finite(Duration),
    /// Runs until stopped
    OpenEnded,
}

impl SessionGoal {
    /// Goal picker value; zero minutes is an open-ended session
    pub fn from_minutes(minutes: u64) -> Self {
        if minutes == 0 {
            SessionGoal::OpenEnded
        } else {
            SessionGoal::Finite(Duration::from_secs(minutes * 60))
        }
    }

    pub fn from_secs(secs: u64) -> Self {
        if secs == 0 {
            SessionGoal::OpenEnded
        } else {
            SessionGoal::Finite(Duration::from_secs(secs))
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            SessionGoal::Finite(d) => Some(*d),
            SessionGoal::OpenEnded => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerState {
    Idle,
    Running,
    Paused,
    Finished,
}

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Timer is not running; the tick had no effect
    Inactive,
    Running,
    /// The goal was reached on this tick. Reported once per run.
    GoalReached,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimerSnapshot {
    pub state: TimerState,
    pub goal: SessionGoal,
    pub elapsed: Duration,
    /// None for open-ended sessions
    pub remaining: Option<Duration>,
    /// Fraction of the goal still to go, 1.0 at start
    pub progress: Option<f64>,
    pub goal_reached: bool,
}

#[derive(Debug, Clone)]
pub struct SessionTimer {
    goal: SessionGoal,
    accumulated: Duration,
    anchor: Option<Instant>,
    state: TimerState,
    goal_reached: bool,
}

impl SessionTimer {
    pub fn new(goal: SessionGoal) -> Self {
        Self {
            goal,
            accumulated: Duration::ZERO,
            anchor: None,
            state: TimerState::Idle,
            goal_reached: false,
        }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn goal(&self) -> SessionGoal {
        self.goal
    }

    pub fn goal_reached(&self) -> bool {
        self.goal_reached
    }

    /// Start or resume. Only valid from idle or paused.
    pub fn start(&mut self, now: Instant) -> bool {
        match self.state {
            TimerState::Idle | TimerState::Paused => {
                self.anchor = Some(now);
                self.state = TimerState::Running;
                debug!("Timer running from {:?}", self.accumulated);
                true
            }
            TimerState::Running | TimerState::Finished => false,
        }
    }

    /// Only valid while running
    pub fn pause(&mut self, now: Instant) -> bool {
        if self.state != TimerState::Running {
            return false;
        }
        self.fold(now);
        self.state = TimerState::Paused;
        debug!("Timer paused at {:?}", self.accumulated);
        true
    }

    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        if self.state != TimerState::Running {
            return TickOutcome::Inactive;
        }

        let elapsed = self.elapsed(now);
        match self.goal {
            SessionGoal::Finite(goal) if elapsed >= goal => {
                self.fold(now);
                self.state = TimerState::Finished;
                self.goal_reached = true;
                info!("Session goal reached: {}", format_clock(goal));
                TickOutcome::GoalReached
            }
            _ => TickOutcome::Running,
        }
    }

    /// End the run early (user stop or open-ended session)
    pub fn finish(&mut self, now: Instant) -> bool {
        match self.state {
            TimerState::Running | TimerState::Paused => {
                self.fold(now);
                self.state = TimerState::Finished;
                true
            }
            TimerState::Idle | TimerState::Finished => false,
        }
    }

    pub fn reset(&mut self) {
        self.accumulated = Duration::ZERO;
        self.anchor = None;
        self.state = TimerState::Idle;
        self.goal_reached = false;
    }

    /// Change the goal; the timer returns to idle
    pub fn set_goal(&mut self, goal: SessionGoal) {
        self.goal = goal;
        self.reset();
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        let running = self
            .anchor
            .map(|anchor| now.saturating_duration_since(anchor))
            .unwrap_or(Duration::ZERO);
        self.accumulated + running
    }

    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.goal
            .duration()
            .map(|goal| goal.saturating_sub(self.elapsed(now)))
    }

    pub fn snapshot(&self, now: Instant) -> TimerSnapshot {
        let remaining = self.remaining(now);
        let progress = match (self.goal.duration(), remaining) {
            (Some(goal), Some(remaining)) if !goal.is_zero() => {
                Some(remaining.as_secs_f64() / goal.as_secs_f64())
            }
            _ => None,
        };

        TimerSnapshot {
            state: self.state,
            goal: self.goal,
            elapsed: self.elapsed(now),
            remaining,
            progress,
            goal_reached: self.goal_reached,
        }
    }

    fn fold(&mut self, now: Instant) {
        if let Some(anchor) = self.anchor.take() {
            self.accumulated += now.saturating_duration_since(anchor);
        }
    }
}

/// `MM:SS`, minutes unbounded
pub fn format_clock(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
