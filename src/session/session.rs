use super::config::SessionConfig;
use crate::library::AudioLibraryManager;
use crate::persistence::SessionHistory;
use crate::timer::{format_clock, Clock, SessionGoal, SessionTimer, TickOutcome, TimerSnapshot, TimerState};
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

struct FocusState {
    timer: SessionTimer,
    /// Whether this run has already been written to history
    recorded: bool,
}

struct TickTask {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// A focus session: the timer plus the sounds that follow it
///
/// Starting runs the timer and the ambience loop, pausing silences the
/// ambience, reaching the goal plays the chime once and records the session.
pub struct FocusSession {
    /// Session configuration
    config: SessionConfig,

    clock: Arc<dyn Clock>,
    library: Arc<AudioLibraryManager>,
    history: Arc<dyn SessionHistory>,

    state: Arc<Mutex<FocusState>>,
    snapshot_tx: Arc<watch::Sender<TimerSnapshot>>,

    /// Running timer tick task
    tick_task: Mutex<Option<TickTask>>,
}

impl FocusSession {
    pub fn new(
        config: SessionConfig,
        clock: Arc<dyn Clock>,
        library: Arc<AudioLibraryManager>,
        history: Arc<dyn SessionHistory>,
    ) -> Self {
        let timer = SessionTimer::new(config.goal());
        let (snapshot_tx, _) = watch::channel(timer.snapshot(clock.now()));

        Self {
            config,
            clock,
            library,
            history,
            state: Arc::new(Mutex::new(FocusState { timer, recorded: false })),
            snapshot_tx: Arc::new(snapshot_tx),
            tick_task: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<TimerSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub async fn snapshot(&self) -> TimerSnapshot {
        let state = self.state.lock().await;
        state.timer.snapshot(self.clock.now())
    }

    pub async fn state(&self) -> TimerState {
        self.state.lock().await.timer.state()
    }

    /// Start from idle or resume from paused
    pub async fn start(&self) -> bool {
        {
            let mut state = self.state.lock().await;
            let fresh = state.timer.state() == TimerState::Idle;
            let now = self.clock.now();
            if !state.timer.start(now) {
                warn!("Session not started from {:?}", state.timer.state());
                return false;
            }
            if fresh {
                state.recorded = false;
            }
            self.snapshot_tx.send_replace(state.timer.snapshot(now));
            info!(
                "Session {}: goal {}",
                if fresh { "started" } else { "resumed" },
                match state.timer.goal() {
                    SessionGoal::Finite(goal) => format_clock(goal),
                    SessionGoal::OpenEnded => "open".to_string(),
                }
            );
        }

        self.stop_tick().await;
        let task = self.spawn_tick();
        *self.tick_task.lock().await = Some(task);

        if self.library.start_ambience().await.is_err() {
            debug!("Session running without ambience");
        }
        true
    }

    pub async fn pause(&self) -> bool {
        {
            let mut state = self.state.lock().await;
            let now = self.clock.now();
            if !state.timer.pause(now) {
                return false;
            }
            self.snapshot_tx.send_replace(state.timer.snapshot(now));
            info!("Session paused at {}", format_clock(state.timer.elapsed(now)));
        }

        self.stop_tick().await;
        self.library.stop_ambience().await;
        true
    }

    pub async fn resume(&self) -> bool {
        self.start().await
    }

    /// End the session, record it if long enough, and return to idle
    ///
    /// Returns the recorded duration, if the session was written to history.
    pub async fn stop(&self) -> Result<Option<Duration>> {
        self.stop_tick().await;

        let recorded = {
            let mut state = self.state.lock().await;
            let now = self.clock.now();
            state.timer.finish(now);
            let elapsed = state.timer.elapsed(now);

            let record = !state.recorded && !elapsed.is_zero() && elapsed >= self.config.min_recorded;
            if record {
                state.recorded = true;
            } else if !state.recorded {
                debug!("Session of {} too short to record", format_clock(elapsed));
            }

            state.timer.reset();
            self.snapshot_tx.send_replace(state.timer.snapshot(now));
            info!("Session stopped after {}", format_clock(elapsed));
            record.then_some(elapsed)
        };

        self.library.stop_ambience().await;

        if let Some(elapsed) = recorded {
            self.history.record_completed_session(elapsed, Utc::now()).await?;
        }
        Ok(recorded)
    }

    /// Change the goal; a running session is abandoned without recording
    pub async fn set_goal(&self, goal: SessionGoal) {
        self.stop_tick().await;
        {
            let mut state = self.state.lock().await;
            state.timer.set_goal(goal);
            state.recorded = false;
            self.snapshot_tx.send_replace(state.timer.snapshot(self.clock.now()));
        }
        self.library.stop_ambience().await;
    }

    fn spawn_tick(&self) -> TickTask {
        let state = Arc::clone(&self.state);
        let clock = Arc::clone(&self.clock);
        let library = Arc::clone(&self.library);
        let history = Arc::clone(&self.history);
        let snapshot_tx = Arc::clone(&self.snapshot_tx);
        let interval = self.config.tick_interval;
        let min_recorded = self.config.min_recorded;
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {}
                }

                let mut guard = state.lock().await;
                let now = clock.now();
                let outcome = guard.timer.tick(now);
                snapshot_tx.send_replace(guard.timer.snapshot(now));

                match outcome {
                    TickOutcome::Running => continue,
                    TickOutcome::Inactive => break,
                    TickOutcome::GoalReached => {
                        let elapsed = guard.timer.elapsed(now);
                        let record = !guard.recorded && elapsed >= min_recorded;
                        guard.recorded |= record;
                        drop(guard);

                        // Runs to completion even if a stop arrives meanwhile
                        if record {
                            if let Err(e) = history.record_completed_session(elapsed, Utc::now()).await {
                                error!("Failed to record session: {:#}", e);
                            }
                        }

                        if library.trigger_chime().await.is_err() {
                            debug!("Goal reached without chime");
                        }
                        library.stop_ambience().await;
                        break;
                    }
                }
            }
        });

        TickTask { stop_tx, handle }
    }

    /// Stop the tick task, letting a goal already being handled finish
    async fn stop_tick(&self) {
        let task = self.tick_task.lock().await.take();
        if let Some(TickTask { stop_tx, handle }) = task {
            let _ = stop_tx.send(());
            if let Err(e) = handle.await {
                error!("Timer tick task panicked: {}", e);
            }
        }
    }
}
