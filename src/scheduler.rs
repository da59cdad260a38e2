//! Two-phase sampling timer.
//!
//! A session alternates between a short Active burst, where a tick fires every
//! `tick_ms`, and a long Idle gap of random length. Exactly one phase timer
//! exists at a time: entering a phase drops the previous phase's timer and
//! ticker before creating new ones.

use std::pin::Pin;
use std::time::Duration;

use anyhow::{ensure, Result};
use log::info;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior, Sleep};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub active_ms: u64,
    pub tick_ms: u64,
    pub idle_min_ms: u64,
    pub idle_max_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            active_ms: 15_000,
            tick_ms: 100,
            idle_min_ms: 120_000,
            idle_max_ms: 180_000,
        }
    }
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.tick_ms > 0, "schedule.tick_ms must be positive");
        ensure!(self.active_ms > 0, "schedule.active_ms must be positive");
        ensure!(
            self.idle_min_ms < self.idle_max_ms,
            "schedule.idle_min_ms ({}) must be below idle_max_ms ({})",
            self.idle_min_ms,
            self.idle_max_ms
        );
        Ok(())
    }

    pub fn active(&self) -> Duration {
        Duration::from_millis(self.active_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    /// Uniform draw from `[idle_min_ms, idle_max_ms)`.
    pub fn sample_idle<R: Rng>(&self, rng: &mut R) -> Duration {
        let ms = if self.idle_max_ms > self.idle_min_ms {
            rng.gen_range(self.idle_min_ms..self.idle_max_ms)
        } else {
            self.idle_min_ms
        };
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Active,
    Idle,
}

impl Phase {
    fn next(self) -> Self {
        match self {
            Phase::Active => Phase::Idle,
            Phase::Idle => Phase::Active,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleEvent {
    /// Detection opportunity; only emitted while Active.
    Tick,
    /// The previous phase expired and `Phase` has been entered.
    Entered(Phase),
}

/// Timer state of the current phase.
pub struct ScheduleState {
    phase: Phase,
    duration: Duration,
    deadline: Instant,
    timer: Pin<Box<Sleep>>,
    ticker: Option<Interval>,
}

impl ScheduleState {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

pub struct SamplingScheduler {
    config: ScheduleConfig,
    state: Option<ScheduleState>,
    rng: StdRng,
}

impl SamplingScheduler {
    pub fn new(config: ScheduleConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn with_seed(config: ScheduleConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: ScheduleConfig, rng: StdRng) -> Self {
        Self {
            config,
            state: None,
            rng,
        }
    }

    /// Begin with an Active phase so the first check happens immediately.
    pub fn start(&mut self) {
        self.enter(Phase::Active);
    }

    /// Drop every pending timer. The scheduler stays silent until restarted.
    pub fn cancel(&mut self) {
        self.state = None;
    }

    pub fn state(&self) -> Option<&ScheduleState> {
        self.state.as_ref()
    }

    pub fn phase(&self) -> Option<Phase> {
        self.state.as_ref().map(|s| s.phase)
    }

    pub fn is_active(&self) -> bool {
        self.phase() == Some(Phase::Active)
    }

    fn enter(&mut self, phase: Phase) {
        // cancel the old phase before arming the new one
        self.state = None;

        let now = Instant::now();
        let (duration, ticker) = match phase {
            Phase::Active => {
                let mut ticker = interval_at(now, self.config.tick());
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                (self.config.active(), Some(ticker))
            }
            Phase::Idle => (self.config.sample_idle(&mut self.rng), None),
        };

        match phase {
            Phase::Active => info!("active detection period for {:.1}s", duration.as_secs_f32()),
            Phase::Idle => info!(
                "next detection period in {:.2} minutes",
                duration.as_secs_f32() / 60.0
            ),
        }

        let deadline = now + duration;
        self.state = Some(ScheduleState {
            phase,
            duration,
            deadline,
            timer: Box::pin(sleep_until(deadline)),
            ticker,
        });
    }

    /// Wait for the next tick or phase change. Pending forever when stopped.
    ///
    /// Cancel safe: dropping the future loses no timer state.
    pub async fn next_event(&mut self) -> ScheduleEvent {
        let Some(state) = self.state.as_mut() else {
            return std::future::pending().await;
        };

        let expired = match state.ticker.as_mut() {
            Some(ticker) => tokio::select! {
                biased;
                _ = state.timer.as_mut() => true,
                _ = ticker.tick() => false,
            },
            None => {
                state.timer.as_mut().await;
                true
            }
        };

        if !expired {
            return ScheduleEvent::Tick;
        }
        let next = state.phase.next();
        self.enter(next);
        ScheduleEvent::Entered(next)
    }
}
