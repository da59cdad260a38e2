//! A single sampling session: scheduler, runner and renderer driven from one
//! task until cancelled.

use anyhow::Result;
use log::{debug, info, warn};
use tokio::sync::watch;
use uuid::Uuid;

use crate::geometry::Size;
use crate::inference::DetectionResult;
use crate::overlay::OverlayRenderer;
use crate::runner::{DetectionCycleRunner, DropReason, TickOutcome};
use crate::scheduler::{Phase, SamplingScheduler, ScheduleEvent};

/// Raises the cancellation flag of one session.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

/// Session-side view of the cancellation flag.
#[derive(Debug, Clone)]
pub struct CancelToken(watch::Receiver<bool>);

pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), CancelToken(rx))
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

impl CancelToken {
    /// A dropped handle counts as cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow() || self.0.has_changed().is_err()
    }

    pub async fn cancelled(&mut self) {
        // Err means the handle is gone, which is cancellation too.
        let _ = self.0.wait_for(|cancelled| *cancelled).await;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub ticks: u64,
    pub attempts: u64,
    pub dropped_ticks: u64,
    pub discarded: u64,
    pub failures: u64,
    pub draws: u64,
    pub active_phases: u64,
}

pub struct Session {
    id: Uuid,
    scheduler: SamplingScheduler,
    runner: DetectionCycleRunner,
    renderer: OverlayRenderer,
    stats: SessionStats,
}

impl Session {
    pub fn new(
        id: Uuid,
        scheduler: SamplingScheduler,
        runner: DetectionCycleRunner,
        renderer: OverlayRenderer,
    ) -> Self {
        Self {
            id,
            scheduler,
            runner,
            renderer,
            stats: SessionStats::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Drive the session until `token` is cancelled.
    pub async fn run(mut self, mut token: CancelToken) -> SessionStats {
        if token.is_cancelled() {
            return self.finish();
        }

        let display = self.runner.video().display_size();
        self.renderer.observe(display);
        self.scheduler.start();
        self.stats.active_phases += 1;

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                (native, result) = self.runner.resolved() => {
                    self.on_resolved(&token, native, result);
                }
                event = self.scheduler.next_event() => self.on_event(&token, event),
            }
        }

        self.finish()
    }

    fn on_event(&mut self, token: &CancelToken, event: ScheduleEvent) {
        if token.is_cancelled() {
            return;
        }
        match event {
            ScheduleEvent::Tick => self.on_tick(),
            ScheduleEvent::Entered(Phase::Idle) => {
                // a pending call is discarded when it resolves
                self.renderer.clear();
            }
            ScheduleEvent::Entered(Phase::Active) => {
                self.stats.active_phases += 1;
            }
        }
    }

    fn on_tick(&mut self) {
        self.stats.ticks += 1;
        let display = self.runner.video().display_size();
        self.renderer.observe(display);

        match self.runner.tick(self.scheduler.is_active()) {
            TickOutcome::Issued => self.stats.attempts += 1,
            TickOutcome::Dropped(DropReason::InFlight) => self.stats.dropped_ticks += 1,
            TickOutcome::Dropped(reason) => debug!("session {}: tick skipped, {:?}", self.id, reason),
        }
    }

    fn on_resolved(
        &mut self,
        token: &CancelToken,
        native: Size,
        result: Result<Vec<DetectionResult>>,
    ) {
        if token.is_cancelled() {
            self.stats.discarded += 1;
            return;
        }
        let results = match result {
            Ok(results) => results,
            Err(e) => {
                self.stats.failures += 1;
                warn!("session {}: detection failed: {:#}", self.id, e);
                return;
            }
        };
        if !self.scheduler.is_active() {
            self.stats.discarded += 1;
            debug!("session {}: discarding results that outlived the active phase", self.id);
            self.renderer.clear();
            return;
        }

        let display = self.runner.video().display_size();
        self.renderer.observe(display);
        match self.runner.compose(&results, native, display) {
            Some(frame) => {
                if self.renderer.draw(&frame) {
                    self.stats.draws += 1;
                }
            }
            None => self.renderer.clear(),
        }
    }

    fn finish(mut self) -> SessionStats {
        self.scheduler.cancel();
        self.runner.detach();
        self.renderer.clear();
        info!("session {} stopped: {:?}", self.id, self.stats);
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_token() {
        let (handle, mut token) = cancel_pair();
        assert!(!token.is_cancelled());
        handle.cancel();
        assert!(handle.is_cancelled());
        assert!(token.is_cancelled());
        token.cancelled().await;
    }

    #[tokio::test]
    async fn test_dropped_handle_cancels() {
        let (handle, mut token) = cancel_pair();
        drop(handle);
        assert!(token.is_cancelled());
        token.cancelled().await;
    }
}
