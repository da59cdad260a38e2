//! One detection attempt per tick, at most one in flight.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use log::{debug, trace};
use tokio::task::JoinHandle;

use crate::geometry::{Scale, Size};
use crate::inference::{DetectOptions, DetectionResult, FaceInference};
use crate::matcher::{MatchOutcome, Matcher};
use crate::overlay::{OverlayFrame, OverlayItem};
use crate::video::{PlaybackState, VideoSource};

/// Why a tick did not issue a detection call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    InFlight,
    Inactive,
    NotPlaying,
    NoDimensions,
    NoFrame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Issued,
    Dropped(DropReason),
}

struct InFlight {
    handle: JoinHandle<Result<Vec<DetectionResult>>>,
    native: Size,
}

pub struct DetectionCycleRunner {
    inference: Arc<dyn FaceInference>,
    video: Arc<dyn VideoSource>,
    matcher: Arc<Matcher>,
    options: DetectOptions,
    in_flight: Option<InFlight>,
}

impl DetectionCycleRunner {
    pub fn new(
        inference: Arc<dyn FaceInference>,
        video: Arc<dyn VideoSource>,
        matcher: Arc<Matcher>,
        options: DetectOptions,
    ) -> Self {
        Self {
            inference,
            video,
            matcher,
            options,
            in_flight: None,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn video(&self) -> &Arc<dyn VideoSource> {
        &self.video
    }

    /// Issue a detection call on the current frame unless something rules it
    /// out. A tick that arrives while a call is pending is dropped, never
    /// queued.
    pub fn tick(&mut self, active: bool) -> TickOutcome {
        if self.in_flight.is_some() {
            return TickOutcome::Dropped(DropReason::InFlight);
        }
        if !active {
            return TickOutcome::Dropped(DropReason::Inactive);
        }
        if self.video.playback_state() != PlaybackState::Playing {
            return TickOutcome::Dropped(DropReason::NotPlaying);
        }
        let native = self.video.native_size();
        if native.is_empty() {
            return TickOutcome::Dropped(DropReason::NoDimensions);
        }
        let Some(frame) = self.video.current_frame() else {
            return TickOutcome::Dropped(DropReason::NoFrame);
        };

        let inference = Arc::clone(&self.inference);
        let options = self.options;
        trace!("detection issued on {} frame", native);
        let handle = tokio::spawn(async move { inference.detect_all(frame, options).await });
        self.in_flight = Some(InFlight { handle, native });
        TickOutcome::Issued
    }

    /// Wait for the pending call. Pending forever when nothing is in flight.
    ///
    /// Cancel safe: the call stays tracked if this future is dropped.
    pub async fn resolved(&mut self) -> (Size, Result<Vec<DetectionResult>>) {
        let Some(in_flight) = self.in_flight.as_mut() else {
            return std::future::pending().await;
        };
        let joined = (&mut in_flight.handle).await;
        let native = in_flight.native;
        self.in_flight = None;

        let result = match joined {
            Ok(result) => result,
            Err(e) => Err(anyhow!("detection task failed: {e}")),
        };
        (native, result)
    }

    /// Forget the pending call. Its result, if it ever arrives, goes nowhere.
    pub fn detach(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            debug!("detaching in-flight detection call");
            in_flight.handle.abort();
        }
    }

    /// Scale native-frame results into display space and label them.
    pub fn compose(
        &self,
        results: &[DetectionResult],
        native: Size,
        display: Size,
    ) -> Option<OverlayFrame> {
        let scale = Scale::between(native, display)?;
        let items = results
            .iter()
            .map(|r| {
                let scaled = r.scaled(&scale);
                OverlayItem {
                    label: self.label_for(&scaled),
                    bbox: scaled.bbox,
                }
            })
            .collect();
        Some(OverlayFrame { display, items })
    }

    /// Identity and distance when the descriptor matches, the confidence
    /// score otherwise.
    pub fn label_for(&self, result: &DetectionResult) -> String {
        let outcome = result
            .descriptor
            .as_deref()
            .map(|d| self.matcher.query(d));
        match outcome {
            Some(known @ MatchOutcome::Known { .. }) => known.to_string(),
            _ => format!("{:.2}", result.score),
        }
    }
}

impl Drop for DetectionCycleRunner {
    fn drop(&mut self) {
        self.detach();
    }
}
