//! Starts and stops sampling sessions as their inputs come and go.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::inference::{DetectOptions, FaceInference};
use crate::matcher::Matcher;
use crate::overlay::{BoxStyle, OverlayRenderer, Surface, SurfaceSlot};
use crate::runner::DetectionCycleRunner;
use crate::scheduler::{SamplingScheduler, ScheduleConfig};
use crate::session::{cancel_pair, CancelHandle, Session, SessionStats};
use crate::video::VideoSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub video: bool,
    pub model: bool,
    pub matcher: bool,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        self.video && self.model && self.matcher
    }

    /// Names of the inputs still missing, for status lines.
    pub fn missing(&self) -> Vec<&'static str> {
        [
            (self.video, "video"),
            (self.model, "model"),
            (self.matcher, "matcher"),
        ]
        .into_iter()
        .filter_map(|(ready, name)| (!ready).then_some(name))
        .collect()
    }
}

/// Everything a session needs from the outside. `None` means not ready yet.
#[derive(Clone, Default)]
pub struct SessionInputs {
    pub video: Option<Arc<dyn VideoSource>>,
    pub inference: Option<Arc<dyn FaceInference>>,
    pub matcher: Option<Arc<Matcher>>,
}

impl SessionInputs {
    pub fn readiness(&self) -> Readiness {
        Readiness {
            video: self.video.is_some(),
            model: self.inference.is_some(),
            matcher: self.matcher.is_some(),
        }
    }

    /// Same inputs by identity, not by value.
    fn same_as(&self, other: &Self) -> bool {
        same_arc(&self.video, &other.video)
            && same_arc(&self.inference, &other.inference)
            && same_arc(&self.matcher, &other.matcher)
    }
}

fn same_arc<T: ?Sized>(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => {
            std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
        }
        (None, None) => true,
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionSettings {
    pub schedule: ScheduleConfig,
    pub detect: DetectOptions,
    pub style: BoxStyle,
    /// Fixed seed for idle durations; entropy when unset.
    pub seed: Option<u64>,
}

struct Running {
    id: Uuid,
    cancel: CancelHandle,
    task: JoinHandle<SessionStats>,
}

pub struct LifecycleManager {
    settings: SessionSettings,
    /// Sessions draw through clones of this slot.
    surface: SurfaceSlot,
    inputs: SessionInputs,
    running: Option<Running>,
}

impl LifecycleManager {
    pub fn new(surface: Box<dyn Surface>, settings: SessionSettings) -> Self {
        Self {
            settings,
            surface: SurfaceSlot::new(surface),
            inputs: SessionInputs::default(),
            running: None,
        }
    }

    pub fn readiness(&self) -> Readiness {
        self.inputs.readiness()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.running.as_ref().map(|r| r.id)
    }

    pub fn surface(&self) -> &SurfaceSlot {
        &self.surface
    }

    /// Bring the session in line with `inputs`.
    ///
    /// Unchanged inputs are a no-op. Any change tears the current session
    /// down completely before a new one is considered. Returns whether a
    /// session is running afterwards.
    pub async fn reconcile(&mut self, inputs: SessionInputs) -> bool {
        if inputs.same_as(&self.inputs) && (self.running.is_some() || !inputs.readiness().is_ready())
        {
            return self.is_running();
        }

        self.teardown().await;
        self.inputs = inputs;

        let readiness = self.inputs.readiness();
        if readiness.is_ready() {
            self.start();
        } else {
            debug!("session not started, waiting for {:?}", readiness.missing());
        }
        self.is_running()
    }

    fn start(&mut self) {
        let (Some(video), Some(inference), Some(matcher)) = (
            self.inputs.video.clone(),
            self.inputs.inference.clone(),
            self.inputs.matcher.clone(),
        ) else {
            return;
        };

        if matcher.is_empty() {
            warn!("no known faces loaded; detections will be labeled with their score only");
        }

        let id = Uuid::new_v4();
        let scheduler = match self.settings.seed {
            Some(seed) => SamplingScheduler::with_seed(self.settings.schedule, seed),
            None => SamplingScheduler::new(self.settings.schedule),
        };
        let runner = DetectionCycleRunner::new(inference, video, matcher, self.settings.detect);
        let renderer =
            OverlayRenderer::with_style(Box::new(self.surface.clone()), self.settings.style);
        let session = Session::new(id, scheduler, runner, renderer);

        let (cancel, token) = cancel_pair();
        let task = tokio::spawn(session.run(token));
        info!("session {} started", id);
        self.running = Some(Running { id, cancel, task });
    }

    /// Stop the current session, forget its inputs and clear the surface.
    ///
    /// Safe to call any number of times; only the first call after a start
    /// returns the session's statistics. A session that panicked yields none.
    pub async fn teardown(&mut self) -> Option<SessionStats> {
        let stats = match self.running.take() {
            Some(running) => {
                running.cancel.cancel();
                match running.task.await {
                    Ok(stats) => Some(stats),
                    Err(e) => {
                        warn!("session {} ended abnormally: {}", running.id, e);
                        None
                    }
                }
            }
            None => None,
        };
        self.inputs = SessionInputs::default();
        self.surface.clear();
        stats
    }
}

impl Drop for LifecycleManager {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_inputs() {
        let readiness = SessionInputs::default().readiness();
        assert!(!readiness.is_ready());
        assert_eq!(readiness.missing(), vec!["video", "model", "matcher"]);

        let inputs = SessionInputs {
            matcher: Some(Arc::new(Matcher::empty())),
            ..SessionInputs::default()
        };
        assert_eq!(inputs.readiness().missing(), vec!["video", "model"]);
    }

    #[test]
    fn test_identity_comparison() {
        let matcher = Arc::new(Matcher::empty());
        let a = SessionInputs {
            matcher: Some(matcher.clone()),
            ..SessionInputs::default()
        };
        let b = SessionInputs {
            matcher: Some(matcher),
            ..SessionInputs::default()
        };
        let c = SessionInputs {
            matcher: Some(Arc::new(Matcher::empty())),
            ..SessionInputs::default()
        };
        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
        assert!(!a.same_as(&SessionInputs::default()));
    }
}
