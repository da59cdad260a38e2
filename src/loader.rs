//! Builds labeled descriptor sets from the known-faces roster.

use log::{debug, info, warn};
use url::Url;

use crate::error::{FailureClass, FetchError};
use crate::inference::{Descriptor, FaceInference};
use crate::matcher::LabeledDescriptorSet;
use crate::roster::{accepted_image_url, RosterClient, RosterEntry};

/// Tally of what happened to each roster image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub identities: usize,
    pub identities_loaded: usize,
    pub images_rejected: usize,
    pub images_described: usize,
    pub no_face: usize,
    pub multiple_faces: usize,
    pub connectivity_failures: usize,
    pub cross_origin_failures: usize,
    pub status_failures: usize,
    pub decode_failures: usize,
}

impl LoadSummary {
    fn record_failure(&mut self, class: FailureClass) {
        match class {
            FailureClass::Connectivity => self.connectivity_failures += 1,
            FailureClass::CrossOrigin => self.cross_origin_failures += 1,
            FailureClass::Status => self.status_failures += 1,
            FailureClass::Decode => self.decode_failures += 1,
        }
    }
}

enum ImageOutcome {
    Described(Descriptor),
    NoFace,
    Failed(FailureClass),
}

pub struct DescriptorLoader<'a> {
    client: &'a RosterClient,
    inference: &'a dyn FaceInference,
}

impl<'a> DescriptorLoader<'a> {
    pub fn new(client: &'a RosterClient, inference: &'a dyn FaceInference) -> Self {
        Self { client, inference }
    }

    /// Fetch the roster and describe every usable reference image.
    ///
    /// Never fails: anything that goes wrong shrinks the result, possibly to
    /// nothing.
    pub async fn load(&self) -> Vec<LabeledDescriptorSet> {
        self.load_with_summary().await.0
    }

    pub async fn load_with_summary(&self) -> (Vec<LabeledDescriptorSet>, LoadSummary) {
        match self.client.fetch_roster().await {
            Ok(roster) => self.load_entries(&roster).await,
            Err(e) => {
                log_roster_failure(&e);
                (Vec::new(), LoadSummary::default())
            }
        }
    }

    pub async fn load_entries(
        &self,
        roster: &[RosterEntry],
    ) -> (Vec<LabeledDescriptorSet>, LoadSummary) {
        let mut summary = LoadSummary {
            identities: roster.len(),
            ..LoadSummary::default()
        };
        let mut sets = Vec::new();

        for entry in roster {
            let urls: Vec<Url> = entry
                .image_paths
                .iter()
                .filter_map(|raw| {
                    let accepted = accepted_image_url(raw);
                    if accepted.is_none() {
                        debug!("skipping {} for {}: not a reference image", raw, entry.label);
                        summary.images_rejected += 1;
                    }
                    accepted
                })
                .collect();

            if urls.is_empty() {
                warn!("no usable image urls for {}", entry.label);
                continue;
            }

            let mut descriptors = Vec::with_capacity(urls.len());
            for url in &urls {
                match self.describe(url, &mut summary).await {
                    ImageOutcome::Described(d) => {
                        summary.images_described += 1;
                        descriptors.push(d);
                    }
                    ImageOutcome::NoFace => summary.no_face += 1,
                    ImageOutcome::Failed(class) => summary.record_failure(class),
                }
            }

            match LabeledDescriptorSet::new(entry.label.clone(), descriptors) {
                Some(set) => {
                    debug!("{}: {} descriptor(s)", set.label(), set.descriptors().len());
                    sets.push(set);
                }
                None => warn!("no face found in any image for {}", entry.label),
            }
        }

        summary.identities_loaded = sets.len();
        info!(
            "loaded {} of {} identities ({} images described)",
            summary.identities_loaded, summary.identities, summary.images_described
        );
        if sets.is_empty() {
            warn!("no labeled descriptors loaded; faces will not be identified");
        }
        (sets, summary)
    }

    async fn describe(&self, url: &Url, summary: &mut LoadSummary) -> ImageOutcome {
        let bytes = match self.client.fetch_image(url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                log_image_failure(&e);
                return ImageOutcome::Failed(e.class());
            }
        };

        // the decoded image is moved into the backend and dropped with the call
        let image = match image::load_from_memory(&bytes) {
            Ok(image) => image,
            Err(e) => {
                warn!("[decode] {} is not a decodable image: {}", url, e);
                return ImageOutcome::Failed(FailureClass::Decode);
            }
        };
        drop(bytes);

        match self.inference.detect_single(image).await {
            Ok(Some(face)) => {
                if face.faces_found > 1 {
                    summary.multiple_faces += 1;
                    warn!(
                        "{} shows {} faces; using the most confident one ({:.2})",
                        url, face.faces_found, face.score
                    );
                }
                ImageOutcome::Described(face.descriptor)
            }
            Ok(None) => {
                warn!("no face detected in {}", url);
                ImageOutcome::NoFace
            }
            Err(e) => {
                warn!("[decode] face extraction failed for {}: {:#}", url, e);
                ImageOutcome::Failed(FailureClass::Decode)
            }
        }
    }
}

fn log_roster_failure(err: &FetchError) {
    match err.class() {
        FailureClass::Connectivity => {
            warn!("[connectivity] loading known faces: {err}; is the backend running?")
        }
        FailureClass::CrossOrigin => {
            warn!("[cross-origin] loading known faces: {err}; check the server's access policy")
        }
        class => warn!("[{class}] loading known faces: {err}"),
    }
}

fn log_image_failure(err: &FetchError) {
    warn!("[{}] skipping reference image: {}", err.class(), err);
}
