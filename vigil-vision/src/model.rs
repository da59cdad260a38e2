use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ort::{
    ep::{self, ExecutionProvider},
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session,
    },
};

pub const DETECTOR_MODEL_FILE: &str = "face_detection_yunet_2023mar.onnx";
pub const RECOGNITION_MODEL_FILE: &str = "face_recognition_sface_2021dec.onnx";

/// Location of the model weights on disk.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub detector: PathBuf,
    pub recognizer: PathBuf,
}

impl ModelPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            detector: dir.join(DETECTOR_MODEL_FILE),
            recognizer: dir.join(RECOGNITION_MODEL_FILE),
        }
    }

    /// Paths that do not exist on disk.
    pub fn missing(&self) -> Vec<&Path> {
        [self.detector.as_path(), self.recognizer.as_path()]
            .into_iter()
            .filter(|p| !p.exists())
            .collect()
    }
}

pub fn session_builder() -> Result<SessionBuilder> {
    let mut builder =
        Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;

    #[cfg(feature = "openvino")]
    {
        let ep = ep::OpenVINO::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("openvino feature is enabled, onnx runtime not compiled with openvino")
        }
    }

    #[cfg(feature = "cuda")]
    {
        let ep = ep::CUDA::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("cuda feature is enabled, onnx runtime not compiled with cuda")
        }
    }

    Ok(builder)
}

pub fn detector_session(paths: &ModelPaths) -> Result<Session> {
    session_builder()?
        .commit_from_file(&paths.detector)
        .with_context(|| format!("load detector model {}", paths.detector.display()))
}

pub fn recog_session(paths: &ModelPaths) -> Result<Session> {
    session_builder()?
        .commit_from_file(&paths.recognizer)
        .with_context(|| format!("load recognition model {}", paths.recognizer.display()))
}
