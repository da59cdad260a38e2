use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use image::RgbImage;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

pub struct Camera {
    stream: Stream<'static>,
    width: u32,
    height: u32,
    fourcc: FourCC,
}

impl Camera {
    pub fn open(device: &str) -> Result<Self> {
        let dev = Device::with_path(device).context("open camera")?;
        let mut fmt = dev.format().context("get format")?;
        // Prefer RGB, fall back to YUYV, else keep whatever the driver offers
        for code in [b"RGB3", b"YUYV"] {
            if fmt.fourcc == FourCC::new(b"RGB3") {
                break;
            }
            let wanted = Format::new(fmt.width, fmt.height, FourCC::new(code));
            fmt = dev.set_format(&wanted).unwrap_or(fmt);
        }
        let stream = Stream::with_buffers(&dev, Type::VideoCapture, 4).context("stream")?;
        Ok(Self {
            stream,
            width: fmt.width,
            height: fmt.height,
            fourcc: fmt.fourcc,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn frame(&mut self) -> Result<RgbImage> {
        let (data, meta) = self.stream.next().context("capture frame")?;
        log::trace!(
            "captured frame seq={} len={} fourcc={:?}",
            meta.sequence,
            data.len(),
            self.fourcc
        );
        let rgb = match &self.fourcc.repr {
            b"RGB3" => data.to_vec(),
            b"YUYV" => yuyv_to_rgb(self.width, self.height, data)?,
            b"GREY" => data.iter().flat_map(|&y| [y, y, y]).collect(),
            other => anyhow::bail!("unsupported pixel format {:?}", FourCC::new(other)),
        };
        let expected = (self.width * self.height * 3) as usize;
        if rgb.len() < expected {
            anyhow::bail!("short frame: got {} bytes, expected {}", rgb.len(), expected);
        }
        RgbImage::from_raw(self.width, self.height, rgb[..expected].to_vec())
            .ok_or_else(|| anyhow::anyhow!("failed to build image buffer"))
    }
}

fn yuyv_to_rgb(width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    let expected = (width * height * 2) as usize;
    if data.len() < expected {
        anyhow::bail!("short YUYV buffer: {} < {}", data.len(), expected);
    }
    let to_u8 = |v: f32| v.clamp(0.0, 255.0) as u8;
    let mut out = Vec::with_capacity((width * height * 3) as usize);
    for chunk in data[..expected].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0] as f32, chunk[2] as f32] {
            out.push(to_u8(y + 1.402 * v));
            out.push(to_u8(y - 0.344136 * u - 0.714136 * v));
            out.push(to_u8(y + 1.772 * u));
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Streaming,
    Paused,
    Stopped,
}

struct Shared {
    latest: Option<RgbImage>,
    status: FeedStatus,
}

/// Camera captured on a background thread; readers see the latest frame.
pub struct CameraFeed {
    shared: Arc<Mutex<Shared>>,
    stop: Arc<AtomicBool>,
    dimensions: (u32, u32),
    worker: Option<JoinHandle<()>>,
}

impl CameraFeed {
    pub fn start(device: &str) -> Result<Self> {
        let shared = Arc::new(Mutex::new(Shared {
            latest: None,
            status: FeedStatus::Streaming,
        }));
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel();

        let device = device.to_string();
        let worker = {
            let shared = Arc::clone(&shared);
            let stop = Arc::clone(&stop);
            std::thread::Builder::new()
                .name("camera".into())
                .spawn(move || capture_loop(&device, shared, stop, ready_tx))
                .context("spawn camera thread")?
        };

        let dimensions = ready_rx
            .recv()
            .context("camera thread exited before opening the device")??;
        Ok(Self {
            shared,
            stop,
            dimensions,
            worker: Some(worker),
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    pub fn status(&self) -> FeedStatus {
        self.shared
            .lock()
            .map(|s| s.status)
            .unwrap_or(FeedStatus::Stopped)
    }

    pub fn latest_frame(&self) -> Option<RgbImage> {
        self.shared.lock().ok().and_then(|s| s.latest.clone())
    }

    pub fn set_paused(&self, paused: bool) {
        if let Ok(mut s) = self.shared.lock() {
            if s.status != FeedStatus::Stopped {
                s.status = if paused {
                    FeedStatus::Paused
                } else {
                    FeedStatus::Streaming
                };
            }
        }
    }

    /// Stop capturing and release the device.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("camera thread panicked");
            }
        }
    }
}

impl Drop for CameraFeed {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop(
    device: &str,
    shared: Arc<Mutex<Shared>>,
    stop: Arc<AtomicBool>,
    ready: mpsc::Sender<Result<(u32, u32)>>,
) {
    let mut camera = match Camera::open(device) {
        Ok(camera) => {
            let _ = ready.send(Ok(camera.dimensions()));
            camera
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    log::info!("camera {} streaming at {:?}", device, camera.dimensions());

    while !stop.load(Ordering::SeqCst) {
        match camera.frame() {
            Ok(frame) => {
                if let Ok(mut s) = shared.lock() {
                    if s.status == FeedStatus::Streaming {
                        s.latest = Some(frame);
                    }
                }
            }
            Err(e) => {
                log::error!("camera {} stopped: {:#}", device, e);
                break;
            }
        }
    }

    if let Ok(mut s) = shared.lock() {
        s.status = FeedStatus::Stopped;
        s.latest = None;
    }
}
