use anyhow::{Context, Result};
use async_trait::async_trait;
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs, VideoCaptureTrait},
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use crate::pose::RasterImage;
use crate::preview::FrameGrabber;
use crate::sampler::VideoSource;

/// BGR の Mat を RGB ラスタへ書き込む。`out` のバッファは再利用される
pub fn mat_to_raster(bgr: &Mat, out: &mut RasterImage) -> Result<()> {
    let mut rgb = Mat::default();
    imgproc::cvt_color_def(bgr, &mut rgb, imgproc::COLOR_BGR2RGB)?;
    out.reshape(rgb.cols() as u32, rgb.rows() as u32);
    let bytes = rgb.data_bytes()?;
    if bytes.len() != out.data.len() {
        anyhow::bail!(
            "unexpected frame layout: {} bytes for {}x{}",
            bytes.len(),
            out.width,
            out.height
        );
    }
    out.data.copy_from_slice(bytes);
    Ok(())
}

/// OpenCV で開いた動画ファイル
pub struct OpenCvVideo {
    capture: VideoCapture,
    duration_secs: f64,
    frame: Mat,
}

impl OpenCvVideo {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let name = path.to_str().context("video path is not valid UTF-8")?;
        let capture = VideoCapture::from_file(name, VideoCaptureAPIs::CAP_ANY as i32)
            .with_context(|| format!("Failed to open video: {}", path.display()))?;
        if !capture.is_opened()? {
            anyhow::bail!("Video {} is not readable", path.display());
        }

        let frames = capture.get(videoio::CAP_PROP_FRAME_COUNT)?;
        let fps = capture.get(videoio::CAP_PROP_FPS)?;
        let duration_secs = if fps > 0.0 { frames / fps } else { 0.0 };
        tracing::info!(frames, fps, duration_secs, "video opened");

        Ok(Self {
            capture,
            duration_secs,
            frame: Mat::default(),
        })
    }
}

#[async_trait]
impl VideoSource for OpenCvVideo {
    fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    async fn seek(&mut self, time_secs: f64) -> Result<()> {
        self.capture
            .set(videoio::CAP_PROP_POS_MSEC, time_secs * 1000.0)
            .context("Failed to seek")?;
        // set() は位置を変えるだけなので、ここで1フレーム読んで到着を確定させる
        self.capture.read(&mut self.frame).context("Failed to read frame")?;
        if self.frame.empty() {
            anyhow::bail!("Empty frame at {:.2}s", time_secs);
        }
        Ok(())
    }

    async fn rasterize(&mut self, frame: &mut RasterImage) -> Result<()> {
        if self.frame.empty() {
            anyhow::bail!("No frame decoded yet");
        }
        mat_to_raster(&self.frame, frame)
    }
}

/// 別スレッドでカメラキャプチャを行い、最新フレームを提供する
pub struct ThreadedCamera {
    latest: Arc<Mutex<Option<RasterImage>>>,
    running: Arc<AtomicBool>,
    width: u32,
    height: u32,
    handle: Option<thread::JoinHandle<()>>,
}

impl ThreadedCamera {
    pub fn start(index: i32, width: Option<u32>, height: Option<u32>) -> Result<Self> {
        let mut capture =
            VideoCapture::new(index, VideoCaptureAPIs::CAP_ANY as i32).context("Failed to open camera")?;
        if !capture.is_opened()? {
            anyhow::bail!("Camera {} is not available", index);
        }
        if let Some(w) = width {
            capture.set(videoio::CAP_PROP_FRAME_WIDTH, w as f64)?;
        }
        if let Some(h) = height {
            capture.set(videoio::CAP_PROP_FRAME_HEIGHT, h as f64)?;
        }
        capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0)?;

        let w = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
        let h = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;
        tracing::info!(index, width = w, height = h, "camera opened");

        let latest = Arc::new(Mutex::new(None::<RasterImage>));
        let latest_ref = latest.clone();
        let running = Arc::new(AtomicBool::new(true));
        let running_ref = running.clone();

        let handle = thread::spawn(move || {
            let mut mat = Mat::default();
            let mut raster = RasterImage::default();
            while running_ref.load(Ordering::Acquire) {
                let read = capture.read(&mut mat).map_err(anyhow::Error::from);
                let converted = read.and_then(|_| {
                    if mat.empty() {
                        anyhow::bail!("Empty frame received");
                    }
                    mat_to_raster(&mat, &mut raster)
                });
                match converted {
                    Ok(()) => {
                        *latest_ref.lock().unwrap_or_else(PoisonError::into_inner) = Some(raster.clone());
                    }
                    Err(e) => tracing::trace!("camera read failed: {e:#}"),
                }
            }
        });

        Ok(Self {
            latest,
            running,
            width: w,
            height: h,
            handle: Some(handle),
        })
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl FrameGrabber for ThreadedCamera {
    /// カメラスレッドが新フレームを書き込むまで同じフレームが返る
    fn latest_frame(&self) -> Option<RasterImage> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for ThreadedCamera {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
