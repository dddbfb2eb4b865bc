// src/stream.rs
//
// Network camera frame source. Opening fails fast; individual reads
// never kill the loop (the caller skips the iteration and retries).

use crate::types::Frame;
use anyhow::Result;
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTraitConst},
};
use tracing::info;

pub struct CameraStream {
    cap: VideoCapture,
    width: usize,
    height: usize,
}

impl CameraStream {
    pub fn open(url: &str) -> Result<Self> {
        info!("Opening camera stream: {}", url);

        let cap = VideoCapture::from_file(url, videoio::CAP_ANY)?;

        if !cap.is_opened()? {
            anyhow::bail!("Cannot open stream at {}", url);
        }

        let width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)? as usize;
        let height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)? as usize;
        let fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS)?;

        info!("Stream properties: {}x{} @ {:.1} FPS", width, height, fps);

        Ok(Self { cap, width, height })
    }

    /// Returns `Ok(None)` for a failed, empty, or all-black read. The
    /// caller treats that as a transient failure and polls again.
    pub fn read_frame(&mut self) -> Result<Option<Frame>> {
        use opencv::videoio::VideoCaptureTrait;

        let mut mat = Mat::default();

        if !VideoCaptureTrait::read(&mut self.cap, &mut mat)? || mat.empty() {
            return Ok(None);
        }

        let mut rgb_mat = Mat::default();
        imgproc::cvt_color(&mat, &mut rgb_mat, imgproc::COLOR_BGR2RGB, 0)?;

        let data = rgb_mat.data_bytes()?.to_vec();

        // Some IP webcams deliver fully black frames while reconnecting.
        if data.iter().all(|&b| b == 0) {
            return Ok(None);
        }

        Ok(Some(Frame {
            data,
            width: self.width,
            height: self.height,
        }))
    }
}
