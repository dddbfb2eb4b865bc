// src/overlay.rs
//
// Display compositing. Each detector annotates its own copy of the
// frame; the two are alpha-blended for the live window. Cosmetic only:
// nothing here feeds back into the alert decision.

use crate::detector::Detection;
use crate::types::{DisplayConfig, Frame};
use anyhow::Result;
use opencv::{
    core::{self, Mat},
    highgui, imgproc,
    prelude::*,
};

const FIRE_COLOR: core::Scalar = core::Scalar::new(0.0, 0.0, 255.0, 0.0); // Red (BGR)
const CONTEXT_COLOR: core::Scalar = core::Scalar::new(0.0, 255.0, 0.0, 0.0); // Green

const QUIT_KEY: i32 = 'q' as i32;

/// Blend the two annotated views 50/50, matching the hybrid display of
/// both models at once.
pub fn compose(frame: &Frame, fire_dets: &[Detection], context_dets: &[Detection]) -> Result<Mat> {
    let fire_view = annotate(frame, fire_dets, FIRE_COLOR)?;
    let context_view = annotate(frame, context_dets, CONTEXT_COLOR)?;

    let mut combined = Mat::default();
    core::add_weighted(&context_view, 0.5, &fire_view, 0.5, 0.0, &mut combined, -1)?;
    Ok(combined)
}

/// Show the composited frame and poll the keyboard. Returns `true` when
/// the user pressed the quit key.
pub fn show_and_poll(config: &DisplayConfig, composite: &Mat) -> Result<bool> {
    highgui::imshow(&config.window_title, composite)?;
    let key = highgui::wait_key(config.wait_key_ms)?;
    Ok(key == QUIT_KEY)
}

pub fn close_windows() -> Result<()> {
    highgui::destroy_all_windows()?;
    Ok(())
}

fn annotate(frame: &Frame, detections: &[Detection], color: core::Scalar) -> Result<Mat> {
    let mat = Mat::from_slice(&frame.data)?;
    let mat = mat.reshape(3, frame.height as i32)?;

    let mut bgr_mat = Mat::default();
    imgproc::cvt_color(&mat, &mut bgr_mat, imgproc::COLOR_RGB2BGR, 0)?;
    let mut output = bgr_mat.try_clone()?;

    for det in detections {
        let [x1, y1, x2, y2] = det.bbox;
        let rect = core::Rect::new(
            x1 as i32,
            y1 as i32,
            (x2 - x1).max(1.0) as i32,
            (y2 - y1).max(1.0) as i32,
        );
        imgproc::rectangle(&mut output, rect, color, 2, imgproc::LINE_8, 0)?;

        let label = format!("{} {:.2}", det.class_name, det.confidence);
        let origin = core::Point::new(x1 as i32, (y1 as i32 - 6).max(12));
        imgproc::put_text(
            &mut output,
            &label,
            origin,
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.5,
            color,
            1,
            imgproc::LINE_AA,
            false,
        )?;
    }

    Ok(output)
}
