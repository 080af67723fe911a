//! Synthetic camera.
//!
//! Each camera id gets its own hue and scroll speed so streams are easy to
//! tell apart on the viewer side.

use camcast_core::{CastError, DecodedFrame, FrameSource, PixelFormat};

/// Scrolling colour gradient with a moving bar.
#[derive(Debug)]
pub struct TestPattern {
    camera_id: u32,
    width: u32,
    height: u32,
    tick: u32,
    /// Every `n`th grab fails, to mimic a flaky capture device.
    fail_every: Option<u32>,
}

impl TestPattern {
    pub fn new(camera_id: u32, width: u32, height: u32) -> Self {
        Self {
            camera_id,
            width: width.max(1),
            height: height.max(1),
            tick: 0,
            fail_every: None,
        }
    }

    pub fn with_dropout(mut self, every: u32) -> Self {
        self.fail_every = (every > 0).then_some(every);
        self
    }

    pub fn camera_id(&self) -> u32 {
        self.camera_id
    }

    fn render(&self) -> Vec<u8> {
        let (w, h) = (self.width, self.height);
        let hue = self.camera_id.wrapping_mul(67) as u8;
        let speed = 1 + self.camera_id % 4;
        let offset = self.tick.wrapping_mul(speed);
        let bar = offset % w;

        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            for x in 0..w {
                if x.abs_diff(bar) < 4 {
                    data.extend_from_slice(&[255, 255, 255]);
                } else {
                    let r = (x.wrapping_add(offset) % w * 255 / w) as u8;
                    let g = (y * 255 / h) as u8;
                    data.extend_from_slice(&[r, g, hue]);
                }
            }
        }
        data
    }
}

impl FrameSource for TestPattern {
    fn grab(&mut self) -> Result<Option<DecodedFrame>, CastError> {
        self.tick = self.tick.wrapping_add(1);
        if self.fail_every.is_some_and(|n| self.tick % n == 0) {
            return Err(CastError::Other(format!(
                "camera {} read failed (frame {})",
                self.camera_id, self.tick
            )));
        }
        let frame = DecodedFrame::new(self.width, self.height, PixelFormat::Rgb8, self.render())?;
        Ok(Some(frame))
    }
}
