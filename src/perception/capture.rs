//! Screen capture backend

use std::cell::RefCell;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use screenshots::Screen;

use super::base::{Frame, FrameSource};

const CAPTURE_RETRIES: u32 = 3;
const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Region for screenshot capture.
#[derive(Debug, Clone, Copy)]
pub struct Region {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

thread_local! {
    // Capture backends are not reliable across threads; each thread gets
    // its own lazily constructed handle.
    static SCREEN: RefCell<Option<Screen>> = const { RefCell::new(None) };
}

/// Grabs frames from the primary screen, optionally restricted to a region.
pub struct ScreenGrabber {
    region: Option<Region>,
}

impl ScreenGrabber {
    pub fn new() -> Self {
        Self { region: None }
    }

    pub fn with_region(region: Region) -> Self {
        Self {
            region: Some(region),
        }
    }

    fn capture_once(&self) -> Result<Frame> {
        SCREEN.with(|cell| {
            let mut slot = cell.borrow_mut();
            if slot.is_none() {
                let screens = Screen::all().context("Failed to enumerate screens")?;
                let screen = screens.into_iter().next().context("No screens found")?;
                *slot = Some(screen);
            }
            let screen = slot.as_ref().unwrap();

            let image = if let Some(r) = self.region {
                screen
                    .capture_area(r.left, r.top, r.width, r.height)
                    .context("Failed to capture area")?
            } else {
                screen.capture().context("Failed to capture screen")?
            };

            let rgba = image::RgbaImage::from_raw(image.width(), image.height(), image.to_vec())
                .context("Failed to create image from raw capture data")?;
            Ok(image::DynamicImage::ImageRgba8(rgba).to_luma8())
        })
    }
}

impl Default for ScreenGrabber {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for ScreenGrabber {
    fn grab(&self) -> Result<Frame> {
        let mut last_err = None;
        for attempt in 0..CAPTURE_RETRIES {
            match self.capture_once() {
                Ok(frame) => return Ok(frame),
                Err(e) => {
                    tracing::warn!(
                        "[CAPTURE] Screenshot failed: {}. Retrying ({}/{})",
                        e,
                        attempt + 1,
                        CAPTURE_RETRIES
                    );
                    last_err = Some(e);
                    thread::sleep(CAPTURE_RETRY_DELAY);
                }
            }
        }
        Err(last_err.unwrap())
    }
}
