//! Renderer
//!
//! The seam between the protocol core and whatever draws the pictures. The
//! session calls scene-mutation methods from command handlers and asks for a
//! frame after every statement batch.
//!
//! `TestPatternRenderer` is a software implementation that turns uploaded
//! data sets into a deterministic image. It backs the server binary and the
//! tests.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::error::{Result, VizError};
use crate::protocol::{PixelBuffer, PixelOrder};

/// Largest window edge accepted by `set_window_size`
pub const MAX_WINDOW_SIZE: usize = 4096;

/// A rendered colour legend and the data range it covers
#[derive(Debug, Clone)]
pub struct Legend {
    pub image: PixelBuffer,
    pub min: f64,
    pub max: f64,
}

/// Scene owner and frame producer
pub trait Renderer: Send {
    /// Render a frame if the scene changed since the last one
    fn render(&mut self) -> Result<Option<PixelBuffer>>;

    /// Image-space camera region `[x, y, width, height]`, when the camera is
    /// in image mode
    fn zoom_region(&self) -> Option<[f64; 4]> {
        None
    }

    /// Force the next `render` to produce a frame
    fn invalidate(&mut self);

    fn set_window_size(&mut self, width: usize, height: usize) -> Result<()>;

    /// Background colour, channels in `0.0..=1.0`
    fn set_background(&mut self, rgb: [f32; 3]) -> Result<()>;

    fn add_dataset(&mut self, name: &str, data: Bytes) -> Result<()>;

    fn delete_dataset(&mut self, name: &str) -> Result<()>;

    /// Drop every data set
    fn clear_datasets(&mut self);

    fn dataset_names(&self) -> Vec<String>;

    /// Render the colour legend of a data set
    fn render_legend(&mut self, _name: &str, _width: usize, _height: usize) -> Result<Legend> {
        Err(VizError::Render("legends are not supported by this renderer".to_string()))
    }
}

// =============================================================================
// Test Pattern Renderer
// =============================================================================

/// Software renderer producing RGB test patterns
#[derive(Debug)]
pub struct TestPatternRenderer {
    width: usize,
    height: usize,
    background: [u8; 3],
    datasets: BTreeMap<String, Bytes>,
    /// Scene changed since the last frame
    dirty: bool,
}

impl TestPatternRenderer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width: width.clamp(1, MAX_WINDOW_SIZE),
            height: height.clamp(1, MAX_WINDOW_SIZE),
            background: [0, 0, 0],
            datasets: BTreeMap::new(),
            dirty: true,
        }
    }

    pub fn window_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn background(&self) -> [u8; 3] {
        self.background
    }

    /// Pixel colour at (x, y); data sets tint the red and green channels
    fn shade(&self, x: usize, y: usize) -> [u8; 3] {
        let [mut r, mut g, b] = self.background;
        for (i, data) in self.datasets.values().enumerate() {
            if data.is_empty() {
                continue;
            }
            let sample = data[(y * self.width + x) % data.len()];
            if i % 2 == 0 {
                r = r.wrapping_add(sample);
            } else {
                g = g.wrapping_add(sample);
            }
        }
        [r, g, b]
    }
}

impl Default for TestPatternRenderer {
    fn default() -> Self {
        Self::new(500, 500)
    }
}

impl Renderer for TestPatternRenderer {
    fn render(&mut self) -> Result<Option<PixelBuffer>> {
        if !self.dirty {
            return Ok(None);
        }

        let mut data = Vec::with_capacity(self.width * self.height * 3);
        for y in 0..self.height {
            for x in 0..self.width {
                data.extend_from_slice(&self.shade(x, y));
            }
        }
        self.dirty = false;

        tracing::trace!("Rendered {}x{} test pattern", self.width, self.height);
        PixelBuffer::new(self.width, self.height, 3, PixelOrder::Rgb, data).map(Some)
    }

    fn invalidate(&mut self) {
        self.dirty = true;
    }

    fn set_window_size(&mut self, width: usize, height: usize) -> Result<()> {
        if width == 0 || height == 0 || width > MAX_WINDOW_SIZE || height > MAX_WINDOW_SIZE {
            return Err(VizError::Command(format!(
                "bad window size {}x{}: must be between 1 and {}",
                width, height, MAX_WINDOW_SIZE
            )));
        }
        if (width, height) != (self.width, self.height) {
            self.width = width;
            self.height = height;
            self.dirty = true;
        }
        Ok(())
    }

    fn set_background(&mut self, rgb: [f32; 3]) -> Result<()> {
        if rgb.iter().any(|c| !(0.0..=1.0).contains(c)) {
            return Err(VizError::Command(format!(
                "bad color {:?}: channels must be between 0 and 1",
                rgb
            )));
        }
        let background = rgb.map(|c| (c * 255.0).round() as u8);
        if background != self.background {
            self.background = background;
            self.dirty = true;
        }
        Ok(())
    }

    fn add_dataset(&mut self, name: &str, data: Bytes) -> Result<()> {
        tracing::debug!("Loading data set \"{}\" ({} bytes)", name, data.len());
        self.datasets.insert(name.to_string(), data);
        self.dirty = true;
        Ok(())
    }

    fn delete_dataset(&mut self, name: &str) -> Result<()> {
        match self.datasets.remove(name) {
            Some(_) => {
                self.dirty = true;
                Ok(())
            }
            None => Err(VizError::Command(format!("unknown dataset \"{}\"", name))),
        }
    }

    fn clear_datasets(&mut self) {
        if !self.datasets.is_empty() {
            self.datasets.clear();
            self.dirty = true;
        }
    }

    fn dataset_names(&self) -> Vec<String> {
        self.datasets.keys().cloned().collect()
    }

    /// Blue-to-red ramp; the range is the smallest and largest byte value
    fn render_legend(&mut self, name: &str, width: usize, height: usize) -> Result<Legend> {
        let data = self
            .datasets
            .get(name)
            .ok_or_else(|| VizError::Command(format!("unknown dataset \"{}\"", name)))?;
        if width == 0 || height == 0 || width > MAX_WINDOW_SIZE || height > MAX_WINDOW_SIZE {
            return Err(VizError::Command(format!("bad legend size {}x{}", width, height)));
        }

        let min = data.iter().copied().min().unwrap_or(0) as f64;
        let max = data.iter().copied().max().unwrap_or(0) as f64;

        let mut pixels = Vec::with_capacity(width * height * 3);
        for _ in 0..height {
            for x in 0..width {
                let t = if width > 1 { (x * 255 / (width - 1)) as u8 } else { 0 };
                pixels.extend_from_slice(&[t, 0, 255 - t]);
            }
        }

        Ok(Legend {
            image: PixelBuffer::new(width, height, 3, PixelOrder::Rgb, pixels)?,
            min,
            max,
        })
    }
}
