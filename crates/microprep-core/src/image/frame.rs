//! In-memory frame representation and pixel arithmetic.

use crate::errors::PreprocessError;

/// One single-channel 2-D image with f32 working data in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Result<Self, PreprocessError> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(PreprocessError::ShapeOrDtypeMismatch(format!(
                "frame data has {} values, expected {}x{} = {}",
                data.len(),
                height,
                width,
                expected
            )));
        }
        Ok(Frame {
            width,
            height,
            data,
        })
    }

    /// Frame filled with a constant value.
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Frame {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn get(&self, row: u32, col: u32) -> f32 {
        self.data[row as usize * self.width as usize + col as usize]
    }

    #[inline]
    pub fn set(&mut self, row: u32, col: u32, value: f32) {
        self.data[row as usize * self.width as usize + col as usize] = value;
    }

    /// Crop a tile at the given origin. The tile must fit fully within the
    /// frame; tiling never produces partial edge tiles.
    pub fn crop(
        &self,
        row_start: u32,
        col_start: u32,
        tile_height: u32,
        tile_width: u32,
    ) -> Result<Frame, PreprocessError> {
        if row_start + tile_height > self.height || col_start + tile_width > self.width {
            return Err(PreprocessError::ShapeOrDtypeMismatch(format!(
                "tile {}x{} at ({}, {}) exceeds frame {}x{}",
                tile_height, tile_width, row_start, col_start, self.height, self.width
            )));
        }
        let mut data = Vec::with_capacity(tile_height as usize * tile_width as usize);
        for row in row_start..row_start + tile_height {
            let offset = row as usize * self.width as usize + col_start as usize;
            data.extend_from_slice(&self.data[offset..offset + tile_width as usize]);
        }
        Ok(Frame {
            width: tile_width,
            height: tile_height,
            data,
        })
    }

    /// Elementwise sum with another frame of identical shape.
    pub fn add(&mut self, other: &Frame) -> Result<(), PreprocessError> {
        if self.width != other.width || self.height != other.height {
            return Err(PreprocessError::ShapeOrDtypeMismatch(format!(
                "cannot sum frames {}x{} and {}x{}",
                self.height, self.width, other.height, other.width
            )));
        }
        for (dst, src) in self.data.iter_mut().zip(&other.data) {
            *dst += src;
        }
        Ok(())
    }

    /// Mean foreground indicator (fraction of strictly positive pixels).
    pub fn foreground_fraction(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        let fg = self.data.iter().filter(|&&v| v > 0.0).count();
        fg as f64 / self.data.len() as f64
    }
}

/// Flat-field correction: divide by the flat-field frame, leaving pixels
/// untouched where the flat field is zero.
pub fn correct_flat_field(frame: &Frame, flat: &Frame) -> Result<Frame, PreprocessError> {
    if frame.width != flat.width || frame.height != flat.height {
        return Err(PreprocessError::ShapeOrDtypeMismatch(format!(
            "flat field {}x{} does not match frame {}x{}",
            flat.height, flat.width, frame.height, frame.width
        )));
    }
    let data = frame
        .data
        .iter()
        .zip(&flat.data)
        .map(|(&v, &f)| if f != 0.0 { v / f } else { v })
        .collect();
    Ok(Frame {
        width: frame.width,
        height: frame.height,
        data,
    })
}
