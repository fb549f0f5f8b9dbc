//! Frame decode/encode and pixel-level helpers
//!
//! Microscopy frames are single-channel images read into f32 working data
//! holding the raw counts. PNG (8/16-bit grayscale) and TIFF (8/16-bit
//! integer or 32-bit float grayscale) are supported; generated weight maps
//! are written as 32-bit float TIFF to keep their values exact.

mod frame;
mod io;

pub use frame::{correct_flat_field, Frame};
pub use io::{read_frame, write_frame, write_stack};
