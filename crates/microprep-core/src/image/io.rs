//! Frame decode and encode, dispatched on file extension.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use tiff::decoder::DecodingResult;

use super::Frame;
use crate::errors::PreprocessError;

/// Read a single-channel frame, keeping raw counts as f32.
pub fn read_frame<P: AsRef<Path>>(path: P) -> Result<Frame, PreprocessError> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .ok_or_else(|| PreprocessError::image(path, "no file extension"))?;

    match extension.as_str() {
        "tif" | "tiff" => read_tiff(path),
        "png" => read_png(path),
        other => Err(PreprocessError::image(
            path,
            format!("unsupported image format: {}", other),
        )),
    }
}

/// Write a frame. PNG output is 16-bit grayscale (values clamped to the u16
/// range); TIFF output is 32-bit float and lossless for working data.
pub fn write_frame<P: AsRef<Path>>(path: P, frame: &Frame) -> Result<(), PreprocessError> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .ok_or_else(|| PreprocessError::image(path, "no file extension"))?;

    match extension.as_str() {
        "tif" | "tiff" => write_tiff(path, std::slice::from_ref(frame)),
        "png" => write_png(path, frame),
        other => Err(PreprocessError::image(
            path,
            format!("unsupported image format: {}", other),
        )),
    }
}

/// Write a slice stack as a multi-page 32-bit float TIFF.
pub fn write_stack<P: AsRef<Path>>(path: P, frames: &[Frame]) -> Result<(), PreprocessError> {
    write_tiff(path.as_ref(), frames)
}

fn read_tiff(path: &Path) -> Result<Frame, PreprocessError> {
    let file = File::open(path)?;
    let mut decoder = tiff::decoder::Decoder::new(BufReader::new(file))
        .map_err(|e| PreprocessError::image(path, e))?;
    let (width, height) = decoder
        .dimensions()
        .map_err(|e| PreprocessError::image(path, e))?;
    let data = match decoder
        .read_image()
        .map_err(|e| PreprocessError::image(path, e))?
    {
        DecodingResult::U8(values) => values.iter().map(|&v| v as f32).collect(),
        DecodingResult::U16(values) => values.iter().map(|&v| v as f32).collect(),
        DecodingResult::F32(values) => values,
        _ => {
            return Err(PreprocessError::image(
                path,
                "unsupported TIFF sample format (expected u8, u16 or f32 grayscale)",
            ))
        }
    };
    Frame::new(width, height, data)
}

fn read_png(path: &Path) -> Result<Frame, PreprocessError> {
    let file = File::open(path)?;
    let decoder = png::Decoder::new(BufReader::new(file));
    let mut reader = decoder
        .read_info()
        .map_err(|e| PreprocessError::image(path, e))?;
    let mut buf = vec![0u8; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| PreprocessError::image(path, e))?;

    if info.color_type != png::ColorType::Grayscale {
        return Err(PreprocessError::image(
            path,
            format!("expected grayscale PNG, got {:?}", info.color_type),
        ));
    }
    let pixel_count = info.width as usize * info.height as usize;
    let data = match info.bit_depth {
        png::BitDepth::Eight => buf[..pixel_count].iter().map(|&v| v as f32).collect(),
        png::BitDepth::Sixteen => buf[..pixel_count * 2]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]) as f32)
            .collect(),
        other => {
            return Err(PreprocessError::image(
                path,
                format!("unsupported PNG bit depth {:?}", other),
            ))
        }
    };
    Frame::new(info.width, info.height, data)
}

fn write_tiff(path: &Path, frames: &[Frame]) -> Result<(), PreprocessError> {
    let file = File::create(path)?;
    let mut encoder = tiff::encoder::TiffEncoder::new(BufWriter::new(file))
        .map_err(|e| PreprocessError::image(path, e))?;
    for frame in frames {
        encoder
            .write_image::<tiff::encoder::colortype::Gray32Float>(
                frame.width(),
                frame.height(),
                frame.data(),
            )
            .map_err(|e| PreprocessError::image(path, e))?;
    }
    Ok(())
}

fn write_png(path: &Path, frame: &Frame) -> Result<(), PreprocessError> {
    let file = File::create(path)?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), frame.width(), frame.height());
    encoder.set_color(png::ColorType::Grayscale);
    encoder.set_depth(png::BitDepth::Sixteen);
    let mut writer = encoder
        .write_header()
        .map_err(|e| PreprocessError::image(path, e))?;

    let mut bytes = Vec::with_capacity(frame.data().len() * 2);
    for &value in frame.data() {
        let quantized = value.clamp(0.0, u16::MAX as f32).round() as u16;
        bytes.extend_from_slice(&quantized.to_be_bytes());
    }
    writer
        .write_image_data(&bytes)
        .map_err(|e| PreprocessError::image(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_round_trip_keeps_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("im_c000_z000_t000_p000.png");
        let frame = Frame::new(2, 2, vec![0.0, 100.0, 65535.0, 7.0]).unwrap();
        write_frame(&path, &frame).unwrap();
        let reloaded = read_frame(&path).unwrap();
        assert_eq!(reloaded, frame);
    }

    #[test]
    fn tiff_round_trip_is_lossless_for_float_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.tif");
        let frame = Frame::new(2, 1, vec![0.125, 9.75]).unwrap();
        write_frame(&path, &frame).unwrap();
        let reloaded = read_frame(&path).unwrap();
        assert_eq!(reloaded, frame);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let frame = Frame::filled(1, 1, 0.0);
        assert!(write_frame("frame.bmp", &frame).is_err());
    }
}
