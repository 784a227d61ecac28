//! Imaging native implementation
//!
//! Factories return new [`Matrix`] instances directly. `resize` and `load`
//! run on the background task queue and return a [`Deferred`] that settles
//! with the resulting matrix, or is rejected with an error message.
//!
//! `load` reads binary netpbm files: `P5` (gray) and `P6` (RGB), 8-bit.

use std::fs;
use std::path::Path;

use ferry_sdk::{
    instance, task, AbiResult, Constant, Deferred, NativeError, NativeValue, Reflect,
    TypeDescriptor, TypeId,
};
use once_cell::sync::Lazy;
use thiserror::Error;

use crate::matrix::{sample_len, Matrix, FORMAT_GRAY, FORMAT_RGB};

/// Nearest-neighbour interpolation
pub const INTER_NEAREST: i32 = 0;
/// Bilinear interpolation
pub const INTER_LINEAR: i32 = 1;

static DESCRIPTOR: Lazy<TypeDescriptor> = Lazy::new(|| {
    let matrix = Matrix::type_tag();
    TypeDescriptor::builder("Imaging")
        .method("zeros", &[TypeId::INT, TypeId::INT, TypeId::INT], matrix)
        .method("ones", &[TypeId::INT, TypeId::INT, TypeId::INT], matrix)
        .method(
            "resize",
            &[matrix, TypeId::INT, TypeId::INT, TypeId::INT],
            TypeId::DEFERRED,
        )
        .method("load", &[TypeId::STRING], TypeId::DEFERRED)
        .constant("INTER_NEAREST", Constant::Int(INTER_NEAREST))
        .constant("INTER_LINEAR", Constant::Int(INTER_LINEAR))
        .build()
});

/// Image decoding errors
#[derive(Debug, Error)]
pub enum ImageError {
    /// Failed to read the file
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or unsupported file contents
    #[error("invalid image: {0}")]
    Format(String),
}

/// Stateless image toolkit
#[derive(Debug, Default)]
pub struct Imaging;

impl Reflect for Imaging {
    fn descriptor() -> &'static TypeDescriptor {
        &DESCRIPTOR
    }

    fn invoke(&mut self, index: usize, args: &[NativeValue]) -> AbiResult<NativeValue> {
        match index {
            0 | 1 => {
                let fill = if index == 0 { 0 } else { 1 };
                let matrix = Matrix::filled(
                    args[0].extract::<i32>()?,
                    args[1].extract::<i32>()?,
                    args[2].extract::<i32>()?,
                    fill,
                )?;
                Ok(NativeValue::object(instance(matrix)))
            }
            2 => {
                let source = args[0]
                    .instance::<Matrix>()
                    .ok_or_else(|| NativeError::ArgumentError("expected a Matrix".into()))?;
                let (width, height) = (args[1].extract::<i32>()?, args[2].extract::<i32>()?);
                let interpolation = args[3].extract::<i32>()?;
                if width <= 0 || height <= 0 {
                    return Err(NativeError::ArgumentError(format!(
                        "invalid target size {}x{}",
                        width, height
                    )));
                }
                if !matches!(interpolation, INTER_NEAREST | INTER_LINEAR) {
                    return Err(NativeError::ArgumentError(format!(
                        "unknown interpolation {}",
                        interpolation
                    )));
                }
                let source = source.lock().clone();
                sample_len(height as usize, width as usize, source.channels())?;
                Ok(background(move || {
                    resize(&source, width as usize, height as usize, interpolation)
                }))
            }
            3 => {
                let path = args[0].extract::<String>()?;
                Ok(background(move || load(&path).map_err(|e| e.to_string())))
            }
            _ => Err(NativeError::UnknownMember(index)),
        }
    }
}

/// Run `job` on the task queue; its outcome settles the returned deferred
fn background<F>(job: F) -> NativeValue
where
    F: FnOnce() -> Result<Matrix, String> + Send + 'static,
{
    let deferred = Deferred::new();
    let completer = deferred.clone();
    task::spawn(move || match job() {
        Ok(matrix) => {
            completer.resolve(NativeValue::object(instance(matrix)));
        }
        Err(message) => {
            log::debug!("imaging job failed: {}", message);
            completer.reject(NativeValue::string(message));
        }
    });
    NativeValue::deferred(deferred)
}

// ============================================================================
// Resize
// ============================================================================

/// Resample `source` to `width` columns by `height` rows
pub fn resize(
    source: &Matrix,
    width: usize,
    height: usize,
    interpolation: i32,
) -> Result<Matrix, String> {
    if source.rows() == 0 || source.cols() == 0 {
        return Err("cannot resize an empty matrix".to_string());
    }
    let channels = source.channels();
    let len = sample_len(height, width, channels).map_err(|e| e.to_string())?;
    let scale_x = source.cols() as f64 / width as f64;
    let scale_y = source.rows() as f64 / height as f64;
    let sample = |r: usize, c: usize, ch: usize| source.at(r, c, ch).unwrap_or(0) as f64;

    let mut out = Vec::with_capacity(len);
    for row in 0..height {
        for col in 0..width {
            for ch in 0..channels {
                let value = if interpolation == INTER_NEAREST {
                    let r = ((row as f64 * scale_y) as usize).min(source.rows() - 1);
                    let c = ((col as f64 * scale_x) as usize).min(source.cols() - 1);
                    sample(r, c, ch)
                } else {
                    let y = ((row as f64 + 0.5) * scale_y - 0.5).max(0.0);
                    let x = ((col as f64 + 0.5) * scale_x - 0.5).max(0.0);
                    let (r0, c0) = (
                        (y as usize).min(source.rows() - 1),
                        (x as usize).min(source.cols() - 1),
                    );
                    let (r1, c1) = ((r0 + 1).min(source.rows() - 1), (c0 + 1).min(source.cols() - 1));
                    let (fy, fx) = (y - r0 as f64, x - c0 as f64);
                    let top = sample(r0, c0, ch) * (1.0 - fx) + sample(r0, c1, ch) * fx;
                    let bottom = sample(r1, c0, ch) * (1.0 - fx) + sample(r1, c1, ch) * fx;
                    top * (1.0 - fy) + bottom * fy
                };
                out.push(value.round().clamp(0.0, 255.0) as u8);
            }
        }
    }
    Matrix::from_samples(height, width, channels, out).map_err(|e| e.to_string())
}

// ============================================================================
// Load
// ============================================================================

/// Read a binary netpbm image
pub fn load(path: impl AsRef<Path>) -> Result<Matrix, ImageError> {
    let bytes = fs::read(path)?;
    decode_netpbm(&bytes)
}

/// Decode binary netpbm (`P5` gray, `P6` RGB) bytes
pub fn decode_netpbm(bytes: &[u8]) -> Result<Matrix, ImageError> {
    let mut cursor = 0;
    let magic = next_token(bytes, &mut cursor)?;
    let channels = match magic.as_str() {
        "P5" => FORMAT_GRAY as usize,
        "P6" => FORMAT_RGB as usize,
        other => return Err(ImageError::Format(format!("unsupported magic {:?}", other))),
    };
    let width = parse_number(bytes, &mut cursor)?;
    let height = parse_number(bytes, &mut cursor)?;
    let max = parse_number(bytes, &mut cursor)?;
    if max == 0 || max > 255 {
        return Err(ImageError::Format(format!("unsupported maxval {}", max)));
    }
    // A single whitespace byte separates the header from the samples
    cursor += 1;

    let len = sample_len(height, width, channels).map_err(|e| ImageError::Format(e.to_string()))?;
    let samples = cursor
        .checked_add(len)
        .and_then(|end| bytes.get(cursor..end))
        .ok_or_else(|| ImageError::Format(format!("expected {} sample bytes", len)))?;
    Matrix::from_samples(height, width, channels, samples.to_vec())
        .map_err(|e| ImageError::Format(e.to_string()))
}

fn next_token(bytes: &[u8], cursor: &mut usize) -> Result<String, ImageError> {
    loop {
        match bytes.get(*cursor) {
            Some(b'#') => {
                while !matches!(bytes.get(*cursor), None | Some(b'\n')) {
                    *cursor += 1;
                }
            }
            Some(b) if b.is_ascii_whitespace() => *cursor += 1,
            Some(_) => break,
            None => return Err(ImageError::Format("truncated header".to_string())),
        }
    }
    let start = *cursor;
    while bytes.get(*cursor).map_or(false, |b| !b.is_ascii_whitespace()) {
        *cursor += 1;
    }
    Ok(String::from_utf8_lossy(&bytes[start..*cursor]).into_owned())
}

fn parse_number(bytes: &[u8], cursor: &mut usize) -> Result<usize, ImageError> {
    let token = next_token(bytes, cursor)?;
    token
        .parse()
        .map_err(|_| ImageError::Format(format!("bad header field {:?}", token)))
}
