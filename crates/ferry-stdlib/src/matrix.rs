//! Pixel matrix
//!
//! Row-major `u8` samples, `channels` per pixel. The sample bytes live in a
//! [`SharedBuffer`], so handing them to foreign code as a buffer never
//! copies and the bytes stay valid for as long as either side holds them.

use ferry_sdk::{
    AbiResult, Constant, NativeError, NativeValue, Reflect, SharedBuffer, TypeDescriptor, TypeId,
};
use once_cell::sync::Lazy;

/// Single channel
pub const FORMAT_GRAY: i32 = 1;
/// Three channels, red first
pub const FORMAT_RGB: i32 = 3;
/// Four channels, red first, alpha last
pub const FORMAT_RGBA: i32 = 4;

/// Largest sample count a matrix may hold (256 MiB)
pub const MAX_SAMPLES: usize = 1 << 28;

static DESCRIPTOR: Lazy<TypeDescriptor> = Lazy::new(|| {
    TypeDescriptor::builder("Matrix")
        .method("rows", &[], TypeId::INT)
        .method("cols", &[], TypeId::INT)
        .method("type", &[], TypeId::INT)
        .method("at", &[TypeId::INT, TypeId::INT, TypeId::INT], TypeId::INT)
        .readonly_property("data", TypeId::BUFFER)
        .constant("FORMAT_GRAY", Constant::Int(FORMAT_GRAY))
        .constant("FORMAT_RGB", Constant::Int(FORMAT_RGB))
        .constant("FORMAT_RGBA", Constant::Int(FORMAT_RGBA))
        .build()
});

/// Immutable pixel matrix
#[derive(Debug, Clone)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    channels: usize,
    data: SharedBuffer,
}

impl Default for Matrix {
    fn default() -> Self {
        Matrix {
            rows: 0,
            cols: 0,
            channels: FORMAT_GRAY as usize,
            data: SharedBuffer::empty(),
        }
    }
}

impl Matrix {
    /// Matrix with every sample set to `fill`
    pub fn filled(rows: i32, cols: i32, format: i32, fill: u8) -> AbiResult<Self> {
        let (rows, cols, channels) = check_shape(rows, cols, format)?;
        let len = sample_len(rows, cols, channels)?;
        Ok(Matrix {
            rows,
            cols,
            channels,
            data: SharedBuffer::from_vec(vec![fill; len]),
        })
    }

    /// Matrix over existing samples; `data` must hold exactly `rows * cols * channels` bytes
    pub fn from_samples(rows: usize, cols: usize, channels: usize, data: Vec<u8>) -> AbiResult<Self> {
        let len = sample_len(rows, cols, channels)?;
        if data.len() != len {
            return Err(NativeError::ArgumentError(format!(
                "{}x{}x{} matrix needs {} bytes, got {}",
                rows,
                cols,
                channels,
                len,
                data.len()
            )));
        }
        Ok(Matrix {
            rows,
            cols,
            channels,
            data: SharedBuffer::from_vec(data),
        })
    }

    /// Row count
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Column count
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Samples per pixel
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Sample bytes
    pub fn samples(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// Shared handle to the sample bytes
    pub fn buffer(&self) -> SharedBuffer {
        self.data.clone()
    }

    /// Sample at `(row, col, channel)`
    pub fn at(&self, row: usize, col: usize, channel: usize) -> Option<u8> {
        if row >= self.rows || col >= self.cols || channel >= self.channels {
            return None;
        }
        self.samples()
            .get((row * self.cols + col) * self.channels + channel)
            .copied()
    }
}

/// Sample count of a `rows` x `cols` x `channels` matrix, bounded by [`MAX_SAMPLES`]
pub fn sample_len(rows: usize, cols: usize, channels: usize) -> AbiResult<usize> {
    rows.checked_mul(cols)
        .and_then(|n| n.checked_mul(channels))
        .filter(|len| *len <= MAX_SAMPLES)
        .ok_or_else(|| {
            NativeError::ArgumentError(format!(
                "{}x{}x{} matrix exceeds {} samples",
                rows, cols, channels, MAX_SAMPLES
            ))
        })
}

fn check_shape(rows: i32, cols: i32, format: i32) -> AbiResult<(usize, usize, usize)> {
    if rows < 0 || cols < 0 {
        return Err(NativeError::ArgumentError(format!(
            "negative matrix size {}x{}",
            rows, cols
        )));
    }
    if !matches!(format, FORMAT_GRAY | FORMAT_RGB | FORMAT_RGBA) {
        return Err(NativeError::ArgumentError(format!("unknown format {}", format)));
    }
    Ok((rows as usize, cols as usize, format as usize))
}

impl Reflect for Matrix {
    fn descriptor() -> &'static TypeDescriptor {
        &DESCRIPTOR
    }

    fn invoke(&mut self, index: usize, args: &[NativeValue]) -> AbiResult<NativeValue> {
        match index {
            0 => Ok(NativeValue::int(self.rows as i32)),
            1 => Ok(NativeValue::int(self.cols as i32)),
            2 => Ok(NativeValue::int(self.channels as i32)),
            3 => {
                let position = (
                    args[0].extract::<i32>()?,
                    args[1].extract::<i32>()?,
                    args[2].extract::<i32>()?,
                );
                let sample = match position {
                    (r, c, ch) if r >= 0 && c >= 0 && ch >= 0 => {
                        self.at(r as usize, c as usize, ch as usize)
                    }
                    _ => None,
                };
                sample
                    .map(|s| NativeValue::int(s as i32))
                    .ok_or_else(|| NativeError::ArgumentError(format!("{:?} out of bounds", position)))
            }
            _ => Err(NativeError::UnknownMember(index)),
        }
    }

    fn read_property(&self, index: usize) -> Option<NativeValue> {
        match index {
            0 => Some(NativeValue::buffer(self.buffer())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filled_shape() {
        let m = Matrix::filled(2, 3, FORMAT_RGB, 1).unwrap();
        assert_eq!((m.rows(), m.cols(), m.channels()), (2, 3, 3));
        assert_eq!(m.samples().len(), 18);
        assert!(m.samples().iter().all(|s| *s == 1));
    }

    #[test]
    fn test_invalid_shape() {
        assert!(Matrix::filled(-1, 3, FORMAT_GRAY, 0).is_err());
        assert!(Matrix::filled(1, 1, 2, 0).is_err());
        assert!(Matrix::from_samples(2, 2, 1, vec![0; 3]).is_err());
    }

    #[test]
    fn test_oversized_shape_is_argument_error() {
        let huge = Matrix::filled(i32::MAX, i32::MAX, FORMAT_RGBA, 0);
        assert!(matches!(huge, Err(NativeError::ArgumentError(_))));
        assert!(matches!(
            sample_len(usize::MAX, 2, 1),
            Err(NativeError::ArgumentError(_))
        ));
        assert_eq!(sample_len(4, 4, 4).unwrap(), 64);
        assert!(sample_len(MAX_SAMPLES, 1, 1).is_ok());
        assert!(sample_len(MAX_SAMPLES, 1, 2).is_err());
    }

    #[test]
    fn test_data_property_shares_bytes() {
        let m = Matrix::from_samples(1, 2, 1, vec![5, 6]).unwrap();
        let data = m.read_property(0).unwrap();
        assert!(data.as_buffer().unwrap().ptr_eq(&m.buffer()));
    }

    #[test]
    fn test_at_bounds() {
        let mut m = Matrix::from_samples(2, 2, 1, vec![1, 2, 3, 4]).unwrap();
        let args = [NativeValue::int(1), NativeValue::int(0), NativeValue::int(0)];
        assert_eq!(m.invoke(3, &args).unwrap().as_int(), Some(3));
        let outside = [NativeValue::int(2), NativeValue::int(0), NativeValue::int(0)];
        assert!(m.invoke(3, &outside).is_err());
    }
}
