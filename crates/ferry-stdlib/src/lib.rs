//! Ferry Standard Library
//!
//! Sample native types exposed through reflection:
//! - `Calculator`: arithmetic, properties of every kind, a static method and
//!   class constants
//! - `Matrix`: pixel matrix whose bytes are shared zero-copy as a buffer
//! - `Imaging`: matrix factories and background resize/load returning
//!   deferred results
//! - `Ticker`: event source with `changed(int)` and `finished()` channels

#![warn(missing_docs)]

pub mod calculator;
pub mod imaging;
pub mod matrix;
pub mod ticker;

pub use calculator::Calculator;
pub use imaging::{ImageError, Imaging};
pub use matrix::Matrix;
pub use ticker::Ticker;
