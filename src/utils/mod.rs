//! Helper utilities, functions, and macros.

#[macro_use]
mod print;

#[macro_use]
mod config;

mod bitmap;
mod error;

pub use bitmap::{Bitmap, BitmapIter};
pub use error::HaError;
pub use print::{logger_init, ME};
