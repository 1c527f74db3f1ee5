//! A library for editing the frames of ICO image files.
//!
//! An ICO file holds one or more frames, each stored either as a bitmap
//! (a color bitmap of 1, 4, 8, 24, or 32 bits per pixel plus a 1-bit AND
//! mask) or as an embedded PNG stream.  Bitmap frames can be built from
//! standalone BMP files and expose a 32-bit composite of color and mask;
//! PNG frames are carried through verbatim.
//!
//! # Example
//!
//! ```no_run
//! let data = std::fs::read("app.ico").unwrap();
//! let file = icoframes::IcoFile::load(&data).unwrap();
//! for frame in file.frames() {
//!     println!("{}x{} at {} bpp", frame.width(), frame.height(),
//!              frame.bit_count());
//! }
//! std::fs::write("copy.ico", file.save().unwrap()).unwrap();
//! ```

#![warn(missing_docs)]

#[macro_use]
mod macros;

mod bitmap;
mod bitmapframe;
mod bmpdepth;
mod error;
mod icofile;
pub mod png;
mod pngframe;

pub use crate::bitmap::{image_length, stride, Bitmap};
pub use crate::bitmapframe::IcoBitmapFrame;
pub use crate::error::{IcoError, Result};
pub use crate::icofile::{IcoFile, IcoFrame};
pub use crate::pngframe::IcoPngFrame;
