use crate::error::{check_length, Result};
use crate::png;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::io::Read;

//===========================================================================//

/// An ICO frame stored as an embedded PNG stream.  The stream is kept
/// verbatim; only its IHDR chunk is inspected.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct IcoPngFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl IcoPngFrame {
    /// Wraps a standalone PNG file as a frame.
    pub fn create_from_image(data: &[u8]) -> Result<IcoPngFrame> {
        IcoPngFrame::from_data(data.to_vec())
    }

    /// Reads a standalone PNG file from a stream and wraps it as a frame.
    pub fn read_from_image<R: Read>(mut reader: R) -> Result<IcoPngFrame> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        IcoPngFrame::from_data(data)
    }

    /// Decodes the PNG payload of an ICO directory entry.
    pub fn load_from_ico_entry(entry: &[u8]) -> Result<IcoPngFrame> {
        IcoPngFrame::from_data(entry.to_vec())
    }

    fn from_data(data: Vec<u8>) -> Result<IcoPngFrame> {
        if !png::is_supported(&data) {
            invalid_format!("Image is not a supported PNG file");
        }
        let (width, height) = png::parse_size(&data)?;
        if width == 0 || height == 0 {
            invalid_format!("Invalid PNG size ({}x{})", width, height);
        }
        Ok(IcoPngFrame { width, height, data })
    }

    /// Returns the width of the frame, in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height of the frame, in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the number of bytes this frame occupies inside an ICO file.
    pub fn frame_length(&self) -> usize {
        self.data.len()
    }

    /// Returns the PNG stream.
    pub fn image_data(&self) -> &[u8] {
        &self.data
    }

    /// Copies the PNG stream into `buffer`, which must be exactly
    /// `self.frame_length()` bytes long.
    pub fn save_frame(&self, buffer: &mut [u8]) -> Result<()> {
        check_length(self.frame_length(), buffer.len())?;
        buffer.copy_from_slice(&self.data);
        Ok(())
    }

    /// Returns a copy of the PNG stream.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.data.clone())
    }
}

//===========================================================================//


//===========================================================================//
