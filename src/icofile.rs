use crate::bitmapframe::IcoBitmapFrame;
use crate::error::{IcoError, Result};
use crate::png;
use crate::pngframe::IcoPngFrame;
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

//===========================================================================//

// The ICONDIR struct: reserved (u16), type (u16), frame count (u16).
const ICONDIR_LEN: usize = 6;
const ICO_TYPE: u16 = 1;

// The ICONDIRENTRY struct:
const ENTRY_LEN: usize = 16;
const ENTRY_RESERVED: usize = 3;
const ENTRY_SIZE: usize = 8;
const ENTRY_OFFSET: usize = 12;

// PNG frames are always listed as 32 bits per pixel.
const PNG_BIT_COUNT: u16 = 32;

//===========================================================================//

/// A single image within an ICO file, stored either as a bitmap with an AND
/// mask or as an embedded PNG stream.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum IcoFrame {
    /// A frame stored as a classic bitmap.
    Bitmap(IcoBitmapFrame),
    /// A frame stored as a PNG stream.
    Png(IcoPngFrame),
}

impl IcoFrame {
    /// Decodes one directory entry's payload, choosing the frame kind by
    /// sniffing for a PNG signature.
    pub fn load_from_ico_entry(entry: &[u8]) -> Result<IcoFrame> {
        if png::is_supported(entry) {
            Ok(IcoFrame::Png(IcoPngFrame::load_from_ico_entry(entry)?))
        } else {
            Ok(IcoFrame::Bitmap(IcoBitmapFrame::load_from_ico_entry(entry)?))
        }
    }

    /// Returns the width of the frame, in pixels.
    pub fn width(&self) -> u32 {
        match *self {
            IcoFrame::Bitmap(ref frame) => frame.width(),
            IcoFrame::Png(ref frame) => frame.width(),
        }
    }

    /// Returns the height of the frame, in pixels.
    pub fn height(&self) -> u32 {
        match *self {
            IcoFrame::Bitmap(ref frame) => frame.height(),
            IcoFrame::Png(ref frame) => frame.height(),
        }
    }

    /// Returns the color depth recorded in the directory entry.
    pub fn bit_count(&self) -> u16 {
        match *self {
            IcoFrame::Bitmap(ref frame) => frame.bit_count(),
            IcoFrame::Png(_) => PNG_BIT_COUNT,
        }
    }

    /// Returns true if the frame is stored as a PNG stream.
    pub fn is_png(&self) -> bool {
        matches!(*self, IcoFrame::Png(_))
    }

    /// Returns the number of bytes this frame occupies inside an ICO file.
    pub fn frame_length(&self) -> usize {
        match *self {
            IcoFrame::Bitmap(ref frame) => frame.frame_length(),
            IcoFrame::Png(ref frame) => frame.frame_length(),
        }
    }

    /// Returns the frame as a standalone image file: the composite 32-bit
    /// BMP for bitmap frames, or the PNG stream.
    pub fn image_data(&self) -> &[u8] {
        match *self {
            IcoFrame::Bitmap(ref frame) => frame.image_data(),
            IcoFrame::Png(ref frame) => frame.image_data(),
        }
    }

    /// Encodes the frame's ICO payload into `buffer`, which must be exactly
    /// `self.frame_length()` bytes long.
    pub fn save_frame(&self, buffer: &mut [u8]) -> Result<()> {
        match *self {
            IcoFrame::Bitmap(ref frame) => frame.save_frame(buffer),
            IcoFrame::Png(ref frame) => frame.save_frame(buffer),
        }
    }

    /// Encodes the frame's ICO payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match *self {
            IcoFrame::Bitmap(ref frame) => frame.to_bytes(),
            IcoFrame::Png(ref frame) => frame.to_bytes(),
        }
    }

    fn color_count(&self) -> u8 {
        let bit_count = self.bit_count();
        if bit_count < 8 {
            1 << bit_count
        } else {
            0
        }
    }
}

impl From<IcoBitmapFrame> for IcoFrame {
    fn from(frame: IcoBitmapFrame) -> IcoFrame {
        IcoFrame::Bitmap(frame)
    }
}

impl From<IcoPngFrame> for IcoFrame {
    fn from(frame: IcoPngFrame) -> IcoFrame {
        IcoFrame::Png(frame)
    }
}

//===========================================================================//

/// The frames of a single ICO file, in directory order.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct IcoFile {
    frames: Vec<IcoFrame>,
}

impl IcoFile {
    /// Creates a new ICO file with no frames.
    pub fn new() -> IcoFile {
        IcoFile { frames: Vec::new() }
    }

    /// Creates an ICO file holding the given frames.
    pub fn from_frames(frames: Vec<IcoFrame>) -> IcoFile {
        IcoFile { frames }
    }

    /// Returns the frames, in directory order.
    pub fn frames(&self) -> &[IcoFrame] {
        &self.frames
    }

    /// Returns the number of frames.
    pub fn frames_count(&self) -> usize {
        self.frames.len()
    }

    /// Appends a frame.
    pub fn add_frame<F: Into<IcoFrame>>(&mut self, frame: F) {
        self.frames.push(frame.into());
    }

    /// Removes and returns the frame at `index`.
    pub fn remove_frame(&mut self, index: usize) -> Result<IcoFrame> {
        if index >= self.frames.len() {
            out_of_range!(
                "Frame index out of range (was {}, but there are {} frames)",
                index,
                self.frames.len()
            );
        }
        Ok(self.frames.remove(index))
    }

    /// Consumes the file, returning its frames.
    pub fn into_frames(self) -> Vec<IcoFrame> {
        self.frames
    }

    /// Parses an ICO file held in memory.
    pub fn load(data: &[u8]) -> Result<IcoFile> {
        if data.len() < ICONDIR_LEN {
            invalid_format!(
                "ICO data too short to hold ICONDIR (was {} bytes)",
                data.len()
            );
        }
        let reserved = LittleEndian::read_u16(&data[0..]);
        if reserved != 0 {
            invalid_directory!(
                "Invalid reserved field value in ICONDIR \
                 (was {}, but must be 0)",
                reserved
            );
        }
        let restype = LittleEndian::read_u16(&data[2..]);
        if restype != ICO_TYPE {
            invalid_directory!(
                "Invalid resource type (was {}, but must be {})",
                restype,
                ICO_TYPE
            );
        }
        let num_frames = LittleEndian::read_u16(&data[4..]) as usize;
        let directory_len = ICONDIR_LEN + ENTRY_LEN * num_frames;
        if data.len() < directory_len {
            invalid_format!(
                "ICO data too short for {} directory entries \
                 (was {} bytes, but must be at least {})",
                num_frames,
                data.len(),
                directory_len
            );
        }
        log::debug!("Loading ICO directory with {} frames", num_frames);
        let mut frames = Vec::with_capacity(num_frames);
        for (index, entry) in data[ICONDIR_LEN..directory_len]
            .chunks_exact(ENTRY_LEN)
            .enumerate()
        {
            if entry[ENTRY_RESERVED] != 0 {
                log::warn!(
                    "Frame {} has non-zero reserved byte in ICONDIRENTRY ({})",
                    index,
                    entry[ENTRY_RESERVED]
                );
            }
            let size = LittleEndian::read_u32(&entry[ENTRY_SIZE..]) as usize;
            let offset =
                LittleEndian::read_u32(&entry[ENTRY_OFFSET..]) as usize;
            let end = match offset.checked_add(size) {
                Some(end) if end <= data.len() => end,
                _ => invalid_format!(
                    "Frame {} data out of range (offset {}, size {}, but \
                     file is {} bytes)",
                    index,
                    offset,
                    size,
                    data.len()
                ),
            };
            let frame = IcoFrame::load_from_ico_entry(&data[offset..end])?;
            check_entry_size(index, entry, &frame);
            log::trace!(
                "Frame {}: {}x{} at {} bpp, {} ({} bytes at {})",
                index,
                frame.width(),
                frame.height(),
                frame.bit_count(),
                if frame.is_png() { "PNG" } else { "BMP" },
                size,
                offset
            );
            frames.push(frame);
        }
        Ok(IcoFile { frames })
    }

    /// Reads an ICO file from a stream.
    pub fn read<R: Read>(mut reader: R) -> Result<IcoFile> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        IcoFile::load(&data)
    }

    /// Encodes the directory followed by every frame's payload.
    pub fn save(&self) -> Result<Vec<u8>> {
        if self.frames.is_empty() {
            return Err(IcoError::EmptyInput);
        }
        if self.frames.len() > (u16::MAX as usize) {
            out_of_range!(
                "Too many frames in ICO file (was {}, but max is {})",
                self.frames.len(),
                u16::MAX
            );
        }
        let directory_len = ICONDIR_LEN + ENTRY_LEN * self.frames.len();
        let total_len = directory_len
            + self.frames.iter().map(IcoFrame::frame_length).sum::<usize>();
        if total_len > (u32::MAX as usize) {
            out_of_range!("ICO file too large ({} bytes)", total_len);
        }
        let mut data = Vec::with_capacity(total_len);
        data.write_u16::<LittleEndian>(0)?; // reserved
        data.write_u16::<LittleEndian>(ICO_TYPE)?;
        data.write_u16::<LittleEndian>(self.frames.len() as u16)?;
        let mut data_offset = directory_len as u32;
        for frame in self.frames.iter() {
            // A width/height byte of zero indicates a size of 256 or more.
            let width =
                if frame.width() > 255 { 0 } else { frame.width() as u8 };
            data.write_u8(width)?;
            let height =
                if frame.height() > 255 { 0 } else { frame.height() as u8 };
            data.write_u8(height)?;
            data.write_u8(frame.color_count())?;
            data.write_u8(0)?; // reserved
            data.write_u16::<LittleEndian>(1)?; // planes
            data.write_u16::<LittleEndian>(frame.bit_count())?;
            let data_size = frame.frame_length() as u32;
            data.write_u32::<LittleEndian>(data_size)?;
            data.write_u32::<LittleEndian>(data_offset)?;
            data_offset += data_size;
        }
        for frame in self.frames.iter() {
            let start = data.len();
            data.resize(start + frame.frame_length(), 0);
            frame.save_frame(&mut data[start..])?;
        }
        log::debug!(
            "Saved ICO file with {} frames ({} bytes)",
            self.frames.len(),
            data.len()
        );
        Ok(data)
    }

    /// Writes the encoded ICO file to a stream.
    pub fn write<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&self.save()?)?;
        Ok(())
    }
}

// The width and height bytes of an ICONDIRENTRY are only a hint; the frame's
// own header is authoritative.
fn check_entry_size(index: usize, entry: &[u8], frame: &IcoFrame) {
    let width = if entry[0] == 0 { 256 } else { entry[0] as u32 };
    let height = if entry[1] == 0 { 256 } else { entry[1] as u32 };
    let expected_width = frame.width().min(256);
    let expected_height = frame.height().min(256);
    if width != expected_width || height != expected_height {
        log::warn!(
            "Frame {} directory size ({}x{}) disagrees with its data ({}x{})",
            index,
            width,
            height,
            frame.width(),
            frame.height()
        );
    }
}

//===========================================================================//


//===========================================================================//
