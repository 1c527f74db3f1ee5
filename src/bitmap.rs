use crate::bmpdepth::BmpDepth;
use crate::error::{check_length, Result};
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read, Write};

//===========================================================================//

// The BITMAPFILEHEADER struct, which only standalone BMP files carry:
const FILE_HEADER_LEN: usize = 14;
const FILE_HEADER_FILE_SIZE: usize = 0x02;
const FILE_HEADER_PIXELS: usize = 0x0a;
const BMP_SIGNATURE: &[u8; 2] = b"BM";

// The sizes of BITMAPINFOHEADER, BITMAPV4HEADER, and BITMAPV5HEADER:
pub(crate) const INFO_HEADER_LEN: usize = 40;
const V4_HEADER_LEN: usize = 108;
const V5_HEADER_LEN: usize = 124;

// Field offsets within the bitmap header:
pub(crate) const HEADER_WIDTH: usize = 0x04;
pub(crate) const HEADER_HEIGHT: usize = 0x08;
pub(crate) const HEADER_BIT_COUNT: usize = 0x0e;
pub(crate) const HEADER_COMPRESSION: usize = 0x10;
pub(crate) const HEADER_IMAGE_SIZE: usize = 0x14;
pub(crate) const HEADER_COLORS_USED: usize = 0x20;
const HEADER_RED_MASK: usize = 0x28;
const HEADER_GREEN_MASK: usize = 0x2c;
const HEADER_BLUE_MASK: usize = 0x30;
const HEADER_ALPHA_MASK: usize = 0x34;

pub(crate) const BI_RGB: u32 = 0;
pub(crate) const BI_BITFIELDS: u32 = 3;

const RED_MASK: u32 = 0x00ff_0000;
const GREEN_MASK: u32 = 0x0000_ff00;
const BLUE_MASK: u32 = 0x0000_00ff;
const ALPHA_MASK: u32 = 0xff00_0000;

// Header fields are 32-bit, so no encoded bitmap may be larger than this.
const MAX_ENCODED_LEN: u64 = i32::MAX as u64;

//===========================================================================//

/// Returns the number of bytes in one row of DIB pixel data, including the
/// padding that aligns each row to a four-byte boundary.
pub fn stride(width: u32, bit_count: u16) -> usize {
    let row_bits = (width as u64) * (bit_count as u64);
    usize::try_from(((row_bits + 31) & !31) >> 3).unwrap_or(usize::MAX)
}

/// Returns the number of bytes needed to encode a bitmap with the given
/// dimensions.  Non-indexed bitmaps get a BITMAPV5HEADER only when written
/// with a file header; everything else gets a BITMAPINFOHEADER.
pub fn image_length(
    width: u32,
    height: u32,
    bit_count: u16,
    with_file_header: bool,
) -> usize {
    let indexed = bit_count <= 8;
    let file_header_len = if with_file_header { FILE_HEADER_LEN } else { 0 };
    let color_table_len = if indexed { 4 << bit_count } else { 0 };
    let fixed_len = file_header_len
        + header_len(indexed, with_file_header)
        + color_table_len;
    // Saturates for dimensions that no bitmap can actually have.
    let pixels_len = stride(width, bit_count).saturating_mul(height as usize);
    fixed_len.saturating_add(pixels_len)
}

fn header_len(indexed: bool, with_file_header: bool) -> usize {
    if !indexed && with_file_header {
        V5_HEADER_LEN
    } else {
        INFO_HEADER_LEN
    }
}

pub(crate) fn is_supported_header_len(header_len: u32) -> bool {
    matches!(
        header_len as usize,
        INFO_HEADER_LEN | V4_HEADER_LEN | V5_HEADER_LEN
    )
}

//===========================================================================//

// Byte positions of each channel within one 24- or 32-bit pixel.
#[derive(Clone, Copy, Debug)]
struct ChannelLayout {
    red: usize,
    green: usize,
    blue: usize,
    alpha: Option<usize>,
}

impl ChannelLayout {
    fn from_masks(
        red: u32,
        green: u32,
        blue: u32,
        alpha: u32,
        depth: BmpDepth,
    ) -> Result<ChannelLayout> {
        let pixel_len = (depth.bit_count() / 8) as usize;
        let position = |mask: u32| -> Result<usize> {
            let byte = (mask.trailing_zeros() / 8) as usize;
            if mask == 0 || byte >= pixel_len {
                unsupported!(
                    "Unsupported channel mask {:#010x} for {}-bit bitmap",
                    mask,
                    depth.bit_count()
                );
            }
            Ok(byte)
        };
        let alpha = if depth == BmpDepth::ThirtyTwo && alpha != 0 {
            Some(position(alpha)?)
        } else {
            None
        };
        Ok(ChannelLayout {
            red: position(red)?,
            green: position(green)?,
            blue: position(blue)?,
            alpha,
        })
    }

    fn standard(depth: BmpDepth) -> ChannelLayout {
        ChannelLayout {
            red: 2,
            green: 1,
            blue: 0,
            alpha: if depth == BmpDepth::ThirtyTwo { Some(3) } else { None },
        }
    }
}

//===========================================================================//

/// A device-independent bitmap, decoded into top-down ARGB pixels.
///
/// Pixels are `0xAARRGGBB` values in row-major order, with row 0 being the
/// topmost row of the image (even though DIBs store rows bottom-up).
/// Indexed bitmaps (1, 4, or 8 bits per pixel) also carry a color table of
/// exactly `2^bit_count` entries, which every pixel is a member of.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct Bitmap {
    width: u32,
    height: u32,
    depth: BmpDepth,
    color_table: Vec<u32>,
    pixels: Vec<u32>,
}

impl Bitmap {
    /// Decodes a standalone BMP file (starting with a BITMAPFILEHEADER).
    pub fn from_file(data: &[u8]) -> Result<Bitmap> {
        if data.len() < FILE_HEADER_LEN + 4
            || &data[0..2] != BMP_SIGNATURE
        {
            invalid_format!("Missing BMP signature");
        }
        let file_size =
            LittleEndian::read_u32(&data[FILE_HEADER_FILE_SIZE..]) as usize;
        if file_size != data.len() {
            invalid_format!(
                "BMP file size field disagrees with data length \
                 (was {}, but data has {} bytes)",
                file_size,
                data.len()
            );
        }
        let pixel_offset =
            LittleEndian::read_u32(&data[FILE_HEADER_PIXELS..]) as usize;
        if pixel_offset < FILE_HEADER_LEN + INFO_HEADER_LEN {
            invalid_format!(
                "Invalid BMP pixel data offset ({})",
                pixel_offset
            );
        }
        Bitmap::from_dib(
            &data[FILE_HEADER_LEN..],
            pixel_offset - FILE_HEADER_LEN,
        )
    }

    /// Reads a standalone BMP file from a stream and decodes it.
    pub fn read_file<R: Read>(mut reader: R) -> Result<Bitmap> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Bitmap::from_file(&data)
    }

    /// Decodes a DIB (bitmap header, optional color table, and pixel data,
    /// without a file header) whose pixel data starts at `pixel_offset`.
    pub fn from_dib(data: &[u8], pixel_offset: usize) -> Result<Bitmap> {
        if pixel_offset >= data.len() {
            out_of_range!(
                "Pixel data offset {} is outside the {}-byte buffer",
                pixel_offset,
                data.len()
            );
        }
        if data.len() < 4 {
            invalid_format!("BMP data too short to hold a header");
        }
        let header_len = LittleEndian::read_u32(data);
        if !is_supported_header_len(header_len) {
            unsupported!("Unsupported BMP header size ({})", header_len);
        }
        let header_len = header_len as usize;
        if data.len() < header_len {
            invalid_format!(
                "BMP header truncated (was {} bytes, but must be {})",
                data.len(),
                header_len
            );
        }
        if pixel_offset < header_len {
            invalid_format!(
                "BMP pixel data offset {} overlaps the {}-byte header",
                pixel_offset,
                header_len
            );
        }
        let bit_count = LittleEndian::read_u16(&data[HEADER_BIT_COUNT..]);
        let depth = match BmpDepth::from_bit_count(bit_count) {
            Some(depth) => depth,
            None => unsupported!("Unsupported bit count ({})", bit_count),
        };
        let width = positive_dimension(
            "width",
            LittleEndian::read_i32(&data[HEADER_WIDTH..]),
        )?;
        let height = positive_dimension(
            "height",
            LittleEndian::read_i32(&data[HEADER_HEIGHT..]),
        )?;
        check_encodable(width, height, depth)?;
        let compression = LittleEndian::read_u32(&data[HEADER_COMPRESSION..]);
        if compression != BI_RGB && compression != BI_BITFIELDS {
            unsupported!("Unsupported BMP compression ({})", compression);
        }
        let pixel_data = &data[pixel_offset..];

        if depth.is_indexed() {
            let colors_used =
                LittleEndian::read_u32(&data[HEADER_COLORS_USED..]) as usize;
            let num_colors = if colors_used == 0 {
                depth.num_colors()
            } else {
                colors_used
            };
            if num_colors > depth.num_colors() {
                invalid_format!(
                    "Too many colors for {}-bit bitmap ({})",
                    bit_count,
                    num_colors
                );
            }
            let table_end = header_len + 4 * num_colors;
            if table_end > data.len() {
                invalid_format!("BMP color table truncated");
            }
            let parsed =
                Bitmap::parse_color_table(&data[header_len..table_end]);
            let color_table = full_color_table(parsed, depth)?;
            let pixels = read_indexed_pixels(
                width,
                height,
                depth,
                &color_table,
                pixel_data,
            )?;
            Ok(Bitmap { width, height, depth, color_table, pixels })
        } else {
            let layout = if compression == BI_BITFIELDS {
                read_channel_layout(data, header_len, pixel_offset, depth)?
            } else {
                ChannelLayout::standard(depth)
            };
            let pixels =
                read_direct_pixels(width, height, depth, layout, pixel_data)?;
            let color_table = Vec::new();
            Ok(Bitmap { width, height, depth, color_table, pixels })
        }
    }

    /// Decodes raw DIB pixel data (bottom-up, row-padded) with no header.
    /// Indexed bit counts require a non-empty `color_table` of at most
    /// `2^bit_count` entries; it is ignored for 24- and 32-bit data.
    pub fn from_pixel_buffer(
        width: u32,
        height: u32,
        bit_count: u16,
        pixel_buffer: &[u8],
        color_table: Option<&[u32]>,
    ) -> Result<Bitmap> {
        let depth = check_dimensions(width, height, bit_count)?;
        if depth.is_indexed() {
            let color_table = match color_table {
                Some(table) if !table.is_empty() => table.to_vec(),
                _ => out_of_range!(
                    "A color table is required for {}-bit bitmaps",
                    bit_count
                ),
            };
            let color_table = full_color_table(color_table, depth)?;
            let pixels = read_indexed_pixels(
                width,
                height,
                depth,
                &color_table,
                pixel_buffer,
            )?;
            Ok(Bitmap { width, height, depth, color_table, pixels })
        } else {
            let pixels = read_direct_pixels(
                width,
                height,
                depth,
                ChannelLayout::standard(depth),
                pixel_buffer,
            )?;
            let color_table = Vec::new();
            Ok(Bitmap { width, height, depth, color_table, pixels })
        }
    }

    /// Creates a bitmap from top-down ARGB pixels.  For indexed bit counts
    /// the color table is built from the distinct pixel values, in order of
    /// first appearance, and there must be at most `2^bit_count` of them.
    pub fn from_pixels(
        width: u32,
        height: u32,
        bit_count: u16,
        pixels: Vec<u32>,
    ) -> Result<Bitmap> {
        let depth = check_dimensions(width, height, bit_count)?;
        let expected = (width as usize) * (height as usize);
        if pixels.len() != expected {
            out_of_range!(
                "Invalid pixel count \
                 (was {}, but must be {} for {}x{} bitmap)",
                pixels.len(),
                expected,
                width,
                height
            );
        }
        let color_table = if depth.is_indexed() {
            let mut seen = HashSet::<u32>::new();
            let mut distinct = Vec::new();
            for &pixel in pixels.iter() {
                if seen.insert(pixel) {
                    distinct.push(pixel);
                }
            }
            full_color_table(distinct, depth)?
        } else {
            Vec::new()
        };
        Ok(Bitmap { width, height, depth, color_table, pixels })
    }

    /// Returns true if `data` begins with a BMP file header whose declared
    /// file size equals `file_length` and whose bitmap header has a
    /// supported size (40, 108, or 124 bytes).  `data` only needs to hold
    /// the headers, not the whole file.
    pub fn is_supported(data: &[u8], file_length: usize) -> bool {
        if data.len() < FILE_HEADER_LEN + 4 || &data[0..2] != BMP_SIGNATURE {
            return false;
        }
        let file_size = LittleEndian::read_u32(&data[FILE_HEADER_FILE_SIZE..]);
        let header_len = LittleEndian::read_u32(&data[FILE_HEADER_LEN..]);
        file_size as usize == file_length
            && is_supported_header_len(header_len)
    }

    /// Reads the width, height, and bit count out of a bitmap header, with
    /// or without a preceding file header.  The height is returned as
    /// stored, so it is doubled for bitmaps taken from an ICO entry.
    pub fn parse_size(data: &[u8]) -> Result<(u32, u32, u16)> {
        let header = if data.starts_with(BMP_SIGNATURE) {
            &data[FILE_HEADER_LEN.min(data.len())..]
        } else {
            data
        };
        if header.len() < HEADER_BIT_COUNT + 2 {
            invalid_format!("BMP data too short to hold a header");
        }
        let width = positive_dimension(
            "width",
            LittleEndian::read_i32(&header[HEADER_WIDTH..]),
        )?;
        let height = positive_dimension(
            "height",
            LittleEndian::read_i32(&header[HEADER_HEIGHT..]),
        )?;
        let bit_count = LittleEndian::read_u16(&header[HEADER_BIT_COUNT..]);
        Ok((width, height, bit_count))
    }

    /// Decodes a run of 4-byte BGRX color table entries.  The reserved
    /// byte is ignored and every color comes back fully opaque.
    pub fn parse_color_table(data: &[u8]) -> Vec<u32> {
        data.chunks_exact(4)
            .map(|entry| {
                ALPHA_MASK
                    | ((entry[2] as u32) << 16)
                    | ((entry[1] as u32) << 8)
                    | (entry[0] as u32)
            })
            .collect()
    }

    /// Returns the width of the bitmap, in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height of the bitmap, in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the bits-per-pixel (color depth) of the bitmap.
    pub fn bit_count(&self) -> u16 {
        self.depth.bit_count()
    }

    /// Returns true if the bitmap stores palette indices.
    pub fn is_indexed(&self) -> bool {
        self.depth.is_indexed()
    }

    /// Returns the color table, which is empty for 24- and 32-bit bitmaps.
    pub fn color_table(&self) -> &[u32] {
        &self.color_table
    }

    /// Returns the number of bytes the color table occupies when encoded.
    pub fn color_table_len(&self) -> usize {
        self.depth.color_table_len()
    }

    /// Returns the ARGB pixels in row-major order from top to bottom.
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Returns the number of bytes in one row of encoded pixel data.
    pub fn stride(&self) -> usize {
        stride(self.width, self.bit_count())
    }

    /// Returns the exact number of bytes `save` needs.
    pub fn length(&self, with_file_header: bool) -> usize {
        let bit_count = self.bit_count();
        image_length(self.width, self.height, bit_count, with_file_header)
    }

    /// Encodes the bitmap into `buffer`, which must be exactly
    /// `self.length(with_file_header)` bytes long.
    pub fn save(
        &self,
        buffer: &mut [u8],
        with_file_header: bool,
    ) -> Result<()> {
        check_length(self.length(with_file_header), buffer.len())?;
        buffer.fill(0);
        let total_len = buffer.len();
        let indexed = self.depth.is_indexed();
        let file_header_len =
            if with_file_header { FILE_HEADER_LEN } else { 0 };
        let header_len = header_len(indexed, with_file_header);
        let color_table_pos = file_header_len + header_len;
        let pixel_offset = color_table_pos + self.color_table_len();
        let (front, pixel_area) = buffer.split_at_mut(pixel_offset);
        {
            let mut writer = Cursor::new(&mut front[..]);
            if with_file_header {
                writer.write_all(BMP_SIGNATURE)?;
                writer.write_u32::<LittleEndian>(total_len as u32)?;
                writer.write_u32::<LittleEndian>(0)?; // reserved
                writer.write_u32::<LittleEndian>(pixel_offset as u32)?;
            }
            writer.write_u32::<LittleEndian>(header_len as u32)?;
            writer.write_i32::<LittleEndian>(self.width as i32)?;
            writer.write_i32::<LittleEndian>(self.height as i32)?;
            writer.write_u16::<LittleEndian>(1)?; // planes
            writer.write_u16::<LittleEndian>(self.bit_count())?;
            // Everything after the bit count stays zero (BI_RGB, no colors
            // used) except in the V5 case below.
        }
        if header_len == V5_HEADER_LEN {
            let header = &mut front[file_header_len..color_table_pos];
            LittleEndian::write_u32(
                &mut header[HEADER_COMPRESSION..],
                BI_BITFIELDS,
            );
            LittleEndian::write_u32(
                &mut header[HEADER_RED_MASK..],
                RED_MASK,
            );
            LittleEndian::write_u32(
                &mut header[HEADER_GREEN_MASK..],
                GREEN_MASK,
            );
            LittleEndian::write_u32(
                &mut header[HEADER_BLUE_MASK..],
                BLUE_MASK,
            );
            LittleEndian::write_u32(
                &mut header[HEADER_ALPHA_MASK..],
                ALPHA_MASK,
            );
        }
        if indexed {
            self.write_color_table(&mut front[color_table_pos..])?;
        }
        self.write_pixel_area(pixel_area)
    }

    /// Encodes the bitmap into a newly allocated buffer.
    pub fn to_bytes(&self, with_file_header: bool) -> Result<Vec<u8>> {
        let mut data = vec![0u8; self.length(with_file_header)];
        self.save(&mut data, with_file_header)?;
        Ok(data)
    }

    /// Encodes just the pixel data (bottom-up, row-padded) into `buffer`,
    /// which must be exactly `stride * height` bytes long.
    pub fn save_pixels(&self, buffer: &mut [u8]) -> Result<()> {
        check_length(self.stride() * (self.height as usize), buffer.len())?;
        buffer.fill(0);
        self.write_pixel_area(buffer)
    }

    /// Encodes a 1-bit-per-pixel mask into `buffer`, which must be exactly
    /// `stride(width, 1) * height` bytes long.  A pixel gets a 0 bit where
    /// `keep` returns true and a 1 bit otherwise.
    pub fn save_bitmask<F>(&self, buffer: &mut [u8], keep: F) -> Result<()>
    where
        F: Fn(u32) -> bool,
    {
        let mask_stride = stride(self.width, 1);
        check_length(mask_stride * (self.height as usize), buffer.len())?;
        buffer.fill(0);
        let width = self.width as usize;
        let height = self.height as usize;
        for (row, out) in buffer.chunks_exact_mut(mask_stride).enumerate() {
            let start = width * (height - row - 1);
            let pixels = &self.pixels[start..start + width];
            for (col, &pixel) in pixels.iter().enumerate() {
                if !keep(pixel) {
                    out[col / 8] |= 0x80u8 >> (col % 8);
                }
            }
        }
        Ok(())
    }

    fn write_color_table(&self, buffer: &mut [u8]) -> Result<()> {
        let mut writer = Cursor::new(buffer);
        for &color in self.color_table.iter() {
            writer.write_u8(color as u8)?;
            writer.write_u8((color >> 8) as u8)?;
            writer.write_u8((color >> 16) as u8)?;
            writer.write_u8((color >> 24) as u8)?;
        }
        Ok(())
    }

    // Writes rows bottom-up into a zeroed buffer of `stride * height` bytes.
    fn write_pixel_area(&self, buffer: &mut [u8]) -> Result<()> {
        let row_stride = self.stride();
        let width = self.width as usize;
        let height = self.height as usize;
        if self.depth.is_indexed() {
            let mut color_map = HashMap::<u32, u8>::new();
            for (index, &color) in self.color_table.iter().enumerate() {
                color_map.entry(color).or_insert(index as u8);
            }
            let bits = self.bit_count() as usize;
            for (row, out) in buffer.chunks_exact_mut(row_stride).enumerate() {
                let start = width * (height - row - 1);
                for (col, &pixel) in
                    self.pixels[start..start + width].iter().enumerate()
                {
                    let index = match color_map.get(&pixel) {
                        Some(&index) => index,
                        None => out_of_range!(
                            "Color {:#010x} is not in the color table",
                            pixel
                        ),
                    };
                    let bit = col * bits;
                    out[bit / 8] |= index << (8 - bits - bit % 8);
                }
            }
        } else {
            let with_alpha = self.depth == BmpDepth::ThirtyTwo;
            for (row, out) in buffer.chunks_exact_mut(row_stride).enumerate() {
                let start = width * (height - row - 1);
                let mut writer = Cursor::new(out);
                for &pixel in self.pixels[start..start + width].iter() {
                    writer.write_u8(pixel as u8)?;
                    writer.write_u8((pixel >> 8) as u8)?;
                    writer.write_u8((pixel >> 16) as u8)?;
                    if with_alpha {
                        writer.write_u8((pixel >> 24) as u8)?;
                    }
                }
            }
        }
        Ok(())
    }
}

//===========================================================================//

fn positive_dimension(name: &str, value: i32) -> Result<u32> {
    if value <= 0 {
        out_of_range!(
            "Invalid BMP {} (was {}, but must be positive)",
            name,
            value
        );
    }
    Ok(value as u32)
}

fn check_dimensions(
    width: u32,
    height: u32,
    bit_count: u16,
) -> Result<BmpDepth> {
    let depth = match BmpDepth::from_bit_count(bit_count) {
        Some(depth) => depth,
        None => unsupported!("Unsupported bit count ({})", bit_count),
    };
    if width == 0 {
        out_of_range!("Invalid width (was 0, but must be positive)");
    }
    if height == 0 {
        out_of_range!("Invalid height (was 0, but must be positive)");
    }
    if width > i32::MAX as u32 || height > i32::MAX as u32 {
        out_of_range!("Bitmap dimensions too large ({}x{})", width, height);
    }
    check_encodable(width, height, depth)?;
    Ok(depth)
}

fn check_encodable(width: u32, height: u32, depth: BmpDepth) -> Result<()> {
    let row_len = ((width as u64) * (depth.bit_count() as u64) + 31) / 32 * 4;
    let encoded_len = row_len
        .checked_mul(height as u64)
        .and_then(|len| {
            len.checked_add((V5_HEADER_LEN + FILE_HEADER_LEN + 1024) as u64)
        });
    match encoded_len {
        Some(len) if len <= MAX_ENCODED_LEN => Ok(()),
        _ => out_of_range!(
            "Bitmap dimensions too large ({}x{})",
            width,
            height
        ),
    }
}

// Pads a color table with black entries up to its full size.
fn full_color_table(mut table: Vec<u32>, depth: BmpDepth) -> Result<Vec<u32>> {
    if table.len() > depth.num_colors() {
        out_of_range!(
            "Too many colors for {}-bit bitmap (was {}, but max is {})",
            depth.bit_count(),
            table.len(),
            depth.num_colors()
        );
    }
    table.resize(depth.num_colors(), 0);
    Ok(table)
}

fn read_channel_layout(
    data: &[u8],
    header_len: usize,
    pixel_offset: usize,
    depth: BmpDepth,
) -> Result<ChannelLayout> {
    // V4/V5 headers hold the masks inline; a BITMAPINFOHEADER is followed
    // by them instead, in the same position, before the pixel data.
    let available = if header_len >= V4_HEADER_LEN {
        HEADER_ALPHA_MASK + 4
    } else {
        pixel_offset.min(data.len())
    };
    if available < HEADER_BLUE_MASK + 4 {
        return Ok(ChannelLayout::standard(depth));
    }
    let red = LittleEndian::read_u32(&data[HEADER_RED_MASK..]);
    let green = LittleEndian::read_u32(&data[HEADER_GREEN_MASK..]);
    let blue = LittleEndian::read_u32(&data[HEADER_BLUE_MASK..]);
    let alpha = if available >= HEADER_ALPHA_MASK + 4 {
        LittleEndian::read_u32(&data[HEADER_ALPHA_MASK..])
    } else {
        0
    };
    ChannelLayout::from_masks(red, green, blue, alpha, depth)
}

fn check_pixel_buffer(
    width: u32,
    height: u32,
    depth: BmpDepth,
    buffer: &[u8],
) -> Result<usize> {
    let row_stride = stride(width, depth.bit_count());
    let needed = row_stride * (height as usize);
    if buffer.len() < needed {
        out_of_range!(
            "Pixel buffer too short \
             (was {} bytes, but {}x{} at {} bpp needs {})",
            buffer.len(),
            width,
            height,
            depth.bit_count(),
            needed
        );
    }
    Ok(row_stride)
}

// Unpacks MSB-first palette indices into one index per pixel, flipping the
// bottom-up row order of the DIB into top-down order.
fn read_bits(
    width: u32,
    height: u32,
    depth: BmpDepth,
    buffer: &[u8],
) -> Result<Vec<u8>> {
    let row_stride = check_pixel_buffer(width, height, depth, buffer)?;
    let width = width as usize;
    let height = height as usize;
    let bits = depth.bit_count() as usize;
    let mask = ((1u16 << bits) - 1) as u8;
    let mut indices = vec![0u8; width * height];
    for (row, data) in buffer.chunks(row_stride).take(height).enumerate() {
        let start = width * (height - row - 1);
        let row_indices = &mut indices[start..start + width];
        for (col, index) in row_indices.iter_mut().enumerate() {
            let bit = col * bits;
            *index = (data[bit / 8] >> (8 - bits - bit % 8)) & mask;
        }
    }
    Ok(indices)
}

fn read_indexed_pixels(
    width: u32,
    height: u32,
    depth: BmpDepth,
    color_table: &[u32],
    buffer: &[u8],
) -> Result<Vec<u32>> {
    let indices = read_bits(width, height, depth, buffer)?;
    // The table is always full-sized, so every index is in bounds.
    Ok(indices.into_iter().map(|index| color_table[index as usize]).collect())
}

fn read_direct_pixels(
    width: u32,
    height: u32,
    depth: BmpDepth,
    layout: ChannelLayout,
    buffer: &[u8],
) -> Result<Vec<u32>> {
    let row_stride = check_pixel_buffer(width, height, depth, buffer)?;
    let width = width as usize;
    let height = height as usize;
    let pixel_len = (depth.bit_count() / 8) as usize;
    let mut pixels = vec![0u32; width * height];
    for (row, data) in buffer.chunks(row_stride).take(height).enumerate() {
        let start = width * (height - row - 1);
        for (pixel, bytes) in pixels[start..start + width]
            .iter_mut()
            .zip(data.chunks_exact(pixel_len))
        {
            let red = bytes[layout.red] as u32;
            let green = bytes[layout.green] as u32;
            let blue = bytes[layout.blue] as u32;
            let alpha = match layout.alpha {
                Some(position) => bytes[position] as u32,
                // Without an alpha channel, pure black reads as transparent.
                None if depth == BmpDepth::TwentyFour => {
                    if red + green + blue == 0 {
                        0
                    } else {
                        0xff
                    }
                }
                None => 0xff,
            };
            *pixel = (alpha << 24) | (red << 16) | (green << 8) | blue;
        }
    }
    Ok(pixels)
}

//===========================================================================//

#[cfg(test)]
mod tests {
    use super::{image_length, stride, Bitmap};
    use crate::error::IcoError;

    // A 3x2 1-bit BMP: the top row is white, black, white and the bottom row
    // is black, white, black.
    const BMP_1BPP: &[u8] = b"\
        BM\x46\x00\x00\x00\x00\x00\x00\x00\x3e\x00\x00\x00\
        \
        \x28\x00\x00\x00\x03\x00\x00\x00\x02\x00\x00\x00\
        \x01\x00\x01\x00\x00\x00\x00\x00\x08\x00\x00\x00\
        \x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\
        \x00\x00\x00\x00\
        \
        \x00\x00\x00\x00\xff\xff\xff\x00\
        \
        \x40\x00\x00\x00\
        \xa0\x00\x00\x00";

    const WHITE: u32 = 0xffff_ffff;
    const BLACK: u32 = 0xff00_0000;

    #[test]
    fn stride_is_row_aligned() {
        assert_eq!(stride(1, 1), 4);
        assert_eq!(stride(32, 1), 4);
        assert_eq!(stride(33, 1), 8);
        assert_eq!(stride(5, 4), 4);
        assert_eq!(stride(9, 4), 8);
        assert_eq!(stride(3, 8), 4);
        assert_eq!(stride(3, 24), 12);
        assert_eq!(stride(5, 24), 16);
        assert_eq!(stride(3, 32), 12);
    }

    #[test]
    fn image_lengths() {
        // Indexed: always a BITMAPINFOHEADER plus a full color table.
        assert_eq!(image_length(96, 64, 8, true), 14 + 40 + 1024 + 96 * 64);
        assert_eq!(image_length(96, 64, 8, false), 40 + 1024 + 96 * 64);
        // Non-indexed: BITMAPV5HEADER only alongside a file header.
        assert_eq!(image_length(96, 64, 24, true), 14 + 124 + 288 * 64);
        assert_eq!(image_length(96, 64, 24, false), 40 + 288 * 64);
        assert_eq!(image_length(2, 2, 32, false), 40 + 16);
    }

    #[test]
    fn sniff_bmp_header() {
        assert!(Bitmap::is_supported(BMP_1BPP, BMP_1BPP.len()));
        assert!(Bitmap::is_supported(&BMP_1BPP[..18], BMP_1BPP.len()));
        assert!(!Bitmap::is_supported(BMP_1BPP, BMP_1BPP.len() + 1));
        assert!(!Bitmap::is_supported(&BMP_1BPP[14..], BMP_1BPP.len()));
        let mut data = BMP_1BPP.to_vec();
        data[14] = 12; // BITMAPCOREHEADER
        assert!(!Bitmap::is_supported(&data, data.len()));
    }

    #[test]
    fn parse_size_with_and_without_file_header() {
        assert_eq!(Bitmap::parse_size(BMP_1BPP).unwrap(), (3, 2, 1));
        assert_eq!(Bitmap::parse_size(&BMP_1BPP[14..]).unwrap(), (3, 2, 1));
    }

    #[test]
    fn decode_1bpp_file() {
        let bitmap = Bitmap::from_file(BMP_1BPP).unwrap();
        assert_eq!(bitmap.width(), 3);
        assert_eq!(bitmap.height(), 2);
        assert_eq!(bitmap.bit_count(), 1);
        assert_eq!(bitmap.color_table(), &[BLACK, WHITE]);
        assert_eq!(
            bitmap.pixels(),
            &[WHITE, BLACK, WHITE, BLACK, WHITE, BLACK]
        );
    }

    #[test]
    fn reencode_1bpp_file_byte_for_byte() {
        let bitmap = Bitmap::from_file(BMP_1BPP).unwrap();
        let mut expected = BMP_1BPP.to_vec();
        // The image size field is written as 0, and the color table comes
        // back with opaque alpha bytes.
        expected[14 + 0x14] = 0;
        let data = bitmap.to_bytes(true).unwrap();
        assert_eq!(data.len(), expected.len());
        assert_eq!(&data[..54], &expected[..54]);
        assert_eq!(&data[62..], &expected[62..]);
        assert_eq!(Bitmap::from_file(&data).unwrap(), bitmap);
    }

    #[test]
    fn decode_4bpp_with_odd_width() {
        // 3x1 pixels with palette indices 1, 2, 3.
        let table = [0xff11_1111, 0xff22_2222, 0xff33_3333, 0xff44_4444];
        let bitmap =
            Bitmap::from_pixel_buffer(3, 1, 4, b"\x12\x30\0\0", Some(&table))
                .unwrap();
        assert_eq!(bitmap.color_table().len(), 16);
        assert_eq!(bitmap.pixels(), &[0xff22_2222, 0xff33_3333, 0xff44_4444]);
        let mut buffer = [0xaau8; 4];
        bitmap.save_pixels(&mut buffer).unwrap();
        assert_eq!(&buffer, b"\x12\x30\x00\x00");
    }

    #[test]
    fn decode_24bpp_implicit_alpha() {
        // 2x1 pixels: pure black, then a dark blue.
        let data = b"\x00\x00\x00\x01\x00\x00\x00\x00";
        let bitmap = Bitmap::from_pixel_buffer(2, 1, 24, data, None).unwrap();
        assert_eq!(bitmap.pixels(), &[0x0000_0000, 0xff00_0001]);
    }

    #[test]
    fn decode_32bpp_with_bitfields() {
        // A V4-style layout squeezed into a BITMAPINFOHEADER with trailing
        // masks, storing bytes as R, G, B, A.
        let mut dib = vec![0u8; 40 + 16];
        dib[0] = 40;
        dib[4] = 1; // width
        dib[8] = 1; // height
        dib[12] = 1; // planes
        dib[14] = 32; // bit count
        dib[16] = 3; // BI_BITFIELDS
        dib[40..44].copy_from_slice(&0x0000_00ffu32.to_le_bytes());
        dib[44..48].copy_from_slice(&0x0000_ff00u32.to_le_bytes());
        dib[48..52].copy_from_slice(&0x00ff_0000u32.to_le_bytes());
        dib[52..56].copy_from_slice(&0xff00_0000u32.to_le_bytes());
        dib.extend_from_slice(b"\x10\x20\x30\x80");
        let bitmap = Bitmap::from_dib(&dib, 56).unwrap();
        assert_eq!(bitmap.pixels(), &[0x8010_2030]);
    }

    // A V4/V5 header with BI_BITFIELDS masks inline; pixels are stored as
    // A, R, G, B bytes.
    fn bmp_with_inline_masks(header_len: usize, pixel: &[u8]) -> Vec<u8> {
        let pixel_offset = 14 + header_len;
        let mut data = vec![0u8; pixel_offset];
        data[0..2].copy_from_slice(b"BM");
        let file_size = (pixel_offset + pixel.len()) as u32;
        data[2..6].copy_from_slice(&file_size.to_le_bytes());
        data[10..14].copy_from_slice(&(pixel_offset as u32).to_le_bytes());
        let header = &mut data[14..];
        header[0..4].copy_from_slice(&(header_len as u32).to_le_bytes());
        header[4] = 1; // width
        header[8] = 1; // height
        header[12] = 1; // planes
        header[14] = 32; // bit count
        header[16] = 3; // BI_BITFIELDS
        header[0x28..0x2c].copy_from_slice(&0x0000_ff00u32.to_le_bytes());
        header[0x2c..0x30].copy_from_slice(&0x00ff_0000u32.to_le_bytes());
        header[0x30..0x34].copy_from_slice(&0xff00_0000u32.to_le_bytes());
        header[0x34..0x38].copy_from_slice(&0x0000_00ffu32.to_le_bytes());
        data.extend_from_slice(pixel);
        data
    }

    #[test]
    fn decode_32bpp_with_inline_masks() {
        for &header_len in &[108usize, 124] {
            let data =
                bmp_with_inline_masks(header_len, b"\x80\x11\x22\x33");
            let bitmap = Bitmap::from_file(&data).unwrap();
            assert_eq!(bitmap.bit_count(), 32);
            assert_eq!(bitmap.pixels(), &[0x8011_2233]);
        }
    }

    #[test]
    fn decode_short_color_table() {
        // An 8-bit 2x1 DIB whose header says only 3 colors are used.
        let mut dib = vec![0u8; 40];
        dib[0] = 40;
        dib[4] = 2; // width
        dib[8] = 1; // height
        dib[12] = 1; // planes
        dib[14] = 8; // bit count
        dib[32] = 3; // colors used
        dib.extend_from_slice(b"\x00\x00\x00\x00\x10\x20\x30\x00");
        dib.extend_from_slice(b"\x40\x50\x60\x00");
        dib.extend_from_slice(b"\x02\x01\x00\x00");
        let bitmap = Bitmap::from_dib(&dib, 52).unwrap();
        assert_eq!(bitmap.pixels(), &[0xff60_5040, 0xff30_2010]);
        let table = bitmap.color_table();
        assert_eq!(table.len(), 256);
        assert_eq!(&table[..4], &[0xff00_0000, 0xff30_2010, 0xff60_5040, 0]);
        assert!(table[3..].iter().all(|&color| color == 0));

        // The table must still fit in the buffer.
        dib[32] = 200;
        assert!(matches!(
            Bitmap::from_dib(&dib, 52),
            Err(IcoError::InvalidFormat(_))
        ));
    }

    #[test]
    fn round_trip_every_depth() {
        let palette = [0xff00_0000, 0xffff_0000, 0xff00_ff00, 0xff00_00ff];
        for &bit_count in &[1u16, 4, 8, 24, 32] {
            let num_colors = if bit_count == 1 { 2 } else { 4 };
            let pixels: Vec<u32> = (0..(7 * 5))
                .map(|index| {
                    let color = palette[index % num_colors];
                    if bit_count == 32 && index % 3 == 0 {
                        color & 0x7fff_ffff
                    } else if bit_count == 24 {
                        color | 0x10
                    } else {
                        color
                    }
                })
                .collect();
            let bitmap =
                Bitmap::from_pixels(7, 5, bit_count, pixels.clone()).unwrap();
            for &with_file_header in &[true, false] {
                let data = bitmap.to_bytes(with_file_header).unwrap();
                assert_eq!(data.len(), bitmap.length(with_file_header));
                let decoded = if with_file_header {
                    Bitmap::from_file(&data).unwrap()
                } else {
                    let offset = 40 + bitmap.color_table_len();
                    Bitmap::from_dib(&data, offset).unwrap()
                };
                assert_eq!(decoded.bit_count(), bit_count);
                assert_eq!(decoded.pixels(), pixels.as_slice());
            }
        }
    }

    #[test]
    fn v5_header_written_with_file_header() {
        let bitmap = Bitmap::from_pixels(1, 1, 32, vec![0x8011_2233]).unwrap();
        let data = bitmap.to_bytes(true).unwrap();
        assert_eq!(data.len(), 14 + 124 + 4);
        assert_eq!(&data[0..2], b"BM");
        assert_eq!(&data[10..14], &[138, 0, 0, 0]);
        assert_eq!(&data[14..18], &[124, 0, 0, 0]);
        assert_eq!(&data[30..34], &[3, 0, 0, 0]);
        assert_eq!(&data[54..70], b"\x00\x00\xff\x00\x00\xff\x00\x00\
                                    \xff\x00\x00\x00\x00\x00\x00\xff");
        assert_eq!(&data[138..], b"\x33\x22\x11\x80");
        let short = bitmap.to_bytes(false).unwrap();
        assert_eq!(&short[0..4], &[40, 0, 0, 0]);
        assert_eq!(&short[16..20], &[0, 0, 0, 0]);
    }

    #[test]
    fn save_bitmask_uses_predicate() {
        let pixels = vec![WHITE, BLACK, BLACK, WHITE];
        let bitmap = Bitmap::from_pixels(2, 2, 32, pixels).unwrap();
        let mut buffer = [0u8; 8];
        bitmap
            .save_bitmask(&mut buffer, |p| p & 0xffffff != 0xffffff)
            .unwrap();
        // Bottom row first: black, white; then top row: white, black.
        assert_eq!(&buffer, b"\x40\x00\x00\x00\x80\x00\x00\x00");
    }

    #[test]
    fn save_requires_exact_length() {
        let bitmap = Bitmap::from_pixels(3, 3, 8, vec![WHITE; 9]).unwrap();
        let length = bitmap.length(true);
        for &len in &[length - 1, length + 1] {
            let mut buffer = vec![0u8; len];
            match bitmap.save(&mut buffer, true) {
                Err(IcoError::LengthMismatch { expected, actual }) => {
                    assert_eq!(expected, length);
                    assert_eq!(actual, len);
                }
                other => panic!("unexpected result: {:?}", other),
            }
        }
        let mut buffer = vec![0u8; 11];
        assert!(bitmap.save_pixels(&mut buffer).is_err());
        let mut buffer = vec![0u8; 13];
        assert!(bitmap.save_bitmask(&mut buffer, |_| true).is_err());
    }

    #[test]
    fn unsupported_bit_count() {
        match Bitmap::from_pixels(0, 0, 25, Vec::new()) {
            Err(IcoError::UnsupportedFormat(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        match Bitmap::from_pixel_buffer(1, 1, 25, &[0; 4], None) {
            Err(IcoError::UnsupportedFormat(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        let mut data = BMP_1BPP.to_vec();
        data[14 + 14] = 2;
        match Bitmap::from_file(&data) {
            Err(IcoError::UnsupportedFormat(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn invalid_dimensions() {
        for &(width, height) in &[(0, 1), (1, 0)] {
            match Bitmap::from_pixels(width, height, 24, Vec::new()) {
                Err(IcoError::ArgumentOutOfRange(_)) => {}
                other => panic!("unexpected result: {:?}", other),
            }
        }
        match Bitmap::from_pixels(96, 64, 8, vec![0; 96 * 64 - 1]) {
            Err(IcoError::ArgumentOutOfRange(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        match Bitmap::from_pixels(96, 64, 8, vec![0; 96 * 64 + 1]) {
            Err(IcoError::ArgumentOutOfRange(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn oversized_dimensions() {
        let max = u32::MAX;
        assert!(matches!(
            Bitmap::from_pixels(max, max, 32, Vec::new()),
            Err(IcoError::ArgumentOutOfRange(_))
        ));
        assert!(matches!(
            Bitmap::from_pixel_buffer(max, max, 32, &[], None),
            Err(IcoError::ArgumentOutOfRange(_))
        ));
        let too_wide = i32::MAX as u32 + 1;
        assert!(matches!(
            Bitmap::from_pixels(too_wide, 1, 1, Vec::new()),
            Err(IcoError::ArgumentOutOfRange(_))
        ));
        assert!(matches!(
            Bitmap::from_pixels(1, too_wide, 1, Vec::new()),
            Err(IcoError::ArgumentOutOfRange(_))
        ));
        assert!(image_length(max, max, 32, true) > (max as usize));
    }

    #[test]
    fn indexed_bitmap_requires_color_table() {
        for &bit_count in &[1u16, 4, 8] {
            let buffer = [0u8; 1024];
            let result =
                Bitmap::from_pixel_buffer(16, 16, bit_count, &buffer, None);
            assert!(matches!(result, Err(IcoError::ArgumentOutOfRange(_))));
            let result = Bitmap::from_pixel_buffer(
                16,
                16,
                bit_count,
                &buffer,
                Some(&[]),
            );
            assert!(matches!(result, Err(IcoError::ArgumentOutOfRange(_))));
        }
    }

    #[test]
    fn too_many_colors_for_depth() {
        let pixels = vec![1, 2, 3, 4];
        assert!(matches!(
            Bitmap::from_pixels(2, 2, 1, pixels),
            Err(IcoError::ArgumentOutOfRange(_))
        ));
    }

    #[test]
    fn short_pixel_buffer() {
        assert!(matches!(
            Bitmap::from_pixel_buffer(4, 4, 24, &[0; 47], None),
            Err(IcoError::ArgumentOutOfRange(_))
        ));
    }

    #[test]
    fn not_a_bmp_file() {
        let png = b"\x89PNG\r\n\x1a\n\x00\x00\x00\x0dIHDR\x00\x00\x00\x01";
        assert!(matches!(
            Bitmap::from_file(png),
            Err(IcoError::InvalidFormat(_))
        ));
        let mut data = BMP_1BPP.to_vec();
        data.push(0);
        assert!(matches!(
            Bitmap::from_file(&data),
            Err(IcoError::InvalidFormat(_))
        ));
    }

    #[test]
    fn rle_compression_is_unsupported() {
        let mut data = BMP_1BPP.to_vec();
        data[14 + 16] = 1; // BI_RLE8
        assert!(matches!(
            Bitmap::from_file(&data),
            Err(IcoError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn pixel_offset_out_of_range() {
        assert!(matches!(
            Bitmap::from_dib(&[0u8; 10], 10),
            Err(IcoError::ArgumentOutOfRange(_))
        ));
    }
}

//===========================================================================//
