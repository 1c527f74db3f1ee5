use crate::bitmap::{
    self, is_supported_header_len, Bitmap, BI_BITFIELDS, BI_RGB,
    HEADER_COLORS_USED, HEADER_COMPRESSION, HEADER_HEIGHT, HEADER_IMAGE_SIZE,
    INFO_HEADER_LEN,
};
use crate::bmpdepth::BmpDepth;
use crate::error::{check_length, IcoError, Result};
use byteorder::{ByteOrder, LittleEndian};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::io::Read;

//===========================================================================//

// Color table for the AND mask of an ICO entry: a 0 bit keeps the XOR pixel
// and a 1 bit marks it transparent.
const AND_MASK_COLORS: &[u32] = &[0x0000_0000, 0x00ff_ffff];

// A BITMAPINFOHEADER with BI_BITFIELDS compression is followed by red,
// green, and blue channel masks.
const TRAILING_MASKS_LEN: usize = 12;

// Pixel values for masks derived from an alpha channel.
const MASK_TRANSPARENT: u32 = 0xffff_ffff;
const MASK_OPAQUE: u32 = 0xff00_0000;

const RGB_MASK: u32 = 0x00ff_ffff;

//===========================================================================//

/// An ICO frame stored as a classic bitmap: a color (XOR) bitmap of any
/// supported depth plus a 1-bit transparency (AND) mask.
///
/// The 32-bit ARGB composite and standalone BMP encodings of all three
/// images are computed once, when the frame is constructed.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct IcoBitmapFrame {
    original_image: Bitmap,
    mask_image: Bitmap,
    image: Bitmap,
    image_data: Vec<u8>,
    original_image_data: Vec<u8>,
    mask_image_data: Vec<u8>,
}

impl IcoBitmapFrame {
    /// Builds a frame from a standalone BMP file and, optionally, a BMP file
    /// to use as its mask (white pixels transparent, anything else opaque).
    ///
    /// The mask may only be omitted for 32-bit images, in which case it is
    /// derived from the alpha channel; otherwise this returns
    /// `IcoError::MissingMask`.
    pub fn create_from_images(
        image_data: &[u8],
        mask_data: Option<&[u8]>,
    ) -> Result<IcoBitmapFrame> {
        if !Bitmap::is_supported(image_data, image_data.len()) {
            invalid_format!("Image is not a supported BMP file");
        }
        let (_, _, bit_count) = Bitmap::parse_size(image_data)?;
        if bit_count < 32 && mask_data.is_none() {
            return Err(IcoError::MissingMask);
        }
        let original_image = Bitmap::from_file(image_data)?;
        let mask_image = match mask_data {
            Some(mask_data) => Bitmap::from_file(mask_data)?,
            None => generate_mask(&original_image)?,
        };
        IcoBitmapFrame::new(original_image, mask_image)
    }

    /// Like `create_from_images`, but reads the BMP files from streams.
    pub fn read_from_images<R: Read>(
        mut image_reader: R,
        mask_reader: Option<R>,
    ) -> Result<IcoBitmapFrame> {
        let mut image_data = Vec::new();
        image_reader.read_to_end(&mut image_data)?;
        let mask_data = match mask_reader {
            Some(mut reader) => {
                let mut data = Vec::new();
                reader.read_to_end(&mut data)?;
                Some(data)
            }
            None => None,
        };
        IcoBitmapFrame::create_from_images(&image_data, mask_data.as_deref())
    }

    /// Decodes the bitmap payload of an ICO directory entry: a bitmap header
    /// whose height counts both masks, then the color table, the XOR pixel
    /// data, and the AND mask.
    pub fn load_from_ico_entry(entry: &[u8]) -> Result<IcoBitmapFrame> {
        if entry.len() < INFO_HEADER_LEN {
            invalid_format!(
                "ICO bitmap entry too short (was {} bytes)",
                entry.len()
            );
        }
        let header_len = LittleEndian::read_u32(entry);
        if !is_supported_header_len(header_len) {
            unsupported!("Unsupported BMP header size ({})", header_len);
        }
        let header_len = header_len as usize;
        if entry.len() < header_len {
            invalid_format!("ICO bitmap entry header truncated");
        }
        let (width, stored_height, bit_count) = Bitmap::parse_size(entry)?;
        if stored_height % 2 != 0 {
            // The height is stored doubled, counting the rows of both the
            // XOR and AND masks, so it should be divisible by 2.
            invalid_format!(
                "Invalid height field in BMP header \
                 (was {}, but must be divisible by 2)",
                stored_height
            );
        }
        let height = stored_height / 2;
        let depth = match BmpDepth::from_bit_count(bit_count) {
            Some(depth) => depth,
            None => unsupported!("Unsupported bit count ({})", bit_count),
        };
        let compression = LittleEndian::read_u32(&entry[HEADER_COMPRESSION..]);
        if compression != BI_RGB && compression != BI_BITFIELDS {
            unsupported!("Unsupported BMP compression ({})", compression);
        }
        // Entries always store standard BGR(A) pixels, so trailing channel
        // masks are skipped rather than applied.
        let table_start = if compression == BI_BITFIELDS
            && header_len == INFO_HEADER_LEN
            && !depth.is_indexed()
        {
            header_len + TRAILING_MASKS_LEN
        } else {
            header_len
        };

        let colors_used =
            LittleEndian::read_u32(&entry[HEADER_COLORS_USED..]) as usize;
        let num_colors = if colors_used == 0 {
            depth.num_colors()
        } else {
            colors_used
        };
        if depth.is_indexed() && num_colors > depth.num_colors() {
            invalid_format!(
                "Too many colors for {}-bit bitmap ({})",
                bit_count,
                num_colors
            );
        }
        let table_end =
            table_start.saturating_add(num_colors.saturating_mul(4));
        let xor_len =
            bitmap::stride(width, bit_count).saturating_mul(height as usize);
        let and_len = bitmap::stride(width, 1).saturating_mul(height as usize);
        let xor_end = table_end.saturating_add(xor_len);
        if xor_end > entry.len() {
            invalid_format!(
                "ICO bitmap entry truncated \
                 (was {} bytes, but {}x{} at {} bpp \
                 needs at least {})",
                entry.len(),
                width,
                height,
                bit_count,
                xor_end
            );
        }

        let color_table = if depth.is_indexed() {
            Some(Bitmap::parse_color_table(&entry[table_start..table_end]))
        } else {
            None
        };
        let original_image = Bitmap::from_pixel_buffer(
            width,
            height,
            bit_count,
            &entry[table_end..xor_end],
            color_table.as_deref(),
        )?;
        let and_end = xor_end.saturating_add(and_len);
        let mask_image = if and_end <= entry.len() {
            Bitmap::from_pixel_buffer(
                width,
                height,
                1,
                &entry[xor_end..and_end],
                Some(AND_MASK_COLORS),
            )?
        } else if depth == BmpDepth::ThirtyTwo {
            log::warn!(
                "{}x{} 32-bit ICO entry has no AND mask; \
                 deriving one from alpha",
                width,
                height
            );
            generate_mask(&original_image)?
        } else {
            invalid_format!(
                "ICO bitmap entry AND mask truncated (was {} bytes, but must \
                 be {})",
                entry.len(),
                and_end
            );
        };
        IcoBitmapFrame::new(original_image, mask_image)
    }

    fn new(
        original_image: Bitmap,
        mask_image: Bitmap,
    ) -> Result<IcoBitmapFrame> {
        if mask_image.width() != original_image.width()
            || mask_image.height() != original_image.height()
        {
            out_of_range!(
                "Mask size ({}x{}) doesn't match image size ({}x{})",
                mask_image.width(),
                mask_image.height(),
                original_image.width(),
                original_image.height()
            );
        }
        let image = generate_image(&original_image, &mask_image)?;
        let image_data = image.to_bytes(true)?;
        let original_image_data = original_image.to_bytes(true)?;
        let mask_image_data = mask_image.to_bytes(true)?;
        Ok(IcoBitmapFrame {
            original_image,
            mask_image,
            image,
            image_data,
            original_image_data,
            mask_image_data,
        })
    }

    /// Returns the width of the frame, in pixels.
    pub fn width(&self) -> u32 {
        self.original_image.width()
    }

    /// Returns the height of the frame, in pixels.
    pub fn height(&self) -> u32 {
        self.original_image.height()
    }

    /// Returns the bits-per-pixel of the color bitmap.
    pub fn bit_count(&self) -> u16 {
        self.original_image.bit_count()
    }

    /// Returns the number of bytes this frame occupies inside an ICO file.
    pub fn frame_length(&self) -> usize {
        self.original_image.length(false)
            + bitmap::stride(self.width(), 1) * (self.height() as usize)
    }

    /// Returns the 32-bit composite of the color bitmap and its mask.
    pub fn image(&self) -> &Bitmap {
        &self.image
    }

    /// Returns the composite image encoded as a standalone 32-bit BMP file.
    pub fn image_data(&self) -> &[u8] {
        &self.image_data
    }

    /// Returns the color bitmap, at its original depth.
    pub fn original_image(&self) -> &Bitmap {
        &self.original_image
    }

    /// Returns the color bitmap encoded as a standalone BMP file.
    pub fn original_image_data(&self) -> &[u8] {
        &self.original_image_data
    }

    /// Returns the mask bitmap, in which white pixels are transparent.
    pub fn mask_image(&self) -> &Bitmap {
        &self.mask_image
    }

    /// Returns the mask bitmap encoded as a standalone BMP file.
    pub fn mask_image_data(&self) -> &[u8] {
        &self.mask_image_data
    }

    /// Encodes the frame as an ICO entry payload into `buffer`, which must be
    /// exactly `self.frame_length()` bytes long.
    ///
    /// The color bitmap is written first, without a file header, then the
    /// AND mask.  Afterwards the height field (offset 0x08) is patched to
    /// twice the real height and the image size field (offset 0x14) to the
    /// size of the color table plus both masks.
    pub fn save_frame(&self, buffer: &mut [u8]) -> Result<()> {
        check_length(self.frame_length(), buffer.len())?;
        let xor_len = self.original_image.length(false);
        let (xor, and) = buffer.split_at_mut(xor_len);
        self.original_image.save(xor, false)?;
        self.mask_image
            .save_bitmask(and, |pixel| pixel & RGB_MASK != RGB_MASK)?;
        let height = self.height() as usize;
        let image_size = self.original_image.color_table_len()
            + self.original_image.stride() * height
            + bitmap::stride(self.width(), 1) * height;
        LittleEndian::write_i32(
            &mut buffer[HEADER_HEIGHT..],
            2 * height as i32,
        );
        LittleEndian::write_u32(
            &mut buffer[HEADER_IMAGE_SIZE..],
            image_size as u32,
        );
        Ok(())
    }

    /// Encodes the frame as an ICO entry payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut data = vec![0u8; self.frame_length()];
        self.save_frame(&mut data)?;
        Ok(data)
    }
}

//===========================================================================//

// For 32-bit images the alpha channel wins and the mask is ignored.
fn generate_image(image: &Bitmap, mask: &Bitmap) -> Result<Bitmap> {
    if image.bit_count() == 32 {
        return Ok(image.clone());
    }
    let pixels = image
        .pixels()
        .iter()
        .zip(mask.pixels().iter())
        .map(|(&pixel, &mask)| {
            if mask & RGB_MASK == RGB_MASK {
                0
            } else {
                pixel
            }
        })
        .collect();
    Bitmap::from_pixels(image.width(), image.height(), 32, pixels)
}

fn generate_mask(image: &Bitmap) -> Result<Bitmap> {
    let pixels = image
        .pixels()
        .iter()
        .map(|&pixel| {
            if (pixel >> 24) < 0xff {
                MASK_TRANSPARENT
            } else {
                MASK_OPAQUE
            }
        })
        .collect();
    Bitmap::from_pixels(image.width(), image.height(), 1, pixels)
}

//===========================================================================//


//===========================================================================//
