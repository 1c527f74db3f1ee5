//! Just enough PNG support to frame a PNG stream inside an ICO file.

use crate::error::Result;
use byteorder::{BigEndian, ByteOrder};

//===========================================================================//

// The signature that all PNG files start with.
const PNG_SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

// The chunk header of the IHDR chunk, which must come first and always
// carries 13 bytes of data.
const IHDR_CHUNK_HEADER: &[u8; 8] = b"\x00\x00\x00\x0dIHDR";

const IHDR_WIDTH: usize = 16;
const IHDR_HEIGHT: usize = 20;

//===========================================================================//

/// Returns true if `data` starts with the PNG signature followed by the
/// header of an IHDR chunk.  No CRCs or later chunks are checked.
pub fn is_supported(data: &[u8]) -> bool {
    data.len() >= 16
        && &data[0..8] == PNG_SIGNATURE
        && &data[8..16] == IHDR_CHUNK_HEADER
}

/// Reads the width and height out of the IHDR chunk.  Returns an error if
/// `data` isn't a supported PNG or is too short to hold the dimensions.
pub fn parse_size(data: &[u8]) -> Result<(u32, u32)> {
    if !is_supported(data) {
        invalid_format!("Missing PNG signature or IHDR chunk");
    }
    if data.len() < IHDR_HEIGHT + 4 {
        invalid_format!(
            "PNG data too short to hold IHDR size (was {} bytes)",
            data.len()
        );
    }
    // Unlike the rest of an ICO file, PNG integers are big-endian.
    let width = BigEndian::read_u32(&data[IHDR_WIDTH..]);
    let height = BigEndian::read_u32(&data[IHDR_HEIGHT..]);
    Ok((width, height))
}

//===========================================================================//

#[cfg(test)]
mod tests {
    use super::{is_supported, parse_size};
    use crate::error::IcoError;

    const HEADER: &[u8] = b"\
        \x89\x50\x4e\x47\x0d\x0a\x1a\x0a\x00\x00\x00\x0d\x49\x48\x44\x52\
        \x00\x00\x00\x60\x00\x00\x00\x40\x08\x06\x00\x00\x00";

    #[test]
    fn sniff_png_header() {
        assert!(is_supported(HEADER));
        assert!(is_supported(&HEADER[..16]));
    }

    #[test]
    fn reject_short_buffers() {
        for len in 0..16 {
            assert!(!is_supported(&HEADER[..len]));
        }
    }

    #[test]
    fn reject_bmp_header() {
        let input = b"BM\x46\x00\x00\x00\x00\x00\x00\x00\x36\x00\x00\x00\
                      \x28\x00\x00\x00";
        assert!(!is_supported(input));
    }

    #[test]
    fn reject_wrong_first_chunk() {
        let mut input = HEADER.to_vec();
        input[12..16].copy_from_slice(b"IDAT");
        assert!(!is_supported(&input));
        let mut input = HEADER.to_vec();
        input[11] = 0x0e;
        assert!(!is_supported(&input));
    }

    #[test]
    fn parse_png_size() {
        assert_eq!(parse_size(HEADER).unwrap(), (96, 64));
    }

    #[test]
    fn parse_size_of_truncated_png() {
        match parse_size(&HEADER[..20]) {
            Err(IcoError::InvalidFormat(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }
}

//===========================================================================//
