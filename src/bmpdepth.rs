#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

//===========================================================================//

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub(crate) enum BmpDepth {
    One,
    Four,
    Eight,
    TwentyFour,
    ThirtyTwo,
}

impl BmpDepth {
    pub(crate) fn from_bit_count(bit_count: u16) -> Option<BmpDepth> {
        match bit_count {
            1 => Some(BmpDepth::One),
            4 => Some(BmpDepth::Four),
            8 => Some(BmpDepth::Eight),
            24 => Some(BmpDepth::TwentyFour),
            32 => Some(BmpDepth::ThirtyTwo),
            _ => None,
        }
    }

    pub(crate) fn bit_count(&self) -> u16 {
        match *self {
            BmpDepth::One => 1,
            BmpDepth::Four => 4,
            BmpDepth::Eight => 8,
            BmpDepth::TwentyFour => 24,
            BmpDepth::ThirtyTwo => 32,
        }
    }

    /// Indexed depths store palette indices rather than colors.
    pub(crate) fn is_indexed(&self) -> bool {
        self.bit_count() <= 8
    }

    /// The number of entries in a full color table at this depth.
    pub(crate) fn num_colors(&self) -> usize {
        match *self {
            BmpDepth::One => 2,
            BmpDepth::Four => 16,
            BmpDepth::Eight => 256,
            BmpDepth::TwentyFour | BmpDepth::ThirtyTwo => 0,
        }
    }

    pub(crate) fn color_table_len(&self) -> usize {
        4 * self.num_colors()
    }
}

//===========================================================================//


//===========================================================================//
