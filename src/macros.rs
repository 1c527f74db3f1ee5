//===========================================================================//

macro_rules! invalid_format {
    ($e:expr) => {
        return Err($crate::error::IcoError::InvalidFormat(($e).to_string()))
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::error::IcoError::InvalidFormat(
            format!($fmt, $($arg)+)))
    };
}

macro_rules! unsupported {
    ($e:expr) => {
        return Err($crate::error::IcoError::UnsupportedFormat(
            ($e).to_string()))
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::error::IcoError::UnsupportedFormat(
            format!($fmt, $($arg)+)))
    };
}

macro_rules! out_of_range {
    ($e:expr) => {
        return Err($crate::error::IcoError::ArgumentOutOfRange(
            ($e).to_string()))
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::error::IcoError::ArgumentOutOfRange(
            format!($fmt, $($arg)+)))
    };
}

macro_rules! invalid_directory {
    ($e:expr) => {
        return Err($crate::error::IcoError::InvalidDirectory(
            ($e).to_string()))
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::error::IcoError::InvalidDirectory(
            format!($fmt, $($arg)+)))
    };
}

//===========================================================================//
