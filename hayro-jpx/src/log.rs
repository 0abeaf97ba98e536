//! Internal logging macros.
//!
//! With the `logging` feature, messages go to the `log` crate. Without it,
//! the arguments are still type-checked through `format_args!` but nothing
//! is formatted or emitted.

macro_rules! ltrace {
    ($($arg:tt)+) => {{
        #[cfg(feature = "logging")]
        ::log::trace!($($arg)+);
        #[cfg(not(feature = "logging"))]
        let _ = format_args!($($arg)+);
    }};
}

macro_rules! ldebug {
    ($($arg:tt)+) => {{
        #[cfg(feature = "logging")]
        ::log::debug!($($arg)+);
        #[cfg(not(feature = "logging"))]
        let _ = format_args!($($arg)+);
    }};
}

macro_rules! lwarn {
    ($($arg:tt)+) => {{
        #[cfg(feature = "logging")]
        ::log::warn!($($arg)+);
        #[cfg(not(feature = "logging"))]
        let _ = format_args!($($arg)+);
    }};
}
