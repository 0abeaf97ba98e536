/*!
A memory-safe, pure-Rust JPEG 2000 decoder with a pull-based pixel stream.

`hayro-jpx` decodes JP2/JPX files and naked JPEG 2000 codestreams as
specified in ITU-T T.800 (ISO/IEC 15444-1). The image is read from a
[`ByteSource`], fully reconstructed on the first request for pixel data and
then handed out byte by byte through [`JpxStream::get_char`], in the layout
PDF image streams use: pixels in raster order, the samples of all components
of a pixel in a row, every row padded to a byte boundary.

Damaged files are decoded as far as possible. Recoverable problems are
reported to a [`DiagnosticSink`] and downgrade the [`DecodeStatus`] of the
image instead of aborting.

# Example
```rust,no_run
use hayro_jpx::{DecodeSettings, DecodeStatus, JpxStream, SliceSource};

let data = std::fs::read("image.jp2").unwrap();
let mut stream = JpxStream::new(SliceSource::new(&data), DecodeSettings::default());

if stream.decode() != DecodeStatus::Fatal {
    let mut pixels = vec![];

    while let Some(byte) = stream.get_char() {
        pixels.push(byte);
    }

    println!("{}x{} image", stream.width().unwrap(), stream.height().unwrap());
}
```

# Cargo features
- `image` (default): a [`JpxDecoder`] for the `image` crate.
- `logging`: log diagnostics through the `log` crate.

# Safety
This crate forbids unsafe code via a crate-level attribute.
*/

#![forbid(unsafe_code)]

#[macro_use]
mod log;

mod diagnostics;
mod error;
#[cfg(feature = "image")]
mod integration;
mod j2c;
mod jp2;
mod reader;
mod source;
mod stream;

pub use diagnostics::{CollectingSink, DiagnosticSink, LogSink, Report, Severity};
pub use error::{
    ColorError, DecodeError, DecodeStatus, DecodingError, FormatError, MarkerError, Result,
    TileError, ValidationError,
};
#[cfg(feature = "image")]
pub use integration::JpxDecoder;
pub use jp2::params::{ColorSpaceMode, ImageParams};
pub use source::{ByteSource, ReadSource, SliceSource};
pub use stream::JpxStream;

/// Settings that apply to decoding a JPEG 2000 image.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecodeSettings {
    /// The number of highest resolution levels to discard. Each level halves
    /// the width and height of the decoded image, rounding up.
    ///
    /// Every tile-component must have at least this many decomposition
    /// levels.
    pub reduction: u8,
    /// Whether problems that would normally only damage the image, like a
    /// missing EOC marker or a corrupt packet, abort decoding instead.
    pub strict: bool,
}
