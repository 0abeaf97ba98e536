//! Error types for JPX decoding.

use core::fmt;

/// The main error type for JPX decoding operations.
///
/// Every error of this type aborts decoding of the current image. Conditions
/// the decoder can recover from are reported through a
/// [`DiagnosticSink`](crate::DiagnosticSink) instead and only downgrade the
/// [`DecodeStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Errors related to the JP2 box structure.
    Format(FormatError),
    /// Errors related to codestream markers.
    Marker(MarkerError),
    /// Errors related to tile and tile-part processing.
    Tile(TileError),
    /// Errors related to image geometry and coding parameters.
    Validation(ValidationError),
    /// Errors related to packet and code-block decoding.
    Decoding(DecodingError),
    /// Errors related to component handling.
    Color(ColorError),
}

/// Errors related to the JP2 box structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    /// A box header could not be read.
    InvalidBox,
    /// A box ended before its declared length.
    TruncatedBox,
    /// No contiguous codestream was found.
    MissingCodestream,
    /// The image header declares a compression type other than 7.
    UnsupportedCompression,
    /// A box that depends on the image header appeared before it.
    MissingImageHeader,
    /// The bits per component box doesn't match the image header.
    InvalidBitsPerComponent,
    /// The colour specification box is malformed.
    InvalidColourSpecification,
    /// The palette box is malformed.
    InvalidPalette,
    /// The component mapping box is malformed.
    InvalidComponentMapping,
    /// The channel definition box is malformed.
    InvalidChannelDefinition,
}

/// Errors related to codestream markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerError {
    /// Missing a required marker.
    Missing(&'static str),
    /// A marker that may only appear once appeared again.
    Duplicate(&'static str),
    /// A marker appeared at a position where it is not allowed.
    Misplaced(&'static str),
    /// Failed to read or parse a marker.
    ParseFailure(&'static str),
}

/// Errors related to tile and tile-part processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileError {
    /// Invalid tile index in tile-part header.
    InvalidIndex,
    /// Tile-parts of a tile arrived out of order.
    InvalidTilePartIndex,
    /// The declared tile-part length is smaller than its header.
    InvalidTilePartLength,
    /// A tile never received any tile-part.
    Uninitialized,
    /// A tile-component has an empty area at the requested reduction.
    EmptyComponent,
}

/// Errors related to image geometry and coding parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// Invalid image dimensions.
    InvalidDimensions,
    /// Image dimensions exceed supported limits.
    ImageTooLarge,
    /// Invalid tile sizes or offsets.
    InvalidTiling,
    /// Invalid component metadata.
    InvalidComponentMetadata,
    /// The component precision is not supported.
    UnsupportedPrecision,
    /// The image header and the codestream disagree on the number of components.
    ComponentCountMismatch,
    /// A component index is out of range.
    InvalidComponentIndex,
    /// Invalid progression order.
    InvalidProgressionOrder,
    /// Invalid transformation type.
    InvalidTransformation,
    /// Invalid number of decomposition levels.
    InvalidDecompositionLevels,
    /// Invalid number of quality layers.
    InvalidLayerCount,
    /// Invalid code-block dimensions.
    InvalidCodeBlockSize,
    /// Invalid precinct dimensions.
    InvalidPrecinctSize,
    /// Invalid quantization style.
    InvalidQuantizationStyle,
    /// Not enough quantization step sizes for the number of subbands.
    InsufficientStepSizes,
}

/// Errors related to packet and code-block decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodingError {
    /// Unexpected end of data.
    UnexpectedEof,
    /// A packet extends beyond the end of its tile-part.
    PacketOverrun,
    /// A code-block contains too many coding passes.
    TooManyCodingPasses,
    /// A code-block signals more zero bit-planes than it has.
    InvalidBitplaneCount,
    /// The length of a codeword segment doesn't fit into 32 bits.
    InvalidSegmentLength,
}

/// Errors related to component handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorError {
    /// Multi-component transform failed.
    Mct,
}

/// The outcome of a decoding run.
///
/// The variants are ordered by severity, so combining two statuses keeps the
/// worse one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum DecodeStatus {
    /// The image was decoded without problems.
    #[default]
    Ok,
    /// The image was decoded, but parts of it may be damaged.
    NonFatal,
    /// The image couldn't be decoded.
    Fatal,
}

impl DecodeStatus {
    /// Combine two statuses, keeping the more severe one.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        self.max(other)
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Format(e) => write!(f, "{e}"),
            Self::Marker(e) => write!(f, "{e}"),
            Self::Tile(e) => write!(f, "{e}"),
            Self::Validation(e) => write!(f, "{e}"),
            Self::Decoding(e) => write!(f, "{e}"),
            Self::Color(e) => write!(f, "{e}"),
        }
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBox => write!(f, "invalid JP2 box"),
            Self::TruncatedBox => write!(f, "unexpected end of JP2 box"),
            Self::MissingCodestream => write!(f, "missing codestream data"),
            Self::UnsupportedCompression => write!(f, "unknown compression type"),
            Self::MissingImageHeader => write!(f, "box appeared before the image header"),
            Self::InvalidBitsPerComponent => write!(f, "invalid bits per component box"),
            Self::InvalidColourSpecification => write!(f, "invalid colour specification box"),
            Self::InvalidPalette => write!(f, "invalid palette box"),
            Self::InvalidComponentMapping => write!(f, "invalid component mapping box"),
            Self::InvalidChannelDefinition => write!(f, "invalid channel definition box"),
        }
    }
}

impl fmt::Display for MarkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(marker) => write!(f, "missing {marker} marker"),
            Self::Duplicate(marker) => write!(f, "duplicate {marker} marker"),
            Self::Misplaced(marker) => write!(f, "{marker} marker in invalid position"),
            Self::ParseFailure(marker) => write!(f, "failed to parse {marker} marker"),
        }
    }
}

impl fmt::Display for TileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidIndex => write!(f, "invalid tile index in tile-part header"),
            Self::InvalidTilePartIndex => write!(f, "invalid tile-part index"),
            Self::InvalidTilePartLength => write!(f, "invalid tile-part length"),
            Self::Uninitialized => write!(f, "tile was never initialized"),
            Self::EmptyComponent => write!(f, "tile-component has an empty area"),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDimensions => write!(f, "invalid image dimensions"),
            Self::ImageTooLarge => write!(f, "image is too large"),
            Self::InvalidTiling => write!(f, "invalid tile size or offset"),
            Self::InvalidComponentMetadata => write!(f, "invalid component metadata"),
            Self::UnsupportedPrecision => write!(f, "unsupported component precision"),
            Self::ComponentCountMismatch => {
                write!(f, "number of components doesn't match the image header")
            }
            Self::InvalidComponentIndex => write!(f, "invalid component index"),
            Self::InvalidProgressionOrder => write!(f, "invalid progression order"),
            Self::InvalidTransformation => write!(f, "invalid transformation type"),
            Self::InvalidDecompositionLevels => {
                write!(f, "invalid number of decomposition levels")
            }
            Self::InvalidLayerCount => write!(f, "invalid number of quality layers"),
            Self::InvalidCodeBlockSize => write!(f, "invalid code-block size"),
            Self::InvalidPrecinctSize => write!(f, "invalid precinct size"),
            Self::InvalidQuantizationStyle => write!(f, "invalid quantization style"),
            Self::InsufficientStepSizes => {
                write!(f, "not enough quantization step sizes")
            }
        }
    }
}

impl fmt::Display for DecodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of data"),
            Self::PacketOverrun => write!(f, "packet extends beyond its tile-part"),
            Self::TooManyCodingPasses => {
                write!(f, "code-block contains too many coding passes")
            }
            Self::InvalidBitplaneCount => write!(f, "invalid number of bitplanes"),
            Self::InvalidSegmentLength => write!(f, "invalid codeword segment length"),
        }
    }
}

impl fmt::Display for ColorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mct => write!(f, "multi-component transform failed"),
        }
    }
}

impl fmt::Display for DecodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::NonFatal => write!(f, "non-fatal error"),
            Self::Fatal => write!(f, "fatal error"),
        }
    }
}

impl std::error::Error for DecodeError {}
impl std::error::Error for FormatError {}
impl std::error::Error for MarkerError {}
impl std::error::Error for TileError {}
impl std::error::Error for ValidationError {}
impl std::error::Error for DecodingError {}
impl std::error::Error for ColorError {}

impl From<FormatError> for DecodeError {
    fn from(e: FormatError) -> Self {
        Self::Format(e)
    }
}

impl From<MarkerError> for DecodeError {
    fn from(e: MarkerError) -> Self {
        Self::Marker(e)
    }
}

impl From<TileError> for DecodeError {
    fn from(e: TileError) -> Self {
        Self::Tile(e)
    }
}

impl From<ValidationError> for DecodeError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<DecodingError> for DecodeError {
    fn from(e: DecodingError) -> Self {
        Self::Decoding(e)
    }
}

impl From<ColorError> for DecodeError {
    fn from(e: ColorError) -> Self {
        Self::Color(e)
    }
}

/// Result type for JPX decoding operations.
pub type Result<T> = core::result::Result<T, DecodeError>;

macro_rules! bail {
    ($err:expr) => {
        return Err($err.into())
    };
}

macro_rules! err {
    ($err:expr) => {
        Err($err.into())
    };
}

pub(crate) use bail;
pub(crate) use err;
