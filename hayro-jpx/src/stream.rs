//! The pixel stream.
//!
//! [`JpxStream`] decodes the image the first time a byte is requested and
//! then walks the reconstructed samples in raster order. For every pixel, the
//! samples of all components are emitted in order. Components with a
//! precision of 8 take up one byte, all others are packed MSB-first with
//! their exact precision, and every row is padded to a byte boundary.

use crate::DecodeSettings;
use crate::diagnostics::{DiagnosticSink, LogSink, Severity};
use crate::error::DecodeStatus;
use crate::j2c::{DecodedCodestream, ceil_shr};
use crate::jp2::params::{self, ImageParams};
use crate::jp2::{self, DecodedImage};
use crate::reader::Reader;
use crate::source::ByteSource;

/// A JPEG 2000 image, read as a stream of packed pixel bytes.
pub struct JpxStream<S: ByteSource, D: DiagnosticSink = LogSink> {
    source: S,
    sink: D,
    settings: DecodeSettings,
    image: Option<DecodedImage>,
    /// `None` until the image was decoded.
    status: Option<DecodeStatus>,
    closed: bool,
    walk: PixelWalk,
}

impl<S: ByteSource> JpxStream<S> {
    /// Create a stream that reports problems to the `log` crate.
    pub fn new(source: S, settings: DecodeSettings) -> Self {
        Self::with_sink(source, LogSink, settings)
    }
}

impl<S: ByteSource, D: DiagnosticSink> JpxStream<S, D> {
    /// Create a stream that reports problems to the given sink.
    pub fn with_sink(source: S, sink: D, settings: DecodeSettings) -> Self {
        Self {
            source,
            sink,
            settings,
            image: None,
            status: None,
            closed: false,
            walk: PixelWalk::default(),
        }
    }

    /// Decode the image, if that didn't happen yet, and return the outcome.
    ///
    /// With a `Fatal` status, the stream is empty.
    pub fn decode(&mut self) -> DecodeStatus {
        if let Some(status) = self.status {
            return status;
        }

        if self.closed {
            return DecodeStatus::Fatal;
        }

        self.source.reset();

        let result = {
            let mut reader = Reader::new(&mut self.source, &mut self.sink);
            let result = jp2::read(&mut reader, &self.settings);

            if let Err(e) = &result {
                reader.report(Severity::SyntaxError, format_args!("{e}"));
            }

            result
        };

        let status = match result {
            Ok(image) => {
                self.walk = PixelWalk::new(&image.codestream, self.settings.reduction);
                let status = image.status;
                self.image = Some(image);

                status
            }
            Err(_) => {
                self.walk = PixelWalk::default();

                DecodeStatus::Fatal
            }
        };

        ldebug!("decoded JPX image with status {status}");

        self.status = Some(status);

        status
    }

    /// Read the next byte of pixel data.
    pub fn get_char(&mut self) -> Option<u8> {
        self.next_byte(true)
    }

    /// Return the next byte of pixel data without consuming it.
    pub fn look_char(&mut self) -> Option<u8> {
        self.next_byte(false)
    }

    fn next_byte(&mut self, consume: bool) -> Option<u8> {
        self.decode();

        if self.walk.read_buf_len < 8 {
            if let Some(image) = &self.image {
                self.walk.fill(&image.codestream);
            }
        }

        self.walk.take_byte(consume)
    }

    /// Restart the pixel data from the first byte.
    ///
    /// The image is not decoded again. Before the first read and after
    /// closing, this does nothing.
    pub fn reset(&mut self) {
        if let Some(image) = &self.image {
            self.walk = PixelWalk::new(&image.codestream, self.settings.reduction);
        }
    }

    /// Release the decoded image and close the source. Closing a closed
    /// stream does nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }

        self.closed = true;
        self.image = None;
        self.walk = PixelWalk::default();
        self.source.close();
    }

    /// The outcome of decoding, or `None` if the image wasn't decoded yet.
    pub fn status(&self) -> Option<DecodeStatus> {
        self.status
    }

    /// Determine the depth and colour space of the image from its headers,
    /// without decoding it.
    pub fn image_params(&mut self) -> ImageParams {
        if self.closed {
            return ImageParams::default();
        }

        self.source.reset();

        let params = {
            let mut reader = Reader::new(&mut self.source, &mut self.sink);
            params::read_image_params(&mut reader)
        };

        self.source.reset();

        params
    }

    /// The number of pixels per row, once decoded.
    pub fn width(&self) -> Option<u32> {
        self.image.as_ref().map(|_| self.walk.x_end - self.walk.x_start)
    }

    /// The number of rows, once decoded.
    pub fn height(&self) -> Option<u32> {
        self.image
            .as_ref()
            .map(|_| self.walk.y_end - self.walk.first_row)
    }

    /// The number of components of every pixel, once decoded.
    pub fn num_components(&self) -> Option<u16> {
        self.image
            .as_ref()
            .map(|image| image.codestream.size.components.len() as u16)
    }

    /// The precision of a component in bits, once decoded.
    pub fn bits_per_component(&self, component: u16) -> Option<u8> {
        let image = self.image.as_ref()?;

        image
            .boxes
            .component_depths
            .get(component as usize)
            .map(|depth| depth.precision)
    }

    pub(crate) fn decoded_image(&self) -> Option<&DecodedImage> {
        self.image.as_ref()
    }

    pub(crate) fn settings(&self) -> &DecodeSettings {
        &self.settings
    }
}

/// The image area at the decoded resolution, as `(x0, y0, x1, y1)`.
pub(crate) fn reduced_bounds(
    codestream: &DecodedCodestream,
    reduction: u8,
) -> (u32, u32, u32, u32) {
    let size = &codestream.size;
    let shift = reduction as u32;

    (
        ceil_shr(size.x_offset, shift),
        ceil_shr(size.y_offset, shift),
        ceil_shr(size.x_size, shift),
        ceil_shr(size.y_size, shift),
    )
}

/// The sample of a component at a pixel of the decoded resolution.
///
/// Positions outside of the component read as 0.
pub(crate) fn sample_at(
    codestream: &DecodedCodestream,
    reduction: u8,
    x: u32,
    y: u32,
    component: usize,
) -> i32 {
    let size = &codestream.size;

    // Tiles are found on the full-resolution reference grid.
    let full_x = (x as u64) << reduction;
    let full_y = (y as u64) << reduction;
    let tile_x = full_x.saturating_sub(size.tile_x_offset as u64) / size.tile_width as u64;
    let tile_y = full_y.saturating_sub(size.tile_y_offset as u64) / size.tile_height as u64;
    let tile_idx = tile_y * size.num_x_tiles() as u64 + tile_x;

    let Some(tile_component) = usize::try_from(tile_idx)
        .ok()
        .and_then(|idx| codestream.tiles.get(idx))
        .and_then(|tile| tile.components.get(component))
    else {
        return 0;
    };

    let rect = tile_component.reduced_rect;
    let tx = (x / tile_component.h_sep as u32).saturating_sub(rect.x0);
    let ty = (y / tile_component.v_sep as u32).saturating_sub(rect.y0);

    if tx >= rect.width() {
        return 0;
    }

    tile_component
        .data
        .get(ty as usize * rect.width() as usize + tx as usize)
        .copied()
        .unwrap_or(0)
}

/// The position of the pixel walk and the bits that were produced but not
/// yet returned.
#[derive(Debug, Default, Clone, Copy)]
struct PixelWalk {
    reduction: u8,
    x: u32,
    y: u32,
    component: usize,
    num_components: usize,
    x_start: u32,
    x_end: u32,
    first_row: u32,
    y_end: u32,
    read_buf: u64,
    read_buf_len: u32,
}

impl PixelWalk {
    fn new(codestream: &DecodedCodestream, reduction: u8) -> Self {
        let (x0, y0, x1, y1) = reduced_bounds(codestream, reduction);

        Self {
            reduction,
            x: x0,
            y: y0,
            component: 0,
            num_components: codestream.size.components.len(),
            x_start: x0,
            x_end: x1,
            first_row: y0,
            y_end: y1,
            read_buf: 0,
            read_buf_len: 0,
        }
    }

    /// Produce samples until at least one full byte is buffered or the image
    /// ends.
    fn fill(&mut self, codestream: &DecodedCodestream) {
        while self.read_buf_len < 8 {
            if self.y >= self.y_end || self.num_components == 0 {
                return;
            }

            let sample = sample_at(codestream, self.reduction, self.x, self.y, self.component);
            let precision = codestream.size.components[self.component].precision as u32;

            if precision == 8 {
                self.read_buf = (self.read_buf << 8) | (sample as u64 & 0xff);
                self.read_buf_len += 8;
            } else {
                let mask = (1_u64 << precision) - 1;
                self.read_buf = (self.read_buf << precision) | (sample as u64 & mask);
                self.read_buf_len += precision;
            }

            self.component += 1;

            if self.component == self.num_components {
                self.component = 0;
                self.x += 1;

                if self.x >= self.x_end {
                    self.x = self.x_start;
                    self.y += 1;

                    // Rows start on a byte boundary.
                    let padding = (8 - self.read_buf_len % 8) % 8;
                    self.read_buf <<= padding;
                    self.read_buf_len += padding;
                }
            }
        }
    }

    fn take_byte(&mut self, consume: bool) -> Option<u8> {
        let (byte, remaining) = match self.read_buf_len {
            0 => return None,
            len @ 1..8 => ((self.read_buf << (8 - len)) & 0xff, 0),
            len => ((self.read_buf >> (len - 8)) & 0xff, len - 8),
        };

        if consume {
            self.read_buf_len = remaining;
        }

        Some(byte as u8)
    }
}
