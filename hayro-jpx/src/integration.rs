//! Integration with the [image] crate.

use std::io::{Read, Seek};

use crate::DecodeSettings;
use crate::error::DecodeStatus;
use crate::jp2::DecodedImage;
use crate::jp2::colr::EnumeratedColourSpace;
use crate::source::ReadSource;
use crate::stream::{JpxStream, reduced_bounds, sample_at};
use ::image::error::{DecodingError, ImageFormatHint, UnsupportedError, UnsupportedErrorKind};
use ::image::{ColorType, ImageDecoder, ImageError, ImageResult};

/// A JPEG 2000 decoder for the `image` crate.
///
/// Images with one to four components of equal, unsigned precision of at
/// most 16 bits and without subsampling are supported. Two components are
/// read as grey with alpha, four as RGBA.
pub struct JpxDecoder<R: Read + Seek> {
    stream: JpxStream<ReadSource<R>>,
    width: u32,
    height: u32,
    color_type: ColorType,
}

impl<R: Read + Seek> JpxDecoder<R> {
    /// Decode the image from the given reader.
    pub fn new(reader: R) -> ImageResult<Self> {
        Self::with_settings(reader, DecodeSettings::default())
    }

    /// Decode the image from the given reader with custom settings.
    pub fn with_settings(reader: R, settings: DecodeSettings) -> ImageResult<Self> {
        let mut stream = JpxStream::new(ReadSource::new(reader)?, settings);

        if stream.decode() == DecodeStatus::Fatal {
            return Err(decoding_error("failed to decode image"));
        }

        let image = stream
            .decoded_image()
            .ok_or_else(|| decoding_error("failed to decode image"))?;
        let color_type = color_type(image)?;

        let (Some(width), Some(height)) = (stream.width(), stream.height()) else {
            return Err(decoding_error("failed to decode image"));
        };

        Ok(Self {
            stream,
            width,
            height,
            color_type,
        })
    }

    fn write_samples(mut self, buf: &mut [u8]) -> ImageResult<()> {
        let settings = *self.stream.settings();
        let image = self
            .stream
            .decoded_image()
            .ok_or_else(|| decoding_error("failed to decode image"))?;
        let codestream = &image.codestream;
        let num_components = codestream.size.components.len();
        let precision = codestream.size.components[0].precision as u32;
        let max = (1_u32 << precision) - 1;
        let (x0, y0, x1, y1) = reduced_bounds(codestream, settings.reduction);

        let wide = self.color_type.bytes_per_pixel() as usize > num_components;
        let out_max = if wide { u16::MAX as u32 } else { u8::MAX as u32 };
        let mut out = buf.iter_mut();

        for y in y0..y1 {
            for x in x0..x1 {
                for c in 0..num_components {
                    let sample = sample_at(codestream, settings.reduction, x, y, c).max(0) as u32;
                    let scaled = (sample.min(max) * out_max + max / 2) / max;

                    if wide {
                        for byte in (scaled as u16).to_ne_bytes() {
                            *out.next().ok_or_else(|| decoding_error("buffer too small"))? = byte;
                        }
                    } else {
                        *out.next().ok_or_else(|| decoding_error("buffer too small"))? =
                            scaled as u8;
                    }
                }
            }
        }

        self.stream.close();

        Ok(())
    }
}

impl<R: Read + Seek> ImageDecoder for JpxDecoder<R> {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn color_type(&self) -> ColorType {
        self.color_type
    }

    fn read_image(self, buf: &mut [u8]) -> ImageResult<()>
    where
        Self: Sized,
    {
        self.write_samples(buf)
    }

    fn read_image_boxed(self: Box<Self>, buf: &mut [u8]) -> ImageResult<()> {
        (*self).write_samples(buf)
    }
}

fn color_type(image: &DecodedImage) -> ImageResult<ColorType> {
    let components = &image.codestream.size.components;
    let Some(first) = components.first() else {
        return Err(unsupported("image without components"));
    };

    if components.iter().any(|c| {
        c.precision != first.precision || c.signed || c.h_sep != 1 || c.v_sep != 1
    }) {
        return Err(unsupported("components with different layouts"));
    }

    if image.boxes.palette.is_some() {
        return Err(unsupported("palette images"));
    }

    if image.boxes.colour_specification.as_ref().is_some_and(|c| {
        matches!(
            c.colour_space,
            EnumeratedColourSpace::Cmyk | EnumeratedColourSpace::Ycck
        )
    }) {
        return Err(unsupported("CMYK images"));
    }

    let has_opacity = image
        .boxes
        .channel_definition
        .as_ref()
        .is_none_or(|c| c.has_opacity());
    let wide = first.precision > 8;

    match (components.len(), has_opacity, wide) {
        _ if first.precision > 16 => Err(unsupported("precisions above 16 bits")),
        (1, _, false) => Ok(ColorType::L8),
        (1, _, true) => Ok(ColorType::L16),
        (2, true, false) => Ok(ColorType::La8),
        (2, true, true) => Ok(ColorType::La16),
        (3, _, false) => Ok(ColorType::Rgb8),
        (3, _, true) => Ok(ColorType::Rgb16),
        (4, true, false) => Ok(ColorType::Rgba8),
        (4, true, true) => Ok(ColorType::Rgba16),
        _ => Err(unsupported("this component layout")),
    }
}

fn decoding_error(message: &'static str) -> ImageError {
    ImageError::Decoding(DecodingError::new(
        ImageFormatHint::Name("JPEG2000".to_string()),
        message,
    ))
}

fn unsupported(feature: &str) -> ImageError {
    ImageError::Unsupported(UnsupportedError::from_format_and_kind(
        ImageFormatHint::Name("JPEG2000".to_string()),
        UnsupportedErrorKind::GenericFeature(feature.to_string()),
    ))
}
