//! Marker segments of the main and tile-part headers, as described in Annex A.
//!
//! Each parser receives the payload of a marker segment (everything after
//! the length field) that was read into memory beforehand.

use super::markers;
use super::rect::IntRect;
use super::tile::SubBandType;
use crate::error::{MarkerError, Result, ValidationError, bail};
use crate::reader::SliceReader;

/// The largest number of decomposition levels allowed by Table A.15.
pub(crate) const MAX_DECOMPOSITION_LEVELS: u8 = 32;
/// The largest supported component precision. The irreversible path keeps
/// samples as fixed-point numbers with this many bits.
pub(crate) const MAX_PRECISION: u8 = 24;
/// The largest supported width or height of the image, in samples.
const MAX_DIMENSIONS: u32 = 60000;
/// SOT only has 16 bits for the tile index.
const MAX_TILES: u64 = 65535;

/// Component information (A.5.1 and Table A.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ComponentSize {
    pub(crate) precision: u8,
    pub(crate) signed: bool,
    /// Horizontal separation of samples (`XRsiz`).
    pub(crate) h_sep: u8,
    /// Vertical separation of samples (`YRsiz`).
    pub(crate) v_sep: u8,
}

/// Image and tile size, from the SIZ marker (A.5.1).
#[derive(Debug, Clone)]
pub(crate) struct SizeData {
    /// Width of the reference grid (`Xsiz`).
    pub(crate) x_size: u32,
    /// Height of the reference grid (`Ysiz`).
    pub(crate) y_size: u32,
    /// Horizontal offset of the image area (`XOsiz`).
    pub(crate) x_offset: u32,
    /// Vertical offset of the image area (`YOsiz`).
    pub(crate) y_offset: u32,
    /// Width of one reference tile (`XTsiz`).
    pub(crate) tile_width: u32,
    /// Height of one reference tile (`YTsiz`).
    pub(crate) tile_height: u32,
    /// Horizontal offset of the first tile (`XTOsiz`).
    pub(crate) tile_x_offset: u32,
    /// Vertical offset of the first tile (`YTOsiz`).
    pub(crate) tile_y_offset: u32,
    pub(crate) components: Vec<ComponentSize>,
}

impl SizeData {
    /// The number of tiles in the x direction (B-5).
    pub(crate) fn num_x_tiles(&self) -> u32 {
        (self.x_size - self.tile_x_offset).div_ceil(self.tile_width)
    }

    /// The number of tiles in the y direction (B-5).
    pub(crate) fn num_y_tiles(&self) -> u32 {
        (self.y_size - self.tile_y_offset).div_ceil(self.tile_height)
    }

    pub(crate) fn num_tiles(&self) -> u32 {
        self.num_x_tiles() * self.num_y_tiles()
    }

    /// The image area on the reference grid.
    pub(crate) fn image_rect(&self) -> IntRect {
        IntRect::from_ltrb(self.x_offset, self.y_offset, self.x_size, self.y_size)
    }

    /// The area of the tile with the given index on the reference grid,
    /// clipped to the image area (B-7).
    pub(crate) fn tile_rect(&self, idx: u32) -> IntRect {
        let p = (idx % self.num_x_tiles()) as u64;
        let q = (idx / self.num_x_tiles()) as u64;

        let x0 = self.tile_x_offset as u64 + p * self.tile_width as u64;
        let y0 = self.tile_y_offset as u64 + q * self.tile_height as u64;
        let x1 = x0 + self.tile_width as u64;
        let y1 = y0 + self.tile_height as u64;

        let clamp = |v: u64| v.min(u32::MAX as u64) as u32;

        IntRect::from_ltrb(clamp(x0), clamp(y0), clamp(x1), clamp(y1)).intersect(self.image_rect())
    }
}

/// SIZ marker (A.5.1).
pub(crate) fn size_marker(data: &[u8]) -> Result<SizeData> {
    let size_data = size_marker_inner(data).ok_or(MarkerError::ParseFailure("SIZ"))?;

    if size_data.x_size == 0
        || size_data.y_size == 0
        || size_data.x_offset >= size_data.x_size
        || size_data.y_offset >= size_data.y_size
    {
        bail!(ValidationError::InvalidDimensions);
    }

    // B-3 and B-4: the first tile must overlap the image area.
    if size_data.tile_width == 0
        || size_data.tile_height == 0
        || size_data.tile_x_offset > size_data.x_offset
        || size_data.tile_y_offset > size_data.y_offset
        || size_data.tile_x_offset as u64 + size_data.tile_width as u64
            <= size_data.x_offset as u64
        || size_data.tile_y_offset as u64 + size_data.tile_height as u64
            <= size_data.y_offset as u64
    {
        bail!(ValidationError::InvalidTiling);
    }

    if size_data.num_x_tiles() as u64 * size_data.num_y_tiles() as u64 > MAX_TILES {
        bail!(ValidationError::InvalidTiling);
    }

    if size_data.components.is_empty() {
        bail!(ValidationError::InvalidComponentMetadata);
    }

    for component in &size_data.components {
        if component.h_sep == 0 || component.v_sep == 0 {
            bail!(ValidationError::InvalidComponentMetadata);
        }

        if component.precision > MAX_PRECISION {
            bail!(ValidationError::UnsupportedPrecision);
        }
    }

    if size_data.x_size - size_data.x_offset > MAX_DIMENSIONS
        || size_data.y_size - size_data.y_offset > MAX_DIMENSIONS
    {
        bail!(ValidationError::ImageTooLarge);
    }

    Ok(size_data)
}

fn size_marker_inner(data: &[u8]) -> Option<SizeData> {
    let mut reader = SliceReader::new(data);

    // Decoder capabilities.
    let _ = reader.read_u16()?;

    let x_size = reader.read_u32()?;
    let y_size = reader.read_u32()?;
    let x_offset = reader.read_u32()?;
    let y_offset = reader.read_u32()?;
    let tile_width = reader.read_u32()?;
    let tile_height = reader.read_u32()?;
    let tile_x_offset = reader.read_u32()?;
    let tile_y_offset = reader.read_u32()?;
    let num_components = reader.read_u16()?;

    let mut components = Vec::with_capacity(num_components as usize);

    for _ in 0..num_components {
        let ssiz = reader.read_u8()?;
        let h_sep = reader.read_u8()?;
        let v_sep = reader.read_u8()?;

        components.push(ComponentSize {
            precision: (ssiz & 0x7f) + 1,
            signed: ssiz & 0x80 != 0,
            h_sep,
            v_sep,
        });
    }

    Some(SizeData {
        x_size,
        y_size,
        x_offset,
        y_offset,
        tile_width,
        tile_height,
        tile_x_offset,
        tile_y_offset,
        components,
    })
}

/// Progression order (Table A.16).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProgressionOrder {
    LayerResolutionComponentPosition,
    ResolutionLayerComponentPosition,
    ResolutionPositionComponentLayer,
    PositionComponentResolutionLayer,
    ComponentPositionResolutionLayer,
}

impl ProgressionOrder {
    pub(crate) fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::LayerResolutionComponentPosition),
            1 => Ok(Self::ResolutionLayerComponentPosition),
            2 => Ok(Self::ResolutionPositionComponentLayer),
            3 => Ok(Self::PositionComponentResolutionLayer),
            4 => Ok(Self::ComponentPositionResolutionLayer),
            _ => Err(ValidationError::InvalidProgressionOrder.into()),
        }
    }
}

/// Wavelet transformation type (Table A.20).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaveletTransform {
    Irreversible97,
    Reversible53,
}

impl WaveletTransform {
    fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Irreversible97),
            1 => Ok(Self::Reversible53),
            _ => Err(ValidationError::InvalidTransformation.into()),
        }
    }
}

/// Coding style flags (Table A.13).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CodingStyleFlags {
    pub(crate) raw: u8,
}

impl CodingStyleFlags {
    pub(crate) fn has_precincts(&self) -> bool {
        (self.raw & 0x01) != 0
    }

    pub(crate) fn may_use_sop_markers(&self) -> bool {
        (self.raw & 0x02) != 0
    }

    pub(crate) fn uses_eph_marker(&self) -> bool {
        (self.raw & 0x04) != 0
    }
}

/// Code-block style flags (Table A.19).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CodeBlockStyle {
    pub(crate) selective_arithmetic_coding_bypass: bool,
    pub(crate) reset_context_probabilities: bool,
    pub(crate) termination_on_each_pass: bool,
    pub(crate) vertically_causal_context: bool,
    pub(crate) segmentation_symbols: bool,
}

impl CodeBlockStyle {
    pub(crate) fn from_u8(value: u8) -> Self {
        Self {
            selective_arithmetic_coding_bypass: (value & 0x01) != 0,
            reset_context_probabilities: (value & 0x02) != 0,
            termination_on_each_pass: (value & 0x04) != 0,
            vertically_causal_context: (value & 0x08) != 0,
            // 0x10 (predictable termination) is informative only.
            segmentation_symbols: (value & 0x20) != 0,
        }
    }
}

/// Parameters shared by the COD and COC markers (SPcod and SPcoc, Table A.15).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CodingStyle {
    /// Whether precinct sizes were given explicitly.
    pub(crate) has_precincts: bool,
    pub(crate) num_decomposition_levels: u8,
    /// Code-block width exponent (`xcb`).
    pub(crate) code_block_width: u8,
    /// Code-block height exponent (`ycb`).
    pub(crate) code_block_height: u8,
    pub(crate) code_block_style: CodeBlockStyle,
    pub(crate) transformation: WaveletTransform,
    /// `(PPx, PPy)` for each resolution level.
    pub(crate) precinct_exponents: Vec<(u8, u8)>,
}

impl CodingStyle {
    pub(crate) fn num_resolution_levels(&self) -> u8 {
        self.num_decomposition_levels + 1
    }
}

/// `marker` names the segment the parameters belong to, for errors.
fn coding_style(
    reader: &mut SliceReader<'_>,
    has_precincts: bool,
    marker: &'static str,
) -> Result<CodingStyle> {
    let fail = || MarkerError::ParseFailure(marker);

    let num_decomposition_levels = reader.read_u8().ok_or_else(fail)?;

    if num_decomposition_levels > MAX_DECOMPOSITION_LEVELS {
        bail!(ValidationError::InvalidDecompositionLevels);
    }

    let code_block_width = reader.read_u8().ok_or_else(fail)?;
    let code_block_height = reader.read_u8().ok_or_else(fail)?;

    // A.6.1: both exponents are at most 8 and so is their sum.
    if code_block_width > 8 || code_block_height > 8 || code_block_width + code_block_height > 8 {
        bail!(ValidationError::InvalidCodeBlockSize);
    }

    let code_block_style = CodeBlockStyle::from_u8(reader.read_u8().ok_or_else(fail)?);
    let transformation = WaveletTransform::from_u8(reader.read_u8().ok_or_else(fail)?)?;

    let num_resolution_levels = num_decomposition_levels as usize + 1;
    let mut precinct_exponents = Vec::with_capacity(num_resolution_levels);

    if has_precincts {
        for resolution in 0..num_resolution_levels {
            // Table A.21.
            let packed = reader.read_u8().ok_or_else(fail)?;
            let width_exp = packed & 0xf;
            let height_exp = packed >> 4;

            if resolution > 0 && (width_exp == 0 || height_exp == 0) {
                bail!(ValidationError::InvalidPrecinctSize);
            }

            precinct_exponents.push((width_exp, height_exp));
        }
    } else {
        precinct_exponents.resize(num_resolution_levels, (15, 15));
    }

    Ok(CodingStyle {
        has_precincts,
        num_decomposition_levels,
        code_block_width: code_block_width + 2,
        code_block_height: code_block_height + 2,
        code_block_style,
        transformation,
        precinct_exponents,
    })
}

/// Default values for coding style, from the COD marker (A.6.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CodingStyleDefault {
    pub(crate) flags: CodingStyleFlags,
    pub(crate) progression_order: ProgressionOrder,
    pub(crate) num_layers: u16,
    pub(crate) mct: bool,
    pub(crate) coding_style: CodingStyle,
}

/// COD marker (A.6.1).
pub(crate) fn cod_marker(data: &[u8]) -> Result<CodingStyleDefault> {
    let mut reader = SliceReader::new(data);
    let fail = || MarkerError::ParseFailure("COD");

    let flags = CodingStyleFlags {
        raw: reader.read_u8().ok_or_else(fail)?,
    };
    let progression_order = ProgressionOrder::from_u8(reader.read_u8().ok_or_else(fail)?)?;
    let num_layers = reader.read_u16().ok_or_else(fail)?;

    if num_layers == 0 {
        bail!(ValidationError::InvalidLayerCount);
    }

    let mct = reader.read_u8().ok_or_else(fail)? == 1;
    let coding_style = coding_style(&mut reader, flags.has_precincts(), "COD")?;

    Ok(CodingStyleDefault {
        flags,
        progression_order,
        num_layers,
        mct,
        coding_style,
    })
}

fn component_index(reader: &mut SliceReader<'_>, num_components: usize) -> Option<u16> {
    if num_components > 256 {
        reader.read_u16()
    } else {
        reader.read_u8().map(|c| c as u16)
    }
}

/// COC marker (A.6.2).
///
/// Only the precinct bit of `Scoc` is meaningful, the SOP and EPH bits
/// always come from COD.
pub(crate) fn coc_marker(data: &[u8], num_components: usize) -> Result<(u16, CodingStyle)> {
    let mut reader = SliceReader::new(data);
    let fail = || MarkerError::ParseFailure("COC");

    let component = component_index(&mut reader, num_components).ok_or_else(fail)?;

    if component as usize >= num_components {
        bail!(ValidationError::InvalidComponentIndex);
    }

    let style = reader.read_u8().ok_or_else(fail)?;
    let coding_style = coding_style(&mut reader, style & 1 != 0, "COC")?;

    Ok((component, coding_style))
}

/// Quantization style (Table A.28).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QuantizationStyle {
    NoQuantization,
    ScalarDerived,
    ScalarExpounded,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct StepSize {
    pub(crate) exponent: u8,
    pub(crate) mantissa: u16,
}

/// Quantization properties, from the QCD and QCC markers (A.6.4 and A.6.5).
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct QuantizationInfo {
    pub(crate) style: QuantizationStyle,
    pub(crate) guard_bits: u8,
    pub(crate) step_sizes: Vec<StepSize>,
}

impl QuantizationInfo {
    /// Make sure there is a step size for every subband (A.6.4).
    pub(crate) fn validate(&self, num_decomposition_levels: u8) -> Result<()> {
        let needed = match self.style {
            QuantizationStyle::ScalarDerived => 1,
            _ => 3 * num_decomposition_levels as usize + 1,
        };

        if self.step_sizes.len() < needed {
            bail!(ValidationError::InsufficientStepSizes);
        }

        Ok(())
    }

    /// The step size that applies to the given subband. Must only be called
    /// after `validate`.
    pub(crate) fn step_size(&self, resolution: u8, sub_band_type: SubBandType) -> StepSize {
        let idx = match (self.style, sub_band_type) {
            (QuantizationStyle::ScalarDerived, _) | (_, SubBandType::LowLow) => 0,
            (_, band) => 3 * (resolution as usize - 1) + 1 + band.band_index(),
        };

        self.step_sizes[idx]
    }
}

fn quantization_info(reader: &mut SliceReader<'_>, marker: &'static str) -> Result<QuantizationInfo> {
    let fail = || MarkerError::ParseFailure(marker);

    let sq = reader.read_u8().ok_or_else(fail)?;
    let guard_bits = sq >> 5;

    let style = match sq & 0x1f {
        0 => QuantizationStyle::NoQuantization,
        1 => QuantizationStyle::ScalarDerived,
        2 => QuantizationStyle::ScalarExpounded,
        _ => bail!(ValidationError::InvalidQuantizationStyle),
    };

    let irreversible = |value: u16| StepSize {
        exponent: (value >> 11) as u8,
        mantissa: value & 0x7ff,
    };

    let mut step_sizes = vec![];

    match style {
        QuantizationStyle::NoQuantization => {
            while let Some(value) = reader.read_u8() {
                step_sizes.push(StepSize {
                    exponent: value >> 3,
                    mantissa: 0,
                });
            }
        }
        QuantizationStyle::ScalarDerived => {
            step_sizes.push(irreversible(reader.read_u16().ok_or_else(fail)?));
        }
        QuantizationStyle::ScalarExpounded => {
            while reader.remaining() >= 2 {
                step_sizes.push(irreversible(reader.read_u16().ok_or_else(fail)?));
            }
        }
    }

    Ok(QuantizationInfo {
        style,
        guard_bits,
        step_sizes,
    })
}

/// QCD marker (A.6.4).
pub(crate) fn qcd_marker(data: &[u8]) -> Result<QuantizationInfo> {
    quantization_info(&mut SliceReader::new(data), "QCD")
}

/// QCC marker (A.6.5).
pub(crate) fn qcc_marker(data: &[u8], num_components: usize) -> Result<(u16, QuantizationInfo)> {
    let mut reader = SliceReader::new(data);
    let component = component_index(&mut reader, num_components)
        .ok_or(MarkerError::ParseFailure("QCC"))?;

    if component as usize >= num_components {
        bail!(ValidationError::InvalidComponentIndex);
    }

    Ok((component, quantization_info(&mut reader, "QCC")?))
}

/// The fields of an SOT marker (A.4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TilePartHeader {
    pub(crate) tile_index: u16,
    /// Length of the tile-part in bytes, from the first byte of the SOT
    /// marker. Zero means that the tile-part extends to the EOC marker.
    pub(crate) tile_part_length: u32,
    pub(crate) tile_part_index: u8,
    pub(crate) num_tile_parts: u8,
}

/// SOT marker (A.4.2).
pub(crate) fn sot_marker(data: &[u8]) -> Result<TilePartHeader> {
    let mut reader = SliceReader::new(data);

    let parse = |reader: &mut SliceReader<'_>| {
        Some(TilePartHeader {
            tile_index: reader.read_u16()?,
            tile_part_length: reader.read_u32()?,
            tile_part_index: reader.read_u8()?,
            num_tile_parts: reader.read_u8()?,
        })
    };

    parse(&mut reader).ok_or_else(|| MarkerError::ParseFailure(markers::to_string(markers::SOT)).into())
}

/// Coding and quantization parameters of a single component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ComponentParameters {
    pub(crate) coding_style: CodingStyle,
    pub(crate) quantization: QuantizationInfo,
}

/// The parameters that are in effect for a tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TileParameters {
    pub(crate) flags: CodingStyleFlags,
    pub(crate) progression_order: ProgressionOrder,
    pub(crate) num_layers: u16,
    pub(crate) mct: bool,
    pub(crate) components: Vec<ComponentParameters>,
}

/// The coding-related marker segments found in one header.
///
/// The main header and the first tile-part header of each tile collect their
/// segments independently. A.6 defines the precedence between them: a
/// component-specific segment overrides a default one, and a tile-part
/// header overrides the main header, regardless of the order in which the
/// segments appeared.
#[derive(Debug, Clone, Default)]
pub(crate) struct HeaderSegments {
    pub(crate) cod: Option<CodingStyleDefault>,
    pub(crate) coc: Vec<Option<CodingStyle>>,
    pub(crate) qcd: Option<QuantizationInfo>,
    pub(crate) qcc: Vec<Option<QuantizationInfo>>,
}

impl HeaderSegments {
    pub(crate) fn new(num_components: usize) -> Self {
        Self {
            cod: None,
            coc: vec![None; num_components],
            qcd: None,
            qcc: vec![None; num_components],
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.cod.is_none()
            && self.qcd.is_none()
            && self.coc.iter().all(Option::is_none)
            && self.qcc.iter().all(Option::is_none)
    }

    /// Resolve the parameters of the main header.
    pub(crate) fn resolve_main(&self) -> Result<TileParameters> {
        let cod = self.cod.as_ref().ok_or(MarkerError::Missing("COD"))?;
        let qcd = self.qcd.as_ref().ok_or(MarkerError::Missing("QCD"))?;

        let base = TileParameters {
            flags: cod.flags,
            progression_order: cod.progression_order,
            num_layers: cod.num_layers,
            mct: cod.mct,
            components: vec![
                ComponentParameters {
                    coding_style: cod.coding_style.clone(),
                    quantization: qcd.clone(),
                };
                self.coc.len()
            ],
        };

        Ok(self.apply_component_overrides(base))
    }

    /// Resolve the parameters of a tile, based on those of the main header.
    pub(crate) fn resolve_tile(&self, main: &TileParameters) -> TileParameters {
        let mut params = main.clone();

        if let Some(cod) = &self.cod {
            params.flags = cod.flags;
            params.progression_order = cod.progression_order;
            params.num_layers = cod.num_layers;
            params.mct = cod.mct;

            for component in &mut params.components {
                component.coding_style = cod.coding_style.clone();
            }
        }

        if let Some(qcd) = &self.qcd {
            for component in &mut params.components {
                component.quantization = qcd.clone();
            }
        }

        self.apply_component_overrides(params)
    }

    fn apply_component_overrides(&self, mut params: TileParameters) -> TileParameters {
        for (component, coc) in params.components.iter_mut().zip(&self.coc) {
            if let Some(coc) = coc {
                component.coding_style = coc.clone();
            }
        }

        for (component, qcc) in params.components.iter_mut().zip(&self.qcc) {
            if let Some(qcc) = qcc {
                component.quantization = qcc.clone();
            }
        }

        params
    }
}
