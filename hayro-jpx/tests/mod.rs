mod encoder;

use encoder::{BlockStyle, EncodeOptions, SizeParams, SourceImage};
use hayro_jpx::{ColorSpaceMode, DecodeSettings, DecodeStatus, JpxStream, SliceSource};
use image::{GrayImage, ImageFormat, RgbImage};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Deserialize;
use std::any::Any;
use std::fs;
use std::panic::{AssertUnwindSafe, PanicHookInfo, catch_unwind};
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

static WORKSPACE_PATH: LazyLock<PathBuf> =
    LazyLock::new(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(""));

const MANIFEST: &str = "manifest_synthetic.json";

static DIFFS_PATH: LazyLock<PathBuf> = LazyLock::new(|| {
    let path = WORKSPACE_PATH.join("diffs");
    let _ = fs::remove_dir_all(&path);
    let _ = fs::create_dir_all(&path);
    path
});

struct TestReport {
    name: String,
    duration: Duration,
    outcome: Result<(), String>,
}

fn main() {
    let _panic_hook_guard = PanicHookGuard::install();
    if !run_harness() {
        std::process::exit(1);
    }
}

fn run_harness() -> bool {
    let scenarios = match collect_scenarios() {
        Ok(scenarios) => scenarios,
        Err(err) => {
            eprintln!("Failed to read manifest: {err}");
            return false;
        }
    };

    let progress_bar = ProgressBar::new(scenarios.len() as u64);
    progress_bar.set_style(
        ProgressStyle::with_template(
            "{spinner} {pos}/{len} [{elapsed_precise}] [{wide_bar}] {msg}",
        )
        .unwrap()
        .progress_chars("=>-"),
    );

    let reports: Vec<TestReport> = scenarios
        .par_iter()
        .map(|scenario| {
            let name = scenario.name().to_owned();
            progress_bar.set_message(name.clone());
            let start = Instant::now();
            let outcome = catch_unwind(AssertUnwindSafe(|| run_scenario(scenario))).unwrap_or_else(
                |payload| {
                    let panic_msg = describe_panic(payload.as_ref());
                    Err(format!("panic: {panic_msg}"))
                },
            );
            progress_bar.inc(1);
            TestReport {
                name,
                duration: start.elapsed(),
                outcome,
            }
        })
        .collect();

    progress_bar.finish_with_message("synthetic tests complete");

    println!("\nDetailed results:");
    for report in &reports {
        match &report.outcome {
            Ok(_) => println!("[PASS] {:<60} ({:.2?})", report.name, report.duration),
            Err(err) => {
                println!("[FAIL] {:<60} ({:.2?})", report.name, report.duration);
                println!("       {err}");
            }
        }
    }

    let failures: Vec<_> = reports
        .iter()
        .filter_map(|report| report.outcome.as_ref().err().map(|err| (&report.name, err)))
        .collect();

    if failures.is_empty() {
        true
    } else {
        println!(
            "\n{} of {} synthetic tests failed:",
            failures.len(),
            reports.len()
        );

        for (name, err) in failures {
            println!(" - {name}: {err}");
        }

        false
    }
}

fn describe_panic(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_owned()
    } else {
        "unknown panic payload".to_owned()
    }
}

#[allow(clippy::type_complexity)]
struct PanicHookGuard(Option<Box<dyn Fn(&PanicHookInfo) + Sync + Send + 'static>>);

impl PanicHookGuard {
    fn install() -> Self {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(|_| {
            // Swallow default panic output; harness reports failures explicitly.
        }));
        Self(Some(previous))
    }
}

impl Drop for PanicHookGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.0.take() {
            std::panic::set_hook(previous);
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Scenario {
    /// Encode an image, decode it again and compare the pixel stream.
    RoundTrip(ImageSpec),
    /// Fill the packet data of one tile with garbage. The other tiles must
    /// survive.
    DamagedTile(ImageSpec),
    /// Leave out the QCD marker segment, which makes decoding impossible.
    MissingQcd(ImageSpec),
    /// Close the stream twice, before and after reading from it.
    Close(ImageSpec),
}

impl Scenario {
    fn spec(&self) -> &ImageSpec {
        match self {
            Self::RoundTrip(spec)
            | Self::DamagedTile(spec)
            | Self::MissingQcd(spec)
            | Self::Close(spec) => spec,
        }
    }

    fn name(&self) -> &str {
        &self.spec().id
    }
}

#[derive(Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
enum Pattern {
    #[default]
    Gradient,
    Noise,
    Flat,
    Checker,
}

#[derive(Deserialize, Clone, Copy, Default)]
#[serde(default)]
struct StyleSpec {
    bypass: bool,
    reset: bool,
    terminate_each_pass: bool,
    vertically_causal: bool,
    segmentation_symbols: bool,
}

#[derive(Deserialize)]
#[serde(default)]
struct ImageSpec {
    id: String,
    width: u32,
    height: u32,
    x_offset: u32,
    y_offset: u32,
    tile_width: Option<u32>,
    tile_height: Option<u32>,
    components: u16,
    precision: u8,
    levels: u8,
    layers: u16,
    progression: u8,
    code_block: [u8; 2],
    style: StyleSpec,
    mct: bool,
    sop: bool,
    eph: bool,
    jp2: bool,
    reduction: u8,
    pattern: Pattern,
}

impl Default for ImageSpec {
    fn default() -> Self {
        Self {
            id: String::new(),
            width: 32,
            height: 32,
            x_offset: 0,
            y_offset: 0,
            tile_width: None,
            tile_height: None,
            components: 1,
            precision: 8,
            levels: 2,
            layers: 1,
            progression: 0,
            code_block: [4, 4],
            style: StyleSpec::default(),
            mct: false,
            sop: false,
            eph: false,
            jp2: false,
            reduction: 0,
            pattern: Pattern::Gradient,
        }
    }
}

impl ImageSpec {
    fn encode_options(&self) -> EncodeOptions {
        EncodeOptions {
            size: SizeParams {
                width: self.width,
                height: self.height,
                x_offset: self.x_offset,
                y_offset: self.y_offset,
                tile_width: self.tile_width.unwrap_or(self.x_offset + self.width),
                tile_height: self.tile_height.unwrap_or(self.y_offset + self.height),
                precision: self.precision,
                num_components: self.components,
            },
            levels: self.levels,
            num_layers: self.layers,
            progression: self.progression,
            code_block: (self.code_block[0], self.code_block[1]),
            style: BlockStyle {
                bypass: self.style.bypass,
                reset: self.style.reset,
                terminate_each_pass: self.style.terminate_each_pass,
                vertically_causal: self.style.vertically_causal,
                segmentation_symbols: self.style.segmentation_symbols,
            },
            mct: self.mct,
            sop: self.sop,
            eph: self.eph,
            omit_qcd: false,
        }
    }

    fn settings(&self) -> DecodeSettings {
        DecodeSettings {
            reduction: self.reduction,
            ..DecodeSettings::default()
        }
    }

    /// The enumerated colour space written into JP2 files.
    fn colour_space(&self) -> u32 {
        if self.components == 3 { 16 } else { 17 }
    }

    fn expected_mode(&self) -> ColorSpaceMode {
        match self.components {
            1 => ColorSpaceMode::DeviceGray,
            3 => ColorSpaceMode::DeviceRgb,
            _ => ColorSpaceMode::None,
        }
    }
}

fn collect_scenarios() -> Result<Vec<Scenario>, String> {
    let manifest_path = WORKSPACE_PATH.join(MANIFEST);
    let content = fs::read_to_string(&manifest_path)
        .map_err(|err| format!("failed to read manifest {}: {err}", manifest_path.display()))?;
    let mut scenarios: Vec<Scenario> = serde_json::from_str(&content).map_err(|err| {
        format!(
            "failed to parse manifest {}: {err}",
            manifest_path.display()
        )
    })?;

    scenarios.sort_by(|a, b| a.name().cmp(b.name()));
    Ok(scenarios)
}

fn run_scenario(scenario: &Scenario) -> Result<(), String> {
    match scenario {
        Scenario::RoundTrip(spec) => run_round_trip(spec),
        Scenario::DamagedTile(spec) => run_damaged_tile(spec),
        Scenario::MissingQcd(spec) => run_missing_qcd(spec),
        Scenario::Close(spec) => run_close(spec),
    }
}

/// Deterministic sample values for a component.
fn generate_image(spec: &ImageSpec) -> SourceImage {
    let max = (1_u32 << spec.precision) - 1;
    let mut state = 0x2545_f491_u32;

    let planes = (0..spec.components as u32)
        .map(|c| {
            let mut plane = Vec::with_capacity((spec.width * spec.height) as usize);

            for y in 0..spec.height {
                for x in 0..spec.width {
                    let value = match spec.pattern {
                        Pattern::Gradient => {
                            ((x * (max + 1)) / spec.width + y * 3 + c * 40) & max
                        }
                        Pattern::Noise => {
                            state ^= state << 13;
                            state ^= state >> 17;
                            state ^= state << 5;
                            state & max
                        }
                        Pattern::Flat => 1 << (spec.precision - 1),
                        Pattern::Checker => {
                            if (x + y + c) % 2 == 0 {
                                0
                            } else {
                                max
                            }
                        }
                    };

                    plane.push(value);
                }
            }

            plane
        })
        .collect();

    SourceImage { planes }
}

/// A decoded image at the decoded resolution, one plane per component.
struct Reference {
    width: u32,
    height: u32,
    planes: Vec<Vec<u32>>,
}

/// The image the decoder should reconstruct at the requested reduction.
fn reference_image(spec: &ImageSpec, image: &SourceImage, options: &EncodeOptions) -> Reference {
    let size = &options.size;
    let reduction = spec.reduction;
    let bounds = encoder::reduced_rect(
        (
            size.x_offset,
            size.y_offset,
            size.x_offset + size.width,
            size.y_offset + size.height,
        ),
        reduction,
    );
    let width = bounds.2 - bounds.0;
    let height = bounds.3 - bounds.1;
    let max = (1_i32 << spec.precision) - 1;
    let shift = 1_i32 << (spec.precision - 1);
    let mut planes = vec![vec![0_u32; (width * height) as usize]; spec.components as usize];
    let (x_tiles, y_tiles) = encoder::num_tiles(size);

    for tile in 0..x_tiles * y_tiles {
        let (rect, components) = encoder::reduced_tile(image, options, tile, reduction);
        let tile_width = (rect.2 - rect.0) as usize;

        for y in rect.1..rect.3 {
            for x in rect.0..rect.2 {
                let idx = (y - rect.1) as usize * tile_width + (x - rect.0) as usize;
                let mut samples = components.iter().map(|c| c[idx]).collect::<Vec<_>>();

                if options.mct && samples.len() >= 3 {
                    let (r, g, b) = encoder::inverse_rct(samples[0], samples[1], samples[2]);
                    samples[0] = r;
                    samples[1] = g;
                    samples[2] = b;
                }

                let out = ((y - bounds.1) * width + (x - bounds.0)) as usize;

                for (plane, sample) in planes.iter_mut().zip(samples) {
                    plane[out] = (sample + shift).clamp(0, max) as u32;
                }
            }
        }
    }

    Reference {
        width,
        height,
        planes,
    }
}

/// Pack samples the way the pixel stream emits them.
fn pack(reference: &Reference, precision: u8) -> Vec<u8> {
    let mut out = vec![];

    for y in 0..reference.height {
        let mut buf = 0_u64;
        let mut len = 0;

        for x in 0..reference.width {
            for plane in &reference.planes {
                let sample = plane[(y * reference.width + x) as usize] as u64;
                buf = (buf << precision) | sample;
                len += precision as u32;

                while len >= 8 {
                    len -= 8;
                    out.push((buf >> len) as u8);
                }
            }
        }

        if len > 0 {
            out.push((buf << (8 - len)) as u8);
        }
    }

    out
}

fn encode_file(spec: &ImageSpec, options: &EncodeOptions) -> Result<(SourceImage, Vec<u8>, encoder::Encoded), String> {
    let image = generate_image(spec);
    let encoded = encoder::encode(&image, options)?;
    let file = if spec.jp2 {
        encoder::jp2_file(&encoded.codestream, &options.size, spec.colour_space())
    } else {
        encoded.codestream.clone()
    };

    Ok((image, file, encoded))
}

fn read_all(stream: &mut JpxStream<SliceSource<'_>>) -> Vec<u8> {
    let mut out = vec![];

    while let Some(byte) = stream.get_char() {
        out.push(byte);
    }

    out
}

fn run_round_trip(spec: &ImageSpec) -> Result<(), String> {
    let options = spec.encode_options();
    let (image, file, _) = encode_file(spec, &options)?;
    let reference = reference_image(spec, &image, &options);
    let expected = pack(&reference, spec.precision);

    let mut stream = JpxStream::new(SliceSource::new(&file), spec.settings());

    let params = stream.image_params();

    if params.bits_per_component != Some(spec.precision) {
        return Err(format!(
            "expected {} bits per component, got {:?}",
            spec.precision, params.bits_per_component
        ));
    }

    if params.color_space_mode != spec.expected_mode() {
        return Err(format!(
            "unexpected colour space mode {:?}",
            params.color_space_mode
        ));
    }

    let status = stream.decode();

    if status != DecodeStatus::Ok {
        return Err(format!("decoding finished with status {status}"));
    }

    if stream.width() != Some(reference.width) || stream.height() != Some(reference.height) {
        return Err(format!(
            "expected {}x{}, got {:?}x{:?}",
            reference.width,
            reference.height,
            stream.width(),
            stream.height()
        ));
    }

    if stream.look_char() != expected.first().copied() {
        return Err("look_char doesn't return the first byte".to_owned());
    }

    let actual = read_all(&mut stream);

    if actual != expected {
        save_diff(spec, &reference, &actual);

        let first = actual
            .iter()
            .zip(&expected)
            .position(|(a, e)| a != e)
            .unwrap_or(actual.len().min(expected.len()));

        return Err(format!(
            "pixel data differs from byte {first} on ({} vs {} bytes)",
            actual.len(),
            expected.len()
        ));
    }

    // The stream restarts without decoding again.
    stream.reset();

    if read_all(&mut stream) != expected {
        return Err("pixel data differs after reset".to_owned());
    }

    #[cfg(feature = "image")]
    check_image_decoder(spec, &file, &expected)?;

    Ok(())
}

/// `JpxDecoder` hands out the same samples for 8-bit images.
#[cfg(feature = "image")]
fn check_image_decoder(spec: &ImageSpec, file: &[u8], expected: &[u8]) -> Result<(), String> {
    use image::ImageDecoder;

    if spec.precision != 8 {
        return Ok(());
    }

    let decoder = hayro_jpx::JpxDecoder::with_settings(std::io::Cursor::new(file), spec.settings())
        .map_err(|err| format!("image decoder failed: {err}"))?;
    let mut buf = vec![0; decoder.total_bytes() as usize];
    decoder
        .read_image(&mut buf)
        .map_err(|err| format!("image decoder failed: {err}"))?;

    if buf != expected {
        return Err("image decoder returned different samples".to_owned());
    }

    Ok(())
}

/// Write the decoded image next to the reference, if it can be shown as an
/// 8-bit PNG.
fn save_diff(spec: &ImageSpec, reference: &Reference, actual: &[u8]) {
    if spec.precision != 8 {
        return;
    }

    let expected = pack(reference, 8);
    let (width, height) = (reference.width, reference.height);
    let mut actual = actual.to_vec();
    actual.resize(expected.len(), 0);

    for (suffix, data) in [("expected", expected), ("actual", actual)] {
        let path = DIFFS_PATH.join(format!("{}_{suffix}.png", spec.id));
        let _ = match spec.components {
            1 => GrayImage::from_raw(width, height, data)
                .map(|img| img.save_with_format(&path, ImageFormat::Png)),
            3 => RgbImage::from_raw(width, height, data)
                .map(|img| img.save_with_format(&path, ImageFormat::Png)),
            _ => None,
        };
    }
}

fn run_damaged_tile(spec: &ImageSpec) -> Result<(), String> {
    let options = spec.encode_options();
    let image = generate_image(spec);
    let mut encoded = encoder::encode(&image, &options)?;

    if spec.precision != 8 || spec.reduction != 0 || encoded.tile_bodies.len() < 2 {
        return Err("damaged tile scenarios need 8-bit samples and several tiles".to_owned());
    }

    let body = encoded.tile_bodies[1].clone();

    if body.len() < 16 {
        return Err(format!("tile 1 only has {} bytes", body.len()));
    }

    encoded.codestream[body].fill(0xff);

    let reference = reference_image(spec, &image, &options);
    let mut stream = JpxStream::new(SliceSource::new(&encoded.codestream), spec.settings());
    let status = stream.decode();

    if status != DecodeStatus::NonFatal {
        return Err(format!("expected a non-fatal status, got {status}"));
    }

    let actual = read_all(&mut stream);
    let expected = pack(&reference, 8);

    if actual.len() != expected.len() {
        return Err(format!(
            "expected {} bytes, got {}",
            expected.len(),
            actual.len()
        ));
    }

    let size = &options.size;
    let damaged = encoder::tile_rect(size, 1);
    let num_components = spec.components as usize;

    for y in 0..size.height {
        for x in 0..size.width {
            let (gx, gy) = (x + size.x_offset, y + size.y_offset);

            if gx >= damaged.0 && gx < damaged.2 && gy >= damaged.1 && gy < damaged.3 {
                continue;
            }

            let idx = (y * size.width + x) as usize * num_components;

            if actual[idx..idx + num_components] != expected[idx..idx + num_components] {
                return Err(format!("pixel ({x}, {y}) outside the damaged tile differs"));
            }
        }
    }

    Ok(())
}

fn run_missing_qcd(spec: &ImageSpec) -> Result<(), String> {
    let options = EncodeOptions {
        omit_qcd: true,
        ..spec.encode_options()
    };
    let (_, file, _) = encode_file(spec, &options)?;
    let mut stream = JpxStream::new(SliceSource::new(&file), spec.settings());
    let status = stream.decode();

    if status != DecodeStatus::Fatal {
        return Err(format!("expected a fatal status, got {status}"));
    }

    if stream.get_char().is_some() || stream.width().is_some() {
        return Err("a fatal image must not produce pixel data".to_owned());
    }

    Ok(())
}

fn run_close(spec: &ImageSpec) -> Result<(), String> {
    let options = spec.encode_options();
    let (_, file, _) = encode_file(spec, &options)?;

    // Closing before the first read.
    let mut stream = JpxStream::new(SliceSource::new(&file), spec.settings());
    stream.close();
    stream.close();

    if stream.get_char().is_some() {
        return Err("a closed stream returned data".to_owned());
    }

    // Closing after reading.
    let mut stream = JpxStream::new(SliceSource::new(&file), spec.settings());

    if stream.get_char().is_none() {
        return Err("the stream is empty".to_owned());
    }

    stream.close();
    stream.close();

    if stream.get_char().is_some() || stream.look_char().is_some() {
        return Err("a closed stream returned data".to_owned());
    }

    if stream.image_params() != Default::default() {
        return Err("a closed stream returned image parameters".to_owned());
    }

    Ok(())
}
