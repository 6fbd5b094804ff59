// ============================================================================
// MosaicTool CLI — headless mosaic via command-line arguments
// ============================================================================
//
// Usage examples:
//   mosaictool --input photo.png --region 40,60,200,180 --output blurred.png
//   mosaictool -i photo.jpg -r 0,0,120,80 -r 300,40,380,90 --block 12 -o out.jpg
//   mosaictool -i "shots/*.png" -r 10,10,90,40 --output-dir redacted/ --format png
//
// Regions are in source-image pixels (x0,y0,x1,y1), applied in the order given.
// No GUI is opened in CLI mode.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::io::{SaveFormat, encode_and_write, load_image_sync, save_format_for};
use crate::ops::mosaic::{Region, mosaic};
use crate::session::{BLOCK_SIZE_MAX, DEFAULT_BLOCK_SIZE};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// MosaicTool headless pixelation.
#[derive(Parser, Debug)]
#[command(
    name = "mosaictool",
    about = "Pixelate rectangular regions of image files without opening the GUI",
    long_about = "Apply a mosaic (pixelation) to one or more rectangles of each input\n\
                  image and write the full-resolution result.\n\n\
                  Example:\n  \
                  mosaictool --input photo.png --region 40,60,200,180 --output out.png\n  \
                  mosaictool -i *.jpg -r 0,0,64,64 --block 8 --output-dir out/"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Rectangle to pixelate as x0,y0,x1,y1 in source pixels (end exclusive).
    /// May be repeated; regions are applied in order.
    #[arg(short, long = "region", value_name = "X0,Y0,X1,Y1", value_parser = parse_region)]
    pub regions: Vec<Region>,

    /// Mosaic cell size in pixels.
    #[arg(short, long = "block", default_value_t = DEFAULT_BLOCK_SIZE,
          value_parser = clap::value_parser!(u32).range(1..=BLOCK_SIZE_MAX as i64 * 100))]
    pub block_size: u32,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    /// Files are written here with the original stem and the target format's extension.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: png, jpeg, bmp, tga, tiff, ico, gif.
    /// When omitted, the format is inferred from --output's extension, defaulting to png.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG quality (1–100, default 90).
    #[arg(short, long, default_value_t = 90, value_name = "1-100")]
    pub quality: u8,

    /// Print per-file timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Returns `true` when any CLI-mode flag is present in the real process arguments.
    /// Used by `main()` to route before creating an eframe window.
    pub fn is_cli_mode() -> bool {
        std::env::args().any(|a| a == "--input" || a == "-i")
    }
}

/// Parse `x0,y0,x1,y1`.
pub fn parse_region(s: &str) -> Result<Region, String> {
    let parts: Vec<u32> = s
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("'{}': {}", s, e))?;
    let &[x0, y0, x1, y1] = parts.as_slice() else {
        return Err(format!("'{}': expected four numbers x0,y0,x1,y1", s));
    };
    let region = Region::new((x0, y0), (x1, y1));
    if !region.is_well_formed() {
        return Err(format!("'{}': x1 must be greater than x0 and y1 greater than y0", s));
    }
    Ok(region)
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    if args.regions.is_empty() {
        eprintln!("warning: no --region given; images are only re-encoded.");
    }

    let save_format = match parse_format(args.format.as_deref(), args.output.as_deref()) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!(
            "error: could not create output directory '{}': {}",
            dir.display(),
            e
        );
        return ExitCode::FAILURE;
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }

        let file_start = Instant::now();

        let Some(output_path) = build_output_path(
            input_path,
            args.output.as_deref(),
            args.output_dir.as_deref(),
            save_format,
        ) else {
            eprintln!(
                "  error: cannot determine output path for '{}'.",
                input_path.display()
            );
            any_failure = true;
            continue;
        };

        match run_one(
            input_path,
            &output_path,
            &args.regions,
            args.block_size,
            save_format,
            args.quality,
        ) {
            Ok(applied) => {
                if args.verbose || multi {
                    println!(
                        "  → {} ({} region(s), {:.0}ms)",
                        output_path.display(),
                        applied,
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

/// Load, mosaic every region, save. Returns how many regions touched the image.
fn run_one(
    input: &Path,
    output: &Path,
    regions: &[Region],
    block_size: u32,
    format: SaveFormat,
    quality: u8,
) -> Result<usize, String> {
    let mut image = load_image_sync(input).map_err(|e| format!("load failed: {}", e))?;

    let (w, h) = image.dimensions();
    let mut applied = 0;
    for region in regions {
        if region.clipped(w, h).is_none() {
            eprintln!(
                "  warning: region {:?}-{:?} lies outside the {}x{} image, skipped.",
                region.start, region.end, w, h
            );
            continue;
        }
        mosaic(&mut image, *region, block_size);
        applied += 1;
    }

    encode_and_write(&image, output, format, quality).map_err(|e| format!("save failed: {}", e))?;
    Ok(applied)
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Choose the [`SaveFormat`] from the `--format` string or infer it from the
/// output file extension. Defaults to PNG when neither is given.
fn parse_format(format_arg: Option<&str>, output: Option<&Path>) -> Result<SaveFormat, String> {
    if let Some(f) = format_arg {
        return SaveFormat::from_name(f).ok_or_else(|| format!("unknown format '{}'", f));
    }
    match output {
        Some(path) => save_format_for(path),
        None => Ok(SaveFormat::Png),
    }
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, derives filename from input stem)
/// 3. Fallback: next to the input as `<stem>_mosaic.<ext>`
fn build_output_path(
    input: &Path,
    output: Option<&Path>,
    output_dir: Option<&Path>,
    format: SaveFormat,
) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let ext = format.extension();
    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.{}", stem, ext)));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    Some(parent.join(format!("{}_mosaic.{}", stem, ext)))
}
