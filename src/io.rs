use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tga::TgaEncoder;
use image::{DynamicImage, ImageEncoder, ImageError, RgbaImage};
use rfd::FileDialog;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Extensions offered by the Open dialog and accepted by drag-and-drop.
pub const OPEN_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "webp", "tiff", "tif", "tga",
];

/// Output formats the source buffer can be written as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SaveFormat {
    #[default]
    Png,
    Jpeg,
    Bmp,
    Tga,
    Tiff,
    Ico,
    Gif,
}

impl SaveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Png => "png",
            SaveFormat::Jpeg => "jpg",
            SaveFormat::Bmp => "bmp",
            SaveFormat::Tga => "tga",
            SaveFormat::Tiff => "tiff",
            SaveFormat::Ico => "ico",
            SaveFormat::Gif => "gif",
        }
    }

    pub fn label(&self) -> String {
        match self {
            SaveFormat::Png => t!("format.png"),
            SaveFormat::Jpeg => t!("format.jpeg"),
            SaveFormat::Bmp => t!("format.bmp"),
            SaveFormat::Tga => t!("format.tga"),
            SaveFormat::Tiff => t!("format.tiff"),
            SaveFormat::Ico => t!("format.ico"),
            SaveFormat::Gif => t!("format.gif"),
        }
    }

    pub fn all() -> &'static [SaveFormat] {
        &[
            SaveFormat::Png,
            SaveFormat::Jpeg,
            SaveFormat::Bmp,
            SaveFormat::Tga,
            SaveFormat::Tiff,
            SaveFormat::Ico,
            SaveFormat::Gif,
        ]
    }

    /// Parse a format name or file extension (case-insensitive).
    pub fn from_name(name: &str) -> Option<SaveFormat> {
        match name.to_lowercase().as_str() {
            "png" => Some(SaveFormat::Png),
            "jpg" | "jpeg" => Some(SaveFormat::Jpeg),
            "bmp" => Some(SaveFormat::Bmp),
            "tga" => Some(SaveFormat::Tga),
            "tiff" | "tif" => Some(SaveFormat::Tiff),
            "ico" => Some(SaveFormat::Ico),
            "gif" => Some(SaveFormat::Gif),
            _ => None,
        }
    }

    /// Format implied by the extension of `path`. PNG when there is no
    /// extension, `None` when the extension names no writable format.
    pub fn from_path(path: &Path) -> Option<SaveFormat> {
        match path.extension() {
            None => Some(SaveFormat::Png),
            Some(ext) => ext.to_str().and_then(SaveFormat::from_name),
        }
    }
}

/// Writable format for `path`, or a user-facing message naming the
/// unsupported extension.
pub fn save_format_for(path: &Path) -> Result<SaveFormat, String> {
    SaveFormat::from_path(path).ok_or_else(|| {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        t!("notice.unsupported_save", ext = ext)
    })
}

/// Decode an image file to RGBA.
pub fn load_image_sync(path: &Path) -> Result<RgbaImage, String> {
    let img = image::open(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    Ok(img.to_rgba8())
}

/// Shrink `image` to fit inside `max_w`×`max_h`, keeping its aspect ratio.
/// Images that already fit are returned unchanged (never upscaled).
pub fn fit_to_viewport(image: &RgbaImage, max_w: u32, max_h: u32) -> RgbaImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 || (w <= max_w && h <= max_h) {
        return image.clone();
    }
    let scale = (max_w as f64 / w as f64).min(max_h as f64 / h as f64);
    let new_w = ((w as f64 * scale).round() as u32).clamp(1, max_w.max(1));
    let new_h = ((h as f64 * scale).round() as u32).clamp(1, max_h.max(1));
    image::imageops::resize(image, new_w, new_h, image::imageops::FilterType::CatmullRom)
}

/// Give `path` a `.png` extension when it has none.
pub fn with_default_extension(path: PathBuf) -> PathBuf {
    if path.extension().is_some() {
        path
    } else {
        path.with_extension(SaveFormat::Png.extension())
    }
}

/// Default file name offered by the Save dialog for an input at `input`.
pub fn default_save_name(input: Option<&Path>, format: SaveFormat) -> String {
    let stem = input
        .and_then(|p| p.file_stem())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    format!("{}_mosaic.{}", stem, format.extension())
}

// ============================================================================
// THREAD-SAFE IMAGE ENCODING
// ============================================================================

/// Encode and write an image to a file.
/// This is a standalone function (no `&mut self`) so it can be called from
/// background threads via `rayon::spawn`.
pub fn encode_and_write(
    image: &RgbaImage,
    path: &Path,
    format: SaveFormat,
    quality: u8,
) -> Result<(), ImageError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    match format {
        SaveFormat::Png => {
            PngEncoder::new(&mut writer).write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        SaveFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb_image = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100));
            encoder.encode(
                rgb_image.as_raw(),
                rgb_image.width(),
                rgb_image.height(),
                image::ColorType::Rgb8,
            )?;
        }
        SaveFormat::Bmp => {
            let mut encoder = BmpEncoder::new(&mut writer);
            encoder.encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        SaveFormat::Tga => {
            let encoder = TgaEncoder::new(&mut writer);
            encoder.encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        SaveFormat::Tiff => {
            DynamicImage::ImageRgba8(image.clone())
                .write_to(&mut writer, image::ImageOutputFormat::Tiff)?;
        }
        SaveFormat::Ico => {
            // ICO entries limited to 256×256; scale down if needed
            let dyn_img = if image.width() > 256 || image.height() > 256 {
                DynamicImage::ImageRgba8(fit_to_viewport(image, 256, 256))
            } else {
                DynamicImage::ImageRgba8(image.clone())
            };
            dyn_img.write_to(&mut writer, image::ImageOutputFormat::Ico)?;
        }
        SaveFormat::Gif => {
            DynamicImage::ImageRgba8(image.clone())
                .write_to(&mut writer, image::ImageOutputFormat::Gif)?;
        }
    }

    Ok(())
}

// ============================================================================
// FILE HANDLER
// ============================================================================

pub struct FileHandler {
    /// Directory of the last opened / saved file, used to seed the dialogs
    pub last_dir: Option<PathBuf>,
    /// Format of the last save; seeds the next default file name
    pub last_format: SaveFormat,
}

impl Default for FileHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl FileHandler {
    pub fn new() -> Self {
        Self {
            last_dir: None,
            last_format: SaveFormat::Png,
        }
    }

    /// Show native file dialog to pick an image path (without loading it)
    pub fn pick_open_path(&mut self) -> Option<PathBuf> {
        let mut dialog = FileDialog::new()
            .set_title(t!("dialog.open_title"))
            .add_filter(t!("dialog.image_files"), OPEN_EXTENSIONS)
            .add_filter(t!("dialog.all_files"), &["*"]);
        if let Some(dir) = &self.last_dir {
            dialog = dialog.set_directory(dir);
        }
        let path = dialog.pick_file()?;
        self.last_dir = path.parent().map(Path::to_path_buf);
        Some(path)
    }

    /// Show native save dialog for an image opened from `input`. The
    /// suggested name uses the format of the previous save; a path without
    /// an extension gets `.png`.
    pub fn pick_save_path(&mut self, input: Option<&Path>) -> Option<PathBuf> {
        let mut dialog = FileDialog::new()
            .set_title(t!("dialog.save_title"))
            .set_file_name(default_save_name(input, self.last_format));
        for format in SaveFormat::all() {
            dialog = dialog.add_filter(format.label(), &[format.extension()]);
        }
        if let Some(dir) = &self.last_dir {
            dialog = dialog.set_directory(dir);
        }
        let path = with_default_extension(dialog.save_file()?);
        self.last_dir = path.parent().map(Path::to_path_buf);
        if let Some(format) = SaveFormat::from_path(&path) {
            self.last_format = format;
        }
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn fit_keeps_aspect_and_never_upscales() {
        let wide = RgbaImage::new(1600, 900);
        assert_eq!(fit_to_viewport(&wide, 800, 600).dimensions(), (800, 450));

        let tall = RgbaImage::new(1000, 3000);
        assert_eq!(fit_to_viewport(&tall, 800, 600).dimensions(), (200, 600));

        let small = RgbaImage::new(320, 200);
        assert_eq!(fit_to_viewport(&small, 800, 600).dimensions(), (320, 200));

        let sliver = RgbaImage::new(10_000, 3);
        assert_eq!(fit_to_viewport(&sliver, 800, 600).dimensions(), (800, 1));
    }

    #[test]
    fn format_inferred_from_extension() {
        assert_eq!(SaveFormat::from_path(Path::new("a/b.JPG")), Some(SaveFormat::Jpeg));
        assert_eq!(SaveFormat::from_path(Path::new("b.tif")), Some(SaveFormat::Tiff));
        assert_eq!(SaveFormat::from_path(Path::new("b.bmp")), Some(SaveFormat::Bmp));
        assert_eq!(SaveFormat::from_path(Path::new("b.gif")), Some(SaveFormat::Gif));
        assert_eq!(SaveFormat::from_path(Path::new("noext")), Some(SaveFormat::Png));
        assert_eq!(SaveFormat::from_path(Path::new("b.webp")), None);
        assert_eq!(SaveFormat::from_path(Path::new("b.jpe")), None);
        assert_eq!(SaveFormat::from_name("jpeg"), Some(SaveFormat::Jpeg));
        assert_eq!(SaveFormat::from_name("pfe"), None);
    }

    #[test]
    fn default_extension_and_name() {
        assert_eq!(with_default_extension(PathBuf::from("out")), PathBuf::from("out.png"));
        assert_eq!(with_default_extension(PathBuf::from("out.jpg")), PathBuf::from("out.jpg"));
        let input = Some(Path::new("/x/cat.jpeg"));
        assert_eq!(default_save_name(input, SaveFormat::Png), "cat_mosaic.png");
        assert_eq!(default_save_name(input, SaveFormat::Jpeg), "cat_mosaic.jpg");
        assert_eq!(default_save_name(None, SaveFormat::Png), "image_mosaic.png");
    }

    #[test]
    fn unsupported_save_extension_is_an_error() {
        crate::i18n::init();
        assert_eq!(save_format_for(Path::new("out.gif")), Ok(SaveFormat::Gif));
        assert_eq!(save_format_for(Path::new("out")), Ok(SaveFormat::Png));
        let err = save_format_for(Path::new("cat.webp")).unwrap_err();
        assert!(err.contains("webp"), "{err}");
    }

    #[test]
    fn gif_save_writes_real_gif() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.gif");
        let img = RgbaImage::from_fn(12, 9, |x, _| {
            if x < 6 { Rgba([255, 0, 0, 255]) } else { Rgba([0, 0, 255, 255]) }
        });

        let format = SaveFormat::from_path(&path).unwrap();
        encode_and_write(&img, &path, format, 90).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), image::ImageFormat::Gif);
        assert_eq!(load_image_sync(&path).unwrap().dimensions(), (12, 9));
    }

    #[test]
    fn png_written_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let img = RgbaImage::from_fn(7, 5, |x, y| Rgba([x as u8 * 30, y as u8 * 40, 9, 255]));

        encode_and_write(&img, &path, SaveFormat::Png, 90).unwrap();
        assert_eq!(load_image_sync(&path).unwrap(), img);
    }

    #[test]
    fn jpeg_and_bmp_write_decodable_files() {
        let dir = tempfile::tempdir().unwrap();
        let img = RgbaImage::from_pixel(16, 12, Rgba([120, 60, 30, 255]));
        for format in [SaveFormat::Jpeg, SaveFormat::Bmp, SaveFormat::Tga] {
            let path = dir.path().join(format!("out.{}", format.extension()));
            encode_and_write(&img, &path, format, 85).unwrap();
            assert_eq!(load_image_sync(&path).unwrap().dimensions(), (16, 12));
        }
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_image_sync(Path::new("/definitely/not/here.png")).unwrap_err();
        assert!(err.contains("here.png"));
    }
}
