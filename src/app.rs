use crate::io::{FileHandler, OPEN_EXTENSIONS, SaveFormat};
use crate::session::{BLOCK_SIZE_MAX, BLOCK_SIZE_MIN, MosaicSession};
use crate::settings::AppSettings;
use eframe::egui;
use egui::{Color32, Pos2, Rect, Stroke, TextureFilter, TextureOptions};
use image::RgbaImage;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

/// Delay before a queued pointer move is drawn.
const REDRAW_DELAY: Duration = Duration::from_millis(1);

// ============================================================================
// ASYNC IO PIPELINE — background image loading / saving
// ============================================================================

/// Result delivered from a background IO thread.
pub enum IoResult {
    /// An image file was decoded and is ready to become the session.
    ImageLoaded { image: RgbaImage, path: PathBuf },
    /// Image decoding failed.
    LoadFailed(String),
    /// The source buffer was written. `generation` is the display generation
    /// the saved pixels belong to.
    SaveComplete { path: PathBuf, generation: u64 },
    /// Image save failed.
    SaveFailed(String),
}

pub struct MosaicApp {
    /// Currently opened image, if any
    session: Option<MosaicSession>,

    file_handler: FileHandler,
    settings: AppSettings,
    /// Settings changed while a pointer button was held; written on release.
    settings_dirty: bool,

    /// Slider value, mirrored into the session
    block_size: u32,

    // Display texture, re-uploaded when the session's display generation moves on
    display_texture: Option<egui::TextureHandle>,
    uploaded_generation: u64,

    io_sender: mpsc::Sender<IoResult>,
    io_receiver: mpsc::Receiver<IoResult>,
    /// When > 0, a background IO job is in progress; show spinner.
    pending_io_ops: usize,
    io_status: String,

    /// Message shown in the modal notice window
    notice: Option<String>,
    /// True while the quit confirmation is shown.
    pending_exit: bool,
    /// True after the user confirmed quitting — lets the next close request through.
    force_exit: bool,

    first_frame: bool,
    /// File given on the command line, opened on the first frame.
    pending_startup_file: Option<PathBuf>,
}

/// Discover a system CJK font at runtime so the Japanese UI renders.
/// Returns `(font_name, font_bytes)` if found.
fn discover_system_cjk_font() -> Option<(String, Vec<u8>)> {
    let candidates: &[&str] = &[
        #[cfg(target_os = "windows")]
        "C:\\Windows\\Fonts\\YuGothR.ttc",
        #[cfg(target_os = "windows")]
        "C:\\Windows\\Fonts\\meiryo.ttc",
        #[cfg(target_os = "windows")]
        "C:\\Windows\\Fonts\\msgothic.ttc",
        #[cfg(target_os = "linux")]
        "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
        #[cfg(target_os = "linux")]
        "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
        #[cfg(target_os = "linux")]
        "/usr/share/fonts/google-noto-cjk/NotoSansCJK-Regular.ttc",
        #[cfg(target_os = "linux")]
        "/usr/share/fonts/truetype/droid/DroidSansFallbackFull.ttf",
        #[cfg(target_os = "macos")]
        "/System/Library/Fonts/ヒラギノ角ゴシック W3.ttc",
        #[cfg(target_os = "macos")]
        "/System/Library/Fonts/HiraginoSans-W3.ttc",
    ];

    for path in candidates {
        if let Ok(data) = std::fs::read(path)
            && data.len() > 100
        {
            return Some(("system_cjk".to_string(), data));
        }
    }
    None
}

/// Map a screen position over the image rect to display-buffer pixels.
/// Positions past the edges clamp to `[0, w] × [0, h]`.
fn screen_to_image(rect: Rect, pos: Pos2, (w, h): (u32, u32)) -> (u32, u32) {
    let local = pos - rect.min;
    let x = local.x.floor().max(0.0) as u32;
    let y = local.y.floor().max(0.0) as u32;
    (x.min(w), y.min(h))
}

fn image_to_screen(rect: Rect, (x, y): (u32, u32)) -> Pos2 {
    rect.min + egui::vec2(x as f32, y as f32)
}

impl MosaicApp {
    pub fn new(cc: &eframe::CreationContext<'_>, startup_file: Option<PathBuf>) -> Self {
        let settings = AppSettings::load();

        if settings.language.is_empty() {
            let detected = crate::i18n::detect_system_language();
            crate::i18n::set_language(&detected);
        } else {
            crate::i18n::set_language(&settings.language);
        }

        if let Some((name, data)) = discover_system_cjk_font() {
            let mut fonts = egui::FontDefinitions::default();
            fonts
                .font_data
                .insert(name.clone(), egui::FontData::from_owned(data));
            fonts
                .families
                .entry(egui::FontFamily::Proportional)
                .or_default()
                .push(name);
            cc.egui_ctx.set_fonts(fonts);
        } else {
            crate::log_warn!("No CJK font found; Japanese labels may not render");
        }

        let (io_sender, io_receiver) = mpsc::channel();

        Self {
            session: None,
            file_handler: FileHandler::new(),
            block_size: settings.block_size,
            settings,
            settings_dirty: false,
            display_texture: None,
            uploaded_generation: 0,
            io_sender,
            io_receiver,
            pending_io_ops: 0,
            io_status: String::new(),
            notice: None,
            pending_exit: false,
            force_exit: false,
            first_frame: true,
            pending_startup_file: startup_file,
        }
    }

    fn is_dirty(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_dirty)
    }

    fn notify(&mut self, message: String) {
        self.notice = Some(message);
    }

    fn request_quit(&mut self, ctx: &egui::Context) {
        if self.settings.confirm_on_exit {
            self.pending_exit = true;
        } else {
            self.force_exit = true;
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
    }
}

impl eframe::App for MosaicApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // --- Window title: "MosaicTool - <file>[*]" ---
        {
            let title = match &self.session {
                Some(session) => format!("{} - {}", t!("app.title"), session.display_title()),
                None => t!("app.title"),
            };
            ctx.send_viewport_cmd(egui::ViewportCommand::Title(title));
        }

        // --- Intercept OS window-close button ---
        if ctx.input(|i| i.viewport().close_requested())
            && !self.force_exit
            && self.settings.confirm_on_exit
            && self.is_dirty()
        {
            ctx.send_viewport_cmd(egui::ViewportCommand::CancelClose);
            self.pending_exit = true;
        }

        // --- Startup: open the file from the command line, or ask for one ---
        if self.first_frame {
            self.first_frame = false;
            match self.pending_startup_file.take() {
                Some(path) => self.open_file_by_path(path),
                None => {
                    if !self.handle_open_file() {
                        self.notify(t!("notice.no_file"));
                    }
                }
            }
        }

        // --- Poll async IO results (image load / save) ---
        while let Ok(result) = self.io_receiver.try_recv() {
            self.pending_io_ops = self.pending_io_ops.saturating_sub(1);
            if self.pending_io_ops == 0 {
                self.io_status.clear();
            }
            match result {
                IoResult::ImageLoaded { image, path } => {
                    let (w, h) = image.dimensions();
                    let session =
                        MosaicSession::new(image, self.settings.viewport(), self.block_size)
                            .with_path(path.clone());
                    crate::log_info!(
                        "Opened {} ({}x{}, display {}x{}, scale {:.3})",
                        path.display(),
                        w,
                        h,
                        session.display().width(),
                        session.display().height(),
                        session.scale()
                    );
                    self.session = Some(session);
                    self.display_texture = None;
                    self.uploaded_generation = 0;
                }
                IoResult::LoadFailed(error) => {
                    crate::log_err!("Failed to open image: {}", error);
                    self.notify(t!("notice.load_failed", error = error));
                }
                IoResult::SaveComplete { path, generation } => {
                    crate::log_info!("Saved {}", path.display());
                    if let Some(session) = self.session.as_mut()
                        && session.display_generation() == generation
                    {
                        session.mark_clean();
                    }
                    self.notify(t!("notice.saved", path = path.display()));
                }
                IoResult::SaveFailed(error) => {
                    crate::log_err!("Failed to save: {}", error);
                    self.notify(t!("notice.save_failed", error = error));
                }
            }
            ctx.request_repaint();
        }

        // --- Drag-and-drop: open the first dropped image ---
        let dropped: Vec<PathBuf> = ctx.input(|i| {
            i.raw
                .dropped_files
                .iter()
                .filter_map(|f| f.path.clone())
                .collect()
        });
        if let Some(path) = dropped.into_iter().next() {
            let supported = path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .is_some_and(|e| OPEN_EXTENSIONS.contains(&e.as_str()));
            if supported {
                self.open_file_by_path(path);
            } else {
                let name = path
                    .file_name()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.notify(t!("notice.unsupported_drop", name = name));
            }
        }

        self.show_controls(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::both().show(ui, |ui| {
                self.show_canvas(ui);
            });
        });

        self.show_notice(ctx);
        self.show_quit_dialog(ctx);

        // Persist slider changes once the pointer is released.
        if self.settings_dirty && !ctx.input(|i| i.pointer.any_down()) {
            self.settings_dirty = false;
            self.settings.save();
        }
    }
}

impl MosaicApp {
    /// Bottom strip: Open on the left; size slider, Save and Quit on the right.
    fn show_controls(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("controls").show(ctx, |ui| {
            ui.add_space(4.0);
            ui.horizontal(|ui| {
                if ui.button(t!("button.open")).clicked() {
                    self.handle_open_file();
                }
                if self.pending_io_ops > 0 {
                    ui.spinner();
                    ui.label(self.io_status.as_str());
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button(t!("button.quit")).clicked() {
                        self.request_quit(ctx);
                    }
                    let can_save = self.session.is_some();
                    if ui
                        .add_enabled(can_save, egui::Button::new(t!("button.save")))
                        .clicked()
                    {
                        self.handle_save();
                    }
                    let slider = ui.add(egui::Slider::new(
                        &mut self.block_size,
                        BLOCK_SIZE_MIN..=BLOCK_SIZE_MAX,
                    ));
                    if slider.changed() {
                        if let Some(session) = self.session.as_mut() {
                            session.set_block_size(self.block_size);
                        }
                        self.settings.block_size = self.block_size;
                        self.settings_dirty = true;
                    }
                    ui.label(t!("label.mosaic_size"));
                });
            });
            ui.add_space(4.0);
        });
    }

    /// Display image plus rubber-band overlay; turns primary-button drags
    /// into session press/move/release calls.
    fn show_canvas(&mut self, ui: &mut egui::Ui) {
        let Some(session) = self.session.as_mut() else {
            ui.vertical_centered(|ui| {
                ui.add_space(ui.available_height() * 0.4);
                ui.label(t!("label.open_hint"));
                ui.label(egui::RichText::new(t!("label.drop_hint")).weak());
            });
            return;
        };

        // Coalesced redraw: only the newest queued pointer position is drawn.
        session.redraw_tick();

        let generation = session.display_generation();
        if self.display_texture.is_none() || self.uploaded_generation != generation {
            let display = session.display();
            let color_image = egui::ColorImage::from_rgba_unmultiplied(
                [display.width() as usize, display.height() as usize],
                display.as_raw(),
            );
            let options = TextureOptions {
                magnification: TextureFilter::Nearest,
                minification: TextureFilter::Nearest,
                ..Default::default()
            };
            match self.display_texture {
                Some(ref mut tex) => tex.set(color_image, options),
                None => {
                    self.display_texture =
                        Some(ui.ctx().load_texture("mosaic_display", color_image, options));
                }
            }
            self.uploaded_generation = generation;
        }
        let Some(texture) = &self.display_texture else {
            return;
        };

        let dims = session.display().dimensions();
        let size = egui::vec2(dims.0 as f32, dims.1 as f32);
        let (response, painter) = ui.allocate_painter(size, egui::Sense::click_and_drag());
        let rect = response.rect;
        painter.image(
            texture.id(),
            rect,
            Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
            Color32::WHITE,
        );

        let primary = egui::PointerButton::Primary;
        if response.drag_started_by(primary)
            && let Some(origin) = ui
                .input(|i| i.pointer.press_origin())
                .or(response.interact_pointer_pos())
        {
            session.press(screen_to_image(rect, origin, dims));
        }
        if response.dragged_by(primary)
            && let Some(pos) = response.interact_pointer_pos()
            && session.drag_to(screen_to_image(rect, pos, dims))
        {
            ui.ctx().request_repaint_after(REDRAW_DELAY);
        }
        if response.drag_released_by(primary)
            && let Some(pos) = response
                .interact_pointer_pos()
                .or(ui.input(|i| i.pointer.latest_pos()))
            && session.release(screen_to_image(rect, pos, dims))
        {
            ui.ctx().request_repaint();
        }

        if let Some((a, b)) = session.preview_rect() {
            painter.rect_stroke(
                Rect::from_two_pos(image_to_screen(rect, a), image_to_screen(rect, b)),
                0.0,
                Stroke::new(3.0, Color32::BLUE),
            );
        }
    }

    fn show_notice(&mut self, ctx: &egui::Context) {
        let Some(message) = self.notice.clone() else {
            return;
        };
        let mut close = false;
        egui::Window::new(t!("dialog.notice"))
            .id(egui::Id::new("notice_window"))
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(message);
                ui.add_space(8.0);
                ui.vertical_centered(|ui| {
                    if ui.button(t!("button.ok")).clicked() {
                        close = true;
                    }
                });
            });
        if close {
            self.notice = None;
        }
    }

    fn show_quit_dialog(&mut self, ctx: &egui::Context) {
        if !self.pending_exit {
            return;
        }
        let unsaved = self
            .session
            .as_ref()
            .filter(|s| s.is_dirty)
            .map(|s| s.name.clone());

        let mut do_exit = false;
        let mut do_cancel = false;
        egui::Window::new(t!("dialog.quit_title"))
            .id(egui::Id::new("quit_window"))
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(t!("dialog.quit_message"));
                if let Some(name) = &unsaved {
                    ui.label(
                        egui::RichText::new(t!("dialog.quit_unsaved", name = name))
                            .weak()
                            .italics(),
                    );
                }
                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    if ui.button(t!("button.yes")).clicked() {
                        do_exit = true;
                    }
                    if ui.button(t!("button.no")).clicked() {
                        do_cancel = true;
                    }
                });
            });
        if do_exit {
            self.pending_exit = false;
            self.force_exit = true;
            crate::log_info!("Quit confirmed");
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
        if do_cancel {
            self.pending_exit = false;
        }
    }
}

// ============================================================================
// FILE OPEN / SAVE
// ============================================================================

impl MosaicApp {
    /// Ask for an image and start opening it. Returns `false` when the
    /// picker was cancelled.
    fn handle_open_file(&mut self) -> bool {
        let Some(path) = self.file_handler.pick_open_path() else {
            return false;
        };
        self.open_file_by_path(path);
        true
    }

    /// Decode `path` on a background thread; the result replaces the session.
    fn open_file_by_path(&mut self, path: PathBuf) {
        self.file_handler.last_dir = path.parent().map(|p| p.to_path_buf());
        let sender = self.io_sender.clone();
        self.pending_io_ops += 1;
        self.io_status = t!("label.loading");
        rayon::spawn(move || match crate::io::load_image_sync(&path) {
            Ok(image) => {
                let _ = sender.send(IoResult::ImageLoaded { image, path });
            }
            Err(e) => {
                let _ = sender.send(IoResult::LoadFailed(e));
            }
        });
    }

    /// Ask for a destination and write the full-resolution source buffer
    /// there in the background.
    fn handle_save(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let Some(path) = self.file_handler.pick_save_path(session.path.as_deref()) else {
            return;
        };
        let format = match crate::io::save_format_for(&path) {
            Ok(format) => format,
            Err(message) => {
                crate::log_warn!("Refused to save {}: unsupported extension", path.display());
                self.notice = Some(t!("notice.save_failed", error = message));
                return;
            }
        };
        let image = session.source().clone();
        let generation = session.display_generation();
        let quality = self.settings.jpeg_quality;

        let sender = self.io_sender.clone();
        self.pending_io_ops += 1;
        self.io_status = t!("label.saving");
        rayon::spawn(move || {
            match crate::io::encode_and_write(&image, &path, format, quality) {
                Ok(()) => {
                    let _ = sender.send(IoResult::SaveComplete { path, generation });
                }
                Err(e) => {
                    let _ = sender.send(IoResult::SaveFailed(format!("{}", e)));
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screen_positions_clamp_to_image() {
        let rect = Rect::from_min_size(Pos2::new(10.0, 20.0), egui::vec2(100.0, 50.0));
        assert_eq!(screen_to_image(rect, Pos2::new(10.0, 20.0), (100, 50)), (0, 0));
        assert_eq!(screen_to_image(rect, Pos2::new(35.7, 44.2), (100, 50)), (25, 24));
        assert_eq!(screen_to_image(rect, Pos2::new(-5.0, 0.0), (100, 50)), (0, 0));
        assert_eq!(screen_to_image(rect, Pos2::new(500.0, 500.0), (100, 50)), (100, 50));
    }

    #[test]
    fn image_points_map_back_to_screen() {
        let rect = Rect::from_min_size(Pos2::new(10.0, 20.0), egui::vec2(100.0, 50.0));
        assert_eq!(image_to_screen(rect, (25, 24)), Pos2::new(35.0, 44.0));
    }
}
