//! MosaicTool — open an image, drag rectangles over it to pixelate them,
//! save the full-resolution result.

#[macro_use]
pub mod i18n;
#[macro_use]
pub mod logger;
pub mod app;
pub mod cli;
pub mod io;
pub mod ops;
pub mod session;
pub mod settings;
