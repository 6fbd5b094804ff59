pub mod mosaic;
