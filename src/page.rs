//! Page Drawer - Composing Card Sheets
//!
//! A drawer fills one sheet with card faces. When it fills up mid-deck the
//! next sheet is created with [`PageDrawer::inherit`], which carries the
//! backside and card size over so every sheet of a deck matches.
//!
//! Sheet layout: cards row-major from the top-left, darkened backside in
//! the bottom-right cell.

use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbaImage};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::grid::{grid_for, Grid, MAX_COLUMNS, MAX_ROWS, PAGE_CAPACITY};
use crate::hashing::short_content_hash;

/// No sheet side may exceed this many pixels
pub const MAX_SHEET_SIDE: u32 = 10_000;

/// Brightness shift applied to the backside, about -30% of full range
pub const BACKSIDE_DARKEN: i32 = -77;

#[derive(Debug, Error)]
pub enum DrawError {
    #[error("Failed to decode image: {0}")]
    ImageDecode(#[source] image::ImageError),

    #[error("Page is full ({0} cards)")]
    PageFull(usize),

    #[error("Failed to encode sheet {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A sheet written to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedSheet {
    pub path: PathBuf,
    pub grid: Grid,
}

/// Options shared by every sheet of a lineage
#[derive(Debug, Clone)]
pub struct DrawOptions {
    /// Integer divisor applied to the card size; 0 is treated as 1
    pub scale: u32,
    /// Darken the back face before compositing
    pub back_shadow: bool,
}

impl Default for DrawOptions {
    fn default() -> Self {
        Self { scale: 1, back_shadow: true }
    }
}

pub struct PageDrawer {
    deck_id: String,
    out_dir: PathBuf,
    options: DrawOptions,
    /// 1-based position of this sheet within its deck
    index: u32,

    images: Vec<RgbaImage>,
    backside: Option<Arc<RgbaImage>>,
    backside_path: Option<PathBuf>,
    /// Reference card size for the lineage, fixed once known
    card_size: Option<(u32, u32)>,
}

impl PageDrawer {
    pub fn new(deck_id: impl Into<String>, out_dir: impl Into<PathBuf>, options: DrawOptions) -> Self {
        Self {
            deck_id: deck_id.into(),
            out_dir: out_dir.into(),
            options,
            index: 1,
            images: vec![],
            backside: None,
            backside_path: None,
            card_size: None,
        }
    }

    /// Next sheet of the same deck: same backside and card size, index + 1
    pub fn inherit(previous: &PageDrawer) -> Self {
        Self {
            deck_id: previous.deck_id.clone(),
            out_dir: previous.out_dir.clone(),
            options: previous.options.clone(),
            index: previous.index + 1,
            images: vec![],
            backside: previous.backside.clone(),
            backside_path: previous.backside_path.clone(),
            card_size: previous.card_size,
        }
    }

    pub fn deck_id(&self) -> &str {
        &self.deck_id
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn size(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.images.len() >= PAGE_CAPACITY
    }

    pub fn has_backside(&self) -> bool {
        self.backside.is_some()
    }

    pub fn backside_path(&self) -> Option<&Path> {
        self.backside_path.as_deref()
    }

    pub fn card_size(&self) -> Option<(u32, u32)> {
        self.card_size
    }

    /// Decode and keep the deck's back face, and write the original bytes to
    /// `backside_{deck}_{hash}.png`. Returns the absolute path of that file.
    ///
    /// The first call in a lineage also fixes the reference card size.
    pub fn set_backside(&mut self, raw: &[u8]) -> Result<PathBuf, DrawError> {
        let decoded = image::load_from_memory(raw).map_err(DrawError::ImageDecode)?.to_rgba8();

        let (width, height) = match self.card_size {
            Some(size) => size,
            None => {
                let size = reference_size(decoded.width(), decoded.height(), self.options.scale);
                self.card_size = Some(size);
                size
            }
        };

        let shaded = if self.options.back_shadow {
            imageops::colorops::brighten(&decoded, BACKSIDE_DARKEN)
        } else {
            decoded
        };
        self.backside = Some(Arc::new(fit(shaded, width, height)));

        let name = format!("backside_{}_{}.png", self.deck_id, short_content_hash(raw));
        let path = self.out_dir.join(name);
        fs::write(&path, raw).map_err(|source| DrawError::Io { path: path.clone(), source })?;
        let path = absolute(&path)?;

        debug!(deck_id = %self.deck_id, path = %path.display(), "Backside saved");
        self.backside_path = Some(path.clone());
        Ok(path)
    }

    /// Decode a card face and place it in the next free slot, resized to the
    /// lineage's card size when it differs.
    pub fn add_image(&mut self, raw: &[u8]) -> Result<(), DrawError> {
        if self.is_full() {
            return Err(DrawError::PageFull(PAGE_CAPACITY));
        }

        let decoded = image::load_from_memory(raw).map_err(DrawError::ImageDecode)?.to_rgba8();
        let (width, height) = match self.card_size {
            Some(size) => size,
            None => {
                let size = reference_size(decoded.width(), decoded.height(), self.options.scale);
                self.card_size = Some(size);
                size
            }
        };

        self.images.push(fit(decoded, width, height));
        Ok(())
    }

    /// Compose and write the sheet. An empty drawer writes nothing.
    pub fn save(&self) -> Result<Option<SavedSheet>, DrawError> {
        let Some((width, height)) = self.card_size.filter(|_| !self.is_empty()) else {
            return Ok(None);
        };

        // One extra cell for the back face
        let grid = grid_for(self.size() + 1);
        let mut sheet = RgbaImage::new(grid.columns * width, grid.rows * height);

        for (id, card) in self.images.iter().enumerate() {
            let (column, row) = grid.position(id as u32);
            draw(&mut sheet, card, column * width, row * height);
        }

        let (column, row) = grid.last_cell();
        match &self.backside {
            Some(backside) if backside.dimensions() == (width, height) => {
                draw(&mut sheet, backside, column * width, row * height);
            }
            Some(backside) => {
                let resized = imageops::resize(&**backside, width, height, FilterType::Lanczos3);
                draw(&mut sheet, &resized, column * width, row * height);
            }
            None => warn!(deck_id = %self.deck_id, sheet = self.index, "Sheet saved without backside"),
        }

        let name = format!(
            "{}_{}_{}_{}x{}.png",
            self.deck_id,
            self.index,
            self.size(),
            grid.columns,
            grid.rows
        );
        let path = self.out_dir.join(name);
        sheet
            .save_with_format(&path, ImageFormat::Png)
            .map_err(|source| DrawError::Encode { path: path.clone(), source })?;
        let path = absolute(&path)?;

        debug!(deck_id = %self.deck_id, sheet = self.index, cards = self.size(), path = %path.display(), "Sheet saved");
        Ok(Some(SavedSheet { path, grid }))
    }
}

/// Card size for a lineage: shrunk so the largest grid stays within
/// [`MAX_SHEET_SIDE`], then divided by the integer scale.
pub fn reference_size(width: u32, height: u32, scale: u32) -> (u32, u32) {
    let width_limit = MAX_SHEET_SIDE as f64 / (width.max(1) * MAX_COLUMNS) as f64;
    let height_limit = MAX_SHEET_SIDE as f64 / (height.max(1) * MAX_ROWS) as f64;
    let ratio = width_limit.min(height_limit).min(1.0);

    let scale = scale.max(1);
    let scaled = |side: u32| (((side as f64 * ratio).trunc() as u32) / scale).max(1);
    (scaled(width), scaled(height))
}

fn fit(image: RgbaImage, width: u32, height: u32) -> RgbaImage {
    if image.dimensions() == (width, height) {
        return image;
    }
    imageops::resize(&image, width, height, FilterType::Lanczos3)
}

fn draw(sheet: &mut RgbaImage, image: &RgbaImage, x: u32, y: u32) {
    imageops::replace(sheet, image, x as i64, y as i64);
}

fn absolute(path: &Path) -> Result<PathBuf, DrawError> {
    fs::canonicalize(path).map_err(|source| DrawError::Io { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::io::Cursor;

    fn png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba(color));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    const RED: [u8; 4] = [200, 0, 0, 255];
    const GREEN: [u8; 4] = [0, 200, 0, 255];
    const GREY: [u8; 4] = [150, 150, 150, 255];

    #[test]
    fn test_reference_size() {
        assert_eq!(reference_size(40, 60, 1), (40, 60));
        assert_eq!(reference_size(40, 60, 2), (20, 30));
        assert_eq!(reference_size(40, 60, 0), (40, 60));
        // 2000 * 10 columns would be 20k wide
        let (w, h) = reference_size(2000, 1000, 1);
        assert!(w * MAX_COLUMNS <= MAX_SHEET_SIDE);
        assert!(h * MAX_ROWS <= MAX_SHEET_SIDE);
        assert_eq!(w, 1000);
        assert_eq!(h, 500);
    }

    #[test]
    fn test_capacity_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let mut page = PageDrawer::new("deck", dir.path(), DrawOptions::default());
        let card = png(2, 3, RED);

        for _ in 0..PAGE_CAPACITY {
            assert!(!page.is_full());
            page.add_image(&card).unwrap();
        }
        assert_eq!(page.size(), 69);
        assert!(page.is_full());
        assert!(matches!(page.add_image(&card), Err(DrawError::PageFull(69))));
        assert_eq!(page.size(), 69);
    }

    #[test]
    fn test_empty_save_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let page = PageDrawer::new("deck", dir.path(), DrawOptions::default());
        assert_eq!(page.save().unwrap(), None);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_save_layout_and_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut page = PageDrawer::new("loot", dir.path(), DrawOptions::default());
        let back_path = page.set_backside(&png(4, 6, GREY)).unwrap();
        for _ in 0..3 {
            page.add_image(&png(4, 6, RED)).unwrap();
        }

        let saved = page.save().unwrap().unwrap();
        assert_eq!(saved.grid, Grid { columns: 2, rows: 2 });
        assert_eq!(saved.path.file_name().unwrap(), "loot_1_3_2x2.png");
        assert!(back_path.is_absolute());
        assert!(back_path.file_name().unwrap().to_string_lossy().starts_with("backside_loot_"));

        let sheet = image::open(&saved.path).unwrap().to_rgba8();
        assert_eq!(sheet.dimensions(), (8, 12));
        assert_eq!(sheet.get_pixel(0, 0).0, RED);
        assert_eq!(sheet.get_pixel(4, 0).0, RED);
        assert_eq!(sheet.get_pixel(0, 6).0, RED);
        // Darkened backside in the last cell
        assert_eq!(sheet.get_pixel(5, 8).0, [73, 73, 73, 255]);
    }

    #[test]
    fn test_back_shadow_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let options = DrawOptions { scale: 1, back_shadow: false };
        let mut page = PageDrawer::new("loot", dir.path(), options);
        page.set_backside(&png(4, 6, GREY)).unwrap();
        page.add_image(&png(4, 6, RED)).unwrap();

        let saved = page.save().unwrap().unwrap();
        let sheet = image::open(&saved.path).unwrap().to_rgba8();
        assert_eq!(sheet.get_pixel(5, 8).0, GREY);
    }

    #[test]
    fn test_mismatched_cards_are_resized() {
        let dir = tempfile::tempdir().unwrap();
        let mut page = PageDrawer::new("loot", dir.path(), DrawOptions::default());
        page.set_backside(&png(4, 6, GREY)).unwrap();
        page.add_image(&png(8, 12, GREEN)).unwrap();
        page.add_image(&png(2, 3, RED)).unwrap();

        let saved = page.save().unwrap().unwrap();
        let sheet = image::open(&saved.path).unwrap().to_rgba8();
        assert_eq!(sheet.dimensions(), (8, 12));
        assert_eq!(sheet.get_pixel(1, 1).0, GREEN);
        assert_eq!(sheet.get_pixel(5, 1).0, RED);
    }

    #[test]
    fn test_scale_divides_card_size() {
        let dir = tempfile::tempdir().unwrap();
        let options = DrawOptions { scale: 2, back_shadow: true };
        let mut page = PageDrawer::new("loot", dir.path(), options);
        page.set_backside(&png(8, 12, GREY)).unwrap();
        page.add_image(&png(8, 12, RED)).unwrap();
        assert_eq!(page.card_size(), Some((4, 6)));

        let saved = page.save().unwrap().unwrap();
        let sheet = image::open(&saved.path).unwrap().to_rgba8();
        assert_eq!(sheet.dimensions(), (8, 12));
    }

    #[test]
    fn test_inherit_carries_lineage() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = PageDrawer::new("loot", dir.path(), DrawOptions::default());
        let back = first.set_backside(&png(4, 6, GREY)).unwrap();
        first.add_image(&png(4, 6, RED)).unwrap();

        let second = PageDrawer::inherit(&first);
        assert_eq!(second.index(), 2);
        assert!(second.is_empty());
        assert!(second.has_backside());
        assert_eq!(second.backside_path(), Some(back.as_path()));
        assert_eq!(second.card_size(), Some((4, 6)));
    }

    #[test]
    fn test_corrupt_image_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut page = PageDrawer::new("loot", dir.path(), DrawOptions::default());
        assert!(matches!(page.add_image(b"not an image"), Err(DrawError::ImageDecode(_))));
        assert!(matches!(page.set_backside(b"nope"), Err(DrawError::ImageDecode(_))));
        assert!(page.is_empty());
    }
}
