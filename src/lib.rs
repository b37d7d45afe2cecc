//! DeckForge Core - Card Sheets and Scene Documents
//!
//! Turns a catalog of games, collections, decks and card images into:
//! - Sheet images: up to 69 cards per image plus the deck's back face
//! - A scene document: nested bags, decks and cards pointing at those sheets
//!
//! # Rules
//! 1. Same catalog, same order in, same document out
//! 2. Every deck index is unique across a run
//! 3. One run at a time
//! 4. Progress is observable, failures are recorded, never thrown at pollers

pub mod catalog;
pub mod generator;
pub mod grid;
pub mod hashing;
pub mod page;
pub mod progress;
pub mod push;
pub mod remap;
pub mod scene;
pub mod settings;

pub use catalog::{Catalog, CatalogError, ManifestCatalog, SortOrder};
pub use generator::{GenerateError, GenerateRequest, GenerationReport, Generator};
pub use grid::{grid_for, Grid, PAGE_CAPACITY};
pub use page::{DrawError, DrawOptions, PageDrawer};
pub use progress::{JobSnapshot, JobStatus, ProgressTracker};
pub use push::{PushChannel, PushError};
pub use remap::{prepare, replace, Mapping, RemapError};
pub use scene::{Bag, RootObjects, SceneCard, SceneDeck, SceneObject};
pub use settings::{Config, Settings, SettingsError, SettingsFile, SettingsSource};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
