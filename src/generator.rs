//! Generator - Sheets and Scene Document for One Game
//!
//! A run walks the catalog once to plan decks, then makes two passes over
//! the plan in the same order:
//!
//! 1. Image pass: draw and save sheets, remembering each as a [`PageInfo`].
//! 2. Document pass: build bags, decks and cards that point at those sheets.
//!
//! Both passes split decks at the same card counts, so sheet numbering in the
//! document always matches the files on disk.
//!
//! CRITICAL: runs are strictly sequential. GUIDs, deck indices and sheet
//! names depend on processing order.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

use crate::catalog::{Catalog, CatalogError, DeckRecord, GameRecord, SortOrder};
use crate::grid::{Grid, PAGE_CAPACITY};
use crate::page::{DrawError, DrawOptions, PageDrawer};
use crate::progress::{JobStatus, ProgressTracker};
use crate::push::PushChannel;
use crate::scene::{Bag, DeckFace, RootObjects, SceneCard, SceneDeck, SceneObject, Transform};
use crate::settings::{Config, Settings, SettingsError, SettingsSource};

pub const JOB_TYPE: &str = "Image generation";

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("Generation is already in progress")]
    AlreadyRunning,

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Draw(#[from] DrawError),

    #[error("Sheet {0} was not generated")]
    MissingSheet(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Failed to start generator thread: {0}")]
    Spawn(#[source] std::io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default)]
    pub sort_order: SortOrder,
    #[serde(default = "default_scale")]
    pub scale: u32,
}

fn default_scale() -> u32 { 1 }

impl Default for GenerateRequest {
    fn default() -> Self {
        Self { sort_order: SortOrder::Name, scale: 1 }
    }
}

/// Grouping key for cards. Two keys are equal when their deck ids are.
#[derive(Debug, Clone)]
pub struct DeckKey {
    pub id: String,
    pub name: String,
    pub backside_image_url: String,
}

impl From<&DeckRecord> for DeckKey {
    fn from(deck: &DeckRecord) -> Self {
        Self {
            id: deck.id.clone(),
            name: deck.name.clone(),
            backside_image_url: deck.backside_image_url.clone(),
        }
    }
}

impl PartialEq for DeckKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DeckKey {}

impl Hash for DeckKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Pointer to one catalog card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardRef {
    pub game_id: String,
    pub collection_id: String,
    pub card_id: u64,
    pub count: u32,
}

/// Everything a run needs from the catalog, in processing order
#[derive(Debug, Clone)]
pub struct DeckPlan {
    pub game: GameRecord,
    pub decks: HashMap<DeckKey, Vec<CardRef>>,
    /// Distinct decks sorted by name
    pub order: Vec<DeckKey>,
    pub collection_names: HashMap<String, String>,
}

impl DeckPlan {
    pub fn cards(&self, deck: &DeckKey) -> &[CardRef] {
        self.decks.get(deck).map(Vec::as_slice).unwrap_or_default()
    }

    /// Distinct cards, i.e. sheet slots
    pub fn total_cards(&self) -> usize {
        self.decks.values().map(Vec::len).sum()
    }
}

/// One saved sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    pub index: u32,
    pub grid: Grid,
    pub sheet_path: PathBuf,
    pub backside_path: PathBuf,
}

fn page_key(deck_id: &str, index: u32) -> String {
    format!("{}_{}", deck_id, index)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationReport {
    pub document_path: PathBuf,
    pub sheets: usize,
    pub placements: usize,
}

/// Six-digit placement ids, increasing for the whole run
#[derive(Debug, Default)]
struct GuidSequence {
    last: u32,
}

impl GuidSequence {
    fn next(&mut self) -> String {
        self.last += 1;
        format!("{:06}", self.last)
    }
}

/// Collection bags in order of first use
#[derive(Debug, Default)]
struct CollectionBags {
    bags: Vec<Bag>,
    positions: HashMap<String, usize>,
}

impl CollectionBags {
    /// Place a finished deck accumulator; one-card decks go in as bare cards
    fn flush(&mut self, collection_id: &str, nickname: &str, deck: SceneDeck) {
        let Some(object) = deck.into_object() else {
            return;
        };
        let position = match self.positions.get(collection_id) {
            Some(&position) => position,
            None => {
                self.bags.push(Bag::new(nickname));
                self.positions.insert(collection_id.to_string(), self.bags.len() - 1);
                self.bags.len() - 1
            }
        };
        self.bags[position].push(object);
    }

    fn into_bags(self) -> Vec<Bag> {
        self.bags
    }
}

/// Clears the single-run flag however the run ends
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A validated run, ready for the background thread
struct PreparedRun {
    plan: DeckPlan,
    settings: Settings,
    request: GenerateRequest,
}

pub struct Generator<C> {
    catalog: Arc<C>,
    settings: Arc<dyn SettingsSource>,
    results_dir: PathBuf,
    tracker: Arc<ProgressTracker>,
    push: Arc<PushChannel>,
    running: Arc<AtomicBool>,
}

impl<C> Clone for Generator<C> {
    fn clone(&self) -> Self {
        Self {
            catalog: Arc::clone(&self.catalog),
            settings: Arc::clone(&self.settings),
            results_dir: self.results_dir.clone(),
            tracker: Arc::clone(&self.tracker),
            push: Arc::clone(&self.push),
            running: Arc::clone(&self.running),
        }
    }
}

impl<C: Catalog + 'static> Generator<C> {
    pub fn new(
        catalog: Arc<C>,
        settings: Arc<dyn SettingsSource>,
        config: &Config,
        tracker: Arc<ProgressTracker>,
        push: Arc<PushChannel>,
    ) -> Self {
        Self {
            catalog,
            settings,
            results_dir: config.results_dir.clone(),
            tracker,
            push,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }

    pub fn push_channel(&self) -> &Arc<PushChannel> {
        &self.push
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start a run in the background and return at once.
    ///
    /// Problems found before the run starts (unknown game, unreadable
    /// settings, a run already in flight) are returned here. Anything later
    /// ends up in the progress tracker as an error status.
    pub fn generate(&self, game_id: &str, request: GenerateRequest) -> Result<JoinHandle<()>, GenerateError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(GenerateError::AlreadyRunning);
        }
        let guard = RunningGuard(Arc::clone(&self.running));

        let prepared = self.prepare(game_id, request)?;

        self.tracker.set_type(JOB_TYPE);
        self.tracker.set_message("Reading a list of cards from the disk...");
        self.tracker.set_percent(0.0);
        self.tracker.set_status(JobStatus::InProgress);

        let generator = self.clone();
        let run_id = Uuid::new_v4();
        let span = info_span!("generation", %run_id, game_id = %prepared.plan.game.id);
        thread::Builder::new()
            .name("deck-generator".to_string())
            .spawn(move || {
                let _guard = guard;
                let _entered = span.enter();
                match generator.execute(&prepared) {
                    Ok(report) => {
                        info!(sheets = report.sheets, placements = report.placements, "Generation finished");
                        generator.tracker.set_status(JobStatus::Done);
                    }
                    Err(e) => {
                        error!("Generator: {}", e);
                        generator.tracker.set_message(e.to_string());
                        generator.tracker.set_status(JobStatus::Error);
                    }
                }
            })
            .map_err(GenerateError::Spawn)
    }

    /// Run to completion on the calling thread
    pub fn run(&self, game_id: &str, request: GenerateRequest) -> Result<GenerationReport, GenerateError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(GenerateError::AlreadyRunning);
        }
        let _guard = RunningGuard(Arc::clone(&self.running));

        let prepared = self.prepare(game_id, request)?;
        self.execute(&prepared)
    }

    fn prepare(&self, game_id: &str, request: GenerateRequest) -> Result<PreparedRun, GenerateError> {
        let settings = self.settings.settings()?;
        let game = self.catalog.game(game_id)?;
        let plan = self.plan(game, request.sort_order)?;

        // Each run starts from an empty results directory
        if self.results_dir.exists() {
            fs::remove_dir_all(&self.results_dir).map_err(|source| GenerateError::Io {
                path: self.results_dir.clone(),
                source,
            })?;
        }
        fs::create_dir_all(&self.results_dir).map_err(|source| GenerateError::Io {
            path: self.results_dir.clone(),
            source,
        })?;

        Ok(PreparedRun { plan, settings, request })
    }

    /// Collect card refs per deck. Decks are ordered by name regardless of
    /// how collections were listed; cards keep the catalog's order.
    pub fn plan(&self, game: GameRecord, order: SortOrder) -> Result<DeckPlan, GenerateError> {
        let mut decks: HashMap<DeckKey, Vec<CardRef>> = HashMap::new();
        let mut collection_names = HashMap::new();

        for collection in self.catalog.collections(&game.id, order)? {
            collection_names.insert(collection.id.clone(), collection.name.clone());
            for deck in self.catalog.decks(&game.id, &collection.id, order)? {
                let key = DeckKey::from(&deck);
                for card in self.catalog.cards(&game.id, &collection.id, &deck.id, order)? {
                    decks.entry(key.clone()).or_default().push(CardRef {
                        game_id: game.id.clone(),
                        collection_id: collection.id.clone(),
                        card_id: card.id,
                        count: card.count.max(1),
                    });
                }
            }
        }

        let mut sorted: Vec<DeckKey> = decks.keys().cloned().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        Ok(DeckPlan { game, decks, order: sorted, collection_names })
    }

    fn execute(&self, prepared: &PreparedRun) -> Result<GenerationReport, GenerateError> {
        let options = DrawOptions {
            scale: prepared.request.scale,
            back_shadow: prepared.settings.enable_back_shadow,
        };
        let pages = self.draw_sheets(&prepared.plan, &options)?;
        let (root, placements) = self.build_document(&prepared.plan, &pages, &prepared.settings)?;

        let document_path = self.results_dir.join(format!("{}.json", prepared.plan.game.id));
        let data = serde_json::to_vec_pretty(&root)?;
        fs::write(&document_path, data).map_err(|source| GenerateError::Io {
            path: document_path.clone(),
            source,
        })?;
        info!(path = %document_path.display(), "Document written");

        if let Some(game_bag) = root.object_states.first() {
            if let Err(e) = self.push.send(game_bag) {
                info!("Host not updated: {}", e);
            }
        }

        self.tracker.set_message("All image pages were successfully generated!");
        self.tracker.set_percent(100.0);
        Ok(GenerationReport { document_path, sheets: pages.len(), placements })
    }

    /// Image pass: one lineage of sheets per deck
    fn draw_sheets(&self, plan: &DeckPlan, options: &DrawOptions) -> Result<HashMap<String, PageInfo>, GenerateError> {
        let total = plan.total_cards().max(1);
        let mut processed = 0usize;
        let mut pages = HashMap::new();

        self.tracker.set_message("Drawing cards on the page...");
        for deck in &plan.order {
            let mut page = PageDrawer::new(&deck.id, &self.results_dir, options.clone());

            for card in plan.cards(deck) {
                if !page.has_backside() {
                    let raw = self.catalog.deck_image(&card.game_id, &card.collection_id, &deck.id)?;
                    page.set_backside(&raw)?;
                }

                if page.is_full() {
                    self.save_page(&page, &mut pages)?;
                    page = PageDrawer::inherit(&page);
                }

                let raw = self.catalog.card_image(&card.game_id, &card.collection_id, &deck.id, card.card_id)?;
                page.add_image(&raw)?;

                processed += 1;
                self.tracker.set_percent(processed as f32 / total as f32 * 100.0);
            }

            if !page.is_empty() {
                self.save_page(&page, &mut pages)?;
            }
        }
        Ok(pages)
    }

    fn save_page(&self, page: &PageDrawer, pages: &mut HashMap<String, PageInfo>) -> Result<(), GenerateError> {
        self.tracker.set_message("Saving the resulting page to disk...");
        let Some(saved) = page.save()? else {
            return Ok(());
        };
        let Some(backside_path) = page.backside_path() else {
            warn!(sheet = %saved.path.display(), "Sheet has no backside file");
            return Err(GenerateError::MissingSheet(format!("backside for {}", saved.path.display())));
        };

        let index = page.index();
        pages.insert(
            page_key(page.deck_id(), index),
            PageInfo {
                index,
                grid: saved.grid,
                sheet_path: saved.path,
                backside_path: backside_path.to_path_buf(),
            },
        );
        self.tracker.set_message("Drawing cards on the page...");
        Ok(())
    }

    /// Document pass: replays the image pass's sheet splits to assign deck
    /// indices, then groups placements into decks and collection bags.
    fn build_document(
        &self,
        plan: &DeckPlan,
        pages: &HashMap<String, PageInfo>,
        settings: &Settings,
    ) -> Result<(RootObjects, usize), GenerateError> {
        self.tracker.set_message("Building the scene document...");
        let transform = Transform::scaled(&settings.card_size);

        let mut collections = CollectionBags::default();
        let mut guids = GuidSequence::default();
        let mut deck_index_offset = 0u32;
        let mut placements = 0usize;

        for deck in &plan.order {
            let cards = plan.cards(deck);
            if cards.is_empty() {
                continue;
            }

            let mut sheet = 1u32;
            let mut slots = 0usize;
            let mut face = deck_face(pages, &deck.id, sheet)?;
            let mut scene_deck = SceneDeck::new(&deck.name, transform);
            scene_deck.custom_deck.insert(sheet + deck_index_offset, face.clone());
            let mut current_collection: Option<&str> = None;

            for card in cards {
                if slots == PAGE_CAPACITY {
                    sheet += 1;
                    slots = 0;
                    face = deck_face(pages, &deck.id, sheet)?;
                    scene_deck.custom_deck.insert(sheet + deck_index_offset, face.clone());
                }

                // Same deck id across collections: split at each collection change
                if let Some(previous) = current_collection.filter(|&c| c != card.collection_id) {
                    let finished = std::mem::replace(&mut scene_deck, SceneDeck::new(&deck.name, transform));
                    collections.flush(previous, collection_name(plan, previous), finished);
                    scene_deck.custom_deck.insert(sheet + deck_index_offset, face.clone());
                }
                current_collection = Some(card.collection_id.as_str());

                let record = self.catalog.card(&card.game_id, &card.collection_id, &deck.id, card.card_id)?;
                let deck_index = sheet + deck_index_offset;
                let slot_index = slots as u32;
                slots += 1;

                for _ in 0..card.count {
                    scene_deck.add_card(SceneCard::new(
                        guids.next(),
                        &record.name,
                        &record.description,
                        deck_index,
                        slot_index,
                        &record.variables,
                        face.clone(),
                        transform,
                    ));
                    placements += 1;
                }
            }

            if let Some(previous) = current_collection {
                collections.flush(previous, collection_name(plan, previous), scene_deck);
            }
            deck_index_offset += sheet;
        }

        let mut game_bag = Bag::new(&plan.game.name);
        for bag in collections.into_bags() {
            game_bag.push(SceneObject::Bag(bag));
        }
        game_bag.description = format!("Created at: {}", Local::now().format("%Y-%m-%d %H:%M:%S"));

        Ok((RootObjects::single(game_bag), placements))
    }
}

fn collection_name<'a>(plan: &'a DeckPlan, collection_id: &'a str) -> &'a str {
    plan.collection_names
        .get(collection_id)
        .map(String::as_str)
        .unwrap_or(collection_id)
}

fn deck_face(pages: &HashMap<String, PageInfo>, deck_id: &str, sheet: u32) -> Result<DeckFace, GenerateError> {
    let key = page_key(deck_id, sheet);
    let page = pages.get(&key).ok_or(GenerateError::MissingSheet(key))?;
    Ok(DeckFace {
        face_url: file_url(&page.sheet_path),
        back_url: file_url(&page.backside_path),
        num_width: page.grid.columns,
        num_height: page.grid.rows,
        back_is_hidden: false,
        unique_back: false,
        r#type: 0,
    })
}

/// `file:///` URL for an absolute path
pub fn file_url(path: &Path) -> String {
    let text = path.to_string_lossy();
    format!("file:///{}", text.trim_start_matches('/'))
}
