//! Catalog - Game → Collection → Deck → Card
//!
//! The generator only reads the catalog. `ManifestCatalog` is the bundled
//! implementation: one `catalog.json` describing the tree, with image paths
//! relative to the manifest's directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Game not found: {0}")]
    GameNotFound(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Deck not found: {0}")]
    DeckNotFound(String),

    #[error("Card not found: {0}")]
    CardNotFound(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid catalog: {0}")]
    Json(#[from] serde_json::Error),
}

/// Listing order requested by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Name,
    NameDesc,
    Created,
    CreatedDesc,
}

impl FromStr for SortOrder {
    type Err = std::convert::Infallible;

    /// Unknown values sort by name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "name_desc" => SortOrder::NameDesc,
            "created" => SortOrder::Created,
            "created_desc" => SortOrder::CreatedDesc,
            _ => SortOrder::Name,
        })
    }
}

/// Anything listable in a [`SortOrder`]
pub trait Sortable {
    fn sort_name(&self) -> &str;
    fn created_at(&self) -> Option<DateTime<Utc>>;
}

/// Stable sort. Names compare case-insensitively; equal names fall back to
/// creation time, newest first for `NameDesc`.
pub fn sort_items<T: Sortable>(items: &mut [T], order: SortOrder) {
    items.sort_by(|a, b| {
        let by_name = || a.sort_name().to_lowercase().cmp(&b.sort_name().to_lowercase());
        let by_created = || a.created_at().cmp(&b.created_at());
        match order {
            SortOrder::Name => by_name().then_with(by_created),
            SortOrder::NameDesc => by_name().reverse().then_with(|| by_created().reverse()),
            SortOrder::Created => by_created(),
            SortOrder::CreatedDesc => by_created().reverse(),
        }
    });
}

macro_rules! impl_sortable {
    ($($ty:ty),*) => {$(
        impl Sortable for $ty {
            fn sort_name(&self) -> &str { &self.name }
            fn created_at(&self) -> Option<DateTime<Utc>> { self.created_at }
        }
    )*};
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Source of the shared back face; also what the image is read from
    pub backside_image_url: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardRecord {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub image_url: String,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_count() -> u32 { 1 }

impl_sortable!(GameRecord, CollectionRecord, DeckRecord, CardRecord);

/// Read contract the generator consumes
pub trait Catalog: Send + Sync {
    fn game(&self, game_id: &str) -> Result<GameRecord, CatalogError>;

    fn collections(&self, game_id: &str, order: SortOrder) -> Result<Vec<CollectionRecord>, CatalogError>;

    fn decks(
        &self,
        game_id: &str,
        collection_id: &str,
        order: SortOrder,
    ) -> Result<Vec<DeckRecord>, CatalogError>;

    fn cards(
        &self,
        game_id: &str,
        collection_id: &str,
        deck_id: &str,
        order: SortOrder,
    ) -> Result<Vec<CardRecord>, CatalogError>;

    fn card(
        &self,
        game_id: &str,
        collection_id: &str,
        deck_id: &str,
        card_id: u64,
    ) -> Result<CardRecord, CatalogError>;

    fn card_image(
        &self,
        game_id: &str,
        collection_id: &str,
        deck_id: &str,
        card_id: u64,
    ) -> Result<Vec<u8>, CatalogError>;

    fn deck_image(&self, game_id: &str, collection_id: &str, deck_id: &str) -> Result<Vec<u8>, CatalogError>;
}

// --- Manifest-backed catalog ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEntry {
    #[serde(flatten)]
    pub record: GameRecord,
    #[serde(default)]
    pub collections: Vec<CollectionEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionEntry {
    #[serde(flatten)]
    pub record: CollectionRecord,
    #[serde(default)]
    pub decks: Vec<DeckEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckEntry {
    #[serde(flatten)]
    pub record: DeckRecord,
    #[serde(default)]
    pub cards: Vec<CardRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub games: Vec<GameEntry>,
}

pub struct ManifestCatalog {
    root: PathBuf,
    games: HashMap<String, GameEntry>,
}

impl ManifestCatalog {
    /// Empty catalog resolving image paths against `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), games: HashMap::new() }
    }

    pub fn load(manifest_path: &Path) -> Result<Self, CatalogError> {
        let content = fs::read_to_string(manifest_path).map_err(|source| CatalogError::Io {
            path: manifest_path.to_path_buf(),
            source,
        })?;
        let manifest: Manifest = serde_json::from_str(&content)?;

        let root = manifest_path.parent().map(Path::to_path_buf).unwrap_or_default();
        let mut catalog = Self::new(root);
        for game in manifest.games {
            catalog.register(game);
        }
        Ok(catalog)
    }

    pub fn register(&mut self, game: GameEntry) {
        self.games.insert(game.record.id.clone(), game);
    }

    fn game_entry(&self, game_id: &str) -> Result<&GameEntry, CatalogError> {
        self.games
            .get(game_id)
            .ok_or_else(|| CatalogError::GameNotFound(game_id.to_string()))
    }

    fn collection_entry(&self, game_id: &str, collection_id: &str) -> Result<&CollectionEntry, CatalogError> {
        self.game_entry(game_id)?
            .collections
            .iter()
            .find(|c| c.record.id == collection_id)
            .ok_or_else(|| CatalogError::CollectionNotFound(format!("{}/{}", game_id, collection_id)))
    }

    fn deck_entry(&self, game_id: &str, collection_id: &str, deck_id: &str) -> Result<&DeckEntry, CatalogError> {
        self.collection_entry(game_id, collection_id)?
            .decks
            .iter()
            .find(|d| d.record.id == deck_id)
            .ok_or_else(|| CatalogError::DeckNotFound(format!("{}/{}/{}", game_id, collection_id, deck_id)))
    }

    fn read_image(&self, location: &str) -> Result<Vec<u8>, CatalogError> {
        let path = self.root.join(location);
        fs::read(&path).map_err(|source| CatalogError::Io { path, source })
    }
}

fn sorted<T: Sortable + Clone>(items: &[T], order: SortOrder) -> Vec<T> {
    let mut items = items.to_vec();
    sort_items(&mut items, order);
    items
}

impl Catalog for ManifestCatalog {
    fn game(&self, game_id: &str) -> Result<GameRecord, CatalogError> {
        Ok(self.game_entry(game_id)?.record.clone())
    }

    fn collections(&self, game_id: &str, order: SortOrder) -> Result<Vec<CollectionRecord>, CatalogError> {
        let records: Vec<_> = self.game_entry(game_id)?
            .collections
            .iter()
            .map(|c| c.record.clone())
            .collect();
        Ok(sorted(&records, order))
    }

    fn decks(
        &self,
        game_id: &str,
        collection_id: &str,
        order: SortOrder,
    ) -> Result<Vec<DeckRecord>, CatalogError> {
        let records: Vec<_> = self.collection_entry(game_id, collection_id)?
            .decks
            .iter()
            .map(|d| d.record.clone())
            .collect();
        Ok(sorted(&records, order))
    }

    fn cards(
        &self,
        game_id: &str,
        collection_id: &str,
        deck_id: &str,
        order: SortOrder,
    ) -> Result<Vec<CardRecord>, CatalogError> {
        Ok(sorted(&self.deck_entry(game_id, collection_id, deck_id)?.cards, order))
    }

    fn card(
        &self,
        game_id: &str,
        collection_id: &str,
        deck_id: &str,
        card_id: u64,
    ) -> Result<CardRecord, CatalogError> {
        self.deck_entry(game_id, collection_id, deck_id)?
            .cards
            .iter()
            .find(|c| c.id == card_id)
            .cloned()
            .ok_or_else(|| {
                CatalogError::CardNotFound(format!("{}/{}/{}/{}", game_id, collection_id, deck_id, card_id))
            })
    }

    fn card_image(
        &self,
        game_id: &str,
        collection_id: &str,
        deck_id: &str,
        card_id: u64,
    ) -> Result<Vec<u8>, CatalogError> {
        let card = self.card(game_id, collection_id, deck_id, card_id)?;
        self.read_image(&card.image_url)
    }

    fn deck_image(&self, game_id: &str, collection_id: &str, deck_id: &str) -> Result<Vec<u8>, CatalogError> {
        let deck = self.deck_entry(game_id, collection_id, deck_id)?;
        self.read_image(&deck.record.backside_image_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn card(id: u64, name: &str, day: u32) -> CardRecord {
        CardRecord {
            id,
            name: name.to_string(),
            description: String::new(),
            image_url: format!("{}.png", id),
            variables: BTreeMap::new(),
            count: 1,
            created_at: Some(Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()),
        }
    }

    fn ids(cards: &[CardRecord]) -> Vec<u64> {
        cards.iter().map(|c| c.id).collect()
    }

    #[test]
    fn test_sort_orders() {
        let cards = vec![card(1, "beta", 3), card(2, "Alpha", 2), card(3, "alpha", 1), card(4, "gamma", 4)];

        let mut by_name = cards.clone();
        sort_items(&mut by_name, SortOrder::Name);
        assert_eq!(ids(&by_name), vec![3, 2, 1, 4]);

        let mut by_name_desc = cards.clone();
        sort_items(&mut by_name_desc, SortOrder::NameDesc);
        assert_eq!(ids(&by_name_desc), vec![4, 1, 2, 3]);

        let mut by_created = cards.clone();
        sort_items(&mut by_created, SortOrder::Created);
        assert_eq!(ids(&by_created), vec![3, 2, 1, 4]);

        let mut by_created_desc = cards;
        sort_items(&mut by_created_desc, SortOrder::CreatedDesc);
        assert_eq!(ids(&by_created_desc), vec![4, 1, 2, 3]);
    }

    #[test]
    fn test_sort_order_parsing() {
        assert_eq!("created_desc".parse::<SortOrder>().unwrap(), SortOrder::CreatedDesc);
        assert_eq!("NAME_DESC".parse::<SortOrder>().unwrap(), SortOrder::NameDesc);
        assert_eq!("whatever".parse::<SortOrder>().unwrap(), SortOrder::Name);
    }

    #[test]
    fn test_manifest_load_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("back.png"), b"back-bytes").unwrap();
        fs::write(dir.path().join("7.png"), b"card-bytes").unwrap();
        let manifest = r#"{
            "games": [{
                "id": "g", "name": "Game",
                "collections": [{
                    "id": "base", "name": "Base",
                    "decks": [{
                        "id": "loot", "name": "Loot", "backsideImageUrl": "back.png",
                        "cards": [{"id": 7, "name": "Penny", "imageUrl": "7.png", "variables": {"value": "1"}}]
                    }]
                }]
            }]
        }"#;
        let path = dir.path().join("catalog.json");
        fs::write(&path, manifest).unwrap();

        let catalog = ManifestCatalog::load(&path).unwrap();
        assert_eq!(catalog.game("g").unwrap().name, "Game");
        assert_eq!(catalog.collections("g", SortOrder::Name).unwrap().len(), 1);

        let card = catalog.card("g", "base", "loot", 7).unwrap();
        assert_eq!(card.count, 1);
        assert_eq!(card.variables["value"], "1");
        assert_eq!(catalog.card_image("g", "base", "loot", 7).unwrap(), b"card-bytes");
        assert_eq!(catalog.deck_image("g", "base", "loot").unwrap(), b"back-bytes");

        assert!(matches!(catalog.game("nope"), Err(CatalogError::GameNotFound(_))));
        assert!(matches!(catalog.card("g", "base", "loot", 8), Err(CatalogError::CardNotFound(_))));
        assert!(matches!(catalog.decks("g", "dlc", SortOrder::Name), Err(CatalogError::CollectionNotFound(_))));
    }
}
