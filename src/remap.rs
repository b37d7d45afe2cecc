//! Remap Service - Rewriting Sheet URLs
//!
//! A generated document points at local `file:///` sheets. Before sharing it
//! the user uploads the sheets somewhere and supplies an old → new mapping.
//! `prepare` lists what needs mapping; `replace` applies a complete mapping.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

use crate::scene::{CustomDeck, RootObjects, SceneObject};

#[derive(Debug, Error)]
pub enum RemapError {
    #[error("Can't find mapping for {0:?}")]
    MissingMapping(String),

    #[error("Invalid document shape: {0}")]
    InvalidDocumentShape(String),

    #[error("Invalid mapping file: {0}")]
    InvalidMapping(String),
}

/// One mapping entry as stored in the mapping file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Couple {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// Mapping file: `{"data": [{"key": old, "value": new}, ...]}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub data: Vec<Couple>,
}

impl Mapping {
    /// A mapping template with every URL present and no replacements yet
    pub fn from_urls(urls: impl IntoIterator<Item = String>) -> Self {
        Self {
            data: urls.into_iter().map(|key| Couple { key, value: String::new() }).collect(),
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self, RemapError> {
        serde_json::from_slice(data).map_err(|e| RemapError::InvalidMapping(e.to_string()))
    }

    pub fn to_lookup(&self) -> HashMap<String, String> {
        self.data.iter().map(|c| (c.key.clone(), c.value.clone())).collect()
    }
}

/// Parse a saved document, insisting on a single top-level bag
pub fn parse_document(data: &[u8]) -> Result<RootObjects, RemapError> {
    let root: RootObjects = serde_json::from_slice(data)
        .map_err(|e| RemapError::InvalidDocumentShape(e.to_string()))?;
    check_single_root(&root)?;
    Ok(root)
}

fn check_single_root(root: &RootObjects) -> Result<(), RemapError> {
    if root.object_states.len() != 1 {
        return Err(RemapError::InvalidDocumentShape(format!(
            "should be single root object, found {}",
            root.object_states.len()
        )));
    }
    Ok(())
}

/// Every distinct face/back URL in the document, sorted
pub fn prepare(data: &[u8]) -> Result<Vec<String>, RemapError> {
    let root = parse_document(data)?;
    prepare_document(&root)
}

pub fn prepare_document(root: &RootObjects) -> Result<Vec<String>, RemapError> {
    check_single_root(root)?;

    let mut seen = HashSet::new();
    let mut urls = vec![];
    visit_custom_decks(&root.object_states[0].contained_objects, &mut |deck| {
        for face in deck.values() {
            for url in [&face.back_url, &face.face_url] {
                if seen.insert(url.as_str()) {
                    urls.push(url.clone());
                }
            }
        }
    });

    urls.sort();
    Ok(urls)
}

/// Rewrite every face/back URL through `mapping`
pub fn replace(data: &[u8], mapping: &[u8]) -> Result<RootObjects, RemapError> {
    let mapping = Mapping::parse(mapping)?;
    let root = parse_document(data)?;
    replace_document(root, &mapping.to_lookup())
}

pub fn replace_document(
    mut root: RootObjects,
    mapping: &HashMap<String, String>,
) -> Result<RootObjects, RemapError> {
    check_single_root(&root)?;

    let mut substitute = |deck: &mut CustomDeck| -> Result<(), RemapError> {
        for face in deck.values_mut() {
            face.back_url = lookup(mapping, &face.back_url)?;
            face.face_url = lookup(mapping, &face.face_url)?;
        }
        Ok(())
    };
    walk_custom_decks(&mut root.object_states[0].contained_objects, &mut substitute)?;
    Ok(root)
}

fn lookup(mapping: &HashMap<String, String>, url: &str) -> Result<String, RemapError> {
    mapping
        .get(url)
        .cloned()
        .ok_or_else(|| RemapError::MissingMapping(url.to_string()))
}

/// Visit every `CustomDeck` reachable from `objects`, descending into bags
/// and into the cards held by decks.
fn visit_custom_decks<'a, F>(objects: &'a [SceneObject], visit: &mut F)
where
    F: FnMut(&'a CustomDeck),
{
    for object in objects {
        match object {
            SceneObject::Bag(bag) => visit_custom_decks(&bag.contained_objects, visit),
            SceneObject::Deck(deck) => {
                visit(&deck.custom_deck);
                for card in &deck.contained_objects {
                    visit(&card.custom_deck);
                }
            }
            SceneObject::Card(card) => visit(&card.custom_deck),
        }
    }
}

/// Same traversal as [`visit_custom_decks`], stopping at the first error
fn walk_custom_decks<F>(objects: &mut [SceneObject], visit: &mut F) -> Result<(), RemapError>
where
    F: FnMut(&mut CustomDeck) -> Result<(), RemapError>,
{
    for object in objects {
        match object {
            SceneObject::Bag(bag) => walk_custom_decks(&mut bag.contained_objects, visit)?,
            SceneObject::Deck(deck) => {
                visit(&mut deck.custom_deck)?;
                for card in &mut deck.contained_objects {
                    visit(&mut card.custom_deck)?;
                }
            }
            SceneObject::Card(card) => visit(&mut card.custom_deck)?,
        }
    }
    Ok(())
}

/// URLs that `prepare` would list but `mapping` does not cover
pub fn unmapped(root: &RootObjects, mapping: &HashMap<String, String>) -> Result<BTreeSet<String>, RemapError> {
    Ok(prepare_document(root)?
        .into_iter()
        .filter(|url| !mapping.contains_key(url))
        .collect())
}
