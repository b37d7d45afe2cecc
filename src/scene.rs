//! Scene Document - Host Application Object Model
//!
//! The host spawns a tree of bags, decks and cards. Every node carries a
//! `Name` field naming its kind, which is what decoding dispatches on.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::settings::CardSize;

pub const CARD_NAME: &str = "Card";
pub const DECK_NAME: &str = "Deck";
pub const BAG_NAME: &str = "Bag";

/// Multiplier separating the deck index from the slot index in a `CardID`
pub const CARD_ID_STRIDE: u32 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    #[serde(rename = "posX", default)]
    pub pos_x: f64,
    #[serde(rename = "posY", default)]
    pub pos_y: f64,
    #[serde(rename = "posZ", default)]
    pub pos_z: f64,
    #[serde(rename = "scaleX")]
    pub scale_x: f64,
    #[serde(rename = "scaleY")]
    pub scale_y: f64,
    #[serde(rename = "scaleZ")]
    pub scale_z: f64,
}

impl Transform {
    pub fn unit() -> Self {
        Self::scaled(&CardSize::default())
    }

    pub fn scaled(size: &CardSize) -> Self {
        Self {
            scale_x: size.scale_x,
            scale_y: size.scale_y,
            scale_z: size.scale_z,
            ..Self::default()
        }
    }
}

/// One sheet as seen from a deck: face sheet, back image and grid size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeckFace {
    #[serde(rename = "FaceURL")]
    pub face_url: String,
    #[serde(rename = "BackURL")]
    pub back_url: String,
    pub num_width: u32,
    pub num_height: u32,
    #[serde(default)]
    pub back_is_hidden: bool,
    #[serde(default)]
    pub unique_back: bool,
    #[serde(default)]
    pub r#type: u32,
}

/// Sheets referenced by a node, keyed by run-wide deck index
pub type CustomDeck = BTreeMap<u32, DeckFace>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SceneCard {
    #[serde(rename = "GUID")]
    pub guid: String,
    pub name: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "CardID")]
    pub card_id: u32,
    #[serde(default)]
    pub lua_script: String,
    #[serde(default = "Transform::unit")]
    pub transform: Transform,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_deck: CustomDeck,
}

impl SceneCard {
    pub fn new(
        guid: String,
        nickname: &str,
        description: &str,
        deck_index: u32,
        slot_index: u32,
        variables: &BTreeMap<String, String>,
        face: DeckFace,
        transform: Transform,
    ) -> Self {
        Self {
            guid,
            name: CARD_NAME.to_string(),
            nickname: nickname.to_string(),
            description: description.to_string(),
            card_id: deck_index * CARD_ID_STRIDE + slot_index,
            lua_script: lua_script(variables),
            transform,
            custom_deck: BTreeMap::from([(deck_index, face)]),
        }
    }

    pub fn deck_index(&self) -> u32 {
        self.card_id / CARD_ID_STRIDE
    }

    pub fn slot_index(&self) -> u32 {
        self.card_id % CARD_ID_STRIDE
    }
}

/// One `key="value"` line per variable; BTreeMap keeps the lines sorted
fn lua_script(variables: &BTreeMap<String, String>) -> String {
    variables
        .iter()
        .map(|(key, value)| format!("{}={:?}", key, value))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SceneDeck {
    pub name: String,
    #[serde(default = "Transform::unit")]
    pub transform: Transform,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "DeckIDs", default)]
    pub deck_ids: Vec<u32>,
    #[serde(default)]
    pub custom_deck: CustomDeck,
    #[serde(default)]
    pub contained_objects: Vec<SceneCard>,
}

impl SceneDeck {
    pub fn new(nickname: &str, transform: Transform) -> Self {
        Self {
            name: DECK_NAME.to_string(),
            transform,
            nickname: nickname.to_string(),
            description: String::new(),
            deck_ids: vec![],
            custom_deck: CustomDeck::new(),
            contained_objects: vec![],
        }
    }

    pub fn add_card(&mut self, card: SceneCard) {
        self.deck_ids.push(card.card_id);
        self.contained_objects.push(card);
    }

    pub fn len(&self) -> usize {
        self.contained_objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contained_objects.is_empty()
    }

    /// What the host should receive for this accumulator: nothing when empty,
    /// the bare card when it holds one (the host rejects one-card decks),
    /// the deck otherwise.
    pub fn into_object(mut self) -> Option<SceneObject> {
        match self.contained_objects.len() {
            0 => None,
            1 => self.contained_objects.pop().map(SceneObject::Card),
            _ => Some(SceneObject::Deck(self)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Bag {
    pub name: String,
    #[serde(default = "Transform::unit")]
    pub transform: Transform,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub contained_objects: Vec<SceneObject>,
}

impl Bag {
    pub fn new(nickname: &str) -> Self {
        Self {
            name: BAG_NAME.to_string(),
            transform: Transform::unit(),
            nickname: nickname.to_string(),
            description: String::new(),
            contained_objects: vec![],
        }
    }

    pub fn push(&mut self, object: SceneObject) {
        self.contained_objects.push(object);
    }
}

/// A node inside a bag
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SceneObject {
    Card(SceneCard),
    Deck(SceneDeck),
    Bag(Bag),
}

impl SceneObject {
    pub fn kind(&self) -> &'static str {
        match self {
            SceneObject::Card(_) => CARD_NAME,
            SceneObject::Deck(_) => DECK_NAME,
            SceneObject::Bag(_) => BAG_NAME,
        }
    }
}

impl<'de> Deserialize<'de> for SceneObject {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let name = value
            .get("Name")
            .ok_or_else(|| D::Error::custom("object don't have Name field"))?
            .as_str()
            .ok_or_else(|| D::Error::custom("object Name is not a string"))?
            .to_string();

        let parsed = match name.as_str() {
            CARD_NAME => serde_json::from_value(value).map(SceneObject::Card),
            DECK_NAME => serde_json::from_value(value).map(SceneObject::Deck),
            BAG_NAME => serde_json::from_value(value).map(SceneObject::Bag),
            other => return Err(D::Error::custom(format!("unknown object: {:?}", other))),
        };
        parsed.map_err(|e| D::Error::custom(format!("{} parsing: {}", name, e)))
    }
}

/// Top level of a saved document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RootObjects {
    pub object_states: Vec<Bag>,
}

impl RootObjects {
    pub fn single(bag: Bag) -> Self {
        Self { object_states: vec![bag] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn face(n: u32) -> DeckFace {
        DeckFace {
            face_url: format!("file:///sheet_{}.png", n),
            back_url: "file:///back.png".to_string(),
            num_width: 2,
            num_height: 2,
            back_is_hidden: false,
            unique_back: false,
            r#type: 0,
        }
    }

    fn card(guid: &str, deck_index: u32, slot: u32) -> SceneCard {
        SceneCard::new(
            guid.to_string(),
            "Goblin",
            "Sneaky",
            deck_index,
            slot,
            &BTreeMap::from([("power".to_string(), "2".to_string()), ("name".to_string(), "gob".to_string())]),
            face(deck_index),
            Transform::unit(),
        )
    }

    #[test]
    fn test_card_id_encodes_deck_and_slot() {
        let c = card("000001", 3, 7);
        assert_eq!(c.card_id, 307);
        assert_eq!(c.deck_index(), 3);
        assert_eq!(c.slot_index(), 7);
        assert!(c.custom_deck.contains_key(&3));
    }

    #[test]
    fn test_lua_script_sorted_and_quoted() {
        let c = card("000001", 1, 0);
        assert_eq!(c.lua_script, "name=\"gob\"\npower=\"2\"");
    }

    #[test]
    fn test_single_card_deck_unwraps() {
        let mut deck = SceneDeck::new("Monsters", Transform::unit());
        assert!(deck.clone().into_object().is_none());

        deck.add_card(card("000001", 1, 0));
        match deck.clone().into_object() {
            Some(SceneObject::Card(c)) => assert_eq!(c.guid, "000001"),
            other => panic!("expected bare card, got {:?}", other),
        }

        deck.add_card(card("000002", 1, 1));
        match deck.into_object() {
            Some(SceneObject::Deck(d)) => assert_eq!(d.deck_ids, vec![100, 101]),
            other => panic!("expected deck, got {:?}", other),
        }
    }

    #[test]
    fn test_serialized_field_names() {
        let mut bag = Bag::new("Game");
        bag.push(SceneObject::Card(card("000001", 1, 0)));
        let value = serde_json::to_value(RootObjects::single(bag)).unwrap();

        let obj = &value["ObjectStates"][0]["ContainedObjects"][0];
        assert_eq!(obj["Name"], "Card");
        assert_eq!(obj["GUID"], "000001");
        assert_eq!(obj["CardID"], 100);
        assert_eq!(obj["CustomDeck"]["1"]["FaceURL"], "file:///sheet_1.png");
        assert_eq!(obj["CustomDeck"]["1"]["NumWidth"], 2);
        assert_eq!(obj["Transform"]["scaleX"], 1.0);
    }

    #[test]
    fn test_decode_dispatches_on_name() {
        let mut deck = SceneDeck::new("Monsters", Transform::unit());
        deck.custom_deck.insert(1, face(1));
        deck.add_card(card("000001", 1, 0));
        deck.add_card(card("000002", 1, 1));

        let mut collection = Bag::new("Base");
        collection.push(SceneObject::Deck(deck));
        collection.push(SceneObject::Card(card("000003", 2, 0)));
        let mut game = Bag::new("Game");
        game.push(SceneObject::Bag(collection));
        let root = RootObjects::single(game);

        let text = serde_json::to_string(&root).unwrap();
        let decoded: RootObjects = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded, root);
    }

    #[test]
    fn test_decode_rejects_unknown_name() {
        let doc = json!({"ObjectStates": [{"Name": "Bag", "ContainedObjects": [{"Name": "Dice"}]}]});
        let err = serde_json::from_value::<RootObjects>(doc).unwrap_err();
        assert!(err.to_string().contains("unknown object"));

        let doc = json!({"ObjectStates": [{"Name": "Bag", "ContainedObjects": [{"GUID": "1"}]}]});
        let err = serde_json::from_value::<RootObjects>(doc).unwrap_err();
        assert!(err.to_string().contains("Name"));
    }
}
