//! Disease class catalog

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Rice leaf condition recognized by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafDisease {
    /// Bacterial leaf blight (Xanthomonas oryzae)
    BacterialLeafBlight,
    /// Rice blast (Magnaporthe oryzae)
    Blast,
    /// Brown spot (Bipolaris oryzae)
    BrownSpot,
    /// No disease detected
    Healthy,
}

impl LeafDisease {
    /// All classes in model output order
    pub const ALL: [LeafDisease; 4] = [
        LeafDisease::BacterialLeafBlight,
        LeafDisease::Blast,
        LeafDisease::BrownSpot,
        LeafDisease::Healthy,
    ];

    /// Stable internal identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            LeafDisease::BacterialLeafBlight => "bacterial_leaf_blight",
            LeafDisease::Blast => "blast",
            LeafDisease::BrownSpot => "brown_spot",
            LeafDisease::Healthy => "healthy",
        }
    }

    /// Vietnamese display label
    pub fn label_vi(&self) -> &'static str {
        match self {
            LeafDisease::BacterialLeafBlight => "Bệnh cháy bìa lá",
            LeafDisease::Blast => "Bệnh đạo ôn",
            LeafDisease::BrownSpot => "Bệnh đốm nâu",
            LeafDisease::Healthy => "Lá khỏe mạnh",
        }
    }
}

/// Ordered class list aligned with the model's output vector.
///
/// Serializes as an `{id: label}` map in catalog order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassCatalog {
    classes: Vec<LeafDisease>,
}

impl Default for ClassCatalog {
    fn default() -> Self {
        Self::rice_leaf()
    }
}

impl ClassCatalog {
    /// The four-class rice leaf catalog
    pub fn rice_leaf() -> Self {
        Self {
            classes: LeafDisease::ALL.to_vec(),
        }
    }

    /// Number of classes
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Class at the given model output index
    pub fn get(&self, index: usize) -> Option<LeafDisease> {
        self.classes.get(index).copied()
    }

    /// Classes in output order
    pub fn iter(&self) -> impl Iterator<Item = LeafDisease> + '_ {
        self.classes.iter().copied()
    }
}

impl Serialize for ClassCatalog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.classes.len()))?;
        for class in &self.classes {
            map.serialize_entry(class.as_str(), class.label_vi())?;
        }
        map.end()
    }
}
