use crate::config::RarityConfig;
use crate::notify::Classification;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RarityTag {
    Mythical,
    Legendary,
    UltraBeast,
    Regional,
}

impl RarityTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mythical => "mythical",
            Self::Legendary => "legendary",
            Self::UltraBeast => "ultra_beast",
            Self::Regional => "regional",
        }
    }
}

impl fmt::Display for RarityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive name → tag lookup built once from config.
#[derive(Debug, Clone, Default)]
pub struct RarityTable {
    tags: HashMap<String, RarityTag>,
}

impl RarityTable {
    pub fn from_config(config: &RarityConfig) -> Self {
        let mut tags = HashMap::new();
        // Lowest precedence first so stronger tags overwrite on duplicates.
        for (list, tag) in [
            (&config.regional, RarityTag::Regional),
            (&config.ultra_beast, RarityTag::UltraBeast),
            (&config.legendary, RarityTag::Legendary),
            (&config.mythical, RarityTag::Mythical),
        ] {
            for name in list {
                let key = normalize(name);
                if !key.is_empty() {
                    tags.insert(key, tag);
                }
            }
        }
        Self { tags }
    }

    pub fn lookup(&self, name: &str) -> Option<RarityTag> {
        self.tags.get(&normalize(name)).copied()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Catch classification: shiny, then rarity-tagged, then IV extremes.
pub fn classify_catch(is_shiny: bool, rarity: Option<RarityTag>, iv_percent: f64) -> Classification {
    if is_shiny {
        Classification::Shiny
    } else if rarity.is_some() {
        Classification::Rare
    } else if iv_percent >= 80.0 {
        Classification::HighIv
    } else if iv_percent <= 10.0 {
        Classification::LowIv
    } else {
        Classification::Normal
    }
}
