//! Static catalogs of effect and background descriptors.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::params::{Direction, EffectParameters};

/// Effects and backgrounds are separate catalogs with separate id namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogKind {
    Effects,
    Backgrounds,
}

impl CatalogKind {
    pub const ALL: [CatalogKind; 2] = [CatalogKind::Effects, CatalogKind::Backgrounds];

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "effect" | "effects" | "fx" => Some(CatalogKind::Effects),
            "background" | "backgrounds" | "bg" => Some(CatalogKind::Backgrounds),
            _ => None,
        }
    }
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogKind::Effects => f.write_str("effect"),
            CatalogKind::Backgrounds => f.write_str("background"),
        }
    }
}

/// Grouping tag only; never consulted for behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Weather,
    Nature,
    Cosmic,
    Magical,
    Celebration,
    Abstract,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectDescriptor {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub category: Category,
    #[serde(rename = "defaults", default)]
    pub default_parameters: EffectParameters,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    kind: CatalogKind,
    entries: Vec<EffectDescriptor>,
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(rename = "entry", default)]
    entries: Vec<EffectDescriptor>,
}

impl Catalog {
    pub fn new(kind: CatalogKind, entries: Vec<EffectDescriptor>) -> Result<Self> {
        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.id.as_str()) {
                return Err(EngineError::Config(format!(
                    "duplicate {kind} id `{}` in catalog",
                    entry.id
                )));
            }
        }
        Ok(Self { kind, entries })
    }

    /// Loads a catalog from a TOML table of `[[entry]]` records.
    pub fn from_toml_str(kind: CatalogKind, source: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(source)?;
        Self::new(kind, file.entries)
    }

    /// The built-in catalog shipped with the engine.
    pub fn builtin(kind: CatalogKind) -> &'static Catalog {
        match kind {
            CatalogKind::Effects => &BUILTIN_EFFECTS,
            CatalogKind::Backgrounds => &BUILTIN_BACKGROUNDS,
        }
    }

    pub fn kind(&self) -> CatalogKind {
        self.kind
    }

    pub fn get(&self, id: &str) -> Option<&EffectDescriptor> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn entries(&self) -> &[EffectDescriptor] {
        &self.entries
    }

    /// Default parameter record for every entry, all inactive.
    pub fn defaults(&self) -> BTreeMap<String, EffectParameters> {
        self.entries
            .iter()
            .map(|entry| {
                (
                    entry.id.clone(),
                    entry.default_parameters.clone().active(false),
                )
            })
            .collect()
    }
}

struct Row {
    id: &'static str,
    name: &'static str,
    category: Category,
    intensity: f32,
    count: u32,
    speed: f32,
    size: f32,
    opacity: f32,
    color: &'static str,
    direction: Direction,
    physics: bool,
    audio: bool,
}

impl Row {
    fn descriptor(&self) -> EffectDescriptor {
        EffectDescriptor {
            id: self.id.into(),
            name: self.name.into(),
            category: self.category,
            default_parameters: EffectParameters {
                intensity: self.intensity,
                particle_count: self.count,
                speed: self.speed,
                size: self.size,
                opacity: self.opacity,
                color: self.color.into(),
                direction: self.direction,
                physics: self.physics,
                interactive: false,
                has_audio: self.audio,
                is_active: false,
            },
        }
    }
}

macro_rules! rows {
    ($( $id:literal, $name:literal, $cat:ident, $int:expr, $count:expr, $speed:expr, $size:expr,
        $opacity:expr, $color:literal, $dir:ident, $physics:expr, $audio:expr; )*) => {
        vec![$(Row {
            id: $id,
            name: $name,
            category: Category::$cat,
            intensity: $int as f32,
            count: $count,
            speed: $speed,
            size: $size,
            opacity: $opacity,
            color: $color,
            direction: Direction::$dir,
            physics: $physics,
            audio: $audio,
        }),*]
    };
}

fn build(kind: CatalogKind, rows: Vec<Row>) -> Catalog {
    Catalog {
        kind,
        entries: rows.iter().map(Row::descriptor).collect(),
    }
}

static BUILTIN_EFFECTS: Lazy<Catalog> = Lazy::new(|| {
    build(
        CatalogKind::Effects,
        rows![
            "rain", "Rain", Weather, 60, 120, 1.0, 1.0, 0.6, "#9ec9ff", Down, true, true;
            "drizzle", "Drizzle", Weather, 25, 50, 0.8, 0.7, 0.4, "#b8d8ff", Down, false, true;
            "storm", "Storm", Weather, 90, 200, 1.6, 1.1, 0.7, "#8fb4e8", Down, true, true;
            "snow", "Snow", Weather, 45, 90, 0.6, 1.0, 0.9, "white", Down, false, false;
            "blizzard", "Blizzard", Weather, 85, 220, 1.4, 0.8, 0.85, "white", Right, true, true;
            "hail", "Hail", Weather, 50, 70, 1.5, 0.9, 0.9, "#e8f4ff", Down, true, false;
            "fog", "Fog", Weather, 20, 12, 0.3, 4.0, 0.25, "silver", Right, false, false;
            "lightning", "Lightning", Weather, 40, 24, 1.0, 1.0, 1.0, "#fffbe0", Down, false, true;
            "tornado", "Tornado", Weather, 60, 150, 1.2, 0.8, 0.7, "#a9a9a9", Up, true, true;
            "leaves", "Falling Leaves", Nature, 35, 40, 0.7, 1.4, 0.9, "orange", Down, true, false;
            "petals", "Petals", Nature, 35, 40, 0.6, 1.0, 0.85, "pink", Down, false, false;
            "cherry-blossoms", "Cherry Blossoms", Nature, 40, 50, 0.5, 1.1, 0.9, "#ffc0d8", Right, false, false;
            "fireflies", "Fireflies", Nature, 30, 35, 0.5, 0.8, 0.9, "#e6ff70", Random, false, true;
            "butterflies", "Butterflies", Nature, 20, 12, 0.6, 1.6, 0.95, "purple", Random, false, false;
            "bubbles", "Bubbles", Nature, 40, 40, 0.7, 1.3, 0.6, "cyan", Up, true, true;
            "pollen", "Pollen", Nature, 30, 60, 0.3, 0.4, 0.6, "yellow", Random, false, false;
            "stars", "Twinkling Stars", Cosmic, 50, 80, 0.5, 0.6, 1.0, "white", Random, false, false;
            "shooting-stars", "Shooting Stars", Cosmic, 20, 6, 2.0, 1.0, 1.0, "white", Left, false, false;
            "meteors", "Meteor Shower", Cosmic, 45, 14, 2.2, 1.4, 1.0, "orange", Left, true, true;
            "comets", "Comets", Cosmic, 15, 4, 1.0, 2.0, 1.0, "cyan", Right, false, false;
            "galaxy-dust", "Galaxy Dust", Cosmic, 35, 100, 0.2, 0.4, 0.5, "purple", Random, false, false;
            "sparkles", "Sparkles", Magical, 55, 60, 1.0, 0.6, 1.0, "gold", Random, false, false;
            "fairy-dust", "Fairy Dust", Magical, 45, 70, 0.8, 0.5, 0.9, "#ffd6ff", Up, false, true;
            "magic-orbs", "Magic Orbs", Magical, 25, 10, 0.4, 2.0, 0.7, "#9d7bff", Random, false, false;
            "embers", "Embers", Magical, 50, 60, 0.9, 0.6, 0.9, "#ff7a1a", Up, false, true;
            "fireworks", "Fireworks", Celebration, 35, 40, 1.0, 1.0, 1.0, "red", Up, true, true;
            "confetti", "Confetti", Celebration, 60, 100, 1.0, 0.9, 1.0, "yellow", Down, false, false;
            "hearts", "Floating Hearts", Celebration, 30, 25, 0.6, 1.2, 0.9, "#ff4d88", Up, false, false;
            "balloons", "Balloons", Celebration, 20, 10, 0.4, 2.2, 0.95, "red", Up, false, false;
        ],
    )
});

static BUILTIN_BACKGROUNDS: Lazy<Catalog> = Lazy::new(|| {
    build(
        CatalogKind::Backgrounds,
        rows![
            "aurora", "Aurora", Cosmic, 30, 6, 0.2, 6.0, 0.35, "green", Right, false, false;
            "starfield", "Starfield", Cosmic, 40, 150, 0.3, 0.4, 0.9, "white", Random, false, false;
            "nebula", "Nebula", Cosmic, 20, 8, 0.1, 8.0, 0.25, "purple", Random, false, false;
            "ocean-waves", "Ocean Waves", Nature, 30, 10, 0.3, 5.0, 0.3, "#2a7fff", Right, false, true;
            "gradient-drift", "Gradient Drift", Abstract, 15, 4, 0.1, 10.0, 0.2, "#ff9a76", Left, false, false;
            "cloudscape", "Cloudscape", Weather, 20, 8, 0.15, 6.0, 0.3, "white", Right, false, false;
            "rainy-window", "Rainy Window", Weather, 35, 60, 0.5, 1.2, 0.5, "#b8d8ff", Down, true, true;
        ],
    )
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalogs_have_unique_ids() {
        for kind in CatalogKind::ALL {
            let catalog = Catalog::builtin(kind);
            let entries = catalog.entries().to_vec();
            assert!(Catalog::new(kind, entries).is_ok());
            assert!(catalog
                .defaults()
                .values()
                .all(|params| !params.is_active));
        }
    }

    #[test]
    fn loads_catalog_from_toml() {
        let source = r#"
            [[entry]]
            id = "rain"
            name = "Rain"
            category = "weather"
            [entry.defaults]
            intensity = 70
            physics = true

            [[entry]]
            id = "aurora"
            category = "cosmic"
        "#;
        let catalog = Catalog::from_toml_str(CatalogKind::Backgrounds, source).unwrap();
        assert_eq!(catalog.entries().len(), 2);
        let rain = catalog.get("rain").unwrap();
        assert_eq!(rain.default_parameters.intensity, 70.0);
        assert!(rain.default_parameters.physics);
        assert_eq!(catalog.get("aurora").unwrap().default_parameters, EffectParameters::default());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let source = r#"
            [[entry]]
            id = "snow"
            category = "weather"
            [[entry]]
            id = "snow"
            category = "weather"
        "#;
        assert!(matches!(
            Catalog::from_toml_str(CatalogKind::Effects, source),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn kind_parsing_accepts_short_forms() {
        assert_eq!(CatalogKind::parse("fx"), Some(CatalogKind::Effects));
        assert_eq!(CatalogKind::parse("Background"), Some(CatalogKind::Backgrounds));
        assert_eq!(CatalogKind::parse("todo"), None);
    }
}
