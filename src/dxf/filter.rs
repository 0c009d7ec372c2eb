//! Non-geometry filtering by entity type and layer name.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dxf::entity::GeometryEntity;

/// Entity types that never contribute reconstructable geometry.
pub const NON_GEOMETRY_TYPES: &[&str] = &[
    "TEXT",
    "MTEXT",
    "DIMENSION",
    "LEADER",
    "MULTILEADER",
    "HATCH",
    "POINT",
    "XLINE",
    "RAY",
    "TOLERANCE",
    "ATTRIB",
    "ATTDEF",
    "VIEWPORT",
    "IMAGE",
];

/// Layer names (case-insensitive) conventionally reserved for annotation.
pub const NON_GEOMETRY_LAYERS: &[&str] = &[
    "dimensions",
    "text",
    "notes",
    "labels",
    "annotations",
    "hatching",
    "fills",
    "symbols",
    "title",
    "border",
    "viewport",
    "defpoints",
    "0",
];

/// Filter configuration for one describe call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Keep every entity; disables both filters
    #[serde(default)]
    pub include_all: bool,
    /// Extra layers to drop, matched case-insensitively
    #[serde(default)]
    pub exclude_layers: Vec<String>,
}

impl FilterConfig {
    pub fn all() -> Self {
        Self {
            include_all: true,
            exclude_layers: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.include_all
    }

    fn type_excluded(&self, dxf_type: &str) -> bool {
        NON_GEOMETRY_TYPES
            .iter()
            .any(|t| t.eq_ignore_ascii_case(dxf_type))
    }

    fn layer_excluded(&self, layer: &str) -> bool {
        NON_GEOMETRY_LAYERS
            .iter()
            .any(|l| l.eq_ignore_ascii_case(layer))
            || self
                .exclude_layers
                .iter()
                .any(|l| l.eq_ignore_ascii_case(layer))
    }
}

/// Entities split into retained and dropped buckets.
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub retained: Vec<GeometryEntity>,
    /// Dropped entity count per type (type filter)
    pub dropped_types: BTreeMap<String, usize>,
    /// Dropped entity count per layer (layer filter)
    pub dropped_layers: BTreeMap<String, usize>,
}

impl FilterOutcome {
    pub fn dropped_count(&self) -> usize {
        self.dropped_types.values().sum::<usize>() + self.dropped_layers.values().sum::<usize>()
    }
}

/// Apply both filters. The type filter is checked first, so an entity dropped
/// for its type is not also counted against its layer.
pub fn apply_filters(entities: Vec<GeometryEntity>, config: &FilterConfig) -> FilterOutcome {
    if !config.is_active() {
        return FilterOutcome {
            retained: entities,
            ..Default::default()
        };
    }

    let mut outcome = FilterOutcome::default();
    for entity in entities {
        if config.type_excluded(&entity.dxf_type) {
            *outcome
                .dropped_types
                .entry(entity.dxf_type.clone())
                .or_insert(0) += 1;
        } else if config.layer_excluded(&entity.layer) {
            *outcome
                .dropped_layers
                .entry(entity.layer.clone())
                .or_insert(0) += 1;
        } else {
            outcome.retained.push(entity);
        }
    }
    outcome
}
