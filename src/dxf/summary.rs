//! Deterministic text summary of retained geometry.
//!
//! All numbers go through [`fmt3`] / [`fmt1`], which never depend on locale,
//! and all maps are ordered, so identical input yields identical bytes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use serde::Serialize;

use crate::dxf::entity::{BoundingBox, EntityKind, GeometryEntity, Point3};
use crate::dxf::filter::{FilterConfig, FilterOutcome};

/// Retained-entity count up to which every entity is described individually.
pub const DETAIL_THRESHOLD: usize = 20;

/// Marker line emitted when no geometry survives filtering.
pub const EMPTY_DOCUMENT_MARKER: &str = "NO_GEOMETRY_ENTITIES";

/// Descriptor output: the document plus its structured counts.
#[derive(Debug, Clone, Serialize)]
pub struct GeometrySummary {
    pub source: String,
    pub total_entities: usize,
    pub retained_entities: usize,
    pub type_counts: BTreeMap<String, usize>,
    pub layer_counts: BTreeMap<String, usize>,
    pub filtered_layers: BTreeMap<String, usize>,
    pub bounding_box: BoundingBox,
    pub grouped: bool,
    #[serde(skip)]
    pub entities: Vec<GeometryEntity>,
    pub document: String,
}

impl GeometrySummary {
    pub fn is_empty(&self) -> bool {
        self.retained_entities == 0
    }

    pub fn entity_ids(&self) -> Vec<&str> {
        self.entities.iter().map(|e| e.id.as_str()).collect()
    }
}

/// Three-decimal coordinate formatting with negative zero folded to zero.
pub fn fmt3(value: f64) -> String {
    let s = format!("{:.3}", value);
    if s == "-0.000" {
        "0.000".to_string()
    } else {
        s
    }
}

/// One-decimal angle formatting with negative zero folded to zero.
pub fn fmt1(value: f64) -> String {
    let s = format!("{:.1}", value);
    if s == "-0.0" {
        "0.0".to_string()
    } else {
        s
    }
}

fn fmt_point(p: &Point3) -> String {
    format!("({}, {}, {})", fmt3(p.x), fmt3(p.y), fmt3(p.z))
}

/// Axis-aligned box over every retained entity's sample points.
pub fn bounding_box(entities: &[GeometryEntity]) -> BoundingBox {
    let points: Vec<Point3> = entities.iter().flat_map(|e| e.sample_points()).collect();
    BoundingBox::from_points(&points)
}

/// Build the summary document.
pub fn summarize(
    source: &str,
    total_entities: usize,
    outcome: FilterOutcome,
    config: &FilterConfig,
) -> GeometrySummary {
    let entities = outcome.retained;
    let mut type_counts = BTreeMap::new();
    let mut layer_counts = BTreeMap::new();
    for e in &entities {
        *type_counts.entry(e.dxf_type.clone()).or_insert(0usize) += 1;
        *layer_counts.entry(e.layer.clone()).or_insert(0usize) += 1;
    }
    let bbox = bounding_box(&entities);
    let grouped = entities.len() > DETAIL_THRESHOLD;

    let mut doc = String::new();
    let _ = writeln!(doc, "# DXF Geometry Summary");
    let _ = writeln!(doc, "Source: {}", source);
    if config.is_active() {
        let _ = writeln!(
            doc,
            "Entities: {} total, {} retained, {} filtered out",
            total_entities,
            entities.len(),
            total_entities.saturating_sub(entities.len())
        );
    } else {
        let _ = writeln!(
            doc,
            "Entities: {} total, {} retained (filtering disabled)",
            total_entities,
            entities.len()
        );
    }

    if entities.is_empty() {
        let _ = writeln!(doc);
        let _ = writeln!(
            doc,
            "{}: the drawing contains no geometric entities to reconstruct.",
            EMPTY_DOCUMENT_MARKER
        );
        return GeometrySummary {
            source: source.to_string(),
            total_entities,
            retained_entities: 0,
            type_counts,
            layer_counts,
            filtered_layers: outcome.dropped_layers,
            bounding_box: bbox,
            grouped: false,
            entities,
            document: doc,
        };
    }

    let _ = writeln!(doc);
    let _ = writeln!(doc, "## Entity Types");
    for (t, n) in &type_counts {
        let _ = writeln!(doc, "- {}: {}", t, n);
    }

    if config.is_active() {
        let _ = writeln!(doc);
        let _ = writeln!(doc, "## Filtered-Out Layers");
        if outcome.dropped_layers.is_empty() {
            let _ = writeln!(doc, "- none");
        }
        for (layer, n) in &outcome.dropped_layers {
            let _ = writeln!(doc, "- {} ({} entities)", layer, n);
        }
        if !outcome.dropped_types.is_empty() {
            let dropped: Vec<String> = outcome
                .dropped_types
                .iter()
                .map(|(t, n)| format!("{} x{}", t, n))
                .collect();
            let _ = writeln!(doc, "Non-geometry types removed: {}", dropped.join(", "));
        }
    }

    let _ = writeln!(doc);
    let _ = writeln!(doc, "## Active Layers");
    for (layer, n) in &layer_counts {
        let _ = writeln!(doc, "- {}: {}", layer, n);
    }

    let size = bbox.size();
    let _ = writeln!(doc);
    let _ = writeln!(doc, "## Bounding Box");
    let _ = writeln!(doc, "Min: {}", fmt_point(&bbox.min));
    let _ = writeln!(doc, "Max: {}", fmt_point(&bbox.max));
    let _ = writeln!(
        doc,
        "Size: {} x {} x {}",
        fmt3(size.x),
        fmt3(size.y),
        fmt3(size.z)
    );

    let _ = writeln!(doc);
    if grouped {
        let _ = writeln!(doc, "## Entity Groups");
        for line in grouped_descriptions(&entities) {
            let _ = writeln!(doc, "- {}", line);
        }
    } else {
        let _ = writeln!(doc, "## Entities");
        for (idx, e) in entities.iter().enumerate() {
            let _ = writeln!(doc, "{}. {}", idx + 1, describe_entity(e));
        }
    }

    let _ = writeln!(doc);
    let _ = writeln!(doc, "## Reconstruction Summary");
    for t in type_counts.keys() {
        let _ = writeln!(doc, "- {} -> {}", t, construction_primitive(t));
    }

    GeometrySummary {
        source: source.to_string(),
        total_entities,
        retained_entities: entities.len(),
        type_counts,
        layer_counts,
        filtered_layers: outcome.dropped_layers,
        bounding_box: bbox,
        grouped,
        entities,
        document: doc,
    }
}

/// Single-entity description used in the detailed branch.
pub fn describe_entity(e: &GeometryEntity) -> String {
    let layer = &e.layer;
    match &e.kind {
        EntityKind::Line { start, end, length } => format!(
            "LINE on layer '{}': from {} to {}, length {}",
            layer,
            fmt_point(start),
            fmt_point(end),
            fmt3(*length)
        ),
        EntityKind::Circle { center, radius } => format!(
            "CIRCLE on layer '{}': center {}, radius {}",
            layer,
            fmt_point(center),
            fmt3(*radius)
        ),
        EntityKind::Arc {
            center,
            radius,
            start_angle,
            end_angle,
        } => format!(
            "ARC on layer '{}': center {}, radius {}, from {} deg to {} deg",
            layer,
            fmt_point(center),
            fmt3(*radius),
            fmt1(*start_angle),
            fmt1(*end_angle)
        ),
        EntityKind::Polyline { vertices, closed } => {
            let label = if *closed {
                "closed polyline"
            } else {
                "open polyline"
            };
            let pts: Vec<String> = vertices.iter().map(fmt_point).collect();
            format!(
                "{} ({}) on layer '{}': {} vertices [{}]",
                e.dxf_type,
                label,
                layer,
                vertices.len(),
                pts.join(", ")
            )
        }
        EntityKind::Spline {
            degree,
            control_points,
        } => {
            let pts: Vec<String> = control_points.iter().map(fmt_point).collect();
            format!(
                "SPLINE on layer '{}': degree {}, {} control points [{}]",
                layer,
                degree,
                control_points.len(),
                pts.join(", ")
            )
        }
        EntityKind::Ellipse {
            center,
            major_axis,
            ratio,
        } => format!(
            "ELLIPSE on layer '{}': center {}, major axis {}, ratio {}",
            layer,
            fmt_point(center),
            fmt_point(major_axis),
            fmt3(*ratio)
        ),
        EntityKind::Text {
            insertion,
            content,
            height,
        } => format!(
            "{} on layer '{}': \"{}\" at {}, height {}",
            e.dxf_type,
            layer,
            content,
            fmt_point(insertion),
            fmt3(*height)
        ),
        EntityKind::BlockReference {
            block,
            insertion,
            scale,
            rotation,
        } => format!(
            "INSERT on layer '{}': block '{}' at {}, scale {}, rotation {} deg",
            layer,
            block,
            fmt_point(insertion),
            fmt_point(scale),
            fmt1(*rotation)
        ),
        EntityKind::Other => format!("{} on layer '{}'", e.dxf_type, layer),
    }
}

/// Endpoint key at the same precision the document prints.
fn endpoint_key(p: &Point3) -> (i64, i64, i64) {
    (
        (p.x * 1000.0).round() as i64,
        (p.y * 1000.0).round() as i64,
        (p.z * 1000.0).round() as i64,
    )
}

/// One summary line per (type, layer) group, ordered by type then layer.
pub fn grouped_descriptions(entities: &[GeometryEntity]) -> Vec<String> {
    let mut groups: BTreeMap<(&str, &str), Vec<&GeometryEntity>> = BTreeMap::new();
    for e in entities {
        groups
            .entry((e.dxf_type.as_str(), e.layer.as_str()))
            .or_default()
            .push(e);
    }

    groups
        .into_iter()
        .map(|((dxf_type, layer), members)| describe_group(dxf_type, layer, &members))
        .collect()
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

fn describe_group(dxf_type: &str, layer: &str, members: &[&GeometryEntity]) -> String {
    let count = members.len();
    let prefix = format!("{} on layer '{}': {}", dxf_type, layer, count);

    match &members[0].kind {
        EntityKind::Line { .. } => {
            let mut total = 0.0;
            let mut endpoints = BTreeSet::new();
            for m in members {
                if let EntityKind::Line { start, end, length } = &m.kind {
                    total += length;
                    endpoints.insert(endpoint_key(start));
                    endpoints.insert(endpoint_key(end));
                }
            }
            let connected = endpoints.len() < count + 1;
            format!(
                "{} lines, total length {}, average length {}, connected segments: {}",
                prefix,
                fmt3(total),
                fmt3(total / count as f64),
                if connected { "yes" } else { "no" }
            )
        }
        EntityKind::Circle { .. } => {
            let radii: BTreeSet<i64> = members
                .iter()
                .filter_map(|m| match &m.kind {
                    EntityKind::Circle { radius, .. } => Some((radius * 1000.0).round() as i64),
                    _ => None,
                })
                .collect();
            let as_f = |k: &i64| *k as f64 / 1000.0;
            match (radii.first(), radii.last()) {
                (Some(lo), Some(hi)) if lo == hi => {
                    format!("{} circles, radius {}", prefix, fmt3(as_f(lo)))
                }
                (Some(lo), Some(hi)) => format!(
                    "{} circles, {} distinct radii, min radius {}, max radius {}",
                    prefix,
                    radii.len(),
                    fmt3(as_f(lo)),
                    fmt3(as_f(hi))
                ),
                _ => format!("{} circles", prefix),
            }
        }
        EntityKind::Arc { .. } => {
            let (lo, hi) = min_max(members.iter().filter_map(|m| match &m.kind {
                EntityKind::Arc { radius, .. } => Some(*radius),
                _ => None,
            }));
            format!(
                "{} arcs, min radius {}, max radius {}",
                prefix,
                fmt3(lo),
                fmt3(hi)
            )
        }
        EntityKind::Polyline { .. } => {
            let mut closed = 0;
            let mut vertex_total = 0;
            for m in members {
                if let EntityKind::Polyline { vertices, closed: c } = &m.kind {
                    vertex_total += vertices.len();
                    if *c {
                        closed += 1;
                    }
                }
            }
            format!(
                "{} polylines ({} closed, {} open), {} vertices total",
                prefix,
                closed,
                count - closed,
                vertex_total
            )
        }
        EntityKind::Spline { .. } => {
            let points: usize = members
                .iter()
                .map(|m| match &m.kind {
                    EntityKind::Spline { control_points, .. } => control_points.len(),
                    _ => 0,
                })
                .sum();
            format!("{} splines, {} control points total", prefix, points)
        }
        EntityKind::Ellipse { .. } => {
            let (lo, hi) = min_max(members.iter().filter_map(|m| match &m.kind {
                EntityKind::Ellipse { major_axis, .. } => Some(major_axis.length()),
                _ => None,
            }));
            format!(
                "{} ellipses, semi-major length {} to {}",
                prefix,
                fmt3(lo),
                fmt3(hi)
            )
        }
        EntityKind::BlockReference { .. } => {
            let blocks: BTreeSet<&str> = members
                .iter()
                .filter_map(|m| match &m.kind {
                    EntityKind::BlockReference { block, .. } => Some(block.as_str()),
                    _ => None,
                })
                .collect();
            let names: Vec<&str> = blocks.into_iter().collect();
            format!("{} block references ({})", prefix, names.join(", "))
        }
        EntityKind::Text { .. } => format!("{} text entities", prefix),
        EntityKind::Other => format!("{} entities", prefix),
    }
}

/// Modeling-API primitive that reconstructs a DXF entity type.
pub fn construction_primitive(dxf_type: &str) -> &'static str {
    match dxf_type {
        "LINE" => "Workplane.moveTo()/lineTo() segments, or polyline() for chains",
        "CIRCLE" => "Workplane.circle(radius), or hole(diameter) on an existing solid",
        "ARC" => "Workplane.threePointArc() or radiusArc()",
        "LWPOLYLINE" | "POLYLINE" => "Workplane.polyline(points).close() then extrude()",
        "SPLINE" => "Workplane.spline(points)",
        "ELLIPSE" => "Workplane.ellipse(x_radius, y_radius)",
        "INSERT" => "repeat the referenced block geometry with pushPoints()",
        "TEXT" | "MTEXT" => "Workplane.text() (annotation, usually omitted)",
        _ => "no direct primitive; approximate from neighbouring geometry",
    }
}
