//! Normalized geometry records extracted from a DXF modelspace.

use serde::Serialize;

/// A 3D coordinate. 2D inputs are lifted with `z = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Point3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn offset(&self, dx: f64, dy: f64, dz: f64) -> Point3 {
        Point3::new(self.x + dx, self.y + dy, self.z + dz)
    }

    pub fn length(&self) -> f64 {
        self.distance(&Point3::default())
    }
}

/// One retained drawing entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeometryEntity {
    /// DXF handle, or `#<ordinal>` when the file carries none
    pub id: String,
    /// DXF entity type as written in the file (LINE, LWPOLYLINE, ...)
    pub dxf_type: String,
    pub layer: String,
    pub kind: EntityKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityKind {
    Line {
        start: Point3,
        end: Point3,
        length: f64,
    },
    Circle {
        center: Point3,
        radius: f64,
    },
    Arc {
        center: Point3,
        radius: f64,
        start_angle: f64,
        end_angle: f64,
    },
    Polyline {
        vertices: Vec<Point3>,
        closed: bool,
    },
    Spline {
        degree: u32,
        control_points: Vec<Point3>,
    },
    Ellipse {
        center: Point3,
        /// Major-axis endpoint relative to the center
        major_axis: Point3,
        /// Minor-to-major length ratio
        ratio: f64,
    },
    Text {
        insertion: Point3,
        content: String,
        height: f64,
    },
    BlockReference {
        block: String,
        insertion: Point3,
        scale: Point3,
        rotation: f64,
    },
    /// Any other entity type; counted but without geometry
    Other,
}

impl GeometryEntity {
    /// Points the bounding box is computed from.
    pub fn sample_points(&self) -> Vec<Point3> {
        match &self.kind {
            EntityKind::Line { start, end, .. } => vec![*start, *end],
            EntityKind::Circle { center, radius } | EntityKind::Arc { center, radius, .. } => {
                let r = *radius;
                vec![
                    center.offset(-r, 0.0, 0.0),
                    center.offset(r, 0.0, 0.0),
                    center.offset(0.0, -r, 0.0),
                    center.offset(0.0, r, 0.0),
                ]
            }
            EntityKind::Ellipse {
                center,
                major_axis,
                ratio,
            } => {
                // Minor axis lies in the drawing plane, perpendicular to the major axis
                let minor = Point3::new(-major_axis.y * ratio, major_axis.x * ratio, 0.0);
                vec![
                    center.offset(major_axis.x, major_axis.y, major_axis.z),
                    center.offset(-major_axis.x, -major_axis.y, -major_axis.z),
                    center.offset(minor.x, minor.y, minor.z),
                    center.offset(-minor.x, -minor.y, -minor.z),
                ]
            }
            EntityKind::Polyline { vertices, .. } => vertices.clone(),
            EntityKind::Spline { control_points, .. } => control_points.clone(),
            EntityKind::Text { insertion, .. } => vec![*insertion],
            EntityKind::BlockReference { insertion, .. } => vec![*insertion],
            EntityKind::Other => Vec::new(),
        }
    }
}

/// Axis-aligned bounding box. Degenerate (all zero) when built from no points.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BoundingBox {
    pub min: Point3,
    pub max: Point3,
}

impl BoundingBox {
    pub fn from_points<'a, I>(points: I) -> Self
    where
        I: IntoIterator<Item = &'a Point3>,
    {
        let mut iter = points.into_iter();
        let Some(first) = iter.next() else {
            return BoundingBox::default();
        };
        let mut bbox = BoundingBox {
            min: *first,
            max: *first,
        };
        for p in iter {
            bbox.min.x = bbox.min.x.min(p.x);
            bbox.min.y = bbox.min.y.min(p.y);
            bbox.min.z = bbox.min.z.min(p.z);
            bbox.max.x = bbox.max.x.max(p.x);
            bbox.max.y = bbox.max.y.max(p.y);
            bbox.max.z = bbox.max.z.max(p.z);
        }
        bbox
    }

    pub fn size(&self) -> Point3 {
        Point3::new(
            self.max.x - self.min.x,
            self.max.y - self.min.y,
            self.max.z - self.min.z,
        )
    }

    pub fn contains(&self, p: &Point3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }
}
