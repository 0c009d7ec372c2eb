//! ASCII DXF reader.
//!
//! A DXF file is a flat sequence of (group code, value) line pairs. Only the
//! ENTITIES section (modelspace) is interpreted; block definitions and tables
//! are skipped.

use crate::dxf::entity::{EntityKind, GeometryEntity, Point3};
use crate::ForgeError;

/// One (group code, value) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupPair {
    pub code: i32,
    pub value: String,
}

const BINARY_SENTINEL: &str = "AutoCAD Binary DXF";

/// Split DXF text into group pairs.
pub fn tokenize(text: &str) -> Result<Vec<GroupPair>, ForgeError> {
    if text.starts_with(BINARY_SENTINEL) {
        return Err(ForgeError::StructureCorrupt(
            "binary DXF is not supported; convert to ASCII DXF".to_string(),
        ));
    }

    let mut lines = text.lines().enumerate();
    let mut pairs = Vec::new();

    while let Some((line_no, code_line)) = lines.next() {
        let code_str = code_line.trim();
        if code_str.is_empty() {
            if pairs.is_empty() {
                continue;
            }
            // Some exporters pad the file with blank lines
            if lines.clone().all(|(_, l)| l.trim().is_empty()) {
                break;
            }
        }
        let code = code_str.parse::<i32>().map_err(|_| {
            ForgeError::StructureCorrupt(format!(
                "line {}: expected group code, found '{}'",
                line_no + 1,
                code_str
            ))
        })?;
        let (_, value_line) = lines.next().ok_or_else(|| {
            ForgeError::StructureCorrupt(format!(
                "line {}: group code {} has no value",
                line_no + 1,
                code
            ))
        })?;
        let value = value_line.trim().to_string();
        let at_eof = code == 0 && value == "EOF";
        pairs.push(GroupPair { code, value });
        if at_eof {
            break;
        }
    }

    Ok(pairs)
}

/// Parse DXF text into modelspace entities, in file order.
pub fn read_entities(text: &str) -> Result<Vec<GeometryEntity>, ForgeError> {
    let pairs = tokenize(text)?;
    let Some(body) = entities_section(&pairs)? else {
        return Ok(Vec::new());
    };

    let records = split_records(body);
    let mut entities = Vec::new();
    let mut iter = records.into_iter().peekable();
    let mut ordinal = 0usize;

    while let Some(record) = iter.next() {
        ordinal += 1;
        if record.dxf_type == "POLYLINE" {
            // Classic polylines own the following VERTEX records up to SEQEND
            let mut vertices = Vec::new();
            while let Some(next) = iter.peek() {
                match next.dxf_type.as_str() {
                    "VERTEX" => {
                        if let Some(vertex) = iter.next() {
                            vertices.push(vertex.point(10)?.unwrap_or_default());
                        }
                    }
                    "SEQEND" => {
                        iter.next();
                        break;
                    }
                    _ => break,
                }
            }
            let closed = record.int(70)?.unwrap_or(0) & 1 == 1;
            entities.push(record.into_entity(
                ordinal,
                EntityKind::Polyline { vertices, closed },
            ));
            continue;
        }
        if matches!(record.dxf_type.as_str(), "VERTEX" | "SEQEND") {
            // Orphaned sub-records carry no geometry of their own
            continue;
        }
        let kind = record.kind()?;
        entities.push(record.into_entity(ordinal, kind));
    }

    Ok(entities)
}

/// Locate the pairs between `0 SECTION / 2 ENTITIES` and its `0 ENDSEC`.
fn entities_section(pairs: &[GroupPair]) -> Result<Option<&[GroupPair]>, ForgeError> {
    let mut i = 0;
    while i + 1 < pairs.len() {
        let is_section = pairs[i].code == 0 && pairs[i].value == "SECTION";
        if is_section && pairs[i + 1].code == 2 && pairs[i + 1].value == "ENTITIES" {
            let start = i + 2;
            let end = pairs[start..]
                .iter()
                .position(|p| p.code == 0 && p.value == "ENDSEC")
                .map(|offset| start + offset)
                .ok_or_else(|| {
                    ForgeError::StructureCorrupt("ENTITIES section has no ENDSEC".to_string())
                })?;
            return Ok(Some(&pairs[start..end]));
        }
        i += 1;
    }
    Ok(None)
}

/// Raw entity record: type plus its group pairs.
#[derive(Debug)]
struct Record<'a> {
    dxf_type: String,
    pairs: &'a [GroupPair],
}

fn split_records(body: &[GroupPair]) -> Vec<Record<'_>> {
    let mut records = Vec::new();
    let mut start: Option<usize> = None;
    for (idx, pair) in body.iter().enumerate() {
        if pair.code == 0 {
            if let Some(s) = start {
                records.push(Record {
                    dxf_type: body[s].value.to_uppercase(),
                    pairs: &body[s + 1..idx],
                });
            }
            start = Some(idx);
        }
    }
    if let Some(s) = start {
        records.push(Record {
            dxf_type: body[s].value.to_uppercase(),
            pairs: &body[s + 1..],
        });
    }
    records
}

impl<'a> Record<'a> {
    fn first(&self, code: i32) -> Option<&'a str> {
        self.pairs
            .iter()
            .find(|p| p.code == code)
            .map(|p| p.value.as_str())
    }

    fn float(&self, code: i32) -> Result<Option<f64>, ForgeError> {
        self.first(code)
            .map(|v| parse_float(&self.dxf_type, code, v))
            .transpose()
    }

    fn int(&self, code: i32) -> Result<Option<i64>, ForgeError> {
        self.first(code)
            .map(|v| {
                v.parse::<i64>().map_err(|_| {
                    ForgeError::StructureCorrupt(format!(
                        "{} group {}: '{}' is not an integer",
                        self.dxf_type, code, v
                    ))
                })
            })
            .transpose()
    }

    /// Point from an (x, y, z) code triple such as 10/20/30. Missing z is 0.
    fn point(&self, x_code: i32) -> Result<Option<Point3>, ForgeError> {
        let Some(x) = self.float(x_code)? else {
            return Ok(None);
        };
        let y = self.float(x_code + 10)?.unwrap_or(0.0);
        let z = self.float(x_code + 20)?.unwrap_or(0.0);
        Ok(Some(Point3::new(x, y, z)))
    }

    /// Repeated points in order of appearance (LWPOLYLINE vertices, SPLINE
    /// control points). `z_default` lifts 2D input.
    fn repeated_points(&self, x_code: i32, z_default: f64) -> Result<Vec<Point3>, ForgeError> {
        let mut points: Vec<Point3> = Vec::new();
        for pair in self.pairs {
            let target = pair.code - x_code;
            match target {
                0 => {
                    let x = parse_float(&self.dxf_type, pair.code, &pair.value)?;
                    points.push(Point3::new(x, 0.0, z_default));
                }
                10 | 20 => {
                    let v = parse_float(&self.dxf_type, pair.code, &pair.value)?;
                    let last = points.last_mut().ok_or_else(|| {
                        ForgeError::StructureCorrupt(format!(
                            "{} group {} precedes its x coordinate",
                            self.dxf_type, pair.code
                        ))
                    })?;
                    if target == 10 {
                        last.y = v;
                    } else {
                        last.z = v;
                    }
                }
                _ => {}
            }
        }
        Ok(points)
    }

    fn kind(&self) -> Result<EntityKind, ForgeError> {
        let kind = match self.dxf_type.as_str() {
            "LINE" => {
                let start = self.point(10)?.unwrap_or_default();
                let end = self.point(11)?.unwrap_or_default();
                EntityKind::Line {
                    start,
                    end,
                    length: start.distance(&end),
                }
            }
            "CIRCLE" => EntityKind::Circle {
                center: self.point(10)?.unwrap_or_default(),
                radius: self.float(40)?.unwrap_or(0.0),
            },
            "ARC" => EntityKind::Arc {
                center: self.point(10)?.unwrap_or_default(),
                radius: self.float(40)?.unwrap_or(0.0),
                start_angle: self.float(50)?.unwrap_or(0.0),
                end_angle: self.float(51)?.unwrap_or(360.0),
            },
            "LWPOLYLINE" => {
                let elevation = self.float(38)?.unwrap_or(0.0);
                EntityKind::Polyline {
                    vertices: self.repeated_points(10, elevation)?,
                    closed: self.int(70)?.unwrap_or(0) & 1 == 1,
                }
            }
            "SPLINE" => EntityKind::Spline {
                degree: self.int(71)?.unwrap_or(3).max(0) as u32,
                control_points: self.repeated_points(10, 0.0)?,
            },
            "ELLIPSE" => EntityKind::Ellipse {
                center: self.point(10)?.unwrap_or_default(),
                major_axis: self.point(11)?.unwrap_or_default(),
                ratio: self.float(40)?.unwrap_or(1.0),
            },
            "TEXT" | "MTEXT" | "ATTRIB" | "ATTDEF" => {
                let mut content = String::new();
                // MTEXT splits long strings over group 3 chunks followed by group 1
                for pair in self.pairs.iter().filter(|p| p.code == 3 || p.code == 1) {
                    content.push_str(&pair.value);
                }
                EntityKind::Text {
                    insertion: self.point(10)?.unwrap_or_default(),
                    content,
                    height: self.float(40)?.unwrap_or(0.0),
                }
            }
            "INSERT" => EntityKind::BlockReference {
                block: self.first(2).unwrap_or_default().to_string(),
                insertion: self.point(10)?.unwrap_or_default(),
                scale: Point3::new(
                    self.float(41)?.unwrap_or(1.0),
                    self.float(42)?.unwrap_or(1.0),
                    self.float(43)?.unwrap_or(1.0),
                ),
                rotation: self.float(50)?.unwrap_or(0.0),
            },
            _ => EntityKind::Other,
        };
        Ok(kind)
    }

    fn into_entity(self, ordinal: usize, kind: EntityKind) -> GeometryEntity {
        let id = self
            .first(5)
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", ordinal));
        let layer = self
            .first(8)
            .filter(|l| !l.is_empty())
            .unwrap_or("0")
            .to_string();
        GeometryEntity {
            id,
            dxf_type: self.dxf_type,
            layer,
            kind,
        }
    }
}

fn parse_float(dxf_type: &str, code: i32, value: &str) -> Result<f64, ForgeError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            ForgeError::StructureCorrupt(format!(
                "{} group {}: '{}' is not a number",
                dxf_type, code, value
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dxf(body: &str) -> String {
        format!("0\nSECTION\n2\nENTITIES\n{}0\nENDSEC\n0\nEOF\n", body)
    }

    #[test]
    fn test_tokenize_handles_crlf_and_padding() {
        let pairs = tokenize("  0\r\nSECTION\r\n  2\r\nENTITIES\r\n").unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1].code, 2);
        assert_eq!(pairs[1].value, "ENTITIES");
    }

    #[test]
    fn test_tokenize_stops_at_eof() {
        let text = "0\nSECTION\n2\nENTITIES\n0\nENDSEC\n0\nEOF\n\n\n";
        let pairs = tokenize(text).unwrap();
        assert_eq!(pairs.len(), 4);
        assert_eq!(pairs[3].value, "EOF");

        let trailing = "0\nEOF\nexporter junk\n";
        assert_eq!(tokenize(trailing).unwrap().len(), 1);
    }

    #[test]
    fn test_trailing_blank_lines_without_eof() {
        let text = "0\nSECTION\n2\nENTITIES\n0\nENDSEC\n\n  \n";
        assert_eq!(tokenize(text).unwrap().len(), 3);
    }

    #[test]
    fn test_tokenize_rejects_dangling_code() {
        let err = tokenize("0\nSECTION\n2\n").unwrap_err();
        assert!(matches!(err, ForgeError::StructureCorrupt(_)));
    }

    #[test]
    fn test_tokenize_rejects_non_numeric_code() {
        let err = tokenize("zero\nSECTION\n").unwrap_err();
        assert!(matches!(err, ForgeError::StructureCorrupt(_)));
    }

    #[test]
    fn test_binary_dxf_rejected() {
        let err = read_entities("AutoCAD Binary DXF\r\n\u{1a}\0").unwrap_err();
        assert!(matches!(err, ForgeError::StructureCorrupt(_)));
    }

    #[test]
    fn test_missing_endsec_is_corrupt() {
        let err = read_entities("0\nSECTION\n2\nENTITIES\n0\nLINE\n8\ngeom\n").unwrap_err();
        assert!(matches!(err, ForgeError::StructureCorrupt(_)));
    }

    #[test]
    fn test_no_entities_section_is_empty() {
        let entities = read_entities("0\nSECTION\n2\nHEADER\n0\nENDSEC\n0\nEOF\n").unwrap();
        assert!(entities.is_empty());
        assert!(read_entities("").unwrap().is_empty());
    }

    #[test]
    fn test_line_with_handle_and_layer() {
        let text = dxf("0\nLINE\n5\n2A\n8\ngeom\n10\n0\n20\n0\n30\n0\n11\n3\n21\n4\n31\n0\n");
        let entities = read_entities(&text).unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].id, "2A");
        assert_eq!(entities[0].layer, "geom");
        match &entities[0].kind {
            EntityKind::Line { length, .. } => assert!((length - 5.0).abs() < 1e-9),
            other => panic!("expected line, got {:?}", other),
        }
    }

    #[test]
    fn test_lwpolyline_lifts_2d_points() {
        let text = dxf(
            "0\nLWPOLYLINE\n8\nprofile\n90\n3\n70\n1\n10\n0\n20\n0\n10\n5\n20\n0\n10\n5\n20\n5\n",
        );
        let entities = read_entities(&text).unwrap();
        match &entities[0].kind {
            EntityKind::Polyline { vertices, closed } => {
                assert!(closed);
                assert_eq!(vertices.len(), 3);
                assert!(vertices.iter().all(|v| v.z == 0.0));
                assert_eq!(vertices[2], Point3::new(5.0, 5.0, 0.0));
            }
            other => panic!("expected polyline, got {:?}", other),
        }
        assert_eq!(entities[0].id, "#1");
    }

    #[test]
    fn test_classic_polyline_collects_vertices() {
        let text = dxf(concat!(
            "0\nPOLYLINE\n8\ngeom\n66\n1\n70\n0\n",
            "0\nVERTEX\n8\ngeom\n10\n1\n20\n2\n30\n3\n",
            "0\nVERTEX\n8\ngeom\n10\n4\n20\n5\n30\n6\n",
            "0\nSEQEND\n8\ngeom\n",
            "0\nCIRCLE\n8\ngeom\n10\n0\n20\n0\n40\n2.5\n",
        ));
        let entities = read_entities(&text).unwrap();
        assert_eq!(entities.len(), 2);
        match &entities[0].kind {
            EntityKind::Polyline { vertices, closed } => {
                assert!(!closed);
                assert_eq!(vertices, &vec![Point3::new(1.0, 2.0, 3.0), Point3::new(4.0, 5.0, 6.0)]);
            }
            other => panic!("expected polyline, got {:?}", other),
        }
        assert_eq!(entities[1].dxf_type, "CIRCLE");
    }

    #[test]
    fn test_bad_number_is_corrupt() {
        let text = dxf("0\nCIRCLE\n8\ngeom\n10\nabc\n20\n0\n40\n1\n");
        let err = read_entities(&text).unwrap_err();
        assert!(err.to_string().contains("CIRCLE group 10"));
    }

    #[test]
    fn test_default_layer_is_zero() {
        let text = dxf("0\nPOINT\n10\n1\n20\n1\n");
        let entities = read_entities(&text).unwrap();
        assert_eq!(entities[0].layer, "0");
        assert_eq!(entities[0].kind, EntityKind::Other);
    }
}
