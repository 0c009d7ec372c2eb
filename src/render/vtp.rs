//! Reader for VTK XML PolyData (`.vtp`) files.
//!
//! Handles ASCII arrays, inline base64 binary arrays and base64 appended
//! data. Compressed files and raw appended data are rejected.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use glam::DVec3;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::ForgeError;

/// Triangulated polygonal model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolyData {
    pub points: Vec<DVec3>,
    pub triangles: Vec<[u32; 3]>,
}

impl PolyData {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// `(min, max)` over all points; `None` when there are none.
    pub fn bounds(&self) -> Option<(DVec3, DVec3)> {
        let first = *self.points.first()?;
        Some(
            self.points
                .iter()
                .fold((first, first), |(lo, hi), p| (lo.min(*p), hi.max(*p))),
        )
    }
}

fn corrupt(message: impl Into<String>) -> ForgeError {
    ForgeError::StructureCorrupt(message.into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Points,
    Polys,
    Strips,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderType {
    UInt32,
    UInt64,
}

impl HeaderType {
    fn size(self) -> usize {
        match self {
            HeaderType::UInt32 => 4,
            HeaderType::UInt64 => 8,
        }
    }
}

#[derive(Debug, Clone)]
struct ArrayDecl {
    section: Section,
    name: String,
    scalar: String,
    format: String,
    offset: Option<usize>,
    text: String,
}

#[derive(Debug, Default)]
struct PieceArrays {
    points: Option<ArrayDecl>,
    polys: HashMap<String, ArrayDecl>,
    strips: HashMap<String, ArrayDecl>,
}

struct FileInfo {
    big_endian: bool,
    header: HeaderType,
}

fn attributes(e: &BytesStart<'_>) -> Result<HashMap<String, String>, ForgeError> {
    let mut out = HashMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| corrupt(format!("bad XML attribute: {}", err)))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| corrupt(format!("bad XML attribute value: {}", err)))?
            .into_owned();
        out.insert(key, value);
    }
    Ok(out)
}

fn section_of(name: &[u8]) -> Option<Section> {
    match name {
        b"Points" => Some(Section::Points),
        b"Polys" => Some(Section::Polys),
        b"Strips" => Some(Section::Strips),
        b"PointData" | b"CellData" | b"Verts" | b"Lines" | b"FieldData" => Some(Section::Other),
        _ => None,
    }
}

/// Parse a `.vtp` document.
pub fn parse_vtp(text: &str) -> Result<PolyData, ForgeError> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut info: Option<FileInfo> = None;
    let mut pieces: Vec<PieceArrays> = Vec::new();
    let mut section = Section::Other;
    let mut current: Option<ArrayDecl> = None;
    let mut appended: Option<String> = None;
    let mut in_appended = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| corrupt(format!("XML error at byte {}: {}", reader.buffer_position(), e)))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let name = e.name();
                match name.as_ref() {
                    b"VTKFile" => {
                        let attrs = attributes(e)?;
                        if attrs.get("type").map(String::as_str) != Some("PolyData") {
                            return Err(corrupt("VTKFile is not of type PolyData"));
                        }
                        if attrs.contains_key("compressor") {
                            return Err(corrupt(
                                "compressed VTP files are not supported; write uncompressed output",
                            ));
                        }
                        let header = match attrs.get("header_type").map(String::as_str) {
                            None | Some("UInt32") => HeaderType::UInt32,
                            Some("UInt64") => HeaderType::UInt64,
                            Some(other) => {
                                return Err(corrupt(format!("unsupported header_type {}", other)))
                            }
                        };
                        info = Some(FileInfo {
                            big_endian: attrs.get("byte_order").map(String::as_str)
                                == Some("BigEndian"),
                            header,
                        });
                    }
                    b"Piece" => pieces.push(PieceArrays::default()),
                    b"DataArray" => {
                        let attrs = attributes(e)?;
                        let decl = ArrayDecl {
                            section,
                            name: attrs.get("Name").cloned().unwrap_or_default(),
                            scalar: attrs
                                .get("type")
                                .cloned()
                                .ok_or_else(|| corrupt("DataArray without type"))?,
                            format: attrs
                                .get("format")
                                .cloned()
                                .unwrap_or_else(|| "ascii".to_string()),
                            offset: attrs.get("offset").and_then(|o| o.trim().parse().ok()),
                            text: String::new(),
                        };
                        if is_empty {
                            store_array(&mut pieces, decl)?;
                        } else {
                            current = Some(decl);
                        }
                    }
                    b"AppendedData" => {
                        let attrs = attributes(e)?;
                        if attrs.get("encoding").map(String::as_str) != Some("base64") {
                            return Err(corrupt(
                                "raw appended data is not supported; use ASCII or base64",
                            ));
                        }
                        in_appended = !is_empty;
                        appended = Some(String::new());
                    }
                    other => {
                        if let Some(s) = section_of(other) {
                            if !is_empty {
                                section = s;
                            }
                        }
                    }
                }
            }
            Event::Text(t) => {
                let chunk = t
                    .unescape()
                    .map_err(|e| corrupt(format!("bad XML text: {}", e)))?;
                if let Some(decl) = current.as_mut() {
                    decl.text.push_str(&chunk);
                    decl.text.push(' ');
                } else if in_appended {
                    if let Some(buf) = appended.as_mut() {
                        buf.push_str(&chunk);
                    }
                }
            }
            Event::End(ref e) => match e.name().as_ref() {
                b"DataArray" => {
                    if let Some(decl) = current.take() {
                        store_array(&mut pieces, decl)?;
                    }
                }
                b"AppendedData" => in_appended = false,
                other if section_of(other).is_some() => section = Section::Other,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    let info = info.ok_or_else(|| corrupt("missing VTKFile root element"))?;
    let appended = appended.map(|raw| {
        let raw = raw.trim();
        raw.strip_prefix('_').unwrap_or(raw).to_string()
    });

    let mut poly = PolyData::default();
    for piece in pieces {
        let base = u32::try_from(poly.points.len()).map_err(|_| corrupt("too many points"))?;
        let Some(points) = piece.points else {
            continue;
        };
        let coords = decode_array(&points, &info, appended.as_deref())?;
        if coords.len() % 3 != 0 {
            return Err(corrupt("point array length is not a multiple of 3"));
        }
        let count = coords.len() / 3;
        poly.points.extend(
            coords
                .chunks_exact(3)
                .map(|c| DVec3::new(c[0], c[1], c[2])),
        );

        for (arrays, strip) in [(&piece.polys, false), (&piece.strips, true)] {
            if arrays.is_empty() {
                continue;
            }
            let (conn, offsets) = cell_arrays(arrays, &info, appended.as_deref())?;
            triangulate(&conn, &offsets, count, base, strip, &mut poly.triangles)?;
        }
    }

    if !poly.points.iter().all(|p| p.is_finite()) {
        return Err(corrupt("non-finite point coordinate"));
    }
    Ok(poly)
}

fn store_array(pieces: &mut [PieceArrays], decl: ArrayDecl) -> Result<(), ForgeError> {
    let Some(piece) = pieces.last_mut() else {
        return Ok(());
    };
    match decl.section {
        Section::Points => {
            if piece.points.is_none() {
                piece.points = Some(decl);
            }
        }
        Section::Polys => {
            piece.polys.insert(decl.name.clone(), decl);
        }
        Section::Strips => {
            piece.strips.insert(decl.name.clone(), decl);
        }
        Section::Other => {}
    }
    Ok(())
}

fn cell_arrays(
    arrays: &HashMap<String, ArrayDecl>,
    info: &FileInfo,
    appended: Option<&str>,
) -> Result<(Vec<f64>, Vec<f64>), ForgeError> {
    let conn = arrays
        .get("connectivity")
        .ok_or_else(|| corrupt("cell block without connectivity array"))?;
    let offsets = arrays
        .get("offsets")
        .ok_or_else(|| corrupt("cell block without offsets array"))?;
    Ok((
        decode_array(conn, info, appended)?,
        decode_array(offsets, info, appended)?,
    ))
}

fn triangulate(
    conn: &[f64],
    offsets: &[f64],
    point_count: usize,
    base: u32,
    strip: bool,
    out: &mut Vec<[u32; 3]>,
) -> Result<(), ForgeError> {
    let index = |v: f64| -> Result<u32, ForgeError> {
        if v < 0.0 || v.fract() != 0.0 || v as usize >= point_count {
            return Err(corrupt(format!("connectivity index {} out of range", v)));
        }
        Ok(base + v as u32)
    };

    let mut start = 0usize;
    for &end in offsets {
        let end = end as usize;
        if end < start || end > conn.len() {
            return Err(corrupt("cell offsets are not monotonic"));
        }
        let cell = conn[start..end]
            .iter()
            .map(|v| index(*v))
            .collect::<Result<Vec<_>, _>>()?;
        if strip {
            for i in 0..cell.len().saturating_sub(2) {
                // Alternate winding so every strip triangle faces the same way
                if i % 2 == 0 {
                    out.push([cell[i], cell[i + 1], cell[i + 2]]);
                } else {
                    out.push([cell[i + 1], cell[i], cell[i + 2]]);
                }
            }
        } else {
            for i in 1..cell.len().saturating_sub(1) {
                out.push([cell[0], cell[i], cell[i + 1]]);
            }
        }
        start = end;
    }
    Ok(())
}

fn scalar_size(scalar: &str) -> Result<usize, ForgeError> {
    match scalar {
        "Int8" | "UInt8" => Ok(1),
        "Int16" | "UInt16" => Ok(2),
        "Int32" | "UInt32" | "Float32" => Ok(4),
        "Int64" | "UInt64" | "Float64" => Ok(8),
        other => Err(corrupt(format!("unsupported DataArray type {}", other))),
    }
}

fn read_scalar(bytes: &[u8], scalar: &str, big_endian: bool) -> f64 {
    macro_rules! num {
        ($t:ty) => {{
            let mut buf = [0u8; std::mem::size_of::<$t>()];
            buf.copy_from_slice(bytes);
            if big_endian {
                <$t>::from_be_bytes(buf) as f64
            } else {
                <$t>::from_le_bytes(buf) as f64
            }
        }};
    }
    match scalar {
        "Int8" => num!(i8),
        "UInt8" => num!(u8),
        "Int16" => num!(i16),
        "UInt16" => num!(u16),
        "Int32" => num!(i32),
        "UInt32" => num!(u32),
        "Int64" => num!(i64),
        "UInt64" => num!(u64),
        "Float32" => num!(f32),
        _ => num!(f64),
    }
}

fn read_header(bytes: &[u8], info: &FileInfo) -> Result<usize, ForgeError> {
    let size = info.header.size();
    if bytes.len() < size {
        return Err(corrupt("binary block shorter than its header"));
    }
    let value = read_scalar(
        &bytes[..size],
        match info.header {
            HeaderType::UInt32 => "UInt32",
            HeaderType::UInt64 => "UInt64",
        },
        info.big_endian,
    );
    Ok(value as usize)
}

fn base64_len(bytes: usize) -> usize {
    bytes.div_ceil(3) * 4
}

/// Decode one header-prefixed base64 block starting at the head of `encoded`.
///
/// Writers either encode header and payload as one stream or as two
/// separately padded streams; both layouts are accepted.
fn decode_block(encoded: &str, info: &FileInfo) -> Result<Vec<u8>, ForgeError> {
    let encoded: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    if !encoded.is_ascii() {
        return Err(corrupt("non-ASCII data in base64 block"));
    }
    let header_chars = base64_len(info.header.size());
    if encoded.len() < header_chars {
        return Err(corrupt("binary block shorter than its header"));
    }

    // Separately encoded header, then payload
    let split = STANDARD
        .decode(&encoded[..header_chars])
        .ok()
        .and_then(|head| read_header(&head, info).ok())
        .and_then(|n| {
            let end = header_chars + base64_len(n);
            let data = STANDARD.decode(encoded.get(header_chars..end)?).ok()?;
            (data.len() >= n).then(|| data[..n].to_vec())
        });
    if let Some(data) = split {
        return Ok(data);
    }

    // Header and payload in a single stream
    let head = STANDARD
        .decode(&encoded[..header_chars])
        .map_err(|e| corrupt(format!("invalid base64: {}", e)))?;
    let n = read_header(&head, info)?;
    let total = base64_len(info.header.size() + n).min(encoded.len());
    let all = STANDARD
        .decode(&encoded[..total])
        .map_err(|e| corrupt(format!("invalid base64: {}", e)))?;
    let size = info.header.size();
    all.get(size..size + n)
        .map(<[u8]>::to_vec)
        .ok_or_else(|| corrupt("binary block shorter than declared"))
}

fn decode_array(
    decl: &ArrayDecl,
    info: &FileInfo,
    appended: Option<&str>,
) -> Result<Vec<f64>, ForgeError> {
    match decl.format.as_str() {
        "ascii" => decl
            .text
            .split_whitespace()
            .map(|tok| {
                tok.parse::<f64>()
                    .map_err(|_| corrupt(format!("invalid number {:?} in {}", tok, decl.name)))
            })
            .collect(),
        "binary" => bytes_to_numbers(&decode_block(&decl.text, info)?, &decl.scalar, info),
        "appended" => {
            let data = appended.ok_or_else(|| corrupt("appended array without AppendedData"))?;
            let offset = decl
                .offset
                .ok_or_else(|| corrupt("appended array without offset"))?;
            let block = data
                .get(offset..)
                .ok_or_else(|| corrupt("appended offset past end of data"))?;
            bytes_to_numbers(&decode_block(block, info)?, &decl.scalar, info)
        }
        other => Err(corrupt(format!("unsupported DataArray format {}", other))),
    }
}

fn bytes_to_numbers(bytes: &[u8], scalar: &str, info: &FileInfo) -> Result<Vec<f64>, ForgeError> {
    let size = scalar_size(scalar)?;
    if bytes.len() % size != 0 {
        return Err(corrupt("binary array length does not match its type"));
    }
    Ok(bytes
        .chunks_exact(size)
        .map(|chunk| read_scalar(chunk, scalar, info.big_endian))
        .collect())
}
