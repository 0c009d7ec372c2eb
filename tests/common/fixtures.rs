//! Drawing and model fixtures.

/// DXF entity record builders. Each returns the group-pair lines of one
/// entity, without the surrounding section.
pub fn line(handle: &str, layer: &str, a: (f64, f64), b: (f64, f64)) -> String {
    format!(
        "0\nLINE\n5\n{}\n8\n{}\n10\n{}\n20\n{}\n30\n0.0\n11\n{}\n21\n{}\n31\n0.0\n",
        handle, layer, a.0, a.1, b.0, b.1
    )
}

pub fn circle(handle: &str, layer: &str, center: (f64, f64), radius: f64) -> String {
    format!(
        "0\nCIRCLE\n5\n{}\n8\n{}\n10\n{}\n20\n{}\n30\n0.0\n40\n{}\n",
        handle, layer, center.0, center.1, radius
    )
}

pub fn arc(handle: &str, layer: &str, center: (f64, f64), radius: f64, angles: (f64, f64)) -> String {
    format!(
        "0\nARC\n5\n{}\n8\n{}\n10\n{}\n20\n{}\n30\n0.0\n40\n{}\n50\n{}\n51\n{}\n",
        handle, layer, center.0, center.1, radius, angles.0, angles.1
    )
}

/// 2D polyline: vertices carry only x/y and no elevation.
pub fn lwpolyline(handle: &str, layer: &str, vertices: &[(f64, f64)], closed: bool) -> String {
    let mut record = format!(
        "0\nLWPOLYLINE\n5\n{}\n8\n{}\n90\n{}\n70\n{}\n",
        handle,
        layer,
        vertices.len(),
        u8::from(closed)
    );
    for (x, y) in vertices {
        record.push_str(&format!("10\n{}\n20\n{}\n", x, y));
    }
    record
}

pub fn ellipse(
    handle: &str,
    layer: &str,
    center: (f64, f64),
    major_axis: (f64, f64),
    ratio: f64,
) -> String {
    format!(
        "0\nELLIPSE\n5\n{}\n8\n{}\n10\n{}\n20\n{}\n30\n0.0\n11\n{}\n21\n{}\n31\n0.0\n40\n{}\n",
        handle, layer, center.0, center.1, major_axis.0, major_axis.1, ratio
    )
}

pub fn text(handle: &str, layer: &str, value: &str) -> String {
    format!(
        "0\nTEXT\n5\n{}\n8\n{}\n10\n0.0\n20\n0.0\n30\n0.0\n40\n2.5\n1\n{}\n",
        handle, layer, value
    )
}

/// Wrap entity records into a minimal DXF document.
pub fn dxf_document(records: &[String]) -> String {
    let mut doc = String::from("0\nSECTION\n2\nENTITIES\n");
    for record in records {
        doc.push_str(record);
    }
    doc.push_str("0\nENDSEC\n0\nEOF\n");
    doc
}

/// Three lines forming an open triangle plus one circle, all on `geom`.
pub fn small_drawing() -> String {
    dxf_document(&[
        line("A1", "geom", (0.0, 0.0), (10.0, 0.0)),
        line("A2", "geom", (10.0, 0.0), (10.0, 5.0)),
        line("A3", "geom", (10.0, 5.0), (0.0, 0.0)),
        circle("A4", "geom", (5.0, 2.0), 1.0),
    ])
}

/// 40 chained lines on `outline` and 5 circles on `holes`.
pub fn large_drawing() -> String {
    let mut records = Vec::new();
    for i in 0..40 {
        let x = i as f64;
        records.push(line(
            &format!("L{}", i),
            "outline",
            (x, 0.0),
            (x + 1.0, 0.0),
        ));
    }
    for i in 0..5 {
        records.push(circle(
            &format!("C{}", i),
            "holes",
            (i as f64 * 8.0, 4.0),
            1.5,
        ));
    }
    dxf_document(&records)
}

/// Geometry interleaved with annotation.
pub fn annotated_drawing() -> String {
    dxf_document(&[
        line("B1", "geom", (0.0, 0.0), (20.0, 0.0)),
        text("B2", "geom", "SECTION A-A"),
        circle("B3", "geom", (5.0, 5.0), 2.0),
        line("B4", "DIMENSIONS", (0.0, -5.0), (20.0, -5.0)),
        text("B5", "NOTES", "ALL DIMS IN MM"),
        line("B6", "geom", (20.0, 0.0), (20.0, 10.0)),
    ])
}

/// Unit cube: 8 points, 6 quads.
pub const CUBE_VTP: &str = r#"<?xml version="1.0"?>
<VTKFile type="PolyData" version="0.1" byte_order="LittleEndian">
  <PolyData>
    <Piece NumberOfPoints="8" NumberOfPolys="6">
      <Points>
        <DataArray type="Float32" NumberOfComponents="3" format="ascii">
          0 0 0  1 0 0  1 1 0  0 1 0
          0 0 1  1 0 1  1 1 1  0 1 1
        </DataArray>
      </Points>
      <Polys>
        <DataArray type="Int32" Name="connectivity" format="ascii">
          0 3 2 1  4 5 6 7  0 1 5 4  2 3 7 6  1 2 6 5  0 4 7 3
        </DataArray>
        <DataArray type="Int32" Name="offsets" format="ascii">
          4 8 12 16 20 24
        </DataArray>
      </Polys>
    </Piece>
  </PolyData>
</VTKFile>
"#;

/// A script the fake runtime accepts.
pub const GOOD_SCRIPT: &str = "import cadquery as cq\nresult = cq.Workplane('XY').box(10, 5, 2)\ncq.exporters.export(result, '/output/model.vtp')\n";

/// A script that references an undefined name.
pub const BROKEN_SCRIPT: &str =
    "import cadquery as cq\nresult = cq.Workplane('XY').box(10, 5, hieght)\n";
