//! Fixed prompt template for script generation.

use std::fmt::Write;

use crate::codegen::{GenerationInput, PreviousAttempt};

pub const ROLE_PREAMBLE: &str = "You are an expert mechanical CAD engineer. You write CadQuery \
(Python) scripts that reconstruct a 3D part from the geometry of a 2D engineering drawing and \
the user's request.";

pub const NO_EXAMPLES: &str = "No reference examples available.";

pub const REQUIREMENTS: &str = "\
- Start with `import cadquery as cq` and `import vtk`; use no other third-party packages.
- Build the part as a single CadQuery Workplane named `result`.
- Write every output file into the `/output` directory; never write anywhere else.
- Export exactly one polygonal file, `/output/model.vtp`, as uncompressed ASCII:
    writer = vtk.vtkXMLPolyDataWriter()
    writer.SetFileName(\"/output/model.vtp\")
    writer.SetInputData(result.val().toVtkPolyData(0.1, 0.2))
    writer.SetDataModeToAscii()
    writer.SetCompressorTypeToNone()
    writer.Write()
- You may additionally export `/output/model.step` and `/output/model.stl`.
- Use millimetres and the drawing's coordinates; extrude 2D outlines to a plausible thickness \
when the drawing gives none.
- Return only the raw Python script. No markdown fences, no explanations.";

fn push_section(out: &mut String, title: &str, body: &str) {
    let _ = write!(out, "## {}\n{}\n\n", title, body.trim_end());
}

fn retry_section(previous: &PreviousAttempt<'_>) -> String {
    format!(
        "The previous script failed. Fix the cause of the error and return a complete corrected script.\n\
         Failed script:\n<<<\n{}\n>>>\nError:\n<<<\n{}\n>>>",
        previous.script.trim_end(),
        previous.error.trim_end()
    )
}

/// Render the prompt. Sections appear in a fixed order; the retry section
/// only when a previous attempt is supplied.
pub fn build_prompt(input: &GenerationInput<'_>) -> String {
    let mut out = String::new();
    push_section(
        &mut out,
        "Role",
        &format!("{}\n\nUser request: {}", ROLE_PREAMBLE, input.user_request.trim()),
    );
    push_section(&mut out, "Geometry description", input.geometry);
    push_section(
        &mut out,
        "Reference examples",
        input
            .semantic_context
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(NO_EXAMPLES),
    );
    if let Some(previous) = &input.previous {
        push_section(&mut out, "Previous attempt", &retry_section(previous));
    }
    push_section(&mut out, "Requirements", REQUIREMENTS);
    out.trim_end().to_string()
}
