//! ASAP annotation document for the coverage ledger.
//!
//! Every ledger entry becomes two annotations: a `Center_{id}` dot at the
//! rectangle midpoint and a `Patch_{id}` rectangle whose four corners are
//! listed top-left, top-right, bottom-right, bottom-left.
//!
//! # Example Output
//!
//! ```xml
//! <?xml version='1.0' encoding='utf-8'?>
//! <ASAP_Annotations>
//!   <Annotations>
//!     <Annotation Name="Center_0" Type="Dot" PartOfGroup="None" Color="255, 0, 0">
//!       <Coordinates>
//!         <Coordinate X="512.0" Y="512.0" />
//!       </Coordinates>
//!     </Annotation>
//!     <Annotation Name="Patch_0" Type="Rectangle" PartOfGroup="None" Color="255, 0, 0">
//!       <Coordinates>
//!         <Coordinate Order="0" X="0" Y="0" />
//!         <Coordinate Order="1" X="1024" Y="0" />
//!         <Coordinate Order="2" X="1024" Y="1024" />
//!         <Coordinate Order="3" X="0" Y="1024" />
//!       </Coordinates>
//!     </Annotation>
//!   </Annotations>
//! </ASAP_Annotations>
//! ```
//!
//! Rectangles are stored with integer corners, so parsing the document back
//! reproduces them exactly.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::SchemaError;
use crate::tile::TileRect;

use super::PatchId;

const PATCH_PREFIX: &str = "Patch_";
const CENTER_PREFIX: &str = "Center_";
const RECTANGLE_TYPE: &str = "Rectangle";

/// Render ledger entries as an annotation document.
///
/// Entries are written in the order given; the output depends only on the
/// entries, so rendering the same ledger twice yields identical bytes.
pub fn render_document(entries: &[(PatchId, TileRect)]) -> String {
    let mut doc = String::with_capacity(128 + entries.len() * 640);
    doc.push_str("<?xml version='1.0' encoding='utf-8'?>\n");
    doc.push_str("<ASAP_Annotations>\n  <Annotations>\n");

    for (patch_id, rect) in entries {
        let (cx, cy) = rect.center();
        let _ = write!(
            doc,
            r#"    <Annotation Name="{CENTER_PREFIX}{patch_id}" Type="Dot" PartOfGroup="None" Color="255, 0, 0">
      <Coordinates>
        <Coordinate X="{cx:?}" Y="{cy:?}" />
      </Coordinates>
    </Annotation>
"#
        );

        let _ = writeln!(
            doc,
            r#"    <Annotation Name="{PATCH_PREFIX}{patch_id}" Type="{RECTANGLE_TYPE}" PartOfGroup="None" Color="255, 0, 0">"#
        );
        doc.push_str("      <Coordinates>\n");
        for (order, (x, y)) in rect.corners().iter().enumerate() {
            let _ = writeln!(
                doc,
                r#"        <Coordinate Order="{order}" X="{x}" Y="{y}" />"#
            );
        }
        doc.push_str("      </Coordinates>\n    </Annotation>\n");
    }

    doc.push_str("  </Annotations>\n</ASAP_Annotations>\n");
    doc
}

/// Annotation being assembled while parsing.
struct PendingAnnotation {
    name: String,
    kind: String,
    coordinates: Vec<HashMap<String, String>>,
}

/// Parse the `Patch_{id}` rectangles of an annotation document.
///
/// `Center_*` dots and any other annotations are ignored.
///
/// # Errors
///
/// Returns a [`SchemaError`] if the XML is malformed, a patch rectangle does
/// not have four consistent integer corners, or a patch id appears twice.
pub fn parse_document(doc: &str) -> Result<BTreeMap<PatchId, TileRect>, SchemaError> {
    let mut reader = Reader::from_str(doc);
    reader.config_mut().trim_text(true);

    let mut patches = BTreeMap::new();
    let mut pending: Option<PendingAnnotation> = None;
    let mut depth = 0usize;
    let mut saw_root = false;

    loop {
        let event = reader.read_event().map_err(|e| {
            SchemaError::Xml(format!("at byte {}: {}", reader.buffer_position(), e))
        })?;

        match &event {
            Event::Start(_) => {
                depth += 1;
                saw_root = true;
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Empty(_) => saw_root = true,
            _ => {}
        }

        match event {
            Event::Start(e) if e.name().as_ref() == b"Annotation" => {
                let attrs = attributes(&e)?;
                pending = Some(PendingAnnotation {
                    name: attrs.get("Name").cloned().unwrap_or_default(),
                    kind: attrs.get("Type").cloned().unwrap_or_default(),
                    coordinates: Vec::new(),
                });
            }
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"Coordinate" => {
                if let Some(annotation) = pending.as_mut() {
                    annotation.coordinates.push(attributes(&e)?);
                }
            }
            Event::End(e) if e.name().as_ref() == b"Annotation" => {
                if let Some(annotation) = pending.take() {
                    if let Some((patch_id, rect)) = patch_rect(&annotation)? {
                        if patches.insert(patch_id, rect).is_some() {
                            return Err(SchemaError::invalid(
                                annotation.name,
                                "patch id appears more than once",
                            ));
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root || depth != 0 {
        return Err(SchemaError::Xml("document ends before its root element is closed".to_string()));
    }
    Ok(patches)
}

fn attributes(element: &BytesStart<'_>) -> Result<HashMap<String, String>, SchemaError> {
    let mut map = HashMap::new();
    for attr in element.attributes() {
        let attr = attr.map_err(|e| SchemaError::Xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| SchemaError::Xml(e.to_string()))?
            .into_owned();
        map.insert(key, value);
    }
    Ok(map)
}

/// Extract the rectangle of a `Patch_{id}` annotation.
fn patch_rect(annotation: &PendingAnnotation) -> Result<Option<(PatchId, TileRect)>, SchemaError> {
    let Some(id) = annotation.name.strip_prefix(PATCH_PREFIX) else {
        return Ok(None);
    };
    if annotation.kind != RECTANGLE_TYPE {
        return Ok(None);
    }

    let name = annotation.name.as_str();
    let patch_id: PatchId = id
        .parse()
        .map_err(|_| SchemaError::invalid(name, format!("'{}' is not a patch id", id)))?;

    let mut corners: [Option<(u32, u32)>; 4] = [None; 4];
    for coord in &annotation.coordinates {
        let order = coord
            .get("Order")
            .ok_or_else(|| SchemaError::MissingField(format!("{}: Coordinate Order", name)))?;
        let order: usize = order
            .parse()
            .ok()
            .filter(|o| *o < 4)
            .ok_or_else(|| SchemaError::invalid(name, format!("bad corner order '{}'", order)))?;
        let x = pixel_coordinate(name, "X", coord)?;
        let y = pixel_coordinate(name, "Y", coord)?;
        if corners[order].replace((x, y)).is_some() {
            return Err(SchemaError::invalid(name, format!("corner {} listed twice", order)));
        }
    }

    let [Some(tl), Some(tr), Some(br), Some(bl)] = corners else {
        return Err(SchemaError::invalid(name, "rectangle needs four corners"));
    };

    let rect = TileRect::new(tl.0, tl.1, br.0, br.1);
    if rect.x0 >= rect.x1 || rect.y0 >= rect.y1 || rect.corners() != [tl, tr, br, bl] {
        return Err(SchemaError::invalid(
            name,
            "corners do not form an axis-aligned rectangle in TL, TR, BR, BL order",
        ));
    }

    Ok(Some((patch_id, rect)))
}

/// Read a corner coordinate, accepting `12` as well as `12.0`.
fn pixel_coordinate(
    name: &str,
    axis: &str,
    coord: &HashMap<String, String>,
) -> Result<u32, SchemaError> {
    let raw = coord
        .get(axis)
        .ok_or_else(|| SchemaError::MissingField(format!("{}: Coordinate {}", name, axis)))?;
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| SchemaError::invalid(name, format!("{} '{}' is not a number", axis, raw)))?;
    if value.fract() != 0.0 || value < 0.0 || value > f64::from(u32::MAX) {
        return Err(SchemaError::invalid(
            name,
            format!("{} '{}' is not a pixel coordinate", axis, raw),
        ));
    }
    Ok(value as u32)
}
