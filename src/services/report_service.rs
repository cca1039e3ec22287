//! PDF summary reports over a set of property records.
//!
//! Layout is intentionally minimal: a title, an aggregate block, and one
//! line per property. The caller receives raw PDF bytes and handles
//! encoding for transport.

use anyhow::Result;
use chrono::Utc;
use printpdf::{
    BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
};

use crate::models::property::Property;
use crate::models::stats::PropertyStats;

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const LEFT_MARGIN_MM: f32 = 14.0;
const TOP_START_MM: f32 = 277.0;
const BOTTOM_MARGIN_MM: f32 = 16.0;
const LINE_STEP_MM: f32 = 7.0;

/// Render a summary report for the given page of properties.
pub fn render_summary(properties: &[Property], stats: &PropertyStats) -> Result<Vec<u8>> {
    let (doc, page, layer) = PdfDocument::new(
        "Property summary report",
        Mm(PAGE_WIDTH_MM),
        Mm(PAGE_HEIGHT_MM),
        "content",
    );
    let font = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_err)?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(pdf_err)?;
    let layer = doc.get_page(page).get_layer(layer);

    let mut writer = LineWriter {
        doc: &doc,
        layer,
        y: TOP_START_MM,
    };

    writer.line(&bold, 16.0, "Property summary report");
    writer.line(
        &font,
        10.0,
        &format!("Generated at {}", Utc::now().to_rfc3339()),
    );
    writer.skip();

    writer.line(&bold, 12.0, "Summary");
    writer.line(
        &font,
        10.0,
        &format!("Properties: {}", stats.total_properties),
    );
    writer.line(&font, 10.0, &format!("Total area: {} ha", stats.total_area));
    writer.line(
        &font,
        10.0,
        &format!("Total perimeter: {} m", stats.total_perimeter),
    );
    writer.line(
        &font,
        10.0,
        &format!("Average area: {} ha", stats.average_area),
    );
    writer.line(
        &font,
        10.0,
        &format!(
            "Largest: {} ha / Smallest: {} ha",
            stats.largest_property, stats.smallest_property
        ),
    );
    writer.skip();

    writer.line(&bold, 12.0, "Properties");
    for property in properties {
        writer.line(
            &font,
            10.0,
            &format!(
                "{} — {} — {} ha, {} m perimeter (created {})",
                property.name,
                property.kind,
                property.area,
                property.perimeter,
                property.created_at.format("%Y-%m-%d"),
            ),
        );
    }

    doc.save_to_bytes().map_err(pdf_err)
}

fn pdf_err(err: impl std::fmt::Display) -> anyhow::Error {
    anyhow::anyhow!("{}", err)
}

/// Cursor over the current page; starts a fresh page when the next line
/// would fall below the bottom margin.
struct LineWriter<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    y: f32,
}

impl LineWriter<'_> {
    fn line(&mut self, font: &IndirectFontRef, size: f32, text: &str) {
        if self.y < BOTTOM_MARGIN_MM {
            let (page, layer) =
                self.doc
                    .add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "content");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = TOP_START_MM;
        }
        self.layer
            .use_text(text, size, Mm(LEFT_MARGIN_MM), Mm(self.y), font);
        self.y -= LINE_STEP_MM;
    }

    fn skip(&mut self) {
        self.y -= LINE_STEP_MM / 2.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::property::{AnalysisStatus, PropertyKind};
    use crate::services::stats_service;

    fn property(name: &str, area: &str) -> Property {
        Property {
            owner_id: "owner-a".into(),
            property_id: "prop_0123456789ab".into(),
            name: name.into(),
            kind: PropertyKind::Farm,
            description: String::new(),
            area: area.parse().unwrap(),
            perimeter: "2000".parse().unwrap(),
            coordinates: Vec::new(),
            analysis_status: AnalysisStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn renders_a_pdf_document() {
        let properties = vec![property("Fazenda Sol", "120.5"), property("Sitio Azul", "30")];
        let stats = stats_service::aggregate(&properties);

        let bytes = render_summary(&properties, &stats).expect("rendered report");
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn long_property_lists_spill_onto_extra_pages() {
        let properties: Vec<Property> = (0..80)
            .map(|i| property(&format!("Property {}", i), "10"))
            .collect();
        let stats = stats_service::aggregate(&properties);

        let bytes = render_summary(&properties, &stats).expect("rendered report");
        assert!(bytes.starts_with(b"%PDF"));
        // Two pages means at least two /Page objects in the output.
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.matches("/Page").count() >= 2);
    }
}
