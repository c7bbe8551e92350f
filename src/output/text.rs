//! Plain-text report.

use std::io::{self, Write};

use crate::analysis::AnalysisReport;

/// Human-readable rendering of an [`AnalysisReport`].
#[derive(Debug, Clone, Copy)]
pub struct TextOutput<'a> {
    report: &'a AnalysisReport,
}

impl<'a> TextOutput<'a> {
    /// Wrap a report.
    #[must_use]
    pub fn new(report: &'a AnalysisReport) -> Self {
        Self { report }
    }

    /// Write groups, failures and a summary block.
    ///
    /// # Errors
    ///
    /// Returns any error from the writer.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let report = self.report;
        if report.cancelled {
            return writeln!(writer, "Analysis cancelled; no results.");
        }

        if report.groups.is_empty() {
            writeln!(writer, "No similar images found.")?;
        }
        for group in &report.groups {
            writeln!(
                writer,
                "{} ({} images, {}% similar)",
                group.id,
                group.len(),
                group.similarity_percent()
            )?;
            for id in &group.members {
                match report.features.get(id) {
                    Some(f) => writeln!(
                        writer,
                        "  {}  [{}, quality {}]",
                        id, f.image_type, f.quality.quality_score
                    )?,
                    None => writeln!(writer, "  {}", id)?,
                }
            }
            writeln!(writer)?;
        }

        if !report.errors.is_empty() {
            writeln!(writer, "Skipped {} image(s):", report.errors.len())?;
            for e in &report.errors {
                writeln!(writer, "  {}: {}", e.filename, e.message)?;
            }
            writeln!(writer)?;
        }

        let s = &report.summary;
        writeln!(
            writer,
            "{} images, {} analyzed, {} failed; {} photos, {} screenshots, {} documents",
            s.images_total,
            s.images_analyzed,
            s.images_failed,
            s.types.photo,
            s.types.screenshot,
            s.types.document
        )?;
        writeln!(
            writer,
            "{} groups from {} comparisons{} in {}ms",
            report.groups.len(),
            s.pairs_compared,
            if s.global_fallback { " (single bucket)" } else { "" },
            s.duration_ms
        )
    }
}
