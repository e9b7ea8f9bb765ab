use std::path::{Path, PathBuf};

use bibstow_bib::Database;
use hayagriva::citationberg::{IndependentStyle, Locale};
use hayagriva::io::from_biblatex_str;
use hayagriva::{
    BibliographyDriver, BibliographyRequest, BufWriteFormat, CitationItem, CitationRequest,
};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to read style {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed CSL style: {0}")]
    Style(String),
    #[error("could not convert database for rendering: {0}")]
    Convert(String),
    #[error("entry `{0}` was dropped during conversion")]
    MissingEntry(String),
    #[error("style has no bibliography layout")]
    NoBibliography,
    #[error("failed to render bibliography text")]
    Render(#[from] std::fmt::Error),
}

/// A parsed CSL style plus the bundled locales it renders with.
pub struct Style {
    style: IndependentStyle,
    locales: Vec<Locale>,
}

impl Style {
    /// Load and parse an independent CSL style file.
    pub fn from_path(path: &Path) -> Result<Self, RenderError> {
        let xml = std::fs::read_to_string(path).map_err(|source| RenderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_xml(&xml)
    }

    /// Parse an independent CSL style from XML text.
    pub fn from_xml(xml: &str) -> Result<Self, RenderError> {
        let style = IndependentStyle::from_xml(xml).map_err(|e| RenderError::Style(e.to_string()))?;
        Ok(Self {
            style,
            locales: hayagriva::archive::locales(),
        })
    }
}

/// Render the whole database as a plain-text bibliography, one entry per
/// line, in database order.
///
/// Each entry is registered as its own single-item citation and rendered on
/// its own, then the rendered items are joined here. Driving the formatter
/// entry by entry keeps the output in database order even when the style
/// declares its own bibliography sort.
pub fn render_bibliography(db: &Database, style: &Style) -> Result<String, RenderError> {
    let library = from_biblatex_str(&db.to_biblatex_string()).map_err(|errors| {
        RenderError::Convert(
            errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        )
    })?;

    debug!(entries = db.len(), "rendering bibliography");
    let mut rendered = Vec::with_capacity(db.len());
    for entry in db.entries() {
        let converted = library
            .get(&entry.key)
            .ok_or_else(|| RenderError::MissingEntry(entry.key.clone()))?;
        rendered.push(render_entry(converted, style)?);
    }
    Ok(rendered.join("\n"))
}

/// Render one entry's bibliography item as plain text.
fn render_entry(entry: &hayagriva::Entry, style: &Style) -> Result<String, RenderError> {
    let mut driver = BibliographyDriver::new();
    driver.citation(CitationRequest::from_items(
        vec![CitationItem::with_entry(entry)],
        &style.style,
        &style.locales,
    ));

    let result = driver.finish(BibliographyRequest {
        style: &style.style,
        locale: None,
        locale_files: &style.locales,
    });

    let item = result
        .bibliography
        .and_then(|b| b.items.into_iter().next())
        .ok_or(RenderError::NoBibliography)?;

    let mut buf = String::new();
    item.content.write_buf(&mut buf, BufWriteFormat::Plain)?;
    Ok(buf)
}
