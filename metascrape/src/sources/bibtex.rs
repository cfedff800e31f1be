//! BibTeX decoding for sources that embed bib records
//!
//! DBLP `.bib` exports and OpenReview `_bibtex` fields are decoded with the
//! `biblatex` crate into a flat `BibRecord`.

use crate::types::PubType;
use biblatex::{Bibliography, ChunksExt, EntryType};

/// Fields of one BibTeX entry used by the adapters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BibRecord {
    pub title: String,
    /// Comma-joined `Given Family` names
    pub authors: String,
    pub year: String,
    /// `booktitle`, falling back to `journal`
    pub container_title: String,
    pub pub_type: Option<PubType>,
}

/// Strip characters the parser rejects from the citation key
///
/// DBLP keys look like `DBLP:conf/cvpr/HeZRS16`.
fn sanitize_key(bibtex: &str) -> String {
    let mut lines: Vec<String> = bibtex
        .trim()
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect();

    for line in lines.iter_mut().take(2) {
        if line.contains('=') || !line.trim_end().ends_with(',') {
            continue;
        }
        let cleaned = match line.split_once('{') {
            Some((kind, key)) if kind.trim_start().starts_with('@') => format!(
                "{}{{{}",
                kind,
                key.chars()
                    .filter(|c| c.is_ascii_alphanumeric() || *c == ',')
                    .collect::<String>()
            ),
            _ => line
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == ',')
                .collect(),
        };
        *line = cleaned;
    }
    lines.join("\n")
}

fn field(entry: &biblatex::Entry, key: &str) -> String {
    entry
        .get(key)
        .map(|chunks| chunks.format_verbatim())
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
}

fn pub_type(entry_type: &EntryType) -> PubType {
    match entry_type {
        EntryType::Article => PubType::Journal,
        EntryType::InProceedings | EntryType::InCollection | EntryType::InBook => {
            PubType::Conference
        }
        EntryType::Book => PubType::Book,
        _ => PubType::Other,
    }
}

/// Decode the first entry of a BibTeX document
///
/// Returns `None` when the text does not parse or holds no entry.
pub fn parse_first(bibtex: &str) -> Option<BibRecord> {
    let bibliography = Bibliography::parse(&sanitize_key(bibtex)).ok()?;
    let entry = bibliography.iter().next()?;

    let authors = entry
        .author()
        .map(|people| {
            people
                .iter()
                .map(|p| format!("{} {}", p.given_name, p.name).trim().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();

    let mut container_title = field(entry, "booktitle");
    if container_title.is_empty() {
        container_title = field(entry, "journal");
    }

    Some(BibRecord {
        title: field(entry, "title"),
        authors,
        year: field(entry, "year"),
        container_title,
        pub_type: Some(pub_type(&entry.entry_type)),
    })
}
