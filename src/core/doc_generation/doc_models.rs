// Domain models for document generation.
// Nothing in here performs I/O over the network. The request and document
// types mirror the Google Docs wire shape so the infra layer can send and
// receive them without a second translation step.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Literal text every link tag is replaced with before styling.
pub const CLICK_HERE: &str = "Click here";

pub const NAME_TAG: &str = "{ibo_name}";
pub const ID_TAG: &str = "{ibo_id}";

/// Tag → `shop_links` position table used when a record carries no explicit `links`.
///
/// Order matters: link styling hands tags out to "Click here" runs in this order.
pub const DEFAULT_TAG_POSITIONS: &[(&str, usize)] = &[
    ("{xoom_residential}", 2),
    ("{id_seal}", 3),
    ("{impact_residential}", 4),
    ("{truvvi_lifestyle}", 1),
    ("{directv_residential}", 6),
];

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum InputError {
    #[error("Failed to read input file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid input record: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Tag {tag} refers to shop_links[{index}] but only {len} link(s) were provided")]
    LinkIndexOutOfRange {
        tag: String,
        index: usize,
        len: usize,
    },

    #[error("Tag {tag} has an empty link")]
    EmptyLink { tag: String },
}

// ============================================================================
// INPUT RECORD
// ============================================================================

/// One explicit tag → URL pair from the input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagLink {
    pub tag: String,
    pub url: String,
}

/// The per-IBO data file.
///
/// `links` is the named form of the mapping. When it is absent the mapping
/// falls back to [`DEFAULT_TAG_POSITIONS`] over `shop_links`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IboRecord {
    pub ibo_name: String,
    pub ibo_id: String,
    #[serde(default)]
    pub shop_links: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<TagLink>>,
}

impl IboRecord {
    pub fn from_json(json: &str) -> Result<Self, InputError> {
        Ok(serde_json::from_str(json)?)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, InputError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| InputError::Read {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_json(&text)
    }
}

// ============================================================================
// TAG MAPPING
// ============================================================================

/// Ordered tag → URL mapping. Every entry has a non-empty URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagMapping {
    entries: Vec<TagLink>,
}

impl TagMapping {
    /// Builds the mapping by indexing into `shop_links`.
    pub fn from_positions(
        shop_links: &[String],
        positions: &[(&str, usize)],
    ) -> Result<Self, InputError> {
        let mut entries = Vec::with_capacity(positions.len());
        for (tag, index) in positions {
            let url = shop_links
                .get(*index)
                .ok_or_else(|| InputError::LinkIndexOutOfRange {
                    tag: tag.to_string(),
                    index: *index,
                    len: shop_links.len(),
                })?;
            entries.push(TagLink {
                tag: tag.to_string(),
                url: url.clone(),
            });
        }
        Self::from_links(entries)
    }

    /// Builds the mapping from explicit pairs. A repeated tag keeps its first URL.
    pub fn from_links(links: Vec<TagLink>) -> Result<Self, InputError> {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(links.len());
        for link in links {
            if link.url.trim().is_empty() {
                return Err(InputError::EmptyLink { tag: link.tag });
            }
            if seen.insert(link.tag.clone()) {
                entries.push(link);
            }
        }
        Ok(Self { entries })
    }

    pub fn for_record(record: &IboRecord) -> Result<Self, InputError> {
        match &record.links {
            Some(links) => Self::from_links(links.clone()),
            None => Self::from_positions(&record.shop_links, DEFAULT_TAG_POSITIONS),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &TagLink> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// DOCUMENT HANDLES AND RESULTS
// ============================================================================

/// Opaque Drive file id of the converted document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn edit_url(&self) -> String {
        format!("https://docs.google.com/document/d/{}/edit", self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pipeline steps whose failures are tolerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    TagSubstitution,
    HyperlinkStyling,
    DetailSubstitution,
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStep::TagSubstitution => "tag substitution",
            PipelineStep::HyperlinkStyling => "hyperlink styling",
            PipelineStep::DetailSubstitution => "detail substitution",
        };
        f.write_str(name)
    }
}

/// A caught failure from a non-fatal step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepWarning {
    pub step: PipelineStep,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct GeneratedDocument {
    pub document_id: DocumentId,
    pub url: String,
    /// Empty when every step succeeded.
    pub warnings: Vec<StepWarning>,
}

// ============================================================================
// DOCS BATCH UPDATE REQUESTS
// ============================================================================

/// One entry of a Docs `batchUpdate` request list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DocRequest {
    ReplaceAllText(ReplaceAllText),
    UpdateTextStyle(UpdateTextStyle),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceAllText {
    pub contains_text: SubstringMatchCriteria,
    pub replace_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubstringMatchCriteria {
    pub text: String,
    pub match_case: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTextStyle {
    pub range: TextRange,
    pub text_style: TextStyle,
    pub fields: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRange {
    pub start_index: u64,
    pub end_index: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextStyle {
    pub bold: bool,
    pub link: Link,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Link {
    pub url: String,
}

impl DocRequest {
    /// Case-sensitive replace of every occurrence of `find`.
    pub fn replace_all(find: &str, replace_with: &str) -> Self {
        DocRequest::ReplaceAllText(ReplaceAllText {
            contains_text: SubstringMatchCriteria {
                text: find.to_string(),
                match_case: true,
            },
            replace_text: replace_with.to_string(),
        })
    }

    /// Bold + hyperlink over `[start, end)`.
    pub fn bold_link(start_index: u64, end_index: u64, url: &str) -> Self {
        DocRequest::UpdateTextStyle(UpdateTextStyle {
            range: TextRange {
                start_index,
                end_index,
            },
            text_style: TextStyle {
                bold: true,
                link: Link {
                    url: url.to_string(),
                },
            },
            fields: "bold,link".to_string(),
        })
    }
}

// ============================================================================
// DOCUMENT TREE (subset of the Docs API `Document` resource)
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default)]
    pub document_id: String,
    #[serde(default)]
    pub title: String,
    pub body: Option<Body>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    #[serde(default)]
    pub content: Vec<StructuralElement>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralElement {
    pub start_index: Option<u64>,
    pub end_index: Option<u64>,
    pub paragraph: Option<Paragraph>,
    pub table: Option<Table>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paragraph {
    #[serde(default)]
    pub elements: Vec<ParagraphElement>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagraphElement {
    pub start_index: Option<u64>,
    pub end_index: Option<u64>,
    pub text_run: Option<TextRun>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRun {
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    #[serde(default)]
    pub table_rows: Vec<TableRow>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    #[serde(default)]
    pub table_cells: Vec<TableCell>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCell {
    #[serde(default)]
    pub content: Vec<StructuralElement>,
}
