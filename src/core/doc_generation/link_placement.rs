// Link placement: decides which "Click here" run receives which tag's URL.
//
// After tag substitution every link tag reads "Click here", so the document
// no longer says which tag a run came from. Tags are handed out in mapping
// order to "Click here" runs in document order. Each tag is used at most
// once and each run receives at most one link, styled over the run's whole
// index range.

use std::collections::HashSet;

use super::doc_models::{DocRequest, Document, StructuralElement, TagMapping, CLICK_HERE};

/// Maximum number of style requests sent in one `batchUpdate` call.
pub const STYLE_BATCH_SIZE: usize = 50;

/// A text run with its absolute Docs index range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocatedRun<'a> {
    pub start_index: u64,
    pub end_index: u64,
    pub content: &'a str,
}

/// Flattens every text run in the body, descending into table cells, in document order.
pub fn text_runs(document: &Document) -> Vec<LocatedRun<'_>> {
    let mut runs = Vec::new();
    if let Some(body) = &document.body {
        collect_runs(&body.content, &mut runs);
    }
    runs
}

fn collect_runs<'a>(elements: &'a [StructuralElement], runs: &mut Vec<LocatedRun<'a>>) {
    for element in elements {
        if let Some(paragraph) = &element.paragraph {
            for para_element in &paragraph.elements {
                let Some(content) = para_element
                    .text_run
                    .as_ref()
                    .and_then(|run| run.content.as_deref())
                else {
                    continue;
                };

                // The API omits zero-valued indices, so only a missing end is unusable.
                let Some(end_index) = para_element.end_index else {
                    tracing::warn!("Skipping text run without an end index: {:?}", content);
                    continue;
                };

                runs.push(LocatedRun {
                    start_index: para_element.start_index.unwrap_or(0),
                    end_index,
                    content,
                });
            }
        }

        if let Some(table) = &element.table {
            for row in &table.table_rows {
                for cell in &row.table_cells {
                    collect_runs(&cell.content, runs);
                }
            }
        }
    }
}

/// Builds one bold + link request per "Click here" run until the tags run out.
pub fn plan_link_styles(document: &Document, mapping: &TagMapping) -> Vec<DocRequest> {
    let mut applied: HashSet<&str> = HashSet::new();
    let mut requests = Vec::new();

    for run in text_runs(document) {
        if !run.content.contains(CLICK_HERE) {
            continue;
        }

        let Some(tag_link) = mapping.iter().find(|l| !applied.contains(l.tag.as_str())) else {
            break;
        };

        tracing::debug!(
            "Applying link {} for {} to range {}..{}",
            tag_link.url,
            tag_link.tag,
            run.start_index,
            run.end_index
        );

        applied.insert(tag_link.tag.as_str());
        requests.push(DocRequest::bold_link(
            run.start_index,
            run.end_index,
            &tag_link.url,
        ));
    }

    requests
}
