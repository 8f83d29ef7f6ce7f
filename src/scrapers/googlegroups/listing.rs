//! Parsing of Google Groups listing and topic pages, and page planning.
//!
//! The escaped-fragment listing renders one `<tr>` per topic:
//!
//! ```html
//! <tr>
//!   <td class="subject"><a href="https://groups.google.com/d/topic/golang-nuts/8sv65_WCOS4">…</a></td>
//!   <td class="lastPostDate">9/27/18</td>
//! </tr>
//! ```
//!
//! and a marker such as `<i>Showing 1-100 of 2386 topics</i>` carrying the
//! total. Pages are addressed by appending an item range, e.g. `[101-200]`.

use crate::error::{ArchiveError, Result};
use crate::http::{Fetcher, fetch_text};
use crate::models::CrawlJob;
use crate::scrapers::googlegroups::GroupRef;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Items per listing page.
pub const PAGE_SIZE: usize = 100;

/// Largest listing total accepted. The busiest groups hold well under a
/// million topics.
pub const MAX_LISTING_TOTAL: usize = 10_000_000;

static TOTAL_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([0-9]+)\s*[-–]\s*([0-9]+)\s+of\s+([0-9]+)").expect("total marker pattern")
});

/// One topic row of a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRow {
    pub topic_id: String,
    /// Text of the `lastPostDate` cell, if the row has one.
    pub date_text: Option<String>,
    /// The host hid this topic after it was flagged for abuse.
    pub flagged: bool,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ArchiveError::Selector {
        selector: css.to_string(),
        reason: e.to_string(),
    })
}

/// Last path segment of a link, ignoring any query or fragment.
fn last_segment(href: &str) -> Option<&str> {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
}

fn is_flagged_notice(text: &str) -> bool {
    let text = text.to_lowercase();
    text.contains("flagged for abuse") || text.contains("topic has been hidden")
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ")
}

/// Whether `row` is the closest enclosing `<tr>` of `element`.
fn owned_by_row(row: ElementRef<'_>, element: ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| ancestor.value().name() == "tr")
        .is_some_and(|tr| tr.id() == row.id())
}

/// Total item count announced by a listing page, or 0 when the page has no
/// marker (an empty listing).
///
/// The listing does not always put the grand total in the same position, so
/// the largest of the three numbers wins. A number above
/// [`MAX_LISTING_TOTAL`] fails with [`ArchiveError::ListingTotal`].
pub fn parse_total(html: &str) -> Result<usize> {
    let document = Html::parse_document(html);
    let marker = selector("i")?;

    let text = document
        .select(&marker)
        .map(element_text)
        .collect::<Vec<_>>()
        .join(" ");

    let Some(captures) = TOTAL_MARKER.captures(&text) else {
        debug!("No total marker on listing page");
        return Ok(0);
    };

    let mut total = 0;
    for m in (1..=3).filter_map(|i| captures.get(i)) {
        let count = m
            .as_str()
            .parse::<usize>()
            .ok()
            .filter(|n| *n <= MAX_LISTING_TOTAL)
            .ok_or_else(|| ArchiveError::ListingTotal {
                text: m.as_str().to_string(),
            })?;
        total = total.max(count);
    }
    Ok(total)
}

/// Fetch the listing landing page and read its total.
#[instrument(level = "info", skip(fetcher, cancel))]
pub async fn discover_total(
    fetcher: &dyn Fetcher,
    listing_url: &str,
    cancel: &CancellationToken,
) -> Result<usize> {
    let html = fetch_text(fetcher, listing_url, cancel).await?;
    let total = parse_total(&html)?;
    info!(total, "Discovered listing total");
    Ok(total)
}

/// Page jobs covering `total` items, [`PAGE_SIZE`] per page.
///
/// # Arguments
///
/// * `base_url` - Listing URL the `[first-last]` item range is appended to
/// * `total` - Item count read off the listing by [`parse_total`]
///
/// # Returns
///
/// One [`CrawlJob`] per page in ascending order, the last one clamped to
/// `total`. A zero total plans no jobs.
///
/// # Examples
///
/// ```ignore
/// let jobs = plan_jobs("https://groups.google.com/forum/?_escaped_fragment_=forum/golang-nuts", 250);
/// assert_eq!(jobs.len(), 3);
/// assert_eq!((jobs[2].first, jobs[2].last), (201, 250));
/// ```
pub fn plan_jobs(base_url: &str, total: usize) -> Vec<CrawlJob> {
    (0..total.div_ceil(PAGE_SIZE))
        .map(|page| {
            let first = page * PAGE_SIZE + 1;
            let last = ((page + 1) * PAGE_SIZE).min(total);
            CrawlJob {
                url: format!("{base_url}[{first}-{last}]"),
                first,
                last,
            }
        })
        .collect()
}

/// Topic rows of one listing page.
///
/// Rows without a link to a topic of `group` (headers, navigation) are left
/// out. Only a row's own cells and links count, so a layout row wrapping a
/// nested table does not repeat the topics inside it.
pub fn parse_topic_rows(html: &str, group: &str) -> Result<Vec<TopicRow>> {
    let document = Html::parse_document(html);
    let rows = selector("tr")?;
    let anchors = selector("a")?;
    let topic_marker = format!("/d/topic/{group}");

    let mut topics = Vec::new();
    for row in document.select(&rows) {
        let mut topic_id = None;
        let mut date_text = None;
        let mut flagged = false;

        let cells = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|child| child.value().name() == "td");
        for cell in cells {
            let own_anchor = cell.select(&anchors).find(|a| owned_by_row(row, *a));
            if let Some(anchor) = own_anchor {
                if let Some(href) = anchor.value().attr("href") {
                    if href.contains(&topic_marker) {
                        topic_id = last_segment(href).map(str::to_string);
                    }
                }
                let title = anchor.value().attr("title").unwrap_or_default();
                if is_flagged_notice(title) || is_flagged_notice(&element_text(anchor)) {
                    flagged = true;
                }
            }
            if cell.value().classes().any(|class| class == "lastPostDate") {
                date_text = Some(element_text(cell).trim().to_string());
            }
        }

        if let Some(topic_id) = topic_id {
            topics.push(TopicRow {
                topic_id,
                date_text,
                flagged,
            });
        }
    }
    Ok(topics)
}

/// Raw message URL linked from a topic page, or an empty string when the
/// page links no message.
pub fn parse_message_url(html: &str, group: &GroupRef, topic_id: &str) -> Result<String> {
    let document = Html::parse_document(html);
    let anchors = selector("a[href]")?;
    let message_marker = format!("/d/msg/{}", group.group);

    let message_id = document
        .select(&anchors)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| href.contains(&message_marker))
        .find_map(last_segment);

    Ok(message_id
        .map(|id| group.raw_message_url(topic_id, id))
        .unwrap_or_default())
}
