use std::sync::LazyLock;

use anyhow::{anyhow, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::{debug, info, warn};

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Card layout used by older search pages.
const FALLBACK_CARD: &str = ".gig-card-layout";
const FALLBACK_TITLE: &str = ".gig-title";

/// One listing as extracted from a card. Either field may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GigRecord {
    pub title: String,
    pub description: String,
}

impl GigRecord {
    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.description.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CardSelectors {
    pub card: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Error)]
pub enum FieldError {
    #[error("no element matches {0:?}")]
    Missing(String),
}

struct Compiled {
    card: Selector,
    title: Vec<(String, Selector)>,
    description: Vec<(String, Selector)>,
}

/// Extracts [`GigRecord`]s from rendered search pages.
///
/// Every field is read in isolation: a card missing its title still yields its
/// description, and a malformed card never stops the cards after it.
pub struct CardExtractor {
    primary: Compiled,
    fallback: Option<Compiled>,
}

impl CardExtractor {
    pub fn new(sel: &CardSelectors) -> Result<Self> {
        let primary = Compiled {
            card: parse_selector(&sel.card)?,
            title: vec![(sel.title.clone(), parse_selector(&sel.title)?)],
            description: vec![(sel.description.clone(), parse_selector(&sel.description)?)],
        };

        let fallback = if sel.card == FALLBACK_CARD {
            None
        } else {
            Some(Compiled {
                card: parse_selector(FALLBACK_CARD)?,
                title: vec![
                    (FALLBACK_TITLE.to_string(), parse_selector(FALLBACK_TITLE)?),
                    (sel.title.clone(), parse_selector(&sel.title)?),
                ],
                description: vec![(sel.description.clone(), parse_selector(&sel.description)?)],
            })
        };

        Ok(Self { primary, fallback })
    }

    /// Extract every card on the page. Zero cards is an empty Vec, not an error.
    pub fn extract(&self, html: &str) -> Vec<GigRecord> {
        let document = Html::parse_document(html);

        let mut cards: Vec<ElementRef> = document.select(&self.primary.card).collect();
        let mut layout = &self.primary;
        if cards.is_empty() {
            if let Some(ref fb) = self.fallback {
                cards = document.select(&fb.card).collect();
                if !cards.is_empty() {
                    info!("Primary card selector matched nothing, using {}", FALLBACK_CARD);
                    layout = fb;
                }
            }
        }

        info!("Found {} gigs.", cards.len());

        cards
            .into_iter()
            .map(|card| GigRecord {
                title: field_or_empty(card, &layout.title, "title"),
                description: field_or_empty(card, &layout.description, "description"),
            })
            .collect()
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| anyhow!("invalid selector {:?}: {}", s, e))
}

fn field_or_empty(card: ElementRef, selectors: &[(String, Selector)], name: &str) -> String {
    match read_field(card, selectors) {
        Ok(text) => {
            debug!("Scraped {}: {}", name, text);
            text
        }
        Err(e) => {
            warn!("Failed to scrape {}: {}", name, e);
            String::new()
        }
    }
}

/// First selector that matches wins; its text is whitespace-collapsed.
fn read_field(card: ElementRef, selectors: &[(String, Selector)]) -> Result<String, FieldError> {
    let mut last_err = None;
    for (raw, sel) in selectors {
        match card.select(sel).next() {
            Some(el) => return Ok(normalize_text(&el.text().collect::<String>())),
            None => last_err = Some(FieldError::Missing(raw.clone())),
        }
    }
    Err(last_err.unwrap_or_else(|| FieldError::Missing(String::new())))
}

fn normalize_text(s: &str) -> String {
    WS_RE.replace_all(s.trim(), " ").into_owned()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> CardExtractor {
        CardExtractor::new(&CardSelectors {
            card: ".gig-wrapper".into(),
            title: r#"a[aria-label="Go to gig"] p"#.into(),
            description: ".gig-description".into(),
        })
        .unwrap()
    }

    fn card(title: Option<&str>, desc: Option<&str>) -> String {
        let t = title
            .map(|t| format!(r#"<a aria-label="Go to gig" href="/g"><p>{}</p></a>"#, t))
            .unwrap_or_default();
        let d = desc
            .map(|d| format!(r#"<div class="gig-description">{}</div>"#, d))
            .unwrap_or_default();
        format!(r#"<div class="gig-wrapper">{}{}</div>"#, t, d)
    }

    fn page(cards: &[String]) -> String {
        format!("<html><body>{}</body></html>", cards.join("\n"))
    }

    #[test]
    fn no_cards_is_empty() {
        let recs = extractor().extract("<html><body><p>nothing here</p></body></html>");
        assert!(recs.is_empty());
    }

    #[test]
    fn empty_input_is_empty() {
        assert!(extractor().extract("").is_empty());
    }

    #[test]
    fn full_card() {
        let recs = extractor().extract(&page(&[card(Some("I will design your logo"), Some("Modern logos"))]));
        assert_eq!(
            recs,
            vec![GigRecord {
                title: "I will design your logo".into(),
                description: "Modern logos".into(),
            }]
        );
    }

    #[test]
    fn missing_title_keeps_description() {
        let recs = extractor().extract(&page(&[card(None, Some("Only a description"))]));
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].title, "");
        assert_eq!(recs[0].description, "Only a description");
    }

    #[test]
    fn missing_description_keeps_title() {
        let recs = extractor().extract(&page(&[card(Some("Only a title"), None)]));
        assert_eq!(recs[0].title, "Only a title");
        assert_eq!(recs[0].description, "");
    }

    #[test]
    fn malformed_card_does_not_stop_siblings() {
        let recs = extractor().extract(&page(&[
            card(Some("first"), Some("one")),
            card(None, None),
            card(Some("third"), None),
            card(None, Some("four")),
        ]));
        assert_eq!(recs.len(), 4);
        assert_eq!(recs[0].title, "first");
        assert!(recs[1].is_empty());
        assert_eq!(recs[2].title, "third");
        assert_eq!(recs[3].description, "four");
    }

    #[test]
    fn whitespace_collapsed() {
        let recs = extractor().extract(&page(&[card(
            Some("  I will   build\n   your website  "),
            Some("<span>fast</span>\n\t<b>and</b>  clean"),
        )]));
        assert_eq!(recs[0].title, "I will build your website");
        assert_eq!(recs[0].description, "fast and clean");
    }

    #[test]
    fn fallback_layout() {
        let html = r#"<div class="gig-card-layout"><h3 class="gig-title">Old layout</h3>
            <p class="gig-description">old desc</p></div>"#;
        let recs = extractor().extract(html);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].title, "Old layout");
        assert_eq!(recs[0].description, "old desc");
    }

    #[test]
    fn invalid_selector_rejected() {
        let res = CardExtractor::new(&CardSelectors {
            card: "div[".into(),
            title: "p".into(),
            description: "p".into(),
        });
        assert!(res.is_err());
    }

    #[test]
    fn search_page_fixture() {
        let html = std::fs::read_to_string("tests/fixtures/search_page.html").unwrap();
        let recs = extractor().extract(&html);
        assert_eq!(recs.len(), 4);
        assert_eq!(recs[0].title, "I will design a modern minimalist logo");
        assert_eq!(recs[2].title, "");
        assert!(!recs[2].description.is_empty());
        assert_eq!(recs[3].description, "");
    }
}
