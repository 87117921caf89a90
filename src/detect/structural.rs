use log::{debug, warn};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use scraper::{Html, Selector};

use crate::model::truncate_chars;

/// Confidence attached to structural matches. Fixed: a configured selector
/// hitting real markup is as certain as this pipeline gets.
pub const STRUCTURAL_CONFIDENCE: Decimal = dec!(0.9);

#[derive(Debug, Clone, PartialEq)]
pub struct StructuralMatch {
    pub selector: String,
    pub text: String,
    pub confidence: Decimal,
}

/// Tier-1 detection: try each selector in list order and stop at the first
/// one with at least one match. The list is a priority order, not a union.
///
/// A selector whose matched elements carry no visible text counts as a miss
/// and detection moves on to the next selector: an empty banner container is
/// not evidence of a promotion.
pub fn detect(html: &str, selectors: &[String], text_limit: usize) -> Option<StructuralMatch> {
    if selectors.is_empty() {
        return None;
    }
    let document = Html::parse_document(html);

    for raw_selector in selectors {
        let selector = match Selector::parse(raw_selector) {
            Ok(selector) => selector,
            Err(e) => {
                warn!("Skipping unparsable selector {raw_selector:?}: {e}");
                continue;
            }
        };

        let texts: Vec<String> = document
            .select(&selector)
            .map(|element| {
                element
                    .text()
                    .collect::<String>()
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .filter(|text| !text.is_empty())
            .collect();

        if !texts.is_empty() {
            debug!("Selector {raw_selector:?} matched {} element(s)", texts.len());
            return Some(StructuralMatch {
                selector: raw_selector.clone(),
                text: truncate_chars(&texts.join(" "), text_limit),
                confidence: STRUCTURAL_CONFIDENCE,
            });
        }
    }

    None
}
