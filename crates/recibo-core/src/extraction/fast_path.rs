//! Known-merchant enrichment.
//!
//! Rules are scanned in definition order and the first keyword found in the
//! merchant text wins, so the order of [`KNOWN_MERCHANTS`] is observable
//! behavior (e.g. "nos" is checked only after every earlier keyword).

use tracing::info;

use crate::models::receipt::{Category, Receipt};

/// Canonical metadata for a recognizable merchant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FastPathRule {
    /// Lowercase substring that identifies the merchant.
    pub keyword: &'static str,
    /// Canonical display name.
    pub merchant: &'static str,
    pub category: Category,
    pub currency: &'static str,
}

const fn rule(
    keyword: &'static str,
    merchant: &'static str,
    category: Category,
) -> FastPathRule {
    FastPathRule {
        keyword,
        merchant,
        category,
        currency: "EUR",
    }
}

/// Merchants recognized without trusting the model's spelling.
pub const KNOWN_MERCHANTS: &[FastPathRule] = &[
    rule("pingo doce", "Pingo Doce", Category::Supermarket),
    rule("continente", "Continente", Category::Supermarket),
    rule("lidl", "Lidl", Category::Supermarket),
    rule("aldi", "Aldi", Category::Supermarket),
    rule("mercadona", "Mercadona", Category::Supermarket),
    rule("edp", "EDP", Category::Services),
    rule("galp", "Galp", Category::Transport),
    rule("meo", "MEO", Category::Services),
    rule("vodafone", "Vodafone", Category::Services),
    rule("nos", "NOS", Category::Services),
    rule("uber", "Uber", Category::Transport),
    rule("bolt", "Bolt", Category::Transport),
    rule("worten", "Worten", Category::Technology),
    rule("fnac", "FNAC", Category::Technology),
    rule("zara", "Zara", Category::Clothing),
    rule("primark", "Primark", Category::Clothing),
    rule("mcdonald", "McDonald's", Category::Restaurant),
    rule("burger king", "Burger King", Category::Restaurant),
    rule("ikea", "IKEA", Category::Other),
];

/// First-match-wins keyword lookup over an ordered rule list.
#[derive(Debug, Clone)]
pub struct FastPathMatcher {
    rules: &'static [FastPathRule],
}

impl FastPathMatcher {
    /// Matcher over [`KNOWN_MERCHANTS`].
    pub fn new() -> Self {
        Self {
            rules: KNOWN_MERCHANTS,
        }
    }

    /// First rule whose keyword occurs in `text`, ignoring case.
    pub fn match_text(&self, text: &str) -> Option<&'static FastPathRule> {
        let lower = text.to_lowercase();
        self.rules.iter().find(|r| lower.contains(r.keyword))
    }

    /// Normalize the merchant of `receipt` and fill missing category and
    /// currency from the matching rule. Fields the model populated, other
    /// than the merchant label, are left alone.
    pub fn enrich(&self, receipt: &mut Receipt) -> Option<&'static FastPathRule> {
        let rule = self.match_text(receipt.merchant.as_deref()?)?;

        receipt.merchant = Some(rule.merchant.to_string());
        if receipt.category.is_none() {
            receipt.category = Some(rule.category);
        }
        if receipt.currency.is_none() {
            receipt.currency = Some(rule.currency.to_string());
        }

        info!("FAST-PATH [{}] enriched from known merchant", rule.merchant);
        Some(rule)
    }
}

impl Default for FastPathMatcher {
    fn default() -> Self {
        Self::new()
    }
}
