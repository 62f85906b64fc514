//! Lenient conversion of decoded model JSON into a [`Receipt`].
//!
//! Models emit amounts as numbers or as printed strings ("1 234,56 €"),
//! dates in local formats, and currencies as symbols. Each field is
//! normalized on its own; a field that cannot be read becomes `None`
//! instead of failing the whole extraction.

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde_json::{Map, Value};

use crate::models::receipt::{Category, LineItem, Receipt};

impl Receipt {
    /// Build a receipt from a decoded JSON value.
    ///
    /// Only objects describe a receipt; any other value yields `None`.
    /// Unrecognized keys are preserved in [`Receipt::extra`].
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut map) = value else {
            return None;
        };

        let merchant = map.remove("merchant").as_ref().and_then(text);
        let total = map.remove("total").as_ref().and_then(amount);
        let currency = map
            .remove("currency")
            .as_ref()
            .and_then(text)
            .and_then(|c| normalize_currency(&c));
        let date = map
            .remove("date")
            .as_ref()
            .and_then(text)
            .and_then(|d| parse_date(&d));
        let category = map
            .remove("category")
            .as_ref()
            .and_then(text)
            .map(|c| Category::from_label(&c).unwrap_or(Category::Other));
        let items = match map.remove("items") {
            Some(Value::Array(values)) => values.iter().filter_map(line_item).collect(),
            _ => Vec::new(),
        };

        Some(Self {
            merchant,
            total,
            currency,
            date,
            category,
            items,
            extra: map,
        })
    }
}

fn line_item(value: &Value) -> Option<LineItem> {
    let item: &Map<String, Value> = value.as_object()?;
    let price = item.get("price").and_then(amount)?;
    let quantity = item
        .get("quantity")
        .and_then(amount)
        .unwrap_or(Decimal::ONE);
    let name = item.get("name").and_then(text).unwrap_or_default();

    Some(LineItem::new(name, quantity, price))
}

/// Non-empty text content of a scalar; "null" and "N/A" count as empty.
fn text(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };

    match s.to_lowercase().as_str() {
        "" | "null" | "none" | "n/a" => None,
        _ => Some(s),
    }
}

fn amount(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .ok()
            .or_else(|| n.as_f64().and_then(Decimal::from_f64)),
        Value::String(s) => parse_amount(s),
        _ => None,
    }
}

/// Parse a printed amount such as "1 234,56", "1,234.56" or "12.50 €".
///
/// When both separators appear, the one occurring last is the decimal mark.
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let negative = s.trim_start().starts_with('-');
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();

    let normalized = if cleaned.contains(',') && !cleaned.contains('.') {
        cleaned.replace(',', ".")
    } else if cleaned.contains(',') && cleaned.contains('.') {
        match (cleaned.rfind(','), cleaned.rfind('.')) {
            (Some(c), Some(d)) if c > d => cleaned.replace('.', "").replace(',', "."),
            _ => cleaned.replace(',', ""),
        }
    } else {
        cleaned
    };

    let value = Decimal::from_str(&normalized).ok()?;
    Some(if negative { -value } else { value })
}

/// Parse `YYYY-MM-DD`-style or `DD.MM.YYYY`-style dates (`.`, `/` or `-`).
///
/// Two-digit years are read as 20xx below 50 and 19xx otherwise. A trailing
/// time component (`2024-01-15T10:30:00`) is ignored.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let s = s.split(['T', ' ']).next().unwrap_or(s);

    let parts: Vec<&str> = s.split(['-', '/', '.']).collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_digit())) {
        return None;
    }

    let (year, month, day) = if parts[0].len() == 4 {
        (parts[0].parse().ok()?, parts[1].parse().ok()?, parts[2].parse().ok()?)
    } else {
        (parse_year(parts[2])?, parts[1].parse().ok()?, parts[0].parse().ok()?)
    };

    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_year(s: &str) -> Option<i32> {
    let year: i32 = s.parse().ok()?;
    Some(match s.len() {
        2 if year < 50 => 2000 + year,
        2 => 1900 + year,
        4 => year,
        _ => return None,
    })
}

/// Map currency symbols and names to codes; other values are upper-cased.
pub fn normalize_currency(s: &str) -> Option<String> {
    let trimmed = s.trim();
    let code = match trimmed.to_lowercase().as_str() {
        "" => return None,
        "€" | "eur" | "euro" | "euros" => "EUR",
        "$" | "us$" | "usd" => "USD",
        "£" | "gbp" => "GBP",
        "zł" | "zl" | "pln" => "PLN",
        _ => return Some(trimmed.to_uppercase()),
    };
    Some(code.to_string())
}
