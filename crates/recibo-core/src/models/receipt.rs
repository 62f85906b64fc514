//! Receipt data extracted from a vision-model response.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Structured data recovered from one receipt or invoice image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    /// Store or company name.
    pub merchant: Option<String>,

    /// Amount paid.
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub total: Option<Decimal>,

    /// ISO-4217-like currency code.
    pub currency: Option<String>,

    /// Purchase date.
    pub date: Option<NaiveDate>,

    /// Spending category.
    pub category: Option<Category>,

    /// Line items in printed order.
    #[serde(default)]
    pub items: Vec<LineItem>,

    /// Any other keys the model emitted, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single purchased item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// Item description.
    pub name: String,

    /// Quantity (may be fractional for weighed goods).
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,

    /// Line price.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

impl LineItem {
    pub fn new(name: impl Into<String>, quantity: Decimal, price: Decimal) -> Self {
        Self {
            name: name.into(),
            quantity,
            price,
        }
    }
}

/// Closed set of spending categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Supermercado")]
    Supermarket,
    #[serde(rename = "Restaurante")]
    Restaurant,
    #[serde(rename = "Transportes")]
    Transport,
    #[serde(rename = "Saúde")]
    Health,
    #[serde(rename = "Tecnologia")]
    Technology,
    #[serde(rename = "Serviços")]
    Services,
    #[serde(rename = "Vestuário")]
    Clothing,
    #[serde(rename = "Entretenimento")]
    Entertainment,
    #[serde(rename = "Educação")]
    Education,
    #[serde(rename = "Outros")]
    Other,
}

impl Category {
    /// All categories in prompt order.
    pub const ALL: [Category; 10] = [
        Category::Supermarket,
        Category::Restaurant,
        Category::Transport,
        Category::Health,
        Category::Technology,
        Category::Services,
        Category::Clothing,
        Category::Entertainment,
        Category::Education,
        Category::Other,
    ];

    /// Display label, as serialized.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Supermarket => "Supermercado",
            Category::Restaurant => "Restaurante",
            Category::Transport => "Transportes",
            Category::Health => "Saúde",
            Category::Technology => "Tecnologia",
            Category::Services => "Serviços",
            Category::Clothing => "Vestuário",
            Category::Entertainment => "Entretenimento",
            Category::Education => "Educação",
            Category::Other => "Outros",
        }
    }

    /// Match a label ignoring case and accents ("servicos" → Services).
    pub fn from_label(label: &str) -> Option<Self> {
        let wanted = fold(label.trim());
        Self::ALL.into_iter().find(|c| fold(c.label()) == wanted)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Lowercase and strip the Portuguese diacritics used in labels.
fn fold(s: &str) -> String {
    s.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' => 'a',
            'é' | 'ê' => 'e',
            'í' => 'i',
            'ó' | 'ô' | 'õ' => 'o',
            'ú' => 'u',
            'ç' => 'c',
            other => other,
        })
        .collect()
}
