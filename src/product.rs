use std::fmt;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static PRICE_NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\d{1,3}(?:[ \x{00A0}]\d{3})+|\d+)(?:[.,]\d+)?").expect("valid price regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Currency {
    #[default]
    Rub,
    Usd,
    Eur,
}

impl Currency {
    fn detect(text: &str) -> Self {
        let lowered = text.to_lowercase();
        if text.contains('$') || lowered.contains("usd") {
            Currency::Usd
        } else if text.contains('€') || lowered.contains("eur") {
            Currency::Eur
        } else {
            Currency::Rub
        }
    }
}

/// Non-negative price stored exactly in minor units (kopecks, cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub minor_units: u64,
    pub currency: Currency,
}

impl Price {
    #[cfg(test)]
    pub fn rub(whole: u64) -> Self {
        Price {
            minor_units: whole * 100,
            currency: Currency::Rub,
        }
    }

    /// Parses the first number in `text` as a price, e.g. `15990`, `1 500,50 ₽`, `$100`.
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        let lowered = trimmed.to_lowercase();
        if matches!(
            lowered.as_str(),
            "null" | "none" | "n/a" | "не указана" | "unknown"
        ) {
            return None;
        }

        let token = PRICE_NUMBER_RE.find(trimmed)?.as_str();
        let digits: String = token.chars().filter(|ch| !ch.is_whitespace()).collect();
        let minor_units = parse_minor_units(&digits)?;
        Some(Price {
            minor_units,
            currency: Currency::detect(trimmed),
        })
    }

    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        Some(Price {
            minor_units: (value * 100.0).round() as u64,
            currency: Currency::Rub,
        })
    }

    pub fn formatted(&self) -> String {
        let whole = group_thousands(self.minor_units / 100);
        let fraction = self.minor_units % 100;
        match self.currency {
            Currency::Rub => {
                if fraction == 0 {
                    format!("{whole} ₽")
                } else {
                    format!("{whole},{fraction:02} ₽")
                }
            }
            Currency::Usd | Currency::Eur => {
                let symbol = if self.currency == Currency::Usd { "$" } else { "€" };
                if fraction == 0 {
                    format!("{symbol}{whole}")
                } else {
                    format!("{symbol}{whole}.{fraction:02}")
                }
            }
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formatted())
    }
}

fn parse_minor_units(digits: &str) -> Option<u64> {
    let separator = digits.rfind(['.', ',']);
    let (whole, fraction) = match separator {
        Some(index) => {
            let fraction = &digits[index + 1..];
            // Three digits after the separator is thousands grouping, not cents.
            if fraction.len() == 3 {
                (digits.replace(['.', ','], ""), String::new())
            } else {
                (digits[..index].replace(['.', ','], ""), fraction.to_string())
            }
        }
        None => (digits.to_string(), String::new()),
    };

    let whole: u64 = whole.parse().ok()?;
    let cents: u64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<u64>().ok()? * 10,
        _ => fraction[..2].parse().ok()?,
    };
    whole.checked_mul(100)?.checked_add(cents)
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }
    grouped
}

/// Normalized product description shared by both analysis paths and the card builder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub name: String,
    pub price: Option<Price>,
    pub category: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub description: Option<String>,
    #[serde(skip)]
    pub source_image: Option<PathBuf>,
}

impl ProductRecord {
    pub fn named(name: impl Into<String>) -> Self {
        ProductRecord {
            name: name.into(),
            ..ProductRecord::default()
        }
    }

    pub fn is_confirmable(&self) -> bool {
        !self.name.trim().is_empty()
    }

    /// Fills missing fields from `other` without touching fields already set.
    pub fn fill_missing_from(&mut self, other: &ProductRecord) {
        if self.name.trim().is_empty() {
            self.name = other.name.clone();
        }
        if self.price.is_none() {
            self.price = other.price;
        }
        if self.category.is_none() {
            self.category = other.category.clone();
        }
        if self.size.is_none() {
            self.size = other.size.clone();
        }
        if self.color.is_none() {
            self.color = other.color.clone();
        }
        if self.description.is_none() {
            self.description = other.description.clone();
        }
    }

    pub fn price_label(&self) -> Option<String> {
        self.price.map(|price| price.formatted())
    }
}
