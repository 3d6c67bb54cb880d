use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::product::{Price, ProductRecord};

const DESCRIPTION_MAX_CHARS: usize = 500;
const FIELD_MAX_CHARS: usize = 120;

static CODE_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)```").expect("valid code block regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

static PRICE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(?:цена|стоимость|price|cost)\s*[:\-]?\s*((?:\d{1,3}(?:[ \x{00A0}]\d{3})+|\d+)(?:[.,]\d+)?\s*(?:₽|руб\.?|рублей|рубля|р\.)?)",
        r"(?i)((?:\d{1,3}(?:[ \x{00A0}]\d{3})+|\d+)(?:[.,]\d+)?\s*(?:₽|руб\.?|рублей|рубля|р\.))",
        r"(?i)([$€]\s*(?:\d{1,3}(?:[ \x{00A0}]\d{3})+|\d+)(?:[.,]\d+)?)",
        r"(?i)((?:\d{1,3}(?:[ \x{00A0}]\d{3})+|\d+)(?:[.,]\d+)?\s*[$€])",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid price regex"))
    .collect()
});
static BARE_PRICE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*((?:\d{1,3}(?:[ \x{00A0}]\d{3})+|\d+)(?:[.,]\d+)?)\s*$").expect("valid bare price regex")
});
static CATEGORY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)категори[яию]\s*[:\-]?\s*([^,\n]+)").expect("valid category regex")
});
static SIZE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)размер\s*[:\-]?\s*([^,\n]+)",
        r"(?i)\b(\d+\s*[xх×]\s*\d+(?:\s*(?:см|мм|м)\b)?)",
        r"(?i)\b(\d+(?:[.,]\d+)?\s*(?:см|мм|м)\b)",
        r"\b(XXXL|XXL|XL|XS|S|M|L)\b",
        r"(?i)\b(большой|средний|маленький|огромный|мини)\b",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid size regex"))
    .collect()
});

const COLORS: [(&str, &str); 26] = [
    ("красн", "Красный"),
    ("синий", "Синий"),
    ("синяя", "Синий"),
    ("синее", "Синий"),
    ("зелён", "Зелёный"),
    ("зелен", "Зелёный"),
    ("жёлт", "Жёлтый"),
    ("желт", "Жёлтый"),
    ("белый", "Белый"),
    ("белая", "Белый"),
    ("белое", "Белый"),
    ("чёрн", "Чёрный"),
    ("черн", "Чёрный"),
    ("розов", "Розовый"),
    ("оранжев", "Оранжевый"),
    ("фиолетов", "Фиолетовый"),
    ("голуб", "Голубой"),
    ("серый", "Серый"),
    ("серая", "Серый"),
    ("серое", "Серый"),
    ("коричнев", "Коричневый"),
    ("бежев", "Бежевый"),
    ("black", "Black"),
    ("white", "White"),
    ("red", "Red"),
    ("blue", "Blue"),
];

/// Collapses whitespace and caps the text at `max_chars`, appending `...` when cut.
pub fn sanitize_text(text: &str, max_chars: usize) -> String {
    let collapsed = WHITESPACE_RE.replace_all(text, " ").trim().to_string();
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let kept: String = collapsed.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept.trim_end())
}

fn sanitize_optional(text: Option<&str>, max_chars: usize) -> Option<String> {
    let cleaned = sanitize_text(text?, max_chars);
    let lowered = cleaned.to_lowercase();
    if cleaned.is_empty() || matches!(lowered.as_str(), "null" | "none" | "n/a" | "unknown") {
        None
    } else {
        Some(cleaned)
    }
}

/// Finds a JSON object in model output that may be wrapped in prose or code fences.
pub fn extract_json_from_text(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    for caps in CODE_BLOCK_RE.captures_iter(trimmed) {
        if let Some(block) = caps.get(1) {
            if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(block.as_str().trim())
            {
                return Some(value);
            }
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => {
            debug!("No JSON object found in model output");
            None
        }
    }
}

fn first_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .find_map(|field| field.as_str().filter(|text| !text.trim().is_empty()))
}

fn price_from_value(value: &Value) -> Option<Price> {
    ["price", "estimated_price", "estimated_price_range"]
        .iter()
        .filter_map(|key| value.get(*key))
        .find_map(|field| match field {
            Value::Number(number) => number.as_f64().and_then(Price::from_f64),
            Value::String(text) => Price::parse(text),
            _ => None,
        })
}

/// Maps a model JSON object onto a record. Returns `None` when the object names no product.
pub fn record_from_json(value: &Value) -> Option<ProductRecord> {
    let name = sanitize_optional(first_str(value, &["name", "product_name"]), FIELD_MAX_CHARS)?;
    Some(ProductRecord {
        name,
        price: price_from_value(value),
        category: sanitize_optional(first_str(value, &["category"]), FIELD_MAX_CHARS),
        size: sanitize_optional(first_str(value, &["size"]), FIELD_MAX_CHARS),
        color: sanitize_optional(first_str(value, &["color", "colour"]), FIELD_MAX_CHARS),
        description: sanitize_optional(first_str(value, &["description"]), DESCRIPTION_MAX_CHARS),
        source_image: None,
    })
}

fn take_match(text: &mut String, re: &Regex) -> Option<String> {
    let (range, captured) = {
        let caps = re.captures(text)?;
        let whole = caps.get(0)?;
        let captured = caps.get(1).unwrap_or(whole).as_str().trim().to_string();
        (whole.range(), captured)
    };
    text.replace_range(range, "");
    Some(captured)
}

/// Finds a price in free text: labelled (`цена 1500`), with a currency, or a bare number.
pub fn extract_price(text: &str) -> Option<Price> {
    for re in PRICE_PATTERNS.iter() {
        if let Some(caps) = re.captures(text) {
            if let Some(price) = caps.get(1).and_then(|m| Price::parse(m.as_str())) {
                return Some(price);
            }
        }
    }
    BARE_PRICE_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| Price::parse(m.as_str()))
}

/// Rule-based extraction: price, category, size, color, then `name, description...`.
pub fn extract_product_locally(text: &str) -> ProductRecord {
    let mut record = ProductRecord::default();
    let mut working = text.trim().to_string();
    if working.is_empty() {
        return record;
    }

    for re in PRICE_PATTERNS.iter() {
        let Some(matched) = re.captures(&working).and_then(|caps| caps.get(1)) else {
            continue;
        };
        if let Some(price) = Price::parse(matched.as_str()) {
            record.price = Some(price);
            take_match(&mut working, re);
            break;
        }
    }
    if record.price.is_none() {
        if let Some(price) = extract_price(&working) {
            record.price = Some(price);
            working.clear();
        }
    }

    record.category = take_match(&mut working, &CATEGORY_RE)
        .and_then(|category| sanitize_optional(Some(&category), FIELD_MAX_CHARS));

    for re in SIZE_PATTERNS.iter() {
        if let Some(size) = take_match(&mut working, re) {
            record.size = sanitize_optional(Some(&size), FIELD_MAX_CHARS);
            break;
        }
    }

    let lowered = working.to_lowercase();
    if let Some((stem, color)) = COLORS.iter().find(|(stem, _)| lowered.contains(stem)) {
        record.color = Some(color.to_string());
        if lowered.contains(&format!("цвет {stem}")) {
            let re = Regex::new(&format!(r"(?i)цвет\s+{}\w*", regex::escape(stem)));
            if let Ok(re) = re {
                take_match(&mut working, &re);
            }
        }
    }

    let parts: Vec<String> = working
        .split([',', '\n', ';'])
        .map(|part| sanitize_text(part, DESCRIPTION_MAX_CHARS))
        .filter(|part| !part.is_empty())
        .collect();

    if let Some((name, rest)) = parts.split_first() {
        record.name = sanitize_text(name, FIELD_MAX_CHARS);
        let description: Vec<&str> = rest
            .iter()
            .map(String::as_str)
            .filter(|part| {
                let lowered = part.to_lowercase();
                !["размер", "категори", "цвет"]
                    .iter()
                    .any(|keyword| lowered.contains(keyword))
            })
            .collect();
        if !description.is_empty() {
            record.description = Some(sanitize_text(&description.join(", "), DESCRIPTION_MAX_CHARS));
        }
    }

    record
}

/// Applies photo caption hints to a vision result.
///
/// A caption that parses as a price overrides the vision price. Name, category and size from
/// the caption only fill gaps; a caption without a price leaves the vision price untouched.
pub fn merge_caption_hints(mut record: ProductRecord, caption: Option<&str>) -> ProductRecord {
    let Some(caption) = caption.map(str::trim).filter(|text| !text.is_empty()) else {
        return record;
    };

    let hints = extract_product_locally(caption);
    if let Some(price) = extract_price(caption) {
        record.price = Some(price);
    }
    if record.name.trim().is_empty() && !hints.name.is_empty() {
        record.name = hints.name.clone();
    }
    if record.category.is_none() {
        record.category = hints.category.clone();
    }
    if record.size.is_none() {
        record.size = hints.size.clone();
    }
    if record.color.is_none() {
        record.color = hints.color.clone();
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_labelled_fields_from_description() {
        let record =
            extract_product_locally("Беспроводные наушники Sony, цена 15990, категория электроника");
        assert_eq!(record.name, "Беспроводные наушники Sony");
        assert_eq!(record.price, Some(Price::rub(15990)));
        assert_eq!(record.category.as_deref(), Some("электроника"));
        assert_eq!(record.description, None);
    }

    #[test]
    fn price_stops_before_an_unrelated_number() {
        let record = extract_product_locally("Наушники Sony цена 15990 2 года гарантии");
        assert_eq!(record.price, Some(Price::rub(15990)));
        assert!(record.name.contains("2 года гарантии"), "{}", record.name);
    }

    #[test]
    fn extracts_size_color_and_description() {
        let record = extract_product_locally(
            "Футболка хлопковая, размер XL, цвет чёрный, мягкая ткань, 1500 руб",
        );
        assert_eq!(record.name, "Футболка хлопковая");
        assert_eq!(record.price, Some(Price::rub(1500)));
        assert_eq!(record.size.as_deref(), Some("XL"));
        assert_eq!(record.color.as_deref(), Some("Чёрный"));
        assert_eq!(record.description.as_deref(), Some("мягкая ткань"));
    }

    #[test]
    fn does_not_mistake_millilitres_for_metres() {
        let record = extract_product_locally("Кружка керамическая 350 мл");
        assert_eq!(record.size, None);
        assert_eq!(record.name, "Кружка керамическая 350 мл");
    }

    #[test]
    fn empty_text_yields_unconfirmable_record() {
        assert!(!extract_product_locally("   ").is_confirmable());
    }

    #[test]
    fn finds_json_in_code_fence_and_prose() {
        let fenced = "Here you go:\n```json\n{\"name\": \"Лампа\", \"price\": 2500}\n```";
        let value = extract_json_from_text(fenced).expect("json in fence");
        assert_eq!(value["name"], "Лампа");

        let loose = "Result: {\"product_name\": \"Кружка\"} hope this helps";
        let value = extract_json_from_text(loose).expect("json in prose");
        assert_eq!(value["product_name"], "Кружка");

        assert!(extract_json_from_text("no structured data here").is_none());
        assert!(extract_json_from_text("[1, 2, 3]").is_none());
    }

    #[test]
    fn maps_json_fields_onto_record() {
        let value = serde_json::json!({
            "product_name": "  Кружка   керамическая ",
            "category": "посуда",
            "estimated_price": "от 500 руб",
            "size": null,
            "color": "белый"
        });
        let record = record_from_json(&value).expect("record");
        assert_eq!(record.name, "Кружка керамическая");
        assert_eq!(record.category.as_deref(), Some("посуда"));
        assert_eq!(record.price, Some(Price::rub(500)));
        assert_eq!(record.size, None);
        assert_eq!(record.color.as_deref(), Some("белый"));

        assert!(record_from_json(&serde_json::json!({ "name": "" })).is_none());
    }

    #[test]
    fn caption_price_wins_over_vision_price() {
        let vision = ProductRecord {
            name: "Кружка".to_string(),
            category: Some("посуда".to_string()),
            price: Some(Price::rub(800)),
            ..ProductRecord::default()
        };
        let merged = merge_caption_hints(vision, Some("1200"));
        assert_eq!(merged.price, Some(Price::rub(1200)));
        assert_eq!(merged.name, "Кружка");
        assert_eq!(merged.category.as_deref(), Some("посуда"));
    }

    #[test]
    fn non_numeric_caption_keeps_vision_price_and_name() {
        let vision = ProductRecord {
            name: "Кружка".to_string(),
            price: Some(Price::rub(800)),
            ..ProductRecord::default()
        };
        let merged = merge_caption_hints(vision, Some("подарочная, категория сувениры"));
        assert_eq!(merged.price, Some(Price::rub(800)));
        assert_eq!(merged.name, "Кружка");
        assert_eq!(merged.category.as_deref(), Some("сувениры"));
    }

    #[test]
    fn caption_fills_missing_vision_name() {
        let merged = merge_caption_hints(ProductRecord::default(), Some("Чайник, 2300 руб"));
        assert_eq!(merged.name, "Чайник");
        assert_eq!(merged.price, Some(Price::rub(2300)));
    }

    #[test]
    fn sanitize_collapses_and_truncates() {
        assert_eq!(sanitize_text("  a \n\t b  ", 10), "a b");
        assert_eq!(sanitize_text("абвгдеёжзий", 8), "абвгд...");
    }
}
