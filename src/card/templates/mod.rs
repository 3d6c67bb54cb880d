mod dark;
mod marketplace;
mod minimal;

use image::{DynamicImage, RgbImage};

use crate::card::fonts::CardFonts;
use crate::card::StyleId;
use crate::product::ProductRecord;

pub use dark::DarkTemplate;
pub use marketplace::MarketplaceTemplate;
pub use minimal::MinimalTemplate;

/// Shown in the price badge when the record carries no price.
pub const PRICE_PLACEHOLDER: &str = "—";

/// Everything a template draws, already formatted.
pub struct CardContent {
    pub title: String,
    pub price: String,
    pub category: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub description: Option<String>,
    pub photo: Option<DynamicImage>,
}

impl CardContent {
    pub fn from_record(record: &ProductRecord, photo: Option<DynamicImage>) -> Self {
        let present = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string)
        };
        CardContent {
            title: record.name.trim().to_string(),
            price: record
                .price_label()
                .unwrap_or_else(|| PRICE_PLACEHOLDER.to_string()),
            category: present(&record.category),
            size: present(&record.size),
            color: present(&record.color),
            description: present(&record.description),
            photo,
        }
    }

    /// `Размер: XL`, `Цвет: Чёрный` for whichever attributes are present.
    pub fn attribute_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(size) = &self.size {
            lines.push(format!("Размер: {size}"));
        }
        if let Some(color) = &self.color {
            lines.push(format!("Цвет: {color}"));
        }
        lines
    }
}

pub trait CardTemplate: Send + Sync {
    fn style(&self) -> StyleId;

    /// Draws the 800x800 card. Never fails; missing fields leave their regions blank.
    fn render(&self, content: &CardContent, fonts: Option<&CardFonts>) -> RgbImage;
}

pub fn template_for(style: StyleId) -> &'static dyn CardTemplate {
    match style {
        StyleId::Minimal => &MinimalTemplate,
        StyleId::Dark => &DarkTemplate,
        StyleId::Marketplace => &MarketplaceTemplate,
    }
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;
    use crate::card::canvas::{CARD_HEIGHT, CARD_WIDTH};
    use crate::product::Price;

    fn sparse_record() -> ProductRecord {
        ProductRecord::named("Кружка")
    }

    fn full_record() -> ProductRecord {
        ProductRecord {
            name: "Беспроводные наушники Sony WH-1000XM5 с активным шумоподавлением".into(),
            price: Some(Price::rub(15990)),
            category: Some("электроника".into()),
            size: Some("L".into()),
            color: Some("Чёрный".into()),
            description: Some("До 30 часов работы, быстрая зарядка, мягкие амбушюры".into()),
            source_image: None,
        }
    }

    #[test]
    fn missing_price_uses_placeholder() {
        let content = CardContent::from_record(&sparse_record(), None);
        assert_eq!(content.price, PRICE_PLACEHOLDER);
        assert!(content.category.is_none());
        assert!(content.attribute_lines().is_empty());
    }

    #[test]
    fn every_template_renders_full_size_for_sparse_and_full_records() {
        let photo = DynamicImage::ImageRgb8(RgbImage::from_pixel(300, 120, Rgb([200, 40, 40])));
        for style in StyleId::ALL {
            let template = template_for(style);
            assert_eq!(template.style(), style);
            for record in [sparse_record(), full_record()] {
                for photo in [None, Some(photo.clone())] {
                    let content = CardContent::from_record(&record, photo);
                    let image = template.render(&content, None);
                    assert_eq!(image.dimensions(), (CARD_WIDTH, CARD_HEIGHT));
                }
            }
        }
    }

    #[test]
    fn templates_look_different() {
        let content = CardContent::from_record(&full_record(), None);
        let minimal = template_for(StyleId::Minimal).render(&content, None);
        let dark = template_for(StyleId::Dark).render(&content, None);
        let marketplace = template_for(StyleId::Marketplace).render(&content, None);
        assert_ne!(minimal, dark);
        assert_ne!(minimal, marketplace);
        assert_ne!(dark, marketplace);
    }

    #[test]
    fn photo_changes_the_photo_area() {
        let photo = DynamicImage::ImageRgb8(RgbImage::from_pixel(400, 400, Rgb([200, 40, 40])));
        let with_photo = CardContent::from_record(&sparse_record(), Some(photo));
        let without = CardContent::from_record(&sparse_record(), None);
        for style in StyleId::ALL {
            let template = template_for(style);
            assert_ne!(template.render(&with_photo, None), template.render(&without, None));
        }
    }

    fn mug() -> ProductRecord {
        ProductRecord {
            name: "Кружка".into(),
            price: Some(Price::rub(1200)),
            category: Some("посуда".into()),
            ..ProductRecord::default()
        }
    }

    #[test]
    fn name_price_and_category_are_drawn() {
        let fonts = CardFonts::bundled().expect("bundled fonts");
        let renamed = ProductRecord {
            name: "Совсем другой товар".into(),
            ..mug()
        };
        let repriced = ProductRecord {
            price: Some(Price::rub(99999)),
            ..mug()
        };
        let recategorized = ProductRecord {
            category: Some("техника".into()),
            ..mug()
        };

        for style in StyleId::ALL {
            let template = template_for(style);
            let render = |record: &ProductRecord| {
                template.render(&CardContent::from_record(record, None), Some(&fonts))
            };
            let base = render(&mug());
            assert_ne!(base, render(&renamed), "{style}: name not drawn");
            assert_ne!(base, render(&repriced), "{style}: price not drawn");
            assert_ne!(base, render(&recategorized), "{style}: category not drawn");
        }
    }

    #[test]
    fn missing_fields_render_full_size_with_fonts() {
        let fonts = CardFonts::bundled().expect("bundled fonts");
        for style in StyleId::ALL {
            let content = CardContent::from_record(&sparse_record(), None);
            let image = template_for(style).render(&content, Some(&fonts));
            assert_eq!(image.dimensions(), (CARD_WIDTH, CARD_HEIGHT));
        }
    }
}
