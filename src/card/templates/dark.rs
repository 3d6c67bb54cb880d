use image::{Rgb, RgbImage};

use crate::card::canvas::{clamp_lines, wrap_text, Area, Canvas, Weight, CARD_HEIGHT, CARD_WIDTH};
use crate::card::fonts::CardFonts;
use crate::card::templates::{CardContent, CardTemplate};
use crate::card::StyleId;

const GRADIENT_TOP: Rgb<u8> = Rgb([20, 20, 30]);
const GRADIENT_BOTTOM: Rgb<u8> = Rgb([40, 32, 56]);
const PANEL: Rgb<u8> = Rgb([30, 29, 44]);
const TEXT: Rgb<u8> = Rgb([240, 240, 240]);
const MUTED: Rgb<u8> = Rgb([170, 170, 185]);
const ACCENT: Rgb<u8> = Rgb([255, 100, 100]);

const MARGIN: i32 = 40;
const RULE_HEIGHT: u32 = 5;
const PHOTO_AREA: Area = Area::new(40, 25, 720, 340);
const PRICE_TOP: i32 = 690;

/// Dark gradient with pink-red rules and an accent-colored price.
pub struct DarkTemplate;

impl CardTemplate for DarkTemplate {
    fn style(&self) -> StyleId {
        StyleId::Dark
    }

    fn render(&self, content: &CardContent, fonts: Option<&CardFonts>) -> RgbImage {
        let mut canvas = Canvas::new(GRADIENT_TOP, fonts);
        canvas.vertical_gradient(GRADIENT_TOP, GRADIENT_BOTTOM);
        canvas.fill_rect(Area::new(0, 0, CARD_WIDTH, RULE_HEIGHT), ACCENT);
        canvas.fill_rect(
            Area::new(0, (CARD_HEIGHT - RULE_HEIGHT) as i32, CARD_WIDTH, RULE_HEIGHT),
            ACCENT,
        );

        canvas.fill_rect(PHOTO_AREA, PANEL);
        if let Some(photo) = &content.photo {
            canvas.paste_photo_fit(photo, PHOTO_AREA, PANEL);
        }

        let mut y = PHOTO_AREA.y + PHOTO_AREA.height as i32 + 25;
        if let Some(category) = &content.category {
            canvas.text(MARGIN, y, 20.0, Weight::Regular, ACCENT, &category.to_uppercase());
            y += 35;
        }

        for line in clamp_lines(wrap_text(&content.title, 34), 2) {
            canvas.text(MARGIN, y, 36.0, Weight::Bold, TEXT, &line);
            y += 42;
        }
        y += 8;

        let limit = PRICE_TOP - 12;
        if let Some(description) = &content.description {
            for line in clamp_lines(wrap_text(description, 60), 3) {
                if y + 28 > limit {
                    break;
                }
                canvas.text(MARGIN, y, 18.0, Weight::Regular, MUTED, &line);
                y += 28;
            }
        }
        for line in content.attribute_lines() {
            if y + 26 > limit {
                break;
            }
            canvas.text(MARGIN, y + 4, 18.0, Weight::Regular, TEXT, &line);
            y += 26;
        }

        canvas.fill_rect(Area::new(MARGIN, PRICE_TOP, 80, 3), ACCENT);
        canvas.text(MARGIN, PRICE_TOP + 18, 46.0, Weight::Bold, ACCENT, &content.price);

        canvas.into_image()
    }
}
