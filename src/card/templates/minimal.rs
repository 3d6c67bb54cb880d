use image::{Rgb, RgbImage};

use crate::card::canvas::{clamp_lines, wrap_text, Area, Canvas, Weight, CARD_HEIGHT, CARD_WIDTH};
use crate::card::fonts::CardFonts;
use crate::card::templates::{CardContent, CardTemplate};
use crate::card::StyleId;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const PHOTO_PLACEHOLDER: Rgb<u8> = Rgb([242, 244, 247]);
const TEXT: Rgb<u8> = Rgb([40, 40, 40]);
const MUTED: Rgb<u8> = Rgb([110, 110, 120]);
const ACCENT: Rgb<u8> = Rgb([0, 122, 255]);
const ON_ACCENT: Rgb<u8> = Rgb([255, 255, 255]);

const MARGIN: i32 = 40;
const PHOTO_AREA: Area = Area::new(40, 20, 720, 350);
const PRICE_BAR_HEIGHT: u32 = 80;

/// White card with a blue price bar along the bottom edge.
pub struct MinimalTemplate;

impl CardTemplate for MinimalTemplate {
    fn style(&self) -> StyleId {
        StyleId::Minimal
    }

    fn render(&self, content: &CardContent, fonts: Option<&CardFonts>) -> RgbImage {
        let mut canvas = Canvas::new(BACKGROUND, fonts);

        match &content.photo {
            Some(photo) => canvas.paste_photo_fit(photo, PHOTO_AREA, BACKGROUND),
            None => canvas.fill_rect(PHOTO_AREA, PHOTO_PLACEHOLDER),
        }

        let bar_top = (CARD_HEIGHT - PRICE_BAR_HEIGHT) as i32;
        let mut y = PHOTO_AREA.y + PHOTO_AREA.height as i32 + 20;

        if let Some(category) = &content.category {
            canvas.text(MARGIN, y, 20.0, Weight::Regular, ACCENT, &category.to_uppercase());
            y += 35;
        }

        for line in clamp_lines(wrap_text(&content.title, 34), 2) {
            canvas.text(MARGIN, y, 36.0, Weight::Bold, TEXT, &line);
            y += 42;
        }
        y += 8;

        if let Some(description) = &content.description {
            for line in clamp_lines(wrap_text(description, 60), 3) {
                if y + 28 > bar_top - 10 {
                    break;
                }
                canvas.text(MARGIN, y, 18.0, Weight::Regular, MUTED, &line);
                y += 28;
            }
        }

        let attributes = content.attribute_lines();
        if !attributes.is_empty() && y + 26 <= bar_top - 10 {
            canvas.text(MARGIN, y + 6, 18.0, Weight::Regular, TEXT, &attributes.join("   "));
        }

        canvas.fill_rect(Area::new(0, bar_top, CARD_WIDTH, PRICE_BAR_HEIGHT), ACCENT);
        canvas.text(MARGIN, bar_top + 18, 42.0, Weight::Bold, ON_ACCENT, &content.price);

        canvas.into_image()
    }
}
