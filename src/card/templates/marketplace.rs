use image::{Rgb, RgbImage};

use crate::card::canvas::{clamp_lines, wrap_text, Area, Canvas, Weight, CARD_HEIGHT, CARD_WIDTH};
use crate::card::fonts::CardFonts;
use crate::card::templates::{CardContent, CardTemplate};
use crate::card::StyleId;

const BACKGROUND: Rgb<u8> = Rgb([245, 245, 250]);
const PANEL: Rgb<u8> = Rgb([255, 255, 255]);
const CHIP: Rgb<u8> = Rgb([226, 230, 238]);
const TEXT: Rgb<u8> = Rgb([35, 35, 35]);
const MUTED: Rgb<u8> = Rgb([100, 104, 115]);
const ACCENT: Rgb<u8> = Rgb([0, 184, 148]);
const ON_ACCENT: Rgb<u8> = Rgb([255, 255, 255]);

const MARGIN: i32 = 40;
const PANEL_AREA: Area = Area::new(20, 20, 760, 360);
const PHOTO_AREA: Area = Area::new(40, 30, 720, 340);
const PRICE_BAR_HEIGHT: u32 = 70;
const PILL_HEIGHT: u32 = 36;
const PILL_MIN_WIDTH: u32 = 120;
const CHIP_HEIGHT: u32 = 32;
const CHIP_MIN_WIDTH: u32 = 90;

/// Marketplace listing: photo panel, green category pill, attribute chips, green price bar.
pub struct MarketplaceTemplate;

impl CardTemplate for MarketplaceTemplate {
    fn style(&self) -> StyleId {
        StyleId::Marketplace
    }

    fn render(&self, content: &CardContent, fonts: Option<&CardFonts>) -> RgbImage {
        let mut canvas = Canvas::new(BACKGROUND, fonts);

        canvas.fill_rounded_rect(PANEL_AREA, 16, PANEL);
        if let Some(photo) = &content.photo {
            canvas.paste_photo_fit(photo, PHOTO_AREA, PANEL);
        }

        let bar_top = (CARD_HEIGHT - PRICE_BAR_HEIGHT) as i32;
        let mut y = PANEL_AREA.y + PANEL_AREA.height as i32 + 15;

        if let Some(category) = &content.category {
            let width = (canvas.text_width(18.0, Weight::Bold, category) + 32).max(PILL_MIN_WIDTH);
            let width = width.min(CARD_WIDTH - 2 * MARGIN as u32);
            canvas.fill_rounded_rect(Area::new(MARGIN, y, width, PILL_HEIGHT), 18, ACCENT);
            canvas.text(MARGIN + 16, y + 8, 18.0, Weight::Bold, ON_ACCENT, category);
            y += PILL_HEIGHT as i32 + 14;
        }

        for line in clamp_lines(wrap_text(&content.title, 38), 2) {
            canvas.text(MARGIN, y, 32.0, Weight::Bold, TEXT, &line);
            y += 38;
        }
        y += 6;

        let attributes = content.attribute_lines();
        if !attributes.is_empty() && y + CHIP_HEIGHT as i32 <= bar_top - 10 {
            let mut x = MARGIN;
            for attribute in &attributes {
                let width =
                    (canvas.text_width(16.0, Weight::Regular, attribute) + 24).max(CHIP_MIN_WIDTH);
                if x + width as i32 > CARD_WIDTH as i32 - MARGIN {
                    break;
                }
                canvas.fill_rounded_rect(Area::new(x, y, width, CHIP_HEIGHT), 10, CHIP);
                canvas.text(x + 12, y + 7, 16.0, Weight::Regular, TEXT, attribute);
                x += width as i32 + 10;
            }
            y += CHIP_HEIGHT as i32 + 12;
        }

        if let Some(description) = &content.description {
            for line in clamp_lines(wrap_text(description, 64), 2) {
                if y + 25 > bar_top - 8 {
                    break;
                }
                canvas.text(MARGIN, y, 17.0, Weight::Regular, MUTED, &line);
                y += 25;
            }
        }

        canvas.fill_rect(Area::new(0, bar_top, CARD_WIDTH, PRICE_BAR_HEIGHT), ACCENT);
        canvas.text(MARGIN, bar_top + 14, 40.0, Weight::Bold, ON_ACCENT, &content.price);

        canvas.into_image()
    }
}
