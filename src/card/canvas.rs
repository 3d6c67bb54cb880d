use ab_glyph::PxScale;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::card::fonts::CardFonts;

pub const CARD_WIDTH: u32 = 800;
pub const CARD_HEIGHT: u32 = 800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weight {
    Regular,
    Bold,
}

/// Axis-aligned region on the card, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Area {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Area {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Area {
            x,
            y,
            width,
            height,
        }
    }
}

pub struct Canvas<'a> {
    image: RgbImage,
    fonts: Option<&'a CardFonts>,
}

impl<'a> Canvas<'a> {
    pub fn new(background: Rgb<u8>, fonts: Option<&'a CardFonts>) -> Self {
        Canvas {
            image: RgbImage::from_pixel(CARD_WIDTH, CARD_HEIGHT, background),
            fonts,
        }
    }

    pub fn fill_rect(&mut self, area: Area, color: Rgb<u8>) {
        if area.width == 0 || area.height == 0 {
            return;
        }
        draw_filled_rect_mut(
            &mut self.image,
            Rect::at(area.x, area.y).of_size(area.width, area.height),
            color,
        );
    }

    pub fn fill_rounded_rect(&mut self, area: Area, radius: u32, color: Rgb<u8>) {
        let radius = radius.min(area.width / 2).min(area.height / 2);
        if radius == 0 {
            self.fill_rect(area, color);
            return;
        }
        let r = radius as i32;
        self.fill_rect(
            Area::new(area.x + r, area.y, area.width - 2 * radius, area.height),
            color,
        );
        self.fill_rect(
            Area::new(area.x, area.y + r, area.width, area.height - 2 * radius),
            color,
        );
        let right = area.x + area.width as i32 - r - 1;
        let bottom = area.y + area.height as i32 - r - 1;
        for center in [
            (area.x + r, area.y + r),
            (right, area.y + r),
            (area.x + r, bottom),
            (right, bottom),
        ] {
            draw_filled_circle_mut(&mut self.image, center, r, color);
        }
    }

    /// Fills the whole card with a top-to-bottom linear gradient.
    pub fn vertical_gradient(&mut self, top: Rgb<u8>, bottom: Rgb<u8>) {
        let last = (CARD_HEIGHT - 1).max(1) as f32;
        for y in 0..CARD_HEIGHT {
            let t = y as f32 / last;
            let color = Rgb(std::array::from_fn(|channel| {
                let start = top.0[channel] as f32;
                let end = bottom.0[channel] as f32;
                (start + (end - start) * t).round() as u8
            }));
            self.fill_rect(Area::new(0, y as i32, CARD_WIDTH, 1), color);
        }
    }

    fn font(&self, weight: Weight) -> Option<&'a ab_glyph::FontVec> {
        self.fonts.map(|fonts| match weight {
            Weight::Regular => &fonts.regular,
            Weight::Bold => &fonts.bold,
        })
    }

    /// Draws text with its top-left corner at `(x, y)`. Without fonts nothing is drawn.
    pub fn text(&mut self, x: i32, y: i32, size: f32, weight: Weight, color: Rgb<u8>, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(font) = self.font(weight) {
            draw_text_mut(&mut self.image, color, x, y, PxScale::from(size), font, text);
        }
    }

    pub fn text_width(&self, size: f32, weight: Weight, text: &str) -> u32 {
        match self.font(weight) {
            Some(font) if !text.is_empty() => text_size(PxScale::from(size), font, text).0,
            _ => 0,
        }
    }

    /// Scales `photo` to fit inside `area` keeping its aspect ratio, flattens any alpha onto
    /// `background`, and centers it.
    pub fn paste_photo_fit(&mut self, photo: &DynamicImage, area: Area, background: Rgb<u8>) {
        if photo.width() == 0 || photo.height() == 0 || area.width == 0 || area.height == 0 {
            return;
        }
        let ratio = (area.width as f32 / photo.width() as f32)
            .min(area.height as f32 / photo.height() as f32);
        let width = ((photo.width() as f32 * ratio).round() as u32).clamp(1, area.width);
        let height = ((photo.height() as f32 * ratio).round() as u32).clamp(1, area.height);

        let resized = imageops::resize(&photo.to_rgba8(), width, height, FilterType::Lanczos3);
        let flattened = RgbImage::from_fn(width, height, |x, y| {
            let pixel = resized.get_pixel(x, y);
            let alpha = pixel.0[3] as u32;
            Rgb(std::array::from_fn(|channel| {
                let top = pixel.0[channel] as u32;
                let base = background.0[channel] as u32;
                ((top * alpha + base * (255 - alpha) + 127) / 255) as u8
            }))
        });

        let x = area.x as i64 + (area.width - width) as i64 / 2;
        let y = area.y as i64 + (area.height - height) as i64 / 2;
        imageops::overlay(&mut self.image, &flattened, x, y);
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

/// Greedy word wrap by character count. Words longer than a line are split.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word = word.to_string();
        while word.chars().count() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let head: String = word.chars().take(max_chars).collect();
            word = word.chars().skip(max_chars).collect();
            lines.push(head);
        }
        if word.is_empty() {
            continue;
        }
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Keeps at most `max_lines`, marking the last kept line with `...` when text was dropped.
pub fn clamp_lines(mut lines: Vec<String>, max_lines: usize) -> Vec<String> {
    if lines.len() <= max_lines {
        return lines;
    }
    lines.truncate(max_lines);
    if let Some(last) = lines.last_mut() {
        last.push_str("...");
    }
    lines
}

#[cfg(test)]
mod tests {
    use image::RgbaImage;

    use super::*;

    #[test]
    fn wraps_on_word_boundaries() {
        let lines = wrap_text("Беспроводные наушники Sony с шумоподавлением", 22);
        assert_eq!(
            lines,
            vec!["Беспроводные наушники", "Sony с шумоподавлением"]
        );
    }

    #[test]
    fn splits_words_longer_than_a_line() {
        assert_eq!(wrap_text("abcdefgh ij", 3), vec!["abc", "def", "gh", "ij"]);
        assert!(wrap_text("   ", 10).is_empty());
    }

    #[test]
    fn clamps_with_ellipsis() {
        let lines = clamp_lines(vec!["a".into(), "b".into(), "c".into()], 2);
        assert_eq!(lines, vec!["a", "b..."]);
    }

    #[test]
    fn photo_is_centered_and_alpha_flattened() {
        let mut canvas = Canvas::new(Rgb([255, 255, 255]), None);
        let photo = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            100,
            50,
            image::Rgba([0, 0, 0, 0]),
        ));
        canvas.paste_photo_fit(&photo, Area::new(0, 0, 200, 200), Rgb([10, 20, 30]));
        let image = canvas.into_image();
        // 200x100 after scaling, centered vertically at y=50.
        assert_eq!(image.get_pixel(100, 100), &Rgb([10, 20, 30]));
        assert_eq!(image.get_pixel(100, 20), &Rgb([255, 255, 255]));
    }

    #[test]
    fn text_without_fonts_leaves_canvas_untouched() {
        let mut canvas = Canvas::new(Rgb([1, 2, 3]), None);
        canvas.text(10, 10, 30.0, Weight::Bold, Rgb([200, 0, 0]), "Цена");
        assert_eq!(canvas.text_width(30.0, Weight::Bold, "Цена"), 0);
        assert!(canvas.into_image().pixels().all(|pixel| *pixel == Rgb([1, 2, 3])));
    }
}
