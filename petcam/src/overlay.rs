//! Drawing of detection overlays onto frames.
//!
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut},
    rect::Rect,
};
use rusttype::{point, Font, Scale};

use common::detection::{PetClass, PetDetection};

/// Monospace font shipped with most Linux distributions.
pub const DEFAULT_FONT_PATH: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf";

const CAT_COLOR: Rgb<u8> = Rgb([76, 175, 80]);
const DOG_COLOR: Rgb<u8> = Rgb([255, 82, 82]);
const CHIP_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

const CHIP_HEIGHT: u32 = 20;
const CHIP_PADDING: u32 = 5;
const LABEL_SCALE: f32 = 16.0;

/// Paints stroked boxes and label chips for retained detections.
pub struct OverlayPainter {
    font: Option<Font<'static>>,
}

impl OverlayPainter {
    pub fn new(font: Option<Font<'static>>) -> Self {
        Self { font }
    }

    /// Load the label font from a TTF file.
    pub fn load(font_path: impl AsRef<Path>) -> Result<Self> {
        let font_path = font_path.as_ref();
        let font_data = std::fs::read(font_path)
            .with_context(|| format!("reading font {}", font_path.display()))?;
        let font = Font::try_from_vec(font_data)
            .ok_or_else(|| anyhow!("invalid font data in {}", font_path.display()))?;

        Ok(Self::new(Some(font)))
    }

    /// Load the label font, falling back to box-only overlays when the font
    /// is unavailable.
    pub fn load_or_boxes_only(font_path: impl AsRef<Path>) -> Self {
        match Self::load(&font_path) {
            Ok(painter) => painter,
            Err(err) => {
                log::warn!("No label font, drawing boxes without text: {err:#}");
                Self::new(None)
            }
        }
    }

    /// Draw one stroked rectangle and label chip per retained detection.
    pub fn paint(&self, mut frame: RgbImage, pets: &[PetDetection]) -> RgbImage {
        for pet in pets {
            let bbox = &pet.detection.bbox;
            let color = class_color(pet.class);

            let x_tl = bbox.x as i32;
            let y_tl = bbox.y as i32;
            let pet_rect = Rect::at(x_tl, y_tl)
                .of_size((bbox.width as u32).max(1), (bbox.height as u32).max(1));
            draw_hollow_rect_mut(&mut frame, pet_rect, color);

            if let Some(font) = &self.font {
                let confidence_percent = (pet.detection.confidence * 100.0).round() as u32;
                let text = format!("{} {}%", pet.class.name(), confidence_percent);

                let chip_y = (y_tl - CHIP_HEIGHT as i32).max(0);
                let chip_width = text_width(font, &text) as u32 + 2 * CHIP_PADDING;
                let chip_rect = Rect::at(x_tl, chip_y).of_size(chip_width, CHIP_HEIGHT);
                draw_filled_rect_mut(&mut frame, chip_rect, color);

                draw_text_mut(
                    &mut frame,
                    CHIP_TEXT_COLOR,
                    x_tl + CHIP_PADDING as i32,
                    chip_y + 2,
                    Scale {
                        x: LABEL_SCALE,
                        y: LABEL_SCALE,
                    },
                    font,
                    &text,
                );
            }
        }

        frame
    }
}

fn class_color(class: PetClass) -> Rgb<u8> {
    match class {
        PetClass::Cat => CAT_COLOR,
        PetClass::Dog => DOG_COLOR,
    }
}

fn text_width(font: &Font<'_>, text: &str) -> f32 {
    let scale = Scale {
        x: LABEL_SCALE,
        y: LABEL_SCALE,
    };
    font.layout(text, scale, point(0.0, 0.0))
        .map(|glyph| glyph.unpositioned().h_metrics().advance_width)
        .sum()
}

#[cfg(test)]
mod test {
    use super::*;
    use common::detection::{BoundingBox, Detection};

    fn cat_at(x: f32, y: f32) -> PetDetection {
        PetDetection {
            class: PetClass::Cat,
            detection: Detection {
                label: "cat".to_owned(),
                confidence: 0.9,
                bbox: BoundingBox::new(x, y, 20.0, 20.0),
            },
        }
    }

    #[test]
    fn test_paint_strokes_box_edges() {
        let painter = OverlayPainter::new(None);
        let frame = RgbImage::new(100, 100);

        let painted = painter.paint(frame, &[cat_at(10.0, 30.0)]);

        assert_eq!(*painted.get_pixel(10, 30), CAT_COLOR);
        assert_eq!(*painted.get_pixel(29, 30), CAT_COLOR);
        // Inside of the rectangle stays untouched.
        assert_eq!(*painted.get_pixel(15, 35), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_paint_without_detections_is_identity() {
        let painter = OverlayPainter::new(None);
        let frame = RgbImage::new(32, 32);

        let painted = painter.paint(frame.clone(), &[]);

        assert_eq!(painted, frame);
    }
}
