//! Text overlay on raw frames.
//!
//! Renders the diagnostic line into the top-left corner of the frame
//! buffer with a fixed bitmap font. Rendering only overwrites pixels;
//! it never changes the buffer size.

mod font;
mod status;

pub use font::{glyph, ADVANCE, GLYPH_HEIGHT, GLYPH_WIDTH};
pub use status::FrameStatus;

use crate::capture::FrameBuffer;

/// Placement and color of overlay text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayStyle {
    /// Left edge in frame pixels.
    pub x: u32,
    /// Top edge in frame pixels.
    pub y: u32,
    /// Frame pixels per font pixel.
    pub scale: u32,
    /// Ink value on the 16-bit scale.
    pub ink: u16,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            x: 5,
            y: 5,
            scale: 2,
            // 200 of 255, light grey
            ink: 0xC8C8,
        }
    }
}

/// Size in frame pixels of `text` rendered at `scale`.
pub fn text_extent(text: &str, scale: u32) -> (u32, u32) {
    let chars = text.chars().count() as u32;
    if chars == 0 {
        return (0, 0);
    }
    let width = (chars * ADVANCE - 1) * scale;
    (width, GLYPH_HEIGHT * scale)
}

/// Draws `text` into `frame`. Pixels outside the frame are clipped.
pub fn draw_text(frame: &mut FrameBuffer, text: &str, style: &OverlayStyle) {
    let scale = style.scale.max(1);
    for (index, c) in text.chars().enumerate() {
        let origin_x = style.x + index as u32 * ADVANCE * scale;
        if origin_x >= frame.width() {
            break;
        }
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if (bits >> (GLYPH_WIDTH - 1 - col)) & 1 == 0 {
                    continue;
                }
                let px = origin_x + col * scale;
                let py = style.y + row as u32 * scale;
                for dy in 0..scale {
                    for dx in 0..scale {
                        frame.put_pixel(px + dx, py + dy, style.ink);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PixelFormat;

    fn style(scale: u32) -> OverlayStyle {
        OverlayStyle {
            x: 0,
            y: 0,
            scale,
            ..Default::default()
        }
    }

    #[test]
    fn test_draw_single_glyph() {
        let mut frame = FrameBuffer::new(16, 8, PixelFormat::Raw8);
        draw_text(&mut frame, "1", &style(1));

        // Top row of '1' is a single pixel in the middle column.
        assert_eq!(frame.as_bytes()[2], 0xC8);
        assert_eq!(frame.as_bytes()[0], 0);
        assert_eq!(frame.as_bytes()[1], 0);
    }

    #[test]
    fn test_overlay_stays_in_text_region() {
        let mut frame = FrameBuffer::new(400, 60, PixelFormat::Raw16);
        let text = "20261019 010203Z Gain:70 Exp:100ms";
        let style = OverlayStyle::default();
        draw_text(&mut frame, text, &style);

        let (w, h) = text_extent(text, style.scale);
        let len = frame.len();
        for y in 0..frame.height() {
            for x in 0..frame.width() {
                let inside =
                    x >= style.x && x < style.x + w && y >= style.y && y < style.y + h;
                if !inside {
                    assert_eq!(frame.pixel(x, y), Some(0), "pixel ({x}, {y})");
                }
            }
        }
        assert!(frame.as_bytes().iter().any(|&b| b != 0));
        assert_eq!(len, 400 * 60 * 2);
    }

    #[test]
    fn test_text_clipped_at_frame_edge() {
        let mut frame = FrameBuffer::new(20, 5, PixelFormat::Raw8);
        draw_text(&mut frame, "WWWWWWWWWW", &style(2));
        assert!(frame.is_valid());
        assert_eq!(frame.len(), 100);
    }

    #[test]
    fn test_text_extent() {
        assert_eq!(text_extent("", 2), (0, 0));
        assert_eq!(text_extent("A", 1), (5, 7));
        assert_eq!(text_extent("AB", 2), (22, 14));
    }
}
