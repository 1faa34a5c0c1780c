//! Reusable frame buffer.

use super::PixelFormat;

/// A single reusable frame buffer.
///
/// Sized once for the sensor resolution and pixel depth, then
/// overwritten in place by every capture. Pixels are row-major;
/// 16-bit samples are little-endian, as the camera delivers them.
pub struct FrameBuffer {
    /// Raw pixel bytes.
    data: Vec<u8>,
    /// Frame width in pixels.
    width: u32,
    /// Frame height in pixels.
    height: u32,
    /// Pixel depth.
    format: PixelFormat,
}

impl FrameBuffer {
    /// Allocates a zeroed buffer for the given geometry.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let len = Self::frame_len(width, height, format);
        Self {
            data: vec![0u8; len],
            width,
            height,
            format,
        }
    }

    /// Byte length of one frame with the given geometry.
    #[inline]
    pub fn frame_len(width: u32, height: u32, format: PixelFormat) -> usize {
        (width as usize) * (height as usize) * format.bytes_per_pixel()
    }

    /// Returns the raw bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns the raw bytes for the camera to fill.
    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Returns the frame width.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the frame height.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the pixel format.
    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Returns the byte length of the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true for a zero-sized frame.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Writes one pixel. `value` uses the full 16-bit range and is
    /// reduced to the high byte for 8-bit frames. Out-of-bounds
    /// coordinates are ignored.
    pub fn put_pixel(&mut self, x: u32, y: u32, value: u16) {
        if x >= self.width || y >= self.height {
            return;
        }
        let index = (y as usize) * (self.width as usize) + (x as usize);
        match self.format {
            PixelFormat::Raw8 => {
                self.data[index] = (value >> 8) as u8;
            }
            PixelFormat::Raw16 => {
                let [lo, hi] = value.to_le_bytes();
                self.data[index * 2] = lo;
                self.data[index * 2 + 1] = hi;
            }
        }
    }

    /// Reads one pixel, scaled to the 16-bit range like [`put_pixel`](Self::put_pixel).
    pub fn pixel(&self, x: u32, y: u32) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let index = (y as usize) * (self.width as usize) + (x as usize);
        Some(match self.format {
            PixelFormat::Raw8 => u16::from(self.data[index]) << 8,
            PixelFormat::Raw16 => u16::from_le_bytes([self.data[index * 2], self.data[index * 2 + 1]]),
        })
    }

    /// Validates that the buffer size matches the geometry.
    pub fn is_valid(&self) -> bool {
        self.data.len() == Self::frame_len(self.width, self.height, self.format)
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_size_matches_format() {
        let raw8 = FrameBuffer::new(640, 480, PixelFormat::Raw8);
        assert_eq!(raw8.len(), 640 * 480);
        assert!(raw8.is_valid());

        let raw16 = FrameBuffer::new(640, 480, PixelFormat::Raw16);
        assert_eq!(raw16.len(), 640 * 480 * 2);
        assert!(raw16.is_valid());
    }

    #[test]
    fn test_put_pixel_raw16_little_endian() {
        let mut frame = FrameBuffer::new(4, 2, PixelFormat::Raw16);
        frame.put_pixel(1, 1, 0xC812);

        let offset = (4 + 1) * 2;
        assert_eq!(frame.as_bytes()[offset], 0x12);
        assert_eq!(frame.as_bytes()[offset + 1], 0xC8);
        assert_eq!(frame.pixel(1, 1), Some(0xC812));
    }

    #[test]
    fn test_put_pixel_raw8_keeps_high_byte() {
        let mut frame = FrameBuffer::new(4, 2, PixelFormat::Raw8);
        frame.put_pixel(3, 0, 0xC812);
        assert_eq!(frame.as_bytes()[3], 0xC8);
    }

    #[test]
    fn test_put_pixel_out_of_bounds_ignored() {
        let mut frame = FrameBuffer::new(4, 2, PixelFormat::Raw8);
        frame.put_pixel(4, 0, 0xFFFF);
        frame.put_pixel(0, 2, 0xFFFF);
        assert!(frame.as_bytes().iter().all(|&b| b == 0));
        assert_eq!(frame.pixel(4, 0), None);
    }
}
