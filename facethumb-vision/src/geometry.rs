use crate::primitives;

/// Axis-aligned box with float coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Axis-aligned box in integer pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl PixelRect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> i64 {
        self.width.max(0) as i64 * self.height.max(0) as i64
    }

    /// Intersection over union. Disjoint or degenerate pairs give 0.
    pub fn iou(&self, other: &Self) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let inter = (x2 - x1) as i64 * (y2 - y1) as i64;
        let union = self.area() + other.area() - inter;
        if union <= 0 {
            return 0.0;
        }
        inter as f32 / union as f32
    }

    /// Restrict to `[0, width) x [0, height)`. Returns `None` when nothing is left.
    pub fn clip(&self, width: u32, height: u32) -> Option<PixelRect> {
        let x1 = self.x.clamp(0, width as i32);
        let y1 = self.y.clamp(0, height as i32);
        let x2 = (self.x + self.width).clamp(0, width as i32);
        let y2 = (self.y + self.height).clamp(0, height as i32);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(PixelRect::new(x1, y1, x2 - x1, y2 - y1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Mapping between an original image and the square working image built from it
/// by [`primitives::image_scale`] followed by [`primitives::image_pad_square`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Original image width
    pub width: u32,
    /// Original image height
    pub height: u32,
    /// Resize ratio applied before padding
    pub ratio: f32,
    /// Left padding in working-image pixels
    pub pad_x: u32,
    /// Top padding in working-image pixels
    pub pad_y: u32,
}

impl Letterbox {
    pub fn compute(width: u32, height: u32, target: u32) -> Self {
        let ratio = primitives::fit_ratio(width, height, target, target);
        let scaled_w = ((width as f32 * ratio).round() as u32).max(1);
        let scaled_h = ((height as f32 * ratio).round() as u32).max(1);
        let (pad_x, pad_y) = primitives::pad_offsets(scaled_w, scaled_h);
        Self {
            width,
            height,
            ratio,
            pad_x,
            pad_y,
        }
    }

    pub fn map_point(&self, p: Point) -> Point {
        let x = (p.x - self.pad_x as f32) / self.ratio;
        let y = (p.y - self.pad_y as f32) / self.ratio;
        Point::new(
            x.clamp(0.0, self.width as f32),
            y.clamp(0.0, self.height as f32),
        )
    }

    /// Map a working-image box back into original-image pixels, clipped to the image.
    pub fn map_rect(&self, r: &PixelRect) -> PixelRect {
        let tl = self.map_point(Point::new(r.x as f32, r.y as f32));
        let br = self.map_point(Point::new(
            (r.x + r.width) as f32,
            (r.y + r.height) as f32,
        ));
        let x = tl.x.round() as i32;
        let y = tl.y.round() as i32;
        PixelRect::new(x, y, br.x.round() as i32 - x, br.y.round() as i32 - y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou() {
        let a = PixelRect::new(10, 10, 20, 20);
        let b = PixelRect::new(15, 15, 20, 20);
        let iou = a.iou(&b);
        // 15x15 overlap over 400 + 400 - 225
        assert!((iou - 225.0 / 575.0).abs() < 1e-6);

        let c = PixelRect::new(100, 100, 10, 10);
        assert_eq!(a.iou(&c), 0.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_clip() {
        let r = PixelRect::new(-10, 590, 100, 100);
        assert_eq!(r.clip(640, 640), Some(PixelRect::new(0, 590, 90, 50)));
        assert_eq!(PixelRect::new(700, 0, 10, 10).clip(640, 640), None);
    }

    #[test]
    fn test_letterbox_landscape_round_trip() {
        // 1920x1080 -> 640x360 resized, 140px top padding
        let lb = Letterbox::compute(1920, 1080, 640);
        assert_eq!((lb.pad_x, lb.pad_y), (0, 140));

        let work = PixelRect::new(100, 240, 60, 30);
        let orig = lb.map_rect(&work);
        assert_eq!(orig, PixelRect::new(300, 300, 180, 90));
    }

    #[test]
    fn test_letterbox_clamps_to_image() {
        let lb = Letterbox::compute(1920, 1080, 640);
        // Box straddling the top padding band
        let orig = lb.map_rect(&PixelRect::new(0, 100, 50, 60));
        assert_eq!(orig.y, 0);
        assert_eq!(orig.height, 60);
    }
}
