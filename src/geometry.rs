use serde::{Deserialize, Serialize};

use crate::error::{GenError, GenResult};

/// Axis-aligned rectangle in canvas pixels, `(x, y)` being the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x: x1,
            y: y1,
            w: (x2 - x1).max(0.0),
            h: (y2 - y1).max(0.0),
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.w * 0.5, self.y + self.h * 0.5)
    }

    pub fn translate(&self, dx: f32, dy: f32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }

    #[cfg(test)]
    pub fn contains(&self, other: &Rect) -> bool {
        const EPS: f32 = 1e-3;
        other.x >= self.x - EPS
            && other.y >= self.y - EPS
            && other.right() <= self.right() + EPS
            && other.bottom() <= self.bottom() + EPS
    }

    /// Integer pixel box covering this rectangle, clipped to `width` x `height`.
    pub fn to_pixel_box(&self, width: u32, height: u32) -> BBoxPx {
        let x1 = self.x.floor().clamp(0.0, width as f32) as i32;
        let y1 = self.y.floor().clamp(0.0, height as f32) as i32;
        let x2 = self.right().ceil().clamp(0.0, width as f32) as i32;
        let y2 = self.bottom().ceil().clamp(0.0, height as f32) as i32;
        BBoxPx {
            x: x1,
            y: y1,
            w: (x2 - x1).max(0) as u32,
            h: (y2 - y1).max(0) as u32,
        }
    }
}

/// Margin factors applied to an aggregate box: the top-left corner is scaled
/// by `low`, the bottom-right corner by `high`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    pub low: f32,
    pub high: f32,
}

impl Margins {
    pub const TIGHT: Margins = Margins {
        low: 1.0,
        high: 1.0,
    };

    pub fn apply(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> Rect {
        Rect::from_corners(x1 * self.low, y1 * self.low, x2 * self.high, y2 * self.high)
    }
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            low: 0.9,
            high: 1.05,
        }
    }
}

/// Smallest rectangle covering every box, widened by `margins`.
pub fn aggregate(boxes: &[Rect], margins: Margins) -> GenResult<Rect> {
    let Some(first) = boxes.first() else {
        return Err(GenError::invalid("cannot aggregate an empty set of boxes"));
    };
    let mut x1 = first.x;
    let mut y1 = first.y;
    let mut x2 = first.right();
    let mut y2 = first.bottom();
    for rect in &boxes[1..] {
        x1 = x1.min(rect.x);
        y1 = y1.min(rect.y);
        x2 = x2.max(rect.right());
        y2 = y2.max(rect.bottom());
    }
    Ok(margins.apply(x1, y1, x2, y2))
}

/// Integer pixel box as stored in ground truth, serialized as `[x, y, w, h]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[i64; 4]")]
pub struct BBoxPx {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl BBoxPx {
    pub fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn from_rect(rect: &Rect) -> Self {
        Self {
            x: rect.x.round() as i32,
            y: rect.y.round() as i32,
            w: rect.w.round().max(0.0) as u32,
            h: rect.h.round().max(0.0) as u32,
        }
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }

    /// `[x_center / W, y_center / H, w / W, h / H]`
    pub fn to_yolo(&self, image_width: u32, image_height: u32) -> [f64; 4] {
        let width = f64::from(image_width.max(1));
        let height = f64::from(image_height.max(1));
        let w = f64::from(self.w);
        let h = f64::from(self.h);
        [
            (f64::from(self.x) + w / 2.0) / width,
            (f64::from(self.y) + h / 2.0) / height,
            w / width,
            h / height,
        ]
    }
}

impl From<[f64; 4]> for BBoxPx {
    fn from(value: [f64; 4]) -> Self {
        let [x, y, w, h] = value;
        Self {
            x: x.round() as i32,
            y: y.round() as i32,
            w: w.round().max(0.0) as u32,
            h: h.round().max(0.0) as u32,
        }
    }
}

impl From<BBoxPx> for [i64; 4] {
    fn from(value: BBoxPx) -> Self {
        [
            i64::from(value.x),
            i64::from(value.y),
            i64::from(value.w),
            i64::from(value.h),
        ]
    }
}
