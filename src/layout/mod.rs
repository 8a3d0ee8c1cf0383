mod grid;

use serde::{Deserialize, Serialize};

use crate::error::{GenError, GenResult};
use crate::geometry::{Margins, Rect};

pub use grid::{Grid, GridConfig, GridStack, GridStackConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Left,
    Center,
    Right,
}

/// A rectangle designated for one text element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub bbox: Rect,
    pub align: Align,
}

/// Regions grouped by stack, top to bottom.
pub type Layout = Vec<Vec<Region>>;

/// Coarse box spanning a layout, built from the first region of each stack,
/// the first stack's top and the last stack's bottom.
pub fn layout_bbox(layouts: &Layout, margins: Margins) -> GenResult<Rect> {
    let (Some(first_stack), Some(last_stack)) = (layouts.first(), layouts.last()) else {
        return Err(GenError::invalid("layout has no stacks"));
    };
    let (Some(first), Some(last)) = (first_stack.first(), last_stack.last()) else {
        return Err(GenError::invalid("layout stack has no regions"));
    };
    let mut x_left = f32::INFINITY;
    let mut x_right = f32::NEG_INFINITY;
    for stack in layouts {
        let Some(region) = stack.first() else {
            return Err(GenError::invalid("layout stack has no regions"));
        };
        x_left = x_left.min(region.bbox.x);
        x_right = x_right.max(region.bbox.x);
    }
    Ok(margins.apply(
        x_left,
        first.bbox.y,
        x_right + first.bbox.w,
        last.bbox.y + last.bbox.h,
    ))
}
