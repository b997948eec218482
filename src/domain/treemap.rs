//! Squarified treemap layout for the market-cap heat map.
//!
//! `squarify` is a pure recursive function over weights sorted descending:
//! it greedily grows a row of items along the shorter side of the current
//! rectangle while the worst aspect ratio in the row does not get worse,
//! lays that row out as one strip, and recurses into what is left.
//!
//! Weights that are zero, negative or NaN get a share of 0 and therefore a
//! zero-size rectangle. Nothing here divides by a zero total.

use serde::{Deserialize, Serialize};

/// Label used for the synthetic tile grouping everything past the cap.
pub const OTHERS_LABEL: &str = "Others";

/// Axis-aligned rectangle in container coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Shrink every edge by `d`, never below zero size.
    pub fn inset(&self, d: f64) -> Self {
        if !(d > 0.0) {
            return *self;
        }
        let dx = d.min(self.width / 2.0).max(0.0);
        let dy = d.min(self.height / 2.0).max(0.0);
        Self {
            x: self.x + dx,
            y: self.y + dy,
            width: (self.width - 2.0 * dx).max(0.0),
            height: (self.height - 2.0 * dy).max(0.0),
        }
    }

    const fn collapsed(&self) -> Self {
        Self::new(self.x, self.y, 0.0, 0.0)
    }
}

/// Weighted input item for the layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    /// Display label, e.g. "BTC".
    pub label: String,
    /// Layout weight (market cap). Negative or NaN counts as 0.
    pub weight: f64,
    /// Colour value (24h percent change).
    pub value: f64,
}

impl Tile {
    pub fn new(label: impl Into<String>, weight: f64, value: f64) -> Self {
        Self {
            label: label.into(),
            weight,
            value,
        }
    }
}

/// A tile paired with its laid-out rectangle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedTile {
    pub tile: Tile,
    pub rect: Rect,
}

fn share(weight: f64) -> f64 {
    if weight.is_finite() && weight > 0.0 {
        weight
    } else {
        0.0
    }
}

/// Lay out `weights` (sorted descending) inside `container`.
///
/// Returns one rectangle per weight, in the same order. The rectangles
/// partition the container exactly and each area is proportional to its
/// weight's share of the total.
pub fn squarify(weights: &[f64], container: Rect) -> Vec<Rect> {
    if weights.is_empty() {
        return Vec::new();
    }

    let total: f64 = weights.iter().copied().map(share).sum();
    if total <= 0.0 || !(container.area() > 0.0) {
        return vec![container.collapsed(); weights.len()];
    }

    // Horizontal strips span the width of a tall rectangle.
    let horizontal = container.width < container.height;
    let (side, depth) = if horizontal {
        (container.width, container.height)
    } else {
        (container.height, container.width)
    };

    let row_len = row_length(weights, total, side, depth);
    let (row, rest) = weights.split_at(row_len);
    let row_total: f64 = row.iter().copied().map(share).sum();
    let thickness = (depth * row_total / total).min(depth);

    let mut rects = Vec::with_capacity(weights.len());
    let mut offset = 0.0;
    for &w in row {
        let length = if row_total > 0.0 {
            side * share(w) / row_total
        } else {
            0.0
        };
        rects.push(if horizontal {
            Rect::new(container.x + offset, container.y, length, thickness)
        } else {
            Rect::new(container.x, container.y + offset, thickness, length)
        });
        offset += length;
    }

    let leftover = if horizontal {
        Rect::new(
            container.x,
            container.y + thickness,
            container.width,
            (container.height - thickness).max(0.0),
        )
    } else {
        Rect::new(
            container.x + thickness,
            container.y,
            (container.width - thickness).max(0.0),
            container.height,
        )
    };

    rects.extend(squarify(rest, leftover));
    rects
}

/// How many leading weights go into the next row.
fn row_length(weights: &[f64], total: f64, side: f64, depth: f64) -> usize {
    let mut len = 1;
    let mut current = worst_ratio(&weights[..1], total, side, depth);
    while len < weights.len() {
        let candidate = worst_ratio(&weights[..=len], total, side, depth);
        if candidate > current {
            break;
        }
        current = candidate;
        len += 1;
    }
    len
}

/// Worst aspect ratio of `row` laid out as one strip.
///
/// Zero-weight items are ignored; a row of only zeros is infinitely bad so
/// the next positive weight always joins it.
fn worst_ratio(row: &[f64], total: f64, side: f64, depth: f64) -> f64 {
    let row_total: f64 = row.iter().copied().map(share).sum();
    if row_total <= 0.0 {
        return f64::INFINITY;
    }
    let thickness = depth * row_total / total;
    row.iter()
        .copied()
        .map(share)
        .filter(|&w| w > 0.0)
        .map(|w| {
            let length = side * w / row_total;
            if length <= 0.0 || thickness <= 0.0 {
                f64::INFINITY
            } else {
                (length / thickness).max(thickness / length)
            }
        })
        .fold(0.0, f64::max)
}

/// Lay out tiles in any order, returning rectangles by input index.
///
/// Each rectangle is inset by `spacing / 2` on every edge.
pub fn layout(tiles: &[Tile], container: Rect, spacing: f64) -> Vec<Rect> {
    let mut order: Vec<usize> = (0..tiles.len()).collect();
    order.sort_by(|&a, &b| share(tiles[b].weight).total_cmp(&share(tiles[a].weight)));

    let weights: Vec<f64> = order.iter().map(|&i| tiles[i].weight).collect();
    let placed = squarify(&weights, container);

    let mut rects = vec![Rect::default(); tiles.len()];
    for (rank, &idx) in order.iter().enumerate() {
        rects[idx] = placed[rank].inset(spacing / 2.0);
    }
    rects
}

/// Keep the `cap` heaviest tiles and fold the rest into one "Others" tile.
///
/// Others' weight is the sum of the folded weights; its value is their
/// weight-weighted mean, or 0 when those weights sum to 0. The result is
/// sorted by weight descending with Others last.
pub fn collapse_others(mut tiles: Vec<Tile>, cap: usize) -> Vec<Tile> {
    tiles.sort_by(|a, b| share(b.weight).total_cmp(&share(a.weight)));
    if tiles.len() <= cap {
        return tiles;
    }

    let folded = tiles.split_off(cap);
    let weight: f64 = folded.iter().map(|t| share(t.weight)).sum();
    let weighted: f64 = folded.iter().map(|t| t.value * share(t.weight)).sum();
    let value = if weight > 0.0 { weighted / weight } else { 0.0 };

    tiles.push(Tile::new(OTHERS_LABEL, weight, value));
    tiles
}

/// Adaptive display cap: one tile per `px_per_tile` of width, at least one,
/// at most `max`.
pub fn tile_cap_for_width(width: f64, px_per_tile: f64, max: usize) -> usize {
    let max = max.max(1);
    if !(px_per_tile > 0.0) || !width.is_finite() || width <= 0.0 {
        return max;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let fit = (width / px_per_tile).floor() as usize;
    fit.clamp(1, max)
}

/// Symmetric colour bound: ±10% or the largest observed |value|.
pub fn color_bound(tiles: &[Tile]) -> f64 {
    tiles
        .iter()
        .map(|t| t.value.abs())
        .filter(|v| v.is_finite())
        .fold(10.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn total_area(rects: &[Rect]) -> f64 {
        rects.iter().map(Rect::area).sum()
    }

    #[test]
    fn test_empty_input_gives_empty_output() {
        assert!(squarify(&[], Rect::new(0.0, 0.0, 100.0, 100.0)).is_empty());
        assert!(layout(&[], Rect::new(0.0, 0.0, 100.0, 100.0), 2.0).is_empty());
    }

    #[test]
    fn test_fifty_thirty_twenty_in_square() {
        let tiles = vec![
            Tile::new("A", 50.0, 1.0),
            Tile::new("B", 30.0, -1.0),
            Tile::new("C", 20.0, 0.5),
        ];
        let rects = layout(&tiles, Rect::new(0.0, 0.0, 100.0, 100.0), 0.0);

        assert_eq!(rects.len(), 3);
        assert!((rects[0].area() - 5000.0).abs() < EPS);
        assert!((rects[1].area() - 3000.0).abs() < EPS);
        assert!((rects[2].area() - 2000.0).abs() < EPS);
        assert!((total_area(&rects) - 10_000.0).abs() < EPS);

        // A takes the left half; B and C stack in the right half.
        assert_eq!(rects[0], Rect::new(0.0, 0.0, 50.0, 100.0));
        assert_eq!(rects[1], Rect::new(50.0, 0.0, 50.0, 60.0));
        assert_eq!(rects[2], Rect::new(50.0, 60.0, 50.0, 40.0));
    }

    #[test]
    fn test_layout_preserves_input_order() {
        let tiles = vec![
            Tile::new("small", 20.0, 0.0),
            Tile::new("big", 50.0, 0.0),
            Tile::new("mid", 30.0, 0.0),
        ];
        let rects = layout(&tiles, Rect::new(0.0, 0.0, 100.0, 100.0), 0.0);
        assert!((rects[0].area() - 2000.0).abs() < EPS);
        assert!((rects[1].area() - 5000.0).abs() < EPS);
        assert!((rects[2].area() - 3000.0).abs() < EPS);
    }

    #[test]
    fn test_zero_total_weight_is_degenerate() {
        let rects = squarify(&[0.0, 0.0, f64::NAN], Rect::new(5.0, 5.0, 100.0, 50.0));
        assert_eq!(rects.len(), 3);
        assert!(rects.iter().all(|r| r.area() == 0.0));
    }

    #[test]
    fn test_zero_weight_item_gets_zero_area() {
        let rects = squarify(&[60.0, 40.0, 0.0], Rect::new(0.0, 0.0, 200.0, 100.0));
        assert_eq!(rects.len(), 3);
        assert!(rects[2].area().abs() < EPS);
        assert!((total_area(&rects) - 20_000.0).abs() < EPS);
    }

    #[test]
    fn test_degenerate_container() {
        let rects = squarify(&[3.0, 2.0], Rect::new(0.0, 0.0, 0.0, 100.0));
        assert_eq!(rects.len(), 2);
        assert!(rects.iter().all(|r| r.area() == 0.0));
    }

    #[test]
    fn test_spacing_insets_each_rect() {
        let tiles = vec![Tile::new("A", 1.0, 0.0)];
        let rects = layout(&tiles, Rect::new(0.0, 0.0, 100.0, 50.0), 2.0);
        assert_eq!(rects[0], Rect::new(1.0, 1.0, 98.0, 48.0));
    }

    #[test]
    fn test_collapse_others_weighted_average() {
        let tiles = vec![
            Tile::new("BTC", 100.0, 1.0),
            Tile::new("ETH", 50.0, 2.0),
            Tile::new("SOL", 30.0, 4.0),
            Tile::new("XRP", 10.0, -2.0),
        ];
        let collapsed = collapse_others(tiles, 2);
        assert_eq!(collapsed.len(), 3);
        assert_eq!(collapsed[0].label, "BTC");
        assert_eq!(collapsed[1].label, "ETH");

        let others = &collapsed[2];
        assert_eq!(others.label, OTHERS_LABEL);
        assert!((others.weight - 40.0).abs() < EPS);
        assert!((others.value - (30.0 * 4.0 + 10.0 * -2.0) / 40.0).abs() < EPS);
    }

    #[test]
    fn test_collapse_others_zero_weights_value_defaults_to_zero() {
        let tiles = vec![
            Tile::new("BTC", 100.0, 1.0),
            Tile::new("A", 0.0, 5.0),
            Tile::new("B", 0.0, -3.0),
        ];
        let collapsed = collapse_others(tiles, 1);
        let others = collapsed.last().unwrap();
        assert_eq!(others.weight, 0.0);
        assert_eq!(others.value, 0.0);
    }

    #[test]
    fn test_collapse_under_cap_is_sorted_passthrough() {
        let tiles = vec![Tile::new("A", 1.0, 0.0), Tile::new("B", 2.0, 0.0)];
        let collapsed = collapse_others(tiles, 5);
        assert_eq!(collapsed.len(), 2);
        assert_eq!(collapsed[0].label, "B");
    }

    #[test]
    fn test_tile_cap_for_width() {
        assert_eq!(tile_cap_for_width(400.0, 80.0, 20), 5);
        assert_eq!(tile_cap_for_width(10.0, 80.0, 20), 1);
        assert_eq!(tile_cap_for_width(10_000.0, 80.0, 20), 20);
        assert_eq!(tile_cap_for_width(400.0, 0.0, 20), 20);
    }

    #[test]
    fn test_color_bound() {
        assert_eq!(color_bound(&[Tile::new("A", 1.0, 3.0)]), 10.0);
        assert_eq!(color_bound(&[Tile::new("A", 1.0, -14.5)]), 14.5);
    }
}
