//! Coordinate engine: pure lane/column grid geometry.
//!
//! Maps (lane index, column index, fine offset) to absolute board positions
//! and computes the overall canvas extent. Deterministic integer math with
//! no side effects, so re-planning after a patch always lands items in the
//! same place and geometry is testable without credentials.

use crate::plan::{Layout, Node};
use crate::{Error, Result};

/// Absolute position of an item center.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

/// A finalized lane x column grid around a layout's origin.
#[derive(Debug, Clone)]
pub struct Grid {
    layout: Layout,
    num_lanes: usize,
    num_columns: usize,
}

impl Grid {
    /// Build a grid. Zero lanes or zero columns is rejected, not defaulted.
    pub fn new(layout: Layout, num_lanes: usize, num_columns: usize) -> Result<Self> {
        if num_lanes == 0 {
            return Err(Error::InvalidPlan(
                "  - lanes: must be a non-empty list".to_string(),
            ));
        }
        if num_columns == 0 {
            return Err(Error::InvalidPlan(
                "  - columns: must be a non-empty list".to_string(),
            ));
        }
        Ok(Self {
            layout,
            num_lanes,
            num_columns,
        })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn num_lanes(&self) -> usize {
        self.num_lanes
    }

    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    /// Left label margin + all column widths and gaps.
    pub fn total_width(&self) -> i64 {
        let n = self.num_columns as i64;
        self.layout.left_label_width + n * self.layout.col_width + (n - 1) * self.layout.col_gap
    }

    /// Header band + all lane heights and gaps.
    pub fn total_height(&self) -> i64 {
        let n = self.num_lanes as i64;
        n * self.layout.lane_height + (n - 1) * self.layout.lane_gap + self.layout.header_height
    }

    /// Top-left corner of the grid, centered on the layout origin.
    pub fn top_left(&self) -> Point {
        Point {
            x: self.layout.origin_x - self.total_width() / 2,
            y: self.layout.origin_y - self.total_height() / 2,
        }
    }

    /// Vertical center of lane `i` (0-based, top to bottom).
    pub fn lane_center_y(&self, lane: usize) -> i64 {
        let top_left = self.top_left();
        let lane_top = top_left.y
            + self.layout.header_height
            + lane as i64 * (self.layout.lane_height + self.layout.lane_gap);
        lane_top + self.layout.lane_height / 2
    }

    /// Horizontal center of column `j` (0-based, left to right).
    pub fn col_center_x(&self, column: usize) -> i64 {
        let top_left = self.top_left();
        let col_left = top_left.x
            + self.layout.left_label_width
            + column as i64 * (self.layout.col_width + self.layout.col_gap);
        col_left + self.layout.col_width / 2
    }

    /// Center of the lane x column cell.
    pub fn cell_center(&self, lane: usize, column: usize) -> Point {
        Point {
            x: self.col_center_x(column),
            y: self.lane_center_y(lane),
        }
    }

    /// Absolute position of a node: its cell center plus the fine offset.
    pub fn node_position(&self, node: &Node, lane_index: usize) -> Point {
        let center = self.cell_center(lane_index, node.column);
        Point {
            x: center.x + node.dx,
            y: center.y + node.dy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(num_lanes: usize, num_columns: usize) -> Grid {
        Grid::new(Layout::default(), num_lanes, num_columns).unwrap()
    }

    #[test]
    fn total_height_sums_lanes_gaps_and_header() {
        assert_eq!(grid(3, 1).total_height(), 740);

        let layout = Layout {
            lane_height: 200,
            lane_gap: 10,
            ..Layout::default()
        };
        let g = Grid::new(layout, 3, 1).unwrap();
        assert_eq!(g.total_height(), 700);
    }

    #[test]
    fn total_width_sums_label_columns_and_gaps() {
        assert_eq!(grid(1, 4).total_width(), 1680);

        let layout = Layout {
            col_gap: 10,
            ..Layout::default()
        };
        let g = Grid::new(layout, 1, 4).unwrap();
        assert_eq!(g.total_width(), 1710);
    }

    #[test]
    fn grid_is_centered_on_origin() {
        let g = grid(2, 2);
        assert_eq!(g.top_left(), Point { x: -480, y: -260 });
    }

    #[test]
    fn lane_centers_step_by_lane_height() {
        let g = grid(2, 2);
        assert_eq!(g.lane_center_y(0), -70);
        assert_eq!(g.lane_center_y(1), 150);
    }

    #[test]
    fn col_centers_step_by_col_width() {
        let g = grid(2, 2);
        assert_eq!(g.col_center_x(0), -60);
        assert_eq!(g.col_center_x(1), 300);
    }

    #[test]
    fn node_position_applies_fine_offsets() {
        let g = grid(2, 2);
        let mut node = crate::plan::Node::new("n", "N", "ignored", 1);
        node.dx = 50;
        node.dy = -30;
        assert_eq!(g.node_position(&node, 1), Point { x: 350, y: 120 });
    }

    #[test]
    fn identical_inputs_yield_identical_outputs() {
        let a = grid(3, 4);
        let b = grid(3, 4);
        for lane in 0..3 {
            for col in 0..4 {
                assert_eq!(a.cell_center(lane, col), b.cell_center(lane, col));
            }
        }
    }

    #[test]
    fn zero_lanes_or_columns_rejected() {
        assert!(Grid::new(Layout::default(), 0, 2).is_err());
        assert!(Grid::new(Layout::default(), 2, 0).is_err());
    }

    #[test]
    fn non_centered_origin_shifts_everything() {
        let layout = Layout {
            origin_x: 1000,
            origin_y: 500,
            ..Layout::default()
        };
        let g = Grid::new(layout, 2, 2).unwrap();
        assert_eq!(g.top_left(), Point { x: 520, y: 240 });
        assert_eq!(g.col_center_x(0), 940);
        assert_eq!(g.lane_center_y(0), 430);
    }
}
