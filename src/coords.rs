//! Pixel and grid coordinate primitives.
//!
//! `Point` lives in pixel space (screen or page), `GridPos` addresses a board
//! cell. The two are distinct types on purpose: conversion between them is an
//! explicit projection through the board's tile size and scale, never a cast.

#[cfg(test)]
#[path = "coords_test.rs"]
mod coords_test;

use serde::{Deserialize, Serialize};

/// A point in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A grid cell addressed by column and row.
///
/// Values may be negative: projecting a pixel outside the board yields an
/// out-of-bounds cell, and callers decide whether that matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridPos {
    pub col: i32,
    pub row: i32,
}

impl GridPos {
    #[must_use]
    pub fn new(col: i32, row: i32) -> Self {
        Self { col, row }
    }
}

/// An inclusive rectangle of grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
    pub start: GridPos,
    pub end: GridPos,
}

impl Area {
    /// The area covering exactly one cell.
    #[must_use]
    pub fn single(tile: GridPos) -> Self {
        Self { start: tile, end: tile }
    }

    /// The normalized bounding rectangle of two cells, in any order.
    #[must_use]
    pub fn spanning(a: GridPos, b: GridPos) -> Self {
        Self {
            start: GridPos::new(a.col.min(b.col), a.row.min(b.row)),
            end: GridPos::new(a.col.max(b.col), a.row.max(b.row)),
        }
    }

    /// Whether this area covers exactly one cell.
    #[must_use]
    pub fn is_single_tile(&self) -> bool {
        self.start == self.end
    }

    #[must_use]
    pub fn contains(&self, tile: GridPos) -> bool {
        self.start.col <= tile.col
            && tile.col <= self.end.col
            && self.start.row <= tile.row
            && tile.row <= self.end.row
    }

    /// Every cell in the rectangle, column-major.
    #[must_use]
    pub fn tiles(&self) -> Vec<GridPos> {
        let mut out = Vec::new();
        for col in self.start.col..=self.end.col {
            for row in self.start.row..=self.end.row {
                out.push(GridPos::new(col, row));
            }
        }
        out
    }
}

/// Chebyshev distance between two cells, in tiles.
#[must_use]
pub fn tile_distance(a: GridPos, b: GridPos) -> i32 {
    (a.col - b.col).abs().max((a.row - b.row).abs())
}
