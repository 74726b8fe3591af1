//! Column-major grid helpers and per-cell board states.
//!
//! Board overlays are `Vec<Vec<T>>` indexed `[col][row]`. Cell states carry
//! their wire encoding in the serde rename: fog-of-war is a tri-state digit
//! string, highlight is a color tag digit string.

#[cfg(test)]
#[path = "grid_test.rs"]
mod grid_test;

use serde::{Deserialize, Serialize};

/// Build a `cols x rows` grid filled with `value`.
#[must_use]
pub fn create_grid<T: Clone>(cols: usize, rows: usize, value: T) -> Vec<Vec<T>> {
    vec![vec![value; rows]; cols]
}

/// Whether `grid` has exactly `cols` columns of `rows` cells each.
#[must_use]
pub fn is_grid<T>(grid: &[Vec<T>], cols: usize, rows: usize) -> bool {
    grid.len() == cols && grid.iter().all(|col| col.len() == rows)
}

/// Fog-of-war state of a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FogState {
    /// No fog; contents visible to everyone.
    #[default]
    #[serde(rename = "0")]
    Clear,
    /// Fully fogged; contents hidden from players.
    #[serde(rename = "1")]
    Hidden,
    /// Fogged for players but revealed to the host.
    #[serde(rename = "2")]
    Peeked,
}

impl FogState {
    /// Whether the cell carries fog in either hidden variant.
    #[must_use]
    pub fn is_fogged(self) -> bool {
        matches!(self, Self::Hidden | Self::Peeked)
    }
}

/// Highlight color tag of a single cell in the public selection overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Highlight {
    #[default]
    #[serde(rename = "0")]
    None,
    #[serde(rename = "1")]
    Blue,
    #[serde(rename = "2")]
    Orange,
    #[serde(rename = "3")]
    Green,
}
