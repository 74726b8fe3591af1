//! Board state synchronization engine for a collaborative virtual tabletop.
//!
//! Multiple clients view and edit a shared grid board: a background image,
//! movable tokens, a fog-of-war grid, and a highlight overlay grid. This crate
//! owns the canonical data model and the diff/merge algebra that keeps those
//! views consistent: every edit becomes a sparse diff, every diff application
//! produces a new immutable snapshot, and conflicting edits resolve
//! last-write-wins per field and per grid cell. Rendering, form widgets, and
//! the transport channel itself are external collaborators; only their call
//! contracts appear here.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`coords`] | Pixel points, grid cells, and tile rectangles |
//! | [`grid`] | Column-major grid helpers and per-cell states |
//! | [`remote`] | Shared board/token snapshots and the diff algebra |
//! | [`image`] | Image resolution contract for backgrounds and tokens |
//! | [`board`] | Local board model layering ephemeral state over a snapshot |
//! | [`handler`] | The single mutable model reference and listener fan-out |
//! | [`entity`] | Token collision queries and upsert diffs |
//! | [`interaction`] | Pointer gesture state machine and menu actions |
//! | [`events`] | Transport event names and payload codecs |
//! | [`cache`] | Server-side write-back cache over a backup store |

pub mod board;
pub mod cache;
pub mod coords;
pub mod entity;
pub mod events;
pub mod grid;
pub mod handler;
pub mod image;
pub mod interaction;
pub mod remote;
