//! The single mutable reference to the current board model.
//!
//! Every change flows through [`ModelHandler`]: it merges diffs into a new
//! snapshot, swaps the reference, and fans the result out to listeners on
//! two typed channels. Locally-originated diffs notify both channels; the
//! owning controller forwards them to the transport from its local-channel
//! listener. Remotely-originated diffs notify only the all channel, so a
//! remote change is never re-broadcast.
//!
//! DESIGN
//! ======
//! The current model is read before any await, so two overlapping merges on
//! separate handlers race and the last to complete wins per field and per
//! cell. That last-write-wins behavior is the system's documented
//! consistency model across clients, not a guarantee this type can
//! strengthen; within one handler `&mut self` serializes merges. Listener
//! callbacks run synchronously in registration order and must not re-enter
//! the handler.

#[cfg(test)]
#[path = "handler_test.rs"]
mod handler_test;

use crate::board::{BoardDiff, BoardModel, MergeError, Token};
use crate::coords::{GridPos, Point};
use crate::entity;
use crate::image::ImageLoader;
use crate::remote::RemoteBoardDiff;

/// Which updates a listener wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateChannel {
    /// Only locally-originated changes. Transport forwarding hangs here.
    Local,
    /// Every change, local or remote. Rendering hangs here.
    All,
}

/// A model update callback bound to one channel.
pub struct UpdateListener {
    channel: UpdateChannel,
    callback: Box<dyn FnMut(&BoardModel, &BoardDiff)>,
}

impl UpdateListener {
    /// Listener invoked for every update.
    pub fn for_all(callback: impl FnMut(&BoardModel, &BoardDiff) + 'static) -> Self {
        Self { channel: UpdateChannel::All, callback: Box::new(callback) }
    }

    /// Listener invoked only for locally-originated updates.
    pub fn for_local(callback: impl FnMut(&BoardModel, &BoardDiff) + 'static) -> Self {
        Self { channel: UpdateChannel::Local, callback: Box::new(callback) }
    }
}

/// Owns the current [`BoardModel`] and the listener registry.
pub struct ModelHandler<L: ImageLoader> {
    loader: L,
    model: BoardModel,
    listeners: Vec<UpdateListener>,
    /// Top-left corner of the board view in client pixel space.
    view_origin: Point,
}

impl<L: ImageLoader> ModelHandler<L> {
    pub fn new(loader: L, model: BoardModel) -> Self {
        Self {
            loader,
            model,
            listeners: Vec::new(),
            view_origin: Point::default(),
        }
    }

    /// Record where the embedding view places the board, so client pixel
    /// coordinates can be projected onto the grid. The view calls this on
    /// mount and whenever its bounding box moves.
    pub fn set_view_origin(&mut self, origin: Point) {
        self.view_origin = origin;
    }

    /// The current model.
    #[must_use]
    pub fn model(&self) -> &BoardModel {
        &self.model
    }

    /// Register listeners, invoking each once with `(current_model, empty)`
    /// so every listener observes a consistent baseline immediately.
    pub fn add_listeners(&mut self, listeners: Vec<UpdateListener>) {
        let baseline = BoardDiff::default();
        for mut listener in listeners {
            (listener.callback)(&self.model, &baseline);
            self.listeners.push(listener);
        }
    }

    /// Drop every registered listener.
    pub fn clear_listeners(&mut self) {
        self.listeners.clear();
    }

    /// Merge a locally-originated diff and notify both channels.
    ///
    /// # Errors
    ///
    /// Propagates [`MergeError`]; the current model is unchanged on error.
    pub async fn apply_local_diff(&mut self, diff: BoardDiff) -> Result<(), MergeError> {
        self.model = self.model.merged_with(&self.loader, &diff).await?;
        self.notify(&diff, true);
        Ok(())
    }

    /// Merge an inbound remote diff and notify only the all channel.
    ///
    /// The remote diff's token diffs are lifted into the outer channel via
    /// [`BoardDiff::from_remote`] before merging.
    ///
    /// # Errors
    ///
    /// Propagates [`MergeError`]; the current model is unchanged on error.
    pub async fn apply_remote_diff(&mut self, diff: RemoteBoardDiff) -> Result<(), MergeError> {
        let diff = BoardDiff::from_remote(diff);
        self.model = self.model.merged_with(&self.loader, &diff).await?;
        self.notify(&diff, false);
        Ok(())
    }

    /// Upsert a completed token form onto the board.
    ///
    /// # Errors
    ///
    /// Propagates [`MergeError`] from the merge.
    pub async fn add_new_token(&mut self, token: &Token) -> Result<(), MergeError> {
        let diff = entity::add_new_token(&self.model, token);
        self.apply_local_diff(diff).await
    }

    /// Project a client pixel to a grid cell.
    ///
    /// Subtracts the view origin, divides out the zoom scale, then
    /// compensates for a positive sub-tile grid offset on each axis before
    /// the integer division by tile size. Points outside the board yield
    /// out-of-bounds cells.
    #[must_use]
    pub fn tile_for_point(&self, point: Point) -> GridPos {
        let tile_size = self.model.inner.tile_size;
        let offset = self.model.inner.grid_offset;
        let mut base_x = (point.x - self.view_origin.x) / self.model.scale;
        let mut base_y = (point.y - self.view_origin.y) / self.model.scale;
        if offset.x > 0.0 {
            base_x += tile_size - offset.x;
        }
        if offset.y > 0.0 {
            base_y += tile_size - offset.y;
        }
        #[allow(clippy::cast_possible_truncation)]
        let col = (base_x / tile_size).floor() as i32;
        #[allow(clippy::cast_possible_truncation)]
        let row = (base_y / tile_size).floor() as i32;
        GridPos::new(col, row)
    }

    fn notify(&mut self, diff: &BoardDiff, local_origin: bool) {
        for listener in &mut self.listeners {
            if listener.channel == UpdateChannel::All || local_origin {
                (listener.callback)(&self.model, diff);
            }
        }
    }
}
