//! Local board model: a shared snapshot plus client-only ephemeral state.
//!
//! [`BoardModel`] layers UI state that never crosses the wire (context menu,
//! local tile selection, peeked fog cells, zoom scale, the picked-up token
//! flag) over one [`RemoteBoardModel`]. [`BoardDiff`] is the unified diff
//! shape for both layers; its embedded remote diff must never carry token
//! diffs, because token updates travel in the outer `token_diffs` list where
//! the local `is_active` flag can ride alongside them.
//!
//! Merging is async end-to-end: a diff that introduces an unresolved image
//! source suspends until the host loader resolves it, and a failed load
//! aborts the merge leaving the prior model untouched.

#[cfg(test)]
#[path = "board_test.rs"]
mod board_test;

use std::collections::HashMap;

use tracing::warn;
use uuid::Uuid;

use crate::coords::{Area, GridPos, Point};
use crate::grid::create_grid;
use crate::image::{ImageError, ImageLoader, LoadedImage, load_images};
use crate::remote::{DiffError, RemoteBoardDiff, RemoteBoardModel, RemoteTokenDiff, RemoteTokenModel};

/// Errors from local merge and construction.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// The embedded remote diff carried token diffs; those must travel in
    /// the outer `token_diffs` channel.
    #[error("inner diff of a board diff cannot carry token diffs")]
    TokenDiffsInInner,
    #[error("invalid tile size: {0}")]
    InvalidTileSize(f64),
    #[error(transparent)]
    Diff(#[from] DiffError),
    #[error(transparent)]
    Image(#[from] ImageError),
}

/// Context menu visibility and anchor, local to this client.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextMenuState {
    pub is_visible: bool,
    pub click_point: Point,
}

impl Default for ContextMenuState {
    fn default() -> Self {
        Self { is_visible: false, click_point: Point::default() }
    }
}

impl ContextMenuState {
    /// Menu open at the given page point.
    #[must_use]
    pub fn open_at(click_point: Point) -> Self {
        Self { is_visible: true, click_point }
    }

    /// Menu closed, anchored where it was last dismissed.
    #[must_use]
    pub fn closed_at(click_point: Point) -> Self {
        Self { is_visible: false, click_point }
    }
}

/// A token plus its client-only picked-up flag.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub inner: RemoteTokenModel,
    /// Whether this client currently has the token picked up. Never shared.
    pub is_active: bool,
}

impl Token {
    #[must_use]
    pub fn from_remote(inner: RemoteTokenModel) -> Self {
        Self { inner, is_active: false }
    }

    /// A copy of this token with a fresh id at the given location.
    #[must_use]
    pub fn duplicate_at(&self, location: GridPos) -> Self {
        Self {
            inner: RemoteTokenModel {
                id: Uuid::new_v4().to_string(),
                location,
                name: self.inner.name.clone(),
                image_source: self.inner.image_source.clone(),
                size: self.inner.size,
                speed: self.inner.speed,
            },
            is_active: false,
        }
    }

    /// Apply a token diff, producing a new token.
    #[must_use]
    pub fn merged_with(&self, diff: &TokenDiff) -> Self {
        let inner = match &diff.inner {
            Some(remote_diff) => self.inner.merged_with(remote_diff),
            None => self.inner.clone(),
        };
        Self { inner, is_active: diff.is_active.unwrap_or(self.is_active) }
    }
}

/// Sparse update for one token: the shared fields plus the local flag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenDiff {
    pub inner: Option<RemoteTokenDiff>,
    pub is_active: Option<bool>,
}

impl TokenDiff {
    /// Id of the token this diff targets, when it names one.
    #[must_use]
    pub fn target_id(&self) -> Option<&str> {
        self.inner.as_ref().map(|d| d.id.as_str())
    }
}

/// A rectangular update to the local peeked-fog overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeekDiff {
    pub area: Area,
    pub is_peeked: bool,
}

/// Unified diff over a [`BoardModel`]: the embedded remote-shaped portion
/// plus every local-only channel. Only present fields are applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardDiff {
    /// Remote-shaped changes. Must not carry token diffs; see [`BoardDiff::from_remote`].
    pub inner: Option<RemoteBoardDiff>,
    pub token_diffs: Vec<TokenDiff>,
    pub peek_diff: Option<PeekDiff>,
    pub scale: Option<f64>,
    /// `Some(None)` clears the selection; `None` leaves it untouched.
    pub local_selection: Option<Option<Area>>,
    pub context_menu_state: Option<ContextMenuState>,
}

impl BoardDiff {
    /// Wrap an inbound remote diff, lifting its token diffs into the outer
    /// channel so local token state can merge alongside them.
    #[must_use]
    pub fn from_remote(diff: RemoteBoardDiff) -> Self {
        let mut inner = diff;
        let token_diffs = std::mem::take(&mut inner.token_diffs)
            .into_iter()
            .map(|remote_diff| TokenDiff { inner: Some(remote_diff), is_active: None })
            .collect();
        Self { inner: Some(inner), token_diffs, ..Self::default() }
    }

    /// The remote-shaped portion of this diff, with outer token diffs folded
    /// back in, or `None` when nothing needs forwarding to other clients.
    #[must_use]
    pub fn extract_remote(&self, board_id: &str) -> Option<RemoteBoardDiff> {
        let mut remote = self
            .inner
            .clone()
            .unwrap_or_else(|| RemoteBoardDiff::new(board_id));
        for token_diff in &self.token_diffs {
            if let Some(inner) = &token_diff.inner {
                remote.token_diffs.push(inner.clone());
            }
        }
        (!remote.is_empty()).then_some(remote)
    }
}

/// The board as this client sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardModel {
    /// The shared snapshot. Its token list mirrors `tokens`.
    pub inner: RemoteBoardModel,
    pub background_image: LoadedImage,
    /// Resolved art for every token image source on the board.
    pub token_images: HashMap<String, LoadedImage>,
    pub tokens: Vec<Token>,
    /// Which fogged cells this client has peeked open. Always `cols x rows`.
    pub peeked_tiles: Vec<Vec<bool>>,
    pub scale: f64,
    pub local_selection: Option<Area>,
    pub context_menu_state: ContextMenuState,
}

impl BoardModel {
    /// Author a fresh board from an already-loaded background image.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::InvalidTileSize`] for a non-positive tile size.
    pub fn create_new(
        name: impl Into<String>,
        image: LoadedImage,
        tile_size: f64,
    ) -> Result<Self, MergeError> {
        if tile_size <= 0.0 {
            return Err(MergeError::InvalidTileSize(tile_size));
        }
        let inner = RemoteBoardModel::create(
            name,
            image.source.clone(),
            f64::from(image.width),
            f64::from(image.height),
            tile_size,
        );
        let peeked_tiles = create_grid(inner.cols, inner.rows, false);
        Ok(Self {
            inner,
            background_image: image,
            token_images: HashMap::new(),
            tokens: Vec::new(),
            peeked_tiles,
            scale: 1.0,
            local_selection: None,
            context_menu_state: ContextMenuState::default(),
        })
    }

    /// Construct from a validated remote snapshot, loading the background
    /// and every distinct token image before the model exists.
    ///
    /// # Errors
    ///
    /// Any failed required load aborts construction; a partially-loaded
    /// board is never exposed.
    pub async fn create_from_remote<L: ImageLoader>(
        loader: &L,
        inner: RemoteBoardModel,
    ) -> Result<Self, MergeError> {
        let background_image = loader.load_image(&inner.image_source).await?;
        let sources: Vec<String> = inner
            .tokens
            .iter()
            .map(|t| t.image_source.clone())
            .collect();
        let token_images = load_images(loader, &sources).await?;
        let tokens = inner.tokens.iter().cloned().map(Token::from_remote).collect();
        let peeked_tiles = create_grid(inner.cols, inner.rows, false);
        Ok(Self {
            inner,
            background_image,
            token_images,
            tokens,
            peeked_tiles,
            scale: 1.0,
            local_selection: None,
            context_menu_state: ContextMenuState::default(),
        })
    }

    /// The shared portion of this model, for forwarding or persistence.
    #[must_use]
    pub fn to_remote(&self) -> RemoteBoardModel {
        self.inner.clone()
    }

    /// Apply a unified diff, producing a new model.
    ///
    /// Suspends on image resolution when the diff introduces sources this
    /// model has not loaded yet. The receiver is left untouched either way.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::TokenDiffsInInner`] when the embedded remote
    /// diff smuggles token diffs, a [`DiffError`] for a board id mismatch,
    /// or an [`ImageError`] when a required load fails.
    pub async fn merged_with<L: ImageLoader>(
        &self,
        loader: &L,
        diff: &BoardDiff,
    ) -> Result<Self, MergeError> {
        if let Some(inner_diff) = &diff.inner {
            if !inner_diff.token_diffs.is_empty() {
                return Err(MergeError::TokenDiffsInInner);
            }
        }
        let mut inner = match &diff.inner {
            Some(inner_diff) => self.inner.merged_with(inner_diff)?,
            None => self.inner.clone(),
        };

        // Carry each surviving token's local flag, then apply outer diffs.
        let mut tokens: Vec<Token> = inner
            .tokens
            .iter()
            .map(|remote| match self.tokens.iter().find(|t| t.inner.id == remote.id) {
                Some(prev) => Token { inner: remote.clone(), is_active: prev.is_active },
                None => Token::from_remote(remote.clone()),
            })
            .collect();
        for token_diff in &diff.token_diffs {
            let Some(id) = token_diff.target_id() else {
                warn!("token diff without a target id; ignoring");
                continue;
            };
            match tokens.iter_mut().find(|t| t.inner.id == id) {
                Some(token) => *token = token.merged_with(token_diff),
                None => {
                    warn!(token_id = %id, "token diff matches no token; ignoring");
                    continue;
                }
            }
            // At most one token is ever picked up; activating one puts
            // every other token down.
            if token_diff.is_active == Some(true) {
                for token in tokens.iter_mut().filter(|t| t.inner.id != id) {
                    token.is_active = false;
                }
            }
        }
        inner.tokens = tokens.iter().map(|t| t.inner.clone()).collect();

        let peeked_tiles = self.merge_peeked_tiles(&inner, diff);
        let token_images = self.merge_token_images(loader, &inner).await?;
        let background_image = if inner.image_source == self.background_image.source {
            self.background_image.clone()
        } else {
            loader.load_image(&inner.image_source).await?
        };

        Ok(Self {
            inner,
            background_image,
            token_images,
            tokens,
            peeked_tiles,
            scale: diff.scale.unwrap_or(self.scale),
            local_selection: match diff.local_selection {
                Some(selection) => selection,
                None => self.local_selection,
            },
            context_menu_state: diff
                .context_menu_state
                .clone()
                .unwrap_or_else(|| self.context_menu_state.clone()),
        })
    }

    /// New peeked overlay: fresh on resize, otherwise a copy with the fog
    /// and peek updates overlaid. Peeking applies only to fogged cells, and
    /// any cell whose fog changed loses its peek flag.
    fn merge_peeked_tiles(&self, inner: &RemoteBoardModel, diff: &BoardDiff) -> Vec<Vec<bool>> {
        let resized = inner.cols != self.inner.cols || inner.rows != self.inner.rows;
        let mut peeked = if resized {
            create_grid(inner.cols, inner.rows, false)
        } else {
            self.peeked_tiles.clone()
        };
        if !resized {
            if let Some(inner_diff) = &diff.inner {
                for d in &inner_diff.fog_of_war_diffs {
                    if d.col < inner.cols && d.row < inner.rows {
                        peeked[d.col][d.row] = false;
                    }
                }
            }
        }
        if let Some(peek) = &diff.peek_diff {
            for tile in peek.area.tiles() {
                if tile.col < 0 || tile.row < 0 {
                    continue;
                }
                #[allow(clippy::cast_sign_loss)]
                let (col, row) = (tile.col as usize, tile.row as usize);
                if col >= inner.cols || row >= inner.rows {
                    continue;
                }
                if peek.is_peeked {
                    if inner.fog_of_war[col][row].is_fogged() {
                        peeked[col][row] = true;
                    }
                } else {
                    peeked[col][row] = false;
                }
            }
        }
        peeked
    }

    async fn merge_token_images<L: ImageLoader>(
        &self,
        loader: &L,
        inner: &RemoteBoardModel,
    ) -> Result<HashMap<String, LoadedImage>, MergeError> {
        let mut token_images = self.token_images.clone();
        let missing: Vec<String> = inner
            .tokens
            .iter()
            .map(|t| t.image_source.clone())
            .filter(|source| !token_images.contains_key(source))
            .collect();
        if !missing.is_empty() {
            token_images.extend(load_images(loader, &missing).await?);
        }
        Ok(token_images)
    }
}
