//! Shared board and token snapshots and their diff algebra.
//!
//! These types are the canonical, network-transmissible game state. Every
//! mutation is expressed as a sparse diff naming only the fields and cells
//! that changed; applying a diff always produces a new snapshot and never
//! mutates the old one. Payloads arriving from the network or storage go
//! through [`RemoteBoardModel::parse`] before they are trusted: validation,
//! then a single defaulting pass, then rejection.
//!
//! ERROR HANDLING
//! ==============
//! Computing or applying a diff against the wrong board is a caller bug and
//! returns an error. A stale token diff whose id matches no surviving token
//! is expected under concurrent edits and is logged and ignored.

#[cfg(test)]
#[path = "remote_test.rs"]
mod remote_test;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;
use uuid::Uuid;

use crate::coords::{GridPos, Point};
use crate::grid::{FogState, Highlight, create_grid, is_grid};

const DEFAULT_SPEED: i32 = 6;

/// Errors from the diff algebra. All variants signal caller corruption.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// A board diff was computed or applied across two different boards.
    #[error("board diff id {diff_id} does not match board {board_id}")]
    BoardIdMismatch { board_id: String, diff_id: String },
    /// A token diff was computed between two different tokens.
    #[error("token diff computed between different tokens: {left} vs {right}")]
    TokenIdMismatch { left: String, right: String },
}

/// Errors from the validation boundary for untrusted payloads.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// The payload did not deserialize into the expected shape.
    #[error("payload shape is invalid: {0}")]
    Shape(#[from] serde_json::Error),
    /// The payload is missing `cols`/`rows`, so grids cannot be defaulted.
    #[error("rows and cols are required")]
    MissingDimensions,
    /// The payload deserialized but violates a model invariant.
    #[error("invalid board payload: {0}")]
    Invalid(&'static str),
}

/// A token as shared across clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTokenModel {
    /// Unique id within the board.
    pub id: String,
    /// Top-left cell the token occupies.
    pub location: GridPos,
    pub name: String,
    pub image_source: String,
    /// Token extent in tiles; tokens are square.
    pub size: i32,
    /// Movement speed in tiles.
    pub speed: i32,
}

impl RemoteTokenModel {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.size <= 0 {
            return Err(ValidationError::Invalid("token size must be positive"));
        }
        if self.speed <= 0 {
            return Err(ValidationError::Invalid("token speed must be positive"));
        }
        Ok(())
    }

    /// Apply a sparse diff, producing a new token.
    ///
    /// A diff carrying a different id is a stale merge artifact: it is logged
    /// and the token is returned unchanged.
    #[must_use]
    pub fn merged_with(&self, diff: &RemoteTokenDiff) -> Self {
        if diff.id != self.id {
            warn!(token_id = %self.id, diff_id = %diff.id, "token diff id mismatch; ignoring");
            return self.clone();
        }
        Self {
            id: self.id.clone(),
            location: diff.location.unwrap_or(self.location),
            name: diff.name.clone().unwrap_or_else(|| self.name.clone()),
            image_source: diff
                .image_source
                .clone()
                .unwrap_or_else(|| self.image_source.clone()),
            size: diff.size.unwrap_or(self.size),
            speed: diff.speed.unwrap_or(self.speed),
        }
    }

    /// Per-field diff from `old` to `new`.
    ///
    /// # Errors
    ///
    /// Returns [`DiffError::TokenIdMismatch`] when the two tokens are not the
    /// same entity.
    pub fn compute_diff(new: &Self, old: &Self) -> Result<RemoteTokenDiff, DiffError> {
        if new.id != old.id {
            return Err(DiffError::TokenIdMismatch {
                left: new.id.clone(),
                right: old.id.clone(),
            });
        }
        Ok(RemoteTokenDiff {
            id: new.id.clone(),
            location: (new.location != old.location).then_some(new.location),
            name: (new.name != old.name).then(|| new.name.clone()),
            image_source: (new.image_source != old.image_source)
                .then(|| new.image_source.clone()),
            size: (new.size != old.size).then_some(new.size),
            speed: (new.speed != old.speed).then_some(new.speed),
        })
    }
}

/// Sparse update for a single token. Only present fields are applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTokenDiff {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GridPos>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<i32>,
}

impl RemoteTokenDiff {
    /// An empty diff targeting the given token.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            location: None,
            name: None,
            image_source: None,
            size: None,
            speed: None,
        }
    }
}

/// A single fog-of-war cell update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FogOfWarDiff {
    pub col: usize,
    pub row: usize,
    pub is_fog_on: bool,
}

/// A single highlight overlay cell update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSelectionDiff {
    pub col: usize,
    pub row: usize,
    pub value: Highlight,
}

/// The board as shared across clients.
///
/// `fog_of_war` and `public_selection` are always exactly `cols x rows`;
/// a resize replaces them with freshly-initialized grids, never resampled
/// ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteBoardModel {
    pub id: String,
    pub name: String,
    /// Background image the grid is laid over.
    pub image_source: String,
    /// Edge length of one tile, in background pixels.
    pub tile_size: f64,
    /// Background size in pixels.
    pub width: f64,
    pub height: f64,
    /// Sub-tile shift of the visible grid, in pixels per axis.
    pub grid_offset: Point,
    pub tokens: Vec<RemoteTokenModel>,
    pub fog_of_war: Vec<Vec<FogState>>,
    pub public_selection: Vec<Vec<Highlight>>,
    pub cols: usize,
    pub rows: usize,
}

impl RemoteBoardModel {
    /// Author a fresh board over a background of the given pixel size.
    ///
    /// Grid dimensions are the ceiling division of the background size by
    /// `tile_size`; all grids start empty. `tile_size` must be positive,
    /// which [`crate::board::BoardModel::create_new`] enforces.
    #[must_use]
    pub fn create(
        name: impl Into<String>,
        image_source: impl Into<String>,
        width: f64,
        height: f64,
        tile_size: f64,
    ) -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let cols = (width / tile_size).ceil() as usize;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let rows = (height / tile_size).ceil() as usize;
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            image_source: image_source.into(),
            tile_size,
            width,
            height,
            grid_offset: Point::default(),
            tokens: Vec::new(),
            fog_of_war: create_grid(cols, rows, FogState::Clear),
            public_selection: create_grid(cols, rows, Highlight::None),
            cols,
            rows,
        }
    }

    /// Validate and accept an untrusted payload from network or storage.
    ///
    /// If the raw payload fails validation, one defaulting pass repairs
    /// legacy encodings and missing optional fields, then validation runs
    /// again. A payload still invalid after that is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the payload cannot be repaired.
    pub fn parse(raw: Value) -> Result<Self, ValidationError> {
        match Self::try_parse(raw.clone()) {
            Ok(model) => Ok(model),
            Err(_) => Self::try_parse(fill_defaults(raw)?),
        }
    }

    fn try_parse(raw: Value) -> Result<Self, ValidationError> {
        let model: Self = serde_json::from_value(raw)?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.tile_size <= 0.0 {
            return Err(ValidationError::Invalid("tile size must be positive"));
        }
        if !is_grid(&self.fog_of_war, self.cols, self.rows) {
            return Err(ValidationError::Invalid("fog grid has wrong dimensions"));
        }
        if !is_grid(&self.public_selection, self.cols, self.rows) {
            return Err(ValidationError::Invalid(
                "public selection grid has wrong dimensions",
            ));
        }
        for token in &self.tokens {
            token.validate()?;
        }
        Ok(())
    }

    /// Apply a board diff, producing a new snapshot.
    ///
    /// Tokens: `new_tokens` are prepended, removed ids are dropped, and each
    /// surviving token's per-field diff (matched by id) is applied. Grid
    /// diffs overlay onto copies of the existing grids unless the diff
    /// resizes the board, in which case both grids are freshly initialized.
    ///
    /// # Errors
    ///
    /// Returns [`DiffError::BoardIdMismatch`] when the diff targets another
    /// board.
    pub fn merged_with(&self, diff: &RemoteBoardDiff) -> Result<Self, DiffError> {
        if self.id != diff.id {
            return Err(DiffError::BoardIdMismatch {
                board_id: self.id.clone(),
                diff_id: diff.id.clone(),
            });
        }

        let mut tokens = diff.new_tokens.clone();
        for token in &self.tokens {
            if diff.removed_tokens.contains(&token.id) {
                continue;
            }
            let mut merged = token.clone();
            for token_diff in &diff.token_diffs {
                if token_diff.id == token.id {
                    merged = merged.merged_with(token_diff);
                    break;
                }
            }
            tokens.push(merged);
        }

        let cols = diff.cols.unwrap_or(self.cols);
        let rows = diff.rows.unwrap_or(self.rows);
        let (fog_of_war, public_selection) = if cols == self.cols && rows == self.rows {
            let mut fog = self.fog_of_war.clone();
            for d in &diff.fog_of_war_diffs {
                if d.col >= cols || d.row >= rows {
                    warn!(col = d.col, row = d.row, "fog diff outside grid; ignoring");
                    continue;
                }
                fog[d.col][d.row] = if d.is_fog_on { FogState::Hidden } else { FogState::Clear };
            }
            let mut selection = self.public_selection.clone();
            for d in &diff.public_selection_diffs {
                if d.col >= cols || d.row >= rows {
                    warn!(col = d.col, row = d.row, "selection diff outside grid; ignoring");
                    continue;
                }
                selection[d.col][d.row] = d.value;
            }
            (fog, selection)
        } else {
            (
                create_grid(cols, rows, FogState::Clear),
                create_grid(cols, rows, Highlight::None),
            )
        };

        Ok(Self {
            id: self.id.clone(),
            name: diff.name.clone().unwrap_or_else(|| self.name.clone()),
            image_source: diff
                .image_source
                .clone()
                .unwrap_or_else(|| self.image_source.clone()),
            tile_size: diff.tile_size.unwrap_or(self.tile_size),
            width: diff.width.unwrap_or(self.width),
            height: diff.height.unwrap_or(self.height),
            grid_offset: diff.grid_offset.unwrap_or(self.grid_offset),
            tokens,
            fog_of_war,
            public_selection,
            cols,
            rows,
        })
    }
}

/// Sparse update for a whole board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteBoardDiff {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tile_size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid_offset: Option<Point>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cols: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub new_tokens: Vec<RemoteTokenModel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed_tokens: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub token_diffs: Vec<RemoteTokenDiff>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fog_of_war_diffs: Vec<FogOfWarDiff>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub public_selection_diffs: Vec<PublicSelectionDiff>,
}

impl RemoteBoardDiff {
    /// An empty diff targeting the given board.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            image_source: None,
            tile_size: None,
            width: None,
            height: None,
            grid_offset: None,
            cols: None,
            rows: None,
            new_tokens: Vec::new(),
            removed_tokens: Vec::new(),
            token_diffs: Vec::new(),
            fog_of_war_diffs: Vec::new(),
            public_selection_diffs: Vec::new(),
        }
    }

    /// Whether the diff changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.image_source.is_none()
            && self.tile_size.is_none()
            && self.width.is_none()
            && self.height.is_none()
            && self.grid_offset.is_none()
            && self.cols.is_none()
            && self.rows.is_none()
            && self.new_tokens.is_empty()
            && self.removed_tokens.is_empty()
            && self.token_diffs.is_empty()
            && self.fog_of_war_diffs.is_empty()
            && self.public_selection_diffs.is_empty()
    }

    /// Validate an untrusted diff payload from the transport.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] for malformed shapes or invalid tokens.
    pub fn parse(raw: Value) -> Result<Self, ValidationError> {
        let diff: Self = serde_json::from_value(raw)?;
        if diff.id.is_empty() {
            return Err(ValidationError::Invalid("diff id must not be empty"));
        }
        for token_diff in &diff.token_diffs {
            if token_diff.id.is_empty() {
                return Err(ValidationError::Invalid("token diff id must not be empty"));
            }
        }
        for token in &diff.new_tokens {
            token.validate()?;
        }
        Ok(diff)
    }

    /// Sparse diff turning `old` into `new`, or `None` when nothing differs.
    ///
    /// Grid diffs are computed cell-by-cell only when the background image
    /// and the grid dimensions are unchanged; a background swap invalidates
    /// cell identity and callers must resend full grids instead.
    ///
    /// # Errors
    ///
    /// Returns [`DiffError::BoardIdMismatch`] when the snapshots belong to
    /// different boards.
    pub fn compute_between(
        new: &RemoteBoardModel,
        old: &RemoteBoardModel,
    ) -> Result<Option<Self>, DiffError> {
        if new.id != old.id {
            return Err(DiffError::BoardIdMismatch {
                board_id: old.id.clone(),
                diff_id: new.id.clone(),
            });
        }

        let mut new_tokens = Vec::new();
        let mut token_diffs = Vec::new();
        for new_token in &new.tokens {
            match old.tokens.iter().find(|t| t.id == new_token.id) {
                Some(old_token) => {
                    if new_token != old_token {
                        token_diffs.push(RemoteTokenModel::compute_diff(new_token, old_token)?);
                    }
                }
                None => new_tokens.push(new_token.clone()),
            }
        }
        let removed_tokens: Vec<String> = old
            .tokens
            .iter()
            .filter(|old_token| !new.tokens.iter().any(|t| t.id == old_token.id))
            .map(|t| t.id.clone())
            .collect();

        let mut fog_of_war_diffs = Vec::new();
        let mut public_selection_diffs = Vec::new();
        let same_dimensions = new.cols == old.cols && new.rows == old.rows;
        if new.image_source == old.image_source && same_dimensions {
            for col in 0..new.cols {
                for row in 0..new.rows {
                    let fog = new.fog_of_war[col][row];
                    if old.fog_of_war[col][row] != fog {
                        fog_of_war_diffs.push(FogOfWarDiff {
                            col,
                            row,
                            is_fog_on: fog.is_fogged(),
                        });
                    }
                    let selection = new.public_selection[col][row];
                    if old.public_selection[col][row] != selection {
                        public_selection_diffs.push(PublicSelectionDiff {
                            col,
                            row,
                            value: selection,
                        });
                    }
                }
            }
        } else {
            warn!(board_id = %new.id, "background or grid size changed; skipping grid diffs");
        }

        let diff = Self {
            id: new.id.clone(),
            name: (new.name != old.name).then(|| new.name.clone()),
            image_source: (new.image_source != old.image_source)
                .then(|| new.image_source.clone()),
            tile_size: (new.tile_size != old.tile_size).then_some(new.tile_size),
            width: (new.width != old.width).then_some(new.width),
            height: (new.height != old.height).then_some(new.height),
            grid_offset: (new.grid_offset != old.grid_offset).then_some(new.grid_offset),
            cols: (new.cols != old.cols).then_some(new.cols),
            rows: (new.rows != old.rows).then_some(new.rows),
            new_tokens,
            removed_tokens,
            token_diffs,
            fog_of_war_diffs,
            public_selection_diffs,
        };
        Ok((!diff.is_empty()).then_some(diff))
    }
}

/// One-shot repair pass for legacy and partially-specified board payloads.
fn fill_defaults(mut raw: Value) -> Result<Value, ValidationError> {
    let Some(board) = raw.as_object_mut() else {
        return Err(ValidationError::Invalid("board payload is not an object"));
    };
    let cols = board
        .get("cols")
        .and_then(Value::as_u64)
        .ok_or(ValidationError::MissingDimensions)?;
    let rows = board
        .get("rows")
        .and_then(Value::as_u64)
        .ok_or(ValidationError::MissingDimensions)?;

    let tokens = board.entry("tokens").or_insert_with(|| json!([]));
    if let Some(tokens) = tokens.as_array_mut() {
        for token in tokens {
            if let Some(token) = token.as_object_mut() {
                token.entry("speed").or_insert_with(|| json!(DEFAULT_SPEED));
            }
        }
    }
    board
        .entry("gridOffset")
        .or_insert_with(|| json!({"x": 0.0, "y": 0.0}));

    if let Some(tile_size) = board.get("tileSize").and_then(Value::as_f64) {
        #[allow(clippy::cast_precision_loss)]
        let (full_width, full_height) = (cols as f64 * tile_size, rows as f64 * tile_size);
        board.entry("width").or_insert_with(|| json!(full_width));
        board.entry("height").or_insert_with(|| json!(full_height));
    }

    let fog_usable = board
        .get("fogOfWar")
        .is_some_and(|v| value_is_grid(v, cols, rows));
    if fog_usable {
        repair_legacy_fog(&mut board["fogOfWar"]);
    } else {
        board.insert("fogOfWar".into(), json_grid(cols, rows, "0"));
    }

    let selection_usable = board
        .get("publicSelection")
        .is_some_and(|v| value_is_grid(v, cols, rows));
    if !selection_usable {
        board.insert("publicSelection".into(), json_grid(cols, rows, "0"));
    }

    Ok(raw)
}

/// Map pre-tri-state fog encodings onto the current one.
fn repair_legacy_fog(fog: &mut Value) {
    let Some(columns) = fog.as_array_mut() else {
        return;
    };
    for column in columns {
        let Some(cells) = column.as_array_mut() else {
            continue;
        };
        for cell in cells {
            match cell.as_str() {
                Some("0" | "1" | "2") => {}
                Some("True") => *cell = json!("1"),
                _ => *cell = json!("0"),
            }
        }
    }
}

fn value_is_grid(value: &Value, cols: u64, rows: u64) -> bool {
    let Some(columns) = value.as_array() else {
        return false;
    };
    columns.len() as u64 == cols
        && columns
            .iter()
            .all(|col| col.as_array().is_some_and(|c| c.len() as u64 == rows))
}

fn json_grid(cols: u64, rows: u64, cell: &str) -> Value {
    let column: Vec<Value> = (0..rows).map(|_| json!(cell)).collect();
    Value::Array((0..cols).map(|_| Value::Array(column.clone())).collect())
}
