//! Pointer gesture state machine and context menu actions.
//!
//! Raw pointer gestures are ambiguous: the same button press can pick up a
//! token, open the context menu, or drop a token depending on what the
//! machine is tracking. [`transition`] resolves that as a pure function of
//! `(state, gesture, model)` returning the diff to apply and the next
//! state; [`InteractionStateMachine`] is the thin stateful wrapper that
//! feeds the diff through a [`ModelHandler`]. A gesture is a click when its
//! start and end resolve to the same tile, otherwise a drag, and the same
//! left/right x click/drag dispatch applies in every state.

#[cfg(test)]
#[path = "interaction_test.rs"]
mod interaction_test;

use tracing::warn;

use crate::board::{BoardDiff, BoardModel, ContextMenuState, MergeError, PeekDiff, Token, TokenDiff};
use crate::coords::{Area, GridPos, Point};
use crate::entity;
use crate::grid::Highlight;
use crate::handler::ModelHandler;
use crate::image::ImageLoader;
use crate::remote::{FogOfWarDiff, PublicSelectionDiff, RemoteBoardDiff, RemoteTokenDiff};

/// Mouse button of a pointer gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    /// Left mouse button.
    Primary,
    /// Middle mouse button; always a no-op.
    Middle,
    /// Right mouse button.
    Secondary,
}

/// A raw pointer position: canvas-relative pixel plus the page pixel used
/// to anchor the context menu.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerInput {
    pub client: Point,
    pub page: Point,
}

/// A pointer position resolved to a grid cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickData {
    pub page: Point,
    pub tile: GridPos,
}

/// What the machine is currently tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InteractionState {
    /// No gesture context; waiting for the next click.
    #[default]
    Default,
    /// Exactly one token has its local active flag set.
    PickedUpToken,
    /// The context menu is showing over the local selection.
    ContextMenuOpen,
}

/// An activated context menu item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextAction {
    AddFog,
    ClearFog,
    PeekFog,
    UnpeekFog,
    ClearHighlight,
    HighlightBlue,
    HighlightOrange,
    HighlightGreen,
    AddToken,
    EditToken,
    CopyToken,
    ZoomIn,
    ZoomOut,
}

/// A request for an external form collaborator. The form later completes
/// by calling back with a full token; the machine never mutates the model
/// for these actions itself.
#[derive(Debug, Clone, PartialEq)]
pub enum FormRequest {
    NewToken { tile: GridPos },
    EditToken { token: Token },
}

/// Result of one pure transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub diff: BoardDiff,
    pub next: InteractionState,
    pub form_request: Option<FormRequest>,
}

impl Transition {
    fn stay(state: InteractionState) -> Self {
        Self { diff: BoardDiff::default(), next: state, form_request: None }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InteractionError {
    /// The machine was in the picked-up state with no active token. This is
    /// an internal invariant violation, never a recoverable input.
    #[error("no active token while a token is picked up")]
    NoActiveToken,
    /// A menu item was activated while the menu was closed.
    #[error("context menu selection while the menu is closed")]
    MenuNotOpen,
    #[error(transparent)]
    Merge(#[from] MergeError),
}

/// Pure gesture dispatch: `(state, gesture, model) -> (diff, next state)`.
///
/// # Errors
///
/// Returns [`InteractionError::NoActiveToken`] when the picked-up state
/// finds no active token.
pub fn transition(
    state: InteractionState,
    model: &BoardModel,
    from: &ClickData,
    to: &ClickData,
    button: Button,
) -> Result<Transition, InteractionError> {
    if button == Button::Middle {
        return Ok(Transition::stay(state));
    }
    let is_click = from.tile == to.tile;
    match state {
        InteractionState::Default => Ok(on_default(model, from, to, button, is_click)),
        InteractionState::PickedUpToken => on_picked_up(model, to, button, is_click),
        InteractionState::ContextMenuOpen => Ok(close_menu(to.page)),
    }
}

/// Pure menu dispatch for the open-menu state. The action runs against the
/// current local selection, then the menu always closes.
///
/// # Errors
///
/// Returns [`InteractionError::MenuNotOpen`] outside the open-menu state.
pub fn menu_selection(
    state: InteractionState,
    model: &BoardModel,
    action: ContextAction,
) -> Result<Transition, InteractionError> {
    if state != InteractionState::ContextMenuOpen {
        return Err(InteractionError::MenuNotOpen);
    }
    let (mut diff, form_request) = context_action_diff(model, action);
    diff.context_menu_state = Some(ContextMenuState::default());
    diff.local_selection = Some(None);
    Ok(Transition { diff, next: InteractionState::Default, form_request })
}

fn on_default(
    model: &BoardModel,
    from: &ClickData,
    to: &ClickData,
    button: Button,
    is_click: bool,
) -> Transition {
    if button == Button::Primary && is_click {
        if let Some(index) = entity::token_at(model, from.tile) {
            let diff = BoardDiff {
                token_diffs: vec![TokenDiff {
                    inner: Some(RemoteTokenDiff::new(&model.tokens[index].inner.id)),
                    is_active: Some(true),
                }],
                ..BoardDiff::default()
            };
            return Transition {
                diff,
                next: InteractionState::PickedUpToken,
                form_request: None,
            };
        }
    }
    if is_click {
        open_menu(from.page, Area::single(from.tile))
    } else {
        open_menu(to.page, Area::spanning(from.tile, to.tile))
    }
}

fn on_picked_up(
    model: &BoardModel,
    to: &ClickData,
    button: Button,
    is_click: bool,
) -> Result<Transition, InteractionError> {
    let active = entity::active_token_index(model).ok_or(InteractionError::NoActiveToken)?;
    let active_id = model.tokens[active].inner.id.clone();

    if button == Button::Primary && is_click {
        let size = model.tokens[active].inner.size;
        let collisions = entity::would_collide(model, to.tile, size);
        let blocked =
            collisions.len() > 1 || (collisions.len() == 1 && collisions[0] != active);
        if !blocked {
            let mut remote_diff = RemoteTokenDiff::new(&active_id);
            remote_diff.location = Some(to.tile);
            let diff = BoardDiff {
                token_diffs: vec![TokenDiff {
                    inner: Some(remote_diff),
                    is_active: Some(false),
                }],
                ..BoardDiff::default()
            };
            return Ok(Transition {
                diff,
                next: InteractionState::Default,
                form_request: None,
            });
        }
    }
    // Everything else puts the token back down where it is.
    let diff = BoardDiff {
        token_diffs: vec![TokenDiff {
            inner: Some(RemoteTokenDiff::new(&active_id)),
            is_active: Some(false),
        }],
        ..BoardDiff::default()
    };
    Ok(Transition { diff, next: InteractionState::Default, form_request: None })
}

fn open_menu(page: Point, area: Area) -> Transition {
    Transition {
        diff: BoardDiff {
            context_menu_state: Some(ContextMenuState::open_at(page)),
            local_selection: Some(Some(area)),
            ..BoardDiff::default()
        },
        next: InteractionState::ContextMenuOpen,
        form_request: None,
    }
}

fn close_menu(page: Point) -> Transition {
    Transition {
        diff: BoardDiff {
            context_menu_state: Some(ContextMenuState::closed_at(page)),
            local_selection: Some(None),
            ..BoardDiff::default()
        },
        next: InteractionState::Default,
        form_request: None,
    }
}

fn context_action_diff(
    model: &BoardModel,
    action: ContextAction,
) -> (BoardDiff, Option<FormRequest>) {
    let Some(selection) = model.local_selection else {
        warn!("context action with no local selection; ignoring");
        return (BoardDiff::default(), None);
    };
    match action {
        ContextAction::AddFog => (fog_diff(model, selection, true), None),
        ContextAction::ClearFog => (fog_diff(model, selection, false), None),
        ContextAction::PeekFog => (peek_diff(selection, true), None),
        ContextAction::UnpeekFog => (peek_diff(selection, false), None),
        ContextAction::ClearHighlight => (highlight_diff(model, selection, Highlight::None), None),
        ContextAction::HighlightBlue => (highlight_diff(model, selection, Highlight::Blue), None),
        ContextAction::HighlightOrange => {
            (highlight_diff(model, selection, Highlight::Orange), None)
        }
        ContextAction::HighlightGreen => (highlight_diff(model, selection, Highlight::Green), None),
        ContextAction::AddToken => (
            BoardDiff::default(),
            Some(FormRequest::NewToken { tile: selection.start }),
        ),
        ContextAction::EditToken => edit_token(model, selection),
        ContextAction::CopyToken => (copy_token(model, selection), None),
        ContextAction::ZoomIn => (
            BoardDiff { scale: Some(model.scale * 2.0), ..BoardDiff::default() },
            None,
        ),
        ContextAction::ZoomOut => (
            BoardDiff { scale: Some(model.scale / 2.0), ..BoardDiff::default() },
            None,
        ),
    }
}

/// Cells of `area` that lie on the board, as grid indices.
#[allow(clippy::cast_sign_loss)]
fn selection_cells(model: &BoardModel, area: Area) -> Vec<(usize, usize)> {
    area.tiles()
        .into_iter()
        .filter(|tile| tile.col >= 0 && tile.row >= 0)
        .map(|tile| (tile.col as usize, tile.row as usize))
        .filter(|&(col, row)| col < model.inner.cols && row < model.inner.rows)
        .collect()
}

fn fog_diff(model: &BoardModel, selection: Area, is_fog_on: bool) -> BoardDiff {
    let mut inner = RemoteBoardDiff::new(&model.inner.id);
    inner.fog_of_war_diffs = selection_cells(model, selection)
        .into_iter()
        .map(|(col, row)| FogOfWarDiff { col, row, is_fog_on })
        .collect();
    BoardDiff { inner: Some(inner), ..BoardDiff::default() }
}

fn highlight_diff(model: &BoardModel, selection: Area, value: Highlight) -> BoardDiff {
    let mut inner = RemoteBoardDiff::new(&model.inner.id);
    inner.public_selection_diffs = selection_cells(model, selection)
        .into_iter()
        .map(|(col, row)| PublicSelectionDiff { col, row, value })
        .collect();
    BoardDiff { inner: Some(inner), ..BoardDiff::default() }
}

fn peek_diff(selection: Area, is_peeked: bool) -> BoardDiff {
    BoardDiff {
        peek_diff: Some(PeekDiff { area: selection, is_peeked }),
        ..BoardDiff::default()
    }
}

fn edit_token(model: &BoardModel, selection: Area) -> (BoardDiff, Option<FormRequest>) {
    if !selection.is_single_tile() {
        warn!("edit token requires exactly one selected tile; ignoring");
        return (BoardDiff::default(), None);
    }
    match entity::token_at(model, selection.start) {
        Some(index) => (
            BoardDiff::default(),
            Some(FormRequest::EditToken { token: model.tokens[index].clone() }),
        ),
        None => {
            warn!("no token in selection; ignoring");
            (BoardDiff::default(), None)
        }
    }
}

/// Probe outward from the source tile, away from the board center, testing
/// candidates on both axes until a collision-free target appears or the
/// probe leaves the board interior.
fn copy_token(model: &BoardModel, selection: Area) -> BoardDiff {
    if !selection.is_single_tile() {
        warn!("copy token requires exactly one selected tile; ignoring");
        return BoardDiff::default();
    }
    let tile = selection.start;
    let Some(index) = entity::token_at(model, tile) else {
        warn!("no token in selection; ignoring");
        return BoardDiff::default();
    };
    let token = &model.tokens[index];

    #[allow(clippy::cast_possible_wrap)]
    let (cols, rows) = (model.inner.cols as i32, model.inner.rows as i32);
    // Compare against the true midpoint so the center tile of an
    // odd-dimension board probes toward the larger half.
    let row_dir = if 2 * tile.row < rows { 1 } else { -1 };
    let col_dir = if 2 * tile.col < cols { 1 } else { -1 };
    let mut step = 1;
    loop {
        let new_row = tile.row + row_dir * step;
        let new_col = tile.col + col_dir * step;
        let row_in_bounds = 0 < new_row && new_row < rows - 1;
        let col_in_bounds = 0 < new_col && new_col < cols - 1;
        if !row_in_bounds && !col_in_bounds {
            warn!(token_id = %token.inner.id, "no free tile for token copy; ignoring");
            return BoardDiff::default();
        }
        let mut candidates = Vec::new();
        if row_in_bounds {
            candidates.push(GridPos::new(tile.col, new_row));
        }
        if col_in_bounds {
            candidates.push(GridPos::new(new_col, tile.row));
        }
        for target in candidates {
            if entity::would_collide(model, target, token.inner.size).is_empty() {
                let copy = token.duplicate_at(target);
                let mut inner = RemoteBoardDiff::new(&model.inner.id);
                inner.new_tokens.push(copy.inner);
                return BoardDiff { inner: Some(inner), ..BoardDiff::default() };
            }
        }
        step += 1;
    }
}

/// Stateful wrapper: tracks the current [`InteractionState`] and feeds each
/// transition's diff through the handler.
#[derive(Debug, Default)]
pub struct InteractionStateMachine {
    state: InteractionState,
}

impl InteractionStateMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> InteractionState {
        self.state
    }

    /// Handle a pointer gesture from `from` to `to`. A completed form
    /// delegation, if any, is returned for the owning controller.
    ///
    /// # Errors
    ///
    /// Propagates [`InteractionError`] from the transition or the merge; the
    /// machine state is unchanged on error.
    pub async fn on_drag_event<L: ImageLoader>(
        &mut self,
        handler: &mut ModelHandler<L>,
        from: PointerInput,
        to: PointerInput,
        button: Button,
    ) -> Result<Option<FormRequest>, InteractionError> {
        if button == Button::Middle {
            return Ok(None);
        }
        let from = ClickData { page: from.page, tile: handler.tile_for_point(from.client) };
        let to = ClickData { page: to.page, tile: handler.tile_for_point(to.client) };
        let result = transition(self.state, handler.model(), &from, &to, button)?;
        handler.apply_local_diff(result.diff).await?;
        self.state = result.next;
        Ok(result.form_request)
    }

    /// Handle an activated context menu item.
    ///
    /// # Errors
    ///
    /// Propagates [`InteractionError`]; the machine state is unchanged on
    /// error.
    pub async fn on_context_menu_selection<L: ImageLoader>(
        &mut self,
        handler: &mut ModelHandler<L>,
        action: ContextAction,
    ) -> Result<Option<FormRequest>, InteractionError> {
        let result = menu_selection(self.state, handler.model(), action)?;
        handler.apply_local_diff(result.diff).await?;
        self.state = result.next;
        Ok(result.form_request)
    }
}
