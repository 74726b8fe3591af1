//! Stateless token queries: AABB collision tests and the upsert diff.
//!
//! Collision uses open-interval semantics: a candidate square and a token
//! overlap only when their projections overlap on both axes, and touching
//! edges count as disjoint, so exactly adjacent placement is legal.

#[cfg(test)]
#[path = "entity_test.rs"]
mod entity_test;

use tracing::warn;

use crate::board::{BoardDiff, BoardModel, Token, TokenDiff};
use crate::coords::GridPos;
use crate::remote::{RemoteBoardDiff, RemoteTokenDiff};

/// Indices of every token a square of `size` tiles at `target` would overlap.
#[must_use]
pub fn would_collide(model: &BoardModel, target: GridPos, size: i32) -> Vec<usize> {
    find_collisions(model, target, size).map(|(index, _)| index).collect()
}

/// Ids of every token a square of `size` tiles at `target` would overlap.
#[must_use]
pub fn collision_ids(model: &BoardModel, target: GridPos, size: i32) -> Vec<String> {
    find_collisions(model, target, size)
        .map(|(_, token)| token.inner.id.clone())
        .collect()
}

/// The single token on the given tile, if any. Ambiguous overlaps resolve
/// to the first match with a warning.
#[must_use]
pub fn token_at(model: &BoardModel, tile: GridPos) -> Option<usize> {
    let collisions = would_collide(model, tile, 1);
    if collisions.len() > 1 {
        warn!(count = collisions.len(), "unexpected multiple collisions; taking the first");
    }
    collisions.first().copied()
}

/// Index of the picked-up token, if one exists.
#[must_use]
pub fn active_token_index(model: &BoardModel) -> Option<usize> {
    model.tokens.iter().position(|token| token.is_active)
}

/// Upsert diff for a completed token form.
///
/// A token whose id is already on the board becomes a modify diff; a new id
/// becomes an add diff. Re-invoking a confirm action therefore never
/// duplicates a token.
#[must_use]
pub fn add_new_token(model: &BoardModel, token: &Token) -> BoardDiff {
    let exists = model.tokens.iter().any(|t| t.inner.id == token.inner.id);
    if exists {
        let remote_diff = RemoteTokenDiff {
            id: token.inner.id.clone(),
            location: Some(token.inner.location),
            name: Some(token.inner.name.clone()),
            image_source: Some(token.inner.image_source.clone()),
            size: Some(token.inner.size),
            speed: Some(token.inner.speed),
        };
        BoardDiff {
            token_diffs: vec![TokenDiff {
                inner: Some(remote_diff),
                is_active: Some(token.is_active),
            }],
            ..BoardDiff::default()
        }
    } else {
        let mut inner = RemoteBoardDiff::new(&model.inner.id);
        inner.new_tokens.push(token.inner.clone());
        BoardDiff { inner: Some(inner), ..BoardDiff::default() }
    }
}

fn find_collisions(
    model: &BoardModel,
    target: GridPos,
    size: i32,
) -> impl Iterator<Item = (usize, &Token)> {
    model.tokens.iter().enumerate().filter(move |(_, token)| {
        let min_col = token.inner.location.col;
        let max_col = min_col + token.inner.size;
        let min_row = token.inner.location.row;
        let max_row = min_row + token.inner.size;

        let cols_disjoint = target.col >= max_col || target.col + size <= min_col;
        let rows_disjoint = target.row >= max_row || target.row + size <= min_row;
        !cols_disjoint && !rows_disjoint
    })
}
