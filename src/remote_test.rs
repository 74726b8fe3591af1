#![allow(clippy::float_cmp)]

use serde_json::json;

use super::*;

const BOARD_NAME: &str = "Vault of the Drow";
const BOARD_IMAGE: &str = "maps/vault.png";

fn token(id: &str) -> RemoteTokenModel {
    RemoteTokenModel {
        id: id.to_string(),
        location: GridPos::new(1, 1),
        name: "Drow Scout".to_string(),
        image_source: "tokens/drow.png".to_string(),
        size: 1,
        speed: 6,
    }
}

fn board() -> RemoteBoardModel {
    let mut model = RemoteBoardModel::create(BOARD_NAME, BOARD_IMAGE, 100.0, 60.0, 20.0);
    model.tokens.push(token("t-1"));
    model
}

// =============================================================
// Token diff algebra
// =============================================================

#[test]
fn token_compute_diff_only_changed_fields() {
    let old = token("t-1");
    let mut new = old.clone();
    new.location = GridPos::new(4, 2);
    new.speed = 9;

    let diff = RemoteTokenModel::compute_diff(&new, &old).unwrap();
    assert_eq!(diff.location, Some(GridPos::new(4, 2)));
    assert_eq!(diff.speed, Some(9));
    assert_eq!(diff.name, None);
    assert_eq!(diff.image_source, None);
    assert_eq!(diff.size, None);
}

#[test]
fn token_compute_diff_rejects_different_tokens() {
    let result = RemoteTokenModel::compute_diff(&token("t-1"), &token("t-2"));
    assert!(matches!(result, Err(DiffError::TokenIdMismatch { .. })));
}

#[test]
fn token_merge_applies_diff_fields() {
    let mut diff = RemoteTokenDiff::new("t-1");
    diff.name = Some("Drow Priestess".to_string());
    diff.size = Some(2);

    let merged = token("t-1").merged_with(&diff);
    assert_eq!(merged.name, "Drow Priestess");
    assert_eq!(merged.size, 2);
    assert_eq!(merged.location, GridPos::new(1, 1));
}

#[test]
fn token_merge_ignores_mismatched_diff() {
    let mut diff = RemoteTokenDiff::new("someone-else");
    diff.size = Some(4);
    let merged = token("t-1").merged_with(&diff);
    assert_eq!(merged, token("t-1"));
}

// =============================================================
// Board diff round trips
// =============================================================

#[test]
fn compute_between_same_model_is_none() {
    let model = board();
    let diff = RemoteBoardDiff::compute_between(&model, &model).unwrap();
    assert!(diff.is_none());
}

#[test]
fn merge_with_empty_diff_is_identity() {
    let model = board();
    let merged = model.merged_with(&RemoteBoardDiff::new(&model.id)).unwrap();
    assert_eq!(merged, model);
}

#[test]
fn round_trip_token_add_remove_modify() {
    let mut old = board();
    old.tokens.push(token("t-2"));
    let mut new = old.clone();
    new.tokens[0].location = GridPos::new(3, 0);
    new.tokens.retain(|t| t.id != "t-2");
    new.tokens.push(token("t-3"));
    new.public_selection[2][2] = Highlight::Green;
    new.name = "Renamed".to_string();

    let diff = RemoteBoardDiff::compute_between(&new, &old).unwrap().unwrap();
    assert_eq!(diff.removed_tokens, vec!["t-2".to_string()]);
    assert_eq!(diff.new_tokens.len(), 1);
    assert_eq!(diff.token_diffs.len(), 1);

    let merged = old.merged_with(&diff).unwrap();
    let mut merged_ids: Vec<&str> = merged.tokens.iter().map(|t| t.id.as_str()).collect();
    let mut new_ids: Vec<&str> = new.tokens.iter().map(|t| t.id.as_str()).collect();
    merged_ids.sort_unstable();
    new_ids.sort_unstable();
    assert_eq!(merged_ids, new_ids);
    let moved = merged.tokens.iter().find(|t| t.id == "t-1").unwrap();
    assert_eq!(moved.location, GridPos::new(3, 0));
    assert_eq!(merged.public_selection, new.public_selection);
    assert_eq!(merged.name, new.name);
}

#[test]
fn round_trip_grid_changes_restore_snapshot() {
    let old = board();
    let mut new = old.clone();
    new.fog_of_war[1][0] = FogState::Hidden;
    new.fog_of_war[4][2] = FogState::Peeked;
    new.public_selection[0][0] = Highlight::Blue;

    let diff = RemoteBoardDiff::compute_between(&new, &old).unwrap().unwrap();
    let merged = old.merged_with(&diff).unwrap();
    // A peeked cell travels as plain fog; everything else matches exactly.
    assert_eq!(merged.fog_of_war[1][0], FogState::Hidden);
    assert_eq!(merged.fog_of_war[4][2], FogState::Hidden);
    assert_eq!(merged.public_selection, new.public_selection);
}

#[test]
fn compute_between_rejects_different_boards() {
    let left = board();
    let mut right = board();
    right.id = "other-board".to_string();
    let result = RemoteBoardDiff::compute_between(&left, &right);
    assert!(matches!(result, Err(DiffError::BoardIdMismatch { .. })));
}

#[test]
fn merge_rejects_different_boards() {
    let model = board();
    let result = model.merged_with(&RemoteBoardDiff::new("other-board"));
    assert!(matches!(result, Err(DiffError::BoardIdMismatch { .. })));
}

#[test]
fn image_change_skips_grid_diffs() {
    let old = board();
    let mut new = old.clone();
    new.image_source = "maps/other.png".to_string();
    new.fog_of_war[0][0] = FogState::Hidden;
    new.public_selection[1][1] = Highlight::Orange;

    let diff = RemoteBoardDiff::compute_between(&new, &old).unwrap().unwrap();
    assert_eq!(diff.image_source.as_deref(), Some("maps/other.png"));
    assert!(diff.fog_of_war_diffs.is_empty());
    assert!(diff.public_selection_diffs.is_empty());
}

#[test]
fn merge_resize_produces_fresh_grids() {
    let model = board();
    let mut diff = RemoteBoardDiff::new(&model.id);
    diff.cols = Some(2);
    diff.rows = Some(14);
    diff.tile_size = Some(30.0);
    // Stale cell updates from before the resize must not survive it.
    diff.fog_of_war_diffs.push(FogOfWarDiff { col: 0, row: 0, is_fog_on: true });

    let merged = model.merged_with(&diff).unwrap();
    assert_eq!(merged.cols, 2);
    assert_eq!(merged.rows, 14);
    assert_eq!(merged.fog_of_war, create_grid(2, 14, FogState::Clear));
    assert_eq!(merged.public_selection, create_grid(2, 14, Highlight::None));
}

#[test]
fn merge_ignores_out_of_bounds_cell_diffs() {
    let model = board();
    let mut diff = RemoteBoardDiff::new(&model.id);
    diff.fog_of_war_diffs.push(FogOfWarDiff { col: 99, row: 0, is_fog_on: true });

    let merged = model.merged_with(&diff).unwrap();
    assert_eq!(merged.fog_of_war, model.fog_of_war);
}

#[test]
fn merge_applies_scalars_and_offset() {
    let model = board();
    let mut diff = RemoteBoardDiff::new(&model.id);
    diff.name = Some("After".to_string());
    diff.grid_offset = Some(Point::new(5.0, 0.0));

    let merged = model.merged_with(&diff).unwrap();
    assert_eq!(merged.name, "After");
    assert_eq!(merged.grid_offset, Point::new(5.0, 0.0));
    assert_eq!(merged.tile_size, model.tile_size);
}

// =============================================================
// Authoring
// =============================================================

#[test]
fn create_uses_ceiling_division_for_dimensions() {
    let model = RemoteBoardModel::create("b", "bg.png", 57.0, 420.0, 20.0);
    assert_eq!(model.cols, 3);
    assert_eq!(model.rows, 21);
    assert!(is_grid(&model.fog_of_war, 3, 21));
    assert!(is_grid(&model.public_selection, 3, 21));
    assert_eq!(model.fog_of_war[0][0], FogState::Clear);
    assert_eq!(model.public_selection[0][0], Highlight::None);
}

#[test]
fn create_generates_distinct_ids() {
    let a = RemoteBoardModel::create("b", "bg.png", 10.0, 10.0, 10.0);
    let b = RemoteBoardModel::create("b", "bg.png", 10.0, 10.0, 10.0);
    assert_ne!(a.id, b.id);
}

// =============================================================
// Validation boundary
// =============================================================

fn raw_board() -> serde_json::Value {
    serde_json::to_value(board()).unwrap()
}

#[test]
fn parse_accepts_valid_payload() {
    let model = RemoteBoardModel::parse(raw_board()).unwrap();
    assert_eq!(model.name, BOARD_NAME);
}

#[test]
fn parse_defaults_missing_token_speed() {
    let mut raw = raw_board();
    raw["tokens"][0].as_object_mut().unwrap().remove("speed");
    let model = RemoteBoardModel::parse(raw).unwrap();
    assert_eq!(model.tokens[0].speed, 6);
}

#[test]
fn parse_defaults_missing_grid_offset_and_tokens() {
    let mut raw = raw_board();
    raw.as_object_mut().unwrap().remove("gridOffset");
    raw.as_object_mut().unwrap().remove("tokens");
    let model = RemoteBoardModel::parse(raw).unwrap();
    assert_eq!(model.grid_offset, Point::default());
    assert!(model.tokens.is_empty());
}

#[test]
fn parse_repairs_legacy_fog_cells() {
    let mut raw = raw_board();
    raw["fogOfWar"][0][0] = json!("True");
    raw["fogOfWar"][0][1] = json!("False");
    let model = RemoteBoardModel::parse(raw).unwrap();
    assert_eq!(model.fog_of_war[0][0], FogState::Hidden);
    assert_eq!(model.fog_of_war[0][1], FogState::Clear);
}

#[test]
fn parse_rebuilds_wrongly_sized_grids() {
    let mut raw = raw_board();
    raw["fogOfWar"] = json!([["1"]]);
    raw["publicSelection"] = json!([]);
    let model = RemoteBoardModel::parse(raw).unwrap();
    assert!(is_grid(&model.fog_of_war, model.cols, model.rows));
    assert_eq!(model.fog_of_war[0][0], FogState::Clear);
    assert!(is_grid(&model.public_selection, model.cols, model.rows));
}

#[test]
fn parse_rejects_without_dimensions() {
    let mut raw = raw_board();
    raw.as_object_mut().unwrap().remove("cols");
    raw.as_object_mut().unwrap().remove("fogOfWar");
    let result = RemoteBoardModel::parse(raw);
    assert!(matches!(result, Err(ValidationError::MissingDimensions)));
}

#[test]
fn parse_rejects_invalid_token_after_defaulting() {
    let mut raw = raw_board();
    raw["tokens"][0]["size"] = json!(0);
    assert!(RemoteBoardModel::parse(raw).is_err());
}

#[test]
fn parse_rejects_non_object_payload() {
    assert!(RemoteBoardModel::parse(json!("nope")).is_err());
}

#[test]
fn diff_parse_rejects_empty_token_diff_id() {
    let raw = json!({"id": "b-1", "tokenDiffs": [{"id": ""}]});
    assert!(RemoteBoardDiff::parse(raw).is_err());
}

#[test]
fn diff_parse_accepts_sparse_payload() {
    let raw = json!({"id": "b-1", "name": "After"});
    let diff = RemoteBoardDiff::parse(raw).unwrap();
    assert_eq!(diff.name.as_deref(), Some("After"));
    assert!(diff.new_tokens.is_empty());
}

// =============================================================
// Wire format
// =============================================================

#[test]
fn board_serde_uses_camel_case() {
    let raw = raw_board();
    assert!(raw.get("imageSource").is_some());
    assert!(raw.get("tileSize").is_some());
    assert!(raw.get("gridOffset").is_some());
    assert!(raw.get("publicSelection").is_some());
}

#[test]
fn empty_diff_serializes_to_just_id() {
    let raw = serde_json::to_value(RemoteBoardDiff::new("b-1")).unwrap();
    assert_eq!(raw, json!({"id": "b-1"}));
}

#[test]
fn fog_diff_serde_roundtrip() {
    let diff = FogOfWarDiff { col: 3, row: 1, is_fog_on: true };
    let raw = serde_json::to_value(diff).unwrap();
    assert_eq!(raw, json!({"col": 3, "row": 1, "isFogOn": true}));
    let back: FogOfWarDiff = serde_json::from_value(raw).unwrap();
    assert_eq!(back, diff);
}
