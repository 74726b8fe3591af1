//! Transport event contract.
//!
//! The engine does not own a socket; the hosting application ferries
//! `(event name, JSON payload)` pairs between here and whatever channel it
//! uses. [`BoardEvent`] is the typed form of that contract: [`decode`]
//! validates an inbound pair at the trust boundary, [`name`] and [`payload`]
//! produce the outbound pair. A decoded [`BoardEvent::Update`] feeds
//! `ModelHandler::apply_remote_diff`; everything else is request/response
//! plumbing around board records.
//!
//! [`decode`]: BoardEvent::decode
//! [`name`]: BoardEvent::name
//! [`payload`]: BoardEvent::payload

#[cfg(test)]
#[path = "events_test.rs"]
mod events_test;

use serde_json::Value;

use crate::remote::{RemoteBoardDiff, RemoteBoardModel, ValidationError};

pub const BOARD_UPDATE: &str = "board-update";
pub const BOARD_CREATE_REQUEST: &str = "board-create-request";

pub const BOARD_GET_REQUEST: &str = "board-get-request";
pub const BOARD_GET_RESPONSE: &str = "board-get-response";

pub const BOARD_GET_ALL_REQUEST: &str = "board-get-all-request";
pub const BOARD_GET_ALL_RESPONSE: &str = "board-get-all-response";

pub const BOARD_GET_ACTIVE_REQUEST: &str = "board-get-active-request";
pub const BOARD_GET_ACTIVE_RESPONSE: &str = "board-get-active-response";

pub const BOARD_SET_ACTIVE: &str = "board-set-active";

/// Sentinel payload an upstream server sends when it has no active board.
const ACTIVE_BOARD_ERROR: &str = "ERROR";

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("unknown board event: {0}")]
    UnknownEvent(String),
    /// The upstream server reported it could not resolve the active board.
    #[error("active board lookup failed upstream")]
    ActiveBoardUnavailable,
    #[error(transparent)]
    Payload(#[from] ValidationError),
    #[error("payload shape is invalid: {0}")]
    Shape(#[from] serde_json::Error),
}

/// A typed board event, inbound or outbound.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardEvent {
    /// A sparse board change, broadcast to every other client.
    Update(RemoteBoardDiff),
    /// A full board a client wants persisted as a new record.
    CreateRequest(RemoteBoardModel),
    GetRequest { id: String },
    GetResponse(RemoteBoardModel),
    GetAllRequest,
    /// Every known board id.
    GetAllResponse(Vec<String>),
    GetActiveRequest,
    GetActiveResponse { id: String },
    SetActive { id: String },
}

impl BoardEvent {
    /// Validate an inbound `(event name, payload)` pair.
    ///
    /// Board payloads go through the full validation boundary, including the
    /// one defaulting pass for legacy encodings.
    ///
    /// # Errors
    ///
    /// Returns [`EventError`] for an unrecognized event name, a payload that
    /// fails validation, or the upstream active-board error sentinel.
    pub fn decode(name: &str, payload: Value) -> Result<Self, EventError> {
        match name {
            BOARD_UPDATE => Ok(Self::Update(RemoteBoardDiff::parse(payload)?)),
            BOARD_CREATE_REQUEST => Ok(Self::CreateRequest(RemoteBoardModel::parse(payload)?)),
            BOARD_GET_REQUEST => Ok(Self::GetRequest { id: expect_string(payload)? }),
            BOARD_GET_RESPONSE => Ok(Self::GetResponse(RemoteBoardModel::parse(payload)?)),
            BOARD_GET_ALL_REQUEST => Ok(Self::GetAllRequest),
            BOARD_GET_ALL_RESPONSE => Ok(Self::GetAllResponse(serde_json::from_value(payload)?)),
            BOARD_GET_ACTIVE_REQUEST => Ok(Self::GetActiveRequest),
            BOARD_GET_ACTIVE_RESPONSE => {
                let id = expect_string(payload)?;
                if id == ACTIVE_BOARD_ERROR {
                    return Err(EventError::ActiveBoardUnavailable);
                }
                Ok(Self::GetActiveResponse { id })
            }
            BOARD_SET_ACTIVE => Ok(Self::SetActive { id: expect_string(payload)? }),
            other => Err(EventError::UnknownEvent(other.to_string())),
        }
    }

    /// The wire name of this event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Update(_) => BOARD_UPDATE,
            Self::CreateRequest(_) => BOARD_CREATE_REQUEST,
            Self::GetRequest { .. } => BOARD_GET_REQUEST,
            Self::GetResponse(_) => BOARD_GET_RESPONSE,
            Self::GetAllRequest => BOARD_GET_ALL_REQUEST,
            Self::GetAllResponse(_) => BOARD_GET_ALL_RESPONSE,
            Self::GetActiveRequest => BOARD_GET_ACTIVE_REQUEST,
            Self::GetActiveResponse { .. } => BOARD_GET_ACTIVE_RESPONSE,
            Self::SetActive { .. } => BOARD_SET_ACTIVE,
        }
    }

    /// The wire payload of this event. Request events with no arguments
    /// carry `null`.
    ///
    /// # Errors
    ///
    /// Returns a serialization error; board models and diffs are plain data
    /// and serialize cleanly in practice.
    pub fn payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Update(diff) => serde_json::to_value(diff),
            Self::CreateRequest(model) | Self::GetResponse(model) => serde_json::to_value(model),
            Self::GetAllRequest | Self::GetActiveRequest => Ok(Value::Null),
            Self::GetAllResponse(ids) => serde_json::to_value(ids),
            Self::GetRequest { id }
            | Self::GetActiveResponse { id }
            | Self::SetActive { id } => Ok(Value::String(id.clone())),
        }
    }
}

fn expect_string(payload: Value) -> Result<String, serde_json::Error> {
    serde_json::from_value(payload)
}
