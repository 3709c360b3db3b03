//! Commands: the request/response surface of the engine.
//!
//! Every state-mutating request is one variant of [`Command`], a tagged
//! union validated once at the boundary with [`Command::validate`] before
//! it ever reaches the transactional processor. The wrapper
//! [`CommandRequest`] adds the caller's token, the target room, and the
//! idempotency key.
//!
//! ```text
//! { "roomId": "r1", "token": "t", "requestId": "q1",
//!   "command": "submit_order", "list": ["a", "b"] }
//! ```

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{PlayerId, ProtocolError, RequestId, RoomId, RoomOptions};

/// Maximum length of a display name, in characters.
pub const MAX_NAME_LEN: usize = 24;
/// Maximum length of a round topic, in characters.
pub const MAX_TOPIC_LEN: usize = 100;
/// Maximum length of an avatar reference, in characters.
pub const MAX_AVATAR_LEN: usize = 256;

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// One state transition a client can request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Host: leave the lobby and open the first round.
    Start,
    /// Host: open a fresh round from any phase.
    NextRound,
    /// Host: deal hidden numbers for the current round.
    Deal,
    /// Submit the group's full ordering (sort-submit mode).
    SubmitOrder { list: Vec<PlayerId> },
    /// Place one player next in the ordering (sequential mode).
    #[serde(rename_all = "camelCase")]
    CommitPlay { player_id: PlayerId },
    /// Close the reveal and finish the round.
    Finalize,
    /// Host: return to the lobby, discarding the round.
    Reset,
    /// Take a seat in the room.
    Join {
        name: String,
        #[serde(default)]
        avatar: Option<String>,
    },
    /// Give up the caller's seat.
    Leave,
    /// Host: change the round topic.
    TopicChange { topic: Option<String> },
    /// Change the caller's display name and/or avatar.
    ProfileUpdate {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        avatar: Option<String>,
    },
}

impl Command {
    /// The kind tag used in patch metadata and logs.
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Start => CommandKind::Start,
            Self::NextRound => CommandKind::NextRound,
            Self::Deal => CommandKind::Deal,
            Self::SubmitOrder { .. } => CommandKind::SubmitOrder,
            Self::CommitPlay { .. } => CommandKind::CommitPlay,
            Self::Finalize => CommandKind::Finalize,
            Self::Reset => CommandKind::Reset,
            Self::Join { .. } => CommandKind::Join,
            Self::Leave => CommandKind::Leave,
            Self::TopicChange { .. } => CommandKind::TopicChange,
            Self::ProfileUpdate { .. } => CommandKind::ProfileUpdate,
        }
    }

    /// Checks the command's arguments in isolation.
    ///
    /// Anything that can be judged without reading the room is checked
    /// here, so malformed requests never take the room lock.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] describing the first
    /// problem found.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            Self::SubmitOrder { list } => {
                if list.is_empty() {
                    return Err(invalid("order list must not be empty"));
                }
                let mut seen = HashSet::with_capacity(list.len());
                if let Some(dup) = list.iter().find(|id| !seen.insert(*id)) {
                    return Err(invalid(format!("player {dup} appears twice in order")));
                }
                Ok(())
            }
            Self::CommitPlay { player_id } => check_id(player_id),
            Self::Join { name, avatar } => {
                check_name(name)?;
                check_avatar(avatar.as_deref())
            }
            Self::TopicChange { topic } => match topic {
                Some(t) if t.chars().count() > MAX_TOPIC_LEN => Err(invalid(format!(
                    "topic longer than {MAX_TOPIC_LEN} characters"
                ))),
                _ => Ok(()),
            },
            Self::ProfileUpdate { name, avatar } => {
                if name.is_none() && avatar.is_none() {
                    return Err(invalid("profile update changes nothing"));
                }
                if let Some(name) = name {
                    check_name(name)?;
                }
                check_avatar(avatar.as_deref())
            }
            Self::Start
            | Self::NextRound
            | Self::Deal
            | Self::Finalize
            | Self::Reset
            | Self::Leave => Ok(()),
        }
    }
}

fn invalid(reason: impl Into<String>) -> ProtocolError {
    ProtocolError::InvalidMessage(reason.into())
}

fn check_id(id: &PlayerId) -> Result<(), ProtocolError> {
    if id.as_str().trim().is_empty() {
        return Err(invalid("player id must not be empty"));
    }
    Ok(())
}

fn check_name(name: &str) -> Result<(), ProtocolError> {
    let len = name.trim().chars().count();
    if len == 0 || len > MAX_NAME_LEN {
        return Err(invalid(format!(
            "name must be 1..={MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn check_avatar(avatar: Option<&str>) -> Result<(), ProtocolError> {
    match avatar {
        Some(a) if a.chars().count() > MAX_AVATAR_LEN => Err(invalid(format!(
            "avatar longer than {MAX_AVATAR_LEN} characters"
        ))),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// CommandKind
// ---------------------------------------------------------------------------

/// A payload-free tag naming a command (or room creation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Create,
    Start,
    NextRound,
    Deal,
    SubmitOrder,
    CommitPlay,
    Finalize,
    Reset,
    Join,
    Leave,
    TopicChange,
    ProfileUpdate,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Start => "start",
            Self::NextRound => "next_round",
            Self::Deal => "deal",
            Self::SubmitOrder => "submit_order",
            Self::CommitPlay => "commit_play",
            Self::Finalize => "finalize",
            Self::Reset => "reset",
            Self::Join => "join",
            Self::Leave => "leave",
            Self::TopicChange => "topic_change",
            Self::ProfileUpdate => "profile_update",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A command addressed to a room, as received by a command endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    pub room_id: RoomId,
    pub token: String,
    pub request_id: RequestId,
    #[serde(flatten)]
    pub command: Command,
}

/// Creates a room with the caller seated as host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub room_id: RoomId,
    pub token: String,
    pub name: String,
    #[serde(default)]
    pub options: RoomOptions,
}

/// A presence heartbeat from one client connection.
///
/// The server resolves the participant from `token` and stamps the write
/// with its own clock, so client clocks never enter the presence data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub room_id: RoomId,
    pub token: String,
    pub connection_id: crate::ConnectionId,
    pub online: bool,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// The wire error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Identity verification failed.
    Unauthorized,
    /// Authenticated but not permitted (e.g. host-only command).
    Forbidden,
    RoomNotFound,
    /// The command is not valid in the room's current phase.
    InvalidStatus,
    RateLimited,
    /// Malformed command arguments.
    InvalidPayload,
    NoPlayers,
    /// Another command holds the room lock; retry shortly.
    Busy,
    /// Unexpected store or transaction failure.
    InternalError,
}

impl ErrorCode {
    /// Returns `true` for codes a client may retry automatically.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::RateLimited | Self::Busy | Self::InternalError)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::RoomNotFound => "room_not_found",
            Self::InvalidStatus => "invalid_status",
            Self::RateLimited => "rate_limited",
            Self::InvalidPayload => "invalid_payload",
            Self::NoPlayers => "no_players",
            Self::Busy => "busy",
            Self::InternalError => "internal_error",
        };
        f.write_str(name)
    }
}

/// The verdict of a round, attached to the ack of the command that ended it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundVerdict {
    pub success: bool,
    pub failed_at: Option<usize>,
    /// Whether the round moved to reveal with this command.
    pub finished: bool,
}

/// `{ "ok": true, ... }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandAck {
    pub ok: bool,
    pub status_version: u64,
    /// `true` when the request was recognised as a retry and nothing changed.
    #[serde(default)]
    pub replayed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<RoundVerdict>,
}

impl CommandAck {
    pub fn applied(status_version: u64) -> Self {
        Self {
            ok: true,
            status_version,
            replayed: false,
            verdict: None,
        }
    }

    pub fn replayed(status_version: u64) -> Self {
        Self {
            ok: true,
            status_version,
            replayed: true,
            verdict: None,
        }
    }
}

/// `{ "error": "<code>", "message": "..." }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandFailure {
    pub error: ErrorCode,
    pub message: String,
}

/// What a command endpoint returns.
///
/// Untagged: the two shapes are told apart by their `ok`/`error` keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandResponse {
    Ok(CommandAck),
    Err(CommandFailure),
}

impl CommandResponse {
    /// Builds a failure response.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Err(CommandFailure {
            error: code,
            message: message.into(),
        })
    }

    /// Returns `true` for `{ ok: true }` responses.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// The error code, if this is a failure.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Ok(_) => None,
            Self::Err(f) => Some(f.error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(id: &str) -> PlayerId {
        PlayerId::new(id)
    }

    #[test]
    fn test_command_request_json_shape() {
        let json = r#"{"roomId":"r1","token":"t","requestId":"q1",
                       "command":"submit_order","list":["a","b"]}"#;
        let req: CommandRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.room_id, RoomId::new("r1"));
        assert_eq!(
            req.command,
            Command::SubmitOrder {
                list: vec![pid("a"), pid("b")]
            }
        );
    }

    #[test]
    fn test_commit_play_uses_camel_case_field() {
        let cmd: Command =
            serde_json::from_str(r#"{"command":"commit_play","playerId":"a"}"#).unwrap();
        assert_eq!(cmd, Command::CommitPlay { player_id: pid("a") });
    }

    #[test]
    fn test_unit_command_round_trips_through_tag() {
        let json = serde_json::to_value(Command::NextRound).unwrap();
        assert_eq!(json["command"], "next_round");
    }

    #[test]
    fn test_validate_rejects_empty_order() {
        let cmd = Command::SubmitOrder { list: vec![] };
        assert!(matches!(cmd.validate(), Err(ProtocolError::InvalidMessage(_))));
    }

    #[test]
    fn test_validate_rejects_duplicate_in_order() {
        let cmd = Command::SubmitOrder {
            list: vec![pid("a"), pid("b"), pid("a")],
        };
        let err = cmd.validate().unwrap_err();
        assert!(err.to_string().contains("appears twice"));
    }

    #[test]
    fn test_validate_join_name_bounds() {
        let ok = Command::Join {
            name: "Mika".into(),
            avatar: None,
        };
        assert!(ok.validate().is_ok());

        let blank = Command::Join {
            name: "   ".into(),
            avatar: None,
        };
        assert!(blank.validate().is_err());

        let long = Command::Join {
            name: "x".repeat(MAX_NAME_LEN + 1),
            avatar: None,
        };
        assert!(long.validate().is_err());
    }

    #[test]
    fn test_validate_empty_profile_update() {
        let cmd = Command::ProfileUpdate {
            name: None,
            avatar: None,
        };
        assert!(cmd.validate().is_err());
    }

    #[test]
    fn test_error_code_wire_names() {
        let json = serde_json::to_string(&ErrorCode::RoomNotFound).unwrap();
        assert_eq!(json, "\"room_not_found\"");
        assert_eq!(ErrorCode::InvalidStatus.to_string(), "invalid_status");
    }

    #[test]
    fn test_command_response_untagged_shapes() {
        let ok = CommandResponse::Ok(CommandAck::applied(4));
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(json["statusVersion"], 4);

        let err = CommandResponse::error(ErrorCode::RateLimited, "slow down");
        let json = serde_json::to_string(&err).unwrap();
        let back: CommandResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back.error_code(), Some(ErrorCode::RateLimited));
    }
}
