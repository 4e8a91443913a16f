//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every frame is a JSON object whose integer `id` names the message;
//! the remaining fields are the payload. A response's code is its
//! request's code plus one.
//!
//! ```text
//! {"id":4001,"roleId":2,"x":105000,"y":-35000,"faceAngle":90000}
//! ```
//!
//! Positions, angles and hit points travel as scaled integers
//! (see [`WireScale`]).

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};

use crate::core::fixed::{WireInt, WireScale};
use crate::core::vec2::Vec2;
use crate::game::combatant::RoleId;
use crate::game::state::BattlePhase;
use crate::game::weapon::WeaponId;

/// Integer message discriminator.
pub type MessageCode = u32;

// =============================================================================
// MESSAGE CODES
// =============================================================================

/// Apply for a battle with a weapon.
pub const APPLY_BATTLE_REQ: MessageCode = 2001;
/// Battle application accepted.
pub const APPLY_BATTLE_RESP: MessageCode = 2002;
/// Leave the match queue.
pub const CANCEL_MATCH_REQ: MessageCode = 3001;
/// Queue left.
pub const CANCEL_MATCH_RESP: MessageCode = 3002;
/// Submit move and facing for this round.
pub const OPERATION_REQ: MessageCode = 4001;
/// Operation accepted or rejected.
pub const OPERATION_RESP: MessageCode = 4002;
/// Battle scene loaded; also used to ask for a resync.
pub const LOAD_BATTLE_READY_REQ: MessageCode = 5001;
/// Ready acknowledged.
pub const LOAD_BATTLE_READY_RESP: MessageCode = 5002;
/// A request failed.
pub const ERROR_MESSAGE: MessageCode = 9999;
/// Opponent found.
pub const MATCH_RESULT_BROAD: MessageCode = 10001;
/// Battle begins, initial roles.
pub const BATTLE_START_BROAD: MessageCode = 10002;
/// Round resolved.
pub const BATTLE_RESULT_BROAD: MessageCode = 10003;
/// Phase change.
pub const BATTLE_STATE_BROAD: MessageCode = 10004;

/// Response code for a request code.
#[inline]
pub const fn response_code(request: MessageCode) -> MessageCode {
    request + 1
}

// =============================================================================
// ERRORS
// =============================================================================

/// Frame decode/encode errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The frame is not JSON.
    #[error("Malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame is JSON but not an object.
    #[error("Frame is not a JSON object")]
    NotAnObject,

    /// No integer `id` field.
    #[error("Frame has no message id")]
    MissingId,

    /// The `id` names no known message.
    #[error("Unknown message id {0}")]
    UnknownId(u64),

    /// Known `id`, but the payload does not match it.
    #[error("Bad payload for message {code}: {source}")]
    Payload {
        /// Message code
        code: MessageCode,
        /// Underlying error
        source: serde_json::Error,
    },
}

// =============================================================================
// PAYLOADS
// =============================================================================

/// Battle application (2001).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyBattleReq {
    /// Weapon to fight with
    pub weapon_type: WeaponId,
}

/// Battle application accepted (2002).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyBattleResp {
    /// Role id for the coming match
    pub role_id: RoleId,
    /// Weapon confirmed by the server
    #[serde(default)]
    pub weapon_type: WeaponId,
}

/// Round command (4001). Fields are scaled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationReq {
    /// Acting role
    pub role_id: RoleId,
    /// Destination x
    pub x: WireInt,
    /// Destination y
    pub y: WireInt,
    /// Facing, degrees
    pub face_angle: WireInt,
}

impl OperationReq {
    /// Scale a destination and facing for the wire.
    pub fn new(role_id: RoleId, destination: Vec2, face_angle_deg: f64, scale: WireScale) -> Self {
        Self {
            role_id,
            x: scale.encode(destination.x),
            y: scale.encode(destination.y),
            face_angle: scale.encode(face_angle_deg),
        }
    }
}

/// Operation verdict (4002).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResp {
    /// Was the command accepted?
    pub success: bool,
}

/// Failed request (9999).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    /// Code of the request that failed
    pub req_id: MessageCode,
    /// Server error code
    pub error_code: i64,
}

/// A matched player (inside 10001).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerInfo {
    /// Account id
    pub player_id: i64,
    /// Login name
    pub user_name: String,
    /// Display name
    pub nick_name: String,
    /// Role in this match
    pub role_id: RoleId,
    /// Chosen weapon
    pub weapon_type: WeaponId,
    /// Matches played per weapon
    pub weapon_use_count_map: BTreeMap<WeaponId, u32>,
    /// Matches won per weapon
    pub weapon_win_count_map: BTreeMap<WeaponId, u32>,
}

impl PlayerInfo {
    /// Nickname if set, else the login name.
    pub fn display_name(&self) -> &str {
        if self.nick_name.is_empty() {
            &self.user_name
        } else {
            &self.nick_name
        }
    }
}

/// Opponent found (10001).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResultBroad {
    /// Both players
    pub player_info_list: Vec<PlayerInfo>,
}

/// Role snapshot. Position, facing and hit points are scaled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleMessage {
    /// Role id
    pub role_id: RoleId,
    /// Login name
    #[serde(default)]
    pub user_name: String,
    /// Weapon
    pub weapon_type: WeaponId,
    /// Position x
    pub x: WireInt,
    /// Position y
    pub y: WireInt,
    /// Facing, degrees
    pub face_angle: WireInt,
    /// Hit points
    pub hp: WireInt,
}

impl RoleMessage {
    /// Decoded position.
    pub fn position(&self, scale: WireScale) -> Vec2 {
        Vec2::new(scale.decode(self.x), scale.decode(self.y))
    }

    /// Decoded facing.
    pub fn facing_deg(&self, scale: WireScale) -> f64 {
        scale.decode(self.face_angle)
    }

    /// Decoded hit points.
    pub fn hit_points(&self, scale: WireScale) -> f64 {
        scale.decode(self.hp)
    }
}

/// Battle begins (10002).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleStartBroad {
    /// Starting roles
    pub roles: Vec<RoleMessage>,
}

/// Round resolved (10003).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleResultBroad {
    /// Roles after the round
    pub roles: Vec<RoleMessage>,
    /// Winner, or 0 while the match goes on
    #[serde(default)]
    pub win_role_id: RoleId,
}

impl BattleResultBroad {
    /// Winner, if one was declared.
    pub fn winner(&self) -> Option<RoleId> {
        (self.win_role_id > 0).then_some(self.win_role_id)
    }
}

/// Phase change (10004).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleStateBroad {
    /// New phase
    pub battle_state: BattlePhase,
}

/// Payload-less frame body.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Empty {}

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Join the queue with a weapon.
    ApplyBattle(ApplyBattleReq),

    /// Leave the queue.
    CancelMatch,

    /// Round command.
    Operation(OperationReq),

    /// Battle loaded, or a resync request.
    LoadBattleReady,
}

impl ClientMessage {
    /// Message code.
    pub fn code(&self) -> MessageCode {
        match self {
            ClientMessage::ApplyBattle(_) => APPLY_BATTLE_REQ,
            ClientMessage::CancelMatch => CANCEL_MATCH_REQ,
            ClientMessage::Operation(_) => OPERATION_REQ,
            ClientMessage::LoadBattleReady => LOAD_BATTLE_READY_REQ,
        }
    }

    /// Code of the matching response.
    pub fn response_code(&self) -> MessageCode {
        response_code(self.code())
    }

    /// Serialize to a JSON frame.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        let code = self.code();
        match self {
            ClientMessage::ApplyBattle(body) => frame(code, body),
            ClientMessage::Operation(body) => frame(code, body),
            ClientMessage::CancelMatch | ClientMessage::LoadBattleReady => frame(code, &Empty {}),
        }
    }

    #[cfg(test)]
    fn from_json(s: &str) -> Result<Self, ProtocolError> {
        let (code, value) = split_frame(s)?;
        Ok(match code {
            APPLY_BATTLE_REQ => ClientMessage::ApplyBattle(payload(code, value)?),
            CANCEL_MATCH_REQ => ClientMessage::CancelMatch,
            OPERATION_REQ => ClientMessage::Operation(payload(code, value)?),
            LOAD_BATTLE_READY_REQ => ClientMessage::LoadBattleReady,
            other => return Err(ProtocolError::UnknownId(other as u64)),
        })
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Battle application accepted.
    ApplyBattle(ApplyBattleResp),

    /// Queue left.
    CancelMatch,

    /// Round command verdict.
    Operation(OperationResp),

    /// Ready acknowledged.
    LoadBattleReady,

    /// A request failed.
    Error(ErrorMessage),

    /// Opponent found.
    MatchResult(MatchResultBroad),

    /// Battle begins.
    BattleStart(BattleStartBroad),

    /// Round resolved.
    BattleResult(BattleResultBroad),

    /// Phase change.
    BattleState(BattleStateBroad),
}

impl ServerMessage {
    /// Message code.
    pub fn code(&self) -> MessageCode {
        match self {
            ServerMessage::ApplyBattle(_) => APPLY_BATTLE_RESP,
            ServerMessage::CancelMatch => CANCEL_MATCH_RESP,
            ServerMessage::Operation(_) => OPERATION_RESP,
            ServerMessage::LoadBattleReady => LOAD_BATTLE_READY_RESP,
            ServerMessage::Error(_) => ERROR_MESSAGE,
            ServerMessage::MatchResult(_) => MATCH_RESULT_BROAD,
            ServerMessage::BattleStart(_) => BATTLE_START_BROAD,
            ServerMessage::BattleResult(_) => BATTLE_RESULT_BROAD,
            ServerMessage::BattleState(_) => BATTLE_STATE_BROAD,
        }
    }

    /// Does this message change match state?
    pub fn affects_match(&self) -> bool {
        matches!(
            self,
            ServerMessage::MatchResult(_)
                | ServerMessage::BattleStart(_)
                | ServerMessage::BattleResult(_)
                | ServerMessage::BattleState(_)
        )
    }

    /// Deserialize from a JSON frame. The `id` is read first and selects
    /// the payload decoder; unknown fields are ignored.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        let (code, value) = split_frame(s)?;
        Ok(match code {
            APPLY_BATTLE_RESP => ServerMessage::ApplyBattle(payload(code, value)?),
            CANCEL_MATCH_RESP => ServerMessage::CancelMatch,
            OPERATION_RESP => ServerMessage::Operation(payload(code, value)?),
            LOAD_BATTLE_READY_RESP => ServerMessage::LoadBattleReady,
            ERROR_MESSAGE => ServerMessage::Error(payload(code, value)?),
            MATCH_RESULT_BROAD => ServerMessage::MatchResult(payload(code, value)?),
            BATTLE_START_BROAD => ServerMessage::BattleStart(payload(code, value)?),
            BATTLE_RESULT_BROAD => ServerMessage::BattleResult(payload(code, value)?),
            BATTLE_STATE_BROAD => ServerMessage::BattleState(payload(code, value)?),
            other => return Err(ProtocolError::UnknownId(other as u64)),
        })
    }
}

// =============================================================================
// FRAME HELPERS
// =============================================================================

fn frame<T: Serialize>(code: MessageCode, body: &T) -> Result<String, ProtocolError> {
    let mut object = match serde_json::to_value(body)? {
        Value::Object(object) => object,
        _ => Map::new(),
    };
    object.insert("id".to_string(), Value::from(code));
    Ok(Value::Object(object).to_string())
}

fn split_frame(s: &str) -> Result<(MessageCode, Value), ProtocolError> {
    let value: Value = serde_json::from_str(s)?;
    let id = value
        .as_object()
        .ok_or(ProtocolError::NotAnObject)?
        .get("id")
        .and_then(Value::as_u64)
        .ok_or(ProtocolError::MissingId)?;
    let code = MessageCode::try_from(id).map_err(|_| ProtocolError::UnknownId(id))?;
    Ok((code, value))
}

fn payload<T: DeserializeOwned>(code: MessageCode, value: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(value).map_err(|source| ProtocolError::Payload { code, source })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_frame_fields() {
        let scale = WireScale::default();
        let msg = ClientMessage::Operation(OperationReq::new(2, Vec2::new(105.0, -35.0), 90.0, scale));

        let json = msg.to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["id"], 4001);
        assert_eq!(value["roleId"], 2);
        assert_eq!(value["x"], 105000);
        assert_eq!(value["y"], -35000);
        assert_eq!(value["faceAngle"], 90000);
    }

    #[test]
    fn test_client_message_json_roundtrip() {
        for msg in [
            ClientMessage::ApplyBattle(ApplyBattleReq { weapon_type: 3 }),
            ClientMessage::CancelMatch,
            ClientMessage::LoadBattleReady,
        ] {
            let json = msg.to_json().unwrap();
            assert_eq!(ClientMessage::from_json(&json).unwrap(), msg);
        }
        assert_eq!(ClientMessage::CancelMatch.to_json().unwrap(), r#"{"id":3001}"#);
    }

    #[test]
    fn test_decode_battle_result() {
        let json = r#"{
            "id": 10003,
            "winRoleId": 0,
            "roles": [
                {"roleId":1,"userName":"ana","weaponType":0,"x":0,"y":0,"faceAngle":0,"hp":5000},
                {"roleId":2,"userName":"bo","weaponType":4,"x":30500,"y":-1000,"faceAngle":180000,"hp":3500,"buff":7}
            ],
            "serverTime": 123
        }"#;
        let msg = ServerMessage::from_json(json).unwrap();
        let ServerMessage::BattleResult(result) = msg else {
            panic!("Wrong message type");
        };

        let scale = WireScale::default();
        assert_eq!(result.winner(), None);
        assert_eq!(result.roles[1].position(scale), Vec2::new(30.5, -1.0));
        assert_eq!(result.roles[1].facing_deg(scale), 180.0);
        assert_eq!(result.roles[1].hit_points(scale), 3.5);
    }

    #[test]
    fn test_decode_state_and_match_result() {
        let msg = ServerMessage::from_json(r#"{"id":10004,"battleState":3}"#).unwrap();
        assert_eq!(
            msg,
            ServerMessage::BattleState(BattleStateBroad { battle_state: BattlePhase::WaitAction })
        );
        assert!(msg.affects_match());

        let msg = ServerMessage::from_json(
            r#"{"id":10001,"playerInfoList":[{"playerId":9,"userName":"ana","nickName":"","roleId":1,"weaponType":2,"weaponUseCountMap":{"2":14}}]}"#,
        )
        .unwrap();
        let ServerMessage::MatchResult(result) = msg else {
            panic!("Wrong message type");
        };
        assert_eq!(result.player_info_list[0].display_name(), "ana");
        assert_eq!(result.player_info_list[0].weapon_use_count_map.get(&2), Some(&14));
    }

    #[test]
    fn test_decode_error_message() {
        let msg = ServerMessage::from_json(r#"{"id":9999,"reqId":4001,"errorCode":12}"#).unwrap();
        assert_eq!(msg, ServerMessage::Error(ErrorMessage { req_id: 4001, error_code: 12 }));
        assert!(!msg.affects_match());
    }

    #[test]
    fn test_decode_rejects_bad_frames() {
        assert!(matches!(ServerMessage::from_json("not json"), Err(ProtocolError::Json(_))));
        assert!(matches!(ServerMessage::from_json("[1,2]"), Err(ProtocolError::NotAnObject)));
        assert!(matches!(ServerMessage::from_json(r#"{"x":1}"#), Err(ProtocolError::MissingId)));
        assert!(matches!(ServerMessage::from_json(r#"{"id":"2002"}"#), Err(ProtocolError::MissingId)));
        assert!(matches!(ServerMessage::from_json(r#"{"id":7777}"#), Err(ProtocolError::UnknownId(7777))));
        // Requests are not valid server frames
        assert!(matches!(ServerMessage::from_json(r#"{"id":2001,"weaponType":1}"#), Err(ProtocolError::UnknownId(2001))));
        assert!(matches!(
            ServerMessage::from_json(r#"{"id":10004,"battleState":12}"#),
            Err(ProtocolError::Payload { code: BATTLE_STATE_BROAD, .. })
        ));
        assert!(matches!(
            ServerMessage::from_json(r#"{"id":2002}"#),
            Err(ProtocolError::Payload { code: APPLY_BATTLE_RESP, .. })
        ));
    }

    #[test]
    fn test_response_codes() {
        assert_eq!(ClientMessage::CancelMatch.response_code(), CANCEL_MATCH_RESP);
        assert_eq!(ClientMessage::LoadBattleReady.response_code(), LOAD_BATTLE_READY_RESP);
        assert_eq!(response_code(OPERATION_REQ), OPERATION_RESP);
    }
}
