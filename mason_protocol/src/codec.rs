// Text codec for the session wire grammar.
//
// The wire format is newline-free, pipe- and colon-delimited ASCII, one
// logical message per send call. There is no length prefix or other framing;
// the protocol relies on one send arriving as one receive, which holds for
// small messages on a LAN but is a known fragility of the format. The
// grammar is reproduced exactly for compatibility rather than hardened.
//
// Floats are encoded in shortest-roundtrip form with a mandatory decimal
// point (`1.0`, not `1`); decoding accepts anything `f32::from_str` does,
// so peers emitting `5` or `5.00` interoperate.
//
// Decode failures never reach the receive loop as errors — the caller drops
// the whole message and records a diagnostic.

use std::fmt::Write as _;

use thiserror::Error;

use crate::message::Message;
use crate::types::{BlockKind, PlayerId, Vec3};

/// Why a payload could not be decoded. The offending text is carried for
/// diagnostics; it is never partially applied.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8")]
    NotText,
    #[error("unrecognized message {0:?}")]
    UnknownMessage(String),
    #[error("missing {what} delimiter in {text:?}")]
    MissingDelimiter { what: &'static str, text: String },
    #[error("malformed number {0:?}")]
    BadNumber(String),
    #[error("unknown block type {0:?}")]
    UnknownBlockKind(String),
}

/// Encode a message to its exact wire text.
pub fn encode(message: &Message) -> String {
    match message {
        Message::Join => "JOIN".to_string(),
        Message::Leave => "LEAVE".to_string(),
        Message::AssignId(id) => format!("ASSIGN_ID:{id}"),
        Message::NewPlayer(id) => format!("NEW_PLAYER:{id}"),
        Message::PlayerLeft(id) => format!("PLAYER_LEFT:{id}"),
        Message::Pos { id, position } => {
            let mut out = format!("POS:{id}:");
            write_vec(&mut out, *position);
            out
        }
        Message::BlockAdd { position, kind } => {
            let mut out = String::from("BLOCK:ADD|");
            write_vec(&mut out, *position);
            let _ = write!(out, "|{kind}");
            out
        }
        Message::BlockRemove { position } => {
            let mut out = String::from("BLOCK:REMOVE|");
            write_vec(&mut out, *position);
            out
        }
        Message::MapClear => "MAP:CLEAR".to_string(),
        Message::Ping => "PING".to_string(),
    }
}

/// Decode one received payload. The payload must contain exactly one
/// message — concatenated messages are indistinguishable from garbage in
/// this grammar and fail as `UnknownMessage`.
pub fn decode(payload: &[u8]) -> Result<Message, DecodeError> {
    let text = std::str::from_utf8(payload).map_err(|_| DecodeError::NotText)?;

    match text {
        "JOIN" => return Ok(Message::Join),
        "LEAVE" => return Ok(Message::Leave),
        "MAP:CLEAR" => return Ok(Message::MapClear),
        "PING" => return Ok(Message::Ping),
        _ => {}
    }

    if let Some(rest) = text.strip_prefix("ASSIGN_ID:") {
        return Ok(Message::AssignId(parse_id(rest)?));
    }
    if let Some(rest) = text.strip_prefix("NEW_PLAYER:") {
        return Ok(Message::NewPlayer(parse_id(rest)?));
    }
    if let Some(rest) = text.strip_prefix("PLAYER_LEFT:") {
        return Ok(Message::PlayerLeft(parse_id(rest)?));
    }
    if let Some(rest) = text.strip_prefix("POS:") {
        let (id, coords) = rest
            .split_once(':')
            .ok_or_else(|| DecodeError::MissingDelimiter {
                what: "id/coordinate",
                text: text.to_string(),
            })?;
        return Ok(Message::Pos {
            id: parse_id(id)?,
            position: parse_vec(coords)?,
        });
    }
    if let Some(rest) = text.strip_prefix("BLOCK:ADD|") {
        let (coords, kind) = rest
            .split_once('|')
            .ok_or_else(|| DecodeError::MissingDelimiter {
                what: "position/type",
                text: text.to_string(),
            })?;
        let kind =
            BlockKind::from_name(kind).ok_or_else(|| DecodeError::UnknownBlockKind(kind.into()))?;
        return Ok(Message::BlockAdd {
            position: parse_vec(coords)?,
            kind,
        });
    }
    if let Some(rest) = text.strip_prefix("BLOCK:REMOVE|") {
        return Ok(Message::BlockRemove {
            position: parse_vec(rest)?,
        });
    }

    Err(DecodeError::UnknownMessage(text.to_string()))
}

/// Append `x,y,z` in shortest-roundtrip float form. `{:?}` on f32 always
/// includes a decimal point, so `1.0` stays `1.0` on the wire.
fn write_vec(out: &mut String, v: Vec3) {
    let _ = write!(out, "{:?},{:?},{:?}", v.x, v.y, v.z);
}

fn parse_id(text: &str) -> Result<PlayerId, DecodeError> {
    text.parse::<i32>()
        .map(PlayerId)
        .map_err(|_| DecodeError::BadNumber(text.to_string()))
}

/// Parse a comma-separated float triple. Exactly three fields; each must be
/// a valid f32.
fn parse_vec(text: &str) -> Result<Vec3, DecodeError> {
    let mut parts = text.split(',');
    let x = parse_float(parts.next(), text)?;
    let y = parse_float(parts.next(), text)?;
    let z = parse_float(parts.next(), text)?;
    if parts.next().is_some() {
        return Err(DecodeError::BadNumber(text.to_string()));
    }
    Ok(Vec3::new(x, y, z))
}

fn parse_float(part: Option<&str>, whole: &str) -> Result<f32, DecodeError> {
    let part = part.ok_or_else(|| DecodeError::BadNumber(whole.to_string()))?;
    part.parse::<f32>()
        .map_err(|_| DecodeError::BadNumber(part.to_string()))
}
