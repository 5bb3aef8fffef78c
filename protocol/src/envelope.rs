use crate::error::Error;
use crate::packet::{Auth, AuthResp, Ping, Pong, RegProxy, ReqProxy, StartProxy};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// The closed sum type every frame on the tunnel transport decodes into.
/// Nothing above the codec should ever see the raw envelope.
#[derive(Debug, Clone)]
pub enum Message {
    Auth(Auth),
    AuthResp(AuthResp),
    ReqProxy(ReqProxy),
    RegProxy(RegProxy),
    StartProxy(StartProxy),
    Ping(Ping),
    Pong(Pong),
}

impl Message {
    /// The `Type` string this variant is tagged with on the wire.
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::Auth(_) => "Auth",
            Message::AuthResp(_) => "AuthResp",
            Message::ReqProxy(_) => "ReqProxy",
            Message::RegProxy(_) => "RegProxy",
            Message::StartProxy(_) => "StartProxy",
            Message::Ping(_) => "Ping",
            Message::Pong(_) => "Pong",
        }
    }
}

/// Wire record: a short type discriminator plus an opaque payload carrying
/// the JSON encoding of the typed body. `Payload` is embedded as-is (not
/// double-encoded as a string), matching the original envelope's use of
/// `json.RawMessage`.
#[derive(Serialize, Deserialize)]
struct Envelope<'a> {
    #[serde(rename = "Type")]
    r#type: &'a str,
    #[serde(rename = "Payload", borrow)]
    payload: &'a RawValue,
}

#[derive(Deserialize)]
struct OwnedEnvelope {
    #[serde(rename = "Type")]
    r#type: String,
    #[serde(rename = "Payload")]
    payload: Box<RawValue>,
}

/// Serialize a message into the bytes of one envelope (no length prefix).
pub fn encode_envelope(message: &Message) -> Result<Vec<u8>, Error> {
    let payload = match message {
        Message::Auth(body) => serde_json::to_string(body)?,
        Message::AuthResp(body) => serde_json::to_string(body)?,
        Message::ReqProxy(body) => serde_json::to_string(body)?,
        Message::RegProxy(body) => serde_json::to_string(body)?,
        Message::StartProxy(body) => serde_json::to_string(body)?,
        Message::Ping(body) => serde_json::to_string(body)?,
        Message::Pong(body) => serde_json::to_string(body)?,
    };
    let payload = RawValue::from_string(payload)?;
    let envelope = Envelope {
        r#type: message.type_name(),
        payload: &payload,
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Parse one envelope's bytes into the message it carries.
pub fn decode_envelope(bytes: &[u8]) -> Result<Message, Error> {
    let envelope: OwnedEnvelope = serde_json::from_slice(bytes)?;
    let payload = envelope.payload.get();
    let message = match envelope.r#type.as_str() {
        "Auth" => Message::Auth(serde_json::from_str(payload)?),
        "AuthResp" => Message::AuthResp(serde_json::from_str(payload)?),
        "ReqProxy" => Message::ReqProxy(serde_json::from_str(payload)?),
        "RegProxy" => Message::RegProxy(serde_json::from_str(payload)?),
        "StartProxy" => Message::StartProxy(serde_json::from_str(payload)?),
        "Ping" => Message::Ping(serde_json::from_str(payload)?),
        "Pong" => Message::Pong(serde_json::from_str(payload)?),
        other => return Err(Error::UnknownType(other.to_string())),
    };
    Ok(message)
}
