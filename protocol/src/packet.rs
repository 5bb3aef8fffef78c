use serde::{Deserialize, Serialize};

/// First frame on a control connection. Authenticates the client and tells
/// the server which city/location it is reporting from (consumed by the
/// out-of-scope HTTP lookup front-end, not by the tunnel fabric itself).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auth {
    #[serde(rename = "ProtoVersion")]
    pub proto_version: String,
    #[serde(rename = "Token")]
    pub token: String,
    #[serde(rename = "CityCode")]
    pub city_code: String,
    #[serde(rename = "GpsLat")]
    pub gps_lat: f64,
    #[serde(rename = "GpsLit")]
    pub gps_lit: f64,
}

/// Server's reply to `Auth`. A non-empty `error` means the server refused
/// the session and will close the connection right after sending this.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthResp {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "ClientId")]
    pub client_id: String,
    #[serde(rename = "Error")]
    pub error: String,
}

/// Server asks the client to open a fresh proxy connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReqProxy {}

/// First frame on a proxy connection, naming the control session it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegProxy {
    #[serde(rename = "ClientId")]
    pub client_id: String,
}

/// Sent by the server on a proxy connection right before raw byte splicing
/// begins. `url` is reserved and never populated by this server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartProxy {
    #[serde(rename = "Url")]
    pub url: String,
    #[serde(rename = "ClientAddr")]
    pub client_addr: String,
}

/// Keep-alive, sent by the client; the server only ever answers with `Pong`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ping {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pong {}
