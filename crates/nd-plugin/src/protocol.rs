//! Wire types for the newline-framed JSON-RPC spoken over a channel
//! plugin's stdin/stdout (spec §4.E "Transport" and §6 "Plugin ABI").

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const METHOD_GET_INFO: &str = "GetInfo";
pub const METHOD_SET_CONFIG: &str = "SetConfig";
pub const METHOD_SEND_NOTIFICATION: &str = "SendNotification";

#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub method: String,
    pub params: Value,
    pub id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    pub id: u64,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelTypeInfo {
    pub name: String,
    #[serde(default)]
    pub config_attrs: Value,
}
