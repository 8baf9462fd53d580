//! Engine.IO v4 / Socket.IO v5 text packet codec
//!
//! Engine.IO framing (first char): `0` open, `1` close, `2` ping, `3` pong,
//! `4` message, `6` noop. A Socket.IO packet rides inside a `4` message:
//! `40` connect, `41` disconnect, `42[...]` event, `44` connect error.
//! Events may carry a namespace (`42/chat,[...]`) and an ack id (`4217[...]`).

use serde::Deserialize;
use serde_json::Value;

/// Engine.IO pong, sent in reply to a server ping.
pub const PONG: &str = "3";

/// Handshake parameters from the Engine.IO open packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    pub ping_interval: u64,
    pub ping_timeout: u64,
}

/// Decoded inbound packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(OpenInfo),
    Close,
    Ping,
    Pong,
    Noop,
    Connect,
    Disconnect,
    Event { name: String, data: Value },
    ConnectError(Value),
    /// Anything we do not understand; logged and skipped by the caller.
    Unknown(String),
}

/// Decode one text frame.
pub fn decode(frame: &str) -> Packet {
    let Some(kind) = frame.chars().next() else {
        return Packet::Unknown(String::new());
    };
    let body = &frame[kind.len_utf8()..];
    let decoded = match kind {
        '0' => serde_json::from_str(body).ok().map(Packet::Open),
        '1' => Some(Packet::Close),
        '2' => Some(Packet::Ping),
        '3' => Some(Packet::Pong),
        '4' => decode_socketio(body),
        '6' => Some(Packet::Noop),
        _ => None,
    };
    decoded.unwrap_or_else(|| Packet::Unknown(frame.to_string()))
}

fn decode_socketio(body: &str) -> Option<Packet> {
    let kind = body.chars().next()?;
    let rest = strip_namespace(&body[kind.len_utf8()..]);
    match kind {
        '0' => Some(Packet::Connect),
        '1' => Some(Packet::Disconnect),
        '2' => {
            let start = rest.find('[')?;
            // Digits before the array are an ack id, which we do not use.
            if !rest[..start].chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            let items: Vec<Value> = serde_json::from_str(&rest[start..]).ok()?;
            let mut items = items.into_iter();
            let Value::String(name) = items.next()? else {
                return None;
            };
            let data = items.next().unwrap_or(Value::Null);
            Some(Packet::Event { name, data })
        }
        '4' => Some(Packet::ConnectError(
            serde_json::from_str(rest).unwrap_or(Value::Null),
        )),
        _ => None,
    }
}

/// Drop a `/namespace,` prefix if present.
fn strip_namespace(s: &str) -> &str {
    if s.starts_with('/') {
        s.find(',').map_or("", |i| &s[i + 1..])
    } else {
        s
    }
}

/// Socket.IO connect packet for the default namespace, with optional auth.
pub fn encode_connect(auth: Option<&Value>) -> String {
    match auth {
        Some(auth) => format!("40{}", auth),
        None => "40".to_string(),
    }
}

/// Socket.IO event packet: `42["name", data]`.
pub fn encode_event(name: &str, data: &Value) -> String {
    format!("42{}", Value::Array(vec![Value::String(name.to_string()), data.clone()]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_open() {
        let frame = r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;
        match decode(frame) {
            Packet::Open(info) => {
                assert_eq!(info.sid, "abc");
                assert_eq!(info.ping_interval, 25000);
                assert_eq!(info.ping_timeout, 20000);
            }
            other => panic!("expected open, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_control_packets() {
        assert_eq!(decode("2"), Packet::Ping);
        assert_eq!(decode("3"), Packet::Pong);
        assert_eq!(decode("1"), Packet::Close);
        assert_eq!(decode("6"), Packet::Noop);
        assert_eq!(decode("40"), Packet::Connect);
        assert_eq!(decode(r#"40{"sid":"xyz"}"#), Packet::Connect);
        assert_eq!(decode("41"), Packet::Disconnect);
        assert_eq!(decode(""), Packet::Unknown(String::new()));
        assert_eq!(decode("9zz"), Packet::Unknown("9zz".to_string()));
    }

    #[test]
    fn test_decode_event_variants() {
        let expected = Packet::Event {
            name: "typing".to_string(),
            data: json!({"senderId": "a"}),
        };
        assert_eq!(decode(r#"42["typing",{"senderId":"a"}]"#), expected);
        assert_eq!(decode(r#"4217["typing",{"senderId":"a"}]"#), expected);
        assert_eq!(decode(r#"42/chat,["typing",{"senderId":"a"}]"#), expected);
        assert_eq!(
            decode(r#"42["ping"]"#),
            Packet::Event {
                name: "ping".to_string(),
                data: Value::Null
            }
        );
        assert!(matches!(decode(r#"42[17]"#), Packet::Unknown(_)));
        assert!(matches!(decode(r#"42x["a"]"#), Packet::Unknown(_)));
    }

    #[test]
    fn test_decode_connect_error() {
        assert_eq!(
            decode(r#"44{"message":"not authorized"}"#),
            Packet::ConnectError(json!({"message": "not authorized"}))
        );
    }

    #[test]
    fn test_encode() {
        assert_eq!(encode_connect(None), "40");
        assert_eq!(
            encode_connect(Some(&json!({"token": "t"}))),
            r#"40{"token":"t"}"#
        );
        assert_eq!(encode_event("join", &json!("u1")), r#"42["join","u1"]"#);
    }
}
