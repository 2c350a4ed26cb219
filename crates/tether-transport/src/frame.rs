//! Wire frames exchanged by the loopback transport.
//!
//! Frames are JSON objects. A request carries an echo id, the path and the
//! close data; the response repeats the echo id and carries either the
//! result or the caller-visible projection of the error:
//!
//! ```text
//! → {"echo": 3, "path": ["users", 7], "data": {"name": "ada"}}
//! ← {"echo": 3, "ok": true}
//! ← {"echo": 3, "error": {"kind": "NotExposed", "message": "...", "type": "route", "route": ["users"]}}
//! ```
//!
//! An absent `data` or `ok` field stands for `undefined`; an explicit `null`
//! stays `null`.

use serde::{Deserialize, Deserializer, Serialize};

use tether_core::{Error, Path, Result, Value};

/// A close request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub echo: u64,
    pub path: serde_json::Value,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<serde_json::Value>,
}

impl RequestFrame {
    pub fn new(echo: u64, path: &Path, data: &Value) -> Result<Self> {
        Ok(Self {
            echo,
            path: path.to_json()?,
            data: encode(data)?,
        })
    }

    /// Decodes the path. Fails with `InvalidPath` unless it is a list.
    pub fn path(&self) -> Result<Path> {
        Path::try_from(Value::from(self.path.clone()))
    }

    pub fn data(&self) -> Value {
        decode(self.data.clone())
    }
}

/// The answer to a [`RequestFrame`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub echo: u64,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub ok: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
}

impl ResponseFrame {
    /// Encodes the outcome of a close.
    ///
    /// Results that cannot be serialized turn into an error response.
    pub fn new(echo: u64, result: Result<Value>) -> Self {
        let encoded = result.and_then(|value| encode(&value));
        match encoded {
            Ok(ok) => Self {
                echo,
                ok,
                error: None,
            },
            Err(err) => Self {
                echo,
                ok: None,
                error: Some(err.to_exposed_json()),
            },
        }
    }

    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(error) => Err(Error::from_exposed_json(error)),
            None => Ok(decode(self.ok)),
        }
    }
}

fn encode(value: &Value) -> Result<Option<serde_json::Value>> {
    match value {
        Value::Undefined => Ok(None),
        value => value.to_json().map(Some),
    }
}

fn decode(json: Option<serde_json::Value>) -> Value {
    json.map(Value::from).unwrap_or_default()
}

/// Keeps an explicit `null` as `Some(Null)`; only a missing field is `None`.
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use tether_core::{ErrorKind, StepKind};

    use super::*;

    #[test]
    fn test_request_preserves_undefined_and_null() {
        let path = Path::from(vec![Value::from("a"), Value::from(1)]);

        let frame = RequestFrame::new(1, &path, &Value::Undefined).unwrap();
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"echo":1,"path":["a",1]}"#);
        let decoded: RequestFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.data(), Value::Undefined);
        assert_eq!(decoded.path().unwrap(), path);

        let frame = RequestFrame::new(2, &path, &Value::Null).unwrap();
        let decoded: RequestFrame =
            serde_json::from_slice(&serde_json::to_vec(&frame).unwrap()).unwrap();
        assert_eq!(decoded.data(), Value::Null);
    }

    #[test]
    fn test_request_rejects_non_list_path() {
        let frame: RequestFrame = serde_json::from_str(r#"{"echo":1,"path":"a"}"#).unwrap();
        let err = frame.path().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidPath));
    }

    #[test]
    fn test_response_outcomes() {
        let ok = ResponseFrame::new(1, Ok(Value::from("done")));
        assert_eq!(ok.clone().into_result().unwrap(), Value::from("done"));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            serde_json::json!({"echo": 1, "ok": "done"})
        );

        let undefined = ResponseFrame::new(2, Ok(Value::Undefined));
        assert_eq!(undefined.into_result().unwrap(), Value::Undefined);

        let path = Path::from(vec![Value::from("a")]);
        let failure = Error::exposed("nope").tag(StepKind::Close, &path, None);
        let err = ResponseFrame::new(3, Err(failure)).into_result().unwrap_err();
        assert_eq!(err.to_string(), "nope");
        assert_eq!(err.trace().unwrap().path, path);
    }

    #[test]
    fn test_unserializable_result_becomes_error() {
        let frame = ResponseFrame::new(4, Ok(Value::from(tether_core::Object::plain())));
        assert!(frame.ok.is_none());
        let err = frame.into_result().unwrap_err();
        assert_eq!(err.to_string(), "Internal error.");
    }
}
