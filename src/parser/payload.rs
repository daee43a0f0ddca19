//! 正確パーサーの出力（JSON）の判定とデコード

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ParseError;

/// `{ "error": true, "message": ..., "type": ... }` 形式か
pub fn is_error_payload(value: &Value) -> bool {
    value.get("error").is_some_and(|e| !e.is_null() && e != &Value::Bool(false))
}

/// 種類ごとの成功形状にデコードする
pub fn decode_payload<T: DeserializeOwned>(value: Value) -> Result<T, ParseError> {
    if is_error_payload(&value) {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("error")
            .to_string();
        return Err(ParseError::Reported { kind, message });
    }
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::kind::{ComponentsMetadata, RoutesMetadata};
    use serde_json::json;

    #[test]
    fn test_error_payload_is_rejected() {
        let value = json!({ "error": true, "message": "syntax error", "type": "SyntaxError" });
        assert!(is_error_payload(&value));
        let result: Result<ComponentsMetadata, _> = decode_payload(value);
        match result {
            Err(ParseError::Reported { kind, message }) => {
                assert_eq!(kind, "SyntaxError");
                assert_eq!(message, "syntax error");
            }
            other => panic!("unexpected result: {:?}", other.map(|m| m.components.len())),
        }
    }

    #[test]
    fn test_success_payload() {
        let value = json!({
            "components": [{
                "name": "button",
                "moduleName": "MyAppWeb.CoreComponents",
                "line": 12,
                "attributes": [{ "name": "type", "type": "string", "required": false }],
                "slots": [{ "name": "inner_block", "required": true }]
            }]
        });
        assert!(!is_error_payload(&value));
        let metadata: ComponentsMetadata = decode_payload(value).unwrap();
        assert_eq!(metadata.components.len(), 1);
        assert_eq!(metadata.components[0].attributes[0].attr_type, "string");
        assert!(metadata.components[0].slots[0].required);
    }

    #[test]
    fn test_shape_mismatch_is_decode_error() {
        let value = json!({ "routes": [{ "path": 42 }] });
        let result: Result<RoutesMetadata, _> = decode_payload(value);
        assert!(matches!(result, Err(ParseError::Decode(_))));
    }
}
