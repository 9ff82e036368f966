/// タグ生成応答のスキーマ。
use once_cell::sync::Lazy;
use serde_json::{Value, json};

/// タグ生成LLMが返すべきオブジェクトの契約。
///
/// `tags`は文字列配列。件数の上限はコード側で切り詰めるため、
/// スキーマでは形状のみを拘束する。
pub(crate) static TAGS_RESPONSE_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "properties": {
            "tags": {
                "type": "array",
                "items": {
                    "type": "string",
                    "minLength": 1,
                    "maxLength": 32
                }
            }
        },
        "required": ["tags"],
        "additionalProperties": true
    })
});
