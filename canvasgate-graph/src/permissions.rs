//! `/me/permissions` response parsing

use crate::error::GraphError;
use serde_json::Value;
use std::collections::HashMap;

/// Scope name to granted flag, as reported by the platform
pub type PermissionMap = HashMap<String, bool>;

/// Parse a permissions listing.
///
/// Two shapes are accepted:
///
/// - `{"data": [{"permission": "email", "status": "granted"}, ...]}`
/// - `{"data": [{"email": 1, "publish_stream": 1}]}` (legacy flag map)
///
/// In the legacy shape only an exact `1` (or `true`) counts as granted.
pub fn parse_permissions(body: &Value) -> Result<PermissionMap, GraphError> {
    let entries = body
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            GraphError::InvalidResponse("permissions response has no data array".into())
        })?;

    let mut granted = PermissionMap::new();

    for entry in entries {
        let object = entry.as_object().ok_or_else(|| {
            GraphError::InvalidResponse("permission entry is not an object".into())
        })?;

        if let Some(name) = object.get("permission").and_then(Value::as_str) {
            let status = object.get("status").and_then(Value::as_str);
            granted.insert(name.to_string(), status == Some("granted"));
            continue;
        }

        for (name, flag) in object {
            let is_granted = flag.as_i64() == Some(1) || flag.as_bool() == Some(true);
            granted.insert(name.clone(), is_granted);
        }
    }

    Ok(granted)
}
