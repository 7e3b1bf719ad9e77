use serde_json::Value;
use tracing::{debug, warn};

use super::{Decoded, ImportError};
use crate::task::Todo;

pub fn encode(todos: &[Todo]) -> anyhow::Result<String> {
    let mut out = serde_json::to_string_pretty(todos)?;
    out.push('\n');
    Ok(out)
}

/// `title` a non-blank string, `detail` a string or absent, `checked` a
/// boolean. Other keys are not inspected here.
fn has_import_shape(item: &Value) -> bool {
    let Some(obj) = item.as_object() else {
        return false;
    };
    let title_ok = obj
        .get("title")
        .and_then(Value::as_str)
        .is_some_and(|t| !t.trim().is_empty());
    let detail_ok = matches!(obj.get("detail"), None | Some(Value::Null | Value::String(_)));
    let checked_ok = matches!(obj.get("checked"), Some(Value::Bool(_)));
    title_ok && detail_ok && checked_ok
}

#[tracing::instrument(skip(text))]
pub fn decode(text: &str) -> Result<Decoded, ImportError> {
    let parsed: Value = serde_json::from_str(text)?;
    let Value::Array(items) = parsed else {
        return Err(ImportError::NotAnArray);
    };

    let mut decoded = Decoded::default();
    for (idx, item) in items.into_iter().enumerate() {
        if !has_import_shape(&item) {
            debug!(item = idx, "json item failed shape check");
            decoded.dropped += 1;
            continue;
        }
        match serde_json::from_value::<Todo>(item) {
            Ok(mut todo) => {
                if todo.detail.as_deref() == Some("") {
                    todo.detail = None;
                }
                decoded.candidates.push(todo);
            }
            Err(err) => {
                warn!(item = idx, error = %err, "dropping json item with malformed fields");
                decoded.dropped += 1;
            }
        }
    }

    Ok(decoded)
}
