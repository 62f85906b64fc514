//! Recovering a JSON payload from free-form model output.

use serde_json::Value;
use tracing::debug;

use crate::models::receipt::Receipt;

const FENCE: &str = "```";
const JSON_FENCE: &str = "```json";

/// Locate the JSON candidate inside model text.
///
/// 1. After the last ```` ```json ```` marker, up to the next fence.
/// 2. Otherwise between the first two ```` ``` ```` fences.
/// 3. Otherwise the whole text.
///
/// An unterminated fence runs to the end of the text.
pub fn extract_json_payload(text: &str) -> &str {
    let candidate = if let Some(pos) = text.rfind(JSON_FENCE) {
        let body = &text[pos + JSON_FENCE.len()..];
        body.split(FENCE).next().unwrap_or(body)
    } else if text.contains(FENCE) {
        text.split(FENCE).nth(1).unwrap_or_default()
    } else {
        text
    };

    candidate.trim()
}

/// Parse model output into a receipt.
///
/// Returns `None` when no JSON object can be recovered; malformed output is
/// an expected outcome, not an error.
pub fn parse_response(text: &str) -> Option<Receipt> {
    let payload = extract_json_payload(text);

    let value: Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(e) => {
            debug!("Model output is not JSON ({}): {:.80}", e, payload);
            return None;
        }
    };

    let receipt = Receipt::from_value(value);
    if receipt.is_none() {
        debug!("Model JSON is not an object");
    }
    receipt
}
