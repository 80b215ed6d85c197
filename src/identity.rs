use crate::retell_types::CallContext;

use serde_json::Value;

/// The directory keys contacts on bare US numbers; anything longer is
/// country-code noise we strip from the left.
const PHONE_DIGITS: usize = 10;

/// Reduce raw phone text to the rightmost ten digits.
///
/// Total over arbitrary input: formatting, country codes and junk all
/// collapse to either a digit string or `None`.  Applying it to its own
/// output changes nothing, so normalized values can be re-normalized freely.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    if digits.len() > PHONE_DIGITS {
        Some(digits[digits.len() - PHONE_DIGITS..].to_string())
    } else {
        Some(digits)
    }
}

/// True for tool-call text the platform failed to fill in: empty strings,
/// unsubstituted `{{...}}` template markers, or a literal "undefined" that
/// leaked out of the agent runtime.
fn is_unusable(value: &str) -> bool {
    value.is_empty() || value.contains("{{") || value.contains("undefined")
}

/// Drop an optional tool-call field when the platform sent junk instead of
/// a real value.
pub fn sanitize_field(value: Option<String>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    if is_unusable(trimmed) {
        return None;
    }
    Some(trimmed.to_string())
}

/// Pick the caller's phone out of an explicit tool argument, falling back
/// to call metadata.
///
/// The explicit argument wins only when it is a JSON string free of
/// template junk; raw numbers and other shapes are discarded.  Metadata is
/// consulted in fixed order: `from_number`, then `customer_number`.  The
/// returned text is raw, not normalized.
pub fn resolve_caller_phone(
    explicit: Option<&Value>,
    call: Option<&CallContext>,
) -> Option<String> {
    if let Some(value) = explicit {
        if let Some(text) = value.as_str() {
            let trimmed = text.trim();
            if !is_unusable(trimmed) {
                return Some(trimmed.to_string());
            }
        }
    }
    let call = call?;
    for candidate in [call.from_number.as_deref(), call.customer_number.as_deref()] {
        if let Some(text) = candidate {
            let trimmed = text.trim();
            if !is_unusable(trimmed) {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}
