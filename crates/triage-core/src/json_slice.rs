//! Lenient extraction of JSON from generated text.
//!
//! Generators are asked for strict JSON with a "no prose" instruction, but
//! real output still arrives wrapped in code fences or surrounded by
//! chatter often enough that callers parse the widest brace- or
//! bracket-delimited slice instead of the raw text.

/// Widest `{...}` slice of the text, if any.
pub fn object_slice(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Widest `[...]` slice of the text, if any.
pub fn array_slice(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_slice_strips_fences_and_prose() {
        let text = "Sure! Here is the JSON:\n```json\n{\"a\": 1}\n```";
        assert_eq!(object_slice(text), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_array_slice() {
        let text = "```\n[{\"x\": true}]\n```";
        assert_eq!(array_slice(text), Some("[{\"x\": true}]"));
    }

    #[test]
    fn test_no_json_returns_none() {
        assert_eq!(object_slice("no json here"), None);
        assert_eq!(array_slice("still nothing"), None);
    }
}
