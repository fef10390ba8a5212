/// Reuse an existing product on JSON intake instead of get-or-create.
pub const PRODUCT_DUPLICATE_CHECK: &str = "ENABLE_PRODUCT_DUPLICATE_CHECK";

/// `"true"`, `"1"` and `"yes"` (any case) are true; everything else is false.
pub fn parse_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthy_values() {
        for v in ["true", "TRUE", "True", "1", "yes", "Yes"] {
            assert!(parse_truthy(v), "{v} should be truthy");
        }
        for v in ["false", "0", "no", "", "on", "enabled"] {
            assert!(!parse_truthy(v), "{v} should be falsy");
        }
    }
}
