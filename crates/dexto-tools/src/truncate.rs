//! Output truncation for LLM context hygiene.

/// Maximum output size in characters before truncation.
const MAX_OUTPUT_CHARS: usize = 30_000;

/// Truncate tool output to stay within LLM context limits.
///
/// If `output` exceeds the cap, it is cut at a char boundary and a notice
/// is appended.
#[must_use]
pub fn truncate_output(output: String) -> String {
    if output.len() <= MAX_OUTPUT_CHARS {
        return output;
    }
    let mut cut = MAX_OUTPUT_CHARS;
    while !output.is_char_boundary(cut) {
        cut -= 1;
    }
    let omitted = output.len() - cut;
    format!(
        "{}\n\n[output truncated: {omitted} characters omitted]",
        &output[..cut]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_output_untouched() {
        assert_eq!(truncate_output("hello".to_owned()), "hello");
    }

    #[test]
    fn test_long_output_truncated_with_notice() {
        let long = "x".repeat(40_000);
        let truncated = truncate_output(long);
        assert!(truncated.len() < 40_000);
        assert!(truncated.contains("output truncated"));
    }

    #[test]
    fn test_respects_char_boundaries() {
        let long = "é".repeat(20_000);
        let truncated = truncate_output(long);
        assert!(truncated.contains("output truncated"));
    }
}
