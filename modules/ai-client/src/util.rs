/// Strip markdown code fences from a model response.
pub fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_blocks() {
        assert_eq!(strip_code_blocks("```json\n[]\n```"), "[]");
        assert_eq!(strip_code_blocks("```\n[]\n```"), "[]");
        assert_eq!(strip_code_blocks("[]"), "[]");
    }
}
