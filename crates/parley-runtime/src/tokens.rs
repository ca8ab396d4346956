//! Token estimation for backends without a tokenizer endpoint.

/// Roughly four characters per token, never less than one.
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() / 4).max(1)
}

#[cfg(test)]
mod tests {
    use super::estimate_tokens;

    #[test]
    fn short_text_counts_as_one_token() {
        assert_eq!(estimate_tokens(""), 1);
        assert_eq!(estimate_tokens("hi"), 1);
    }

    #[test]
    fn counts_characters_not_bytes() {
        assert_eq!(estimate_tokens("abcdefgh"), 2);
        assert_eq!(estimate_tokens("ééééééééé"), 2);
    }
}
