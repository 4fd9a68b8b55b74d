//! Shell quoting for remote command strings

/// Quote `arg` so a POSIX shell passes it through as one word
pub fn quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | ':' | '=' | '+' | ','))
    {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_words_untouched() {
        assert_eq!(quote("/root/image_model/model.tflite"), "/root/image_model/model.tflite");
    }

    #[test]
    fn test_spaces_and_quotes() {
        assert_eq!(quote("my cat.png"), "'my cat.png'");
        assert_eq!(quote("it's"), r"'it'\''s'");
        assert_eq!(quote(""), "''");
    }
}
