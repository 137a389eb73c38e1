/// Decode a text file. Invalid UTF-8 sequences are replaced, never rejected.
pub fn extract_txt(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let text = String::from_utf8(bytes.to_vec())
        .unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned());
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_simple_text() {
        let text = extract_txt(b"Hello, world!\nThis is a test file.");
        assert!(text.contains("Hello, world!"));
        assert!(text.ends_with("test file."));
    }

    #[test]
    fn extract_utf8_text() {
        let content = "Comunicação de sinistro: prazo de 7 dias".as_bytes();
        assert_eq!(extract_txt(content), "Comunicação de sinistro: prazo de 7 dias");
    }

    #[test]
    fn extract_empty_text() {
        assert_eq!(extract_txt(b""), "");
    }

    #[test]
    fn trims_whitespace_and_bom() {
        assert_eq!(extract_txt(b"  \n  Hello  \n  "), "Hello");
        assert_eq!(extract_txt(b"\xEF\xBB\xBFcom BOM"), "com BOM");
    }

    #[test]
    fn invalid_bytes_are_replaced() {
        assert_eq!(extract_txt(b"caf\xE9"), "caf\u{FFFD}");
    }
}
