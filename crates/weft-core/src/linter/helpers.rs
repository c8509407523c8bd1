//! Text utilities shared by lint rules.

/// Replaces the contents of single-quoted strings and line comments
/// with spaces, so rules can scan for syntax without matching inside
/// literals. Byte offsets are preserved.
pub(crate) fn mask_quoted(sql: &str) -> String {
    let bytes = sql.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    let mut in_string = false;
    let mut in_comment = false;
    while i < bytes.len() {
        let b = bytes[i];
        if in_comment {
            if b == b'\n' {
                in_comment = false;
                out.push(b);
            } else {
                out.push(b' ');
            }
        } else if in_string {
            if b == b'\'' {
                // Doubled quote is an escaped quote inside the string.
                if bytes.get(i + 1) == Some(&b'\'') {
                    out.push(b' ');
                    out.push(b' ');
                    i += 2;
                    continue;
                }
                in_string = false;
                out.push(b'\'');
            } else {
                out.push(if b == b'\n' { b'\n' } else { b' ' });
            }
        } else if b == b'\'' {
            in_string = true;
            out.push(b'\'');
        } else if b == b'-' && bytes.get(i + 1) == Some(&b'-') {
            in_comment = true;
            out.push(b' ');
        } else {
            out.push(b);
        }
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|_| sql.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_string_contents() {
        assert_eq!(
            mask_quoted("SELECT 'from x' FROM t"),
            "SELECT '      ' FROM t"
        );
    }

    #[test]
    fn masks_escaped_quotes() {
        assert_eq!(mask_quoted("'it''s'"), "'     '");
    }

    #[test]
    fn masks_line_comments_to_newline() {
        assert_eq!(mask_quoted("a -- select\nb"), "a          \nb");
    }

    #[test]
    fn preserves_length() {
        let sql = "SELECT 'x''y' -- c\nFROM t";
        assert_eq!(mask_quoted(sql).len(), sql.len());
    }
}
