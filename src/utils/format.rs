use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

/// Characters `encodeURIComponent` leaves alone.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Human readable size, e.g. `1536 -> "1.5 KB"`.
pub fn format_bytes(bytes: i64) -> String {
    if bytes <= 0 {
        return "0 Bytes".to_string();
    }

    let mut scaled = bytes as f64;
    let mut exponent = 0;
    while scaled >= 1024.0 && exponent < UNITS.len() - 1 {
        scaled /= 1024.0;
        exponent += 1;
    }
    let rounded = (scaled * 100.0).round() / 100.0;

    format!("{} {}", rounded, UNITS[exponent])
}

/// Wraps user input in `%...%` for ILIKE, escaping the pattern metacharacters.
pub fn like_pattern(input: &str) -> String {
    let mut pattern = String::with_capacity(input.len() + 2);
    pattern.push('%');
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Percent-encodes everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
pub fn encode_uri_component(input: &str) -> String {
    utf8_percent_encode(input, COMPONENT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_sizes_like_the_dashboard() {
        assert_eq!(format_bytes(0), "0 Bytes");
        assert_eq!(format_bytes(512), "512 Bytes");
        assert_eq!(format_bytes(1024), "1 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(10 * 1024 * 1024), "10 MB");
        assert_eq!(format_bytes(1_234_567), "1.18 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3 GB");
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("laporan"), "%laporan%");
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }

    #[test]
    fn uri_component_encoding() {
        assert_eq!(encode_uri_component("laporan akhir (final).pdf"), "laporan%20akhir%20(final).pdf");
        assert_eq!(encode_uri_component("surat\"x\".pdf"), "surat%22x%22.pdf");
        assert_eq!(encode_uri_component("é"), "%C3%A9");
        assert_eq!(encode_uri_component("a-b_c.d!e~f*g'h"), "a-b_c.d!e~f*g'h");
        assert_eq!(encode_uri_component("50%/x?y=1&z#"), "50%25%2Fx%3Fy%3D1%26z%23");
    }
}
