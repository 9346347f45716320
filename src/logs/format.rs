use crate::error::{Result, WardenError};

/// Translate an ecosystem date format into a chrono strftime string
///
/// The ecosystem files use moment-style tokens ("YYYY-MM-DD HH:mm:ss Z").
/// Translation happens once at config load; the compiled strftime string is
/// what the log router renders on every line.
///
/// Supported tokens: YYYY, YY, MM, DD, HH, hh, mm, ss, SSS, Z, A, a.
/// Any other alphabetic character is rejected so a typo fails at startup
/// rather than producing silently wrong stamps.
pub fn compile_date_format(fmt: &str) -> Result<String> {
    let mut out = String::with_capacity(fmt.len() + 8);
    let chars: Vec<char> = fmt.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let rest = &fmt[char_offset(&chars, i)..];

        let (token, strftime) = if rest.starts_with("YYYY") {
            (4, "%Y")
        } else if rest.starts_with("YY") {
            (2, "%y")
        } else if rest.starts_with("MM") {
            (2, "%m")
        } else if rest.starts_with("DD") {
            (2, "%d")
        } else if rest.starts_with("HH") {
            (2, "%H")
        } else if rest.starts_with("hh") {
            (2, "%I")
        } else if rest.starts_with("mm") {
            (2, "%M")
        } else if rest.starts_with("SSS") {
            (3, "%3f")
        } else if rest.starts_with("ss") {
            (2, "%S")
        } else if rest.starts_with('Z') {
            (1, "%:z")
        } else if rest.starts_with('A') {
            (1, "%p")
        } else if rest.starts_with('a') {
            (1, "%P")
        } else {
            let c = chars[i];
            if c.is_ascii_alphabetic() {
                return Err(WardenError::ConfigValidation(format!(
                    "Unsupported token '{}' in log_date_format '{}'",
                    c, fmt
                )));
            }
            if c == '%' {
                out.push_str("%%");
            } else {
                out.push(c);
            }
            i += 1;
            continue;
        };

        out.push_str(strftime);
        i += token;
    }

    Ok(out)
}

fn char_offset(chars: &[char], idx: usize) -> usize {
    chars[..idx].iter().map(|c| c.len_utf8()).sum()
}
