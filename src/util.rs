use std::path::Path;

/// Try to enable ANSI escape sequence support on Windows consoles.
/// Returns true if enabling succeeded (or platform likely already supports ANSI), false otherwise.
#[cfg(windows)]
pub fn try_enable_ansi_on_windows() -> bool {
    enable_ansi_support::enable_ansi_support().is_ok()
}

// On non-Windows platforms the crate is not required and ANSI support is typically available
// by default in terminals; provide a no-op fallback to avoid referencing the optional crate.
#[cfg(not(windows))]
pub fn try_enable_ansi_on_windows() -> bool {
    false
}

/// Truncate a long path from the middle, keeping `start_length` leading and
/// `end_length` trailing segments around a literal `...` segment.
///
/// `/home/user/some/long/path/to/somewhere/far/away` becomes
/// `/home/user/some/.../far/away`. Paths that fit are returned unchanged.
pub fn truncate_path_between(input: &str, start_length: usize, end_length: usize) -> String {
    let parts: Vec<&str> = input.split(['/', '\\']).filter(|p| !p.is_empty()).collect();
    if parts.len() <= start_length + end_length {
        return input.to_string();
    }
    let lead = if input.starts_with('/') { "/" } else { "" };
    format!(
        "{}{}/.../{}",
        lead,
        parts[..start_length].join("/"),
        parts[parts.len() - end_length..].join("/")
    )
}

/// Display form of a replay path for report headers.
pub fn display_replay_path(p: &Path) -> String {
    truncate_path_between(&p.to_string_lossy(), 3, 2)
}

/// Truncate `s` to at most `length` characters, `ending` included.
pub fn truncate_string(s: &str, length: usize, ending: &str) -> String {
    if s.chars().count() <= length {
        return s.to_string();
    }
    let ending_len = ending.chars().count();
    if length <= ending_len {
        return ending.chars().take(length).collect();
    }
    let mut out: String = s.chars().take(length - ending_len).collect();
    out.push_str(ending);
    out
}

/// Center `s` in `width` columns using `fill`. Odd padding goes to the right.
fn center(s: &str, width: usize, fill: char) -> String {
    let len = s.chars().count();
    if len >= width {
        return s.to_string();
    }
    let pad = width - len;
    let left = pad / 2;
    let mut out = String::with_capacity(width);
    out.extend(std::iter::repeat_n(fill, left));
    out.push_str(s);
    out.extend(std::iter::repeat_n(fill, pad - left));
    out
}

/// Center `s` on a line of `line_length` filled with `pad_char`, keeping
/// `ws_pad_count` spaces of breathing room around the text. Ends with a newline.
///
/// `center_pad_string("abcd", 12, 4, '.')` gives `"..  abcd  ..\n"`.
pub fn center_pad_string(s: &str, line_length: usize, ws_pad_count: usize, pad_char: char) -> String {
    let ws_padded = center(s, s.chars().count() + ws_pad_count, ' ');
    let mut line = center(&ws_padded, line_length, pad_char);
    line.push('\n');
    line
}

/// Convert seconds to `MM:SS`.
pub fn seconds_to_mm_ss(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
