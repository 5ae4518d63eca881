use std::env;
use std::path::{Component, Path, PathBuf};

/// Makes `path` absolute against the current directory and removes `.` and
/// `..` components without touching the file system.
pub fn absolute_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().unwrap_or_default().join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Absolute source path as stored on address entries.
pub fn resolve_path(path: impl AsRef<Path>) -> String {
    absolute_path(path).to_string_lossy().into_owned()
}

/// Key used for per-file line lists and source comparisons.
pub fn normalize_path(path: impl AsRef<Path>) -> String {
    let absolute = absolute_path(path);

    // dunce keeps Windows paths free of the \\?\ prefix
    let canonical = dunce::canonicalize(&absolute).unwrap_or(absolute);

    let mut final_path = canonical.to_string_lossy().into_owned();
    if cfg!(windows) {
        final_path = final_path.replace('\\', "/").to_uppercase();
    }
    final_path
}

/// Parses `$hex`, `0xhex` or decimal text.
pub fn parse_int(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = if let Some(hex) = digits.strip_prefix('$') {
        i64::from_str_radix(hex, 16).ok()?
    } else if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        digits.parse::<i64>().ok()?
    };
    Some(if negative { -value } else { value })
}
