use std::path::PathBuf;

use dirs_next::home_dir;

/// Expands a leading `~` in a user-supplied path to the home directory.
///
/// Both `~/` and `~\` separators are recognised. Without a known home
/// directory the trimmed path is returned as is.
pub fn expand_tilde(path: &str) -> PathBuf {
    let trimmed = path.trim();
    let remainder = match trimmed {
        "~" => Some(""),
        _ => trimmed.strip_prefix("~/").or_else(|| trimmed.strip_prefix("~\\")),
    };
    match (remainder, home_dir()) {
        (Some(""), Some(home)) => home,
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(trimmed),
    }
}
