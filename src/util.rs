use std::path::Path;

pub fn display_path(path: &Path, base: Option<&Path>) -> String {
    if let Some(base) = base {
        if let Ok(relative) = path.strip_prefix(base) {
            return relative.display().to_string();
        }
    }
    path.display().to_string()
}

pub fn truncate_string(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut truncated = String::new();
    for ch in text.chars() {
        if truncated.len() + ch.len_utf8() > max_bytes {
            break;
        }
        truncated.push(ch);
    }
    truncated
}

/// Render a dotted version as a name-safe fragment (`1.2.0` -> `1-2-0`).
pub fn dashed_version(version: &str) -> String {
    version.replace('.', "-")
}

/// Render a free-form label as a name-safe fragment (`db setup` -> `db-setup`).
pub fn dashed_label(label: &str) -> String {
    label.replace(' ', "-")
}
