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

/// Single-quoted preview of captured output, cut at `max_bytes`.
pub fn preview(text: &str, max_bytes: usize) -> String {
    let cut = truncate_string(text, max_bytes);
    if cut.len() < text.len() {
        format!("'{cut}...' ({} bytes)", text.len())
    } else {
        format!("'{cut}'")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_string("héllo", 2), "h");
        assert_eq!(truncate_string("hello", 10), "hello");
    }

    #[test]
    fn preview_marks_truncation() {
        assert_eq!(preview("abc", 10), "'abc'");
        assert_eq!(preview("abcdef", 3), "'abc...' (6 bytes)");
    }

    #[test]
    fn display_path_prefers_relative() {
        let base = Path::new("/work");
        assert_eq!(display_path(Path::new("/work/out.py"), Some(base)), "out.py");
        assert_eq!(display_path(Path::new("/elsewhere/out.py"), Some(base)), "/elsewhere/out.py");
    }
}
