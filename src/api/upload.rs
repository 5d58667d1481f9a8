use std::sync::OnceLock;

pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

pub fn allowed_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .is_some_and(|(_, ext)| ALLOWED_EXTENSIONS.iter().any(|a| ext.eq_ignore_ascii_case(a)))
}

pub fn disallowed_message() -> String {
    format!(
        "File type not allowed. Allowed types: {}",
        ALLOWED_EXTENSIONS.join(", ")
    )
}

/// Reduce a client-supplied filename to a safe ASCII name.
///
/// Path separators become word breaks, whitespace runs become `_`, anything
/// outside `[A-Za-z0-9_.-]` is dropped and leading/trailing dots and
/// underscores are stripped. May return an empty string.
pub fn secure_filename(filename: &str) -> String {
    static UNSAFE_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = UNSAFE_RE.get_or_init(|| regex::Regex::new(r"[^A-Za-z0-9_.-]").unwrap());

    let spaced = filename.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    re.replace_all(&joined, "")
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}
