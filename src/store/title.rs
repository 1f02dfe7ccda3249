//! Display titles for sessions.

/// Title given to a session until its first user message arrives.
pub const DEFAULT_CHAT_TITLE: &str = "New Chat";
/// Shown for session records that carry no title at all.
pub const UNTITLED_CHAT_TITLE: &str = "Untitled Chat";
pub const TITLE_WORD_LIMIT: usize = 4;
pub const TITLE_TRUNCATION_MARKER: &str = "...";

/// First [`TITLE_WORD_LIMIT`] whitespace-delimited words of `text`, single-space
/// joined, with `"..."` appended iff more words followed.
///
/// ```
/// use chat_relay::store::derive_title;
///
/// assert_eq!(derive_title("What is the capital of France"), "What is the capital...");
/// assert_eq!(derive_title("  hello   world "), "hello world");
/// ```
pub fn derive_title(text: &str) -> String {
    let mut words = text.split_whitespace();
    let mut title = words
        .by_ref()
        .take(TITLE_WORD_LIMIT)
        .collect::<Vec<_>>()
        .join(" ");
    if words.next().is_some() {
        title.push_str(TITLE_TRUNCATION_MARKER);
    }
    title
}

/// Whether a session with this title may still be renamed from content.
pub fn is_default_title(title: Option<&str>) -> bool {
    match title {
        None => true,
        Some(t) => t == DEFAULT_CHAT_TITLE,
    }
}
