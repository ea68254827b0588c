/// Characters treated as separators in addition to Unicode whitespace.
const SEPARATORS: &[char] = &['.', '-', '_', '(', ')', '[', ']', '+'];

/// Map raw filename/caption text to its canonical search key.
///
/// Lower-cases the input and collapses every maximal run of separator
/// characters (`. - _ ( ) [ ] +` and whitespace) to a single space, with
/// leading/trailing space trimmed. Idempotent: applying it twice yields
/// the same key.
///
/// # Examples
///
/// ```
/// use feedvault::normalize::normalize;
///
/// assert_eq!(normalize("Fast+and+Furious"), "fast and furious");
/// assert_eq!(normalize("KGF.Chapter-2_(Tamil)"), "kgf chapter 2 tamil");
/// ```
pub fn normalize(text: &str) -> String {
    let mut key = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.chars() {
        if c.is_whitespace() || SEPARATORS.contains(&c) {
            pending_space = !key.is_empty();
            continue;
        }
        if pending_space {
            key.push(' ');
            pending_space = false;
        }
        for lower in c.to_lowercase() {
            key.push(lower);
        }
    }

    key
}
