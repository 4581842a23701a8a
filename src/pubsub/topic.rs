//! Topic filter matching.
//!
//! Topics are `/`-separated levels. A filter may use `+` to match exactly one
//! level and a trailing `#` to match any number of remaining levels
//! (including none). Topics starting with `$` are reserved for the broker and
//! are not matched by a leading wildcard.
//!
//! [`is_valid_filter`] and [`is_valid_name`] gate every filter the client
//! registers and every topic it publishes to.

/// Whether `filter` contains wildcard levels.
pub fn is_filter(filter: &str) -> bool {
    filter.split('/').any(|level| level == "+" || level == "#")
}

/// Whether `filter` may be subscribed to.
///
/// It must be non-empty and free of NUL. `+` must fill a whole level and `#`
/// must fill the last one.
///
/// ```rust
/// use libpubsub::pubsub::topic::is_valid_filter;
///
/// assert!(is_valid_filter("sensors/+/temperature"));
/// assert!(!is_valid_filter("sensors/#/temperature"));
/// assert!(!is_valid_filter("sensors/porch+"));
/// ```
pub fn is_valid_filter(filter: &str) -> bool {
    if filter.is_empty() || filter.contains('\0') {
        return false;
    }
    let mut levels = filter.split('/').peekable();
    while let Some(level) = levels.next() {
        if level.contains('#') && (level != "#" || levels.peek().is_some()) {
            return false;
        }
        if level.contains('+') && level != "+" {
            return false;
        }
    }
    true
}

/// Whether `topic` may be published to: non-empty, no NUL and no wildcards.
pub fn is_valid_name(topic: &str) -> bool {
    !topic.is_empty() && !topic.contains(['\0', '+', '#'])
}

/// Whether `topic` is matched by `filter`.
///
/// # Examples
///
/// ```rust
/// use libpubsub::pubsub::topic::matches;
///
/// assert!(matches("sensors/+/temperature", "sensors/porch/temperature"));
/// assert!(matches("sensors/#", "sensors"));
/// assert!(!matches("sensors/+", "sensors/porch/temperature"));
/// ```
pub fn matches(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return filter_levels.next().is_none(),
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
