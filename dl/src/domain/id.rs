//! Stable identifier generation

use uuid::Uuid;

/// Generate a stable id of the form `<prefix>-<slug>-<uuid7 tail>`
///
/// The slug keeps ids human-scannable in logs and state dumps; the uuid
/// tail keeps them unique and time-sortable.
pub fn generate_id(prefix: &str, title: &str) -> String {
    let slug: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .take(4)
        .collect::<Vec<_>>()
        .join("-");

    let tail = Uuid::now_v7().simple().to_string();
    let tail = &tail[tail.len() - 8..];

    if slug.is_empty() {
        format!("{}-{}", prefix, tail)
    } else {
        format!("{}-{}-{}", prefix, slug, tail)
    }
}
