//! Task ID generation and inspection.
//!
//! IDs look like `T3k7x9-implement-parser`:
//! 1. A single uppercase prefix letter naming the kind of task
//! 2. A 4 to 6 character lowercase base-36 token (6 when generated here)
//! 3. A hyphen and a slug derived from the title
//!
//! The prefix plus token is the short ID, which is what people type.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

use crate::error::{Error, Result};

/// Characters a token is drawn from.
const BASE36_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of generated tokens.
pub const TOKEN_LENGTH: usize = 6;

/// Maximum slug length.
pub const MAX_SLUG_LEN: usize = 50;

/// Attempts `generate_unique_id` makes before giving up.
const MAX_UNIQUE_ATTEMPTS: usize = 64;

/// Full task ID.
pub static TASK_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z][0-9a-z]{4,6})-[a-zA-Z0-9-]+$").unwrap());

/// Short task ID.
pub static SHORT_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][0-9a-z]{4,6}$").unwrap());

/// Global counter for deterministic ID generation in tests.
static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Whether to use deterministic IDs (for testing).
static USE_DETERMINISTIC_IDS: AtomicBool = AtomicBool::new(false);

/// Enable deterministic ID generation for testing.
///
/// When enabled, tokens count up from `000000` instead of being random.
pub fn enable_deterministic_ids() {
    USE_DETERMINISTIC_IDS.store(true, Ordering::SeqCst);
    TEST_COUNTER.store(0, Ordering::SeqCst);
}

/// Disable deterministic ID generation.
pub fn disable_deterministic_ids() {
    USE_DETERMINISTIC_IDS.store(false, Ordering::SeqCst);
}

/// Error when a title produces an empty slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTitle(pub String);

impl std::fmt::Display for InvalidTitle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid title {:?}: produces empty slug", self.0)
    }
}

impl std::error::Error for InvalidTitle {}

/// Error when an ID prefix is not a single uppercase letter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidPrefix(pub String);

impl std::fmt::Display for InvalidPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid ID prefix {:?}: must be a single uppercase letter", self.0)
    }
}

impl std::error::Error for InvalidPrefix {}

/// Error when no unused short ID could be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdSpaceExhausted {
    /// Prefix that was requested.
    pub prefix: String,
    /// Number of tokens tried.
    pub attempts: usize,
}

impl std::fmt::Display for IdSpaceExhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "could not find an unused {} ID after {} attempts",
            self.prefix, self.attempts
        )
    }
}

impl std::error::Error for IdSpaceExhausted {}

/// Convert a title to a slug.
///
/// The slug is created by:
/// 1. Converting to lowercase
/// 2. Replacing non-alphanumeric characters with hyphens
/// 3. Collapsing multiple hyphens into one
/// 4. Trimming leading/trailing hyphens
/// 5. Truncating to 50 characters
#[must_use]
pub fn slugify(title: &str) -> String {
    slugify_with_max_len(title, MAX_SLUG_LEN)
}

/// Convert a title to a slug with a custom maximum length.
#[must_use]
pub fn slugify_with_max_len(title: &str, max_len: usize) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_was_hyphen = true; // Start true to avoid leading hyphen

    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }

    if slug.ends_with('-') {
        slug.pop();
    }

    // Slug is ASCII, so byte truncation is safe
    if slug.len() > max_len {
        slug.truncate(max_len);
        while slug.ends_with('-') {
            slug.pop();
        }
    }

    slug
}

/// Encode `value` as a zero-padded base-36 token.
#[allow(clippy::cast_possible_truncation)]
fn encode_base36(mut value: u64) -> String {
    let mut token = vec![b'0'; TOKEN_LENGTH];
    for slot in token.iter_mut().rev() {
        *slot = BASE36_CHARS[(value % 36) as usize];
        value /= 36;
    }
    String::from_utf8_lossy(&token).into_owned()
}

/// Generate a random base-36 token.
#[must_use]
pub fn generate_token() -> String {
    if USE_DETERMINISTIC_IDS.load(Ordering::SeqCst) {
        return encode_base36(TEST_COUNTER.fetch_add(1, Ordering::SeqCst));
    }
    let mut rng = rand::thread_rng();
    (0..TOKEN_LENGTH)
        .map(|_| char::from(BASE36_CHARS[rng.gen_range(0..BASE36_CHARS.len())]))
        .collect()
}

fn check_prefix(prefix: &str) -> Result<()> {
    let mut chars = prefix.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_uppercase() => Ok(()),
        _ => Err(Error::task(InvalidPrefix(prefix.to_string()))),
    }
}

/// Generate a task ID from a prefix and a title.
///
/// # Errors
///
/// Returns an error if the prefix is not one uppercase letter or the title
/// has no characters a slug can be made from.
pub fn generate_id(prefix: &str, title: &str) -> Result<String> {
    check_prefix(prefix)?;
    let slug = slugify(title);
    if slug.is_empty() {
        return Err(Error::task(InvalidTitle(title.to_string())));
    }
    Ok(format!("{prefix}{}-{slug}", generate_token()))
}

/// Generate a task ID whose short form collides with none of `existing`.
///
/// # Errors
///
/// Returns an error for a bad prefix or title, or if every attempt collided.
pub fn generate_unique_id<I, S>(prefix: &str, title: &str, existing: I) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let taken: HashSet<String> = existing.into_iter().map(|id| short_id(id.as_ref())).collect();
    for _ in 0..MAX_UNIQUE_ATTEMPTS {
        let id = generate_id(prefix, title)?;
        if !taken.contains(&short_id(&id)) {
            return Ok(id);
        }
    }
    Err(Error::task(IdSpaceExhausted { prefix: prefix.to_string(), attempts: MAX_UNIQUE_ATTEMPTS }))
}

/// Whether `id` has the full `<PREFIX><token>-<slug>` shape.
#[must_use]
pub fn is_valid_task_id(id: &str) -> bool {
    TASK_ID_PATTERN.is_match(id)
}

/// Short form (prefix + token) of a task ID. Anything else is returned trimmed.
#[must_use]
pub fn short_id(id: &str) -> String {
    let id = id.trim();
    TASK_ID_PATTERN
        .captures(id)
        .and_then(|caps| caps.get(1))
        .map_or_else(|| id.to_string(), |m| m.as_str().to_string())
}

fn id_components(path: &str) -> impl Iterator<Item = &str> {
    path.split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != ".")
        .filter(|part| TASK_ID_PATTERN.is_match(part))
}

/// First path component shaped like a task ID.
///
/// `tasks/T3k7x-example/T3k7x-example.md` gives `T3k7x-example`.
#[must_use]
pub fn extract_task_id_from_path(path: &str) -> Option<&str> {
    id_components(path).next()
}

/// Last path component shaped like a task ID.
#[must_use]
pub fn extract_last_task_id_from_path(path: &str) -> Option<&str> {
    id_components(path).last()
}
