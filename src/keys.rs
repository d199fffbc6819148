//! Key layout for everything the service writes into the object store.
//!
//! The store is flat; directories are simulated with prefixes:
//! - `users/{user_id}/profile.json`: serialized user record
//! - `users/{user_id}/files/{filename}`: user-owned blob
//!
//! Filenames are used verbatim. No case folding or escaping happens here, so a
//! filename containing `/` produces a nested key under the user's files prefix.

/// Prefix shared by every key the service owns.
pub const USERS_PREFIX: &str = "users/";

/// Last segment of a profile key.
pub const PROFILE_OBJECT: &str = "profile.json";

const FILES_SEGMENT: &str = "files/";

/// `users/{user_id}/profile.json`
pub fn profile_key(user_id: &str) -> String {
    format!("{USERS_PREFIX}{user_id}/{PROFILE_OBJECT}")
}

/// `users/{user_id}/files/`
pub fn files_prefix(user_id: &str) -> String {
    format!("{USERS_PREFIX}{user_id}/{FILES_SEGMENT}")
}

/// `users/{user_id}/files/{filename}`
pub fn file_key(user_id: &str, filename: &str) -> String {
    format!("{}{}", files_prefix(user_id), filename)
}

/// Return the owning user id if `key` has exactly the profile shape.
///
/// A blob uploaded as `profile.json` lives under `files/` and is not matched.
pub fn profile_owner(key: &str) -> Option<&str> {
    let rest = key.strip_prefix(USERS_PREFIX)?;
    let (user_id, tail) = rest.split_once('/')?;
    (!user_id.is_empty() && tail == PROFILE_OBJECT).then_some(user_id)
}

/// Strip `users/{user_id}/files/` from a listed key for display.
pub fn strip_files_prefix<'a>(key: &'a str, user_id: &str) -> &'a str {
    key.strip_prefix(&files_prefix(user_id)).unwrap_or(key)
}

/// Trailing path segment of a key.
pub fn filename_of(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}
