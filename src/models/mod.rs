//! Data models exposed by the API.
//!
//! Users are serialized as JSON into the object store; files are described by
//! metadata the store reports. Both serialize naturally via `serde`.

pub mod file;
pub mod user;
