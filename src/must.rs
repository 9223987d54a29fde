//! Panicking convenience over the `Result` API
//!
//! The core never panics on query outcomes. Callers who prefer to treat a
//! failure as a bug (tests, scripts, seed code) opt in here.

use std::fmt::Display;

/// Unwrap a result, panicking with the error's message on failure.
#[track_caller]
pub fn must<T, E: Display>(result: Result<T, E>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => panic!("{err}"),
    }
}

/// Method form of [`must`], e.g. `query.count().await.must()`.
pub trait MustExt<T> {
    fn must(self) -> T;
}

impl<T, E: Display> MustExt<T> for Result<T, E> {
    #[track_caller]
    fn must(self) -> T {
        must(self)
    }
}
