//! Environment variable utilities
//!
//! Runtime knobs are read from `UT_*` variables. A variable that is unset
//! or fails to parse falls back to the compiled-in default.
//!
//! ```ignore
//! use uthread_core::env::{env_get, env_get_bool};
//!
//! let workers: usize = env_get("UT_NUM_WORKERS", 4);
//! let debug = env_get_bool("UT_DEBUG", false);
//! ```

use std::str::FromStr;

/// Parse a boolean flag value; `None` for anything unrecognized
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Get environment variable parsed as `T`, or `default`
#[inline]
pub fn env_get<T: FromStr>(key: &str, default: T) -> T {
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable parsed as `T` if set and valid
#[inline]
pub fn env_get_opt<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Get environment variable as boolean
///
/// `1/true/yes/on` and `0/false/no/off` are recognized case-insensitively;
/// anything else, including unset, yields `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_bool(&v))
        .unwrap_or(default)
}

/// Get environment variable as string, or `default`
#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test uses its own variable names; the process env is shared
    // across test threads.

    #[test]
    fn test_unset_falls_back() {
        let val: usize = env_get("__UT_TEST_UNSET_1__", 42);
        assert_eq!(val, 42);
        assert!(env_get_opt::<u64>("__UT_TEST_UNSET_1__").is_none());
        assert!(env_get_bool("__UT_TEST_UNSET_1__", true));
        assert_eq!(env_get_str("__UT_TEST_UNSET_1__", "hi"), "hi");
    }

    #[test]
    fn test_set_values_parse() {
        std::env::set_var("__UT_TEST_NUM__", " 123 ");
        assert_eq!(env_get::<usize>("__UT_TEST_NUM__", 0), 123);
        std::env::remove_var("__UT_TEST_NUM__");
    }

    #[test]
    fn test_invalid_number_falls_back() {
        std::env::set_var("__UT_TEST_BAD_NUM__", "twelve");
        assert_eq!(env_get::<u32>("__UT_TEST_BAD_NUM__", 7), 7);
        std::env::remove_var("__UT_TEST_BAD_NUM__");
    }

    #[test]
    fn test_parse_bool() {
        for t in ["1", "TRUE", "Yes", "on"] {
            assert_eq!(parse_bool(t), Some(true), "{}", t);
        }
        for f in ["0", "false", "NO", "off", ""] {
            assert_eq!(parse_bool(f), Some(false), "{}", f);
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_env_get_bool_unrecognized_uses_default() {
        std::env::set_var("__UT_TEST_BOOL__", "maybe");
        assert!(env_get_bool("__UT_TEST_BOOL__", true));
        assert!(!env_get_bool("__UT_TEST_BOOL__", false));
        std::env::remove_var("__UT_TEST_BOOL__");
    }
}
