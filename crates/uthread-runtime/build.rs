//! Build script for uthread-runtime
//!
//! Produces `OUT_DIR/ut_merged_config.rs`, the compile-time defaults for
//! `RuntimeConfig`:
//! 1. Start from the library defaults below
//! 2. If `UT_CONFIG_RS` names a file, read its `pub const NAME: TYPE = VALUE;`
//!    lines and let them override matching defaults
//! 3. Emit one `pub const` per parameter
//!
//! Environment variables still override these at runtime.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

struct Param {
    name: &'static str,
    ty: &'static str,
    default: &'static str,
}

const PARAMS: &[Param] = &[
    // 0 means one worker per online core
    Param { name: "NUM_WORKERS", ty: "usize", default: "0" },
    Param { name: "PREEMPT_INTERVAL_US", ty: "u64", default: "10_000" },
    Param { name: "STACK_SIZE", ty: "usize", default: "256 * 1024" },
    Param { name: "ALTSTACK_SIZE", ty: "usize", default: "64 * 1024" },
    Param { name: "CLEANUP_STACK_SIZE", ty: "usize", default: "64 * 1024" },
    Param { name: "IDLE_SLEEP_US", ty: "u64", default: "1_000" },
    Param { name: "JOIN_SPINS", ty: "u32", default: "128" },
    Param { name: "DEBUG_LOGGING", ty: "bool", default: "false" },
];

fn main() {
    let out_dir = env::var("OUT_DIR").expect("OUT_DIR not set");
    let dest = Path::new(&out_dir).join("ut_merged_config.rs");

    let mut values: HashMap<&'static str, String> = PARAMS
        .iter()
        .map(|p| (p.name, p.default.to_string()))
        .collect();

    println!("cargo:rerun-if-env-changed=UT_CONFIG_RS");
    let user_file = env::var("UT_CONFIG_RS").ok();

    if let Some(path) = &user_file {
        println!("cargo:rerun-if-changed={}", path);
        match fs::read_to_string(path) {
            Ok(content) => {
                for (name, value) in parse_overrides(&content) {
                    match PARAMS.iter().find(|p| p.name == name) {
                        Some(p) => {
                            values.insert(p.name, value);
                        }
                        None => println!("cargo:warning=Unknown config parameter: {}", name),
                    }
                }
                println!("cargo:warning=Using custom config: {}", path);
            }
            Err(e) => println!("cargo:warning=Failed to read UT_CONFIG_RS ({}): {}", path, e),
        }
    }

    fs::write(&dest, render(&values, user_file.as_deref()))
        .expect("Failed to write merged config");
}

/// Extract `(NAME, VALUE)` from every `pub const NAME: TYPE = VALUE;` line
fn parse_overrides(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.starts_with("//"))
        .filter_map(parse_const_line)
        .collect()
}

fn parse_const_line(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix("pub const ")?;
    let (name, rest) = rest.split_once(':')?;
    let (_ty, value) = rest.split_once('=')?;
    let value = value.trim().trim_end_matches(';').trim();
    if value.is_empty() {
        return None;
    }
    Some((name.trim().to_string(), value.to_string()))
}

fn render(values: &HashMap<&'static str, String>, user_file: Option<&str>) -> String {
    let mut out = String::from("// Generated by uthread-runtime/build.rs\n");
    if let Some(path) = user_file {
        out.push_str(&format!("// Overrides merged from {}\n", path));
    }
    out.push('\n');
    for p in PARAMS {
        out.push_str(&format!("pub const {}: {} = {};\n", p.name, p.ty, values[p.name]));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_const_line() {
        assert_eq!(
            parse_const_line("pub const NUM_WORKERS: usize = 8;"),
            Some(("NUM_WORKERS".into(), "8".into()))
        );
        assert_eq!(
            parse_const_line("pub const STACK_SIZE: usize = 512 * 1024;"),
            Some(("STACK_SIZE".into(), "512 * 1024".into()))
        );
        assert_eq!(parse_const_line("const X: u8 = 1;"), None);
        assert_eq!(parse_const_line("pub const X: u8 = ;"), None);
    }

    #[test]
    fn test_parse_overrides_skips_comments() {
        let user = r#"
            // pub const JOIN_SPINS: u32 = 1;
            pub const PREEMPT_INTERVAL_US: u64 = 2_000;
        "#;
        assert_eq!(
            parse_overrides(user),
            vec![("PREEMPT_INTERVAL_US".to_string(), "2_000".to_string())]
        );
    }
}
