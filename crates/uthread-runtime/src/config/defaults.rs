//! Compile-time defaults, generated by build.rs

include!(concat!(env!("OUT_DIR"), "/ut_merged_config.rs"));
