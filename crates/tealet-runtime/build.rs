//! Build script for tealet-runtime
//!
//! Merges compile-time stack defaults:
//! 1. Start with library defaults
//! 2. If TEALET_CONFIG_RS is set, parse that file for overrides
//! 3. User values win over defaults
//! 4. Write OUT_DIR/tealet_merged_config.rs
//!
//! The override file only needs the constants it changes, e.g.
//! `pub const STACK_SIZE: usize = 1024 * 1024;`

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

struct ConfigParam {
    name: &'static str,
    rust_type: &'static str,
    default_value: &'static str,
}

const CONFIG_PARAMS: &[ConfigParam] = &[
    ConfigParam {
        name: "STACK_SIZE",
        rust_type: "usize",
        default_value: "256 * 1024",
    },
    ConfigParam {
        name: "GUARD_PAGES",
        rust_type: "usize",
        default_value: "1",
    },
    ConfigParam {
        name: "MIN_STACK_SIZE",
        rust_type: "usize",
        default_value: "16 * 1024",
    },
];

fn main() {
    let Ok(out_dir) = env::var("OUT_DIR") else {
        panic!("OUT_DIR not set");
    };
    let dest_path = Path::new(&out_dir).join("tealet_merged_config.rs");

    let mut config: HashMap<&str, String> = CONFIG_PARAMS
        .iter()
        .map(|p| (p.name, p.default_value.to_string()))
        .collect();

    let user_path = env::var("TEALET_CONFIG_RS").ok();
    if let Some(path) = &user_path {
        println!("cargo:rerun-if-changed={}", path);
        match fs::read_to_string(path) {
            Ok(content) => {
                parse_and_merge(&content, &mut config);
                println!("cargo:warning=Using custom tealet config: {}", path);
            }
            Err(e) => {
                println!(
                    "cargo:warning=Failed to read TEALET_CONFIG_RS ({}): {}",
                    path, e
                );
            }
        }
    }
    println!("cargo:rerun-if-env-changed=TEALET_CONFIG_RS");
    println!("cargo:rerun-if-changed=build.rs");

    let output = generate_config(&config, user_path.is_some());
    if let Err(e) = fs::write(&dest_path, output) {
        panic!("failed to write {}: {}", dest_path.display(), e);
    }
}

/// Merge `pub const NAME: TYPE = VALUE;` lines for known parameters
fn parse_and_merge(content: &str, config: &mut HashMap<&'static str, String>) {
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with("//") || !line.starts_with("pub const ") {
            continue;
        }
        let Some((name, value)) = parse_const_line(line) else {
            continue;
        };
        match CONFIG_PARAMS.iter().find(|p| p.name == name) {
            Some(param) => {
                config.insert(param.name, value);
            }
            None => println!("cargo:warning=Unknown tealet config parameter: {}", name),
        }
    }
}

fn parse_const_line(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix("pub const ")?.trim();
    let colon_pos = rest.find(':')?;
    let name = rest[..colon_pos].trim().to_string();
    let eq_pos = rest.find('=')?;
    let semi_pos = rest.rfind(';').unwrap_or(rest.len());
    let value = rest[eq_pos + 1..semi_pos].trim().to_string();
    Some((name, value))
}

fn generate_config(config: &HashMap<&str, String>, has_user: bool) -> String {
    let mut output = String::new();
    output.push_str("// Auto-generated by build.rs - do not edit\n");
    output.push_str("// Stack defaults merged from library values");
    if has_user {
        output.push_str(" and TEALET_CONFIG_RS");
    }
    output.push_str("\n\n");

    for param in CONFIG_PARAMS {
        let value = config
            .get(param.name)
            .map(String::as_str)
            .unwrap_or(param.default_value);
        output.push_str(&format!(
            "pub const {}: {} = {};\n",
            param.name, param.rust_type, value
        ));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_const_line() {
        let result = parse_const_line("pub const GUARD_PAGES: usize = 2;");
        assert_eq!(result, Some(("GUARD_PAGES".into(), "2".into())));

        let result = parse_const_line("pub const STACK_SIZE: usize = 1024 * 1024;");
        assert_eq!(result, Some(("STACK_SIZE".into(), "1024 * 1024".into())));
    }

    #[test]
    fn test_parse_and_merge() {
        let mut config: HashMap<&str, String> = HashMap::new();
        config.insert("STACK_SIZE", "256 * 1024".into());

        let user_config = r#"
            // smaller stacks for the stress run
            pub const STACK_SIZE: usize = 64 * 1024;
            pub const NOT_A_KNOB: usize = 1;
        "#;
        parse_and_merge(user_config, &mut config);

        assert_eq!(config.get("STACK_SIZE"), Some(&"64 * 1024".to_string()));
        assert!(!config.contains_key("NOT_A_KNOB"));
    }
}
