//! Command-line flag tokenizing
//!
//! Turns a raw process command line into a [`ProcessFlags`] map. Supports
//! `--name`, `--name=value` and `--name value`, with optionally double-quoted
//! values. A flag given without a value is recorded as `"true"`.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Value recorded for a flag that appears without a value
pub const BARE_FLAG_VALUE: &str = "true";

fn flag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // A separate value never starts with "--", so `--a --b` yields two bare flags.
        Regex::new(
            r#"(?:^|\s)--([A-Za-z0-9][A-Za-z0-9-]*)(?:=("[^"]*"|\S*)|\s+("[^"]*"|[^\s"-]\S*|-[^\s-]\S*))?"#,
        )
        .expect("flag pattern is a valid regex")
    })
}

/// Flags parsed from a process command line
///
/// Keys carry no leading dashes and are case-sensitive. When a flag repeats,
/// the last occurrence wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessFlags {
    values: BTreeMap<String, String>,
}

impl ProcessFlags {
    /// Parse flags from a raw command line
    ///
    /// Line breaks and runs of whitespace are collapsed first; some process
    /// APIs return command lines wrapped across several lines.
    pub fn parse(command_line: &str) -> Self {
        let collapsed = command_line.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut values = BTreeMap::new();

        for caps in flag_pattern().captures_iter(&collapsed) {
            let name = caps[1].to_string();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| unquote(m.as_str()).to_string())
                .unwrap_or_else(|| BARE_FLAG_VALUE.to_string());
            values.insert(name, value);
        }

        Self { values }
    }

    /// Value of a flag, if present
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Whether the flag appears on the command line at all
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_abc(flags: &ProcessFlags) {
        assert_eq!(flags.get("a"), Some("1"));
        assert_eq!(flags.get("b"), Some("2"));
        assert_eq!(flags.get("c"), Some("true"));
        assert_eq!(flags.len(), 3);
    }

    #[test]
    fn test_parse_all_flag_forms() {
        expect_abc(&ProcessFlags::parse("kubelet --a=1 --b 2 --c"));
    }

    #[test]
    fn test_parse_is_order_independent() {
        let orderings = [
            "--a=1 --b 2 --c",
            "--a=1 --c --b 2",
            "--b 2 --a=1 --c",
            "--b 2 --c --a=1",
            "--c --a=1 --b 2",
            "--c --b 2 --a=1",
        ];
        for cmd in orderings {
            expect_abc(&ProcessFlags::parse(&format!("/usr/bin/kubelet {}", cmd)));
        }
    }

    #[test]
    fn test_parse_tolerates_line_breaks_and_padding() {
        let flags = ProcessFlags::parse("  kubelet\n  --a=1 \r\n\t--b\n   2\n--c   \n");
        expect_abc(&flags);
    }

    #[test]
    fn test_quoted_value_is_one_value() {
        let flags = ProcessFlags::parse(
            r#""C:\Program Files\kubelet.exe" --node-labels "role=worker tier=a" --config="C:\var\lib\kubelet\config.yaml""#,
        );
        assert_eq!(flags.get("node-labels"), Some("role=worker tier=a"));
        assert_eq!(flags.get("config"), Some(r"C:\var\lib\kubelet\config.yaml"));
        assert!(!flags.contains("tier"));
    }

    #[test]
    fn test_last_occurrence_wins() {
        let flags = ProcessFlags::parse("kubelet --v=2 --v=4");
        assert_eq!(flags.get("v"), Some("4"));
    }

    #[test]
    fn test_negative_number_is_a_value() {
        let flags = ProcessFlags::parse("kubelet --oom-score-adj -999");
        assert_eq!(flags.get("oom-score-adj"), Some("-999"));
    }

    #[test]
    fn test_dashes_inside_values_are_not_flags() {
        let flags = ProcessFlags::parse("kubelet --node-ip=10.0.0.1 --hostname ip--10-0-0-1");
        assert_eq!(flags.get("hostname"), Some("ip--10-0-0-1"));
        assert_eq!(flags.len(), 2);
    }

    #[test]
    fn test_empty_command_line() {
        assert!(ProcessFlags::parse("").is_empty());
        assert!(ProcessFlags::parse("   \n ").is_empty());
    }
}
