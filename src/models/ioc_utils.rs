// src/models/ioc_utils.rs

use std::sync::OnceLock;

use regex::Regex;

use crate::models::IndicatorType;

/// A single `<object-path> = '<value>'` comparison from a STIX pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternTerm {
    pub object_path: String,
    pub value: String,
}

fn comparison_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?P<path>[a-z0-9\-]+:[A-Za-z0-9_\-\.']+)\s*=\s*'(?P<value>(?:[^'\\]|\\.)*)'")
            .expect("static regex")
    })
}

/// Extract every equality comparison from a STIX pattern
pub fn extract_pattern_terms(pattern: &str) -> Vec<PatternTerm> {
    comparison_regex()
        .captures_iter(pattern)
        .map(|caps| PatternTerm {
            object_path: caps["path"].to_string(),
            value: unescape(&caps["value"]),
        })
        .collect()
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Map a STIX object path to the indicator type it describes
pub fn indicator_type_for(object_path: &str, value: &str) -> Option<IndicatorType> {
    let has_prefix_len = value.contains('/');
    match object_path {
        "ipv4-addr:value" if has_prefix_len => Some(IndicatorType::Cidr),
        "ipv4-addr:value" => Some(IndicatorType::Ip),
        "ipv6-addr:value" if has_prefix_len => Some(IndicatorType::Ipv6Cidr),
        "ipv6-addr:value" => Some(IndicatorType::Ipv6),
        "domain-name:value" => Some(IndicatorType::Domain),
        "url:value" => Some(IndicatorType::Url),
        "email-addr:value" => Some(IndicatorType::Email),
        path if path.starts_with("file:hashes") => Some(IndicatorType::File),
        _ => None,
    }
}

/// Normalize an indicator value based on its type
pub fn normalize_ioc(value: &str, indicator_type: IndicatorType) -> String {
    let trimmed = value.trim();

    match indicator_type {
        IndicatorType::Domain => trimmed.trim_end_matches('.').to_lowercase(),
        IndicatorType::Email | IndicatorType::File => trimmed.to_lowercase(),
        IndicatorType::Url => {
            if let Some(idx) = trimmed.find("://") {
                let (scheme, rest) = trimmed.split_at(idx + 3);
                if let Some(path_idx) = rest.find('/') {
                    let (host, path) = rest.split_at(path_idx);
                    format!("{}{}{}", scheme.to_lowercase(), host.to_lowercase(), path)
                } else {
                    trimmed.to_lowercase()
                }
            } else {
                trimmed.to_string()
            }
        }
        IndicatorType::Ip
        | IndicatorType::Cidr
        | IndicatorType::Ipv6
        | IndicatorType::Ipv6Cidr => trimmed.to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_simple_comparison() {
        let terms = extract_pattern_terms("[ipv4-addr:value = '198.51.100.1']");
        assert_eq!(
            terms,
            vec![PatternTerm {
                object_path: "ipv4-addr:value".into(),
                value: "198.51.100.1".into(),
            }]
        );
    }

    #[test]
    fn extracts_every_term_of_compound_pattern() {
        let pattern = "[domain-name:value = 'evil.example' OR url:value = 'http://evil.example/a']";
        let terms = extract_pattern_terms(pattern);
        assert_eq!(terms.len(), 2);
        assert_eq!(terms[0].object_path, "domain-name:value");
        assert_eq!(terms[1].value, "http://evil.example/a");
    }

    #[test]
    fn quoted_hash_paths_and_escapes() {
        let terms = extract_pattern_terms(
            "[file:hashes.'SHA-256' = 'AEC070645FE53EE3B3763059376134F058CC337247C978ADD178B6CCDFB0019F']",
        );
        assert_eq!(terms[0].object_path, "file:hashes.'SHA-256'");

        let terms = extract_pattern_terms(r"[url:value = 'http://a.example/it\'s']");
        assert_eq!(terms[0].value, "http://a.example/it's");
    }

    #[test]
    fn object_paths_map_to_types() {
        assert_eq!(indicator_type_for("ipv4-addr:value", "10.0.0.1"), Some(IndicatorType::Ip));
        assert_eq!(indicator_type_for("ipv4-addr:value", "10.0.0.0/8"), Some(IndicatorType::Cidr));
        assert_eq!(indicator_type_for("ipv6-addr:value", "2001:db8::1"), Some(IndicatorType::Ipv6));
        assert_eq!(
            indicator_type_for("ipv6-addr:value", "2001:db8::/32"),
            Some(IndicatorType::Ipv6Cidr)
        );
        assert_eq!(indicator_type_for("file:hashes.MD5", "abc"), Some(IndicatorType::File));
        assert_eq!(indicator_type_for("process:name", "cmd.exe"), None);
    }

    #[test]
    fn normalizes_by_type() {
        assert_eq!(normalize_ioc("Evil.Example.", IndicatorType::Domain), "evil.example");
        assert_eq!(
            normalize_ioc("HTTP://Evil.Example/Path", IndicatorType::Url),
            "http://evil.example/Path"
        );
        assert_eq!(normalize_ioc(" ABCDEF ", IndicatorType::File), "abcdef");
    }
}
