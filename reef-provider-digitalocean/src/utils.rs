//! Value normalisation and diff suppressors shared by resources

use reef_core::resource::{Attributes, Value};

/// Record types whose value is a hostname
pub const HOSTNAME_RECORD_TYPES: [&str; 5] = ["CNAME", "MX", "NS", "SRV", "CAA"];

/// `state_func` that lower-cases strings (region slugs)
pub fn lowercase(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.to_lowercase()),
        other => other.clone(),
    }
}

/// Compare ignoring leading and trailing whitespace (public keys)
pub fn suppress_whitespace(_key: &str, old: &Value, new: &Value, _state: &Attributes) -> bool {
    old.to_plain_string().trim() == new.to_plain_string().trim()
}

/// Fully-qualified form of a name within `domain`, without trailing dot.
///
/// `@` and the bare domain map to the domain itself; names already ending
/// in the domain are kept; anything else is treated as relative.
pub fn canonical_hostname(name: &str, domain: &str) -> String {
    let name = name.trim().trim_end_matches('.').to_lowercase();
    let domain = domain.trim().trim_end_matches('.').to_lowercase();
    if domain.is_empty() {
        return name;
    }
    if name == "@" || name == domain || name.is_empty() {
        return domain;
    }
    if name.ends_with(&format!(".{domain}")) {
        return name;
    }
    format!("{name}.{domain}")
}

fn record_domain(state: &Attributes) -> &str {
    state.get("domain").and_then(Value::as_str).unwrap_or("")
}

/// `@`, relative and absolute spellings of the same record name are equal
pub fn suppress_record_name(_key: &str, old: &Value, new: &Value, state: &Attributes) -> bool {
    let domain = record_domain(state);
    canonical_hostname(&old.to_plain_string(), domain) == canonical_hostname(&new.to_plain_string(), domain)
}

/// Hostname-valued record data compares as FQDNs; other types compare exactly
pub fn suppress_record_value(_key: &str, old: &Value, new: &Value, state: &Attributes) -> bool {
    let record_type = state.get("type").and_then(Value::as_str).unwrap_or("");
    let (old, new) = (old.to_plain_string(), new.to_plain_string());
    if !HOSTNAME_RECORD_TYPES.contains(&record_type) {
        return old == new;
    }
    let domain = record_domain(state);
    let absolute = |v: &str| {
        if v == "@" {
            canonical_hostname(v, domain)
        } else {
            v.trim_end_matches('.').to_lowercase()
        }
    };
    absolute(&old) == absolute(&new)
}

/// Fully-qualified name of a record as DNS would resolve it
pub fn record_fqdn(name: &str, domain: &str) -> String {
    if name == "@" {
        return domain.to_string();
    }
    let lower = name.to_lowercase();
    let suffix = format!("{}.", domain.to_lowercase());
    if lower.ends_with(&suffix) {
        return name.trim_end_matches('.').to_string();
    }
    format!("{name}.{domain}")
}

pub fn string_list(values: &[String]) -> Value {
    Value::from(values.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(domain: &str, record_type: &str) -> Attributes {
        [
            ("domain".to_string(), Value::from(domain)),
            ("type".to_string(), Value::from(record_type)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn canonical_hostnames() {
        assert_eq!(canonical_hostname("@", "example.com"), "example.com");
        assert_eq!(canonical_hostname("WWW", "example.com"), "www.example.com");
        assert_eq!(canonical_hostname("www.example.com.", "example.com"), "www.example.com");
        assert_eq!(canonical_hostname("example.com.", "example.com"), "example.com");
    }

    #[test]
    fn record_name_suppression() {
        let s = state("example.com", "A");
        let eq = |a: &str, b: &str| suppress_record_name("name", &Value::from(a), &Value::from(b), &s);
        assert!(eq("@", "example.com"));
        assert!(eq("www", "www.example.com."));
        assert!(eq("WWW", "www"));
        assert!(!eq("www", "api"));
    }

    #[test]
    fn record_value_suppression() {
        let cname = state("example.com", "CNAME");
        let eq = |a: &str, b: &str, s: &Attributes| suppress_record_value("value", &Value::from(a), &Value::from(b), s);
        assert!(eq("@", "example.com.", &cname));
        assert!(eq("target.example.org.", "target.example.org", &cname));
        assert!(!eq("a.example.org", "b.example.org", &cname));

        let caa = state("example.com", "CAA");
        assert!(eq("letsencrypt.org", "letsencrypt.org.", &caa));

        let txt = state("example.com", "TXT");
        assert!(!eq("v=spf1", "v=spf1.", &txt));
    }

    #[test]
    fn fqdn_construction() {
        assert_eq!(record_fqdn("@", "example.com"), "example.com");
        assert_eq!(record_fqdn("www", "example.com"), "www.example.com");
        assert_eq!(record_fqdn("WWW.Example.com.", "example.com"), "WWW.Example.com");
    }

    #[test]
    fn fqdn_table() {
        let domain = "nonexample.com";
        assert_eq!(record_fqdn("www", domain), "www.nonexample.com");
        assert_eq!(record_fqdn("@", domain), "nonexample.com");
        assert_eq!(record_fqdn("test.nonexample.com.", domain), "test.nonexample.com");
        assert_eq!(record_fqdn("*", domain), "*.nonexample.com");
    }

    #[test]
    fn whitespace_and_case_helpers() {
        assert!(suppress_whitespace(
            "public_key",
            &Value::from("ssh-ed25519 AAAA\n"),
            &Value::from("ssh-ed25519 AAAA"),
            &Attributes::new()
        ));
        assert_eq!(lowercase(&Value::from("NYC3")), Value::from("nyc3"));
    }
}
