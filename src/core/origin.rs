//! Origin allow-list. The origin stamped on an envelope is the only thing
//! about a message that can be trusted, and both ends check it.

use regex::Regex;
use std::sync::OnceLock;

fn origin_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([a-zA-Z][a-zA-Z0-9+.-]*)://([^/?#@\s]+)").expect("static origin regex")
    })
}

/// `scheme://host[:port]` of a URL, lowercased. `None` if it has no origin.
pub fn origin_of(url: &str) -> Option<String> {
    let caps = origin_regex().captures(url.trim())?;
    Some(format!("{}://{}", &caps[1], &caps[2]).to_ascii_lowercase())
}

/// Allow-list entry covering an origin's organization: `https://wallet.acme.io`
/// becomes `https://*.acme.io`. The organization is the registrable domain
/// under the public suffix list, so `wallet.example.co.uk` covers
/// `*.example.co.uk` and never all of `co.uk`. IPs, ports and hosts with
/// no registrable domain stay exact.
pub fn same_organization(origin: &str) -> String {
    let Some((scheme, host)) = origin.split_once("://") else {
        return origin.to_string();
    };
    let host = host.to_ascii_lowercase();
    let is_ip = host.parse::<std::net::IpAddr>().is_ok()
        || host.split('.').all(|l| l.chars().all(|c| c.is_ascii_digit()));
    if host.contains(':') || host.starts_with('[') || is_ip {
        return origin.to_string();
    }
    match psl::domain_str(&host) {
        Some(domain) => format!("{}://*.{}", scheme, domain),
        None => origin.to_string(),
    }
}

#[derive(Debug, Clone)]
enum Rule {
    Exact(String),
    Wildcard(Regex),
}

#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    rules: Vec<Rule>,
}

impl OriginPolicy {
    /// Entries are exact origins or `scheme://*.domain`. A bare `*` is
    /// refused: it would turn the check off.
    pub fn new<S: AsRef<str>>(entries: &[S]) -> Self {
        let mut rules = Vec::new();
        for entry in entries {
            let entry = entry.as_ref().trim().to_ascii_lowercase();
            if entry.is_empty() || entry == "*" {
                tracing::warn!(entry = %entry, "ignoring allow-list entry");
                continue;
            }
            match entry.split_once("://*.") {
                Some((scheme, domain)) => {
                    let pattern = format!(
                        r"^{}://([a-z0-9-]+\.)*{}$",
                        regex::escape(scheme),
                        regex::escape(domain)
                    );
                    match Regex::new(&pattern) {
                        Ok(re) => rules.push(Rule::Wildcard(re)),
                        Err(e) => tracing::warn!(entry = %entry, "bad allow-list entry: {e}"),
                    }
                }
                None => rules.push(Rule::Exact(entry)),
            }
        }
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn allows(&self, origin: &str) -> bool {
        let origin = origin.to_ascii_lowercase();
        self.rules.iter().any(|rule| match rule {
            Rule::Exact(exact) => *exact == origin,
            Rule::Wildcard(re) => re.is_match(&origin),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_origin() {
        assert_eq!(origin_of("https://Wallet.Example.com/embed?x=1").as_deref(), Some("https://wallet.example.com"));
        assert_eq!(origin_of("http://localhost:5173/").as_deref(), Some("http://localhost:5173"));
        assert_eq!(origin_of("not a url"), None);
    }

    #[test]
    fn wildcard_covers_subdomains_not_lookalikes() {
        let policy = OriginPolicy::new(&["https://*.example.com"]);
        assert!(policy.allows("https://example.com"));
        assert!(policy.allows("https://shop.example.com"));
        assert!(policy.allows("https://a.b.example.com"));
        assert!(!policy.allows("https://evilexample.com"));
        assert!(!policy.allows("https://example.com.evil.io"));
        assert!(!policy.allows("http://shop.example.com"));
    }

    #[test]
    fn exact_and_star_entries() {
        let policy = OriginPolicy::new(&["https://shop.test", "*"]);
        assert!(policy.allows("https://SHOP.test"));
        assert!(!policy.allows("https://other.test"));

        assert!(OriginPolicy::new(&["*"]).is_empty());
    }

    #[test]
    fn organization_entry() {
        assert_eq!(same_organization("https://wallet.acme.io"), "https://*.acme.io");
        assert_eq!(same_organization("http://localhost:3000"), "http://localhost:3000");
        assert_eq!(same_organization("http://127.0.0.1"), "http://127.0.0.1");
        assert_eq!(same_organization("https://co.uk"), "https://co.uk");
    }

    #[test]
    fn organization_stops_at_public_suffix() {
        let entry = same_organization("https://wallet.example.co.uk");
        assert_eq!(entry, "https://*.example.co.uk");
        let policy = OriginPolicy::new(&[entry]);
        assert!(policy.allows("https://shop.example.co.uk"));
        assert!(!policy.allows("https://attacker.co.uk"));

        let entry = same_organization("https://wallet.omnibazaar.github.io");
        assert_eq!(entry, "https://*.omnibazaar.github.io");
        let policy = OriginPolicy::new(&[entry]);
        assert!(policy.allows("https://omnibazaar.github.io"));
        assert!(!policy.allows("https://evil.github.io"));
    }
}
