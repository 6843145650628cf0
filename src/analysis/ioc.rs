use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Kinds of indicator the extractor recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IocKind {
    Ip,
    Domain,
    HashMd5,
    HashSha256,
    Cve,
    Email,
}

impl IocKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IocKind::Ip => "ip",
            IocKind::Domain => "domain",
            IocKind::HashMd5 => "hash_md5",
            IocKind::HashSha256 => "hash_sha256",
            IocKind::Cve => "cve",
            IocKind::Email => "email",
        }
    }

    /// Type-specific check applied after the pattern matched.
    fn accepts(&self, value: &str) -> bool {
        match self {
            IocKind::Ip => value
                .split('.')
                .all(|octet| octet.parse::<u16>().map(|n| n <= 255).unwrap_or(false)),
            IocKind::Domain => value.len() > 4 && value.contains('.'),
            _ => true,
        }
    }
}

struct Detector {
    kind: IocKind,
    pattern: Regex,
}

static DETECTORS: Lazy<Vec<Detector>> = Lazy::new(|| {
    [
        (IocKind::Ip, r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b"),
        (
            IocKind::Domain,
            r"\b[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*\.[a-zA-Z]{2,}\b",
        ),
        (IocKind::HashMd5, r"\b[a-fA-F0-9]{32}\b"),
        (IocKind::HashSha256, r"\b[a-fA-F0-9]{64}\b"),
        (IocKind::Cve, r"(?i)CVE-[0-9]{4}-[0-9]{4,}"),
        (
            IocKind::Email,
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
        ),
    ]
    .into_iter()
    .map(|(kind, src)| Detector {
        kind,
        pattern: Regex::new(src).expect("IOC pattern"),
    })
    .collect()
});

/// Pulls indicators of compromise out of free text.
///
/// Every detector runs over the whole text independently, so one substring
/// may surface under several kinds (an email's host is also a domain). Each
/// accepted match is reported as `"<kind>:<value>"` with the matched text
/// kept verbatim.
///
/// ```
/// use threatwire::analysis::extract_iocs;
///
/// let iocs = extract_iocs("C2 at 8.8.8.8, not 999.999.999.999; see CVE-2024-3094");
/// assert!(iocs.contains(&"ip:8.8.8.8".to_string()));
/// assert!(iocs.contains(&"cve:CVE-2024-3094".to_string()));
/// assert!(!iocs.iter().any(|i| i.starts_with("ip:999")));
/// ```
pub fn extract_iocs(text: &str) -> Vec<String> {
    let mut found = BTreeSet::new();

    for detector in DETECTORS.iter() {
        for m in detector.pattern.find_iter(text) {
            let value = m.as_str();
            if detector.kind.accepts(value) {
                found.insert(format!("{}:{}", detector.kind.as_str(), value));
            } else {
                tracing::trace!(kind = detector.kind.as_str(), value = %value, "IOC candidate rejected");
            }
        }
    }

    found.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn has(iocs: &[String], wanted: &str) -> bool {
        iocs.iter().any(|i| i == wanted)
    }

    #[test]
    fn test_ip_octet_validation() {
        let iocs = extract_iocs("good 8.8.8.8 bad 999.999.999.999 edge 256.1.1.1");
        assert!(has(&iocs, "ip:8.8.8.8"));
        assert!(!has(&iocs, "ip:999.999.999.999"));
        assert!(!has(&iocs, "ip:256.1.1.1"));
    }

    #[test]
    fn test_domain_and_email() {
        let iocs = extract_iocs("Payload fetched from evil-cdn.example.org; contact ops@corp.io");
        assert!(has(&iocs, "domain:evil-cdn.example.org"));
        assert!(has(&iocs, "email:ops@corp.io"));
        assert!(has(&iocs, "domain:corp.io"));
    }

    #[test]
    fn test_short_domain_rejected() {
        // "a.io" is four characters, the validator wants more
        let iocs = extract_iocs("see a.io");
        assert!(!iocs.iter().any(|i| i.starts_with("domain:")));
    }

    #[test]
    fn test_hashes_are_distinguished_by_length() {
        let md5 = "d41d8cd98f00b204e9800998ecf8427e";
        let sha = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        let iocs = extract_iocs(&format!("md5 {md5} sha {sha}"));
        assert!(has(&iocs, &format!("hash_md5:{md5}")));
        assert!(has(&iocs, &format!("hash_sha256:{sha}")));
        assert_eq!(iocs.iter().filter(|i| i.starts_with("hash_md5:")).count(), 1);
    }

    #[test]
    fn test_cve_case_preserved() {
        let iocs = extract_iocs("Tracked as cve-2023-12345 and CVE-2021-44228");
        assert!(has(&iocs, "cve:cve-2023-12345"));
        assert!(has(&iocs, "cve:CVE-2021-44228"));
        assert!(!iocs.iter().any(|i| i.starts_with("cve:CVE-2023-1234")));
    }

    #[test]
    fn test_repeated_values_are_deduplicated() {
        let iocs = extract_iocs("1.2.3.4 and again 1.2.3.4 and 1.2.3.4");
        assert_eq!(iocs.iter().filter(|i| *i == "ip:1.2.3.4").count(), 1);
    }

    #[test]
    fn test_no_indicators() {
        assert!(extract_iocs("Nothing suspicious here").is_empty());
        assert!(extract_iocs("").is_empty());
    }

    proptest! {
        #[test]
        fn prop_output_has_no_duplicates(text in "[a-f0-9 .@CVE-]{0,200}") {
            let iocs = extract_iocs(&text);
            let unique: BTreeSet<_> = iocs.iter().collect();
            prop_assert_eq!(unique.len(), iocs.len());
        }

        #[test]
        fn prop_every_ioc_is_typed(text in "[a-z0-9 .@-]{0,200}") {
            for ioc in extract_iocs(&text) {
                let (kind, value) = ioc.split_once(':').unwrap();
                prop_assert!(["ip", "domain", "hash_md5", "hash_sha256", "cve", "email"].contains(&kind));
                prop_assert!(!value.is_empty());
            }
        }
    }
}
