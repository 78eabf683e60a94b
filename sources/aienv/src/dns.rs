//! Hostname helpers: validation, canonicalisation, short names, random names and alias
//! dereferencing.

use dns_lookup::{getaddrinfo, lookup_addr, lookup_host, AddrInfoHints};
use lazy_static::lazy_static;
use log::{debug, warn};
use rand::seq::SliceRandom;
use regex::Regex;
use sha1::{Digest, Sha1};
use snafu::{OptionExt, ResultExt};
use std::net::IpAddr;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use url::Url;

pub const MAX_FQDN_LENGTH: usize = 253;
pub const DEFAULT_DOMAIN: &str = "cern.ch";

/// Number of hex digits of the hash used in random hostnames.
const RANDOM_DIGITS: usize = 10;
const MAX_LABEL_LENGTH: usize = 63;

lazy_static! {
    static ref FQDN: Regex =
        Regex::new(r"^([a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,63}$").unwrap();
}

static RANDOM_SEQUENCE: AtomicU64 = AtomicU64::new(0);

pub fn is_valid_fqdn(fqdn: &str) -> bool {
    fqdn.len() <= MAX_FQDN_LENGTH && FQDN.is_match(fqdn)
}

/// Returns the canonical name of `name` according to the resolver, or None if it doesn't resolve.
pub fn canonicalize_fqdn(name: &str) -> Option<String> {
    let hints = AddrInfoHints {
        socktype: 0,
        protocol: 0,
        address: 0,
        flags: libc::AI_CANONNAME,
    };
    let canonical = getaddrinfo(Some(name), None, Some(hints))
        .ok()?
        .filter_map(|info| info.ok())
        .find_map(|info| info.canonname)
        .map(|c| c.trim_end_matches('.').to_lowercase());
    debug!("Canonical name of {} is {:?}", name, canonical);
    canonical
}

/// Returns the first label of a hostname.
pub fn shortify(fqdn: &str) -> &str {
    fqdn.split('.').next().unwrap_or(fqdn)
}

/// Generates a hostname under `domain` made of `prefix` followed by hex digits of a hash of the
/// current time. Characters not allowed in a hostname label are dropped from the prefix.
pub fn random_fqdn(prefix: &str, domain: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let seed = format!(
        "{}-{}-{}",
        nanos,
        process::id(),
        RANDOM_SEQUENCE.fetch_add(1, Ordering::SeqCst)
    );
    let digest = hex::encode(Sha1::digest(seed.as_bytes()));

    let mut prefix: String = prefix
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    prefix = prefix.trim_start_matches('-').to_string();
    prefix.truncate(MAX_LABEL_LENGTH - RANDOM_DIGITS);

    format!("{}{}.{}", prefix, &digest[..RANDOM_DIGITS], domain)
}

/// Rewrites the host of `url` to the reverse name of one randomly chosen IPv4 address behind it,
/// keeping the port. On any failure the original URL is returned.
pub fn dereference_alias(url: &Url) -> Url {
    match try_dereference_alias(url) {
        Ok(dereferenced) => {
            debug!("Dereferenced {} to {}", url, dereferenced);
            dereferenced
        }
        Err(e) => {
            warn!("Unable to dereference alias in '{}': {}", url, e);
            url.clone()
        }
    }
}

fn try_dereference_alias(url: &Url) -> Result<Url> {
    let host = url.host_str().context(error::NoHostSnafu { url: url.as_str() })?;
    let addresses: Vec<IpAddr> = lookup_host(host)
        .context(error::LookupSnafu { host })?
        .into_iter()
        .filter(IpAddr::is_ipv4)
        .collect();
    let address = addresses
        .choose(&mut rand::thread_rng())
        .context(error::NoAddressSnafu { host })?;
    let name = lookup_addr(address).context(error::ReverseLookupSnafu { address: *address })?;

    let mut dereferenced = url.clone();
    dereferenced
        .set_host(Some(&name))
        .context(error::SetHostSnafu { name: &name })?;
    Ok(dereferenced)
}

mod error {
    use snafu::Snafu;
    use std::net::IpAddr;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(super)))]
    pub(super) enum Error {
        #[snafu(display("URL '{}' has no host", url))]
        NoHost { url: String },

        #[snafu(display("Failed to look up '{}': {}", host, source))]
        Lookup {
            host: String,
            source: std::io::Error,
        },

        #[snafu(display("'{}' has no IPv4 address", host))]
        NoAddress { host: String },

        #[snafu(display("Failed reverse lookup of {}: {}", address, source))]
        ReverseLookup {
            address: IpAddr,
            source: std::io::Error,
        },

        #[snafu(display("Reverse name '{}' is not a valid host: {}", name, source))]
        SetHost {
            name: String,
            source: url::ParseError,
        },
    }
}

type Result<T> = std::result::Result<T, error::Error>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn valid_fqdns() {
        assert!(is_valid_fqdn("foo.cern.ch"));
        assert!(is_valid_fqdn("a-b-c.example.org"));
        assert!(!is_valid_fqdn("foo"));
        assert!(!is_valid_fqdn("-foo.cern.ch"));
        assert!(!is_valid_fqdn("foo..cern.ch"));
        assert!(!is_valid_fqdn("foo_bar.cern.ch"));
    }

    #[test]
    fn fqdn_too_long() {
        let label = "a".repeat(60);
        let long = format!("{0}.{0}.{0}.{0}.{0}.ch", label);
        assert!(long.len() > MAX_FQDN_LENGTH);
        assert!(!is_valid_fqdn(&long));
    }

    #[test]
    fn shortify_first_label() {
        assert_eq!(shortify("foo.cern.ch"), "foo");
        assert_eq!(shortify("foo"), "foo");
    }

    #[test]
    fn random_fqdns_are_valid_and_distinct() {
        let first = random_fqdn("ai-", DEFAULT_DOMAIN);
        let second = random_fqdn("ai-", DEFAULT_DOMAIN);
        assert!(is_valid_fqdn(&first), "{}", first);
        assert!(first.starts_with("ai-"));
        assert!(first.ends_with(".cern.ch"));
        assert_eq!(shortify(&first).len(), "ai-".len() + RANDOM_DIGITS);
        assert_ne!(first, second);
    }

    #[test]
    fn random_fqdn_sanitizes_prefix() {
        let long = "x".repeat(80);
        for prefix in ["", "-", "My_Host ", long.as_str()] {
            let fqdn = random_fqdn(prefix, DEFAULT_DOMAIN);
            assert!(is_valid_fqdn(&fqdn), "{}", fqdn);
        }
    }

    #[test]
    fn dereference_failure_keeps_url() {
        let url = Url::parse("https://no-such-alias.invalid:8443/api/hosts").unwrap();
        assert_eq!(dereference_alias(&url), url);
    }

    #[test]
    fn unresolvable_canonical_name() {
        assert_eq!(canonicalize_fqdn("no-such-host.invalid"), None);
    }
}
