/*!
`aihttp` is the HTTPS layer shared by every Agile Infrastructure service client.

An [`HttpTransport`] sends one request at a time with the caller's credentials, trusting only
the site CA bundle, and classifies failures:

* connection problems and timeouts become [`ErrorKind::Connection`] and [`ErrorKind::Timeout`],
  which a caller may retry
* `500` becomes [`ErrorKind::InternalServerError`]
* `401` and `403` become [`ErrorKind::Unauthorized`]
* every other status is handed back in a [`Response`] for the service client to interpret

The transport never retries on its own.

[`Endpoint`] builds request URLs for one service from its configured hostname and port.
*/

#![deny(rust_2018_idioms)]

mod auth;
mod endpoint;
mod error;
mod transport;

pub use auth::{default_authenticator, Authenticator, Unauthenticated};
#[cfg(feature = "gssapi")]
pub use auth::Negotiate;
pub use endpoint::Endpoint;
pub use error::{Error, ErrorKind, Result};
pub use reqwest::header::HeaderMap;
pub use reqwest::{Method, StatusCode};
pub use transport::{read_ca_bundle, HttpTransport, Response};

const MAX_PRINTABLE_LENGTH: usize = 2048;

/// Converts `bytes` to a `String` if it is UTF-8, truncating it if it is too long for a log line.
pub fn printable_string(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) if s.len() < MAX_PRINTABLE_LENGTH => s.to_string(),
        Ok(s) => {
            let mut end = MAX_PRINTABLE_LENGTH - 14;
            while !s.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}<truncated...>", &s[..end])
        }
        Err(_) => "<binary>".to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::printable_string;

    #[test]
    fn printable() {
        assert_eq!(printable_string(b"hello"), "hello");
        assert_eq!(printable_string(&[0xff, 0xfe]), "<binary>");
        let long = "é".repeat(2000);
        let printed = printable_string(long.as_bytes());
        assert!(printed.ends_with("<truncated...>"));
        assert!(printed.len() < long.len());
    }
}
