//! Inspection of the caller's default Kerberos credential cache.
//!
//! The cache is read through `klist`, so the cache location follows the usual `KRB5CCNAME` rules.
//! Nothing here renews or modifies the cache.

use aiconfig::exit;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use log::{debug, trace};
use snafu::{ensure, OptionExt, ResultExt};
use std::process::Command;

const KLIST: &str = "klist";
const TGT_PREFIX: &str = "krbtgt/";

const TIME_FORMATS: &[&str] = &[
    "%m/%d/%y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%b %d %H:%M:%S %Y",
];

/// Something that can list the contents of the default credential cache in `klist` format.
pub trait TicketSource {
    fn list(&self) -> Result<String>;
}

/// Lists the credential cache by running `klist` in the C locale.
#[derive(Debug, Clone, Copy, Default)]
pub struct Klist;

impl TicketSource for Klist {
    fn list(&self) -> Result<String> {
        trace!("calling '{}'", KLIST);
        let output = Command::new(KLIST)
            .env("LC_ALL", "C")
            .output()
            .map_err(|e| error::Error::Unavailable {
                reason: format!("unable to run {}: {}", KLIST, e),
            })?;
        ensure!(
            output.status.success(),
            error::UnavailableSnafu {
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
        );
        Ok(String::from_utf8_lossy(&output.stdout).into())
    }
}

/// The ticket-granting ticket of the default credential cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub principal: String,
    pub server: String,
    /// `klist` does not report the initial authentication time, so this is usually absent.
    pub auth_time: Option<DateTime<Local>>,
    pub start_time: DateTime<Local>,
    pub end_time: DateTime<Local>,
    pub renew_until: Option<DateTime<Local>>,
}

impl Ticket {
    pub fn is_valid_at(&self, now: DateTime<Local>) -> bool {
        self.start_time <= now && now < self.end_time
    }
}

/// Returns the caller's ticket-granting ticket if it is currently valid.
pub fn verify_ticket<S: TicketSource + ?Sized>(source: &S) -> Result<Ticket> {
    verify_ticket_at(source, Local::now())
}

pub fn verify_ticket_at<S: TicketSource + ?Sized>(
    source: &S,
    now: DateTime<Local>,
) -> Result<Ticket> {
    let listing = source.list()?;
    let ticket = parse_klist(&listing)?;
    debug!(
        "Found ticket for {} valid until {}",
        ticket.principal, ticket.end_time
    );
    ensure!(
        ticket.is_valid_at(now),
        error::UnavailableSnafu {
            reason: format!("ticket for {} expired at {}", ticket.principal, ticket.end_time),
        }
    );
    Ok(ticket)
}

/// Extracts the ticket-granting ticket from `klist` output.
pub fn parse_klist(listing: &str) -> Result<Ticket> {
    let principal = listing
        .lines()
        .find_map(|line| line.trim().strip_prefix("Default principal:"))
        .map(|p| p.trim().to_string())
        .context(error::UnavailableSnafu {
            reason: "no default principal in credential cache",
        })?;

    let mut lines = listing.lines().peekable();
    while let Some(line) = lines.next() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let server = match tokens.last() {
            Some(server) if server.starts_with(TGT_PREFIX) => server.to_string(),
            _ => continue,
        };
        // The two timestamps take up the same number of tokens each.
        let time_tokens = &tokens[..tokens.len() - 1];
        if time_tokens.is_empty() || time_tokens.len() % 2 != 0 {
            continue;
        }
        let half = time_tokens.len() / 2;
        let start_time = parse_time(&time_tokens[..half].join(" "))?;
        let end_time = parse_time(&time_tokens[half..].join(" "))?;

        let renew_until = match lines.peek() {
            Some(next) => match next.trim().strip_prefix("renew until") {
                Some(rest) => Some(parse_time(rest.trim())?),
                None => None,
            },
            None => None,
        };

        return Ok(Ticket {
            principal,
            server,
            auth_time: None,
            start_time,
            end_time,
            renew_until,
        });
    }

    error::UnavailableSnafu {
        reason: format!("no ticket-granting ticket for {}", principal),
    }
    .fail()
}

pub(crate) fn parse_time(text: &str) -> Result<DateTime<Local>> {
    let naive = TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .context(error::UnavailableSnafu {
            reason: format!("unrecognised ticket time '{}'", text),
        })?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .context(error::UnavailableSnafu {
            reason: format!("ticket time '{}' does not exist locally", text),
        })
}

pub mod error {
    use super::exit;
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(super)))]
    pub enum Error {
        #[snafu(display("Kerberos ticket unavailable or expired: {}", reason))]
        Unavailable { reason: String },
    }

    impl Error {
        pub fn exit_code(&self) -> i32 {
            exit::KERBEROS
        }
    }
}

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
