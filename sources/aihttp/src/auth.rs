//! Request authentication.
//!
//! The services authenticate callers with HTTP Negotiate, backed by the caller's Kerberos ticket.
//! Building the token needs GSSAPI, which is only linked in with the `gssapi` feature.

use crate::error::Result;
#[cfg(not(feature = "gssapi"))]
use log::warn;
use std::fmt::Debug;
use std::sync::Arc;
#[cfg(not(feature = "gssapi"))]
use std::sync::Once;

/// Produces the `Authorization` header value for a request to `host`.
pub trait Authenticator: Debug {
    fn authorization(&self, host: &str) -> Result<Option<String>>;
}

/// Sends no credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unauthenticated;

impl Authenticator for Unauthenticated {
    fn authorization(&self, _host: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Builds a fresh SPNEGO token for the `HTTP@host` service principal on every request.
#[cfg(feature = "gssapi")]
#[derive(Debug, Clone, Copy, Default)]
pub struct Negotiate;

#[cfg(feature = "gssapi")]
impl Authenticator for Negotiate {
    fn authorization(&self, host: &str) -> Result<Option<String>> {
        use crate::error;
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;
        use libgssapi::context::{ClientCtx, CtxFlags};
        use libgssapi::credential::{Cred, CredUsage};
        use libgssapi::name::Name;
        use libgssapi::oid::{OidSet, GSS_MECH_KRB5, GSS_NT_HOSTBASED_SERVICE};

        let fail = |e: libgssapi::error::Error| error::Error::Negotiate {
            host: host.to_string(),
            reason: e.to_string(),
        };

        let service = format!("HTTP@{}", host);
        let target = Name::new(service.as_bytes(), Some(&GSS_NT_HOSTBASED_SERVICE))
            .and_then(|name| name.canonicalize(Some(&GSS_MECH_KRB5)))
            .map_err(fail)?;
        let mut mechs = OidSet::new().map_err(fail)?;
        mechs.add(&GSS_MECH_KRB5).map_err(fail)?;
        let cred = Cred::acquire(None, None, CredUsage::Initiate, Some(&mechs)).map_err(fail)?;

        let mut ctx = ClientCtx::new(cred, target, CtxFlags::GSS_C_MUTUAL_FLAG, Some(&GSS_MECH_KRB5));
        let token = ctx.step(None).map_err(fail)?;
        Ok(token.map(|token| format!("Negotiate {}", STANDARD.encode(&*token))))
    }
}

/// Returns the authenticator real requests should use.
pub fn default_authenticator() -> Arc<dyn Authenticator + Send + Sync> {
    #[cfg(feature = "gssapi")]
    {
        Arc::new(Negotiate)
    }
    #[cfg(not(feature = "gssapi"))]
    {
        static WARNED: Once = Once::new();
        WARNED.call_once(|| {
            warn!("Built without GSSAPI support, requests will be sent without Negotiate credentials")
        });
        Arc::new(Unauthenticated)
    }
}
