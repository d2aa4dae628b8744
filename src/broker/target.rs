//! Per-call connection target.

use crate::error::GatewayError;

const REDACTED: &str = "***";

/// Connection URI supplied by the caller for a single call.
///
/// Never logged in cleartext: `Display` and `Debug` both render the URI with
/// its userinfo replaced.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    uri: String,
}

impl ConnectionTarget {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }

    /// The raw URI. Only the connector should read this.
    pub fn as_uri(&self) -> &str {
        &self.uri
    }

    /// URI with credentials masked, e.g. `mongodb://***@db:27017/`.
    pub fn redacted(&self) -> String {
        match self.userinfo_range() {
            Some((start, end)) => {
                format!("{}{}{}", &self.uri[..start], REDACTED, &self.uri[end..])
            }
            None => self.uri.clone(),
        }
    }

    /// Remove every occurrence of the URI and its password from `msg`.
    pub fn scrub(&self, msg: &str) -> String {
        let mut out = msg.replace(&self.uri, &self.redacted());
        if let Some(password) = self.password() {
            out = out.replace(password, REDACTED);
        }
        out
    }

    /// Apply [`scrub`](Self::scrub) to the message of a gateway error.
    pub fn scrub_error(&self, err: GatewayError) -> GatewayError {
        match err {
            GatewayError::Validation(m) => GatewayError::Validation(self.scrub(&m)),
            GatewayError::Connection(m) => GatewayError::Connection(self.scrub(&m)),
            GatewayError::Execution(m) => GatewayError::Execution(self.scrub(&m)),
            GatewayError::UnsupportedOperation(m) => {
                GatewayError::UnsupportedOperation(self.scrub(&m))
            }
        }
    }

    /// Byte range of `user[:password]` inside the URI, without the trailing `@`.
    ///
    /// Passwords may carry unencoded `/`, `?` or `@`, so the separator is the
    /// last `@` that is not inside `?key=value` options.
    fn userinfo_range(&self) -> Option<(usize, usize)> {
        let start = self.uri.find("://")? + 3;
        let rest = &self.uri[start..];
        let at = rest
            .rmatch_indices('@')
            .map(|(at, _)| at)
            .find(|&at| !in_options(&rest[..at]))?;
        Some((start, start + at))
    }

    fn password(&self) -> Option<&str> {
        let (start, end) = self.userinfo_range()?;
        let (_, password) = self.uri[start..end].split_once(':')?;
        (!password.is_empty()).then_some(password)
    }
}

/// Whether the end of `prefix` lies inside a `?key=value` option list.
fn in_options(prefix: &str) -> bool {
    prefix
        .rfind('?')
        .is_some_and(|q| prefix[q..].contains('='))
}

impl std::fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl std::fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ConnectionTarget")
            .field(&self.redacted())
            .finish()
    }
}
