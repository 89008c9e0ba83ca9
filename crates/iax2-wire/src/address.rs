//! Remote-party address grammar.
//!
//! Destinations are written as
//! `[iax2:][user@][transport$]host[/extension[+context]]`. The four
//! separators are the whole grammar; every part except the host is
//! optional and independently defaultable. This is deliberately not a
//! general URI parser.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A dissected destination address.
///
/// Parsing never fails: missing parts take their defaults and an empty
/// host simply fails DNS resolution later. [`RemoteParty::to_url`] is the
/// inverse, omitting parts that still hold their default.
///
/// # Examples
///
/// ```
/// use riax_iax2_wire::RemoteParty;
///
/// let party = RemoteParty::parse("iax2:bob@host.example/100+sales");
/// assert_eq!(party.user.as_deref(), Some("bob"));
/// assert_eq!(party.host, "host.example");
/// assert_eq!(party.extension.as_deref(), Some("100"));
/// assert_eq!(party.context.as_deref(), Some("sales"));
/// assert_eq!(party.transport, "UDP");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteParty {
    pub user: Option<String>,
    pub transport: String,
    pub host: String,
    pub extension: Option<String>,
    pub context: Option<String>,
}

impl Default for RemoteParty {
    fn default() -> Self {
        Self {
            user: None,
            transport: Self::DEFAULT_TRANSPORT.to_string(),
            host: String::new(),
            extension: None,
            context: None,
        }
    }
}

impl RemoteParty {
    /// The only scheme this grammar knows.
    pub const SCHEME: &'static str = "iax2";

    /// Transport assumed when the address names none.
    pub const DEFAULT_TRANSPORT: &'static str = "UDP";

    /// Context treated as "unspecified" when synthesizing a URL.
    pub const DEFAULT_CONTEXT: &'static str = "Default";

    /// Dissect a destination address.
    ///
    /// Consumes the separators left to right, stopping as soon as the
    /// remainder is empty. Empty parts before a separator are ignored
    /// rather than captured, so `"@host"` has no user.
    pub fn parse(input: &str) -> Self {
        let mut party = Self::default();
        let mut working = input.strip_prefix("iax2:").unwrap_or(input);

        if let Some((user, rest)) = working.split_once('@') {
            if !user.is_empty() {
                party.user = Some(user.to_string());
            }
            working = rest;
        }
        if working.is_empty() {
            return party;
        }

        if let Some((transport, rest)) = working.split_once('$') {
            if !transport.is_empty() {
                party.transport = transport.to_string();
            }
            working = rest;
        }
        if working.is_empty() {
            return party;
        }

        match working.split_once('/') {
            Some((host, rest)) => {
                party.host = host.to_string();
                working = rest;
            }
            None => {
                party.host = working.to_string();
                return party;
            }
        }
        if working.is_empty() {
            return party;
        }

        match working.split_once('+') {
            Some((extension, context)) => {
                if !extension.is_empty() {
                    party.extension = Some(extension.to_string());
                }
                if !context.is_empty() {
                    party.context = Some(context.to_string());
                }
            }
            None => party.extension = Some(working.to_string()),
        }
        party
    }

    /// Synthesize the address back into URL form.
    ///
    /// The default transport and the `Default` context are left out, as
    /// is the scheme prefix.
    pub fn to_url(&self) -> String {
        let transport = if self.transport == Self::DEFAULT_TRANSPORT {
            ""
        } else {
            self.transport.as_str()
        };
        Self::build_url(
            &self.host,
            self.user.as_deref().unwrap_or(""),
            self.extension.as_deref().unwrap_or(""),
            self.context.as_deref().unwrap_or(""),
            transport,
        )
    }

    /// Assemble `user@transport$host/extension+context` from parts, where
    /// an empty string means "absent". The context `Default` counts as
    /// absent too.
    pub fn build_url(
        host: &str,
        user: &str,
        extension: &str,
        context: &str,
        transport: &str,
    ) -> String {
        let mut url = host.to_string();
        if !extension.is_empty() {
            url.push('/');
            url.push_str(extension);
        }
        if !context.is_empty() && context != Self::DEFAULT_CONTEXT {
            url.push('+');
            url.push_str(context);
        }
        if !transport.is_empty() {
            url = format!("{}${}", transport, url);
        }
        if !user.is_empty() {
            url = format!("{}@{}", user, url);
        }
        url
    }
}

impl fmt::Display for RemoteParty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_url())
    }
}
