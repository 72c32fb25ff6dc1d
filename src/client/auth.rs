use base64::Engine;
use clap::ValueEnum;
use eyre::Result;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use std::str::FromStr;

pub enum Auth {
    /// Use an API key authentication via headers
    Apikey(String),
    /// Use username and password authentication via Basic Auth headers
    Basic(String, String),
    /// Don't use any authentication
    None,
}

impl Auth {
    pub fn new(
        r#type: &AuthType,
        username: Option<String>,
        password: Option<String>,
        apikey: Option<String>,
    ) -> Self {
        match (r#type, username, password, apikey) {
            (AuthType::Apikey, _, _, Some(apikey)) => Self::Apikey(apikey),
            (AuthType::Basic, Some(username), Some(password), _) => Self::Basic(username, password),
            (AuthType::None, _, _, _) | _ => Self::None,
        }
    }

    /// Pick the scheme from whichever credentials are present, API key first
    pub fn detect(
        username: Option<String>,
        password: Option<String>,
        apikey: Option<String>,
    ) -> Self {
        match (username, password, apikey) {
            (_, _, Some(apikey)) => Self::Apikey(apikey),
            (Some(username), Some(password), None) => Self::Basic(username, password),
            _ => Self::None,
        }
    }

    /// Add the `Authorization` header for this scheme
    pub fn apply(&self, headers: &mut HeaderMap) -> Result<()> {
        match self {
            Self::Basic(username, password) => {
                let credentials = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", username, password));
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Basic {}", credentials))?,
                );
            }
            Self::Apikey(apikey) => {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("ApiKey {}", apikey))?,
                );
            }
            Self::None => {}
        }
        Ok(())
    }
}

impl std::fmt::Display for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Apikey(_) => write!(f, "Apikey"),
            Self::Basic(_, _) => write!(f, "Basic"),
            Self::None => write!(f, "None"),
        }
    }
}

/// Authentication schemes accepted by `STORE_AUTH`
///
/// Digest authentication is not supported; a store that requires it must be
/// reconfigured for basic auth over TLS or for API keys.
#[derive(Clone, Debug, ValueEnum)]
pub enum AuthType {
    Apikey,
    Basic,
    None,
}

impl AuthType {
    /// Names accepted by [`AuthType::from_str`]
    pub const SUPPORTED: &'static str = "apikey, basic, none";
}

impl FromStr for AuthType {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "apikey" => Ok(Self::Apikey),
            "basic" => Ok(Self::Basic),
            "none" => Ok(Self::None),
            _ => Err(()),
        }
    }
}
