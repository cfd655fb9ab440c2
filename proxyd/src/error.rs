//! Proxy-local error type. Wraps [`stubres::ResolveError`] and the couple
//! of failure modes that belong to the proxy itself rather than the
//! resolver it drives.

use std::fmt;

#[derive(Debug)]
pub enum ProxyError {
    Config(String),
    Io(std::io::Error),
    Resolve(stubres::ResolveError),
}

impl ProxyError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Io(err) => write!(f, "io error: {err}"),
            Self::Resolve(err) => write!(f, "resolve error: {err}"),
        }
    }
}

impl std::error::Error for ProxyError {}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<stubres::ResolveError> for ProxyError {
    fn from(err: stubres::ResolveError) -> Self {
        Self::Resolve(err)
    }
}
