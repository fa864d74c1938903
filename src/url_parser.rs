use crate::error::ParseError;

/// `scheme://host[:port]path` split into its parts.
///
/// The port is kept as parsed; range validation belongs to the caller, which
/// turns `0` or values above `u16::MAX` into [`crate::ErrorKind::InvalidPort`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedUrl {
    pub scheme: String,
    pub host: String,
    pub port: u32,
    pub path: String,
}

impl ParsedUrl {
    pub fn is_default_port(&self) -> bool {
        default_port_for_scheme(&self.scheme) == Some(self.port)
    }

    /// `host` or `host:port`, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        let host = bracket_ipv6(&self.host);
        if self.is_default_port() {
            host.into_owned()
        } else {
            format!("{host}:{}", self.port)
        }
    }
}

impl std::fmt::Display for ParsedUrl {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}://{}{}", self.scheme, self.authority(), self.path)
    }
}

pub fn default_port_for_scheme(scheme: &str) -> Option<u32> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

/// Splits a URL without touching the network.
///
/// Unknown schemes parse successfully with port `0` unless one is given.
pub fn parse_url(url: &str) -> Result<ParsedUrl, ParseError> {
    let Some((scheme, rest)) = url.trim().split_once("://") else {
        return Err(ParseError::MissingScheme);
    };
    if scheme.is_empty() {
        return Err(ParseError::MissingScheme);
    }
    let scheme = scheme.to_ascii_lowercase();

    let path_start = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (authority, path) = rest.split_at(path_start);
    let path = match path.chars().next() {
        None => "/".to_owned(),
        Some('/') => path.to_owned(),
        Some(_) => format!("/{path}"),
    };

    if authority.contains('@') {
        return Err(ParseError::UserInfoNotSupported);
    }
    let (host, port) = split_host_port(authority)?;
    if host.is_empty() {
        return Err(ParseError::MissingHost);
    }
    let port = match port {
        Some(port) => port,
        None => default_port_for_scheme(&scheme).unwrap_or(0),
    };

    Ok(ParsedUrl {
        scheme,
        host: host.to_owned(),
        port,
        path,
    })
}

fn split_host_port(authority: &str) -> Result<(&str, Option<u32>), ParseError> {
    if let Some(bracketed) = authority.strip_prefix('[') {
        let Some((host, after)) = bracketed.split_once(']') else {
            return Err(ParseError::MissingHost);
        };
        return match after.strip_prefix(':') {
            Some(port) => Ok((host, Some(parse_port(port)?))),
            None if after.is_empty() => Ok((host, None)),
            None => Err(ParseError::InvalidPort {
                port: after.to_owned(),
            }),
        };
    }

    match authority.rsplit_once(':') {
        Some((host, port)) => Ok((host, Some(parse_port(port)?))),
        None => Ok((authority, None)),
    }
}

fn parse_port(port: &str) -> Result<u32, ParseError> {
    if port.is_empty() || !port.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(ParseError::InvalidPort {
            port: port.to_owned(),
        });
    }
    port.parse::<u32>().map_err(|_| ParseError::InvalidPort {
        port: port.to_owned(),
    })
}

pub(crate) fn bracket_ipv6(host: &str) -> std::borrow::Cow<'_, str> {
    if host.contains(':') {
        std::borrow::Cow::Owned(format!("[{host}]"))
    } else {
        std::borrow::Cow::Borrowed(host)
    }
}
