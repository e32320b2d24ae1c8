//! Stream descriptor parsing.
//!
//! A descriptor string names where a channel reads from or writes to:
//!
//! - empty: the process standard stream for the channel,
//! - a string without `://`: a filesystem path,
//! - `tcp://host:port`: an outbound TCP connection,
//! - any other URL: unsupported, bound to a null endpoint.

use std::fmt;
use std::path::PathBuf;

/// Separator distinguishing URLs from file paths.
const SCHEME_SEPARATOR: &str = "://";
/// URL scheme for TCP endpoints.
const TCP_SCHEME: &str = "tcp";

/// Parsed stream descriptor.
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum Descriptor {
    /// Process standard input or output.
    Standard,
    /// Filesystem path.
    File(PathBuf),
    /// Outbound TCP connection.
    Tcp { host: String, port: u16 },
    /// A URL that cannot be bound, kept verbatim for diagnostics.
    Unsupported(String),
}

impl Descriptor {
    /// Parses a descriptor string. Parsing never fails; anything that cannot
    /// be bound becomes [`Descriptor::Unsupported`].
    pub fn parse(raw: &str) -> Self {
        if raw.is_empty() {
            return Descriptor::Standard;
        }
        if !raw.contains(SCHEME_SEPARATOR) {
            return Descriptor::File(PathBuf::from(raw));
        }

        let Ok(url) = url::Url::parse(raw) else {
            return Descriptor::Unsupported(raw.to_string());
        };
        if url.scheme() != TCP_SCHEME {
            return Descriptor::Unsupported(raw.to_string());
        }

        let host = match url.host() {
            Some(url::Host::Domain(domain)) => domain.to_string(),
            Some(url::Host::Ipv4(addr)) => addr.to_string(),
            Some(url::Host::Ipv6(addr)) => addr.to_string(),
            None => return Descriptor::Unsupported(raw.to_string()),
        };
        match url.port() {
            Some(port) => Descriptor::Tcp { host, port },
            None => Descriptor::Unsupported(raw.to_string()),
        }
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Descriptor::Standard => write!(f, "<standard>"),
            Descriptor::File(path) => write!(f, "{}", path.display()),
            Descriptor::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            Descriptor::Unsupported(raw) => write!(f, "{raw}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_standard() {
        assert_eq!(Descriptor::parse(""), Descriptor::Standard);
    }

    #[test]
    fn test_parse_file() {
        assert_eq!(
            Descriptor::parse("/tmp/out.jsonl"),
            Descriptor::File(PathBuf::from("/tmp/out.jsonl"))
        );
        assert_eq!(
            Descriptor::parse("relative/in.jsonl"),
            Descriptor::File(PathBuf::from("relative/in.jsonl"))
        );
    }

    #[test]
    fn test_parse_tcp() {
        assert_eq!(
            Descriptor::parse("tcp://localhost:9999"),
            Descriptor::Tcp {
                host: "localhost".to_string(),
                port: 9999
            }
        );
        assert_eq!(
            Descriptor::parse("tcp://[::1]:7000"),
            Descriptor::Tcp {
                host: "::1".to_string(),
                port: 7000
            }
        );
    }

    #[test]
    fn test_parse_unsupported() {
        assert!(matches!(
            Descriptor::parse("tcp://localhost"),
            Descriptor::Unsupported(_)
        ));
        assert!(matches!(
            Descriptor::parse("udp://localhost:9"),
            Descriptor::Unsupported(_)
        ));
        assert!(matches!(
            Descriptor::parse("http://example.com/x"),
            Descriptor::Unsupported(_)
        ));
        assert!(matches!(Descriptor::parse("://"), Descriptor::Unsupported(_)));
    }
}
