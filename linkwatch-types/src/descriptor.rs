//! Connection descriptors and link identity.
//!
//! A descriptor is the user-facing string naming one telemetry link:
//!
//! | form                   | meaning                                   |
//! |------------------------|-------------------------------------------|
//! | `udpout:<host>:<port>` | UDP, we send first to a known peer        |
//! | `udp:<host>:<port>`    | alias of `udpout`                         |
//! | `udpin:<bind>:<port>`  | UDP, bind and learn the peer on first rx  |
//! | `tcp:<host>:<port>`    | TCP client                                |
//! | `tcpin:<bind>:<port>`  | TCP server, first client wins             |
//! | `<device>:<baud>`      | serial device                             |

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors produced while parsing a connection descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// The descriptor does not have the expected number of `:` separated parts.
    #[error("invalid {scheme} descriptor '{descriptor}': expected {expected}")]
    Malformed {
        scheme: &'static str,
        descriptor: String,
        expected: &'static str,
    },

    /// The port could not be parsed.
    #[error("invalid port '{0}'")]
    Port(String),

    /// The baud rate could not be parsed.
    #[error("invalid baud rate '{0}'")]
    Baud(String),

    /// The descriptor was empty.
    #[error("empty connection descriptor")]
    Empty,
}

/// A parsed connection descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LinkDescriptor {
    /// UDP socket that sends to a fixed remote address.
    UdpOut { host: String, port: u16 },
    /// UDP socket bound locally; the peer is learned from the first datagram.
    UdpIn { bind: String, port: u16 },
    /// TCP client connection.
    TcpOut { host: String, port: u16 },
    /// TCP listener accepting a single client.
    TcpIn { bind: String, port: u16 },
    /// Serial device at a fixed baud rate.
    Serial { path: String, baud: u32 },
}

impl LinkDescriptor {
    /// Short name of the transport variant, used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            LinkDescriptor::UdpOut { .. } => "udpout",
            LinkDescriptor::UdpIn { .. } => "udpin",
            LinkDescriptor::TcpOut { .. } => "tcp",
            LinkDescriptor::TcpIn { .. } => "tcpin",
            LinkDescriptor::Serial { .. } => "serial",
        }
    }

    /// Listen-mode links wait for the remote to speak first.
    pub fn is_listener(&self) -> bool {
        matches!(
            self,
            LinkDescriptor::UdpIn { .. } | LinkDescriptor::TcpIn { .. }
        )
    }
}

impl fmt::Display for LinkDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkDescriptor::UdpOut { host, port } => write!(f, "udpout:{}:{}", host, port),
            LinkDescriptor::UdpIn { bind, port } => write!(f, "udpin:{}:{}", bind, port),
            LinkDescriptor::TcpOut { host, port } => write!(f, "tcp:{}:{}", host, port),
            LinkDescriptor::TcpIn { bind, port } => write!(f, "tcpin:{}:{}", bind, port),
            LinkDescriptor::Serial { path, baud } => write!(f, "{}:{}", path, baud),
        }
    }
}

impl FromStr for LinkDescriptor {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DescriptorError::Empty);
        }

        let (scheme, rest) = match s.split_once(':') {
            Some((scheme, rest)) => (scheme, rest),
            None => {
                return Err(DescriptorError::Malformed {
                    scheme: "serial",
                    descriptor: s.to_string(),
                    expected: "<device>:<baud>",
                })
            }
        };

        let network = |name: &'static str| -> Result<(String, u16), DescriptorError> {
            let parts: Vec<&str> = rest.split(':').collect();
            if parts.len() != 2 || parts[0].is_empty() {
                return Err(DescriptorError::Malformed {
                    scheme: name,
                    descriptor: s.to_string(),
                    expected: "<scheme>:<host>:<port>",
                });
            }
            let port = parts[1]
                .parse::<u16>()
                .map_err(|_| DescriptorError::Port(parts[1].to_string()))?;
            Ok((parts[0].to_string(), port))
        };

        match scheme {
            "udpout" | "udp" => {
                let (host, port) = network("udpout")?;
                Ok(LinkDescriptor::UdpOut { host, port })
            }
            "udpin" => {
                let (bind, port) = network("udpin")?;
                Ok(LinkDescriptor::UdpIn { bind, port })
            }
            "tcp" => {
                let (host, port) = network("tcp")?;
                Ok(LinkDescriptor::TcpOut { host, port })
            }
            "tcpin" => {
                let (bind, port) = network("tcpin")?;
                Ok(LinkDescriptor::TcpIn { bind, port })
            }
            _ => {
                // Device paths may not contain ':' themselves, the baud is
                // always the last component.
                let parts: Vec<&str> = s.split(':').collect();
                if parts.len() != 2 || parts[0].is_empty() {
                    return Err(DescriptorError::Malformed {
                        scheme: "serial",
                        descriptor: s.to_string(),
                        expected: "<device>:<baud>",
                    });
                }
                let baud = parts[1]
                    .parse::<u32>()
                    .map_err(|_| DescriptorError::Baud(parts[1].to_string()))?;
                Ok(LinkDescriptor::Serial {
                    path: parts[0].to_string(),
                    baud,
                })
            }
        }
    }
}

/// Replace characters that are awkward in file names.
///
/// `udpin:0.0.0.0:14550` becomes `udpin_0_0_0_0_14550`.
pub fn sanitize_descriptor(descriptor: &str) -> String {
    descriptor.replace([':', '.', '/'], "_")
}

/// Stable identity of one monitored link.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkIdentity {
    /// Position of the link in the configured list.
    pub id: usize,
    /// Descriptor exactly as configured.
    pub descriptor: String,
    /// Filename-safe form of the descriptor.
    pub sanitized: String,
}

impl LinkIdentity {
    /// Create an identity for the given id and raw descriptor.
    pub fn new(id: usize, descriptor: impl Into<String>) -> Self {
        let descriptor = descriptor.into();
        let sanitized = sanitize_descriptor(&descriptor);
        Self {
            id,
            descriptor,
            sanitized,
        }
    }
}

impl fmt::Display for LinkIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}
