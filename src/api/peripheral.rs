use std::fmt;

/// Link state of a peripheral session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
        };
        f.write_str(text)
    }
}

/// `true` for six colon separated hex octets, e.g. `12:34:56:65:43:21`.
pub fn is_valid_address(address: &str) -> bool {
    let octets: Vec<&str> = address.split(':').collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|octet| octet.len() == 2 && octet.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Canonical form used for comparisons and registry keys.
pub fn normalize_address(address: &str) -> String {
    address.to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_validation() {
        assert!(is_valid_address("12:34:56:65:43:21"));
        assert!(is_valid_address("c0:26:df:01:f2:72"));
        assert!(!is_valid_address("12:34:56:65:43"));
        assert!(!is_valid_address("12-34-56-65-43-21"));
        assert!(!is_valid_address("12:34:56:65:43:2G"));
        assert!(!is_valid_address(""));
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address("c0:26:df:01:f2:72"), "C0:26:DF:01:F2:72");
    }
}
