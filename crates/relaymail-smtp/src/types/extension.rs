//! EHLO capability parsing.

/// An SMTP extension advertised in the EHLO response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extension {
    /// STARTTLS - TLS upgrade (RFC 3207).
    StartTls,
    /// AUTH - supported SASL mechanism names, upper-cased.
    Auth(Vec<String>),
    /// SIZE - maximum message size in octets, if the server stated one.
    Size(Option<u64>),
    /// Any other keyword, kept verbatim.
    Other(String),
}

impl Extension {
    /// Parses a single EHLO capability line.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        let Some(keyword) = words.next() else {
            return Self::Other(line.to_string());
        };

        match keyword.to_uppercase().as_str() {
            "STARTTLS" => Self::StartTls,
            "AUTH" => Self::Auth(words.map(str::to_uppercase).collect()),
            "SIZE" => Self::Size(words.next().and_then(|s| s.parse().ok())),
            _ => Self::Other(line.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_starttls_any_case() {
        assert_eq!(Extension::parse("STARTTLS"), Extension::StartTls);
        assert_eq!(Extension::parse("starttls"), Extension::StartTls);
    }

    #[test]
    fn parse_auth_mechanisms() {
        let ext = Extension::parse("AUTH plain LOGIN");
        assert_eq!(ext, Extension::Auth(vec!["PLAIN".into(), "LOGIN".into()]));
    }

    #[test]
    fn parse_size() {
        assert_eq!(Extension::parse("SIZE 35882577"), Extension::Size(Some(35_882_577)));
        assert_eq!(Extension::parse("SIZE"), Extension::Size(None));
    }

    #[test]
    fn parse_other_keeps_line() {
        assert_eq!(
            Extension::parse("ENHANCEDSTATUSCODES"),
            Extension::Other("ENHANCEDSTATUSCODES".into())
        );
    }
}
