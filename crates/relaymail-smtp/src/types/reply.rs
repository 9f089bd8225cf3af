//! SMTP server replies.

/// A complete (possibly multi-line) reply from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Three-digit reply code.
    pub code: ReplyCode,
    /// Text of each reply line, continuation markers stripped.
    pub lines: Vec<String>,
}

impl Reply {
    /// Creates a reply from a code and its text lines.
    #[must_use]
    pub const fn new(code: ReplyCode, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// Returns true for a 2xx completion reply.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Returns the reply text joined into one line for diagnostics.
    #[must_use]
    pub fn text(&self) -> String {
        self.lines.join(" / ")
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code, self.text())
    }
}

/// A three-digit SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// 220 service ready (greeting, STARTTLS go-ahead).
    pub const SERVICE_READY: Self = Self(220);
    /// 221 closing transmission channel.
    pub const CLOSING: Self = Self(221);
    /// 250 requested action completed.
    pub const OK: Self = Self(250);
    /// 334 authentication continuation.
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354 start mail input.
    pub const START_DATA: Self = Self(354);

    /// Wraps a numeric code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// 2xx: the requested action completed.
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    /// 3xx: the server expects more input (354, 334).
    #[must_use]
    pub const fn is_intermediate(self) -> bool {
        self.0 >= 300 && self.0 < 400
    }

    /// 4xx: transient failure, retry may succeed later.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        self.0 >= 400 && self.0 < 500
    }

    /// 5xx: permanent failure.
    #[must_use]
    pub const fn is_permanent(self) -> bool {
        self.0 >= 500 && self.0 < 600
    }
}

impl std::fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
