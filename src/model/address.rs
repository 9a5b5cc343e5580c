//! Email address parsing (RFC 5322 §3.4).

/// A parsed email address.
///
/// # Examples
/// - `"Juan García <juan@ejemplo.com>"` → `display_name = "Juan García"`, `address = "juan@ejemplo.com"`
/// - `"user@example.com"` → `display_name = ""`, `address = "user@example.com"`
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EmailAddress {
    /// Human-readable display name (may be empty).
    pub display_name: String,
    /// The bare email address (`user@domain`). May be empty for a name-only entry.
    pub address: String,
}

impl EmailAddress {
    /// Parse a single address from an already-decoded header value.
    ///
    /// Accepts `user@domain`, `<user@domain>`, `Name <user@domain>` and
    /// `"Last, First" <user@domain>`. A value without `@` or angle brackets
    /// is kept as a display name.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();

        if let (Some(open), Some(close)) = (trimmed.rfind('<'), trimmed.rfind('>')) {
            if close > open {
                return Self {
                    display_name: strip_quotes(&trimmed[..open]),
                    address: trimmed[open + 1..close].trim().to_string(),
                };
            }
        }

        if trimmed.contains('@') {
            Self {
                display_name: String::new(),
                address: trimmed.to_string(),
            }
        } else {
            Self {
                display_name: strip_quotes(trimmed),
                address: String::new(),
            }
        }
    }

    /// Parse a comma-separated list of addresses, honouring quoted commas:
    /// `"Last, First" <a@b.com>, other@c.com`.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        let mut results = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut in_angle = false;

        for ch in raw.chars() {
            match ch {
                '"' => in_quotes = !in_quotes,
                '<' if !in_quotes => in_angle = true,
                '>' if !in_quotes => in_angle = false,
                ',' if !in_quotes && !in_angle => {
                    results.extend(Self::parse_nonempty(&current));
                    current.clear();
                    continue;
                }
                _ => {}
            }
            current.push(ch);
        }
        results.extend(Self::parse_nonempty(&current));
        results
    }

    fn parse_nonempty(raw: &str) -> Option<Self> {
        let addr = Self::parse(raw);
        (!addr.address.is_empty() || !addr.display_name.is_empty()).then_some(addr)
    }

    /// Format for display: `"Display Name <address>"`, `"address"`, or just
    /// the name when there is no address.
    pub fn display(&self) -> String {
        match (self.display_name.is_empty(), self.address.is_empty()) {
            (false, false) => format!("{} <{}>", self.display_name, self.address),
            (true, _) => self.address.clone(),
            (false, true) => self.display_name.clone(),
        }
    }
}

/// Join a list of addresses for a header block line.
pub fn format_list(addresses: &[EmailAddress]) -> String {
    addresses
        .iter()
        .map(EmailAddress::display)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Strip surrounding double-quotes and trim whitespace.
fn strip_quotes(s: &str) -> String {
    let trimmed = s.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}
