//! Intent — the classifier's output vocabulary.

use serde::{Deserialize, Serialize};

/// The routing intent behind a user message.
///
/// The classifier produces the first five; `Insurance` and `Weather` are
/// resolved by the router's external-agent mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Tickets,
    Account,
    Payments,
    General,
    Insurance,
    Weather,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Tickets => "tickets",
            Intent::Account => "account",
            Intent::Payments => "payments",
            Intent::General => "general",
            Intent::Insurance => "insurance",
            Intent::Weather => "weather",
            Intent::Unknown => "unknown",
        }
    }

    /// Whether this intent is served by a remote agent rather than a local
    /// task handler.
    pub fn is_external(&self) -> bool {
        matches!(self, Intent::Insurance | Intent::Weather)
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Intent {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tickets" => Ok(Intent::Tickets),
            "account" => Ok(Intent::Account),
            "payments" => Ok(Intent::Payments),
            "general" => Ok(Intent::General),
            "insurance" => Ok(Intent::Insurance),
            "weather" => Ok(Intent::Weather),
            "unknown" => Ok(Intent::Unknown),
            _ => Err(()),
        }
    }
}
