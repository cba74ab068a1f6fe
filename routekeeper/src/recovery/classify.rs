//! Failure classification.
//!
//! A caller-supplied [`ServiceHint`] wins. Without one, failures are run
//! through [`CLASSIFICATION_RULES`] in order and the first matching rule
//! decides.

use std::fmt;

use serde::{Serialize, Serializer};

use super::failure::{ErrorContext, Failure, ServiceHint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ApiFailure {
    Auth,
    RateLimit,
    Generic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorClass {
    Network,
    Location,
    Api(ApiFailure),
    DataCorruption,
    Map,
    Sync,
    Unknown,
}

impl ErrorClass {
    /// Every class, for tables and reports.
    pub const ALL: [ErrorClass; 9] = [
        ErrorClass::Network,
        ErrorClass::Location,
        ErrorClass::Api(ApiFailure::Auth),
        ErrorClass::Api(ApiFailure::RateLimit),
        ErrorClass::Api(ApiFailure::Generic),
        ErrorClass::DataCorruption,
        ErrorClass::Map,
        ErrorClass::Sync,
        ErrorClass::Unknown,
    ];

    /// Critical classes get automatic recovery from `handle_error`.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            ErrorClass::Network | ErrorClass::Location | ErrorClass::DataCorruption | ErrorClass::Map
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ErrorClass::Network => "network",
            ErrorClass::Location => "location",
            ErrorClass::Api(ApiFailure::Auth) => "api_auth",
            ErrorClass::Api(ApiFailure::RateLimit) => "api_rate_limit",
            ErrorClass::Api(ApiFailure::Generic) => "api_generic",
            ErrorClass::DataCorruption => "data_corruption",
            ErrorClass::Map => "map",
            ErrorClass::Sync => "sync",
            ErrorClass::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for ErrorClass {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// One row of the classification table.
#[derive(Clone, Copy)]
pub struct ClassificationRule {
    pub name: &'static str,
    pub matches: fn(&Failure) -> bool,
    pub class: ErrorClass,
}

impl fmt::Debug for ClassificationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassificationRule")
            .field("name", &self.name)
            .field("class", &self.class)
            .finish()
    }
}

const NETWORK_KEYWORDS: &[&str] = &[
    "network",
    "connection",
    "unreachable",
    "offline",
    "fetch failed",
    "dns",
    "socket",
];
const LOCATION_KEYWORDS: &[&str] = &["location", "gps", "position", "geolocation", "coordinate"];
const CORRUPTION_KEYWORDS: &[&str] = &[
    "corrupt",
    "parse",
    "json",
    "unexpected token",
    "malformed",
    "decode",
];
const MAP_KEYWORDS: &[&str] = &["map", "tile", "viewport", "region"];
const SYNC_KEYWORDS: &[&str] = &["sync", "pending action", "queue"];

fn mentions(failure: &Failure, keywords: &[&str]) -> bool {
    let message = failure.message.to_lowercase();
    let code = failure.code.as_deref().unwrap_or_default().to_lowercase();
    keywords
        .iter()
        .any(|k| message.contains(k) || code.contains(k))
}

fn is_auth_status(f: &Failure) -> bool {
    matches!(f.status, Some(401) | Some(403))
}

fn is_rate_limit_status(f: &Failure) -> bool {
    f.status == Some(429)
}

fn is_network(f: &Failure) -> bool {
    mentions(f, NETWORK_KEYWORDS)
}

fn is_location(f: &Failure) -> bool {
    mentions(f, LOCATION_KEYWORDS)
}

fn is_corruption(f: &Failure) -> bool {
    mentions(f, CORRUPTION_KEYWORDS)
}

fn is_map(f: &Failure) -> bool {
    mentions(f, MAP_KEYWORDS)
}

fn is_sync(f: &Failure) -> bool {
    mentions(f, SYNC_KEYWORDS)
}

fn is_error_status(f: &Failure) -> bool {
    f.status.is_some_and(|s| s >= 400)
}

/// Ordered classification table. First match wins.
pub const CLASSIFICATION_RULES: &[ClassificationRule] = &[
    ClassificationRule {
        name: "auth status",
        matches: is_auth_status,
        class: ErrorClass::Api(ApiFailure::Auth),
    },
    ClassificationRule {
        name: "rate limit status",
        matches: is_rate_limit_status,
        class: ErrorClass::Api(ApiFailure::RateLimit),
    },
    ClassificationRule {
        name: "network keywords",
        matches: is_network,
        class: ErrorClass::Network,
    },
    ClassificationRule {
        name: "location keywords",
        matches: is_location,
        class: ErrorClass::Location,
    },
    ClassificationRule {
        name: "corruption keywords",
        matches: is_corruption,
        class: ErrorClass::DataCorruption,
    },
    ClassificationRule {
        name: "map keywords",
        matches: is_map,
        class: ErrorClass::Map,
    },
    ClassificationRule {
        name: "sync keywords",
        matches: is_sync,
        class: ErrorClass::Sync,
    },
    ClassificationRule {
        name: "error status",
        matches: is_error_status,
        class: ErrorClass::Api(ApiFailure::Generic),
    },
];

/// API failure kind for an HTTP status.
pub fn api_failure_for_status(status: Option<u16>) -> ApiFailure {
    match status {
        Some(401) | Some(403) => ApiFailure::Auth,
        Some(429) => ApiFailure::RateLimit,
        _ => ApiFailure::Generic,
    }
}

/// First rule that matches, ignoring hints.
pub fn matching_rule(failure: &Failure) -> Option<&'static ClassificationRule> {
    CLASSIFICATION_RULES.iter().find(|rule| (rule.matches)(failure))
}

pub fn classify(failure: &Failure, context: &ErrorContext) -> ErrorClass {
    if let Some(hint) = context.service {
        return match hint {
            ServiceHint::Network => ErrorClass::Network,
            ServiceHint::Location => ErrorClass::Location,
            ServiceHint::Api => ErrorClass::Api(api_failure_for_status(failure.status)),
            ServiceHint::Storage => ErrorClass::DataCorruption,
            ServiceHint::Map => ErrorClass::Map,
            ServiceHint::Sync => ErrorClass::Sync,
        };
    }

    matching_rule(failure)
        .map(|rule| rule.class)
        .unwrap_or(ErrorClass::Unknown)
}
