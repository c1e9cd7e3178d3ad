//! # Capabilities
//!
//! Named permissions consumed from the external RBAC subsystem. The engine
//! only asks "does this principal hold capability X"; it never evaluates
//! roles itself.

use serde::{Deserialize, Serialize};

/// A named capability checked before every public operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Capability {
    /// Create compliance items.
    #[serde(rename = "compliance.create")]
    Create,
    /// Edit or clone compliance items and resubmit approvals.
    #[serde(rename = "compliance.edit")]
    Edit,
    /// Decide reviews and deactivation requests.
    #[serde(rename = "compliance.approve")]
    Approve,
    /// Toggle the active version.
    #[serde(rename = "compliance.toggle")]
    Toggle,
    /// Request deactivation.
    #[serde(rename = "compliance.deactivate")]
    Deactivate,
    /// Read compliance items, chains, and dashboards.
    #[serde(rename = "compliance.view")]
    View,
    /// List compliance items for export.
    #[serde(rename = "compliance.export")]
    Export,
}

impl Capability {
    /// Every capability.
    pub const ALL: &'static [Capability] = &[
        Self::Create,
        Self::Edit,
        Self::Approve,
        Self::Toggle,
        Self::Deactivate,
        Self::View,
        Self::Export,
    ];

    /// The capability name as the RBAC subsystem knows it.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "compliance.create",
            Self::Edit => "compliance.edit",
            Self::Approve => "compliance.approve",
            Self::Toggle => "compliance.toggle",
            Self::Deactivate => "compliance.deactivate",
            Self::View => "compliance.view",
            Self::Export => "compliance.export",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown capability '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for cap in Capability::ALL {
            assert_eq!(cap.as_str().parse::<Capability>().unwrap(), *cap);
            let json = serde_json::to_string(cap).unwrap();
            assert_eq!(json, format!("\"{}\"", cap.as_str()));
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert!("compliance.kpi".parse::<Capability>().is_err());
    }
}
