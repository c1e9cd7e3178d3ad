//! # Closed Control Enumerations
//!
//! Every enumerated field a compliance payload carries is modelled as a
//! closed Rust enum. The wire spelling of each variant is fixed here and is
//! the only place it is defined; validators, snapshots, and persistence all
//! go through [`as_str`](Criticality::as_str) and `FromStr`.

use serde::{Deserialize, Serialize};

/// Error returned when a string does not name a variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("must be one of {expected}")]
pub struct UnknownVariant {
    /// Human-readable list of accepted spellings.
    pub expected: String,
}

macro_rules! closed_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $wire:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl $name {
            /// Every variant in declaration order.
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];

            /// The wire spelling.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }

            /// Comma-separated list of accepted spellings, for error messages.
            pub fn expected() -> String {
                Self::ALL
                    .iter()
                    .map(|v| v.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| UnknownVariant { expected: Self::expected() })
            }
        }
    };
}

closed_enum!(
    /// Control criticality.
    Criticality {
        /// High criticality.
        High => "High",
        /// Medium criticality.
        Medium => "Medium",
        /// Low criticality.
        Low => "Low",
    }
);

closed_enum!(
    /// Whether the control is mandatory.
    MandatoryOptional {
        /// Mandatory control.
        Mandatory => "Mandatory",
        /// Optional control.
        Optional => "Optional",
    }
);

closed_enum!(
    /// How the control is executed.
    ManualAutomatic {
        /// Manually executed.
        Manual => "Manual",
        /// Automated.
        Automatic => "Automatic",
    }
);

closed_enum!(
    /// Capability maturity of the control.
    MaturityLevel {
        /// Ad-hoc.
        Initial => "Initial",
        /// Partially repeatable.
        Developing => "Developing",
        /// Documented and standardized.
        Defined => "Defined",
        /// Measured and controlled.
        Managed => "Managed",
        /// Continuously improved.
        Optimizing => "Optimizing",
    }
);

closed_enum!(
    /// Whether the control is permanent or time-boxed.
    PermanentTemporary {
        /// Permanent control.
        Permanent => "Permanent",
        /// Temporary control.
        Temporary => "Temporary",
    }
);

closed_enum!(
    /// Review status of a Compliance row.
    ComplianceStatus {
        /// Awaiting a reviewer decision.
        UnderReview => "Under Review",
        /// Approved by the reviewer.
        Approved => "Approved",
        /// Rejected by the reviewer.
        Rejected => "Rejected",
    }
);

closed_enum!(
    /// Activation flag of a Compliance row.
    ActiveState {
        /// The row is the live version of its identifier.
        Active => "Active",
        /// The row is not live.
        Inactive => "Inactive",
    }
);

closed_enum!(
    /// Classification of a data-inventory field.
    DataClassification {
        /// Personal data.
        Personal => "personal",
        /// Confidential business data.
        Confidential => "confidential",
        /// Regular data.
        Regular => "regular",
    }
);

closed_enum!(
    /// How an edit bumps the compliance version.
    VersioningType {
        /// `2.3 -> 2.4`.
        Minor => "Minor",
        /// `2.3 -> 3.0`.
        Major => "Major",
    }
);

closed_enum!(
    /// Toggle-active intent.
    ToggleIntent {
        /// Make the target the live version.
        Activate => "Activate",
        /// Take the target out of service.
        Deactivate => "Deactivate",
    }
);

impl ActiveState {
    /// Whether this is `Active`.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl ComplianceStatus {
    /// Status resulting from a reviewer decision.
    pub fn from_decision(approved: bool) -> Self {
        if approved {
            Self::Approved
        } else {
            Self::Rejected
        }
    }
}

impl Default for PermanentTemporary {
    fn default() -> Self {
        Self::Permanent
    }
}

impl Default for MaturityLevel {
    fn default() -> Self {
        Self::Initial
    }
}
