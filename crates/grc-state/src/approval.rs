//! # Approval Rows and Families
//!
//! An approval row is either a user submission (`u<N>`, always pending) or
//! a reviewer decision (`r<N>`, always decided). [`ApprovalStage`] makes the
//! distinction a sum type so a decided `u` row cannot be constructed.
//!
//! ## Family state
//!
//! ```text
//!   ∅ ──assign──▶ u1 (Pending) ──review──▶ r1 (Decided)
//!                    │   ▲                    │
//!               resubmit │                    │ resubmit
//!                    ▼   │                    ▼
//!                 u2 (Pending) ◀──────────────┘
//! ```
//!
//! The state of a family is read from row order: whichever of the latest
//! `u` and the latest `r` row was written last decides it.

use std::num::NonZeroU32;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use grc_core::{ApprovalTag, GrcError, TagFamily};

// ─── Errors ──────────────────────────────────────────────────────────

/// Violations of the approval ledger invariants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApprovalError {
    /// The stored tag is not `u<N>` or `r<N>`.
    #[error("malformed approval tag '{0}'")]
    MalformedTag(String),

    /// A `u` row carried a decision.
    #[error("submission row {tag} must not carry a decision")]
    DecidedSubmission {
        /// The offending tag.
        tag: String,
    },

    /// An `r` row carried no decision.
    #[error("decision row {tag} must carry a decision")]
    UndecidedDecision {
        /// The offending tag.
        tag: String,
    },

    /// Two rows share a tag.
    #[error("duplicate approval tag {tag}")]
    DuplicateTag {
        /// The duplicated tag.
        tag: String,
    },

    /// Tag numbers within a family skip a value.
    #[error("{family} tags are not contiguous: expected {expected}, found {found}")]
    Gap {
        /// Family letter.
        family: TagFamily,
        /// Number expected next.
        expected: u32,
        /// Number found.
        found: u32,
    },

    /// An `r<M>` row has no `u<N>` with `N <= M`.
    #[error("decision {tag} has no submission to pair with")]
    OrphanDecision {
        /// The orphaned tag.
        tag: String,
    },

    /// A decision was requested but the family has no submission.
    #[error("approval family has no submission to decide")]
    NothingToDecide,
}

impl From<ApprovalError> for GrcError {
    fn from(err: ApprovalError) -> Self {
        GrcError::InvariantViolation(err.to_string())
    }
}

// ─── Stage ───────────────────────────────────────────────────────────

/// The polymorphic part of an approval row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StageRepr", into = "StageRepr")]
pub enum ApprovalStage {
    /// `u<N>`: a user submission awaiting decision.
    Submitted {
        /// Tag number.
        number: u32,
    },
    /// `r<N>`: a reviewer decision.
    Decided {
        /// Tag number.
        number: u32,
        /// `true` = approved, `false` = rejected.
        approved: bool,
        /// When the decision was recorded.
        approved_at: DateTime<Utc>,
    },
}

impl ApprovalStage {
    /// Build a submission stage from a `u` tag.
    pub fn submitted(tag: ApprovalTag) -> Result<Self, ApprovalError> {
        match tag.family() {
            TagFamily::User => Ok(Self::Submitted {
                number: tag.number(),
            }),
            TagFamily::Reviewer => Err(ApprovalError::UndecidedDecision {
                tag: tag.to_string(),
            }),
        }
    }

    /// Build a decision stage from an `r` tag.
    pub fn decided(
        tag: ApprovalTag,
        approved: bool,
        approved_at: DateTime<Utc>,
    ) -> Result<Self, ApprovalError> {
        match tag.family() {
            TagFamily::Reviewer => Ok(Self::Decided {
                number: tag.number(),
                approved,
                approved_at,
            }),
            TagFamily::User => Err(ApprovalError::DecidedSubmission {
                tag: tag.to_string(),
            }),
        }
    }

    /// Rebuild from stored columns, enforcing the u/r shape rules.
    pub fn from_parts(
        tag: &str,
        approved_not: Option<bool>,
        approved_at: Option<DateTime<Utc>>,
    ) -> Result<Self, ApprovalError> {
        let parsed =
            ApprovalTag::parse(tag).ok_or_else(|| ApprovalError::MalformedTag(tag.to_string()))?;
        match (parsed.family(), approved_not) {
            (TagFamily::User, None) => Self::submitted(parsed),
            (TagFamily::User, Some(_)) => Err(ApprovalError::DecidedSubmission {
                tag: tag.to_string(),
            }),
            (TagFamily::Reviewer, Some(approved)) => {
                Self::decided(parsed, approved, approved_at.unwrap_or_else(Utc::now))
            }
            (TagFamily::Reviewer, None) => Err(ApprovalError::UndecidedDecision {
                tag: tag.to_string(),
            }),
        }
    }

    /// The row's tag.
    pub fn tag(&self) -> ApprovalTag {
        match *self {
            Self::Submitted { number } => tag_of(TagFamily::User, number),
            Self::Decided { number, .. } => tag_of(TagFamily::Reviewer, number),
        }
    }

    /// The tri-state decision column: `None` for pending submissions.
    pub fn approved_not(&self) -> Option<bool> {
        match *self {
            Self::Submitted { .. } => None,
            Self::Decided { approved, .. } => Some(approved),
        }
    }

    /// When the decision was recorded.
    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        match *self {
            Self::Submitted { .. } => None,
            Self::Decided { approved_at, .. } => Some(approved_at),
        }
    }

    /// The stored tag number, unvalidated.
    pub fn number(&self) -> u32 {
        match *self {
            Self::Submitted { number } | Self::Decided { number, .. } => number,
        }
    }

    /// Whether this is a `u` row.
    pub fn is_submission(&self) -> bool {
        matches!(self, Self::Submitted { .. })
    }
}

fn tag_of(family: TagFamily, number: u32) -> ApprovalTag {
    // Stage constructors only accept validated tags; a zero here is a row
    // built by hand, and `ApprovalFamily::verify` reports it.
    debug_assert!(number > 0, "approval stage number must be positive");
    ApprovalTag::from_nonzero(family, NonZeroU32::new(number).unwrap_or(NonZeroU32::MIN))
}

#[derive(Serialize, Deserialize)]
struct StageRepr {
    version: String,
    approved_not: Option<bool>,
    #[serde(default)]
    approved_date: Option<DateTime<Utc>>,
}

impl From<ApprovalStage> for StageRepr {
    fn from(stage: ApprovalStage) -> Self {
        Self {
            version: stage.tag().to_string(),
            approved_not: stage.approved_not(),
            approved_date: stage.approved_at(),
        }
    }
}

impl TryFrom<StageRepr> for ApprovalStage {
    type Error = ApprovalError;

    fn try_from(repr: StageRepr) -> Result<Self, Self::Error> {
        Self::from_parts(&repr.version, repr.approved_not, repr.approved_date)
    }
}

// ─── Family ──────────────────────────────────────────────────────────

/// The derived state of one approval family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyState {
    /// No rows yet.
    Empty,
    /// The latest row is a submission.
    Pending {
        /// Ordinal of the edit under review.
        submission: i64,
    },
    /// The latest row is a decision.
    Decided {
        /// Ordinal of the decision row.
        decision: i64,
        /// The decision.
        approved: bool,
    },
}

/// One row of a family as seen by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilyEntry {
    /// Insertion order (the approval row id).
    pub ordinal: i64,
    /// The row's stage.
    pub stage: ApprovalStage,
}

/// All approval rows sharing one identifier.
#[derive(Debug, Clone, Default)]
pub struct ApprovalFamily {
    entries: Vec<FamilyEntry>,
}

impl ApprovalFamily {
    /// Build from rows in any order.
    pub fn new(entries: impl IntoIterator<Item = FamilyEntry>) -> Self {
        let mut entries: Vec<FamilyEntry> = entries.into_iter().collect();
        entries.sort_by_key(|e| e.ordinal);
        Self { entries }
    }

    /// Rows in insertion order.
    pub fn entries(&self) -> &[FamilyEntry] {
        &self.entries
    }

    /// Whether the family has no rows.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The latest `u` row: the edit currently under review.
    pub fn latest_submission(&self) -> Option<FamilyEntry> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.stage.is_submission())
            .copied()
    }

    /// The latest `r` row.
    pub fn latest_decision(&self) -> Option<FamilyEntry> {
        self.entries
            .iter()
            .rev()
            .find(|e| !e.stage.is_submission())
            .copied()
    }

    /// Derived family state.
    pub fn state(&self) -> FamilyState {
        match self.entries.last() {
            None => FamilyState::Empty,
            Some(FamilyEntry {
                ordinal,
                stage: ApprovalStage::Submitted { .. },
            }) => FamilyState::Pending {
                submission: *ordinal,
            },
            Some(FamilyEntry {
                ordinal,
                stage: ApprovalStage::Decided { approved, .. },
            }) => FamilyState::Decided {
                decision: *ordinal,
                approved: *approved,
            },
        }
    }

    /// Next tag of `family`, via the shared tag calculator.
    pub fn next_tag(&self, family: TagFamily) -> ApprovalTag {
        let tags: Vec<String> = self
            .entries
            .iter()
            .map(|e| e.stage.tag().to_string())
            .collect();
        grc_compliance::next_tag(tags.iter().map(String::as_str), family)
    }

    /// The submission a decision should pair with: `preferred` when it is a
    /// `u` row of this family, otherwise the latest `u` row.
    pub fn subject_for_decision(&self, preferred: i64) -> Result<FamilyEntry, ApprovalError> {
        if let Some(entry) = self
            .entries
            .iter()
            .find(|e| e.ordinal == preferred && e.stage.is_submission())
        {
            return Ok(*entry);
        }
        self.latest_submission()
            .ok_or(ApprovalError::NothingToDecide)
    }

    /// Check tag contiguity, u/r shape, and decision pairing.
    pub fn verify(&self) -> Result<(), ApprovalError> {
        if let Some(zero) = self.entries.iter().find(|e| e.stage.number() == 0) {
            let letter = if zero.stage.is_submission() { 'u' } else { 'r' };
            return Err(ApprovalError::MalformedTag(format!("{letter}0")));
        }
        for family in [TagFamily::User, TagFamily::Reviewer] {
            let mut numbers: Vec<u32> = self
                .entries
                .iter()
                .map(|e| e.stage.tag())
                .filter(|t| t.family() == family)
                .map(|t| t.number())
                .collect();
            numbers.sort_unstable();
            for (i, n) in numbers.iter().enumerate() {
                let expected = i as u32 + 1;
                if *n < expected {
                    return Err(ApprovalError::DuplicateTag {
                        tag: format!("{}{}", family.letter(), n),
                    });
                }
                if *n > expected {
                    return Err(ApprovalError::Gap {
                        family,
                        expected,
                        found: *n,
                    });
                }
            }
        }
        let min_submission = self
            .entries
            .iter()
            .filter(|e| e.stage.is_submission())
            .map(|e| e.stage.tag().number())
            .min();
        for entry in self.entries.iter().filter(|e| !e.stage.is_submission()) {
            let tag = entry.stage.tag();
            match min_submission {
                Some(n) if n <= tag.number() => {}
                _ => {
                    return Err(ApprovalError::OrphanDecision {
                        tag: tag.to_string(),
                    })
                }
            }
        }
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn u(n: u32) -> ApprovalStage {
        ApprovalStage::submitted(ApprovalTag::new(TagFamily::User, n).unwrap()).unwrap()
    }

    fn r(n: u32, approved: bool) -> ApprovalStage {
        ApprovalStage::decided(
            ApprovalTag::new(TagFamily::Reviewer, n).unwrap(),
            approved,
            Utc::now(),
        )
        .unwrap()
    }

    fn family(stages: &[ApprovalStage]) -> ApprovalFamily {
        ApprovalFamily::new(stages.iter().enumerate().map(|(i, s)| FamilyEntry {
            ordinal: i as i64 + 1,
            stage: *s,
        }))
    }

    #[test]
    fn submission_cannot_carry_decision() {
        assert_eq!(
            ApprovalStage::from_parts("u1", Some(true), None),
            Err(ApprovalError::DecidedSubmission { tag: "u1".into() })
        );
        assert_eq!(
            ApprovalStage::from_parts("r1", None, None),
            Err(ApprovalError::UndecidedDecision { tag: "r1".into() })
        );
        assert!(ApprovalStage::from_parts("x1", None, None).is_err());
    }

    #[test]
    fn stage_columns() {
        assert_eq!(u(3).tag().to_string(), "u3");
        assert_eq!(u(3).approved_not(), None);
        assert_eq!(r(2, false).approved_not(), Some(false));
        assert!(r(2, false).approved_at().is_some());
    }

    #[test]
    fn stage_serializes_as_columns() {
        let json = serde_json::to_value(u(2)).unwrap();
        assert_eq!(json["version"], "u2");
        assert!(json["approved_not"].is_null());
        let back: ApprovalStage = serde_json::from_value(json).unwrap();
        assert_eq!(back, u(2));
        let bad = serde_json::json!({"version": "u1", "approved_not": true});
        assert!(serde_json::from_value::<ApprovalStage>(bad).is_err());
    }

    #[test]
    fn family_state_follows_latest_row() {
        assert_eq!(family(&[]).state(), FamilyState::Empty);
        assert_eq!(family(&[u(1)]).state(), FamilyState::Pending { submission: 1 });
        assert_eq!(
            family(&[u(1), r(1, false)]).state(),
            FamilyState::Decided {
                decision: 2,
                approved: false
            }
        );
        assert_eq!(
            family(&[u(1), r(1, false), u(2)]).state(),
            FamilyState::Pending { submission: 3 }
        );
    }

    #[test]
    fn next_tags_are_per_family() {
        let f = family(&[u(1), u(2), u(3), r(1, true)]);
        assert_eq!(f.next_tag(TagFamily::User).to_string(), "u4");
        assert_eq!(f.next_tag(TagFamily::Reviewer).to_string(), "r2");
    }

    #[test]
    fn decision_subject_prefers_given_submission() {
        let f = family(&[u(1), r(1, false), u(2)]);
        assert_eq!(f.subject_for_decision(1).unwrap().ordinal, 1);
        // An r row falls back to the latest u row.
        assert_eq!(f.subject_for_decision(2).unwrap().ordinal, 3);
        assert_eq!(
            family(&[]).subject_for_decision(1),
            Err(ApprovalError::NothingToDecide)
        );
    }

    #[test]
    fn verify_accepts_well_formed_ledgers() {
        assert!(family(&[u(1), r(1, true), u(2), r(2, true), r(3, true)])
            .verify()
            .is_ok());
    }

    #[test]
    fn verify_rejects_gaps_duplicates_and_orphans() {
        assert!(matches!(
            family(&[u(1), u(3)]).verify(),
            Err(ApprovalError::Gap { expected: 2, found: 3, .. })
        ));
        assert!(matches!(
            family(&[u(1), u(1)]).verify(),
            Err(ApprovalError::DuplicateTag { .. })
        ));
        assert!(matches!(
            family(&[r(1, true)]).verify(),
            Err(ApprovalError::OrphanDecision { .. })
        ));
    }

    #[test]
    fn verify_reports_hand_built_zero_tags() {
        assert_eq!(
            family(&[ApprovalStage::Submitted { number: 0 }]).verify(),
            Err(ApprovalError::MalformedTag("u0".into()))
        );
        let zero_decision = ApprovalStage::Decided {
            number: 0,
            approved: true,
            approved_at: Utc::now(),
        };
        assert_eq!(
            family(&[u(1), zero_decision]).verify(),
            Err(ApprovalError::MalformedTag("r0".into()))
        );
        assert_eq!(zero_decision.number(), 0);
    }

    #[test]
    fn approval_errors_are_invariant_violations() {
        let err: GrcError = ApprovalError::NothingToDecide.into();
        assert_eq!(err.code(), "INVARIANT_VIOLATION");
    }
}
