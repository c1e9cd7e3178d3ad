//! # Version Calculator
//!
//! Two calculations:
//!
//! - [`next_version`]: the compliance version an edit receives, driven by
//!   the [`VersioningType`].
//! - [`next_tag`]: the next `u<N>` / `r<N>` approval tag for an identifier,
//!   computed from the tags already on file.
//!
//! Both are pure. Callers must read the existing state and insert the
//! result inside the same transactional view.

use grc_core::version::{parse_scaled, SCALE};
use grc_core::{ApprovalTag, ComplianceVersion, TagFamily, VersioningType};

const TENTH: i64 = SCALE / 10;

/// Compute the version that follows `current`.
///
/// - Missing or blank `current` yields `1.0`.
/// - An unparsable `current` yields `2.0`.
/// - `Minor` adds 0.1 and rounds to one decimal (`2.3 -> 2.4`).
/// - `Major` increments the integer part and resets the fraction (`2.3 -> 3.0`).
pub fn next_version(current: Option<&str>, kind: VersioningType) -> ComplianceVersion {
    let current = match current.map(str::trim) {
        None | Some("") => return ComplianceVersion::initial(),
        Some(s) => s,
    };
    let Some(scaled) = parse_scaled(current) else {
        tracing::warn!(version = current, "unparsable compliance version, defaulting to 2.0");
        return ComplianceVersion::from_scaled(2 * SCALE);
    };
    let next = match kind {
        VersioningType::Minor => {
            let bumped = scaled + TENTH;
            (bumped + TENTH / 2) / TENTH * TENTH
        }
        VersioningType::Major => (scaled / SCALE + 1) * SCALE,
    };
    ComplianceVersion::from_scaled(next)
}

/// Compute the next tag of `family` given the tags already on file for one
/// identifier. Strings that are not valid tags are ignored.
pub fn next_tag<'a, I>(existing: I, family: TagFamily) -> ApprovalTag
where
    I: IntoIterator<Item = &'a str>,
{
    existing
        .into_iter()
        .filter_map(ApprovalTag::parse)
        .filter(|t| t.family() == family)
        .max_by_key(ApprovalTag::number)
        .map_or_else(|| ApprovalTag::first(family), |t| t.next())
}
