//! Links persons to seeded partner institutions.
//!
//! Institution text from external sources is inconsistent, so an unresolved
//! hint is dropped silently rather than reported as an error.

use crate::models::{AffiliationLink, Institution, InstitutionHint, PersonRef};
use chrono::NaiveDate;
use tracing::debug;

/// Resolves institution hints against the seeded partner list
#[derive(Debug, Clone, Default)]
pub struct AffiliationLinker {
    institutions: Vec<Institution>,
}

impl AffiliationLinker {
    pub fn new(institutions: Vec<Institution>) -> Self {
        Self { institutions }
    }

    /// Link a person to the institution a hint refers to, if any.
    pub fn link(&self, person: PersonRef, hint: &InstitutionHint) -> Option<AffiliationLink> {
        self.link_during(person, hint, None, None)
    }

    /// Link with an explicit time range.
    pub fn link_during(
        &self,
        person: PersonRef,
        hint: &InstitutionHint,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Option<AffiliationLink> {
        let institution = self.resolve(hint);
        if institution.is_none() {
            debug!(hint = ?hint, "Institution hint did not match any partner");
        }
        institution.map(|institution| AffiliationLink {
            person,
            institution_id: institution.id.clone(),
            start,
            end,
        })
    }

    /// Exact identifier match first, then exact name match.
    pub fn resolve(&self, hint: &InstitutionHint) -> Option<&Institution> {
        match hint {
            InstitutionHint::Id(id) => self
                .by_id(id)
                .or_else(|| self.by_name(id)),
            InstitutionHint::Name(name) => self.by_name(name),
        }
    }

    fn by_id(&self, raw: &str) -> Option<&Institution> {
        let wanted = registry_key(raw);
        if wanted.is_empty() {
            return None;
        }
        self.institutions.iter().find(|inst| {
            std::iter::once(Some(&inst.id))
                .chain([inst.ror.as_ref(), inst.openalex.as_ref(), inst.dbpedia.as_ref()])
                .flatten()
                .any(|id| registry_key(id) == wanted)
        })
    }

    fn by_name(&self, raw: &str) -> Option<&Institution> {
        let wanted = name_key(raw);
        if wanted.is_empty() {
            return None;
        }
        self.institutions.iter().find(|inst| name_key(&inst.name) == wanted)
    }
}

/// Identifier without scheme, host or case: `https://ror.org/052gg0110`
/// and `052gg0110` compare equal.
fn registry_key(raw: &str) -> String {
    raw.trim()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

fn name_key(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
