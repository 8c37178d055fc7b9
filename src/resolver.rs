//! Author identity resolution.
//!
//! Decides whether an author mention refers to a person already in the
//! graph. ORCID equality is authoritative; name similarity is the fallback.
//! The resolver is stateless: the caller passes the current candidate set on
//! every call, so persons created earlier in the same record are visible to
//! later mentions as long as the caller re-reads the store.

use crate::config::Thresholds;
use crate::models::{canonical_orcid, Mention, Person, PersonPatch, PersonRef};
use crate::names::{is_usable_name, score_name_similarity};
use tracing::{debug, warn};

/// How an existing person was matched
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchKind {
    Orcid,
    Name { score: f64 },
}

/// Why a mention was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No letters left in the name after normalization
    EmptyName,
}

/// Outcome of resolving one mention
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The mention refers to a stored person. `patch` holds identifiers or
    /// names the store should add to it.
    Existing {
        person: PersonRef,
        kind: MatchKind,
        patch: Option<PersonPatch>,
    },
    /// No match: the caller should create this person.
    New(Person),
    /// The mention carries no usable name.
    Skipped(SkipReason),
}

impl Resolution {
    /// Reference to the resolved person, if any
    pub fn person(&self) -> Option<PersonRef> {
        match self {
            Resolution::Existing { person, .. } => Some(*person),
            Resolution::New(person) => Some(person.reference()),
            Resolution::Skipped(_) => None,
        }
    }
}

/// Matches author mentions against stored persons
#[derive(Debug, Clone, Default)]
pub struct IdentityResolver {
    thresholds: Thresholds,
}

impl IdentityResolver {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    /// Resolve a mention to an existing person or a person to create.
    pub fn resolve(&self, mention: &Mention, candidates: &[Person]) -> Resolution {
        if !is_usable_name(&mention.full_name()) {
            warn!(
                first_name = %mention.first_name,
                last_name = %mention.last_name,
                rank = mention.rank,
                "Skipping mention without a usable name"
            );
            return Resolution::Skipped(SkipReason::EmptyName);
        }

        match self.find(mention, candidates) {
            Some((person, kind)) => {
                debug!(person = %person.uuid, kind = ?kind, name = %mention.full_name(), "Author exists");
                let patch = enrichment(person, mention);
                Resolution::Existing {
                    person: person.reference(),
                    kind,
                    patch: (!patch.is_empty()).then_some(patch),
                }
            }
            None => {
                let mut person = Person::new(
                    mention.first_name.trim(),
                    mention.last_name.trim(),
                    mention_orcid(mention),
                );
                person.openalex = mention.openalex.clone();
                debug!(person = %person.uuid, name = %mention.full_name(), "Author does not exist");
                Resolution::New(person)
            }
        }
    }

    /// Find the stored person a mention refers to, without deciding on
    /// creation. Mentions without a usable name never match.
    pub fn find<'a>(&self, mention: &Mention, candidates: &'a [Person]) -> Option<(&'a Person, MatchKind)> {
        if !is_usable_name(&mention.full_name()) {
            return None;
        }

        let orcid = mention_orcid(mention);

        if let Some(orcid) = orcid.as_deref() {
            if let Some(person) = candidates
                .iter()
                .find(|p| person_orcid(p).as_deref() == Some(orcid))
            {
                let score = score_name_similarity(&person.full_name(), &mention.full_name());
                if score <= self.thresholds.orcid_name {
                    warn!(
                        orcid = %orcid,
                        stored = %person.full_name(),
                        mentioned = %mention.full_name(),
                        score,
                        "Name on ORCID record does not match author name"
                    );
                }
                return Some((person, MatchKind::Orcid));
            }
        }

        // A candidate holding a different ORCID is a different person.
        let eligible = |p: &Person| match (orcid.as_deref(), person_orcid(p)) {
            (Some(mine), Some(theirs)) => mine == theirs,
            _ => true,
        };

        let threshold = if orcid.is_some() {
            self.thresholds.orcid_name
        } else {
            self.thresholds.name
        };

        let (person, score) = best_name_match(mention, candidates, eligible)?;
        if score > threshold {
            Some((person, MatchKind::Name { score }))
        } else {
            debug!(
                name = %mention.full_name(),
                closest = %person.full_name(),
                score,
                threshold,
                "Best name match below threshold"
            );
            None
        }
    }
}

/// Highest-scoring eligible candidate. Ties keep the earliest candidate.
fn best_name_match<'a, F>(mention: &Mention, candidates: &'a [Person], eligible: F) -> Option<(&'a Person, f64)>
where
    F: Fn(&Person) -> bool,
{
    let name = mention.full_name();
    let mut best: Option<(&'a Person, f64)> = None;

    for candidate in candidates.iter().filter(|p| eligible(p)) {
        let score = score_name_similarity(&name, &candidate.full_name());
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((candidate, score));
        }
    }

    best
}

/// Fields of the mention the stored person lacks
fn enrichment(person: &Person, mention: &Mention) -> PersonPatch {
    let filled = |value: &str| {
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    };

    PersonPatch {
        first_name: if person.first_name.trim().is_empty() {
            filled(&mention.first_name)
        } else {
            None
        },
        last_name: if person.last_name.trim().is_empty() {
            filled(&mention.last_name)
        } else {
            None
        },
        orcid: if person.orcid.is_none() {
            mention_orcid(mention)
        } else {
            None
        },
        openalex: if person.openalex.is_none() {
            mention.openalex.clone()
        } else {
            None
        },
    }
}

fn mention_orcid(mention: &Mention) -> Option<String> {
    mention.orcid.as_deref().and_then(canonical_orcid)
}

fn person_orcid(person: &Person) -> Option<String> {
    person.orcid.as_deref().and_then(canonical_orcid)
}
