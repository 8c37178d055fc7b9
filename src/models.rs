//! Graph data model.
//!
//! Nodes: persons (authors), articles, partner institutions, workstreams,
//! roles and countries. Edges: authorship, affiliation, membership,
//! unit-of and refers-to.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix of a canonical ORCID identifier
pub const ORCID_PREFIX: &str = "https://orcid.org/";

/// Canonical ORCID form: `https://orcid.org/XXXX-XXXX-XXXX-XXXX` with an
/// upper-case check digit. Accepts bare ids and `orcid.org/` URLs.
///
/// Returns `None` for empty input.
pub fn canonical_orcid(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let bare = trimmed
        .strip_prefix("https://orcid.org/")
        .or_else(|| trimmed.strip_prefix("http://orcid.org/"))
        .or_else(|| trimmed.strip_prefix("orcid.org/"))
        .unwrap_or(trimmed)
        .trim_matches('/');
    if bare.is_empty() {
        return None;
    }
    Some(format!("{}{}", ORCID_PREFIX, bare.to_uppercase()))
}

/// Stable reference to a stored person
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PersonRef(pub Uuid);

impl std::fmt::Display for PersonRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A person node (an author of, or contributor to, an output)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub uuid: Uuid,
    pub first_name: String,
    pub last_name: String,
    /// Canonical ORCID URL
    pub orcid: Option<String>,
    pub openalex: Option<String>,
    /// External profile links (homepage, Google Scholar, ...)
    #[serde(default)]
    pub links: Vec<String>,
}

impl Person {
    /// New person with a fresh identifier
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>, orcid: Option<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            orcid,
            openalex: None,
            links: Vec::new(),
        }
    }

    pub fn reference(&self) -> PersonRef {
        PersonRef(self.uuid)
    }

    pub fn full_name(&self) -> String {
        join_name(&self.first_name, &self.last_name)
    }
}

/// Fields to add to an existing person. Only ever fills gaps.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PersonPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub orcid: Option<String>,
    pub openalex: Option<String>,
}

impl PersonPatch {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.orcid.is_none()
            && self.openalex.is_none()
    }

    /// Apply to a person in place, never overwriting populated fields.
    pub fn apply_to(&self, person: &mut Person) {
        if person.first_name.trim().is_empty() {
            if let Some(first) = &self.first_name {
                person.first_name = first.clone();
            }
        }
        if person.last_name.trim().is_empty() {
            if let Some(last) = &self.last_name {
                person.last_name = last.clone();
            }
        }
        if person.orcid.is_none() {
            person.orcid = self.orcid.clone();
        }
        if person.openalex.is_none() {
            person.openalex = self.openalex.clone();
        }
    }
}

/// Institutional context attached to a mention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstitutionHint {
    /// Registry identifier (ROR, OpenAlex, DBpedia or partner id)
    Id(String),
    /// Free-text institution name
    Name(String),
}

/// One raw author occurrence in a metadata record
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Mention {
    pub first_name: String,
    pub last_name: String,
    /// Canonical ORCID URL
    pub orcid: Option<String>,
    pub rank: u32,
    pub openalex: Option<String>,
    #[serde(default)]
    pub institutions: Vec<InstitutionHint>,
}

impl Mention {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>, orcid: Option<&str>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            orcid: orcid.and_then(canonical_orcid),
            rank: 1,
            openalex: None,
            institutions: Vec::new(),
        }
    }

    pub fn full_name(&self) -> String {
        join_name(&self.first_name, &self.last_name)
    }
}

/// A project partner institution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Institution {
    pub id: String,
    pub name: String,
    pub ror: Option<String>,
    pub openalex: Option<String>,
    pub dbpedia: Option<String>,
}

/// Person to partner relationship
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AffiliationLink {
    pub person: PersonRef,
    pub institution_id: String,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

/// Person to workstream relationship
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Membership {
    pub person: PersonRef,
    pub unit_id: String,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

/// A division of the work programme
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workstream {
    pub id: String,
    pub name: String,
}

/// A project role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
}

/// A country node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Country {
    /// ISO 3166-1 alpha-3 code
    pub id: String,
    pub name: String,
    pub official_name: String,
    pub dbpedia: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Parsed metadata for one research output
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ArticleMetadata {
    pub doi: String,
    pub title: String,
    pub abstract_text: String,
    pub authors: Vec<Mention>,
    pub journal: String,
    pub issue: Option<String>,
    pub volume: Option<String>,
    pub publication_year: Option<i32>,
    pub publication_month: Option<u32>,
    pub publication_day: Option<u32>,
    pub publisher: Option<String>,
    pub result_type: String,
    pub resource_type: Option<String>,
    pub openalex: Option<String>,
    pub cited_by_count: i64,
    pub cited_by_count_date: Option<NaiveDate>,
}

/// Stored article reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ArticleRef(pub Uuid);

fn join_name(first: &str, last: &str) -> String {
    format!("{} {}", first.trim(), last.trim()).trim().to_string()
}
