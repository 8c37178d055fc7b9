//! Graph store capability and its backends.
//!
//! - [`memgraph`] - Memgraph over Bolt (neo4rs)
//! - [`memory`] - in-process store for tests and dry runs

pub mod memgraph;
pub mod memory;

pub use memgraph::MemgraphStore;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::models::{
    AffiliationLink, ArticleMetadata, ArticleRef, Country, Institution, Membership, Mention, Person,
    PersonPatch, PersonRef, Role, Workstream,
};
use std::collections::HashSet;
use std::future::Future;

/// Persistence operations the ingestion pipeline and seeder rely on.
///
/// Writes have merge semantics: repeating a call with the same key never
/// creates a second node or edge.
pub trait GraphStore: Send + Sync {
    /// Persons a mention may refer to, in a stable order.
    fn candidate_persons(&self, mention: &Mention) -> impl Future<Output = Result<Vec<Person>>> + Send;

    /// Create a person. When the person has an ORCID and a person with that
    /// ORCID already exists, the existing reference is returned instead.
    fn create_person(&self, person: &Person) -> impl Future<Output = Result<PersonRef>> + Send;

    /// Add identifiers or missing names to a stored person.
    fn enrich_person(&self, person: PersonRef, patch: &PersonPatch) -> impl Future<Output = Result<()>> + Send;

    /// The subset of `dois` already stored as outputs.
    fn existing_dois(&self, dois: &[String]) -> impl Future<Output = Result<HashSet<String>>> + Send;

    /// Create or update an output keyed by DOI.
    fn upsert_article(&self, article: &ArticleMetadata) -> impl Future<Output = Result<ArticleRef>> + Send;

    fn link_author(&self, person: PersonRef, article: ArticleRef, rank: u32) -> impl Future<Output = Result<()>> + Send;

    fn link_affiliation(&self, link: &AffiliationLink) -> impl Future<Output = Result<()>> + Send;

    fn link_membership(&self, membership: &Membership) -> impl Future<Output = Result<()>> + Send;

    fn upsert_institution(&self, institution: &Institution) -> impl Future<Output = Result<()>> + Send;

    /// All seeded partner institutions, ordered by id.
    fn institutions(&self) -> impl Future<Output = Result<Vec<Institution>>> + Send;

    fn upsert_workstream(&self, workstream: &Workstream) -> impl Future<Output = Result<()>> + Send;

    fn link_unit_of(&self, child: &str, parent: &str) -> impl Future<Output = Result<()>> + Send;

    fn upsert_role(&self, role: &Role) -> impl Future<Output = Result<()>> + Send;

    fn upsert_country(&self, country: &Country) -> impl Future<Output = Result<()>> + Send;

    /// Link outputs to the countries named in their abstract. Returns the
    /// number of new links.
    fn add_country_relations(&self) -> impl Future<Output = Result<u64>> + Send;

    fn create_constraints(&self) -> impl Future<Output = Result<()>> + Send;

    /// Delete every node and edge.
    fn clear(&self) -> impl Future<Output = Result<()>> + Send;
}
