//! In-process graph store.
//!
//! Mirrors the merge semantics of the Memgraph backend so the pipeline can
//! be exercised without a database, and backs the `--dry-run` flag.

use super::GraphStore;
use crate::error::Result;
use crate::models::{
    canonical_orcid, AffiliationLink, ArticleMetadata, ArticleRef, Country, Institution, Membership,
    Mention, Person, PersonPatch, PersonRef, Role, Workstream,
};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Contents of a [`MemoryStore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryGraph {
    pub persons: Vec<Person>,
    pub articles: Vec<(ArticleRef, ArticleMetadata)>,
    pub authorships: Vec<(PersonRef, ArticleRef, u32)>,
    pub affiliations: Vec<AffiliationLink>,
    pub memberships: Vec<Membership>,
    pub institutions: Vec<Institution>,
    pub workstreams: Vec<Workstream>,
    pub unit_of: Vec<(String, String)>,
    pub roles: Vec<Role>,
    pub countries: Vec<Country>,
    pub refers_to: Vec<(ArticleRef, String)>,
    pub constraints: bool,
}

/// Graph store held in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    graph: Mutex<MemoryGraph>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with persons, in the given order.
    pub fn with_persons(persons: Vec<Person>) -> Self {
        Self {
            graph: Mutex::new(MemoryGraph {
                persons,
                ..Default::default()
            }),
        }
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> MemoryGraph {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryGraph> {
        self.graph.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn upsert_by<T, F>(items: &mut Vec<T>, item: T, same: F)
where
    F: Fn(&T, &T) -> bool,
{
    match items.iter_mut().find(|existing| same(existing, &item)) {
        Some(existing) => *existing = item,
        None => items.push(item),
    }
}

impl GraphStore for MemoryStore {
    async fn candidate_persons(&self, _mention: &Mention) -> Result<Vec<Person>> {
        Ok(self.lock().persons.clone())
    }

    async fn create_person(&self, person: &Person) -> Result<PersonRef> {
        let mut graph = self.lock();
        if graph.persons.iter().any(|p| p.uuid == person.uuid) {
            return Ok(person.reference());
        }
        if let Some(orcid) = person.orcid.as_deref().and_then(canonical_orcid) {
            let existing = graph
                .persons
                .iter()
                .find(|p| p.orcid.as_deref().and_then(canonical_orcid).as_deref() == Some(orcid.as_str()));
            if let Some(existing) = existing {
                return Ok(existing.reference());
            }
        }
        graph.persons.push(person.clone());
        Ok(person.reference())
    }

    async fn enrich_person(&self, person: PersonRef, patch: &PersonPatch) -> Result<()> {
        let mut graph = self.lock();
        if let Some(stored) = graph.persons.iter_mut().find(|p| p.reference() == person) {
            patch.apply_to(stored);
        }
        Ok(())
    }

    async fn existing_dois(&self, dois: &[String]) -> Result<HashSet<String>> {
        let graph = self.lock();
        Ok(dois
            .iter()
            .filter(|doi| graph.articles.iter().any(|(_, a)| &a.doi == *doi))
            .cloned()
            .collect())
    }

    async fn upsert_article(&self, article: &ArticleMetadata) -> Result<ArticleRef> {
        let mut graph = self.lock();
        if let Some((reference, stored)) = graph.articles.iter_mut().find(|(_, a)| a.doi == article.doi) {
            *stored = article.clone();
            return Ok(*reference);
        }
        let reference = ArticleRef(Uuid::new_v4());
        graph.articles.push((reference, article.clone()));
        Ok(reference)
    }

    async fn link_author(&self, person: PersonRef, article: ArticleRef, rank: u32) -> Result<()> {
        let mut graph = self.lock();
        upsert_by(&mut graph.authorships, (person, article, rank), |a, b| a.0 == b.0 && a.1 == b.1);
        Ok(())
    }

    async fn link_affiliation(&self, link: &AffiliationLink) -> Result<()> {
        let mut graph = self.lock();
        upsert_by(&mut graph.affiliations, link.clone(), |a, b| {
            a.person == b.person && a.institution_id == b.institution_id
        });
        Ok(())
    }

    async fn link_membership(&self, membership: &Membership) -> Result<()> {
        let mut graph = self.lock();
        upsert_by(&mut graph.memberships, membership.clone(), |a, b| {
            a.person == b.person && a.unit_id == b.unit_id
        });
        Ok(())
    }

    async fn upsert_institution(&self, institution: &Institution) -> Result<()> {
        let mut graph = self.lock();
        upsert_by(&mut graph.institutions, institution.clone(), |a, b| a.id == b.id);
        Ok(())
    }

    async fn institutions(&self) -> Result<Vec<Institution>> {
        let mut institutions = self.lock().institutions.clone();
        institutions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(institutions)
    }

    async fn upsert_workstream(&self, workstream: &Workstream) -> Result<()> {
        let mut graph = self.lock();
        upsert_by(&mut graph.workstreams, workstream.clone(), |a, b| a.id == b.id);
        Ok(())
    }

    async fn link_unit_of(&self, child: &str, parent: &str) -> Result<()> {
        let mut graph = self.lock();
        let edge = (child.to_string(), parent.to_string());
        if !graph.unit_of.contains(&edge) {
            graph.unit_of.push(edge);
        }
        Ok(())
    }

    async fn upsert_role(&self, role: &Role) -> Result<()> {
        let mut graph = self.lock();
        upsert_by(&mut graph.roles, role.clone(), |a, b| a.id == b.id);
        Ok(())
    }

    async fn upsert_country(&self, country: &Country) -> Result<()> {
        let mut graph = self.lock();
        upsert_by(&mut graph.countries, country.clone(), |a, b| a.id == b.id);
        Ok(())
    }

    async fn add_country_relations(&self) -> Result<u64> {
        let mut graph = self.lock();
        let mut new_links = Vec::new();
        for (reference, article) in &graph.articles {
            for country in &graph.countries {
                let edge = (*reference, country.id.clone());
                if article.abstract_text.contains(&country.name)
                    && !graph.refers_to.contains(&edge)
                    && !new_links.contains(&edge)
                {
                    new_links.push(edge);
                }
            }
        }
        let created = new_links.len() as u64;
        graph.refers_to.extend(new_links);
        Ok(created)
    }

    async fn create_constraints(&self) -> Result<()> {
        self.lock().constraints = true;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.lock() = MemoryGraph::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_person_merges_on_orcid() {
        let store = MemoryStore::new();
        let first = Person::new("John", "Smith", canonical_orcid("0000-0001-1111-1111"));
        let second = Person::new("J.", "Smith", canonical_orcid("https://orcid.org/0000-0001-1111-1111"));

        let a = store.create_person(&first).await.unwrap();
        let b = store.create_person(&second).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.snapshot().persons.len(), 1);
    }

    #[tokio::test]
    async fn test_create_person_is_idempotent_without_orcid() {
        let store = MemoryStore::new();
        let person = Person::new("Lucy", "Allington", None);

        let a = store.create_person(&person).await.unwrap();
        let b = store.create_person(&person).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.snapshot().persons.len(), 1);

        let namesake = Person::new("Lucy", "Allington", None);
        store.create_person(&namesake).await.unwrap();
        assert_eq!(store.snapshot().persons.len(), 2);
    }

    #[tokio::test]
    async fn test_upsert_article_keeps_reference() {
        let store = MemoryStore::new();
        let mut article = ArticleMetadata {
            doi: "10.5281/zenodo.1".to_string(),
            title: "First".to_string(),
            ..Default::default()
        };
        let a = store.upsert_article(&article).await.unwrap();
        article.title = "Second".to_string();
        let b = store.upsert_article(&article).await.unwrap();
        assert_eq!(a, b);
        let graph = store.snapshot();
        assert_eq!(graph.articles.len(), 1);
        assert_eq!(graph.articles[0].1.title, "Second");

        let existing = store
            .existing_dois(&["10.5281/zenodo.1".to_string(), "10.5281/zenodo.2".to_string()])
            .await
            .unwrap();
        assert_eq!(existing.len(), 1);
    }

    #[tokio::test]
    async fn test_country_relations_added_once() {
        let store = MemoryStore::new();
        store
            .upsert_country(&Country {
                id: "LBR".to_string(),
                name: "Liberia".to_string(),
                official_name: "Republic of Liberia".to_string(),
                dbpedia: None,
                latitude: None,
                longitude: None,
            })
            .await
            .unwrap();
        store
            .upsert_article(&ArticleMetadata {
                doi: "10.5281/zenodo.4650794".to_string(),
                abstract_text: "A starter data kit for Liberia".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(store.add_country_relations().await.unwrap(), 1);
        assert_eq!(store.add_country_relations().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_link_author_is_idempotent() {
        let store = MemoryStore::new();
        let person = PersonRef(Uuid::new_v4());
        let article = ArticleRef(Uuid::new_v4());
        store.link_author(person, article, 1).await.unwrap();
        store.link_author(person, article, 2).await.unwrap();
        assert_eq!(store.snapshot().authorships, vec![(person, article, 2)]);
    }
}
