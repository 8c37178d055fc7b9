//! DOI ingestion pipeline.
//!
//! Processes one DOI at a time: fetch, parse, then write the output, its
//! authors and their affiliations. Mentions within a record are resolved in
//! order and the candidate set is re-read before each one.

use crate::affiliation::AffiliationLinker;
use crate::doi::{DoiManager, IngestionMetrics};
use crate::error::{IndexError, Result};
use crate::fetcher::MetadataFetcher;
use crate::models::{ArticleMetadata, PersonRef};
use crate::parser::parse_metadata;
use crate::resolver::{IdentityResolver, Resolution};
use crate::store::GraphStore;
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

/// Per-run options
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOptions {
    /// Process at most this many DOIs; all when `None`
    pub limit: Option<usize>,
    /// Re-fetch and rewrite DOIs that are already stored
    pub update_metadata: bool,
}

/// Outcome of writing one output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteSummary {
    pub authors_linked: usize,
    pub authors_created: usize,
    pub authors_skipped: usize,
    pub affiliations: usize,
}

/// Drives ingestion against a fetcher and a graph store
pub struct Ingestor<'a, F: MetadataFetcher, S: GraphStore> {
    fetcher: &'a F,
    store: &'a S,
    resolver: &'a IdentityResolver,
}

impl<'a, F: MetadataFetcher, S: GraphStore> Ingestor<'a, F, S> {
    pub fn new(fetcher: &'a F, store: &'a S, resolver: &'a IdentityResolver) -> Self {
        Self {
            fetcher,
            store,
            resolver,
        }
    }

    /// Ingest a batch of DOIs and report what happened.
    ///
    /// Unresolvable DOIs are skipped. Store failures and a rejected API
    /// token abort the run.
    pub async fn run(&self, dois: &[String], options: IngestOptions) -> Result<IngestionMetrics> {
        let limit = options.limit.unwrap_or(dois.len());
        let mut manager = DoiManager::new(dois, limit, options.update_metadata)?;
        manager.start_ingestion();
        manager.pattern_check();

        let valid = manager.valid_dois();
        let existing = self.store.existing_dois(&valid).await?;
        manager.mark_existing(&existing);

        let linker = AffiliationLinker::new(self.store.institutions().await?);
        info!(dois = valid.len(), existing = existing.len(), "Starting ingestion");

        for doi in &valid {
            if existing.contains(doi) && !manager.update_metadata() {
                info!(doi = %doi, "DOI already exists, skipping");
                continue;
            }

            let raw = self.fetcher.fetch(doi).await?;
            if let Some(status) = manager.status_mut(doi) {
                status.openaire_metadata = raw.openaire.is_some();
                status.openalex_metadata = raw.openalex.is_some();
            }

            let Some(openaire) = raw.openaire.as_ref() else {
                error!(doi = %doi, "No metadata found");
                continue;
            };

            let articles = match parse_metadata(openaire, doi, raw.openalex.as_ref()) {
                Ok(articles) => articles,
                Err(IndexError::Parse(message)) => {
                    error!(doi = %doi, error = %message, "Could not parse metadata");
                    continue;
                }
                Err(e) => return Err(e),
            };

            for article in &articles {
                let summary = self.write_article(article, &linker).await.map_err(|e| {
                    error!(doi = %article.doi, error = %e, "Error uploading output to graph store");
                    e
                })?;
                info!(doi = %article.doi, summary = ?summary, "Upload successful");
            }

            if let Some(status) = manager.status_mut(doi) {
                status.ingestion_success = !articles.is_empty();
            }
        }

        let relations = self.store.add_country_relations().await?;
        debug!(relations, "Country relations added");

        manager.end_ingestion();
        Ok(manager.metrics())
    }

    /// Write one output with its authors and affiliations.
    pub async fn write_article(&self, article: &ArticleMetadata, linker: &AffiliationLinker) -> Result<WriteSummary> {
        let output = self.store.upsert_article(article).await?;
        let mut summary = WriteSummary::default();
        let mut authors: HashSet<PersonRef> = HashSet::new();
        let mut linked: HashSet<(PersonRef, String)> = HashSet::new();

        for mention in &article.authors {
            let candidates = self.store.candidate_persons(mention).await?;
            let person = match self.resolver.resolve(mention, &candidates) {
                Resolution::Existing { person, patch, .. } => {
                    if let Some(patch) = patch {
                        self.store.enrich_person(person, &patch).await?;
                    }
                    person
                }
                Resolution::New(person) => {
                    let stored = self.store.create_person(&person).await?;
                    if stored == person.reference() {
                        summary.authors_created += 1;
                    } else {
                        debug!(person = %stored, orcid = ?person.orcid, "Merged into stored person with same ORCID");
                    }
                    stored
                }
                Resolution::Skipped(reason) => {
                    warn!(doi = %article.doi, rank = mention.rank, reason = ?reason, "Skipping author");
                    summary.authors_skipped += 1;
                    continue;
                }
            };

            // The first rank a person appears at is kept.
            if authors.insert(person) {
                self.store.link_author(person, output, mention.rank).await?;
                summary.authors_linked += 1;
            } else {
                debug!(doi = %article.doi, person = %person, rank = mention.rank, "Author already linked to output");
            }

            for hint in &mention.institutions {
                let Some(link) = linker.link(person, hint) else {
                    continue;
                };
                if linked.insert((person, link.institution_id.clone())) {
                    self.store.link_affiliation(&link).await?;
                    summary.affiliations += 1;
                }
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Thresholds;
    use crate::fetcher::RawMetadata;
    use crate::models::{
        AffiliationLink, ArticleRef, Country, Institution, Membership, Mention, Person, PersonPatch, Role, Workstream,
    };
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeFetcher {
        records: HashMap<String, RawMetadata>,
    }

    impl FakeFetcher {
        fn with(mut self, doi: &str, openaire: serde_json::Value, openalex: Option<serde_json::Value>) -> Self {
            self.records.insert(
                doi.to_string(),
                RawMetadata {
                    openaire: Some(openaire),
                    openalex,
                },
            );
            self
        }
    }

    impl MetadataFetcher for FakeFetcher {
        async fn fetch(&self, doi: &str) -> Result<RawMetadata> {
            Ok(self.records.get(doi).cloned().unwrap_or_default())
        }
    }

    struct RejectingFetcher;

    impl MetadataFetcher for RejectingFetcher {
        async fn fetch(&self, _doi: &str) -> Result<RawMetadata> {
            Err(IndexError::Unauthorized)
        }
    }

    /// Memory store whose candidate lookup returns nothing, so every mention
    /// resolves as new and merging is left to `create_person`.
    #[derive(Default)]
    struct NoCandidates(MemoryStore);

    impl GraphStore for NoCandidates {
        async fn candidate_persons(&self, _mention: &Mention) -> Result<Vec<Person>> {
            Ok(Vec::new())
        }
        async fn create_person(&self, person: &Person) -> Result<PersonRef> {
            self.0.create_person(person).await
        }
        async fn enrich_person(&self, person: PersonRef, patch: &PersonPatch) -> Result<()> {
            self.0.enrich_person(person, patch).await
        }
        async fn existing_dois(&self, dois: &[String]) -> Result<HashSet<String>> {
            self.0.existing_dois(dois).await
        }
        async fn upsert_article(&self, article: &ArticleMetadata) -> Result<ArticleRef> {
            self.0.upsert_article(article).await
        }
        async fn link_author(&self, person: PersonRef, article: ArticleRef, rank: u32) -> Result<()> {
            self.0.link_author(person, article, rank).await
        }
        async fn link_affiliation(&self, link: &AffiliationLink) -> Result<()> {
            self.0.link_affiliation(link).await
        }
        async fn link_membership(&self, membership: &Membership) -> Result<()> {
            self.0.link_membership(membership).await
        }
        async fn upsert_institution(&self, institution: &Institution) -> Result<()> {
            self.0.upsert_institution(institution).await
        }
        async fn institutions(&self) -> Result<Vec<Institution>> {
            self.0.institutions().await
        }
        async fn upsert_workstream(&self, workstream: &Workstream) -> Result<()> {
            self.0.upsert_workstream(workstream).await
        }
        async fn link_unit_of(&self, child: &str, parent: &str) -> Result<()> {
            self.0.link_unit_of(child, parent).await
        }
        async fn upsert_role(&self, role: &Role) -> Result<()> {
            self.0.upsert_role(role).await
        }
        async fn upsert_country(&self, country: &Country) -> Result<()> {
            self.0.upsert_country(country).await
        }
        async fn add_country_relations(&self) -> Result<u64> {
            self.0.add_country_relations().await
        }
        async fn create_constraints(&self) -> Result<()> {
            self.0.create_constraints().await
        }
        async fn clear(&self) -> Result<()> {
            self.0.clear().await
        }
    }

    fn record(title: &str, authors: serde_json::Value) -> serde_json::Value {
        json!({
            "results": [{
                "type": "publication",
                "mainTitle": title,
                "description": "Electricity access in Kenya",
                "author": authors,
                "publicationDate": "2022-03-01"
            }]
        })
    }

    fn author(name: &str, surname: &str, rank: u32, orcid: Option<&str>) -> serde_json::Value {
        let mut value = json!({
            "fullName": format!("{} {}", name, surname),
            "name": name,
            "surname": surname,
            "rank": rank
        });
        if let Some(orcid) = orcid {
            value["pid"] = json!({"id": {"scheme": "orcid", "value": orcid}});
        }
        value
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_same_orcid_across_records_resolves_once() {
        let fetcher = FakeFetcher::default()
            .with(
                "10.1234/a",
                record("First", json!([author("John", "Smith", 1, Some("0000-0001-1111-1111"))])),
                None,
            )
            .with(
                "10.1234/b",
                record("Second", json!([author("J.", "Smith", 1, Some("0000-0001-1111-1111"))])),
                None,
            );
        let store = MemoryStore::new();
        let resolver = IdentityResolver::default();

        let metrics = Ingestor::new(&fetcher, &store, &resolver)
            .run(&strings(&["10.1234/a", "10.1234/b"]), IngestOptions::default())
            .await
            .unwrap();

        assert_eq!(metrics.ingested_dois, 2);
        let graph = store.snapshot();
        assert_eq!(graph.persons.len(), 1);
        assert_eq!(graph.authorships.len(), 2);
        assert_eq!(graph.persons[0].first_name, "John");
    }

    #[tokio::test]
    async fn test_later_mention_sees_person_created_earlier_in_record() {
        let fetcher = FakeFetcher::default().with(
            "10.1234/a",
            record(
                "Duplicated author",
                json!([author("Lucy", "Allington", 1, None), author("Lucy", "Allington", 2, None)]),
            ),
            None,
        );
        let store = MemoryStore::new();
        let resolver = IdentityResolver::default();

        Ingestor::new(&fetcher, &store, &resolver)
            .run(&strings(&["10.1234/a"]), IngestOptions::default())
            .await
            .unwrap();

        let graph = store.snapshot();
        assert_eq!(graph.persons.len(), 1);
        assert_eq!(graph.authorships.len(), 1);
        assert_eq!(graph.authorships[0].2, 1);
    }

    #[tokio::test]
    async fn test_merged_person_not_counted_as_created() {
        let store = NoCandidates::default();
        let resolver = IdentityResolver::default();
        let fetcher = FakeFetcher::default();
        let article = ArticleMetadata {
            doi: "10.1234/a".to_string(),
            authors: vec![
                Mention::new("John", "Smith", Some("0000-0001-1111-1111")),
                Mention {
                    rank: 2,
                    ..Mention::new("J.", "Smith", Some("https://orcid.org/0000-0001-1111-1111"))
                },
                Mention {
                    rank: 3,
                    ..Mention::new("Lucy", "Allington", None)
                },
            ],
            ..Default::default()
        };

        let summary = Ingestor::new(&fetcher, &store, &resolver)
            .write_article(&article, &AffiliationLinker::default())
            .await
            .unwrap();
        assert_eq!(summary.authors_created, 2);
        assert_eq!(summary.authors_linked, 2);

        let graph = store.0.snapshot();
        assert_eq!(graph.persons.len(), 2);
        let john = graph.persons.iter().find(|p| p.last_name == "Smith").unwrap();
        let rank = graph.authorships.iter().find(|(p, _, _)| *p == john.reference()).map(|a| a.2);
        assert_eq!(rank, Some(1));
    }

    #[tokio::test]
    async fn test_name_only_below_threshold_creates_person() {
        let existing = Person::new("John", "Smith", Some("https://orcid.org/0000-0001-1111-1111".to_string()));
        let store = MemoryStore::with_persons(vec![existing]);
        let fetcher = FakeFetcher::default().with(
            "10.1234/a",
            record("Paper", json!([author("Jon", "Smyth", 1, None)])),
            None,
        );
        let resolver = IdentityResolver::new(Thresholds { orcid_name: 0.8, name: 0.8 });

        Ingestor::new(&fetcher, &store, &resolver)
            .run(&strings(&["10.1234/a"]), IngestOptions::default())
            .await
            .unwrap();

        assert_eq!(store.snapshot().persons.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_metadata_is_skipped() {
        let fetcher = FakeFetcher::default().with("10.1234/a", record("Paper", json!([])), None);
        let store = MemoryStore::new();
        let resolver = IdentityResolver::default();

        let metrics = Ingestor::new(&fetcher, &store, &resolver)
            .run(&strings(&["10.1234/a", "10.1234/missing", "not-a-doi"]), IngestOptions::default())
            .await
            .unwrap();

        assert_eq!(metrics.submitted_dois, 3);
        assert_eq!(metrics.valid_pattern_dois, 2);
        assert_eq!(metrics.invalid_pattern_dois, 1);
        assert_eq!(metrics.ingested_dois, 1);
        assert_eq!(metrics.metadata_failure, 1);
        assert_eq!(metrics.openaire_success, 1);
    }

    #[tokio::test]
    async fn test_existing_doi_skipped_unless_update() {
        let fetcher = FakeFetcher::default().with("10.1234/a", record("Updated title", json!([])), None);
        let store = MemoryStore::new();
        store
            .upsert_article(&ArticleMetadata {
                doi: "10.1234/a".to_string(),
                title: "Old title".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let resolver = IdentityResolver::default();
        let ingestor = Ingestor::new(&fetcher, &store, &resolver);

        let metrics = ingestor
            .run(&strings(&["10.1234/a"]), IngestOptions::default())
            .await
            .unwrap();
        assert_eq!(metrics.existing_dois, 1);
        assert_eq!(metrics.ingested_dois, 0);
        assert_eq!(store.snapshot().articles[0].1.title, "Old title");

        let options = IngestOptions {
            update_metadata: true,
            ..Default::default()
        };
        let metrics = ingestor.run(&strings(&["10.1234/a"]), options).await.unwrap();
        assert_eq!(metrics.ingested_dois, 1);
        assert_eq!(store.snapshot().articles[0].1.title, "Updated title");
    }

    #[tokio::test]
    async fn test_affiliations_linked_once() {
        let openalex = json!({
            "id": "https://openalex.org/W1",
            "authorships": [{
                "author": {"id": "https://openalex.org/A1", "orcid": "https://orcid.org/0000-0001-9367-1791"},
                "institutions": [{
                    "id": "https://openalex.org/I86987016",
                    "display_name": "KTH Royal Institute of Technology",
                    "ror": "https://ror.org/026vcq606"
                }],
                "raw_affiliation_strings": ["KTH Royal Institute of Technology"]
            }]
        });
        let fetcher = FakeFetcher::default().with(
            "10.1234/a",
            record("Paper", json!([author("Will", "Usher", 1, Some("0000-0001-9367-1791"))])),
            Some(openalex),
        );
        let store = MemoryStore::new();
        store
            .upsert_institution(&Institution {
                id: "KTH".to_string(),
                name: "KTH Royal Institute of Technology".to_string(),
                ror: Some("https://ror.org/026vcq606".to_string()),
                openalex: None,
                dbpedia: None,
            })
            .await
            .unwrap();
        let resolver = IdentityResolver::default();

        let metrics = Ingestor::new(&fetcher, &store, &resolver)
            .run(&strings(&["10.1234/a"]), IngestOptions::default())
            .await
            .unwrap();

        assert_eq!(metrics.openalex_success, 1);
        let graph = store.snapshot();
        assert_eq!(graph.affiliations.len(), 1);
        assert_eq!(graph.affiliations[0].institution_id, "KTH");
        assert_eq!(graph.persons[0].openalex.as_deref(), Some("https://openalex.org/A1"));
    }

    #[tokio::test]
    async fn test_skipped_mention_does_not_abort_record() {
        let store = MemoryStore::new();
        let resolver = IdentityResolver::default();
        let fetcher = FakeFetcher::default();
        let article = ArticleMetadata {
            doi: "10.1234/a".to_string(),
            authors: vec![Mention::new("", "", None), Mention::new("Will", "Usher", None)],
            ..Default::default()
        };

        let summary = Ingestor::new(&fetcher, &store, &resolver)
            .write_article(&article, &AffiliationLinker::default())
            .await
            .unwrap();
        assert_eq!(summary.authors_skipped, 1);
        assert_eq!(summary.authors_created, 1);
    }

    #[tokio::test]
    async fn test_rejected_token_aborts_run() {
        let store = MemoryStore::new();
        let resolver = IdentityResolver::default();
        let result = Ingestor::new(&RejectingFetcher, &store, &resolver)
            .run(&strings(&["10.1234/a"]), IngestOptions::default())
            .await;
        assert!(matches!(result, Err(IndexError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_country_relation_added_after_batch() {
        let fetcher = FakeFetcher::default().with("10.1234/a", record("Paper", json!([])), None);
        let store = MemoryStore::new();
        store
            .upsert_country(&crate::models::Country {
                id: "KEN".to_string(),
                name: "Kenya".to_string(),
                official_name: "Republic of Kenya".to_string(),
                dbpedia: None,
                latitude: None,
                longitude: None,
            })
            .await
            .unwrap();
        let resolver = IdentityResolver::default();

        Ingestor::new(&fetcher, &store, &resolver)
            .run(&strings(&["10.1234/a"]), IngestOptions::default())
            .await
            .unwrap();
        assert_eq!(store.snapshot().refers_to.len(), 1);
    }
}
