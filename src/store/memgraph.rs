//! Memgraph backend over Bolt.

use super::GraphStore;
use crate::config::Config;
use crate::error::{IndexError, Result};
use crate::models::{
    AffiliationLink, ArticleMetadata, ArticleRef, Country, Institution, Membership, Mention, Person,
    PersonPatch, PersonRef, Role, Workstream,
};
use chrono::NaiveDate;
use neo4rs::{query, Graph, Query, Row};
use std::collections::HashSet;
use tracing::{debug, info};
use uuid::Uuid;

const CONSTRAINTS: &[&str] = &[
    "CREATE CONSTRAINT ON (n:Output) ASSERT n.doi IS UNIQUE;",
    "CREATE CONSTRAINT ON (n:Output) ASSERT n.uuid IS UNIQUE;",
    "CREATE CONSTRAINT ON (a:Author) ASSERT a.uuid IS UNIQUE;",
    "CREATE CONSTRAINT ON (a:Author) ASSERT a.orcid IS UNIQUE;",
    "CREATE INDEX ON :Author(uuid);",
    "CREATE INDEX ON :Output(uuid);",
    "CREATE INDEX ON :Country(id);",
    "CREATE INDEX ON :Output(result_type);",
];

/// Graph store backed by a Memgraph instance
#[derive(Clone)]
pub struct MemgraphStore {
    graph: Graph,
}

impl MemgraphStore {
    /// Connect and check the server answers a trivial query.
    pub async fn connect(config: &Config) -> Result<Self> {
        let uri = config.bolt_uri();
        info!(uri = %uri, "Connecting to Memgraph");
        let graph = Graph::new(&uri, config.mg_user.as_str(), config.mg_password.as_str()).await?;
        let store = Self { graph };
        store.rows(query("RETURN 1 AS ok")).await?;
        Ok(store)
    }

    async fn rows(&self, q: Query) -> Result<Vec<Row>> {
        let mut stream = self.graph.execute(q).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn single_uuid(&self, q: Query) -> Result<Uuid> {
        let rows = self.rows(q).await?;
        let row = rows
            .first()
            .ok_or_else(|| IndexError::Parse("Query returned no uuid".to_string()))?;
        parse_uuid(row, "uuid")
    }
}

fn parse_uuid(row: &Row, key: &str) -> Result<Uuid> {
    let raw: String = row
        .get(key)
        .map_err(|e| IndexError::Parse(format!("Missing {}: {}", key, e)))?;
    Uuid::parse_str(&raw).map_err(|e| IndexError::Parse(format!("Invalid uuid {}: {}", raw, e)))
}

fn optional(row: &Row, key: &str) -> Option<String> {
    row.get::<Option<String>>(key).ok().flatten().filter(|s| !s.is_empty())
}

fn person_from_row(row: &Row) -> Result<Person> {
    Ok(Person {
        uuid: parse_uuid(row, "uuid")?,
        first_name: optional(row, "first_name").unwrap_or_default(),
        last_name: optional(row, "last_name").unwrap_or_default(),
        orcid: optional(row, "orcid"),
        openalex: optional(row, "openalex"),
        links: row.get::<Option<Vec<String>>>("links").ok().flatten().unwrap_or_default(),
    })
}

fn date_param(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

impl GraphStore for MemgraphStore {
    async fn candidate_persons(&self, mention: &Mention) -> Result<Vec<Person>> {
        let q = query(
            "MATCH (a:Author)
             RETURN a.uuid AS uuid, a.first_name AS first_name, a.last_name AS last_name,
                    a.orcid AS orcid, a.openalex AS openalex, a.links AS links
             ORDER BY a.created_at, a.uuid",
        );
        let persons = self
            .rows(q)
            .await?
            .iter()
            .map(person_from_row)
            .collect::<Result<Vec<_>>>()?;
        debug!(mention = %mention.full_name(), candidates = persons.len(), "Loaded candidate persons");
        Ok(persons)
    }

    async fn create_person(&self, person: &Person) -> Result<PersonRef> {
        // Merging on uuid keeps re-seeded reference persons single.
        let statement = if person.orcid.is_some() {
            "MERGE (a:Author {orcid: $orcid})
             ON CREATE SET a.uuid = $uuid, a.first_name = $first_name, a.last_name = $last_name,
                           a.openalex = $openalex, a.links = $links, a.created_at = timestamp()
             RETURN a.uuid AS uuid"
        } else {
            "MERGE (a:Author {uuid: $uuid})
             ON CREATE SET a.first_name = $first_name, a.last_name = $last_name,
                           a.openalex = $openalex, a.links = $links, a.created_at = timestamp()
             RETURN a.uuid AS uuid"
        };
        let q = query(statement)
            .param("uuid", person.uuid.to_string())
            .param("first_name", person.first_name.as_str())
            .param("last_name", person.last_name.as_str())
            .param("orcid", person.orcid.clone())
            .param("openalex", person.openalex.clone())
            .param("links", person.links.clone());
        Ok(PersonRef(self.single_uuid(q).await?))
    }

    async fn enrich_person(&self, person: PersonRef, patch: &PersonPatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let q = query(
            "MATCH (a:Author {uuid: $uuid})
             SET a.first_name = CASE WHEN coalesce(a.first_name, '') = '' THEN coalesce($first_name, a.first_name) ELSE a.first_name END,
                 a.last_name = CASE WHEN coalesce(a.last_name, '') = '' THEN coalesce($last_name, a.last_name) ELSE a.last_name END,
                 a.orcid = coalesce(a.orcid, $orcid),
                 a.openalex = coalesce(a.openalex, $openalex)",
        )
        .param("uuid", person.to_string())
        .param("first_name", patch.first_name.clone())
        .param("last_name", patch.last_name.clone())
        .param("orcid", patch.orcid.clone())
        .param("openalex", patch.openalex.clone());
        self.graph.run(q).await?;
        Ok(())
    }

    async fn existing_dois(&self, dois: &[String]) -> Result<HashSet<String>> {
        let q = query("MATCH (o:Output) WHERE o.doi IN $dois RETURN o.doi AS doi").param("dois", dois.to_vec());
        Ok(self
            .rows(q)
            .await?
            .iter()
            .filter_map(|row| row.get::<String>("doi").ok())
            .collect())
    }

    async fn upsert_article(&self, article: &ArticleMetadata) -> Result<ArticleRef> {
        let q = query(
            "MERGE (o:Output:Article {doi: $doi})
             ON CREATE SET o.uuid = $uuid
             SET o.title = $title, o.abstract = $abstract, o.journal = $journal,
                 o.issue = $issue, o.volume = $volume, o.publisher = $publisher,
                 o.publication_year = $year, o.publication_month = $month, o.publication_day = $day,
                 o.result_type = $result_type, o.resource_type = $resource_type,
                 o.openalex = $openalex, o.cited_by_count = $cited_by_count,
                 o.cited_by_count_date = $cited_by_count_date
             RETURN o.uuid AS uuid",
        )
        .param("doi", article.doi.as_str())
        .param("uuid", Uuid::new_v4().to_string())
        .param("title", article.title.as_str())
        .param("abstract", article.abstract_text.as_str())
        .param("journal", article.journal.as_str())
        .param("issue", article.issue.clone())
        .param("volume", article.volume.clone())
        .param("publisher", article.publisher.clone())
        .param("year", article.publication_year.map(i64::from))
        .param("month", article.publication_month.map(i64::from))
        .param("day", article.publication_day.map(i64::from))
        .param("result_type", article.result_type.as_str())
        .param("resource_type", article.resource_type.clone())
        .param("openalex", article.openalex.clone())
        .param("cited_by_count", article.cited_by_count)
        .param("cited_by_count_date", date_param(article.cited_by_count_date));
        Ok(ArticleRef(self.single_uuid(q).await?))
    }

    async fn link_author(&self, person: PersonRef, article: ArticleRef, rank: u32) -> Result<()> {
        let q = query(
            "MATCH (a:Author {uuid: $author}), (o:Output {uuid: $output})
             MERGE (a)-[r:author_of]->(o)
             SET r.rank = $rank",
        )
        .param("author", person.to_string())
        .param("output", article.0.to_string())
        .param("rank", i64::from(rank));
        self.graph.run(q).await?;
        Ok(())
    }

    async fn link_affiliation(&self, link: &AffiliationLink) -> Result<()> {
        let q = query(
            "MATCH (a:Author {uuid: $author}), (p:Partner {id: $partner})
             MERGE (a)-[r:member_of]->(p)
             SET r.start = $start, r.end = $end",
        )
        .param("author", link.person.to_string())
        .param("partner", link.institution_id.as_str())
        .param("start", date_param(link.start))
        .param("end", date_param(link.end));
        self.graph.run(q).await?;
        Ok(())
    }

    async fn link_membership(&self, membership: &Membership) -> Result<()> {
        let q = query(
            "MATCH (a:Author {uuid: $author}), (w:Workstream {id: $unit})
             MERGE (a)-[r:member_of]->(w)
             SET r.start = $start, r.end = $end",
        )
        .param("author", membership.person.to_string())
        .param("unit", membership.unit_id.as_str())
        .param("start", date_param(membership.start))
        .param("end", date_param(membership.end));
        self.graph.run(q).await?;
        Ok(())
    }

    async fn upsert_institution(&self, institution: &Institution) -> Result<()> {
        let q = query(
            "MERGE (p:Unit:Partner {id: $id})
             SET p.name = $name, p.ror = $ror, p.openalex = $openalex, p.dbpedia = $dbpedia",
        )
        .param("id", institution.id.as_str())
        .param("name", institution.name.as_str())
        .param("ror", institution.ror.clone())
        .param("openalex", institution.openalex.clone())
        .param("dbpedia", institution.dbpedia.clone());
        self.graph.run(q).await?;
        Ok(())
    }

    async fn institutions(&self) -> Result<Vec<Institution>> {
        let q = query(
            "MATCH (p:Partner)
             RETURN p.id AS id, p.name AS name, p.ror AS ror, p.openalex AS openalex, p.dbpedia AS dbpedia
             ORDER BY p.id",
        );
        Ok(self
            .rows(q)
            .await?
            .iter()
            .filter_map(|row| {
                Some(Institution {
                    id: optional(row, "id")?,
                    name: optional(row, "name").unwrap_or_default(),
                    ror: optional(row, "ror"),
                    openalex: optional(row, "openalex"),
                    dbpedia: optional(row, "dbpedia"),
                })
            })
            .collect())
    }

    async fn upsert_workstream(&self, workstream: &Workstream) -> Result<()> {
        let q = query("MERGE (w:Unit:Workstream {id: $id}) SET w.name = $name")
            .param("id", workstream.id.as_str())
            .param("name", workstream.name.as_str());
        self.graph.run(q).await?;
        Ok(())
    }

    async fn link_unit_of(&self, child: &str, parent: &str) -> Result<()> {
        let q = query(
            "MATCH (c:Workstream {id: $child}), (p:Workstream {id: $parent})
             MERGE (c)-[:unit_of]->(p)",
        )
        .param("child", child)
        .param("parent", parent);
        self.graph.run(q).await?;
        Ok(())
    }

    async fn upsert_role(&self, role: &Role) -> Result<()> {
        let q = query("MERGE (r:Role {id: $id}) SET r.name = $name")
            .param("id", role.id.as_str())
            .param("name", role.name.as_str());
        self.graph.run(q).await?;
        Ok(())
    }

    async fn upsert_country(&self, country: &Country) -> Result<()> {
        let q = query(
            "MERGE (c:Country {id: $id})
             SET c.name = $name, c.official_name = $official_name, c.dbpedia = $dbpedia,
                 c.latitude = $latitude, c.longitude = $longitude",
        )
        .param("id", country.id.as_str())
        .param("name", country.name.as_str())
        .param("official_name", country.official_name.as_str())
        .param("dbpedia", country.dbpedia.clone())
        .param("latitude", country.latitude)
        .param("longitude", country.longitude);
        self.graph.run(q).await?;
        Ok(())
    }

    async fn add_country_relations(&self) -> Result<u64> {
        let q = query(
            "MATCH (c:Country)
             CALL {
                 WITH c
                 MATCH (o:Output)
                 WHERE o.abstract CONTAINS c.name
                 AND NOT exists((o)-[:refers_to]->(c))
                 CREATE (o)-[r:refers_to]->(c)
                 RETURN r
             }
             RETURN count(r) AS created",
        );
        let rows = self.rows(q).await?;
        let created = rows
            .first()
            .and_then(|row| row.get::<i64>("created").ok())
            .unwrap_or(0);
        info!(created, "Added country relations");
        Ok(created.max(0) as u64)
    }

    async fn create_constraints(&self) -> Result<()> {
        for statement in CONSTRAINTS {
            debug!(statement, "Creating constraint");
            self.graph.run(query(statement)).await?;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        info!("Deleting all nodes and relationships");
        self.graph.run(query("MATCH (n) DETACH DELETE n")).await?;
        Ok(())
    }
}
