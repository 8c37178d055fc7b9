//! Reference data seeding from CSV files.
//!
//! Expected files in the seed directory:
//! - `workstream.csv` (id, name)
//! - `subws.csv` (parent, child)
//! - `project_partners.csv` (id, name, dbpedia, ror, openalex)
//! - `authors.csv` (uuid, first_name, last_name, Orcid, links); `links` is
//!   optional and holds `;`-separated profile URLs
//! - `wp_members.csv` (id, name, orcid, start, end)
//! - `partner_members.csv` (id, name, orcid, start, end)
//!
//! Member `start`/`end` columns are optional `YYYY-MM-DD` dates.
//! - `countries.csv` (cca3, name.common, name.official, latlng)
//! - `roles.csv` (id, name), optional

use crate::affiliation::AffiliationLinker;
use crate::error::{IndexError, Result};
use crate::models::{
    canonical_orcid, Country, Institution, InstitutionHint, Membership, Mention, Person, Role, Workstream,
};
use crate::resolver::IdentityResolver;
use crate::store::GraphStore;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct UnitRow {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct SubUnitRow {
    parent: String,
    child: String,
}

#[derive(Debug, Deserialize)]
struct PartnerRow {
    id: String,
    name: String,
    dbpedia: Option<String>,
    ror: Option<String>,
    openalex: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthorRow {
    uuid: Uuid,
    first_name: Option<String>,
    last_name: Option<String>,
    #[serde(rename = "Orcid")]
    orcid: Option<String>,
    #[serde(default)]
    links: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MemberRow {
    id: String,
    name: String,
    orcid: Option<String>,
    #[serde(default)]
    start: Option<NaiveDate>,
    #[serde(default)]
    end: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct CountryRow {
    cca3: String,
    #[serde(rename = "name.common")]
    name: String,
    #[serde(rename = "name.official")]
    official_name: String,
    latlng: Option<String>,
}

/// Counts of what a seeding run wrote
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeedReport {
    pub workstreams: usize,
    pub sub_workstreams: usize,
    pub partners: usize,
    pub authors: usize,
    pub workstream_members: usize,
    pub partner_members: usize,
    pub unmatched_members: usize,
    pub countries: usize,
    pub roles: usize,
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| IndexError::Validation(format!("Cannot read {}: {}", path.display(), e)))?;
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<T>, _>>()
        .map_err(IndexError::from)
}

/// Split a display name into first token and remainder.
pub fn split_member_name(name: &str) -> (String, String) {
    let mut parts = name.split_whitespace();
    let first = parts.next().unwrap_or_default();
    let rest: Vec<&str> = parts.collect();
    if rest.is_empty() {
        (String::new(), first.to_string())
    } else {
        (first.to_string(), rest.join(" "))
    }
}

fn split_links(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(';')
        .map(str::trim)
        .filter(|link| !link.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a `"lat,lon"` pair.
fn parse_latlng(raw: &str) -> Option<(f64, f64)> {
    let (lat, lon) = raw.split_once(',')?;
    Some((lat.trim().parse().ok()?, lon.trim().parse().ok()?))
}

fn country_from(row: CountryRow) -> Country {
    let coordinates = row.latlng.as_deref().and_then(parse_latlng);
    if coordinates.is_none() {
        warn!(country = %row.cca3, "Country without valid coordinates");
    }
    Country {
        dbpedia: Some(row.official_name.split_whitespace().collect::<Vec<_>>().join("_")),
        id: row.cca3,
        name: row.name,
        official_name: row.official_name,
        latitude: coordinates.map(|(lat, _)| lat),
        longitude: coordinates.map(|(_, lon)| lon),
    }
}

/// Loads reference data into a graph store
pub struct Seeder<'a, S: GraphStore> {
    store: &'a S,
    resolver: &'a IdentityResolver,
}

impl<'a, S: GraphStore> Seeder<'a, S> {
    pub fn new(store: &'a S, resolver: &'a IdentityResolver) -> Self {
        Self { store, resolver }
    }

    /// Load every file from `dir` and create constraints.
    pub async fn seed(&self, dir: &Path) -> Result<SeedReport> {
        info!(dir = %dir.display(), "Loading reference data");
        let mut report = SeedReport::default();

        for row in read_rows::<UnitRow>(&dir.join("workstream.csv"))? {
            self.store
                .upsert_workstream(&Workstream { id: row.id, name: row.name })
                .await?;
            report.workstreams += 1;
        }

        for row in read_rows::<SubUnitRow>(&dir.join("subws.csv"))? {
            self.store.link_unit_of(&row.child, &row.parent).await?;
            report.sub_workstreams += 1;
        }

        for row in read_rows::<PartnerRow>(&dir.join("project_partners.csv"))? {
            let institution = Institution {
                id: row.id,
                name: row.name,
                ror: row.ror,
                openalex: row.openalex,
                dbpedia: row.dbpedia,
            };
            self.store.upsert_institution(&institution).await?;
            report.partners += 1;
        }

        for row in read_rows::<AuthorRow>(&dir.join("authors.csv"))? {
            let mut person = Person::new(
                row.first_name.unwrap_or_default(),
                row.last_name.unwrap_or_default(),
                row.orcid.as_deref().and_then(canonical_orcid),
            );
            person.uuid = row.uuid;
            person.links = split_links(row.links.as_deref());
            self.store.create_person(&person).await?;
            report.authors += 1;
        }

        for row in read_rows::<MemberRow>(&dir.join("wp_members.csv"))? {
            match self.find_member(&row).await? {
                Some(person) => {
                    let membership = Membership {
                        person: person.reference(),
                        unit_id: row.id,
                        start: row.start,
                        end: row.end,
                    };
                    self.store.link_membership(&membership).await?;
                    report.workstream_members += 1;
                }
                None => {
                    warn!(name = %row.name, unit = %row.id, "Could not find member in the database");
                    report.unmatched_members += 1;
                }
            }
        }

        let linker = AffiliationLinker::new(self.store.institutions().await?);
        for row in read_rows::<MemberRow>(&dir.join("partner_members.csv"))? {
            let link = match self.find_member(&row).await? {
                Some(person) => linker.link_during(
                    person.reference(),
                    &InstitutionHint::Id(row.id.clone()),
                    row.start,
                    row.end,
                ),
                None => None,
            };
            match link {
                Some(link) => {
                    self.store.link_affiliation(&link).await?;
                    report.partner_members += 1;
                }
                None => {
                    warn!(name = %row.name, partner = %row.id, "Could not link partner member");
                    report.unmatched_members += 1;
                }
            }
        }

        for row in read_rows::<CountryRow>(&dir.join("countries.csv"))? {
            let country = country_from(row);
            info!(country = %country.official_name, "Adding country");
            self.store.upsert_country(&country).await?;
            report.countries += 1;
        }

        let roles = dir.join("roles.csv");
        if roles.exists() {
            for row in read_rows::<UnitRow>(&roles)? {
                self.store.upsert_role(&Role { id: row.id, name: row.name }).await?;
                report.roles += 1;
            }
        }

        self.store.add_country_relations().await?;
        self.store.create_constraints().await?;

        info!(report = ?report, "Reference data loaded");
        Ok(report)
    }

    async fn find_member(&self, row: &MemberRow) -> Result<Option<Person>> {
        let (first, last) = split_member_name(&row.name);
        let mention = Mention::new(first, last, row.orcid.as_deref());
        let candidates = self.store.candidate_persons(&mention).await?;
        Ok(self
            .resolver
            .find(&mention, &candidates)
            .map(|(person, _)| person.clone()))
    }
}
