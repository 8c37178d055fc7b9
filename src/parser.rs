//! Parsing of OpenAIRE research products and OpenAlex authorships.
//!
//! OpenAIRE supplies the article metadata and the ordered author list;
//! OpenAlex supplies the work identifier and per-author institutions.

use crate::error::{IndexError, Result};
use crate::models::{canonical_orcid, ArticleMetadata, InstitutionHint, Mention};
use chrono::Local;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::{debug, info};
use unicode_normalization::UnicodeNormalization;

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"));

const RESULT_TYPES: &[&str] = &["publication", "dataset", "software", "other"];

// === OpenAIRE Graph Response Types ===

/// A JSON field that is sometimes a single value and sometimes a list
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAireResponse {
    #[serde(default)]
    results: Option<Vec<OpenAireProduct>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenAireProduct {
    #[serde(rename = "type", default)]
    result_type: String,
    main_title: Option<String>,
    publisher: Option<String>,
    container: Option<OpenAireContainer>,
    description: Option<OneOrMany<String>>,
    author: Option<OneOrMany<OpenAireAuthor>>,
    #[serde(default)]
    instance: Option<OneOrMany<OpenAireInstance>>,
    publication_date: Option<String>,
    indicators: Option<OpenAireIndicators>,
}

#[derive(Debug, Deserialize)]
struct OpenAireContainer {
    name: Option<String>,
    iss: Option<String>,
    vol: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenAireAuthor {
    full_name: Option<String>,
    name: Option<String>,
    surname: Option<String>,
    rank: Option<u32>,
    pid: Option<OpenAirePid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct OpenAirePid {
    id: Option<OpenAirePidId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct OpenAirePidId {
    scheme: Option<String>,
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenAireInstance {
    #[serde(rename = "type")]
    resource_type: Option<String>,
    publication_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenAireIndicators {
    citation_impact: Option<OpenAireCitationImpact>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenAireCitationImpact {
    citation_count: Option<i64>,
}

// === OpenAlex Work Types ===

#[derive(Debug, Default, Deserialize)]
struct OpenAlexWork {
    id: Option<String>,
    cited_by_count: Option<i64>,
    #[serde(default)]
    authorships: Vec<OpenAlexAuthorship>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexAuthorship {
    author: Option<OpenAlexAuthor>,
    #[serde(default)]
    institutions: Vec<OpenAlexInstitution>,
    #[serde(default)]
    raw_affiliation_strings: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexAuthor {
    id: Option<String>,
    orcid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexInstitution {
    id: Option<String>,
    display_name: Option<String>,
    ror: Option<String>,
}

/// `name` with the word sequence of `repeated` removed, or `None` when
/// `repeated` does not occur in it as whole words.
fn drop_repeated_words(name: &str, repeated: &str) -> Option<String> {
    let words: Vec<&str> = name.split_whitespace().collect();
    let needle: Vec<&str> = repeated.split_whitespace().collect();
    if needle.is_empty() || needle.len() > words.len() {
        return None;
    }
    let at = words.windows(needle.len()).position(|window| window == needle.as_slice())?;
    let mut kept = words[..at].to_vec();
    kept.extend_from_slice(&words[at + needle.len()..]);
    Some(kept.join(" "))
}

/// Parse one OpenAIRE author object into a mention.
///
/// Returns `None` when no given and family name can be recovered.
pub fn parse_author(value: &serde_json::Value) -> Option<Mention> {
    let author: OpenAireAuthor = serde_json::from_value(value.clone()).ok()?;
    mention_from(author)
}

fn mention_from(author: OpenAireAuthor) -> Option<Mention> {
    let orcid = author
        .pid
        .and_then(|pid| pid.id)
        .filter(|id| matches!(id.scheme.as_deref(), Some("orcid" | "orcid_pending")))
        .and_then(|id| id.value)
        .and_then(|value| canonical_orcid(&value));

    let mut first_name = title_case(author.name.as_deref().unwrap_or_default().trim());
    let mut last_name = title_case(author.surname.as_deref().unwrap_or_default().trim());

    // Some records repeat the given name inside the surname or vice versa.
    if let Some(stripped) = drop_repeated_words(&last_name, &first_name) {
        last_name = stripped;
    }
    if let Some(stripped) = drop_repeated_words(&first_name, &last_name) {
        first_name = stripped;
    }

    if first_name.is_empty() && last_name.is_empty() {
        if let Some(full) = author.full_name.as_deref() {
            (first_name, last_name) = split_full_name(&clean_html(full));
        }
    }

    if first_name.is_empty() && !last_name.is_empty() {
        let cleaned = clean_html(&last_name);
        let mut parts: Vec<&str> = cleaned.split('\u{202f}').collect();
        if parts.len() == 1 {
            parts = cleaned.split(' ').filter(|p| !p.is_empty()).collect();
        }
        if parts.len() >= 2 {
            first_name = parts[0].trim().to_string();
            last_name = parts[1..].join(" ").trim().to_string();
        } else {
            debug!(parts = ?parts, "Could not split author name");
            last_name.clear();
        }
    }

    let rank = author.rank.unwrap_or(1);
    info!(first_name = %first_name, last_name = %last_name, orcid = ?orcid, rank, "Creating author metadata");

    if first_name.is_empty() || last_name.is_empty() {
        return None;
    }

    Some(Mention {
        first_name,
        last_name,
        orcid,
        rank,
        openalex: None,
        institutions: Vec::new(),
    })
}

/// Split `"Family, Given"` or `"Given Family Names"` into (given, family).
fn split_full_name(full: &str) -> (String, String) {
    if let Some((family, given)) = full.split_once(',') {
        return (title_case(given.trim()), title_case(family.trim()));
    }
    let parts: Vec<&str> = full.split_whitespace().collect();
    match parts.as_slice() {
        [] | [_] => (String::new(), String::new()),
        [given, rest @ ..] => (title_case(given), title_case(&rest.join(" "))),
    }
}

/// Capitalize the first letter of every word, lower-case the rest.
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_alpha = false;
    for c in text.chars() {
        if previous_alpha {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        previous_alpha = c.is_alphabetic();
    }
    out
}

/// Parse an OpenAIRE response into article metadata.
///
/// `doi` is the validated DOI that was queried. `openalex` is the OpenAlex
/// work for the same DOI, when one was found.
pub fn parse_metadata(
    openaire: &serde_json::Value,
    doi: &str,
    openalex: Option<&serde_json::Value>,
) -> Result<Vec<ArticleMetadata>> {
    let response: OpenAireResponse = serde_json::from_value(openaire.clone())
        .map_err(|e| IndexError::Parse(format!("Failed to parse OpenAire response: {}", e)))?;
    let products = response.results.unwrap_or_default();
    info!(doi = %doi, count = products.len(), "Parsing OpenAire results");

    let work: OpenAlexWork = match openalex {
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| IndexError::Parse(format!("Failed to parse OpenAlex work: {}", e)))?,
        None => OpenAlexWork::default(),
    };

    products
        .into_iter()
        .map(|product| parse_product(product, doi, &work))
        .collect()
}

fn parse_product(product: OpenAireProduct, doi: &str, work: &OpenAlexWork) -> Result<ArticleMetadata> {
    let title = product.main_title.as_deref().map(clean_html).unwrap_or_default();
    info!(doi = %doi, title = %title, "Parsing output");

    let result_type = product.result_type.clone();
    if !RESULT_TYPES.contains(&result_type.as_str()) {
        return Err(IndexError::Parse(format!("Unknown result type {}", result_type)));
    }

    let (journal, issue, volume) = match (&*result_type, product.container) {
        ("publication", Some(container)) => (
            container.name.as_deref().map(clean_html).unwrap_or_default(),
            container.iss,
            container.vol,
        ),
        _ => (String::new(), None, None),
    };

    let abstract_text = product
        .description
        .map(|d| d.into_vec().join(" "))
        .map(|d| clean_html(&d))
        .unwrap_or_default();

    let mut authors: Vec<Mention> = product
        .author
        .map(OneOrMany::into_vec)
        .unwrap_or_default()
        .into_iter()
        .filter_map(mention_from)
        .collect();
    attach_openalex_authorships(&mut authors, work);

    let instance = product
        .instance
        .map(OneOrMany::into_vec)
        .unwrap_or_default()
        .into_iter()
        .next();
    let resource_type = instance.as_ref().and_then(|i| i.resource_type.clone());
    debug!(doi = %doi, result_type = %result_type, resource_type = ?resource_type, "Resource type");

    let date = instance
        .and_then(|i| i.publication_date)
        .or(product.publication_date)
        .unwrap_or_default();
    let (publication_year, publication_month, publication_day) = parse_date_parts(&date);

    let cited_by_count = product
        .indicators
        .and_then(|i| i.citation_impact)
        .and_then(|c| c.citation_count)
        .or(work.cited_by_count)
        .unwrap_or(0);

    Ok(ArticleMetadata {
        doi: doi.to_string(),
        title,
        abstract_text,
        authors,
        journal,
        issue,
        volume,
        publication_year,
        publication_month,
        publication_day,
        publisher: product.publisher,
        result_type,
        resource_type,
        openalex: work.id.clone(),
        cited_by_count,
        cited_by_count_date: Some(Local::now().date_naive()),
    })
}

/// `YYYY-MM-DD`, `YYYY-MM` or `YYYY`
fn parse_date_parts(date: &str) -> (Option<i32>, Option<u32>, Option<u32>) {
    let mut parts = date.trim().split('-');
    let year = parts.next().and_then(|y| y.parse().ok());
    let month = parts.next().and_then(|m| m.parse().ok());
    let day = parts.next().and_then(|d| d.parse().ok());
    (year, month, day)
}

fn attach_openalex_authorships(mentions: &mut [Mention], work: &OpenAlexWork) {
    for (position, authorship) in work.authorships.iter().enumerate() {
        let orcid = authorship
            .author
            .as_ref()
            .and_then(|a| a.orcid.as_deref())
            .and_then(canonical_orcid);

        let by_orcid = orcid
            .as_ref()
            .and_then(|orcid| mentions.iter().position(|m| m.orcid.as_ref() == Some(orcid)));
        let rank = position as u32 + 1;
        let index = by_orcid.or_else(|| mentions.iter().position(|m| m.rank == rank));

        let Some(mention) = index.and_then(|i| mentions.get_mut(i)) else {
            debug!(position, "OpenAlex authorship without a matching author");
            continue;
        };

        if mention.openalex.is_none() {
            mention.openalex = authorship.author.as_ref().and_then(|a| a.id.clone());
        }
        mention.institutions.extend(institution_hints(authorship));
    }
}

fn institution_hints(authorship: &OpenAlexAuthorship) -> Vec<InstitutionHint> {
    let mut hints = Vec::new();
    for institution in &authorship.institutions {
        hints.extend(institution.ror.clone().map(InstitutionHint::Id));
        hints.extend(institution.id.clone().map(InstitutionHint::Id));
        hints.extend(institution.display_name.clone().map(InstitutionHint::Name));
    }
    hints.extend(
        authorship
            .raw_affiliation_strings
            .iter()
            .map(|s| InstitutionHint::Name(s.clone())),
    );
    hints
}

/// Remove HTML markup, decode common entities and normalize whitespace.
pub fn clean_html(raw: &str) -> String {
    let stripped = HTML_TAG.replace_all(raw, "");
    let replaced = stripped
        .replace(['\n', '\u{a0}', '\u{ad}', '\u{202f}', '\u{fffd}'], " ")
        .replace("ï¿½", " ")
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&");
    replaced
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .nfc()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clean_html() {
        let text = "<jats:title>Abstract</jats:title><jats:p>Beneficiaries</jats:p>";
        assert_eq!(clean_html(text), "AbstractBeneficiaries");
    }

    #[test]
    fn test_clean_utf() {
        assert_eq!(clean_html("renewa\u{ad}ble"), "renewa ble");
        assert_eq!(clean_html("R&amp;D\u{a0}\u{a0} policy\n"), "R&D policy");
    }

    #[test]
    fn test_author_orcid_pending() {
        let fixture = json!({
            "fullName": "Allington, Lucy",
            "name": "Lucy",
            "surname": "Allington",
            "rank": 1,
            "pid": {
                "id": {"scheme": "orcid_pending", "value": "0000-0003-1801-899x"},
                "provenance": null
            }
        });
        let mention = parse_author(&fixture).unwrap();
        assert_eq!(mention.first_name, "Lucy");
        assert_eq!(mention.last_name, "Allington");
        assert_eq!(mention.orcid.as_deref(), Some("https://orcid.org/0000-0003-1801-899X"));
        assert_eq!(mention.rank, 1);
    }

    #[test]
    fn test_author_no_orcid() {
        let fixture = json!({"fullName": "Usher, Will", "name": "Will", "surname": "Usher", "rank": 5});
        let mention = parse_author(&fixture).unwrap();
        assert_eq!(mention, Mention { rank: 5, ..Mention::new("Will", "Usher", None) });
    }

    #[test]
    fn test_author_other_pid_scheme_ignored() {
        let fixture = json!({
            "name": "Will", "surname": "Usher",
            "pid": {"id": {"scheme": "mag", "value": "12345"}}
        });
        assert_eq!(parse_author(&fixture).unwrap().orcid, None);
    }

    #[test]
    fn test_author_full_name_fallback() {
        let fixture = json!({"fullName": "usher, will", "rank": 2});
        let mention = parse_author(&fixture).unwrap();
        assert_eq!(mention.full_name(), "Will Usher");

        let fixture = json!({"fullName": "Fernando Antonio Plazas-Niño"});
        let mention = parse_author(&fixture).unwrap();
        assert_eq!(mention.first_name, "Fernando");
        assert_eq!(mention.last_name, "Antonio Plazas-Niño");
    }

    #[test]
    fn test_author_surname_only_is_split() {
        let fixture = json!({"surname": "Vignesh\u{202f}Sridharan"});
        let mention = parse_author(&fixture).unwrap();
        assert_eq!(mention.full_name(), "Vignesh Sridharan");
    }

    #[test]
    fn test_author_without_name() {
        assert!(parse_author(&json!({"rank": 3})).is_none());
        assert!(parse_author(&json!({"surname": "Plato"})).is_none());
    }

    #[test]
    fn test_author_name_repeated_in_surname() {
        let fixture = json!({"name": "Lucy", "surname": "Lucy Allington"});
        let mention = parse_author(&fixture).unwrap();
        assert_eq!(mention.full_name(), "Lucy Allington");
    }

    #[test]
    fn test_author_name_prefix_of_surname_is_kept() {
        let mention = parse_author(&json!({"name": "Li", "surname": "Lindsay"})).unwrap();
        assert_eq!(mention.first_name, "Li");
        assert_eq!(mention.last_name, "Lindsay");

        let mention = parse_author(&json!({"name": "Ann", "surname": "Hanna"})).unwrap();
        assert_eq!(mention.full_name(), "Ann Hanna");
    }

    #[test]
    fn test_author_surname_repeated_in_name() {
        let mention = parse_author(&json!({"name": "Lucy Allington", "surname": "Allington"})).unwrap();
        assert_eq!(mention.first_name, "Lucy");
        assert_eq!(mention.last_name, "Allington");
    }

    fn zenodo_fixture() -> serde_json::Value {
        json!({
            "results": [{
                "type": "dataset",
                "mainTitle": "CCG Starter Data Kit: Liberia",
                "publisher": "Zenodo",
                "description": ["A starter data kit", "for Liberia"],
                "author": {
                    "fullName": "Allington, Lucy",
                    "name": "Lucy",
                    "surname": "Allington",
                    "rank": 1,
                    "pid": {"id": {"scheme": "orcid_pending", "value": "0000-0003-1801-899x"}}
                },
                "instance": [{"type": "Dataset", "publicationDate": "2023-01-16"}],
                "indicators": {"citationImpact": {"citationCount": 4}}
            }]
        })
    }

    #[test]
    fn test_parse_metadata() {
        let articles = parse_metadata(&zenodo_fixture(), "10.5281/zenodo.4650794", None).unwrap();
        assert_eq!(articles.len(), 1);
        let article = &articles[0];
        assert_eq!(article.doi, "10.5281/zenodo.4650794");
        assert_eq!(article.title, "CCG Starter Data Kit: Liberia");
        assert_eq!(article.abstract_text, "A starter data kit for Liberia");
        assert_eq!(article.journal, "");
        assert_eq!(article.publisher.as_deref(), Some("Zenodo"));
        assert_eq!(article.result_type, "dataset");
        assert_eq!(article.resource_type.as_deref(), Some("Dataset"));
        assert_eq!(
            (article.publication_year, article.publication_month, article.publication_day),
            (Some(2023), Some(1), Some(16))
        );
        assert_eq!(article.cited_by_count, 4);
        assert_eq!(article.authors.len(), 1);
        assert_eq!(article.authors[0].last_name, "Allington");
    }

    #[test]
    fn test_parse_publication_container() {
        let fixture = json!({
            "results": [{
                "type": "publication",
                "mainTitle": "<i>Energy</i> access",
                "container": {"name": "Energy &amp; Policy", "iss": "2", "vol": "14"},
                "publicationDate": "2021-07"
            }]
        });
        let article = &parse_metadata(&fixture, "10.1/x", None).unwrap()[0];
        assert_eq!(article.title, "Energy access");
        assert_eq!(article.journal, "Energy & Policy");
        assert_eq!(article.issue.as_deref(), Some("2"));
        assert_eq!(article.volume.as_deref(), Some("14"));
        assert_eq!(article.publication_year, Some(2021));
        assert_eq!(article.publication_day, None);
    }

    #[test]
    fn test_unknown_result_type() {
        let fixture = json!({"results": [{"type": "patent"}]});
        assert!(matches!(parse_metadata(&fixture, "10.1/x", None), Err(IndexError::Parse(_))));
    }

    #[test]
    fn test_openalex_institutions_attached() {
        let openalex = json!({
            "id": "https://openalex.org/W1",
            "cited_by_count": 9,
            "authorships": [{
                "author": {"id": "https://openalex.org/A1", "orcid": "https://orcid.org/0000-0003-1801-899X"},
                "institutions": [{
                    "id": "https://openalex.org/I40120149",
                    "display_name": "University of Oxford",
                    "ror": "https://ror.org/052gg0110"
                }],
                "raw_affiliation_strings": ["Dept. of Engineering, Oxford"]
            }]
        });
        let articles = parse_metadata(&zenodo_fixture(), "10.5281/zenodo.4650794", Some(&openalex)).unwrap();
        let article = &articles[0];
        assert_eq!(article.openalex.as_deref(), Some("https://openalex.org/W1"));
        let author = &article.authors[0];
        assert_eq!(author.openalex.as_deref(), Some("https://openalex.org/A1"));
        assert_eq!(
            author.institutions,
            vec![
                InstitutionHint::Id("https://ror.org/052gg0110".to_string()),
                InstitutionHint::Id("https://openalex.org/I40120149".to_string()),
                InstitutionHint::Name("University of Oxford".to_string()),
                InstitutionHint::Name("Dept. of Engineering, Oxford".to_string()),
            ]
        );
    }

    #[test]
    fn test_empty_results() {
        let articles = parse_metadata(&json!({"results": null}), "10.1/x", None).unwrap();
        assert!(articles.is_empty());
    }
}
