//! PubMed E-utilities (fuzzy stage)
//!
//! `esearch` finds the most relevant PMID for the title; `efetch` returns the
//! MEDLINE XML record that is matched against the draft.

use super::{collapse_whitespace, encode};
use crate::error::ScrapeResult;
use crate::fetch::Fetcher;
use crate::matcher::match_candidates;
use crate::types::{is_empty_value, Draft, PubType, SourceAdapter, SourceRequest};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

pub const NAME: &str = "pubmed";

const EUTILS_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const TITLE_THRESHOLD: f64 = 0.95;

/// E-utilities throttle non-browser clients aggressively
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.114 Safari/537.36";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchResponse {
    esearchresult: SearchResult,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchResult {
    idlist: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ArticleSet {
    #[serde(rename = "PubmedArticle")]
    articles: Vec<PubmedArticle>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PubmedArticle {
    #[serde(rename = "MedlineCitation")]
    citation: MedlineCitation,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MedlineCitation {
    #[serde(rename = "Article")]
    article: Article,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct Article {
    journal: Journal,
    article_title: String,
    pagination: Option<Pagination>,
    #[serde(rename = "ELocationID")]
    locations: Vec<ELocation>,
    author_list: AuthorList,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct Journal {
    journal_issue: JournalIssue,
    title: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct JournalIssue {
    volume: String,
    issue: String,
    pub_date: PubDate,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct PubDate {
    year: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct Pagination {
    medline_pgn: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ELocation {
    #[serde(rename = "@EIdType")]
    id_type: String,
    #[serde(rename = "$text")]
    value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AuthorList {
    #[serde(rename = "Author")]
    authors: Vec<Author>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct Author {
    fore_name: String,
    last_name: String,
}

impl Article {
    fn into_candidate(self) -> Draft {
        let doi = self
            .locations
            .iter()
            .find(|loc| loc.id_type == "doi")
            .map(|loc| loc.value.trim().to_string())
            .unwrap_or_default();

        Draft {
            title: collapse_whitespace(&self.article_title),
            authors: self
                .author_list
                .authors
                .iter()
                .map(|a| format!("{} {}", a.fore_name, a.last_name).trim().to_string())
                .filter(|name| !name.is_empty())
                .collect::<Vec<_>>()
                .join(", "),
            publication: self.journal.title,
            pub_time: self.journal.journal_issue.pub_date.year,
            pub_type: Some(PubType::Journal),
            doi,
            pages: self.pagination.map(|p| p.medline_pgn).unwrap_or_default(),
            volume: self.journal.journal_issue.volume,
            number: self.journal.journal_issue.issue,
            ..Default::default()
        }
    }
}

/// PubMed adapter
pub struct PubMedAdapter;

#[async_trait]
impl SourceAdapter for PubMedAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_applicable(&self, draft: &Draft) -> bool {
        !is_empty_value(&draft.title)
    }

    fn build_request(&self, draft: &Draft) -> ScrapeResult<SourceRequest> {
        Ok(SourceRequest::get(
            format!(
                "{}/esearch.fcgi?db=pubmed&retmode=json&retmax=5&sort=relevance&term={}",
                EUTILS_URL,
                encode(&collapse_whitespace(&draft.title))
            ),
            TITLE_THRESHOLD,
        )
        .header("User-Agent", BROWSER_USER_AGENT))
    }

    /// Decodes an `efetch` XML article set
    fn parse_response(&self, body: &str) -> ScrapeResult<Vec<Draft>> {
        let set: ArticleSet = quick_xml::de::from_str(body)?;
        Ok(set
            .articles
            .into_iter()
            .map(|a| a.citation.article.into_candidate())
            .collect())
    }

    async fn resolve(&self, draft: Draft, fetcher: &dyn Fetcher) -> ScrapeResult<Draft> {
        if !self.is_applicable(&draft) {
            return Ok(draft);
        }
        let search = self.build_request(&draft)?;
        let body = fetcher.fetch(&search).await?;
        let response: SearchResponse = serde_json::from_str(&body)?;
        let Some(id) = response.esearchresult.idlist.into_iter().next() else {
            return Ok(draft);
        };

        debug!(source = NAME, pmid = %id, "Fetching record");
        let fetch = search.with_url(format!(
            "{}/efetch.fcgi?db=pubmed&retmode=xml&id={}",
            EUTILS_URL,
            encode(&id)
        ));
        let body = fetcher.fetch(&fetch).await?;
        let candidates = self.parse_response(&body)?;
        Ok(match_candidates(draft, candidates, fetch.similarity_threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MapFetcher;

    const EFETCH: &str = r#"<?xml version="1.0" ?>
<!DOCTYPE PubmedArticleSet PUBLIC "-//NLM//DTD PubMedArticle, 1st January 2024//EN" "https://dtd.nlm.nih.gov/ncbi/pubmed/out/pubmed_240101.dtd">
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation Status="MEDLINE" Owner="NLM">
      <PMID Version="1">34265844</PMID>
      <Article PubModel="Print-Electronic">
        <Journal>
          <ISSN IssnType="Electronic">1476-4687</ISSN>
          <JournalIssue CitedMedium="Internet">
            <Volume>596</Volume>
            <Issue>7873</Issue>
            <PubDate><Year>2021</Year><Month>Aug</Month></PubDate>
          </JournalIssue>
          <Title>Nature</Title>
        </Journal>
        <ArticleTitle>Highly accurate protein structure prediction with AlphaFold.</ArticleTitle>
        <Pagination><MedlinePgn>583-589</MedlinePgn></Pagination>
        <ELocationID EIdType="pii" ValidYN="Y">10.1038/s41586-021-03819-2</ELocationID>
        <ELocationID EIdType="doi" ValidYN="Y">10.1038/s41586-021-03819-2</ELocationID>
        <AuthorList CompleteYN="Y">
          <Author ValidYN="Y"><LastName>Jumper</LastName><ForeName>John</ForeName></Author>
          <Author ValidYN="Y"><LastName>Evans</LastName><ForeName>Richard</ForeName></Author>
        </AuthorList>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn test_parse_efetch() {
        let candidates = PubMedAdapter.parse_response(EFETCH).unwrap();
        let c = &candidates[0];
        assert_eq!(c.title, "Highly accurate protein structure prediction with AlphaFold.");
        assert_eq!(c.authors, "John Jumper, Richard Evans");
        assert_eq!(c.publication, "Nature");
        assert_eq!(c.pub_time, "2021");
        assert_eq!(c.volume, "596");
        assert_eq!(c.number, "7873");
        assert_eq!(c.pages, "583-589");
        assert_eq!(c.doi, "10.1038/s41586-021-03819-2");
        assert_eq!(c.pub_type, Some(PubType::Journal));
    }

    #[tokio::test]
    async fn test_search_then_fetch() {
        let fetcher = MapFetcher::new()
            .route("esearch.fcgi", r#"{"header":{},"esearchresult":{"count":"1","idlist":["34265844"]}}"#)
            .route("efetch.fcgi?db=pubmed&retmode=xml&id=34265844", EFETCH);
        let draft = Draft::with_title("Highly accurate protein structure prediction with AlphaFold");

        let resolved = PubMedAdapter.resolve(draft, &fetcher).await.unwrap();
        assert_eq!(resolved.publication, "Nature");
        assert!(resolved.is_complete());
    }

    #[tokio::test]
    async fn test_empty_search_stops() {
        let fetcher = MapFetcher::new()
            .route("esearch.fcgi", r#"{"esearchresult":{"count":"0","idlist":[]}}"#);
        let draft = Draft::with_title("Nothing here");
        let resolved = PubMedAdapter.resolve(draft.clone(), &fetcher).await.unwrap();
        assert_eq!(resolved, draft);
        assert_eq!(fetcher.request_count(), 1);
    }
}
