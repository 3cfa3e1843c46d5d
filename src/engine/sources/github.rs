//! GitHub: repository search, topped up with matching issues.

use super::text::{encode_component, excerpt, group_thousands, join_fragments, present};
use super::{check_status, parse_json, trim_base, Source, SourceError};
use crate::engine::catalog;
use crate::engine::query::SearchQuery;
use crate::engine::transport::{FetchOptions, HttpTransport};
use crate::engine::types::{SearchPage, SearchResult, SourceDescriptor};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

const ACCEPT: &str = "application/vnd.github.v3+json";
/// Issues appended after the repositories.
const ISSUE_CAP: usize = 10;

#[derive(Debug, Deserialize)]
struct RepoSearch {
    total_count: Option<u64>,
    items: Option<Vec<Repo>>,
}

#[derive(Debug, Deserialize)]
struct Repo {
    full_name: Option<String>,
    html_url: Option<String>,
    stargazers_count: Option<u64>,
    language: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IssueSearch {
    items: Option<Vec<Issue>>,
}

#[derive(Debug, Deserialize)]
struct Issue {
    title: Option<String>,
    html_url: Option<String>,
    body: Option<String>,
}

pub struct GitHubSource {
    transport: Arc<HttpTransport>,
    api_base: String,
}

impl GitHubSource {
    pub fn new(transport: Arc<HttpTransport>, api_base: &str) -> Self {
        Self {
            transport,
            api_base: trim_base(api_base),
        }
    }

    async fn issues(&self, url: &str, options: &FetchOptions) -> Result<Vec<SearchResult>, SourceError> {
        let response = self.transport.fetch(url, options).await?;
        check_status(&response)?;
        let payload: IssueSearch = parse_json(&response, false)?;
        Ok(payload
            .items
            .unwrap_or_default()
            .into_iter()
            .filter_map(issue_result)
            .take(ISSUE_CAP)
            .collect())
    }
}

fn repo_result(repo: Repo) -> Option<SearchResult> {
    let url = repo.html_url.filter(|u| !u.is_empty())?;
    let stars = match repo.stargazers_count {
        Some(n) if n > 0 => format!("\u{2B50}{}", group_thousands(n)),
        _ => String::new(),
    };
    let snippet = join_fragments([
        stars.as_str(),
        present(repo.language.as_deref()).unwrap_or(""),
        present(repo.description.as_deref()).unwrap_or(""),
    ]);
    Some(SearchResult::new(repo.full_name.unwrap_or_default(), url, snippet))
}

fn issue_result(issue: Issue) -> Option<SearchResult> {
    let url = issue.html_url.filter(|u| !u.is_empty())?;
    let snippet = present(issue.body.as_deref()).map(excerpt).unwrap_or_default();
    Some(SearchResult::new(issue.title.unwrap_or_default(), url, snippet))
}

#[async_trait]
impl Source for GitHubSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &catalog::GITHUB
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, SourceError> {
        let q = encode_component(query.as_str());
        let repos_url = format!("{}/search/repositories?q={}&per_page=30", self.api_base, q);
        let issues_url = format!(
            "{}/search/issues?q={}&per_page=10&sort=relevance",
            self.api_base, q
        );
        let options = FetchOptions::get().header("Accept", ACCEPT);

        let (repos, issues) = futures::join!(
            self.transport.fetch(&repos_url, &options),
            self.issues(&issues_url, &options)
        );

        let repos = repos?;
        check_status(&repos)?;
        let payload: RepoSearch = parse_json(&repos, false)?;

        let mut results: Vec<SearchResult> = payload
            .items
            .unwrap_or_default()
            .into_iter()
            .filter_map(repo_result)
            .collect();

        match issues {
            Ok(extra) => results.extend(extra),
            Err(e) => debug!(error = %e, "issue search failed, keeping repositories only"),
        }

        Ok(SearchPage {
            results,
            total_count: Some(payload.total_count.unwrap_or(0)),
        })
    }
}
