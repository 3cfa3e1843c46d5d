//! Hacker News through the Algolia search API.

use super::text::{encode_component, join_fragments, present};
use super::{check_status, parse_json, trim_base, Source, SourceError};
use crate::engine::catalog;
use crate::engine::query::SearchQuery;
use crate::engine::transport::{FetchOptions, HttpTransport};
use crate::engine::types::{SearchPage, SearchResult, SourceDescriptor};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

const ITEM_URL: &str = "https://news.ycombinator.com/item?id=";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HitSearch {
    hits: Option<Vec<Hit>>,
    nb_hits: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    title: Option<String>,
    story_title: Option<String>,
    url: Option<String>,
    #[serde(rename = "objectID")]
    object_id: Option<String>,
    author: Option<String>,
    points: Option<i64>,
    num_comments: Option<i64>,
}

pub struct HackerNewsSource {
    transport: Arc<HttpTransport>,
    api_base: String,
}

impl HackerNewsSource {
    pub fn new(transport: Arc<HttpTransport>, api_base: &str) -> Self {
        Self {
            transport,
            api_base: trim_base(api_base),
        }
    }
}

fn hit_result(hit: Hit) -> Option<SearchResult> {
    // Comments have no url of their own; link to the item page.
    let url = match present(hit.url.as_deref()) {
        Some(url) => url.to_string(),
        None => format!("{}{}", ITEM_URL, present(hit.object_id.as_deref())?),
    };
    let title = present(hit.title.as_deref())
        .or(present(hit.story_title.as_deref()))
        .unwrap_or("Untitled")
        .to_string();
    let snippet = match present(hit.author.as_deref()) {
        Some(author) => join_fragments([
            format!("by {}", author),
            format!("{} points", hit.points.unwrap_or(0)),
            format!("{} comments", hit.num_comments.unwrap_or(0)),
        ]),
        None => String::new(),
    };
    Some(SearchResult::new(title, url, snippet))
}

#[async_trait]
impl Source for HackerNewsSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &catalog::HACKERNEWS
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, SourceError> {
        let url = format!(
            "{}/api/v1/search?query={}&hitsPerPage=30",
            self.api_base,
            encode_component(query.as_str())
        );
        let response = self.transport.fetch(&url, &FetchOptions::get()).await?;
        check_status(&response)?;
        let payload: HitSearch = parse_json(&response, false)?;

        Ok(SearchPage {
            results: payload
                .hits
                .unwrap_or_default()
                .into_iter()
                .filter_map(hit_result)
                .collect(),
            total_count: payload.nb_hits.filter(|n| *n > 0),
        })
    }
}
