//! Reddit's JSON search listing, fetched with the user's Reddit cookies.

use super::text::{encode_component, excerpt, join_fragments, present};
use super::{check_status, parse_json, trim_base, Source, SourceError};
use crate::engine::catalog;
use crate::engine::query::SearchQuery;
use crate::engine::transport::{FetchOptions, HttpTransport};
use crate::engine::types::{SearchPage, SearchResult, SourceDescriptor};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

const SITE: &str = "https://www.reddit.com";
/// Listing kind for link posts.
const LINK_KIND: &str = "t3";

#[derive(Debug, Deserialize)]
struct Listing {
    data: Option<ListingData>,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    children: Option<Vec<Child>>,
}

#[derive(Debug, Deserialize)]
struct Child {
    kind: Option<String>,
    data: Option<Post>,
}

#[derive(Debug, Deserialize)]
struct Post {
    title: Option<String>,
    permalink: Option<String>,
    selftext: Option<String>,
    subreddit: Option<String>,
    score: Option<i64>,
    num_comments: Option<i64>,
}

pub struct RedditSource {
    transport: Arc<HttpTransport>,
    base: String,
}

impl RedditSource {
    pub fn new(transport: Arc<HttpTransport>, base: &str) -> Self {
        Self {
            transport,
            base: trim_base(base),
        }
    }
}

fn post_result(post: Post) -> Option<SearchResult> {
    let permalink = present(post.permalink.as_deref())?;
    let snippet = match present(post.selftext.as_deref()) {
        Some(body) => excerpt(body),
        None => join_fragments([
            present(post.subreddit.as_deref())
                .map(|s| format!("r/{}", s))
                .unwrap_or_default(),
            format!("{} points", post.score.unwrap_or(0)),
            format!("{} comments", post.num_comments.unwrap_or(0)),
        ]),
    };
    Some(SearchResult::new(
        post.title.unwrap_or_default(),
        format!("{}{}", SITE, permalink),
        snippet,
    ))
}

#[async_trait]
impl Source for RedditSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &catalog::REDDIT
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, SourceError> {
        let url = format!(
            "{}/search.json?q={}&limit=25&sort=relevance&t=all",
            self.base,
            encode_component(query.as_str())
        );
        let response = self
            .transport
            .fetch_with_credentials(self.id(), &url, &FetchOptions::get())
            .await?;
        check_status(&response)?;
        let listing: Listing = parse_json(&response, false)?;

        let children = listing
            .data
            .and_then(|d| d.children)
            .unwrap_or_default();

        Ok(SearchPage {
            results: children
                .into_iter()
                .filter(|c| c.kind.as_deref() == Some(LINK_KIND))
                .filter_map(|c| c.data)
                .filter_map(post_result)
                .collect(),
            total_count: None,
        })
    }
}
