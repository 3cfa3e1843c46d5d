//! linux.do (Discourse) search, fetched with the user's forum cookies.
//!
//! The forum sits behind a bot challenge: a 401/403/429 or an HTML body where
//! JSON was expected means the session has to be refreshed in a login window.

use super::text::{decode_entities, encode_component, present};
use super::{check_status, parse_json, trim_base, Source, SourceError};
use crate::engine::catalog;
use crate::engine::query::SearchQuery;
use crate::engine::transport::{FetchOptions, HttpTransport};
use crate::engine::types::{SearchPage, SearchResult, SourceDescriptor};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

const SITE: &str = "https://linux.do";

#[derive(Debug, Deserialize)]
struct ForumSearch {
    topics: Option<Vec<Topic>>,
    posts: Option<Vec<Post>>,
}

#[derive(Debug, Deserialize)]
struct Topic {
    id: Option<u64>,
    slug: Option<String>,
    title: Option<String>,
    excerpt: Option<String>,
    blurb: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Post {
    topic_id: Option<u64>,
    blurb: Option<String>,
}

pub struct LinuxDoSource {
    transport: Arc<HttpTransport>,
    base: String,
}

impl LinuxDoSource {
    pub fn new(transport: Arc<HttpTransport>, base: &str) -> Self {
        Self {
            transport,
            base: trim_base(base),
        }
    }
}

/// Topics come without text; fill each empty snippet from the first post of that topic.
fn merge(search: ForumSearch) -> Vec<SearchResult> {
    let mut entries: Vec<(u64, SearchResult)> = search
        .topics
        .unwrap_or_default()
        .into_iter()
        .filter_map(|topic| {
            let id = topic.id?;
            let slug = present(topic.slug.as_deref()).unwrap_or("-");
            let snippet = present(topic.excerpt.as_deref())
                .or(present(topic.blurb.as_deref()))
                .map(decode_entities)
                .unwrap_or_default();
            let result = SearchResult::new(
                decode_entities(topic.title.as_deref().unwrap_or("")),
                format!("{}/t/{}/{}", SITE, slug, id),
                snippet,
            );
            Some((id, result))
        })
        .collect();

    for post in search.posts.unwrap_or_default() {
        let (Some(topic_id), Some(blurb)) = (post.topic_id, present(post.blurb.as_deref())) else {
            continue;
        };
        if let Some((_, result)) = entries.iter_mut().find(|(id, _)| *id == topic_id) {
            if result.snippet.is_empty() {
                result.snippet = decode_entities(blurb);
            }
        }
    }

    entries.into_iter().map(|(_, result)| result).collect()
}

#[async_trait]
impl Source for LinuxDoSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &catalog::LINUXDO
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, SourceError> {
        let url = format!("{}/search.json?q={}", self.base, encode_component(query.as_str()));
        let response = self
            .transport
            .fetch_with_credentials(
                self.id(),
                &url,
                &FetchOptions::get().header("Accept", "application/json"),
            )
            .await?;
        check_status(&response)?;
        let payload: ForumSearch = parse_json(&response, true)?;

        Ok(SearchPage {
            results: merge(payload),
            total_count: None,
        })
    }
}
