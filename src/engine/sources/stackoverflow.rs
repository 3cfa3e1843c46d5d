//! Stack Overflow via the Stack Exchange API.

use super::text::{decode_entities, encode_component, join_fragments};
use super::{check_status, parse_json, trim_base, Source, SourceError};
use crate::engine::catalog;
use crate::engine::query::SearchQuery;
use crate::engine::transport::{FetchOptions, HttpTransport};
use crate::engine::types::{SearchPage, SearchResult, SourceDescriptor};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct QuestionSearch {
    items: Option<Vec<Question>>,
    total: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Question {
    title: Option<String>,
    link: Option<String>,
    answer_count: Option<u64>,
    score: Option<i64>,
    tags: Option<Vec<String>>,
}

pub struct StackOverflowSource {
    transport: Arc<HttpTransport>,
    api_base: String,
}

impl StackOverflowSource {
    pub fn new(transport: Arc<HttpTransport>, api_base: &str) -> Self {
        Self {
            transport,
            api_base: trim_base(api_base),
        }
    }
}

fn question_result(question: Question) -> Option<SearchResult> {
    let url = question.link.filter(|l| !l.is_empty())?;
    let tags = question
        .tags
        .unwrap_or_default()
        .into_iter()
        .take(4)
        .collect::<Vec<_>>()
        .join(", ");
    let snippet = join_fragments([
        format!("{} answers", question.answer_count.unwrap_or(0)),
        format!("{} votes", question.score.unwrap_or(0)),
        tags,
    ]);
    Some(SearchResult::new(
        decode_entities(&question.title.unwrap_or_default()),
        url,
        snippet,
    ))
}

#[async_trait]
impl Source for StackOverflowSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &catalog::STACKOVERFLOW
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, SourceError> {
        let url = format!(
            "{}/2.3/search/advanced?order=desc&sort=relevance&q={}&site=stackoverflow&pagesize=30",
            self.api_base,
            encode_component(query.as_str())
        );
        let response = self.transport.fetch(&url, &FetchOptions::get()).await?;
        check_status(&response)?;
        let payload: QuestionSearch = parse_json(&response, false)?;

        Ok(SearchPage {
            results: payload
                .items
                .unwrap_or_default()
                .into_iter()
                .filter_map(question_result)
                .collect(),
            total_count: payload.total.filter(|t| *t > 0),
        })
    }
}
