// Copyright 2025 Reposcope Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Read-only query surface over the per-repository indexes.
//!
//! Tantivy has no native multi-index alias, so [`IndexAlias`] searches
//! each shard with the same query, merges hits by score, and sums the
//! per-shard totals.

use std::cmp::Ordering;

use anyhow::{Context, Result};
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{BooleanQuery, BoostQuery, Occur, Query, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::snippet::SnippetGenerator;
use tantivy::{Index, IndexReader, TantivyDocument, Term};

use crate::indexer::DocFields;

/// Query-time boost applied to the `symbols` field: a hit on an extracted
/// symbol name ranks well above a content-only hit.
pub const SYMBOL_BOOST: f32 = 5.0;

/// A search across the alias.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub query: String,
    /// Exact match against the repository display name.
    pub repository: Option<String>,
    /// Exact match against the lowercased, dot-less extension.
    pub extension: Option<String>,
    pub limit: usize,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub score: f32,
    pub repository: String,
    pub file_path: String,
    pub extension: String,
    /// Highlight fragments from the `content` field, in engine order.
    pub fragments: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    /// Total matches across all shards, which may exceed `hits.len()`.
    pub total: u64,
    pub hits: Vec<SearchHit>,
}

struct SearchShard {
    index: Index,
    reader: IndexReader,
    fields: DocFields,
}

impl SearchShard {
    fn new(index: Index) -> Result<Self> {
        let fields = DocFields::resolve(&index.schema())?;
        let reader = index.reader().context("failed to open index reader")?;
        Ok(Self {
            index,
            reader,
            fields,
        })
    }
}

/// Read-only union of per-repository indexes. Owns the opened handles and
/// releases them on drop.
pub struct IndexAlias {
    shards: Vec<SearchShard>,
}

impl IndexAlias {
    pub(crate) fn new(indexes: Vec<Index>) -> Result<Self> {
        let mut shards = Vec::with_capacity(indexes.len());
        for index in indexes {
            shards.push(SearchShard::new(index)?);
        }
        Ok(Self { shards })
    }

    /// Number of per-repository indexes behind this alias.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Runs the boosted-disjunction search over every shard and merges
    /// results by descending score, truncated to `query.limit`.
    pub fn search(&self, query: &SearchQuery) -> Result<SearchResults> {
        let mut results = SearchResults::default();

        for shard in &self.shards {
            let Some(shard_query) = build_shard_query(shard, query)? else {
                continue;
            };
            let searcher = shard.reader.searcher();
            let limit = query.limit.max(1);
            let (top_docs, count) = searcher
                .search(&*shard_query, &(TopDocs::with_limit(limit), Count))
                .context("index search failed")?;
            results.total += count as u64;

            // Highlighting is best-effort; a shard that cannot build a
            // generator still returns its hits.
            let snippet_generator =
                SnippetGenerator::create(&searcher, &*shard_query, shard.fields.content).ok();

            for (score, address) in top_docs {
                let doc: TantivyDocument =
                    searcher.doc(address).context("failed to load document")?;
                let stored = |field| {
                    doc.get_first(field)
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string()
                };

                let mut fragments = Vec::new();
                if let Some(generator) = &snippet_generator {
                    let snippet = generator.snippet_from_doc(&doc);
                    if !snippet.fragment().is_empty() {
                        fragments.push(snippet.to_html());
                    }
                }

                results.hits.push(SearchHit {
                    score,
                    repository: stored(shard.fields.repository),
                    file_path: stored(shard.fields.file_path),
                    extension: stored(shard.fields.extension),
                    fragments,
                });
            }
        }

        results
            .hits
            .sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        results.hits.truncate(query.limit.max(1));
        Ok(results)
    }
}

/// Composes the per-shard query: `(content:q OR symbols:q^5)`, conjuncted
/// with exact `repository`/`extension` terms when filters are set.
/// Returns `None` when the query string tokenizes to nothing.
fn build_shard_query(
    shard: &SearchShard,
    query: &SearchQuery,
) -> Result<Option<Box<dyn Query>>> {
    let terms = tokenize(shard, &query.query)?;
    if terms.is_empty() {
        return Ok(None);
    }

    let match_query = |field| -> Box<dyn Query> {
        let clauses: Vec<(Occur, Box<dyn Query>)> = terms
            .iter()
            .map(|term| {
                let term_query = TermQuery::new(
                    Term::from_field_text(field, term),
                    IndexRecordOption::WithFreqsAndPositions,
                );
                (Occur::Should, Box::new(term_query) as Box<dyn Query>)
            })
            .collect();
        Box::new(BooleanQuery::new(clauses))
    };

    let content_query = match_query(shard.fields.content);
    let symbols_query: Box<dyn Query> = Box::new(BoostQuery::new(
        match_query(shard.fields.symbols),
        SYMBOL_BOOST,
    ));

    let base: Box<dyn Query> = Box::new(BooleanQuery::new(vec![
        (Occur::Should, content_query),
        (Occur::Should, symbols_query),
    ]));

    if query.repository.is_none() && query.extension.is_none() {
        return Ok(Some(base));
    }

    let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![(Occur::Must, base)];
    if let Some(repository) = &query.repository {
        clauses.push((
            Occur::Must,
            Box::new(TermQuery::new(
                Term::from_field_text(shard.fields.repository, repository),
                IndexRecordOption::Basic,
            )),
        ));
    }
    if let Some(extension) = &query.extension {
        clauses.push((
            Occur::Must,
            Box::new(TermQuery::new(
                Term::from_field_text(shard.fields.extension, extension),
                IndexRecordOption::Basic,
            )),
        ));
    }

    Ok(Some(Box::new(BooleanQuery::new(clauses))))
}

/// Runs the user's query string through the shard's content analyzer so
/// term queries line up with what indexing produced.
fn tokenize(shard: &SearchShard, text: &str) -> Result<Vec<String>> {
    let mut analyzer = shard
        .index
        .tokenizer_for_field(shard.fields.content)
        .context("content tokenizer missing")?;
    let mut stream = analyzer.token_stream(text);
    let mut terms = Vec::new();
    while stream.advance() {
        terms.push(stream.token().text.clone());
    }
    Ok(terms)
}
