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

//! Tantivy index management: one on-disk index per repository plus the
//! full and incremental build pipelines.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use tantivy::directory::MmapDirectory;
use tantivy::schema::{Field, Schema, STORED, STRING, TEXT};
use tantivy::{Index, IndexWriter, TantivyDocument, Term};

use crate::filter::{get_extension, is_binary, FileFilter};
use crate::repourl::repo_id_to_display;
use crate::search::IndexAlias;
use crate::symbols::extract_symbols;

/// Suffix for per-repository index directories.
pub const INDEX_SUFFIX: &str = ".idx";

/// Documents per batch before a flush.
pub const MAX_BATCH_DOCS: usize = 100;

/// Accumulated content bytes per batch before a flush (10 MiB). Together
/// with [`MAX_BATCH_DOCS`] this bounds memory regardless of repo size.
pub const MAX_BATCH_BYTES: usize = 10 * 1024 * 1024;

const WRITER_HEAP_BYTES: usize = 50_000_000;

/// An indexed source file. `id` is `<repoID>/<relativePath>` and is the
/// deduplication key: reindexing the same path replaces the document.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeDocument {
    pub id: String,
    pub repository: String,
    pub file_path: String,
    pub extension: String,
    pub content: String,
    pub symbols: Vec<String>,
}

/// Resolved field handles for the code document schema.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DocFields {
    pub id: Field,
    pub repository: Field,
    pub file_path: Field,
    pub extension: Field,
    pub content: Field,
    pub symbols: Field,
}

impl DocFields {
    pub(crate) fn resolve(schema: &Schema) -> Result<Self> {
        Ok(Self {
            id: schema.get_field("id")?,
            repository: schema.get_field("repository")?,
            file_path: schema.get_field("file_path")?,
            extension: schema.get_field("extension")?,
            content: schema.get_field("content")?,
            symbols: schema.get_field("symbols")?,
        })
    }
}

/// Field mapping for code documents:
///
/// - `content`: tokenized, stored (highlight source)
/// - `symbols`: tokenized, not stored, queried with a boost
/// - `repository`, `file_path`, `extension`: raw keyword, stored
/// - `id`: raw keyword, stored; indexed because deletes address
///   documents by term
fn code_schema() -> Schema {
    let mut builder = Schema::builder();
    builder.add_text_field("id", STRING | STORED);
    builder.add_text_field("repository", STRING | STORED);
    builder.add_text_field("file_path", STRING | STORED);
    builder.add_text_field("extension", STRING | STORED);
    builder.add_text_field("content", TEXT | STORED);
    builder.add_text_field("symbols", TEXT);
    builder.build()
}

/// Manages the on-disk indexes for all repositories under
/// `<base>/indexes/<repoID>.idx`.
pub struct Indexer {
    base_dir: PathBuf,
    filter: FileFilter,
}

impl Indexer {
    pub fn new(base_dir: impl Into<PathBuf>, filter: FileFilter) -> Self {
        Self {
            base_dir: base_dir.into(),
            filter,
        }
    }

    fn index_path(&self, repo_id: &str) -> PathBuf {
        self.base_dir
            .join("indexes")
            .join(format!("{repo_id}{INDEX_SUFFIX}"))
    }

    /// Opens the repository's index for writing, creating it (and its
    /// directory) when absent.
    pub fn open_for_write(&self, repo_id: &str) -> Result<Index> {
        let path = self.index_path(repo_id);
        std::fs::create_dir_all(&path)
            .with_context(|| format!("failed to create index directory {}", path.display()))?;
        let dir = MmapDirectory::open(&path)
            .with_context(|| format!("failed to open index directory {}", path.display()))?;
        let index = Index::open_or_create(dir, code_schema())
            .with_context(|| format!("failed to open index for {repo_id}"))?;
        Ok(index)
    }

    /// Opens an existing index read-only. Followers must only ever use
    /// this path: a second writer would corrupt the index.
    pub fn open_for_read(&self, repo_id: &str) -> Result<Index> {
        let path = self.index_path(repo_id);
        Index::open_in_dir(&path)
            .with_context(|| format!("failed to open index for {repo_id}"))
    }

    pub fn index_exists(&self, repo_id: &str) -> bool {
        self.index_path(repo_id).exists()
    }

    /// Opens every listed index read-only and unions them into a single
    /// queryable surface. The alias owns the handles; partially opened
    /// handles are released when any open fails.
    pub fn create_alias(&self, repo_ids: &[String]) -> Result<IndexAlias> {
        let mut indexes = Vec::with_capacity(repo_ids.len());
        for repo_id in repo_ids {
            let index = self.open_for_read(repo_id)?;
            indexes.push(index);
        }
        if indexes.is_empty() {
            anyhow::bail!("no indexes to combine");
        }
        IndexAlias::new(indexes)
    }

    /// Rebuilds the repository's index from its working tree. Returns the
    /// number of documents indexed.
    ///
    /// The walk skips the `.git` subtree; each file passes the exclusion
    /// patterns, the size cap, and the binary sniff before being mapped
    /// into a document with its extracted symbols. Documents are flushed
    /// in batches of [`MAX_BATCH_DOCS`] documents or [`MAX_BATCH_BYTES`]
    /// content bytes, whichever comes first. Per-file failures are
    /// skipped; a failed flush aborts the build.
    pub fn full_index(&self, repo_id: &str, repo_dir: &Path) -> Result<usize> {
        let index = self.open_for_write(repo_id)?;
        let fields = DocFields::resolve(&index.schema())?;
        let mut writer: IndexWriter = index
            .writer(WRITER_HEAP_BYTES)
            .context("failed to open index writer")?;

        // The first commit below applies this, so the finished index
        // reflects exactly the current working tree.
        writer
            .delete_all_documents()
            .context("failed to clear index")?;

        let display = repo_id_to_display(repo_id);
        let max_file_size = self.filter.max_file_size();
        let mut total = 0usize;
        let mut batch_docs = 0usize;
        let mut batch_bytes = 0usize;

        let walker = WalkBuilder::new(repo_dir)
            .hidden(false)
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .parents(false)
            .require_git(false)
            .follow_links(false)
            .filter_entry(|entry| entry.file_name() != ".git")
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(_) => continue,
            };
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }

            let rel = match entry.path().strip_prefix(repo_dir) {
                Ok(rel) => rel,
                Err(_) => continue,
            };
            let rel_path = rel.to_string_lossy().replace('\\', "/");

            if self.filter.should_exclude(&rel_path) {
                continue;
            }
            let size = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(_) => continue,
            };
            if size > max_file_size {
                continue;
            }
            let bytes = match std::fs::read(entry.path()) {
                Ok(bytes) => bytes,
                Err(_) => continue,
            };
            if is_binary(&bytes) {
                continue;
            }

            let content = String::from_utf8_lossy(&bytes).into_owned();
            let content_bytes = content.len();
            let doc = build_document(repo_id, &display, &rel_path, content);
            if add_document(&mut writer, fields, &doc).is_err() {
                continue;
            }

            total += 1;
            batch_docs += 1;
            batch_bytes += content_bytes;
            if batch_docs >= MAX_BATCH_DOCS || batch_bytes >= MAX_BATCH_BYTES {
                writer.commit().context("batch index commit failed")?;
                batch_docs = 0;
                batch_bytes = 0;
            }
        }

        writer.commit().context("final index commit failed")?;
        Ok(total)
    }

    /// Applies the index consequences of a set of changed paths. Returns
    /// the number of documents (re)indexed.
    ///
    /// A path that vanished, became a directory, is now excluded,
    /// oversized, or binary loses its document; otherwise the document is
    /// replaced with the current file contents. One flush at the end.
    pub fn incremental_index(
        &self,
        repo_id: &str,
        repo_dir: &Path,
        changed_paths: &[String],
    ) -> Result<usize> {
        let index = self.open_for_write(repo_id)?;
        let fields = DocFields::resolve(&index.schema())?;
        let mut writer: IndexWriter = index
            .writer(WRITER_HEAP_BYTES)
            .context("failed to open index writer")?;

        let display = repo_id_to_display(repo_id);
        let max_file_size = self.filter.max_file_size();
        let mut indexed = 0usize;

        for rel_path in changed_paths {
            let rel_path = rel_path.replace('\\', "/");
            let full_path = repo_dir.join(&rel_path);
            let doc_id = format!("{repo_id}/{rel_path}");
            let delete = |writer: &mut IndexWriter| {
                writer.delete_term(Term::from_field_text(fields.id, &doc_id));
            };

            let meta = match std::fs::metadata(&full_path) {
                Ok(meta) => meta,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    delete(&mut writer);
                    continue;
                }
                Err(_) => continue,
            };
            if meta.is_dir() {
                continue;
            }
            if self.filter.should_exclude(&rel_path) {
                // A previous build may have indexed it before the
                // pattern applied.
                delete(&mut writer);
                continue;
            }
            if meta.len() > max_file_size {
                delete(&mut writer);
                continue;
            }
            let bytes = match std::fs::read(&full_path) {
                Ok(bytes) => bytes,
                Err(_) => continue,
            };
            if is_binary(&bytes) {
                delete(&mut writer);
                continue;
            }

            let content = String::from_utf8_lossy(&bytes).into_owned();
            let doc = build_document(repo_id, &display, &rel_path, content);
            delete(&mut writer);
            if add_document(&mut writer, fields, &doc).is_err() {
                continue;
            }
            indexed += 1;
        }

        writer.commit().context("incremental index commit failed")?;
        Ok(indexed)
    }

    /// Recursively removes the repository's index directory.
    pub fn delete_index(&self, repo_id: &str) -> Result<()> {
        let path = self.index_path(repo_id);
        if path.exists() {
            std::fs::remove_dir_all(&path)
                .with_context(|| format!("failed to delete index {}", path.display()))?;
        }
        Ok(())
    }

    /// Number of live documents in the repository's index.
    pub fn document_count(&self, repo_id: &str) -> Result<u64> {
        let index = self.open_for_read(repo_id)?;
        let reader = index.reader().context("failed to open index reader")?;
        Ok(reader.searcher().num_docs())
    }
}

fn build_document(repo_id: &str, display: &str, rel_path: &str, content: String) -> CodeDocument {
    let extension = get_extension(rel_path);
    let symbols = extract_symbols(&extension, &content);
    CodeDocument {
        id: format!("{repo_id}/{rel_path}"),
        repository: display.to_string(),
        file_path: rel_path.to_string(),
        extension,
        content,
        symbols,
    }
}

fn add_document(
    writer: &mut IndexWriter,
    fields: DocFields,
    doc: &CodeDocument,
) -> tantivy::Result<u64> {
    let mut tdoc = TantivyDocument::default();
    tdoc.add_text(fields.id, &doc.id);
    tdoc.add_text(fields.repository, &doc.repository);
    tdoc.add_text(fields.file_path, &doc.file_path);
    tdoc.add_text(fields.extension, &doc.extension);
    tdoc.add_text(fields.content, &doc.content);
    for symbol in &doc.symbols {
        tdoc.add_text(fields.symbols, symbol);
    }
    writer.add_document(tdoc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchQuery;

    fn write_file(dir: &Path, rel: &str, content: &[u8]) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    fn test_indexer(base: &Path, max_file_size: u64) -> Indexer {
        Indexer::new(base, FileFilter::new(max_file_size))
    }

    #[test]
    fn full_index_counts_match_document_count() {
        let base = tempfile::tempdir().unwrap();
        let repo = tempfile::tempdir().unwrap();
        write_file(repo.path(), "main.go", b"package main\nfunc main() {}\n");
        write_file(repo.path(), "lib/util.go", b"package lib\nfunc Util() {}\n");
        write_file(repo.path(), "README.md", b"# readme\n");

        let indexer = test_indexer(base.path(), 1024 * 1024);
        let count = indexer.full_index("github.com_test_repo", repo.path()).unwrap();
        assert_eq!(count, 3);
        assert_eq!(indexer.document_count("github.com_test_repo").unwrap(), 3);
    }

    #[test]
    fn full_index_applies_all_gates() {
        let base = tempfile::tempdir().unwrap();
        let repo = tempfile::tempdir().unwrap();
        write_file(repo.path(), "main.go", b"package main\n");
        // Gated out: excluded directory, oversized, binary, .git subtree.
        write_file(repo.path(), "vendor/dep.go", b"package dep\n");
        write_file(repo.path(), "big.txt", &vec![b'a'; 2048]);
        write_file(repo.path(), "blob.bin", b"BIN\x00ARY");
        write_file(repo.path(), ".git/HEAD", b"ref: refs/heads/main\n");

        let indexer = test_indexer(base.path(), 1024);
        let count = indexer.full_index("github.com_test_repo", repo.path()).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn full_index_rebuild_drops_deleted_files() {
        let base = tempfile::tempdir().unwrap();
        let repo = tempfile::tempdir().unwrap();
        write_file(repo.path(), "a.go", b"package a\n");
        write_file(repo.path(), "b.go", b"package b\n");

        let indexer = test_indexer(base.path(), 1024 * 1024);
        assert_eq!(indexer.full_index("id", repo.path()).unwrap(), 2);

        std::fs::remove_file(repo.path().join("b.go")).unwrap();
        assert_eq!(indexer.full_index("id", repo.path()).unwrap(), 1);
        assert_eq!(indexer.document_count("id").unwrap(), 1);
    }

    #[test]
    fn documents_carry_id_repository_and_lowercased_extension() {
        let base = tempfile::tempdir().unwrap();
        let repo = tempfile::tempdir().unwrap();
        write_file(repo.path(), "src/App.GO", b"package app\nfunc Run() {}\n");

        let indexer = test_indexer(base.path(), 1024 * 1024);
        indexer.full_index("github.com_test_repo", repo.path()).unwrap();

        let alias = indexer
            .create_alias(&["github.com_test_repo".to_string()])
            .unwrap();
        let results = alias
            .search(&SearchQuery {
                query: "app".to_string(),
                repository: None,
                extension: Some("go".to_string()),
                limit: 10,
            })
            .unwrap();
        assert_eq!(results.hits.len(), 1);
        assert_eq!(results.hits[0].repository, "github.com/test/repo");
        assert_eq!(results.hits[0].file_path, "src/App.GO");
        assert_eq!(results.hits[0].extension, "go");
    }

    #[test]
    fn incremental_index_updates_and_deletes() {
        let base = tempfile::tempdir().unwrap();
        let repo = tempfile::tempdir().unwrap();
        write_file(repo.path(), "main.go", b"package main\nfunc old() {}\n");
        write_file(repo.path(), "gone.go", b"package main\n");

        let indexer = test_indexer(base.path(), 1024 * 1024);
        assert_eq!(indexer.full_index("id", repo.path()).unwrap(), 2);

        write_file(repo.path(), "main.go", b"package main\nfunc renewed() {}\n");
        std::fs::remove_file(repo.path().join("gone.go")).unwrap();

        let changed = vec!["main.go".to_string(), "gone.go".to_string()];
        let indexed = indexer.incremental_index("id", repo.path(), &changed).unwrap();
        assert_eq!(indexed, 1);
        assert_eq!(indexer.document_count("id").unwrap(), 1);

        let alias = indexer.create_alias(&["id".to_string()]).unwrap();
        let hits = alias
            .search(&SearchQuery {
                query: "renewed".to_string(),
                repository: None,
                extension: None,
                limit: 10,
            })
            .unwrap();
        assert_eq!(hits.hits.len(), 1);
        let old = alias
            .search(&SearchQuery {
                query: "old".to_string(),
                repository: None,
                extension: None,
                limit: 10,
            })
            .unwrap();
        assert!(old.hits.is_empty());
    }

    #[test]
    fn incremental_index_deletes_now_binary_files() {
        let base = tempfile::tempdir().unwrap();
        let repo = tempfile::tempdir().unwrap();
        write_file(repo.path(), "data.txt", b"text for now\n");

        let indexer = test_indexer(base.path(), 1024 * 1024);
        assert_eq!(indexer.full_index("id", repo.path()).unwrap(), 1);

        write_file(repo.path(), "data.txt", b"BIN\x00ARY");
        let changed = vec!["data.txt".to_string()];
        assert_eq!(indexer.incremental_index("id", repo.path(), &changed).unwrap(), 0);
        assert_eq!(indexer.document_count("id").unwrap(), 0);
    }

    #[test]
    fn delete_index_removes_the_directory() {
        let base = tempfile::tempdir().unwrap();
        let repo = tempfile::tempdir().unwrap();
        write_file(repo.path(), "main.go", b"package main\n");

        let indexer = test_indexer(base.path(), 1024 * 1024);
        indexer.full_index("id", repo.path()).unwrap();
        assert!(indexer.index_exists("id"));

        indexer.delete_index("id").unwrap();
        assert!(!indexer.index_exists("id"));
        // Deleting an absent index is a no-op.
        indexer.delete_index("id").unwrap();
    }

    #[test]
    fn create_alias_requires_at_least_one_index() {
        let base = tempfile::tempdir().unwrap();
        let indexer = test_indexer(base.path(), 1024);
        assert!(indexer.create_alias(&[]).is_err());
        assert!(indexer
            .create_alias(&["missing".to_string()])
            .is_err());
    }
}
