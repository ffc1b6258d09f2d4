use crate::search::{
    backend::SearchBackend,
    document::{FieldKind, IndexMapping, SearchDocument, SearchHit, SearchHits, SearchRequest, SortKey},
    query::{Fuzziness, StructuredQuery},
};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{
    AllQuery, BooleanQuery, BoostQuery, DisjunctionMaxQuery, EmptyQuery, FuzzyTermQuery, Occur,
    Query, TermQuery,
};
use tantivy::schema::{
    DateOptions, DateTimePrecision, Field, IndexRecordOption, OwnedValue, Schema, INDEXED, STORED,
    STRING, TEXT,
};
use tantivy::tokenizer::TokenStream;
use tantivy::{
    DocId, Index, IndexReader, IndexWriter, ReloadPolicy, Score, SegmentReader, TantivyDocument,
    Term,
};
use tracing::{debug, info};

const ID_FIELD: &str = "_id";
const SOURCE_FIELD: &str = "_source";
const WRITER_MEMORY_BYTES: usize = 50_000_000;

/// Local tantivy index that executes the same structured queries as Elasticsearch.
///
/// Holds any number of named indexes, on disk under `root` or in RAM when no
/// root is given. Credentials do not apply.
pub struct EmbeddedIndex {
    root: Option<PathBuf>,
    indexes: RwLock<HashMap<String, Arc<LocalIndex>>>,
}

struct LocalIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    id: Field,
    source: Field,
    text_fields: HashMap<String, Field>,
    date_fields: HashMap<String, Field>,
}

fn build_schema(mapping: &IndexMapping) -> Schema {
    let mut schema_builder = Schema::builder();

    // Document id (exact match, stored)
    schema_builder.add_text_field(ID_FIELD, STRING | STORED);

    // Full document as JSON, returned with hits
    schema_builder.add_text_field(SOURCE_FIELD, STORED);

    for (name, kind) in &mapping.fields {
        match kind {
            FieldKind::Text => {
                schema_builder.add_text_field(name, TEXT);
            }
            FieldKind::Date => {
                schema_builder.add_date_field(
                    name,
                    DateOptions::from(INDEXED)
                        .set_fast()
                        .set_precision(DateTimePrecision::Microseconds),
                );
            }
        }
    }

    schema_builder.build()
}

fn lock_poisoned<T>(_: T) -> Error {
    Error::Search("Embedded index lock poisoned".to_string())
}

impl LocalIndex {
    fn create(path: Option<&Path>, mapping: &IndexMapping) -> Result<Self> {
        let schema = build_schema(mapping);
        let index = match path {
            Some(path) => {
                std::fs::create_dir_all(path)?;
                Index::create_in_dir(path, schema)
                    .map_err(|e| Error::Search(format!("Failed to create index: {e}")))?
            }
            None => Index::create_in_ram(schema),
        };
        Self::from_index(index)
    }

    fn open(path: &Path) -> Result<Self> {
        let index = Index::open_in_dir(path)
            .map_err(|e| Error::Search(format!("Failed to open index: {e}")))?;
        Self::from_index(index)
    }

    fn from_index(index: Index) -> Result<Self> {
        let schema = index.schema();

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| Error::Search(format!("Failed to create reader: {e}")))?;

        let writer: IndexWriter = index
            .writer_with_num_threads(1, WRITER_MEMORY_BYTES)
            .map_err(|e| Error::Search(format!("Failed to create writer: {e}")))?;

        let mut text_fields = HashMap::new();
        let mut date_fields = HashMap::new();
        for (field, entry) in schema.fields() {
            let name = entry.name();
            if name == ID_FIELD || name == SOURCE_FIELD {
                continue;
            }
            if entry.field_type().is_indexed() {
                match entry.field_type() {
                    tantivy::schema::FieldType::Date(_) => {
                        date_fields.insert(name.to_string(), field);
                    }
                    _ => {
                        text_fields.insert(name.to_string(), field);
                    }
                }
            }
        }

        Ok(Self {
            id: schema.get_field(ID_FIELD)?,
            source: schema.get_field(SOURCE_FIELD)?,
            index,
            reader,
            writer: Mutex::new(writer),
            text_fields,
            date_fields,
        })
    }

    fn text_field(&self, name: &str) -> Result<Field> {
        self.text_fields
            .get(name)
            .copied()
            .ok_or_else(|| Error::Search(format!("Unknown text field: {name}")))
    }

    fn upsert(&self, id: &str, doc: &SearchDocument) -> Result<()> {
        let mut document = TantivyDocument::default();
        document.add_text(self.id, id);
        document.add_text(self.source, serde_json::to_string(doc)?);

        let value = serde_json::to_value(doc)?;
        for (name, field) in &self.text_fields {
            match value.get(name) {
                Some(serde_json::Value::String(text)) => document.add_text(*field, text),
                Some(serde_json::Value::Array(items)) => {
                    for text in items.iter().filter_map(|item| item.as_str()) {
                        document.add_text(*field, text);
                    }
                }
                _ => {}
            }
        }
        for (name, field) in &self.date_fields {
            if let Some(date) = doc.date_field(name) {
                document.add_date(
                    *field,
                    tantivy::DateTime::from_timestamp_micros(date.timestamp_micros()),
                );
            }
        }

        let mut writer = self.writer.lock().map_err(lock_poisoned)?;
        // Delete before add so an update never leaves two copies
        writer.delete_term(Term::from_field_text(self.id, id));
        writer.add_document(document)?;
        writer.commit()?;
        drop(writer);

        self.reader.reload()?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        let mut writer = self.writer.lock().map_err(lock_poisoned)?;
        writer.delete_term(Term::from_field_text(self.id, id));
        writer.commit()?;
        drop(writer);

        self.reader.reload()?;
        Ok(())
    }

    /// Analyzed match of `text` against one field: every token is an optional
    /// clause, exact terms score by BM25 and near misses by edit distance.
    fn match_query(&self, field: Field, text: &str, fuzziness: Fuzziness) -> Result<Box<dyn Query>> {
        let mut analyzer = self.index.tokenizer_for_field(field)?;
        let mut tokens = Vec::new();
        let mut stream = analyzer.token_stream(text);
        while stream.advance() {
            tokens.push(stream.token().text.clone());
        }

        if tokens.is_empty() {
            return Ok(Box::new(EmptyQuery));
        }

        let clauses = tokens
            .into_iter()
            .map(|token| {
                let term = Term::from_field_text(field, &token);
                let exact: Box<dyn Query> =
                    Box::new(TermQuery::new(term.clone(), IndexRecordOption::WithFreqs));
                let distance = fuzziness.edits_for(&token);
                let clause: Box<dyn Query> = if distance == 0 {
                    exact
                } else {
                    Box::new(BooleanQuery::new(vec![
                        (Occur::Should, exact),
                        (
                            Occur::Should,
                            Box::new(FuzzyTermQuery::new(term, distance, true)),
                        ),
                    ]))
                };
                (Occur::Should, clause)
            })
            .collect();

        Ok(Box::new(BooleanQuery::new(clauses)))
    }

    fn compile(&self, query: &StructuredQuery) -> Result<Box<dyn Query>> {
        match query {
            StructuredQuery::MatchAll(_) => Ok(Box::new(AllQuery)),
            StructuredQuery::Bool(bool_query) => {
                if bool_query.must.is_empty() {
                    return Ok(Box::new(AllQuery));
                }
                let clauses = bool_query
                    .must
                    .iter()
                    .map(|clause| Ok((Occur::Must, self.compile(clause)?)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Box::new(BooleanQuery::new(clauses)))
            }
            StructuredQuery::MultiMatch(multi) => {
                // best_fields: the highest scoring field decides
                let disjuncts = multi
                    .fields
                    .iter()
                    .map(|boosted| {
                        let field = self.text_field(&boosted.field)?;
                        let inner = self.match_query(field, &multi.query, multi.fuzziness)?;
                        Ok(Box::new(BoostQuery::new(inner, boosted.boost)) as Box<dyn Query>)
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Box::new(DisjunctionMaxQuery::new(disjuncts)))
            }
            StructuredQuery::Match(field_match) => {
                let field = self.text_field(&field_match.field)?;
                self.match_query(field, &field_match.query, field_match.fuzziness)
            }
        }
    }

    fn search(&self, request: &SearchRequest) -> Result<SearchHits> {
        let query = self.compile(&request.query)?;
        let searcher = self.reader.searcher();

        // Score first, the first date sort key breaks ties
        let tiebreak = request.sort.iter().find_map(|key| match key {
            SortKey::FieldDesc(field) if self.date_fields.contains_key(field) => Some(field.clone()),
            _ => None,
        });
        let top = TopDocs::with_limit(request.size.max(1)).tweak_score(
            move |segment_reader: &SegmentReader| {
                let dates = tiebreak
                    .as_deref()
                    .and_then(|field| segment_reader.fast_fields().date(field).ok());
                move |doc: DocId, score: Score| {
                    let at = dates
                        .as_ref()
                        .and_then(|column| column.first(doc))
                        .map(|date| date.into_timestamp_micros())
                        .unwrap_or(i64::MIN);
                    (score, at)
                }
            },
        );

        let (total, top_docs) = searcher
            .search(&*query, &(Count, top))
            .map_err(|e| Error::Search(format!("Search failed: {e}")))?;

        let mut hits = Vec::with_capacity(top_docs.len().min(request.size));
        for ((score, _), doc_address) in top_docs.into_iter().take(request.size) {
            let doc = searcher.doc::<TantivyDocument>(doc_address)?;

            let id = match doc.get_first(self.id) {
                Some(OwnedValue::Str(s)) => s.to_string(),
                _ => continue,
            };
            let source: SearchDocument = match doc.get_first(self.source) {
                Some(OwnedValue::Str(s)) => serde_json::from_str(s)?,
                _ => continue,
            };

            hits.push(SearchHit {
                id,
                score: Some(score),
                source,
            });
        }

        Ok(SearchHits {
            total: total as u64,
            hits,
        })
    }
}

impl EmbeddedIndex {
    /// Indexes under `root`, or in memory when `root` is `None`
    pub fn new(root: Option<PathBuf>) -> Result<Self> {
        if let Some(root) = &root {
            std::fs::create_dir_all(root)?;
            info!("Embedded search index initialized at {:?}", root);
        } else {
            info!("Embedded search index initialized in memory");
        }

        Ok(Self {
            root,
            indexes: RwLock::new(HashMap::new()),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            root: None,
            indexes: RwLock::new(HashMap::new()),
        }
    }

    fn path_for(&self, index: &str) -> Option<PathBuf> {
        self.root.as_ref().map(|root| root.join(index))
    }

    /// Loaded index, opening it from disk on first use
    fn get(&self, index: &str) -> Result<Option<Arc<LocalIndex>>> {
        if let Some(local) = self.indexes.read().map_err(lock_poisoned)?.get(index) {
            return Ok(Some(local.clone()));
        }

        let Some(path) = self.path_for(index) else {
            return Ok(None);
        };
        if !path.join("meta.json").exists() {
            return Ok(None);
        }

        let mut indexes = self.indexes.write().map_err(lock_poisoned)?;
        if let Some(local) = indexes.get(index) {
            return Ok(Some(local.clone()));
        }
        let local = Arc::new(LocalIndex::open(&path)?);
        indexes.insert(index.to_string(), local.clone());
        Ok(Some(local))
    }

    fn require(&self, index: &str) -> Result<Arc<LocalIndex>> {
        self.get(index)?
            .ok_or_else(|| Error::Search(format!("no such index [{index}]")))
    }
}

#[async_trait]
impl SearchBackend for EmbeddedIndex {
    fn kind(&self) -> &'static str {
        "embedded"
    }

    async fn ping(&self) -> Result<bool> {
        Ok(true)
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        Ok(self.get(index)?.is_some())
    }

    async fn create_index(&self, index: &str, mapping: &IndexMapping) -> Result<()> {
        if self.get(index)?.is_some() {
            debug!("Index {} already exists", index);
            return Ok(());
        }

        let mut indexes = self.indexes.write().map_err(lock_poisoned)?;
        if indexes.contains_key(index) {
            return Ok(());
        }
        let local = LocalIndex::create(self.path_for(index).as_deref(), mapping)?;
        indexes.insert(index.to_string(), Arc::new(local));
        info!("Created embedded index: {}", index);
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        let removed = self.indexes.write().map_err(lock_poisoned)?.remove(index);
        drop(removed);

        if let Some(path) = self.path_for(index) {
            if path.exists() {
                std::fs::remove_dir_all(&path)?;
            }
        }
        info!("Deleted embedded index: {}", index);
        Ok(())
    }

    async fn upsert_document(&self, index: &str, id: &str, doc: &SearchDocument) -> Result<()> {
        debug!("Indexing document {} in {}", id, index);
        self.require(index)?.upsert(id, doc)
    }

    async fn delete_document(&self, index: &str, id: &str) -> Result<()> {
        match self.get(index)? {
            Some(local) => local.delete(id),
            None => Ok(()),
        }
    }

    async fn search(&self, index: &str, request: &SearchRequest) -> Result<SearchHits> {
        self.require(index)?.search(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::query;
    use chrono::{Duration, Utc};
    use tempfile::tempdir;

    fn doc(title: &str, ingredients: &[&str], minutes_ago: i64) -> SearchDocument {
        let at = Utc::now() - Duration::minutes(minutes_ago);
        let recipe = crate::db::models::Recipe {
            id: 0,
            title: title.to_string(),
            ingredients: ingredients.iter().map(|s| s.to_string()).collect(),
            steps: vec!["cook".to_string()],
            created_at: at,
            updated_at: at,
            score: None,
        };
        SearchDocument::from(&recipe)
    }

    async fn seeded() -> EmbeddedIndex {
        let backend = EmbeddedIndex::in_memory();
        backend
            .create_index("recipes", &IndexMapping::recipes())
            .await
            .unwrap();
        backend
            .upsert_document("recipes", "1", &doc("Tomato Soup", &["tomato", "cream"], 30))
            .await
            .unwrap();
        backend
            .upsert_document("recipes", "2", &doc("Chicken Curry", &["chicken", "rice"], 20))
            .await
            .unwrap();
        backend
            .upsert_document("recipes", "3", &doc("Pancakes", &["egg", "flour", "milk"], 10))
            .await
            .unwrap();
        backend
    }

    fn ids(hits: &SearchHits) -> Vec<&str> {
        hits.hits.iter().map(|h| h.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_create_index_is_idempotent() {
        let backend = EmbeddedIndex::in_memory();
        assert!(!backend.index_exists("recipes").await.unwrap());
        backend
            .create_index("recipes", &IndexMapping::recipes())
            .await
            .unwrap();
        backend
            .create_index("recipes", &IndexMapping::recipes())
            .await
            .unwrap();
        assert!(backend.index_exists("recipes").await.unwrap());
    }

    #[tokio::test]
    async fn test_match_all_sorted_newest_first() {
        let backend = seeded().await;
        let hits = backend
            .search("recipes", &SearchRequest::match_all(10))
            .await
            .unwrap();
        assert_eq!(hits.total, 3);
        assert_eq!(ids(&hits), vec!["3", "2", "1"]);
    }

    #[tokio::test]
    async fn test_size_limits_hits_not_total() {
        let backend = seeded().await;
        let hits = backend
            .search("recipes", &SearchRequest::match_all(2))
            .await
            .unwrap();
        assert_eq!(hits.total, 3);
        assert_eq!(ids(&hits), vec!["3", "2"]);
    }

    #[tokio::test]
    async fn test_equal_scores_prefer_newest() {
        let backend = seeded().await;
        backend
            .upsert_document("recipes", "4", &doc("Tomato Soup", &["tomato", "cream"], 5))
            .await
            .unwrap();

        let request = SearchRequest::new(query::build("soup", ""), 1);
        let hits = backend.search("recipes", &request).await.unwrap();
        assert_eq!(hits.total, 2);
        assert_eq!(ids(&hits), vec!["4"]);
    }

    #[tokio::test]
    async fn test_free_text_tolerates_misspelling() {
        let backend = seeded().await;
        let request = SearchRequest::new(query::build("tomatto", ""), 10);
        let hits = backend.search("recipes", &request).await.unwrap();
        assert_eq!(ids(&hits), vec!["1"]);
        assert!(hits.hits[0].score.unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_ingredient_filters_are_conjunctive() {
        let backend = seeded().await;
        let request = SearchRequest::new(query::build("", "Egg, flour"), 10);
        let hits = backend.search("recipes", &request).await.unwrap();
        assert_eq!(ids(&hits), vec!["3"]);

        let request = SearchRequest::new(query::build("", "egg, rice"), 10);
        let hits = backend.search("recipes", &request).await.unwrap();
        assert!(hits.hits.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_document() {
        let backend = seeded().await;
        backend
            .upsert_document("recipes", "1", &doc("Gazpacho", &["tomato"], 30))
            .await
            .unwrap();

        let hits = backend
            .search("recipes", &SearchRequest::match_all(10))
            .await
            .unwrap();
        assert_eq!(hits.total, 3);

        let request = SearchRequest::new(query::build("soup", ""), 10);
        assert!(backend.search("recipes", &request).await.unwrap().hits.is_empty());
    }

    #[tokio::test]
    async fn test_delete_document_and_missing_index() {
        let backend = seeded().await;
        backend.delete_document("recipes", "2").await.unwrap();
        backend.delete_document("recipes", "404").await.unwrap();
        backend.delete_document("other", "1").await.unwrap();

        let hits = backend
            .search("recipes", &SearchRequest::match_all(10))
            .await
            .unwrap();
        assert_eq!(ids(&hits), vec!["3", "1"]);

        assert!(backend
            .search("other", &SearchRequest::match_all(10))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_on_disk_index_reopens() {
        let dir = tempdir().unwrap();
        {
            let backend = EmbeddedIndex::new(Some(dir.path().to_path_buf())).unwrap();
            backend
                .create_index("recipes", &IndexMapping::recipes())
                .await
                .unwrap();
            backend
                .upsert_document("recipes", "1", &doc("Tomato Soup", &["tomato"], 1))
                .await
                .unwrap();
        }

        let backend = EmbeddedIndex::new(Some(dir.path().to_path_buf())).unwrap();
        assert!(backend.index_exists("recipes").await.unwrap());
        let hits = backend
            .search("recipes", &SearchRequest::match_all(10))
            .await
            .unwrap();
        assert_eq!(ids(&hits), vec!["1"]);

        backend.delete_index("recipes").await.unwrap();
        assert!(!backend.index_exists("recipes").await.unwrap());
    }
}
