use crate::db::models::Recipe;
use crate::search::query::{self, StructuredQuery};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Write-only projection of a recipe held by the search index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub title: String,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub searchable_text: String,
}

impl From<&Recipe> for SearchDocument {
    fn from(recipe: &Recipe) -> Self {
        let searchable_text = std::iter::once(recipe.title.as_str())
            .chain(recipe.ingredients.iter().map(String::as_str))
            .chain(recipe.steps.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            title: recipe.title.clone(),
            ingredients: recipe.ingredients.clone(),
            steps: recipe.steps.clone(),
            created_at: recipe.created_at,
            updated_at: recipe.updated_at,
            searchable_text,
        }
    }
}

impl SearchDocument {
    /// Back to the API representation; `searchable_text` is dropped
    pub fn into_recipe(self, id: i64, score: f32) -> Recipe {
        Recipe {
            id,
            title: self.title,
            ingredients: self.ingredients,
            steps: self.steps,
            created_at: self.created_at,
            updated_at: self.updated_at,
            score: None,
        }
        .with_score(score)
    }

    /// Timestamp used as a sort key, by index field name
    pub fn date_field(&self, field: &str) -> Option<DateTime<Utc>> {
        match field {
            "createdAt" => Some(self.created_at),
            "updatedAt" => Some(self.updated_at),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Full text with the standard analyzer
    Text,
    Date,
}

/// Index schema, shared by every backend
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMapping {
    pub fields: Vec<(String, FieldKind)>,
}

impl IndexMapping {
    pub fn recipes() -> Self {
        let text = [
            query::TITLE_FIELD,
            query::INGREDIENTS_FIELD,
            query::STEPS_FIELD,
            query::SEARCHABLE_TEXT_FIELD,
        ];
        let dates = ["createdAt", "updatedAt"];

        let fields = text
            .iter()
            .map(|name| (name.to_string(), FieldKind::Text))
            .chain(dates.iter().map(|name| (name.to_string(), FieldKind::Date)))
            .collect();

        Self { fields }
    }

    /// Elasticsearch index creation body
    pub fn to_json(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, kind)| {
                let definition = match kind {
                    FieldKind::Text => json!({"type": "text", "analyzer": "standard"}),
                    FieldKind::Date => json!({"type": "date"}),
                };
                (name.clone(), definition)
            })
            .collect();

        json!({ "mappings": { "properties": properties } })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKey {
    /// Relevance, descending
    Score,
    /// Date field, descending
    FieldDesc(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: StructuredQuery,
    pub size: usize,
    pub sort: Vec<SortKey>,
}

impl SearchRequest {
    /// Relevance first, newest first among equal scores
    pub fn new(query: StructuredQuery, size: usize) -> Self {
        Self {
            query,
            size,
            sort: vec![SortKey::Score, SortKey::FieldDesc("createdAt".to_string())],
        }
    }

    pub fn match_all(size: usize) -> Self {
        Self::new(query::build("", ""), size)
    }

    /// Elasticsearch `_search` body
    pub fn to_json(&self) -> Value {
        let sort: Vec<Value> = self
            .sort
            .iter()
            .map(|key| match key {
                SortKey::Score => json!({"_score": {"order": "desc"}}),
                SortKey::FieldDesc(field) => {
                    let mut key = Map::new();
                    key.insert(field.clone(), json!({"order": "desc"}));
                    Value::Object(key)
                }
            })
            .collect();

        json!({
            "query": self.query,
            "size": self.size,
            "sort": sort,
            "track_total_hits": true,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub score: Option<f32>,
    pub source: SearchDocument,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchHits {
    pub total: u64,
    pub hits: Vec<SearchHit>,
}
