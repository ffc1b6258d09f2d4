//! Structured query construction.
//!
//! [`build`] is pure: the same `(q, ingredients)` always yields the same query,
//! and its JSON form is the Elasticsearch query DSL.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

pub const TITLE_FIELD: &str = "title";
pub const INGREDIENTS_FIELD: &str = "ingredients";
pub const STEPS_FIELD: &str = "steps";
pub const SEARCHABLE_TEXT_FIELD: &str = "searchable_text";

const TITLE_BOOST: f32 = 2.0;
const INGREDIENTS_BOOST: f32 = 1.5;
const STEPS_BOOST: f32 = 1.0;
const SEARCHABLE_TEXT_BOOST: f32 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuredQuery {
    MatchAll(MatchAll),
    Bool(BoolQuery),
    MultiMatch(MultiMatch),
    Match(FieldMatch),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchAll {}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoolQuery {
    pub must: Vec<StructuredQuery>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiMatch {
    pub query: String,
    pub fields: Vec<BoostedField>,
    #[serde(rename = "type")]
    pub match_type: MatchType,
    pub fuzziness: Fuzziness,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Score of the best matching field wins
    BestFields,
}

/// Edit-distance tolerance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Fuzziness {
    /// Scaled to term length: 0 edits up to 2 chars, 1 up to 5, 2 beyond
    #[serde(rename = "AUTO")]
    Auto,
}

impl Fuzziness {
    pub fn edits_for(self, term: &str) -> u8 {
        match self {
            Fuzziness::Auto => match term.chars().count() {
                0..=2 => 0,
                3..=5 => 1,
                _ => 2,
            },
        }
    }
}

/// Field name with relevance weight, serialized as `field^boost`
#[derive(Debug, Clone, PartialEq)]
pub struct BoostedField {
    pub field: String,
    pub boost: f32,
}

impl BoostedField {
    pub fn new(field: &str, boost: f32) -> Self {
        Self {
            field: field.to_string(),
            boost,
        }
    }
}

impl Serialize for BoostedField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.boost == 1.0 {
            serializer.serialize_str(&self.field)
        } else {
            serializer.serialize_str(&format!("{}^{}", self.field, self.boost))
        }
    }
}

/// Single-field fuzzy match, serialized as `{field: {query, fuzziness}}`
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMatch {
    pub field: String,
    pub query: String,
    pub fuzziness: Fuzziness,
}

impl Serialize for FieldMatch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Params<'a> {
            query: &'a str,
            fuzziness: Fuzziness,
        }

        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(
            &self.field,
            &Params {
                query: &self.query,
                fuzziness: self.fuzziness,
            },
        )?;
        map.end()
    }
}

/// Split a comma-separated ingredient filter into trimmed, lower-cased terms
pub fn parse_ingredients(ingredients: &str) -> Vec<String> {
    ingredients
        .split(',')
        .map(|term| term.trim().to_lowercase())
        .filter(|term| !term.is_empty())
        .collect()
}

/// Build the query for a free-text string plus an ingredient filter
pub fn build(q: &str, ingredients: &str) -> StructuredQuery {
    let q = q.trim();
    let mut must = Vec::new();

    if !q.is_empty() {
        must.push(StructuredQuery::MultiMatch(MultiMatch {
            query: q.to_string(),
            fields: vec![
                BoostedField::new(TITLE_FIELD, TITLE_BOOST),
                BoostedField::new(INGREDIENTS_FIELD, INGREDIENTS_BOOST),
                BoostedField::new(STEPS_FIELD, STEPS_BOOST),
                BoostedField::new(SEARCHABLE_TEXT_FIELD, SEARCHABLE_TEXT_BOOST),
            ],
            match_type: MatchType::BestFields,
            fuzziness: Fuzziness::Auto,
        }));
    }

    for ingredient in parse_ingredients(ingredients) {
        must.push(StructuredQuery::Match(FieldMatch {
            field: INGREDIENTS_FIELD.to_string(),
            query: ingredient,
            fuzziness: Fuzziness::Auto,
        }));
    }

    if must.is_empty() {
        StructuredQuery::MatchAll(MatchAll {})
    } else {
        StructuredQuery::Bool(BoolQuery { must })
    }
}
