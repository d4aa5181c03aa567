//! Tantivy-based search index module.
//!
//! Provides full-text search over the catalog with field boosting. Only
//! active products are indexed; the database stays the source of truth.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{BooleanQuery, BoostQuery, Occur, QueryParser};
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::models::{Collection, Product};

const BOOST_NAME: f32 = 10.0;
const BOOST_TAGS: f32 = 6.0;
const BOOST_COLLECTIONS: f32 = 5.0;
const BOOST_CATEGORY: f32 = 4.0;
const BOOST_DESCRIPTION: f32 = 2.0;

/// Deepest result a search may page to.
pub const MAX_SEARCH_OFFSET: usize = 10_000;

/// A matching product id and its relevance score.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub product_id: String,
    pub score: f32,
}

/// One page of hits plus the total number of matches.
#[derive(Debug, Clone, Default)]
pub struct SearchHits {
    pub hits: Vec<SearchResult>,
    pub total: usize,
}

struct SearchFields {
    product_id: Field,
    name: Field,
    description: Field,
    category: Field,
    tags: Field,
    collections: Field,
}

/// Tantivy search index for products.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Arc<RwLock<IndexWriter>>,
    fields: SearchFields,
}

impl SearchIndex {
    /// Create or open a search index at the specified path.
    pub fn open(index_path: &Path) -> Result<Self, AppError> {
        std::fs::create_dir_all(index_path)
            .map_err(|e| AppError::Search(format!("Failed to create index directory: {}", e)))?;

        let mut schema_builder = Schema::builder();
        let product_id = schema_builder.add_text_field("product_id", STRING | STORED);
        let name = schema_builder.add_text_field("name", TEXT);
        let description = schema_builder.add_text_field("description", TEXT);
        let category = schema_builder.add_text_field("category", TEXT);
        let tags = schema_builder.add_text_field("tags", TEXT);
        let collections = schema_builder.add_text_field("collections", TEXT);
        let schema = schema_builder.build();

        let fields = SearchFields {
            product_id,
            name,
            description,
            category,
            tags,
            collections,
        };

        let index = Index::open_in_dir(index_path)
            .or_else(|_| Index::create_in_dir(index_path, schema.clone()))
            .map_err(|e| AppError::Search(format!("Failed to open/create index: {}", e)))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e| AppError::Search(format!("Failed to create reader: {}", e)))?;

        let writer = index
            .writer(50_000_000) // 50MB buffer
            .map_err(|e| AppError::Search(format!("Failed to create writer: {}", e)))?;

        Ok(Self {
            index,
            reader,
            writer: Arc::new(RwLock::new(writer)),
            fields,
        })
    }

    /// Replace the index contents with the given catalog.
    pub async fn rebuild(&self, products: &[Product], collections: &[Collection]) -> Result<(), AppError> {
        let names = collection_names(collections);
        let mut writer = self.writer.write().await;

        writer.delete_all_documents()?;

        let mut indexed = 0;
        for product in products.iter().filter(|p| p.active) {
            writer.add_document(self.create_document(product, &names))?;
            indexed += 1;
        }

        writer.commit()?;
        self.reader.reload()?;

        tracing::info!("Search index rebuilt with {} products", indexed);
        Ok(())
    }

    /// Index or re-index one product. Inactive products are removed instead.
    pub async fn index_product(&self, product: &Product, collections: &[Collection]) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        let term = tantivy::Term::from_field_text(self.fields.product_id, &product.id);
        writer.delete_term(term);

        if product.active {
            let names = collection_names(collections);
            writer.add_document(self.create_document(product, &names))?;
        }
        writer.commit()?;

        self.reader.reload()?;
        Ok(())
    }

    pub async fn remove_product(&self, product_id: &str) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        let term = tantivy::Term::from_field_text(self.fields.product_id, product_id);
        writer.delete_term(term);
        writer.commit()?;

        self.reader.reload()?;
        Ok(())
    }

    /// Search the catalog. An empty query matches nothing.
    pub fn search(&self, query_str: &str, limit: usize, offset: usize) -> Result<SearchHits, AppError> {
        if offset > MAX_SEARCH_OFFSET {
            return Err(AppError::Validation(format!(
                "Search offset must be at most {}",
                MAX_SEARCH_OFFSET
            )));
        }
        if query_str.trim().is_empty() || limit == 0 {
            return Ok(SearchHits::default());
        }

        let searcher = self.reader.searcher();

        // Lenient parsing: shoppers type stray quotes and parentheses.
        let mut subqueries: Vec<(Occur, Box<dyn tantivy::query::Query>)> = Vec::new();
        let field_queries = [
            (self.fields.name, BOOST_NAME),
            (self.fields.tags, BOOST_TAGS),
            (self.fields.collections, BOOST_COLLECTIONS),
            (self.fields.category, BOOST_CATEGORY),
            (self.fields.description, BOOST_DESCRIPTION),
        ];
        for (field, boost) in field_queries {
            let field_parser = QueryParser::for_index(&self.index, vec![field]);
            let (field_query, _errors) = field_parser.parse_query_lenient(query_str);
            subqueries.push((Occur::Should, Box::new(BoostQuery::new(field_query, boost))));
        }
        let combined_query = BooleanQuery::new(subqueries);

        let (top_docs, total) = searcher
            .search(&combined_query, &(TopDocs::with_limit(limit.saturating_add(offset)), Count))
            .map_err(|e| AppError::Search(format!("Search failed: {}", e)))?;

        let hits = top_docs
            .into_iter()
            .skip(offset)
            .take(limit)
            .filter_map(|(score, doc_address)| {
                let doc: TantivyDocument = searcher.doc(doc_address).ok()?;
                let product_id = doc.get_first(self.fields.product_id)?.as_str()?.to_string();
                Some(SearchResult { product_id, score })
            })
            .collect();

        Ok(SearchHits { hits, total })
    }

    fn create_document(&self, product: &Product, collection_names: &HashMap<&str, &str>) -> TantivyDocument {
        let collections: Vec<&str> = product
            .collection_ids
            .iter()
            .filter_map(|id| collection_names.get(id.as_str()).copied())
            .collect();

        doc!(
            self.fields.product_id => product.id.clone(),
            self.fields.name => product.name.clone(),
            self.fields.description => product.description.clone().unwrap_or_default(),
            self.fields.category => product.category.clone(),
            self.fields.tags => product.tags.join(" "),
            self.fields.collections => collections.join(" ")
        )
    }
}

fn collection_names(collections: &[Collection]) -> HashMap<&str, &str> {
    collections
        .iter()
        .map(|c| (c.id.as_str(), c.name.as_str()))
        .collect()
}
