use arrow_array::{ArrayRef, BooleanArray, Float64Array, RecordBatch, RecordBatchIterator, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use std::collections::HashMap;
use std::sync::Arc;

use flixdb_core::traits::VectorStore;
use flixdb_core::types::{DocId, Document, Filter, IndexSchema, Predicate, VectorHit};
use flixdb_core::{Error, Result};

use crate::flat::by_distance_then_id;
use crate::schema::{build_document_schema, dim_i32, numeric_column, tag_column};
use crate::table::{ensure_table, f32_col, f64_col, id_in, open_db, quote, string_col, vector_col, vectors_array};

/// Document store on a LanceDB table named after the index schema.
pub struct LanceVectorStore {
    db: Connection,
    schema: IndexSchema,
}

impl LanceVectorStore {
    pub async fn open(uri: &str, schema: IndexSchema) -> Result<Self> {
        let db = open_db(uri).await?;
        ensure_table(&db, &schema.name, build_document_schema(&schema)).await?;
        Ok(Self { db, schema })
    }

    async fn table(&self) -> Result<Table> {
        self.db.open_table(&self.schema.name).execute().await.map_err(Error::index)
    }

    fn to_record_batch(&self, docs: &[Document]) -> Result<RecordBatch> {
        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(docs.iter().map(|d| d.id.clone()).collect::<Vec<_>>())),
            Arc::new(StringArray::from(docs.iter().map(|d| d.title.clone()).collect::<Vec<_>>())),
            Arc::new(StringArray::from(docs.iter().map(|d| d.body.clone()).collect::<Vec<_>>())),
        ];
        for tag in &self.schema.tag_fields {
            columns.push(Arc::new(StringArray::from(
                docs.iter().map(|d| d.tag(tag).map(str::to_string)).collect::<Vec<Option<String>>>(),
            )));
        }
        for num in &self.schema.numeric_fields {
            columns.push(Arc::new(Float64Array::from(docs.iter().map(|d| d.numeric(num)).collect::<Vec<_>>())));
        }
        columns.push(Arc::new(BooleanArray::from(docs.iter().map(|d| d.embedding.is_some()).collect::<Vec<_>>())));
        columns.push(Arc::new(vectors_array(
            docs.iter().map(|d| d.embedding.clone()).collect(),
            dim_i32(self.schema.dim),
        )));
        RecordBatch::try_new(build_document_schema(&self.schema), columns).map_err(Error::index)
    }

    fn from_batch(&self, batch: &RecordBatch, row: usize) -> Result<Document> {
        let mut doc = Document::new(
            string_col(batch, "id", row)?.unwrap_or_default(),
            string_col(batch, "title", row)?.unwrap_or_default(),
            string_col(batch, "body", row)?.unwrap_or_default(),
        );
        for tag in &self.schema.tag_fields {
            if let Some(v) = string_col(batch, &tag_column(tag), row)? {
                doc.tags.insert(tag.clone(), v);
            }
        }
        for num in &self.schema.numeric_fields {
            if let Some(v) = f64_col(batch, &numeric_column(num), row)? {
                doc.numerics.insert(num.clone(), v);
            }
        }
        doc.embedding = vector_col(batch, row)?;
        Ok(doc)
    }

    /// SQL predicate for the filter plus the embedding guard.
    fn predicate(&self, filter: &Filter) -> String {
        let mut parts = vec!["has_embedding = true".to_string()];
        for p in &filter.predicates {
            parts.push(match p {
                Predicate::TagEq { field, value } => format!("{} = {}", tag_column(field), quote(value)),
                Predicate::NumGte { field, value } => format!("{} >= {}", numeric_column(field), value),
                Predicate::NumLte { field, value } => format!("{} <= {}", numeric_column(field), value),
            });
        }
        parts.join(" AND ")
    }

    async fn search(&self, query: &[f32], k: usize, predicate: String) -> Result<Vec<VectorHit>> {
        if k == 0 {
            return Ok(vec![]);
        }
        let table = self.table().await?;
        let mut stream = table
            .vector_search(query.to_vec())
            .map_err(Error::index)?
            .distance_type(DistanceType::Cosine)
            .only_if(predicate)
            .limit(k)
            .execute()
            .await
            .map_err(Error::index)?;
        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(Error::index)? {
            for row in 0..batch.num_rows() {
                let distance = f32_col(&batch, "_distance", row)?;
                hits.push(VectorHit { document: self.from_batch(&batch, row)?, distance });
            }
        }
        hits.sort_by(by_distance_then_id);
        Ok(hits)
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn upsert(&self, docs: &[Document]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        let batch = self.to_record_batch(docs)?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        let table = self.table().await?;
        let mut mi = table.merge_insert(&["id"]);
        mi.when_matched_update_all(None).when_not_matched_insert_all();
        mi.execute(reader).await.map_err(Error::index)?;
        Ok(())
    }

    async fn knn(&self, query: &[f32], k: usize, filter: &Filter) -> Result<Vec<VectorHit>> {
        self.search(query, k, self.predicate(filter)).await
    }

    async fn distances(&self, query: &[f32], ids: &[DocId]) -> Result<HashMap<DocId, f32>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let predicate = format!("{} AND {}", self.predicate(&Filter::none()), id_in(ids));
        let hits = self.search(query, ids.len(), predicate).await?;
        Ok(hits.into_iter().map(|h| (h.document.id, h.distance)).collect())
    }

    async fn fetch(&self, ids: &[DocId]) -> Result<Vec<Document>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let table = self.table().await?;
        let mut stream = table.query().only_if(id_in(ids)).execute().await.map_err(Error::index)?;
        let mut by_id = HashMap::new();
        while let Some(batch) = stream.try_next().await.map_err(Error::index)? {
            for row in 0..batch.num_rows() {
                let doc = self.from_batch(&batch, row)?;
                by_id.insert(doc.id.clone(), doc);
            }
        }
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn count(&self) -> Result<usize> {
        self.table().await?.count_rows(None).await.map_err(Error::index)
    }

    async fn clear(&self) -> Result<()> {
        self.table().await?.delete("true").await.map_err(Error::index)?;
        Ok(())
    }
}
