//! Vector-index sidecar using LanceDB for Level-4 semantic matching
//!
//! Pure enhancement: the engine works without it, and every failure here is
//! absorbed by the cascade rather than surfaced to callers.

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lance_arrow::FixedSizeListArrayExt;
use lancedb::connect;
use lancedb::query::{ExecutableQuery, QueryBase};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::record::MemoryRecord;

const TABLE_NAME: &str = "lessons";

/// A nearest-neighbour hit: the memory id plus cosine similarity.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: Uuid,
    pub score: f32,
}

/// Vector storage backend sitting next to a SQLite store
pub struct VectorStorage {
    db: lancedb::Connection,
    dimensions: usize,
}

impl VectorStorage {
    /// Open (or create) the sidecar at `path`.
    pub async fn open(path: &std::path::Path, dimensions: usize) -> Result<Self> {
        std::fs::create_dir_all(path)?;
        let path_str = path
            .to_str()
            .ok_or_else(|| Error::backend("vector path is not valid UTF-8"))?;
        let db = connect(path_str)
            .execute()
            .await
            .map_err(|e| Error::backend(e.to_string()))?;

        let storage = Self { db, dimensions };
        storage.ensure_table().await?;
        Ok(storage)
    }

    /// Get the schema for the lessons table
    fn schema(&self) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("domain", DataType::Utf8, false),
            Field::new("signature", DataType::Utf8, false),
            Field::new("lesson", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimensions as i32,
                ),
                false,
            ),
        ])
    }

    async fn ensure_table(&self) -> Result<()> {
        let tables = self
            .db
            .table_names()
            .execute()
            .await
            .map_err(|e| Error::backend(e.to_string()))?;

        if !tables.contains(&TABLE_NAME.to_string()) {
            let schema = Arc::new(self.schema());
            let empty_batch = RecordBatch::new_empty(schema.clone());
            let reader = RecordBatchIterator::new(vec![empty_batch].into_iter().map(Ok), schema);

            self.db
                .create_table(TABLE_NAME, Box::new(reader))
                .execute()
                .await
                .map_err(|e| Error::backend(e.to_string()))?;
        }

        Ok(())
    }

    /// Insert or replace a memory's embedding.
    ///
    /// `domain` is the global-store partition; local stores pass `""`.
    pub async fn upsert(
        &self,
        memory: &MemoryRecord,
        domain: &str,
        embedding: &[f32],
    ) -> Result<()> {
        if embedding.len() != self.dimensions {
            return Err(Error::backend(format!(
                "embedding dimension mismatch: expected {}, got {}",
                self.dimensions,
                embedding.len()
            )));
        }

        // Replace any stale row for this id
        let _ = self.delete(memory.id).await;

        let id_array = StringArray::from(vec![memory.id.to_string()]);
        let domain_array = StringArray::from(vec![domain.to_string()]);
        let signature_array = StringArray::from(vec![memory.error_signature.clone()]);
        let lesson_array = StringArray::from(vec![lesson_text(memory)]);

        let values = Float32Array::from(embedding.to_vec());
        let vector_array = FixedSizeListArray::try_new_from_values(values, self.dimensions as i32)
            .map_err(|e: arrow_schema::ArrowError| Error::backend(e.to_string()))?;

        let schema = Arc::new(self.schema());
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(id_array) as Arc<dyn Array>,
                Arc::new(domain_array),
                Arc::new(signature_array),
                Arc::new(lesson_array),
                Arc::new(vector_array),
            ],
        )
        .map_err(|e| Error::backend(e.to_string()))?;

        let reader = RecordBatchIterator::new(vec![batch].into_iter().map(Ok), schema);

        let table = self
            .db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| Error::backend(e.to_string()))?;

        table
            .add(Box::new(reader))
            .execute()
            .await
            .map_err(|e| Error::backend(e.to_string()))?;

        Ok(())
    }

    /// Remove a memory's embedding.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let table = self
            .db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| Error::backend(e.to_string()))?;

        table
            .delete(&format!("id = '{}'", id))
            .await
            .map_err(|e| Error::backend(e.to_string()))?;

        Ok(())
    }

    /// Nearest-neighbour search, filtered by minimum cosine similarity.
    pub async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        min_score: f32,
        domain: Option<&str>,
    ) -> Result<Vec<VectorHit>> {
        let table = self
            .db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e: lancedb::Error| Error::backend(e.to_string()))?;

        let mut query = table
            .vector_search(query_embedding.to_vec())
            .map_err(|e: lancedb::Error| Error::backend(e.to_string()))?
            .limit(limit);

        if let Some(domain) = domain {
            query = query.only_if(format!("domain = '{}'", domain.replace('\'', "''")));
        }

        let stream = query
            .execute()
            .await
            .map_err(|e: lancedb::Error| Error::backend(e.to_string()))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect::<Vec<RecordBatch>>()
            .await
            .map_err(|e: lancedb::Error| Error::backend(e.to_string()))?;

        let mut hits = Vec::new();

        for batch in batches {
            let id_col: &Arc<dyn Array> = batch
                .column_by_name("id")
                .ok_or_else(|| Error::backend("Missing id column"))?;
            let distance_col: &Arc<dyn Array> = batch
                .column_by_name("_distance")
                .ok_or_else(|| Error::backend("Missing _distance column"))?;

            let ids = id_col
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| Error::backend("id column is not StringArray"))?;
            let distances = distance_col
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| Error::backend("_distance column is not Float32Array"))?;

            for i in 0..batch.num_rows() {
                // Embeddings are unit-normalized, so squared L2 distance maps
                // to cosine similarity as 1 - d/2.
                let score = 1.0 - distances.value(i) / 2.0;

                if score >= min_score {
                    hits.push(VectorHit {
                        id: Uuid::parse_str(ids.value(i))
                            .map_err(|e| Error::backend(e.to_string()))?,
                        score,
                    });
                }
            }
        }

        Ok(hits)
    }
}

/// The text embedded for a memory: the lesson, not the volatile error.
pub fn lesson_text(memory: &MemoryRecord) -> String {
    let mut parts = vec![memory.error_signature.as_str()];
    if !memory.root_cause.is_empty() {
        parts.push(memory.root_cause.as_str());
    }
    if !memory.prevention_rule.is_empty() {
        parts.push(memory.prevention_rule.as_str());
    }
    parts.join("\n")
}
