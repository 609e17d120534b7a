use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

use flixdb_core::types::IndexSchema;

pub fn tag_column(field: &str) -> String {
    format!("tag_{field}")
}

pub fn numeric_column(field: &str) -> String {
    format!("num_{field}")
}

fn vector_field(dim: i32) -> Field {
    Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true)
}

/// Document table: fixed text columns, one column per tag/numeric field of
/// the index schema, and a nullable vector.
pub fn build_document_schema(schema: &IndexSchema) -> Arc<Schema> {
    let mut fields = vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("body", DataType::Utf8, false),
    ];
    for tag in &schema.tag_fields {
        fields.push(Field::new(tag_column(tag), DataType::Utf8, true));
    }
    for num in &schema.numeric_fields {
        fields.push(Field::new(numeric_column(num), DataType::Float64, true));
    }
    fields.push(Field::new("has_embedding", DataType::Boolean, false));
    fields.push(vector_field(dim_i32(schema.dim)));
    Arc::new(Schema::new(fields))
}

pub fn build_cache_schema(dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("prompt", DataType::Utf8, false),
        Field::new("response", DataType::Utf8, false),
        Field::new("created_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
        Field::new("ttl_secs", DataType::Int64, false),
        vector_field(dim_i32(dim)),
    ]))
}

pub fn dim_i32(dim: usize) -> i32 {
    i32::try_from(dim).unwrap_or(i32::MAX)
}
