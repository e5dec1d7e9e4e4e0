use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

/// Columns of a chunk collection. `dim` is the embedder's dimensionality.
pub fn build_chunk_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("doc_id", DataType::Utf8, false),
		Field::new("doc_path", DataType::Utf8, false),
		Field::new("partition", DataType::Utf8, false),
		Field::new("source", DataType::Utf8, false),
		Field::new("content", DataType::Utf8, false),
		Field::new("content_hash", DataType::Utf8, false),
		Field::new("chunk_index", DataType::Int32, false),
		Field::new("total_chunks", DataType::Int32, false),
		Field::new("indexed_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}
