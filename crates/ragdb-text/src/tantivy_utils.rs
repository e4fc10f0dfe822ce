use tantivy::schema::{Schema, TextFieldIndexing, TextOptions, IndexRecordOption, STORED, STRING};
use tantivy::tokenizer::{TextAnalyzer, SimpleTokenizer, LowerCaser};
use tantivy::Index;

/// Analyzer shared by indexing and querying: split on non-alphanumerics, lower-case.
pub const ANALYZER: &str = "ragdb_simple_lower";

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	let _id_field = schema_builder.add_text_field("id", STRING | STORED);
	let _ord_field = schema_builder.add_u64_field("ord", STORED);
	let text_field_indexing = TextFieldIndexing::default().set_tokenizer(ANALYZER).set_index_option(IndexRecordOption::WithFreqs);
	let text_options = TextOptions::default().set_indexing_options(text_field_indexing);
	let _text_field = schema_builder.add_text_field("text", text_options);
	schema_builder.build()
}

pub fn register_tokenizer(index: &Index) {
	let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.build();
	index.tokenizers().register(ANALYZER, tokenizer);
}
