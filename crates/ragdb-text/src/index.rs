use anyhow::Result;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::tokenizer::TokenStream;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::debug;

use ragdb_core::types::{Passage, SearchHit, SourceKind};

use crate::tantivy_utils::{build_schema, register_tokenizer};

const WRITER_HEAP_BYTES: usize = 50_000_000;

/// In-RAM tantivy index scoring passages with BM25.
pub struct Bm25Index {
	index: Index,
	reader: IndexReader,
	id_field: Field,
	ord_field: Field,
	text_field: Field,
	doc_count: usize,
}

impl Bm25Index {
	pub fn build(passages: &[Passage]) -> Result<Self> {
		let schema = build_schema();
		let index = Index::create_in_ram(schema.clone());
		register_tokenizer(&index);
		let id_field = schema.get_field("id")?;
		let ord_field = schema.get_field("ord")?;
		let text_field = schema.get_field("text")?;

		// Single indexing thread keeps one segment with doc ids in store order.
		let mut writer: IndexWriter = index.writer_with_num_threads(1, WRITER_HEAP_BYTES)?;
		for (ord, p) in passages.iter().enumerate() {
			writer.add_document(doc!(
				id_field => p.id.clone(),
				ord_field => ord as u64,
				text_field => p.text.clone(),
			))?;
		}
		writer.commit()?;

		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
		debug!(docs = passages.len(), "bm25 index built");
		Ok(Self { index, reader, id_field, ord_field, text_field, doc_count: passages.len() })
	}

	pub fn len(&self) -> usize { self.doc_count }

	pub fn is_empty(&self) -> bool { self.doc_count == 0 }

	/// Tokens produced by the index analyzer for `text`.
	pub fn analyze(&self, text: &str) -> Result<Vec<String>> {
		let mut analyzer = self.index.tokenizer_for_field(self.text_field)?;
		let mut stream = analyzer.token_stream(text);
		let mut tokens = Vec::new();
		stream.process(&mut |t| tokens.push(t.text.clone()));
		Ok(tokens)
	}

	/// Top `k` passages by BM25, ordered by score then store ordinal. Hits
	/// scoring zero or less are dropped.
	pub fn search(&self, query: &str, k: usize) -> Result<Vec<(usize, SearchHit)>> {
		if k == 0 || self.doc_count == 0 {
			return Ok(Vec::new());
		}
		let tokens = self.analyze(query)?;
		if tokens.is_empty() {
			return Ok(Vec::new());
		}
		let clauses: Vec<(Occur, Box<dyn Query>)> = tokens
			.iter()
			.map(|t| {
				let term = Term::from_field_text(self.text_field, t);
				(Occur::Should, Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)) as Box<dyn Query>)
			})
			.collect();
		let q = BooleanQuery::new(clauses);

		let searcher = self.reader.searcher();
		let top_docs = searcher.search(&q, &TopDocs::with_limit(k))?;
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			if score <= 0.0 {
				continue;
			}
			let doc: TantivyDocument = searcher.doc(addr)?;
			let id = doc.get_first(self.id_field).and_then(|v| v.as_str()).unwrap_or("").to_string();
			let ord = doc.get_first(self.ord_field).and_then(|v| v.as_u64()).unwrap_or(u64::MAX) as usize;
			hits.push((ord, SearchHit { id, score, source: SourceKind::Sparse }));
		}
		hits.sort_by(|a, b| b.1.score.total_cmp(&a.1.score).then(a.0.cmp(&b.0)));
		Ok(hits)
	}
}
