use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::{BooleanQuery, ConstScoreQuery, Occur, Query, QueryParser, TermSetQuery};
use tantivy::schema::{Field, Value};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use flixdb_core::traits::TextIndexer;
use flixdb_core::types::{DocId, Document, SearchHit, SourceKind};
use flixdb_core::{Error, Result};

use crate::tantivy_utils::{build_schema, register_tokenizer};

const WRITER_HEAP_BYTES: usize = 50_000_000;

pub struct TantivyIndexer {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    id_field: Field,
    title_field: Field,
    body_field: Field,
}

impl TantivyIndexer {
    /// Opens the index under `index_dir`, creating it when missing.
    pub fn open_or_create(index_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(index_dir).map_err(Error::index)?;
        let dir = MmapDirectory::open(index_dir).map_err(Error::index)?;
        let index = Index::open_or_create(dir, build_schema()).map_err(Error::index)?;
        Self::from_index(index)
    }

    pub fn in_memory() -> Result<Self> {
        Self::from_index(Index::create_in_ram(build_schema()))
    }

    fn from_index(index: Index) -> Result<Self> {
        register_tokenizer(&index);
        let schema = index.schema();
        let id_field = schema.get_field("id").map_err(Error::index)?;
        let title_field = schema.get_field("title").map_err(Error::index)?;
        let body_field = schema.get_field("body").map_err(Error::index)?;
        let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into().map_err(Error::index)?;
        let writer = index.writer(WRITER_HEAP_BYTES).map_err(Error::index)?;
        Ok(Self { index, reader, writer: Mutex::new(writer), id_field, title_field, body_field })
    }

    fn parse(&self, query: &str) -> Box<dyn Query> {
        let qp = QueryParser::for_index(&self.index, vec![self.title_field, self.body_field]);
        let (q, errors) = qp.parse_query_lenient(query);
        if !errors.is_empty() {
            tracing::debug!(errors = errors.len(), "lenient query parse dropped terms");
        }
        q
    }

    fn collect(&self, query: &dyn Query, k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(vec![]);
        }
        let searcher = self.reader.searcher();
        let top_docs = searcher.search(query, &TopDocs::with_limit(k)).map_err(Error::index)?;
        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let doc: TantivyDocument = searcher.doc(addr).map_err(Error::index)?;
            let id = doc.get_first(self.id_field).and_then(|v| v.as_str()).unwrap_or("").to_string();
            hits.push(SearchHit { id, score, source: SourceKind::Text });
        }
        Ok(hits)
    }

    fn commit(&self, writer: &mut IndexWriter) -> Result<()> {
        writer.commit().map_err(Error::index)?;
        self.reader.reload().map_err(Error::index)
    }
}

impl TextIndexer for TantivyIndexer {
    fn index(&self, docs: &[Document]) -> Result<()> {
        let mut writer = self.writer.lock().map_err(|_| Error::index("text writer lock poisoned"))?;
        for d in docs {
            writer.delete_term(Term::from_field_text(self.id_field, &d.id));
            writer
                .add_document(doc!(
                    self.id_field => d.id.clone(),
                    self.title_field => d.title.clone(),
                    self.body_field => d.body.clone(),
                ))
                .map_err(Error::index)?;
        }
        self.commit(&mut writer)
    }

    fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let q = self.parse(query);
        self.collect(q.as_ref(), k)
    }

    fn score_ids(&self, query: &str, ids: &[DocId]) -> Result<HashMap<DocId, f32>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let terms: Vec<Term> = ids.iter().map(|id| Term::from_field_text(self.id_field, id)).collect();
        let restrict: Box<dyn Query> = Box::new(ConstScoreQuery::new(Box::new(TermSetQuery::new(terms)), 0.0));
        let q = BooleanQuery::new(vec![(Occur::Must, self.parse(query)), (Occur::Must, restrict)]);
        Ok(self.collect(&q, ids.len())?.into_iter().map(|h| (h.id, h.score)).collect())
    }

    fn clear(&self) -> Result<()> {
        let mut writer = self.writer.lock().map_err(|_| Error::index("text writer lock poisoned"))?;
        writer.delete_all_documents().map_err(Error::index)?;
        self.commit(&mut writer)
    }

    fn count(&self) -> Result<usize> {
        Ok(usize::try_from(self.reader.searcher().num_docs()).unwrap_or(usize::MAX))
    }
}
