use crate::error::{IndexError, Result};
use crate::index::reader::IndexReader;
use crate::index::types::SearchHit;
use crate::query::parser::Query;
use crate::query::planner::{PlanStep, QueryPlan};
use crate::utils::{analyze, contains_sequence};
use roaring::RoaringBitmap;

/// Query executor
pub struct QueryExecutor<'a> {
    reader: &'a IndexReader,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(reader: &'a IndexReader) -> Self {
        Self { reader }
    }

    /// Execute a query and return matches in ascending document order
    pub fn execute(&self, query: &Query, limit: Option<usize>) -> Result<Vec<SearchHit>> {
        let plan = QueryPlan::from_query(query, self.reader.fields());
        tracing::debug!(query = query.text(), ?plan, "planned query");

        let matches = self.execute_plan(&plan.root)?;
        let take = limit.unwrap_or(usize::MAX);

        let mut hits = Vec::with_capacity(matches.len().min(take as u64) as usize);
        for doc_id in matches.iter().take(take) {
            let doc = self.reader.document(doc_id)?.ok_or_else(|| {
                IndexError::corrupt(
                    self.reader.index_path(),
                    format!("document {doc_id} is listed but not stored"),
                )
            })?;
            hits.push(SearchHit {
                doc_id,
                key: doc.key,
                score: None,
            });
        }

        Ok(hits)
    }

    /// Evaluate a plan to the set of live documents it matches
    pub fn execute_plan(&self, step: &PlanStep) -> Result<RoaringBitmap> {
        let live = self.reader.live_docs();

        let docs = match step {
            PlanStep::All => live.clone(),
            PlanStep::Nothing => RoaringBitmap::new(),
            PlanStep::KeyLookup(key) => self.reader.key_docs(key) & live,
            PlanStep::KeyPrefix(prefix) => self.reader.key_prefix_docs(prefix) & live,
            PlanStep::TermLookup { field, token } => self.reader.term_docs(field, token) & live,
            PlanStep::TermPrefix { field, prefix } => {
                self.reader.term_prefix_docs(field, prefix) & live
            }
            PlanStep::Phrase { field, tokens } => self.execute_phrase(field, tokens)?,
            PlanStep::Union(steps) => {
                let mut union = RoaringBitmap::new();
                for step in steps {
                    union |= self.execute_plan(step)?;
                }
                union
            }
            PlanStep::Intersect(steps) => {
                let mut intersection: Option<RoaringBitmap> = None;
                for step in steps {
                    let docs = self.execute_plan(step)?;
                    let next = match intersection {
                        Some(existing) => existing & docs,
                        None => docs,
                    };
                    if next.is_empty() {
                        return Ok(next);
                    }
                    intersection = Some(next);
                }
                intersection.unwrap_or_default()
            }
            PlanStep::Exclude { include, exclude } => {
                let mut docs = self.execute_plan(include)?;
                for step in exclude {
                    if docs.is_empty() {
                        break;
                    }
                    docs -= self.execute_plan(step)?;
                }
                docs
            }
        };

        Ok(docs)
    }

    /// Narrow by every token, then check the tokens are consecutive in the stored value
    fn execute_phrase(&self, field: &str, tokens: &[String]) -> Result<RoaringBitmap> {
        // Rarest token first
        let mut by_freq: Vec<&String> = tokens.iter().collect();
        by_freq.sort_by_key(|token| self.reader.doc_freq(field, token));

        let mut candidates = self.reader.live_docs().clone();
        for token in by_freq {
            candidates &= self.reader.term_docs(field, token);
            if candidates.is_empty() {
                return Ok(candidates);
            }
        }

        let mut verified = RoaringBitmap::new();
        for doc_id in &candidates {
            let Some(doc) = self.reader.document(doc_id)? else {
                continue;
            };
            let matched = doc
                .field(field)
                .is_some_and(|value| contains_sequence(&analyze(value), tokens));
            if matched {
                verified.insert(doc_id);
            }
        }
        Ok(verified)
    }
}
