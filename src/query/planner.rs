use crate::index::types::KEY_FIELD;
use crate::query::parser::{BooleanQuery, Query, QueryNode};
use crate::utils::analyze;

/// Query execution plan
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub root: PlanStep,
}

/// Individual plan step
#[derive(Debug, Clone, PartialEq)]
pub enum PlanStep {
    /// Every live document
    All,
    /// No document
    Nothing,
    /// Documents whose key is exactly this
    KeyLookup(String),
    /// Documents whose key starts with this
    KeyPrefix(String),
    /// Postings for one analyzed token in one field
    TermLookup { field: String, token: String },
    /// Union of postings for every token in the field with this prefix
    TermPrefix { field: String, prefix: String },
    /// Intersect the tokens' postings, then verify the sequence against the stored field
    Phrase { field: String, tokens: Vec<String> },
    Union(Vec<PlanStep>),
    Intersect(Vec<PlanStep>),
    /// `include` minus the union of `exclude`
    Exclude {
        include: Box<PlanStep>,
        exclude: Vec<PlanStep>,
    },
}

impl QueryPlan {
    /// Create a query plan from a parsed query.
    ///
    /// `fields` are the index's known fields; unqualified clauses expand to all of them.
    pub fn from_query(query: &Query, fields: &[String]) -> Self {
        let planner = QueryPlanner { fields };
        Self {
            root: planner.plan_node(&query.root),
        }
    }
}

/// Query planner
struct QueryPlanner<'a> {
    fields: &'a [String],
}

impl QueryPlanner<'_> {
    fn plan_node(&self, node: &QueryNode) -> PlanStep {
        match node {
            QueryNode::MatchAll => PlanStep::All,
            QueryNode::Term { field, value } | QueryNode::Phrase { field, value } => {
                self.per_field(field.as_deref(), |f| plan_value(f, value))
            }
            QueryNode::Prefix { field, prefix } => {
                self.per_field(field.as_deref(), |f| plan_prefix(f, prefix))
            }
            QueryNode::Boolean(boolean) => self.plan_boolean(boolean),
        }
    }

    /// Plan against one field, or the union over every known field
    fn per_field(&self, field: Option<&str>, plan: impl Fn(&str) -> PlanStep) -> PlanStep {
        match field {
            Some(field) => plan(field),
            None => union(self.fields.iter().map(|f| plan(f)).collect()),
        }
    }

    fn plan_boolean(&self, boolean: &BooleanQuery) -> PlanStep {
        let include = if !boolean.must.is_empty() {
            intersect(boolean.must.iter().map(|n| self.plan_node(n)).collect())
        } else if !boolean.should.is_empty() {
            union(boolean.should.iter().map(|n| self.plan_node(n)).collect())
        } else {
            // Only exclusions: start from everything
            PlanStep::All
        };

        let exclude: Vec<PlanStep> = boolean
            .must_not
            .iter()
            .map(|n| self.plan_node(n))
            .filter(|step| *step != PlanStep::Nothing)
            .collect();

        if exclude.is_empty() || include == PlanStep::Nothing {
            include
        } else {
            PlanStep::Exclude {
                include: Box::new(include),
                exclude,
            }
        }
    }
}

/// Plan a term or phrase value against a single field
fn plan_value(field: &str, value: &str) -> PlanStep {
    if field == KEY_FIELD {
        return PlanStep::KeyLookup(value.to_string());
    }

    let mut tokens = analyze(value);
    match tokens.len() {
        0 => PlanStep::Nothing,
        1 => PlanStep::TermLookup {
            field: field.to_string(),
            token: tokens.remove(0),
        },
        _ => PlanStep::Phrase {
            field: field.to_string(),
            tokens,
        },
    }
}

/// Plan a prefix value against a single field
fn plan_prefix(field: &str, prefix: &str) -> PlanStep {
    if field == KEY_FIELD {
        return PlanStep::KeyPrefix(prefix.to_string());
    }

    let mut tokens = analyze(prefix);
    let Some(last) = tokens.pop() else {
        // `field:*` matches any document with a term in the field
        return if prefix.is_empty() {
            PlanStep::TermPrefix {
                field: field.to_string(),
                prefix: String::new(),
            }
        } else {
            PlanStep::Nothing
        };
    };

    let mut steps: Vec<PlanStep> = tokens
        .into_iter()
        .map(|token| PlanStep::TermLookup {
            field: field.to_string(),
            token,
        })
        .collect();
    steps.push(PlanStep::TermPrefix {
        field: field.to_string(),
        prefix: last,
    });
    intersect(steps)
}

fn union(mut steps: Vec<PlanStep>) -> PlanStep {
    steps.retain(|s| *s != PlanStep::Nothing);
    if steps.contains(&PlanStep::All) {
        return PlanStep::All;
    }
    match steps.len() {
        0 => PlanStep::Nothing,
        1 => steps.remove(0),
        _ => PlanStep::Union(steps),
    }
}

fn intersect(mut steps: Vec<PlanStep>) -> PlanStep {
    if steps.contains(&PlanStep::Nothing) {
        return PlanStep::Nothing;
    }
    steps.retain(|s| *s != PlanStep::All);
    match steps.len() {
        0 => PlanStep::All,
        1 => steps.remove(0),
        _ => PlanStep::Intersect(steps),
    }
}
