//! Query parsing, planning, execution, and projection.
//!
//! A query string goes through [`parse_query`] into a [`Query`] AST, is
//! planned into postings lookups by [`QueryPlan`], evaluated by
//! [`QueryExecutor`], and finally projected into a [`ResultSet`].

pub mod executor;
pub mod parser;
pub mod planner;
pub mod projector;

pub use executor::QueryExecutor;
pub use parser::{BooleanQuery, Query, QueryNode, parse_query};
pub use planner::{PlanStep, QueryPlan};
pub use projector::{ResultSet, find, project};
