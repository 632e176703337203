//! `sqlx::FromRow` row shapes. These are intentionally "dumb" — string/int
//! columns only — with conversion to/from `domain` types living in
//! `From`/`TryFrom` impls, keeping the row shape separate from the domain
//! type it represents.

pub mod job;
pub mod page;
pub mod token_stats;

pub use job::JobRow;
pub use page::PageRow;
pub use token_stats::TokenStatsRow;
