pub mod db;
pub mod sql_query;

pub use db::DbAdapter;
pub use sql_query::SqlSelect;
