pub mod sqlite_account_provider;
pub mod sqlite_article_store;
pub mod sqlite_execution_log_store;
pub mod sqlite_index_check_store;
pub mod sqlite_task_store;

pub use sqlite_account_provider::SqliteAccountProvider;
pub use sqlite_article_store::SqliteArticleStore;
pub use sqlite_execution_log_store::SqliteExecutionLogStore;
pub use sqlite_index_check_store::SqliteIndexCheckStore;
pub use sqlite_task_store::SqliteTaskStore;
