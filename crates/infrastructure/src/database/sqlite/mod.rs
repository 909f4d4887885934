pub mod sqlite_job_repository;
pub mod sqlite_record_repository;
pub mod sqlite_taxonomy_repository;

pub use sqlite_job_repository::SqliteJobRepository;
pub use sqlite_record_repository::SqliteRecordRepository;
pub use sqlite_taxonomy_repository::SqliteTaxonomyRepository;
