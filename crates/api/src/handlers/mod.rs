pub mod bulk_labeling;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod queue;
pub mod taxonomies;
pub mod training;
