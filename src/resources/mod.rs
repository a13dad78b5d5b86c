pub mod common;
pub mod statefulset;
pub mod upsert;
