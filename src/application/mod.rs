// Application layer - Fetch planning, merging and the chart controller
pub mod archive_backend;
pub mod controller;
pub mod debouncer;
pub mod events;
pub mod fallback;
pub mod merge;
pub mod planner;
pub mod runtime;
pub mod statistics;
pub mod worker;
