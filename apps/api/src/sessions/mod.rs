pub mod clusterer;
pub mod handlers;
pub mod store;
