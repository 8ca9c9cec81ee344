pub mod api_types;
pub mod cache;
pub mod cached_client;
pub mod client;
pub mod types;

pub use cache::{BoardQueryKey, PageRequest};
pub use cached_client::BoardClient;
pub use client::{BoardApi, HttpBoardApi};
