//! Client for the marketplace's brand/creator messaging API.
//!
//! [`api`] talks to the server, [`sync`] keeps conversation and message views
//! current by polling and merges optimistic sends, [`app`] and [`storage`]
//! hold configuration and the local conversation cache.

pub mod api;
pub mod app;
pub mod storage;
pub mod sync;
pub mod utils;
