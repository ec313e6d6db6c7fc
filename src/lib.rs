//! Screen memory: continuous capture, OCR, and a local search + assistant API.
//!
//! memri grabs each monitor on an adaptive interval, skips frames that did
//! not visibly change, OCRs every eligible window of the frames that did, and
//! stores the result in SQLite. A local HTTP API serves the timeline, keyword
//! search, chat history and an LLM assistant that answers with citations to
//! captures.
//!
//! # Pipeline
//!
//! | Stage | Module | Notes |
//! |-------|--------|-------|
//! | Grab | [`capture::platform`] | xcap behind the `screen-capture` feature |
//! | Change detection | [`capture::change_detection`] | histogram distance + SSIM |
//! | OCR | [`ocr`] | tesseract CLI or a stub engine |
//! | Persist | [`storage`] | one transaction per capture, then retention |
//! | Notify | [`events`] | broadcast to `/events` subscribers |
//!
//! # Modules
//!
//! - [`config`]: TOML config plus `MEMRI_*` environment overrides
//! - [`db`]: SQLite open, schema, migrations, and health checks
//! - [`storage`]: captures, search, chat history, retention, stats
//! - [`capture`]: the per-monitor capture loop
//! - [`ocr`]: text recognition engines
//! - [`assistant`]: Anthropic client, capture context, stream relay
//! - [`server`]: the axum HTTP API
//! - [`seed`]: seeding from a folder of screenshots

pub mod assistant;
pub mod capture;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod ocr;
pub mod seed;
pub mod server;
pub mod storage;
