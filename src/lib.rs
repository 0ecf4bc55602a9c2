//! tzcheck - defect annotation for technical-specification documents.
//!
//! A DOCX is converted to HTML and Markdown, analysed by a fan-out of LLM
//! prompts, and every finding the LLM anchors to a quote is wrapped in the
//! HTML with an `error-id` marker. Runs, findings and user feedback are stored
//! in SQLite.

pub mod annotate;
pub mod cli;
pub mod config;
pub mod findings;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod repository;
pub mod schema;
pub mod service;
pub mod services;
pub mod storage;
pub mod text;
