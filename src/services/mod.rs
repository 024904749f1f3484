pub mod ai;
pub mod analyzer;
pub mod chat;
pub mod extractor;
pub mod report_service;
pub mod scoring;
