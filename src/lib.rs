//! CPF Lookup API Library
//!
//! This library provides CPF validation, the Work API client, the sequential
//! batch lookup workflow with income classification, registered-entry storage
//! (JSON file or Postgres), batch jobs, text reports and the HTTP handlers.
//!
//! # Modules
//!
//! - `api`: API definitions.
//! - `core`: Core business logic.
//! - `data`: Data access layer.
//! - `integrations`: External service integrations.
//! - `batch`: Sequential batch lookup workflow.
//! - `config`: Configuration management.
//! - `cpf`: CPF normalization and check-digit validation.
//! - `db`: Database connection and schema setup.
//! - `db_storage`: Postgres entry repository.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `jobs`: Batch job queue and registry.
//! - `lookup`: Lookup trait and upstream-to-record mapping.
//! - `models`: Core data models.
//! - `report`: Plain-text report rendering.
//! - `services`: Work API client.
//! - `storage`: Entry repository trait, file and in-memory backends.

pub mod api;
pub mod core;
pub mod data;
pub mod integrations;

// Re-export primary modules for shared use in tests and other binaries
pub mod batch;
pub mod config;
pub mod cpf;
pub mod db;
pub mod db_storage;
pub mod errors;
pub mod handlers;
pub mod jobs;
pub mod lookup;
pub mod models;
pub mod report;
pub mod services;
pub mod storage;
