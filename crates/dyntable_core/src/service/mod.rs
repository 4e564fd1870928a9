//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate catalog and repository calls per dynamic-table operation.
//! - Keep the HTTP transport decoupled from storage details.

pub mod router;
pub mod table_service;
