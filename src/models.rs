//! Core Data Models
//!
//! This module defines the data structures flowing through the overlay engine.
//!
//! ## Data Flow
//!
//! 1. **Remote payloads**: [`UsageSnapshot`] - per-model usage totals pushed
//!    or pulled from the background collaborator
//! 2. **Catalog**: [`ModelCatalog`] - immutable model ordering and token caps,
//!    derived once from the remote configuration
//! 3. **Presentation**: section and header view state lives in
//!    [`crate::overlay`]
//!
//! ## Features
//!
//! - **Serde Integration**: wire types use the collaborator's camelCase names
//! - **Optional Fields**: missing per-model data and reset timestamps are
//!   handled gracefully
//! - **Cap Fallback**: unknown models resolve to the `default` cap

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The model identifier used as detection fallback and cap fallback.
pub const DEFAULT_MODEL: &str = "default";

/// Point-in-time usage payload covering all tracked models, plus the token
/// length of the current conversation when the collaborator knows it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageSnapshot {
    #[serde(rename = "conversationLength", skip_serializing_if = "Option::is_none")]
    pub conversation_length: Option<u64>,
    #[serde(rename = "modelData", default)]
    pub model_data: HashMap<String, ModelUsage>,
}

/// Raw counters for a single model within a snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelUsage {
    #[serde(default)]
    pub total: u64,
    #[serde(rename = "messageCount", default)]
    pub message_count: u64,
    /// Epoch millis of the next usage reset, when the collaborator has one.
    #[serde(rename = "resetTimestamp", skip_serializing_if = "Option::is_none")]
    pub reset_timestamp: Option<i64>,
}

/// Ordered model list plus per-model token caps, immutable for the page
/// lifetime. Built from the remote configuration during bootstrap.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: Vec<String>,
    caps: HashMap<String, u64>,
}

impl ModelCatalog {
    pub fn new(models: Vec<String>, caps: HashMap<String, u64>) -> Self {
        Self { models, caps }
    }

    /// Tracked models in configured order.
    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Models eligible for detection matching, in configured order. The
    /// `default` entry is a fallback, never a match target.
    pub fn detectable_models(&self) -> impl Iterator<Item = &String> {
        self.models.iter().filter(|m| *m != DEFAULT_MODEL)
    }

    /// Token cap for a model, falling back to the `default` cap.
    pub fn cap_for(&self, model: &str) -> u64 {
        self.caps
            .get(model)
            .or_else(|| self.caps.get(DEFAULT_MODEL))
            .copied()
            .unwrap_or(0)
    }
}

/// Result of the persisted-version check run once during bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionNotice {
    /// None on a first install.
    pub previous: Option<String>,
    pub current: String,
}
