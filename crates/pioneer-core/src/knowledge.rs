//! Knowledge-base plans and the lookup seam used by the workflow engine

use crate::error::{PioneerError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub type KbId = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticStep {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationStep {
    pub command: String,
}

/// Read-only plan: ordered diagnostics, then at most one remediation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeBaseItem {
    pub id: KbId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub diagnostics: Vec<DiagnosticStep>,
    #[serde(default)]
    pub remediation: Option<RemediationStep>,
}

impl KnowledgeBaseItem {
    pub fn new(id: impl Into<KbId>, diagnostics: Vec<&str>, remediation: Option<&str>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            diagnostics: diagnostics
                .into_iter()
                .map(|command| DiagnosticStep {
                    command: command.to_string(),
                    description: None,
                })
                .collect(),
            remediation: remediation.map(|command| RemediationStep {
                command: command.to_string(),
            }),
        }
    }

    pub fn diagnostic_command(&self, step: usize) -> Option<&str> {
        self.diagnostics.get(step).map(|s| s.command.as_str())
    }

    /// An empty remediation command counts as no remediation.
    pub fn remediation_command(&self) -> Option<&str> {
        self.remediation
            .as_ref()
            .map(|r| r.command.as_str())
            .filter(|c| !c.trim().is_empty())
    }
}

#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn lookup(&self, kb_id: &str) -> Result<Arc<KnowledgeBaseItem>>;
}

#[derive(Debug, Deserialize)]
struct KnowledgeBaseDocument {
    #[serde(default)]
    items: Vec<KnowledgeBaseItem>,
}

/// Knowledge base held in memory, optionally seeded from a JSON document of
/// the form `{"items": [...]}`.
#[derive(Debug, Default)]
pub struct FileKnowledgeBase {
    items: RwLock<HashMap<KbId, Arc<KnowledgeBaseItem>>>,
}

impl FileKnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: impl IntoIterator<Item = KnowledgeBaseItem>) -> Self {
        let kb = Self::new();
        for item in items {
            kb.insert(item);
        }
        kb
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let document: KnowledgeBaseDocument = serde_json::from_str(&raw)?;
        let kb = Self::from_items(document.items);
        info!(path = %path.display(), items = kb.len(), "Loaded knowledge base");
        Ok(kb)
    }

    pub fn insert(&self, item: KnowledgeBaseItem) {
        self.items.write().insert(item.id.clone(), Arc::new(item));
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

#[async_trait]
impl KnowledgeBase for FileKnowledgeBase {
    async fn lookup(&self, kb_id: &str) -> Result<Arc<KnowledgeBaseItem>> {
        self.items
            .read()
            .get(kb_id)
            .cloned()
            .ok_or_else(|| PioneerError::KnowledgeBaseItemNotFound {
                kb_id: kb_id.to_string(),
            })
    }
}
