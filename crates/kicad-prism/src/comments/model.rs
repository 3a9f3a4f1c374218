//! Persisted comment document. Field names and nesting are a wire format
//! shared with the web viewer.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PrismError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentsMeta {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_generator")]
    pub generator: String,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_generator() -> String {
    "KiCad-Prism-Web".to_string()
}

impl Default for CommentsMeta {
    fn default() -> Self {
        Self {
            version: default_version(),
            generator: default_generator(),
        }
    }
}

/// The whole comment document of one project. Order of `comments` is
/// display order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentsFile {
    #[serde(default)]
    pub meta: CommentsMeta,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl CommentsFile {
    pub fn find(&self, comment_id: &str) -> Option<&Comment> {
        self.comments.iter().find(|c| c.id == comment_id)
    }

    pub fn find_mut(&mut self, comment_id: &str) -> Option<&mut Comment> {
        self.comments.iter_mut().find(|c| c.id == comment_id)
    }

    pub fn contains(&self, comment_id: &str) -> bool {
        self.find(comment_id).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub author: String,
    pub timestamp: String,
    pub status: CommentStatus,
    pub context: CommentContext,
    pub location: CommentLocation,
    pub content: String,
    #[serde(default)]
    pub replies: Vec<CommentReply>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentReply {
    pub author: String,
    pub timestamp: String,
    pub content: String,
}

/// Position on the board or schematic. `layer` applies to PCB comments,
/// `page` to schematic comments; unused fields stay empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentLocation {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub layer: String,
    #[serde(default)]
    pub page: String,
}

impl CommentLocation {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            ..Default::default()
        }
    }

    pub fn with_layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = layer.into();
        self
    }

    pub fn with_page(mut self, page: impl Into<String>) -> Self {
        self.page = page.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommentStatus {
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "RESOLVED")]
    Resolved,
}

impl FromStr for CommentStatus {
    type Err = PrismError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(CommentStatus::Open),
            "RESOLVED" => Ok(CommentStatus::Resolved),
            other => Err(PrismError::validation(format!(
                "status must be 'OPEN' or 'RESOLVED', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommentContext {
    #[serde(rename = "PCB")]
    Pcb,
    #[serde(rename = "SCH")]
    Sch,
}

impl FromStr for CommentContext {
    type Err = PrismError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PCB" => Ok(CommentContext::Pcb),
            "SCH" => Ok(CommentContext::Sch),
            other => Err(PrismError::validation(format!(
                "context must be 'PCB' or 'SCH', got '{}'",
                other
            ))),
        }
    }
}
