//! Record and upload result types.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A binary file referenced by a record's XML.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// File name; must match the text of the `type="file"` node in the XML.
    pub name: String,
    /// Raw file content.
    pub content: Bytes,
}

impl Attachment {
    pub fn new(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

/// An immutable snapshot of a filled-in form, ready to submit.
#[derive(Debug, Clone)]
pub struct Record {
    /// Unique instance identifier (`uuid:...`).
    pub instance_id: String,
    /// Identifier of the submission this record replaces, if editing.
    pub deprecated_id: Option<String>,
    /// Serialized XML document.
    pub xml: String,
    /// Available attachment files.
    pub files: Vec<Attachment>,
}

impl Record {
    pub fn new(instance_id: impl Into<String>, xml: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            deprecated_id: None,
            xml: xml.into(),
            files: Vec::new(),
        }
    }

    pub fn with_deprecated_id(mut self, deprecated_id: impl Into<String>) -> Self {
        self.deprecated_id = Some(deprecated_id.into());
        self
    }

    pub fn with_file(mut self, file: Attachment) -> Self {
        self.files.push(file);
        self
    }

    /// Look up an available attachment by name.
    pub fn file(&self, name: &str) -> Option<&Attachment> {
        self.files.iter().find(|f| f.name == name)
    }
}

/// Result of transmitting one batch. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOutcome {
    /// HTTP status reported by the relay.
    pub status: u16,
    /// Attachments referenced by the XML that could not be found.
    #[serde(rename = "failedFiles")]
    pub failed_files: Vec<String>,
    /// Human-readable message, usually from a rejection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl UploadOutcome {
    /// Returns true for the protocol's "created"/"accepted" statuses.
    pub fn is_accepted(&self) -> bool {
        self.status == 201 || self.status == 202
    }
}
