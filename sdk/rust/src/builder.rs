//! Assembles planned batches into self-contained submission payloads.
//!
//! # Data Flow
//! ```text
//! Record.xml
//!     → scan for type="file" nodes (strip the attribute, collect names)
//!     → serialize once, shared by every batch
//! file names
//!     → resolve against Record.files (missing → failed_files)
//!     → planner::divide_into_batches(sizes, limit)
//!     → PreparedBatch per plan entry
//! ```
//!
//! # Design Decisions
//! - Missing attachments are not fatal; the record is still worth reviewing
//! - Every batch carries the full failed-file list
//! - Multipart forms are built lazily at upload time (forms are single-use)

use std::sync::Arc;

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use reqwest::multipart::{Form, Part};

use crate::error::SdkError;
use crate::planner::divide_into_batches;
use crate::record::{Attachment, Record};

/// Multipart field carrying the XML document.
pub const XML_SUBMISSION_FIELD: &str = "xml_submission_file";

/// Multipart field carrying the anti-forgery token.
pub const CSRF_FIELD: &str = "__csrf";

/// One network-transmissible grouping of a record.
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    pub instance_id: String,
    pub deprecated_id: Option<String>,
    /// Serialized XML, shared across all batches of the record.
    pub xml: Arc<str>,
    /// Attachments assigned to this batch.
    pub files: Vec<Attachment>,
    /// Attachments referenced by the XML that were not available.
    pub failed_files: Arc<[String]>,
    pub csrf_token: Option<String>,
}

impl PreparedBatch {
    /// Build the multipart body for this batch.
    pub fn to_form(&self) -> Result<Form, SdkError> {
        let xml = Part::text(self.xml.to_string())
            .file_name(XML_SUBMISSION_FIELD)
            .mime_str("text/xml")?;

        let mut form = Form::new().part(XML_SUBMISSION_FIELD, xml);

        if let Some(token) = &self.csrf_token {
            form = form.text(CSRF_FIELD, token.clone());
        }

        for file in &self.files {
            let part = Part::stream_with_length(reqwest::Body::from(file.content.clone()), file.size())
                .file_name(file.name.clone())
                .mime_str("application/octet-stream")?;
            form = form.part(file.name.clone(), part);
        }

        Ok(form)
    }
}

/// XML document with file nodes resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedRecord {
    /// Canonical XML text with `type="file"` attributes removed.
    pub xml: String,
    /// File names referenced by file nodes, in document order.
    pub file_names: Vec<String>,
}

/// Strip `type="file"` markers and collect referenced file names.
pub fn serialize_record_xml(xml: &str) -> Result<SerializedRecord, SdkError> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut file_names = Vec::new();

    // (depth at which the file node opened, text collected so far)
    let mut capture: Option<(usize, String)> = None;
    let mut depth = 0usize;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| SdkError::Xml(format!("at byte {}: {e}", reader.buffer_position())))?;

        match event {
            Event::Eof => break,
            Event::Decl(_) | Event::DocType(_) => continue,
            Event::Start(start) => {
                depth += 1;
                let (element, is_file) = without_file_type(&start)?;
                if is_file && capture.is_none() {
                    capture = Some((depth, String::new()));
                }
                write(&mut writer, Event::Start(element))?;
            }
            Event::Empty(start) => {
                let (element, _) = without_file_type(&start)?;
                write(&mut writer, Event::Empty(element))?;
            }
            Event::End(end) => {
                if let Some((open_depth, _)) = &capture {
                    if *open_depth == depth {
                        if let Some((_, name)) = capture.take() {
                            let name = name.trim().to_string();
                            if !name.is_empty() {
                                file_names.push(name);
                            }
                        }
                    }
                }
                depth = depth.saturating_sub(1);
                write(&mut writer, Event::End(end))?;
            }
            // only the root element is serialized
            Event::Text(_) | Event::CData(_) | Event::Comment(_) | Event::PI(_) if depth == 0 => continue,
            Event::Text(text) => {
                if let Some((_, name)) = capture.as_mut() {
                    let unescaped = text.unescape().map_err(|e| SdkError::Xml(e.to_string()))?;
                    name.push_str(&unescaped);
                }
                write(&mut writer, Event::Text(text))?;
            }
            Event::CData(data) => {
                if let Some((_, name)) = capture.as_mut() {
                    name.push_str(&String::from_utf8_lossy(&data));
                }
                write(&mut writer, Event::CData(data))?;
            }
            other => write(&mut writer, other)?,
        }
    }

    if depth != 0 {
        return Err(SdkError::Xml("document ended with unclosed elements".to_string()));
    }

    let xml = String::from_utf8(writer.into_inner()).map_err(|e| SdkError::Xml(e.to_string()))?;
    Ok(SerializedRecord { xml, file_names })
}

fn without_file_type(start: &BytesStart<'_>) -> Result<(BytesStart<'static>, bool), SdkError> {
    let mut element = start.to_owned();
    element.clear_attributes();
    let mut is_file = false;

    for attr in start.attributes() {
        let attr = attr.map_err(|e| SdkError::Xml(e.to_string()))?;
        if attr.key.as_ref() == b"type" && attr.value.as_ref() == b"file" {
            is_file = true;
            continue;
        }
        element.push_attribute(attr);
    }

    Ok((element, is_file))
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), SdkError> {
    writer
        .write_event(event)
        .map_err(|e| SdkError::Xml(e.to_string()))
}

/// Extract the anti-forgery token from a `Cookie`-style header value.
pub fn csrf_token_from_cookies(cookies: &str, cookie_name: &str) -> Option<String> {
    cookies
        .split(';')
        .map(str::trim)
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// Build every batch for `record`, bounded by `limit` bytes of attachments.
pub fn prepare_batches(
    record: &Record,
    limit: u64,
    csrf_token: Option<&str>,
) -> Result<Vec<PreparedBatch>, SdkError> {
    let serialized = serialize_record_xml(&record.xml)?;
    let xml: Arc<str> = Arc::from(serialized.xml);

    let mut submission_files = Vec::new();
    let mut failed_files = Vec::new();
    for name in serialized.file_names {
        match record.file(&name) {
            Some(file) => submission_files.push(file.clone()),
            None => {
                tracing::warn!(
                    instance_id = %record.instance_id,
                    file = %name,
                    "Attachment referenced by record is not available"
                );
                failed_files.push(name);
            }
        }
    }
    let failed_files: Arc<[String]> = Arc::from(failed_files);

    let sizes: Vec<u64> = submission_files.iter().map(Attachment::size).collect();
    let plan = divide_into_batches(&sizes, limit);

    tracing::debug!(
        instance_id = %record.instance_id,
        batches = plan.len(),
        files = submission_files.len(),
        failed = failed_files.len(),
        limit,
        "Record split into batches"
    );

    Ok(plan
        .into_iter()
        .map(|indices| PreparedBatch {
            instance_id: record.instance_id.clone(),
            deprecated_id: record.deprecated_id.clone(),
            xml: Arc::clone(&xml),
            files: indices.into_iter().map(|i| submission_files[i].clone()).collect(),
            failed_files: Arc::clone(&failed_files),
            csrf_token: csrf_token.map(str::to_string),
        })
        .collect())
}
