//! Import templates.
//!
//! A template is derived from the profile alone: headers (or keys) for every
//! field, optionally with one blank example record.

use crate::io::formats::create_record_sink;
use crate::models::ExchangeRecord;
use crate::schema::ResolvedProfile;
use crate::Result;

/// A generated template payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplatePayload {
    /// Encoded template.
    pub content: Vec<u8>,
    /// MIME type of the content.
    pub content_type: &'static str,
    /// Suggested file name, `<profile>_template.<ext>`.
    pub filename: String,
}

/// Generates an import template for a profile.
///
/// # Errors
///
/// Returns an error if the encoder fails.
pub fn generate(profile: &ResolvedProfile, include_example: bool) -> Result<TemplatePayload> {
    let mut content = Vec::new();
    {
        let mut sink = create_record_sink(&mut content, profile);
        if include_example {
            sink.write(&example(profile))?;
        }
        sink.finalize()?;
    }
    Ok(TemplatePayload {
        content,
        content_type: profile.format.mime_type(),
        filename: format!(
            "{}_template.{}",
            profile.profile.name(),
            profile.format.extension()
        ),
    })
}

/// One record with every field present and empty.
fn example(profile: &ResolvedProfile) -> ExchangeRecord {
    let mut record = ExchangeRecord::new();
    for name in profile.profile.field_names() {
        record.set(name, "");
    }
    for collection in profile.profile.collections() {
        let mut item = ExchangeRecord::new();
        for name in collection.field_names() {
            item.set(name, "");
        }
        record = record.with_collection(collection.name.clone(), vec![item]);
    }
    record
}
