//! XML format adapter.
//!
//! ```xml
//! <customers>
//!   <item>
//!     <userId>u1</userId>
//!     <addresses><item><label>Home</label></item></addresses>
//!     <translations><translation culture="ru" field="firstName">Анна</translation></translations>
//!   </item>
//! </customers>
//! ```
//!
//! The root element is named after the profile and has one `item` child per
//! record. Absent fields are omitted on export and empty elements are absent
//! on import.

use super::normalize;
use crate::io::traits::{BufferedRows, RecordSink};
use crate::models::{ExchangeRecord, Row, Translation};
use crate::schema::{FieldDescriptor, ResolvedProfile};
use crate::{Error, Result};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::io::{BufRead, Write};

const ITEM: &str = "item";
const TRANSLATIONS: &str = "translations";
const TRANSLATION: &str = "translation";

/// A parsed XML element.
///
/// Names are local names (namespace prefixes stripped). Attribute keys keep
/// their prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    /// Attribute value by key, or by local name when the key is unprefixed.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key || k.rsplit(':').next() == Some(key))
            .map(|(_, v)| v.as_str())
    }

    /// First child with the given local name.
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Children with the given local name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Self> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Concatenated text of this element and its descendants.
    pub fn deep_text(&self) -> String {
        let mut out = self.text.clone();
        for child in &self.children {
            out.push_str(&child.deep_text());
        }
        out
    }
}

fn local_name(raw: &[u8]) -> String {
    let name = String::from_utf8_lossy(raw);
    name.rsplit(':').next().unwrap_or_default().to_string()
}

fn open(e: &BytesStart<'_>) -> Result<Element> {
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::MalformedPayload(format!("invalid XML attribute: {err}")))?;
        let value = attr
            .unescape_value()
            .map_err(|err| Error::MalformedPayload(format!("invalid XML attribute value: {err}")))?;
        attributes.push((
            String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
            value.into_owned(),
        ));
    }
    Ok(Element {
        name: local_name(e.name().as_ref()),
        attributes,
        ..Element::default()
    })
}

/// Parses a whole document into its root element.
///
/// # Errors
///
/// Returns [`Error::MalformedPayload`] if the document is not well formed or
/// has no root element.
pub(crate) fn parse_document(bytes: &[u8]) -> Result<Element> {
    let mut reader = quick_xml::Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut buf = Vec::new();

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            Error::MalformedPayload(format!(
                "invalid XML at byte {}: {e}",
                reader.buffer_position()
            ))
        })?;
        match event {
            Event::Start(e) => stack.push(open(&e)?),
            Event::Empty(e) => {
                let element = open(&e)?;
                attach(&mut stack, &mut root, element)?;
            },
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| Error::MalformedPayload("unbalanced XML end tag".to_string()))?;
                attach(&mut stack, &mut root, element)?;
            },
            Event::Text(e) => {
                let text = e
                    .unescape()
                    .map_err(|err| Error::MalformedPayload(format!("invalid XML text: {err}")))?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            },
            Event::CData(e) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            },
            Event::Eof => break,
            _ => {},
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(Error::MalformedPayload(
            "XML document ended inside an element".to_string(),
        ));
    }
    root.ok_or_else(|| Error::MalformedPayload("XML document has no root element".to_string()))
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        Ok(())
    } else if root.is_none() {
        *root = Some(element);
        Ok(())
    } else {
        Err(Error::MalformedPayload(
            "XML document has more than one root element".to_string(),
        ))
    }
}

/// Decodes an XML payload into rows.
///
/// # Errors
///
/// Returns [`Error::MalformedPayload`] if the document is not well formed.
pub fn decode<R: BufRead>(mut reader: R, profile: &ResolvedProfile) -> Result<BufferedRows> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| Error::operation("read_xml", e))?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(BufferedRows::new(Vec::new()));
    }

    let root = parse_document(&bytes)?;
    let rows = root
        .children
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let number = i + 1;
            match decode_item(profile, item) {
                Ok(record) => Row::new(number, record),
                Err(message) => Row::malformed(number, message),
            }
        })
        .collect();
    Ok(BufferedRows::new(rows))
}

fn decode_item(profile: &ResolvedProfile, item: &Element) -> std::result::Result<ExchangeRecord, String> {
    let mut record = ExchangeRecord::new();
    for child in &item.children {
        if child.name.eq_ignore_ascii_case(TRANSLATIONS) {
            for t in child.children_named(TRANSLATION) {
                let (Some(culture), Some(field)) = (t.attr("culture"), t.attr("field")) else {
                    return Err("translation needs 'culture' and 'field' attributes".to_string());
                };
                let Some(culture) = profile.localization.resolve(culture) else {
                    continue;
                };
                let Some(field) = profile
                    .profile
                    .field_ignore_case(field)
                    .filter(|f| f.localized)
                else {
                    continue;
                };
                if let Some(value) = normalize(&t.text) {
                    record
                        .translations
                        .push(Translation::new(culture, field.name.clone(), value));
                }
            }
        } else if let Some(collection) = profile
            .profile
            .collections()
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(&child.name))
        {
            let items = child
                .children
                .iter()
                .map(|entry| decode_fields(&collection.fields, entry, &collection.name))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            record.collections.insert(collection.name.clone(), items);
        } else if let Some(field) = profile.profile.field_ignore_case(&child.name) {
            if !child.children.is_empty() {
                return Err(format!("field '{}' must be a text value", field.name));
            }
            if let Some(value) = normalize(&child.text) {
                record.set(field.name.clone(), value);
            }
        }
    }
    Ok(record)
}

fn decode_fields(
    fields: &[FieldDescriptor],
    entry: &Element,
    scope: &str,
) -> std::result::Result<ExchangeRecord, String> {
    let mut record = ExchangeRecord::new();
    for child in &entry.children {
        if let Some(field) = fields.iter().find(|f| f.name.eq_ignore_ascii_case(&child.name)) {
            if !child.children.is_empty() {
                return Err(format!("field '{scope}.{}' must be a text value", field.name));
            }
            if let Some(value) = normalize(&child.text) {
                record.set(field.name.clone(), value);
            }
        }
    }
    Ok(record)
}

/// XML record sink.
pub struct XmlRecordSink<W: Write> {
    writer: Writer<W>,
    profile: ResolvedProfile,
    started: bool,
}

impl<W: Write> XmlRecordSink<W> {
    /// Creates a new XML sink.
    #[must_use]
    pub fn new(writer: W, profile: ResolvedProfile) -> Self {
        Self {
            writer: Writer::new(writer),
            profile,
            started: false,
        }
    }

    fn event(&mut self, event: Event<'_>) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|e| Error::operation("write_xml", e))
    }

    fn ensure_started(&mut self) -> Result<()> {
        if !self.started {
            self.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
            let root = self.profile.profile.name().to_string();
            self.event(Event::Start(BytesStart::new(root)))?;
            self.started = true;
        }
        Ok(())
    }

    fn text_element(&mut self, name: &str, value: &str) -> Result<()> {
        self.event(Event::Start(BytesStart::new(name)))?;
        self.event(Event::Text(BytesText::new(value)))?;
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn fields(&mut self, fields: &[FieldDescriptor], record: &ExchangeRecord) -> Result<()> {
        for field in fields {
            if let Some(value) = record.get(&field.name) {
                self.text_element(&field.name, value)?;
            }
        }
        Ok(())
    }
}

impl<W: Write + Send> RecordSink for XmlRecordSink<W> {
    fn write(&mut self, record: &ExchangeRecord) -> Result<()> {
        self.ensure_started()?;
        let profile = std::sync::Arc::clone(&self.profile.profile);

        self.event(Event::Start(BytesStart::new(ITEM)))?;
        self.fields(profile.fields(), record)?;

        for collection in profile.collections() {
            self.event(Event::Start(BytesStart::new(collection.name.as_str())))?;
            for entry in record.collection(&collection.name).unwrap_or_default() {
                self.event(Event::Start(BytesStart::new(ITEM)))?;
                self.fields(&collection.fields, entry)?;
                self.event(Event::End(BytesEnd::new(ITEM)))?;
            }
            self.event(Event::End(BytesEnd::new(collection.name.as_str())))?;
        }

        if !record.translations.is_empty() {
            self.event(Event::Start(BytesStart::new(TRANSLATIONS)))?;
            for t in &record.translations {
                let start = BytesStart::new(TRANSLATION).with_attributes([
                    ("culture", t.culture.as_str()),
                    ("field", t.field.as_str()),
                ]);
                self.event(Event::Start(start))?;
                self.event(Event::Text(BytesText::new(&t.value)))?;
                self.event(Event::End(BytesEnd::new(TRANSLATION)))?;
            }
            self.event(Event::End(BytesEnd::new(TRANSLATIONS)))?;
        }

        self.event(Event::End(BytesEnd::new(ITEM)))
    }

    fn finalize(mut self: Box<Self>) -> Result<()> {
        self.ensure_started()?;
        let root = self.profile.profile.name().to_string();
        self.event(Event::End(BytesEnd::new(root)))?;
        let mut inner = self.writer.into_inner();
        inner
            .write_all(b"\n")
            .map_err(|e| Error::operation("write_xml", e))?;
        inner.flush().map_err(|e| Error::operation("flush_xml", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Format;
    use crate::io::traits::RowSource;
    use crate::schema::{CollectionDescriptor, ExchangeProfile, Localization};
    use std::io::Cursor;
    use std::sync::Arc;

    fn profile() -> ResolvedProfile {
        let profile = ExchangeProfile::builder("customers")
            .key_field("userId")
            .field(FieldDescriptor::text("userId"))
            .field(FieldDescriptor::text("firstName").localized())
            .collection(
                CollectionDescriptor::new("addresses")
                    .field(FieldDescriptor::text("label"))
                    .field(FieldDescriptor::text("city")),
            )
            .build()
            .unwrap();
        ResolvedProfile::new(
            Arc::new(profile),
            Format::Xml,
            Localization::new(["en", "ru"], "en"),
        )
    }

    fn rows(input: &str) -> Vec<Row> {
        let mut source = decode(Cursor::new(input), &profile()).unwrap();
        let mut out = Vec::new();
        while let Some(row) = source.next().unwrap() {
            out.push(row);
        }
        out
    }

    #[test]
    fn test_decode_items() {
        let rows = rows(
            r#"<?xml version="1.0"?>
            <customers>
              <item>
                <userId>u1</userId>
                <firstName>Ann &amp; Co</firstName>
                <addresses><item><label>Home</label><city/></item></addresses>
                <translations><translation culture="RU" field="firstName">Анна</translation></translations>
              </item>
              <item><userId>u2</userId><firstName><b>x</b></firstName></item>
              <item><userId> u3 </userId></item>
            </customers>"#,
        );
        assert_eq!(rows.len(), 3);
        let first = &rows[0].record;
        assert_eq!(first.get("firstName"), Some("Ann & Co"));
        let addresses = first.collection("addresses").unwrap();
        assert_eq!(addresses.len(), 1);
        assert!(!addresses[0].has("city"));
        assert_eq!(first.translation("ru", "firstName"), Some("Анна"));
        assert!(rows[1].is_malformed());
        assert_eq!(rows[2].record.get("userId"), Some("u3"));
        assert!(rows[2].record.collection("addresses").is_none());
    }

    #[test]
    fn test_malformed_document() {
        for input in ["<customers><item></customers>", "<a/><b/>", "<customers>"] {
            let result = decode(Cursor::new(input), &profile());
            assert!(matches!(result, Err(Error::MalformedPayload(_))), "{input}");
        }
    }

    #[test]
    fn test_encode() {
        let mut output = Vec::new();
        {
            let mut sink = Box::new(XmlRecordSink::new(&mut output, profile()));
            sink.write(
                &ExchangeRecord::new()
                    .with("userId", "u<1>")
                    .with_collection("addresses", vec![ExchangeRecord::new().with("label", "Home")])
                    .with_translation(Translation::new("ru", "firstName", "Анна")),
            )
            .unwrap();
            sink.finalize().unwrap();
        }
        let text = String::from_utf8(output).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?><customers><item>"));
        assert!(text.contains("<userId>u&lt;1&gt;</userId>"));
        assert!(!text.contains("<firstName>"));
        assert!(text.contains("<addresses><item><label>Home</label></item></addresses>"));
        assert!(text.contains(r#"<translation culture="ru" field="firstName">Анна</translation>"#));
        assert!(text.trim_end().ends_with("</item></customers>"));
    }

    #[test]
    fn test_element_attr_local_name() {
        let root = parse_document(br#"<sheet xmlns:r="x" name="Main" r:id="rId1"/>"#).unwrap();
        assert_eq!(root.attr("name"), Some("Main"));
        assert_eq!(root.attr("id"), Some("rId1"));
        assert_eq!(root.attr("r:id"), Some("rId1"));
    }
}
