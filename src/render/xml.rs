use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

use super::RenderError;

/// Indented XML document writer. Text and attribute values are escaped here
/// and nowhere else.
pub(super) struct XmlDocument {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl XmlDocument {
    pub fn new() -> Result<Self, RenderError> {
        let mut doc = Self {
            writer: Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2),
        };
        doc.write(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        Ok(doc)
    }

    fn write(&mut self, event: Event<'_>) -> Result<(), RenderError> {
        self.writer
            .write_event(event)
            .map_err(|e| RenderError::Xml(e.to_string()))
    }

    pub fn start(&mut self, element: BytesStart<'_>) -> Result<(), RenderError> {
        self.write(Event::Start(element))
    }

    pub fn open(&mut self, name: &str) -> Result<(), RenderError> {
        self.start(BytesStart::new(name))
    }

    pub fn close(&mut self, name: &str) -> Result<(), RenderError> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    pub fn empty(&mut self, element: BytesStart<'_>) -> Result<(), RenderError> {
        self.write(Event::Empty(element))
    }

    /// `<name>text</name>`
    pub fn text(&mut self, name: &str, text: &str) -> Result<(), RenderError> {
        self.text_with(BytesStart::new(name), text)
    }

    /// Text element with attributes.
    pub fn text_with(&mut self, element: BytesStart<'_>, text: &str) -> Result<(), RenderError> {
        let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
        self.start(element)?;
        self.write(Event::Text(BytesText::new(text)))?;
        self.close(&name)
    }

    pub fn finish(self) -> Vec<u8> {
        self.writer.into_inner().into_inner()
    }
}
