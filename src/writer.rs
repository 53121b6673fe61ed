//! Incremental XHTML serializer.
//!
//! Mirrors a stream-writer API: an element is opened with
//! [`HtmlWriter::start_element`], may receive attributes until the next
//! write, and is closed by [`HtmlWriter::end_element`] without repeating
//! its name. Output goes through `quick_xml::Writer`, which handles
//! escaping and optional auto-indentation.

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::asset::{AssetBridge, BinaryAsset};
use crate::error::Result;

/// Elements written as `<tag/>` when they have no content.
const VOID_ELEMENTS: &[&str] = &["img"];

/// Options that shape the serialized output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Indentation width for auto-formatting; `None` writes compact output.
    pub indent: Option<usize>,
    /// Prefix of synthesized element ids.
    pub id_prefix: String,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            indent: Some(2),
            id_prefix: "FB2E".to_string(),
        }
    }
}

impl ConvertOptions {
    /// Compact output, handy when comparing markup.
    pub fn compact() -> Self {
        Self {
            indent: None,
            ..Self::default()
        }
    }
}

/// Streaming XHTML writer with an id generator and an asset bridge.
pub struct HtmlWriter<B> {
    xml: Writer<Vec<u8>>,
    /// Start tag still accepting attributes.
    pending: Option<BytesStart<'static>>,
    /// Names of open elements, innermost last.
    open: Vec<String>,
    last_id: u64,
    id_prefix: String,
    bridge: B,
}

impl<B: AssetBridge> HtmlWriter<B> {
    pub fn new(bridge: B, options: &ConvertOptions) -> Self {
        let xml = match options.indent {
            Some(width) => Writer::new_with_indent(Vec::new(), b' ', width),
            None => Writer::new(Vec::new()),
        };
        Self {
            xml,
            pending: None,
            open: Vec::new(),
            last_id: 0,
            id_prefix: options.id_prefix.clone(),
            bridge,
        }
    }

    pub fn begin_document(&mut self) -> Result<()> {
        self.xml
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        Ok(())
    }

    /// Close every element still open.
    pub fn end_document(&mut self) -> Result<()> {
        while !self.open.is_empty() {
            self.end_element()?;
        }
        Ok(())
    }

    pub fn start_element(&mut self, name: &str) -> Result<()> {
        self.flush_pending()?;
        self.pending = Some(BytesStart::new(name.to_string()));
        self.open.push(name.to_string());
        Ok(())
    }

    /// Add an attribute to the element opened by the last `start_element`.
    ///
    /// Has no effect once content has been written into that element.
    pub fn attribute(&mut self, name: &str, value: &str) {
        debug_assert!(self.pending.is_some(), "attribute `{name}` outside a start tag");
        if let Some(start) = self.pending.as_mut() {
            start.push_attribute((name, value));
        }
    }

    pub fn characters(&mut self, text: &str) -> Result<()> {
        self.flush_pending()?;
        if !text.is_empty() {
            self.xml.write_event(Event::Text(BytesText::new(text)))?;
        }
        Ok(())
    }

    pub fn end_element(&mut self) -> Result<()> {
        let Some(name) = self.open.pop() else {
            return Ok(());
        };
        if let Some(start) = self.pending.take() {
            if VOID_ELEMENTS.contains(&name.as_str()) {
                self.xml.write_event(Event::Empty(start))?;
                return Ok(());
            }
            self.xml.write_event(Event::Start(start))?;
        }
        self.xml.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    /// A fresh id, unique within this writer: `FB2E1`, `FB2E2`, ...
    pub fn new_id(&mut self) -> String {
        self.last_id += 1;
        format!("{}{}", self.id_prefix, self.last_id)
    }

    /// Blocks until the host names a local path for `name`.
    pub fn resolve_asset_path(&mut self, name: &str) -> String {
        self.bridge.resolve_asset_path(name)
    }

    pub fn deliver_asset(&mut self, asset: BinaryAsset) {
        self.bridge.deliver_asset(asset);
    }

    /// Number of elements currently open.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// The serialized markup.
    pub fn into_markup(mut self) -> Result<String> {
        self.flush_pending()?;
        Ok(String::from_utf8(self.xml.into_inner())?)
    }

    fn flush_pending(&mut self) -> Result<()> {
        if let Some(start) = self.pending.take() {
            self.xml.write_event(Event::Start(start))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::DiscardAssets;

    fn compact() -> HtmlWriter<DiscardAssets> {
        HtmlWriter::new(DiscardAssets, &ConvertOptions::compact())
    }

    #[test]
    fn test_attributes_follow_start_tag() {
        let mut w = compact();
        w.start_element("div").unwrap();
        w.attribute("id", "x");
        w.attribute("class", "a&b");
        w.characters("1 < 2").unwrap();
        w.end_element().unwrap();
        assert_eq!(
            w.into_markup().unwrap(),
            r#"<div id="x" class="a&amp;b">1 &lt; 2</div>"#
        );
    }

    #[test]
    fn test_empty_elements() {
        let mut w = compact();
        w.start_element("p").unwrap();
        w.end_element().unwrap();
        w.start_element("img").unwrap();
        w.attribute("src", "a.png");
        w.end_element().unwrap();
        assert_eq!(w.into_markup().unwrap(), r#"<p></p><img src="a.png"/>"#);
    }

    #[test]
    fn test_end_document_closes_everything() {
        let mut w = compact();
        w.begin_document().unwrap();
        w.start_element("html").unwrap();
        w.start_element("body").unwrap();
        w.characters("x").unwrap();
        assert_eq!(w.depth(), 2);
        w.end_document().unwrap();
        let out = w.into_markup().unwrap();
        assert!(out.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(out.ends_with("<html><body>x</body></html>"));
    }

    #[test]
    fn test_ids_are_monotonic() {
        let mut w = compact();
        assert_eq!(w.new_id(), "FB2E1");
        assert_eq!(w.new_id(), "FB2E2");
        assert_eq!(w.new_id(), "FB2E3");
    }

    #[test]
    fn test_custom_prefix() {
        let options = ConvertOptions {
            indent: None,
            id_prefix: "n".to_string(),
        };
        let mut w = HtmlWriter::new(DiscardAssets, &options);
        assert_eq!(w.new_id(), "n1");
    }
}
