//! FB2 element handlers and the stack machine that drives them.
//!
//! Every open source element is represented by a [`Frame`] on the
//! [`Transducer`] stack. The frame's [`Handler`] variant decides which
//! children it accepts, what it writes when it opens, how it treats
//! character data, and what it writes when it closes. Children a handler
//! does not accept are replaced by an [`Handler::Ignore`] frame that
//! swallows the whole subtree.
//!
//! Parent links are stack indices. They are only used for queries (the
//! footnote check) and never own anything; the stack owns every frame.

use tracing::{debug, warn};

use crate::asset::{AssetBridge, BinaryAsset, decode_payload};
use crate::error::{Error, Result};
use crate::keyword::{DescriptionKeyword, HeadKeyword, RootKeyword, TextKeyword};
use crate::load::CancelFlag;
use crate::writer::{ConvertOptions, HtmlWriter};

/// The only accepted document element (compared case-insensitively).
pub const ROOT_TAG: &str = "FictionBook";

/// Source attributes of a start tag: qualified name and unescaped value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Vec<(String, String)>);

impl Attributes {
    /// An empty attribute list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attribute in source order.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Value of the first attribute whose local name is `local`.
    ///
    /// `get("href")` matches `href`, `l:href` and `xlink:href`.
    pub fn get(&self, local: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(name, _)| local_name(name) == local)
            .map(|(_, value)| value.as_str())
    }

    /// Qualified names and values, in source order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Strip a namespace prefix (`l:href` -> `href`).
pub fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

/// Metadata wrapper state.
#[derive(Debug)]
struct Head {
    /// No text or accepted child seen yet.
    empty: bool,
}

/// Body text wrapper state.
#[derive(Debug)]
struct Text {
    /// Output element; empty for pass-through handlers.
    tag: &'static str,
    /// Output class.
    style: String,
}

#[derive(Debug)]
struct Binary {
    id: String,
    payload: String,
}

/// The closed set of element behaviors.
#[derive(Debug)]
enum Handler {
    Root,
    Head(Head),
    Description(Head),
    Title(Head),
    Text(Text),
    Anchor(Text),
    Image(Text),
    Binary(Binary),
    Ignore,
}

/// What a handler wants to do with a child start tag.
#[derive(Debug, PartialEq, Eq)]
enum Spawn<'a> {
    Head,
    Description,
    Title,
    /// Text wrapper; `linked` children can see this handler in notes queries.
    Text {
        tag: &'static str,
        style: &'a str,
        linked: bool,
    },
    Anchor,
    Image,
    Binary,
    Ignore,
}

impl Handler {
    fn new_child<'a>(&mut self, name: &'a str) -> Spawn<'a> {
        match self {
            Handler::Root => match RootKeyword::resolve(name) {
                Some(RootKeyword::Body) => Spawn::Text {
                    tag: "div",
                    style: name,
                    linked: false,
                },
                Some(RootKeyword::Description) => Spawn::Description,
                Some(RootKeyword::Binary) => Spawn::Binary,
                Some(RootKeyword::Style) | None => Spawn::Ignore,
            },
            Handler::Head(head) => {
                head.empty = false;
                match HeadKeyword::resolve(name) {
                    Some(HeadKeyword::Image) => Spawn::Image,
                    None => Spawn::Head,
                }
            }
            Handler::Description(head) => match DescriptionKeyword::resolve(name) {
                Some(keyword) => {
                    head.empty = false;
                    match keyword {
                        DescriptionKeyword::Title => Spawn::Title,
                        _ => Spawn::Head,
                    }
                }
                None => Spawn::Ignore,
            },
            Handler::Title(head) => {
                head.empty = false;
                if name == "annotation" {
                    Spawn::Text {
                        tag: "div",
                        style: name,
                        linked: false,
                    }
                } else {
                    Spawn::Head
                }
            }
            Handler::Text(_) | Handler::Anchor(_) | Handler::Image(_) => {
                match TextKeyword::resolve(name) {
                    Some(TextKeyword::Anchor) => Spawn::Anchor,
                    Some(TextKeyword::Image) => Spawn::Image,
                    Some(TextKeyword::Section) => Spawn::Text {
                        tag: "div",
                        style: name,
                        linked: true,
                    },
                    Some(keyword) => Spawn::Text {
                        tag: keyword.output_tag(),
                        style: "",
                        linked: true,
                    },
                    None => Spawn::Text {
                        tag: "",
                        style: "",
                        linked: true,
                    },
                }
            }
            Handler::Binary(_) | Handler::Ignore => Spawn::Ignore,
        }
    }

    /// Output class of text-family handlers.
    fn style(&self) -> Option<&str> {
        match self {
            Handler::Text(text) | Handler::Anchor(text) | Handler::Image(text) => {
                Some(&text.style)
            }
            _ => None,
        }
    }
}

/// One open source element.
#[derive(Debug)]
struct Frame {
    name: String,
    parent: Option<usize>,
    handler: Handler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    BeforeRoot,
    InRoot,
    AfterRoot,
    Failed,
}

/// Drives element handlers from tokenizer events and writes XHTML.
///
/// Single-threaded: one transducer serves one parse. Once any event
/// fails, the transducer rejects everything else and its output is
/// never handed out.
pub struct Transducer<B> {
    writer: HtmlWriter<B>,
    frames: Vec<Frame>,
    state: State,
    cancel: Option<CancelFlag>,
}

impl<B: AssetBridge> Transducer<B> {
    pub fn new(bridge: B, options: &ConvertOptions) -> Self {
        Self {
            writer: HtmlWriter::new(bridge, options),
            frames: Vec::with_capacity(16),
            state: State::BeforeRoot,
            cancel: None,
        }
    }

    /// Poll `flag` on every start and end event.
    pub fn with_cancel(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Number of open source elements.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn on_start(&mut self, name: &str, attrs: &Attributes) -> Result<()> {
        self.poll_cancel()?;
        let result = self.start(name, attrs);
        self.check(result)
    }

    pub fn on_text(&mut self, text: &str) -> Result<()> {
        self.ensure_running()?;
        let result = self.text(text);
        self.check(result)
    }

    pub fn on_end(&mut self, name: &str) -> Result<()> {
        self.poll_cancel()?;
        let result = self.end(name);
        self.check(result)
    }

    /// Abort the parse. Returns the error to propagate.
    pub fn on_error(&mut self, error: impl Into<Error>) -> Error {
        self.state = State::Failed;
        self.frames.clear();
        error.into()
    }

    /// The finished document, if the root element was opened and closed.
    pub fn finish(self) -> Result<String> {
        match self.state {
            State::AfterRoot => self.writer.into_markup(),
            State::BeforeRoot => Err(Error::Malformed("no document element".to_string())),
            State::InRoot => Err(Error::Malformed(format!(
                "unexpected end of input inside <{}>",
                self.frames.last().map_or(ROOT_TAG, |f| f.name.as_str())
            ))),
            State::Failed => Err(Error::Malformed("parse aborted".to_string())),
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.state == State::Failed {
            return Err(Error::Malformed("parse aborted".to_string()));
        }
        Ok(())
    }

    fn poll_cancel(&mut self) -> Result<()> {
        self.ensure_running()?;
        if self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
            debug!(depth = self.frames.len(), "parse cancelled");
            return Err(self.on_error(Error::Cancelled));
        }
        Ok(())
    }

    fn check(&mut self, result: Result<()>) -> Result<()> {
        result.map_err(|e| self.on_error(e))
    }

    fn start(&mut self, name: &str, attrs: &Attributes) -> Result<()> {
        let name = local_name(name);
        match self.state {
            State::BeforeRoot => return self.open_root(name),
            State::AfterRoot => {
                return Err(Error::Malformed(format!(
                    "element <{name}> after the document element"
                )));
            }
            _ => {}
        }

        let parent = self.frames.len() - 1;
        let spawn = self.frames[parent].handler.new_child(name);
        let mut link = None;
        let handler = match spawn {
            Spawn::Ignore => Handler::Ignore,
            Spawn::Head => Handler::Head(self.open_head(name, attrs)?),
            Spawn::Description => {
                let head = self.open_head(name, attrs)?;
                let id = self.writer.new_id();
                self.writer.attribute("id", &id);
                Handler::Description(head)
            }
            Spawn::Title => {
                let head = self.open_head(name, attrs)?;
                let id = self.writer.new_id();
                self.writer.attribute("id", &id);
                Handler::Title(head)
            }
            Spawn::Text { tag, style, linked } => {
                link = linked.then_some(parent);
                Handler::Text(self.open_text(tag, style, attrs, link)?)
            }
            Spawn::Anchor => {
                link = Some(parent);
                let text = self.open_text("a", "", attrs, link)?;
                let href = attrs.get("href").unwrap_or_default();
                self.writer.attribute("href", href);
                Handler::Anchor(text)
            }
            Spawn::Image => Handler::Image(self.open_image(attrs)?),
            Spawn::Binary => Handler::Binary(Binary {
                id: attrs.get("id").unwrap_or_default().to_string(),
                payload: String::new(),
            }),
        };

        self.frames.push(Frame {
            name: name.to_string(),
            parent: link,
            handler,
        });
        Ok(())
    }

    fn open_root(&mut self, name: &str) -> Result<()> {
        if !name.eq_ignore_ascii_case(ROOT_TAG) {
            return Err(Error::NotFictionBook(name.to_string()));
        }
        debug!("accepted <{name}> document element");
        self.writer.begin_document()?;
        self.writer.start_element("html")?;
        self.writer.start_element("body")?;
        self.frames.push(Frame {
            name: name.to_string(),
            parent: None,
            handler: Handler::Root,
        });
        self.state = State::InRoot;
        Ok(())
    }

    fn open_head(&mut self, name: &str, attrs: &Attributes) -> Result<Head> {
        self.writer.start_element("div")?;
        self.writer.attribute("class", name);
        for (qname, value) in attrs.iter() {
            if qname == "xmlns" || qname.starts_with("xmlns:") {
                continue;
            }
            self.writer.attribute(&format!("fb2:{qname}"), value);
        }
        Ok(Head { empty: true })
    }

    fn open_text(
        &mut self,
        tag: &'static str,
        style: &str,
        attrs: &Attributes,
        parent: Option<usize>,
    ) -> Result<Text> {
        let mut style = style.to_string();
        if tag.is_empty() {
            return Ok(Text { tag, style });
        }

        self.writer.start_element(tag)?;
        match attrs.get("id").filter(|id| !id.is_empty()) {
            Some(id) => {
                if style == "section" && self.in_notes(parent) {
                    style = "note".to_string();
                }
                self.writer.attribute("id", id);
            }
            None if tag == "div" || tag == "img" => {
                let id = self.writer.new_id();
                self.writer.attribute("id", &id);
            }
            None => {}
        }
        if !style.is_empty() {
            if style == "body"
                && attrs
                    .get("name")
                    .is_some_and(|n| n.eq_ignore_ascii_case("notes"))
            {
                style = "notes".to_string();
            }
            self.writer.attribute("class", &style);
        }
        Ok(Text { tag, style })
    }

    fn open_image(&mut self, attrs: &Attributes) -> Result<Text> {
        let text = self.open_text("img", "", attrs, None)?;
        let href = attrs.get("href").unwrap_or_default();
        let href = href.strip_prefix('#').unwrap_or(href);
        let path = self.writer.resolve_asset_path(href);
        self.writer.attribute("src", &path);
        self.writer.attribute("alt", href);
        Ok(text)
    }

    /// Whether the chain of linked ancestors starting at `cursor` contains
    /// a footnote container.
    fn in_notes(&self, mut cursor: Option<usize>) -> bool {
        while let Some(index) = cursor {
            let frame = &self.frames[index];
            if frame.handler.style() == Some("notes") {
                return true;
            }
            cursor = frame.parent;
        }
        false
    }

    fn text(&mut self, text: &str) -> Result<()> {
        let Some(frame) = self.frames.last_mut() else {
            // Outside the document element.
            return Ok(());
        };
        match &mut frame.handler {
            Handler::Head(head) | Handler::Description(head) | Handler::Title(head) => {
                head.empty = false;
                self.writer.characters(text)
            }
            Handler::Text(_) | Handler::Anchor(_) | Handler::Image(_) => {
                self.writer.characters(text)
            }
            Handler::Binary(binary) => {
                binary.payload.push_str(text);
                Ok(())
            }
            Handler::Root | Handler::Ignore => Ok(()),
        }
    }

    fn end(&mut self, name: &str) -> Result<()> {
        let name = local_name(name);
        let Some(frame) = self.frames.pop() else {
            return Err(Error::Malformed(format!("unmatched </{name}>")));
        };
        if frame.name != name {
            return Err(Error::Malformed(format!(
                "</{name}> closes <{}>",
                frame.name
            )));
        }

        match frame.handler {
            Handler::Root => {
                self.writer.end_element()?;
                self.writer.end_element()?;
                self.writer.end_document()?;
                self.state = State::AfterRoot;
            }
            Handler::Head(head) | Handler::Description(head) | Handler::Title(head) => {
                if head.empty {
                    self.writer.characters(" ")?;
                }
                self.writer.end_element()?;
            }
            Handler::Text(text) | Handler::Anchor(text) | Handler::Image(text) => {
                if !text.tag.is_empty() {
                    if text.tag == "div" {
                        self.writer.characters(" ")?;
                    }
                    self.writer.end_element()?;
                }
            }
            Handler::Binary(binary) => self.finish_binary(binary),
            Handler::Ignore => {}
        }
        Ok(())
    }

    fn finish_binary(&mut self, binary: Binary) {
        if binary.id.is_empty() {
            debug!("dropping <binary> without id");
            return;
        }
        match decode_payload(&binary.payload) {
            Ok(data) => {
                debug!(name = %binary.id, bytes = data.len(), "extracted binary");
                self.writer.deliver_asset(BinaryAsset {
                    name: binary.id,
                    data,
                });
            }
            Err(e) => warn!(name = %binary.id, "skipping undecodable binary: {e}"),
        }
    }
}
