//! Tag-name keyword tables.
//!
//! Each handler kind recognizes its own closed set of FB2 element names.
//! Lookups are exact and case-sensitive on the local name; a `None` result
//! is meaningful and selects the kind's default behavior.

/// Children recognized directly under `<FictionBook>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKeyword {
    Style,
    Description,
    Body,
    Binary,
}

impl RootKeyword {
    pub fn resolve(name: &str) -> Option<Self> {
        match name {
            "stylesheet" => Some(Self::Style),
            "description" => Some(Self::Description),
            "body" => Some(Self::Body),
            "binary" => Some(Self::Binary),
            _ => None,
        }
    }
}

/// Children recognized inside generic metadata elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadKeyword {
    Image,
}

impl HeadKeyword {
    pub fn resolve(name: &str) -> Option<Self> {
        match name {
            "image" => Some(Self::Image),
            _ => None,
        }
    }
}

/// Children recognized inside `<description>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionKeyword {
    Title,
    Document,
    Publish,
    Custom,
}

impl DescriptionKeyword {
    pub fn resolve(name: &str) -> Option<Self> {
        match name {
            "title-info" => Some(Self::Title),
            "document-info" => Some(Self::Document),
            "publish-info" => Some(Self::Publish),
            "custom-info" => Some(Self::Custom),
            _ => None,
        }
    }
}

/// Children recognized inside body text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKeyword {
    Section,
    Anchor,
    Table,
    Image,
    Paragraph,
    Style,
    Strong,
    Emphasis,
    Strike,
    Sub,
    Sup,
    Code,
}

impl TextKeyword {
    pub fn resolve(name: &str) -> Option<Self> {
        match name {
            "annotation" | "author" | "cite" | "date" | "epigraph" | "poem" | "section"
            | "stanza" | "subtitle" | "title" => Some(Self::Section),

            "a" => Some(Self::Anchor),
            "table" => Some(Self::Table),
            "image" => Some(Self::Image),

            "empty-line" | "p" | "v" => Some(Self::Paragraph),

            "style" => Some(Self::Style),
            "strong" => Some(Self::Strong),
            "emphasis" => Some(Self::Emphasis),
            "strikethrough" => Some(Self::Strike),
            "sub" => Some(Self::Sub),
            "sup" => Some(Self::Sup),
            "code" => Some(Self::Code),
            _ => None,
        }
    }

    /// Output element for keywords that map to a plain text wrapper.
    ///
    /// Returns an empty tag for pass-through keywords. Anchor and image
    /// have dedicated handlers and never reach this table.
    pub fn output_tag(self) -> &'static str {
        match self {
            Self::Section => "div",
            Self::Paragraph => "p",
            Self::Strong => "b",
            Self::Emphasis => "i",
            Self::Strike => "s",
            Self::Code => "tt",
            Self::Sub => "sub",
            Self::Sup => "sup",
            Self::Anchor => "a",
            Self::Image => "img",
            Self::Style | Self::Table => "",
        }
    }
}
