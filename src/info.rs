//! Document information dictionary written into every bundle.

use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};

/// Producer string used when none is configured.
pub const DEFAULT_PRODUCER: &str = concat!("pdf_bundle ", env!("CARGO_PKG_VERSION"));

/// Values of the `/Info` dictionary.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentInfo {
    title: Option<String>,
    author: Option<String>,
    subject: Option<String>,
    keywords: Vec<String>,
    producer: Option<String>,
    creator: Option<String>,
}

impl DocumentInfo {
    /// Creates metadata carrying only a title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// Returns the title, if any.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Returns the author, if any.
    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    /// Returns the subject, if any.
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Returns the keywords.
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Sets the title and returns the updated metadata.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the author and returns the updated metadata.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Sets the subject and returns the updated metadata.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Replaces the keywords and returns the updated metadata.
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the producer and returns the updated metadata.
    pub fn with_producer(mut self, producer: impl Into<String>) -> Self {
        self.producer = Some(producer.into());
        self
    }

    /// Sets the creator and returns the updated metadata.
    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = Some(creator.into());
        self
    }

    /// Builds the `/Info` dictionary. Unset entries are omitted, except
    /// `Producer`, which falls back to [`DEFAULT_PRODUCER`].
    pub fn to_dictionary(&self) -> Dictionary {
        let mut dictionary = Dictionary::new();
        let entries = [
            ("Title", self.title.as_deref()),
            ("Author", self.author.as_deref()),
            ("Subject", self.subject.as_deref()),
            ("Creator", self.creator.as_deref()),
        ];
        for (key, value) in entries {
            if let Some(value) = value {
                dictionary.set(key, text_string(value));
            }
        }
        if !self.keywords.is_empty() {
            dictionary.set("Keywords", text_string(&self.keywords.join(", ")));
        }
        dictionary.set(
            "Producer",
            text_string(self.producer.as_deref().unwrap_or(DEFAULT_PRODUCER)),
        );
        dictionary
    }

    /// Adds the `/Info` dictionary to `document` and references it from the trailer.
    pub fn apply(&self, document: &mut Document) -> ObjectId {
        let id = document.add_object(self.to_dictionary());
        document.trailer.set("Info", Object::Reference(id));
        id
    }
}

/// Encodes a PDF text string: plain ASCII as a literal string, anything else
/// as UTF-16BE with a byte order mark.
pub fn text_string(value: &str) -> Object {
    if value.is_ascii() {
        return Object::string_literal(value);
    }

    let mut bytes = Vec::with_capacity(2 + value.len() * 2);
    bytes.extend_from_slice(&[0xFE, 0xFF]);
    for unit in value.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}
