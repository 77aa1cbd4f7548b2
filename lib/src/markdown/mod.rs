//! The markdown collaborator.
//!
//! The engine treats markdown as a black box: a [`Markdown`] implementation
//! parses source into an opaque [`Document`], which the engine stores on the
//! resource, and later renders that document into HTML.

mod toc;

pub use toc::TocEntry;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use pulldown_cmark::{html, Options, Parser};

use crate::error::Result;

/// An opaque handle to a parsed document, owned by the [`Markdown`]
/// implementation that produced it.
#[derive(Clone)]
pub struct Document {
    root: Arc<dyn Any + Send + Sync>,
}

impl Document {
    pub fn new<T: Any + Send + Sync>(root: T) -> Self {
        Document { root: Arc::new(root) }
    }

    pub fn root<T: Any>(&self) -> Option<&T> {
        self.root.downcast_ref()
    }
}

pub trait Markdown: Send + Sync + fmt::Debug {
    fn parse(&self, source: &str) -> Result<Document>;

    fn render(&self, document: &Document) -> Result<String>;

    /// The document's headings as a tree. Implementations without a
    /// table-of-contents plug-in return nothing.
    fn toc(&self, _document: &Document) -> Vec<TocEntry> {
        vec![]
    }
}

/// CommonMark with tables, footnotes, strikethrough, task lists, and heading
/// attributes, via `pulldown-cmark`.
#[derive(Debug, Clone)]
pub struct Pulldown {
    options: Options,
}

/// The root of a [`Pulldown`] document. `pulldown-cmark` parses lazily, so
/// the parsed form is the source plus the options to parse it with.
#[derive(Debug)]
struct Source {
    text: Box<str>,
    options: Options,
}

impl Default for Pulldown {
    fn default() -> Self {
        Pulldown {
            options: Options::ENABLE_TABLES
                | Options::ENABLE_FOOTNOTES
                | Options::ENABLE_STRIKETHROUGH
                | Options::ENABLE_TASKLISTS
                | Options::ENABLE_HEADING_ATTRIBUTES,
        }
    }
}

impl Pulldown {
    pub fn with_options(options: Options) -> Self {
        Pulldown { options }
    }

    fn source<'d>(&self, document: &'d Document) -> Result<&'d Source> {
        document.root::<Source>()
            .ok_or_else(|| error!("document was not produced by the pulldown markdown engine"))
    }
}

impl Markdown for Pulldown {
    fn parse(&self, source: &str) -> Result<Document> {
        Ok(Document::new(Source { text: source.into(), options: self.options }))
    }

    fn render(&self, document: &Document) -> Result<String> {
        let source = self.source(document)?;
        let mut output = String::with_capacity(source.text.len() * 3 / 2);
        html::push_html(&mut output, Parser::new_ext(&source.text, source.options));
        Ok(output)
    }

    fn toc(&self, document: &Document) -> Vec<TocEntry> {
        match self.source(document) {
            Ok(source) => toc::collect(Parser::new_ext(&source.text, source.options)),
            Err(_) => vec![],
        }
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document").finish_non_exhaustive()
    }
}
