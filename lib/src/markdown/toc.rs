use pulldown_cmark::{Event, Tag, TagEnd};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TocEntry {
    pub title: String,
    pub level: usize,
    pub id: Option<String>,
    pub children: Vec<TocEntry>,
}

/// Builds the heading tree of a document. A heading becomes a child of the
/// closest preceding heading with a smaller level.
pub(crate) fn collect<'a, I: Iterator<Item = Event<'a>>>(events: I) -> Vec<TocEntry> {
    let mut flat = vec![];
    let mut current: Option<TocEntry> = None;
    for event in events {
        match event {
            Event::Start(Tag::Heading { level, id, .. }) => {
                current = Some(TocEntry {
                    title: String::new(),
                    level: level as usize,
                    id: id.map(|id| id.to_string()),
                    children: vec![],
                });
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some(entry) = current.as_mut() {
                    entry.title.push_str(&text);
                }
            }
            Event::End(TagEnd::Heading(_)) => flat.extend(current.take()),
            _ => {}
        }
    }

    nest(flat)
}

fn nest(flat: Vec<TocEntry>) -> Vec<TocEntry> {
    // `stack` holds the path from a root entry to the most recent entry.
    let mut roots: Vec<TocEntry> = vec![];
    let mut stack: Vec<TocEntry> = vec![];
    for entry in flat {
        while stack.last().map_or(false, |top| top.level >= entry.level) {
            close(&mut stack, &mut roots);
        }

        stack.push(entry);
    }

    while !stack.is_empty() {
        close(&mut stack, &mut roots);
    }

    roots
}

fn close(stack: &mut Vec<TocEntry>, roots: &mut Vec<TocEntry>) {
    if let Some(done) = stack.pop() {
        match stack.last_mut() {
            Some(parent) => parent.children.push(done),
            None => roots.push(done),
        }
    }
}

#[cfg(test)]
mod tests {
    use pulldown_cmark::{Options, Parser};

    use super::*;

    #[test]
    fn nests_by_level() {
        let src = "# A\n## B {#bee}\n### C\n## D\n# E\n### F\n";
        let toc = collect(Parser::new_ext(src, Options::ENABLE_HEADING_ATTRIBUTES));
        assert_eq!(toc.len(), 2);
        assert_eq!(toc[0].title, "A");
        assert_eq!(toc[0].children.len(), 2);
        assert_eq!(toc[0].children[0].id.as_deref(), Some("bee"));
        assert_eq!(toc[0].children[0].children[0].title, "C");
        assert_eq!(toc[0].children[1].title, "D");
        assert_eq!(toc[1].children[0].title, "F");
    }

    #[test]
    fn code_spans_join_titles() {
        let toc = collect(Parser::new("## The `run` step\n"));
        assert_eq!(toc[0].title, "The run step");
        assert_eq!(toc[0].level, 2);
    }
}
