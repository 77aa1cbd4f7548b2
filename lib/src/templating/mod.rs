//! The template collaborator.
//!
//! The build hands an [`Engine`] a template reference, a parameter map, and a
//! set of [`Functions`] the template may call back into. It gets rendered
//! text back. Nothing else about the template language is visible to rules.

pub mod minijinja;

pub use self::minijinja::MiniJinjaEngine;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;

pub type Json = serde_json::Value;

/// The parameters a template is rendered with.
pub type Params = serde_json::Map<String, Json>;

pub type Function = Arc<dyn Fn(&[Json]) -> Result<Json> + Send + Sync>;

pub trait Engine: Send + Sync + fmt::Debug {
    /// Renders the template named by `template`, or its `entry` block if one
    /// is given.
    fn render(&self, template: &TemplateRef, params: &Params, functions: &Functions) -> Result<String>;

    /// Renders `source` as a template. `name` is used in diagnostics.
    fn render_str(&self, name: &str, source: &str, params: &Params, functions: &Functions) -> Result<String>;

    fn has_template(&self, name: &str) -> bool;

    /// Forgets cached templates so edited files are read again. Called at
    /// the start of every build.
    fn reload(&self) { }
}

/// A template and, optionally, the named entry (block) to render from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateRef {
    pub name: String,
    pub entry: Option<String>,
}

impl TemplateRef {
    pub fn new<S: Into<String>>(name: S) -> Self {
        TemplateRef { name: name.into(), entry: None }
    }

    /// Parses `name` or `name#entry`.
    pub fn parse(string: &str) -> Self {
        match string.split_once('#') {
            Some((name, entry)) if !entry.is_empty() => TemplateRef {
                name: name.into(),
                entry: Some(entry.into()),
            },
            Some((name, _)) => TemplateRef::new(name),
            None => TemplateRef::new(string),
        }
    }
}

impl fmt::Display for TemplateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.entry {
            Some(entry) => write!(f, "{}#{}", self.name, entry),
            None => self.name.fmt(f),
        }
    }
}

/// Named callbacks exposed to templates.
#[derive(Clone, Default)]
pub struct Functions {
    map: BTreeMap<String, Function>,
}

impl Functions {
    pub fn new() -> Self {
        Functions::default()
    }

    pub fn insert<N, F>(&mut self, name: N, function: F)
        where N: Into<String>, F: Fn(&[Json]) -> Result<Json> + Send + Sync + 'static
    {
        self.map.insert(name.into(), Arc::new(function));
    }

    pub fn with<N, F>(mut self, name: N, function: F) -> Self
        where N: Into<String>, F: Fn(&[Json]) -> Result<Json> + Send + Sync + 'static
    {
        self.insert(name, function);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.map.get(name)
    }

    pub fn call(&self, name: &str, args: &[Json]) -> Result<Json> {
        match self.map.get(name) {
            Some(function) => function(args),
            None => err!("no such template function", "name" => name),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Function)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl fmt::Debug for Functions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.map.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_refs() {
        assert_eq!(TemplateRef::parse("list.html"), TemplateRef::new("list.html"));
        assert_eq!(TemplateRef::parse("list.html#"), TemplateRef::new("list.html"));

        let r = TemplateRef::parse("list.html#items");
        assert_eq!(r.entry.as_deref(), Some("items"));
        assert_eq!(r.to_string(), "list.html#items");
    }

    #[test]
    fn functions_call_by_name() {
        let functions = Functions::new()
            .with("double", |args: &[Json]| {
                let n = args.first().and_then(|v| v.as_i64()).unwrap_or(0);
                Ok(Json::from(n * 2))
            });

        assert_eq!(functions.call("double", &[Json::from(21)]).unwrap(), 42);
        assert!(functions.call("triple", &[]).is_err());
        assert_eq!(format!("{functions:?}"), "{\"double\"}");
    }
}
