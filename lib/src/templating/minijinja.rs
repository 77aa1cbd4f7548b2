use std::path::Path;

use minijinja::{path_loader, Environment};
use minijinja::value::{Rest, Value};
use parking_lot::RwLock;

use crate::error::{ErrorDetail, ErrorKind, Result};
use crate::templating::{Engine, Function, Functions, Json, Params, TemplateRef};

/// An [`Engine`] backed by MiniJinja, loading templates from a directory.
#[derive(Debug)]
pub struct MiniJinjaEngine {
    env: RwLock<Environment<'static>>,
}

impl MiniJinjaEngine {
    pub fn new<P: AsRef<Path>>(template_dir: P) -> Self {
        let mut env = Environment::new();
        env.set_loader(path_loader(template_dir.as_ref()));
        env.add_function("now", ext::now);
        env.add_filter("slugify", ext::slugify);
        env.add_filter("deslug", ext::deslug);
        env.add_filter("date", ext::date);
        env.add_filter("split", ext::split);
        MiniJinjaEngine { env: RwLock::new(env) }
    }

    /// An engine with no template directory: only inline sources render.
    pub fn detached() -> Self {
        let engine = MiniJinjaEngine::new("");
        engine.env.write().set_loader(|_| Ok(None));
        engine
    }
}

/// Builds the render context: every parameter, plus every function as a
/// callable value.
fn context(params: &Params, functions: &Functions) -> Value {
    let mut entries: Vec<(String, Value)> = params.iter()
        .map(|(k, v)| (k.clone(), Value::from_serialize(v)))
        .collect();

    for (name, function) in functions.iter() {
        entries.push((name.to_string(), callable(function.clone())));
    }

    Value::from_iter(entries)
}

fn callable(function: Function) -> Value {
    Value::from_function(move |args: Rest<Value>| -> Result<Value, minijinja::Error> {
        let args = args.iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<Json>, _>>()
            .map_err(|e| minijinja::Error::new(minijinja::ErrorKind::InvalidOperation, e.to_string()))?;

        function(&args)
            .map(|value| Value::from_serialize(&value))
            .map_err(|e| minijinja::Error::new(minijinja::ErrorKind::InvalidOperation, e.to_string()))
    })
}

impl Engine for MiniJinjaEngine {
    fn render(&self, template: &TemplateRef, params: &Params, functions: &Functions) -> Result<String> {
        let env = self.env.read();
        let tmpl = env.get_template(&template.name)?;
        let ctx = context(params, functions);
        let string = match &template.entry {
            Some(entry) => tmpl.render_captured(ctx)?.with_state_mut(|state| state.render_block(entry))?,
            None => tmpl.render(ctx)?,
        };

        Ok(string)
    }

    fn render_str(&self, name: &str, source: &str, params: &Params, functions: &Functions) -> Result<String> {
        Ok(self.env.read().render_named_str(name, source, context(params, functions))?)
    }

    fn has_template(&self, name: &str) -> bool {
        self.env.read().get_template(name).is_ok()
    }

    fn reload(&self) {
        self.env.write().clear_templates();
    }
}

impl ErrorDetail for minijinja::Error {
    fn context(&self) -> Vec<(Option<String>, String)> {
        let error: &(dyn std::error::Error + Send + Sync) = self;
        let mut context = error.context();
        if let (Some(name), Some(line)) = (self.name(), self.line()) {
            context.insert(0, (Some("template".into()), format!("{name}:{line}")));
        }

        context
    }

    fn kind(&self) -> ErrorKind {
        match minijinja::Error::kind(self) {
            minijinja::ErrorKind::SyntaxError
            | minijinja::ErrorKind::TemplateNotFound
            | minijinja::ErrorKind::BadEscape => ErrorKind::Parse,
            _ => ErrorKind::Other,
        }
    }
}

mod ext {
    use chrono::DateTime;
    use minijinja::{value::Value, Error, ErrorKind};

    use crate::frontmatter::{parse_date, parse_date_time};

    pub fn slugify(value: &str) -> String {
        crate::util::slugify(value)
    }

    pub fn deslug(value: &str) -> String {
        value.replace('-', " ")
    }

    pub fn date(value: Value, fmt: &str) -> Result<Value, Error> {
        if let Ok(ts) = i64::try_from(value.clone()) {
            let datetime = DateTime::from_timestamp(ts, 0)
                .ok_or_else(|| Error::new(
                    ErrorKind::InvalidOperation,
                    "invalid timestamp provided to `date`"
                ))?;

            return Ok(datetime.format(fmt).to_string().into());
        }

        let kind = value.kind();
        let string = value.as_str()
            .ok_or_else(|| Error::new(
                ErrorKind::InvalidOperation,
                format!("`date` must be applied to a string or integer, found {kind}")
            ))?;

        if let Some(datetime) = parse_date_time(string) {
            return Ok(datetime.format(fmt).to_string().into());
        }

        let date = parse_date(string)
            .ok_or_else(|| Error::new(
                ErrorKind::InvalidOperation,
                format!("failed to parse date {string}")
            ))?;

        Ok(date.format(fmt).to_string().into())
    }

    pub fn split(value: &str, pat: &str, n: Option<usize>) -> Value {
        match n {
            Some(n) => value.split(pat).nth(n).map(Value::from).unwrap_or(Value::UNDEFINED),
            None => value.split(pat).map(Value::from).collect(),
        }
    }

    pub fn now() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::SystemTime::UNIX_EPOCH)
            .map_or(0, |d| d.as_secs())
    }
}
