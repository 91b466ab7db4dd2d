//! Page document and index rendering.
//!
//! Both documents are [upon] templates embedded into the binary with
//! [`rust-embed`](rust_embed) from `assets/templates/`. On top of upon's
//! defaults, a **`quoted`** formatter renders a string as a double-quoted,
//! escaped scalar, so book names survive in front matter.

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use rust_embed::Embed;
use std::borrow::Cow;
use tracing::instrument;
use upon::{Engine, Template, Value};

pub(crate) const PAGE_TEMPLATE: &str = "page.md";
pub(crate) const INDEX_TEMPLATE: &str = "index.md";

#[derive(Embed)]
#[folder = "../../assets/templates/"]
struct Builtins;
impl Builtins {
    fn load(name: &str) -> Result<Cow<'static, [u8]>> {
        Self::get(name).map(|f| f.data).ok_or_raise(|| ErrorKind::Template)
    }
}

/// Compiled page and index templates.
///
/// Templates are compiled once, at construction, so a broken template fails
/// the run before anything is written.
pub struct Renderer {
    engine: Engine<'static>,
    page: Template<'static>,
    index: Template<'static>,
}

impl Renderer {
    pub fn new() -> Result<Self> {
        let mut engine = Engine::new();
        addons::configure(&mut engine);
        let page = compile(&engine, PAGE_TEMPLATE)?;
        let index = compile(&engine, INDEX_TEMPLATE)?;
        Ok(Self { engine, page, index })
    }

    #[instrument(level = "debug", skip_all)]
    pub(crate) fn render_page(&self, values: Value) -> Result<String> {
        self.page.render(&self.engine, values).to_string().or_raise(|| ErrorKind::Template)
    }

    #[instrument(level = "debug", skip_all)]
    pub(crate) fn render_index(&self, values: Value) -> Result<String> {
        self.index.render(&self.engine, values).to_string().or_raise(|| ErrorKind::Template)
    }
}

fn compile(engine: &Engine<'static>, name: &str) -> Result<Template<'static>> {
    let source = String::from_utf8(Builtins::load(name)?.into_owned()).or_raise(|| ErrorKind::Template)?;
    engine.compile(source).or_raise(|| ErrorKind::Template)
}

/// Renders a string the way [`quoted`](addons) does, for values assembled
/// outside of a template (tag lists).
pub(crate) fn quote(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Custom [`upon`] formatter for front matter output.
mod addons {
    use std::fmt::Write;
    use upon::{Engine, Value, fmt as upon_fmt};

    fn quoted_formatter(f: &mut upon_fmt::Formatter<'_>, value: &Value) -> upon_fmt::Result {
        match value {
            Value::String(s) => write!(f, "{}", super::quote(s))?,
            v => upon_fmt::default(f, v)?,
        };
        Ok(())
    }

    pub(crate) fn configure(engine: &mut Engine<'_>) {
        engine.add_formatter("quoted", quoted_formatter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_templates_compile() {
        assert!(Builtins::get(PAGE_TEMPLATE).is_some());
        assert!(Builtins::get(INDEX_TEMPLATE).is_some());
        assert!(Renderer::new().is_ok());
    }

    #[test]
    fn test_quoted_escapes() {
        assert_eq!(quote("Field \"Notes\""), r#""Field \"Notes\"""#);
        assert_eq!(quote("plain"), "\"plain\"");
    }

    #[test]
    fn test_formatters() {
        let mut engine = Engine::new();
        addons::configure(&mut engine);
        let template = engine.compile("{{ name|quoted }} {{ count|quoted }}").unwrap();
        let out = template.render(&engine, upon::value! { name: "Lab Notes: Vol 2", count: 3 }).to_string().unwrap();
        assert_eq!(out, "\"Lab Notes: Vol 2\" 3");
    }
}
