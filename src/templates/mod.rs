//! Render contexts and the logic-less template expansion they feed.
//!
//! Contexts are flat, ordered key/value lists built fresh for each render. Values that the
//! view layer fills in independently later (the post clock and the backlink list) are carried
//! as [`Deferred`] placeholders and expand to nothing unless a resolver is supplied.

pub mod context;

use std::collections::HashMap;

use thiserror::Error;

pub use context::Renderer;

const POST: &str = include_str!("../../templates/post.html");
const POST_FILE: &str = include_str!("../../templates/post-file.html");
const POST_LINK: &str = include_str!("../../templates/post-link.html");

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown template {0:?}")]
    Unknown(String),
    #[error("template {template:?}: {message}")]
    Syntax { template: String, message: String },
}

/// Fields the builder leaves for a later, narrower re-render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Deferred {
    Time,
    Backlinks,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Str(String),
    List(Vec<Value>),
    Context(RenderContext),
    Deferred(Deferred),
}

impl Value {
    /// Section truthiness, following mustache.js.
    fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Uint(n) => *n != 0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Context(_) => true,
            Value::Deferred(_) => false,
        }
    }

    fn text(&self, deferred: &dyn Fn(Deferred) -> String) -> String {
        match self {
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Uint(n) => n.to_string(),
            Value::Str(s) => s.clone(),
            Value::List(items) => items
                .iter()
                .map(|item| item.text(deferred))
                .collect::<Vec<_>>()
                .join(","),
            Value::Context(_) => String::new(),
            Value::Deferred(field) => deferred(*field),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Uint(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<RenderContext> for Value {
    fn from(v: RenderContext) -> Self {
        Value::Context(v)
    }
}

impl From<Deferred> for Value {
    fn from(v: Deferred) -> Self {
        Value::Deferred(v)
    }
}

/// An ordered set of template keys. Setting a key twice replaces the earlier value in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderContext {
    fields: Vec<(&'static str, Value)>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &'static str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &'static str, value: impl Into<Value>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|(k, _)| *k)
    }
}

/// Expands named templates against a [`RenderContext`].
pub trait Expand {
    /// Expands with every deferred field left empty.
    fn expand(&self, name: &str, ctx: &RenderContext) -> Result<String, TemplateError> {
        self.expand_with(name, ctx, &|_| String::new())
    }

    /// Expands with deferred fields filled by `deferred`. Its output is inserted unescaped.
    fn expand_with(
        &self,
        name: &str,
        ctx: &RenderContext,
        deferred: &dyn Fn(Deferred) -> String,
    ) -> Result<String, TemplateError>;
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Var { name: String, escape: bool },
    Section { name: String, inverted: bool, children: Vec<Node> },
}

/// Compiled templates, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    templates: HashMap<String, Vec<Node>>,
}

impl TemplateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The `post`, `post-file` and `post-link` templates shared with the server.
    pub fn builtin() -> Result<Self, TemplateError> {
        let mut set = Self::new();
        set.insert("post", POST)?;
        set.insert("post-file", POST_FILE)?;
        set.insert("post-link", POST_LINK)?;
        Ok(set)
    }

    pub fn insert(&mut self, name: &str, source: &str) -> Result<(), TemplateError> {
        let nodes = parse(source).map_err(|message| TemplateError::Syntax {
            template: name.to_string(),
            message,
        })?;
        self.templates.insert(name.to_string(), nodes);
        Ok(())
    }
}

impl Expand for TemplateSet {
    fn expand_with(
        &self,
        name: &str,
        ctx: &RenderContext,
        deferred: &dyn Fn(Deferred) -> String,
    ) -> Result<String, TemplateError> {
        let nodes = self
            .templates
            .get(name)
            .ok_or_else(|| TemplateError::Unknown(name.to_string()))?;
        let root = Value::Context(ctx.clone());
        let mut out = String::new();
        render_nodes(nodes, &mut vec![&root], deferred, &mut out);
        Ok(out)
    }
}

fn parse(source: &str) -> Result<Vec<Node>, String> {
    let mut current: Vec<Node> = Vec::new();
    let mut open: Vec<(String, bool, Vec<Node>)> = Vec::new();
    let mut rest = source;

    while let Some(start) = rest.find("{{") {
        if start > 0 {
            current.push(Node::Text(rest[..start].to_string()));
        }
        let after = &rest[start + 2..];

        if let Some(inner) = after.strip_prefix('{') {
            let end = inner.find("}}}").ok_or("unclosed {{{ tag")?;
            current.push(Node::Var {
                name: inner[..end].trim().to_string(),
                escape: false,
            });
            rest = &inner[end + 3..];
            continue;
        }

        let end = after.find("}}").ok_or("unclosed {{ tag")?;
        let tag = after[..end].trim();
        rest = &after[end + 2..];

        let (sigil, name) = match tag.chars().next() {
            Some(c @ ('#' | '^' | '/' | '&' | '!')) => (Some(c), tag[1..].trim()),
            _ => (None, tag),
        };
        match sigil {
            Some('!') => {}
            Some('#') | Some('^') => {
                let parent = std::mem::take(&mut current);
                open.push((name.to_string(), sigil == Some('^'), parent));
            }
            Some('/') => {
                let (opened, inverted, parent) = open
                    .pop()
                    .ok_or_else(|| format!("unexpected closing tag {name:?}"))?;
                if opened != name {
                    return Err(format!("section {opened:?} closed by {name:?}"));
                }
                let children = std::mem::replace(&mut current, parent);
                current.push(Node::Section {
                    name: opened,
                    inverted,
                    children,
                });
            }
            Some('&') => current.push(Node::Var {
                name: name.to_string(),
                escape: false,
            }),
            _ => current.push(Node::Var {
                name: name.to_string(),
                escape: true,
            }),
        }
    }

    if let Some((name, _, _)) = open.last() {
        return Err(format!("unclosed section {name:?}"));
    }
    if !rest.is_empty() {
        current.push(Node::Text(rest.to_string()));
    }
    Ok(current)
}

fn lookup<'a>(stack: &[&'a Value], name: &str) -> Option<&'a Value> {
    if name == "." {
        return stack.last().copied();
    }
    stack.iter().rev().find_map(|frame| match *frame {
        Value::Context(ctx) => ctx.get(name),
        _ => None,
    })
}

fn render_nodes<'a>(
    nodes: &'a [Node],
    stack: &mut Vec<&'a Value>,
    deferred: &dyn Fn(Deferred) -> String,
    out: &mut String,
) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Var { name, escape } => {
                let Some(value) = lookup(stack, name) else {
                    continue;
                };
                let text = value.text(deferred);
                if *escape && !matches!(value, Value::Deferred(_)) {
                    out.push_str(&escape_html(&text));
                } else {
                    out.push_str(&text);
                }
            }
            Node::Section {
                name,
                inverted,
                children,
            } => {
                let value = lookup(stack, name);
                let truthy = value.map(Value::is_truthy).unwrap_or(false);
                if *inverted {
                    if !truthy {
                        render_nodes(children, stack, deferred, out);
                    }
                    continue;
                }
                let Some(value) = value.filter(|_| truthy) else {
                    continue;
                };
                match value {
                    Value::List(items) => {
                        for item in items {
                            stack.push(item);
                            render_nodes(children, stack, deferred, out);
                            stack.pop();
                        }
                    }
                    other => {
                        stack.push(other);
                        render_nodes(children, stack, deferred, out);
                        stack.pop();
                    }
                }
            }
        }
    }
}

/// HTML escaping identical to mustache.js.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '/' => out.push_str("&#x2F;"),
            '`' => out.push_str("&#x60;"),
            '=' => out.push_str("&#x3D;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(name: &str, src: &str) -> TemplateSet {
        let mut set = TemplateSet::new();
        set.insert(name, src).unwrap();
        set
    }

    #[test]
    fn variables_escape_unless_raw() {
        let set = set("t", "{{A}}|{{{A}}}|{{&A}}|{{Missing}}");
        let ctx = RenderContext::new().with("A", "<b>");
        assert_eq!(set.expand("t", &ctx).unwrap(), "&lt;b&gt;|<b>|<b>|");
    }

    #[test]
    fn sections_follow_truthiness() {
        let set = set("t", "{{#Yes}}y{{/Yes}}{{#No}}n{{/No}}{{^No}}!n{{/No}}{{#Zero}}z{{/Zero}}");
        let ctx = RenderContext::new()
            .with("Yes", true)
            .with("No", false)
            .with("Zero", 0u64);
        assert_eq!(set.expand("t", &ctx).unwrap(), "y!n");
    }

    #[test]
    fn list_sections_iterate_and_see_parents() {
        let set = set("t", "{{#Items}}[{{.}}{{Sep}}]{{/Items}}{{^Empty}}none{{/Empty}}");
        let ctx = RenderContext::new()
            .with("Items", vec![Value::from("a"), Value::from("b")])
            .with("Sep", ";")
            .with("Empty", Vec::<Value>::new());
        assert_eq!(set.expand("t", &ctx).unwrap(), "[a;][b;]none");
    }

    #[test]
    fn nested_contexts_shadow_outer_keys() {
        let set = set("t", "{{#Inner}}{{Name}}/{{Outer}}{{/Inner}}");
        let ctx = RenderContext::new()
            .with("Name", "outer")
            .with("Outer", "o")
            .with("Inner", RenderContext::new().with("Name", "inner"));
        assert_eq!(set.expand("t", &ctx).unwrap(), "inner/o");
    }

    #[test]
    fn deferred_fields_are_placeholders() {
        let set = set("t", "<time>{{Time}}</time>{{#Time}}never{{/Time}}");
        let ctx = RenderContext::new().with("Time", Deferred::Time);
        assert_eq!(set.expand("t", &ctx).unwrap(), "<time></time>");
        let filled = set
            .expand_with("t", &ctx, &|field| match field {
                Deferred::Time => "<i>now</i>".into(),
                Deferred::Backlinks => String::new(),
            })
            .unwrap();
        assert_eq!(filled, "<time><i>now</i></time>");
    }

    #[test]
    fn setting_a_key_twice_keeps_order() {
        let ctx = RenderContext::new().with("A", 1u64).with("B", 2u64).with("A", 3u64);
        assert_eq!(ctx.keys().collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(ctx.get("A"), Some(&Value::Uint(3)));
    }

    #[test]
    fn syntax_errors_name_the_template() {
        let mut set = TemplateSet::new();
        let err = set.insert("bad", "{{#A}}x{{/B}}").unwrap_err();
        assert!(matches!(err, TemplateError::Syntax { ref template, .. } if template == "bad"));
        assert!(set.insert("open", "{{#A}}x").is_err());
        assert!(set.insert("tag", "{{A").is_err());
        assert_eq!(
            set.expand("nope", &RenderContext::new()),
            Err(TemplateError::Unknown("nope".into()))
        );
    }

    #[test]
    fn escapes_like_mustache_js() {
        assert_eq!(escape_html(r#"a&b<c>"d'e/f`g=h"#), "a&amp;b&lt;c&gt;&quot;d&#39;e&#x2F;f&#x60;g&#x3D;h");
    }

    #[test]
    fn builtin_templates_compile() {
        TemplateSet::builtin().unwrap();
    }
}
