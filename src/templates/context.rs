use std::sync::Arc;

use anyhow::Context as _;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine as _;
use chrono::FixedOffset;

use super::{Deferred, Expand, RenderContext, TemplateError, TemplateSet, Value};
use crate::body;
use crate::config::Config;
use crate::format;
use crate::lang::Lang;
use crate::posts::{self, Backlinks, Image, MyPosts, Post, Thread};

/// Builds render contexts for posts and expands them.
///
/// The output of every method here must stay identical to the server's renderer for the same
/// inputs; see [`crate::format`].
#[derive(Clone)]
pub struct Renderer {
    templates: Arc<dyn Expand + Send + Sync>,
    lang: Arc<Lang>,
    mine: MyPosts,
    uploads_root: String,
    relative_time: bool,
    /// `None` renders absolute times in the local zone.
    time_zone: Option<FixedOffset>,
}

impl Renderer {
    pub fn new(templates: Arc<dyn Expand + Send + Sync>, lang: Arc<Lang>) -> Self {
        Self {
            templates,
            lang,
            mine: MyPosts::new(),
            uploads_root: "/uploads".into(),
            relative_time: false,
            time_zone: None,
        }
    }

    /// A renderer over the built-in templates.
    pub fn builtin(lang: Arc<Lang>) -> Result<Self, TemplateError> {
        Ok(Self::new(Arc::new(TemplateSet::builtin()?), lang))
    }

    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let lang = Lang::builtin(&cfg.ui.lang)?;
        let renderer = Self::builtin(lang)
            .context("compile built-in templates")?
            .with_uploads_root(cfg.site.uploads_root.clone())
            .with_relative_time(cfg.ui.relative_time);
        Ok(renderer)
    }

    pub fn with_my_posts(mut self, mine: MyPosts) -> Self {
        self.mine = mine;
        self
    }

    pub fn with_uploads_root(mut self, root: impl Into<String>) -> Self {
        self.uploads_root = root.into();
        self
    }

    pub fn with_relative_time(mut self, relative: bool) -> Self {
        self.relative_time = relative;
        self
    }

    pub fn with_time_zone(mut self, tz: FixedOffset) -> Self {
        self.time_zone = Some(tz);
        self
    }

    pub fn lang(&self) -> &Lang {
        &self.lang
    }

    /// Context for the `post` template.
    ///
    /// `Time` and `Backlinks` are left as [`Deferred`] placeholders: the view updates them on
    /// their own when the clock ticks or new replies arrive, without re-rendering the post.
    /// `BacklinkIDs` carries the ids of the posts quoting this one, for that later pass.
    pub fn post_context(
        &self,
        thread: &Thread,
        post: &Post,
        backlinks: &Backlinks,
        index: bool,
        all: bool,
    ) -> Result<RenderContext, TemplateError> {
        let op = thread.id == post.id;
        let linkers: Vec<Value> = backlinks
            .get(&post.id)
            .map(|links| links.keys().map(|&id| Value::Uint(id)).collect())
            .unwrap_or_default();
        let files = post
            .files
            .iter()
            .map(|img| self.render_file(img).map(Value::Str))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RenderContext::new()
            .with("ID", post.id)
            .with("TID", thread.id)
            .with("Index", index)
            .with("OP", op)
            .with("HasBoard", op && index && all)
            .with("Board", post.board.as_str())
            .with("Subject", post.subject.as_str())
            .with("Badge", !post.auth.is_empty())
            .with("Auth", self.lang.tr(&post.auth))
            .with("Name", post.name.as_str())
            .with("HasFiles", !post.files.is_empty())
            .with("PostClass", post_class(post, op))
            .with("URL", permalink(post, thread.id, op, index))
            .with("Time", Deferred::Time)
            .with("Files", files)
            .with("Body", body::render_body(self, thread.id, post, index)?)
            .with("BacklinkIDs", linkers)
            .with("Backlinks", Deferred::Backlinks))
    }

    /// Renders a post with its deferred fields left empty.
    pub fn render_post(
        &self,
        thread: &Thread,
        post: &Post,
        backlinks: &Backlinks,
        index: bool,
        all: bool,
    ) -> Result<String, TemplateError> {
        let ctx = self.post_context(thread, post, backlinks, index, all)?;
        self.templates.expand("post", &ctx)
    }

    /// Renders a post with the time and backlink placeholders already filled in.
    pub fn render_post_resolved(
        &self,
        thread: &Thread,
        post: &Post,
        backlinks: &Backlinks,
        index: bool,
        all: bool,
    ) -> Result<String, TemplateError> {
        let ctx = self.post_context(thread, post, backlinks, index, all)?;
        let backlink_html = self.render_backlinks(post.id, backlinks, thread.id, index)?;
        let time_html = self.render_time(post);
        self.templates
            .expand_with("post", &ctx, &|field| match field {
                Deferred::Time => time_html.clone(),
                Deferred::Backlinks => backlink_html.clone(),
            })
    }

    /// Context for the `post-file` template.
    pub fn file_context(&self, img: &Image) -> RenderContext {
        let [width, height, thumb_width, thumb_height] = img.dims;
        RenderContext::new()
            .with("SHA1", img.sha1.as_str())
            .with("HasTitle", !img.title.is_empty())
            .with("LCopy", self.lang.tr("clickToCopy"))
            .with("Title", img.title.as_str())
            .with("HasVideo", img.video)
            .with("HasAudio", img.audio)
            .with("HasLength", img.video || img.audio)
            .with("Length", format::duration(img.length.unwrap_or(0)))
            .with("Record", img.audio && !img.video)
            .with("Size", format::file_size(&self.lang, img.size))
            .with("Width", width)
            .with("Height", height)
            .with("TWidth", thumb_width)
            .with("THeight", thumb_height)
            .with(
                "SourcePath",
                posts::source_path(&self.uploads_root, img.file_type, &img.sha1),
            )
            .with(
                "ThumbPath",
                posts::thumb_path(&self.uploads_root, img.thumb_type, &img.sha1),
            )
    }

    pub fn render_file(&self, img: &Image) -> Result<String, TemplateError> {
        self.templates.expand("post-file", &self.file_context(img))
    }

    /// Renders a quote link to post `id`, marked when the viewer wrote that post.
    pub fn render_post_link(
        &self,
        id: u64,
        cross: bool,
        index: bool,
    ) -> Result<String, TemplateError> {
        let ctx = RenderContext::new()
            .with("Cross", cross)
            .with("ID", id)
            .with("LYou", self.lang.tr("you"))
            .with("Mine", self.mine.has(id))
            .with("URL", format::post_link_url(id, cross, index));
        self.templates.expand("post-link", &ctx)
    }

    /// Text for a post's `Time` placeholder.
    pub fn render_time(&self, post: &Post) -> String {
        let text = if self.relative_time {
            format::relative_time(&self.lang, post.time)
        } else {
            match &self.time_zone {
                Some(tz) => format::readable_time_in(&self.lang, post.time, tz),
                None => format::readable_time(&self.lang, post.time),
            }
        };
        super::escape_html(&text)
    }

    /// Markup for a post's `Backlinks` placeholder, ordered by the linking post's id.
    pub fn render_backlinks(
        &self,
        post_id: u64,
        backlinks: &Backlinks,
        thread_id: u64,
        index: bool,
    ) -> Result<String, TemplateError> {
        let Some(links) = backlinks.get(&post_id) else {
            return Ok(String::new());
        };
        let rendered = links
            .iter()
            .map(|(&id, &op)| self.render_post_link(id, op != thread_id, index))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rendered.join(" "))
    }
}

fn post_class(post: &Post, op: bool) -> String {
    let mut classes = vec!["post".to_string()];
    if op {
        classes.push("post_op".into());
    }
    if !post.files.is_empty() {
        classes.push("post_file".into());
        if post.files.len() > 1 {
            classes.push("post_files".into());
        }
    }
    if body::has_embed(&post.body) {
        classes.push("post_embed".into());
    }
    if post.user_id.is_empty() {
        classes.push("post_by-anon".into());
    } else {
        classes.push(format!("post_by-{}", STANDARD_NO_PAD.encode(&post.user_id)));
    }
    classes.join(" ")
}

fn permalink(post: &Post, thread_id: u64, op: bool, index: bool) -> String {
    let fragment = if op {
        String::new()
    } else {
        format!("#{}", post.id)
    };
    if index {
        format!("/{}/{}{}", post.board, thread_id, fragment)
    } else {
        fragment
    }
}
