use once_cell::sync::Lazy;
use regex::Regex;

use crate::posts::Post;
use crate::templates::{escape_html, Renderer, TemplateError};

/// Embed providers, checked in order.
static EMBEDS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        (
            "youtube",
            r"https?://(?:[^\./\s]+\.)?(?:youtu\.be/|youtube\.com/(?:embed/|v/|watch\?v=))[a-zA-Z0-9_-]+",
        ),
        ("vimeo", r"https?://(?:www\.)?vimeo\.com/\d+"),
        ("soundcloud", r"https?://soundcloud\.com/[\w-]+/[\w-]+"),
        ("coub", r"https?://coub\.com/view/\w+"),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).expect("valid embed regex")))
    .collect()
});

static POST_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r">>(\d+)").expect("valid post link regex"));

/// Name of the first embed provider whose pattern occurs in `body`.
pub fn embed_provider(body: &str) -> Option<&'static str> {
    EMBEDS
        .iter()
        .find(|(_, re)| re.is_match(body))
        .map(|(name, _)| *name)
}

pub fn has_embed(body: &str) -> bool {
    embed_provider(body).is_some()
}

/// Renders a post's raw text as HTML.
///
/// Quote links (`>>123`) become post links only for posts the server resolved into
/// [`Post::links`]; anything else stays literal text.
pub fn render_body(
    renderer: &Renderer,
    thread_id: u64,
    post: &Post,
    index: bool,
) -> Result<String, TemplateError> {
    let mut lines = Vec::new();
    for line in post.body.split('\n') {
        let html = render_line(renderer, thread_id, post, index, line)?;
        let quoted = line.starts_with('>') && !starts_with_post_link(line);
        if quoted {
            lines.push(format!("<em class=\"post-quote\">{html}</em>"));
        } else {
            lines.push(html);
        }
    }
    Ok(lines.join("<br>"))
}

fn starts_with_post_link(line: &str) -> bool {
    POST_LINK_RE.find(line).is_some_and(|m| m.start() == 0)
}

fn render_line(
    renderer: &Renderer,
    thread_id: u64,
    post: &Post,
    index: bool,
    line: &str,
) -> Result<String, TemplateError> {
    let mut out = String::new();
    let mut last = 0;
    for caps in POST_LINK_RE.captures_iter(line) {
        let whole = caps.get(0).expect("capture 0 always present");
        let target = caps[1].parse::<u64>().ok().and_then(|id| {
            post.link_op(id).map(|op| (id, op))
        });
        let Some((id, op)) = target else {
            continue;
        };
        out.push_str(&escape_html(&line[last..whole.start()]));
        out.push_str(&renderer.render_post_link(id, op != thread_id, index)?);
        last = whole.end();
    }
    out.push_str(&escape_html(&line[last..]));
    Ok(out)
}
