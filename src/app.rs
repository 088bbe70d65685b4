use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::config::{self, Config};
use crate::logging;
use crate::posts::{extract_backlinks, Thread};
use crate::templates::Renderer;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderOptions {
    pub input: PathBuf,
    /// Render as seen on a board index page.
    pub index: bool,
    /// Render as seen on the aggregated `/all/` board.
    pub all: bool,
    pub config_file: Option<PathBuf>,
}

impl RenderOptions {
    /// Parses the arguments following the binary name.
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut opts = RenderOptions::default();
        let mut input = None;
        let mut args = args.into_iter().map(Into::into);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--render" => {
                    let path = args.next().context("--render expects a thread JSON file")?;
                    input = Some(PathBuf::from(path));
                }
                "--config" => {
                    let path = args.next().context("--config expects a file path")?;
                    opts.config_file = Some(PathBuf::from(path));
                }
                "--index" => opts.index = true,
                "--all" => opts.all = true,
                other => bail!("unknown argument {other:?}, see --help"),
            }
        }
        opts.input = input.context("nothing to do: pass --render <thread.json>, see --help")?;
        Ok(opts)
    }
}

pub fn run() -> Result<()> {
    let opts = RenderOptions::from_args(std::env::args().skip(1))?;
    let cfg = config::load(config::LoadOptions {
        config_file: opts.config_file.clone(),
        env_prefix: None,
    })
    .context("load config")?;
    logging::init(&cfg.log);

    let thread = read_thread(&opts.input)?;
    let html = render_thread(&cfg, &thread, opts.index, opts.all)?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(html.as_bytes()).context("write output")?;
    Ok(())
}

fn read_thread(path: &Path) -> Result<Thread> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read thread file at {}", path.display()))?;
    serde_json::from_str(&data)
        .with_context(|| format!("Failed to parse thread file at {}", path.display()))
}

/// Renders every post of `thread`, one per line, with times and backlinks filled in.
pub fn render_thread(cfg: &Config, thread: &Thread, index: bool, all: bool) -> Result<String> {
    let renderer = Renderer::from_config(cfg)?;
    let backlinks = extract_backlinks([thread]);

    let (posts, images) = thread.omitted();
    if posts > 0 {
        tracing::info!("Thread {} omits {posts} posts and {images} images", thread.id);
    }

    let mut out = String::new();
    for post in &thread.posts {
        let html = renderer
            .render_post_resolved(thread, post, &backlinks, index, all)
            .with_context(|| format!("render post {}", post.id))?;
        out.push_str(&html);
        out.push('\n');
    }
    tracing::debug!("Rendered {} posts of thread {}", thread.posts.len(), thread.id);
    Ok(out)
}
