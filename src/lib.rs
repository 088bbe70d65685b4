#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod body;
pub mod config;
pub mod format;
pub mod lang;
pub mod logging;
pub mod navigation;
pub mod page;
pub mod posts;
pub mod templates;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
pub use navigation::{NavError, Navigator};
pub use page::{matches, PageDescriptor};
pub use templates::Renderer;
