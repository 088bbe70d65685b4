use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

/// Upload formats, as named in the server JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    #[default]
    Jpg,
    Png,
    Gif,
    Webm,
    Mp4,
    Mp3,
    Ogg,
    Flac,
}

impl FileType {
    pub fn extension(&self) -> &'static str {
        match self {
            FileType::Jpg => "jpg",
            FileType::Png => "png",
            FileType::Gif => "gif",
            FileType::Webm => "webm",
            FileType::Mp4 => "mp4",
            FileType::Mp3 => "mp3",
            FileType::Ogg => "ogg",
            FileType::Flac => "flac",
        }
    }
}

/// A file attached to a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Image {
    #[serde(rename = "SHA1")]
    pub sha1: String,
    #[serde(default)]
    pub file_type: FileType,
    #[serde(default)]
    pub thumb_type: FileType,
    /// Width, height, thumbnail width, thumbnail height.
    #[serde(default)]
    pub dims: [u32; 4],
    /// Media length in seconds.
    #[serde(default)]
    pub length: Option<u64>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub audio: bool,
    #[serde(default)]
    pub video: bool,
}

pub fn source_path(uploads_root: &str, file_type: FileType, sha1: &str) -> String {
    format!("{}/src/{}.{}", uploads_root, sha1, file_type.extension())
}

pub fn thumb_path(uploads_root: &str, thumb_type: FileType, sha1: &str) -> String {
    format!("{}/thumb/{}.{}", uploads_root, sha1, thumb_type.extension())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Post {
    pub id: u64,
    #[serde(default)]
    pub op: u64,
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub board: String,
    #[serde(default)]
    pub subject: String,
    /// Staff title the post was made under, empty for regular users.
    #[serde(default)]
    pub auth: String,
    #[serde(default)]
    pub name: String,
    /// Stable author identifier; empty for anonymous posters.
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub files: Vec<Image>,
    /// Posts this post quotes, as `(post, thread)` pairs.
    #[serde(default)]
    pub links: Vec<(u64, u64)>,
}

impl Post {
    /// Thread of a quoted post, if this post links to it.
    pub fn link_op(&self, id: u64) -> Option<u64> {
        self.links
            .iter()
            .find(|(post, _)| *post == id)
            .map(|(_, op)| *op)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Thread {
    pub id: u64,
    #[serde(default)]
    pub board: String,
    #[serde(default)]
    pub subject: String,
    /// Set when only the last few replies were sent.
    #[serde(default)]
    pub abbrev: bool,
    #[serde(default)]
    pub post_ctr: u64,
    #[serde(default)]
    pub image_ctr: u64,
    /// All sent posts, the OP first.
    #[serde(default)]
    pub posts: Vec<Post>,
}

impl Thread {
    pub fn op(&self) -> Option<&Post> {
        self.posts.first()
    }

    /// Returns the post and image counts left out of an abbreviated thread.
    pub fn omitted(&self) -> (u64, u64) {
        // Deletions can leave gaps even in complete threads, so only abbreviated
        // threads are counted.
        if !self.abbrev {
            return (0, 0);
        }
        let omit = self.post_ctr.saturating_sub(self.posts.len() as u64);
        if omit == 0 {
            return (0, 0);
        }
        let shown: u64 = self.posts.iter().map(|p| p.files.len() as u64).sum();
        (omit, self.image_ctr.saturating_sub(shown))
    }
}

/// Reverse links: quoted post -> (quoting post -> thread of quoting post).
pub type Backlinks = BTreeMap<u64, BTreeMap<u64, u64>>;

/// Collects reverse links for every post quoted on a page.
pub fn extract_backlinks<'a>(threads: impl IntoIterator<Item = &'a Thread>) -> Backlinks {
    let mut backlinks = Backlinks::new();
    for thread in threads {
        for post in &thread.posts {
            for (target, _) in &post.links {
                backlinks
                    .entry(*target)
                    .or_default()
                    .insert(post.id, thread.id);
            }
        }
    }
    backlinks
}

/// Ids of posts the viewer made.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MyPosts(HashSet<u64>);

impl MyPosts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: u64) {
        self.0.insert(id);
    }

    pub fn has(&self, id: u64) -> bool {
        self.0.contains(&id)
    }
}

impl FromIterator<u64> for MyPosts {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
