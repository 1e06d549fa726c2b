//! Defines the [`Post`] type and the logic for reading post metadata from the
//! posts source directory. Only the frontmatter is read; bodies are never
//! rendered.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::message::UNTITLED;

const MARKDOWN_EXTENSION: &str = "md";
const BUNDLE_INDEX: &str = "index.md";

/// The metadata of a single post.
#[derive(Clone, Debug, PartialEq)]
pub struct Post {
    /// The file stem of the post source, or the directory name for a bundle
    /// (`{posts_source_directory}/foo/index.md` has the ID `foo`).
    pub id: String,

    /// The title of the post, if it has one.
    pub title: Option<String>,

    /// The date of the post.
    pub date: NaiveDateTime,

    /// The post page's path relative to the site root
    /// (`posts/{id}.html`).
    pub path: String,
}

impl Post {
    /// Returns the post's title or [`UNTITLED`] if it's missing or empty.
    pub fn title_or_default(&self) -> &str {
        match self.title.as_deref() {
            Some(title) if !title.is_empty() => title,
            _ => UNTITLED,
        }
    }
}

/// Returns the newest post regardless of the order of `posts`. Among posts
/// with the same date the first one wins.
pub fn latest(posts: &[Post]) -> Option<&Post> {
    posts
        .iter()
        .reduce(|newest, post| if post.date > newest.date { post } else { newest })
}

/// Searches `source_directory` for post files and returns their metadata
/// sorted by date (most recent first). A post is either a `.md` file directly
/// inside `source_directory` or a directory containing an `index.md` (a
/// bundle). Each post file must be structured as follows:
///
/// 1. Initial frontmatter fence (`---`)
/// 2. YAML frontmatter with the field `Date` and optionally `Title`
/// 3. Terminal frontmatter fence (`---`)
/// 4. Post body
///
/// For example:
///
/// ```md
/// ---
/// Title: Hello, world!
/// Date: 2021-04-16
/// ---
/// # Hello
/// ```
///
/// A `source_directory` that doesn't exist holds no posts.
pub fn parse_posts(source_directory: &Path) -> Result<Vec<Post>> {
    let mut posts = Vec::new();
    if !source_directory.exists() {
        return Ok(posts);
    }
    for result in WalkDir::new(source_directory)
        .min_depth(1)
        .max_depth(2)
        .sort_by_file_name()
    {
        let entry = result?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_post = match entry.depth() {
            1 => entry.path().extension().map_or(false, |ext| ext == MARKDOWN_EXTENSION),
            _ => entry.file_name() == BUNDLE_INDEX,
        };
        if is_post {
            posts.push(parse_post(entry.path())?);
        }
    }

    posts.sort_by(|a, b| b.date.cmp(&a.date));
    Ok(posts)
}

/// Parses the [`Post`] at `path`, annotating any error with the path.
pub fn parse_post(path: &Path) -> Result<Post> {
    match _parse_post(path) {
        Ok(post) => Ok(post),
        Err(e) => Err(Error::Annotated(
            format!("parsing post `{}`", path.display()),
            Box::new(e),
        )),
    }
}

fn _parse_post(path: &Path) -> Result<Post> {
    let input = fs::read_to_string(path)?;
    let frontmatter = parse_frontmatter(&input)?;
    let id = post_id(path)?;
    Ok(Post {
        path: format!("posts/{}.html", id),
        date: parse_date(&frontmatter.date)
            .ok_or_else(|| Error::InvalidDate(frontmatter.date.clone()))?,
        title: frontmatter.title,
        id,
    })
}

fn parse_frontmatter(input: &str) -> Result<Frontmatter> {
    const FENCE: &str = "---";
    if !input.starts_with(FENCE) {
        return Err(Error::FrontmatterMissingStartFence);
    }
    let yaml_start = FENCE.len();
    let yaml_stop = match input[yaml_start..].find("\n---") {
        None => return Err(Error::FrontmatterMissingEndFence),
        Some(offset) => yaml_start + offset + 1,
    };
    Ok(serde_yaml::from_str(&input[yaml_start..yaml_stop])?)
}

fn post_id(path: &Path) -> Result<String> {
    let id = if path.file_name().map_or(false, |name| name == BUNDLE_INDEX) {
        path.parent().and_then(Path::file_name)
    } else {
        path.file_stem()
    };
    id.and_then(|id| id.to_str())
        .map(str::to_owned)
        .ok_or_else(|| Error::InvalidFileName(path.to_owned()))
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`, and RFC
/// 3339 timestamps (converted to UTC).
fn parse_date(input: &str) -> Option<NaiveDateTime> {
    let input = input.trim();
    if let Ok(date_time) = DateTime::parse_from_rfc3339(input) {
        return Some(date_time.naive_utc());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(date_time) = NaiveDateTime::parse_from_str(input, format) {
            return Some(date_time);
        }
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

#[derive(Deserialize)]
struct Frontmatter {
    /// The title of the post.
    #[serde(default, rename = "Title", alias = "title")]
    title: Option<String>,

    /// The date of the post.
    #[serde(rename = "Date", alias = "date")]
    date: String,
}

/// Represents the result of a [`Post`]-parse operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error parsing a [`Post`] object.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when a post source file is missing its starting frontmatter
    /// fence (`---`).
    #[error("post must begin with `---`")]
    FrontmatterMissingStartFence,

    /// Returned when a post source file is missing its terminal frontmatter
    /// fence (`---` i.e., the starting fence was found but the ending one was
    /// missing).
    #[error("missing closing `---`")]
    FrontmatterMissingEndFence,

    /// Returned when there was an error parsing the frontmatter as YAML.
    #[error(transparent)]
    DeserializeYaml(#[from] serde_yaml::Error),

    /// Returned when the `Date` field isn't in a recognized format.
    #[error("invalid date `{0}`")]
    InvalidDate(String),

    /// Returned when a source file name isn't valid UTF-8.
    #[error("invalid file name: {0:?}")]
    InvalidFileName(PathBuf),

    /// Returned for other I/O errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Returned for WalkDir I/O errors.
    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),

    /// An error with an annotation.
    #[error("{0}: {1}")]
    Annotated(String, #[source] Box<Error>),
}
