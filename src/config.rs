//! Loads the project file (`futhorc.yaml`) and the `bluesky_feed` section
//! within it. See [`Config::from_directory`].

use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use url::Url;

use crate::message::{Template, DEFAULT_TEMPLATE};
use crate::xrpc::DEFAULT_SERVICE;

/// The name of the project file.
pub const PROJECT_FILE: &str = "futhorc.yaml";

#[derive(Deserialize)]
struct Project {
    #[serde(default)]
    site_root: Option<Url>,

    #[serde(default)]
    bluesky_feed: FeedConfig,
}

/// The `bluesky_feed` section of the project file.
///
/// ```yaml
/// site_root: https://example.org/
/// bluesky_feed:
///   url: https://example.org/
///   message: "New post: {title} {url}"
/// ```
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct FeedConfig {
    /// The public URL of the site, used to build post links. Falls back to
    /// the project's `site_root` when absent.
    #[serde(default)]
    pub url: Option<Url>,

    /// The message template. See [`Template`].
    #[serde(default)]
    pub message: Option<String>,

    /// The XRPC service host sessions and records are created against.
    #[serde(default = "default_service")]
    pub service: Url,
}

fn default_service() -> Url {
    // the constant is a valid URL
    Url::parse(DEFAULT_SERVICE).unwrap()
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig {
            url: None,
            message: None,
            service: default_service(),
        }
    }
}

impl FeedConfig {
    /// Resolves the URL post links are built from: the feed's own `url`,
    /// otherwise `site_root`.
    pub fn site_url<'a>(&'a self, site_root: Option<&'a Url>) -> Option<&'a Url> {
        self.url.as_ref().or(site_root)
    }

    /// Returns the configured message template or [`DEFAULT_TEMPLATE`].
    pub fn template(&self) -> Template<'_> {
        Template::new(self.message.as_deref().unwrap_or(DEFAULT_TEMPLATE))
    }
}

/// The resolved configuration for a project.
#[derive(Clone, Debug)]
pub struct Config {
    /// The directory containing the project file.
    pub root_directory: PathBuf,

    /// The directory post sources are read from (`{root}/posts`).
    pub posts_source_directory: PathBuf,

    /// The site's public root, if the project declares one.
    pub site_root: Option<Url>,

    /// The `bluesky_feed` section.
    pub feed: FeedConfig,
}

impl Config {
    /// Searches `dir` and then each of its ancestors for a [`PROJECT_FILE`]
    /// and loads the first one found.
    pub fn from_directory(dir: &Path) -> Result<Config> {
        for candidate in dir.ancestors() {
            let path = candidate.join(PROJECT_FILE);
            if path.is_file() {
                return Config::from_project_file(&path);
            }
        }
        Err(Error::MissingProjectFile(dir.to_owned()))
    }

    /// Loads a [`Config`] from the project file at `path`. Relative
    /// directories resolve against the project file's parent directory.
    pub fn from_project_file(path: &Path) -> Result<Config> {
        let file = File::open(path).map_err(|err| Error::Open {
            path: path.to_owned(),
            err,
        })?;
        let project: Project =
            serde_yaml::from_reader(file).map_err(|err| Error::Parse {
                path: path.to_owned(),
                err,
            })?;
        let root_directory = match path.parent() {
            Some(parent) => parent.to_owned(),
            None => return Err(Error::NoParentDirectory(path.to_owned())),
        };
        Ok(Config {
            posts_source_directory: root_directory.join("posts"),
            root_directory,
            site_root: project.site_root,
            feed: project.bluesky_feed,
        })
    }
}

/// Represents the result of loading a [`Config`].
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem loading the project configuration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when no project file exists in the directory or any parent.
    #[error("could not find `futhorc.yaml` in `{}` or any parent directory", .0.display())]
    MissingProjectFile(PathBuf),

    /// Returned when the project file can't be opened.
    #[error("opening project file `{}`: {err}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    /// Returned when the project file isn't valid YAML or has the wrong
    /// shape.
    #[error("loading project file `{}`: {err}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        err: serde_yaml::Error,
    },

    /// Returned when the project file path has no parent directory.
    #[error("can't get parent directory for project file `{}`", .0.display())]
    NoParentDirectory(PathBuf),
}
