//! Exports [`Deploy`], which stitches together the steps of announcing the
//! newest post: checking the skip flag and credentials, composing the message
//! ([`crate::message`]), logging in and creating the post record
//! ([`crate::xrpc`]).
//!
//! Every step either continues or stops the deploy. Missing setup (no
//! credentials, no site URL, no posts) is a [`Skip`] so a site without
//! Bluesky configured still deploys; anything that goes wrong after that is
//! an [`Error`].

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::fmt;
use url::Url;

use crate::config::FeedConfig;
use crate::credentials::{Credentials, APP_PASSWORD_VAR, HANDLE_VAR};
use crate::facet::{link_facets, Facet};
use crate::message::{is_too_long, post_url, MAX_LENGTH};
use crate::post::{latest, Post};
use crate::xrpc::{self, CreateRecord, CreateSession, PostRecord, RecordRef, Service};

/// Options passed by whoever triggers the deploy.
#[derive(Clone, Debug, Default)]
pub struct Options {
    /// Don't post anything.
    pub skip: bool,

    /// Link to this URL instead of the one derived from the latest post.
    pub post_url: Option<String>,
}

/// Everything a deploy reads. The posts themselves are passed to
/// [`Deploy::run`].
#[derive(Clone, Copy, Debug)]
pub struct Deploy<'a> {
    pub feed: &'a FeedConfig,
    pub site_root: Option<&'a Url>,
    pub credentials: Option<&'a Credentials>,
    pub options: &'a Options,
}

/// Why a deploy didn't post.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Skip {
    /// The caller asked to skip.
    Requested,

    /// The handle or app password isn't set.
    MissingCredentials,

    /// Neither `bluesky_feed.url` nor `site_root` is configured.
    MissingSiteUrl,

    /// There's no post to announce.
    NoPosts,
}

impl fmt::Display for Skip {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Skip::Requested => write!(f, "skip requested with `--skip-bluesky`"),
            Skip::MissingCredentials => write!(
                f,
                "missing {} or {} in the environment",
                HANDLE_VAR, APP_PASSWORD_VAR
            ),
            Skip::MissingSiteUrl => write!(
                f,
                "no site URL configured (set `bluesky_feed.url` or `site_root`)"
            ),
            Skip::NoPosts => write!(f, "no posts found"),
        }
    }
}

/// The result of a deploy that didn't fail.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Skipped(Skip),
    Published(RecordRef),
}

/// A message ready to be posted.
#[derive(Clone, Debug, PartialEq)]
pub struct Draft<'a> {
    pub credentials: &'a Credentials,
    pub post: &'a Post,
    pub url: String,
    pub text: String,
    pub facets: Vec<Facet>,
}

/// What [`Deploy::plan`] decided.
#[derive(Clone, Debug, PartialEq)]
pub enum Plan<'a> {
    Skip(Skip),
    Post(Draft<'a>),
}

impl<'a> Deploy<'a> {
    /// Runs every step that doesn't touch the network: the skip flag,
    /// credentials, site URL, latest post, and message.
    pub fn plan<'p>(&self, posts: &'p [Post]) -> Result<Plan<'p>>
    where
        'a: 'p,
    {
        if self.options.skip {
            return Ok(Plan::Skip(Skip::Requested));
        }
        let credentials = match self.credentials {
            Some(credentials) => credentials,
            None => return Ok(Plan::Skip(Skip::MissingCredentials)),
        };
        let site_url = match self.feed.site_url(self.site_root) {
            Some(site_url) => site_url,
            None => return Ok(Plan::Skip(Skip::MissingSiteUrl)),
        };
        let post = match latest(posts) {
            Some(post) => post,
            None => return Ok(Plan::Skip(Skip::NoPosts)),
        };

        let url = match &self.options.post_url {
            Some(url) => url.clone(),
            None if post.path.is_empty() => {
                return Err(Error::MissingPostPath(post.id.clone()))
            }
            None => post_url(site_url, &post.path)?.to_string(),
        };
        let text = self.feed.template().render(post.title_or_default(), &url);
        let facets = link_facets(&text, &url);
        Ok(Plan::Post(Draft {
            credentials,
            post,
            url,
            text,
            facets,
        }))
    }

    /// Announces the latest of `posts`, stamping the record with `now`.
    pub fn run<S: Service>(
        &self,
        service: &S,
        posts: &[Post],
        now: DateTime<Utc>,
    ) -> Result<Outcome> {
        let draft = match self.plan(posts)? {
            Plan::Skip(skip) => {
                match skip {
                    Skip::Requested | Skip::NoPosts => info!("Skipping Bluesky update: {}", skip),
                    _ => warn!("Skipping Bluesky update: {}", skip),
                }
                return Ok(Outcome::Skipped(skip));
            }
            Plan::Post(draft) => draft,
        };
        info!("Constructed message for `{}`: {}", draft.post.id, draft.text);
        if is_too_long(&draft.text) {
            warn!(
                "Message is longer than {} characters; Bluesky may reject it",
                MAX_LENGTH
            );
        }

        let session = service
            .create_session(&CreateSession {
                identifier: &draft.credentials.handle,
                password: &draft.credentials.app_password,
            })
            .map_err(Error::Session)?;
        let (access_jwt, did) = match (session.access_jwt, session.did) {
            (Some(access_jwt), Some(did)) if !access_jwt.is_empty() && !did.is_empty() => {
                (access_jwt, did)
            }
            _ => return Err(Error::IncompleteSession),
        };
        info!("Obtained access token and DID {} from Bluesky", did);

        let record = PostRecord::new(draft.text, draft.facets, now);
        let request = CreateRecord::post(&did, &record);
        if log::log_enabled!(log::Level::Debug) {
            match serde_json::to_string(&request) {
                Ok(payload) => debug!("Publishing update with payload: {}", payload),
                Err(e) => debug!("Publishing update (payload not printable: {})", e),
            }
        }
        let created = service
            .create_record(&access_jwt, &request)
            .map_err(Error::Publish)?;
        info!("Successfully published update to Bluesky: {}", created.uri);
        Ok(Outcome::Published(created))
    }
}

/// Represents the result of a deploy.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a deploy that started posting and failed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when the latest post has no path and no URL override was
    /// given.
    #[error("latest post `{0}` does not have a valid path")]
    MissingPostPath(String),

    /// Returned when the post path can't be joined onto the site URL.
    #[error("building post URL: {0}")]
    PostUrl(#[from] url::ParseError),

    /// Returned when logging in fails.
    #[error("creating Bluesky session: {0}")]
    Session(#[source] xrpc::Error),

    /// Returned when the login response lacks the access token or DID.
    #[error("session response did not contain accessJwt or did")]
    IncompleteSession,

    /// Returned when creating the post record fails.
    #[error("publishing update to Bluesky: {0}")]
    Publish(#[source] xrpc::Error),
}
