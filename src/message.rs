//! Builds the status-update text: the post's public URL ([`post_url`]) and the
//! message template ([`Template`]).

use url::{ParseError, Url};

/// The template used when the project doesn't configure one.
pub const DEFAULT_TEMPLATE: &str =
    "Just published new blog post: {title}. Check it out here: {url}";

/// The title used for posts without one.
pub const UNTITLED: &str = "New post";

/// Bluesky rejects posts longer than this many graphemes. We count `char`s,
/// which never undercounts graphemes.
pub const MAX_LENGTH: usize = 300;

const TITLE: &str = "{title}";
const URL: &str = "{url}";

/// A message template with `{title}` and `{url}` placeholders.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Template<'a>(&'a str);

impl<'a> Template<'a> {
    pub fn new(template: &'a str) -> Self {
        Template(template)
    }

    pub fn as_str(&self) -> &'a str {
        self.0
    }

    /// Substitutes the first `{title}` and then the first `{url}`. Only one
    /// occurrence of each placeholder is replaced; a template without a
    /// placeholder simply omits that value.
    pub fn render(&self, title: &str, url: &str) -> String {
        self.0.replacen(TITLE, title, 1).replacen(URL, url, 1)
    }
}

/// Joins a post's site-relative `path` onto `site_url`. The site URL is
/// treated as a directory even when it lacks a trailing slash, so
/// `https://example.org/blog` + `posts/a.html` is
/// `https://example.org/blog/posts/a.html`.
pub fn post_url(site_url: &Url, path: &str) -> Result<Url, ParseError> {
    // NOTE: [`Url::join`] treats the last path segment as a file name unless
    // it ends in a slash, and a leading slash on `path` would discard the
    // site's own path entirely.
    let mut base = site_url.clone();
    if !base.path().ends_with('/') {
        let dir = format!("{}/", base.path());
        base.set_path(&dir);
    }
    base.join(path.trim_start_matches('/'))
}

/// Reports whether `message` is over [`MAX_LENGTH`].
pub fn is_too_long(message: &str) -> bool {
    message.chars().count() > MAX_LENGTH
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_render_default() {
        assert_eq!(
            "Just published new blog post: Hello. Check it out here: \
             https://example.org/posts/hello.html",
            Template::new(DEFAULT_TEMPLATE)
                .render("Hello", "https://example.org/posts/hello.html"),
        );
    }

    #[test]
    fn test_render_first_occurrence_only() {
        assert_eq!(
            "a b {title} {url}",
            Template::new("{title} {url} {title} {url}").render("a", "b"),
        );
    }

    #[test]
    fn test_render_missing_placeholders() {
        assert_eq!("static", Template::new("static").render("a", "b"));
        assert_eq!("see b", Template::new("see {url}").render("a", "b"));
    }

    #[test]
    fn test_render_title_before_url() {
        // the title is substituted first, so a literal `{url}` in a title
        // takes the URL's place
        assert_eq!(
            "on b: {url}",
            Template::new("{title}: {url}").render("on {url}", "b"),
        );
    }

    #[test]
    fn test_post_url() -> Result<(), ParseError> {
        fixture("https://example.org/posts/a.html", "https://example.org", "posts/a.html")?;
        fixture("https://example.org/posts/a.html", "https://example.org/", "/posts/a.html")?;
        fixture(
            "https://example.org/blog/posts/a.html",
            "https://example.org/blog",
            "posts/a.html",
        )?;
        fixture(
            "https://example.org/blog/2024/01/02/hello/",
            "https://example.org/blog/",
            "2024/01/02/hello/",
        )
    }

    #[test]
    fn test_is_too_long() {
        assert!(!is_too_long(&"x".repeat(MAX_LENGTH)));
        assert!(is_too_long(&"x".repeat(MAX_LENGTH + 1)));
        // multi-byte characters count once
        assert!(!is_too_long(&"é".repeat(MAX_LENGTH)));
    }

    fn fixture(wanted: &str, site: &str, path: &str) -> Result<(), ParseError> {
        assert_eq!(wanted, post_url(&Url::parse(site)?, path)?.as_str());
        Ok(())
    }
}
