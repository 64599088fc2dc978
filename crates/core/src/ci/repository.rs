//! Repository remote normalization.
//!
//! CI systems expose the repository remote in whatever syntax the checkout
//! used. Two syntaxes are understood:
//!
//! - URL style: `scheme://host/path(.git)?`
//! - SCP style: `user@host:path(.git)?`
//!
//! Anything else passes through verbatim.

use std::sync::LazyLock;

use regex::Regex;

/// Hosts known to serve browsable repository pages over HTTPS.
pub const BROWSABLE_HOSTS: [&str; 3] = ["github.com", "gitlab.com", "bitbucket.org"];

static URL_REMOTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<prefix>[A-Za-z][A-Za-z0-9+.\-]*://[^/\s]+)/(?P<path>.+?)(?:\.git)?/?$")
        .expect("url remote pattern is valid")
});

static SCP_REMOTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@/:\s]+@(?P<host>[^:/\s]+):(?P<path>.+?)(?:\.git)?/?$")
        .expect("scp remote pattern is valid")
});

/// Turns a raw remote into an `owner/name` identifier.
///
/// Nested groups keep their extra segments (`group/sub/name`).
///
/// ```
/// use debscan_core::ci::repository::map_repository;
///
/// assert_eq!(map_repository("https://github.com/debricked/cli.git"), "debricked/cli");
/// assert_eq!(map_repository("git@gitlab.com:debricked/cli.git"), "debricked/cli");
/// ```
pub fn map_repository(raw: &str) -> String {
    if let Some(caps) = URL_REMOTE.captures(raw) {
        return caps["path"].to_owned();
    }
    if let Some(caps) = SCP_REMOTE.captures(raw) {
        return caps["path"].to_owned();
    }
    raw.to_owned()
}

/// Turns a raw remote into a browsable URL.
///
/// SCP-style remotes are rewritten to HTTPS only for [`BROWSABLE_HOSTS`];
/// any other SCP-style remote is returned byte-for-byte unchanged.
///
/// ```
/// use debscan_core::ci::repository::map_repository_url;
///
/// assert_eq!(
///     map_repository_url("git@gitlab.com:debricked/cli.git"),
///     "https://gitlab.com/debricked/cli"
/// );
/// assert_eq!(
///     map_repository_url("tcp@scm.com:debricked/sub/cli.git"),
///     "tcp@scm.com:debricked/sub/cli.git"
/// );
/// ```
pub fn map_repository_url(raw: &str) -> String {
    if let Some(caps) = URL_REMOTE.captures(raw) {
        return format!("{}/{}", &caps["prefix"], &caps["path"]);
    }
    if let Some(caps) = SCP_REMOTE.captures(raw) {
        let host = &caps["host"];
        if BROWSABLE_HOSTS.contains(&host) {
            return format!("https://{}/{}", host, &caps["path"]);
        }
    }
    raw.to_owned()
}
