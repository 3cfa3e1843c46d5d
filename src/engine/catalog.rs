//! The built-in source list and the default single-engine search.

use super::sources::text::encode_component;
use super::types::SourceDescriptor;

pub const DEFAULT_SEARCH_URL: &str = "https://www.google.com/search?q=%s";

pub const GITHUB: SourceDescriptor = SourceDescriptor {
    id: "github",
    display_name: "GitHub",
    icon_glyph: "GH",
    login_url: "https://github.com/login",
    search_needs_login: false,
    web_search_url_template: "https://github.com/search?q=%s&type=repositories",
    origin: "https://github.com",
    session_cookies: &[],
};

pub const LINUXDO: SourceDescriptor = SourceDescriptor {
    id: "linuxdo",
    display_name: "linux.do",
    icon_glyph: "LD",
    login_url: "https://linux.do/login",
    search_needs_login: false,
    web_search_url_template: "https://linux.do/search?q=%s",
    origin: "https://linux.do",
    session_cookies: &[],
};

pub const X: SourceDescriptor = SourceDescriptor {
    id: "x",
    display_name: "X (Twitter)",
    icon_glyph: "X",
    login_url: "https://x.com/i/flow/login",
    search_needs_login: true,
    web_search_url_template: "https://x.com/search?q=%s",
    origin: "https://x.com",
    session_cookies: &["auth_token", "ct0"],
};

pub const STACKOVERFLOW: SourceDescriptor = SourceDescriptor {
    id: "stackoverflow",
    display_name: "Stack Overflow",
    icon_glyph: "SO",
    login_url: "https://stackoverflow.com/users/login",
    search_needs_login: false,
    web_search_url_template: "https://stackoverflow.com/search?q=%s",
    origin: "https://stackoverflow.com",
    session_cookies: &[],
};

pub const REDDIT: SourceDescriptor = SourceDescriptor {
    id: "reddit",
    display_name: "Reddit",
    icon_glyph: "RD",
    login_url: "https://www.reddit.com/login",
    search_needs_login: false,
    web_search_url_template: "https://www.reddit.com/search/?q=%s",
    origin: "https://www.reddit.com",
    session_cookies: &[],
};

pub const HACKERNEWS: SourceDescriptor = SourceDescriptor {
    id: "hackernews",
    display_name: "Hacker News",
    icon_glyph: "HN",
    login_url: "https://news.ycombinator.com/login",
    search_needs_login: false,
    web_search_url_template: "https://hn.algolia.com/?q=%s",
    origin: "https://news.ycombinator.com",
    session_cookies: &[],
};

/// All sources in sidebar order.
pub static SOURCES: [SourceDescriptor; 6] = [GITHUB, LINUXDO, X, STACKOVERFLOW, REDDIT, HACKERNEWS];

pub fn find(id: &str) -> Option<&'static SourceDescriptor> {
    SOURCES.iter().find(|s| s.id == id)
}

/// URL for the plain (non-aggregate) search mode.
pub fn default_search_url(query: &str) -> String {
    DEFAULT_SEARCH_URL.replacen("%s", &encode_component(query), 1)
}
