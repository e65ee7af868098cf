//! User-Agent string for page requests.

/// Product comment identifying what the requests are for.
const UA_COMMENT: &str = "book-scan-archiver";

/// Default User-Agent for page requests (identifies the tool).
#[must_use]
pub(crate) fn default_page_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("page-downloader/{version} ({UA_COMMENT})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_has_version_and_comment() {
        let ua = default_page_user_agent();
        assert!(ua.ends_with("(book-scan-archiver)"), "got {ua}");
        assert_eq!(
            Some(env!("CARGO_PKG_VERSION")),
            ua.strip_prefix("page-downloader/")
                .and_then(|s| s.split(' ').next()),
            "UA must contain crate version"
        );
    }
}
