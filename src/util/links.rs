use url::Url;

/// Resolves a possibly relative `href` against the page it was found on.
///
/// Absolute `http(s)` links pass through, protocol-relative links inherit the
/// base scheme, and everything else goes through [`Url::join`]. Returns `None`
/// for empty hrefs, fragment-only anchors, non-web schemes (`javascript:`,
/// `mailto:`) and bases that do not parse.
///
/// ```
/// use threatwire::util::resolve_url;
///
/// let base = "https://news.example.com/security/";
/// assert_eq!(
///     resolve_url("../posts/1", base).as_deref(),
///     Some("https://news.example.com/posts/1")
/// );
/// assert_eq!(resolve_url("javascript:void(0)", base), None);
/// ```
pub fn resolve_url(href: &str, base: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let base = Url::parse(base).ok()?;
    let resolved = base.join(href).ok()?;

    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}

/// Returns true when `s` parses as an absolute `http` or `https` URL.
pub fn is_web_url(s: &str) -> bool {
    Url::parse(s)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}
