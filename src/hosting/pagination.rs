use super::{ApiResult, HostingError};

/// One entry of an RFC 8288 `Link` header that points at a numbered page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink {
    pub rel: String,
    pub page: u32,
}

fn page_param(url: &str) -> Option<u32> {
    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "page")
        .and_then(|(_, value)| value.parse().ok())
}

fn parse_entry(entry: &str) -> Option<PageLink> {
    let mut parts = entry.split(';').map(str::trim);
    let url = parts.next()?.strip_prefix('<')?.strip_suffix('>')?;
    let rel = parts.find_map(|param| {
        let (key, value) = param.split_once('=')?;
        (key.trim() == "rel").then(|| value.trim().trim_matches('"').to_string())
    })?;
    Some(PageLink {
        rel,
        page: page_param(url)?,
    })
}

fn parse_link_header(header: &str) -> ApiResult<Vec<PageLink>> {
    header
        .split(',')
        .filter(|entry| !entry.trim().is_empty())
        .map(|entry| {
            parse_entry(entry)
                .ok_or_else(|| HostingError::Decode(format!("malformed Link entry: {}", entry.trim())))
        })
        .collect()
}

/// Determines the last page number of a listing from its `Link` header.
///
/// A response without a `Link` header is a single page. A header that points
/// to a next page must also name the last one.
pub fn last_page_from_link(header: Option<&str>, current_page: u32) -> ApiResult<u32> {
    let Some(header) = header.filter(|h| !h.trim().is_empty()) else {
        return Ok(current_page.max(1));
    };

    let links = parse_link_header(header)?;
    if let Some(last) = links.iter().find(|link| link.rel == "last") {
        return Ok(last.page.max(current_page));
    }
    if links.iter().any(|link| link.rel == "next") {
        return Err(HostingError::Decode(
            "Link header has rel=\"next\" but no rel=\"last\"".to_string(),
        ));
    }
    Ok(current_page.max(1))
}
