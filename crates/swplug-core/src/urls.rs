//! URL normalization used to compare requests against asset lists.

use url::Url;

use crate::error::Result;

/// Resolve `url` against `origin` and return the absolute href.
///
/// `"/a.js"` and `"https://app.example/a.js"` normalize to the same value
/// when the origin is `https://app.example`.
pub fn normalize_url(url: &str, origin: &str) -> Result<String> {
    let base = Url::parse(origin)?;
    Ok(base.join(url)?.to_string())
}

/// Resolve asset paths against a base path such as `/` or `/my-app/`.
///
/// Absolute `http(s)` URLs are returned untouched. Other entries are
/// prefixed with the base path (trailing slash stripped) and normalized
/// against `origin`.
pub fn resolve_asset_urls(assets: &[String], base: Option<&str>, origin: &str) -> Result<Vec<String>> {
    let base_path = match base {
        None | Some("/") | Some("") => {
            return assets.iter().map(|a| normalize_url(a, origin)).collect();
        }
        Some(b) => b.trim_end_matches('/'),
    };

    assets
        .iter()
        .map(|asset| {
            if asset.starts_with("http://") || asset.starts_with("https://") {
                return Ok(asset.clone());
            }
            let path = if asset.starts_with('/') {
                asset.clone()
            } else {
                format!("/{asset}")
            };
            normalize_url(&format!("{base_path}{path}"), origin)
        })
        .collect()
}

/// Whether `request_url` is one of `assets` after normalization.
///
/// Unparseable URLs never match.
pub fn is_asset_request(request_url: &str, assets: &[String], origin: &str) -> bool {
    let Ok(href) = normalize_url(request_url, origin) else {
        return false;
    };
    assets
        .iter()
        .filter_map(|a| normalize_url(a, origin).ok())
        .any(|a| a == href)
}

/// Path component of `url` resolved against `origin`.
pub fn path_of(url: &str, origin: &str) -> Option<String> {
    let href = normalize_url(url, origin).ok()?;
    Url::parse(&href).ok().map(|u| u.path().to_string())
}
