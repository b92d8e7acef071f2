/// Extracts the lower-cased host from a URL, the way the rate limiter keys
/// its per-host token buckets. Falls back to `"unknown"` on a malformed URL
/// rather than failing the caller — an unconfigured/unresolvable host simply
/// doesn't get rate limited.
pub fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_lowercased_host() {
        assert_eq!(host_of("https://API.CurseForge.com/v1/mods/1"), "api.curseforge.com");
    }

    #[test]
    fn falls_back_on_malformed_url() {
        assert_eq!(host_of("not a url"), "unknown");
    }
}
