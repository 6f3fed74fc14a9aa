use url::Url;

const SHORTS_MARKER: &str = "youtube.com/shorts/";

pub fn normalize_video_url(input: &str) -> String {
    if !input.contains(SHORTS_MARKER) {
        return input.to_string();
    }

    let last_segment = input.rsplit('/').next().unwrap_or_default();
    let video_id = last_segment.split('?').next().unwrap_or_default();
    format!("https://www.youtube.com/watch?v={video_id}")
}

pub fn parse_http_url(input: &str) -> Option<Url> {
    let parsed = Url::parse(input.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return None;
    }
    Some(parsed)
}
