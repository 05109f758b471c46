use once_cell::sync::Lazy;
use regex::Regex;

/// Fallback extractor used when a strict parse fails: sitemaps.org XML is
/// simple enough that `<loc>…</loc>` values can be pulled out with a regex
/// even from truncated or malformed documents.
static LOC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<loc>\s*([^<]+?)\s*</loc>").unwrap());

/// Extract every `<loc>` value from a sitemap or sitemap-index document.
/// Tries a strict XML parse first (rejecting documents that aren't
/// well-formed XML at all), then falls back to the regex above for
/// anything else — including documents that are well-formed but whose
/// structure quick-xml's event reader chokes on in a way that shouldn't
/// be fatal to ingestion.
pub fn extract_locs(xml: &str) -> Vec<String> {
    match strict_parse(xml) {
        Ok(locs) if !locs.is_empty() => locs,
        _ => LOC_RE
            .captures_iter(xml)
            .map(|c| c[1].trim().to_string())
            .collect(),
    }
}

fn strict_parse(xml: &str) -> Result<Vec<String>, quick_xml::Error> {
    use quick_xml::events::Event;
    use quick_xml::reader::Reader;

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut locs = Vec::new();
    let mut in_loc = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"loc" => in_loc = true,
            Event::End(e) if e.local_name().as_ref() == b"loc" => in_loc = false,
            Event::Text(t) if in_loc => {
                locs.push(t.unescape()?.into_owned());
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(locs)
}

/// Whether a sitemap child reference should be prioritised as likely to
/// contain store URLs.
pub fn looks_like_store_sitemap(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.contains("store") || lower.contains("trgovina") || lower.contains("stores")
}

/// Retain only `<loc>` values that are actual store pages (contain the
/// `/trgovina/` path segment).
pub fn filter_store_urls(locs: Vec<String>) -> Vec<String> {
    locs.into_iter().filter(|u| u.contains("/trgovina/")).collect()
}
