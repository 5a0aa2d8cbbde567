//! `Accept` header negotiation.

/// Strips parameters and lowercases a media type.
pub(crate) fn essence(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

struct Range {
    main: String,
    sub: String,
    quality: f32,
}

impl Range {
    fn parse(item: &str) -> Option<Self> {
        let mut parts = item.split(';');
        let media = parts.next()?.trim().to_ascii_lowercase();
        let (main, sub) = media.split_once('/')?;
        let mut quality = 1.0;
        for param in parts {
            if let Some((key, value)) = param.split_once('=')
                && key.trim().eq_ignore_ascii_case("q")
            {
                quality = value.trim().parse().unwrap_or(0.0);
            }
        }
        Some(Self {
            main: main.trim().to_string(),
            sub: sub.trim().to_string(),
            quality,
        })
    }

    fn matches(&self, offer: &str) -> bool {
        let Some((main, sub)) = offer.split_once('/') else {
            return false;
        };
        match (self.main.as_str(), self.sub.as_str()) {
            ("*", "*") => true,
            (m, "*") => m == main,
            (m, s) => m == main && s == sub,
        }
    }
}

/// Picks the offer best matching `accept`, as an index into `offers`.
///
/// Ranges are tried by descending quality, ties in header order; the first
/// offer a range matches wins. Without a header, or when nothing matches,
/// the first offer is chosen.
pub(crate) fn negotiate(accept: Option<&str>, offers: &[String]) -> usize {
    let Some(accept) = accept else {
        return 0;
    };

    let mut ranges: Vec<Range> = accept
        .split(',')
        .filter_map(Range::parse)
        .filter(|range| range.quality > 0.0)
        .collect();
    // Stable: equal qualities keep header order.
    ranges.sort_by(|a, b| b.quality.total_cmp(&a.quality));

    ranges
        .iter()
        .find_map(|range| offers.iter().position(|offer| range.matches(offer)))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offers() -> Vec<String> {
        vec!["application/json".into(), "application/xml".into()]
    }

    #[test]
    fn test_no_preference_uses_first_offer() {
        assert_eq!(negotiate(None, &offers()), 0);
        assert_eq!(negotiate(Some("text/html"), &offers()), 0);
    }

    #[test]
    fn test_exact_and_wildcard_matches() {
        assert_eq!(negotiate(Some("application/xml"), &offers()), 1);
        assert_eq!(negotiate(Some("application/*"), &offers()), 0);
        assert_eq!(negotiate(Some("*/*"), &offers()), 0);
    }

    #[test]
    fn test_quality_order() {
        let accept = "application/json;q=0.4, application/xml;q=0.9";
        assert_eq!(negotiate(Some(accept), &offers()), 1);

        let accept = "application/xml;q=0, application/json";
        assert_eq!(negotiate(Some(accept), &offers()), 0);
    }

    #[test]
    fn test_essence() {
        assert_eq!(essence("Application/JSON; charset=utf-8"), "application/json");
    }
}
