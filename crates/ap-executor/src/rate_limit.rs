// rate_limit.rs - Recognise quota exhaustion in upstream error text.
//
// Backends and proposers surface rate limits in many shapes ("429",
// "rate_limited", "Rate limit exceeded", "quota exhausted"). The engine only
// needs a yes/no answer to pick the longer rest. This is the fallback for
// errors that carry no explicit classification.

const MARKERS: &[&str] = &[
    "rate_limit",
    "rate limit",
    "rate-limit",
    "ratelimit",
    "too many requests",
    "quota",
];

/// Status code that only counts as a whole word, so ids and hashes that
/// happen to contain the digits do not match.
const STATUS_429: &str = "429";

pub fn is_rate_limit_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    MARKERS.iter().any(|marker| lower.contains(marker))
        || lower
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|word| word == STATUS_429)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_common_shapes() {
        assert!(is_rate_limit_message("rate_limited"));
        assert!(is_rate_limit_message("Rate limit exceeded, retry later"));
        assert!(is_rate_limit_message("HTTP 429 Too Many Requests"));
        assert!(is_rate_limit_message("upstream returned 429"));
        assert!(is_rate_limit_message("status=429"));
        assert!(is_rate_limit_message("usage quota exhausted"));
    }

    #[test]
    fn ignores_ordinary_failures() {
        assert!(!is_rate_limit_message("connection refused"));
        assert!(!is_rate_limit_message("exit status 1"));
    }

    #[test]
    fn digits_inside_ids_are_not_a_status() {
        assert!(!is_rate_limit_message(
            "HTTP 500 Internal Server Error: trace id 7f4290ab"
        ));
        assert!(!is_rate_limit_message("wrote 14290 bytes"));
        assert!(!is_rate_limit_message("request 4291 failed"));
    }
}
