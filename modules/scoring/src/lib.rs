//! Health score arithmetic. Pure functions, no I/O.
//!
//! The score is a bounded integer in [-100, 100]. Order matters here: the
//! latency caps and the old-major-version cap are applied mid-computation,
//! not just at the end, so a slow node with certificate trouble can be
//! clamped more than once on its way down.

pub const SCORE_MIN: i64 = -100;
pub const SCORE_MAX: i64 = 100;

/// New score after one probe attempt.
///
/// A failed probe costs a flat 30 points and nothing else applies. A
/// successful probe earns 20, then gets adjusted for latency, reported
/// version and certificate issues, in that order.
pub fn score_after_probe(
    current: i64,
    probe_success: bool,
    time_ms: Option<i64>,
    version: Option<&str>,
    ssl_issues: bool,
) -> i64 {
    if !probe_success {
        return (current - 30).max(SCORE_MIN);
    }

    let mut score = current + 20;

    if let Some(time) = time_ms.filter(|t| *t > 0) {
        if time > 800 {
            score -= 10;
        } else if time > 400 {
            score -= 5;
        } else if time > 250 {
            // normal, no adjustment
        } else if time > 120 {
            score += 5;
        } else {
            score += 10;
        }

        // Slow nodes can never sit near the top, whatever their streak.
        if time > 800 {
            score = score.min(40);
        } else if time > 400 {
            score = score.min(60);
        }
    }

    if let Some(version) = version.filter(|v| !v.is_empty()) {
        let (major, minor) = parse_version(version);
        if major < 3 {
            score = score.min(30);
        } else if minor < 2 {
            score -= 5;
        }
    }

    if ssl_issues {
        score -= 10;
    }

    score.clamp(SCORE_MIN, SCORE_MAX)
}

/// Major/minor from a dot-separated version string. Each component reads as
/// its leading digits, so suffixed components like "5rc2" still count; a
/// component with no digits, or a missing one, reads as 0.
fn parse_version(version: &str) -> (i64, i64) {
    let mut parts = version.split('.');
    let mut next = || leading_int(parts.next().unwrap_or(""));
    (next(), next())
}

fn leading_int(s: &str) -> i64 {
    let s = s.trim();
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s[..end].parse().unwrap_or(0)
}

/// Bucket a score into a display label (CSS class names in the directory UI).
pub fn score_to_label(score: i64) -> &'static str {
    if score < -50 {
        "very-bad"
    } else if score < 0 {
        "bad"
    } else if score < 30 {
        "neutral"
    } else if score < 50 {
        "ok"
    } else if score < 80 {
        "good"
    } else {
        "perfect"
    }
}
