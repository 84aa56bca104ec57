//! Decoding of declared property values into typed forms.
//!
//! Every parser here is total: invalid input yields the documented default
//! so the builder can keep going with typed values. The only fallible entry
//! point is [`parse_offset`], whose `calc(...)` branch goes through the
//! expression compiler.

use crate::error::Result;
use crate::expr::{CalcExpr, Offset};
use crate::types::{Asset, Chromakey, FitPolicy, TimeMs, Transition};

/// Parses `<num>ms` or `<num>s` into milliseconds, rounding to whole
/// milliseconds. Anything else is zero.
pub fn parse_time(value: &str) -> TimeMs {
    let v = value.trim();
    if let Some(num) = v.strip_suffix("ms") {
        return TimeMs(num.trim().parse::<f64>().map(|n| n.round() as i64).unwrap_or(0));
    }
    if let Some(num) = v.strip_suffix('s') {
        return TimeMs(
            num.trim()
                .parse::<f64>()
                .map(|n| (n * 1000.0).round() as i64)
                .unwrap_or(0),
        );
    }
    TimeMs::ZERO
}

/// Resolves a `-duration` declaration against the referenced asset.
/// `auto` (or nothing) means the asset's remaining natural duration after
/// the left trim; a percentage is relative to the full natural duration.
pub fn parse_duration_spec(value: &str, asset: Option<&Asset>, trim_left: TimeMs) -> TimeMs {
    let natural = asset.map(|a| a.duration).unwrap_or(TimeMs::ZERO);
    let v = value.trim();
    if v.is_empty() || v == "auto" {
        return (natural - trim_left).max_zero();
    }
    if let Some(pct) = v.strip_suffix('%') {
        let pct = pct.trim().parse::<f64>().unwrap_or(0.0);
        return TimeMs((natural.millis() as f64 * pct / 100.0).round() as i64);
    }
    parse_time(v)
}

/// `-trim-start` is a time spec clamped to zero.
pub fn parse_trim_start(value: &str) -> TimeMs {
    parse_time(value).max_zero()
}

/// `-offset-start` / `-offset-end` are either a time spec or a lazy
/// `calc(...)` expression compiled up front.
pub fn parse_offset(value: &str) -> Result<Offset> {
    let v = value.trim();
    if v.starts_with("calc(") {
        return Ok(Offset::Calc(CalcExpr::compile(v)?));
    }
    Ok(Offset::Const(parse_time(v)))
}

/// `-transition-start` / `-transition-end`: a name with an optional
/// duration, e.g. `fade 500ms`.
pub fn parse_transition_spec(value: &str) -> Option<Transition> {
    let mut tokens = value.split_whitespace();
    let name = tokens.next()?;
    let duration = tokens.next().map(parse_time).unwrap_or(TimeMs::ZERO);
    Some(Transition {
        name: name.to_string(),
        duration,
    })
}

const AMBIENT_DEFAULT_BLUR: f64 = 20.0;
const AMBIENT_DEFAULT_BRIGHTNESS: f64 = -0.3;
const AMBIENT_DEFAULT_SATURATION: f64 = 0.8;

/// `-object-fit`: `cover`, `contain ambient <blur> <brightness>
/// <saturation>`, or `contain pillarbox <color>`. Anything unrecognized is
/// `cover`.
pub fn parse_object_fit_spec(value: &str) -> FitPolicy {
    let tokens = mend_number_tokens(value.split_whitespace());
    match tokens.first().map(String::as_str) {
        Some("contain") => match tokens.get(1).map(String::as_str) {
            Some("ambient") => {
                let float_at = |i: usize, default: f64| {
                    tokens
                        .get(i)
                        .and_then(|t| t.parse::<f64>().ok())
                        .unwrap_or(default)
                };
                FitPolicy::ContainAmbient {
                    blur: float_at(2, AMBIENT_DEFAULT_BLUR),
                    brightness: float_at(3, AMBIENT_DEFAULT_BRIGHTNESS),
                    saturation: float_at(4, AMBIENT_DEFAULT_SATURATION),
                }
            }
            Some("pillarbox") => FitPolicy::ContainPillarbox {
                color: tokens
                    .get(2)
                    .cloned()
                    .unwrap_or_else(|| "black".to_string()),
            },
            _ => FitPolicy::Cover,
        },
        _ => FitPolicy::Cover,
    }
}

/// Repairs whitespace-mangled numbers in a token stream: a lone `-` glues
/// onto a following number (`- 0.1` -> `-0.1`) and a `-` stuck after a
/// digit splits off (`25-0.1` -> `25`, `-0.1`).
fn mend_number_tokens<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    let split: Vec<String> = raw
        .flat_map(|token| {
            let bytes = token.as_bytes();
            for pos in 1..bytes.len() {
                if bytes[pos] == b'-' && bytes[pos - 1].is_ascii_digit() {
                    return vec![token[..pos].to_string(), token[pos..].to_string()];
                }
            }
            vec![token.to_string()]
        })
        .collect();

    let mut out = Vec::with_capacity(split.len());
    let mut i = 0;
    while i < split.len() {
        if split[i] == "-"
            && split
                .get(i + 1)
                .is_some_and(|next| next.parse::<f64>().is_ok())
        {
            out.push(format!("-{}", split[i + 1]));
            i += 2;
        } else {
            out.push(split[i].clone());
            i += 1;
        }
    }
    out
}

fn named_blend(token: &str) -> Option<f64> {
    match token {
        "hard" => Some(0.0),
        "smooth" => Some(0.1),
        "soft" => Some(0.2),
        _ => None,
    }
}

fn named_similarity(token: &str) -> Option<f64> {
    match token {
        "strict" => Some(0.1),
        "good" => Some(0.3),
        "forgiving" => Some(0.5),
        "loose" => Some(0.7),
        _ => None,
    }
}

/// `-chromakey`: `<blend> <similarity> <color>`, where blend and similarity
/// may be numeric or named. Any value at all enables keying.
pub fn parse_chromakey_spec(value: &str) -> Chromakey {
    let tokens: Vec<&str> = value.split_whitespace().collect();
    let mut key = Chromakey::default();
    if tokens.is_empty() {
        return key;
    }
    key.enabled = true;
    if let Some(t) = tokens.first() {
        if let Some(b) = named_blend(t).or_else(|| t.parse().ok()) {
            key.blend = b;
        }
    }
    if let Some(t) = tokens.get(1) {
        if let Some(s) = named_similarity(t).or_else(|| t.parse().ok()) {
            key.similarity = s;
        }
    }
    if let Some(t) = tokens.get(2) {
        key.color = (*t).to_string();
    }
    key
}

/// `-overlay-start-z-index` / `-overlay-end-z-index`, default 0.
pub fn parse_z_index(value: &str) -> i32 {
    value.trim().parse().unwrap_or(0)
}

/// `display: none` disables a fragment.
pub fn parse_enabled(display: &str) -> bool {
    display.trim() != "none"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
