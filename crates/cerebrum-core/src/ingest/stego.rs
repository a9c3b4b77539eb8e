//! Steganalysis (§4.10 step 5). The marker literals and metadata tag
//! name are carried over from
//! `original_source/src/learning/StegoDetector.cpp`, which is
//! unambiguous about the concrete constants it checks for — the
//! distilled spec left these as an abstract "known markers" check.

use std::collections::HashMap;

const ENTROPY_THRESHOLD: f64 = 7.0;
pub const STEGO_START_MARKER: &str = "STEGO_START_MARKER";
pub const STEGO_END_MARKER: &str = "ST3G0_END_MARKER_ABC";
pub const HIDDEN_MESSAGE_TAG_KEY: &str = "hidden_message_tag";

#[derive(Debug, Clone, PartialEq)]
pub enum StegoFinding {
    HighEntropy(f64),
    KnownMarker(&'static str),
    HiddenMessageTag,
}

/// Shannon entropy over characters, in bits.
pub fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }
    let mut counts: HashMap<char, u32> = HashMap::new();
    for c in s.chars() {
        *counts.entry(c).or_insert(0) += 1;
    }
    let len = s.chars().count() as f64;
    counts
        .values()
        .map(|&count| {
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Checks content and ingest metadata for steganographic indicators.
/// `metadata` is the capsule envelope's arbitrary side-channel
/// key/value map (separate from its typed fields).
pub fn detect(content: &str, metadata: &HashMap<String, String>) -> Vec<StegoFinding> {
    let mut findings = Vec::new();

    let entropy = shannon_entropy(content);
    if entropy > ENTROPY_THRESHOLD {
        findings.push(StegoFinding::HighEntropy(entropy));
    }

    if content.contains(STEGO_START_MARKER) {
        findings.push(StegoFinding::KnownMarker(STEGO_START_MARKER));
    }
    if content.contains(STEGO_END_MARKER) {
        findings.push(StegoFinding::KnownMarker(STEGO_END_MARKER));
    }

    if metadata.contains_key(HIDDEN_MESSAGE_TAG_KEY) {
        findings.push(StegoFinding::HiddenMessageTag);
    }

    findings
}
