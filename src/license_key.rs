//! License key generation and validation.
//!
//! Keys are human-readable tokens in the format `PREFIX-XXXX-XXXX-XXXX-XXXX`.
//!
//! # Grammar
//!
//! - `PREFIX` is configured (default `WARP`)
//! - The number of segments and their length are configured (default 4 x 4)
//! - Segment characters come from an alphabet without the ambiguous `0 O I L 1`
//! - The final character of the last segment is a check character over all
//!   preceding segment characters, so typos and invented keys are rejected
//!   without touching the store
//!
//! # Example
//!
//! ```rust
//! use apex_license::license_key::{generate_license_key, validate_license_key_format, LicenseKeyConfig};
//!
//! let config = LicenseKeyConfig::default();
//! let key = generate_license_key(&config);
//! assert!(validate_license_key_format(&key, &config));
//! assert!(!validate_license_key_format("WARP-FAKE-INVALID-LICENSE-KEY-DEMO", &config));
//! ```

use rand::Rng;

use crate::config::LicenseConfig;
use crate::errors::{LicenseError, LicenseResult};

/// Character set for license key generation.
/// Excludes ambiguous characters: 0, O, I, L, 1
const LICENSE_KEY_CHARSET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

/// Configuration for license key generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseKeyConfig {
    /// Prefix for the license key (e.g., "WARP")
    pub prefix: String,
    /// Number of segments after the prefix
    pub segments: u8,
    /// Length of each segment
    pub segment_length: u8,
}

impl Default for LicenseKeyConfig {
    fn default() -> Self {
        Self {
            prefix: "WARP".to_string(),
            segments: 4,
            segment_length: 4,
        }
    }
}

impl From<&LicenseConfig> for LicenseKeyConfig {
    fn from(config: &LicenseConfig) -> Self {
        Self {
            prefix: config.key_prefix.clone(),
            segments: config.key_segments,
            segment_length: config.key_segment_length,
        }
    }
}

impl LicenseKeyConfig {
    fn body_len(&self) -> usize {
        usize::from(self.segments) * usize::from(self.segment_length)
    }
}

fn charset_index(ch: u8) -> Option<usize> {
    LICENSE_KEY_CHARSET.iter().position(|&c| c == ch)
}

/// Compute the check character for the given payload characters.
///
/// Weighted sum of alphabet indices (weight = 1-based position), reduced
/// modulo the alphabet size. Returns `None` if a character is outside the
/// alphabet.
fn check_character(payload: &[u8]) -> Option<u8> {
    let mut sum = 0usize;
    for (pos, &ch) in payload.iter().enumerate() {
        sum += (pos + 1) * charset_index(ch)?;
    }
    Some(LICENSE_KEY_CHARSET[sum % LICENSE_KEY_CHARSET.len()])
}

/// Generate a license key with the given configuration.
///
/// The last character of the final segment is the check character.
pub fn generate_license_key(config: &LicenseKeyConfig) -> String {
    let mut rng = rand::rng();
    let body_len = config.body_len();

    let mut body: Vec<u8> = (0..body_len.saturating_sub(1))
        .map(|_| LICENSE_KEY_CHARSET[rng.random_range(0..LICENSE_KEY_CHARSET.len())])
        .collect();
    // Every payload byte was drawn from the charset, so a check character always exists.
    if let Some(check) = check_character(&body) {
        body.push(check);
    }

    let segments: Vec<String> = body
        .chunks(usize::from(config.segment_length))
        .map(|chunk| chunk.iter().map(|&b| b as char).collect())
        .collect();

    format!("{}-{}", config.prefix, segments.join("-"))
}

/// Validate that a license key matches the expected grammar.
///
/// This validates:
/// - The key starts with the expected prefix
/// - The key has the correct number of segments
/// - Each segment has the correct length
/// - All characters in segments are from the valid character set
/// - The trailing check character matches
pub fn validate_license_key_format(key: &str, config: &LicenseKeyConfig) -> bool {
    let parts: Vec<&str> = key.split('-').collect();

    if parts.len() != 1 + usize::from(config.segments) || parts[0] != config.prefix {
        return false;
    }

    let mut body: Vec<u8> = Vec::with_capacity(config.body_len());
    for segment in &parts[1..] {
        if segment.len() != usize::from(config.segment_length) {
            return false;
        }
        for &ch in segment.as_bytes() {
            if charset_index(ch).is_none() {
                return false;
            }
            body.push(ch);
        }
    }

    match body.split_last() {
        Some((&check, payload)) => check_character(payload) == Some(check),
        None => false,
    }
}

/// Generate a license key and claim it.
///
/// `try_claim` is called with each candidate and returns `true` once the key
/// has been reserved (typically by an insert that fails on duplicates).
/// Candidates are drawn up to `max_retries` times before giving up.
pub async fn generate_unique_license_key<F, Fut>(
    config: &LicenseKeyConfig,
    try_claim: F,
    max_retries: u32,
) -> LicenseResult<String>
where
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = LicenseResult<bool>>,
{
    for _ in 0..max_retries {
        let key = generate_license_key(config);
        if try_claim(key.clone()).await? {
            return Ok(key);
        }
    }

    Err(LicenseError::ServerError(format!(
        "failed to generate unique license key after {max_retries} attempts"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a key with a correct check character from a 15-character payload.
    fn key_from_payload(payload: &str) -> String {
        let check = check_character(payload.as_bytes()).unwrap() as char;
        let body = format!("{payload}{check}");
        format!(
            "WARP-{}-{}-{}-{}",
            &body[0..4],
            &body[4..8],
            &body[8..12],
            &body[12..16]
        )
    }

    #[test]
    fn generate_key_has_correct_format() {
        let config = LicenseKeyConfig::default();
        let key = generate_license_key(&config);

        assert!(key.starts_with("WARP-"));
        let parts: Vec<&str> = key.split('-').collect();
        assert_eq!(parts.len(), 5);
        for segment in &parts[1..] {
            assert_eq!(segment.len(), 4);
        }
    }

    #[test]
    fn generate_key_excludes_ambiguous_characters() {
        let config = LicenseKeyConfig::default();
        for _ in 0..100 {
            let key = generate_license_key(&config);
            for segment in key.split('-').skip(1) {
                for banned in ['0', 'O', 'I', 'L', '1'] {
                    assert!(!segment.contains(banned), "{banned} in {segment}");
                }
            }
        }
    }

    #[test]
    fn generated_keys_pass_validation() {
        let config = LicenseKeyConfig::default();
        for _ in 0..200 {
            let key = generate_license_key(&config);
            assert!(validate_license_key_format(&key, &config), "{key}");
        }
    }

    #[test]
    fn generate_key_with_custom_config() {
        let config = LicenseKeyConfig {
            prefix: "APEX".to_string(),
            segments: 3,
            segment_length: 5,
        };
        let key = generate_license_key(&config);

        assert!(key.starts_with("APEX-"));
        let parts: Vec<&str> = key.split('-').collect();
        assert_eq!(parts.len(), 4);
        assert!(validate_license_key_format(&key, &config));
    }

    #[test]
    fn validate_accepts_hand_built_key() {
        let config = LicenseKeyConfig::default();
        let key = key_from_payload("A2B3C4D5E6F7G8H");
        assert!(validate_license_key_format(&key, &config));
    }

    #[test]
    fn validate_rejects_bad_check_character() {
        let config = LicenseKeyConfig::default();
        let key = key_from_payload("A2B3C4D5E6F7G8H");
        let last = key.chars().last().unwrap();
        let replacement = if last == 'Z' { 'Y' } else { 'Z' };
        let tampered = format!("{}{}", &key[..key.len() - 1], replacement);
        assert!(!validate_license_key_format(&tampered, &config));
    }

    #[test]
    fn validate_rejects_demo_key() {
        let config = LicenseKeyConfig::default();
        assert!(!validate_license_key_format(
            "WARP-FAKE-INVALID-LICENSE-KEY-DEMO",
            &config
        ));
    }

    #[test]
    fn validate_rejects_wrong_prefix() {
        let config = LicenseKeyConfig::default();
        let key = key_from_payload("A2B3C4D5E6F7G8H").replacen("WARP", "WRONG", 1);
        assert!(!validate_license_key_format(&key, &config));
    }

    #[test]
    fn validate_rejects_wrong_segment_count_and_length() {
        let config = LicenseKeyConfig::default();
        assert!(!validate_license_key_format("WARP-A2B3-C4D5", &config));
        assert!(!validate_license_key_format("WARP-A2-C4D5-E6F7-G8H9", &config));
        assert!(!validate_license_key_format("WARP", &config));
        assert!(!validate_license_key_format("", &config));
    }

    #[test]
    fn validate_rejects_lowercase_and_excluded_characters() {
        let config = LicenseKeyConfig::default();
        let key = key_from_payload("A2B3C4D5E6F7G8H");
        assert!(!validate_license_key_format(&key.to_lowercase(), &config));
        assert!(!validate_license_key_format("WARP-A0B3-C4D5-E6F7-G8H9", &config));
    }

    #[tokio::test]
    async fn unique_key_generation_gives_up_after_retries() {
        let config = LicenseKeyConfig::default();
        let result = generate_unique_license_key(&config, |_| async { Ok(false) }, 3).await;
        assert!(matches!(result, Err(LicenseError::ServerError(_))));

        let key = generate_unique_license_key(&config, |_| async { Ok(true) }, 3)
            .await
            .unwrap();
        assert!(validate_license_key_format(&key, &config));
    }
}
