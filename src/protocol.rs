//! Request-authentication material for the vendor protocol.
//!
//! Everything the server checks before honoring a submission lives here: the
//! parameter signature, the credential cipher used at login, the key pair for
//! the slide challenge service, and the synthesized interaction trace.

use std::collections::BTreeMap;

use aes::cipher::{BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use md5::{Digest, Md5};
use rand::Rng;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

/// Trailing secret fragment appended to the signed parameter sequence.
const SIGN_SECRET: &str = "%sd`~7^/>N4!Q#){''";

/// Key doubles as IV in the vendor's credential cipher.
const CREDENTIAL_KEY: &[u8; 16] = b"u2oh6Vu^HWe4_AES";

/// Salt mixed into the slide-challenge token derivation.
const SLIDE_SALT: &str = "42sxgHoTPTKbt0uZxPJ7ssOvtXr3ZgZ1";

/// Offset added to the challenge timestamp when deriving the token suffix.
const SLIDE_TOKEN_WINDOW_MS: i64 = 300_000;

fn md5_hex(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Sign a submission parameter set.
///
/// Keys are sorted lexicographically, each pair is rendered as `[key=value]`,
/// the secret fragment is appended as one more bracketed term, and the whole
/// sequence is MD5-hashed. The server recomputes the same function, so the
/// result must be identical for identical parameter maps regardless of the
/// order pairs are supplied in. Duplicate keys keep the last value.
pub fn sign_params<'a, I>(params: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let sorted: BTreeMap<&str, &str> = params.into_iter().collect();
    let mut seq = String::new();
    for (key, value) in &sorted {
        seq.push('[');
        seq.push_str(key);
        seq.push('=');
        seq.push_str(value);
        seq.push(']');
    }
    seq.push('[');
    seq.push_str(SIGN_SECRET);
    seq.push(']');
    md5_hex(&seq)
}

/// Encrypt a username or password for the login endpoint.
///
/// AES-128-CBC with PKCS7 padding, base64-encoded. The key and IV are the
/// vendor's fixed credential key.
pub fn encrypt_credential(plain: &str) -> String {
    let ciphertext = Aes128CbcEnc::new(CREDENTIAL_KEY.into(), CREDENTIAL_KEY.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plain.as_bytes());
    BASE64.encode(ciphertext)
}

/// Key pair identifying one challenge round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeKeys {
    /// Random per-request identifier echoed back by the challenge service.
    pub captcha_key: String,
    /// Signed `digest:expiry` pair derived from the key, salt and timestamp.
    pub token: String,
}

/// Derive the key pair for a slide-challenge request at `timestamp_ms`.
pub fn challenge_keys(timestamp_ms: i64) -> ChallengeKeys {
    let captcha_key = md5_hex(&format!("{timestamp_ms}{}", uuid::Uuid::new_v4()));
    let digest = md5_hex(&format!("{timestamp_ms}{SLIDE_SALT}slide{captcha_key}"));
    let token = format!("{digest}:{}", timestamp_ms + SLIDE_TOKEN_WINDOW_MS);
    ChallengeKeys { captcha_key, token }
}

/// Synthesize a plausible mouse-interaction trace for one submission.
///
/// The server expects a `moves/clicks/scrolls/keys/focus/ts/r` field string
/// alongside each reservation. Values are randomized within the ranges seen
/// in captured traffic.
pub fn interaction_trace(timestamp_ms: i64) -> String {
    let mut rng = rand::thread_rng();

    let moves: Vec<String> = (0..rng.gen_range(15..=30))
        .map(|i| {
            let x = rng.gen_range(100..=1200);
            let y = rng.gen_range(100..=800);
            let t = timestamp_ms + i64::from(i) * rng.gen_range(50..=200);
            format!("{x},{y},{t}")
        })
        .collect();

    let clicks: Vec<String> = (0..rng.gen_range(3..=8))
        .map(|_| {
            let x = rng.gen_range(200..=800);
            let y = rng.gen_range(200..=600);
            let t = timestamp_ms + rng.gen_range(1_000..=5_000);
            format!("{x},{y},{t}")
        })
        .collect();

    let scrolls: Vec<String> = (0..rng.gen_range(1..=5))
        .map(|_| {
            let delta = rng.gen_range(-300..=300);
            let t = timestamp_ms + rng.gen_range(500..=3_000);
            format!("{delta},{t}")
        })
        .collect();

    let focus_end = timestamp_ms + rng.gen_range(10_000..=30_000);
    let noise: u32 = rng.gen_range(100_000..=999_999);

    format!(
        "moves={}&clicks={}&scrolls={}&keys=&focus={timestamp_ms},{focus_end}&ts={timestamp_ms}&r={noise}",
        moves.join("|"),
        clicks.join("|"),
        scrolls.join("|"),
    )
}
