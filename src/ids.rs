use anyhow::Result;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::future::Future;

pub const BASE_SUFFIX_LEN: usize = 16;
pub const WIDE_SUFFIX_LEN: usize = 24;
pub const ATTEMPTS_PER_WIDTH: usize = 5;

pub fn random_id(prefix: &str, len: usize) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect();
    format!("{}_{}", prefix, suffix)
}

/// Generates `prefix_<alphanumeric>` until `exists` reports a free id.
///
/// Tries [`ATTEMPTS_PER_WIDTH`] candidates with a 16 character suffix, then the
/// same number with a 24 character suffix, then gives up.
pub async fn unique_id<F, Fut>(prefix: &str, mut exists: F) -> Result<String>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    for len in [BASE_SUFFIX_LEN, WIDE_SUFFIX_LEN] {
        for _ in 0..ATTEMPTS_PER_WIDTH {
            let candidate = random_id(prefix, len);
            if !exists(candidate.clone()).await? {
                return Ok(candidate);
            }
            tracing::warn!(prefix, len, "identifier collision, regenerating");
        }
    }

    anyhow::bail!("could not allocate a unique {} identifier", prefix)
}
