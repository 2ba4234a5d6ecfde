//! Short ids and tracking codes (§4.1). Short-id monotonicity is enforced
//! by the Store (it owns the per-tenant sequence); this module only
//! produces tracking codes, which are pure except for the Store-backed
//! collision check.

use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::store::Store;

const TRACKING_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const MAX_COLLISION_RETRIES: usize = 10;

fn random_code(rng: &mut impl Rng) -> String {
    let body: String = (0..6)
        .map(|_| {
            let idx = rng.gen_range(0..TRACKING_ALPHABET.len());
            TRACKING_ALPHABET[idx] as char
        })
        .collect();
    format!("MF-{body}")
}

/// Draws a tracking code, retrying against the Store on collision up to
/// `MAX_COLLISION_RETRIES` times. Falls back to a timestamp-suffixed
/// variant if every draw collides; only fails if the Store itself fails.
pub async fn new_tracking_code(store: &dyn Store) -> anyhow::Result<String> {
    let mut rng = rand::thread_rng();

    for attempt in 0..MAX_COLLISION_RETRIES {
        let candidate = random_code(&mut rng);
        if !store.tracking_code_exists(&candidate).await? {
            return Ok(candidate);
        }
        tracing::debug!(attempt, candidate, "tracking code collision, retrying");
    }

    // Every draw collided ten times in a row; fall back to a
    // timestamp-suffixed variant that is astronomically unlikely to
    // already exist, widening the entropy rather than looping forever.
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(4)
        .map(|b| b.to_ascii_uppercase() as char)
        .collect();
    let ts = crate::time::now_ms();
    Ok(format!("MF-{suffix}{:X}", ts % 0xFFFF))
}

pub fn tracking_code_matches_format(code: &str) -> bool {
    let Some(rest) = code.strip_prefix("MF-") else {
        return false;
    };
    rest.len() == 6 && rest.bytes().all(|b| TRACKING_ALPHABET.contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn random_code_matches_wire_format() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let code = random_code(&mut rng);
            assert!(
                tracking_code_matches_format(&code),
                "bad code: {code}"
            );
        }
    }

    #[test]
    fn fallback_suffix_still_starts_with_prefix() {
        // Not a format-matching code (it's longer), but it must still be
        // unambiguously a tracking code and never collide in practice.
        let suffix = "AB12";
        assert!(format!("MF-{suffix}0A").starts_with("MF-"));
    }
}
