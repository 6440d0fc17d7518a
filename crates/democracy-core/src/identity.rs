//! Node identity helpers: short ids, random weights and chunk arithmetic.

use rand::{Rng, RngCore};

/// Random bytes per short id. 64 bits keeps collisions between in-flight
/// groups negligible for a small peer group.
const SHORT_ID_BYTES: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum IdError {
    #[error("entropy source unavailable: {0}")]
    Entropy(rand::Error),
}

/// Generate a short unique identifier (16 lowercase hex chars) from the
/// OS entropy source.
pub fn generate_short_id() -> Result<String, IdError> {
    let mut bytes = [0u8; SHORT_ID_BYTES];
    rand::rngs::OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(IdError::Entropy)?;
    Ok(hex::encode(bytes))
}

/// Draw a node weight. Assigned once per node and never changed.
pub fn random_weight() -> u64 {
    rand::thread_rng().gen()
}

/// Ceiling division for chunk counts. `b` must be positive.
pub fn ceil_div(a: usize, b: usize) -> usize {
    debug_assert!(b > 0, "ceil_div by zero");
    a.div_ceil(b)
}
