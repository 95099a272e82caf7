pub mod datetime;

use rand::Rng;

/// Random alphanumeric string, used for generated share ids and public links.
pub fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
