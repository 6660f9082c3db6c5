use bcrypt::hash;
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::error::AppError;

const SALT_LEN: usize = 16;
const HASH_COST: u32 = 10;

pub fn generate_salt() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LEN)
        .map(char::from)
        .collect()
}

/// bcrypt of the password with the salt appended.
pub fn hash_password(password: &str, salt: &str) -> Result<String, AppError> {
    hash(format!("{}{}", password, salt), HASH_COST).map_err(|e| {
        log::error!("password hash failed: {}", e);
        AppError::integrity("Password Hash Failed")
    })
}
