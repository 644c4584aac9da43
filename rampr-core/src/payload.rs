use rand::Rng;
use serde::Serialize;

pub const LOGIN_USERNAME: &str = "user1";
pub const PASSWORD_PREFIX: &str = "password";
pub const PASSWORD_SUFFIX_MIN: u32 = 1;
pub const PASSWORD_SUFFIX_MAX: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Uniform draw from the inclusive range `min..=max`.
pub fn random_int<R: Rng + ?Sized>(rng: &mut R, min: u32, max: u32) -> u32 {
    rng.gen_range(min..=max)
}

pub fn generate_payload<R: Rng + ?Sized>(rng: &mut R) -> Credentials {
    let suffix = random_int(rng, PASSWORD_SUFFIX_MIN, PASSWORD_SUFFIX_MAX);
    Credentials {
        username: LOGIN_USERNAME.to_owned(),
        password: format!("{}{}", PASSWORD_PREFIX, suffix),
    }
}
