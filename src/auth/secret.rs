/// Shared server-wide secret for legacy mode
use subtle::ConstantTimeEq;

#[derive(Clone)]
pub struct SharedSecret {
    secret: Vec<u8>,
}

impl SharedSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into().into_bytes(),
        }
    }

    /// Compare a caller-supplied password against the secret.
    ///
    /// Lengths are compared first; the secret's length is not treated as
    /// sensitive. Equal-length inputs are compared in constant time.
    pub fn verify(&self, password: &str) -> bool {
        let candidate = password.as_bytes();
        if candidate.len() != self.secret.len() {
            return false;
        }
        candidate.ct_eq(&self.secret).into()
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(****)")
    }
}
