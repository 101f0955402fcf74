/// Supplies the bearer credential shared by both services.
///
/// `None` means the user is signed out; reconciliation is skipped, not failed.
pub trait CredentialProvider: Send + Sync {
    fn credential(&self) -> Option<String>;
}

/// A credential fixed at construction, typically taken from config.
pub struct StaticCredential(Option<String>);

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        if token.trim().is_empty() {
            Self(None)
        } else {
            Self(Some(token))
        }
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl CredentialProvider for StaticCredential {
    fn credential(&self) -> Option<String> {
        self.0.clone()
    }
}
