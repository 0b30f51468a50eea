//! Check identity shared by the queue, the caches and the smoother

use std::fmt;
use std::hash::{Hash, Hasher};

/// Fold a configured name (environment, tenant, service or check) into its key form.
///
/// Every case-insensitive name lookup in the crate goes through this or
/// [`same_name`], so all keys agree on what "same name" means.
pub fn fold_name(name: &str) -> String {
    name.to_lowercase()
}

/// Case-insensitive name equality under the same folding as [`fold_name`].
pub fn same_name(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

/// Identifies a single health check: `(environment, tenant, service, check)`.
///
/// Equality and hashing fold case on all four fields (see [`fold_name`]), so
/// the value can be used as a key regardless of how the configuration spelled
/// the names.
#[derive(Debug, Clone)]
pub struct CheckIdentifier {
    environment: String,
    tenant: String,
    service: String,
    check: String,
}

impl CheckIdentifier {
    pub fn new(
        environment: impl Into<String>,
        tenant: impl Into<String>,
        service: impl Into<String>,
        check: impl Into<String>,
    ) -> Self {
        Self {
            environment: environment.into(),
            tenant: tenant.into(),
            service: service.into(),
            check: check.into(),
        }
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn check(&self) -> &str {
        &self.check
    }

    fn fields(&self) -> [&str; 4] {
        [&self.environment, &self.tenant, &self.service, &self.check]
    }
}

impl PartialEq for CheckIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.fields()
            .iter()
            .zip(other.fields().iter())
            .all(|(a, b)| same_name(a, b))
    }
}

impl Eq for CheckIdentifier {}

impl Hash for CheckIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for field in self.fields() {
            for c in field.chars().flat_map(char::to_lowercase) {
                state.write_u32(c as u32);
            }
            // field separator so ("ab", "c") and ("a", "bc") hash differently;
            // no char maps to this value
            state.write_u32(u32::MAX);
        }
    }
}

impl fmt::Display for CheckIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.environment, self.tenant, self.service, self.check
        )
    }
}
