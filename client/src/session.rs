use serde::{Deserialize, Serialize};

/// Identifies who a request is made on behalf of.
///
/// Serializes as `{"tenant": .., "subject": ..}`, which is also the input
/// of the RBAC authorization check.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub struct Session {
    pub tenant: String,
    pub subject: String,
}

impl Session {
    pub fn new(tenant: impl Into<String>, subject: impl Into<String>) -> Self {
        Session {
            tenant: tenant.into(),
            subject: subject.into(),
        }
    }
}
