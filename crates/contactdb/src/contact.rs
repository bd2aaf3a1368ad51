//! Contact record

use std::fmt;

use serde::Serialize;

/// Multiplier used to derive a contact's phone number from its id
const PHONE_FACTOR: i64 = 1_111_111_111;

/// A contact whose fields are all derived from its id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Contact {
    /// Caller-supplied identifier, also the cache key
    pub id: i64,

    /// `"Contact <id>"`
    pub name: String,

    /// `"Prénom <id>"`
    pub surname: String,

    /// `id * 1111111111` in decimal
    pub phone: String,
}

impl Contact {
    /// Build the contact for `id`
    ///
    /// Pure: the same id always yields the same fields. The phone product
    /// wraps on overflow, so every `i64` id is accepted.
    pub fn synthesize(id: i64) -> Self {
        Self {
            id,
            name: format!("Contact {}", id),
            surname: format!("Prénom {}", id),
            phone: id.wrapping_mul(PHONE_FACTOR).to_string(),
        }
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Contact {{ id: {}, name: {:?}, surname: {:?}, phone: {:?} }}",
            self.id, self.name, self.surname, self.phone
        )
    }
}
