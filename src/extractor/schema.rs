//! Versioned extraction schemas
//!
//! Explicit descriptions of the fields the assist may return for each block
//! role, including the guard rule each field is validated under. Owning the
//! schema here decouples assist prompt construction from the persistence
//! layer's field declarations; bump the version when a field list changes.

use crate::types::BlockRole;

/// How an assist-suggested value is checked against the source block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardRule {
    /// Value must appear verbatim in the source block
    Verbatim,
    /// Value must appear after stripping whitespace and hyphens (postal codes)
    VerbatimNormalized,
    /// At least one word token longer than two characters must appear in the
    /// source; values with no such token must appear whole
    TokenOverlap,
}

/// One extractable field
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub hint: &'static str,
    pub guard: GuardRule,
}

/// Field list for one block role
#[derive(Debug, Clone, Copy)]
pub struct FieldSchema {
    pub version: u32,
    pub fields: &'static [FieldSpec],
}

impl FieldSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Sender blocks describe organizations
pub const SENDER_SCHEMA: FieldSchema = FieldSchema {
    version: 1,
    fields: &[
        FieldSpec {
            name: "organization_name",
            hint: "company or agency name only, never the mailing address",
            guard: GuardRule::TokenOverlap,
        },
        FieldSpec {
            name: "department",
            hint: "department or division if present",
            guard: GuardRule::TokenOverlap,
        },
        FieldSpec {
            name: "address",
            hint: "PO Box or street address only, never the organization name",
            guard: GuardRule::Verbatim,
        },
        FieldSpec {
            name: "city",
            hint: "city name",
            guard: GuardRule::TokenOverlap,
        },
        FieldSpec {
            name: "state",
            hint: "2-letter state code",
            guard: GuardRule::TokenOverlap,
        },
        FieldSpec {
            name: "zip",
            hint: "postal code, keep hyphen if present",
            guard: GuardRule::VerbatimNormalized,
        },
        FieldSpec {
            name: "phone",
            hint: "phone number",
            guard: GuardRule::Verbatim,
        },
        FieldSpec {
            name: "email",
            hint: "email address",
            guard: GuardRule::Verbatim,
        },
    ],
};

/// Recipient blocks describe people
pub const RECIPIENT_SCHEMA: FieldSchema = FieldSchema {
    version: 1,
    fields: &[
        FieldSpec {
            name: "first_name",
            hint: "first name only",
            guard: GuardRule::TokenOverlap,
        },
        FieldSpec {
            name: "last_name",
            hint: "last name only",
            guard: GuardRule::TokenOverlap,
        },
        FieldSpec {
            name: "address",
            hint: "complete street address including number and street name",
            guard: GuardRule::Verbatim,
        },
        FieldSpec {
            name: "city",
            hint: "city name",
            guard: GuardRule::TokenOverlap,
        },
        FieldSpec {
            name: "state",
            hint: "2-letter state code",
            guard: GuardRule::TokenOverlap,
        },
        FieldSpec {
            name: "zip",
            hint: "complete postal code with hyphen if present",
            guard: GuardRule::VerbatimNormalized,
        },
    ],
};

/// The schema for a block role
pub fn schema_for(role: BlockRole) -> &'static FieldSchema {
    match role {
        BlockRole::Sender => &SENDER_SCHEMA,
        BlockRole::Recipient => &RECIPIENT_SCHEMA,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_lookup() {
        let schema = schema_for(BlockRole::Sender);
        assert_eq!(schema.version, 1);
        assert!(schema.field("organization_name").is_some());
        assert!(schema.field("first_name").is_none());

        let schema = schema_for(BlockRole::Recipient);
        assert!(schema.field("first_name").is_some());
        assert!(schema.field("organization_name").is_none());
    }

    #[test]
    fn test_guard_rules_assigned() {
        let schema = schema_for(BlockRole::Recipient);
        assert_eq!(schema.field("zip").unwrap().guard, GuardRule::VerbatimNormalized);
        assert_eq!(schema.field("address").unwrap().guard, GuardRule::Verbatim);
        assert_eq!(schema.field("first_name").unwrap().guard, GuardRule::TokenOverlap);
    }
}
