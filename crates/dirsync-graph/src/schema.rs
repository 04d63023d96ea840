//! Standard user attributes understood by the gateway.

/// A standard Graph user property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardField {
    /// Graph property name.
    pub name: &'static str,
    /// Whether the property holds a collection of strings.
    pub multi_valued: bool,
}

const fn single(name: &'static str) -> StandardField {
    StandardField {
        name,
        multi_valued: false,
    }
}

const fn multi(name: &'static str) -> StandardField {
    StandardField {
        name,
        multi_valued: true,
    }
}

/// Standard properties read, compared and written for each user.
pub const STANDARD_FIELDS: &[StandardField] = &[
    single("displayName"),
    single("givenName"),
    single("surname"),
    single("jobTitle"),
    single("department"),
    single("officeLocation"),
    single("companyName"),
    single("employeeId"),
    single("employeeType"),
    single("mobilePhone"),
    multi("businessPhones"),
    multi("otherMails"),
    single("streetAddress"),
    single("city"),
    single("state"),
    single("postalCode"),
    single("country"),
    single("usageLocation"),
    single("preferredLanguage"),
];

/// Looks up a standard field by name, ignoring case.
#[must_use]
pub fn standard_field(name: &str) -> Option<&'static StandardField> {
    let name = name.trim();
    STANDARD_FIELDS
        .iter()
        .find(|f| f.name.eq_ignore_ascii_case(name))
}

/// Properties requested when listing users, before extension properties.
pub(crate) fn base_select() -> Vec<String> {
    ["id", "mail", "userPrincipalName", "accountEnabled"]
        .into_iter()
        .map(String::from)
        .chain(STANDARD_FIELDS.iter().map(|f| f.name.to_string()))
        .collect()
}
