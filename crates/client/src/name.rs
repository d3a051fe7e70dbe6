use crate::entity::EntityKind;
use crate::error::{Error, Result};

/// Longest accepted name.
pub const MAX_NAME_LENGTH: usize = 128;

const fn is_separator(c: char) -> bool {
    matches!(c, '_' | '.' | '-')
}

/// Checks a name against the rules for its kind, without touching the network.
///
/// Names are lower-case ASCII and may use `_`, `.` and `-` as separators, but
/// neither start nor end with one. Producers and consumers use letters only;
/// factories, stations and consumer groups may also use digits.
///
/// # Errors
///
/// Returns [`Error::InvalidName`] describing the first broken rule.
pub fn validate_name(kind: EntityKind, name: &str) -> Result<()> {
    let allows_digits = !matches!(kind, EntityKind::Producer | EntityKind::Consumer);

    let invalid = |reason| {
        Err(Error::InvalidName {
            kind,
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return invalid("must not be empty");
    }

    if name.len() > MAX_NAME_LENGTH {
        return invalid("must not be longer than 128 characters");
    }

    let allowed = |c: char| {
        c.is_ascii_lowercase() || is_separator(c) || (allows_digits && c.is_ascii_digit())
    };

    if !name.chars().all(allowed) {
        return if allows_digits {
            invalid("may only contain lower-case letters, digits, '_', '.' and '-'")
        } else {
            invalid("may only contain lower-case letters, '_', '.' and '-'")
        };
    }

    if name.starts_with(is_separator) || name.ends_with(is_separator) {
        return invalid("must not start or end with '_', '.' or '-'");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;

    #[test]
    fn test_producer_names() {
        assert!(validate_name(EntityKind::Producer, "val_id").is_ok());
        assert!(validate_name(EntityKind::Producer, "producer.name-a").is_ok());

        assert_matches!(
            validate_name(EntityKind::Producer, "inVALID"),
            Err(Error::InvalidName { kind: EntityKind::Producer, .. })
        );
        assert_matches!(
            validate_name(EntityKind::Producer, "invalid1"),
            Err(Error::InvalidName { kind: EntityKind::Producer, .. })
        );
    }

    #[test]
    fn test_consumer_names_follow_producer_rules() {
        assert!(validate_name(EntityKind::Consumer, "consumer_a").is_ok());
        assert!(validate_name(EntityKind::Consumer, "consumer_1").is_err());
    }

    #[test]
    fn test_station_names_allow_digits() {
        assert!(validate_name(EntityKind::Station, "station_name_1").is_ok());
        assert!(validate_name(EntityKind::Factory, "factory_name_1").is_ok());
        assert!(validate_name(EntityKind::ConsumerGroup, "group2").is_ok());
        assert!(validate_name(EntityKind::Station, "Station").is_err());
    }

    #[test]
    fn test_empty_and_long_names() {
        assert_matches!(
            validate_name(EntityKind::Station, ""),
            Err(Error::InvalidName { reason: "must not be empty", .. })
        );

        let longest = "a".repeat(MAX_NAME_LENGTH);
        assert!(validate_name(EntityKind::Station, &longest).is_ok());

        let too_long = "a".repeat(MAX_NAME_LENGTH + 1);
        assert!(validate_name(EntityKind::Station, &too_long).is_err());
    }

    #[test]
    fn test_separator_edges() {
        assert!(validate_name(EntityKind::Producer, "_leading").is_err());
        assert!(validate_name(EntityKind::Producer, "trailing.").is_err());
        assert!(validate_name(EntityKind::Producer, "-").is_err());
        assert!(validate_name(EntityKind::Station, "white space").is_err());
        assert!(validate_name(EntityKind::Station, "ünicode").is_err());
    }
}
