//! Name utilities: the handful of predicates the rest of the resolver
//! builds on. `DomainName` already lower-cases its labels at
//! construction, so these comparisons are case-insensitive for free.

use dns_types::protocol::types::DomainName;

/// True iff `name` is `zone`, or `zone` is a proper suffix of `name`
/// at a label boundary.
pub fn is_in_zone(name: &DomainName, zone: &DomainName) -> bool {
    name.is_subdomain_of(zone)
}

/// Strip the leftmost label. The root's parent is itself.
pub fn parent_zone(name: &DomainName) -> DomainName {
    name.parent()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain(s: &str) -> DomainName {
        DomainName::from_dotted_string(s).unwrap()
    }

    #[test]
    fn is_in_zone_matches_exact() {
        assert!(is_in_zone(&domain("foo."), &domain("foo.")));
    }

    #[test]
    fn is_in_zone_matches_subdomain_at_label_boundary() {
        assert!(is_in_zone(&domain("www.foo."), &domain("foo.")));
    }

    #[test]
    fn is_in_zone_rejects_non_boundary_suffix() {
        assert!(!is_in_zone(&domain("notfoo."), &domain("foo.")));
    }

    #[test]
    fn is_in_zone_is_case_insensitive() {
        assert!(is_in_zone(&domain("WWW.FOO."), &domain("foo.")));
    }

    #[test]
    fn parent_zone_strips_leftmost_label() {
        assert_eq!(parent_zone(&domain("www.foo.")), domain("foo."));
    }

    #[test]
    fn parent_zone_of_root_is_root() {
        assert_eq!(parent_zone(&DomainName::root_domain()), DomainName::root_domain());
    }
}
