//! Role-scoped access decisions.
//!
//! Every listing and delete goes through these functions so that tenant
//! narrowing happens in one place and can be tested without a store.

use crate::document::CaseId;
use crate::identity::{ClientId, Identity, Role};
use crate::pagination::Page;

/// What the caller asked to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListRequest {
    /// Every record, paged.
    All(Page),
    /// The caller's own records.
    Own,
    /// Records of one case.
    Case(CaseId),
}

/// Filter handed to the metadata index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentFilter {
    pub owner_id: Option<ClientId>,
    pub case_id: Option<CaseId>,
    pub page: Page,
}

impl DocumentFilter {
    pub fn all(page: Page) -> Self {
        Self {
            owner_id: None,
            case_id: None,
            page,
        }
    }

    pub fn owned_by(owner_id: ClientId) -> Self {
        Self {
            owner_id: Some(owner_id),
            ..Self::default()
        }
    }

    pub fn for_case(case_id: CaseId) -> Self {
        Self {
            case_id: Some(case_id),
            ..Self::default()
        }
    }
}

/// Narrow a listing request to what the identity may see.
pub fn effective_filter(identity: &Identity, request: ListRequest) -> DocumentFilter {
    match request {
        ListRequest::All(page) => DocumentFilter::all(page),
        ListRequest::Own => DocumentFilter::owned_by(identity.subject_id),
        ListRequest::Case(case_id) if identity.role == Role::Cliente => DocumentFilter {
            owner_id: Some(identity.subject_id),
            case_id: Some(case_id),
            page: Page::ALL,
        },
        ListRequest::Case(case_id) => DocumentFilter::for_case(case_id),
    }
}

/// What must hold before a delete may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteRequirement {
    /// A record with the blob id owned by this client must exist.
    OwnedBy(ClientId),
    Unrestricted,
}

pub fn delete_requirement(identity: &Identity) -> DeleteRequirement {
    if identity.role.is_elevated() {
        DeleteRequirement::Unrestricted
    } else {
        DeleteRequirement::OwnedBy(identity.subject_id)
    }
}

/// Whether the identity may use the unrestricted listing when it is not
/// publicly exposed.
pub fn may_list_all(identity: &Identity) -> bool {
    identity.role.is_elevated()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(id: i64, role: Role) -> Identity {
        Identity::new(ClientId::new(id).unwrap(), role)
    }

    #[test]
    fn test_own_listing_always_scoped_to_subject() {
        for role in [Role::Cliente, Role::Admin, Role::Operador] {
            let who = identity(5, role);
            let filter = effective_filter(&who, ListRequest::Own);
            assert_eq!(filter.owner_id, Some(who.subject_id));
            assert_eq!(filter.case_id, None);
        }
    }

    #[test]
    fn test_case_listing_narrowed_for_cliente() {
        let case = CaseId::new(9).unwrap();
        let cliente = identity(5, Role::Cliente);
        let filter = effective_filter(&cliente, ListRequest::Case(case));
        assert_eq!(filter.owner_id, Some(cliente.subject_id));
        assert_eq!(filter.case_id, Some(case));
    }

    #[test]
    fn test_case_listing_unrestricted_for_elevated() {
        let case = CaseId::new(9).unwrap();
        for role in [Role::Admin, Role::Operador] {
            let filter = effective_filter(&identity(1, role), ListRequest::Case(case));
            assert_eq!(filter.owner_id, None);
            assert_eq!(filter.case_id, Some(case));
        }
    }

    #[test]
    fn test_all_listing_keeps_page() {
        let page = Page {
            limit: Some(2),
            offset: Some(1),
        };
        let filter = effective_filter(&identity(5, Role::Cliente), ListRequest::All(page));
        assert_eq!(filter, DocumentFilter::all(page));
    }

    #[test]
    fn test_delete_requirement() {
        let cliente = identity(5, Role::Cliente);
        assert_eq!(
            delete_requirement(&cliente),
            DeleteRequirement::OwnedBy(cliente.subject_id)
        );
        assert_eq!(
            delete_requirement(&identity(1, Role::Admin)),
            DeleteRequirement::Unrestricted
        );
        assert_eq!(
            delete_requirement(&identity(1, Role::Operador)),
            DeleteRequirement::Unrestricted
        );
    }

    #[test]
    fn test_may_list_all() {
        assert!(!may_list_all(&identity(5, Role::Cliente)));
        assert!(may_list_all(&identity(5, Role::Admin)));
    }
}
