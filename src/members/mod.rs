//! Project membership: roles, authorization and member mutation rules.

pub mod error;
pub mod manager;
pub mod roles;

pub use error::{MemberError, MemberResult};
pub use manager::{
    AccessContext, ListMembersInput, MemberManager, MemberPage, MemberSortField,
    RemoveMemberInput, SortDirection, UpdateMemberRoleInput,
};
pub use roles::Role;
