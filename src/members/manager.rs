//! Membership authorization and mutation engine.
//!
//! Every project-scoped operation funnels through [`MemberManager::authorize`]:
//! the requester must be the project owner or hold an explicit membership row.
//! Member listing synthesizes a virtual OWNER entry for legacy projects whose
//! owner has no membership row; removal and role updates operate strictly on
//! explicit rows and preserve the "at least one OWNER per project" invariant.

use super::error::{MemberError, MemberResult};
use super::roles::Role;
use crate::db::{Db, Member, Membership, Project};
use chrono::Utc;
use serde::Deserialize;

/// Default page size for member listing.
const DEFAULT_PAGE_SIZE: i64 = 20;
/// Upper bound for page size; larger requests are clamped.
const MAX_PAGE_SIZE: i64 = 100;

/// Sort field for member listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberSortField {
    #[default]
    Name,
    Email,
    Role,
}

/// Sort direction for member listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Inputs for [`MemberManager::list_members`].
///
/// `page` / `page_size` arrive as raw numbers: non-integers are floored and
/// out-of-range values clamped rather than rejected.
#[derive(Debug, Clone)]
pub struct ListMembersInput {
    pub project_id: i64,
    pub requester_id: i64,
    pub roles: Option<Vec<Role>>,
    pub q: Option<String>,
    pub page: Option<f64>,
    pub page_size: Option<f64>,
    pub sort_by: MemberSortField,
    pub order: SortDirection,
}

#[derive(Debug, Clone)]
pub struct RemoveMemberInput {
    pub project_id: i64,
    pub requester_id: i64,
    pub target_user_id: i64,
}

#[derive(Debug, Clone)]
pub struct UpdateMemberRoleInput {
    pub project_id: i64,
    pub requester_id: i64,
    pub target_user_id: i64,
    pub new_role: Role,
}

/// One page of members.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MemberPage {
    pub items: Vec<Member>,
    pub total: usize,
    pub page: i64,
    pub page_size: i64,
    pub has_next_page: bool,
}

/// Result of a successful authorization check: the project plus the
/// requester's effective role.
///
/// The project owner counts as an OWNER member even without an explicit
/// membership row, so `role` is OWNER whenever the requester is the owner.
#[derive(Debug, Clone)]
pub struct AccessContext {
    pub project: Project,
    pub role: Role,
}

impl AccessContext {
    /// Owner or manager: project administration (packages, invitations, …).
    pub fn can_manage(&self) -> bool {
        matches!(self.role, Role::Owner | Role::Manager)
    }

    /// Roles allowed to author and edit test scenarios.
    pub fn can_edit_scenarios(&self) -> bool {
        matches!(self.role, Role::Owner | Role::Manager | Role::Tester)
    }

    /// Roles allowed to mark a scenario APPROVED.
    pub fn can_approve(&self) -> bool {
        matches!(self.role, Role::Owner | Role::Approver)
    }
}

/// The membership engine. Cheap to clone.
#[derive(Clone)]
pub struct MemberManager {
    db: Db,
}

impl MemberManager {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    // ========================================================================
    // Shared authorization predicate
    // ========================================================================

    /// Resolve the requester's standing in a project.
    ///
    /// Fails with BadRequest for non-positive ids, NotFound when the project
    /// does not exist, and Forbidden when the requester is neither the
    /// project owner nor an explicit member.
    pub async fn authorize(&self, project_id: i64, requester_id: i64) -> MemberResult<AccessContext> {
        require_positive(project_id, "project id")?;
        require_positive(requester_id, "requester id")?;

        let project = self
            .db
            .find_project(project_id)
            .await?
            .ok_or_else(|| MemberError::NotFound("project not found".into()))?;

        if project.owner_id == requester_id {
            return Ok(AccessContext {
                project,
                role: Role::Owner,
            });
        }

        let membership = self.db.find_membership(project_id, requester_id).await?;
        match membership {
            Some(m) => Ok(AccessContext {
                project,
                role: m.role,
            }),
            None => Err(MemberError::Forbidden("access denied to project".into())),
        }
    }

    // ========================================================================
    // List members
    // ========================================================================

    pub async fn list_members(&self, input: ListMembersInput) -> MemberResult<MemberPage> {
        let ctx = self.authorize(input.project_id, input.requester_id).await?;

        let role_filter = input.roles.as_deref().filter(|r| !r.is_empty());
        let mut candidates = self.db.list_members(input.project_id, role_filter).await?;

        // Legacy projects: the owner may have no explicit row. Synthesize a
        // virtual OWNER entry for reads, before query filtering, so it takes
        // part in search, sort and pagination. An explicit role filter never
        // matches implicit rows.
        if role_filter.is_none()
            && !candidates.iter().any(|m| m.user_id == ctx.project.owner_id)
        {
            if let Some(owner) = self.db.find_user(ctx.project.owner_id).await? {
                candidates.insert(
                    0,
                    Member {
                        user_id: owner.id,
                        name: owner.name,
                        email: owner.email,
                        role: Role::Owner,
                    },
                );
            }
        }

        if let Some(q) = input.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let needle = q.to_lowercase();
            candidates.retain(|m| {
                m.name.to_lowercase().contains(&needle)
                    || m.email.to_lowercase().contains(&needle)
            });
        }

        sort_members(&mut candidates, input.sort_by, input.order);

        let page = normalize_page(input.page);
        let page_size = normalize_page_size(input.page_size);
        let total = candidates.len();
        let start = (page - 1).saturating_mul(page_size);

        let items: Vec<Member> = if (start as u64) < total as u64 {
            let start = start as usize;
            let end = start.saturating_add(page_size as usize).min(total);
            candidates[start..end].to_vec()
        } else {
            Vec::new()
        };

        let has_next_page = (start as u64).saturating_add(items.len() as u64) < total as u64;

        Ok(MemberPage {
            items,
            total,
            page,
            page_size,
            has_next_page,
        })
    }

    // ========================================================================
    // Remove member
    // ========================================================================

    /// Remove an explicit membership row, enforcing the role rule table and
    /// last-owner protection. Returns the deleted membership.
    pub async fn remove_member(&self, input: RemoveMemberInput) -> MemberResult<Membership> {
        require_positive(input.target_user_id, "target user id")?;
        let ctx = self.authorize(input.project_id, input.requester_id).await?;

        // Mutations never see the synthesized owner row: the target must
        // exist as a real row.
        let target = self
            .db
            .find_membership(input.project_id, input.target_user_id)
            .await?
            .ok_or_else(|| MemberError::NotFound("member not found".into()))?;

        match ctx.role {
            Role::Owner => {}
            Role::Manager => match target.role {
                Role::Tester | Role::Approver => {}
                Role::Owner | Role::Manager => {
                    return Err(MemberError::Forbidden(
                        "a manager may not remove an owner or manager".into(),
                    ))
                }
            },
            _ => {
                return Err(MemberError::Forbidden(
                    "only an owner or manager may remove members".into(),
                ))
            }
        }

        if target.role == Role::Owner {
            self.remove_owner_membership(input.project_id, input.target_user_id)
                .await?;
        } else {
            self.db
                .delete_membership(input.project_id, input.target_user_id)
                .await?;
        }

        Ok(target)
    }

    /// Count-then-delete inside one transaction; the DELETE statement
    /// re-checks the owner count so concurrent removals cannot both pass.
    async fn remove_owner_membership(&self, project_id: i64, user_id: i64) -> MemberResult<()> {
        let mut tx = self.db.begin().await?;

        let owners = self.db.count_owners_tx(&mut tx, project_id).await?;
        if owners <= 1 {
            return Err(last_owner_conflict("removing"));
        }

        let affected = self
            .db
            .delete_owner_guarded_tx(&mut tx, project_id, user_id)
            .await?;
        if affected == 0 {
            return Err(last_owner_conflict("removing"));
        }

        tx.commit().await.map_err(anyhow::Error::from)?;
        Ok(())
    }

    // ========================================================================
    // Update member role
    // ========================================================================

    /// Change a member's role, enforcing the rule table, last-owner
    /// protection and idempotence (equal role → no write at all).
    pub async fn update_member_role(
        &self,
        input: UpdateMemberRoleInput,
    ) -> MemberResult<Membership> {
        require_positive(input.target_user_id, "target user id")?;
        let ctx = self.authorize(input.project_id, input.requester_id).await?;

        let target = self
            .db
            .find_membership(input.project_id, input.target_user_id)
            .await?
            .ok_or_else(|| MemberError::NotFound("member not found".into()))?;

        match ctx.role {
            Role::Owner => {}
            Role::Manager => {
                if matches!(target.role, Role::Owner | Role::Manager) {
                    return Err(MemberError::Forbidden(
                        "a manager may not modify an owner or manager".into(),
                    ));
                }
                if matches!(input.new_role, Role::Owner | Role::Manager) {
                    return Err(MemberError::Forbidden(
                        "a manager may not grant the owner or manager role".into(),
                    ));
                }
            }
            _ => {
                return Err(MemberError::Forbidden(
                    "only an owner or manager may change member roles".into(),
                ))
            }
        }

        if target.role == Role::Owner && input.new_role != Role::Owner {
            return self.demote_owner_membership(target, input.new_role).await;
        }

        // Idempotent update: report the already-read row without touching
        // the store, so updated_at stays put.
        if input.new_role == target.role {
            return Ok(target);
        }

        let now = Utc::now();
        self.db
            .update_membership_role(input.project_id, input.target_user_id, input.new_role, now)
            .await?;

        Ok(Membership {
            role: input.new_role,
            updated_at: now,
            ..target
        })
    }

    async fn demote_owner_membership(
        &self,
        target: Membership,
        new_role: Role,
    ) -> MemberResult<Membership> {
        let mut tx = self.db.begin().await?;

        let owners = self.db.count_owners_tx(&mut tx, target.project_id).await?;
        if owners <= 1 {
            return Err(last_owner_conflict("demoting"));
        }

        let now = Utc::now();
        let affected = self
            .db
            .demote_owner_guarded_tx(&mut tx, target.project_id, target.user_id, new_role, now)
            .await?;
        if affected == 0 {
            return Err(last_owner_conflict("demoting"));
        }

        tx.commit().await.map_err(anyhow::Error::from)?;

        Ok(Membership {
            role: new_role,
            updated_at: now,
            ..target
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn require_positive(value: i64, what: &str) -> MemberResult<()> {
    if value <= 0 {
        return Err(MemberError::BadRequest(format!(
            "{} must be a positive integer",
            what
        )));
    }
    Ok(())
}

fn last_owner_conflict(verb: &str) -> MemberError {
    MemberError::Conflict(format!(
        "transfer ownership before {} the last owner",
        verb
    ))
}

/// Floor and clamp a raw page number (default 1, minimum 1).
fn normalize_page(value: Option<f64>) -> i64 {
    match value {
        Some(v) if v.is_finite() => (v.floor() as i64).max(1),
        _ => 1,
    }
}

/// Floor and clamp a raw page size into 1..=100 (default 20).
fn normalize_page_size(value: Option<f64>) -> i64 {
    match value {
        Some(v) if v.is_finite() => (v.floor() as i64).clamp(1, MAX_PAGE_SIZE),
        _ => DEFAULT_PAGE_SIZE,
    }
}

/// Sort members by the requested field; desc reverses the comparator
/// (stable for equal keys either way).
fn sort_members(members: &mut [Member], field: MemberSortField, order: SortDirection) {
    members.sort_by(|a, b| {
        let ordering = match field {
            MemberSortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            MemberSortField::Email => a.email.to_lowercase().cmp(&b.email.to_lowercase()),
            MemberSortField::Role => a.role.cmp(&b.role),
        };
        match order {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;

    struct Fixture {
        db: Db,
        manager: MemberManager,
    }

    async fn fixture() -> Fixture {
        let db = Db::connect("sqlite::memory:").await.unwrap();
        let manager = MemberManager::new(db.clone());
        Fixture { db, manager }
    }

    impl Fixture {
        async fn user(&self, name: &str, email: &str) -> i64 {
            self.db.create_user(name, email, "hash").await.unwrap().id
        }

        /// Project with an explicit OWNER row for the creator.
        async fn project(&self, owner_id: i64) -> i64 {
            self.db
                .create_project(owner_id, "Checkout", None)
                .await
                .unwrap()
                .id
        }

        async fn member(&self, project_id: i64, user_id: i64, role: Role) {
            self.db
                .insert_membership(project_id, user_id, role)
                .await
                .unwrap();
        }

        fn list_input(&self, project_id: i64, requester_id: i64) -> ListMembersInput {
            ListMembersInput {
                project_id,
                requester_id,
                roles: None,
                q: None,
                page: None,
                page_size: None,
                sort_by: MemberSortField::Name,
                order: SortDirection::Asc,
            }
        }
    }

    // ------------------------------------------------------------------
    // Shared authorization predicate
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_non_member_forbidden_for_all_operations() {
        let f = fixture().await;
        let alice = f.user("Alice", "alice@example.com").await;
        let mallory = f.user("Mallory", "mallory@example.com").await;
        let project = f.project(alice).await;

        let err = f
            .manager
            .list_members(f.list_input(project, mallory))
            .await
            .unwrap_err();
        assert!(matches!(err, MemberError::Forbidden(_)));

        let err = f
            .manager
            .remove_member(RemoveMemberInput {
                project_id: project,
                requester_id: mallory,
                target_user_id: alice,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MemberError::Forbidden(_)));

        let err = f
            .manager
            .update_member_role(UpdateMemberRoleInput {
                project_id: project,
                requester_id: mallory,
                target_user_id: alice,
                new_role: Role::Tester,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MemberError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_bad_ids_rejected_before_lookup() {
        let f = fixture().await;
        let err = f.manager.authorize(0, 1).await.unwrap_err();
        assert!(matches!(err, MemberError::BadRequest(_)));
        let err = f.manager.authorize(1, -3).await.unwrap_err();
        assert!(matches!(err, MemberError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_missing_project_not_found() {
        let f = fixture().await;
        let err = f.manager.authorize(999, 1).await.unwrap_err();
        assert!(matches!(err, MemberError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_owner_without_row_still_authorized() {
        let f = fixture().await;
        let alice = f.user("Alice", "alice@example.com").await;
        let project = f.project(alice).await;
        // Legacy shape: drop the owner's explicit row.
        f.db.delete_membership(project, alice).await.unwrap();

        let ctx = f.manager.authorize(project, alice).await.unwrap();
        assert_eq!(ctx.role, Role::Owner);
    }

    // ------------------------------------------------------------------
    // Listing
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_list_synthesizes_owner_without_row() {
        let f = fixture().await;
        let alice = f.user("Alice", "alice@example.com").await;
        let bob = f.user("Bob", "bob@example.com").await;
        let project = f.project(alice).await;
        f.db.delete_membership(project, alice).await.unwrap();
        f.member(project, bob, Role::Tester).await;

        let page = f
            .manager
            .list_members(f.list_input(project, bob))
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        let owner = page.items.iter().find(|m| m.user_id == alice).unwrap();
        assert_eq!(owner.role, Role::Owner);
        assert_eq!(owner.email, "alice@example.com");
    }

    #[tokio::test]
    async fn test_role_filter_excludes_synthesized_owner() {
        let f = fixture().await;
        let alice = f.user("Alice", "alice@example.com").await;
        let bob = f.user("Bob", "bob@example.com").await;
        let project = f.project(alice).await;
        f.db.delete_membership(project, alice).await.unwrap();
        f.member(project, bob, Role::Tester).await;

        let mut input = f.list_input(project, bob);
        input.roles = Some(vec![Role::Tester]);
        let page = f.manager.list_members(input).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].user_id, bob);

        // Even filtering for OWNER only matches explicit rows.
        let mut input = f.list_input(project, bob);
        input.roles = Some(vec![Role::Owner]);
        let page = f.manager.list_members(input).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_query_matches_name_or_email_case_insensitive() {
        let f = fixture().await;
        let alice = f.user("Alice Kim", "alice@example.com").await;
        let bob = f.user("Bob Lee", "bob@corp.io").await;
        let carol = f.user("Carol", "carol@corp.io").await;
        let project = f.project(alice).await;
        f.member(project, bob, Role::Tester).await;
        f.member(project, carol, Role::Approver).await;

        let mut input = f.list_input(project, alice);
        input.q = Some("CORP.IO".into());
        let page = f.manager.list_members(input).await.unwrap();
        assert_eq!(page.total, 2);

        let mut input = f.list_input(project, alice);
        input.q = Some("kim".into());
        let page = f.manager.list_members(input).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].user_id, alice);

        // Whitespace-only query filters nothing.
        let mut input = f.list_input(project, alice);
        input.q = Some("   ".into());
        let page = f.manager.list_members(input).await.unwrap();
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn test_sort_by_role_uses_fixed_enum_order() {
        let f = fixture().await;
        let alice = f.user("Alice", "a@example.com").await;
        let bob = f.user("Bob", "b@example.com").await;
        let carol = f.user("Carol", "c@example.com").await;
        let dave = f.user("Dave", "d@example.com").await;
        let project = f.project(alice).await;
        f.member(project, bob, Role::Tester).await;
        f.member(project, carol, Role::Approver).await;
        f.member(project, dave, Role::Manager).await;

        let mut input = f.list_input(project, alice);
        input.sort_by = MemberSortField::Role;
        let page = f.manager.list_members(input).await.unwrap();
        let roles: Vec<Role> = page.items.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::Approver, Role::Manager, Role::Owner, Role::Tester]
        );

        let mut input = f.list_input(project, alice);
        input.sort_by = MemberSortField::Role;
        input.order = SortDirection::Desc;
        let page = f.manager.list_members(input).await.unwrap();
        let roles: Vec<Role> = page.items.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::Tester, Role::Owner, Role::Manager, Role::Approver]
        );
    }

    #[tokio::test]
    async fn test_sort_by_name_case_insensitive() {
        let f = fixture().await;
        let alice = f.user("alice", "a@example.com").await;
        let bob = f.user("Bob", "b@example.com").await;
        let carol = f.user("CAROL", "c@example.com").await;
        let project = f.project(alice).await;
        f.member(project, bob, Role::Tester).await;
        f.member(project, carol, Role::Tester).await;

        let page = f
            .manager
            .list_members(f.list_input(project, alice))
            .await
            .unwrap();
        let names: Vec<&str> = page.items.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["alice", "Bob", "CAROL"]);
    }

    #[tokio::test]
    async fn test_pagination_concatenation_reproduces_sorted_sequence() {
        let f = fixture().await;
        let alice = f.user("User00", "u00@example.com").await;
        let project = f.project(alice).await;
        let mut expected = vec![alice];
        for i in 1..7 {
            let id = f
                .user(&format!("User{:02}", i), &format!("u{:02}@example.com", i))
                .await;
            f.member(project, id, Role::Tester).await;
            expected.push(id);
        }

        let mut seen = Vec::new();
        let mut page_no = 1.0;
        loop {
            let mut input = f.list_input(project, alice);
            input.page = Some(page_no);
            input.page_size = Some(2.0);
            let page = f.manager.list_members(input).await.unwrap();
            assert_eq!(page.total, 7);
            let expected_has_next = (page.page * page.page_size) < page.total as i64;
            assert_eq!(page.has_next_page, expected_has_next);
            seen.extend(page.items.iter().map(|m| m.user_id));
            if !page.has_next_page {
                break;
            }
            page_no += 1.0;
        }

        assert_eq!(seen, expected, "no duplicates, no omissions, in order");
    }

    #[tokio::test]
    async fn test_pagination_clamps_and_floors() {
        let f = fixture().await;
        let alice = f.user("Alice", "a@example.com").await;
        let project = f.project(alice).await;

        // Fractional page floored, zero/negative clamped to 1.
        let mut input = f.list_input(project, alice);
        input.page = Some(0.0);
        input.page_size = Some(2.7);
        let page = f.manager.list_members(input).await.unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 2);

        let mut input = f.list_input(project, alice);
        input.page_size = Some(100_000.0);
        let page = f.manager.list_members(input).await.unwrap();
        assert_eq!(page.page_size, 100);

        let mut input = f.list_input(project, alice);
        input.page_size = Some(0.0);
        let page = f.manager.list_members(input).await.unwrap();
        assert_eq!(page.page_size, 1);

        // Past-the-end page: empty, no next page.
        let mut input = f.list_input(project, alice);
        input.page = Some(50.0);
        let page = f.manager.list_members(input).await.unwrap();
        assert!(page.items.is_empty());
        assert!(!page.has_next_page);
    }

    // ------------------------------------------------------------------
    // Removal
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_owner_removes_member_and_gets_deleted_record() {
        let f = fixture().await;
        let alice = f.user("Alice", "a@example.com").await;
        let bob = f.user("Bob", "b@example.com").await;
        let project = f.project(alice).await;
        f.member(project, bob, Role::Tester).await;

        let removed = f
            .manager
            .remove_member(RemoveMemberInput {
                project_id: project,
                requester_id: alice,
                target_user_id: bob,
            })
            .await
            .unwrap();
        assert_eq!(removed.user_id, bob);
        assert_eq!(removed.role, Role::Tester);
        assert!(f.db.find_membership(project, bob).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_manager_may_remove_tester_and_approver_only() {
        let f = fixture().await;
        let alice = f.user("Alice", "a@example.com").await;
        let boris = f.user("Boris", "b@example.com").await;
        let tina = f.user("Tina", "t@example.com").await;
        let mark = f.user("Mark", "m@example.com").await;
        let project = f.project(alice).await;
        f.member(project, boris, Role::Manager).await;
        f.member(project, tina, Role::Tester).await;
        f.member(project, mark, Role::Manager).await;

        // Manager removes a tester: fine.
        f.manager
            .remove_member(RemoveMemberInput {
                project_id: project,
                requester_id: boris,
                target_user_id: tina,
            })
            .await
            .unwrap();

        // Manager removing a manager: forbidden.
        let err = f
            .manager
            .remove_member(RemoveMemberInput {
                project_id: project,
                requester_id: boris,
                target_user_id: mark,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MemberError::Forbidden(_)));

        // Manager removing the owner: forbidden.
        let err = f
            .manager
            .remove_member(RemoveMemberInput {
                project_id: project,
                requester_id: boris,
                target_user_id: alice,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MemberError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_tester_may_not_remove_anyone() {
        let f = fixture().await;
        let alice = f.user("Alice", "a@example.com").await;
        let tina = f.user("Tina", "t@example.com").await;
        let paul = f.user("Paul", "p@example.com").await;
        let project = f.project(alice).await;
        f.member(project, tina, Role::Tester).await;
        f.member(project, paul, Role::Approver).await;

        let err = f
            .manager
            .remove_member(RemoveMemberInput {
                project_id: project,
                requester_id: tina,
                target_user_id: paul,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MemberError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_remove_target_without_row_not_found() {
        let f = fixture().await;
        let alice = f.user("Alice", "a@example.com").await;
        let bob = f.user("Bob", "b@example.com").await;
        let project = f.project(alice).await;

        let err = f
            .manager
            .remove_member(RemoveMemberInput {
                project_id: project,
                requester_id: alice,
                target_user_id: bob,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MemberError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_implicit_owner_is_not_a_removable_target() {
        let f = fixture().await;
        let alice = f.user("Alice", "a@example.com").await;
        let bob = f.user("Bob", "b@example.com").await;
        let project = f.project(alice).await;
        f.db.delete_membership(project, alice).await.unwrap();
        f.member(project, bob, Role::Manager).await;

        // Listing synthesizes Alice, but removal only sees explicit rows.
        let err = f
            .manager
            .remove_member(RemoveMemberInput {
                project_id: project,
                requester_id: alice,
                target_user_id: alice,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MemberError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_last_owner_removal_blocked() {
        let f = fixture().await;
        let alice = f.user("Alice", "a@example.com").await;
        let project = f.project(alice).await;

        let err = f
            .manager
            .remove_member(RemoveMemberInput {
                project_id: project,
                requester_id: alice,
                target_user_id: alice,
            })
            .await
            .unwrap_err();
        match err {
            MemberError::Conflict(msg) => assert!(msg.contains("transfer ownership")),
            other => panic!("expected Conflict, got {:?}", other),
        }
        // The row is untouched.
        assert!(f.db.find_membership(project, alice).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_owner_removes_self_when_co_owner_exists() {
        let f = fixture().await;
        let alice = f.user("Alice", "a@example.com").await;
        let bob = f.user("Bob", "b@example.com").await;
        let project = f.project(alice).await;
        f.member(project, bob, Role::Owner).await;

        let removed = f
            .manager
            .remove_member(RemoveMemberInput {
                project_id: project,
                requester_id: alice,
                target_user_id: alice,
            })
            .await
            .unwrap();
        assert_eq!(removed.role, Role::Owner);

        let mut tx = f.db.begin().await.unwrap();
        let owners = f.db.count_owners_tx(&mut tx, project).await.unwrap();
        assert_eq!(owners, 1);
    }

    // ------------------------------------------------------------------
    // Role update
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_idempotent_update_issues_no_write() {
        let f = fixture().await;
        let alice = f.user("Alice", "a@example.com").await;
        let bob = f.user("Bob", "b@example.com").await;
        let project = f.project(alice).await;
        f.member(project, bob, Role::Tester).await;
        let before = f.db.find_membership(project, bob).await.unwrap().unwrap();

        let result = f
            .manager
            .update_member_role(UpdateMemberRoleInput {
                project_id: project,
                requester_id: alice,
                target_user_id: bob,
                new_role: Role::Tester,
            })
            .await
            .unwrap();
        assert_eq!(result.role, Role::Tester);

        let after = f.db.find_membership(project, bob).await.unwrap().unwrap();
        assert_eq!(after.updated_at, before.updated_at, "no-op must not write");
    }

    #[tokio::test]
    async fn test_owner_promotes_and_result_reflects_change() {
        let f = fixture().await;
        let alice = f.user("Alice", "a@example.com").await;
        let bob = f.user("Bob", "b@example.com").await;
        let project = f.project(alice).await;
        f.member(project, bob, Role::Tester).await;

        let updated = f
            .manager
            .update_member_role(UpdateMemberRoleInput {
                project_id: project,
                requester_id: alice,
                target_user_id: bob,
                new_role: Role::Manager,
            })
            .await
            .unwrap();
        assert_eq!(updated.role, Role::Manager);

        let row = f.db.find_membership(project, bob).await.unwrap().unwrap();
        assert_eq!(row.role, Role::Manager);
        assert!(row.updated_at >= row.created_at);
    }

    #[tokio::test]
    async fn test_manager_cannot_demote_manager() {
        let f = fixture().await;
        let alice = f.user("Alice", "a@example.com").await;
        let boris = f.user("Boris", "b@example.com").await;
        let carl = f.user("Carl", "c@example.com").await;
        let project = f.project(alice).await;
        f.member(project, boris, Role::Manager).await;
        f.member(project, carl, Role::Manager).await;

        let err = f
            .manager
            .update_member_role(UpdateMemberRoleInput {
                project_id: project,
                requester_id: boris,
                target_user_id: carl,
                new_role: Role::Tester,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MemberError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_manager_cannot_promote_to_privileged_roles() {
        let f = fixture().await;
        let alice = f.user("Alice", "a@example.com").await;
        let boris = f.user("Boris", "b@example.com").await;
        let tina = f.user("Tina", "t@example.com").await;
        let project = f.project(alice).await;
        f.member(project, boris, Role::Manager).await;
        f.member(project, tina, Role::Tester).await;

        for new_role in [Role::Owner, Role::Manager] {
            let err = f
                .manager
                .update_member_role(UpdateMemberRoleInput {
                    project_id: project,
                    requester_id: boris,
                    target_user_id: tina,
                    new_role,
                })
                .await
                .unwrap_err();
            assert!(matches!(err, MemberError::Forbidden(_)));
        }

        // TESTER → APPROVER stays within the manager's reach.
        let updated = f
            .manager
            .update_member_role(UpdateMemberRoleInput {
                project_id: project,
                requester_id: boris,
                target_user_id: tina,
                new_role: Role::Approver,
            })
            .await
            .unwrap();
        assert_eq!(updated.role, Role::Approver);
    }

    #[tokio::test]
    async fn test_last_owner_demotion_blocked_even_for_self() {
        let f = fixture().await;
        let alice = f.user("Alice", "a@example.com").await;
        let project = f.project(alice).await;

        let err = f
            .manager
            .update_member_role(UpdateMemberRoleInput {
                project_id: project,
                requester_id: alice,
                target_user_id: alice,
                new_role: Role::Manager,
            })
            .await
            .unwrap_err();
        match err {
            MemberError::Conflict(msg) => assert!(msg.contains("transfer ownership")),
            other => panic!("expected Conflict, got {:?}", other),
        }
        let row = f.db.find_membership(project, alice).await.unwrap().unwrap();
        assert_eq!(row.role, Role::Owner);
    }

    #[tokio::test]
    async fn test_owner_demotes_co_owner_when_two_exist() {
        let f = fixture().await;
        let alice = f.user("Alice", "a@example.com").await;
        let bob = f.user("Bob", "b@example.com").await;
        let project = f.project(alice).await;
        f.member(project, bob, Role::Owner).await;

        let updated = f
            .manager
            .update_member_role(UpdateMemberRoleInput {
                project_id: project,
                requester_id: alice,
                target_user_id: bob,
                new_role: Role::Manager,
            })
            .await
            .unwrap();
        assert_eq!(updated.role, Role::Manager);

        let mut tx = f.db.begin().await.unwrap();
        let owners = f.db.count_owners_tx(&mut tx, project).await.unwrap();
        assert_eq!(owners, 1);
    }

    #[tokio::test]
    async fn test_owner_invariant_holds_across_accepted_operations() {
        let f = fixture().await;
        let alice = f.user("Alice", "a@example.com").await;
        let bob = f.user("Bob", "b@example.com").await;
        let carol = f.user("Carol", "c@example.com").await;
        let project = f.project(alice).await;
        f.member(project, bob, Role::Owner).await;
        f.member(project, carol, Role::Tester).await;

        // A mix of accepted and rejected mutations.
        let ops: Vec<MemberResult<Membership>> = vec![
            f.manager
                .update_member_role(UpdateMemberRoleInput {
                    project_id: project,
                    requester_id: alice,
                    target_user_id: bob,
                    new_role: Role::Manager,
                })
                .await,
            f.manager
                .remove_member(RemoveMemberInput {
                    project_id: project,
                    requester_id: alice,
                    target_user_id: alice,
                })
                .await,
            f.manager
                .update_member_role(UpdateMemberRoleInput {
                    project_id: project,
                    requester_id: alice,
                    target_user_id: carol,
                    new_role: Role::Owner,
                })
                .await,
        ];
        // First succeeds, second hits last-owner protection, third succeeds.
        assert!(ops[0].is_ok());
        assert!(matches!(ops[1], Err(MemberError::Conflict(_))));
        assert!(ops[2].is_ok());

        let mut tx = f.db.begin().await.unwrap();
        let owners = f.db.count_owners_tx(&mut tx, project).await.unwrap();
        assert!(owners >= 1, "invariant: at least one OWNER");
    }

    // ------------------------------------------------------------------
    // Normalization helpers
    // ------------------------------------------------------------------

    #[test]
    fn test_normalize_page_and_size() {
        assert_eq!(normalize_page(None), 1);
        assert_eq!(normalize_page(Some(3.9)), 3);
        assert_eq!(normalize_page(Some(-2.0)), 1);
        assert_eq!(normalize_page(Some(f64::NAN)), 1);

        assert_eq!(normalize_page_size(None), 20);
        assert_eq!(normalize_page_size(Some(0.5)), 1);
        assert_eq!(normalize_page_size(Some(250.0)), 100);
        assert_eq!(normalize_page_size(Some(33.2)), 33);
        assert_eq!(normalize_page_size(Some(f64::INFINITY)), 20);
    }
}
