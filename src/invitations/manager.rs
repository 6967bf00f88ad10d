//! Invitation lifecycle: PENDING → ACCEPTED / DECLINED / EXPIRED.
//!
//! Invitations grant a role below OWNER. Expiry is lazy: a pending
//! invitation past its deadline flips to EXPIRED the first time someone
//! tries to act on it.

use crate::db::{Db, Invitation, InvitationStatus, Membership};
use crate::members::{MemberError, MemberManager, MemberResult, Role};
use chrono::Utc;

/// Manager for project invitations. Cheap to clone.
#[derive(Clone)]
pub struct InvitationManager {
    db: Db,
    members: MemberManager,
}

impl InvitationManager {
    pub fn new(db: Db, members: MemberManager) -> Self {
        Self { db, members }
    }

    /// Invite `email` to join a project with `role`.
    ///
    /// Owners may grant MANAGER, TESTER or APPROVER; managers only TESTER
    /// or APPROVER, mirroring the member role rules. OWNER is never
    /// grantable through an invitation.
    pub async fn invite(
        &self,
        project_id: i64,
        requester_id: i64,
        email: &str,
        role: Role,
    ) -> MemberResult<Invitation> {
        let ctx = self.members.authorize(project_id, requester_id).await?;

        let email = email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(MemberError::BadRequest("invalid email address".into()));
        }

        if role == Role::Owner {
            return Err(MemberError::BadRequest(
                "ownership cannot be granted through an invitation".into(),
            ));
        }
        match ctx.role {
            Role::Owner => {}
            Role::Manager => {
                if role == Role::Manager {
                    return Err(MemberError::Forbidden(
                        "a manager may only invite testers and approvers".into(),
                    ));
                }
            }
            _ => {
                return Err(MemberError::Forbidden(
                    "only an owner or manager may invite members".into(),
                ))
            }
        }

        // Already a member (including the owner, whose membership may be
        // implicit): conflict.
        if let Some(user) = self.db.find_user_by_email(&email).await? {
            if user.id == ctx.project.owner_id
                || self.db.find_membership(project_id, user.id).await?.is_some()
            {
                return Err(MemberError::Conflict(
                    "this user is already a member of the project".into(),
                ));
            }
        }

        if self.db.has_pending_invitation(project_id, &email).await? {
            return Err(MemberError::Conflict(
                "an invitation for this email is already pending".into(),
            ));
        }

        Ok(self
            .db
            .create_invitation(project_id, &email, role, requester_id)
            .await?)
    }

    /// List a project's invitations (owner or manager only).
    pub async fn list(&self, project_id: i64, requester_id: i64) -> MemberResult<Vec<Invitation>> {
        let ctx = self.members.authorize(project_id, requester_id).await?;
        if !ctx.can_manage() {
            return Err(MemberError::Forbidden(
                "only an owner or manager may view invitations".into(),
            ));
        }
        Ok(self.db.list_invitations(project_id).await?)
    }

    /// Accept an invitation by token. The caller's email must match the
    /// invited address; on success a membership row is created.
    pub async fn accept(
        &self,
        token: &str,
        user_id: i64,
        user_email: &str,
    ) -> MemberResult<Membership> {
        let invitation = self.resolve_pending(token, user_email).await?;

        if self
            .db
            .find_membership(invitation.project_id, user_id)
            .await?
            .is_some()
        {
            return Err(MemberError::Conflict(
                "you are already a member of this project".into(),
            ));
        }

        let membership = self
            .db
            .insert_membership(invitation.project_id, user_id, invitation.role)
            .await?;
        self.db
            .set_invitation_status(invitation.id, InvitationStatus::Accepted)
            .await?;

        Ok(membership)
    }

    /// Decline an invitation by token.
    pub async fn decline(&self, token: &str, user_email: &str) -> MemberResult<Invitation> {
        let invitation = self.resolve_pending(token, user_email).await?;
        self.db
            .set_invitation_status(invitation.id, InvitationStatus::Declined)
            .await?;
        Ok(Invitation {
            status: InvitationStatus::Declined,
            ..invitation
        })
    }

    /// Revoke a pending invitation (owner or manager of its project).
    pub async fn revoke(&self, invitation_id: i64, requester_id: i64) -> MemberResult<()> {
        let invitation = self
            .db
            .find_invitation(invitation_id)
            .await?
            .ok_or_else(|| MemberError::NotFound("invitation not found".into()))?;

        let ctx = self
            .members
            .authorize(invitation.project_id, requester_id)
            .await?;
        if !ctx.can_manage() {
            return Err(MemberError::Forbidden(
                "only an owner or manager may revoke invitations".into(),
            ));
        }

        if invitation.status != InvitationStatus::Pending {
            return Err(MemberError::Conflict(
                "only pending invitations can be revoked".into(),
            ));
        }

        self.db.delete_invitation(invitation.id).await?;
        Ok(())
    }

    /// Look up a token, enforce the email match and lazily expire.
    async fn resolve_pending(&self, token: &str, user_email: &str) -> MemberResult<Invitation> {
        let invitation = self
            .db
            .find_invitation_by_token(token)
            .await?
            .ok_or_else(|| MemberError::NotFound("invitation not found".into()))?;

        if !invitation.email.eq_ignore_ascii_case(user_email.trim()) {
            return Err(MemberError::Forbidden(
                "this invitation was issued to a different email address".into(),
            ));
        }

        if invitation.status == InvitationStatus::Pending && Utc::now() > invitation.expires_at {
            self.db
                .set_invitation_status(invitation.id, InvitationStatus::Expired)
                .await?;
            return Err(MemberError::Conflict("this invitation has expired".into()));
        }

        if invitation.status != InvitationStatus::Pending {
            return Err(MemberError::Conflict(
                "this invitation is no longer pending".into(),
            ));
        }

        Ok(invitation)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    struct Fixture {
        db: Db,
        invitations: InvitationManager,
    }

    async fn fixture() -> Fixture {
        let db = Db::connect("sqlite::memory:").await.unwrap();
        let members = MemberManager::new(db.clone());
        let invitations = InvitationManager::new(db.clone(), members);
        Fixture { db, invitations }
    }

    impl Fixture {
        async fn user(&self, name: &str, email: &str) -> i64 {
            self.db.create_user(name, email, "hash").await.unwrap().id
        }

        async fn project(&self, owner_id: i64) -> i64 {
            self.db.create_project(owner_id, "P", None).await.unwrap().id
        }
    }

    #[tokio::test]
    async fn test_accept_creates_membership_once() {
        let f = fixture().await;
        let alice = f.user("Alice", "alice@example.com").await;
        let bob = f.user("Bob", "bob@example.com").await;
        let project = f.project(alice).await;

        let invitation = f
            .invitations
            .invite(project, alice, "bob@example.com", Role::Tester)
            .await
            .unwrap();
        assert_eq!(invitation.status, InvitationStatus::Pending);

        let membership = f
            .invitations
            .accept(&invitation.token, bob, "bob@example.com")
            .await
            .unwrap();
        assert_eq!(membership.role, Role::Tester);

        // Second accept: no longer pending.
        let err = f
            .invitations
            .accept(&invitation.token, bob, "bob@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, MemberError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_email_mismatch_forbidden() {
        let f = fixture().await;
        let alice = f.user("Alice", "alice@example.com").await;
        let eve = f.user("Eve", "eve@example.com").await;
        let project = f.project(alice).await;

        let invitation = f
            .invitations
            .invite(project, alice, "bob@example.com", Role::Tester)
            .await
            .unwrap();

        let err = f
            .invitations
            .accept(&invitation.token, eve, "eve@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, MemberError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_expired_invitation_flips_status_and_conflicts() {
        let f = fixture().await;
        let alice = f.user("Alice", "alice@example.com").await;
        let bob = f.user("Bob", "bob@example.com").await;
        let project = f.project(alice).await;

        let invitation = f
            .invitations
            .invite(project, alice, "bob@example.com", Role::Tester)
            .await
            .unwrap();

        // Backdate the deadline.
        sqlx::query("UPDATE invitations SET expires_at = ? WHERE id = ?")
            .bind(Utc::now() - chrono::Duration::hours(1))
            .bind(invitation.id)
            .execute(f.db.pool())
            .await
            .unwrap();

        let err = f
            .invitations
            .accept(&invitation.token, bob, "bob@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, MemberError::Conflict(_)));

        let row = sqlx::query("SELECT status FROM invitations WHERE id = ?")
            .bind(invitation.id)
            .fetch_one(f.db.pool())
            .await
            .unwrap();
        let status: String = row.get("status");
        assert_eq!(status, "EXPIRED");
    }

    #[tokio::test]
    async fn test_invite_rules() {
        let f = fixture().await;
        let alice = f.user("Alice", "alice@example.com").await;
        let boris = f.user("Boris", "boris@example.com").await;
        let tina = f.user("Tina", "tina@example.com").await;
        let project = f.project(alice).await;
        f.db.insert_membership(project, boris, Role::Manager)
            .await
            .unwrap();
        f.db.insert_membership(project, tina, Role::Tester)
            .await
            .unwrap();

        // OWNER is never grantable.
        let err = f
            .invitations
            .invite(project, alice, "new@example.com", Role::Owner)
            .await
            .unwrap_err();
        assert!(matches!(err, MemberError::BadRequest(_)));

        // A manager may not invite another manager.
        let err = f
            .invitations
            .invite(project, boris, "new@example.com", Role::Manager)
            .await
            .unwrap_err();
        assert!(matches!(err, MemberError::Forbidden(_)));

        // A tester may not invite at all.
        let err = f
            .invitations
            .invite(project, tina, "new@example.com", Role::Tester)
            .await
            .unwrap_err();
        assert!(matches!(err, MemberError::Forbidden(_)));

        // Existing member: conflict.
        let err = f
            .invitations
            .invite(project, alice, "tina@example.com", Role::Approver)
            .await
            .unwrap_err();
        assert!(matches!(err, MemberError::Conflict(_)));

        // Duplicate pending invitation: conflict.
        f.invitations
            .invite(project, alice, "new@example.com", Role::Tester)
            .await
            .unwrap();
        let err = f
            .invitations
            .invite(project, boris, "new@example.com", Role::Approver)
            .await
            .unwrap_err();
        assert!(matches!(err, MemberError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_revoke_pending_only_and_manage_roles_only() {
        let f = fixture().await;
        let alice = f.user("Alice", "alice@example.com").await;
        let tina = f.user("Tina", "tina@example.com").await;
        let project = f.project(alice).await;
        f.db.insert_membership(project, tina, Role::Tester)
            .await
            .unwrap();

        let invitation = f
            .invitations
            .invite(project, alice, "new@example.com", Role::Tester)
            .await
            .unwrap();

        let err = f.invitations.revoke(invitation.id, tina).await.unwrap_err();
        assert!(matches!(err, MemberError::Forbidden(_)));

        f.invitations.revoke(invitation.id, alice).await.unwrap();
        assert!(f.db.find_invitation(invitation.id).await.unwrap().is_none());

        let err = f.invitations.revoke(invitation.id, alice).await.unwrap_err();
        assert!(matches!(err, MemberError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_decline_sets_status() {
        let f = fixture().await;
        let alice = f.user("Alice", "alice@example.com").await;
        let bob = f.user("Bob", "bob@example.com").await;
        let project = f.project(alice).await;
        let _ = bob;

        let invitation = f
            .invitations
            .invite(project, alice, "bob@example.com", Role::Approver)
            .await
            .unwrap();

        let declined = f
            .invitations
            .decline(&invitation.token, "bob@example.com")
            .await
            .unwrap();
        assert_eq!(declined.status, InvitationStatus::Declined);

        let listed = f.invitations.list(project, alice).await.unwrap();
        assert_eq!(listed[0].status, InvitationStatus::Declined);
    }
}
