//! SQLite client: connection pool, embedded migrations and all
//! point-query / point-write operations used by the domain managers.

use super::models::*;
use crate::members::Role;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::str::FromStr;

/// Handle to the relational store. Cheap to clone (wraps a pool).
#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Open (creating if missing) the database at `url` and run migrations.
    ///
    /// In-memory databases are pinned to a single connection so every
    /// query sees the same store.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid database url: {}", url))?
            .create_if_missing(true)
            .foreign_keys(true);

        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("failed to open database")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run migrations")?;

        Ok(Self { pool })
    }

    /// Begin a transaction (used by the membership engine's guarded writes).
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ========================================================================
    // Users
    // ========================================================================

    pub async fn create_user(&self, name: &str, email: &str, password_hash: &str) -> Result<User> {
        let now = Utc::now();
        let result =
            sqlx::query("INSERT INTO users (name, email, password_hash, created_at) VALUES (?, ?, ?, ?)")
                .bind(name)
                .bind(email)
                .bind(password_hash)
                .bind(now)
                .execute(&self.pool)
                .await?;

        Ok(User {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
        })
    }

    pub async fn find_user(&self, id: i64) -> Result<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    // ========================================================================
    // Projects
    // ========================================================================

    /// Create a project together with an explicit OWNER membership row
    /// for the creator, atomically.
    pub async fn create_project(
        &self,
        owner_id: i64,
        name: &str,
        description: Option<&str>,
    ) -> Result<Project> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO projects (owner_id, name, description, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(owner_id)
        .bind(name)
        .bind(description)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let project_id = result.last_insert_rowid();

        sqlx::query(
            "INSERT INTO memberships (project_id, user_id, role, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(project_id)
        .bind(owner_id)
        .bind(Role::Owner)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Project {
            id: project_id,
            owner_id,
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn find_project(&self, id: i64) -> Result<Option<Project>> {
        Ok(sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Projects the user owns or holds a membership in.
    pub async fn list_projects_for_user(&self, user_id: i64) -> Result<Vec<Project>> {
        Ok(sqlx::query_as::<_, Project>(
            "SELECT DISTINCT p.* FROM projects p \
             LEFT JOIN memberships m ON m.project_id = p.id AND m.user_id = ? \
             WHERE p.owner_id = ? OR m.user_id IS NOT NULL \
             ORDER BY p.created_at DESC",
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Update name and/or description. The outer Option means "leave as is",
    /// the inner one allows clearing the description.
    pub async fn update_project(
        &self,
        id: i64,
        name: Option<String>,
        description: Option<Option<String>>,
    ) -> Result<Option<Project>> {
        let mut qb = QueryBuilder::new("UPDATE projects SET updated_at = ");
        qb.push_bind(Utc::now());
        if let Some(name) = &name {
            qb.push(", name = ").push_bind(name);
        }
        if let Some(description) = &description {
            qb.push(", description = ").push_bind(description.clone());
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.build().execute(&self.pool).await?;

        self.find_project(id).await
    }

    pub async fn count_members(&self, project_id: i64) -> Result<i64> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM memberships WHERE project_id = ?")
                .bind(project_id)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    pub async fn count_packages(&self, project_id: i64) -> Result<i64> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM test_packages WHERE project_id = ?")
                .bind(project_id)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    pub async fn delete_project(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Memberships
    // ========================================================================

    pub async fn find_membership(&self, project_id: i64, user_id: i64) -> Result<Option<Membership>> {
        Ok(sqlx::query_as::<_, Membership>(
            "SELECT * FROM memberships WHERE project_id = ? AND user_id = ?",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Memberships of a project joined with member name and email,
    /// optionally restricted to a set of roles.
    pub async fn list_members(
        &self,
        project_id: i64,
        roles: Option<&[Role]>,
    ) -> Result<Vec<Member>> {
        let mut qb = QueryBuilder::new(
            "SELECT m.user_id, u.name, u.email, m.role \
             FROM memberships m JOIN users u ON u.id = m.user_id \
             WHERE m.project_id = ",
        );
        qb.push_bind(project_id);
        if let Some(roles) = roles {
            qb.push(" AND m.role IN (");
            let mut sep = qb.separated(", ");
            for role in roles {
                sep.push_bind(*role);
            }
            qb.push(")");
        }
        qb.push(" ORDER BY m.created_at, m.user_id");
        Ok(qb.build_query_as::<Member>().fetch_all(&self.pool).await?)
    }

    pub async fn insert_membership(
        &self,
        project_id: i64,
        user_id: i64,
        role: Role,
    ) -> Result<Membership> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO memberships (project_id, user_id, role, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(project_id)
        .bind(user_id)
        .bind(role)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Membership {
            project_id,
            user_id,
            role,
            created_at: now,
            updated_at: now,
        })
    }

    /// Delete a membership whose role is known not to be OWNER.
    pub async fn delete_membership(&self, project_id: i64, user_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM memberships WHERE project_id = ? AND user_id = ?")
            .bind(project_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Set a membership's role without owner-count protection
    /// (target's current role is not OWNER).
    pub async fn update_membership_role(
        &self,
        project_id: i64,
        user_id: i64,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE memberships SET role = ?, updated_at = ? \
             WHERE project_id = ? AND user_id = ?",
        )
        .bind(role)
        .bind(now)
        .bind(project_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn count_owners_tx(
        &self,
        conn: &mut SqliteConnection,
        project_id: i64,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM memberships WHERE project_id = ? AND role = 'OWNER'",
        )
        .bind(project_id)
        .fetch_one(conn)
        .await?;
        Ok(count)
    }

    /// Remove an OWNER membership only while at least one other OWNER row
    /// remains. The count re-check lives in the statement itself so two
    /// concurrent removals cannot both succeed.
    pub async fn delete_owner_guarded_tx(
        &self,
        conn: &mut SqliteConnection,
        project_id: i64,
        user_id: i64,
    ) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM memberships WHERE project_id = ? AND user_id = ? \
             AND (SELECT COUNT(*) FROM memberships \
                  WHERE project_id = ? AND role = 'OWNER') > 1",
        )
        .bind(project_id)
        .bind(user_id)
        .bind(project_id)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Demote an OWNER membership only while at least one other OWNER row
    /// remains; same single-statement guard as [`Self::delete_owner_guarded_tx`].
    pub async fn demote_owner_guarded_tx(
        &self,
        conn: &mut SqliteConnection,
        project_id: i64,
        user_id: i64,
        new_role: Role,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE memberships SET role = ?, updated_at = ? \
             WHERE project_id = ? AND user_id = ? \
             AND (SELECT COUNT(*) FROM memberships \
                  WHERE project_id = ? AND role = 'OWNER') > 1",
        )
        .bind(new_role)
        .bind(now)
        .bind(project_id)
        .bind(user_id)
        .bind(project_id)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    // ========================================================================
    // Invitations
    // ========================================================================

    pub async fn create_invitation(
        &self,
        project_id: i64,
        email: &str,
        role: Role,
        invited_by: i64,
    ) -> Result<Invitation> {
        let now = Utc::now();
        let expires_at = now + Duration::days(7);
        let token = uuid::Uuid::new_v4().to_string();

        let result = sqlx::query(
            "INSERT INTO invitations \
             (project_id, email, role, token, status, invited_by, created_at, expires_at) \
             VALUES (?, ?, ?, ?, 'PENDING', ?, ?, ?)",
        )
        .bind(project_id)
        .bind(email)
        .bind(role)
        .bind(&token)
        .bind(invited_by)
        .bind(now)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(Invitation {
            id: result.last_insert_rowid(),
            project_id,
            email: email.to_string(),
            role,
            token,
            status: InvitationStatus::Pending,
            invited_by,
            created_at: now,
            expires_at,
        })
    }

    pub async fn find_invitation(&self, id: i64) -> Result<Option<Invitation>> {
        Ok(sqlx::query_as::<_, Invitation>("SELECT * FROM invitations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn find_invitation_by_token(&self, token: &str) -> Result<Option<Invitation>> {
        Ok(sqlx::query_as::<_, Invitation>("SELECT * FROM invitations WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list_invitations(&self, project_id: i64) -> Result<Vec<Invitation>> {
        Ok(sqlx::query_as::<_, Invitation>(
            "SELECT * FROM invitations WHERE project_id = ? ORDER BY created_at DESC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn has_pending_invitation(&self, project_id: i64, email: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM invitations \
             WHERE project_id = ? AND email = ? AND status = 'PENDING'",
        )
        .bind(project_id)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn set_invitation_status(&self, id: i64, status: InvitationStatus) -> Result<u64> {
        let result = sqlx::query("UPDATE invitations SET status = ? WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_invitation(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM invitations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Test packages
    // ========================================================================

    pub async fn create_package(
        &self,
        project_id: i64,
        name: &str,
        description: Option<&str>,
        created_by: i64,
    ) -> Result<TestPackage> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO test_packages (project_id, name, description, created_by, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(project_id)
        .bind(name)
        .bind(description)
        .bind(created_by)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(TestPackage {
            id: result.last_insert_rowid(),
            project_id,
            name: name.to_string(),
            description: description.map(str::to_string),
            created_by,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn find_package(&self, id: i64) -> Result<Option<TestPackage>> {
        Ok(sqlx::query_as::<_, TestPackage>("SELECT * FROM test_packages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list_packages(&self, project_id: i64) -> Result<Vec<TestPackage>> {
        Ok(sqlx::query_as::<_, TestPackage>(
            "SELECT * FROM test_packages WHERE project_id = ? ORDER BY created_at",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn update_package(
        &self,
        id: i64,
        name: Option<String>,
        description: Option<Option<String>>,
    ) -> Result<Option<TestPackage>> {
        let mut qb = QueryBuilder::new("UPDATE test_packages SET updated_at = ");
        qb.push_bind(Utc::now());
        if let Some(name) = &name {
            qb.push(", name = ").push_bind(name);
        }
        if let Some(description) = &description {
            qb.push(", description = ").push_bind(description.clone());
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.build().execute(&self.pool).await?;

        self.find_package(id).await
    }

    pub async fn delete_package(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM test_packages WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Test scenarios
    // ========================================================================

    #[allow(clippy::too_many_arguments)]
    pub async fn create_scenario(
        &self,
        package_id: i64,
        title: &str,
        description: Option<&str>,
        steps: Option<&str>,
        expected_result: Option<&str>,
        priority: ScenarioPriority,
        created_by: i64,
    ) -> Result<TestScenario> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO test_scenarios \
             (package_id, title, description, steps, expected_result, priority, status, created_by, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, 'DRAFT', ?, ?, ?)",
        )
        .bind(package_id)
        .bind(title)
        .bind(description)
        .bind(steps)
        .bind(expected_result)
        .bind(priority)
        .bind(created_by)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(TestScenario {
            id: result.last_insert_rowid(),
            package_id,
            title: title.to_string(),
            description: description.map(str::to_string),
            steps: steps.map(str::to_string),
            expected_result: expected_result.map(str::to_string),
            priority,
            status: ScenarioStatus::Draft,
            created_by,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn find_scenario(&self, id: i64) -> Result<Option<TestScenario>> {
        Ok(sqlx::query_as::<_, TestScenario>("SELECT * FROM test_scenarios WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Filtered, offset-paginated scenario listing. Returns (page, total).
    pub async fn list_scenarios(
        &self,
        package_id: i64,
        status: Option<ScenarioStatus>,
        priority: Option<ScenarioPriority>,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<TestScenario>, i64)> {
        fn push_filters(
            qb: &mut QueryBuilder<'_, Sqlite>,
            package_id: i64,
            status: Option<ScenarioStatus>,
            priority: Option<ScenarioPriority>,
            search: Option<&str>,
        ) {
            qb.push(" WHERE package_id = ").push_bind(package_id);
            if let Some(status) = status {
                qb.push(" AND status = ").push_bind(status);
            }
            if let Some(priority) = priority {
                qb.push(" AND priority = ").push_bind(priority);
            }
            if let Some(search) = search {
                let pattern = format!("%{}%", search);
                qb.push(" AND title LIKE ").push_bind(pattern);
            }
        }

        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM test_scenarios");
        push_filters(&mut count_qb, package_id, status, priority, search);
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::new("SELECT * FROM test_scenarios");
        push_filters(&mut qb, package_id, status, priority, search);
        qb.push(" ORDER BY created_at, id LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        let items = qb
            .build_query_as::<TestScenario>()
            .fetch_all(&self.pool)
            .await?;

        Ok((items, total))
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn update_scenario(
        &self,
        id: i64,
        title: Option<String>,
        description: Option<Option<String>>,
        steps: Option<Option<String>>,
        expected_result: Option<Option<String>>,
        priority: Option<ScenarioPriority>,
        status: Option<ScenarioStatus>,
    ) -> Result<Option<TestScenario>> {
        let mut qb = QueryBuilder::new("UPDATE test_scenarios SET updated_at = ");
        qb.push_bind(Utc::now());
        if let Some(title) = &title {
            qb.push(", title = ").push_bind(title);
        }
        if let Some(description) = &description {
            qb.push(", description = ").push_bind(description.clone());
        }
        if let Some(steps) = &steps {
            qb.push(", steps = ").push_bind(steps.clone());
        }
        if let Some(expected_result) = &expected_result {
            qb.push(", expected_result = ").push_bind(expected_result.clone());
        }
        if let Some(priority) = priority {
            qb.push(", priority = ").push_bind(priority);
        }
        if let Some(status) = status {
            qb.push(", status = ").push_bind(status);
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.build().execute(&self.pool).await?;

        self.find_scenario(id).await
    }

    pub async fn delete_scenario(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM test_scenarios WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Resolve the project a scenario ultimately belongs to.
    pub async fn project_id_for_scenario(&self, scenario_id: i64) -> Result<Option<i64>> {
        Ok(sqlx::query_scalar(
            "SELECT p.project_id FROM test_scenarios s \
             JOIN test_packages p ON p.id = s.package_id WHERE s.id = ?",
        )
        .bind(scenario_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    // ========================================================================
    // Executions
    // ========================================================================

    pub async fn create_execution(
        &self,
        scenario_id: i64,
        executed_by: i64,
        result: ExecutionResult,
        notes: Option<&str>,
    ) -> Result<Execution> {
        let now = Utc::now();
        let res = sqlx::query(
            "INSERT INTO executions (scenario_id, executed_by, result, notes, executed_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(scenario_id)
        .bind(executed_by)
        .bind(result)
        .bind(notes)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Execution {
            id: res.last_insert_rowid(),
            scenario_id,
            executed_by,
            result,
            notes: notes.map(str::to_string),
            executed_at: now,
        })
    }

    pub async fn find_execution(&self, id: i64) -> Result<Option<Execution>> {
        Ok(sqlx::query_as::<_, Execution>("SELECT * FROM executions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Newest-first executions of a scenario. Returns (page, total).
    pub async fn list_executions_for_scenario(
        &self,
        scenario_id: i64,
        result: Option<ExecutionResult>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Execution>, i64)> {
        let mut count_qb =
            QueryBuilder::new("SELECT COUNT(*) FROM executions WHERE scenario_id = ");
        count_qb.push_bind(scenario_id);
        if let Some(result) = result {
            count_qb.push(" AND result = ").push_bind(result);
        }
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::new("SELECT * FROM executions WHERE scenario_id = ");
        qb.push_bind(scenario_id);
        if let Some(result) = result {
            qb.push(" AND result = ").push_bind(result);
        }
        qb.push(" ORDER BY executed_at DESC, id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        let items = qb.build_query_as::<Execution>().fetch_all(&self.pool).await?;

        Ok((items, total))
    }

    /// Newest-first executions across a whole project. Returns (page, total).
    pub async fn list_executions_for_project(
        &self,
        project_id: i64,
        result: Option<ExecutionResult>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Execution>, i64)> {
        const FROM: &str = " FROM executions e \
             JOIN test_scenarios s ON s.id = e.scenario_id \
             JOIN test_packages p ON p.id = s.package_id \
             WHERE p.project_id = ";

        let mut count_qb = QueryBuilder::new(format!("SELECT COUNT(*){}", FROM));
        count_qb.push_bind(project_id);
        if let Some(result) = result {
            count_qb.push(" AND e.result = ").push_bind(result);
        }
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::new(format!("SELECT e.*{}", FROM));
        qb.push_bind(project_id);
        if let Some(result) = result {
            qb.push(" AND e.result = ").push_bind(result);
        }
        qb.push(" ORDER BY e.executed_at DESC, e.id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        let items = qb.build_query_as::<Execution>().fetch_all(&self.pool).await?;

        Ok((items, total))
    }

    pub async fn project_id_for_execution(&self, execution_id: i64) -> Result<Option<i64>> {
        Ok(sqlx::query_scalar(
            "SELECT p.project_id FROM executions e \
             JOIN test_scenarios s ON s.id = e.scenario_id \
             JOIN test_packages p ON p.id = s.package_id WHERE e.id = ?",
        )
        .bind(execution_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    // ========================================================================
    // Bugs
    // ========================================================================

    #[allow(clippy::too_many_arguments)]
    pub async fn create_bug(
        &self,
        project_id: i64,
        scenario_id: Option<i64>,
        execution_id: Option<i64>,
        title: &str,
        description: Option<&str>,
        severity: BugSeverity,
        reported_by: i64,
        assigned_to: Option<i64>,
    ) -> Result<Bug> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO bugs \
             (project_id, scenario_id, execution_id, title, description, severity, status, reported_by, assigned_to, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, 'OPEN', ?, ?, ?, ?)",
        )
        .bind(project_id)
        .bind(scenario_id)
        .bind(execution_id)
        .bind(title)
        .bind(description)
        .bind(severity)
        .bind(reported_by)
        .bind(assigned_to)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Bug {
            id: result.last_insert_rowid(),
            project_id,
            scenario_id,
            execution_id,
            title: title.to_string(),
            description: description.map(str::to_string),
            severity,
            status: BugStatus::Open,
            reported_by,
            assigned_to,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn find_bug(&self, id: i64) -> Result<Option<Bug>> {
        Ok(sqlx::query_as::<_, Bug>("SELECT * FROM bugs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Filtered, offset-paginated bug listing. Returns (page, total).
    pub async fn list_bugs(
        &self,
        project_id: i64,
        status: Option<BugStatus>,
        severity: Option<BugSeverity>,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Bug>, i64)> {
        fn push_filters(
            qb: &mut QueryBuilder<'_, Sqlite>,
            project_id: i64,
            status: Option<BugStatus>,
            severity: Option<BugSeverity>,
            search: Option<&str>,
        ) {
            qb.push(" WHERE project_id = ").push_bind(project_id);
            if let Some(status) = status {
                qb.push(" AND status = ").push_bind(status);
            }
            if let Some(severity) = severity {
                qb.push(" AND severity = ").push_bind(severity);
            }
            if let Some(search) = search {
                let pattern = format!("%{}%", search);
                qb.push(" AND title LIKE ").push_bind(pattern);
            }
        }

        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM bugs");
        push_filters(&mut count_qb, project_id, status, severity, search);
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::new("SELECT * FROM bugs");
        push_filters(&mut qb, project_id, status, severity, search);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        let items = qb.build_query_as::<Bug>().fetch_all(&self.pool).await?;

        Ok((items, total))
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn update_bug(
        &self,
        id: i64,
        title: Option<String>,
        description: Option<Option<String>>,
        severity: Option<BugSeverity>,
        status: Option<BugStatus>,
        assigned_to: Option<Option<i64>>,
    ) -> Result<Option<Bug>> {
        let mut qb = QueryBuilder::new("UPDATE bugs SET updated_at = ");
        qb.push_bind(Utc::now());
        if let Some(title) = &title {
            qb.push(", title = ").push_bind(title);
        }
        if let Some(description) = &description {
            qb.push(", description = ").push_bind(description.clone());
        }
        if let Some(severity) = severity {
            qb.push(", severity = ").push_bind(severity);
        }
        if let Some(status) = status {
            qb.push(", status = ").push_bind(status);
        }
        if let Some(assigned_to) = assigned_to {
            qb.push(", assigned_to = ").push_bind(assigned_to);
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.build().execute(&self.pool).await?;

        self.find_bug(id).await
    }

    pub async fn delete_bug(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM bugs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Evidence
    // ========================================================================

    #[allow(clippy::too_many_arguments)]
    pub async fn create_evidence(
        &self,
        execution_id: Option<i64>,
        bug_id: Option<i64>,
        file_name: &str,
        content_type: &str,
        size_bytes: i64,
        storage_key: &str,
        uploaded_by: i64,
    ) -> Result<Evidence> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO evidence \
             (execution_id, bug_id, file_name, content_type, size_bytes, storage_key, uploaded_by, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(execution_id)
        .bind(bug_id)
        .bind(file_name)
        .bind(content_type)
        .bind(size_bytes)
        .bind(storage_key)
        .bind(uploaded_by)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Evidence {
            id: result.last_insert_rowid(),
            execution_id,
            bug_id,
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            size_bytes,
            storage_key: storage_key.to_string(),
            uploaded_by,
            created_at: now,
        })
    }

    pub async fn find_evidence(&self, id: i64) -> Result<Option<Evidence>> {
        Ok(sqlx::query_as::<_, Evidence>("SELECT * FROM evidence WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list_evidence_for_execution(&self, execution_id: i64) -> Result<Vec<Evidence>> {
        Ok(sqlx::query_as::<_, Evidence>(
            "SELECT * FROM evidence WHERE execution_id = ? ORDER BY created_at",
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn list_evidence_for_bug(&self, bug_id: i64) -> Result<Vec<Evidence>> {
        Ok(sqlx::query_as::<_, Evidence>(
            "SELECT * FROM evidence WHERE bug_id = ? ORDER BY created_at",
        )
        .bind(bug_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn delete_evidence(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM evidence WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
