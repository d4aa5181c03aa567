//! User account queries.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::repository::{is_unique_violation, new_id, non_empty, now_rfc3339};
use super::Repository;
use crate::errors::AppError;
use crate::models::{AdminUpdateUserRequest, Role, User, UserCredentials};

const USER_COLUMNS: &str = "id, email, name, phone, role, created_at, updated_at";

impl Repository {
    /// Insert a new account. The e-mail must already be normalized.
    pub async fn create_user(
        &self,
        email: &str,
        name: &str,
        phone: Option<&String>,
        password_hash: &str,
        role: Role,
    ) -> Result<User, AppError> {
        let id = new_id();
        let now = now_rfc3339();
        let phone = non_empty(phone);

        let result = sqlx::query(
            "INSERT INTO users (id, email, name, phone, role, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(email)
        .bind(name.trim())
        .bind(&phone)
        .bind(role.as_str())
        .bind(password_hash)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(AppError::Conflict(
                    "An account with this email already exists".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!("Created {} account {}", role.as_str(), id);

        Ok(User {
            id,
            email: email.to_string(),
            name: name.trim().to_string(),
            phone,
            role,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Look up an account and its password hash by normalized e-mail.
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<UserCredentials>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {}, password_hash FROM users WHERE email = ?",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| UserCredentials {
            password_hash: row.get("password_hash"),
            user: user_from_row(&row),
        }))
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    pub async fn get_password_hash(&self, id: &str) -> Result<Option<String>, AppError> {
        let row = sqlx::query("SELECT password_hash FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("password_hash")))
    }

    /// List all accounts, newest first.
    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM users ORDER BY created_at DESC, email",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(user_from_row).collect())
    }

    /// Apply a partial update to an account.
    pub async fn update_user(&self, id: &str, request: &AdminUpdateUserRequest) -> Result<User, AppError> {
        let existing = self
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;

        let name = request
            .name
            .as_ref()
            .map(|n| n.trim().to_string())
            .unwrap_or(existing.name.clone());
        if name.is_empty() {
            return Err(AppError::Validation("Name cannot be empty".to_string()));
        }
        let phone = match &request.phone {
            Some(p) => non_empty(Some(p)),
            None => existing.phone.clone(),
        };
        let role = request.role.unwrap_or(existing.role);
        let now = now_rfc3339();

        // Demoting the last admin matches no row.
        let result = sqlx::query(
            "UPDATE users SET name = ?, phone = ?, role = ?, updated_at = ? \
             WHERE id = ? AND (role = ? OR role != 'admin' OR (SELECT COUNT(*) FROM users WHERE role = 'admin') > 1)",
        )
        .bind(&name)
        .bind(&phone)
        .bind(role.as_str())
        .bind(&now)
        .bind(id)
        .bind(role.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.last_admin_or_missing(id).await);
        }

        if role != existing.role {
            tracing::info!("User {} role changed to {}", id, role.as_str());
        }

        Ok(User {
            name,
            phone,
            role,
            updated_at: now,
            ..existing
        })
    }

    pub async fn set_password(&self, id: &str, password_hash: &str) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(now_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", id)));
        }
        Ok(())
    }

    /// Delete an account. The last admin cannot be deleted.
    pub async fn delete_user(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            "DELETE FROM users WHERE id = ? \
             AND (role != 'admin' OR (SELECT COUNT(*) FROM users WHERE role = 'admin') > 1)",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.last_admin_or_missing(id).await);
        }

        tracing::info!("Deleted user {}", id);
        Ok(())
    }

    /// Number of accounts holding the admin role.
    pub async fn count_admins(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM users WHERE role = ?")
            .bind(Role::Admin.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    /// Explain why a guarded update or delete touched no row.
    async fn last_admin_or_missing(&self, id: &str) -> AppError {
        match self.get_user(id).await {
            Ok(Some(_)) => AppError::Conflict("The store must keep at least one admin".to_string()),
            Ok(None) => AppError::NotFound(format!("User {} not found", id)),
            Err(e) => e,
        }
    }
}

fn user_from_row(row: &SqliteRow) -> User {
    let role: String = row.get("role");
    User {
        id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
        phone: row.get("phone"),
        role: Role::parse(&role).unwrap_or(Role::Customer),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
