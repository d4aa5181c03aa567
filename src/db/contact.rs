use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::repository::{new_id, non_empty, now_rfc3339};
use super::Repository;
use crate::errors::AppError;
use crate::models::{ContactRequest, ContactSubmission};

impl Repository {
    /// Store a contact form message. Fields must already be validated.
    pub async fn create_contact(&self, request: &ContactRequest) -> Result<ContactSubmission, AppError> {
        let submission = ContactSubmission {
            id: new_id(),
            name: request.name.trim().to_string(),
            email: request.email.trim().to_string(),
            subject: non_empty(request.subject.as_ref()),
            message: request.message.trim().to_string(),
            resolved: false,
            created_at: now_rfc3339(),
        };

        sqlx::query(
            "INSERT INTO contact_submissions (id, name, email, subject, message, resolved, created_at) VALUES (?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(&submission.id)
        .bind(&submission.name)
        .bind(&submission.email)
        .bind(&submission.subject)
        .bind(&submission.message)
        .bind(&submission.created_at)
        .execute(&self.pool)
        .await?;

        tracing::info!("Contact submission {} received", submission.id);
        Ok(submission)
    }

    pub async fn list_contact(&self, unresolved_only: bool) -> Result<Vec<ContactSubmission>, AppError> {
        let sql = if unresolved_only {
            "SELECT * FROM contact_submissions WHERE resolved = 0 ORDER BY created_at DESC"
        } else {
            "SELECT * FROM contact_submissions ORDER BY created_at DESC"
        };
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(contact_from_row).collect())
    }

    pub async fn set_contact_resolved(&self, id: &str, resolved: bool) -> Result<ContactSubmission, AppError> {
        sqlx::query("UPDATE contact_submissions SET resolved = ? WHERE id = ?")
            .bind(resolved as i32)
            .bind(id)
            .execute(&self.pool)
            .await?;

        let row = sqlx::query("SELECT * FROM contact_submissions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref()
            .map(contact_from_row)
            .ok_or_else(|| AppError::NotFound(format!("Contact submission {} not found", id)))
    }

    pub async fn delete_contact(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM contact_submissions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Contact submission {} not found", id)));
        }
        Ok(())
    }
}

fn contact_from_row(row: &SqliteRow) -> ContactSubmission {
    let resolved: i32 = row.get("resolved");
    ContactSubmission {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        subject: row.get("subject"),
        message: row.get("message"),
        resolved: resolved != 0,
        created_at: row.get("created_at"),
    }
}
