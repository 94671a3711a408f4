use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub git_repo_path: String,
    pub setup_script: Option<String>,
    pub dev_script: Option<String>,
    pub cleanup_script: Option<String>,
    /// Newline-separated list of glob patterns copied into freshly created worktrees.
    pub copy_files: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, TS)]
pub struct CreateProject {
    pub name: String,
    pub git_repo_path: String,
    pub setup_script: Option<String>,
    pub dev_script: Option<String>,
    pub cleanup_script: Option<String>,
    pub copy_files: Option<String>,
}

#[derive(Debug, Deserialize, TS)]
pub struct UpdateProject {
    pub name: Option<String>,
    pub setup_script: Option<String>,
    pub dev_script: Option<String>,
    pub cleanup_script: Option<String>,
    pub copy_files: Option<String>,
}

impl Project {
    /// Parses `copy_files` into the individual patterns, one per line, blank lines ignored.
    pub fn copy_glob_patterns(&self) -> Vec<String> {
        self.copy_files
            .as_deref()
            .unwrap_or_default()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            Project,
            r#"SELECT id AS "id!: Uuid",
                      name,
                      git_repo_path,
                      setup_script,
                      dev_script,
                      cleanup_script,
                      copy_files,
                      created_at AS "created_at!: DateTime<Utc>",
                      updated_at AS "updated_at!: DateTime<Utc>"
               FROM projects
               WHERE id = $1"#,
            id
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as!(
            Project,
            r#"SELECT id AS "id!: Uuid",
                      name,
                      git_repo_path,
                      setup_script,
                      dev_script,
                      cleanup_script,
                      copy_files,
                      created_at AS "created_at!: DateTime<Utc>",
                      updated_at AS "updated_at!: DateTime<Utc>"
               FROM projects
               ORDER BY name ASC"#
        )
        .fetch_all(pool)
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        data: &CreateProject,
        id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as!(
            Project,
            r#"INSERT INTO projects (id, name, git_repo_path, setup_script, dev_script, cleanup_script, copy_files)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING id AS "id!: Uuid",
                         name,
                         git_repo_path,
                         setup_script,
                         dev_script,
                         cleanup_script,
                         copy_files,
                         created_at AS "created_at!: DateTime<Utc>",
                         updated_at AS "updated_at!: DateTime<Utc>""#,
            id,
            data.name,
            data.git_repo_path,
            data.setup_script,
            data.dev_script,
            data.cleanup_script,
            data.copy_files,
        )
        .fetch_one(pool)
        .await
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateProject,
    ) -> Result<Option<Self>, sqlx::Error> {
        let existing = match Self::find_by_id(pool, id).await? {
            Some(project) => project,
            None => return Ok(None),
        };

        let name = data.name.clone().unwrap_or(existing.name);
        let setup_script = data.setup_script.clone().or(existing.setup_script);
        let dev_script = data.dev_script.clone().or(existing.dev_script);
        let cleanup_script = data.cleanup_script.clone().or(existing.cleanup_script);
        let copy_files = data.copy_files.clone().or(existing.copy_files);

        sqlx::query_as!(
            Project,
            r#"UPDATE projects
               SET name = $1, setup_script = $2, dev_script = $3, cleanup_script = $4, copy_files = $5, updated_at = datetime('now')
               WHERE id = $6
               RETURNING id AS "id!: Uuid",
                         name,
                         git_repo_path,
                         setup_script,
                         dev_script,
                         cleanup_script,
                         copy_files,
                         created_at AS "created_at!: DateTime<Utc>",
                         updated_at AS "updated_at!: DateTime<Utc>""#,
            name,
            setup_script,
            dev_script,
            cleanup_script,
            copy_files,
            id,
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query!("DELETE FROM projects WHERE id = $1", id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn exists(pool: &SqlitePool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query!(
            r#"SELECT EXISTS(SELECT 1 FROM projects WHERE id = ?) as "exists!: bool""#,
            id
        )
        .fetch_one(pool)
        .await?;
        Ok(result.exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_glob_patterns_splits_on_newlines_and_trims() {
        let project = Project {
            id: Uuid::new_v4(),
            name: "demo".into(),
            git_repo_path: "/tmp/demo".into(),
            setup_script: None,
            dev_script: None,
            cleanup_script: None,
            copy_files: Some("  .env \n\nsecrets/*.json\n".into()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert_eq!(
            project.copy_glob_patterns(),
            vec![".env".to_string(), "secrets/*.json".to_string()]
        );
    }

    #[test]
    fn copy_glob_patterns_empty_when_unset() {
        let project = Project {
            id: Uuid::new_v4(),
            name: "demo".into(),
            git_repo_path: "/tmp/demo".into(),
            setup_script: None,
            dev_script: None,
            cleanup_script: None,
            copy_files: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(project.copy_glob_patterns().is_empty());
    }
}
