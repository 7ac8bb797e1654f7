use crate::error_handler::ServiceError;
use crate::schema::{project_members, projects, task_assignees, tasks, users};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

// --- Helpers for deserializing patch fields ---
//
// A patch payload needs three states per field: absent (leave untouched),
// JSON null, and a value. Plain Option<T> collapses the first two, so patch
// DTOs use Option<Option<T>> with these adapters: absent -> None,
// null -> Some(None), value -> Some(Some(v)).

fn deserialize_opt_opt_string<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer) {
        Ok(Some(s)) => Ok(Some(Some(s))),
        Ok(None) => Ok(Some(None)),
        Err(e) => Err(e),
    }
}

fn deserialize_opt_opt_bool<'de, D>(deserializer: D) -> Result<Option<Option<bool>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<bool>::deserialize(deserializer) {
        Ok(Some(b)) => Ok(Some(Some(b))),
        Ok(None) => Ok(Some(None)),
        Err(e) => Err(e),
    }
}

fn deserialize_opt_opt_datetime_utc<'de, D>(
    deserializer: D,
) -> Result<Option<Option<DateTime<Utc>>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<DateTime<Utc>>::deserialize(deserializer) {
        Ok(Some(dt)) => Ok(Some(Some(dt))),
        Ok(None) => Ok(Some(None)),
        Err(e) => Err(e),
    }
}

/// Unwraps a patch field targeting a non-nullable column: absent stays
/// absent, an explicit JSON null is rejected.
pub fn patch_field<T>(field: Option<Option<T>>, name: &str) -> Result<Option<T>, ServiceError> {
    match field {
        Some(None) => Err(ServiceError::BadRequest(format!(
            "Field '{}' cannot be null",
            name
        ))),
        Some(Some(v)) => Ok(Some(v)),
        None => Ok(None),
    }
}

// --- User Model ---
// No Serialize on purpose: the password hash must never reach a response
// body. UserResponse is the only serialized shape.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = users)]
pub struct UpdateUserChangeset {
    pub name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
}

impl UpdateUserChangeset {
    pub fn is_noop(&self) -> bool {
        self.name.is_none()
            && self.username.is_none()
            && self.email.is_none()
            && self.password_hash.is_none()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub email: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id,
            name: user.name,
            username: user.username,
            email: user.email,
        }
    }
}

// --- Project Model ---
#[derive(Queryable, Selectable, Identifiable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = projects)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Project {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = projects)]
pub struct NewProject {
    pub title: String,
    pub description: Option<String>,
}

#[derive(AsChangeset, Debug)]
#[diesel(table_name = projects)]
pub struct UpdateProjectChangeset {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
}

impl UpdateProjectChangeset {
    pub fn is_noop(&self) -> bool {
        self.title.is_none() && self.description.is_none()
    }
}

// --- ProjectMember association ---
// One row per (user, project) pair; is_creator marks the elevated role that
// may invite, update and delete the project.
#[derive(
    Queryable, Selectable, Identifiable, Associations, Serialize, Deserialize, Debug, Clone,
    PartialEq,
)]
#[diesel(table_name = project_members)]
#[diesel(belongs_to(User))]
#[diesel(belongs_to(Project))]
#[diesel(primary_key(user_id, project_id))]
pub struct ProjectMember {
    pub user_id: Uuid,
    pub project_id: Uuid,
    pub is_creator: bool,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = project_members)]
pub struct NewProjectMember {
    pub user_id: Uuid,
    pub project_id: Uuid,
    pub is_creator: bool,
}

// --- Task Model ---
#[derive(
    Queryable, Selectable, Identifiable, Associations, Serialize, Deserialize, Debug, Clone,
    PartialEq,
)]
#[diesel(table_name = tasks)]
#[diesel(belongs_to(Project, foreign_key = project_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: String,
    pub deadline: DateTime<Utc>,
    pub completed: bool,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = tasks)]
pub struct NewTask {
    pub project_id: Uuid,
    pub title: String,
    pub description: String,
    pub deadline: DateTime<Utc>,
}

#[derive(AsChangeset, Debug)]
#[diesel(table_name = tasks)]
pub struct UpdateTaskChangeset {
    pub title: Option<String>,
    pub description: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub completed: Option<bool>,
}

impl UpdateTaskChangeset {
    pub fn is_noop(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.deadline.is_none()
            && self.completed.is_none()
    }
}

// --- TaskAssignee association ---
#[derive(
    Queryable, Selectable, Identifiable, Associations, Serialize, Deserialize, Debug, Clone,
    PartialEq,
)]
#[diesel(table_name = task_assignees)]
#[diesel(belongs_to(Task))]
#[diesel(belongs_to(User))]
#[diesel(primary_key(task_id, user_id))]
pub struct TaskAssignee {
    pub task_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = task_assignees)]
pub struct NewTaskAssignee {
    pub task_id: Uuid,
    pub user_id: Uuid,
}

// --- PAYLOAD DTOs ---

#[derive(Deserialize, Debug)]
pub struct RegisterPayload {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Debug)]
pub struct LoginPayload {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, Debug)]
pub struct UpdateUserPayload {
    pub name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct CreateProjectPayload {
    pub title: String,
    pub description: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct UpdateProjectPayload {
    pub title: Option<String>,
    #[serde(deserialize_with = "deserialize_opt_opt_string", default)]
    pub description: Option<Option<String>>,
}

fn default_false() -> bool {
    false
}

#[derive(Deserialize, Debug)]
pub struct ProjectInvitePayload {
    pub project_id: Uuid,
    pub user_id: Uuid,
    #[serde(default = "default_false")]
    pub is_creator: bool,
}

#[derive(Deserialize, Debug)]
pub struct CreateTaskPayload {
    pub title: String,
    pub description: String,
    pub deadline: DateTime<Utc>,
}

#[derive(Deserialize, Debug)]
pub struct UpdateTaskPayload {
    #[serde(deserialize_with = "deserialize_opt_opt_string", default)]
    pub title: Option<Option<String>>,
    #[serde(deserialize_with = "deserialize_opt_opt_string", default)]
    pub description: Option<Option<String>>,
    #[serde(deserialize_with = "deserialize_opt_opt_datetime_utc", default)]
    pub deadline: Option<Option<DateTime<Utc>>>,
    #[serde(deserialize_with = "deserialize_opt_opt_bool", default)]
    pub completed: Option<Option<bool>>,
}

impl UpdateTaskPayload {
    /// True when `completed` is the one and only field present in the
    /// payload. An explicit null counts as present, so
    /// `{"completed": true, "title": null}` does NOT qualify.
    pub fn updates_only_completed(&self) -> bool {
        self.completed.is_some()
            && self.title.is_none()
            && self.description.is_none()
            && self.deadline.is_none()
    }
}

#[derive(Deserialize, Debug)]
pub struct TaskInvitePayload {
    pub user_id: Uuid,
    pub project_id: Uuid,
    pub task_id: Uuid,
}

// --- RESPONSE DTOs ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProjectMemberView {
    pub user_id: Uuid,
    pub username: String,
    pub is_creator: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProjectResponse {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub members: Vec<ProjectMemberView>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TaskProjectRef {
    pub project_id: Uuid,
    pub project_title: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TaskMemberView {
    pub user_id: Uuid,
    pub username: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TaskResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub deadline: DateTime<Utc>,
    pub completed: bool,
    pub project: TaskProjectRef,
    pub members: Vec<TaskMemberView>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
}
